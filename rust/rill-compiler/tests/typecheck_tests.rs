//! Dedicated typechecker tests.
//!
//! These focus on type propagation, the recursive-array fixed point, and
//! type error detection across the whole front half of the pipeline.

use rill_compiler::compiler::fir::{Extent, Model, PrimKind, Type};
use rill_compiler::CompileError;
use rill_core::location::SourceModule;

fn checked(source: &str) -> Result<Model, CompileError> {
    let module = SourceModule::new("typecheck-test", source);
    let tokens = rill_compiler::tokenize(&module)?;
    let ast = rill_compiler::parse(tokens)?;
    let mut model = rill_compiler::build_model(&ast)?;
    rill_compiler::check(&mut model)?;
    Ok(model)
}

fn assert_type_error(source: &str, expected_fragment: &str) {
    match checked(source) {
        Ok(_) => panic!(
            "expected type error with '{}', but source checked successfully:\n{}",
            expected_fragment, source
        ),
        Err(err) => {
            let msg = err.to_string().to_lowercase();
            let expect = expected_fragment.to_lowercase();
            assert!(
                msg.contains(&expect),
                "expected error containing '{}', got:\n{}",
                expected_fragment,
                err
            );
            assert_eq!(err.exit_code(), 5, "type errors are semantic errors");
        }
    }
}

fn type_of(source: &str, name: &str) -> Type {
    let model = checked(source).expect("source type-checks");
    let id = model.lookup(name).expect("symbol exists");
    model.id(id).ty.clone()
}

// ═══════════════════════════════════════════════════════════════════
// Structural propagation
// ═══════════════════════════════════════════════════════════════════

#[test]
fn constants_take_their_kind() {
    assert_eq!(type_of("a = 3;", "a").elem_kind(), PrimKind::Integer);
    assert_eq!(type_of("a = 3.5;", "a").elem_kind(), PrimKind::Real);
    assert_eq!(type_of("a = true;", "a").elem_kind(), PrimKind::Boolean);
    assert_eq!(type_of("a = 2i;", "a").elem_kind(), PrimKind::Complex);
}

#[test]
fn numeric_join_promotes() {
    assert_eq!(type_of("a = 1 + 2;", "a").elem_kind(), PrimKind::Integer);
    assert_eq!(type_of("a = 1 + 2.5;", "a").elem_kind(), PrimKind::Real);
    assert_eq!(type_of("a = 1.5 + 2i;", "a").elem_kind(), PrimKind::Complex);
}

#[test]
fn array_shape_concatenates_variables_and_body() {
    assert_eq!(
        type_of("a = [i:3: [j:5: i + j]];", "a"),
        Type::Array {
            size: vec![Extent::Finite(3), Extent::Finite(5)],
            elem: PrimKind::Integer
        }
    );
}

#[test]
fn unconstrained_variable_is_infinite() {
    assert_eq!(
        type_of("a = [t: t * 2];", "a").shape(),
        &[Extent::Infinite]
    );
}

#[test]
fn application_consumes_leading_dimensions() {
    assert_eq!(
        type_of("a = [i:3, j:5: i + j]; row = a[1];", "row"),
        Type::Array {
            size: vec![Extent::Finite(5)],
            elem: PrimKind::Integer
        }
    );
    assert_eq!(
        type_of("a = [i:3, j:5: i + j]; cell = a[1, 2];", "cell").elem_kind(),
        PrimKind::Integer
    );
}

#[test]
fn size_query_is_an_affine_constant() {
    let model = checked("a = [i:7: i]; n = #a;").expect("checks");
    let n = model.lookup("n").expect("symbol");
    let Type::Scalar(s) = &model.id(n).ty else {
        panic!("expected a scalar");
    };
    assert!(s.affine && s.constant);
}

// ═══════════════════════════════════════════════════════════════════
// Recursion
// ═══════════════════════════════════════════════════════════════════

#[test]
fn recursive_array_resolves_on_the_second_pass() {
    let ty = type_of(
        "fib = [n: { n == 0: 0; n == 1: 1; fib[n-1] + fib[n-2] }];",
        "fib",
    );
    assert_eq!(ty.elem_kind(), PrimKind::Integer);
    assert_eq!(ty.shape(), &[Extent::Infinite]);
}

#[test]
fn self_feeding_recursion_is_ambiguous() {
    assert_type_error("x = [n: x[n-1]];", "ambiguous result");
}

#[test]
fn mutual_scalar_recursion_is_ambiguous() {
    assert_type_error("a = b + 1; b = a + 1;", "ambiguous result");
}

// ═══════════════════════════════════════════════════════════════════
// Errors
// ═══════════════════════════════════════════════════════════════════

#[test]
fn boolean_arithmetic_is_rejected() {
    assert_type_error("a = true + 1;", "invalid argument types");
}

#[test]
fn complex_comparison_is_rejected() {
    assert_type_error("a = 2i < 3i;", "invalid argument types");
}

#[test]
fn infinity_arithmetic_is_ambiguous() {
    // Every numeric overload of `+` accepts `~` equally well.
    assert_type_error("a = ~ + ~;", "ambiguous function resolution");
}

#[test]
fn incompatible_case_arms_are_rejected() {
    assert_type_error("a = [n:4: { n < 2: true; 1.5 }];", "incompatible case");
}

#[test]
fn non_boolean_guard_is_rejected() {
    assert_type_error("a = [n:4: { n + 1: 0; 1 }];", "guard must be boolean");
}

#[test]
fn arity_mismatch_is_rejected() {
    assert_type_error("f(x, y) = x; a = f(1);", "takes 2 arguments");
}

#[test]
fn undefined_symbol_is_a_resolver_error() {
    let err = checked("a = nowhere + 1;").unwrap_err();
    assert!(err.to_string().contains("undefined symbol 'nowhere'"));
    assert_eq!(err.exit_code(), 4);
}

#[test]
fn duplicate_definition_is_rejected() {
    let err = checked("a = 1; a = 2;").unwrap_err();
    assert!(err.to_string().contains("duplicate definition"));
}

// ═══════════════════════════════════════════════════════════════════
// Error rendering
// ═══════════════════════════════════════════════════════════════════

#[test]
fn diagnostics_quote_the_offending_line() {
    let module = SourceModule::new("demo", "a = true + 1;\n");
    let tokens = rill_compiler::tokenize(&module).unwrap();
    let ast = rill_compiler::parse(tokens).unwrap();
    let mut model = rill_compiler::build_model(&ast).unwrap();
    let err = rill_compiler::check(&mut model).unwrap_err();
    let text = rill_compiler::render_error(&err, &module, false);
    assert!(text.contains("error:"));
    assert!(text.contains("a = true + 1;"));
    assert!(text.contains('^'));
}
