//! Concatenation and recursive-array tests.

use rill_compiler::compiler::emit;
use rill_compiler::compiler::fir::Extent;
use rill_compiler::compiler::lower::ArgType;
use rill_compiler::compiler::poly::schedule::Scheduled;
use rill_compiler::compiler::poly::{PolyProgram, StmtExpr};
use rill_compiler::Evaluation;
use rill_core::location::SourceModule;

fn build(src: &str, name: &str, args: Vec<ArgType>) -> (PolyProgram, Scheduled) {
    let module = SourceModule::new("test", src);
    let tokens = rill_compiler::tokenize(&module).expect("lexes");
    let ast = rill_compiler::parse(tokens).expect("parses");
    let mut model = rill_compiler::build_model(&ast).expect("resolves");
    rill_compiler::check(&mut model).expect("type-checks");
    let eval = Evaluation {
        name: name.to_string(),
        args,
    };
    let mut program = rill_compiler::lower_evaluation(&mut model, &eval).expect("lowers");
    let sched = rill_compiler::schedule_program(&mut program).expect("schedules");
    (program, sched)
}

fn array<'p>(
    program: &'p PolyProgram,
    name: &str,
) -> &'p rill_compiler::compiler::poly::PolyArray {
    program
        .arrays
        .iter()
        .find(|a| a.name == name)
        .unwrap_or_else(|| panic!("no array '{}'", name))
}

// ═══════════════════════════════════════════════════════════════════
// Concatenation of a finite prefix and an infinite tail
// ═══════════════════════════════════════════════════════════════════

#[test]
fn concat_splits_into_offset_writers() {
    let (program, sched) = build(
        "f(a, b) = a ++ b;",
        "f",
        vec![
            ArgType::Stream(vec![Extent::Finite(3)]),
            ArgType::Stream(vec![Extent::Infinite]),
        ],
    );

    let out_array = program.output_array.expect("array result");
    let writers: Vec<_> = program
        .statements
        .iter()
        .filter(|s| s.array == Some(out_array))
        .collect();
    assert_eq!(writers.len(), 2, "one writer per concat operand");

    // Disjoint, offset-shifted write relations into one array.
    let offsets: Vec<i64> = writers
        .iter()
        .map(|s| s.write.as_ref().expect("write relation").constants[0])
        .collect();
    assert_eq!(offsets, vec![0, 3]);
    assert!(writers[0].flow_dim.is_none());
    assert_eq!(writers[1].flow_dim, Some(0));

    // The finite prefix fills cells 0..3 before the periodic phase.
    assert!(matches!(
        sched.kind,
        rill_compiler::compiler::poly::schedule::ScheduleKind::Combined
    ));
    assert!(!sched.finite_schedule.is_empty());
    assert!(!sched.period_schedule.is_empty());

    let out = array(&program, "f");
    assert_eq!(out.flow_dim, Some(0));
    assert_eq!(out.period, 1);
    assert_eq!(out.period_offset, 3);
}

#[test]
fn concat_description_reflects_the_prefix() {
    let (program, _) = build(
        "f(a, b) = a ++ b;",
        "f",
        vec![
            ArgType::Stream(vec![Extent::Finite(3)]),
            ArgType::Stream(vec![Extent::Infinite]),
        ],
    );
    let desc = emit::describe(&program);
    assert_eq!(desc.inputs.len(), 2);
    assert_eq!(desc.inputs[0].init, 3);
    assert_eq!(desc.inputs[0].period, 0);
    assert_eq!(desc.inputs[1].init, 0);
    assert_eq!(desc.inputs[1].period, 1);
    assert_eq!(desc.output.init, 3);
    assert_eq!(desc.output.period, 1);
}

#[test]
fn concat_rejects_infinite_prefix() {
    let module = SourceModule::new("test", "f(a, b) = a ++ b;");
    let tokens = rill_compiler::tokenize(&module).unwrap();
    let ast = rill_compiler::parse(tokens).unwrap();
    let mut model = rill_compiler::build_model(&ast).unwrap();
    rill_compiler::check(&mut model).unwrap();
    let eval = Evaluation {
        name: "f".to_string(),
        args: vec![
            ArgType::Stream(vec![Extent::Infinite]),
            ArgType::Stream(vec![Extent::Finite(3)]),
        ],
    };
    assert!(rill_compiler::lower_evaluation(&mut model, &eval).is_err());
}

// ═══════════════════════════════════════════════════════════════════
// Recursive arrays
// ═══════════════════════════════════════════════════════════════════

const FIB: &str = "fib = [n: { n == 0: 0; n == 1: 1; fib[n-1] + fib[n-2] }];";

#[test]
fn fibonacci_lowers_to_three_writers() {
    let (program, _) = build(FIB, "fib", vec![]);
    let out_array = program.output_array.expect("array result");
    let writers: Vec<_> = program
        .statements
        .iter()
        .filter(|s| s.array == Some(out_array))
        .collect();
    assert_eq!(writers.len(), 3);
    // Two pinned cells and one recurrence past them.
    assert_eq!(writers[0].domain, vec![Extent::Finite(1)]);
    assert_eq!(writers[1].domain, vec![Extent::Finite(1)]);
    assert_eq!(writers[2].domain, vec![Extent::Infinite]);
    let consts: Vec<i64> = writers
        .iter()
        .map(|s| s.write.as_ref().expect("write relation").constants[0])
        .collect();
    assert_eq!(consts, vec![0, 1, 2]);
}

#[test]
fn fibonacci_reads_its_own_two_previous_cells() {
    let (program, _) = build(FIB, "fib", vec![]);
    let out_array = program.output_array.expect("array result");
    let recurrence = program
        .statements
        .iter()
        .find(|s| s.flow_dim.is_some())
        .expect("recurrence statement");
    assert_eq!(recurrence.reads.len(), 2);
    for read in &recurrence.reads {
        assert_eq!(read.array, out_array);
    }
    // Write n+2 reads n+1 and n: distances 1 and 2.
    let mut read_offsets: Vec<i64> = recurrence
        .reads
        .iter()
        .map(|r| r.map.constants[0])
        .collect();
    read_offsets.sort_unstable();
    assert_eq!(read_offsets, vec![0, 1]);
}

#[test]
fn fibonacci_keeps_two_cells_live() {
    let (program, _) = build(FIB, "fib", vec![]);
    let fib = array(&program, "fib");
    assert_eq!(fib.buffer_size, vec![2]);
    assert!(fib.inter_period_dependency);
    assert_eq!(fib.period, 1);
    assert_eq!(fib.period_offset, 2);
}

#[test]
fn fibonacci_statement_body_is_pure() {
    let (program, _) = build(FIB, "fib", vec![]);
    let recurrence = program
        .statements
        .iter()
        .find(|s| s.flow_dim.is_some())
        .expect("recurrence statement");
    // add(read, read) with both reads resolved.
    let StmtExpr::Prim { args, .. } = &recurrence.expr else {
        panic!("expected a primitive body, got {:?}", recurrence.expr);
    };
    assert!(args.iter().all(|a| matches!(a, StmtExpr::Read { .. })));
}
