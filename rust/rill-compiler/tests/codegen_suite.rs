//! Translator and backend tests: write relations, generated loop nests,
//! and the emitted program text.

use rill_compiler::compiler::emit;
use rill_compiler::compiler::fir::Extent;
use rill_compiler::compiler::lower::ArgType;
use rill_compiler::compiler::poly::schedule::Scheduled;
use rill_compiler::compiler::poly::PolyProgram;
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

fn emitted(src: &str, name: &str, args: Vec<ArgType>) -> String {
    let (program, sched) = build(src, name, args);
    emit::emit_text(&program, &sched).expect("emits")
}

// ═══════════════════════════════════════════════════════════════════
// 2-D generator with an enumerated range
// ═══════════════════════════════════════════════════════════════════

const GRID: &str = "grid = [i:10, j: i..i+3 : i*j];";

#[test]
fn enumerated_range_shears_the_write_relation() {
    let (program, _) = build(GRID, "grid", vec![]);
    let stmt = &program.statements[0];
    assert_eq!(stmt.domain, vec![Extent::Finite(10), Extent::Finite(4)]);
    assert!(stmt.flow_dim.is_none());

    // (i, j) → (i, i + j)
    let write = stmt.write.as_ref().expect("write relation");
    assert_eq!(write.coef, vec![vec![1, 0], vec![1, 1]]);
    assert_eq!(write.constants, vec![0, 0]);
}

#[test]
fn enumerated_range_grows_the_array_image() {
    let (program, _) = build(GRID, "grid", vec![]);
    let grid = &program.arrays[program.output_array.expect("array result")];
    // Tightest image of the sheared write: i + j peaks at 9 + 3.
    assert_eq!(
        grid.size,
        vec![Extent::Finite(10), Extent::Finite(13)]
    );
    assert_eq!(grid.buffer_size, vec![10, 13]);
}

#[test]
fn grid_emits_a_nested_finite_loop() {
    let text = emitted(GRID, "grid", vec![]);
    assert!(text.contains("void finite(void)"));
    assert!(text.contains("for (long t1 = 0; t1 <= 9; t1++)"));
    assert!(text.contains("for (long t2 = 0; t2 <= 3; t2++)"));
    // The sheared write index lands past the declared extent of j.
    assert!(text.contains("buf_grid"));
    assert!(text.contains("[RILL_MOD(t1 + t2, 13)]"));
}

// ═══════════════════════════════════════════════════════════════════
// Emitted phases
// ═══════════════════════════════════════════════════════════════════

#[test]
fn stream_program_emits_three_phases() {
    let text = emitted(
        "f(x) = [t: x[t] + 1];",
        "f",
        vec![ArgType::Stream(vec![Extent::Infinite])],
    );
    assert!(text.contains("void finite(void)"));
    assert!(text.contains("void init(void)"));
    assert!(text.contains("void period(void)"));
    assert!(text.contains("rill_period += 1;"));
    assert!(text.contains("extern double rill_input_0(long index);"));
    assert!(text.contains("static double buf_x[1];"));
}

#[test]
fn fir_filter_emits_init_reads() {
    let text = emitted(
        "f(x) = [t: x[t] + x[t+1] + x[t+2]];",
        "f",
        vec![ArgType::Stream(vec![Extent::Infinite])],
    );
    // Two input samples arrive during init.
    assert!(text.contains("void init(void)"));
    assert!(text.contains("rill_input_0"));
    assert!(text.contains("static double buf_x[3];"));
}

#[test]
fn downsampler_emits_stride_guard() {
    let text = emitted(
        "f(x) = [t: x[2*t]];",
        "f",
        vec![ArgType::Stream(vec![Extent::Infinite])],
    );
    assert!(text.contains("RILL_MOD(") && text.contains(", 2) == 0"));
}

#[test]
fn description_lists_buffer_products() {
    let (program, _) = build(GRID, "grid", vec![]);
    let desc = emit::describe(&program);
    assert_eq!(desc.buffers, vec![130]);
    assert_eq!(desc.output.init, 10);
    assert_eq!(desc.output.period, 0);
    assert_eq!(desc.output.size, vec![13]);
}

#[test]
fn description_serializes_to_json() {
    let (program, _) = build(
        "f(x) = [t: x[t] + 1];",
        "f",
        vec![ArgType::Stream(vec![Extent::Infinite])],
    );
    let json = emit::describe_json(&program);
    let value: serde_json::Value = serde_json::from_str(&json).expect("valid JSON");
    assert!(value["inputs"].is_array());
    assert!(value["output"]["period"].is_i64() || value["output"]["period"].is_u64());
    assert!(value["buffers"].is_array());
}

// ═══════════════════════════════════════════════════════════════════
// Scalar results
// ═══════════════════════════════════════════════════════════════════

#[test]
fn scalar_result_has_a_one_point_domain_and_no_array() {
    let (program, sched) = build("a = [i:4: i]; s = a[0] + a[3];", "s", vec![]);
    let out = program.output.expect("output statement");
    let stmt = program.statement(out);
    assert!(stmt.array.is_none());
    assert_eq!(stmt.domain, vec![Extent::Finite(1)]);
    assert_eq!(stmt.reads.len(), 2);
    assert!(matches!(
        sched.kind,
        rill_compiler::compiler::poly::schedule::ScheduleKind::FiniteOnly
    ));
    let desc = emit::describe(&program);
    // A statement without an array contributes a zero buffer entry.
    assert_eq!(*desc.buffers.last().expect("entries"), 0);
}
