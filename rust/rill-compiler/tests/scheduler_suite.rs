//! Scheduler and buffer-sizer tests over infinite streams.
//!
//! These drive the pipeline end to end (source → FIR → polyhedral model
//! → schedule → buffers) and check the period structure and buffer
//! sizes the schedule implies.

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

fn stream() -> ArgType {
    ArgType::Stream(vec![Extent::Infinite])
}

// ═══════════════════════════════════════════════════════════════════
// Pointwise map over an infinite stream
// ═══════════════════════════════════════════════════════════════════

#[test]
fn pointwise_map_has_unit_period() {
    let (program, sched) = build("f(x) = [t: x[t] + 1];", "f", vec![stream()]);

    let f_stmt = program
        .statements
        .iter()
        .find(|s| s.name == "f")
        .expect("output statement");
    assert_eq!(f_stmt.flow_dim, Some(0));

    assert_eq!(sched.least_common_period, 1);
    assert_eq!(sched.period_offset, 0);

    let out = array(&program, "f");
    assert_eq!(out.period, 1);
    assert_eq!(out.period_offset, 0);
    assert_eq!(out.buffer_size, vec![1]);

    let desc = emit::describe(&program);
    assert_eq!(desc.inputs.len(), 1);
    assert_eq!(desc.inputs[0].init, 0);
    assert_eq!(desc.inputs[0].period, 1);
    assert!(desc.inputs[0].size.is_empty());
    assert_eq!(desc.output.init, 0);
    assert_eq!(desc.output.period, 1);
}

#[test]
fn pointwise_map_input_buffer_is_one() {
    let (program, _) = build("f(x) = [t: x[t] + 1];", "f", vec![stream()]);
    assert_eq!(array(&program, "x").buffer_size, vec![1]);
}

// ═══════════════════════════════════════════════════════════════════
// FIR filter of length 3
// ═══════════════════════════════════════════════════════════════════

#[test]
fn fir_filter_window_sizes_input_buffer() {
    let (program, sched) = build(
        "f(x) = [t: x[t] + x[t+1] + x[t+2]];",
        "f",
        vec![stream()],
    );

    assert_eq!(sched.least_common_period, 1);
    // The first output needs three samples; init covers two of them and
    // the third lands in the same period tick before the output runs.
    assert_eq!(sched.period_offset, 2);

    let input = array(&program, "x");
    assert_eq!(input.buffer_size, vec![3]);
    assert!(input.inter_period_dependency);

    let out = array(&program, "f");
    assert_eq!(out.period, 1);
    assert_eq!(out.buffer_size, vec![1]);
}

#[test]
fn fir_filter_description_counts_init_samples() {
    let (program, _) = build(
        "f(x) = [t: x[t] + x[t+1] + x[t+2]];",
        "f",
        vec![stream()],
    );
    let desc = emit::describe(&program);
    assert_eq!(desc.inputs[0].init, 2);
    assert_eq!(desc.inputs[0].period, 1);
    assert_eq!(desc.output.init, 0);
    assert_eq!(desc.output.period, 1);
}

// ═══════════════════════════════════════════════════════════════════
// Downsampler by 2
// ═══════════════════════════════════════════════════════════════════

#[test]
fn downsampler_balances_rates() {
    let (program, sched) = build("f(x) = [t: x[2*t]];", "f", vec![stream()]);

    // lcm of the schedule coefficients: input k=1, output k=2.
    assert_eq!(sched.least_common_period, 2);

    // period_span × k = lcm for every statement.
    assert_eq!(array(&program, "x").period, 2);
    assert_eq!(array(&program, "f").period, 1);

    let desc = emit::describe(&program);
    assert_eq!(desc.inputs[0].period, 2);
    assert_eq!(desc.output.period, 1);
    assert_eq!(desc.inputs[0].init, 0);
}

#[test]
fn downsampler_schedule_flow_dim_is_shared() {
    let (_, sched) = build("f(x) = [t: x[2*t]];", "f", vec![stream()]);
    assert_eq!(sched.schedule_flow_dim, 0);
}

// ═══════════════════════════════════════════════════════════════════
// Schedule structure
// ═══════════════════════════════════════════════════════════════════

#[test]
fn infinite_only_program_has_no_finite_schedule() {
    let (_, sched) = build("f(x) = [t: x[t] + 1];", "f", vec![stream()]);
    assert!(sched.finite_schedule.is_empty());
    assert!(!sched.infinite_schedule.is_empty());
    assert!(!sched.combined_schedule.is_empty());
    assert!(matches!(
        sched.kind,
        rill_compiler::compiler::poly::schedule::ScheduleKind::InfiniteOnly
    ));
}

#[test]
fn finite_program_has_no_period() {
    let (program, sched) = build("g = [i:10: i * 2];", "g", vec![]);
    assert!(matches!(
        sched.kind,
        rill_compiler::compiler::poly::schedule::ScheduleKind::FiniteOnly
    ));
    assert!(sched.init_schedule.is_empty());
    assert!(sched.period_schedule.is_empty());
    let out = array(&program, "g");
    assert_eq!(out.period, 0);
    assert_eq!(out.buffer_size, vec![10]);
}

#[test]
fn input_self_dependency_orders_the_stream() {
    // A dependency from each input iteration to the next must exist so
    // the scheduler cannot reorder reads of the outside world.
    let (program, sched) = build("f(x) = [t: x[t] + 1];", "f", vec![stream()]);
    let input_stmt = program.inputs[0];
    let tuple = sched.stmt_tuples[input_stmt];
    let self_dep = sched
        .dependencies
        .maps
        .iter()
        .find(|m| m.space.input == tuple && m.space.output == tuple);
    assert!(self_dep.is_some(), "missing input self-dependency");
}
