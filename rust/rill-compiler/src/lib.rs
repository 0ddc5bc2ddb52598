//! Rill Compiler
//!
//! Transforms Rill source files (`.rill`) into an imperative rendition of
//! the dataflow plus a JSON description of its stream interface: the
//! functional IR is type-checked, lowered to a polyhedral model,
//! scheduled into finite/init/period phases, and buffer sizes are derived
//! from the schedule.

pub mod compiler;
pub mod diagnostics;

use compiler::emit::{self, DescFile};
use compiler::lower::{self, ArgType};
use compiler::poly::buffers;
use compiler::poly::schedule::{self, Scheduled};
use compiler::poly::PolyProgram;
use compiler::printer::Printer;
use compiler::typecheck;
use compiler::{ast, fir, lexer, parser, resolve};
use rill_core::location::{CodeRange, SourceModule};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CompileError {
    #[error("lex error: {0}")]
    Lex(#[from] lexer::LexError),
    #[error("parse error: {0}")]
    Parse(#[from] parser::ParseError),
    #[error("{0}")]
    Resolve(#[from] resolve::ResolveError),
    #[error("{0}")]
    Type(#[from] typecheck::TypeError),
    #[error("{0}")]
    Lower(#[from] lower::LowerError),
    #[error("{0}")]
    Schedule(#[from] schedule::ScheduleError),
    #[error("{0}")]
    Emit(#[from] emit::EmitError),
    #[error("no symbol '{0}' available")]
    UnknownSymbol(String),
}

impl CompileError {
    /// The process exit code for this error family.
    pub fn exit_code(&self) -> i32 {
        match self {
            CompileError::Lex(_) | CompileError::Parse(_) => 3,
            CompileError::Resolve(_) | CompileError::UnknownSymbol(_) => 4,
            CompileError::Type(_) | CompileError::Lower(_) => 5,
            CompileError::Schedule(_) | CompileError::Emit(_) => 6,
        }
    }

    /// The source range the error points at, when one is known.
    pub fn range(&self) -> Option<CodeRange> {
        match self {
            CompileError::Lex(e) => Some(e.range()),
            CompileError::Parse(e) => Some(e.range()),
            CompileError::Resolve(e) => Some(e.range()),
            CompileError::Type(e) => Some(e.range()),
            CompileError::Lower(e) => Some(e.range()),
            CompileError::Schedule(_) | CompileError::Emit(_) | CompileError::UnknownSymbol(_) => {
                None
            }
        }
    }
}

/// One `--generate` request: the symbol and its argument types.
#[derive(Debug, Clone)]
pub struct Evaluation {
    pub name: String,
    pub args: Vec<ArgType>,
}

/// The products of one full compilation.
#[derive(Debug)]
pub struct Artifacts {
    pub target_text: String,
    pub description: DescFile,
    pub program: PolyProgram,
}

// ── Pipeline stages ─────────────────────────────────────────────────
//
// Each stage is callable on its own (the CLI composes them so partial
// results can be printed before a later stage aborts).

/// Lexing.
pub fn tokenize(module: &SourceModule) -> Result<Vec<compiler::tokens::Token>, CompileError> {
    Ok(lexer::Lexer::new(&module.text).tokenize()?)
}

/// Parsing.
pub fn parse(tokens: Vec<compiler::tokens::Token>) -> Result<ast::Module, CompileError> {
    Ok(parser::Parser::new(tokens).parse_module()?)
}

/// Name resolution: surface AST → FIR model.
pub fn build_model(module: &ast::Module) -> Result<fir::Model, CompileError> {
    Ok(resolve::resolve(module)?)
}

/// Type checking of every top-level identifier.
pub fn check(model: &mut fir::Model) -> Result<(), CompileError> {
    typecheck::process(model)?;
    Ok(())
}

/// Lower one evaluation to the polyhedral model.
pub fn lower_evaluation(
    model: &mut fir::Model,
    eval: &Evaluation,
) -> Result<PolyProgram, CompileError> {
    let target = model
        .lookup(&eval.name)
        .ok_or_else(|| CompileError::UnknownSymbol(eval.name.clone()))?;
    let arg_types: Vec<fir::Type> = eval.args.iter().map(|a| a.as_fir_type()).collect();
    typecheck::check_call(model, target, &arg_types)?;
    Ok(lower::translate(model, target, &eval.args)?)
}

/// Schedule the program and size its buffers.
pub fn schedule_program(program: &mut PolyProgram) -> Result<Scheduled, CompileError> {
    let sched = schedule::schedule(program)?;
    buffers::compute_buffers(program, &sched);
    Ok(sched)
}

/// Emit the imperative text and the interface description.
pub fn emit_artifacts(
    program: PolyProgram,
    sched: &Scheduled,
) -> Result<Artifacts, CompileError> {
    let target_text = emit::emit_text(&program, sched)?;
    let description = emit::describe(&program);
    Ok(Artifacts {
        target_text,
        description,
        program,
    })
}

/// The whole pipeline for one evaluation.
pub fn compile(module: &SourceModule, eval: &Evaluation) -> Result<Artifacts, CompileError> {
    let tokens = tokenize(module)?;
    let ast = parse(tokens)?;
    let mut model = build_model(&ast)?;
    check(&mut model)?;
    let mut program = lower_evaluation(&mut model, eval)?;
    let sched = schedule_program(&mut program)?;
    emit_artifacts(program, &sched)
}

/// The `--list-symbols` text for a checked model.
pub fn list_symbols(model: &fir::Model) -> String {
    Printer::new(model).symbol_listing()
}

/// Render a `CompileError` against its source module.
pub fn render_error(err: &CompileError, module: &SourceModule, ansi: bool) -> String {
    let range = err.range().unwrap_or_default();
    let d = diagnostics::Diagnostic::error(err.to_string(), module, range);
    if ansi {
        d.render_ansi()
    } else {
        d.render_plain()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_end_to_end_smoke() {
        let module = SourceModule::new("smoke", "f(x) = [t: x[t] + 1];");
        let eval = Evaluation {
            name: "f".to_string(),
            args: vec![ArgType::Stream(vec![fir::Extent::Infinite])],
        };
        let artifacts = compile(&module, &eval).expect("pipeline succeeds");
        assert!(artifacts.target_text.contains("void period(void)"));
        assert_eq!(artifacts.description.inputs.len(), 1);
    }

    #[test]
    fn test_unknown_symbol_exit_code() {
        let module = SourceModule::new("m", "f = 1;");
        let eval = Evaluation {
            name: "g".to_string(),
            args: Vec::new(),
        };
        let err = compile(&module, &eval).unwrap_err();
        assert_eq!(err.exit_code(), 4);
    }
}
