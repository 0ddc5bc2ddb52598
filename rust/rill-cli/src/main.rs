//! rillc — command-line interface for the Rill compiler.

use clap::Parser as ClapParser;
use rill_compiler::compiler::ast::print_module;
use rill_compiler::compiler::lexer::dump_tokens;
use rill_compiler::compiler::lower::ArgType;
use rill_compiler::{CompileError, Evaluation};
use rill_core::location::SourceModule;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

mod exit {
    pub const OK: u8 = 0;
    pub const COMMAND_LINE: u8 = 1;
    pub const IO: u8 = 2;
}

fn cyan(s: &str) -> String {
    format!("\x1b[36m{}\x1b[0m", s)
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{}\x1b[0m", s)
}

#[derive(ClapParser)]
#[command(
    name = "rillc",
    version,
    about = "Compiler for the Rill stream-processing language"
)]
struct Cli {
    /// Input source file
    input: PathBuf,

    /// Output file name (default: 'out.ll'); the interface description
    /// goes next to it with a '.desc' extension
    #[arg(short, long, default_value = "out.ll")]
    output: PathBuf,

    /// Print all tokens produced by the lexical scanner
    #[arg(short = 't', long)]
    print_tokens: bool,

    /// Print the abstract syntax tree produced by the parser
    #[arg(short = 's', long)]
    print_ast: bool,

    /// List all top-level declarations with their types
    #[arg(short = 'l', long)]
    list_symbols: bool,

    /// Generate output for <SYMBOL> with the given argument types; each
    /// following argument is 'int', 'real', or '[N1,N2,...]' with every
    /// Ni a positive integer or 'inf'
    #[arg(short = 'g', long, alias = "gen", num_args = 1.., value_name = "SYMBOL [ARG]...")]
    generate: Option<Vec<String>>,
}

fn parse_eval_arg(arg: &str) -> Result<ArgType, String> {
    use rill_compiler::compiler::fir::Extent;
    if arg == "int" {
        return Ok(ArgType::Int);
    }
    if arg == "real" {
        return Ok(ArgType::Real);
    }
    if arg.len() >= 3 && arg.starts_with('[') && arg.ends_with(']') {
        let mut sizes = Vec::new();
        for elem in arg[1..arg.len() - 1].split(',') {
            let elem = elem.trim();
            if elem == "inf" {
                sizes.push(Extent::Infinite);
            } else {
                match elem.parse::<i64>() {
                    Ok(n) if n > 0 => sizes.push(Extent::Finite(n)),
                    _ => return Err(format!("invalid stream argument: {}", arg)),
                }
            }
        }
        return Ok(ArgType::Stream(sizes));
    }
    Err(format!("invalid argument type: {}", arg))
}

fn report(err: &CompileError, module: &SourceModule) {
    let ansi = std::io::stderr().is_terminal();
    eprint!("{}", rill_compiler::render_error(err, module, ansi));
}

fn main() -> ExitCode {
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) if e.use_stderr() => {
            eprint!("{}", e);
            return ExitCode::from(exit::COMMAND_LINE);
        }
        Err(e) => {
            // --help / --version
            print!("{}", e);
            return ExitCode::from(exit::OK);
        }
    };

    let evaluation = match &cli.generate {
        Some(parts) => {
            let name = parts[0].clone();
            let mut args = Vec::new();
            for raw in &parts[1..] {
                match parse_eval_arg(raw) {
                    Ok(a) => args.push(a),
                    Err(msg) => {
                        eprintln!("error: {}", msg);
                        return ExitCode::from(exit::COMMAND_LINE);
                    }
                }
            }
            Some(Evaluation { name, args })
        }
        None => None,
    };

    let text = match std::fs::read_to_string(&cli.input) {
        Ok(text) => text,
        Err(e) => {
            eprintln!(
                "error: failed to open input file '{}': {}",
                cli.input.display(),
                e
            );
            return ExitCode::from(exit::IO);
        }
    };
    let name = cli
        .input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "input".to_string());
    let module = SourceModule {
        name,
        path: Some(cli.input.display().to_string()),
        text,
    };

    match run(&cli, &module, evaluation) {
        Ok(code) => code,
        Err(err) => {
            report(&err, &module);
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn run(
    cli: &Cli,
    module: &SourceModule,
    evaluation: Option<Evaluation>,
) -> Result<ExitCode, CompileError> {
    let tokens = rill_compiler::tokenize(module)?;
    if cli.print_tokens {
        println!("{}", bold("== Tokens =="));
        print!("{}", dump_tokens(&tokens));
    }

    let ast = rill_compiler::parse(tokens)?;
    if cli.print_ast {
        println!("{}", bold("== Abstract Syntax Tree =="));
        print!("{}", print_module(&ast));
    }

    let mut model = rill_compiler::build_model(&ast)?;
    if cli.list_symbols {
        rill_compiler::check(&mut model)?;
        println!("{}", bold("== Symbols =="));
        print!("{}", rill_compiler::list_symbols(&model));
    }

    let Some(evaluation) = evaluation else {
        return Ok(ExitCode::from(exit::OK));
    };

    rill_compiler::check(&mut model)?;
    let mut program = rill_compiler::lower_evaluation(&mut model, &evaluation)?;
    let sched = rill_compiler::schedule_program(&mut program)?;
    let artifacts = rill_compiler::emit_artifacts(program, &sched)?;

    if let Err(e) = std::fs::write(&cli.output, &artifacts.target_text) {
        eprintln!(
            "error: could not open output file '{}': {}",
            cli.output.display(),
            e
        );
        return Ok(ExitCode::from(exit::IO));
    }
    let desc_path: PathBuf = cli.output.with_extension("desc");
    let desc_json = serde_json::to_string_pretty(&artifacts.description)
        .expect("description serializes");
    if let Err(e) = std::fs::write(&desc_path, desc_json) {
        eprintln!(
            "error: could not open description output file '{}': {}",
            desc_path.display(),
            e
        );
        return Ok(ExitCode::from(exit::IO));
    }

    println!(
        "{} {} -> {}, {}",
        cyan("compiled"),
        evaluation.name,
        display_rel(&cli.output),
        display_rel(&desc_path)
    );
    Ok(ExitCode::from(exit::OK))
}

fn display_rel(path: &Path) -> String {
    path.display().to_string()
}
