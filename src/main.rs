pub mod bytecode;
pub mod interpreter;
pub mod jit;
pub mod lexer;
pub mod optimizer;

use std::error::Error as _;
use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use clap::{Parser, ValueEnum};
use colored::Colorize;
use thiserror::Error;

use crate::bytecode::translate::{translate, SyntaxError};
use crate::bytecode::{Op, Program};
use crate::interpreter::bytecode_interpreter::{ByteCodeInterpreter, RuntimeError};
use crate::interpreter::Runtime;
use crate::jit::codegen::x86_64::X86_64Codegen;
use crate::jit::codegen::{CodeGen, CodegenError, MachineCode};
use crate::lexer::lexer::Lexer;
use crate::lexer::Token;

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
use crate::jit::region::{CodeRegion, EngineError};

/// Every routine runs against a tape of this many byte cells.
pub const TAPE_LEN: usize = 30_000;

/// Brainfuck translator, interpreter, and x86-64 jit
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// The file to operate on
    file: PathBuf,

    /// What to do with the translated program, in order
    #[arg(value_enum)]
    commands: Vec<Command>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    /// Dump the recognized symbols with their source positions
    Tokens,
    /// Dump the translated ops
    Ir,
    /// Dump the generated machine code as hex
    Code,
    /// Run the program in the bytecode interpreter
    Interp,
    /// Compile the program and run it natively
    Jit,
}

#[derive(Error, Debug)]
enum CliError {
    #[error("could not read {}", .path.display())]
    Source {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error(transparent)]
    Syntax(#[from] SyntaxError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Codegen(#[from] CodegenError),

    #[cfg(all(target_os = "linux", target_arch = "x86_64"))]
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
    #[error("the jit backend is only available on x86-64 linux")]
    UnsupportedHost,
}

fn main() -> ExitCode {
    if let Err(error) = run(Args::parse()) {
        eprintln!("{} {error}", "error:".red().bold());
        let mut cause = error.source();
        while let Some(inner) = cause {
            eprintln!("{} {inner}", "caused by:".red());
            cause = inner.source();
        }
        return ExitCode::FAILURE;
    }
    ExitCode::SUCCESS
}

fn run(args: Args) -> Result<(), CliError> {
    let source = fs::read_to_string(&args.file).map_err(|source| CliError::Source {
        path: args.file.clone(),
        source,
    })?;

    let commands = if args.commands.is_empty() {
        vec![default_command()]
    } else {
        args.commands
    };

    let start = Instant::now();
    let tokens = Lexer::new(&source).tokenize();
    let program = translate(&tokens)?;
    report(
        "translated",
        &format!("{} symbols into {} ops", tokens.len(), program.len()),
        start.elapsed(),
    );

    for command in commands {
        match command {
            Command::Tokens => dump_tokens(&tokens),
            Command::Ir => dump_ir(&program),
            Command::Code => dump_code(&program)?,
            Command::Interp => interpret(&program)?,
            Command::Jit => run_native(&program)?,
        }
    }

    Ok(())
}

fn default_command() -> Command {
    if cfg!(all(target_os = "linux", target_arch = "x86_64")) {
        Command::Jit
    } else {
        Command::Interp
    }
}

/// Stage banners go to stderr so command output on stdout stays clean.
fn report(stage: &str, detail: &str, elapsed: Duration) {
    eprintln!(
        "{} {detail} ({elapsed:.2?})",
        format!("{stage:>10}").green().bold()
    );
}

fn dump_tokens(tokens: &[Token]) {
    for token in tokens {
        println!("{}:{}\t{}", token.line, token.column, token.kind.symbol());
    }
}

fn dump_ir(program: &[Op]) {
    for (index, op) in program.iter().enumerate() {
        println!("{index:4}  {}", describe(op));
    }
}

fn describe(op: &Op) -> String {
    let symbol = op.symbol();
    match *op {
        Op::IncPtr(count)
        | Op::DecPtr(count)
        | Op::IncData(count)
        | Op::DecData(count)
        | Op::ReadByte(count)
        | Op::WriteByte(count) => format!("{symbol} {count}"),
        Op::JumpIfZero(target) | Op::JumpIfNotZero(target) => format!("{symbol} -> {target}"),
        Op::ClearCell => symbol.to_string(),
        Op::MovePointerUntilZero(stride) => format!("{symbol} {stride:+}"),
        Op::MoveAndClearData(offset) => format!("{symbol} {offset:+}"),
    }
}

fn dump_code(program: &[Op]) -> Result<(), CliError> {
    let (code, _tape) = generate(program)?;
    for line in code.as_slice().chunks(16) {
        let hex: Vec<String> = line.iter().map(|byte| format!("{byte:02X}")).collect();
        println!("{}", hex.join(" "));
    }
    Ok(())
}

fn interpret(program: &Program) -> Result<(), CliError> {
    let start = Instant::now();
    let mut runtime = Runtime::new(TAPE_LEN, Box::new(io::stdin()), Box::new(io::stdout()));
    let result = ByteCodeInterpreter::new().run(&mut runtime, program);
    io::stdout().flush().ok();
    result?;
    report(
        "interpreted",
        &format!("{} ops", program.len()),
        start.elapsed(),
    );
    Ok(())
}

fn generate(program: &[Op]) -> Result<(MachineCode, Box<[u8]>), CodegenError> {
    let mut codegen = X86_64Codegen::new();
    codegen.load(program)?;
    Ok(codegen.finish())
}

#[cfg(all(target_os = "linux", target_arch = "x86_64"))]
fn run_native(program: &Program) -> Result<(), CliError> {
    let start = Instant::now();
    let (code, _tape) = generate(program)?;
    let region = CodeRegion::install(&code)?;
    report(
        "compiled",
        &format!("{} bytes of machine code", code.len()),
        start.elapsed(),
    );

    let start = Instant::now();
    // SAFETY: load/finish produced a complete routine and _tape stays alive
    // until after the call returns
    unsafe { region.invoke() };
    report("executed", "native routine", start.elapsed());
    Ok(())
}

#[cfg(not(all(target_os = "linux", target_arch = "x86_64")))]
fn run_native(_program: &Program) -> Result<(), CliError> {
    Err(CliError::UnsupportedHost)
}
