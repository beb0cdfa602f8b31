//! Command-line driver for the lanner backend.
//!
//! Reads a textual IR module, then either prints the parsed IR back
//! (`--llvm`) or runs the full backend pipeline and emits AArch64 assembly
//! (`-S`). The source-language frontend (lexing, parsing, semantic
//! checking) lives upstream of this tool.

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use lanner_codegen::isa::{self, IselLevel};
use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::process;

#[derive(Parser)]
#[command(name = "lanner", version, about = "lanner compiler backend driver")]
struct Args {
    /// Emit target assembly.
    #[arg(short = 'S')]
    emit_asm: bool,

    /// Print the parsed IR and stop.
    #[arg(long = "llvm")]
    emit_ir: bool,

    /// Output file; defaults to stdout.
    #[arg(short = 'o', value_name = "FILE")]
    output: Option<PathBuf>,

    /// Target architecture or triple.
    #[arg(long = "march", value_name = "TRIPLE", default_value = "aarch64")]
    march: String,

    /// Optimization level. The backend itself only cares whether the
    /// mid-end optimized upstream; the level is accepted for
    /// compatibility.
    #[arg(short = 'O', value_name = "LEVEL", num_args = 0..=1, default_missing_value = "2")]
    opt_level: Option<u8>,

    /// Select instruction selection through the selection DAG instead of
    /// the direct translation.
    #[arg(long = "dag-isel")]
    dag_isel: bool,

    /// Input IR file.
    input: PathBuf,
}

fn main() {
    env_logger::init();
    if let Err(error) = run(Args::parse()) {
        eprintln!("error: {error:#}");
        process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    let source = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read {}", args.input.display()))?;
    let module = lanner_reader::parse_module(&source)
        .map_err(|error| anyhow!("{}: {error}", args.input.display()))?;

    let text = if args.emit_ir {
        module.to_string()
    } else if args.emit_asm {
        let isel = if args.dag_isel {
            IselLevel::Dag
        } else {
            IselLevel::Direct
        };
        let target = isa::lookup_by_name(&args.march, isel)
            .map_err(|error| anyhow!("unknown target '{}': {error}", args.march))?;
        log::debug!(
            "compiling {} for {} at O{}",
            args.input.display(),
            target.name(),
            args.opt_level.unwrap_or(0)
        );
        target.compile_module(&module)?
    } else {
        bail!("nothing to do: pass -S to emit assembly or --llvm to print the IR");
    };

    match &args.output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("failed to write {}", path.display()))?,
        None => std::io::stdout()
            .write_all(text.as_bytes())
            .context("failed to write to stdout")?,
    }
    Ok(())
}
