use std::path::{Path, PathBuf};
use std::process;
use std::time::{Duration, Instant};

use clap::{ArgAction, Parser, Subcommand};
use color_eyre::eyre::{eyre, Result, WrapErr};
use log::LevelFilter;
use simple_logger::SimpleLogger;

use neumann::assembler::{assemble, assemble_file};
use neumann::memory::StdMem;
use neumann::processor::{Instruction, Processor};
use neumann::write_instructions;

/// Exit code of `run --strict` when the program faulted
const FAULT_EXIT_CODE: i32 = 2;

/// Assembler and simulator for a small accumulator machine
#[derive(Parser)]
#[command(version, about)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// More log output, repeat for instruction traces
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    quiet: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file into a `.mem` file
    Assemble {
        /// Assembly source
        input: PathBuf,
        /// Destination memory file, one binary byte per line
        output: PathBuf,
    },
    /// Run a `.mem` or `.asm` file, or the built-in demo program
    Run {
        /// Memory file to run; `.asm` files are assembled first
        input: Option<PathBuf>,
        /// Stop with a fault after this many instructions
        #[arg(long)]
        max_instructions: Option<u64>,
        /// Exit with a non-zero code if the program faulted
        #[arg(long)]
        strict: bool,
        /// Print the value of a memory cell after the run
        #[arg(long, value_name = "ADDR")]
        inspect: Vec<u8>,
        /// Log a hex dump of the memory after the run
        #[arg(long)]
        dump: bool,
    },
}

fn main() -> Result<()> {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(err) => {
            // usage errors exit with 1, --help and --version with 0
            let code = if err.use_stderr() { 1 } else { 0 };
            err.print().ok();
            process::exit(code);
        }
    };

    color_eyre::install()?; // rust error handling
    SimpleLogger::new()
        .with_level(log_level(args.verbose, args.quiet))
        .init()?; // logging

    match args.command {
        Command::Assemble { input, output } => {
            let started = Instant::now();
            let program = assemble_file(&input, &output)
                .wrap_err_with(|| format!("Failed to assemble `{}`", input.display()))?;
            log::info!(
                "Assembled `{}` -> `{}` ({} bytes in {:?})",
                input.display(),
                output.display(),
                program.len(),
                started.elapsed()
            );
        }
        Command::Run {
            input,
            max_instructions,
            strict,
            inspect,
            dump,
        } => {
            let (mut mem, assembled_in) = match input {
                Some(path) => load(&path)?,
                None => (demo_program(), None),
            };

            let mut cpu = Processor::for_memory(&mem);
            if let Some(limit) = max_instructions {
                cpu = cpu.with_instruction_limit(limit);
            }

            let report = cpu.run(&mut mem);
            if let Some(duration) = assembled_in {
                println!("assembled in {:?}", duration);
            }
            println!("{}", report);
            for address in inspect {
                println!("memory[{}] = {}", address, mem.read_byte(address as u16));
            }
            if dump {
                mem.dump();
            }

            if strict && !report.is_clean() {
                process::exit(FAULT_EXIT_CODE);
            }
        }
    }

    Ok(())
}

fn log_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }

    match verbose {
        0 => LevelFilter::Info,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

/// Loads a memory file, or assembles a `.asm` file and reports how long that took
fn load(path: &Path) -> Result<(StdMem, Option<Duration>)> {
    let is_source = path
        .extension()
        .map_or(false, |extension| extension.eq_ignore_ascii_case("asm"));

    if !is_source {
        return Ok((StdMem::from_file(path)?, None));
    }

    let source = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("Failed to read `{}`", path.display()))?;

    let started = Instant::now();
    let program = assemble(&source)
        .wrap_err_with(|| format!("Failed to assemble `{}`", path.display()))?;
    let elapsed = started.elapsed();
    log::info!("Assembled `{}` ({} bytes in {:?})", path.display(), program.len(), elapsed);

    let mem = program
        .to_memory()
        .ok_or_else(|| eyre!("`{}` does not fit into memory", path.display()))?;
    Ok((mem, Some(elapsed)))
}

/// Adds 30 and 20, leaving 50 in the accumulator
fn demo_program() -> StdMem {
    let mut mem = StdMem::default();

    use Instruction::*;
    write_instructions!(mem : 0 =>
        LOADI, 30,
        STORE, 200,
        LOADI, 20,
        ADD, 200,
        HALT
    );

    mem
}
