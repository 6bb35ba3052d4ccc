use std::fs;
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use nib::{image, Debugger, DebuggerOptions, Expectation, Output, RunState, SessionEnd};

/// Nib is an assembler, disassembler and emulator toolchain for a 16-bit teaching CPU.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a `.asm` or `.bin` file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run text `.asm` or binary image `.bin` file directly and output to terminal
    Run {
        /// `.asm` or `.bin` file to run
        name: PathBuf,
        /// Maximum amount of instructions to execute (decimal or 0x hex)
        #[arg(short, long, value_parser = parse_budget)]
        budget: Option<u32>,
        /// Registers to check after the run, e.g. `R1=25,R2=-1,IO=0x4000`
        #[arg(short, long)]
        expect: Option<Expectation>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Run `.asm` or `.bin` file with debugger
    Debug {
        /// `.asm` or `.bin` file to run
        name: PathBuf,
        /// Read debugger commands from argument
        #[arg(short, long)]
        command: Option<String>,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Create binary image `.bin` file to run later or view compiled data
    Compile {
        /// `.asm` file to compile
        name: PathBuf,
        /// Destination to output .bin file
        dest: Option<PathBuf>,
    },
    /// Check a `.asm` file without running or outputting binary
    Check {
        /// File to check
        name: PathBuf,
    },
    /// Print the instruction encoded by each line of a `.bin` file
    Disassemble {
        /// `.bin` file to read
        name: PathBuf,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    nib::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(nib::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let Some(command) = args.command else {
        if let Some(path) = args.path {
            return run(&path, None, None, false);
        }
        println!("\n~ nib v{VERSION} ~");
        println!("{SHORT_INFO}");
        std::process::exit(0);
    };

    match command {
        Command::Run {
            name,
            budget,
            expect,
            minimal,
        } => {
            Output::set_minimal(minimal);
            run(&name, budget, expect, minimal)
        }
        Command::Debug {
            name,
            command,
            minimal,
        } => {
            Output::set_minimal(minimal);
            debug(&name, DebuggerOptions { command })
        }
        Command::Compile { name, dest } => {
            file_message(Green, "Assembling", &name);
            let contents = fs::read_to_string(&name).into_diagnostic()?;
            let words = nib::assemble(&contents)?;

            let out_file_name = dest.unwrap_or_else(|| name.with_extension("bin"));
            fs::write(&out_file_name, image::to_text(&words)).into_diagnostic()?;

            message(Green, "Finished", "emit binary");
            file_message(Green, "Saved", &out_file_name);
            Ok(())
        }
        Command::Check { name } => {
            file_message(Green, "Checking", &name);
            let contents = fs::read_to_string(&name).into_diagnostic()?;
            nib::assemble(&contents)?;
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Command::Disassemble { name } => {
            file_message(Green, "Reading", &name);
            let contents = fs::read_to_string(&name).into_diagnostic()?;
            for line in nib::disassemble_lines(&contents) {
                println!("{line}");
            }
            Ok(())
        }
    }
}

enum MsgColor {
    Green,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

fn parse_budget(value: &str) -> Result<u32, String> {
    nib::env::parse_budget(value).ok_or_else(|| format!("`{value}` is not a valid budget"))
}

/// Assemble or read the file and load it at address 0.
fn load(name: &Path) -> Result<RunState> {
    let words = match name.extension().and_then(|ext| ext.to_str()) {
        Some("bin") => {
            file_message(MsgColor::Green, "Reading", name);
            let contents = fs::read_to_string(name).into_diagnostic()?;
            image::from_text(&contents).into_diagnostic()?
        }
        Some("asm") => {
            file_message(MsgColor::Green, "Assembling", name);
            let contents = fs::read_to_string(name).into_diagnostic()?;
            nib::assemble(&contents)?
        }
        Some(_) => bail!("File has unknown extension. Exiting..."),
        None => bail!("File has no extension. Exiting..."),
    };

    let mut state = RunState::new();
    state.load_program(&words, 0).into_diagnostic()?;
    Ok(state)
}

fn run(
    name: &Path,
    budget: Option<u32>,
    expect: Option<Expectation>,
    minimal: bool,
) -> Result<()> {
    let mut state = load(name)?;

    message(MsgColor::Green, "Running", "emitted binary");
    let budget = budget.unwrap_or_else(nib::env::default_budget);
    let outcome = state.run(budget);

    let output = Output::Normal;
    if !minimal {
        output.start_new_line();
    }
    match outcome {
        Ok(reason) => message(MsgColor::Green, "Halted", &reason.to_string()),
        Err(fault) => message(MsgColor::Red, "Fault", &fault.to_string()),
    }
    output.print_registers(&state);
    output.print_flags(&state);

    if let Err(fault) = outcome {
        bail!("Execution stopped after {} instructions: {}", state.cycles(), fault);
    }

    if let Some(expect) = expect {
        let mismatches = expect.check(&state);
        for mismatch in &mismatches {
            message(MsgColor::Red, "Mismatch", &mismatch.to_string());
        }
        if !mismatches.is_empty() {
            bail!("{} register(s) did not match", mismatches.len());
        }
        message(MsgColor::Green, "Expected", "all registers match");
    }

    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn debug(name: &Path, options: DebuggerOptions) -> Result<()> {
    let mut state = load(name)?;

    message(MsgColor::Green, "Debugging", "emitted binary");
    let mut debugger = Debugger::new(options);
    match debugger.run(&mut state) {
        Ok(SessionEnd::Quit | SessionEnd::Halted | SessionEnd::EndOfInput) => {
            file_message(MsgColor::Green, "Completed", name);
            Ok(())
        }
        Err(fault) => {
            Output::Normal.start_new_line();
            bail!("Execution stopped after {} instructions: {}", state.cycles(), fault);
        }
    }
}

const SHORT_INFO: &str = r"
Welcome to nib, an all-in-one toolchain for the nib 16-bit CPU:
assemble, disassemble, run and step through programs.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");
