mod command;
mod source;

use self::command::Command;
use self::source::{Source, SourceRead};
use crate::disasm::disassemble;
use crate::output::{Condition, Output};
use crate::runtime::{Fault, RunState, HALT_BOUNDARY};
use crate::dprintln;

/// Leave this as a struct, in case more options are added in the future. Plus it is more explicit.
#[derive(Debug, Default)]
pub struct DebuggerOptions {
    pub command: Option<String>,
}

/// How a debugging session ended without a fault.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionEnd {
    /// User asked to stop
    Quit,
    /// PC entered the halt region
    Halted,
    /// Command source ran dry
    EndOfInput,
}

/// Blocking request/response stepper over a loaded program.
pub struct Debugger {
    command_source: Source,
    /// Print register and flag deltas after each command
    print_changes: bool,
    /// Address of the instruction executed last
    last_pc: Option<u16>,
}

impl Debugger {
    pub fn new(opts: DebuggerOptions) -> Self {
        Self {
            command_source: Source::from(opts.command),
            print_changes: true,
            last_pc: None,
        }
    }

    /// Prompt for and perform commands until the user quits, input ends, the program halts or
    /// an instruction faults.
    pub fn run(&mut self, state: &mut RunState) -> Result<SessionEnd, Fault> {
        loop {
            if state.is_halted() {
                dprintln!(
                    Always,
                    Error,
                    "[halt] reached 0x{:04X} with PC",
                    HALT_BOUNDARY
                );
                return Ok(SessionEnd::Halted);
            }

            Output::Debugger(Condition::Always, Default::default()).start_new_line();
            let prompt = Self::prompt(state);
            let Some(command) = self.next_command(&prompt) else {
                return Ok(SessionEnd::EndOfInput);
            };

            let before = *state.registers();
            match command {
                Command::Quit => {
                    dprintln!(Always, Warning, "Execution halted by user.");
                    return Ok(SessionEnd::Quit);
                }
                Command::Help => {
                    dprintln!(Always, Special, "{}", include_str!("./help.txt"));
                }
                Command::Step { count } => self.step(state, count)?,
                Command::Registers => {
                    Output::Debugger(Condition::Always, Default::default()).print_registers(state);
                }
                Command::RegistersExtended => {
                    Output::Debugger(Condition::Always, Default::default())
                        .print_registers_extended(state);
                }
                Command::Flags => {
                    Output::Debugger(Condition::Always, Default::default()).print_flags(state);
                }
                Command::Next => match state.fetch() {
                    Ok(instr) => dprintln!(Always, Info, "instr:\t0x{:04X} {}", instr, disassemble(instr)),
                    Err(fault) => dprintln!(Always, Error, "{}", fault),
                },
                Command::Last => match self.last_pc.map(|pc| state.read_word(pc)) {
                    Some(Ok(instr)) => dprintln!(Always, Info, "instr:\t0x{:04X} {}", instr, disassemble(instr)),
                    Some(Err(fault)) => dprintln!(Always, Error, "{}", fault),
                    None => dprintln!(Always, Info, "No instruction has been executed yet."),
                },
                Command::ToggleChanges => {
                    self.print_changes = !self.print_changes;
                    if self.print_changes {
                        dprintln!(Always, Info, "register and flag changes will now be printed");
                    } else {
                        dprintln!(Always, Info, "no more register and flag changes will be printed");
                    }
                }
            }

            if self.print_changes {
                Output::Debugger(Condition::Always, Default::default()).print_changes(&before, state);
            }
        }
    }

    /// Execute up to `count` instructions, stopping early at the halt region.
    fn step(&mut self, state: &mut RunState, count: u32) -> Result<(), Fault> {
        for _ in 0..count {
            if state.is_halted() {
                break;
            }
            self.last_pc = Some(state.pc());
            state.step()?;
        }
        Ok(())
    }

    /// Machine state the next command applies to.
    fn prompt(state: &RunState) -> String {
        match state.fetch() {
            Ok(instr) => format!(
                "PC: 0x{:04X}, instr: 0x{:04X} ({:11}), Cycle: {:03}",
                state.pc(),
                instr,
                disassemble(instr).to_string(),
                state.cycles()
            ),
            Err(_) => format!(
                "PC: 0x{:04X}, instr: ------ (unaligned PC), Cycle: {:03}",
                state.pc(),
                state.cycles()
            ),
        }
    }

    /// Returns `None` on EOF.
    fn next_command(&mut self, prompt: &str) -> Option<Command> {
        // Loop until valid command or EOF
        loop {
            let line = self.command_source.read(prompt)?;
            match Command::try_from(line) {
                Ok(command) => return Some(command),
                Err(error) => {
                    dprintln!(Always, Error, "{}", error);
                    dprintln!(Always, Error, "Type `help` for a list of commands.");
                }
            }
        }
    }
}
