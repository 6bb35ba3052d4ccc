use std::{error::Error, fmt};

/// Single debugger command, parsed from one line of input.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Command {
    /// Execute `count` instructions
    Step { count: u32 },
    Registers,
    RegistersExtended,
    Flags,
    /// Disassemble the instruction at PC
    Next,
    /// Disassemble the instruction executed last
    Last,
    ToggleChanges,
    Quit,
    Help,
}

/// Error parsing a command.
#[derive(Debug, PartialEq, Eq)]
pub enum CommandError {
    InvalidCommand { command_name: String },
    InvalidCount { value: String },
    TooManyArguments { command_name: String },
}

impl Error for CommandError {}

impl fmt::Display for CommandError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidCommand { command_name } => {
                write!(f, "Not a command: `{}`", command_name)
            }
            Self::InvalidCount { value } => {
                write!(f, "Not a valid instruction count: `{}`", value)
            }
            Self::TooManyArguments { command_name } => {
                write!(f, "Too many arguments for `{}`", command_name)
            }
        }
    }
}

impl TryFrom<&str> for Command {
    type Error = CommandError;

    fn try_from(line: &str) -> Result<Self, Self::Error> {
        let mut words = line.split_whitespace();
        let Some(name) = words.next() else {
            // Empty line steps once
            return Ok(Command::Step { count: 1 });
        };
        let argument = words.next();
        if words.next().is_some() {
            return Err(CommandError::TooManyArguments {
                command_name: name.to_string(),
            });
        }

        if name.chars().all(|ch| ch.is_ascii_digit()) {
            if argument.is_some() {
                return Err(CommandError::TooManyArguments {
                    command_name: name.to_string(),
                });
            }
            return parse_count(name).map(|count| Command::Step { count });
        }

        let command = match name.to_ascii_lowercase().as_str() {
            "s" | "step" => {
                let count = argument.map(parse_count).transpose()?.unwrap_or(1);
                return Ok(Command::Step { count });
            }
            "r" | "registers" => Command::Registers,
            "re" => Command::RegistersExtended,
            "f" | "flags" => Command::Flags,
            "n" | "next" => Command::Next,
            "l" | "last" => Command::Last,
            "t" | "toggle" => Command::ToggleChanges,
            "q" | "quit" | "exit" => Command::Quit,
            "h" | "help" => Command::Help,
            _ => {
                return Err(CommandError::InvalidCommand {
                    command_name: name.to_string(),
                })
            }
        };
        if argument.is_some() {
            return Err(CommandError::TooManyArguments {
                command_name: name.to_string(),
            });
        }
        Ok(command)
    }
}

fn parse_count(value: &str) -> Result<u32, CommandError> {
    value.parse().map_err(|_| CommandError::InvalidCount {
        value: value.to_string(),
    })
}
