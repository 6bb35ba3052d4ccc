use std::collections::VecDeque;
use std::io::{self, IsTerminal, Read, Write};

use console::{style, Key, Term};

use crate::dprintln;

/// Where debugger commands come from.
#[allow(private_interfaces)]
pub enum Source {
    Argument(Argument),
    Stdin(Stdin),
    Terminal(Terminal),
}

pub trait SourceRead {
    /// Next command, shown after `prompt`. `None` indicates EOF.
    /// Returned string slice MAY include leading or trailing whitespace
    fn read(&mut self, prompt: &str) -> Option<&str>;
}

/// Commands given with `--command`
struct Argument {
    commands: std::vec::IntoIter<String>,
    current: String,
}

/// Stdin which is not attached to a terminal, i.e. piped
struct Stdin {
    stdin: io::Stdin,
    buffer: String,
}

/// Interactive terminal, read key by key so earlier lines can be recalled
struct Terminal {
    term: Term,
    /// Commands still waiting from the last line entered
    pending: VecDeque<String>,
    current: String,
    history: Vec<String>,
    /// Entry of `history` shown while recalling
    recall: Option<usize>,
}

/// Split on `;` and newlines. A trailing separator adds no empty command.
fn split_commands(text: &str) -> Vec<String> {
    text.split_terminator(|ch| ch == ';' || ch == '\n')
        .map(str::to_owned)
        .collect()
}

impl Source {
    pub fn from(argument: Option<String>) -> Self {
        if let Some(argument) = argument {
            return Source::Argument(Argument {
                commands: split_commands(&argument).into_iter(),
                current: String::new(),
            });
        }
        let stdin = io::stdin();
        if stdin.is_terminal() {
            return Source::Terminal(Terminal::new());
        }
        Source::Stdin(Stdin {
            stdin,
            buffer: String::new(),
        })
    }
}

impl SourceRead for Source {
    fn read(&mut self, prompt: &str) -> Option<&str> {
        let command = match self {
            Self::Terminal(terminal) => return terminal.read(prompt),
            Self::Argument(argument) => {
                dprintln!(Always, Info, "{}", prompt);
                argument.next()
            }
            Self::Stdin(stdin) => {
                dprintln!(Always, Info, "{}", prompt);
                stdin.next()
            }
        }?;
        // Echo, the terminal shows commands as they are typed
        dprintln!(Always, Special, "Command: {}", command.trim());
        Some(command)
    }
}

impl Argument {
    fn next(&mut self) -> Option<&str> {
        self.current = self.commands.next()?;
        Some(&self.current)
    }
}

impl Stdin {
    fn next(&mut self) -> Option<&str> {
        self.buffer.clear();
        let mut byte = [0; 1];
        loop {
            match self.stdin.read(&mut byte) {
                // Read errors count as EOF
                Ok(0) | Err(_) => {
                    if self.buffer.is_empty() {
                        return None;
                    }
                    break;
                }
                Ok(_) => match byte[0] {
                    b'\n' | b';' => break,
                    ch => self.buffer.push(ch as char),
                },
            }
        }
        Some(&self.buffer)
    }
}

impl Terminal {
    fn new() -> Self {
        Self {
            term: Term::stdout(),
            pending: VecDeque::new(),
            current: String::new(),
            history: Vec::new(),
            recall: None,
        }
    }

    fn draw(&self, prompt: &str, line: &str) -> io::Result<()> {
        let mut term = &self.term;
        term.clear_line()?;
        write!(term, "{} {} {}", style(prompt).blue(), style(">").cyan().bold(), line)?;
        term.flush()
    }

    fn read_line(&mut self, prompt: &str) -> io::Result<String> {
        let mut line = String::new();
        self.recall = None;
        loop {
            self.draw(prompt, &line)?;
            match self.term.read_key()? {
                Key::Enter | Key::Char('\n') => break,
                Key::Char(ch) if !ch.is_control() => line.push(ch),
                Key::Backspace => {
                    line.pop();
                }
                Key::ArrowUp => {
                    let older = self.recall.unwrap_or(self.history.len()).checked_sub(1);
                    if let Some(index) = older {
                        self.recall = Some(index);
                        line = self.history[index].clone();
                    }
                }
                Key::ArrowDown => match self.recall {
                    Some(index) if index + 1 < self.history.len() => {
                        self.recall = Some(index + 1);
                        line = self.history[index + 1].clone();
                    }
                    Some(_) => {
                        self.recall = None;
                        line.clear();
                    }
                    None => (),
                },
                _ => (),
            }
        }
        self.term.write_line("")?;

        if !line.trim().is_empty() && self.history.last() != Some(&line) {
            self.history.push(line.clone());
        }
        Ok(line)
    }
}

impl SourceRead for Terminal {
    fn read(&mut self, prompt: &str) -> Option<&str> {
        if self.pending.is_empty() {
            // Terminal went away
            let line = self.read_line(prompt).ok()?;
            self.pending = split_commands(&line).into();
            // Empty line steps
            if self.pending.is_empty() {
                self.pending.push_back(String::new());
            }
        }
        self.current = self.pending.pop_front()?;
        Some(&self.current)
    }
}
