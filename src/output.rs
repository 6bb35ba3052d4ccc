use std::cell::RefCell;
use std::fmt::Write as _;
use std::str::Chars;

use colored::Colorize;

use crate::runtime::RunState;
use crate::symbol::{Flag, Register};

#[macro_export]
macro_rules! dprint {
    ( $condition:expr, $category:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::{Category::*, Condition::*};
        let s = format!(
            $fmt
            $($tt)*
        );
        $crate::output::Output::Debugger($condition, $category).print_str(&s);
    }};
}

#[macro_export]
macro_rules! dprintln {
    ( $condition:expr ) => {{
        #[allow(unused_imports)]
        use $crate::output::{Category::*, Condition::*};
        $crate::output::Output::Debugger($condition, Default::default()).print_str("\n");
    }};
    ( $condition:expr, $category:expr, $fmt:literal $($tt:tt)* ) => {{
        #[allow(unused_imports)]
        use $crate::output::{Category::*, Condition::*};
        let s = format!(
            concat!($fmt, "\n")
            $($tt)*
        );
        $crate::output::Output::Debugger($condition, $category).print_str(&s);
    }};
}

/// Where text goes: program results on stdout, debugger chatter on stderr.
#[derive(Clone, Copy, Debug)]
pub enum Output {
    Normal,
    Debugger(Condition, Category),
}

/// Whether debugger text survives `--minimal`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Condition {
    Always,
    Sometimes,
}

/// Colour of debugger text.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Category {
    #[default]
    Normal,
    Info,
    Warning,
    Error,
    Special,
}

struct Decolored<'a> {
    chars: Chars<'a>,
}

impl Output {
    thread_local! {
        static IS_LINE_START: RefCell<bool> = const { RefCell::new(true) };
        static IS_MINIMAL: RefCell<bool> = const { RefCell::new(false) };
    }

    pub fn set_line_start(new_value: bool) -> bool {
        Self::IS_LINE_START.with(|value| value.replace(new_value))
    }
    /// Private. Use [`Output::start_new_line`].
    fn is_line_start() -> bool {
        Self::IS_LINE_START.with(|value| *value.borrow())
    }
    pub fn set_minimal(new_value: bool) -> bool {
        Self::IS_MINIMAL.with(|value| value.replace(new_value))
    }
    pub fn is_minimal() -> bool {
        Self::IS_MINIMAL.with(|value| *value.borrow())
    }

    fn set_line_start_from_str(string: &str) {
        if let Some(ch) = Decolored::new(string).last() {
            Output::set_line_start(ch == '\n');
        }
    }

    pub fn print_str(&self, string: &str) {
        match self {
            Self::Normal => {
                if Self::is_minimal() {
                    print!("{}", decolor(string));
                } else {
                    print!("{}", string);
                }
            }
            Self::Debugger(condition, category) => match (Self::is_minimal(), condition) {
                (false, _) => eprint!("{}", category.paint(string)),
                // Always remove color if `--minimal`
                (true, Condition::Always) => eprint!("{}", decolor(string)),
                (true, Condition::Sometimes) => return,
            },
        }
        Self::set_line_start_from_str(string);
    }

    pub fn start_new_line(&self) {
        if !Self::is_line_start() {
            self.print_str("\n");
        }
    }

    fn print_heading(&self, heading: &str, color: (u8, u8, u8)) {
        // Headings are decoration only
        if Self::is_minimal() {
            return;
        }
        let (r, g, b) = color;
        self.print_str(&format!("{}\n", heading.truecolor(r, g, b)));
    }

    /// Four registers per line, decimal and hex.
    pub fn print_registers(&self, state: &RunState) {
        self.print_heading("--- printing contents of registers ---", BLUE);
        for row in Register::ALL.chunks(4) {
            let mut line = String::new();
            for (i, reg) in row.iter().enumerate() {
                if i > 0 {
                    line.push_str("    ");
                }
                let value = state.reg(*reg);
                let _ = write!(line, "{:<4}: {:>6} {:>6}", reg.to_string(), value, format!("{value:#x}"));
            }
            self.print_str(&format!("{line}\n"));
        }
    }

    /// One register per line, decimal, hex and signed.
    pub fn print_registers_extended(&self, state: &RunState) {
        self.print_heading("--- printing contents of registers ---", BLUE);
        for reg in Register::ALL {
            let value = state.reg(reg);
            self.print_str(&format!(
                "{:<4}: {:>6}  {:>6}  {:>6}\n",
                reg.to_string(),
                value,
                format!("{value:#x}"),
                value as i16
            ));
        }
    }

    pub fn print_flags(&self, state: &RunState) {
        self.print_heading("--- printing flags ---", BLUE);
        let line = Flag::ALL
            .iter()
            .map(|flag| format!("{flag}: {}", state.flag(*flag) as u8))
            .collect::<Vec<_>>()
            .join("   ");
        self.print_str(&format!("{line}\n"));
    }

    /// Registers and flags that differ from `before`.
    ///
    /// PC is only reported when it moved somewhere other than the next instruction.
    pub fn print_changes(&self, before: &[u16; 16], state: &RunState) {
        let old_pc = before[Register::Pc as usize];
        let pc_jumped = state.pc() != old_pc && state.pc() != old_pc.wrapping_add(2);
        let changed: Vec<Register> = Register::ALL
            .into_iter()
            .filter(|reg| match reg {
                Register::Pc => pc_jumped,
                Register::Fl => false,
                reg => state.reg(*reg) != before[*reg as usize],
            })
            .collect();
        if !changed.is_empty() {
            self.print_heading("--- Registers changed ---", YELLOW);
            for reg in changed {
                let value = state.reg(reg);
                self.print_str(&format!("  {reg}: {value} (0x{value:X})\n"));
            }
        }

        let old_flags = before[Register::Fl as usize];
        let changed: Vec<Flag> = Flag::ALL
            .into_iter()
            .filter(|flag| (old_flags & flag.mask() != 0) != state.flag(*flag))
            .collect();
        if !changed.is_empty() {
            self.print_heading("--- Flags changed ---", ORANGE);
            for flag in changed {
                self.print_str(&format!(
                    "  {flag} flag changed to {}\n",
                    state.flag(flag) as u8
                ));
            }
        }
    }
}

const BLUE: (u8, u8, u8) = (0x5F, 0x87, 0xFF);
const YELLOW: (u8, u8, u8) = (0xFF, 0xD7, 0x00);
const ORANGE: (u8, u8, u8) = (0xFF, 0xAF, 0x00);

impl Category {
    fn paint(&self, string: &str) -> String {
        match self {
            Category::Normal => string.to_string(),
            Category::Info => string.blue().to_string(),
            Category::Warning => string.yellow().to_string(),
            Category::Error => string.red().to_string(),
            Category::Special => string.cyan().to_string(),
        }
    }
}

impl<'a> Decolored<'a> {
    pub fn new(string: &'a str) -> Self {
        Self {
            chars: string.chars(),
        }
    }
}

impl Iterator for Decolored<'_> {
    type Item = char;
    fn next(&mut self) -> Option<Self::Item> {
        while let Some(ch) = self.chars.next() {
            // Skip everything between '\x1b' and 'm' (inclusive)
            if ch == '\x1b' {
                while self.chars.next().is_some_and(|ch| ch != 'm') {}
                continue;
            }
            return Some(ch);
        }
        None
    }
}

fn decolor(string: &str) -> String {
    Decolored::new(string).collect()
}
