use std::{fmt, ops::Range, str::FromStr};

use fxhash::FxBuildHasher;
use indexmap::IndexMap;
use miette::SourceSpan;

/// Insertion-ordered map used for label tables.
pub type FxMap<K, V> = IndexMap<K, V, FxBuildHasher>;

/// Location within source
#[derive(Clone, Copy, PartialEq, Eq, Default, Hash, Debug)]
pub struct Span {
    offs: SrcOffset,
    len: usize,
}

impl Span {
    pub fn new(offs: SrcOffset, len: usize) -> Self {
        Span { offs, len }
    }

    pub fn dummy() -> Self {
        Span {
            offs: SrcOffset(0),
            len: 0,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn offs(&self) -> usize {
        self.offs.0
    }

    pub fn end(&self) -> usize {
        self.offs.0 + self.len
    }

    /// Smallest span covering both `self` and `other`.
    pub fn join(&self, other: Span) -> Span {
        let start = self.offs().min(other.offs());
        let end = self.end().max(other.end());
        Span::new(SrcOffset(start), end - start)
    }
}

impl From<Span> for SourceSpan {
    fn from(value: Span) -> Self {
        SourceSpan::new(value.offs().into(), value.len())
    }
}

impl From<Span> for Range<usize> {
    fn from(value: Span) -> Self {
        value.offs()..value.end()
    }
}

/// Used to refer to offsets from the start of a source file.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default, Hash, Debug)]
pub struct SrcOffset(pub usize);

/// Represents the CPU registers.
///
/// Discriminants are the 4-bit register codes used in instruction words.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
pub enum Register {
    R1 = 0,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    R9,
    R10,
    R11,
    /// Base address for memory-relative loads, stores, calls and absolute branches.
    Io,
    /// Link register, holds the return address after `CALL`.
    Lr,
    /// Stack pointer.
    Sp,
    /// Program counter.
    Pc,
    /// Flags register. Only the low 5 bits are meaningful.
    Fl,
}

impl Register {
    pub const ALL: [Register; 16] = [
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
        Register::R9,
        Register::R10,
        Register::R11,
        Register::Io,
        Register::Lr,
        Register::Sp,
        Register::Pc,
        Register::Fl,
    ];

    /// Register for the low 4 bits of `code`.
    pub fn from_code(code: u16) -> Register {
        Self::ALL[(code & 0xF) as usize]
    }

    pub fn code(self) -> u16 {
        self as u16
    }
}

impl FromStr for Register {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "IO" => return Ok(Register::Io),
            "LR" => return Ok(Register::Lr),
            "SP" => return Ok(Register::Sp),
            "PC" => return Ok(Register::Pc),
            "FL" => return Ok(Register::Fl),
            _ => (),
        }
        let num = upper.strip_prefix('R').ok_or(())?;
        // Reject `R01` and friends
        if num.starts_with('0') {
            return Err(());
        }
        match num.parse::<usize>() {
            Ok(n @ 1..=16) => Ok(Self::ALL[n - 1]),
            _ => Err(()),
        }
    }
}

impl fmt::Display for Register {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Register::Io => write!(f, "IO"),
            Register::Lr => write!(f, "LR"),
            Register::Sp => write!(f, "SP"),
            Register::Pc => write!(f, "PC"),
            Register::Fl => write!(f, "FL"),
            reg => write!(f, "R{}", *reg as u16 + 1),
        }
    }
}

/// Bits of the `FL` register.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Flag {
    /// Result was zero
    Z = 0b00001,
    /// Bit 15 of result was set
    N = 0b00010,
    /// Neither Z nor N
    P = 0b00100,
    /// Carry/borrow
    C = 0b01000,
    /// Signed overflow
    V = 0b10000,
}

impl Flag {
    pub const ALL: [Flag; 5] = [Flag::Z, Flag::N, Flag::P, Flag::C, Flag::V];

    pub fn mask(self) -> u16 {
        self as u16
    }
}

impl fmt::Display for Flag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Flag::Z => "Z",
            Flag::N => "N",
            Flag::P => "P",
            Flag::C => "C",
            Flag::V => "V",
        };
        f.write_str(name)
    }
}

/// Branch condition, encoded in bits 8-10 of `BO*`/`BA*` instructions.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Condition {
    /// Unconditional
    Always = 0,
    Z,
    Nz,
    C,
    V,
    N,
    P,
}

impl Condition {
    pub const ALL: [Condition; 7] = [
        Condition::Always,
        Condition::Z,
        Condition::Nz,
        Condition::C,
        Condition::V,
        Condition::N,
        Condition::P,
    ];

    pub fn from_code(code: u16) -> Option<Condition> {
        Self::ALL.get(code as usize).copied()
    }

    /// Dotted mnemonic suffix, empty for `Always`.
    pub fn suffix(self) -> &'static str {
        match self {
            Condition::Always => "",
            Condition::Z => ".Z",
            Condition::Nz => ".NZ",
            Condition::C => ".C",
            Condition::V => ".V",
            Condition::N => ".N",
            Condition::P => ".P",
        }
    }

    fn from_suffix(suffix: &str) -> Option<Condition> {
        Self::ALL
            .into_iter()
            .find(|cond| cond.suffix().eq_ignore_ascii_case(suffix))
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum InstrKind {
    Add,
    Adc,
    Sub,
    And,
    Or,
    Not,
    Xor,
    Sll,
    Srl,
    Sra,
    Lb,
    Lw,
    Sb,
    Sw,
    Mv,
    Mvl,
    Mvh,
    Set,
    Push,
    Pop,
    Call,
    Ret,
    Nop,
    /// Branch by offset from PC
    Bo(Condition),
    /// Branch to IO + offset
    Ba(Condition),
}

impl FromStr for InstrKind {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        let (base, suffix) = match upper.find('.') {
            Some(idx) => upper.split_at(idx),
            None => (upper.as_str(), ""),
        };
        let kind = match base {
            "BO" => InstrKind::Bo(Condition::from_suffix(suffix).ok_or(())?),
            "BA" => InstrKind::Ba(Condition::from_suffix(suffix).ok_or(())?),
            _ if !suffix.is_empty() => return Err(()),
            "ADD" => InstrKind::Add,
            "ADC" => InstrKind::Adc,
            "SUB" => InstrKind::Sub,
            "AND" => InstrKind::And,
            "OR" => InstrKind::Or,
            "NOT" => InstrKind::Not,
            "XOR" => InstrKind::Xor,
            "SLL" => InstrKind::Sll,
            "SRL" => InstrKind::Srl,
            "SRA" => InstrKind::Sra,
            "LB" => InstrKind::Lb,
            "LW" => InstrKind::Lw,
            "SB" => InstrKind::Sb,
            "SW" => InstrKind::Sw,
            "MV" => InstrKind::Mv,
            "MVL" => InstrKind::Mvl,
            "MVH" => InstrKind::Mvh,
            "SET" => InstrKind::Set,
            "PUSH" => InstrKind::Push,
            "POP" => InstrKind::Pop,
            "CALL" => InstrKind::Call,
            "RET" => InstrKind::Ret,
            "NOP" => InstrKind::Nop,
            _ => return Err(()),
        };
        Ok(kind)
    }
}

impl fmt::Display for InstrKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InstrKind::Add => "ADD",
            InstrKind::Adc => "ADC",
            InstrKind::Sub => "SUB",
            InstrKind::And => "AND",
            InstrKind::Or => "OR",
            InstrKind::Not => "NOT",
            InstrKind::Xor => "XOR",
            InstrKind::Sll => "SLL",
            InstrKind::Srl => "SRL",
            InstrKind::Sra => "SRA",
            InstrKind::Lb => "LB",
            InstrKind::Lw => "LW",
            InstrKind::Sb => "SB",
            InstrKind::Sw => "SW",
            InstrKind::Mv => "MV",
            InstrKind::Mvl => "MVL",
            InstrKind::Mvh => "MVH",
            InstrKind::Set => "SET",
            InstrKind::Push => "PUSH",
            InstrKind::Pop => "POP",
            InstrKind::Call => "CALL",
            InstrKind::Ret => "RET",
            InstrKind::Nop => "NOP",
            InstrKind::Bo(cond) => return write!(f, "BO{}", cond.suffix()),
            InstrKind::Ba(cond) => return write!(f, "BA{}", cond.suffix()),
        };
        f.write_str(name)
    }
}

/// Composite instructions that expand to a short fixed sequence of words.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum MacroKind {
    /// `.MOV rA, #imm16 | label`
    Mov,
    /// `.CALL label`
    Call,
    /// `.JMP[.cond] label`
    Jmp(Condition),
}

impl FromStr for MacroKind {
    type Err = ();

    /// Expects the leading `.` to be stripped.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.to_ascii_uppercase();
        match upper.as_str() {
            "MOV" => Ok(MacroKind::Mov),
            "CALL" => Ok(MacroKind::Call),
            _ => {
                let suffix = upper.strip_prefix("JMP").ok_or(())?;
                Condition::from_suffix(suffix).map(MacroKind::Jmp).ok_or(())
            }
        }
    }
}
