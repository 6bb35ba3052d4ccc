use std::fmt;

use miette::Result;

use crate::{
    error,
    isa::{self, s_ext, Format},
    symbol::{FxMap, InstrKind, Register, Span},
};

/// Words that fit in the 16-bit byte address space.
const MAX_WORDS: usize = 0x8000;

/// Assembly intermediate representation, contains the emitted statements and the label table
pub struct Air {
    /// Source the statements were parsed from, for diagnostics
    src: String,
    /// Label name -> byte address
    labels: FxMap<String, u16>,
    ast: Vec<AsmLine>,
}

impl Air {
    pub fn new(src: &str) -> Self {
        Air {
            src: src.to_owned(),
            labels: FxMap::default(),
            ast: Vec::new(),
        }
    }

    /// Byte address of the next word to be emitted.
    pub fn next_address(&self) -> u16 {
        debug_assert!(!self.is_full(), "address past end of memory");
        (self.ast.len() * 2) as u16
    }

    /// No further word fits in the address space.
    pub fn is_full(&self) -> bool {
        self.ast.len() >= MAX_WORDS
    }

    /// Record a label at the next address. Returns `false` if the label already exists.
    pub fn declare_label(&mut self, name: &str) -> bool {
        if self.labels.contains_key(name) {
            return false;
        }
        let address = self.next_address();
        self.labels.insert(name.to_owned(), address);
        true
    }

    pub fn label_address(&self, name: &str) -> Option<u16> {
        self.labels.get(name).copied()
    }

    /// Append a word, failing once the program no longer fits in memory.
    pub fn add_stmt(&mut self, stmt: AirStmt, span: Span) -> Result<()> {
        if self.is_full() {
            return Err(error::parse_program_too_large(span, &self.src));
        }
        self.ast.push(AsmLine { stmt, span });
        Ok(())
    }

    /// Substitute label addresses into every placeholder operand.
    pub fn backpatch(&mut self) -> Result<()> {
        for (idx, line) in self.ast.iter_mut().enumerate() {
            let Some(imm) = line.stmt.imm_mut() else {
                continue;
            };
            let Imm8::Label { name, half } = imm else {
                continue;
            };
            let Some(target) = self.labels.get(name.as_str()).copied() else {
                return Err(error::patch_undeclared_label(line.span, &self.src, name));
            };
            let value = match half {
                Half::Low => target as u8,
                Half::High => (target >> 8) as u8,
                Half::Relative => {
                    // PC has already moved past the branch when the offset is applied
                    let next = (idx as i32 + 1) * 2;
                    let offset = target as i32 - next;
                    if !(-128..=127).contains(&offset) {
                        return Err(error::patch_branch_range(line.span, &self.src, offset));
                    }
                    offset as i8 as u8
                }
            };
            *imm = Imm8::Value(value);
        }
        Ok(())
    }

    /// Binary words for every statement. Requires `backpatch` to have run.
    pub fn emit(&self) -> Result<Vec<u16>> {
        self.ast.iter().map(|line| line.stmt.emit()).collect()
    }

    pub fn get(&self, idx: usize) -> &AirStmt {
        &self.ast[idx].stmt
    }

    pub fn len(&self) -> usize {
        self.ast.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ast.is_empty()
    }
}

/// Single emitted word together with the source that produced it.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AsmLine {
    pub stmt: AirStmt,
    /// Covers the whole statement, or the macro invocation it was expanded from
    pub span: Span,
}

/// Single machine instruction with parsed operands.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct AirStmt {
    pub kind: InstrKind,
    pub operands: Operands,
}

impl AirStmt {
    pub fn new(kind: InstrKind, operands: Operands) -> Self {
        AirStmt { kind, operands }
    }

    fn imm_mut(&mut self) -> Option<&mut Imm8> {
        match &mut self.operands {
            Operands::RegImm { imm, .. } | Operands::Imm { imm } => Some(imm),
            _ => None,
        }
    }

    /// Encode into a 16-bit word.
    pub fn emit(&self) -> Result<u16> {
        let op = isa::opcode(self.kind);
        let operands = match (op.format, &self.operands) {
            (Format::Arith, Operands::RegOrImm { dest, src }) => {
                let src = match src {
                    ImmediateOrReg::Reg(reg) => reg.code(),
                    ImmediateOrReg::Imm6(val) => 1 << 10 | (*val as u16 & 0x3F),
                };
                dest.code() << 6 | src
            }
            (Format::Logic, Operands::RegReg { dest, src })
            | (Format::Move, Operands::RegReg { dest, src }) => dest.code() << 4 | src.code(),
            (Format::Unary, Operands::Reg { reg }) => reg.code() << 4,
            (Format::RegOnly, Operands::Reg { reg }) => reg.code(),
            (Format::RegImm, Operands::RegImm { reg, imm }) => reg.code() << 8 | imm.value()?,
            (Format::Offset, Operands::Imm { imm }) => imm.value()?,
            (Format::Bare, Operands::None) => 0,
            (format, operands) => {
                miette::bail!("Operands {operands:?} do not fit the {format:?} layout of {}", self.kind)
            }
        };
        Ok(op.bits() | operands)
    }
}

/// Canonical text, as accepted by the assembler.
impl fmt::Display for AirStmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = self.kind;
        match &self.operands {
            Operands::RegOrImm { dest, src } => write!(f, "{kind} {dest}, {src}"),
            Operands::RegReg { dest, src } => write!(f, "{kind} {dest}, {src}"),
            Operands::Reg { reg } => write!(f, "{kind} {reg}"),
            Operands::RegImm { reg, imm } => write!(f, "{kind} {reg}, {imm}"),
            Operands::Imm { imm } => write!(f, "{kind} {imm}"),
            Operands::None => write!(f, "{kind}"),
        }
    }
}

#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Operands {
    /// `ADD`/`ADC`/`SUB`
    RegOrImm { dest: Register, src: ImmediateOrReg },
    /// Logic ops and `MV`
    RegReg { dest: Register, src: Register },
    /// `NOT`, `SET`, `PUSH`, `POP`
    Reg { reg: Register },
    /// Loads, stores, `MVL`, `MVH`
    RegImm { reg: Register, imm: Imm8 },
    /// `CALL` and branches
    Imm { imm: Imm8 },
    /// `RET`, `NOP`
    None,
}

// add/adc/sub support an immediate value
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum ImmediateOrReg {
    Reg(Register),
    /// Raw 6-bit two's complement field
    Imm6(u8),
}

impl fmt::Display for ImmediateOrReg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImmediateOrReg::Reg(reg) => write!(f, "{reg}"),
            ImmediateOrReg::Imm6(val) => write!(f, "#{}", s_ext(*val as u16, 6) as i16),
        }
    }
}

/// 8-bit immediate field, possibly still waiting on a label address.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Imm8 {
    Value(u8),
    Label { name: String, half: Half },
}

impl Imm8 {
    pub fn label(name: &str, half: Half) -> Self {
        Imm8::Label {
            name: name.to_owned(),
            half,
        }
    }

    fn value(&self) -> Result<u16> {
        match self {
            Imm8::Value(val) => Ok(*val as u16),
            Imm8::Label { name, .. } => miette::bail!("Label `{name}` was never backpatched"),
        }
    }
}

impl fmt::Display for Imm8 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Imm8::Value(val) => write!(f, "#{}", *val as i8),
            Imm8::Label { name, half } => match half {
                Half::Low => write!(f, "@{name}_l"),
                Half::High => write!(f, "@{name}_h"),
                Half::Relative => write!(f, "{name}"),
            },
        }
    }
}

/// Which part of a label's address a placeholder wants.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Half {
    Low,
    High,
    /// Offset from the address after the branch
    Relative,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbol::Condition;

    fn stmt(kind: InstrKind, operands: Operands) -> AirStmt {
        AirStmt::new(kind, operands)
    }

    #[test]
    fn emit_layouts() {
        let add_imm = stmt(
            InstrKind::Add,
            Operands::RegOrImm {
                dest: Register::R1,
                src: ImmediateOrReg::Imm6(5),
            },
        );
        assert_eq!(add_imm.emit().unwrap(), 0b10000_1_0000_000101);

        let sub_reg = stmt(
            InstrKind::Sub,
            Operands::RegOrImm {
                dest: Register::R3,
                src: ImmediateOrReg::Reg(Register::Io),
            },
        );
        assert_eq!(sub_reg.emit().unwrap(), 0b10010_0_0010_001011);

        let mv = stmt(
            InstrKind::Mv,
            Operands::RegReg {
                dest: Register::R2,
                src: Register::Sp,
            },
        );
        assert_eq!(mv.emit().unwrap(), 0x101D);

        let not = stmt(InstrKind::Not, Operands::Reg { reg: Register::R4 });
        assert_eq!(not.emit().unwrap(), 0x9A30);

        let sw = stmt(
            InstrKind::Sw,
            Operands::RegImm {
                reg: Register::R1,
                imm: Imm8::Value(0xFE),
            },
        );
        assert_eq!(sw.emit().unwrap(), 0x70FE);

        let ret = stmt(InstrKind::Ret, Operands::None);
        assert_eq!(ret.emit().unwrap(), 0xC010);

        let nop = stmt(InstrKind::Nop, Operands::None);
        assert_eq!(nop.emit().unwrap(), 0x0000);

        let ba = stmt(
            InstrKind::Ba(Condition::P),
            Operands::Imm {
                imm: Imm8::Value(4),
            },
        );
        assert_eq!(ba.emit().unwrap(), 0xF604);
    }

    #[test]
    fn canonical_text() {
        let sub = stmt(
            InstrKind::Sub,
            Operands::RegOrImm {
                dest: Register::Sp,
                src: ImmediateOrReg::Imm6(0x3E),
            },
        );
        assert_eq!(sub.to_string(), "SUB SP, #-2");

        let call = stmt(
            InstrKind::Call,
            Operands::Imm {
                imm: Imm8::label("print", Half::High),
            },
        );
        assert_eq!(call.to_string(), "CALL @print_h");

        let bo = stmt(
            InstrKind::Bo(Condition::Nz),
            Operands::Imm {
                imm: Imm8::label("loop", Half::Relative),
            },
        );
        assert_eq!(bo.to_string(), "BO.NZ loop");

        assert_eq!(stmt(InstrKind::Nop, Operands::None).to_string(), "NOP");
    }

    #[test]
    fn emit_rejects_mismatched_operands() {
        let bad = stmt(InstrKind::Ret, Operands::Reg { reg: Register::R1 });
        assert!(bad.emit().is_err());
    }

    #[test]
    fn emit_requires_backpatch() {
        let call = stmt(
            InstrKind::Call,
            Operands::Imm {
                imm: Imm8::label("sub", Half::Low),
            },
        );
        assert!(call.emit().is_err());
    }

    #[test]
    fn backpatch_halves_and_offsets() {
        let mut air = Air::new("");
        air.add_stmt(
            stmt(
                InstrKind::Mvl,
                Operands::RegImm {
                    reg: Register::Io,
                    imm: Imm8::label("end", Half::Low),
                },
            ),
            Span::dummy(),
        )
        .unwrap();
        air.add_stmt(
            stmt(
                InstrKind::Bo(Condition::Always),
                Operands::Imm {
                    imm: Imm8::label("end", Half::Relative),
                },
            ),
            Span::dummy(),
        )
        .unwrap();
        air.add_stmt(stmt(InstrKind::Nop, Operands::None), Span::dummy())
            .unwrap();
        assert!(air.declare_label("end"));
        assert!(!air.declare_label("end"));
        air.add_stmt(stmt(InstrKind::Ret, Operands::None), Span::dummy())
            .unwrap();

        air.backpatch().unwrap();
        assert_eq!(air.label_address("end"), Some(6));
        assert_eq!(air.emit().unwrap(), vec![0x4B06, 0xE002, 0x0000, 0xC010]);
    }

    #[test]
    fn backpatch_missing_label() {
        let mut air = Air::new("CALL @nowhere_l");
        air.add_stmt(
            stmt(
                InstrKind::Call,
                Operands::Imm {
                    imm: Imm8::label("nowhere", Half::Low),
                },
            ),
            Span::dummy(),
        )
        .unwrap();
        let err = air.backpatch().unwrap_err();
        assert_eq!(
            err.code().map(|code| code.to_string()).as_deref(),
            Some("asm::undeclared_label")
        );
    }

    #[test]
    fn address_space_limit() {
        let mut air = Air::new("NOP");
        for _ in 0..MAX_WORDS {
            air.add_stmt(stmt(InstrKind::Nop, Operands::None), Span::dummy())
                .unwrap();
        }
        assert!(air.is_full());
        let err = air
            .add_stmt(stmt(InstrKind::Nop, Operands::None), Span::dummy())
            .unwrap_err();
        assert_eq!(
            err.code().map(|code| code.to_string()).as_deref(),
            Some("asm::program_too_large")
        );
    }
}
