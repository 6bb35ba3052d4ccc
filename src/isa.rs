//! Instruction format table.
//!
//! Every instruction class is identified by a fixed leading bit pattern of 4, 5, 8, 12 or 13
//! bits. The assembler, the disassembler and the runtime all read their bit layouts from here.

use crate::symbol::{Condition, InstrKind};

/// Operand layout following the opcode prefix, MSB first.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum Format {
    /// `ADD`/`ADC`/`SUB`: imm flag (bit 10), dest (bits 6-9), `00`+reg or imm6 (bits 0-5)
    Arith,
    /// `AND`/`OR`/...: dest (bits 4-7), src (bits 0-3)
    Logic,
    /// `NOT`: dest (bits 4-7), zero padding
    Unary,
    /// `LB`/`LW`/`SB`/`SW`/`MVL`/`MVH`: reg (bits 8-11), imm8 (bits 0-7)
    RegImm,
    /// `MV`: zero padding (bits 8-11), dest (bits 4-7), src (bits 0-3)
    Move,
    /// `SET`/`PUSH`/`POP`: reg (bits 0-3)
    RegOnly,
    /// `RET`/`NOP`: zero padding
    Bare,
    /// `CALL`/`BO*`/`BA*`: imm8 (bits 0-7)
    Offset,
}

/// Single entry of the format table.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Opcode {
    pub kind: InstrKind,
    /// Prefix value, right-aligned
    pub prefix: u16,
    /// Prefix length in bits
    pub width: u8,
    pub format: Format,
}

impl Opcode {
    const fn new(kind: InstrKind, prefix: u16, width: u8, format: Format) -> Self {
        Opcode {
            kind,
            prefix,
            width,
            format,
        }
    }

    /// Prefix shifted into its position in a 16-bit word.
    pub const fn bits(&self) -> u16 {
        self.prefix << (16 - self.width)
    }

    pub const fn matches(&self, word: u16) -> bool {
        word >> (16 - self.width) == self.prefix
    }
}

use Format::*;
use InstrKind::*;

/// The format table, ordered longest prefix first.
pub const OPCODES: [Opcode; 37] = [
    Opcode::new(Nop, 0b0000000000000, 13, Bare),
    Opcode::new(Set, 0b110000000000, 12, RegOnly),
    Opcode::new(Ret, 0b110000000001, 12, Bare),
    Opcode::new(Push, 0b110000000010, 12, RegOnly),
    Opcode::new(Pop, 0b110000000011, 12, RegOnly),
    Opcode::new(And, 0b10011000, 8, Logic),
    Opcode::new(Or, 0b10011001, 8, Logic),
    Opcode::new(Not, 0b10011010, 8, Unary),
    Opcode::new(Xor, 0b10011011, 8, Logic),
    Opcode::new(Sll, 0b10011100, 8, Logic),
    Opcode::new(Srl, 0b10011101, 8, Logic),
    Opcode::new(Sra, 0b10011110, 8, Logic),
    Opcode::new(Call, 0b11000001, 8, Offset),
    Opcode::new(Bo(Condition::Always), 0b11100000, 8, Offset),
    Opcode::new(Bo(Condition::Z), 0b11100001, 8, Offset),
    Opcode::new(Bo(Condition::Nz), 0b11100010, 8, Offset),
    Opcode::new(Bo(Condition::C), 0b11100011, 8, Offset),
    Opcode::new(Bo(Condition::V), 0b11100100, 8, Offset),
    Opcode::new(Bo(Condition::N), 0b11100101, 8, Offset),
    Opcode::new(Bo(Condition::P), 0b11100110, 8, Offset),
    Opcode::new(Ba(Condition::Always), 0b11110000, 8, Offset),
    Opcode::new(Ba(Condition::Z), 0b11110001, 8, Offset),
    Opcode::new(Ba(Condition::Nz), 0b11110010, 8, Offset),
    Opcode::new(Ba(Condition::C), 0b11110011, 8, Offset),
    Opcode::new(Ba(Condition::V), 0b11110100, 8, Offset),
    Opcode::new(Ba(Condition::N), 0b11110101, 8, Offset),
    Opcode::new(Ba(Condition::P), 0b11110110, 8, Offset),
    Opcode::new(Add, 0b10000, 5, Arith),
    Opcode::new(Adc, 0b10001, 5, Arith),
    Opcode::new(Sub, 0b10010, 5, Arith),
    Opcode::new(Mv, 0b0001, 4, Move),
    Opcode::new(Lb, 0b0010, 4, RegImm),
    Opcode::new(Lw, 0b0011, 4, RegImm),
    Opcode::new(Mvl, 0b0100, 4, RegImm),
    Opcode::new(Mvh, 0b0101, 4, RegImm),
    Opcode::new(Sb, 0b0110, 4, RegImm),
    Opcode::new(Sw, 0b0111, 4, RegImm),
];

/// No two prefixes may overlap: comparing on the shorter of the two widths must differ.
const fn prefixes_disjoint(table: &[Opcode]) -> bool {
    let mut i = 0;
    while i < table.len() {
        let mut j = i + 1;
        while j < table.len() {
            let (a, b) = (&table[i], &table[j]);
            let width = if a.width < b.width { a.width } else { b.width };
            if a.bits() >> (16 - width) == b.bits() >> (16 - width) {
                return false;
            }
            j += 1;
        }
        i += 1;
    }
    true
}

const fn well_formed(table: &[Opcode]) -> bool {
    let mut i = 0;
    while i < table.len() {
        let op = &table[i];
        if op.width == 0 || op.width > 16 || (op.width < 16 && op.prefix >> op.width != 0) {
            return false;
        }
        if i > 0 && table[i - 1].width < op.width {
            return false;
        }
        i += 1;
    }
    true
}

const _: () = assert!(well_formed(&OPCODES), "malformed or unordered opcode table");
const _: () = assert!(prefixes_disjoint(&OPCODES), "overlapping opcode prefixes");

/// Table entry for an instruction kind.
pub fn opcode(kind: InstrKind) -> &'static Opcode {
    OPCODES
        .iter()
        .find(|op| op.kind == kind)
        .expect("every instruction kind has a table entry")
}

/// Table entry whose prefix matches `word`, checking longest prefixes first.
pub fn decode(word: u16) -> Option<&'static Opcode> {
    OPCODES.iter().find(|op| op.matches(word))
}

/// Extract `len` bits starting at bit `lo`.
#[inline]
pub fn field(word: u16, lo: u32, len: u32) -> u16 {
    (word >> lo) & ((1u16 << len) - 1)
}

/// Sign-extend the low `bits` bits of `val` to 16 bits.
#[inline]
pub fn s_ext(val: u16, bits: u32) -> u16 {
    debug_assert!(bits > 0 && bits < 16);
    let shift = 16 - bits;
    (((val << shift) as i16) >> shift) as u16
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn table_checks() {
        assert!(prefixes_disjoint(&OPCODES));
        assert!(well_formed(&OPCODES));

        let mut overlapping = OPCODES;
        // `SUB` prefix now shadows the logic group
        overlapping[29] = Opcode::new(Sub, 0b1001, 4, Arith);
        assert!(!prefixes_disjoint(&overlapping));
    }

    #[test]
    fn every_kind_roundtrips_through_table() {
        for op in &OPCODES {
            assert_eq!(opcode(op.kind), op);
            assert_eq!(decode(op.bits()), Some(op));
        }
    }

    #[test]
    fn decode_ignores_operand_bits() {
        assert_eq!(decode(0b1000_0100_0111_1111).map(|op| op.kind), Some(Add));
        assert_eq!(decode(0b1001_0000_0000_0000).map(|op| op.kind), Some(Sub));
        assert_eq!(decode(0b1001_1010_0011_0000).map(|op| op.kind), Some(Not));
        assert_eq!(decode(0x0007).map(|op| op.kind), Some(Nop));
        assert_eq!(decode(0xC01F).map(|op| op.kind), Some(Ret));
        assert_eq!(decode(0xC1FE).map(|op| op.kind), Some(Call));
    }

    #[test]
    fn decode_unknown() {
        assert_eq!(decode(0x0008), None);
        assert_eq!(decode(0xA000), None);
        assert_eq!(decode(0xB123), None);
        assert_eq!(decode(0xD000), None);
        // Condition 7
        assert_eq!(decode(0xE700), None);
        assert_eq!(decode(0xF700), None);
        // Logic sub-op 0xF
        assert_eq!(decode(0x9F00), None);
        // Control group sub-ops past POP
        assert_eq!(decode(0xC040), None);
    }

    #[test]
    fn sign_extension() {
        assert_eq!(s_ext(0x1F, 6), 31);
        assert_eq!(s_ext(0x20, 6), (-32i16) as u16);
        assert_eq!(s_ext(0x3F, 6), 0xFFFF);
        assert_eq!(s_ext(0x7F, 8), 127);
        assert_eq!(s_ext(0x80, 8), 0xFF80);
        assert_eq!(s_ext(0x1280, 8), 0xFF80);
    }
}
