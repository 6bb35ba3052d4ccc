//! Binary words back to assembly text.
//!
//! Decoding goes through the same format table as the assembler, so every word that
//! disassembles also assembles back to itself (with padding bits cleared).

use std::fmt;

use crate::{
    air::{AirStmt, ImmediateOrReg, Imm8, Operands},
    isa::{self, field, Format},
    symbol::Register,
};

/// Result of disassembling a single word.
#[derive(Clone, PartialEq, Eq, Debug)]
pub enum Disassembly {
    Instr(AirStmt),
    /// Word matches no opcode prefix
    Unknown(u16),
}

impl Disassembly {
    pub fn is_known(&self) -> bool {
        matches!(self, Disassembly::Instr(_))
    }
}

impl fmt::Display for Disassembly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Disassembly::Instr(stmt) => write!(f, "{stmt}"),
            Disassembly::Unknown(_) => f.write_str("Unknown instruction"),
        }
    }
}

/// Malformed textual word.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum DisasmError {
    /// Binary strings need exactly 16 digits, hex strings 1 to 4
    BadLength(usize),
    BadCharacter(char),
}

impl fmt::Display for DisasmError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DisasmError::BadLength(len) => {
                write!(f, "Invalid code length of {len}. Expected 16 bits.")
            }
            DisasmError::BadCharacter(ch) => write!(f, "Invalid character `{ch}` in code"),
        }
    }
}

impl std::error::Error for DisasmError {}

pub fn disassemble(word: u16) -> Disassembly {
    let Some(op) = isa::decode(word) else {
        return Disassembly::Unknown(word);
    };
    let reg = |lo| Register::from_code(field(word, lo, 4));
    let operands = match op.format {
        Format::Arith => {
            let src = if field(word, 10, 1) != 0 {
                ImmediateOrReg::Imm6(field(word, 0, 6) as u8)
            } else {
                ImmediateOrReg::Reg(reg(0))
            };
            Operands::RegOrImm { dest: reg(6), src }
        }
        Format::Logic | Format::Move => Operands::RegReg {
            dest: reg(4),
            src: reg(0),
        },
        Format::Unary => Operands::Reg { reg: reg(4) },
        Format::RegOnly => Operands::Reg { reg: reg(0) },
        Format::RegImm => Operands::RegImm {
            reg: reg(8),
            imm: Imm8::Value(word as u8),
        },
        Format::Offset => Operands::Imm {
            imm: Imm8::Value(word as u8),
        },
        Format::Bare => Operands::None,
    };
    Disassembly::Instr(AirStmt::new(op.kind, operands))
}

/// Parse a `0x` hex or 16-digit binary string and disassemble it.
pub fn disassemble_str(code: &str) -> Result<Disassembly, DisasmError> {
    let code = code.trim();
    let (digits, radix, max_len) = match code.strip_prefix("0x").or_else(|| code.strip_prefix("0X")) {
        Some(hex) => (hex, 16, 4),
        None => (code, 2, 16),
    };
    if let Some(ch) = digits.chars().find(|ch| !ch.is_digit(radix)) {
        return Err(DisasmError::BadCharacter(ch));
    }
    let len = digits.len();
    if (radix == 2 && len != max_len) || (radix == 16 && !(1..=max_len).contains(&len)) {
        return Err(DisasmError::BadLength(len));
    }
    let word = u16::from_str_radix(digits, radix).map_err(|_| DisasmError::BadLength(len))?;
    Ok(disassemble(word))
}

pub fn disassemble_program(words: &[u16]) -> Vec<String> {
    words.iter().map(|word| disassemble(*word).to_string()).collect()
}

/// One line of output per non-blank input line, with `Error: ...` for lines that do not
/// parse.
pub fn disassemble_lines(text: &str) -> Vec<String> {
    text.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| match disassemble_str(line) {
            Ok(dis) => dis.to_string(),
            Err(e) => format!("Error: {e}"),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assemble,
        isa::OPCODES,
        runtime::{Fault, RunState},
        symbol::Register,
    };

    fn dis(word: u16) -> String {
        disassemble(word).to_string()
    }

    #[test]
    fn canonical_forms() {
        assert_eq!(dis(0b10000_1_0000_000101), "ADD R1, #5");
        assert_eq!(dis(0b10000_0_0000_000001), "ADD R1, R2");
        assert_eq!(dis(0b10010_1_1101_111110), "SUB SP, #-2");
        assert_eq!(dis(0x9A00), "NOT R1");
        assert_eq!(dis(0x98BC), "AND IO, LR");
        assert_eq!(dis(0x20FE), "LB R1, #-2");
        assert_eq!(dis(0x4B7F), "MVL IO, #127");
        assert_eq!(dis(0x1001), "MV R1, R2");
        assert_eq!(dis(0xC000), "SET R1");
        assert_eq!(dis(0xC03F), "POP FL");
        assert_eq!(dis(0xC010), "RET");
        assert_eq!(dis(0x0000), "NOP");
        assert_eq!(dis(0xC104), "CALL #4");
        assert_eq!(dis(0xE1FC), "BO.Z #-4");
        assert_eq!(dis(0xF680), "BA.P #-128");
        assert_eq!(dis(0xA000), "Unknown instruction");
        assert_eq!(dis(0xE7FF), "Unknown instruction");
    }

    #[test]
    fn padding_bits_ignored() {
        // Bits 4-5 of a register-form ADD
        assert_eq!(dis(0b10000_0_0000_110001), "ADD R1, R2");
        // High nibble of MV
        assert_eq!(dis(0x1F01), "MV R1, R2");
        assert_eq!(dis(0x9A0F), "NOT R1");
        assert_eq!(dis(0x0005), "NOP");
    }

    #[test]
    fn assembles_back() {
        for op in &OPCODES {
            let text = match op.format {
                Format::Arith => format!("{} R3, #-7", op.kind),
                Format::Logic => format!("{} R2, SP", op.kind),
                Format::Move => format!("{} PC, R11", op.kind),
                Format::Unary => format!("{} R4", op.kind),
                Format::RegOnly => format!("{} LR", op.kind),
                Format::RegImm => format!("{} IO, #-2", op.kind),
                Format::Offset => format!("{} #-4", op.kind),
                Format::Bare => op.kind.to_string(),
            };
            let words = assemble(&text).unwrap();
            assert_eq!(words.len(), 1);
            assert_eq!(dis(words[0]), text);
        }
        let words = assemble("ADC R10, R16").unwrap();
        assert_eq!(dis(words[0]), "ADC R10, FL");
    }

    #[test]
    fn every_known_word_reassembles() {
        for word in 0..=u16::MAX {
            if let Disassembly::Instr(stmt) = disassemble(word) {
                let text = stmt.to_string();
                let words = assemble(&text).unwrap();
                assert_eq!(words, vec![stmt.emit().unwrap()], "{text}");
            }
        }
    }

    #[test]
    fn cpu_agrees_on_illegal_words() {
        let mut state = RunState::new();
        for word in 0..=u16::MAX {
            state.set_reg(Register::Pc, 0);
            state.set_reg(Register::Io, 0x4000);
            state.set_reg(Register::Lr, 0x4000);
            state.write_word(0, word).unwrap();
            let illegal = matches!(state.step(), Err(Fault::IllegalInstruction { .. }));
            assert_eq!(illegal, !disassemble(word).is_known(), "{word:#06X}");
        }
    }

    #[test]
    fn from_strings() {
        assert_eq!(
            disassemble_str("0100001111111111").unwrap().to_string(),
            "MVL R4, #-1"
        );
        assert_eq!(disassemble_str("0xC010").unwrap().to_string(), "RET");
        assert_eq!(disassemble_str(" 0x0 ").unwrap().to_string(), "NOP");
        assert_eq!(disassemble_str("0101"), Err(DisasmError::BadLength(4)));
        assert_eq!(disassemble_str("0x12345"), Err(DisasmError::BadLength(5)));
        assert_eq!(disassemble_str("0x"), Err(DisasmError::BadLength(0)));
        assert_eq!(
            disassemble_str("010000111111111a"),
            Err(DisasmError::BadCharacter('a'))
        );
        assert_eq!(disassemble_str("0xG0"), Err(DisasmError::BadCharacter('G')));
    }

    #[test]
    fn lines() {
        let out = disassemble_lines("1100000000010000\n\n0101\n1010000000000000\n");
        assert_eq!(
            out,
            vec![
                "RET".to_string(),
                "Error: Invalid code length of 4. Expected 16 bits.".to_string(),
                "Unknown instruction".to_string(),
            ]
        );
        assert_eq!(disassemble_program(&[0xC010, 0x0000]), vec!["RET", "NOP"]);
    }
}
