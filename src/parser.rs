use std::{iter::Peekable, vec::IntoIter};

use miette::Result;

use crate::{
    air::{Air, AirStmt, Half, ImmediateOrReg, Imm8, Operands},
    error,
    isa::{self, Format},
    lexer::{tokenize, LiteralKind, Token, TokenKind},
    symbol::{InstrKind, MacroKind, Register, Span},
};

/// Transforms source text into AIR, one line at a time.
///
/// This is the first assembler pass: labels are recorded as they are declared, and every
/// instruction is lowered immediately. Operands referring to labels are left as placeholders
/// for [`Air::backpatch`].
pub struct AsmParser<'a> {
    /// Reference to the source file
    src: &'a str,
    /// Tokens of each non-empty line
    lines: Vec<Vec<Token>>,
    /// Assembly intermediate representation
    air: Air,
}

/// Iterator over the operand tokens of a single line.
struct Line {
    toks: Peekable<IntoIter<Token>>,
    /// Span of the whole line, for errors about missing operands
    span: Span,
}

impl<'a> AsmParser<'a> {
    pub fn new(src: &'a str) -> Result<Self> {
        let mut lines = Vec::new();
        let mut current = Vec::new();
        for tok in tokenize(src) {
            match tok.kind {
                TokenKind::Newline => {
                    if !current.is_empty() {
                        lines.push(std::mem::take(&mut current));
                    }
                }
                TokenKind::Unknown => return Err(error::lex_unknown(tok.span, src)),
                _ => current.push(tok),
            }
        }
        if !current.is_empty() {
            lines.push(current);
        }
        Ok(AsmParser {
            src,
            lines,
            air: Air::new(src),
        })
    }

    fn get_span(&self, span: Span) -> &'a str {
        &self.src[span.offs()..span.end()]
    }

    /// Create AIR out of the source lines
    pub fn parse(mut self) -> Result<Air> {
        let lines = std::mem::take(&mut self.lines);
        for toks in lines {
            let span = toks
                .iter()
                .fold(toks[0].span, |span, tok| span.join(tok.span));
            let mut line = Line {
                toks: toks.into_iter().peekable(),
                span,
            };
            self.parse_line(&mut line)?;
        }
        // Consume self to return AIR
        Ok(self.air)
    }

    fn parse_line(&mut self, line: &mut Line) -> Result<()> {
        // Add prefix label to label table if exists
        if let Some(label) = line.toks.next_if(|tok| tok.kind == TokenKind::Label) {
            let name = &self.get_span(label.span)[1..];
            if name.is_empty() {
                return Err(error::parse_bad_label_ref(label.span, self.src));
            }
            if self.air.is_full() {
                return Err(error::parse_program_too_large(label.span, self.src));
            }
            if !self.air.declare_label(name) {
                return Err(error::parse_duplicate_label(label.span, self.src));
            }
        }

        let Some(tok) = line.toks.next() else {
            // Label on its own line
            return Ok(());
        };
        let stmt_span = line.span.join(tok.span);
        match tok.kind {
            TokenKind::Ident => {
                let kind = self
                    .get_span(tok.span)
                    .parse::<InstrKind>()
                    .map_err(|_| error::parse_unknown_mnemonic(tok.span, self.src))?;
                let operands = self.parse_operands(kind, line)?;
                self.air.add_stmt(AirStmt::new(kind, operands), stmt_span)?;
            }
            TokenKind::Macro => {
                let kind = self.get_span(tok.span)[1..]
                    .parse::<MacroKind>()
                    .map_err(|_| error::parse_unknown_macro(tok.span, self.src))?;
                for stmt in self.parse_macro(kind, line)? {
                    self.air.add_stmt(stmt, stmt_span)?;
                }
            }
            // Lines should not start with these tokens
            unexpected => {
                return Err(error::parse_generic_unexpected(
                    tok.span,
                    self.src,
                    "instruction or macro",
                    unexpected,
                ))
            }
        }

        // Nothing may follow the operands
        match line.toks.next() {
            Some(extra) => Err(error::parse_generic_unexpected(
                extra.span,
                self.src,
                "end of line",
                extra.kind,
            )),
            None => Ok(()),
        }
    }

    /// Process several tokens to form valid instruction operands
    fn parse_operands(&self, kind: InstrKind, line: &mut Line) -> Result<Operands> {
        let operands = match isa::opcode(kind).format {
            Format::Arith => {
                let dest = self.expect_reg(line)?;
                let src = match line.toks.peek().map(|tok| tok.kind) {
                    Some(TokenKind::Lit(_)) => ImmediateOrReg::Imm6(self.expect_lit(line, 6)? as u8),
                    _ => ImmediateOrReg::Reg(self.expect_reg(line)?),
                };
                Operands::RegOrImm { dest, src }
            }
            Format::Logic | Format::Move => {
                let dest = self.expect_reg(line)?;
                let src = self.expect_reg(line)?;
                Operands::RegReg { dest, src }
            }
            Format::Unary | Format::RegOnly => Operands::Reg {
                reg: self.expect_reg(line)?,
            },
            Format::RegImm => {
                let reg = self.expect_reg(line)?;
                let imm = self.expect_imm8(line, false)?;
                Operands::RegImm { reg, imm }
            }
            Format::Offset => {
                let relative = matches!(kind, InstrKind::Bo(_));
                Operands::Imm {
                    imm: self.expect_imm8(line, relative)?,
                }
            }
            Format::Bare => Operands::None,
        };
        Ok(operands)
    }

    /// Expand a macro into its fixed instruction sequence
    fn parse_macro(&self, kind: MacroKind, line: &mut Line) -> Result<Vec<AirStmt>> {
        let load_io = |name: &str| {
            [
                AirStmt::new(
                    InstrKind::Mvl,
                    Operands::RegImm {
                        reg: Register::Io,
                        imm: Imm8::label(name, Half::Low),
                    },
                ),
                AirStmt::new(
                    InstrKind::Mvh,
                    Operands::RegImm {
                        reg: Register::Io,
                        imm: Imm8::label(name, Half::High),
                    },
                ),
            ]
        };
        let zero = Operands::Imm {
            imm: Imm8::Value(0),
        };

        let stmts = match kind {
            MacroKind::Mov => {
                let reg = self.expect_reg(line)?;
                let (low, high) = match line.toks.peek().map(|tok| tok.kind) {
                    Some(TokenKind::Lit(_)) => {
                        let val = self.expect_lit(line, 16)?;
                        (Imm8::Value(val as u8), Imm8::Value((val >> 8) as u8))
                    }
                    _ => {
                        let tok = self.expect_ident(line, "literal or label name")?;
                        let name = self.get_span(tok.span);
                        (Imm8::label(name, Half::Low), Imm8::label(name, Half::High))
                    }
                };
                vec![
                    AirStmt::new(InstrKind::Mvl, Operands::RegImm { reg, imm: low }),
                    AirStmt::new(InstrKind::Mvh, Operands::RegImm { reg, imm: high }),
                ]
            }
            MacroKind::Call => {
                let tok = self.expect_ident(line, "label name")?;
                let mut stmts = load_io(self.get_span(tok.span)).to_vec();
                stmts.push(AirStmt::new(InstrKind::Call, zero));
                stmts
            }
            MacroKind::Jmp(cond) => {
                let tok = self.expect_ident(line, "label name")?;
                let mut stmts = load_io(self.get_span(tok.span)).to_vec();
                stmts.push(AirStmt::new(InstrKind::Ba(cond), zero));
                stmts
            }
        };
        Ok(stmts)
    }

    fn expect_where(
        &self,
        line: &mut Line,
        mut check: impl FnMut(&TokenKind) -> bool,
        expected: &str,
    ) -> Result<Token> {
        match line.toks.next_if(|tok| check(&tok.kind)) {
            Some(tok) => Ok(tok),
            None => Err(self.unexpected(line, expected)),
        }
    }

    fn expect_ident(&self, line: &mut Line, expected: &str) -> Result<Token> {
        self.expect_where(line, |kind| *kind == TokenKind::Ident, expected)
    }

    fn expect_reg(&self, line: &mut Line) -> Result<Register> {
        let tok = self.expect_ident(line, "register")?;
        self.get_span(tok.span)
            .parse()
            .map_err(|_| error::parse_unknown_register(tok.span, self.src))
    }

    /// Literal that fits a `bits`-wide field, returned as the raw field bits.
    fn expect_lit(&self, line: &mut Line, bits: u32) -> Result<u16> {
        let tok = self.expect_where(line, |kind| matches!(kind, TokenKind::Lit(_)), "numeric literal")?;
        let TokenKind::Lit(lit_kind) = tok.kind else {
            unreachable!("checked by `expect_where`")
        };
        match parse_lit(&self.get_span(tok.span)[1..], lit_kind, bits) {
            Ok(val) => Ok(val),
            Err(LitError::Malformed) => Err(error::lex_invalid_lit(tok.span, self.src)),
            Err(LitError::OutOfRange) => Err(error::parse_lit_range(tok.span, self.src, bits)),
        }
    }

    /// 8-bit immediate, label byte reference, or (for relative branches) bare label name.
    fn expect_imm8(&self, line: &mut Line, relative: bool) -> Result<Imm8> {
        let expected = if relative {
            "numeric literal or label"
        } else {
            "numeric literal or label reference"
        };
        match line.toks.peek().map(|tok| tok.kind) {
            Some(TokenKind::Lit(_)) => Ok(Imm8::Value(self.expect_lit(line, 8)? as u8)),
            Some(TokenKind::Label) => {
                let tok = self.expect_where(line, |_| true, expected)?;
                let text = &self.get_span(tok.span)[1..];
                let (name, half) = match text.rsplit_once('_') {
                    Some((name, "l" | "L")) if !name.is_empty() => (name, Half::Low),
                    Some((name, "h" | "H")) if !name.is_empty() => (name, Half::High),
                    _ => return Err(error::parse_bad_label_ref(tok.span, self.src)),
                };
                Ok(Imm8::label(name, half))
            }
            Some(TokenKind::Ident) if relative => {
                let tok = self.expect_ident(line, expected)?;
                Ok(Imm8::label(self.get_span(tok.span), Half::Relative))
            }
            _ => Err(self.unexpected(line, expected)),
        }
    }

    /// Error for the next token of the line, or for a missing one.
    fn unexpected(&self, line: &mut Line, expected: &str) -> miette::Report {
        match line.toks.next() {
            Some(tok) => error::parse_generic_unexpected(tok.span, self.src, expected, tok.kind),
            None => error::parse_missing_operand(line.span, self.src, expected),
        }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
enum LitError {
    Malformed,
    OutOfRange,
}

/// Parse literal text (without `#`) into the raw bits of a `bits`-wide field.
///
/// Decimal values must fit the signed range of the field. Hex values are bit patterns and
/// must fit the field unsigned, unless negated, in which case the signed range applies.
fn parse_lit(text: &str, kind: LiteralKind, bits: u32) -> Result<u16, LitError> {
    let (negative, digits) = match text.as_bytes().first() {
        Some(b'-') => (true, &text[1..]),
        Some(b'+') => (false, &text[1..]),
        _ => (false, text),
    };
    let magnitude = match kind {
        LiteralKind::Hex => {
            let hex = digits
                .strip_prefix("0x")
                .or_else(|| digits.strip_prefix("0X"))
                .ok_or(LitError::Malformed)?;
            parse_digits(hex, 16)?
        }
        LiteralKind::Dec => parse_digits(digits, 10)?,
    };
    let value = if negative { -magnitude } else { magnitude };

    let min = -(1i64 << (bits - 1));
    let max = (1i64 << (bits - 1)) - 1;
    let in_range = match kind {
        LiteralKind::Hex if !negative => value < 1i64 << bits,
        _ => (min..=max).contains(&value),
    };
    if !in_range {
        return Err(LitError::OutOfRange);
    }
    let mask = ((1u32 << bits) - 1) as i64;
    Ok((value & mask) as u16)
}

fn parse_digits(digits: &str, radix: u32) -> Result<i64, LitError> {
    if digits.is_empty() || !digits.chars().all(|c| c.is_digit(radix)) {
        return Err(LitError::Malformed);
    }
    // Anything that overflows is certainly out of range for a 16-bit machine
    i64::from_str_radix(digits, radix).map_err(|_| LitError::OutOfRange)
}

/// Assemble source text into a backpatched intermediate representation.
pub fn assemble_air(src: &str) -> Result<Air> {
    let mut air = AsmParser::new(src)?.parse()?;
    air.backpatch()?;
    Ok(air)
}

/// Assemble source text into binary words.
pub fn assemble(src: &str) -> Result<Vec<u16>> {
    assemble_air(src)?.emit()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn code(src: &str) -> String {
        let err = assemble(src).unwrap_err();
        err.code()
            .map(|code| code.to_string())
            .unwrap_or_default()
    }

    #[test]
    fn lit_ranges() {
        assert_eq!(parse_lit("31", LiteralKind::Dec, 6), Ok(31));
        assert_eq!(parse_lit("-32", LiteralKind::Dec, 6), Ok(0b100000));
        assert_eq!(parse_lit("32", LiteralKind::Dec, 6), Err(LitError::OutOfRange));
        assert_eq!(parse_lit("-33", LiteralKind::Dec, 6), Err(LitError::OutOfRange));
        assert_eq!(parse_lit("127", LiteralKind::Dec, 8), Ok(0x7F));
        assert_eq!(parse_lit("-128", LiteralKind::Dec, 8), Ok(0x80));
        assert_eq!(parse_lit("128", LiteralKind::Dec, 8), Err(LitError::OutOfRange));
        assert_eq!(parse_lit("0xFF", LiteralKind::Hex, 8), Ok(0xFF));
        assert_eq!(parse_lit("0x100", LiteralKind::Hex, 8), Err(LitError::OutOfRange));
        assert_eq!(parse_lit("-0x80", LiteralKind::Hex, 8), Ok(0x80));
        assert_eq!(parse_lit("-0x81", LiteralKind::Hex, 8), Err(LitError::OutOfRange));
        assert_eq!(parse_lit("0x1234", LiteralKind::Hex, 16), Ok(0x1234));
        assert_eq!(parse_lit("12a", LiteralKind::Dec, 8), Err(LitError::Malformed));
        assert_eq!(parse_lit("0xZZ", LiteralKind::Hex, 8), Err(LitError::Malformed));
        assert_eq!(parse_lit("-", LiteralKind::Dec, 8), Err(LitError::Malformed));
        assert_eq!(
            parse_lit("99999999999999999999", LiteralKind::Dec, 8),
            Err(LitError::OutOfRange)
        );
    }

    #[test]
    fn imm6_boundaries() {
        assert!(assemble("ADD R1, #31").is_ok());
        assert!(assemble("ADD R1, #-32").is_ok());
        assert_eq!(code("ADD R1, #32"), "asm::lit_range");
        assert_eq!(code("ADD R1, #-33"), "asm::lit_range");
    }

    #[test]
    fn imm8_boundaries() {
        assert_eq!(assemble("LW R2, #-128").unwrap(), vec![0x3180]);
        assert_eq!(assemble("MVL R1, #0xFF").unwrap(), vec![0x40FF]);
        assert_eq!(code("SB R1, #128"), "asm::lit_range");
    }

    #[test]
    fn parse_add_basic() {
        let air = AsmParser::new("ADD R1, R2").unwrap().parse().unwrap();
        assert_eq!(
            air.get(0),
            &AirStmt::new(
                InstrKind::Add,
                Operands::RegOrImm {
                    dest: Register::R1,
                    src: ImmediateOrReg::Reg(Register::R2),
                }
            )
        );
    }

    #[test]
    fn parse_without_commas() {
        assert_eq!(assemble("and r1 r2").unwrap(), assemble("AND R1, R2").unwrap());
    }

    #[test]
    fn comments_and_blank_lines() {
        let words = assemble(
            r#"
            # setup
            MVL R1, #1   # low byte

            NOP
            "#,
        )
        .unwrap();
        assert_eq!(words, vec![0x4001, 0x0000]);
    }

    #[test]
    fn comment_lines_starting_like_literals() {
        let words = assemble("#-- setup --\n#1. load values\n  #+2\nNOP\n").unwrap();
        assert_eq!(words, vec![0x0000]);
        // Whole line is a comment
        assert_eq!(assemble("#1 NOP").unwrap(), Vec::<u16>::new());
        assert_eq!(assemble("@start #5 first\nNOP").unwrap(), vec![0x0000]);
    }

    #[test]
    fn long_sources() {
        let src = "\n".repeat(70_000) + "NOP\n";
        assert_eq!(assemble(&src).unwrap(), vec![0x0000]);
    }

    #[test]
    fn program_too_large() {
        assert!(assemble(&"NOP\n".repeat(0x8000)).is_ok());
        assert_eq!(code(&"NOP\n".repeat(0x8001)), "asm::program_too_large");
        assert_eq!(
            code(&("NOP\n".repeat(0x8000) + "@end")),
            "asm::program_too_large"
        );
    }

    #[test]
    fn errors() {
        assert_eq!(code("HALT"), "asm::unknown_mnemonic");
        assert_eq!(code("ADD R0, #1"), "asm::unknown_register");
        assert_eq!(code("ADD R1, #1x"), "asm::bad_lit");
        assert_eq!(code("LB R1, #0xG"), "asm::bad_lit");
        assert_eq!(code("@a\n@a\nNOP"), "asm::duplicate_label");
        assert_eq!(code("BO nowhere"), "asm::undeclared_label");
        assert_eq!(code("MVL R1, @nowhere_h"), "asm::undeclared_label");
        assert_eq!(code("MVL R1, @loop"), "asm::bad_label_ref");
        assert_eq!(code(".PUSHALL R1"), "asm::unknown_macro");
        assert_eq!(code("ADD R1"), "asm::missing_operand");
        assert_eq!(code("RET R1"), "asm::unexpected_token");
        assert_eq!(code("BA loop\n@loop"), "asm::unexpected_token");
        assert_eq!(code("NOP $"), "asm::unknown_token");
    }

    #[test]
    fn labels_resolve_to_byte_addresses() {
        let air = assemble_air(
            r#"
            MVL R1, #3
            @loop
            SUB R1, #1
            BO.NZ loop
            @end NOP
            "#,
        )
        .unwrap();
        assert_eq!(air.label_address("loop"), Some(2));
        assert_eq!(air.label_address("end"), Some(6));
        // BO.NZ at 4, PC after fetch is 6, loop is at 2
        assert_eq!(air.emit().unwrap()[2], 0xE2FC);
    }

    #[test]
    fn forward_branch() {
        let words = assemble("BO.Z done\nNOP\n@done RET").unwrap();
        assert_eq!(words[0], 0xE102);
    }

    #[test]
    fn branch_out_of_range() {
        let mut src = String::from("BO far\n");
        for _ in 0..64 {
            src.push_str("NOP\n");
        }
        src.push_str("@far RET\n");
        assert_eq!(code(&src), "asm::branch_range");
    }

    #[test]
    fn mov_macro() {
        assert_eq!(assemble(".MOV R3, #0x1234").unwrap(), vec![0x4234, 0x5212]);
        assert_eq!(assemble(".MOV R3, #-1").unwrap(), vec![0x42FF, 0x52FF]);
        let words = assemble(".MOV R1, data\nNOP\n@data NOP").unwrap();
        assert_eq!(words, vec![0x4006, 0x5000, 0x0000, 0x0000]);
    }

    #[test]
    fn call_and_jmp_macros() {
        let words = assemble(".CALL sub\n.JMP.Z sub\n@sub RET").unwrap();
        assert_eq!(
            words,
            vec![0x4B0C, 0x5B00, 0xC100, 0x4B0C, 0x5B00, 0xF100, 0xC010]
        );
    }

    #[test]
    fn label_byte_references() {
        let mut src = String::from("MVL IO, @far_l\nMVH IO, @far_h\n");
        for _ in 0..0x200 {
            src.push_str("NOP\n");
        }
        src.push_str("@far RET\n");
        let words = assemble(&src).unwrap();
        // 2 + 0x200 words before `far`
        assert_eq!(words[0], 0x4B04);
        assert_eq!(words[1], 0x5B04);
    }
}
