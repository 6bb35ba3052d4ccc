use std::fmt;

use crate::lexer::cursor::Cursor;
use crate::symbol::{Span, SrcOffset};

pub mod cursor;

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

impl Token {
    pub fn new(kind: TokenKind, span: Span) -> Self {
        Token { kind, span }
    }
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum LiteralKind {
    Hex,
    Dec,
}

#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub enum TokenKind {
    /// Mnemonic, register or bare label name
    Ident,
    /// `@name` label declaration or `@name_l`/`@name_h` reference
    Label,
    /// `.NAME` macro invocation
    Macro,
    /// `#` immediate literal
    Lit(LiteralKind),
    Comment,
    /// Also includes commas
    Whitespace,
    Newline,
    Unknown,
    Eof,
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TokenKind::Ident => "identifier",
            TokenKind::Label => "label",
            TokenKind::Macro => "macro",
            TokenKind::Lit(LiteralKind::Hex) => "hex literal",
            TokenKind::Lit(LiteralKind::Dec) => "decimal literal",
            TokenKind::Comment => "comment",
            TokenKind::Whitespace => "whitespace",
            TokenKind::Newline => "newline",
            TokenKind::Unknown => "unknown",
            TokenKind::Eof => "end of file",
        };
        f.write_str(name)
    }
}

/// Lex the whole source, dropping whitespace and comments.
pub fn tokenize(input: &str) -> impl Iterator<Item = Token> + '_ {
    let mut cursor = Cursor::new(input);
    std::iter::from_fn(move || loop {
        let token = cursor.advance_token();
        match token.kind {
            TokenKind::Eof => return None,
            TokenKind::Whitespace | TokenKind::Comment => continue,
            _ => return Some(token),
        }
    })
}

/// Test if a character is considered to be whitespace.
pub(crate) fn is_whitespace(c: char) -> bool {
    // Commas only separate operands
    matches!(c, ' ' | '\t' | '\r' | ',')
}

/// Test if a character can continue an identifier.
pub(crate) fn is_id(c: char) -> bool {
    // Dots are part of mnemonics such as `BO.NZ`
    matches!(c, 'a'..='z' | 'A'..='Z' | '0'..='9' | '_' | '.')
}

impl Cursor<'_> {
    pub fn advance_token(&mut self) -> Token {
        let first_char = match self.bump() {
            Some(c) => c,
            None => {
                return Token::new(
                    TokenKind::Eof,
                    Span::new(SrcOffset(self.tok_start()), 0),
                )
            }
        };
        let token_kind = match first_char {
            '\n' => TokenKind::Newline,
            c if is_whitespace(c) => {
                self.take_while(is_whitespace);
                TokenKind::Whitespace
            }
            // `#` only introduces a literal in operand position
            '#' if !self.after_operand => {
                self.take_while(|c| c != '\n');
                TokenKind::Comment
            }
            '#' => match (self.first(), self.second()) {
                ('0', 'x' | 'X') => {
                    self.bump();
                    self.bump();
                    self.take_while(is_id);
                    TokenKind::Lit(LiteralKind::Hex)
                }
                ('-' | '+', '0') if matches!(self.clone_skip(2), 'x' | 'X') => {
                    self.bump();
                    self.bump();
                    self.bump();
                    self.take_while(is_id);
                    TokenKind::Lit(LiteralKind::Hex)
                }
                ('-' | '+', _) | ('0'..='9', _) => {
                    self.bump();
                    self.take_while(is_id);
                    TokenKind::Lit(LiteralKind::Dec)
                }
                // Anything else starts a comment
                _ => {
                    self.take_while(|c| c != '\n');
                    TokenKind::Comment
                }
            },
            '@' => {
                self.take_while(is_id);
                TokenKind::Label
            }
            '.' => {
                self.take_while(is_id);
                TokenKind::Macro
            }
            'a'..='z' | 'A'..='Z' | '_' => {
                self.take_while(is_id);
                TokenKind::Ident
            }
            _ => TokenKind::Unknown,
        };
        match token_kind {
            TokenKind::Whitespace => {}
            TokenKind::Ident | TokenKind::Lit(_) => self.after_operand = true,
            _ => self.after_operand = false,
        }
        let span = Span::new(SrcOffset(self.tok_start()), self.pos_in_token());
        self.reset_pos();
        Token::new(token_kind, span)
    }

    /// Peek `n` characters ahead.
    fn clone_skip(&self, n: usize) -> char {
        let mut cursor = self.clone();
        for _ in 0..n {
            cursor.bump();
        }
        cursor.first()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(src: &str) -> Vec<TokenKind> {
        tokenize(src).map(|tok| tok.kind).collect()
    }

    #[test]
    fn instruction_line() {
        assert_eq!(
            kinds("ADD R1, #5"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Lit(LiteralKind::Dec)
            ]
        );
    }

    #[test]
    fn literals() {
        let lit = |kind| vec![TokenKind::Ident, TokenKind::Lit(kind)];
        assert_eq!(kinds("R1 #-32"), lit(LiteralKind::Dec));
        assert_eq!(kinds("R1 #0x1F"), lit(LiteralKind::Hex));
        assert_eq!(kinds("R1 #-0x10"), lit(LiteralKind::Hex));
        // Malformed literals still lex as one token, the parser rejects them
        assert_eq!(kinds("R1 #12ab"), lit(LiteralKind::Dec));
    }

    #[test]
    fn comments() {
        assert_eq!(kinds("# a comment"), vec![]);
        assert_eq!(
            kinds("NOP # trailing #5"),
            vec![TokenKind::Ident]
        );
        assert_eq!(
            kinds("# first\nRET"),
            vec![TokenKind::Newline, TokenKind::Ident]
        );
    }

    #[test]
    fn comments_outside_operands() {
        assert_eq!(kinds("#-- setup --"), vec![]);
        assert_eq!(kinds("  #1. load values"), vec![]);
        assert_eq!(kinds("@start #5 first"), vec![TokenKind::Label]);
        assert_eq!(
            kinds("NOP\n#+2 NOP"),
            vec![TokenKind::Ident, TokenKind::Newline]
        );
        assert_eq!(
            kinds("MVL R1, #1 #2"),
            vec![
                TokenKind::Ident,
                TokenKind::Ident,
                TokenKind::Lit(LiteralKind::Dec),
                TokenKind::Lit(LiteralKind::Dec)
            ]
        );
    }

    #[test]
    fn labels_and_macros() {
        assert_eq!(
            kinds("@loop\n.MOV R1, @loop_l"),
            vec![
                TokenKind::Label,
                TokenKind::Newline,
                TokenKind::Macro,
                TokenKind::Ident,
                TokenKind::Label
            ]
        );
        assert_eq!(kinds("BO.NZ loop"), vec![TokenKind::Ident, TokenKind::Ident]);
    }

    #[test]
    fn spans() {
        let src = "  SW R1, #4";
        let toks: Vec<Token> = tokenize(src).collect();
        let text: Vec<&str> = toks
            .iter()
            .map(|tok| &src[std::ops::Range::from(tok.span)])
            .collect();
        assert_eq!(text, vec!["SW", "R1", "#4"]);
    }

    #[test]
    fn unknown() {
        assert_eq!(kinds("$"), vec![TokenKind::Unknown]);
    }
}
