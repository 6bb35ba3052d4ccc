use miette::{miette, LabeledSpan, Report, Severity};

use crate::{lexer::TokenKind, symbol::Span};

// Lexer errors

pub fn lex_unknown(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unknown_token",
        help = "immediates start with #, labels with @ and macros with .",
        labels = vec![LabeledSpan::at(span, "unknown token")],
        "Encountered an unknown token",
    )
    .with_source_code(src.to_owned())
}

pub fn lex_invalid_lit(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::bad_lit",
        help = "literals look like #12, #-7 or #0x1F",
        labels = vec![LabeledSpan::at(span, "incorrect literal")],
        "Encountered a malformed literal",
    )
    .with_source_code(src.to_owned())
}

// Parser errors

pub fn parse_unknown_mnemonic(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unknown_mnemonic",
        help = "check the list of available instructions in the documentation.",
        labels = vec![LabeledSpan::at(span, "unknown instruction")],
        "Unknown instruction mnemonic",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_unknown_macro(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unknown_macro",
        help = "available macros are .MOV, .CALL and .JMP[.cond]",
        labels = vec![LabeledSpan::at(span, "unknown macro")],
        "Unknown macro",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_unknown_register(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unknown_register",
        help = "registers are R1 to R16, or one of IO, LR, SP, PC, FL",
        labels = vec![LabeledSpan::at(span, "unknown register")],
        "Unknown register name",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_lit_range(span: Span, src: &str, bits: u32) -> Report {
    let min = -(1i32 << (bits - 1));
    let max = (1i32 << (bits - 1)) - 1;
    miette!(
        severity = Severity::Error,
        code = "asm::lit_range",
        help = format!(
            "this operand holds {bits} bits: {min} to {max}, or 0x0 to {:#X} as hex",
            (1u32 << bits) - 1
        ),
        labels = vec![LabeledSpan::at(span, "out-of-range literal")],
        "Literal does not fit in a {bits}-bit field",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_duplicate_label(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::duplicate_label",
        help = "labels may only be declared once per file",
        labels = vec![LabeledSpan::at(span, "duplicate label")],
        "Duplicate label declaration",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_bad_label_ref(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::bad_label_ref",
        help = "select a byte of the label address with @name_l or @name_h",
        labels = vec![LabeledSpan::at(span, "incomplete label reference")],
        "Label reference must name the low or high byte",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_generic_unexpected(span: Span, src: &str, expected: &str, found: TokenKind) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::unexpected_token",
        help = "check the operands for this instruction",
        labels = vec![LabeledSpan::at(span, "unexpected token")],
        "Expected {expected}, found {found}",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_missing_operand(span: Span, src: &str, expected: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::missing_operand",
        help = "you may be missing operands in this statement",
        labels = vec![LabeledSpan::at(span, "incomplete statement")],
        "Missing operand: expected {expected}",
    )
    .with_source_code(src.to_owned())
}

// Backpatch errors

pub fn patch_undeclared_label(span: Span, src: &str, name: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::undeclared_label",
        help = "declare the label with @{name} at the start of a line",
        labels = vec![LabeledSpan::at(span, "undeclared label")],
        "Reference to undeclared label `{name}`",
    )
    .with_source_code(src.to_owned())
}

pub fn parse_program_too_large(span: Span, src: &str) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::program_too_large",
        help = "programs are loaded at 0 and may use at most 32768 words",
        labels = vec![LabeledSpan::at(span, "does not fit in memory")],
        "Program does not fit in the address space",
    )
    .with_source_code(src.to_owned())
}

pub fn patch_branch_range(span: Span, src: &str, offset: i32) -> Report {
    miette!(
        severity = Severity::Error,
        code = "asm::branch_range",
        help = "relative branches reach -128 to 127 bytes; use .JMP for longer jumps",
        labels = vec![LabeledSpan::at(span, format!("offset of {offset} bytes"))],
        "Branch target is out of range",
    )
    .with_source_code(src.to_owned())
}
