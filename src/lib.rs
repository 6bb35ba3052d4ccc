// Parsing
mod parser;
pub use parser::{assemble, assemble_air, AsmParser};
mod air;
pub use air::{Air, AirStmt};
mod isa;

// Running
mod runtime;
pub use runtime::{Fault, HaltReason, RunState, DEFAULT_BUDGET, HALT_BOUNDARY, INITIAL_SP};
mod debugger;
pub use debugger::{Debugger, DebuggerOptions, SessionEnd};
mod output;
pub use output::Output;

// Binary images and checking
mod disasm;
pub use disasm::{disassemble, disassemble_lines, disassemble_program, disassemble_str};
pub use disasm::{DisasmError, Disassembly};
pub mod image;
mod expect;
pub use expect::{Expectation, ExpectationError, Mismatch};

mod symbol;
pub use symbol::{Flag, Register};

mod error;
mod lexer;

pub mod env;

/// Amount of lines to show as context, each side of focus line (line containing span).
pub const DIAGNOSTIC_CONTEXT_LINES: usize = 8;
