//! rillscript: the embedded imperative scripting language.
//!
//! A small dynamically-typed language executed against the shared notebook
//! namespace. Statements are newline- or `;`-separated, blocks are
//! brace-delimited, and module-level bindings become namespace entries.
//!
//! The pipeline is `lex` → `parse` → `Interpreter::run`; the analyzer in
//! [`crate::analysis`] walks the same AST.

pub mod ast;
pub mod interp;
pub mod parser;
pub mod token;

pub use interp::{Interpreter, RuntimeError, RuntimeErrorKind};
pub use parser::{parse, ParseError};

/// Names provided by the runtime, excluded from reference analysis.
pub const BUILTINS: &[&str] = &[
    "print", "len", "str", "int", "float", "abs", "min", "max", "sum", "range",
];

/// Whether `name` is a builtin function.
pub fn is_builtin(name: &str) -> bool {
    BUILTINS.contains(&name)
}
