//! Parser-level errors. The source aborts the whole process
//! (`printf` + `exit(1)`) the moment an unsigned argument parses negative;
//! that has no sane analog in a library, so this reports it as a located
//! `ParseError` and lets the caller decide: `thiserror` here, and
//! `anyhow::Context` at the CLI boundary.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum ParseError {
    #[error("line {line}: argument {key} expects a non-negative value, got {value}")]
    NegativeUnsignedArgument { line: usize, key: String, value: f64 },
}
