//! # gcgg-gcode
//!
//! Turns raw sliced G-code text into the typed [`gcgg_core::Command`] stream
//! the pipeline crate operates on. Split into a dumb line [`tokenizer`] and a
//! stateful [`parser`] dispatcher, mirroring `gcode.cpp`'s own two-phase
//! `tokenize`/`process` split.

pub mod error;
pub mod parser;
pub mod tokenizer;

pub use error::ParseError;
pub use tokenizer::GcodeLine;

/// Parses a whole G-code file's text into a command stream, ready for
/// [`gcgg_core::run_pipeline`].
pub fn parse(text: &str, config: &gcgg_core::Config) -> Result<Vec<gcgg_core::Command>, ParseError> {
    parser::parse(text, config)
}
