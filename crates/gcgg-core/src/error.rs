//! Library-level error types. IO and tokenization failures are reported
//! from the `gcgg-gcode`/`gcgg-cli` crates; everything the core pipeline
//! can fail on lives here. Geometric degeneracies and kinematic
//! infeasibility are mostly *recovered*, not propagated — this enum only
//! covers the handful of cases that truly have no sane fallback.

use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum PipelineError {
    #[error("config value out of range: {field} = {value} ({reason})")]
    InvalidConfig {
        field: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("unsolvable circle fit over {segment_count} contributing segments")]
    UnsolvableCircleFit { segment_count: usize },
}
