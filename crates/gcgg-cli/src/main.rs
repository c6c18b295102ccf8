//! # gcgg
//!
//! Command-line front end for the `gcgg` G-code post-processor: reconstructs
//! a motion graph from sliced G-code, inserts corner-smoothing arcs, and
//! re-emits firmware-aware, jerk-bounded pacing.
//!
//! ## Responsibilities
//!
//! *   Parsing G-code files.
//! *   Loading an optional INI configuration overlay.
//! *   Running the `gcgg-core` pipeline and writing the result back out.
//!
//! This binary is a single-shot offline tool: no server loop, no MCU link,
//! no web API.

use anyhow::Result;
use clap::Parser;
use tracing::error;

mod config;
mod run;

fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let args = run::Args::parse();
    if let Err(err) = run::run(args) {
        error!("{err:#}");
        std::process::exit(1);
    }
    Ok(())
}
