//! Single-file batch post-processing: read → parse → pipeline → write.
//!
//! A `clap::Parser` args struct, `anyhow::Context` on every fallible I/O
//! step, and a `tracing::info!` summary at the end, wired around
//! `gcgg_gcode::parse` → `gcgg_core::run_pipeline`.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use gcgg_core::command::Instruction;
use tracing::info;

use crate::config;

/// Arguments for the `gcgg` command.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Path to the sliced G-code file to process.
    #[arg(required = true)]
    input: PathBuf,

    /// Path to write the post-processed G-code to. Defaults to `<input>.out.gcode`.
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Path to an INI config file. Missing keys and missing sections fall
    /// back to built-in defaults.
    #[arg(short, long)]
    config: Option<PathBuf>,
}

fn default_output_path(input: &PathBuf) -> PathBuf {
    let stem = input.file_stem().and_then(|s| s.to_str()).unwrap_or("output");
    let dir = input.parent().unwrap_or_else(|| std::path::Path::new("."));
    dir.join(format!("{stem}.out.gcode"))
}

pub fn run(args: Args) -> Result<()> {
    let config = match &args.config {
        Some(path) => {
            info!("loading config from {:?}", path);
            config::load(path)?
        }
        None => gcgg_core::Config::default(),
    };

    info!("reading {:?}", args.input);
    let text = fs::read_to_string(&args.input)
        .with_context(|| format!("failed to read input file: {:?}", args.input))?;

    let commands = gcgg_gcode::parse(&text, &config)
        .with_context(|| format!("failed to parse G-code in {:?}", args.input))?;
    let unknown_count = commands
        .iter()
        .filter(|c| matches!(c, gcgg_core::Command::Instruction(Instruction::Unknown { .. })))
        .count();

    let (output_text, mut diagnostics) = gcgg_core::run_pipeline(commands, &config);
    diagnostics.unknown_instructions = unknown_count;

    let output_path = args.output.clone().unwrap_or_else(|| default_output_path(&args.input));
    fs::write(&output_path, output_text)
        .with_context(|| format!("failed to write output file: {:?}", output_path))?;

    info!(
        coalesced_pairs = diagnostics.coalesced_pairs,
        corner_arcs_inserted = diagnostics.corner_arcs_inserted,
        corner_arcs_skipped_radius = diagnostics.corner_arcs_skipped_radius,
        arc_runs_accumulated = diagnostics.arc_runs_accumulated,
        arcs_subdivided = diagnostics.arcs_subdivided,
        jerk_infeasible_joins = diagnostics.jerk_infeasible_joins,
        unknown_instructions = diagnostics.unknown_instructions,
        "wrote {:?}",
        output_path
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn default_output_path_appends_out_suffix() {
        let path = PathBuf::from("/tmp/part.gcode");
        assert_eq!(default_output_path(&path), PathBuf::from("/tmp/part.out.gcode"));
    }

    #[test]
    fn end_to_end_round_trip_writes_output_file() {
        let mut input = tempfile::Builder::new().suffix(".gcode").tempfile().unwrap();
        writeln!(input, "G28\nG1 X10 Y10 E1 F1200\nG1 X20 Y10 E1\nM84\n").unwrap();
        let output = tempfile::Builder::new().suffix(".gcode").tempfile().unwrap();

        let args = Args {
            input: input.path().to_path_buf(),
            output: Some(output.path().to_path_buf()),
            config: None,
        };
        run(args).unwrap();

        let written = fs::read_to_string(output.path()).unwrap();
        assert!(written.contains("G28"));
        assert!(written.contains("M84"));
    }
}
