//! # gcgg-core
//!
//! Motion-graph reconstruction, arc synthesis, and feedrate planning for the
//! `gcgg` G-code post-processor. This crate owns the pipeline's core
//! geometry and kinematics; tokenizing input text into [`Command`]s and
//! serializing the output dialect's non-motion instructions are handled by
//! the surrounding crates (`gcgg-gcode`, `gcgg-cli`).
//!
//! Pipeline stages, in the order the CLI driver runs them:
//! [`coalescer::coalesce`] → [`stream::Stream::link`] → [`planner::plan`]
//! (jerk relaxed) → [`corner_arc::insert_corner_arcs`] →
//! [`arc_accumulator::accumulate_arcs`] → [`arc_subdivider::subdivide_arcs`]
//! → [`stream::Stream::link`] → [`planner::plan`] (jerk enforced) →
//! [`emitter::emit`].

pub mod arc_accumulator;
pub mod arc_subdivider;
pub mod coalescer;
pub mod command;
pub mod config;
pub mod corner_arc;
pub mod diagnostics;
pub mod emitter;
pub mod error;
pub mod planner;
pub mod stream;
pub mod vector3;

pub use command::{Command, Instruction, Movement, MovementKind};
pub use config::Config;
pub use diagnostics::Diagnostics;
pub use error::PipelineError;
pub use stream::Stream;
pub use vector3::Vector3;

/// Runs the full pipeline over a freshly parsed command stream and returns
/// the emitted output text alongside the run's diagnostics.
pub fn run_pipeline(commands: Vec<Command>, config: &Config) -> (String, Diagnostics) {
    let mut diagnostics = Diagnostics::new();

    let stream = Stream::from_commands(commands);
    let stream = coalescer::coalesce(stream, config, &mut diagnostics);

    let mut stream = stream;
    stream.link();
    planner::plan(&mut stream, config, false, &mut diagnostics);

    let stream = corner_arc::insert_corner_arcs(stream, config, &mut diagnostics);
    let stream = arc_accumulator::accumulate_arcs(stream, config, &mut diagnostics);
    let stream = arc_subdivider::subdivide_arcs(stream, config, &mut diagnostics);

    let mut stream = stream;
    stream.link();
    planner::plan(&mut stream, config, true, &mut diagnostics);

    let output = emitter::emit(&stream, config);
    (output, diagnostics)
}
