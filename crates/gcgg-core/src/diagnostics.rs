//! Run-scoped counters threaded through the pipeline instead of a
//! process-wide global: a `Diagnostics` value is owned by whoever drives
//! the pipeline and passed by `&mut` into each stage, so two pipeline runs
//! in the same process (as happens across this crate's own tests) never
//! share counters.

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Diagnostics {
    pub coalesced_pairs: usize,
    pub corner_arcs_inserted: usize,
    pub corner_arcs_skipped_radius: usize,
    pub arc_runs_accumulated: usize,
    pub arcs_subdivided: usize,
    pub jerk_infeasible_joins: usize,
    pub unknown_instructions: usize,
}

impl Diagnostics {
    pub fn new() -> Self {
        Diagnostics::default()
    }
}
