//! The command tree, reshaped for Rust as a small closed set of tagged
//! variants rather than a virtual-dispatch hierarchy. `Command` is the root;
//! `Movement` carries the segment/motion fields a "segment extends command,
//! movement extends segment" class hierarchy would otherwise hold.

use crate::vector3::Vector3;

/// Per-segment scheduling flags: does the motion queue keep running after
/// this command, and does completing it hand control to the (separate,
/// out-of-scope) instruction queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScheduleFlags {
    pub continues_motion_after: bool,
    pub triggers_instruction_queue_after: bool,
}

impl Default for ScheduleFlags {
    fn default() -> Self {
        ScheduleFlags {
            continues_motion_after: true,
            triggers_instruction_queue_after: false,
        }
    }
}

/// Motion data attached to every segment; filled in by the planner.
/// `computed` distinguishes "never planned" from "planned to zero" so a
/// fresh segment can be told apart from one whose exit feedrate was
/// legitimately zeroed by a jerk-infeasible join.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct MotionData {
    pub computed: bool,
    pub entry_feedrate: f64,
    pub plateau_feedrate: f64,
    pub exit_feedrate: f64,
}

/// Non-owning doubly-linked navigation within a motion run. Indices into
/// the owning `Stream`'s backing `Vec` — this sidesteps both the
/// ownership-cycle hazard of `prev`/`next` pointers
/// and the iterator-invalidation hazard of mutating that `Vec` mid-pass,
/// since an index stays meaningful across a `Vec::insert`/`remove` as long
/// as the stage re-derives indices after the mutation (each stage here
/// does, via `Stream::relink` or local bookkeeping).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Linkage {
    pub prev: Option<usize>,
    pub next: Option<usize>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Plane {
    Xy,
    Xz,
    Yz,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handedness {
    Cw,
    Ccw,
}

/// Per-end parameter pair carried by a corner arc: incident-side values
/// preserved across the fillet so the subdivider and emitter can
/// interpolate between them.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ArcEnds<T> {
    pub start: T,
    pub end: T,
}

impl<T: Copy> ArcEnds<T> {
    pub fn new(start: T, end: T) -> Self {
        ArcEnds { start, end }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArcData {
    pub corner: Vector3,
    pub radius: f64,
    pub angle: f64,
    pub arc_origin: Vector3,
    pub extrude: ArcEnds<f64>,
    pub seg_feedrate: ArcEnds<f64>,
    pub acceleration: ArcEnds<f64>,
    pub jerk: ArcEnds<Vector3>,
    pub extrude_jerk: ArcEnds<f64>,
    /// Velocities of the two original incident segments at the corner,
    /// preserved for the `G15` emission path.
    pub parent_velocities: ArcEnds<Vector3>,
}

/// One physical movement absorbed into an `arc_accumulator` run. Owned by
/// the accumulator once consumed.
#[derive(Debug, Clone, PartialEq)]
pub struct AccumulatedMovement {
    pub start_position: Vector3,
    pub end_position: Vector3,
    pub feedrate: f64,
    pub acceleration_hint: f64,
    pub jerk_hint: Vector3,
    pub extrude_jerk_hint: f64,
    pub extrude: Option<f64>,
    pub kind: MovementKindTag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MovementKindTag {
    Travel,
    Hop,
    Linear,
    Extrusion,
    ExtrusionMove,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ArcAccumulatorData {
    pub segments: Vec<AccumulatedMovement>,
    pub accumulated_angle: f64,
    pub mean_angle: f64,
    pub plane: Plane,
    pub handedness: Handedness,
    pub origin: Vector3,
    pub radius: f64,
    /// Does the fitted arc sweep more than half the circle? The emitter
    /// uses this to pick the G2/G3 large-arc-flag convention.
    pub major_arc: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum MovementKind {
    /// XY movement, no extrusion.
    Travel,
    /// Z-only movement.
    Hop,
    /// XY movement, no extrusion, kept distinct from travel.
    Linear,
    /// Extrude-only, no XYZ change.
    Extrusion { extrude: f64 },
    /// XYZ + extrude.
    ExtrusionMove { extrude: f64 },
    Arc(ArcData),
    ArcAccumulator(ArcAccumulatorData),
}

impl MovementKind {
    pub fn extrude(&self) -> f64 {
        match self {
            MovementKind::Extrusion { extrude } | MovementKind::ExtrusionMove { extrude } => *extrude,
            MovementKind::Arc(a) => a.extrude.start + a.extrude.end,
            MovementKind::ArcAccumulator(acc) => acc
                .segments
                .iter()
                .filter_map(|s| s.extrude)
                .sum(),
            _ => 0.0,
        }
    }

    pub fn set_extrude(&mut self, value: f64) {
        match self {
            MovementKind::Extrusion { extrude } | MovementKind::ExtrusionMove { extrude } => *extrude = value,
            _ => {}
        }
    }

    pub fn is_extrusion_kind(&self) -> bool {
        matches!(self, MovementKind::Extrusion { .. } | MovementKind::ExtrusionMove { .. })
    }

    /// Same concrete kind, for the coalescer's merge-candidate test.
    pub fn same_kind(&self, other: &MovementKind) -> bool {
        std::mem::discriminant(self) == std::mem::discriminant(other)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Movement {
    pub start_position: Vector3,
    pub end_position: Vector3,
    pub feedrate: f64,
    pub acceleration_hint: f64,
    pub acceleration_axes: Vector3,
    pub jerk_hint: Vector3,
    pub extrude_jerk_hint: f64,
    pub is_travel: bool,
    pub from_arc: bool,
    pub linkage: Linkage,
    pub motion: MotionData,
    pub schedule: ScheduleFlags,
    pub kind: MovementKind,
}

impl Movement {
    pub fn new(kind: MovementKind, start: Vector3, end: Vector3, feedrate: f64) -> Self {
        let is_travel = matches!(kind, MovementKind::Travel);
        Movement {
            start_position: start,
            end_position: end,
            feedrate,
            acceleration_hint: 0.0,
            acceleration_axes: Vector3::ZERO,
            jerk_hint: Vector3::ZERO,
            extrude_jerk_hint: 0.0,
            is_travel,
            from_arc: false,
            linkage: Linkage::default(),
            motion: MotionData::default(),
            schedule: ScheduleFlags::default(),
            kind,
        }
    }

    pub fn vector(&self) -> Vector3 {
        self.end_position - self.start_position
    }

    pub fn length(&self) -> f64 {
        self.vector().length()
    }

    pub fn direction(&self) -> Vector3 {
        self.vector().normalize()
    }

    /// Velocity vector at the commanded (plateau) feedrate.
    pub fn velocity(&self) -> Vector3 {
        self.vector().normalized(self.feedrate)
    }

    pub fn mean_position(&self) -> Vector3 {
        Vector3::mean_of(self.start_position, self.end_position)
    }

    pub fn is_arc_like(&self) -> bool {
        matches!(self.kind, MovementKind::Arc(_) | MovementKind::ArcAccumulator(_))
    }
}

/// Out-of-band commands: non-motion G/M-codes. Unknown command words are
/// kept verbatim rather than dropped, since a downstream tool may still
/// need to see them pass through unmodified.
#[derive(Debug, Clone, PartialEq)]
pub enum Instruction {
    Home { x: bool, y: bool, z: bool },
    SetPositioningMode { absolute: bool },
    SetExtrusionMode { absolute: bool },
    DisableSteppers { delay_seconds: Option<f64> },
    SetExtruderTemperature { index: u32, celsius: f64, wait: bool, accurate: Option<f64> },
    Fan { index: u32, speed: Option<u8> },
    SetBedTemperature { index: u32, celsius: f64, wait: bool },
    AccelerationLimits { print: Option<f64>, travel: Option<f64>, retract: Option<f64> },
    JerkLimits { x: Option<f64>, y: Option<f64>, z: Option<f64>, e: Option<f64> },
    Unknown { word: String, raw: String },
}

impl Instruction {
    /// Delay-inducing instructions force the motion queue to drain, which
    /// breaks coalescer/corner-arc/accumulator runs.
    pub fn is_delay_inducing(&self) -> bool {
        matches!(
            self,
            Instruction::SetExtruderTemperature { wait: true, .. }
                | Instruction::SetBedTemperature { wait: true, .. }
                | Instruction::Home { .. }
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Movement(Movement),
    Instruction(Instruction),
}

impl Command {
    pub fn is_delay_inducing(&self) -> bool {
        match self {
            Command::Instruction(i) => i.is_delay_inducing(),
            Command::Movement(_) => false,
        }
    }

    pub fn as_movement(&self) -> Option<&Movement> {
        match self {
            Command::Movement(m) => Some(m),
            _ => None,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_kind_ignores_payload() {
        let a = MovementKind::ExtrusionMove { extrude: 1.0 };
        let b = MovementKind::ExtrusionMove { extrude: 2.0 };
        assert!(a.same_kind(&b));
        assert!(!a.same_kind(&MovementKind::Travel));
    }

    #[test]
    fn delay_inducing_wait_variants() {
        assert!(Instruction::SetExtruderTemperature { index: 0, celsius: 200.0, wait: true, accurate: None }.is_delay_inducing());
        assert!(!Instruction::SetExtruderTemperature { index: 0, celsius: 200.0, wait: false, accurate: None }.is_delay_inducing());
    }
}
