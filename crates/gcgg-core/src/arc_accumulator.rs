//! Curvature-from-sequence detection: scans runs of short, near-collinear
//! moves and recognizes them as samples of a latent circle. Grounded
//! on `segment/arc_accumulator.hpp`'s `consume_segment`/`solve`. The source
//! keeps an incremental running `accumulated_angle`/`mean_angle` built up
//! segment-by-segment with an alternating fill/clear chord-pair state
//! machine; this recomputes both from the current segment list on every
//! accepted segment instead. For the short runs this pipeline ever holds in
//! memory the recompute is cheap, and it reads far closer to a plain
//! "sum of consecutive chord-pair angles" than reproducing the source's
//! incremental bookkeeping would.

use crate::command::{
    AccumulatedMovement, ArcAccumulatorData, Command, Handedness, Movement, MovementKind,
    MovementKindTag, Plane,
};
use crate::config::{Config, RegArcGenConfig};
use crate::diagnostics::Diagnostics;
use crate::error::PipelineError;
use crate::stream::Stream;
use crate::vector3::{is_zero, Vector3};

fn plane_up(plane: Plane) -> Vector3 {
    match plane {
        Plane::Xy => Vector3::new(0.0, 0.0, 1.0),
        Plane::Xz => Vector3::new(0.0, 1.0, 0.0),
        Plane::Yz => Vector3::new(1.0, 0.0, 0.0),
    }
}

/// Classifies the plane of travel by which axis the outgoing chord
/// direction varies *least* along; that axis is the one left out of the
/// plane.
fn infer_plane(move_direction: Vector3) -> Plane {
    let abs = move_direction.abs();
    if abs.z <= abs.x && abs.z <= abs.y {
        Plane::Xy
    } else if abs.y <= abs.x && abs.y <= abs.z {
        Plane::Xz
    } else {
        Plane::Yz
    }
}

fn infer_handedness(in_direction: Vector3, move_direction: Vector3, plane: Plane) -> Handedness {
    let left = in_direction.cross(plane_up(plane)).normalize();
    if move_direction.dot(left) <= 0.0 {
        Handedness::Ccw
    } else {
        Handedness::Cw
    }
}

fn chord_vector(a: &AccumulatedMovement, b: &AccumulatedMovement) -> Vector3 {
    b.mean_position() - a.mean_position()
}

fn chord_angle(a: Vector3, b: Vector3) -> f64 {
    a.normalize().angle_between(b.normalize())
}

impl AccumulatedMovement {
    pub fn mean_position(&self) -> Vector3 {
        Vector3::mean_of(self.start_position, self.end_position)
    }

    pub fn vector(&self) -> Vector3 {
        self.end_position - self.start_position
    }
}

#[derive(Debug, Clone, Default)]
struct Accumulator {
    segments: Vec<AccumulatedMovement>,
    accumulated_angle: f64,
    mean_angle: f64,
    plane: Option<Plane>,
    handedness: Option<Handedness>,
}

impl Accumulator {
    fn reset(&mut self) {
        self.segments.clear();
        self.accumulated_angle = 0.0;
        self.mean_angle = 0.0;
        self.plane = None;
        self.handedness = None;
    }

    fn recompute_angles(&mut self) {
        let n = self.segments.len();
        let chords: Vec<Vector3> = (0..n.saturating_sub(1))
            .map(|i| chord_vector(&self.segments[i], &self.segments[i + 1]))
            .collect();

        let mut accumulated = 0.0;
        let mut i = 0;
        while i + 1 < chords.len() {
            accumulated += chord_angle(chords[i], chords[i + 1]);
            i += 2;
        }
        self.accumulated_angle = accumulated;

        if chords.len() >= 2 {
            let mut sum = 0.0;
            let mut count = 0usize;
            for pair in chords.windows(2) {
                sum += chord_angle(pair[0], pair[1]);
                count += 1;
            }
            self.mean_angle = sum / count as f64;
        }
    }

    /// Tries to accept `candidate`. Returns `false` (and flushes, i.e.
    /// resets if the run was too short to be worth keeping) when rejected.
    fn consume(&mut self, candidate: AccumulatedMovement, cfg: &RegArcGenConfig) -> bool {
        let accepted = self.try_consume(&candidate, cfg);
        if accepted {
            self.segments.push(candidate);
            self.recompute_angles();
        }
        accepted
    }

    fn try_consume(&mut self, candidate: &AccumulatedMovement, cfg: &RegArcGenConfig) -> bool {
        let vector = candidate.vector();
        if vector.length() >= cfg.max_segment_length {
            return false;
        }
        if !cfg.arcs_support_z && vector.z != 0.0 {
            return false;
        }

        if self.segments.is_empty() {
            return true;
        }

        let back = self.segments.last().unwrap();
        if back.kind != candidate.kind {
            return false;
        }

        let cur_direction = vector.normalize();
        let angle = if self.segments.len() >= 2 {
            let a = &self.segments[self.segments.len() - 2];
            let b = &self.segments[self.segments.len() - 1];
            chord_vector(a, b).normalize().angle_between(cur_direction)
        } else {
            back.vector().normalize().angle_between(cur_direction)
        };
        if angle >= cfg.max_angle {
            return false;
        }

        if self.segments.len() >= cfg.min_segment_count && (self.mean_angle - angle).abs() >= cfg.max_angle_divergence {
            return false;
        }

        if self.segments.len() + 1 >= cfg.min_segment_count {
            let n = self.segments.len();
            let chord1 = chord_vector(&self.segments[n - 2], &self.segments[n - 1]);
            let chord2 = chord_vector(&self.segments[n - 1], candidate);
            let in_direction = chord1.normalize();
            let move_direction = chord2.normalize();
            let plane = infer_plane(move_direction);
            let handedness = infer_handedness(in_direction, move_direction, plane);

            match (self.plane, self.handedness) {
                (None, None) => {
                    self.plane = Some(plane);
                    self.handedness = Some(handedness);
                }
                (Some(p), Some(h)) if p != plane || h != handedness => {
                    return false;
                }
                _ => {}
            }
        }

        true
    }

    fn is_emittable(&self, cfg: &RegArcGenConfig) -> bool {
        !self.segments.is_empty() && self.segments.len() >= cfg.min_segment_count
    }
}

struct Subsegment {
    start: Vector3,
    end: Vector3,
    weight: f64,
}

impl Subsegment {
    fn length(&self) -> f64 {
        self.start.distance(self.end)
    }

    fn vector(&self) -> Vector3 {
        self.end - self.start
    }

    fn mean(&self) -> Vector3 {
        Vector3::mean_of(self.start, self.end)
    }
}

/// Fits a circle to the accumulated run: each
/// contributing movement is split into quarter-point subsegments, weighted
/// by length, and the origin is the average of the perpendicular-bisector
/// intersections of consecutive interior subsegments.
fn solve_circle(segments: &[AccumulatedMovement], plane: Plane) -> Result<(f64, Vector3), PipelineError> {
    let mut subsegments: Vec<Subsegment> = Vec::new();
    let mut accumulated_length = 0.0;

    for seg in segments {
        let along = seg.vector();
        let magnitude = along.length();
        let start = subsegments.last().map(|s| s.end).unwrap_or(seg.start_position);
        let quarter = seg.start_position + along.normalized(magnitude * 0.25);
        let three_quarter = seg.start_position + along.normalized(magnitude * 0.75);

        subsegments.push(Subsegment { start, end: quarter, weight: 1.0 });
        accumulated_length += subsegments.last().unwrap().length();
        subsegments.push(Subsegment { start: quarter, end: three_quarter, weight: 1.0 });
        accumulated_length += subsegments.last().unwrap().length();
    }
    let last_end = subsegments.last().unwrap().end;
    subsegments.push(Subsegment {
        start: last_end,
        end: segments.last().unwrap().end_position,
        weight: 1.0,
    });
    accumulated_length += subsegments.last().unwrap().length();

    let mean_length = accumulated_length / subsegments.len() as f64;
    for s in subsegments.iter_mut() {
        s.weight = s.length() / mean_length;
    }

    let up = plane_up(plane);
    let mut origin = Vector3::ZERO;
    let interior = subsegments.len() - 2;

    // The first interior subsegment only seeds `prev`; pairing starts one
    // index later so the two subsegments split from the same movement (which
    // are always collinear) are never compared against each other.
    let mut prev_idx: Option<usize> = None;
    for i in 1..subsegments.len() - 1 {
        let Some(p) = prev_idx else {
            prev_idx = Some(i);
            continue;
        };
        let prev = &subsegments[p];
        let cur = &subsegments[i];

        let vectors = [prev.vector().normalize(), cur.vector().normalize()];
        let points = [prev.mean(), cur.mean()];
        let cross_vectors = [vectors[0].cross(up).normalize(), vectors[1].cross(up).normalize()];

        let cross_a = (points[1] - points[0]).cross(cross_vectors[1]);
        let cross_b = cross_vectors[0].cross(cross_vectors[1]);
        if is_zero(cross_b.length()) {
            return Err(PipelineError::UnsolvableCircleFit { segment_count: segments.len() });
        }

        let a = cross_a.length() / cross_b.length();
        let mut origin_vector = cross_vectors[0] * a;
        if origin_vector.normalize().dot(vectors[1]) < 0.0 {
            origin_vector = -origin_vector;
        }
        origin += points[0] + origin_vector;
        prev_idx = Some(i);
    }
    origin = origin / interior as f64;

    let mut radius = 0.0;
    for i in 1..subsegments.len() - 1 {
        let s = &subsegments[i];
        radius += origin.distance(s.start) * s.weight;
        radius += origin.distance(s.end) * s.weight;
    }
    radius /= (interior * 2) as f64;

    let chord_span = segments.first().unwrap().start_position.distance(segments.last().unwrap().end_position);
    radius = radius.max(chord_span * 0.5);

    Ok((radius, origin))
}

/// Decides whether the fitted arc sweeps more than half the circle, using
/// a 180°-binormal test (see DESIGN.md's Open Question (b) decision).
fn is_more_than_half_circle(segments: &[AccumulatedMovement], origin: Vector3, plane: Plane) -> bool {
    if segments.len() < 2 {
        return false;
    }
    let first_normal = segments[0].start_position.vector_to(origin);
    let second_normal = segments[1].start_position.vector_to(origin);
    let last_normal = segments.last().unwrap().end_position.vector_to(origin);

    let up = plane_up(plane);
    let mut binormal = first_normal.cross(up).normalize();
    if binormal.dot(second_normal) <= 0.0 {
        binormal = -binormal;
    }
    last_normal.dot(binormal) < 0.0
}

fn to_movement(accumulator: Accumulator, origin: Vector3, radius: f64, major_arc: bool) -> Movement {
    let Accumulator { segments, accumulated_angle, mean_angle, plane, handedness } = accumulator;
    let plane = plane.unwrap_or(Plane::Xy);
    let handedness = handedness.unwrap_or(Handedness::Cw);

    let start_position = segments.first().unwrap().start_position;
    let end_position = segments.last().unwrap().end_position;
    let feedrate = (segments.first().unwrap().feedrate + segments.last().unwrap().feedrate) * 0.5;
    let acceleration_hint = (segments.first().unwrap().acceleration_hint + segments.last().unwrap().acceleration_hint) * 0.5;
    let jerk_hint = (segments.first().unwrap().jerk_hint + segments.last().unwrap().jerk_hint) * 0.5;

    let data = ArcAccumulatorData {
        segments,
        accumulated_angle,
        mean_angle,
        plane,
        handedness,
        origin,
        radius,
        major_arc,
    };
    let mut m = Movement::new(MovementKind::ArcAccumulator(data), start_position, end_position, feedrate);
    m.acceleration_hint = acceleration_hint;
    m.jerk_hint = jerk_hint;
    m
}

fn kind_tag(kind: &MovementKind) -> Option<MovementKindTag> {
    match kind {
        MovementKind::Travel => Some(MovementKindTag::Travel),
        MovementKind::Hop => Some(MovementKindTag::Hop),
        MovementKind::Linear => Some(MovementKindTag::Linear),
        MovementKind::Extrusion { .. } => Some(MovementKindTag::Extrusion),
        MovementKind::ExtrusionMove { .. } => Some(MovementKindTag::ExtrusionMove),
        _ => None,
    }
}

fn to_accumulated(m: &Movement) -> Option<AccumulatedMovement> {
    let kind = kind_tag(&m.kind)?;
    Some(AccumulatedMovement {
        start_position: m.start_position,
        end_position: m.end_position,
        feedrate: m.feedrate,
        acceleration_hint: m.acceleration_hint,
        jerk_hint: m.jerk_hint,
        extrude_jerk_hint: m.extrude_jerk_hint,
        extrude: if m.kind.is_extrusion_kind() { Some(m.kind.extrude()) } else { None },
        kind,
    })
}

/// A maximal-run scan over the whole stream: a maximal-run scan that either
/// discards a too-short candidate run back into the output unchanged, or
/// replaces it with a single `ArcAccumulator` movement.
pub fn accumulate_arcs(stream: Stream, config: &Config, diagnostics: &mut Diagnostics) -> Stream {
    if !config.reg_arc_gen.enable {
        return stream;
    }

    let commands = stream.into_commands();
    let mut out: Vec<Command> = Vec::with_capacity(commands.len());
    let mut accumulator = Accumulator::default();
    let mut pending: Vec<Movement> = Vec::new();

    // Ends the current run: either folds it into one `ArcAccumulator`
    // movement (on success), or spills its raw movements back out
    // unchanged (run too short, or the circle fit was degenerate).
    let flush = |accumulator: &mut Accumulator, pending: &mut Vec<Movement>, out: &mut Vec<Command>, diagnostics: &mut Diagnostics| {
        if accumulator.is_emittable(&config.reg_arc_gen) {
            let taken = std::mem::take(accumulator);
            if let Ok(movement) = solve_arc(taken) {
                pending.clear();
                out.push(Command::Movement(movement));
                diagnostics.arc_runs_accumulated += 1;
                return;
            }
        } else {
            accumulator.reset();
        }
        for m in std::mem::take(pending) {
            out.push(Command::Movement(m));
        }
    };

    for command in commands {
        match command {
            Command::Movement(m) => match to_accumulated(&m) {
                Some(candidate) => {
                    if !accumulator.consume(candidate.clone(), &config.reg_arc_gen) {
                        flush(&mut accumulator, &mut pending, &mut out, diagnostics);
                        if !accumulator.consume(candidate, &config.reg_arc_gen) {
                            // Doesn't even fit a run on its own (too long, or
                            // a Z-constraint violation); emit it unchanged
                            // rather than letting it get silently dropped by
                            // a later `pending.clear()`.
                            out.push(Command::Movement(m));
                            continue;
                        }
                    }
                    pending.push(m);
                }
                None => {
                    flush(&mut accumulator, &mut pending, &mut out, diagnostics);
                    out.push(Command::Movement(m));
                }
            },
            Command::Instruction(instr) => {
                flush(&mut accumulator, &mut pending, &mut out, diagnostics);
                out.push(Command::Instruction(instr));
            }
        }
    }
    flush(&mut accumulator, &mut pending, &mut out, diagnostics);

    Stream::from_commands(out)
}

fn solve_arc(accumulator: Accumulator) -> Result<Movement, PipelineError> {
    let plane = accumulator.plane.unwrap_or(Plane::Xy);
    let (radius, origin) = solve_circle(&accumulator.segments, plane)?;
    let major_arc = is_more_than_half_circle(&accumulator.segments, origin, plane);

    Ok(to_movement(accumulator, origin, radius, major_arc))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector3::Vector3;

    fn seg(x0: f64, y0: f64, x1: f64, y1: f64) -> Command {
        Command::Movement(Movement::new(
            MovementKind::Travel,
            Vector3::new(x0, y0, 0.0),
            Vector3::new(x1, y1, 0.0),
            3000.0,
        ))
    }

    #[test]
    fn discards_runs_shorter_than_min_segment_count() {
        let mut config = Config::default();
        config.reg_arc_gen.enable = true;
        config.reg_arc_gen.min_segment_count = 4;
        let mut diagnostics = Diagnostics::new();

        let mut stream = Stream::new();
        stream.push(seg(0.0, 0.0, 1.0, 0.1));
        stream.push(seg(1.0, 0.1, 2.0, 0.3));

        let result = accumulate_arcs(stream, &config, &mut diagnostics);
        assert_eq!(result.len(), 2);
        assert_eq!(diagnostics.arc_runs_accumulated, 0);
    }

    #[test]
    fn an_overlong_leading_segment_is_not_swallowed_by_a_later_arc() {
        let mut config = Config::default();
        config.reg_arc_gen.enable = true;
        config.reg_arc_gen.min_segment_count = 4;
        config.reg_arc_gen.max_segment_length = 5.0;
        config.reg_arc_gen.max_angle = 45.0;
        config.reg_arc_gen.max_angle_divergence = 20.0;
        let mut diagnostics = Diagnostics::new();

        let mut stream = Stream::new();
        // Can't join any run on its own (exceeds max_segment_length), and
        // there is no prior run to flush first — exercises the
        // empty-accumulator retry path directly.
        stream.push(seg(-20.0, 0.0, 0.0, 0.0));

        let radius = 10.0;
        let mut points = Vec::new();
        for i in 0..=6 {
            let theta = (i as f64) * 10.0_f64.to_radians();
            points.push(Vector3::new(radius * theta.sin(), radius * (1.0 - theta.cos()), 0.0));
        }
        for w in points.windows(2) {
            stream.push(Command::Movement(Movement::new(MovementKind::Travel, w[0], w[1], 3000.0)));
        }

        let result = accumulate_arcs(stream, &config, &mut diagnostics);
        assert_eq!(diagnostics.arc_runs_accumulated, 1);
        assert_eq!(result.len(), 2, "the overlong leading segment must survive alongside the accumulated arc");
        assert!(!result.get(0).unwrap().as_movement().unwrap().is_arc_like());
        assert!(result.get(1).unwrap().as_movement().unwrap().is_arc_like());
    }

    #[test]
    fn accumulates_a_polyline_approximating_an_arc() {
        let mut config = Config::default();
        config.reg_arc_gen.enable = true;
        config.reg_arc_gen.min_segment_count = 4;
        config.reg_arc_gen.max_segment_length = 5.0;
        config.reg_arc_gen.max_angle = 45.0;
        config.reg_arc_gen.max_angle_divergence = 20.0;
        let mut diagnostics = Diagnostics::new();

        let radius = 10.0;
        let mut points = Vec::new();
        for i in 0..=6 {
            let theta = (i as f64) * 10.0_f64.to_radians();
            points.push(Vector3::new(radius * theta.sin(), radius * (1.0 - theta.cos()), 0.0));
        }

        let mut stream = Stream::new();
        for w in points.windows(2) {
            stream.push(Command::Movement(Movement::new(MovementKind::Travel, w[0], w[1], 3000.0)));
        }

        let result = accumulate_arcs(stream, &config, &mut diagnostics);
        assert_eq!(diagnostics.arc_runs_accumulated, 1);
        assert_eq!(result.len(), 1);
        assert!(result.get(0).unwrap().as_movement().unwrap().is_arc_like());
    }
}
