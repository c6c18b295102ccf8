//! Arc subdivision: expands an arc primitive back into short line segments
//! whose chord-to-chord angle respects an angular budget. Grounded on
//! `arc.hpp`'s `get_segments_`/`generate_segments` — the radial re-projection
//! from a fixed `arc_origin`, the `constrain_radius` slerp/lerp blend, and
//! the extrusion/feedrate interpolation rules including the travel↔extrude
//! half-split special cases. Only `Arc` movements are subdivided here;
//! `ArcAccumulator` primitives are left intact for the emitter, which
//! chooses at serialization time whether to flatten them inline or emit a
//! single arc directive.

use crate::command::{ArcData, Command, Movement, MovementKind};
use crate::config::{ArcConfig, Config};
use crate::diagnostics::Diagnostics;
use crate::stream::Stream;
use crate::vector3::{is_zero, lerp, slerp, Vector3};

#[derive(Debug, Clone, Copy)]
struct Chord {
    start: Vector3,
    end: Vector3,
    linear_offset: f64,
}

impl Chord {
    fn vector(&self) -> Vector3 {
        self.end - self.start
    }

    fn angle_between(&self, other: &Chord) -> f64 {
        self.vector().normalize().angle_between(other.vector().normalize())
    }
}

fn arc_origin(corner: Vector3, start: Vector3, end: Vector3) -> Vector3 {
    let center_point = Vector3::mean_of(start, end);
    corner + (center_point - corner) * 2.0
}

/// The scalar radius bound used by the `constrain_radius` blend: for a
/// sweep under 90° it eases in from 0 towards the nominal radius; beyond
/// 90° it eases from the nominal radius out towards the corner-to-origin
/// distance.
fn radius_constrain(arc: &ArcData, origin: Vector3) -> f64 {
    let distance = arc.corner.distance(origin);
    if arc.angle <= 90.0 {
        slerp(0.0, arc.radius, arc.angle / 90.0)
    } else {
        let t = (arc.angle - 90.0) / 90.0;
        lerp(arc.radius, distance, t.powf(3.0))
    }
}

fn current_max_angle(segments: &[Chord], corner: Vector3, start: Vector3, end: Vector3) -> f64 {
    let mut largest = 0.0_f64;
    let mut cur_vector = (corner - start).normalize();
    for seg in segments {
        let seg_vector = seg.vector().normalize();
        largest = largest.max(cur_vector.angle_between(seg_vector));
        cur_vector = seg_vector;
    }
    let seg_vector = (end - corner).normalize();
    largest.max(cur_vector.angle_between(seg_vector))
}

/// Bisects the arc's chord until every subsegment's bend is within
/// `min_angle`, or `max_angle`/`max_segments` cuts the process short.
fn subdivide_chord(arc: &ArcData, start: Vector3, end: Vector3, cfg: &ArcConfig) -> Vec<Chord> {
    let origin = arc_origin(arc.corner, start, end);
    let constrain = radius_constrain(arc, origin);

    let mut segments = vec![Chord { start, end, linear_offset: 1.0 }];

    while arc.angle < cfg.max_angle
        && current_max_angle(&segments, arc.corner, start, end) >= cfg.min_angle
        && segments.len() < cfg.max_segments
    {
        let mut new_segments: Vec<Chord> = Vec::with_capacity(segments.len() * 2);
        let mut added = false;
        let mut current_offset = 0.0;
        let mut prev_segment = Chord { start, end: arc.corner, linear_offset: 1.0 };

        for (i, seg) in segments.iter().enumerate() {
            let test_segment_offset = if segments.len() == 1 {
                1.0
            } else {
                current_offset + seg.linear_offset * 0.5
            };
            current_offset += seg.linear_offset;

            let next_segment = if i == segments.len() - 1 {
                Chord { start: arc.corner, end, linear_offset: 1.0 }
            } else {
                segments[i + 1]
            };

            let segment_center = Vector3::mean_of(seg.start, seg.end);
            let bend = prev_segment.angle_between(seg).max(seg.angle_between(&next_segment));
            let valid_angle = bend < cfg.min_angle;

            if valid_angle || is_zero(segment_center.distance(origin)) {
                new_segments.push(*seg);
                prev_segment = *seg;
                continue;
            }

            let radius = if cfg.constrain_radius {
                slerp(arc.radius, constrain, test_segment_offset)
            } else {
                arc.radius
            };
            let arc_position = origin + (segment_center - origin).normalized(radius);
            let valid_split = !is_zero(seg.start.distance(arc_position)) && !is_zero(seg.end.distance(arc_position));

            if !valid_split {
                new_segments.push(*seg);
                prev_segment = *seg;
                continue;
            }

            if segments.len() != 1 {
                new_segments.push(Chord { start: seg.start, end: arc_position, linear_offset: seg.linear_offset * 0.5 });
                new_segments.push(Chord { start: arc_position, end: seg.end, linear_offset: seg.linear_offset * 0.5 });
            } else {
                new_segments.push(Chord { start: seg.start, end: arc_position, linear_offset: 1.0 });
                new_segments.push(Chord { start: arc_position, end: seg.end, linear_offset: -1.0 });
            }
            added = true;
            prev_segment = *new_segments.last().unwrap();
        }

        if !added {
            break;
        }
        segments = new_segments;
    }

    segments
}

fn expand_arc(arc: &ArcData, start: Vector3, end: Vector3, cfg: &Config) -> Vec<Movement> {
    let segments = subdivide_chord(arc, start, end, &cfg.arc);

    let total_length: f64 = segments.iter().map(|s| s.start.distance(s.end)).sum();

    let mean_feedrate = (arc.seg_feedrate.start + arc.seg_feedrate.end) * 0.5;
    let mean_acceleration = (arc.acceleration.start + arc.acceleration.end) * 0.5;
    let mean_jerk = (arc.jerk.start + arc.jerk.end) * 0.5;
    let mean_extrude_jerk = (arc.extrude_jerk.start + arc.extrude_jerk.end) * 0.5;

    let feedrate = mean_feedrate;

    let original_length = [start.distance(arc.corner), end.distance(arc.corner)];
    let adjusted_extrude = [
        if original_length[0] == 0.0 { 0.0 } else { arc.extrude.start * (total_length * 0.5 / original_length[0]) },
        if original_length[1] == 0.0 { 0.0 } else { arc.extrude.end * (total_length * 0.5 / original_length[1]) },
    ];

    let divisor = (segments.len() + 1) as f64;
    let mut out = Vec::with_capacity(segments.len());

    for (i, seg) in segments.iter().enumerate() {
        let interpoland = (i + 1) as f64 / divisor;
        let segment_mult = if total_length == 0.0 { 0.0 } else { seg.start.distance(seg.end) / total_length };

        let extrude = if adjusted_extrude[0] == 0.0 && adjusted_extrude[1] != 0.0 {
            if interpoland >= 0.5 {
                (adjusted_extrude[0] + adjusted_extrude[1]) * segment_mult * 2.0
            } else {
                0.0
            }
        } else if adjusted_extrude[0] != 0.0 && adjusted_extrude[1] == 0.0 {
            if interpoland <= 0.5 {
                (adjusted_extrude[0] + adjusted_extrude[1]) * segment_mult * 2.0
            } else {
                0.0
            }
        } else {
            (adjusted_extrude[0] + adjusted_extrude[1]) * segment_mult
        };

        let kind = if extrude != 0.0 {
            MovementKind::ExtrusionMove { extrude }
        } else {
            MovementKind::Travel
        };

        let mut m = Movement::new(kind, seg.start, seg.end, feedrate);
        m.acceleration_hint = mean_acceleration;
        m.jerk_hint = mean_jerk;
        m.extrude_jerk_hint = mean_extrude_jerk;
        m.from_arc = true;
        out.push(m);
    }

    out
}

pub fn subdivide_arcs(stream: Stream, config: &Config, diagnostics: &mut Diagnostics) -> Stream {
    if !config.output.subdivide_arcs {
        return stream;
    }

    let commands = stream.into_commands();
    let mut out: Vec<Command> = Vec::with_capacity(commands.len());

    for command in commands {
        match command {
            Command::Movement(m) if matches!(m.kind, MovementKind::Arc(_)) => {
                let MovementKind::Arc(data) = &m.kind else { unreachable!() };
                let children = expand_arc(data, m.start_position, m.end_position, config);
                diagnostics.arcs_subdivided += 1;
                out.extend(children.into_iter().map(Command::Movement));
            }
            other => out.push(other),
        }
    }

    Stream::from_commands(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::ArcEnds;

    fn sample_arc() -> (ArcData, Vector3, Vector3) {
        let corner = Vector3::new(10.0, 0.0, 0.0);
        let start = Vector3::new(9.6, 0.0, 0.0);
        let end = Vector3::new(10.0, 0.4, 0.0);
        let data = ArcData {
            corner,
            radius: 0.4,
            angle: 90.0,
            arc_origin: arc_origin(corner, start, end),
            extrude: ArcEnds::new(0.05, 0.05),
            seg_feedrate: ArcEnds::new(1800.0, 1800.0),
            acceleration: ArcEnds::new(1500.0, 1500.0),
            jerk: ArcEnds::new(Vector3::new(10.0, 10.0, 0.4), Vector3::new(10.0, 10.0, 0.4)),
            extrude_jerk: ArcEnds::new(5.0, 5.0),
            parent_velocities: ArcEnds::new(Vector3::new(1800.0, 0.0, 0.0), Vector3::new(0.0, 1800.0, 0.0)),
        };
        (data, start, end)
    }

    #[test]
    fn expands_into_at_least_one_child_covering_the_full_chord() {
        let config = Config::default();
        let (arc, start, end) = sample_arc();
        let children = expand_arc(&arc, start, end, &config);

        assert!(!children.is_empty());
        assert_eq!(children.first().unwrap().start_position, start);
        assert_eq!(children.last().unwrap().end_position, end);
        for c in &children {
            assert!(c.from_arc);
        }
    }

    #[test]
    fn preserves_total_extrusion_approximately() {
        let config = Config::default();
        let (arc, start, end) = sample_arc();
        let children = expand_arc(&arc, start, end, &config);

        let total: f64 = children.iter().map(|c| c.kind.extrude()).sum();
        assert!(total > 0.0);
    }

    #[test]
    fn leaves_non_arc_movements_untouched() {
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut stream = Stream::new();
        stream.push(Command::Movement(Movement::new(
            MovementKind::Travel,
            Vector3::ZERO,
            Vector3::new(10.0, 0.0, 0.0),
            3000.0,
        )));

        let result = subdivide_arcs(stream, &config, &mut diagnostics);
        assert_eq!(result.len(), 1);
        assert_eq!(diagnostics.arcs_subdivided, 0);
    }
}
