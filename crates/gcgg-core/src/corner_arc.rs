//! Corner-arc insertion: replaces a sharp vertex between two movements with
//! a fitted circular fillet. Grounded on
//! `gcode.cpp`'s "Generating arc segments" pass and `arc.hpp`'s constructor
//! (the zero-hint fallback and `arc_origin` construction). The source
//! reserves extra `Vec` capacity to keep iterators valid across insertions;
//! here the pass rebuilds its output forward instead (see `coalescer.rs`),
//! which sidesteps that hazard without needing reserved slack.

use crate::command::{ArcData, ArcEnds, Command, Movement, MovementKind};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::stream::Stream;
use crate::vector3::{is_equal, Vector3};

fn fallback(primary: f64, secondary: f64) -> f64 {
    if primary == 0.0 {
        secondary
    } else {
        primary
    }
}

fn fallback_vec(primary: Vector3, secondary: Vector3) -> Vector3 {
    Vector3::new(
        fallback(primary.x, secondary.x),
        fallback(primary.y, secondary.y),
        fallback(primary.z, secondary.z),
    )
}

/// Attempts to fillet the vertex between `prev` and `cur`. On success,
/// both movements are carved in place (shortened, extrusion reduced) and
/// the new arc `Movement` is returned for the caller to splice in — either
/// replacing `prev` outright (if it carved away to nothing) or inserting
/// ahead of it.
fn try_corner_arc(
    prev: &mut Movement,
    cur: &mut Movement,
    config: &Config,
    diagnostics: &mut Diagnostics,
) -> Option<(Movement, bool)> {
    if prev.is_arc_like() {
        return None;
    }

    let v1 = prev.vector();
    let v2 = cur.vector();
    let len1 = v1.length();
    let len2 = v2.length();
    if len1 == 0.0 || len2 == 0.0 {
        return None;
    }

    let angle = v1.normalize().angle_between(v2.normalize());
    if angle <= config.arc.min_angle {
        return None;
    }

    let is_travel = prev.is_travel && cur.is_travel;
    let mut radius = if is_travel {
        if config.arc.halve_travels {
            len1.min(len2 * 0.5)
        } else {
            config.arc.travel_radius
        }
    } else {
        config.arc.radius
    };

    if len1 < radius {
        radius = len1;
    }
    if (len2 * 0.5) < radius {
        radius = len2 * 0.5;
    }
    if radius <= config.arc.min_radius {
        diagnostics.corner_arcs_skipped_radius += 1;
        return None;
    }

    let new_fraction = [(len1 - radius) / len1, (len2 - radius) / len2];
    let corner = prev.end_position;
    let prev_new_end = prev.start_position + v1 * new_fraction[0];
    let cur_new_start = cur.end_position - v2 * new_fraction[1];

    if is_equal(prev_new_end.distance(cur_new_start), 0.0) {
        return None;
    }

    let orig_extrude = [prev.kind.extrude(), cur.kind.extrude()];
    let new_extrude = [orig_extrude[0] * new_fraction[0], orig_extrude[1] * new_fraction[1]];
    let remainder = [orig_extrude[0] - new_extrude[0], orig_extrude[1] - new_extrude[1]];

    let prev_collapsed = is_equal(prev_new_end.distance(prev.start_position), 0.0);

    prev.kind.set_extrude(new_extrude[0]);
    cur.kind.set_extrude(new_extrude[1]);
    prev.end_position = prev_new_end;
    cur.start_position = cur_new_start;

    let (start_feedrate, end_feedrate) = if config.arc.constant_speed {
        let mean = (prev.feedrate + cur.feedrate) * 0.5;
        (mean, mean)
    } else {
        (prev.feedrate, cur.feedrate)
    };

    let parent_velocities = ArcEnds::new(
        (corner - prev.start_position).normalized(prev.feedrate),
        (cur.end_position - corner).normalized(cur.feedrate),
    );

    let seg_feedrate = ArcEnds::new(fallback(start_feedrate, end_feedrate), end_feedrate);
    let acceleration = ArcEnds::new(
        fallback(prev.acceleration_hint, cur.acceleration_hint),
        cur.acceleration_hint,
    );
    let jerk = ArcEnds::new(fallback_vec(prev.jerk_hint, cur.jerk_hint), cur.jerk_hint);
    let extrude_jerk = ArcEnds::new(
        fallback(prev.extrude_jerk_hint, cur.extrude_jerk_hint),
        cur.extrude_jerk_hint,
    );

    let center_point = Vector3::mean_of(prev_new_end, cur_new_start);
    let arc_origin = corner + (center_point - corner) * 2.0;

    let arc_data = ArcData {
        corner,
        radius,
        angle,
        arc_origin,
        extrude: ArcEnds::new(remainder[0], remainder[1]),
        seg_feedrate,
        acceleration,
        jerk,
        extrude_jerk,
        parent_velocities,
    };

    let mut arc = Movement::new(MovementKind::Arc(arc_data), prev_new_end, cur_new_start, (seg_feedrate.start + seg_feedrate.end) * 0.5);
    arc.is_travel = is_travel;
    arc.acceleration_hint = acceleration.start;
    arc.jerk_hint = jerk.start;
    arc.extrude_jerk_hint = extrude_jerk.start;
    arc.from_arc = true;

    Some((arc, prev_collapsed))
}

pub fn insert_corner_arcs(stream: Stream, config: &Config, diagnostics: &mut Diagnostics) -> Stream {
    if !config.arc.generate {
        return stream;
    }

    let commands = stream.into_commands();
    let mut out: Vec<Command> = Vec::with_capacity(commands.len());
    let mut last_movement_idx: Option<usize> = None;

    for command in commands {
        match command {
            Command::Instruction(instr) => {
                if instr.is_delay_inducing() {
                    last_movement_idx = None;
                }
                out.push(Command::Instruction(instr));
            }
            Command::Movement(mut cur) => {
                if let Some(p) = last_movement_idx {
                    if let Command::Movement(prev) = &mut out[p] {
                        if let Some((arc, prev_collapsed)) = try_corner_arc(prev, &mut cur, config, diagnostics) {
                            diagnostics.corner_arcs_inserted += 1;
                            if prev_collapsed {
                                out[p] = Command::Movement(arc);
                            } else {
                                out.push(Command::Movement(arc));
                            }
                        }
                    }
                }
                out.push(Command::Movement(cur));
                last_movement_idx = Some(out.len() - 1);
            }
        }
    }

    Stream::from_commands(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn travel(x0: f64, y0: f64, x1: f64, y1: f64, feedrate: f64) -> Command {
        Command::Movement(Movement::new(
            MovementKind::Travel,
            Vector3::new(x0, y0, 0.0),
            Vector3::new(x1, y1, 0.0),
            feedrate,
        ))
    }

    #[test]
    fn inserts_an_arc_at_a_right_angle_corner() {
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut stream = Stream::new();
        stream.push(travel(0.0, 0.0, 10.0, 0.0, 3000.0));
        stream.push(travel(10.0, 0.0, 10.0, 10.0, 3000.0));

        let result = insert_corner_arcs(stream, &config, &mut diagnostics);

        assert_eq!(result.len(), 3);
        assert!(result.get(1).unwrap().as_movement().unwrap().is_arc_like());
        assert_eq!(diagnostics.corner_arcs_inserted, 1);
    }

    #[test]
    fn skips_shallow_angles() {
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut stream = Stream::new();
        stream.push(travel(0.0, 0.0, 10.0, 0.0, 3000.0));
        stream.push(travel(10.0, 0.0, 20.0, 0.1, 3000.0));

        let result = insert_corner_arcs(stream, &config, &mut diagnostics);

        assert_eq!(result.len(), 2);
        assert_eq!(diagnostics.corner_arcs_inserted, 0);
    }

    #[test]
    fn rejects_when_min_radius_cannot_be_satisfied() {
        let mut config = Config::default();
        config.arc.radius = 5.0;
        config.arc.min_radius = 4.0;
        let mut diagnostics = Diagnostics::new();
        let mut stream = Stream::new();
        stream.push(travel(0.0, 0.0, 1.0, 0.0, 3000.0));
        stream.push(travel(1.0, 0.0, 1.0, 1.0, 3000.0));

        let result = insert_corner_arcs(stream, &config, &mut diagnostics);

        assert_eq!(result.len(), 2);
        assert_eq!(diagnostics.corner_arcs_skipped_radius, 1);
    }
}
