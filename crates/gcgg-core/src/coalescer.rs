//! Redundant-move coalescing: merges adjacent, collinear, same-kind moves
//! into one. Grounded on `gcode.cpp`'s "Eliminating redundant movements"
//! pass, generalized from a
//! single mutable `std::vector` (kept valid mid-erase via `iter = out.erase(iter)`)
//! to a forward rebuild: this pass never needs to revisit an already-emitted
//! output command, so folding candidates into a freshly built `Vec` avoids
//! the erase-invalidation hazard entirely.

use crate::command::{Command, Movement, MovementKind};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::stream::Stream;
use crate::vector3::{is_equal, is_equal_eps};

fn extrusion_rate(m: &Movement) -> f64 {
    let time = m.length() / m.feedrate;
    if time == 0.0 {
        0.0
    } else {
        m.kind.extrude() / time
    }
}

fn mergeable(prev: &Movement, cur: &Movement, config: &Config) -> bool {
    if !prev.kind.same_kind(&cur.kind) {
        return false;
    }
    if prev.feedrate != cur.feedrate {
        return false;
    }
    if !is_equal(prev.direction().dot(cur.direction()), 1.0) {
        return false;
    }
    if !is_equal(prev.acceleration_hint, cur.acceleration_hint) {
        return false;
    }
    if !prev.jerk_hint.all_close(cur.jerk_hint, crate::vector3::EPSILON) {
        return false;
    }
    if prev.kind.is_extrusion_kind() {
        if !is_equal_eps(extrusion_rate(prev), extrusion_rate(cur), config.extrusion.epsilon) {
            return false;
        }
        if !is_equal(prev.extrude_jerk_hint, cur.extrude_jerk_hint) {
            return false;
        }
    }
    true
}

fn merge_into(prev: &mut Movement, cur: &Movement) {
    prev.end_position = cur.end_position;
    if prev.kind.is_extrusion_kind() {
        let summed = prev.kind.extrude() + cur.kind.extrude();
        prev.kind.set_extrude(summed);
    }
}

/// Single forward pass: merges each movement into the last kept output
/// movement when `mergeable` holds, otherwise appends it as a new command.
/// A delay-inducing instruction (or indeed any non-movement command, per
/// the source's literal type-match check) is appended unchanged and
/// prevents the movement before and after it from merging.
pub fn coalesce(stream: Stream, config: &Config, diagnostics: &mut Diagnostics) -> Stream {
    let commands = stream.into_commands();
    let mut out: Vec<Command> = Vec::with_capacity(commands.len());

    for command in commands {
        if let Command::Movement(cur) = &command {
            if let Some(Command::Movement(prev)) = out.last_mut() {
                if mergeable(prev, cur, config) {
                    merge_into(prev, cur);
                    diagnostics.coalesced_pairs += 1;
                    continue;
                }
            }
        }
        out.push(command);
    }

    Stream::from_commands(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vector3::Vector3;

    fn extrusion(x0: f64, x1: f64, feedrate: f64, extrude: f64) -> Command {
        Command::Movement(Movement::new(
            MovementKind::ExtrusionMove { extrude },
            Vector3::new(x0, 0.0, 0.0),
            Vector3::new(x1, 0.0, 0.0),
            feedrate,
        ))
    }

    #[test]
    fn merges_collinear_same_rate_extrusions() {
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut stream = Stream::new();
        stream.push(extrusion(0.0, 10.0, 1200.0, 1.0));
        stream.push(extrusion(10.0, 20.0, 1200.0, 1.0));

        let merged = coalesce(stream, &config, &mut diagnostics);

        assert_eq!(merged.len(), 1);
        assert_eq!(diagnostics.coalesced_pairs, 1);
        let m = merged.get(0).unwrap().as_movement().unwrap();
        assert_eq!(m.end_position, Vector3::new(20.0, 0.0, 0.0));
        assert_eq!(m.kind.extrude(), 2.0);
    }

    #[test]
    fn does_not_merge_across_differing_feedrate() {
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut stream = Stream::new();
        stream.push(extrusion(0.0, 10.0, 1200.0, 1.0));
        stream.push(extrusion(10.0, 20.0, 1800.0, 1.0));

        let merged = coalesce(stream, &config, &mut diagnostics);

        assert_eq!(merged.len(), 2);
        assert_eq!(diagnostics.coalesced_pairs, 0);
    }

    #[test]
    fn does_not_merge_reversed_direction() {
        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        let mut stream = Stream::new();
        stream.push(extrusion(0.0, 10.0, 1200.0, 1.0));
        stream.push(extrusion(10.0, 0.0, 1200.0, 1.0));

        let merged = coalesce(stream, &config, &mut diagnostics);

        assert_eq!(merged.len(), 2);
    }
}
