//! Per-segment feedrate/jerk propagation.
//! Run twice over the stream — once before corner-arc insertion with jerk
//! enforcement relaxed, once after arc subdivision with it enforced — since
//! the corner-arc and accumulator stages need a plausible entry/exit
//! feedrate to carve against before the topology (and therefore the real
//! joins) stabilizes.
//!
//! Grounded on `segment/movement.cpp`'s `compute_motion`, generalized from a
//! single prev/next pointer pair to the stream's index-based linkage and
//! from scalar in-place fields to a `MotionData` computed per pass and
//! written back after all reads for that pass complete (the source reads
//! and writes through live pointers; doing that here under the borrow
//! checker would require pinning two mutable borrows into the same `Vec`,
//! so this collects results immutably first, then applies them).

pub mod trapezoid;

use crate::command::{Command, MotionData};
use crate::config::Config;
use crate::diagnostics::Diagnostics;
use crate::stream::Stream;
use crate::vector3::{is_equal, Vector3};

/// The jerk-bounded velocity reachable from rest along `direction`, scaled
/// down on whichever axis would otherwise exceed its jerk budget.
fn jerk_limited_velocity(direction: Vector3, jerk_budget: Vector3) -> Vector3 {
    let max_d = direction.abs().max_element();
    if max_d <= 0.0 {
        return Vector3::ZERO;
    }
    let max_j = jerk_budget.abs().max_element();
    let mut v = direction * (max_j / max_d);

    let mut scale = 1.0_f64;
    for (axis, budget) in [(v.x, jerk_budget.x), (v.y, jerk_budget.y), (v.z, jerk_budget.z)] {
        if budget > 0.0 && axis.abs() > budget {
            scale = scale.min(budget / axis.abs());
        }
    }
    v * scale
}

fn jerk_bounded_start(direction: Vector3, jerk: Vector3) -> f64 {
    jerk_limited_velocity(direction, jerk).length()
}

fn jerk_bounded_stop(direction: Vector3, jerk: Vector3) -> f64 {
    jerk_limited_velocity(direction, jerk * 0.5).length()
}

fn is_jerkable(candidate: Vector3, target: Vector3, jerk: Vector3) -> bool {
    (candidate.x - target.x).abs() <= jerk.x
        && (candidate.y - target.y).abs() <= jerk.y
        && (candidate.z - target.z).abs() <= jerk.z
}

/// Per-axis divisor `v_i / v_next_i`, undefined when either side is zero.
fn axis_divisor(from: f64, to: f64) -> Option<f64> {
    if from == 0.0 || to == 0.0 {
        None
    } else {
        Some(from / to)
    }
}

/// Resolves the exit feedrate for a non-collinear join by scaling the
/// current segment's velocity toward the successor's by the mean of the
/// defined per-axis divisors. When `enforce_jerk` is false
/// (the pre-arc-generation pass) the candidate is accepted unconditionally
/// once it exists; otherwise it must pass the per-axis jerk test, with an
/// optional hill-climb refinement when `brute_force` is set.
fn resolve_join_exit(
    velocity: Vector3,
    next_velocity: Vector3,
    jerk: Vector3,
    enforce_jerk: bool,
    brute_force: bool,
) -> Option<f64> {
    if velocity.is_inverted(next_velocity) {
        return None;
    }

    let divisors: Vec<f64> = [
        axis_divisor(velocity.x, next_velocity.x),
        axis_divisor(velocity.y, next_velocity.y),
        axis_divisor(velocity.z, next_velocity.z),
    ]
    .into_iter()
    .flatten()
    .collect();

    if divisors.is_empty() {
        return None;
    }
    let mean_divisor = divisors.iter().sum::<f64>() / divisors.len() as f64;
    if mean_divisor == 0.0 {
        return None;
    }

    let candidate = velocity / mean_divisor;

    if !enforce_jerk {
        return Some(candidate.length());
    }
    if is_jerkable(candidate, next_velocity, jerk) {
        return Some(candidate.length());
    }
    if !brute_force {
        return None;
    }

    let mut best: Option<(f64, f64)> = None;
    for sign in [1.0_f64, -1.0] {
        let mut divisor = mean_divisor;
        let mut prev_diff = (candidate - next_velocity).length();
        loop {
            let step = divisor * 0.001 * sign;
            let next_divisor = divisor + step;
            if next_divisor == 0.0 {
                break;
            }
            let next_candidate = velocity / next_divisor;
            let diff = (next_candidate - next_velocity).length();
            if diff >= prev_diff {
                break;
            }
            divisor = next_divisor;
            prev_diff = diff;
            if is_jerkable(next_candidate, next_velocity, jerk) {
                let entry = (diff, next_candidate.length());
                best = Some(match best {
                    Some(b) if b.0 <= entry.0 => b,
                    _ => entry,
                });
            }
        }
    }
    best.map(|(_, feedrate)| feedrate)
}

/// Runs one planner pass over the whole stream, writing `Movement::motion`
/// for every segment. `enforce_jerk` distinguishes the initial (pre-arc)
/// pass from the final (post-subdivision) pass.
pub fn plan(stream: &mut Stream, config: &Config, enforce_jerk: bool, diagnostics: &mut Diagnostics) {
    let n = stream.len();
    let mut results: Vec<Option<MotionData>> = vec![None; n];

    for i in 0..n {
        let Some(Command::Movement(m)) = stream.get(i) else {
            continue;
        };

        let direction = m.direction();
        let velocity = m.velocity();

        let entry_feedrate = match m.linkage.prev {
            Some(p) => stream
                .get(p)
                .and_then(Command::as_movement)
                .map(|pm| pm.motion.exit_feedrate)
                .unwrap_or(0.0),
            None => jerk_bounded_start(direction, m.jerk_hint),
        };

        let exit_feedrate = match m.linkage.next {
            Some(next_idx) => {
                let next_m = stream.get(next_idx).and_then(Command::as_movement);
                match next_m {
                    Some(next_m) => {
                        let next_velocity = next_m.velocity();
                        let next_direction = next_m.direction();
                        if is_equal(direction.dot(next_direction), 1.0) {
                            next_velocity.length()
                        } else {
                            match resolve_join_exit(
                                velocity,
                                next_velocity,
                                m.jerk_hint,
                                enforce_jerk,
                                config.options.brute_force_feedrate,
                            ) {
                                Some(feedrate) => feedrate,
                                None => {
                                    if enforce_jerk {
                                        diagnostics.jerk_infeasible_joins += 1;
                                    }
                                    0.0
                                }
                            }
                        }
                    }
                    None => jerk_bounded_stop(direction, m.jerk_hint),
                }
            }
            None => jerk_bounded_stop(direction, m.jerk_hint),
        };

        results[i] = Some(MotionData {
            computed: true,
            entry_feedrate,
            plateau_feedrate: m.feedrate,
            exit_feedrate,
        });
    }

    for (i, result) in results.into_iter().enumerate() {
        if let Some(motion) = result {
            if let Some(Command::Movement(m)) = stream.commands_mut().get_mut(i) {
                m.motion = motion;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{Movement, MovementKind};

    fn movement(start: Vector3, end: Vector3, feedrate: f64, jerk: Vector3) -> Command {
        let mut m = Movement::new(MovementKind::ExtrusionMove { extrude: 1.0 }, start, end, feedrate);
        m.jerk_hint = jerk;
        Command::Movement(m)
    }

    #[test]
    fn reversal_zeroes_both_sides_and_counts_a_diagnostic() {
        let mut stream = Stream::new();
        stream.push(movement(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            3000.0,
            Vector3::new(20.0, 20.0, 20.0),
        ));
        stream.push(movement(
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(0.0, 0.0, 0.0),
            3000.0,
            Vector3::new(20.0, 20.0, 20.0),
        ));
        stream.link();

        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        plan(&mut stream, &config, true, &mut diagnostics);

        let m0 = stream.get(0).unwrap().as_movement().unwrap();
        let m1 = stream.get(1).unwrap().as_movement().unwrap();
        assert_eq!(m0.motion.exit_feedrate, 0.0);
        assert_eq!(m1.motion.entry_feedrate, 0.0);
        assert_eq!(diagnostics.jerk_infeasible_joins, 1);
    }

    #[test]
    fn collinear_join_passes_successor_feedrate_through() {
        let mut stream = Stream::new();
        stream.push(movement(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            1000.0,
            Vector3::new(20.0, 20.0, 20.0),
        ));
        stream.push(movement(
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(20.0, 0.0, 0.0),
            2000.0,
            Vector3::new(20.0, 20.0, 20.0),
        ));
        stream.link();

        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        plan(&mut stream, &config, true, &mut diagnostics);

        let m0 = stream.get(0).unwrap().as_movement().unwrap();
        assert_eq!(m0.motion.exit_feedrate, 2000.0);
    }

    #[test]
    fn unterminated_run_ramps_down_to_jerk_bounded_stop() {
        let mut stream = Stream::new();
        stream.push(movement(
            Vector3::new(0.0, 0.0, 0.0),
            Vector3::new(10.0, 0.0, 0.0),
            3000.0,
            Vector3::new(10.0, 10.0, 10.0),
        ));
        stream.link();

        let config = Config::default();
        let mut diagnostics = Diagnostics::new();
        plan(&mut stream, &config, true, &mut diagnostics);

        let m0 = stream.get(0).unwrap().as_movement().unwrap();
        assert!(m0.motion.exit_feedrate > 0.0);
        assert!(m0.motion.exit_feedrate <= 10.0 * 3.0_f64.sqrt() + 1e-6);
    }
}
