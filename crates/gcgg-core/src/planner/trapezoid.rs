//! Trapezoidal/triangular velocity-profile solver. Given the three
//! feedrates bounding a segment and its travel distance, works out how long
//! each ramp takes and whether a plateau is reachable at all.

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrapezoidInput {
    pub start_speed: f64,
    pub plateau_speed: f64,
    pub end_speed: f64,
    pub distance: f64,
    pub acceleration: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Trapezoid {
    pub start_speed: f64,
    pub plateau_speed: f64,
    pub end_speed: f64,
    pub ramp_time: [f64; 2],
    pub ramp_distance: [f64; 2],
    pub plateau_time: f64,
    pub plateau_distance: f64,
}

fn sq(v: f64) -> f64 {
    v * v
}

/// `ramp_distance` for a ramp lasting `time` at starting speed `from_speed`
/// under `accel` (zero time ⇒ zero distance, avoiding a NaN from `0 * inf`).
fn ramp_distance(from_speed: f64, accel: f64, time: f64) -> f64 {
    if time == 0.0 {
        0.0
    } else {
        from_speed * time + 0.5 * accel * time * time
    }
}

impl Trapezoid {
    pub fn solve(input: TrapezoidInput) -> Trapezoid {
        if input.acceleration <= 0.0 {
            return Trapezoid {
                start_speed: input.start_speed,
                plateau_speed: input.plateau_speed,
                end_speed: input.end_speed,
                ramp_time: [0.0, 0.0],
                ramp_distance: [0.0, 0.0],
                plateau_time: if input.plateau_speed > 0.0 {
                    input.distance / input.plateau_speed
                } else {
                    0.0
                },
                plateau_distance: input.distance,
            };
        }

        let accel = input.acceleration;
        let ramp_speed_diff = [
            input.plateau_speed - input.start_speed,
            input.end_speed - input.plateau_speed,
        ];
        let ramp_times = [ramp_speed_diff[0].abs() / accel, ramp_speed_diff[1].abs() / accel];
        let ramp_distances = [
            ramp_distance(input.start_speed, accel, ramp_times[0]),
            ramp_distance(input.plateau_speed, accel, ramp_times[1]),
        ];
        let total_ramp_distance = ramp_distances[0] + ramp_distances[1];

        if total_ramp_distance <= input.distance {
            let plateau_distance = input.distance - total_ramp_distance;
            let plateau_time = if input.plateau_speed > 0.0 {
                plateau_distance / input.plateau_speed
            } else {
                0.0
            };
            return Trapezoid {
                start_speed: input.start_speed,
                plateau_speed: input.plateau_speed,
                end_speed: input.end_speed,
                ramp_time: ramp_times,
                ramp_distance: ramp_distances,
                plateau_time,
                plateau_distance,
            };
        }

        // Triangle: the plateau collapses. Solve for the achievable peak.
        if total_ramp_distance == input.distance {
            return Trapezoid {
                start_speed: input.start_speed,
                plateau_speed: input.plateau_speed,
                end_speed: input.end_speed,
                ramp_time: ramp_times,
                ramp_distance: ramp_distances,
                plateau_time: 0.0,
                plateau_distance: 0.0,
            };
        }

        if ramp_distances[0] <= 0.0 && ramp_distances[1] <= 0.0 {
            // start == plateau == end: a pure constant-velocity pass.
            let plateau_time = if input.plateau_speed > 0.0 {
                input.distance / input.plateau_speed
            } else {
                0.0
            };
            return Trapezoid {
                start_speed: input.start_speed,
                plateau_speed: input.plateau_speed,
                end_speed: input.end_speed,
                ramp_time: [0.0, 0.0],
                ramp_distance: [0.0, 0.0],
                plateau_time,
                plateau_distance: input.distance,
            };
        }

        if ramp_distances[0] <= 0.0 || ramp_distances[1] <= 0.0 {
            // Single-ramp triangle: only one side actually needs a ramp.
            let signed_accel = if input.start_speed <= input.end_speed { accel } else { -accel };
            let root = (2.0 * signed_accel * input.distance + sq(input.start_speed)).sqrt();
            let time = ((root - input.start_speed) / signed_accel)
                .max((-(root + input.start_speed)) / signed_accel);
            let peak = if time > 0.0 { input.distance / time } else { 0.0 };

            return if ramp_distances[0] <= 0.0 {
                Trapezoid {
                    start_speed: input.start_speed,
                    plateau_speed: peak,
                    end_speed: input.end_speed,
                    ramp_time: [0.0, time],
                    ramp_distance: [0.0, input.distance],
                    plateau_time: 0.0,
                    plateau_distance: 0.0,
                }
            } else {
                Trapezoid {
                    start_speed: input.start_speed,
                    plateau_speed: peak,
                    end_speed: input.end_speed,
                    ramp_time: [time, 0.0],
                    ramp_distance: [input.distance, 0.0],
                    plateau_time: 0.0,
                    plateau_distance: 0.0,
                }
            };
        }

        // General triangle: solve the closed form for the reachable peak speed.
        let discriminant = 2.0 * input.distance * accel + sq(input.start_speed) - sq(input.end_speed);
        let root = discriminant.max(0.0).sqrt();
        let candidates = [
            0.5 * (2.0 * input.start_speed - 2f64.sqrt() * root),
            0.5 * (2f64.sqrt() * root + 2.0 * input.start_speed),
        ];
        let peak = candidates[0].max(candidates[1]);

        let new_ramp_speed_diff = [peak - input.start_speed, input.end_speed - peak];
        let new_ramp_times = [new_ramp_speed_diff[0] / accel, new_ramp_speed_diff[1] / accel];
        let new_ramp_distances = [
            ramp_distance(input.start_speed, accel, new_ramp_times[0]),
            ramp_distance(peak, accel, new_ramp_times[1]),
        ];

        Trapezoid {
            start_speed: input.start_speed,
            plateau_speed: peak,
            end_speed: input.end_speed,
            ramp_time: new_ramp_times,
            ramp_distance: new_ramp_distances,
            plateau_time: 0.0,
            plateau_distance: 0.0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reaches_plateau_when_distance_is_ample() {
        let t = Trapezoid::solve(TrapezoidInput {
            start_speed: 0.0,
            plateau_speed: 100.0,
            end_speed: 0.0,
            distance: 1000.0,
            acceleration: 50.0,
        });
        assert!(t.plateau_distance > 0.0);
        assert!(t.plateau_time > 0.0);
    }

    #[test]
    fn collapses_to_triangle_when_distance_is_short() {
        let t = Trapezoid::solve(TrapezoidInput {
            start_speed: 0.0,
            plateau_speed: 500.0,
            end_speed: 0.0,
            distance: 1.0,
            acceleration: 50.0,
        });
        assert_eq!(t.plateau_distance, 0.0);
        assert!(t.plateau_speed < 500.0);
        assert!(t.plateau_speed > 0.0);
    }

    #[test]
    fn constant_velocity_when_all_speeds_equal() {
        let t = Trapezoid::solve(TrapezoidInput {
            start_speed: 200.0,
            plateau_speed: 200.0,
            end_speed: 200.0,
            distance: 50.0,
            acceleration: 1000.0,
        });
        assert_eq!(t.ramp_distance, [0.0, 0.0]);
        assert!((t.plateau_time - 0.25).abs() < 1e-9);
    }

    #[test]
    fn zero_acceleration_is_a_constant_velocity_pass() {
        let t = Trapezoid::solve(TrapezoidInput {
            start_speed: 10.0,
            plateau_speed: 10.0,
            end_speed: 10.0,
            distance: 20.0,
            acceleration: 0.0,
        });
        assert_eq!(t.plateau_distance, 20.0);
        assert!((t.plateau_time - 2.0).abs() < 1e-9);
    }
}
