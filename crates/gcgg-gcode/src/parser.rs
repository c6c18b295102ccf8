//! Command-word dispatch, generalized from `klipper-host`'s
//! `GCodeDispatcher` match-on-command-string shape to the full code table,
//! and grounded in detail on `gcode/gcode.cpp`'s `process` loop: the running
//! parser state (feedrate, per-kind acceleration, jerk, absolute/relative
//! positioning and extrusion, the temperature/fan redundancy maps) that
//! turns a flat token stream into typed [`gcgg_core::Command`] values.
//!
//! `M204`/`M205`/`G90`/`G91`/`M82`/`M83` never become `Command`s themselves —
//! the source only ever folds them into local state used to populate the
//! *next* movement's hints, never pushes them to its output vector. This
//! parser does the same; `Instruction::SetPositioningMode`,
//! `SetExtrusionMode`, `AccelerationLimits`, and `JerkLimits` exist on
//! `gcgg_core::Instruction` but are never constructed here.

use std::collections::HashMap;

use gcgg_core::command::{Command, Instruction, Movement, MovementKind};
use gcgg_core::config::Config;
use gcgg_core::vector3::Vector3;

use crate::error::ParseError;
use crate::tokenizer::{tokenize, GcodeLine};

struct ParserState {
    position: Vector3,
    absolute_mode: bool,
    relative_extrusion: bool,
    current_extrusion: f64,

    feedrate: f64,
    print_accel: f64,
    travel_accel: f64,
    retract_accel: f64,
    acceleration: Vector3,
    jerk: Vector3,
    extrude_jerk: f64,

    extruder_temp: HashMap<u32, u32>,
    bed_temp: HashMap<u32, u32>,
    fan_speeds: HashMap<u32, u32>,
}

impl ParserState {
    fn new(config: &Config) -> Self {
        ParserState {
            position: Vector3::ZERO,
            absolute_mode: true,
            relative_extrusion: false,
            current_extrusion: 0.0,
            feedrate: config.defaults.feedrate.z,
            print_accel: config.defaults.acceleration.max_element(),
            travel_accel: config.defaults.acceleration.max_element(),
            retract_accel: config.defaults.extrusion_acceleration,
            acceleration: config.defaults.acceleration,
            jerk: config.defaults.jerk,
            extrude_jerk: config.defaults.extrusion_jerk,
            extruder_temp: HashMap::new(),
            bed_temp: HashMap::new(),
            fan_speeds: HashMap::new(),
        }
    }

    /// `gcgg.cpp::extract_position`: absolute mode reads each present axis
    /// as a new coordinate; relative mode reads it as a delta.
    fn extract_position(&mut self, line: &GcodeLine) {
        if self.absolute_mode {
            self.position.x = line.get_f64("X", self.position.x);
            self.position.y = line.get_f64("Y", self.position.y);
            self.position.z = line.get_f64("Z", self.position.z);
        } else {
            self.position.x += line.get_f64("X", 0.0);
            self.position.y += line.get_f64("Y", 0.0);
            self.position.z += line.get_f64("Z", 0.0);
        }
    }

    fn hints(&self, accel: f64) -> (f64, Vector3, Vector3, f64) {
        (accel, self.acceleration.min_with(accel), self.jerk, self.extrude_jerk)
    }
}

fn apply_hints(m: &mut Movement, accel_hint: f64, accel_axes: Vector3, jerk: Vector3, extrude_jerk: f64) {
    m.acceleration_hint = accel_hint;
    m.acceleration_axes = accel_axes;
    m.jerk_hint = jerk;
    m.extrude_jerk_hint = extrude_jerk;
}

fn dispatch_g0(state: &mut ParserState, line: &GcodeLine, out: &mut Vec<Command>) {
    let start = state.position;
    let has_z = line.has_argument_not("Z", start.z);
    let has_xy = line.has_argument_not("X", start.x) || line.has_argument_not("Y", start.y);

    state.feedrate = line.get_f64("F", state.feedrate);
    state.extract_position(line);

    if has_xy {
        let (accel, axes, jerk, extrude_jerk) = state.hints(state.travel_accel);
        let mut m = Movement::new(MovementKind::Travel, start, state.position, state.feedrate);
        apply_hints(&mut m, accel, axes, jerk, extrude_jerk);
        out.push(Command::Movement(m));
    } else if has_z {
        let (accel, axes, jerk, extrude_jerk) = state.hints(state.travel_accel);
        let mut m = Movement::new(MovementKind::Hop, start, state.position, state.feedrate);
        apply_hints(&mut m, accel, axes, jerk, extrude_jerk);
        out.push(Command::Movement(m));
    }
}

fn dispatch_g1(state: &mut ParserState, line: &GcodeLine, config: &Config, out: &mut Vec<Command>) {
    let start = state.position;
    let has_extrude = line.has_argument("E") && line.get_f64("E", 0.0) != 0.0;
    let has_z = line.has_argument_not("Z", start.z);
    let has_xy = line.has_argument_not("X", start.x) || line.has_argument_not("Y", start.y);
    let has_xyz = has_xy || has_z;

    state.feedrate = line.get_f64("F", state.feedrate);
    state.extract_position(line);

    if has_extrude {
        let e = line.get_f64("E", 0.0);
        let extrude = if state.relative_extrusion {
            state.current_extrusion += e;
            e
        } else {
            let delta = e - state.current_extrusion;
            state.current_extrusion = e;
            delta
        };

        if has_xyz {
            let (accel, axes, jerk, extrude_jerk) = state.hints(state.print_accel);
            let mut m = Movement::new(MovementKind::ExtrusionMove { extrude }, start, state.position, state.feedrate);
            apply_hints(&mut m, accel, axes, jerk, extrude_jerk);
            out.push(Command::Movement(m));
        } else {
            let (accel, axes, jerk, extrude_jerk) = state.hints(state.retract_accel);
            let mut m = Movement::new(MovementKind::Extrusion { extrude }, start, start, state.feedrate);
            apply_hints(&mut m, accel, axes, jerk, extrude_jerk);
            out.push(Command::Movement(m));
        }
    } else if has_xy {
        let kind = if config.options.all_no_extrude_as_travel { MovementKind::Travel } else { MovementKind::Linear };
        let (accel, axes, jerk, extrude_jerk) = state.hints(state.print_accel);
        let mut m = Movement::new(kind, start, state.position, state.feedrate);
        apply_hints(&mut m, accel, axes, jerk, extrude_jerk);
        out.push(Command::Movement(m));
    } else if has_z {
        let (accel, axes, jerk, extrude_jerk) = state.hints(state.travel_accel);
        let mut m = Movement::new(MovementKind::Hop, start, state.position, state.feedrate);
        apply_hints(&mut m, accel, axes, jerk, extrude_jerk);
        out.push(Command::Movement(m));
    }
}

fn dispatch_g28(state: &mut ParserState, line: &GcodeLine, out: &mut Vec<Command>) {
    let mut x = line.has_argument("X");
    let mut y = line.has_argument("Y");
    let mut z = line.has_argument("Z");
    if !x && !y && !z {
        x = true;
        y = true;
        z = true;
    }
    if x {
        state.position.x = 0.0;
    }
    if y {
        state.position.y = 0.0;
    }
    if z {
        state.position.z = 0.0;
    }
    out.push(Command::Instruction(Instruction::Home { x, y, z }));
}

fn dispatch_m204(state: &mut ParserState, line: &GcodeLine) {
    if line.has_argument("S") {
        // Legacy combined accel, still emitted by some slicers (Cura).
        let s = line.get_f64("S", 0.0);
        state.print_accel = s;
        state.travel_accel = s;
    }
    state.print_accel = line.get_f64("P", state.print_accel);
    state.travel_accel = line.get_f64("T", state.travel_accel);
    state.retract_accel = line.get_f64("R", state.retract_accel);
}

fn dispatch_m205(state: &mut ParserState, line: &GcodeLine) {
    state.jerk.x = line.get_f64("X", state.jerk.x);
    state.jerk.y = line.get_f64("Y", state.jerk.y);
    state.jerk.z = line.get_f64("Z", state.jerk.z);
    state.extrude_jerk = line.get_f64("E", state.extrude_jerk);
}

/// Redundancy elimination for the temperature/fan instructions: a command
/// is dropped outright when its target value equals what
/// the matching index already holds, mirroring `gcode.cpp`'s per-map
/// `uint(-1)`-sentinel comparison (recast here as a missing-key lookup with
/// an explicit "no prior value" default rather than a magic sentinel).
fn redundant(map: &mut HashMap<u32, u32>, index: u32, value: u32) -> bool {
    if map.get(&index) == Some(&value) {
        true
    } else {
        map.insert(index, value);
        false
    }
}

pub fn parse(text: &str, config: &Config) -> Result<Vec<Command>, ParseError> {
    let lines = tokenize(text);
    let mut state = ParserState::new(config);
    let mut out = Vec::with_capacity(lines.len());

    for line in &lines {
        match line.command.as_str() {
            "G0" => dispatch_g0(&mut state, line, &mut out),
            "G1" => dispatch_g1(&mut state, line, config, &mut out),
            "G28" => dispatch_g28(&mut state, line, &mut out),
            "G90" => state.absolute_mode = true,
            "G91" => state.absolute_mode = false,
            "M82" => state.relative_extrusion = false,
            "M83" => state.relative_extrusion = true,
            "M84" => {
                let delay = line.get_u32("S", 0)?;
                let delay_seconds = if delay != 0 { Some(delay as f64) } else { None };
                out.push(Command::Instruction(Instruction::DisableSteppers { delay_seconds }));
            }
            "M104" | "M109" => {
                let wait = line.command == "M109";
                let index = line.get_u32("P", 0)?;
                let celsius = line.get_f64("S", f64::NAN);
                if celsius.is_nan() {
                    continue;
                }
                let accurate = if wait { line.args.get("R").copied() } else { None };
                if redundant(&mut state.extruder_temp, index, celsius as u32) {
                    continue;
                }
                out.push(Command::Instruction(Instruction::SetExtruderTemperature {
                    index,
                    celsius,
                    wait,
                    accurate,
                }));
            }
            "M106" => {
                let index = line.get_u32("P", 0)?;
                let speed = line.get_u32("S", 255)?.min(255) as u8;
                if redundant(&mut state.fan_speeds, index, speed as u32) {
                    continue;
                }
                out.push(Command::Instruction(Instruction::Fan { index, speed: Some(speed) }));
            }
            "M107" => {
                let index = line.get_u32("P", 0)?;
                if redundant(&mut state.fan_speeds, index, 0) {
                    continue;
                }
                out.push(Command::Instruction(Instruction::Fan { index, speed: None }));
            }
            "M140" | "M190" => {
                let wait = line.command == "M190";
                let index = line.get_u32("H", 0)?;
                let celsius = line.get_f64("S", f64::NAN);
                if celsius.is_nan() {
                    continue;
                }
                if redundant(&mut state.bed_temp, index, celsius as u32) {
                    continue;
                }
                out.push(Command::Instruction(Instruction::SetBedTemperature { index, celsius, wait }));
            }
            "M204" => dispatch_m204(&mut state, line),
            "M205" => dispatch_m205(&mut state, line),
            other => {
                out.push(Command::Instruction(Instruction::Unknown {
                    word: other.to_string(),
                    raw: reconstruct(line),
                }));
            }
        }
    }

    Ok(out)
}

/// Best-effort reconstruction of an unrecognized line's text, for the
/// pass-through `Instruction::Unknown`: unknown words are kept
/// verbatim, not silently dropped.
fn reconstruct(line: &GcodeLine) -> String {
    let mut out = line.command.clone();
    let mut args: Vec<(&String, &f64)> = line.args.iter().collect();
    args.sort_by(|a, b| a.0.cmp(b.0));
    for (key, value) in args {
        out.push(' ');
        out.push_str(key);
        out.push_str(&value.to_string());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn travel_move_with_xy_produces_travel_command() {
        let config = Config::default();
        let out = parse("G0 X10 Y20 F3000\n", &config).unwrap();
        assert_eq!(out.len(), 1);
        let m = out[0].as_movement().unwrap();
        assert!(matches!(m.kind, MovementKind::Travel));
        assert_eq!(m.end_position, Vector3::new(10.0, 20.0, 0.0));
    }

    #[test]
    fn z_only_travel_produces_hop() {
        let config = Config::default();
        let out = parse("G0 Z5\n", &config).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].as_movement().unwrap().kind, MovementKind::Hop));
    }

    #[test]
    fn extrusion_move_computes_delta_from_absolute_e_by_default() {
        let config = Config::default();
        let out = parse("G1 X10 E2\nG1 X20 E4\n", &config).unwrap();
        assert_eq!(out.len(), 2);
        let e0 = out[0].as_movement().unwrap().kind.extrude();
        let e1 = out[1].as_movement().unwrap().kind.extrude();
        assert_eq!(e0, 2.0);
        assert_eq!(e1, 2.0);
    }

    #[test]
    fn extrude_only_move_produces_extrusion_kind() {
        let config = Config::default();
        let out = parse("G1 E5\n", &config).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(out[0].as_movement().unwrap().kind, MovementKind::Extrusion { .. }));
    }

    #[test]
    fn home_defaults_to_all_axes() {
        let config = Config::default();
        let out = parse("G28\n", &config).unwrap();
        assert_eq!(
            out[0],
            Command::Instruction(Instruction::Home { x: true, y: true, z: true })
        );
    }

    #[test]
    fn redundant_temperature_is_elided() {
        let config = Config::default();
        let out = parse("M104 S200\nM104 S200\nM104 S210\n", &config).unwrap();
        assert_eq!(out.len(), 2);
    }

    #[test]
    fn m204_m205_never_become_commands() {
        let config = Config::default();
        let out = parse("M204 P1500 T2000\nM205 X10 Y10 Z0.4 E5\nG0 X1\n", &config).unwrap();
        assert_eq!(out.len(), 1);
        let m = out[0].as_movement().unwrap();
        assert_eq!(m.acceleration_hint, 2000.0);
    }

    #[test]
    fn unknown_command_is_kept_verbatim() {
        let config = Config::default();
        let out = parse("T0\n", &config).unwrap();
        assert_eq!(out.len(), 1);
        assert!(matches!(&out[0], Command::Instruction(Instruction::Unknown { word, .. }) if word == "T0"));
    }

    #[test]
    fn negative_steppers_delay_is_rejected() {
        let config = Config::default();
        let err = parse("M84 S-1\n", &config).unwrap_err();
        assert!(matches!(err, ParseError::NegativeUnsignedArgument { .. }));
    }
}
