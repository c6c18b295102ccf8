//! Stateful G-code serialization: suppresses unchanged axes and pacing
//! fields, tracks the last-emitted state, and formats arcs either as a
//! single directive or flattened short moves.
//!
//! Grounded on `segment/travel.hpp`, `segment/extrusion_move.hpp`,
//! `segment/extrusion.hpp`, `segment/hop.hpp` (the `M204`/`M205`
//! state-diffing pattern, the `config::format::gcode`-vs-extended `F`/`A`
//! split) and `segment/arc_accumulator.hpp`'s `out_gcode` (`G2`/`G3`
//! handedness, signed-radius major-arc convention). `output/gcode_out.cpp`
//! grounds the fixed `G21`/`G90`/`M83` preamble. The non-subdivided-arc
//! fallback (flattening to plain move lines with a trailing `; arc` comment)
//! degrades gracefully instead of treating "arc reached the emitter
//! un-subdivided and G15 is off" as a program invariant violation.

use std::fmt::Write as _;

use crate::command::{
    AccumulatedMovement, ArcData, Command, Instruction, Movement, MovementKind, MovementKindTag,
};
use crate::config::{Config, OutputFormat};
use crate::stream::Stream;
use crate::vector3::Vector3;

/// Mirrors `output::state` (`output/state.hpp`): the running machine state
/// the serializer diffs each command against so it only emits the `M204`/
/// `M205`/axis fields that actually changed.
struct EmitState {
    feedrate: f64,
    print_accel: f64,
    travel_accel: f64,
    retract_accel: f64,
    jerk: Vector3,
    extrude_jerk: f64,
    position: Vector3,
}

impl EmitState {
    fn new() -> Self {
        EmitState {
            feedrate: 0.0,
            print_accel: 0.0,
            travel_accel: 0.0,
            retract_accel: 0.0,
            jerk: Vector3::ZERO,
            extrude_jerk: 0.0,
            position: Vector3::ZERO,
        }
    }
}

/// Formats with eight fractional digits, then strips trailing zeros and (if
/// every fractional digit was a zero) the decimal point — `platform/math.hpp`'s
/// `trim_float`, ported from in-place buffer surgery to a string transform.
fn trim_float(value: f64) -> String {
    let mut s = format!("{:.8}", value);
    if s.contains('.') {
        while s.ends_with('0') {
            s.pop();
        }
        if s.ends_with('.') {
            s.pop();
        }
    }
    s
}

fn push_field(out: &mut String, letter: char, value: f64) {
    out.push(' ');
    out.push(letter);
    out.push_str(&trim_float(value));
}

/// Emits the `M204`/`M205` pacing lines common to every movement kind, per
/// `travel.hpp`/`extrusion_move.hpp`/`hop.hpp`/`extrusion.hpp`'s shared
/// shape. `accel_letter` selects which state field (and gcode letter) the
/// acceleration hint targets: `T` for travel, `P` for print moves, `R` for
/// retract-only (extrusion-only) moves.
fn emit_pacing(out: &mut String, state: &mut EmitState, m: &Movement, accel_letter: char) {
    let moved = (
        m.start_position.x != m.end_position.x,
        m.start_position.y != m.end_position.y,
        m.start_position.z != m.end_position.z,
    );

    // `extrusion.hpp`'s retract-only moves fold the acceleration hint into
    // the `M205` line's `R` field instead of a separate `M204` (the only
    // movement kind that does this); every other kind emits `M204` on its
    // own line first, keyed by `accel_letter`.
    if accel_letter == 'R' {
        let accel_changed = m.acceleration_hint != state.retract_accel && m.acceleration_hint != 0.0;
        let extrude_jerk_changed = m.extrude_jerk_hint != state.extrude_jerk && m.extrude_jerk_hint != 0.0;
        if accel_changed || extrude_jerk_changed {
            out.push_str("M205");
            if accel_changed {
                state.retract_accel = m.acceleration_hint;
                push_field(out, 'R', m.acceleration_hint);
            }
            if extrude_jerk_changed {
                state.extrude_jerk = m.extrude_jerk_hint;
                push_field(out, 'E', m.extrude_jerk_hint);
            }
            out.push('\n');
        }
        return;
    }

    let accel_state = if accel_letter == 'T' { &mut state.travel_accel } else { &mut state.print_accel };
    if m.acceleration_hint != *accel_state && m.acceleration_hint != 0.0 {
        *accel_state = m.acceleration_hint;
        out.push_str("M204");
        push_field(out, accel_letter, m.acceleration_hint);
        out.push('\n');
    }

    let extrude_jerk_changed = m.extrude_jerk_hint != state.extrude_jerk && m.extrude_jerk_hint != 0.0;
    let axis_jerk_changed = (moved.0 && m.jerk_hint.x != state.jerk.x && m.jerk_hint.x != 0.0)
        || (moved.1 && m.jerk_hint.y != state.jerk.y && m.jerk_hint.y != 0.0)
        || (moved.2 && m.jerk_hint.z != state.jerk.z && m.jerk_hint.z != 0.0);

    if !extrude_jerk_changed && !axis_jerk_changed {
        return;
    }

    out.push_str("M205");
    if accel_letter == 'P' && extrude_jerk_changed {
        push_field(out, 'E', m.extrude_jerk_hint);
        state.extrude_jerk = m.extrude_jerk_hint;
    }
    if moved.0 && m.jerk_hint.x != state.jerk.x && m.jerk_hint.x != 0.0 {
        push_field(out, 'X', m.jerk_hint.x);
        state.jerk.x = m.jerk_hint.x;
    }
    if moved.1 && m.jerk_hint.y != state.jerk.y && m.jerk_hint.y != 0.0 {
        push_field(out, 'Y', m.jerk_hint.y);
        state.jerk.y = m.jerk_hint.y;
    }
    if moved.2 && m.jerk_hint.z != state.jerk.z && m.jerk_hint.z != 0.0 {
        push_field(out, 'Z', m.jerk_hint.z);
        state.jerk.z = m.jerk_hint.z;
    }
    out.push('\n');
}

/// Emits the trailing feedrate field(s), branching on `output.format`
/// exactly as `travel.hpp`/`extrusion_move.hpp` do: the base dialect emits
/// a plain `F` only when the commanded feedrate changed; the extended
/// dialect emits `F` from the planned plateau feedrate and an additional
/// `A` carrying the planned exit feedrate whenever it differs.
fn emit_feedrate(out: &mut String, state: &mut EmitState, m: &Movement, cfg: &Config) {
    match cfg.output.format {
        OutputFormat::Base => {
            if m.feedrate != state.feedrate {
                state.feedrate = m.feedrate;
                push_field(out, 'F', m.feedrate);
            }
        }
        OutputFormat::Extended => {
            if m.motion.plateau_feedrate != state.feedrate {
                state.feedrate = m.motion.plateau_feedrate;
                push_field(out, 'F', m.motion.plateau_feedrate);
            }
            if m.motion.exit_feedrate != state.feedrate {
                push_field(out, 'A', m.motion.exit_feedrate);
            }
        }
    }
}

fn emit_axes(out: &mut String, state: &mut EmitState, m: &Movement) {
    if m.start_position.x != m.end_position.x {
        state.position.x = m.end_position.x;
        push_field(out, 'X', m.end_position.x);
    }
    if m.start_position.y != m.end_position.y {
        state.position.y = m.end_position.y;
        push_field(out, 'Y', m.end_position.y);
    }
    if m.start_position.z != m.end_position.z {
        state.position.z = m.end_position.z;
        push_field(out, 'Z', m.end_position.z);
    }
}

fn emit_travel(out: &mut String, state: &mut EmitState, m: &Movement, cfg: &Config) {
    emit_pacing(out, state, m, 'T');
    out.push_str("G0");
    emit_axes(out, state, m);
    emit_feedrate(out, state, m, cfg);
    out.push('\n');
}

fn emit_hop(out: &mut String, state: &mut EmitState, m: &Movement, cfg: &Config) {
    emit_pacing(out, state, m, 'T');
    out.push_str("G0");
    emit_axes(out, state, m);
    emit_feedrate(out, state, m, cfg);
    out.push('\n');
}

fn emit_linear(out: &mut String, state: &mut EmitState, m: &Movement, cfg: &Config) {
    emit_pacing(out, state, m, 'T');
    out.push_str("G0");
    emit_axes(out, state, m);
    emit_feedrate(out, state, m, cfg);
    out.push('\n');
}

fn emit_extrusion_move(out: &mut String, state: &mut EmitState, m: &Movement, extrude: f64, cfg: &Config) {
    emit_pacing(out, state, m, 'P');
    out.push_str("G1");
    push_field(out, 'E', extrude);
    emit_axes(out, state, m);
    emit_feedrate(out, state, m, cfg);
    out.push('\n');
}

fn emit_extrusion(out: &mut String, state: &mut EmitState, m: &Movement, extrude: f64, cfg: &Config) {
    emit_pacing(out, state, m, 'R');
    out.push_str("G1");
    push_field(out, 'E', extrude);
    emit_feedrate(out, state, m, cfg);
    out.push('\n');
}

/// `arc.hpp`'s `generate_G15` path: a single directive carrying the
/// endpoint position plus the two incident segments' per-axis entry/exit
/// velocities (`A`/`B`/`C` in, `D`/`E`/`F` out), letting the firmware
/// reconstruct the fillet itself instead of receiving pre-subdivided lines.
fn emit_arc_g15(out: &mut String, state: &mut EmitState, m: &Movement, arc: &ArcData) {
    out.push_str("G15");
    emit_axes(out, state, m);
    push_field(out, 'A', arc.parent_velocities.start.x);
    push_field(out, 'B', arc.parent_velocities.start.y);
    push_field(out, 'C', arc.parent_velocities.start.z);
    push_field(out, 'D', arc.parent_velocities.end.x);
    push_field(out, 'E', arc.parent_velocities.end.y);
    push_field(out, 'F', arc.parent_velocities.end.z);
    out.push('\n');
}

/// Appends one flattened movement line via `emit_movement_line`, then
/// rewrites its trailing newline into a trailing `; arc` line comment so the
/// reader can tell a flattened arc leg from an ordinary move.
fn emit_flattened_leg(out: &mut String, state: &mut EmitState, leg: &Movement, cfg: &Config) {
    let start = out.len();
    emit_movement_line(out, state, leg, cfg);
    if out.ends_with('\n') {
        out.truncate(out.len() - 1);
    }
    debug_assert!(out.len() >= start);
    out.push_str("; arc\n");
}

/// Flattens an un-subdivided corner `Arc` to its two incident move lines
/// when `G15` generation is off. Each incident side keeps its own
/// extrusion/feedrate as recorded on `ArcData`.
fn emit_arc_flattened(out: &mut String, state: &mut EmitState, m: &Movement, arc: &ArcData, cfg: &Config) {
    let sides = [
        (m.start_position, arc.corner, arc.extrude.start, arc.seg_feedrate.start),
        (arc.corner, m.end_position, arc.extrude.end, arc.seg_feedrate.end),
    ];
    for (start, end, extrude, feedrate) in sides {
        let mut leg = Movement::new(
            if extrude != 0.0 { MovementKind::ExtrusionMove { extrude } } else { MovementKind::Travel },
            start,
            end,
            feedrate,
        );
        leg.acceleration_hint = m.acceleration_hint;
        leg.jerk_hint = m.jerk_hint;
        leg.extrude_jerk_hint = m.extrude_jerk_hint;
        emit_flattened_leg(out, state, &leg, cfg);
    }
}

/// `arc_accumulator.hpp`'s `out_gcode`: a single `G2`/`G3` directive picked
/// by handedness, a signed `R` (negative when the fitted circle sweeps more
/// than half its circumference — the major-arc convention), the run's end
/// position, and the feedrate if it changed.
fn emit_arc_accumulator_directive(
    out: &mut String,
    state: &mut EmitState,
    m: &Movement,
    acc: &crate::command::ArcAccumulatorData,
    cfg: &Config,
) {
    use crate::command::Handedness;

    emit_pacing(out, state, m, if m.kind.extrude() != 0.0 { 'P' } else { 'T' });

    out.push_str(if acc.handedness == Handedness::Ccw { "G3" } else { "G2" });

    let radius = if acc.major_arc { -acc.radius } else { acc.radius };
    push_field(out, 'R', radius);
    emit_axes(out, state, m);
    emit_feedrate(out, state, m, cfg);
    out.push('\n');
}

fn emit_accumulated_leg(out: &mut String, state: &mut EmitState, leg: &AccumulatedMovement, cfg: &Config) {
    let kind = match leg.kind {
        MovementKindTag::Travel | MovementKindTag::Linear => MovementKind::Travel,
        MovementKindTag::Hop => MovementKind::Hop,
        MovementKindTag::Extrusion => MovementKind::Extrusion { extrude: leg.extrude.unwrap_or(0.0) },
        MovementKindTag::ExtrusionMove => MovementKind::ExtrusionMove { extrude: leg.extrude.unwrap_or(0.0) },
    };
    let mut m = Movement::new(kind, leg.start_position, leg.end_position, leg.feedrate);
    m.acceleration_hint = leg.acceleration_hint;
    m.jerk_hint = leg.jerk_hint;
    m.extrude_jerk_hint = leg.extrude_jerk_hint;
    emit_flattened_leg(out, state, &m, cfg);
}

fn emit_movement_line(out: &mut String, state: &mut EmitState, m: &Movement, cfg: &Config) {
    match &m.kind {
        MovementKind::Travel => emit_travel(out, state, m, cfg),
        MovementKind::Hop => emit_hop(out, state, m, cfg),
        MovementKind::Linear => emit_linear(out, state, m, cfg),
        MovementKind::Extrusion { extrude } => emit_extrusion(out, state, m, *extrude, cfg),
        MovementKind::ExtrusionMove { extrude } => emit_extrusion_move(out, state, m, *extrude, cfg),
        MovementKind::Arc(arc) => {
            if cfg.output.generate_g15 {
                emit_arc_g15(out, state, m, arc);
            } else {
                emit_arc_flattened(out, state, m, arc, cfg);
            }
        }
        MovementKind::ArcAccumulator(acc) => {
            if cfg.output.generate_g15 {
                emit_arc_accumulator_directive(out, state, m, acc, cfg);
            } else {
                for leg in &acc.segments {
                    emit_accumulated_leg(out, state, leg, cfg);
                }
            }
        }
    }
}

fn emit_instruction(out: &mut String, state: &mut EmitState, instruction: &Instruction) {
    match instruction {
        Instruction::Home { x, y, z } => {
            out.push_str("G28");
            let any = *x || *y || *z;
            if any && !(*x && *y && *z) {
                if *x {
                    out.push_str(" X");
                }
                if *y {
                    out.push_str(" Y");
                }
                if *z {
                    out.push_str(" Z");
                }
            }
            if *x {
                state.position.x = 0.0;
            }
            if *y {
                state.position.y = 0.0;
            }
            if *z {
                state.position.z = 0.0;
            }
            out.push('\n');
        }
        Instruction::DisableSteppers { delay_seconds } => {
            out.push_str("M84");
            if let Some(seconds) = delay_seconds {
                if *seconds != 0.0 {
                    let _ = write!(out, " S{}", *seconds as u64);
                }
            }
            out.push('\n');
        }
        Instruction::SetExtruderTemperature { index, celsius, wait, accurate } => {
            out.push_str(if *wait { "M109" } else { "M104" });
            if *index != 0 {
                let _ = write!(out, " P{}", index);
            }
            let _ = write!(out, " S{}", *celsius as u64);
            if *wait {
                if let Some(accurate) = accurate {
                    let _ = write!(out, " R{}", *accurate as u64);
                }
            }
            out.push('\n');
        }
        Instruction::Fan { index, speed } => {
            match speed {
                Some(speed) if *speed > 0 => {
                    out.push_str("M106");
                    if *index != 0 {
                        let _ = write!(out, " P{}", index);
                    }
                    if *speed != 255 {
                        let _ = write!(out, " S{}", speed);
                    }
                }
                _ => {
                    out.push_str("M107");
                    if *index != 0 {
                        let _ = write!(out, " P{}", index);
                    }
                }
            }
            out.push('\n');
        }
        Instruction::SetBedTemperature { index, celsius, wait } => {
            out.push_str(if *wait { "M190" } else { "M140" });
            if *index != 0 {
                let _ = write!(out, " P{}", index);
            }
            let _ = write!(out, " S{}", *celsius as u64);
            out.push('\n');
        }
        Instruction::SetPositioningMode { .. }
        | Instruction::SetExtrusionMode { .. }
        | Instruction::AccelerationLimits { .. }
        | Instruction::JerkLimits { .. } => {
            // These never reach the stream (`gcgg-gcode` folds them into
            // parser-local state, per `gcode.cpp`'s `M204`/`M205`/`G90`/`G91`/
            // `M82`/`M83` cases), but are handled here defensively in case a
            // future producer emits them directly.
        }
        Instruction::Unknown { raw, .. } => {
            out.push_str(raw);
            out.push('\n');
        }
    }
}

/// Serializes a planned, subdivided `Stream` to G-code text.
/// The fixed preamble (`gcode_out.cpp`) puts the machine into a known state
/// before the first command: millimeters, absolute positioning, relative
/// extrusion.
pub fn emit(stream: &Stream, config: &Config) -> String {
    let mut out = String::new();
    out.push_str("G21\n");
    out.push_str("G90\n");
    out.push_str("M83\n");

    let mut state = EmitState::new();

    for command in stream.commands() {
        match command {
            Command::Movement(m) => emit_movement_line(&mut out, &mut state, m, config),
            Command::Instruction(i) => emit_instruction(&mut out, &mut state, i),
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::{ArcEnds, Movement, MovementKind};
    use crate::vector3::Vector3;

    #[test]
    fn trim_float_strips_trailing_zeros_and_point() {
        assert_eq!(trim_float(1.0), "1");
        assert_eq!(trim_float(1.5), "1.5");
        assert_eq!(trim_float(0.10000000), "0.1");
        assert_eq!(trim_float(-2.0), "-2");
    }

    #[test]
    fn preamble_is_emitted_first() {
        let stream = Stream::new();
        let config = Config::default();
        let out = emit(&stream, &config);
        assert_eq!(out, "G21\nG90\nM83\n");
    }

    #[test]
    fn travel_move_emits_g0_with_changed_axes_and_feedrate() {
        let mut stream = Stream::new();
        stream.push(Command::Movement(Movement::new(
            MovementKind::Travel,
            Vector3::ZERO,
            Vector3::new(10.0, 5.0, 0.0),
            3000.0,
        )));
        let config = Config::default();
        let out = emit(&stream, &config);
        assert!(out.contains("G0 X10 Y5 F3000\n"));
    }

    #[test]
    fn repeated_feedrate_is_suppressed() {
        let mut stream = Stream::new();
        stream.push(Command::Movement(Movement::new(
            MovementKind::Travel,
            Vector3::ZERO,
            Vector3::new(10.0, 0.0, 0.0),
            3000.0,
        )));
        stream.push(Command::Movement(Movement::new(
            MovementKind::Travel,
            Vector3::new(10.0, 0.0, 0.0),
            Vector3::new(20.0, 0.0, 0.0),
            3000.0,
        )));
        let config = Config::default();
        let out = emit(&stream, &config);
        assert_eq!(out.matches('F').count(), 1);
    }

    #[test]
    fn home_all_axes_omits_axis_letters() {
        let mut stream = Stream::new();
        stream.push(Command::Instruction(Instruction::Home { x: true, y: true, z: true }));
        let config = Config::default();
        let out = emit(&stream, &config);
        assert!(out.contains("G28\n"));
    }

    #[test]
    fn home_partial_axes_lists_them() {
        let mut stream = Stream::new();
        stream.push(Command::Instruction(Instruction::Home { x: true, y: false, z: false }));
        let config = Config::default();
        let out = emit(&stream, &config);
        assert!(out.contains("G28 X\n"));
    }

    #[test]
    fn arc_without_g15_flattens_to_two_legs_with_comment() {
        let mut stream = Stream::new();
        let arc = ArcData {
            corner: Vector3::new(10.0, 0.0, 0.0),
            radius: 0.4,
            angle: 90.0,
            arc_origin: Vector3::new(10.0, 0.8, 0.0),
            extrude: ArcEnds::new(0.05, 0.05),
            seg_feedrate: ArcEnds::new(1800.0, 1800.0),
            acceleration: ArcEnds::new(1500.0, 1500.0),
            jerk: ArcEnds::new(Vector3::new(10.0, 10.0, 0.4), Vector3::new(10.0, 10.0, 0.4)),
            extrude_jerk: ArcEnds::new(5.0, 5.0),
            parent_velocities: ArcEnds::new(Vector3::new(1800.0, 0.0, 0.0), Vector3::new(0.0, 1800.0, 0.0)),
        };
        let m = Movement::new(
            MovementKind::Arc(arc),
            Vector3::new(9.6, 0.0, 0.0),
            Vector3::new(10.0, 0.4, 0.0),
            1800.0,
        );
        stream.push(Command::Movement(m));
        let mut config = Config::default();
        config.output.generate_g15 = false;
        let out = emit(&stream, &config);
        assert_eq!(out.matches("; arc").count(), 2);
    }

    #[test]
    fn arc_with_g15_emits_single_directive() {
        let mut stream = Stream::new();
        let arc = ArcData {
            corner: Vector3::new(10.0, 0.0, 0.0),
            radius: 0.4,
            angle: 90.0,
            arc_origin: Vector3::new(10.0, 0.8, 0.0),
            extrude: ArcEnds::new(0.05, 0.05),
            seg_feedrate: ArcEnds::new(1800.0, 1800.0),
            acceleration: ArcEnds::new(1500.0, 1500.0),
            jerk: ArcEnds::new(Vector3::new(10.0, 10.0, 0.4), Vector3::new(10.0, 10.0, 0.4)),
            extrude_jerk: ArcEnds::new(5.0, 5.0),
            parent_velocities: ArcEnds::new(Vector3::new(1800.0, 0.0, 0.0), Vector3::new(0.0, 1800.0, 0.0)),
        };
        let m = Movement::new(
            MovementKind::Arc(arc),
            Vector3::new(9.6, 0.0, 0.0),
            Vector3::new(10.0, 0.4, 0.0),
            1800.0,
        );
        stream.push(Command::Movement(m));
        let mut config = Config::default();
        config.output.generate_g15 = true;
        let out = emit(&stream, &config);
        assert!(out.contains("G15"));
        assert!(!out.contains("; arc"));
    }
}
