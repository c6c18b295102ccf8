//! Configuration Loader
//!
//! Maps an INI config file's sections onto [`gcgg_core::Config`]. Every key
//! is optional — a key or even a whole section the file omits just falls
//! back to `gcgg_core`'s own `Default` for that field, rather than treating
//! a missing key as a hard load error.

use anyhow::{anyhow, Result};
use configparser::ini::Ini;
use gcgg_core::config::{Config, OutputFormat};
use gcgg_core::Vector3;
use std::path::Path;

fn get_f64(ini: &Ini, section: &str, key: &str, default: f64) -> Result<f64> {
    ini.getfloat(section, key)
        .map_err(|e| anyhow!("[{section}] {key}: {e}"))
        .map(|v| v.unwrap_or(default))
}

fn get_usize(ini: &Ini, section: &str, key: &str, default: usize) -> Result<usize> {
    ini.getuint(section, key)
        .map_err(|e| anyhow!("[{section}] {key}: {e}"))
        .map(|v| v.map(|n| n as usize).unwrap_or(default))
}

fn get_bool(ini: &Ini, section: &str, key: &str, default: bool) -> Result<bool> {
    ini.getbool(section, key)
        .map_err(|e| anyhow!("[{section}] {key}: {e}"))
        .map(|v| v.unwrap_or(default))
}

/// Loads `path` and overlays it onto `gcgg_core::Config::default()`. Returns
/// an error only for an unreadable file or a key whose value fails to parse
/// as the type it's supposed to be — a missing key or section is not an
/// error.
pub fn load(path: &Path) -> Result<Config> {
    let mut ini = Ini::new();
    ini.load(path)
        .map_err(|e| anyhow!("failed to load config file {:?}: {e}", path))?;

    let defaults = Config::default();

    let mut config = Config::default();

    config.extrusion.epsilon = get_f64(&ini, "extrusion", "epsilon", defaults.extrusion.epsilon)?;

    config.arc.generate = get_bool(&ini, "arc", "generate", defaults.arc.generate)?;
    config.arc.constant_speed = get_bool(&ini, "arc", "constant_speed", defaults.arc.constant_speed)?;
    config.arc.max_segments = get_usize(&ini, "arc", "max_segments", defaults.arc.max_segments)?;
    config.arc.max_angle = get_f64(&ini, "arc", "max_angle", defaults.arc.max_angle)?;
    config.arc.min_angle = get_f64(&ini, "arc", "min_angle", defaults.arc.min_angle)?;
    config.arc.radius = get_f64(&ini, "arc", "radius", defaults.arc.radius)?;
    config.arc.travel_radius = get_f64(&ini, "arc", "travel_radius", defaults.arc.travel_radius)?;
    config.arc.halve_travels = get_bool(&ini, "arc", "halve_travels", defaults.arc.halve_travels)?;
    config.arc.min_radius = get_f64(&ini, "arc", "min_radius", defaults.arc.min_radius)?;
    config.arc.constrain_radius = get_bool(&ini, "arc", "constrain_radius", defaults.arc.constrain_radius)?;

    config.reg_arc_gen.enable = get_bool(&ini, "reg_arc_gen", "enable", defaults.reg_arc_gen.enable)?;
    config.reg_arc_gen.max_segment_length =
        get_f64(&ini, "reg_arc_gen", "max_segment_length", defaults.reg_arc_gen.max_segment_length)?;
    config.reg_arc_gen.max_angle = get_f64(&ini, "reg_arc_gen", "max_angle", defaults.reg_arc_gen.max_angle)?;
    config.reg_arc_gen.max_angle_divergence =
        get_f64(&ini, "reg_arc_gen", "max_angle_divergence", defaults.reg_arc_gen.max_angle_divergence)?;
    config.reg_arc_gen.min_segment_count =
        get_usize(&ini, "reg_arc_gen", "min_segment_count", defaults.reg_arc_gen.min_segment_count)?;
    config.reg_arc_gen.arcs_support_z =
        get_bool(&ini, "reg_arc_gen", "arcs_support_z", defaults.reg_arc_gen.arcs_support_z)?;

    config.smoothing.enable = get_bool(&ini, "smoothing", "enable", defaults.smoothing.enable)?;
    config.smoothing.min_angle = get_f64(&ini, "smoothing", "min_angle", defaults.smoothing.min_angle)?;
    config.smoothing.new_angle = get_f64(&ini, "smoothing", "new_angle", defaults.smoothing.new_angle)?;

    config.output.format = match ini.get("output", "format").as_deref() {
        None => defaults.output.format,
        Some("base") => OutputFormat::Base,
        Some("extended") => OutputFormat::Extended,
        Some(other) => return Err(anyhow!("[output] format: expected 'base' or 'extended', got {other:?}")),
    };
    config.output.subdivide_arcs = get_bool(&ini, "output", "subdivide_arcs", defaults.output.subdivide_arcs)?;
    config.output.generate_g15 = get_bool(&ini, "output", "generate_g15", defaults.output.generate_g15)?;
    config.output.arcs_support_z = get_bool(&ini, "output", "arcs_support_z", defaults.output.arcs_support_z)?;

    config.defaults.acceleration = Vector3::new(
        get_f64(&ini, "defaults", "acceleration_x", defaults.defaults.acceleration.x)?,
        get_f64(&ini, "defaults", "acceleration_y", defaults.defaults.acceleration.y)?,
        get_f64(&ini, "defaults", "acceleration_z", defaults.defaults.acceleration.z)?,
    );
    config.defaults.extrusion_acceleration =
        get_f64(&ini, "defaults", "extrusion_acceleration", defaults.defaults.extrusion_acceleration)?;
    config.defaults.feedrate = Vector3::new(
        get_f64(&ini, "defaults", "feedrate_x", defaults.defaults.feedrate.x)?,
        get_f64(&ini, "defaults", "feedrate_y", defaults.defaults.feedrate.y)?,
        get_f64(&ini, "defaults", "feedrate_z", defaults.defaults.feedrate.z)?,
    );
    config.defaults.extrusion_feedrate =
        get_f64(&ini, "defaults", "extrusion_feedrate", defaults.defaults.extrusion_feedrate)?;
    config.defaults.jerk = Vector3::new(
        get_f64(&ini, "defaults", "jerk_x", defaults.defaults.jerk.x)?,
        get_f64(&ini, "defaults", "jerk_y", defaults.defaults.jerk.y)?,
        get_f64(&ini, "defaults", "jerk_z", defaults.defaults.jerk.z)?,
    );
    config.defaults.extrusion_jerk = get_f64(&ini, "defaults", "extrusion_jerk", defaults.defaults.extrusion_jerk)?;

    config.options.all_no_extrude_as_travel =
        get_bool(&ini, "options", "all_no_extrude_as_travel", defaults.options.all_no_extrude_as_travel)?;
    config.options.brute_force_feedrate =
        get_bool(&ini, "options", "brute_force_feedrate", defaults.options.brute_force_feedrate)?;

    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn missing_file_is_an_error() {
        assert!(load(Path::new("/nonexistent/gcgg.cfg")).is_err());
    }

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[arc]\nmax_angle = 90\n").unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.arc.max_angle, 90.0);
        assert_eq!(config.arc.min_angle, Config::default().arc.min_angle);
        assert_eq!(config.defaults.acceleration, Config::default().defaults.acceleration);
    }

    #[test]
    fn output_format_accepts_extended() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[output]\nformat = extended\n").unwrap();

        let config = load(file.path()).unwrap();
        assert_eq!(config.output.format, OutputFormat::Extended);
    }

    #[test]
    fn unknown_output_format_is_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[output]\nformat = fancy\n").unwrap();

        assert!(load(file.path()).is_err());
    }
}
