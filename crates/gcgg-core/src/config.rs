//! Pipeline configuration. Every field has a default so a
//! partially-specified config file is always valid; the CLI loader fills in
//! any section or key the user's file omits.

use crate::vector3::Vector3;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ExtrusionConfig {
    /// Tolerance for matching per-time extrusion rate during coalescing.
    pub epsilon: f64,
}

impl Default for ExtrusionConfig {
    fn default() -> Self {
        ExtrusionConfig { epsilon: 0.1 }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ArcConfig {
    pub generate: bool,
    pub constant_speed: bool,
    pub max_segments: usize,
    pub max_angle: f64,
    pub min_angle: f64,
    pub radius: f64,
    pub travel_radius: f64,
    pub halve_travels: bool,
    pub min_radius: f64,
    pub constrain_radius: bool,
}

impl Default for ArcConfig {
    fn default() -> Self {
        ArcConfig {
            generate: true,
            constant_speed: true,
            max_segments: 1000,
            max_angle: 180.0,
            min_angle: 10.0,
            radius: 0.4,
            travel_radius: 1.0,
            halve_travels: true,
            min_radius: 0.05,
            constrain_radius: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RegArcGenConfig {
    pub enable: bool,
    pub max_segment_length: f64,
    pub max_angle: f64,
    pub max_angle_divergence: f64,
    pub min_segment_count: usize,
    pub arcs_support_z: bool,
}

impl Default for RegArcGenConfig {
    fn default() -> Self {
        RegArcGenConfig {
            enable: false,
            max_segment_length: 2.0,
            max_angle: 45.0,
            max_angle_divergence: 5.0,
            min_segment_count: 4,
            arcs_support_z: false,
        }
    }
}

/// Reserved extension point: parsed and range-validated, but no pipeline
/// stage reads it yet.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SmoothingConfig {
    pub enable: bool,
    pub min_angle: f64,
    pub new_angle: f64,
}

impl Default for SmoothingConfig {
    fn default() -> Self {
        SmoothingConfig {
            enable: false,
            min_angle: 10.0,
            new_angle: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Base,
    Extended,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OutputConfig {
    pub format: OutputFormat,
    pub subdivide_arcs: bool,
    pub generate_g15: bool,
    pub arcs_support_z: bool,
}

impl Default for OutputConfig {
    fn default() -> Self {
        OutputConfig {
            format: OutputFormat::Base,
            subdivide_arcs: true,
            generate_g15: false,
            arcs_support_z: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DefaultsConfig {
    pub acceleration: Vector3,
    pub extrusion_acceleration: f64,
    pub feedrate: Vector3,
    pub extrusion_feedrate: f64,
    pub jerk: Vector3,
    pub extrusion_jerk: f64,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        DefaultsConfig {
            acceleration: Vector3::new(2000.0, 2000.0, 100.0),
            extrusion_acceleration: 2000.0,
            feedrate: Vector3::new(3000.0, 3000.0, 300.0),
            extrusion_feedrate: 3000.0,
            jerk: Vector3::new(10.0, 10.0, 0.4),
            extrusion_jerk: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OptionsConfig {
    pub all_no_extrude_as_travel: bool,
    pub brute_force_feedrate: bool,
}

impl Default for OptionsConfig {
    fn default() -> Self {
        OptionsConfig {
            all_no_extrude_as_travel: false,
            brute_force_feedrate: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Config {
    pub extrusion: ExtrusionConfig,
    pub arc: ArcConfig,
    pub reg_arc_gen: RegArcGenConfig,
    pub smoothing: SmoothingConfig,
    pub output: OutputConfig,
    pub defaults: DefaultsConfig,
    pub options: OptionsConfig,
}

impl Default for OutputFormat {
    fn default() -> Self {
        OutputFormat::Base
    }
}
