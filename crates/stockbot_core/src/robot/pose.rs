//! Calibrated robot poses.
//!
//! # Invariants
//! - Poses are base-frame constants; nothing derives them at runtime.
//! - Rendered coordinates always use `.` as radix point.

/// Six-axis pose `(x, y, z, rx, ry, rz)`; metres and axis-angle radians.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Pose {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub rx: f64,
    pub ry: f64,
    pub rz: f64,
}

impl Pose {
    pub const fn new(x: f64, y: f64, z: f64, rx: f64, ry: f64, rz: f64) -> Self {
        Self {
            x,
            y,
            z,
            rx,
            ry,
            rz,
        }
    }

    /// Renders the pose as a script literal, e.g. `p[0.425, 0.025, -0.125, 2.225, 2.225, 0]`.
    pub fn to_script(&self) -> String {
        format!(
            "p[{}, {}, {}, {}, {}, {}]",
            format_coordinate(self.x),
            format_coordinate(self.y),
            format_coordinate(self.z),
            format_coordinate(self.rx),
            format_coordinate(self.ry),
            format_coordinate(self.rz)
        )
    }
}

const COORDINATE_DECIMALS: usize = 5;

/// Formats one coordinate with at most five decimals and no trailing zeros.
///
/// Negative zero is printed as `0`.
pub fn format_coordinate(value: f64) -> String {
    let fixed = format!("{:.*}", COORDINATE_DECIMALS, value);
    let trimmed = fixed.trim_end_matches('0').trim_end_matches('.');
    match trimmed {
        "-0" | "" => "0".to_string(),
        other => other.to_string(),
    }
}

/// Home pose above the work area.
pub const START: Pose = Pose::new(0.125, -0.3, 0.1, 3.14, -0.0, -0.0);

/// White shell pick slot A, approach height.
pub const A_ABOVE: Pose = Pose::new(0.425, 0.025, -0.025, 2.225, 2.225, -0.0);
/// White shell pick slot A, pick depth.
pub const A_PICK: Pose = Pose::new(0.425, 0.025, -0.125, 2.225, 2.225, -0.0);

/// Black shell pick slot B, approach height.
pub const B_ABOVE: Pose = Pose::new(0.425, -0.125, -0.025, 2.225, 2.225, -0.0);
/// Black shell pick slot B, pick depth.
pub const B_PICK: Pose = Pose::new(0.425, -0.125, -0.125, 2.225, 2.225, -0.0);

/// Transfer station C (also the assembly proxy).
pub const C_ABOVE: Pose = Pose::new(0.225, -0.275, -0.025, 2.225, 2.225, -0.0);
pub const C_DEPTH: Pose = Pose::new(0.225, -0.275, -0.125, 2.225, 2.225, -0.0);
/// Shallow C depth used for the second hand-off.
pub const C_SHALLOW: Pose = Pose::new(0.225, -0.275, -0.115, 2.225, 2.225, -0.0);

/// Transfer station D (also the output proxy).
pub const D_ABOVE: Pose = Pose::new(0.425, -0.275, -0.025, 2.225, 2.225, -0.0);
pub const D_DEPTH: Pose = Pose::new(0.425, -0.275, -0.125, 2.225, 2.225, -0.0);

/// Final drop E.
pub const E_ABOVE: Pose = Pose::new(-0.025, -0.475, -0.025, 2.225, 2.225, -0.0);
pub const E_DEPTH: Pose = Pose::new(-0.025, -0.475, -0.125, 2.225, 2.225, -0.0);
