use serde::{Deserialize, Serialize};

/// Output unit of every coordinate record.
pub const UNITS_MM: &str = "mm";

/// Height-corrected pallet position handed to the robot side.
///
/// `x`/`y` are plane millimeters measured from the top-left calibration
/// corner; `z` is the assumed pallet height in millimeters. `width`/`height`
/// are pixels or millimeters depending on the configured dimension mode.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CorrectedCoordinate {
    pub x: f64,
    pub y: f64,
    pub z: f64,
    pub width: f64,
    pub height: f64,
    pub units: String,
}

impl CorrectedCoordinate {
    pub fn new(x: f64, y: f64, z: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            z,
            width,
            height,
            units: UNITS_MM.to_string(),
        }
    }

    /// Motion-controller command form: `{X <x>, Y <y>, Z <z>}`.
    pub fn robot_command(&self, z_override_mm: Option<f64>) -> String {
        let z = z_override_mm.unwrap_or(self.z);
        format!("{{X {:.2}, Y {:.2}, Z {:.2}}}", self.x, self.y, z)
    }
}
