//! Height correction for objects standing on the calibration plane.
//!
//! The homography is calibrated against the floor (`z = 0`). A pallet's top
//! surface sits above the floor, so its image lands where a floor marker
//! further from the camera would. The correction models the camera as a
//! pinhole looking down through a fixed tilt angle:
//!
//! ```text
//! distance_theoretical = camera_height / tan(tilt)
//! distance_actual      = (camera_height - pallet_height) / tan(tilt)
//! factor               = distance_actual / distance_theoretical
//!                      = (camera_height - pallet_height) / camera_height
//! ```
//!
//! Both plane coordinates are scaled uniformly by `factor`. This is a
//! first-order approximation that assumes the pallet sits under the
//! projection of the optical axis and degrades with lateral offset from it.
//! Robot-side offsets are tuned against exactly this formula.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Physically inconsistent camera / pallet configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum InvalidGeometryError {
    #[error("camera height {camera_m} m must be above the pallet top at {pallet_m} m")]
    CameraBelowPallet { camera_m: f64, pallet_m: f64 },
    #[error("tilt angle {tilt_deg} deg must lie strictly between 0 and 90 deg")]
    DegenerateTilt { tilt_deg: f64 },
    #[error("pallet height {0} m is negative")]
    NegativePalletHeight(f64),
    #[error("{0} is not a finite number")]
    NonFinite(&'static str),
}

/// Fixed camera mounting, loaded once per session.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CameraGeometry {
    /// Stream identity (URL or device name); informational only.
    #[serde(default)]
    pub stream: String,
    /// Mounting height above the floor, meters.
    pub height_m: f64,
    /// Downward tilt angle, degrees.
    pub tilt_deg: f64,
}

impl CameraGeometry {
    pub fn new(stream: impl Into<String>, height_m: f64, tilt_deg: f64) -> Self {
        Self {
            stream: stream.into(),
            height_m,
            tilt_deg,
        }
    }

    /// Check the mounting on its own, independent of any pallet height.
    pub fn validate(&self) -> Result<(), InvalidGeometryError> {
        if !self.height_m.is_finite() {
            return Err(InvalidGeometryError::NonFinite("camera height"));
        }
        if !self.tilt_deg.is_finite() {
            return Err(InvalidGeometryError::NonFinite("tilt angle"));
        }
        if self.tilt_deg <= 0.0 || self.tilt_deg >= 90.0 {
            return Err(InvalidGeometryError::DegenerateTilt {
                tilt_deg: self.tilt_deg,
            });
        }
        Ok(())
    }

    /// Horizontal distance from the camera foot to where the optical axis
    /// meets a plane `plane_height_m` above the floor.
    fn axis_distance(&self, plane_height_m: f64) -> f64 {
        (self.height_m - plane_height_m) / self.tilt_deg.to_radians().tan()
    }
}

/// Correction factor for an object whose top is `pallet_height_m` above the
/// calibration plane.
///
/// Exactly `1.0` for `pallet_height_m == 0`, strictly inside `(0, 1)` for
/// `0 < pallet_height_m < camera height`.
pub fn correction_factor(
    geometry: &CameraGeometry,
    pallet_height_m: f64,
) -> Result<f64, InvalidGeometryError> {
    geometry.validate()?;
    if !pallet_height_m.is_finite() {
        return Err(InvalidGeometryError::NonFinite("pallet height"));
    }
    if pallet_height_m < 0.0 {
        return Err(InvalidGeometryError::NegativePalletHeight(pallet_height_m));
    }
    if geometry.height_m <= pallet_height_m {
        return Err(InvalidGeometryError::CameraBelowPallet {
            camera_m: geometry.height_m,
            pallet_m: pallet_height_m,
        });
    }

    let theoretical = geometry.axis_distance(0.0);
    let actual = geometry.axis_distance(pallet_height_m);
    Ok(actual / theoretical)
}

/// Cached correction for one assumed pallet height.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct HeightCorrection {
    pub pallet_height_m: f64,
    pub factor: f64,
}

impl HeightCorrection {
    pub fn new(
        geometry: &CameraGeometry,
        pallet_height_m: f64,
    ) -> Result<Self, InvalidGeometryError> {
        let factor = correction_factor(geometry, pallet_height_m)?;
        Ok(Self {
            pallet_height_m,
            factor,
        })
    }

    /// Identity correction (object lies on the calibration plane).
    pub fn none() -> Self {
        Self {
            pallet_height_m: 0.0,
            factor: 1.0,
        }
    }

    #[inline]
    pub fn apply(&self, raw: Point2<f64>) -> Point2<f64> {
        Point2::new(raw.x * self.factor, raw.y * self.factor)
    }

    /// Pallet height in millimeters, the unit of the output record.
    pub fn pallet_height_mm(&self) -> f64 {
        self.pallet_height_m * 1000.0
    }
}
