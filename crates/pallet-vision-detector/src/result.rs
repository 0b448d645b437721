use nalgebra::Point2;
use pallet_vision_core::RotatedRect;
use serde::{Deserialize, Serialize};

/// A pallet found in one frame, in pixel units.
///
/// Transient: produced per frame and discarded once its coordinates have
/// been dispatched.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PalletDetection {
    pub center: Point2<f32>,
    pub width: f32,
    pub height: f32,
    /// Orientation of the `width` side, degrees in `[0, 90)`.
    pub angle_deg: f32,
    /// Corners of the minimum-area bounding rectangle, boundary order.
    pub corners: [Point2<f32>; 4],
    pub aspect_ratio: f32,
    /// Area enclosed by the raw contour, pixel².
    pub contour_area: f64,
}

impl PalletDetection {
    pub(crate) fn from_rect(rect: &RotatedRect, aspect_ratio: f32, contour_area: f64) -> Self {
        Self {
            center: rect.center,
            width: rect.width,
            height: rect.height,
            angle_deg: rect.angle_deg,
            corners: rect.corners(),
            aspect_ratio,
            contour_area,
        }
    }
}

/// Why a contour was or was not accepted.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContourVerdict {
    TooSmall,
    TooFewVertices,
    DegenerateRect,
    AspectOutOfRange,
    Accepted,
}

/// Per-contour gate outcome, for debugging detector settings.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ContourReport {
    pub index: usize,
    pub num_points: usize,
    pub area: f64,
    pub vertices: Option<usize>,
    pub rect: Option<RotatedRect>,
    pub aspect_ratio: Option<f32>,
    pub verdict: ContourVerdict,
}
