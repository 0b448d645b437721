//! Rectangular pallet detector for fixed overhead cameras.
//!
//! ## Quickstart
//!
//! ```
//! use image::{GrayImage, Luma};
//! use pallet_vision_detector::PalletDetector;
//!
//! let blank = GrayImage::from_pixel(320, 240, Luma([128u8]));
//! let detector = PalletDetector::default();
//! assert!(detector.detect_gray(&blank).is_none());
//! ```
//!
//! Algorithm (deterministic, single pass per frame):
//! 1. Convert to gray and smooth (Gaussian or bilateral).
//! 2. Hysteresis edge map (default thresholds 50 / 150), dilated by one pixel.
//! 3. External contours only.
//! 4. Reject contours enclosing less than `min_area_px`.
//! 5. Reject contours whose Douglas-Peucker simplification (2 % of the
//!    perimeter) has fewer than 4 vertices.
//! 6. Fit the minimum-area rectangle to the raw contour.
//! 7. Accept when long/short side ratio lies strictly inside `(2.5, 4.0)`.
//! 8. Return the first accepted contour in scan order.

mod contours;
mod detector;
mod params;
mod result;
mod smoothing;

pub use contours::{
    contour_area, contour_min_area_rect, edge_map, external_contours, simplified_vertex_count,
};
pub use detector::PalletDetector;
pub use params::{
    CandidateSelection, DetectorParamsError, EdgeParams, PalletDetectorParams, Smoothing,
};
pub use result::{ContourReport, ContourVerdict, PalletDetection};
pub use smoothing::{bilateral_filter, smooth};

pub use imageproc::point::Point;
