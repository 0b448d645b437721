//! Single-image object measurement against the calibration plane.
//!
//! Used to verify a calibration: place an object of known size flat on the
//! floor, measure it, and compare.

use image::GrayImage;
use nalgebra::Point2;
use pallet_vision_core::{Homography, SingularTransformError};
use pallet_vision_detector::{
    contour_area, contour_min_area_rect, external_contours, PalletDetector, PalletDetectorParams,
};
use serde::{Deserialize, Serialize};

#[derive(thiserror::Error, Debug)]
pub enum MeasureError {
    #[error("no object contour found")]
    NoContours,
    #[error("largest contour does not span a rectangle")]
    DegenerateContour,
    #[error(transparent)]
    Unmappable(#[from] SingularTransformError),
}

/// Plane-space size of the largest object in an image.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ObjectMeasurement {
    /// Side from corner 0 to corner 1, millimeters.
    pub width_mm: f64,
    /// Side from corner 1 to corner 2, millimeters.
    pub height_mm: f64,
    pub corners_px: [Point2<f32>; 4],
    pub corners_mm: [Point2<f64>; 4],
    pub true_width_mm: Option<f64>,
    pub abs_error_mm: Option<f64>,
}

/// Measure the largest external contour of `gray` on the calibration plane.
///
/// Width and height follow the fitted rectangle's corner order, so for an
/// axis-aligned object width is its horizontal extent whichever side is
/// longer.
///
/// No height correction is applied: the object is assumed to lie on the
/// floor. When `true_width_mm` is given the absolute width error is
/// reported alongside.
pub fn measure_object(
    gray: &GrayImage,
    homography: &Homography,
    params: &PalletDetectorParams,
    true_width_mm: Option<f64>,
) -> Result<ObjectMeasurement, MeasureError> {
    let edges = PalletDetector::new(params.clone()).edge_map(gray);
    let contours = external_contours(&edges);
    let largest = contours
        .iter()
        .max_by(|a, b| contour_area(a).total_cmp(&contour_area(b)))
        .ok_or(MeasureError::NoContours)?;
    let rect = contour_min_area_rect(largest).ok_or(MeasureError::DegenerateContour)?;

    let corners_px = rect.corners();
    let mut corners_mm = [Point2::origin(); 4];
    for (dst, c) in corners_mm.iter_mut().zip(corners_px.iter()) {
        *dst = homography.to_world(Point2::new(c.x as f64, c.y as f64))?;
    }

    let width_mm = (corners_mm[1] - corners_mm[0]).norm();
    let height_mm = (corners_mm[2] - corners_mm[1]).norm();
    let abs_error_mm = true_width_mm.map(|t| (width_mm - t).abs());

    log::info!(
        "measured {:.1} x {:.1} mm{}",
        width_mm,
        height_mm,
        abs_error_mm
            .map(|e| format!(" (width error {e:.1} mm)"))
            .unwrap_or_default()
    );

    Ok(ObjectMeasurement {
        width_mm,
        height_mm,
        corners_px,
        corners_mm,
        true_width_mm,
        abs_error_mm,
    })
}
