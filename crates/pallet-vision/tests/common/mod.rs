#![allow(dead_code)]

use image::{DynamicImage, GrayImage, Luma};
use imageproc::drawing::draw_filled_rect_mut;
use imageproc::rect::Rect;
use nalgebra::Point2;

/// Calibration picks mapping x ∈ [100, 900], y ∈ [100, 600] onto the
/// 1000 mm square: x_mm = 1.25 (x - 100), y_mm = 2 (y - 100).
pub fn picks() -> Vec<Point2<f64>> {
    vec![
        Point2::new(100.0, 100.0),
        Point2::new(900.0, 100.0),
        Point2::new(900.0, 600.0),
        Point2::new(100.0, 600.0),
    ]
}

/// 1000×700 floor with a 360×120 pallet centered near (500, 350).
pub fn pallet_frame() -> DynamicImage {
    let mut img = GrayImage::from_pixel(1000, 700, Luma([60]));
    draw_filled_rect_mut(&mut img, Rect::at(320, 290).of_size(360, 120), Luma([200]));
    DynamicImage::ImageLuma8(img)
}

pub fn empty_frame() -> DynamicImage {
    DynamicImage::ImageLuma8(GrayImage::from_pixel(1000, 700, Luma([60])))
}

pub fn config_json(calibration: &std::path::Path, dispatch: &str) -> String {
    format!(
        r#"{{
  "camera": {{ "stream": "test", "height_m": 3.0, "tilt_deg": 30.0 }},
  "pallet": {{ "assumed_height_m": 1.0 }},
  "calibration": {{ "path": {} }},
  "dispatch": {}
}}"#,
        serde_json::to_string(calibration).unwrap(),
        dispatch
    )
}
