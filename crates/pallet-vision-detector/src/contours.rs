//! Edge map and external-contour extraction.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::distance_transform::Norm;
use imageproc::geometry::{approximate_polygon_dp, arc_length, convex_hull};
use imageproc::point::Point;
use nalgebra::Point2;
use pallet_vision_core::{min_area_rect, polygon_area, RotatedRect};

use crate::params::EdgeParams;

/// Binary edge map: hysteresis edges, optionally dilated.
pub fn edge_map(gray: &GrayImage, params: &EdgeParams) -> GrayImage {
    let edges = imageproc::edges::canny(gray, params.low_threshold, params.high_threshold);
    if params.dilation == 0 {
        return edges;
    }
    imageproc::morphology::dilate(&edges, Norm::LInf, params.dilation)
}

/// Outer borders of top-level edge components, in raster scan order.
///
/// Contours nested inside another component (and all hole borders) are
/// dropped.
pub fn external_contours(edges: &GrayImage) -> Vec<Vec<Point<i32>>> {
    find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| c.border_type == BorderType::Outer && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

pub(crate) fn to_points2(points: &[Point<i32>]) -> Vec<Point2<f32>> {
    points
        .iter()
        .map(|p| Point2::new(p.x as f32, p.y as f32))
        .collect()
}

/// Enclosed area of a raw contour, pixel².
pub fn contour_area(contour: &[Point<i32>]) -> f64 {
    polygon_area(&to_points2(contour))
}

/// Vertex count after Douglas-Peucker simplification with a tolerance of
/// `epsilon_frac` times the closed perimeter.
pub fn simplified_vertex_count(contour: &[Point<i32>], epsilon_frac: f64) -> usize {
    let perimeter = arc_length(contour, true);
    approximate_polygon_dp(contour, epsilon_frac * perimeter, true).len()
}

/// Minimum-area rectangle around the raw contour (not its simplification).
pub fn contour_min_area_rect(contour: &[Point<i32>]) -> Option<RotatedRect> {
    let hull = convex_hull(contour);
    min_area_rect(&to_points2(&hull))
}
