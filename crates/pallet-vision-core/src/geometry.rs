use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};

/// Rectangle with arbitrary orientation, in pixel units.
///
/// `width` is measured along the direction given by `angle_deg` and
/// `height` along its perpendicular. `angle_deg` is normalized into
/// `[0, 90)`, so the same rectangle always has the same description.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotatedRect {
    pub center: Point2<f32>,
    pub width: f32,
    pub height: f32,
    pub angle_deg: f32,
}

impl RotatedRect {
    /// Unit axes `(u, v)` along width and height.
    fn axes(&self) -> (Vector2<f32>, Vector2<f32>) {
        let (s, c) = self.angle_deg.to_radians().sin_cos();
        (Vector2::new(c, s), Vector2::new(-s, c))
    }

    /// Box corners, walking the boundary: `c - u - v`, `c + u - v`,
    /// `c + u + v`, `c - u + v` (half extents).
    pub fn corners(&self) -> [Point2<f32>; 4] {
        let (u, v) = self.axes();
        let hu = u * (0.5 * self.width);
        let hv = v * (0.5 * self.height);
        [
            self.center - hu - hv,
            self.center + hu - hv,
            self.center + hu + hv,
            self.center - hu + hv,
        ]
    }

    pub fn area(&self) -> f32 {
        self.width * self.height
    }

    /// Long side over short side; `None` for a degenerate rectangle.
    pub fn aspect_ratio(&self) -> Option<f32> {
        let long = self.width.max(self.height);
        let short = self.width.min(self.height);
        if short <= f32::EPSILON {
            return None;
        }
        Some(long / short)
    }
}

/// Absolute enclosed area of a closed polygon (shoelace formula).
pub fn polygon_area(points: &[Point2<f32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let mut twice = 0.0f64;
    for (i, a) in points.iter().enumerate() {
        let b = points[(i + 1) % points.len()];
        twice += a.x as f64 * b.y as f64 - b.x as f64 * a.y as f64;
    }
    0.5 * twice.abs()
}

/// Minimum-area bounding rectangle of a convex polygon (rotating calipers).
///
/// `hull` must be convex and ordered (either winding). One side of the
/// optimal rectangle is always collinear with a hull edge, so it suffices to
/// test each edge direction. Returns `None` for fewer than three vertices.
pub fn min_area_rect(hull: &[Point2<f32>]) -> Option<RotatedRect> {
    if hull.len() < 3 {
        return None;
    }

    let origin = hull[0];
    let mut best: Option<(f32, RotatedRect)> = None;

    for (i, a) in hull.iter().enumerate() {
        let b = hull[(i + 1) % hull.len()];
        let edge = b - a;
        let len = edge.norm();
        if len <= f32::EPSILON {
            continue;
        }
        let u = edge / len;
        let v = Vector2::new(-u.y, u.x);

        let (mut min_u, mut max_u) = (f32::INFINITY, f32::NEG_INFINITY);
        let (mut min_v, mut max_v) = (f32::INFINITY, f32::NEG_INFINITY);
        for p in hull {
            let d = p - origin;
            let pu = d.dot(&u);
            let pv = d.dot(&v);
            min_u = min_u.min(pu);
            max_u = max_u.max(pu);
            min_v = min_v.min(pv);
            max_v = max_v.max(pv);
        }

        let width = max_u - min_u;
        let height = max_v - min_v;
        let area = width * height;
        if best.as_ref().is_some_and(|(a, _)| *a <= area) {
            continue;
        }

        let center = origin + u * (0.5 * (min_u + max_u)) + v * (0.5 * (min_v + max_v));
        let angle = u.y.atan2(u.x).to_degrees();
        best = Some((area, canonical_rect(center, width, height, angle)));
    }

    best.map(|(_, r)| r)
}

/// Fold the angle into `[0, 90)`, swapping sides when rotating by 90 deg.
fn canonical_rect(center: Point2<f32>, width: f32, height: f32, angle_deg: f32) -> RotatedRect {
    let mut angle = angle_deg.rem_euclid(180.0);
    let (mut w, mut h) = (width, height);
    if angle >= 90.0 {
        angle -= 90.0;
        std::mem::swap(&mut w, &mut h);
    }
    if angle >= 90.0 - 1e-4 {
        angle = 0.0;
        std::mem::swap(&mut w, &mut h);
    }
    RotatedRect {
        center,
        width: w,
        height: h,
        angle_deg: angle,
    }
}
