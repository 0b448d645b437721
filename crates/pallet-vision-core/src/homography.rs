use nalgebra::{Matrix3, Point2, Vector3};
use serde::{Deserialize, Serialize};

/// Homogeneous `w` with a smaller magnitude is a point on the horizon line.
const MIN_HOMOGENEOUS_W: f64 = 1e-12;

/// `|det|` over the product of column norms below which a matrix is
/// treated as singular. The ratio is 1 for orthogonal columns and does not
/// depend on how far the translation column reaches.
const SINGULAR_DET_REL: f64 = 1e-12;

/// Sine of the corner angle at the third quad vertex below which its two
/// edges count as collinear.
const MIN_QUAD_SINE: f64 = 1e-9;

/// A pixel whose image under the homography lies at infinity.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
#[error("pixel ({x:.3}, {y:.3}) is unmappable: homogeneous w = {w:e}")]
pub struct SingularTransformError {
    pub x: f64,
    pub y: f64,
    pub w: f64,
}

/// 3×3 projective transform `dst ~ H * src`.
///
/// In the pipeline `src` is image pixels and `dst` is the calibration plane
/// in millimeters. Matrices produced by [`homography_from_4pt`] are
/// normalized so that `h[(2, 2)] == 1`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn from_array(rows: [[f64; 3]; 3]) -> Self {
        Self::new(Matrix3::from_row_slice(&[
            rows[0][0], rows[0][1], rows[0][2], rows[1][0], rows[1][1], rows[1][2], rows[2][0],
            rows[2][1], rows[2][2],
        ]))
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Apply the transform without guarding the perspective division.
    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        Point2::new(v[0] / v[2], v[1] / v[2])
    }

    /// Map a pixel onto the calibration plane.
    ///
    /// Fails when the homogeneous `w` component degenerates to zero for this
    /// pixel (the pixel lies on the image of the plane's line at infinity).
    pub fn to_world(&self, p: Point2<f64>) -> Result<Point2<f64>, SingularTransformError> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        let err = SingularTransformError { x: p.x, y: p.y, w };
        if !w.is_finite() || w.abs() < MIN_HOMOGENEOUS_W {
            return Err(err);
        }
        let out = Point2::new(v[0] / w, v[1] / w);
        if !out.x.is_finite() || !out.y.is_finite() {
            return Err(err);
        }
        Ok(out)
    }

    pub fn determinant(&self) -> f64 {
        self.h.determinant()
    }

    /// `false` for matrices that are numerically rank deficient.
    pub fn is_invertible(&self) -> bool {
        let det = self.determinant();
        let columns: f64 = self.h.column_iter().map(|c| c.norm()).product();
        det.is_finite() && columns > 0.0 && det.abs() > SINGULAR_DET_REL * columns
    }

    pub fn inverse(&self) -> Option<Self> {
        if !self.is_invertible() {
            return None;
        }
        self.h.try_inverse().map(Self::new)
    }
}

/// Projective map taking the unit square `(0,0) (1,0) (1,1) (0,1)` onto
/// `quad`, corners in the same order. `None` for degenerate quads.
fn square_to_quad(quad: &[Point2<f64>; 4]) -> Option<Matrix3<f64>> {
    let [p0, p1, p2, p3] = *quad;

    // Zero for parallelograms, which leaves an affine map.
    let sx = p0.x - p1.x + p2.x - p3.x;
    let sy = p0.y - p1.y + p2.y - p3.y;

    let d1 = p1 - p2;
    let d3 = p3 - p2;
    let den = d1.x * d3.y - d3.x * d1.y;
    let span = d1.norm() * d3.norm();
    if !den.is_finite() || span == 0.0 || den.abs() <= MIN_QUAD_SINE * span {
        return None;
    }

    let g = (sx * d3.y - d3.x * sy) / den;
    let h = (d1.x * sy - sx * d1.y) / den;

    let m = Matrix3::new(
        p1.x - p0.x + g * p1.x,
        p3.x - p0.x + h * p3.x,
        p0.x,
        p1.y - p0.y + g * p1.y,
        p3.y - p0.y + h * p3.y,
        p0.y,
        g,
        h,
        1.0,
    );
    Homography::new(m).is_invertible().then_some(m)
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Both quads go through the unit square: `H = Q_dst * Q_src⁻¹`. Corner
/// order must be consistent between `src` and `dst`. Returns `None` when
/// either quad is degenerate (coincident or collinear corners).
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let q_src = square_to_quad(src)?;
    let q_dst = square_to_quad(dst)?;
    let h = q_dst * q_src.try_inverse()?;

    let w = h[(2, 2)];
    if !w.is_finite() || w.abs() < MIN_HOMOGENEOUS_W {
        return None;
    }
    let h = h / w;
    if h.iter().any(|v| !v.is_finite()) {
        return None;
    }
    Some(Homography::new(h))
}
