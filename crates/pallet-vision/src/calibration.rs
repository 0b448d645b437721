//! Operator-driven planar calibration and its on-disk store.
//!
//! The operator picks the four corners of the working area in the camera
//! view, in this order: top-left, top-right, bottom-right, bottom-left.
//! They are mapped onto a `plane_size_mm × plane_size_mm` square on the
//! floor, so plane coordinates come out in millimeters with the origin at
//! the top-left corner.

use nalgebra::Point2;
use pallet_vision_core::{homography_from_4pt, Homography};
use serde::{Deserialize, Serialize};
use std::{fs, path::Path};

/// Side of the reference square, millimeters.
pub const DEFAULT_PLANE_SIZE_MM: f64 = 1000.0;

/// Well-known location of the persisted calibration.
pub const DEFAULT_CALIBRATION_PATH: &str = "data/calibration/homography.json";

/// Two picks closer than this (pixels) count as the same point.
pub const DEFAULT_MIN_POINT_SEPARATION_PX: f64 = 1.0;

#[derive(thiserror::Error, Debug)]
pub enum CalibrationStoreError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error("stored homography is not invertible")]
    NonInvertible,
}

/// Malformed or insufficient calibration input. Not retried: the operator
/// has to pick the points again.
#[derive(thiserror::Error, Debug)]
pub enum CalibrationError {
    #[error("expected exactly 4 calibration points, got {got}")]
    WrongPointCount { got: usize },
    #[error("calibration points {a} and {b} coincide ({distance:.3} px apart)")]
    CoincidentPoints { a: usize, b: usize, distance: f64 },
    #[error("calibration points {0:?} are collinear")]
    CollinearPoints([usize; 3]),
    #[error("calibration points must be picked top-left, top-right, bottom-right, bottom-left")]
    BadOrdering,
    #[error("calibration plane size must be positive and finite, got {0}")]
    InvalidPlaneSize(f64),
    #[error("point correspondences produce a singular homography")]
    SingularHomography,
    #[error(transparent)]
    Store(#[from] CalibrationStoreError),
}

/// Persisted calibration: the pixel → plane matrix plus what produced it.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CalibrationRecord {
    /// Row-major pixel → plane homography.
    pub h: [[f64; 3]; 3],
    pub plane_size_mm: f64,
    /// Operator picks, top-left, top-right, bottom-right, bottom-left.
    pub image_points: [[f64; 2]; 4],
}

impl CalibrationRecord {
    pub fn homography(&self) -> Homography {
        Homography::from_array(self.h)
    }

    /// Load a calibration; rejects matrices that cannot be inverted.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, CalibrationStoreError> {
        let raw = fs::read_to_string(path)?;
        let record: Self = serde_json::from_str(&raw)?;
        if !record.homography().is_invertible() {
            return Err(CalibrationStoreError::NonInvertible);
        }
        Ok(record)
    }

    /// Write as pretty JSON, creating parent directories and replacing any
    /// previous calibration.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), CalibrationStoreError> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }
}

/// Computes the floor homography from four operator picks.
#[derive(Clone, Debug)]
pub struct CalibrationEngine {
    pub plane_size_mm: f64,
    pub min_point_separation_px: f64,
}

impl Default for CalibrationEngine {
    fn default() -> Self {
        Self {
            plane_size_mm: DEFAULT_PLANE_SIZE_MM,
            min_point_separation_px: DEFAULT_MIN_POINT_SEPARATION_PX,
        }
    }
}

impl CalibrationEngine {
    pub fn new(plane_size_mm: f64) -> Self {
        Self {
            plane_size_mm,
            ..Self::default()
        }
    }

    /// Plane corners the picks are mapped onto, in pick order.
    pub fn destination_points(&self) -> [Point2<f64>; 4] {
        let s = self.plane_size_mm;
        [
            Point2::new(0.0, 0.0),
            Point2::new(s, 0.0),
            Point2::new(s, s),
            Point2::new(0.0, s),
        ]
    }

    /// Solve for the pixel → plane homography.
    pub fn compute_homography(
        &self,
        points: &[Point2<f64>],
    ) -> Result<CalibrationRecord, CalibrationError> {
        if !(self.plane_size_mm.is_finite() && self.plane_size_mm > 0.0) {
            return Err(CalibrationError::InvalidPlaneSize(self.plane_size_mm));
        }
        let src: [Point2<f64>; 4] = points
            .try_into()
            .map_err(|_| CalibrationError::WrongPointCount { got: points.len() })?;
        self.check_degenerate(&src)?;

        let dst = self.destination_points();
        let h = homography_from_4pt(&src, &dst).ok_or(CalibrationError::SingularHomography)?;
        if !h.is_invertible() {
            return Err(CalibrationError::SingularHomography);
        }

        let tol = 1e-6 * self.plane_size_mm;
        for (s, d) in src.iter().zip(dst.iter()) {
            let mapped = h
                .to_world(*s)
                .map_err(|_| CalibrationError::SingularHomography)?;
            if (mapped - d).norm() > tol {
                return Err(CalibrationError::SingularHomography);
            }
        }

        log::info!(
            "calibrated {}x{} mm plane from picks {:?}",
            self.plane_size_mm,
            self.plane_size_mm,
            src.map(|p| [p.x, p.y])
        );

        Ok(CalibrationRecord {
            h: h.to_array(),
            plane_size_mm: self.plane_size_mm,
            image_points: src.map(|p| [p.x, p.y]),
        })
    }

    /// Compute and persist, overwriting any prior calibration at `path`.
    pub fn calibrate(
        &self,
        points: &[Point2<f64>],
        path: impl AsRef<Path>,
    ) -> Result<CalibrationRecord, CalibrationError> {
        let record = self.compute_homography(points)?;
        record.write_json(path.as_ref())?;
        log::info!("calibration written to {}", path.as_ref().display());
        Ok(record)
    }

    fn check_degenerate(&self, pts: &[Point2<f64>; 4]) -> Result<(), CalibrationError> {
        let eps = self.min_point_separation_px;

        for a in 0..4 {
            for b in (a + 1)..4 {
                let distance = (pts[a] - pts[b]).norm();
                if !distance.is_finite() || distance < eps {
                    return Err(CalibrationError::CoincidentPoints { a, b, distance });
                }
            }
        }

        // Distance of each point from the line through the other two.
        for tri in [[0, 1, 2], [0, 1, 3], [0, 2, 3], [1, 2, 3]] {
            let [p, q, r] = tri.map(|i| pts[i]);
            let longest = (q - p).norm().max((r - q).norm()).max((p - r).norm());
            let height = cross(q - p, r - p).abs() / longest;
            if height < eps {
                return Err(CalibrationError::CollinearPoints(tri));
            }
        }

        // Image y grows downwards, so TL -> TR -> BR -> BL turns the same way
        // at every corner with a positive cross product.
        for i in 0..4 {
            let a = pts[i];
            let b = pts[(i + 1) % 4];
            let c = pts[(i + 2) % 4];
            if cross(b - a, c - b) <= 0.0 {
                return Err(CalibrationError::BadOrdering);
            }
        }
        Ok(())
    }
}

fn cross(u: nalgebra::Vector2<f64>, v: nalgebra::Vector2<f64>) -> f64 {
    u.x * v.y - u.y * v.x
}

#[cfg(test)]
mod tests {
    use super::*;

    fn picks() -> Vec<Point2<f64>> {
        vec![
            Point2::new(412.0, 233.0),
            Point2::new(1510.0, 260.0),
            Point2::new(1688.0, 1003.0),
            Point2::new(301.0, 958.0),
        ]
    }

    #[test]
    fn picks_map_onto_plane_corners() {
        let engine = CalibrationEngine::default();
        let record = engine.compute_homography(&picks()).expect("calibration");
        let h = record.homography();
        for (p, d) in picks().iter().zip(engine.destination_points()) {
            let w = h.to_world(*p).expect("mappable");
            assert!((w - d).norm() < 1e-6, "{w:?} vs {d:?}");
        }
        assert_eq!(record.plane_size_mm, 1000.0);
        assert_eq!(record.image_points[2], [1688.0, 1003.0]);
    }

    #[test]
    fn stored_matrix_reloads_bit_for_bit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("calibration").join("homography.json");
        let record = CalibrationEngine::default()
            .calibrate(&picks(), &path)
            .unwrap();

        let loaded = CalibrationRecord::load_json(&path).unwrap();
        for (a, b) in loaded.h.iter().flatten().zip(record.h.iter().flatten()) {
            assert_eq!(a.to_bits(), b.to_bits());
        }
        assert_eq!(loaded.homography(), record.homography());
    }

    #[test]
    fn small_picks_far_from_origin_calibrate() {
        let pts = vec![
            Point2::new(2000.0, 1500.0),
            Point2::new(2005.0, 1500.0),
            Point2::new(2005.0, 1505.0),
            Point2::new(2000.0, 1505.0),
        ];
        let record = CalibrationEngine::default().compute_homography(&pts).unwrap();
        let center = record.homography().to_world(Point2::new(2002.5, 1502.5)).unwrap();
        assert!((center.x - 500.0).abs() < 1e-6 && (center.y - 500.0).abs() < 1e-6);
    }

    #[test]
    fn plane_scale_is_configurable() {
        let engine = CalibrationEngine::new(2400.0);
        let h = engine.compute_homography(&picks()).unwrap().homography();
        let br = h.to_world(picks()[2]).unwrap();
        assert!((br.x - 2400.0).abs() < 1e-6 && (br.y - 2400.0).abs() < 1e-6);
    }

    #[test]
    fn wrong_point_count_fails() {
        let engine = CalibrationEngine::default();
        let three = &picks()[..3];
        assert!(matches!(
            engine.compute_homography(three),
            Err(CalibrationError::WrongPointCount { got: 3 })
        ));
        let mut five = picks();
        five.push(Point2::new(10.0, 10.0));
        assert!(matches!(
            engine.compute_homography(&five),
            Err(CalibrationError::WrongPointCount { got: 5 })
        ));
    }

    #[test]
    fn coincident_points_fail() {
        let mut pts = picks();
        pts[3] = Point2::new(pts[0].x + 0.2, pts[0].y);
        assert!(matches!(
            CalibrationEngine::default().compute_homography(&pts),
            Err(CalibrationError::CoincidentPoints { a: 0, b: 3, .. })
        ));
    }

    #[test]
    fn collinear_points_fail() {
        let pts = vec![
            Point2::new(100.0, 100.0),
            Point2::new(500.0, 100.0),
            Point2::new(900.0, 100.0),
            Point2::new(100.0, 600.0),
        ];
        assert!(matches!(
            CalibrationEngine::default().compute_homography(&pts),
            Err(CalibrationError::CollinearPoints([0, 1, 2]))
        ));
    }

    #[test]
    fn crossed_pick_order_fails() {
        let mut pts = picks();
        pts.swap(2, 3);
        assert!(matches!(
            CalibrationEngine::default().compute_homography(&pts),
            Err(CalibrationError::BadOrdering)
        ));
    }

    #[test]
    fn invalid_plane_size_fails() {
        let engine = CalibrationEngine::new(0.0);
        assert!(matches!(
            engine.compute_homography(&picks()),
            Err(CalibrationError::InvalidPlaneSize(_))
        ));
    }
}
