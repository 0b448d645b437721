//! Core geometry for the pallet vision pipeline.
//!
//! This crate is intentionally small and purely geometric. It does *not*
//! depend on any image type: pixel positions come in as `nalgebra` points
//! and world positions go out the same way.
//!
//! - [`Homography`] maps image pixels onto the calibration plane
//!   (millimeters), with [`Homography::to_world`] guarding the perspective
//!   division.
//! - [`HeightCorrection`] rescales plane coordinates for an object whose top
//!   surface sits above the calibration plane.
//! - [`min_area_rect`] fits the minimum-area rotated rectangle around a
//!   convex polygon.

mod camera;
mod geometry;
mod homography;
mod logger;

pub use camera::{correction_factor, CameraGeometry, HeightCorrection, InvalidGeometryError};
pub use geometry::{min_area_rect, polygon_area, RotatedRect};
pub use homography::{homography_from_4pt, Homography, SingularTransformError};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_level, verbosity_level};
