//! Frame → corrected coordinate → sink.
//!
//! Per frame: detect, map the pallet center through the calibration
//! homography, scale by the height correction factor, dispatch. A frame
//! with no pallet, or whose center falls on the homography's horizon, is
//! skipped. A dispatch failure is logged and the record is still returned.

use image::{DynamicImage, GrayImage};
use log::{debug, info, warn};
use nalgebra::Point2;
use pallet_vision_core::{
    CameraGeometry, HeightCorrection, Homography, InvalidGeometryError, SingularTransformError,
};
use pallet_vision_detector::{PalletDetection, PalletDetector};
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

use crate::coordinate::CorrectedCoordinate;
use crate::dispatch::CoordinateSink;

#[derive(thiserror::Error, Debug)]
pub enum PipelineError {
    #[error(transparent)]
    Geometry(#[from] InvalidGeometryError),
    #[error("calibration homography is not invertible")]
    NonInvertibleHomography,
}

/// Units of `width`/`height` in the output record.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DimensionMode {
    /// Bounding-rectangle sides in pixels, as detected.
    #[default]
    Pixels,
    /// Rectangle corners mapped to the plane and height-corrected, millimeters.
    World,
}

/// Session state shared by every frame: calibration, mounting, and the
/// cached height correction.
#[derive(Clone, Debug)]
pub struct PipelineContext {
    homography: Homography,
    geometry: CameraGeometry,
    correction: HeightCorrection,
    dimensions: DimensionMode,
}

impl PipelineContext {
    pub fn new(
        homography: Homography,
        geometry: CameraGeometry,
        pallet_height_m: f64,
    ) -> Result<Self, PipelineError> {
        if !homography.is_invertible() {
            return Err(PipelineError::NonInvertibleHomography);
        }
        let correction = HeightCorrection::new(&geometry, pallet_height_m)?;
        info!(
            "height correction factor {:.4} for a {:.3} m pallet under a {:.3} m camera",
            correction.factor, pallet_height_m, geometry.height_m
        );
        Ok(Self {
            homography,
            geometry,
            correction,
            dimensions: DimensionMode::default(),
        })
    }

    pub fn with_dimensions(mut self, dimensions: DimensionMode) -> Self {
        self.dimensions = dimensions;
        self
    }

    pub fn homography(&self) -> &Homography {
        &self.homography
    }

    pub fn geometry(&self) -> &CameraGeometry {
        &self.geometry
    }

    pub fn correction(&self) -> HeightCorrection {
        self.correction
    }

    pub fn dimensions(&self) -> DimensionMode {
        self.dimensions
    }

    /// Recompute the correction for a new pallet height. On error the
    /// previous correction stays in effect.
    pub fn set_assumed_pallet_height(
        &mut self,
        pallet_height_m: f64,
    ) -> Result<(), InvalidGeometryError> {
        self.correction = HeightCorrection::new(&self.geometry, pallet_height_m)?;
        info!(
            "assumed pallet height now {:.3} m (factor {:.4})",
            pallet_height_m, self.correction.factor
        );
        Ok(())
    }

    /// Map a detection onto the floor plane and apply the height correction.
    pub fn correct(
        &self,
        detection: &PalletDetection,
    ) -> Result<CorrectedCoordinate, SingularTransformError> {
        let raw = self.homography.to_world(to_f64(detection.center))?;
        let corrected = self.correction.apply(raw);

        let (width, height) = match self.dimensions {
            DimensionMode::Pixels => (detection.width as f64, detection.height as f64),
            DimensionMode::World => {
                let [c0, c1, c2, _] = detection.corners;
                let w0 = self.homography.to_world(to_f64(c0))?;
                let w1 = self.homography.to_world(to_f64(c1))?;
                let w2 = self.homography.to_world(to_f64(c2))?;
                let f = self.correction.factor;
                ((w1 - w0).norm() * f, (w2 - w1).norm() * f)
            }
        };

        Ok(CorrectedCoordinate::new(
            corrected.x,
            corrected.y,
            self.correction.pallet_height_mm(),
            width,
            height,
        ))
    }
}

fn to_f64(p: Point2<f32>) -> Point2<f64> {
    Point2::new(p.x as f64, p.y as f64)
}

/// What happened to one frame.
#[derive(Clone, Debug, PartialEq)]
pub enum FrameOutcome {
    NoPallet,
    /// Detected, but the center maps to infinity.
    Unmappable,
    Located {
        record: CorrectedCoordinate,
        delivered: bool,
    },
}

impl FrameOutcome {
    pub fn record(&self) -> Option<&CorrectedCoordinate> {
        match self {
            FrameOutcome::Located { record, .. } => Some(record),
            _ => None,
        }
    }
}

/// Frame counters for one [`CoordinatePipeline::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames: usize,
    pub detections: usize,
    pub unmappable: usize,
    pub dispatched: usize,
    pub dispatch_failures: usize,
}

impl RunSummary {
    fn record(&mut self, outcome: &FrameOutcome) {
        self.frames += 1;
        match outcome {
            FrameOutcome::NoPallet => {}
            FrameOutcome::Unmappable => {
                self.detections += 1;
                self.unmappable += 1;
            }
            FrameOutcome::Located { delivered, .. } => {
                self.detections += 1;
                if *delivered {
                    self.dispatched += 1;
                } else {
                    self.dispatch_failures += 1;
                }
            }
        }
    }
}

/// Detector, context and sink wired together.
pub struct CoordinatePipeline<S> {
    context: PipelineContext,
    detector: PalletDetector,
    sink: S,
}

impl<S: CoordinateSink> CoordinatePipeline<S> {
    pub fn new(context: PipelineContext, detector: PalletDetector, sink: S) -> Self {
        Self {
            context,
            detector,
            sink,
        }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.context
    }

    pub fn detector(&self) -> &PalletDetector {
        &self.detector
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    pub fn into_sink(self) -> S {
        self.sink
    }

    pub fn set_assumed_pallet_height(
        &mut self,
        pallet_height_m: f64,
    ) -> Result<(), InvalidGeometryError> {
        self.context.set_assumed_pallet_height(pallet_height_m)
    }

    /// Process one frame; `Some` when a pallet was located, whether or not
    /// the dispatch succeeded.
    pub fn process(&mut self, frame: &DynamicImage) -> Option<CorrectedCoordinate> {
        self.process_gray(&frame.to_luma8())
    }

    pub fn process_gray(&mut self, gray: &GrayImage) -> Option<CorrectedCoordinate> {
        match self.handle_frame(gray) {
            FrameOutcome::Located { record, .. } => Some(record),
            _ => None,
        }
    }

    /// Process one frame and report exactly what happened to it.
    #[cfg_attr(feature = "tracing", instrument(level = "debug", skip_all))]
    pub fn handle_frame(&mut self, gray: &GrayImage) -> FrameOutcome {
        let Some(detection) = self.detector.detect_gray(gray) else {
            return FrameOutcome::NoPallet;
        };
        debug!(
            "pallet at ({:.1}, {:.1}) px, {:.1}x{:.1}, ratio {:.2}",
            detection.center.x,
            detection.center.y,
            detection.width,
            detection.height,
            detection.aspect_ratio
        );

        let record = match self.context.correct(&detection) {
            Ok(r) => r,
            Err(e) => {
                warn!("skipping frame: {e}");
                return FrameOutcome::Unmappable;
            }
        };

        let delivered = match self.sink.dispatch(&record) {
            Ok(()) => true,
            Err(e) => {
                warn!("dispatch failed: {e}");
                false
            }
        };
        FrameOutcome::Located { record, delivered }
    }

    /// Process every frame in order until the source is exhausted.
    pub fn run<I>(&mut self, frames: I) -> RunSummary
    where
        I: IntoIterator<Item = DynamicImage>,
    {
        let mut summary = RunSummary::default();
        for frame in frames {
            let outcome = self.handle_frame(&frame.to_luma8());
            summary.record(&outcome);
        }
        info!(
            "processed {} frames: {} detections, {} unmappable, {} dispatched, {} dispatch failures",
            summary.frames,
            summary.detections,
            summary.unmappable,
            summary.dispatched,
            summary.dispatch_failures
        );
        summary
    }
}
