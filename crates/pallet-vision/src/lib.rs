//! Vision-to-robot coordinate pipeline for pallet handling.
//!
//! A fixed overhead camera watches a floor area. After a one-time
//! four-point calibration, each frame goes through:
//!
//! 1. pallet detection ([`detector::PalletDetector`]),
//! 2. pixel → floor-plane mapping through the stored homography,
//! 3. height correction for the pallet's top surface,
//! 4. dispatch of a millimeter coordinate record to a [`CoordinateSink`].
//!
//! ## Quickstart
//!
//! ```no_run
//! use pallet_vision::{ImageSequence, PalletVisionConfig};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let config = PalletVisionConfig::load_json("pallet_vision.json")?;
//! let mut pipeline = config.build_pipeline()?;
//! let summary = pipeline.run(ImageSequence::open("frames/")?);
//! println!("{} of {} frames had a pallet", summary.detections, summary.frames);
//! # Ok(())
//! # }
//! ```
//!
//! ## API map
//! - `pallet_vision::core`: homography, height correction, rotated rectangles, logging.
//! - `pallet_vision::detector`: contour-based pallet detector and its parameters.
//! - [`calibration`]: four-point calibration and its JSON store.
//! - [`pipeline`]: per-frame processing and session state.
//! - [`dispatch`]: coordinate sinks (stdout, HTTP, robot socket, background queue).
//! - [`measure`]: single-image object measurement for checking a calibration.

pub use pallet_vision_core as core;
pub use pallet_vision_detector as detector;

pub mod calibration;
pub mod config;
mod coordinate;
pub mod dispatch;
mod frames;
pub mod measure;
pub mod pipeline;

pub use calibration::{
    CalibrationEngine, CalibrationError, CalibrationRecord, CalibrationStoreError,
    DEFAULT_CALIBRATION_PATH,
};
pub use config::{ConfigError, DispatchConfig, DispatchTarget, PalletVisionConfig};
pub use coordinate::{CorrectedCoordinate, UNITS_MM};
pub use dispatch::{CoordinateSink, DispatchError};
pub use frames::ImageSequence;
pub use measure::{measure_object, MeasureError, ObjectMeasurement};
pub use pipeline::{
    CoordinatePipeline, DimensionMode, FrameOutcome, PipelineContext, PipelineError, RunSummary,
};

pub use pallet_vision_core::{CameraGeometry, HeightCorrection, Homography};
pub use pallet_vision_detector::{PalletDetection, PalletDetector, PalletDetectorParams};
