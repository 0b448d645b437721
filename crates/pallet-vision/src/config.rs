//! JSON session configuration.
//!
//! ```json
//! {
//!   "camera": { "stream": "rtsp://10.0.0.20/main", "height_m": 3.0, "tilt_deg": 30.0 },
//!   "pallet": { "assumed_height_m": 1.0 },
//!   "calibration": { "path": "data/calibration/homography.json" },
//!   "dimensions": "pixels",
//!   "dispatch": { "target": { "kind": "http", "url": "http://10.0.0.30:8080/coords" } }
//! }
//! ```
//!
//! Everything except `camera` and `pallet` has defaults. A relative
//! calibration path is resolved against the config file's directory.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use pallet_vision_core::{CameraGeometry, HeightCorrection, InvalidGeometryError};
use pallet_vision_detector::{DetectorParamsError, PalletDetector, PalletDetectorParams};
use serde::{Deserialize, Serialize};

use crate::calibration::{
    CalibrationEngine, CalibrationRecord, CalibrationStoreError, DEFAULT_CALIBRATION_PATH,
    DEFAULT_MIN_POINT_SEPARATION_PX, DEFAULT_PLANE_SIZE_MM,
};
use crate::dispatch::{
    BackgroundSink, CoordinateSink, DispatchError, HttpJsonSink, JsonLinesSink, NullSink,
    RobotSocketSink,
};
use crate::pipeline::{CoordinatePipeline, DimensionMode, PipelineContext, PipelineError};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Geometry(#[from] InvalidGeometryError),
    #[error(transparent)]
    Detector(#[from] DetectorParamsError),
    #[error("calibration {path}: {source}")]
    Calibration {
        path: PathBuf,
        source: CalibrationStoreError,
    },
    #[error(transparent)]
    Pipeline(#[from] PipelineError),
    #[error(transparent)]
    Dispatch(#[from] DispatchError),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PalletConfig {
    /// Assumed height of the pallet top above the floor, meters.
    pub assumed_height_m: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationConfig {
    pub path: PathBuf,
    pub plane_size_mm: f64,
    pub min_point_separation_px: f64,
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(DEFAULT_CALIBRATION_PATH),
            plane_size_mm: DEFAULT_PLANE_SIZE_MM,
            min_point_separation_px: DEFAULT_MIN_POINT_SEPARATION_PX,
        }
    }
}

impl CalibrationConfig {
    pub fn engine(&self) -> CalibrationEngine {
        CalibrationEngine {
            plane_size_mm: self.plane_size_mm,
            min_point_separation_px: self.min_point_separation_px,
        }
    }
}

fn default_timeout_ms() -> u64 {
    2000
}

/// Where corrected coordinates go.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DispatchTarget {
    None,
    /// JSON lines on stdout.
    #[default]
    Stdout,
    Http {
        url: String,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
    Robot {
        /// `host:port` of the motion controller.
        address: String,
        /// Fixed Z sent instead of the assumed pallet height.
        #[serde(default)]
        default_z_mm: Option<f64>,
        #[serde(default = "default_timeout_ms")]
        timeout_ms: u64,
    },
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    pub target: DispatchTarget,
    /// Deliver from a worker thread through a bounded queue.
    pub background: bool,
    pub queue_capacity: usize,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            target: DispatchTarget::default(),
            background: false,
            queue_capacity: 64,
        }
    }
}

impl DispatchConfig {
    pub fn build_sink(&self) -> Result<Box<dyn CoordinateSink + Send>, ConfigError> {
        let sink: Box<dyn CoordinateSink + Send> = match &self.target {
            DispatchTarget::None => Box::new(NullSink),
            DispatchTarget::Stdout => Box::new(JsonLinesSink::stdout()),
            DispatchTarget::Http { url, timeout_ms } => Box::new(HttpJsonSink::new(
                url,
                Duration::from_millis(*timeout_ms),
            )?),
            DispatchTarget::Robot {
                address,
                default_z_mm,
                timeout_ms,
            } => Box::new(RobotSocketSink::new(
                address.clone(),
                *default_z_mm,
                Duration::from_millis(*timeout_ms),
            )),
        };
        if self.background {
            Ok(Box::new(BackgroundSink::spawn(sink, self.queue_capacity)))
        } else {
            Ok(sink)
        }
    }
}

/// Full session configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PalletVisionConfig {
    pub camera: CameraGeometry,
    pub pallet: PalletConfig,
    #[serde(default)]
    pub calibration: CalibrationConfig,
    #[serde(default)]
    pub detector: PalletDetectorParams,
    #[serde(default)]
    pub dimensions: DimensionMode,
    #[serde(default)]
    pub dispatch: DispatchConfig,
}

impl PalletVisionConfig {
    /// Parse, resolve the calibration path and validate.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)?;
        let mut config: Self = serde_json::from_str(&raw)?;
        if config.calibration.path.is_relative() {
            if let Some(base) = path.parent() {
                config.calibration.path = base.join(&config.calibration.path);
            }
        }
        config.validate()?;
        Ok(config)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json)?;
        Ok(())
    }

    /// Reject physically inconsistent or unusable settings up front.
    pub fn validate(&self) -> Result<(), ConfigError> {
        HeightCorrection::new(&self.camera, self.pallet.assumed_height_m)?;
        self.detector.validate()?;

        let cal = &self.calibration;
        if !(cal.plane_size_mm.is_finite() && cal.plane_size_mm > 0.0) {
            return Err(ConfigError::Invalid(format!(
                "calibration.plane_size_mm must be positive, got {}",
                cal.plane_size_mm
            )));
        }
        if !(cal.min_point_separation_px.is_finite() && cal.min_point_separation_px >= 0.0) {
            return Err(ConfigError::Invalid(
                "calibration.min_point_separation_px must be non-negative".into(),
            ));
        }

        match &self.dispatch.target {
            DispatchTarget::Http { url, .. } if !url.starts_with("http://") => {
                return Err(ConfigError::Invalid(format!(
                    "dispatch url `{url}` must start with http://"
                )));
            }
            DispatchTarget::Robot { address, .. } if address.trim().is_empty() => {
                return Err(ConfigError::Invalid("dispatch robot address is empty".into()));
            }
            _ => {}
        }
        if self.dispatch.queue_capacity == 0 {
            return Err(ConfigError::Invalid(
                "dispatch.queue_capacity must be at least 1".into(),
            ));
        }
        Ok(())
    }

    pub fn load_calibration(&self) -> Result<CalibrationRecord, ConfigError> {
        CalibrationRecord::load_json(&self.calibration.path).map_err(|source| {
            ConfigError::Calibration {
                path: self.calibration.path.clone(),
                source,
            }
        })
    }

    /// Load the stored calibration and precompute the height correction.
    pub fn build_context(&self) -> Result<PipelineContext, ConfigError> {
        let record = self.load_calibration()?;
        let ctx = PipelineContext::new(
            record.homography(),
            self.camera.clone(),
            self.pallet.assumed_height_m,
        )?;
        Ok(ctx.with_dimensions(self.dimensions))
    }

    pub fn build_pipeline(
        &self,
    ) -> Result<CoordinatePipeline<Box<dyn CoordinateSink + Send>>, ConfigError> {
        let context = self.build_context()?;
        let detector = PalletDetector::new(self.detector.clone());
        let sink = self.dispatch.build_sink()?;
        Ok(CoordinatePipeline::new(context, detector, sink))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "camera": { "height_m": 3.0, "tilt_deg": 30.0 },
        "pallet": { "assumed_height_m": 1.0 }
    }"#;

    #[test]
    fn minimal_config_takes_defaults() {
        let cfg: PalletVisionConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.validate().unwrap();
        assert_eq!(cfg.calibration.path, PathBuf::from(DEFAULT_CALIBRATION_PATH));
        assert_eq!(cfg.calibration.plane_size_mm, 1000.0);
        assert_eq!(cfg.detector, PalletDetectorParams::default());
        assert_eq!(cfg.dimensions, DimensionMode::Pixels);
        assert_eq!(cfg.dispatch.target, DispatchTarget::Stdout);
        assert!(!cfg.dispatch.background);
    }

    #[test]
    fn parses_tagged_dispatch_targets() {
        let cfg: DispatchConfig = serde_json::from_str(
            r#"{ "target": { "kind": "robot", "address": "10.0.0.9:3000", "default_z_mm": 250.0 }, "background": true }"#,
        )
        .unwrap();
        assert_eq!(
            cfg.target,
            DispatchTarget::Robot {
                address: "10.0.0.9:3000".into(),
                default_z_mm: Some(250.0),
                timeout_ms: 2000,
            }
        );
        assert!(cfg.background);
        assert_eq!(cfg.queue_capacity, 64);

        let cfg: DispatchConfig =
            serde_json::from_str(r#"{ "target": { "kind": "http", "url": "http://h/x" } }"#)
                .unwrap();
        assert!(matches!(cfg.target, DispatchTarget::Http { timeout_ms: 2000, .. }));
    }

    #[test]
    fn rejects_inconsistent_geometry() {
        let mut cfg: PalletVisionConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.pallet.assumed_height_m = 3.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Geometry(_))));

        let mut cfg: PalletVisionConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.camera.tilt_deg = 90.0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Geometry(_))));
    }

    #[test]
    fn rejects_bad_dispatch_settings() {
        let mut cfg: PalletVisionConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.dispatch.target = DispatchTarget::Http {
            url: "https://robot/api".into(),
            timeout_ms: 100,
        };
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));

        let mut cfg: PalletVisionConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.dispatch.queue_capacity = 0;
        assert!(matches!(cfg.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn relative_calibration_path_resolves_against_config_dir() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        std::fs::write(&path, MINIMAL).unwrap();

        let cfg = PalletVisionConfig::load_json(&path).unwrap();
        assert_eq!(cfg.calibration.path, dir.path().join(DEFAULT_CALIBRATION_PATH));
        assert!(matches!(
            cfg.build_context(),
            Err(ConfigError::Calibration { .. })
        ));
    }

    #[test]
    fn write_then_load_preserves_settings() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("session.json");
        let mut cfg: PalletVisionConfig = serde_json::from_str(MINIMAL).unwrap();
        cfg.calibration.path = dir.path().join("h.json");
        cfg.dimensions = DimensionMode::World;
        cfg.write_json(&path).unwrap();

        assert_eq!(PalletVisionConfig::load_json(&path).unwrap(), cfg);
    }
}
