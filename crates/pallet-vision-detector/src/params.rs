use serde::{Deserialize, Serialize};

/// Rejected detector configuration.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum DetectorParamsError {
    #[error("smoothing sigma values must be positive and finite")]
    InvalidSigma,
    #[error("edge thresholds must satisfy 0 <= low ({low}) <= high ({high})")]
    InvalidEdgeThresholds { low: f32, high: f32 },
    #[error("aspect ratio window ({min}, {max}) is empty")]
    EmptyAspectWindow { min: f32, max: f32 },
    #[error("{0} must be non-negative and finite")]
    Negative(&'static str),
}

/// Noise suppression applied to the gray frame before edge detection.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Smoothing {
    None,
    Gaussian {
        sigma: f32,
    },
    /// Edge-preserving; preferred when boundary sharpness matters more than
    /// raw noise suppression.
    Bilateral {
        diameter: u32,
        sigma_color: f32,
        sigma_space: f32,
    },
}

impl Smoothing {
    /// Bilateral filter with the usual 9 px / 75 / 75 settings.
    pub fn bilateral() -> Self {
        Smoothing::Bilateral {
            diameter: 9,
            sigma_color: 75.0,
            sigma_space: 75.0,
        }
    }
}

impl Default for Smoothing {
    /// Gaussian with the sigma a 5×5 kernel implies.
    fn default() -> Self {
        Smoothing::Gaussian { sigma: 1.1 }
    }
}

/// Hysteresis edge detector settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeParams {
    pub low_threshold: f32,
    pub high_threshold: f32,
    /// L∞ dilation radius applied to the edge map; 0 disables it.
    pub dilation: u8,
}

impl Default for EdgeParams {
    fn default() -> Self {
        Self {
            low_threshold: 50.0,
            high_threshold: 150.0,
            dilation: 1,
        }
    }
}

/// How to pick among several contours that pass every gate.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CandidateSelection {
    /// First accepted contour in scan order.
    #[default]
    FirstMatch,
    /// Accepted contour whose aspect ratio is closest to `target`.
    ClosestRatio { target: f32 },
}

/// Parameters for [`crate::PalletDetector`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PalletDetectorParams {
    pub smoothing: Smoothing,
    pub edges: EdgeParams,
    /// Minimal enclosed contour area, pixel².
    pub min_area_px: f64,
    /// Polygon simplification tolerance as a fraction of the perimeter.
    pub approx_epsilon_frac: f64,
    /// Minimal vertex count of the simplified polygon.
    pub min_polygon_vertices: usize,
    /// Exclusive lower bound of the long/short side ratio.
    pub min_aspect_ratio: f32,
    /// Exclusive upper bound of the long/short side ratio.
    pub max_aspect_ratio: f32,
    pub selection: CandidateSelection,
}

impl Default for PalletDetectorParams {
    fn default() -> Self {
        Self {
            smoothing: Smoothing::default(),
            edges: EdgeParams::default(),
            min_area_px: 5000.0,
            approx_epsilon_frac: 0.02,
            min_polygon_vertices: 4,
            min_aspect_ratio: 2.5,
            max_aspect_ratio: 4.0,
            selection: CandidateSelection::FirstMatch,
        }
    }
}

impl PalletDetectorParams {
    pub fn validate(&self) -> Result<(), DetectorParamsError> {
        match self.smoothing {
            Smoothing::None => {}
            Smoothing::Gaussian { sigma } => {
                if !(sigma.is_finite() && sigma > 0.0) {
                    return Err(DetectorParamsError::InvalidSigma);
                }
            }
            Smoothing::Bilateral {
                sigma_color,
                sigma_space,
                ..
            } => {
                let ok = |s: f32| s.is_finite() && s > 0.0;
                if !ok(sigma_color) || !ok(sigma_space) {
                    return Err(DetectorParamsError::InvalidSigma);
                }
            }
        }

        let EdgeParams {
            low_threshold: low,
            high_threshold: high,
            ..
        } = self.edges;
        if !(low.is_finite() && high.is_finite() && 0.0 <= low && low <= high) {
            return Err(DetectorParamsError::InvalidEdgeThresholds { low, high });
        }

        if !(self.min_area_px.is_finite() && self.min_area_px >= 0.0) {
            return Err(DetectorParamsError::Negative("min_area_px"));
        }
        if !(self.approx_epsilon_frac.is_finite() && self.approx_epsilon_frac >= 0.0) {
            return Err(DetectorParamsError::Negative("approx_epsilon_frac"));
        }

        let (min, max) = (self.min_aspect_ratio, self.max_aspect_ratio);
        if !(min.is_finite() && max.is_finite() && min < max) {
            return Err(DetectorParamsError::EmptyAspectWindow { min, max });
        }
        Ok(())
    }

    /// Strict `(min, max)` aspect-ratio gate.
    #[inline]
    pub fn aspect_in_range(&self, ratio: f32) -> bool {
        self.min_aspect_ratio < ratio && ratio < self.max_aspect_ratio
    }
}
