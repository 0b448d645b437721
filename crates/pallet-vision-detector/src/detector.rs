use image::{DynamicImage, GrayImage};
use imageproc::point::Point;
use log::debug;

use crate::contours::{
    contour_area, contour_min_area_rect, edge_map, external_contours, simplified_vertex_count,
};
use crate::params::{CandidateSelection, PalletDetectorParams};
use crate::result::{ContourReport, ContourVerdict, PalletDetection};
use crate::smoothing::smooth;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Single-pass, stateless pallet detector.
///
/// Every call is independent: no tracking or smoothing across frames.
/// A frame without an acceptable contour yields `None`, which is the normal
/// "no pallet visible" outcome.
#[derive(Clone, Debug)]
pub struct PalletDetector {
    params: PalletDetectorParams,
}

impl PalletDetector {
    pub fn new(params: PalletDetectorParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &PalletDetectorParams {
        &self.params
    }

    /// Detect a pallet in a color or gray frame.
    pub fn detect(&self, frame: &DynamicImage) -> Option<PalletDetection> {
        self.detect_gray(&frame.to_luma8())
    }

    /// Detect a pallet in an already single-channel frame.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, gray), fields(width = gray.width(), height = gray.height()))
    )]
    pub fn detect_gray(&self, gray: &GrayImage) -> Option<PalletDetection> {
        let edges = self.edge_map(gray);
        let contours = external_contours(&edges);
        debug!("{} external contours", contours.len());

        let mut accepted = contours
            .iter()
            .enumerate()
            .filter_map(|(index, c)| self.evaluate(index, c).1);

        match self.params.selection {
            CandidateSelection::FirstMatch => accepted.next(),
            CandidateSelection::ClosestRatio { target } => accepted.min_by(|a, b| {
                (a.aspect_ratio - target)
                    .abs()
                    .total_cmp(&(b.aspect_ratio - target).abs())
            }),
        }
    }

    /// Smoothed hysteresis edge map of a gray frame.
    pub fn edge_map(&self, gray: &GrayImage) -> GrayImage {
        let smoothed = smooth(gray, &self.params.smoothing);
        edge_map(&smoothed, &self.params.edges)
    }

    /// Run every gate on every external contour and report the outcome.
    pub fn inspect(&self, gray: &GrayImage) -> Vec<ContourReport> {
        let edges = self.edge_map(gray);
        external_contours(&edges)
            .iter()
            .enumerate()
            .map(|(index, c)| self.evaluate(index, c).0)
            .collect()
    }

    fn evaluate(
        &self,
        index: usize,
        contour: &[Point<i32>],
    ) -> (ContourReport, Option<PalletDetection>) {
        let area = contour_area(contour);
        let mut report = ContourReport {
            index,
            num_points: contour.len(),
            area,
            vertices: None,
            rect: None,
            aspect_ratio: None,
            verdict: ContourVerdict::TooSmall,
        };
        if area < self.params.min_area_px {
            return (report, None);
        }

        let vertices = simplified_vertex_count(contour, self.params.approx_epsilon_frac);
        report.vertices = Some(vertices);
        if vertices < self.params.min_polygon_vertices {
            report.verdict = ContourVerdict::TooFewVertices;
            return (report, None);
        }

        let rect = contour_min_area_rect(contour);
        report.rect = rect;
        let Some((rect, ratio)) = rect.and_then(|r| Some((r, r.aspect_ratio()?))) else {
            report.verdict = ContourVerdict::DegenerateRect;
            return (report, None);
        };
        report.aspect_ratio = Some(ratio);
        if !self.params.aspect_in_range(ratio) {
            debug!(
                "contour {index}: aspect {ratio:.2} outside ({}, {})",
                self.params.min_aspect_ratio, self.params.max_aspect_ratio
            );
            report.verdict = ContourVerdict::AspectOutOfRange;
            return (report, None);
        }

        report.verdict = ContourVerdict::Accepted;
        let detection = PalletDetection::from_rect(&rect, ratio, area);
        (report, Some(detection))
    }
}

impl Default for PalletDetector {
    fn default() -> Self {
        Self::new(PalletDetectorParams::default())
    }
}
