//! # Grid Detection Types
//!
//! Method tags, per-strategy candidates and the final scale estimate.

use image::GrayImage;
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::perspective::PerspectiveInfo;

/// How a pixels-per-mm value was obtained.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GridMethod {
    Hough,
    Morphological,
    Frequency,
    HoughRelaxed,
    ManualCalibration,
    ObjectReference,
    FallbackEmergencyEstimation,
    FallbackTypicalScenario,
    FallbackImageSize,
    None,
}

impl GridMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            GridMethod::Hough => "hough",
            GridMethod::Morphological => "morphological",
            GridMethod::Frequency => "frequency",
            GridMethod::HoughRelaxed => "hough_relaxed",
            GridMethod::ManualCalibration => "manual_calibration",
            GridMethod::ObjectReference => "object_reference",
            GridMethod::FallbackEmergencyEstimation => "fallback_emergency_estimation",
            GridMethod::FallbackTypicalScenario => "fallback_typical_scenario",
            GridMethod::FallbackImageSize => "fallback_image_size",
            GridMethod::None => "none",
        }
    }

    /// Scale came from an image-size heuristic rather than a measurement.
    pub fn is_fallback(&self) -> bool {
        matches!(
            self,
            GridMethod::FallbackEmergencyEstimation
                | GridMethod::FallbackTypicalScenario
                | GridMethod::FallbackImageSize
        )
    }
}

impl std::fmt::Display for GridMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Merged line positions in pixels: y for horizontal lines, x for vertical ones.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GridLines {
    pub horizontal: Vec<f64>,
    pub vertical: Vec<f64>,
}

/// Output of a single detection strategy.
#[derive(Debug, Clone, PartialEq)]
pub struct GridCandidate {
    pub method: GridMethod,
    /// Mean grid spacing in pixels, 0 when either orientation lacks two lines
    pub spacing_px: f64,
    pub confidence: f64,
    pub lines: GridLines,
}

impl GridCandidate {
    pub fn empty(method: GridMethod) -> Self {
        Self {
            method,
            spacing_px: 0.0,
            confidence: 0.0,
            lines: GridLines::default(),
        }
    }

    pub fn is_usable(&self) -> bool {
        self.spacing_px > 0.0 && self.spacing_px.is_finite() && self.confidence > 0.0
    }
}

/// One grid line detector run against the enhanced grayscale image.
pub trait GridStrategy {
    fn method(&self) -> GridMethod;

    fn detect(&self, gray: &GrayImage) -> AppResult<GridCandidate>;
}

/// Scale estimate handed to measurement.
///
/// `detected` is only set for automatic grid detections; manual and fallback
/// scales carry `detected = false` with a positive `pixels_per_mm`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridEstimate {
    pub detected: bool,
    pub pixels_per_mm: f64,
    pub confidence: f64,
    pub method: GridMethod,
    pub spacing_px: Option<f64>,
    pub lines: Option<GridLines>,
    /// Acceptance tier the confidence cleared
    pub threshold_used: Option<f64>,
    pub warning: Option<String>,
    pub perspective: Option<PerspectiveInfo>,
}

impl GridEstimate {
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            pixels_per_mm: 0.0,
            confidence: 0.0,
            method: GridMethod::None,
            spacing_px: None,
            lines: None,
            threshold_used: None,
            warning: None,
            perspective: None,
        }
    }

    /// Accepted automatic detection. Falls back to `not_detected` for a non-positive scale.
    pub fn from_candidate(candidate: GridCandidate, grid_size_mm: f64, threshold: f64) -> Self {
        let pixels_per_mm = candidate.spacing_px / grid_size_mm;
        if !(pixels_per_mm > 0.0 && pixels_per_mm.is_finite()) {
            return Self::not_detected();
        }
        Self {
            detected: true,
            pixels_per_mm,
            confidence: candidate.confidence.clamp(0.0, 1.0),
            method: candidate.method,
            spacing_px: Some(candidate.spacing_px),
            lines: Some(candidate.lines),
            threshold_used: Some(threshold),
            warning: None,
            perspective: None,
        }
    }

    /// Trusted external calibration.
    pub fn manual(pixels_per_mm: f64) -> Self {
        Self {
            detected: false,
            pixels_per_mm,
            confidence: 0.9,
            method: GridMethod::ManualCalibration,
            ..Self::not_detected()
        }
    }

    /// Whether measurement can use this scale.
    pub fn has_scale(&self) -> bool {
        self.pixels_per_mm > 0.0 && self.pixels_per_mm.is_finite()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(GridMethod::Hough.as_str(), "hough");
        assert_eq!(GridMethod::ManualCalibration.to_string(), "manual_calibration");
        assert_eq!(
            serde_json::to_string(&GridMethod::FallbackTypicalScenario).unwrap(),
            "\"fallback_typical_scenario\""
        );
        assert!(GridMethod::FallbackImageSize.is_fallback());
        assert!(!GridMethod::Hough.is_fallback());
        assert!(!GridMethod::ManualCalibration.is_fallback());
    }

    #[test]
    fn test_from_candidate_converts_spacing() {
        let candidate = GridCandidate {
            method: GridMethod::Morphological,
            spacing_px: 40.0,
            confidence: 0.8,
            lines: GridLines::default(),
        };
        let estimate = GridEstimate::from_candidate(candidate, 10.0, 0.7);
        assert!(estimate.detected);
        assert_eq!(estimate.pixels_per_mm, 4.0);
        assert_eq!(estimate.threshold_used, Some(0.7));
    }

    #[test]
    fn test_from_candidate_rejects_zero_spacing() {
        let estimate =
            GridEstimate::from_candidate(GridCandidate::empty(GridMethod::Hough), 10.0, 0.2);
        assert!(!estimate.detected);
        assert_eq!(estimate.pixels_per_mm, 0.0);
    }

    #[test]
    fn test_manual_estimate() {
        let estimate = GridEstimate::manual(25.0);
        assert_eq!(estimate.confidence, 0.9);
        assert_eq!(estimate.method, GridMethod::ManualCalibration);
        assert!(estimate.has_scale());
    }
}
