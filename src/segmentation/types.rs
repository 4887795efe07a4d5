//! # Segmentation Types
//!
//! Strategy trait, per-strategy candidates and the selected segmentation.

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::errors::AppResult;
use crate::geometry::Contour;

/// Strategy that produced a sample contour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentationMethod {
    Watershed,
    AdaptiveThreshold,
    ColorBased,
    EdgeBased,
    None,
}

impl SegmentationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            SegmentationMethod::Watershed => "watershed",
            SegmentationMethod::AdaptiveThreshold => "adaptive_threshold",
            SegmentationMethod::ColorBased => "color_based",
            SegmentationMethod::EdgeBased => "edge_based",
            SegmentationMethod::None => "none",
        }
    }
}

impl std::fmt::Display for SegmentationMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contour proposed by one strategy on one input.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentCandidate {
    pub contour: Contour,
    pub confidence: f64,
    /// Polygon area of the contour in square pixels
    pub area_px: f64,
}

/// One segmentation strategy.
pub trait SegmentationStrategy {
    fn method(&self) -> SegmentationMethod;

    /// Strategies that only read the color raster run once per analysis
    /// instead of once per grayscale variant.
    fn uses_color(&self) -> bool {
        false
    }

    /// `Ok(None)` when the strategy finds no plausible region.
    fn segment(&self, gray: &GrayImage, original: &RgbImage) -> AppResult<Option<SegmentCandidate>>;
}

/// Selected sample region.
#[derive(Debug, Clone, PartialEq)]
pub struct SegmentationResult {
    pub detected: bool,
    pub contour: Option<Contour>,
    pub confidence: f64,
    pub method: SegmentationMethod,
    /// Input the winning candidate came from, e.g. `["morph_closed"]`
    pub preprocessing_used: Vec<String>,
    pub area_px: f64,
    /// Number of (strategy, input) runs that produced a candidate
    pub candidates_evaluated: usize,
    pub processing_time_ms: u32,
}

impl SegmentationResult {
    pub fn not_detected() -> Self {
        Self {
            detected: false,
            contour: None,
            confidence: 0.0,
            method: SegmentationMethod::None,
            preprocessing_used: Vec::new(),
            area_px: 0.0,
            candidates_evaluated: 0,
            processing_time_ms: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_method_names() {
        assert_eq!(SegmentationMethod::AdaptiveThreshold.as_str(), "adaptive_threshold");
        assert_eq!(SegmentationMethod::ColorBased.to_string(), "color_based");
        assert_eq!(
            serde_json::to_string(&SegmentationMethod::EdgeBased).unwrap(),
            "\"edge_based\""
        );
    }

    #[test]
    fn test_not_detected() {
        let result = SegmentationResult::not_detected();
        assert!(!result.detected);
        assert!(result.contour.is_none());
        assert_eq!(result.method, SegmentationMethod::None);
    }
}
