//! # Analysis Report
//!
//! Plain, serialisable result types handed to callers. Internal detector
//! output is converted here exactly once; every float passes through
//! [`finite`] on the way in, so a report always encodes as JSON.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{AppError, AppResult};
use crate::grid::GridEstimate;
use crate::measurement::Measurements;
use crate::perspective::PerspectiveInfo;
use crate::segmentation::SegmentationResult;

/// Replaces NaN and infinities with 0.
pub fn finite(value: f64) -> f64 {
    if value.is_finite() {
        value
    } else {
        0.0
    }
}

fn finite_opt(value: Option<f64>) -> Option<f64> {
    value.map(finite)
}

/// Input raster dimensions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub width: u32,
    pub height: u32,
    pub channels: u8,
}

impl ImageInfo {
    pub fn rgb(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            channels: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PerspectiveSummary {
    pub corrected: bool,
    pub reason: String,
    pub original_quality: f64,
    pub corrected_quality: Option<f64>,
    pub output_size: Option<(u32, u32)>,
}

impl From<&PerspectiveInfo> for PerspectiveSummary {
    fn from(info: &PerspectiveInfo) -> Self {
        Self {
            corrected: info.corrected,
            reason: info.reason.clone(),
            original_quality: finite(info.original_quality),
            corrected_quality: finite_opt(info.corrected_quality),
            output_size: info.output_size,
        }
    }
}

/// Calibration outcome without the raw line sets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridSummary {
    pub grid_detected: bool,
    pub pixels_per_mm: f64,
    pub confidence: f64,
    pub method: String,
    pub spacing_px: Option<f64>,
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
    pub threshold_used: Option<f64>,
    pub warning: Option<String>,
    pub perspective: Option<PerspectiveSummary>,
}

impl Default for GridSummary {
    fn default() -> Self {
        Self::from(&GridEstimate::not_detected())
    }
}

impl From<&GridEstimate> for GridSummary {
    fn from(estimate: &GridEstimate) -> Self {
        let (horizontal_lines, vertical_lines) = estimate
            .lines
            .as_ref()
            .map_or((0, 0), |lines| (lines.horizontal.len(), lines.vertical.len()));
        Self {
            grid_detected: estimate.detected,
            pixels_per_mm: finite(estimate.pixels_per_mm),
            confidence: finite(estimate.confidence),
            method: estimate.method.as_str().to_string(),
            spacing_px: finite_opt(estimate.spacing_px),
            horizontal_lines,
            vertical_lines,
            threshold_used: finite_opt(estimate.threshold_used),
            warning: estimate.warning.clone(),
            perspective: estimate.perspective.as_ref().map(PerspectiveSummary::from),
        }
    }
}

/// Segmentation outcome with the contour stripped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationSummary {
    pub detected: bool,
    pub confidence: f64,
    pub method: String,
    pub preprocessing_used: Vec<String>,
    pub area_px: f64,
    pub contour_points: usize,
    pub candidates_evaluated: usize,
    pub processing_time_ms: u32,
}

impl Default for SegmentationSummary {
    fn default() -> Self {
        Self::from(&SegmentationResult::not_detected())
    }
}

impl From<&SegmentationResult> for SegmentationSummary {
    fn from(result: &SegmentationResult) -> Self {
        Self {
            detected: result.detected,
            confidence: finite(result.confidence),
            method: result.method.as_str().to_string(),
            preprocessing_used: result.preprocessing_used.clone(),
            area_px: finite(result.area_px),
            contour_points: result.contour.as_ref().map_or(0, Vec::len),
            candidates_evaluated: result.candidates_evaluated,
            processing_time_ms: result.processing_time_ms,
        }
    }
}

/// Complete result of one biopsy analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisResult {
    pub success: bool,
    pub timestamp: DateTime<Utc>,
    pub processing_time_ms: u32,
    pub image_info: ImageInfo,
    pub grid_detection: GridSummary,
    pub biopsy_segmentation: SegmentationSummary,
    pub measurements: Measurements,
    /// Set when calibration succeeded but no sample was found
    pub manual_measurement_available: bool,
    /// Base64 JPEG overlay
    pub overlay_image: Option<String>,
    pub confidence_overall: f64,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl AnalysisResult {
    /// Empty successful result for an image of the given size.
    pub fn new(image_info: ImageInfo) -> Self {
        Self {
            success: true,
            timestamp: Utc::now(),
            processing_time_ms: 0,
            image_info,
            grid_detection: GridSummary::default(),
            biopsy_segmentation: SegmentationSummary::default(),
            measurements: Measurements::default(),
            manual_measurement_available: false,
            overlay_image: None,
            confidence_overall: 0.0,
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn add_warning(&mut self, warning: impl Into<String>) {
        self.warnings.push(warning.into());
    }

    pub fn add_error(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    /// Zeroes any non-finite float that slipped into the measurements.
    pub fn sanitize(&mut self) {
        let m = &mut self.measurements;
        for value in [
            &mut m.area_mm2,
            &mut m.perimeter_mm,
            &mut m.width_mm,
            &mut m.height_mm,
            &mut m.length_max_mm,
            &mut m.width_max_mm,
            &mut m.equivalent_diameter_mm,
            &mut m.circularity,
            &mut m.aspect_ratio,
            &mut m.solidity,
            &mut m.extent,
            &mut m.roundness,
            &mut m.compactness,
            &mut m.angle_degrees,
            &mut m.pixels_per_mm,
            &mut m.perimeter_pixels,
            &mut m.major_axis_pixels,
        ] {
            *value = finite(*value);
        }
        self.confidence_overall = finite(self.confidence_overall).clamp(0.0, 1.0);
    }

    pub fn to_json(&self) -> AppResult<String> {
        serde_json::to_string(self).map_err(|e| AppError::Encoding(format!("Result JSON: {}", e)))
    }

    pub fn to_json_pretty(&self) -> AppResult<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| AppError::Encoding(format!("Result JSON: {}", e)))
    }

    pub fn from_json(json: &str) -> AppResult<Self> {
        serde_json::from_str(json).map_err(|e| AppError::Encoding(format!("Result JSON: {}", e)))
    }
}

/// Result of grid detection without segmentation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridOnlyResult {
    pub success: bool,
    pub image_info: ImageInfo,
    pub grid_detection: GridSummary,
    pub processing_time_ms: u32,
    pub errors: Vec<String>,
}

/// Result of segmentation without calibration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentationOnlyResult {
    pub success: bool,
    pub image_info: ImageInfo,
    pub biopsy_segmentation: SegmentationSummary,
    pub overlay_image: Option<String>,
    pub processing_time_ms: u32,
    pub errors: Vec<String>,
}
