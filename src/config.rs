//! # Unified Application Configuration
//!
//! This module provides a centralized configuration system that consolidates
//! all pipeline settings into a single, structured configuration object.
//! It supports loading from environment variables, validation, and provides
//! a clean interface for accessing configuration throughout the pipeline.
//!
//! Detection thresholds, angle tolerances and color ranges are empirically tuned
//! values; they live here so they can be re-tuned against real photographs
//! without touching the detectors.

use crate::errors::{AppError, AppResult};
use crate::observability_config::ObservabilityConfig;
use crate::preprocessing::HsvRange;
use serde::{Deserialize, Serialize};
use std::env;

/// Parameters of the image derivatives built for every analysis
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PreprocessingConfig {
    /// CLAHE histogram clip limit
    pub clahe_clip_limit: f32,
    /// CLAHE tile grid (tiles along x, tiles along y)
    pub clahe_tile_grid: (u32, u32),
    /// Bilateral filter neighbourhood diameter in pixels
    pub bilateral_diameter: u32,
    /// Bilateral filter intensity sigma
    pub bilateral_sigma_color: f32,
    /// Bilateral filter spatial sigma
    pub bilateral_sigma_space: f32,
    /// Gaussian smoothing kernel size (odd)
    pub gaussian_kernel_size: u32,
    /// Square closing kernel size for the morph_closed variant
    pub closing_kernel_size: u32,
    /// Weight of the bilateral variant in the combined blend (the rest goes to morph_closed)
    pub combined_bilateral_weight: f32,
}

impl Default for PreprocessingConfig {
    fn default() -> Self {
        Self {
            clahe_clip_limit: 2.0,
            clahe_tile_grid: (8, 8),
            bilateral_diameter: 9,
            bilateral_sigma_color: 75.0,
            bilateral_sigma_space: 75.0,
            gaussian_kernel_size: 5,
            closing_kernel_size: 5,
            combined_bilateral_weight: 0.7,
        }
    }
}

impl PreprocessingConfig {
    /// Validate preprocessing configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.clahe_clip_limit <= 0.0 {
            return Err(AppError::Config("CLAHE clip limit must be positive".to_string()));
        }
        if self.clahe_tile_grid.0 == 0 || self.clahe_tile_grid.1 == 0 {
            return Err(AppError::Config("CLAHE tile grid cannot be 0".to_string()));
        }
        if self.bilateral_diameter == 0 {
            return Err(AppError::Config("Bilateral diameter cannot be 0".to_string()));
        }
        if self.gaussian_kernel_size < 3 || self.gaussian_kernel_size % 2 == 0 {
            return Err(AppError::Config(
                "Gaussian kernel size must be an odd number >= 3".to_string(),
            ));
        }
        if self.closing_kernel_size == 0 {
            return Err(AppError::Config("Closing kernel size cannot be 0".to_string()));
        }
        if !(0.0..=1.0).contains(&self.combined_bilateral_weight) {
            return Err(AppError::Config(
                "Combined bilateral weight must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Perspective check and rectification settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerspectiveConfig {
    /// Whether grid detection attempts rectification at all
    pub enabled: bool,
    /// Minimum percentage of axis-aligned lines for an image to pass without correction
    pub quality_threshold: f64,
    /// Band in degrees around 0/90/180 counted as axis-aligned
    pub angle_tolerance_degrees: f64,
    /// Canny thresholds used by the quality check
    pub canny_low: f32,
    pub canny_high: f32,
    /// Hough vote threshold used by the quality check
    pub hough_vote_threshold: u32,
    /// Harris detector free parameter
    pub harris_k: f32,
    /// Harris window size in pixels (odd)
    pub harris_block_size: u32,
    /// Corner response threshold relative to the strongest response
    pub harris_threshold_ratio: f32,
}

impl Default for PerspectiveConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            quality_threshold: 70.0,
            angle_tolerance_degrees: 10.0,
            canny_low: 50.0,
            canny_high: 150.0,
            hough_vote_threshold: 80,
            harris_k: 0.04,
            harris_block_size: 3,
            harris_threshold_ratio: 0.01,
        }
    }
}

impl PerspectiveConfig {
    /// Validate perspective configuration
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=100.0).contains(&self.quality_threshold) {
            return Err(AppError::Config(
                "Perspective quality threshold must be between 0 and 100".to_string(),
            ));
        }
        if self.angle_tolerance_degrees <= 0.0 || self.angle_tolerance_degrees >= 45.0 {
            return Err(AppError::Config(
                "Perspective angle tolerance must be between 0 and 45 degrees".to_string(),
            ));
        }
        if self.canny_low <= 0.0 || self.canny_high <= self.canny_low {
            return Err(AppError::Config(
                "Perspective Canny thresholds must satisfy 0 < low < high".to_string(),
            ));
        }
        if self.harris_block_size < 3 || self.harris_block_size % 2 == 0 {
            return Err(AppError::Config(
                "Harris block size must be an odd number >= 3".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.harris_threshold_ratio) {
            return Err(AppError::Config(
                "Harris threshold ratio must be between 0.0 and 1.0".to_string(),
            ));
        }
        Ok(())
    }
}

/// Grid detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GridDetectionConfig {
    /// Physical spacing of the printed grid in millimeters
    pub grid_size_mm: f64,
    /// Acceptance tiers, tried from strictest to loosest
    pub acceptance_thresholds: Vec<f64>,
    /// Confidence floor for the relaxed fallback pass
    pub relaxed_confidence_floor: f64,
    /// Band in degrees around horizontal/vertical for line classification
    pub angle_tolerance_degrees: f64,
    /// Wider classification band used by the relaxed pass
    pub relaxed_angle_tolerance_degrees: f64,
    /// Hough vote thresholds as fractions of the shorter image side
    pub hough_vote_fractions: Vec<f64>,
    /// Hough non-maximum suppression radii
    pub hough_suppression_radii: Vec<u32>,
    /// Upper bound on lines kept from a single Hough run
    pub max_lines: usize,
    /// Line positions closer than this many pixels are merged
    pub line_merge_distance: f64,
    /// Relaxed pass: blur sigma applied before edge detection
    pub relaxed_blur_sigma: f32,
    /// Relaxed pass: Canny (low, high) pairs
    pub relaxed_canny_pairs: Vec<(f32, f32)>,
    /// Relaxed pass: Hough vote fractions
    pub relaxed_vote_fractions: Vec<f64>,
    /// Length of the line-shaped structuring elements of the morphological detector
    pub morph_kernel_length: u32,
    /// Minimum component area kept by the morphological detector
    pub morph_min_component_area: u32,
    /// Confidence ceiling of the frequency-domain detector
    pub frequency_confidence_cap: f64,
    /// Perspective check and correction
    pub perspective: PerspectiveConfig,
}

impl Default for GridDetectionConfig {
    fn default() -> Self {
        Self {
            grid_size_mm: 10.0,
            acceptance_thresholds: vec![0.7, 0.5, 0.3, 0.2],
            relaxed_confidence_floor: 0.1,
            angle_tolerance_degrees: 11.0,
            relaxed_angle_tolerance_degrees: 23.0,
            hough_vote_fractions: vec![0.6, 0.45, 0.3],
            hough_suppression_radii: vec![4, 8],
            max_lines: 400,
            line_merge_distance: 4.0,
            relaxed_blur_sigma: 2.5,
            relaxed_canny_pairs: vec![(20.0, 60.0), (30.0, 90.0), (50.0, 150.0)],
            relaxed_vote_fractions: vec![0.25, 0.15, 0.1],
            morph_kernel_length: 25,
            morph_min_component_area: 100,
            frequency_confidence_cap: 0.6,
            perspective: PerspectiveConfig::default(),
        }
    }
}

impl GridDetectionConfig {
    /// Validate grid detection configuration
    pub fn validate(&self) -> AppResult<()> {
        if !(self.grid_size_mm > 0.0 && self.grid_size_mm <= 50.0) {
            return Err(AppError::Config(format!(
                "Grid size must be in (0, 50] mm, got {}",
                self.grid_size_mm
            )));
        }
        if self.acceptance_thresholds.is_empty() {
            return Err(AppError::Config(
                "At least one acceptance threshold is required".to_string(),
            ));
        }
        if self
            .acceptance_thresholds
            .iter()
            .any(|t| !(0.0..=1.0).contains(t))
        {
            return Err(AppError::Config(
                "Acceptance thresholds must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self
            .acceptance_thresholds
            .windows(2)
            .any(|pair| pair[0] < pair[1])
        {
            return Err(AppError::Config(
                "Acceptance thresholds must be in descending order".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.relaxed_confidence_floor) {
            return Err(AppError::Config(
                "Relaxed confidence floor must be between 0.0 and 1.0".to_string(),
            ));
        }
        for tolerance in [
            self.angle_tolerance_degrees,
            self.relaxed_angle_tolerance_degrees,
        ] {
            if tolerance <= 0.0 || tolerance >= 45.0 {
                return Err(AppError::Config(format!(
                    "Angle tolerance must be between 0 and 45 degrees, got {}",
                    tolerance
                )));
            }
        }
        if self.hough_vote_fractions.is_empty() || self.hough_suppression_radii.is_empty() {
            return Err(AppError::Config(
                "Hough parameter sweep cannot be empty".to_string(),
            ));
        }
        if self.relaxed_canny_pairs.iter().any(|(lo, hi)| *lo <= 0.0 || hi <= lo) {
            return Err(AppError::Config(
                "Relaxed Canny pairs must satisfy 0 < low < high".to_string(),
            ));
        }
        if self.max_lines == 0 {
            return Err(AppError::Config("Max lines cannot be 0".to_string()));
        }
        if self.morph_kernel_length < 3 {
            return Err(AppError::Config(
                "Morphological kernel length must be at least 3".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.frequency_confidence_cap) {
            return Err(AppError::Config(
                "Frequency confidence cap must be between 0.0 and 1.0".to_string(),
            ));
        }
        self.perspective.validate()
    }
}

/// Sample segmentation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationConfig {
    /// Best candidate must exceed this confidence to count as detected
    pub acceptance_threshold: f64,
    /// Plausible sample area band as fractions of the image area
    pub min_area_fraction: f64,
    pub max_area_fraction: f64,
    /// Area band for the edge-based strategy
    pub edge_min_area_fraction: f64,
    pub edge_max_area_fraction: f64,
    /// Adaptive threshold neighbourhood (odd) and offset
    pub adaptive_block_size: u32,
    pub adaptive_c: f32,
    /// Canny thresholds of the edge-based strategy
    pub canny_low: f32,
    pub canny_high: f32,
    /// HSV ranges treated as tissue by the color strategy
    pub tissue_hsv_ranges: Vec<HsvRange>,
    /// Per-strategy confidence ceilings
    pub watershed_confidence_cap: f64,
    pub adaptive_confidence_cap: f64,
    pub color_confidence_cap: f64,
    pub edge_confidence_cap: f64,
}

impl Default for SegmentationConfig {
    fn default() -> Self {
        Self {
            acceptance_threshold: 0.5,
            min_area_fraction: 0.005,
            max_area_fraction: 0.85,
            edge_min_area_fraction: 0.02,
            edge_max_area_fraction: 0.70,
            adaptive_block_size: 11,
            adaptive_c: 2.0,
            canny_low: 50.0,
            canny_high: 150.0,
            tissue_hsv_ranges: vec![
                HsvRange::new([0, 30, 50], [20, 255, 255]),
                HsvRange::new([160, 30, 50], [180, 255, 255]),
            ],
            watershed_confidence_cap: 0.8,
            adaptive_confidence_cap: 0.7,
            color_confidence_cap: 0.6,
            edge_confidence_cap: 0.5,
        }
    }
}

impl SegmentationConfig {
    /// Validate segmentation configuration
    pub fn validate(&self) -> AppResult<()> {
        if !(0.0..=1.0).contains(&self.acceptance_threshold) {
            return Err(AppError::Config(
                "Segmentation acceptance threshold must be between 0.0 and 1.0".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.min_area_fraction)
            || self.max_area_fraction <= self.min_area_fraction
            || self.max_area_fraction > 1.0
        {
            return Err(AppError::Config(
                "Segmentation area band must satisfy 0 <= min < max <= 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.edge_min_area_fraction)
            || self.edge_max_area_fraction <= self.edge_min_area_fraction
            || self.edge_max_area_fraction > 1.0
        {
            return Err(AppError::Config(
                "Edge segmentation area band must satisfy 0 <= min < max <= 1".to_string(),
            ));
        }
        if self.adaptive_block_size < 3 || self.adaptive_block_size % 2 == 0 {
            return Err(AppError::Config(
                "Adaptive block size must be an odd number >= 3".to_string(),
            ));
        }
        if self.canny_low <= 0.0 || self.canny_high <= self.canny_low {
            return Err(AppError::Config(
                "Segmentation Canny thresholds must satisfy 0 < low < high".to_string(),
            ));
        }
        if self.tissue_hsv_ranges.is_empty() {
            return Err(AppError::Config(
                "At least one tissue HSV range is required".to_string(),
            ));
        }
        for range in &self.tissue_hsv_ranges {
            if range.lower.iter().zip(range.upper.iter()).any(|(lo, hi)| lo > hi)
                || range.upper[0] > 180
            {
                return Err(AppError::Config(format!(
                    "Invalid HSV range {:?}..{:?}",
                    range.lower, range.upper
                )));
            }
        }
        for cap in [
            self.watershed_confidence_cap,
            self.adaptive_confidence_cap,
            self.color_confidence_cap,
            self.edge_confidence_cap,
        ] {
            if !(0.0..=1.0).contains(&cap) {
                return Err(AppError::Config(
                    "Strategy confidence caps must be between 0.0 and 1.0".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Calibration fallback heuristics
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FallbackConfig {
    /// Physical scene widths (mm) a photograph is assumed to span
    pub typical_scene_widths_mm: Vec<f64>,
    /// Pixels-per-mm ratio preferred among the scene-width candidates
    pub ideal_pixels_per_mm: f64,
    /// Candidates outside this band are discarded
    pub plausible_range: (f64, f64),
    /// Ratios inside this band get full validation confidence
    pub optimal_range: (f64, f64),
    /// Ratios outside this band are invalid
    pub valid_range: (f64, f64),
    /// Used when no scene-width candidate is plausible
    pub conservative_pixels_per_mm: f64,
    /// Scene width assumed by the last-resort estimate
    pub last_resort_scene_width_mm: f64,
    /// Confidence of the scene-width estimate, also the ceiling for any fallback scale
    pub emergency_confidence: f64,
    /// Typical (pixels_per_mm, scenario) pairs scored against the image
    pub typical_scenarios: Vec<(f64, String)>,
    /// Plausible scene width and height bands in mm
    pub scene_width_range_mm: (f64, f64),
    pub scene_height_range_mm: (f64, f64),
}

impl Default for FallbackConfig {
    fn default() -> Self {
        Self {
            typical_scene_widths_mm: vec![100.0, 150.0, 200.0, 250.0, 300.0],
            ideal_pixels_per_mm: 40.0,
            plausible_range: (10.0, 100.0),
            optimal_range: (20.0, 80.0),
            valid_range: (5.0, 200.0),
            conservative_pixels_per_mm: 30.0,
            last_resort_scene_width_mm: 200.0,
            emergency_confidence: 0.3,
            typical_scenarios: vec![
                (25.0, "wide microscope view".to_string()),
                (40.0, "standard biopsy view".to_string()),
                (60.0, "close-up view".to_string()),
            ],
            scene_width_range_mm: (50.0, 500.0),
            scene_height_range_mm: (30.0, 400.0),
        }
    }
}

impl FallbackConfig {
    /// Validate fallback configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.typical_scene_widths_mm.iter().any(|w| *w <= 0.0) {
            return Err(AppError::Config(
                "Typical scene widths must be positive".to_string(),
            ));
        }
        for (name, (lo, hi)) in [
            ("plausible", self.plausible_range),
            ("optimal", self.optimal_range),
            ("valid", self.valid_range),
            ("scene width", self.scene_width_range_mm),
            ("scene height", self.scene_height_range_mm),
        ] {
            if lo <= 0.0 || hi <= lo {
                return Err(AppError::Config(format!(
                    "Fallback {} range must satisfy 0 < low < high",
                    name
                )));
            }
        }
        if self.conservative_pixels_per_mm <= 0.0 || self.ideal_pixels_per_mm <= 0.0 {
            return Err(AppError::Config(
                "Fallback pixels-per-mm constants must be positive".to_string(),
            ));
        }
        if self.last_resort_scene_width_mm <= 0.0 {
            return Err(AppError::Config(
                "Last resort scene width must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.emergency_confidence) {
            return Err(AppError::Config(
                "Emergency confidence must be between 0.0 and 1.0".to_string(),
            ));
        }
        if self.typical_scenarios.iter().any(|(ppm, _)| *ppm <= 0.0) {
            return Err(AppError::Config(
                "Typical scenario ratios must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Overlay rendering settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OverlayConfig {
    /// JPEG quality of the encoded overlay (1-100)
    pub jpeg_quality: u8,
    /// Explicit TrueType font for the measurement text block
    pub font_path: Option<String>,
    /// Text height in pixels
    pub font_size: f32,
    /// Stroke thickness of contour and box lines in pixels
    pub line_thickness: u32,
}

impl Default for OverlayConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 85,
            font_path: None,
            font_size: 18.0,
            line_thickness: 2,
        }
    }
}

impl OverlayConfig {
    /// Validate overlay configuration
    pub fn validate(&self) -> AppResult<()> {
        if self.jpeg_quality == 0 || self.jpeg_quality > 100 {
            return Err(AppError::Config(
                "JPEG quality must be between 1 and 100".to_string(),
            ));
        }
        if self.font_size <= 0.0 {
            return Err(AppError::Config("Font size must be positive".to_string()));
        }
        if self.line_thickness == 0 || self.line_thickness > 10 {
            return Err(AppError::Config(
                "Line thickness must be between 1 and 10".to_string(),
            ));
        }
        if let Some(path) = &self.font_path {
            if path.trim().is_empty() {
                return Err(AppError::Config("Font path cannot be empty".to_string()));
            }
        }
        Ok(())
    }
}

/// Unified application configuration
#[derive(Debug, Clone, Default)]
pub struct AppConfig {
    /// Image derivative settings
    pub preprocessing: PreprocessingConfig,
    /// Grid detection settings
    pub grid: GridDetectionConfig,
    /// Segmentation settings
    pub segmentation: SegmentationConfig,
    /// Calibration fallback settings
    pub fallback: FallbackConfig,
    /// Overlay settings
    pub overlay: OverlayConfig,
    /// Observability configuration
    pub observability: ObservabilityConfig,
}

impl AppConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> AppResult<Self> {
        let mut config = Self::default();

        config.grid.grid_size_mm = env::var("GRID_SIZE_MM")
            .unwrap_or_else(|_| "10.0".to_string())
            .parse()
            .map_err(|_| AppError::Config("GRID_SIZE_MM must be a valid number".to_string()))?;
        config.grid.perspective.enabled = env::var("PERSPECTIVE_CORRECTION")
            .unwrap_or_else(|_| "true".to_string())
            .to_lowercase()
            == "true";
        config.grid.perspective.quality_threshold = env::var("PERSPECTIVE_QUALITY_THRESHOLD")
            .unwrap_or_else(|_| "70".to_string())
            .parse()
            .map_err(|_| {
                AppError::Config("PERSPECTIVE_QUALITY_THRESHOLD must be a valid number".to_string())
            })?;

        config.segmentation.acceptance_threshold = env::var("SEGMENTATION_ACCEPTANCE_THRESHOLD")
            .unwrap_or_else(|_| "0.5".to_string())
            .parse()
            .map_err(|_| {
                AppError::Config(
                    "SEGMENTATION_ACCEPTANCE_THRESHOLD must be a valid number".to_string(),
                )
            })?;

        config.overlay.jpeg_quality = env::var("OVERLAY_JPEG_QUALITY")
            .unwrap_or_else(|_| "85".to_string())
            .parse()
            .map_err(|_| {
                AppError::Config("OVERLAY_JPEG_QUALITY must be a number between 1 and 100".to_string())
            })?;
        config.overlay.font_path = env::var("OVERLAY_FONT_PATH")
            .ok()
            .filter(|path| !path.trim().is_empty());

        config.observability = ObservabilityConfig::from_env();

        Ok(config)
    }

    /// Validate all configuration sections
    pub fn validate(&self) -> AppResult<()> {
        self.preprocessing.validate()?;
        self.grid.validate()?;
        self.segmentation.validate()?;
        self.fallback.validate()?;
        self.overlay.validate()?;
        self.observability
            .validate()
            .map_err(AppError::Config)?;
        Ok(())
    }

    /// Get a summary of the current configuration for logging
    pub fn summary(&self) -> String {
        format!(
            "Configuration: grid_size_mm={}, perspective_correction={}, acceptance_thresholds={:?}, segmentation_threshold={}, jpeg_quality={}, font={}",
            self.grid.grid_size_mm,
            self.grid.perspective.enabled,
            self.grid.acceptance_thresholds,
            self.segmentation.acceptance_threshold,
            self.overlay.jpeg_quality,
            self.overlay.font_path.as_deref().unwrap_or("auto")
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_validation() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_grid_config_validation() {
        let mut config = GridDetectionConfig::default();
        assert!(config.validate().is_ok());

        // Invalid: non-positive grid size
        config.grid_size_mm = 0.0;
        assert!(config.validate().is_err());
        config.grid_size_mm = 10.0;

        // Invalid: ascending tiers
        config.acceptance_thresholds = vec![0.2, 0.7];
        assert!(config.validate().is_err());
        config.acceptance_thresholds = vec![0.7, 0.5, 0.3, 0.2];

        // Invalid: tolerance too wide
        config.relaxed_angle_tolerance_degrees = 50.0;
        assert!(config.validate().is_err());
        config.relaxed_angle_tolerance_degrees = 23.0;

        // Invalid: empty sweep
        config.hough_suppression_radii.clear();
        assert!(config.validate().is_err());
        config.hough_suppression_radii = vec![4, 8];

        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_perspective_config_validation() {
        let mut config = PerspectiveConfig::default();
        assert!(config.validate().is_ok());

        config.quality_threshold = 120.0;
        assert!(config.validate().is_err());
        config.quality_threshold = 70.0;

        config.harris_block_size = 2;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_segmentation_config_validation() {
        let mut config = SegmentationConfig::default();
        assert!(config.validate().is_ok());

        config.min_area_fraction = 0.9;
        assert!(config.validate().is_err());
        config.min_area_fraction = 0.005;

        config.tissue_hsv_ranges = vec![HsvRange::new([30, 0, 0], [10, 255, 255])];
        assert!(config.validate().is_err());
        config.tissue_hsv_ranges.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_fallback_config_validation() {
        let mut config = FallbackConfig::default();
        assert!(config.validate().is_ok());

        config.optimal_range = (80.0, 20.0);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overlay_config_validation() {
        let mut config = OverlayConfig::default();
        assert!(config.validate().is_ok());

        config.jpeg_quality = 0;
        assert!(config.validate().is_err());
        config.jpeg_quality = 85;

        config.font_path = Some("  ".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_summary_mentions_grid_size() {
        let config = AppConfig::default();
        assert!(config.summary().contains("grid_size_mm=10"));
    }
}
