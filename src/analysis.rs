//! # Analysis Orchestrator
//!
//! Sequences preprocessing, calibration, segmentation, measurement and overlay
//! rendering for one image. Stage failures are recorded in the result's
//! `errors` list; only an unusable input image is returned as an error.

use std::time::Instant;

use image::RgbImage;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::calibration::CalibrationFallback;
use crate::config::AppConfig;
use crate::errors::error_logging::{log_stage_error, log_validation_error};
use crate::errors::{AppError, AppResult};
use crate::grid::{GridDetector, GridEstimate, GridMethod};
use crate::measurement::{calculate_measurements, Measurements, MEASUREMENT_NAMES};
use crate::observability::{record_analysis_metrics, record_error_metrics, record_stage_metrics, stage_span};
use crate::overlay::OverlayRenderer;
use crate::preprocessing::{ImagePreprocessor, PreprocessedSet, PreprocessingVariant};
use crate::report::{
    AnalysisResult, GridOnlyResult, GridSummary, ImageInfo, SegmentationOnlyResult,
    SegmentationSummary,
};
use crate::segmentation::{BiopsySegmenter, SegmentationMethod, SegmentationResult};
use crate::synthetic::{create_synthetic_test_image, SyntheticImageOptions};

/// Smallest accepted width and height in pixels
pub const MIN_IMAGE_DIMENSION: u32 = 16;

/// Share of the grid confidence in the overall score when the scale is a fallback estimate
const FALLBACK_GRID_WEIGHT: f64 = 0.7;

pub struct AnalysisOrchestrator {
    config: AppConfig,
    preprocessor: ImagePreprocessor,
    grid_detector: GridDetector,
    fallback: CalibrationFallback,
    segmenter: BiopsySegmenter,
    overlay: OverlayRenderer,
}

impl Default for AnalysisOrchestrator {
    fn default() -> Self {
        Self::new(AppConfig::default())
    }
}

impl AnalysisOrchestrator {
    pub fn new(config: AppConfig) -> Self {
        Self {
            preprocessor: ImagePreprocessor::new(config.preprocessing.clone()),
            grid_detector: GridDetector::new(config.grid.clone(), config.preprocessing.clone()),
            fallback: CalibrationFallback::new(config.fallback.clone()),
            segmenter: BiopsySegmenter::new(
                config.segmentation.clone(),
                config.preprocessing.clone(),
            ),
            overlay: OverlayRenderer::new(config.overlay.clone()),
            config,
        }
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn fallback(&self) -> &CalibrationFallback {
        &self.fallback
    }

    /// Complete analysis. `manual_pixels_per_mm` bypasses grid detection.
    pub fn analyze(
        &self,
        image: &RgbImage,
        manual_pixels_per_mm: Option<f64>,
    ) -> AppResult<AnalysisResult> {
        let start_time = Instant::now();
        validate_image(image)?;
        let (width, height) = image.dimensions();
        let mut result = AnalysisResult::new(ImageInfo::rgb(width, height));

        info!(
            width,
            height,
            grid_size_mm = self.config.grid.grid_size_mm,
            manual_calibration = manual_pixels_per_mm.is_some(),
            "Starting biopsy analysis"
        );

        let preprocessed = self.run_stage("preprocessing", || {
            self.preprocessor
                .preprocess_image(image)
                .map_err(AppError::from)
        });
        let preprocessed = match preprocessed {
            Ok(set) => Some(set),
            Err(e) => {
                self.stage_failed(&mut result, &e, "preprocessing", (width, height));
                None
            }
        };

        let grid = self.run_stage("grid_detection", || {
            self.calibrate_scale(image, preprocessed.as_ref(), manual_pixels_per_mm, &mut result)
        });
        result.grid_detection = GridSummary::from(&grid);

        let segmentation = self
            .run_stage("segmentation", || self.segmenter.segment(image, preprocessed.as_ref()))
            .unwrap_or_else(|e| {
                self.stage_failed(&mut result, &e, "segmentation", (width, height));
                SegmentationResult::not_detected()
            });
        result.biopsy_segmentation = SegmentationSummary::from(&segmentation);
        drop(preprocessed);

        let contour = segmentation
            .contour
            .as_deref()
            .filter(|_| segmentation.detected);

        let measurements = match contour {
            Some(contour) => self.run_stage("measurement", || {
                calculate_measurements(contour, grid.pixels_per_mm)
            }),
            None => Ok(None),
        };
        let measured = match measurements {
            Ok(Some(measurements)) => Some(measurements),
            Ok(None) => None,
            Err(e) => {
                self.stage_failed(&mut result, &e, "measurement", (width, height));
                None
            }
        };

        let overlay = match (&measured, contour) {
            (Some(measurements), Some(contour)) => {
                result.measurements = measurements.clone();
                self.run_stage("overlay", || {
                    let rendered = self.overlay.render_analysis(image, contour, measurements, &grid);
                    self.overlay.encode_base64(&rendered.image)
                })
            }
            _ => {
                result.measurements = Measurements::zeroed(grid.pixels_per_mm);
                result.manual_measurement_available = grid.has_scale();
                result.add_warning("No biopsy sample detected - manual measurement available");
                self.run_stage("overlay", || {
                    let rendered = self.overlay.render_calibration_only(image, &grid);
                    self.overlay.encode_base64(&rendered.image)
                })
            }
        };
        match overlay {
            Ok(encoded) => result.overlay_image = Some(encoded),
            Err(e) => self.stage_failed(&mut result, &e, "overlay", (width, height)),
        }

        result.confidence_overall =
            overall_confidence(&grid, measured.is_some().then_some(segmentation.confidence));
        result.success = grid.has_scale();
        result.processing_time_ms = start_time.elapsed().as_millis() as u32;
        result.sanitize();

        record_analysis_metrics(
            result.success,
            start_time.elapsed(),
            u64::from(width) * u64::from(height),
        );
        info!(
            success = result.success,
            grid_method = %grid.method,
            pixels_per_mm = grid.pixels_per_mm,
            segmentation_method = %segmentation.method,
            confidence = result.confidence_overall,
            warnings = result.warnings.len(),
            errors = result.errors.len(),
            duration_ms = result.processing_time_ms,
            "Biopsy analysis finished"
        );

        Ok(result)
    }

    /// Grid detection only, with image info.
    pub fn detect_grid_only(&self, image: &RgbImage) -> AppResult<GridOnlyResult> {
        let start_time = Instant::now();
        validate_image(image)?;
        let (width, height) = image.dimensions();
        let mut errors = Vec::new();

        let grid = self
            .run_stage("grid_detection", || self.grid_detector.detect(image, None))
            .unwrap_or_else(|e| {
                log_stage_error(&e, "grid_detection", "detect_grid_only", Some((width, height)));
                errors.push(format!("Grid detection failed: {}", e));
                GridEstimate::not_detected()
            });

        Ok(GridOnlyResult {
            success: errors.is_empty(),
            image_info: ImageInfo::rgb(width, height),
            grid_detection: GridSummary::from(&grid),
            processing_time_ms: start_time.elapsed().as_millis() as u32,
            errors,
        })
    }

    /// Segmentation only, with a contour overlay when a sample is found.
    pub fn segment_only(&self, image: &RgbImage) -> AppResult<SegmentationOnlyResult> {
        let start_time = Instant::now();
        validate_image(image)?;
        let (width, height) = image.dimensions();
        let mut errors = Vec::new();

        let segmentation = self
            .run_stage("segmentation", || self.segmenter.segment(image, None))
            .unwrap_or_else(|e| {
                log_stage_error(&e, "segmentation", "segment_only", Some((width, height)));
                errors.push(format!("Segmentation failed: {}", e));
                SegmentationResult::not_detected()
            });

        let mut overlay_image = None;
        if let Some(contour) = segmentation.contour.as_deref().filter(|_| segmentation.detected) {
            let rendered = self.overlay.render_contour_only(image, contour);
            match self.overlay.encode_base64(&rendered.image) {
                Ok(encoded) => overlay_image = Some(encoded),
                Err(e) => errors.push(format!("Overlay failed: {}", e)),
            }
        }

        Ok(SegmentationOnlyResult {
            success: errors.is_empty(),
            image_info: ImageInfo::rgb(width, height),
            biopsy_segmentation: SegmentationSummary::from(&segmentation),
            overlay_image,
            processing_time_ms: start_time.elapsed().as_millis() as u32,
            errors,
        })
    }

    /// Manual scale, else detected grid, else fallback estimate. Always has a scale.
    fn calibrate_scale(
        &self,
        image: &RgbImage,
        preprocessed: Option<&PreprocessedSet>,
        manual_pixels_per_mm: Option<f64>,
        result: &mut AnalysisResult,
    ) -> GridEstimate {
        let (width, height) = image.dimensions();
        match manual_pixels_per_mm {
            Some(ppm) if ppm > 0.0 && ppm.is_finite() => {
                info!(pixels_per_mm = ppm, "Using manual calibration");
                return GridEstimate::manual(ppm);
            }
            Some(ppm) => {
                result.add_warning(format!(
                    "Ignoring invalid manual calibration of {} pixels/mm",
                    ppm
                ));
            }
            None => {}
        }

        let perspective = match self.grid_detector.detect(image, preprocessed) {
            Ok(estimate) if estimate.detected => {
                if let Some(warning) = &estimate.warning {
                    result.add_warning(warning.clone());
                }
                return estimate;
            }
            Ok(estimate) => estimate.perspective,
            Err(e) => {
                self.stage_failed(result, &e, "grid_detection", (width, height));
                None
            }
        };

        warn!(width, height, "Grid not detected, falling back to estimated calibration");
        result.add_warning("Grid not detected - measurements use an estimated scale");
        let calibration = self.fallback.calibrate(width, height);
        result.add_warning(calibration.warning.clone());
        GridEstimate {
            perspective,
            ..self.fallback.to_estimate(&calibration)
        }
    }

    fn run_stage<T>(&self, stage: &str, f: impl FnOnce() -> T) -> T {
        let span = stage_span(stage);
        let _guard = self
            .config
            .observability
            .enable_stage_spans
            .then(|| span.enter());
        let start_time = Instant::now();
        let output = f();
        record_stage_metrics(stage, start_time.elapsed());
        output
    }

    fn stage_failed(
        &self,
        result: &mut AnalysisResult,
        error: &AppError,
        stage: &str,
        dimensions: (u32, u32),
    ) {
        log_stage_error(error, stage, "analyze", Some(dimensions));
        record_error_metrics(error_kind(error), stage);
        result.add_error(format!("{} failed: {}", stage, error));
    }
}

impl std::fmt::Debug for AnalysisOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnalysisOrchestrator")
            .field("grid_detector", &self.grid_detector)
            .field("segmenter", &self.segmenter)
            .field("overlay", &self.overlay)
            .finish()
    }
}

fn error_kind(error: &AppError) -> &'static str {
    match error {
        AppError::Config(_) => "config",
        AppError::Validation(_) => "validation",
        AppError::Processing(_) => "processing",
        AppError::Encoding(_) => "encoding",
        AppError::Internal(_) => "internal",
    }
}

/// Mean of grid and segmentation confidence; grid-weighted 70/30 when the
/// scale came from a fallback estimate. No sample counts as 0.
pub fn overall_confidence(grid: &GridEstimate, segmentation_confidence: Option<f64>) -> f64 {
    let grid_confidence = grid.confidence.clamp(0.0, 1.0);
    let segmentation_confidence = segmentation_confidence.unwrap_or(0.0).clamp(0.0, 1.0);
    if grid.method.is_fallback() {
        FALLBACK_GRID_WEIGHT * grid_confidence + (1.0 - FALLBACK_GRID_WEIGHT) * segmentation_confidence
    } else {
        (grid_confidence + segmentation_confidence) / 2.0
    }
}

fn validate_image(image: &RgbImage) -> AppResult<()> {
    let (width, height) = image.dimensions();
    if width < MIN_IMAGE_DIMENSION || height < MIN_IMAGE_DIMENSION {
        let error = AppError::Validation(format!(
            "Image of {}x{} is too small, both sides must be at least {} pixels",
            width, height, MIN_IMAGE_DIMENSION
        ));
        log_validation_error(&error, "validate_image", "raster", Some(width as usize * height as usize * 3));
        return Err(error);
    }
    Ok(())
}

/// Decodes PNG, JPEG or any other format `image` supports into RGB.
pub fn decode_image(bytes: &[u8]) -> AppResult<RgbImage> {
    if bytes.is_empty() {
        return Err(AppError::Validation("Image data is empty".to_string()));
    }
    image::load_from_memory(bytes)
        .map(|decoded| decoded.to_rgb8())
        .map_err(|e| {
            let error = AppError::Validation(format!("Could not decode image: {}", e));
            log_validation_error(&error, "decode_image", "encoded_image", Some(bytes.len()));
            error
        })
}

fn orchestrator_for_grid(grid_size_mm: f64) -> AppResult<AnalysisOrchestrator> {
    let mut config = AppConfig::default();
    config.grid.grid_size_mm = grid_size_mm;
    config.grid.validate().map_err(|e| AppError::Validation(e.to_string()))?;
    Ok(AnalysisOrchestrator::new(config))
}

/// Full analysis with default settings.
pub fn analyze_biopsy_complete(
    image: &RgbImage,
    grid_size_mm: f64,
    pixels_per_mm: Option<f64>,
) -> AppResult<AnalysisResult> {
    orchestrator_for_grid(grid_size_mm)?.analyze(image, pixels_per_mm)
}

pub fn detect_grid_only(image: &RgbImage, grid_size_mm: f64) -> AppResult<GridOnlyResult> {
    orchestrator_for_grid(grid_size_mm)?.detect_grid_only(image)
}

pub fn segment_biopsy_only(image: &RgbImage) -> AppResult<SegmentationOnlyResult> {
    AnalysisOrchestrator::default().segment_only(image)
}

/// Outcome of the synthetic-image pipeline check.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineSelfTest {
    pub passed: bool,
    pub expected_pixels_per_mm: f64,
    pub expected_aspect_ratio: f64,
    pub checks: Vec<String>,
    pub result: AnalysisResult,
}

/// Runs the complete analysis on the synthetic image and checks scale and shape.
pub fn test_vision_pipeline() -> AppResult<PipelineSelfTest> {
    let options = SyntheticImageOptions::default();
    let grid_size_mm = AppConfig::default().grid.grid_size_mm;
    let image = create_synthetic_test_image();
    let result = analyze_biopsy_complete(&image, grid_size_mm, None)?;

    let expected_pixels_per_mm = options.expected_pixels_per_mm(grid_size_mm);
    let expected_aspect_ratio = options.expected_aspect_ratio();
    let scale_error = (result.grid_detection.pixels_per_mm - expected_pixels_per_mm).abs()
        / expected_pixels_per_mm;
    let aspect_error = (result.measurements.aspect_ratio - expected_aspect_ratio).abs()
        / expected_aspect_ratio;

    let checks = vec![
        check("grid detected", result.grid_detection.grid_detected),
        check(
            &format!("scale within 15% ({:.2} px/mm)", result.grid_detection.pixels_per_mm),
            scale_error <= 0.15,
        ),
        check("sample detected", result.biopsy_segmentation.detected),
        check(
            &format!("aspect ratio within 10% ({:.2})", result.measurements.aspect_ratio),
            aspect_error <= 0.10,
        ),
    ];
    let passed = checks.iter().all(|c| c.starts_with("PASS"));

    info!(passed, "Vision pipeline self-test finished");
    Ok(PipelineSelfTest {
        passed,
        expected_pixels_per_mm,
        expected_aspect_ratio,
        checks,
        result,
    })
}

fn check(name: &str, ok: bool) -> String {
    format!("{}: {}", if ok { "PASS" } else { "FAIL" }, name)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodDescription {
    pub name: String,
    pub description: String,
}

/// Catalog of the methods and outputs the pipeline offers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingMethods {
    pub grid_detection: Vec<MethodDescription>,
    pub calibration_fallback: Vec<MethodDescription>,
    pub segmentation: Vec<MethodDescription>,
    pub preprocessing_variants: Vec<String>,
    pub measurements: Vec<String>,
}

pub fn processing_methods() -> ProcessingMethods {
    let describe = |name: &str, description: &str| MethodDescription {
        name: name.to_string(),
        description: description.to_string(),
    };
    ProcessingMethods {
        grid_detection: vec![
            describe(GridMethod::Hough.as_str(), "Canny edges and Hough line sweep"),
            describe(GridMethod::Morphological.as_str(), "Long horizontal and vertical line kernels"),
            describe(GridMethod::Frequency.as_str(), "Dominant period of the intensity projections"),
            describe(GridMethod::HoughRelaxed.as_str(), "Blurred Hough pass with wide angle tolerance"),
            describe(GridMethod::ManualCalibration.as_str(), "Caller supplied pixels per mm"),
        ],
        calibration_fallback: vec![
            describe(GridMethod::FallbackEmergencyEstimation.as_str(), "Typical scene widths"),
            describe(GridMethod::FallbackTypicalScenario.as_str(), "Common camera setups"),
            describe(GridMethod::FallbackImageSize.as_str(), "Image width over a nominal scene"),
            describe(GridMethod::ObjectReference.as_str(), "Reference object of known size"),
        ],
        segmentation: vec![
            describe(SegmentationMethod::Watershed.as_str(), "Marker flooding of the gradient"),
            describe(SegmentationMethod::AdaptiveThreshold.as_str(), "Local Gaussian threshold"),
            describe(SegmentationMethod::ColorBased.as_str(), "HSV tissue color ranges"),
            describe(SegmentationMethod::EdgeBased.as_str(), "Filled Canny outlines"),
        ],
        preprocessing_variants: PreprocessingVariant::ALL
            .iter()
            .map(|v| v.as_str().to_string())
            .collect(),
        measurements: MEASUREMENT_NAMES.iter().map(|n| n.to_string()).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgb};
    use std::io::Cursor;

    #[test]
    fn test_rejects_small_images() {
        let orchestrator = AnalysisOrchestrator::default();
        assert!(matches!(
            orchestrator.analyze(&RgbImage::new(10, 100), None),
            Err(AppError::Validation(_))
        ));
        assert!(orchestrator.analyze(&RgbImage::new(0, 0), None).is_err());
        assert!(orchestrator.detect_grid_only(&RgbImage::new(8, 8)).is_err());
    }

    #[test]
    fn test_blank_image_uses_fallback() {
        let image = RgbImage::from_pixel(320, 240, Rgb([255, 255, 255]));
        let result = AnalysisOrchestrator::default().analyze(&image, None).unwrap();
        assert!(result.success);
        assert!(!result.grid_detection.grid_detected);
        assert!(result.grid_detection.method.starts_with("fallback"));
        assert!(result.grid_detection.pixels_per_mm > 0.0);
        assert!(result.manual_measurement_available);
        assert_eq!(result.measurements.area_mm2, 0.0);
        assert!(result.warnings.iter().any(|w| w.contains("manual measurement")));
        assert!(result.overlay_image.is_some());
    }

    #[test]
    fn test_manual_calibration_bypasses_detection() {
        let image = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
        let result = AnalysisOrchestrator::default().analyze(&image, Some(12.5)).unwrap();
        assert_eq!(result.grid_detection.method, "manual_calibration");
        assert_eq!(result.grid_detection.confidence, 0.9);
        assert_eq!(result.grid_detection.pixels_per_mm, 12.5);
        assert!(result.grid_detection.perspective.is_none());
        assert_eq!(result.measurements.pixels_per_mm, 12.5);
    }

    #[test]
    fn test_invalid_manual_calibration_is_ignored() {
        let image = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
        let result = AnalysisOrchestrator::default().analyze(&image, Some(-3.0)).unwrap();
        assert_ne!(result.grid_detection.method, "manual_calibration");
        assert!(result.warnings.iter().any(|w| w.contains("invalid manual calibration")));
    }

    #[test]
    fn test_overall_confidence_weighting() {
        let manual = GridEstimate::manual(10.0);
        assert!((overall_confidence(&manual, Some(0.7)) - 0.8).abs() < 1e-9);
        assert!((overall_confidence(&manual, None) - 0.45).abs() < 1e-9);

        let fallback = GridEstimate {
            confidence: 0.3,
            method: GridMethod::FallbackTypicalScenario,
            ..GridEstimate::not_detected()
        };
        assert!((overall_confidence(&fallback, Some(0.7)) - 0.42).abs() < 1e-9);
    }

    #[test]
    fn test_decode_image() {
        let image = RgbImage::from_pixel(20, 18, Rgb([1, 2, 3]));
        let mut bytes = Cursor::new(Vec::new());
        image.write_to(&mut bytes, ImageFormat::Png).unwrap();
        let decoded = decode_image(bytes.get_ref()).unwrap();
        assert_eq!(decoded, image);

        assert!(matches!(decode_image(&[]), Err(AppError::Validation(_))));
        assert!(matches!(decode_image(b"not an image"), Err(AppError::Validation(_))));
    }

    #[test]
    fn test_bad_grid_size_is_rejected() {
        let image = RgbImage::from_pixel(64, 64, Rgb([255, 255, 255]));
        assert!(analyze_biopsy_complete(&image, 0.0, None).is_err());
        assert!(detect_grid_only(&image, f64::NAN).is_err());
    }

    #[test]
    fn test_processing_methods_catalog() {
        let methods = processing_methods();
        assert_eq!(methods.segmentation.len(), 4);
        assert_eq!(methods.measurements.len(), MEASUREMENT_NAMES.len());
        assert!(methods.grid_detection.iter().any(|m| m.name == "hough"));
        assert_eq!(methods.preprocessing_variants.len(), 6);
        assert!(serde_json::to_string(&methods).is_ok());
    }
}
