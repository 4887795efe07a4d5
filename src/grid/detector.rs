//! # Grid Detector
//!
//! Runs the strategy list against the perspective-checked, enhanced grayscale
//! image, keeps the most confident candidate and accepts it at the strictest
//! confidence tier it clears. When nothing clears the lowest tier a relaxed
//! Hough pass gets one more attempt at a very low floor.

use std::time::Instant;

use image::{GrayImage, RgbImage};
use tracing::{debug, info, warn};

use super::frequency::FrequencyGridDetector;
use super::hough::HoughGridDetector;
use super::morphological::MorphologicalGridDetector;
use super::relaxed::RelaxedHoughDetector;
use super::types::{GridCandidate, GridEstimate, GridMethod, GridStrategy};
use crate::config::{GridDetectionConfig, PreprocessingConfig};
use crate::errors::error_logging::log_strategy_error;
use crate::errors::{AppError, AppResult};
use crate::observability::{record_grid_detection_metrics, record_perspective_metrics, strategy_span};
use crate::perspective::PerspectiveCorrector;
use crate::preprocessing::{to_grayscale, ImagePreprocessor, PreprocessedSet};

/// Pixels-per-mm recovery from a printed reference grid.
pub struct GridDetector {
    config: GridDetectionConfig,
    preprocessor: ImagePreprocessor,
    perspective: PerspectiveCorrector,
    strategies: Vec<Box<dyn GridStrategy>>,
    relaxed: RelaxedHoughDetector,
}

impl Default for GridDetector {
    fn default() -> Self {
        Self::new(GridDetectionConfig::default(), PreprocessingConfig::default())
    }
}

impl GridDetector {
    /// Detector with the standard Hough, morphological and frequency strategies.
    pub fn new(config: GridDetectionConfig, preprocessing: PreprocessingConfig) -> Self {
        let strategies: Vec<Box<dyn GridStrategy>> = vec![
            Box::new(HoughGridDetector::from_config(&config)),
            Box::new(MorphologicalGridDetector::from_config(&config)),
            Box::new(FrequencyGridDetector::from_config(&config)),
        ];
        Self::with_strategies(config, preprocessing, strategies)
    }

    pub fn with_strategies(
        config: GridDetectionConfig,
        preprocessing: PreprocessingConfig,
        strategies: Vec<Box<dyn GridStrategy>>,
    ) -> Self {
        Self {
            perspective: PerspectiveCorrector::new(config.perspective.clone()),
            relaxed: RelaxedHoughDetector::from_config(&config),
            preprocessor: ImagePreprocessor::new(preprocessing),
            strategies,
            config,
        }
    }

    pub fn config(&self) -> &GridDetectionConfig {
        &self.config
    }

    /// Full detection: perspective check, strategies, tiered acceptance, relaxed pass.
    ///
    /// `preprocessed` is reused as the grayscale source when perspective
    /// correction leaves the image untouched.
    pub fn detect(
        &self,
        image: &RgbImage,
        preprocessed: Option<&PreprocessedSet>,
    ) -> AppResult<GridEstimate> {
        let start_time = Instant::now();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(AppError::Validation(
                "Cannot detect a grid in an empty image".to_string(),
            ));
        }

        let (corrected, perspective) = self.perspective.auto_correct_perspective(image);
        record_perspective_metrics(
            perspective.corrected,
            perspective
                .corrected_quality
                .unwrap_or(perspective.original_quality),
        );

        let reusable = preprocessed
            .filter(|_| !perspective.corrected)
            .and_then(|set| set.grid_source());
        let gray = match reusable {
            Some(gray) => gray.clone(),
            None => self.preprocessor.enhance(&to_grayscale(&corrected))?,
        };

        let mut estimate = self.detect_on_gray(&gray);
        estimate.perspective = Some(perspective);

        record_grid_detection_metrics(estimate.method.as_str(), estimate.detected, estimate.confidence);
        info!(
            detected = estimate.detected,
            method = %estimate.method,
            pixels_per_mm = estimate.pixels_per_mm,
            confidence = estimate.confidence,
            duration_ms = start_time.elapsed().as_millis() as u64,
            "Grid detection finished"
        );

        Ok(estimate)
    }

    /// Strategy selection and acceptance on an already enhanced grayscale image.
    pub fn detect_on_gray(&self, gray: &GrayImage) -> GridEstimate {
        let best = self.best_candidate(gray);

        if let Some(best) = best {
            if let Some(threshold) = self.acceptance_tier(&best) {
                debug!(
                    target: "vision_pipeline",
                    "Accepted {} at tier {:.1}: spacing={:.2}px, confidence={:.3}",
                    best.method,
                    threshold,
                    best.spacing_px,
                    best.confidence
                );
                return GridEstimate::from_candidate(best, self.config.grid_size_mm, threshold);
            }
            debug!(
                target: "vision_pipeline",
                "Best candidate {} (confidence {:.3}) cleared no tier",
                best.method,
                best.confidence
            );
        }

        let relaxed = self.run_strategy(&self.relaxed, gray);
        match relaxed {
            Some(candidate)
                if candidate.is_usable()
                    && candidate.confidence >= self.config.relaxed_confidence_floor =>
            {
                warn!(
                    confidence = candidate.confidence,
                    spacing_px = candidate.spacing_px,
                    "Grid accepted by the relaxed Hough pass"
                );
                let floor = self.config.relaxed_confidence_floor;
                GridEstimate::from_candidate(candidate, self.config.grid_size_mm, floor)
            }
            _ => {
                debug!(target: "vision_pipeline", "No grid found by any strategy");
                GridEstimate::not_detected()
            }
        }
    }

    /// Highest-confidence candidate across the strategy list. Ties keep the earlier strategy.
    fn best_candidate(&self, gray: &GrayImage) -> Option<GridCandidate> {
        let mut best: Option<GridCandidate> = None;
        for strategy in &self.strategies {
            let Some(candidate) = self.run_strategy(strategy.as_ref(), gray) else {
                continue;
            };
            if best
                .as_ref()
                .map_or(true, |current| candidate.confidence > current.confidence)
            {
                best = Some(candidate);
            }
        }
        best
    }

    fn run_strategy(&self, strategy: &dyn GridStrategy, gray: &GrayImage) -> Option<GridCandidate> {
        let method = strategy.method();
        let span = strategy_span(method.as_str(), None);
        let _guard = span.enter();
        let start_time = Instant::now();

        match strategy.detect(gray) {
            Ok(mut candidate) => {
                candidate.confidence = candidate.confidence.clamp(0.0, 1.0);
                Some(candidate)
            }
            Err(e) => {
                log_strategy_error(&e, method.as_str(), None, Some(start_time.elapsed()));
                None
            }
        }
    }

    /// Strictest configured tier the candidate clears.
    fn acceptance_tier(&self, candidate: &GridCandidate) -> Option<f64> {
        if !candidate.is_usable() {
            return None;
        }
        let mut tiers = self.config.acceptance_thresholds.clone();
        tiers.sort_by(|a, b| b.total_cmp(a));
        tiers.into_iter().find(|&t| candidate.confidence >= t)
    }
}

/// Detects the grid with default settings and the given physical spacing.
pub fn detect_grid_advanced(image: &RgbImage, grid_size_mm: f64) -> AppResult<GridEstimate> {
    if !(grid_size_mm > 0.0 && grid_size_mm.is_finite()) {
        return Err(AppError::Validation(format!(
            "Grid size must be a positive number of millimeters, got {}",
            grid_size_mm
        )));
    }
    let config = GridDetectionConfig {
        grid_size_mm,
        ..GridDetectionConfig::default()
    };
    GridDetector::new(config, PreprocessingConfig::default()).detect(image, None)
}

impl std::fmt::Debug for GridDetector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<GridMethod> = self.strategies.iter().map(|s| s.method()).collect();
        f.debug_struct("GridDetector")
            .field("grid_size_mm", &self.config.grid_size_mm)
            .field("strategies", &methods)
            .finish()
    }
}
