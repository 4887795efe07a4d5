//! # Biopsy Segmenter
//!
//! Runs every grayscale strategy against every preprocessed variant and the
//! color strategies once against the original raster, then keeps the single
//! most confident contour. The winner only counts as a detection when its
//! confidence exceeds the acceptance threshold.

use std::time::Instant;

use image::{GrayImage, RgbImage};
use tracing::{debug, info};

use super::adaptive::AdaptiveThresholdSegmenter;
use super::color::ColorSegmenter;
use super::edge::EdgeSegmenter;
use super::types::{SegmentCandidate, SegmentationMethod, SegmentationResult, SegmentationStrategy};
use super::watershed::WatershedSegmenter;
use crate::config::{PreprocessingConfig, SegmentationConfig};
use crate::errors::error_logging::log_strategy_error;
use crate::errors::{AppError, AppResult};
use crate::observability::{record_segmentation_metrics, strategy_span};
use crate::preprocessing::{ImagePreprocessor, PreprocessedSet};

/// Label used for candidates that came from the color raster
const COLOR_INPUT: &str = "hsv";

pub struct BiopsySegmenter {
    config: SegmentationConfig,
    preprocessor: ImagePreprocessor,
    strategies: Vec<Box<dyn SegmentationStrategy>>,
}

impl Default for BiopsySegmenter {
    fn default() -> Self {
        Self::new(SegmentationConfig::default(), PreprocessingConfig::default())
    }
}

impl BiopsySegmenter {
    /// Segmenter with watershed, adaptive threshold, color and edge strategies in that order.
    pub fn new(config: SegmentationConfig, preprocessing: PreprocessingConfig) -> Self {
        let strategies: Vec<Box<dyn SegmentationStrategy>> = vec![
            Box::new(WatershedSegmenter::from_config(&config)),
            Box::new(AdaptiveThresholdSegmenter::from_config(&config)),
            Box::new(ColorSegmenter::from_config(&config)),
            Box::new(EdgeSegmenter::from_config(&config)),
        ];
        Self::with_strategies(config, preprocessing, strategies)
    }

    pub fn with_strategies(
        config: SegmentationConfig,
        preprocessing: PreprocessingConfig,
        strategies: Vec<Box<dyn SegmentationStrategy>>,
    ) -> Self {
        Self {
            config,
            preprocessor: ImagePreprocessor::new(preprocessing),
            strategies,
        }
    }

    /// Segments the sample. Builds the preprocessed set when none is supplied.
    pub fn segment(
        &self,
        image: &RgbImage,
        preprocessed: Option<&PreprocessedSet>,
    ) -> AppResult<SegmentationResult> {
        let start_time = Instant::now();
        if image.width() == 0 || image.height() == 0 {
            return Err(AppError::Validation(
                "Cannot segment an empty image".to_string(),
            ));
        }

        let owned;
        let set = match preprocessed {
            Some(set) => set,
            None => {
                owned = self.preprocessor.preprocess_image(image)?;
                &owned
            }
        };

        let mut best: Option<(SegmentationMethod, String, SegmentCandidate)> = None;
        let mut evaluated = 0usize;

        for strategy in &self.strategies {
            let inputs: Vec<(&str, Option<&GrayImage>)> = if strategy.uses_color() {
                vec![(COLOR_INPUT, set.grid_source())]
            } else {
                set.iter().map(|(variant, gray)| (variant.as_str(), Some(gray))).collect()
            };

            for (input, gray) in inputs {
                let Some(gray) = gray else {
                    continue;
                };
                let Some(candidate) = self.run_strategy(strategy.as_ref(), input, gray, image) else {
                    continue;
                };
                evaluated += 1;
                if best
                    .as_ref()
                    .map_or(true, |(_, _, current)| candidate.confidence > current.confidence)
                {
                    best = Some((strategy.method(), input.to_string(), candidate));
                }
            }
        }

        let processing_time_ms = start_time.elapsed().as_millis() as u32;
        let result = match best {
            Some((method, input, candidate))
                if candidate.confidence > self.config.acceptance_threshold =>
            {
                SegmentationResult {
                    detected: true,
                    area_px: candidate.area_px,
                    confidence: candidate.confidence,
                    contour: Some(candidate.contour),
                    method,
                    preprocessing_used: vec![input],
                    candidates_evaluated: evaluated,
                    processing_time_ms,
                }
            }
            Some((method, input, candidate)) => {
                debug!(
                    target: "vision_pipeline",
                    "Best segmentation {} on {} below acceptance: {:.3}",
                    method,
                    input,
                    candidate.confidence
                );
                SegmentationResult {
                    candidates_evaluated: evaluated,
                    processing_time_ms,
                    ..SegmentationResult::not_detected()
                }
            }
            None => SegmentationResult {
                processing_time_ms,
                ..SegmentationResult::not_detected()
            },
        };

        record_segmentation_metrics(result.method.as_str(), result.detected, result.confidence);
        info!(
            detected = result.detected,
            method = %result.method,
            confidence = result.confidence,
            candidates = evaluated,
            duration_ms = processing_time_ms,
            "Segmentation finished"
        );

        Ok(result)
    }

    fn run_strategy(
        &self,
        strategy: &dyn SegmentationStrategy,
        input: &str,
        gray: &GrayImage,
        original: &RgbImage,
    ) -> Option<SegmentCandidate> {
        let method = strategy.method();
        let span = strategy_span(method.as_str(), Some(input));
        let _guard = span.enter();
        let start_time = Instant::now();

        match strategy.segment(gray, original) {
            Ok(Some(mut candidate)) if !candidate.contour.is_empty() => {
                candidate.confidence = candidate.confidence.clamp(0.0, 1.0);
                Some(candidate)
            }
            Ok(_) => None,
            Err(e) => {
                log_strategy_error(&e, method.as_str(), Some(input), Some(start_time.elapsed()));
                None
            }
        }
    }
}

/// Segments with default settings.
pub fn segment_biopsy(image: &RgbImage) -> AppResult<SegmentationResult> {
    BiopsySegmenter::default().segment(image, None)
}

impl std::fmt::Debug for BiopsySegmenter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let methods: Vec<SegmentationMethod> = self.strategies.iter().map(|s| s.method()).collect();
        f.debug_struct("BiopsySegmenter")
            .field("acceptance_threshold", &self.config.acceptance_threshold)
            .field("strategies", &methods)
            .finish()
    }
}
