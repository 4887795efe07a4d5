//! Adaptive-threshold segmentation: local darkening marks the sample outline.

use image::{GrayImage, RgbImage};
use tracing;

use super::contours::{area_band, external_contours, largest_contour};
use super::types::{SegmentCandidate, SegmentationMethod, SegmentationStrategy};
use crate::config::SegmentationConfig;
use crate::errors::AppResult;
use crate::geometry::arc_length;
use crate::preprocessing::{
    adaptive_gaussian_threshold, apply_morphology, MorphologicalOperation, StructuringElement,
    ThresholdPolarity,
};

#[derive(Debug, Clone)]
pub struct AdaptiveThresholdSegmenter {
    block_size: u32,
    c: f32,
    min_area_fraction: f64,
    max_area_fraction: f64,
    confidence_cap: f64,
}

impl AdaptiveThresholdSegmenter {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            block_size: config.adaptive_block_size,
            c: config.adaptive_c,
            min_area_fraction: config.min_area_fraction,
            max_area_fraction: config.max_area_fraction,
            confidence_cap: config.adaptive_confidence_cap,
        }
    }
}

impl SegmentationStrategy for AdaptiveThresholdSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::AdaptiveThreshold
    }

    fn segment(&self, gray: &GrayImage, _original: &RgbImage) -> AppResult<Option<SegmentCandidate>> {
        let binary = adaptive_gaussian_threshold(
            gray,
            self.block_size,
            self.c,
            ThresholdPolarity::BinaryInverted,
        )?;
        let kernel = StructuringElement::square(3);
        let closed = apply_morphology(&binary, MorphologicalOperation::Closing, kernel, 1);
        let cleaned = apply_morphology(&closed, MorphologicalOperation::Opening, kernel, 1);

        let band = area_band(gray, self.min_area_fraction, self.max_area_fraction);
        let Some((contour, area_px)) = largest_contour(external_contours(&cleaned), Some(band)) else {
            return Ok(None);
        };

        // Isoperimetric quotient, 1 for a disc
        let perimeter = arc_length(&contour, true);
        let compactness = if perimeter > 0.0 {
            4.0 * std::f64::consts::PI * area_px / (perimeter * perimeter)
        } else {
            0.0
        };
        let confidence = (compactness * 2.0).clamp(0.0, self.confidence_cap);

        tracing::debug!(
            target: "vision_pipeline",
            "Adaptive threshold: area={:.0}px, perimeter={:.1}px, compactness={:.3}, confidence={:.3}",
            area_px,
            perimeter,
            compactness,
            confidence
        );

        Ok(Some(SegmentCandidate {
            contour,
            confidence,
            area_px,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;
    use imageproc::drawing::draw_filled_ellipse_mut;

    #[test]
    fn test_adaptive_finds_disc_outline() {
        let segmenter = AdaptiveThresholdSegmenter::from_config(&SegmentationConfig::default());
        let mut gray = GrayImage::from_pixel(200, 200, Luma([235]));
        draw_filled_ellipse_mut(&mut gray, (100, 100), 40, 40, Luma([120]));

        let candidate = segmenter
            .segment(&gray, &RgbImage::new(200, 200))
            .unwrap()
            .unwrap();
        assert!(candidate.confidence > 0.5, "{}", candidate.confidence);
        assert!(candidate.confidence <= 0.7);
        let expected = std::f64::consts::PI * 40.0 * 40.0;
        assert!((candidate.area_px - expected).abs() / expected < 0.15, "{}", candidate.area_px);
    }

    #[test]
    fn test_adaptive_rejects_flat_image() {
        let segmenter = AdaptiveThresholdSegmenter::from_config(&SegmentationConfig::default());
        let gray = GrayImage::from_pixel(100, 100, Luma([180]));
        assert!(segmenter
            .segment(&gray, &RgbImage::new(100, 100))
            .unwrap()
            .is_none());
    }
}
