//! Color segmentation: HSV tissue ranges on the original raster.

use image::{GrayImage, RgbImage};
use tracing;

use super::contours::{external_contours, largest_contour};
use super::types::{SegmentCandidate, SegmentationMethod, SegmentationStrategy};
use crate::config::SegmentationConfig;
use crate::errors::AppResult;
use crate::preprocessing::{
    apply_morphology, hsv_range_mask, HsvRange, MorphologicalOperation, StructuringElement,
};

#[derive(Debug, Clone)]
pub struct ColorSegmenter {
    ranges: Vec<HsvRange>,
    min_area_fraction: f64,
    max_area_fraction: f64,
    confidence_cap: f64,
}

impl ColorSegmenter {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            ranges: config.tissue_hsv_ranges.clone(),
            min_area_fraction: config.min_area_fraction,
            max_area_fraction: config.max_area_fraction,
            confidence_cap: config.color_confidence_cap,
        }
    }
}

impl SegmentationStrategy for ColorSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::ColorBased
    }

    fn uses_color(&self) -> bool {
        true
    }

    fn segment(&self, _gray: &GrayImage, original: &RgbImage) -> AppResult<Option<SegmentCandidate>> {
        let mask = hsv_range_mask(original, &self.ranges);
        let kernel = StructuringElement::square(5);
        let closed = apply_morphology(&mask, MorphologicalOperation::Closing, kernel, 1);
        let cleaned = apply_morphology(&closed, MorphologicalOperation::Opening, kernel, 1);

        let Some((contour, area_px)) = largest_contour(external_contours(&cleaned), None) else {
            return Ok(None);
        };

        let total = original.width() as f64 * original.height() as f64;
        if area_px <= total * self.min_area_fraction || area_px >= total * self.max_area_fraction {
            tracing::debug!(
                target: "vision_pipeline",
                "Color region of {:.0}px outside the plausible band",
                area_px
            );
            return Ok(None);
        }

        let confidence = (area_px / (total * 0.2)).min(self.confidence_cap);
        tracing::debug!(
            target: "vision_pipeline",
            "Color segmentation: area={:.0}px, confidence={:.3}",
            area_px,
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
    use image::Rgb;
    use imageproc::drawing::draw_filled_ellipse_mut;

    #[test]
    fn test_color_finds_pink_region() {
        let segmenter = ColorSegmenter::from_config(&SegmentationConfig::default());
        let mut image = RgbImage::from_pixel(300, 200, Rgb([250, 250, 250]));
        draw_filled_ellipse_mut(&mut image, (150, 100), 50, 30, Rgb([200, 110, 130]));

        let candidate = segmenter
            .segment(&GrayImage::new(300, 200), &image)
            .unwrap()
            .unwrap();
        let expected = std::f64::consts::PI * 50.0 * 30.0;
        assert!((candidate.area_px - expected).abs() / expected < 0.1);
        // Area over a fifth of the 60000 px image
        assert!((candidate.confidence - candidate.area_px / 12000.0).abs() < 1e-9);
    }

    #[test]
    fn test_color_ignores_gray_scene() {
        let segmenter = ColorSegmenter::from_config(&SegmentationConfig::default());
        let image = RgbImage::from_pixel(100, 100, Rgb([128, 128, 128]));
        assert!(segmenter
            .segment(&GrayImage::new(100, 100), &image)
            .unwrap()
            .is_none());
    }
}
