//! Edge segmentation: Canny outlines bridged by dilation and filled.

use image::{GrayImage, RgbImage};
use imageproc::edges::canny;
use tracing;

use super::contours::{area_band, contour_mask, external_contours, largest_contour};
use super::types::{SegmentCandidate, SegmentationMethod, SegmentationStrategy};
use crate::config::SegmentationConfig;
use crate::errors::AppResult;
use crate::geometry::fill_contour;
use crate::preprocessing::{dilate, StructuringElement};

#[derive(Debug, Clone)]
pub struct EdgeSegmenter {
    canny_low: f32,
    canny_high: f32,
    min_area_fraction: f64,
    max_area_fraction: f64,
    confidence_cap: f64,
}

impl EdgeSegmenter {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            canny_low: config.canny_low,
            canny_high: config.canny_high,
            min_area_fraction: config.edge_min_area_fraction,
            max_area_fraction: config.edge_max_area_fraction,
            confidence_cap: config.edge_confidence_cap,
        }
    }
}

impl SegmentationStrategy for EdgeSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::EdgeBased
    }

    fn segment(&self, gray: &GrayImage, _original: &RgbImage) -> AppResult<Option<SegmentCandidate>> {
        let (width, height) = gray.dimensions();
        let edges = canny(gray, self.canny_low, self.canny_high);
        let mut filled = dilate(&edges, StructuringElement::square(3), 2);
        for contour in external_contours(&filled) {
            fill_contour(&mut filled, &contour);
        }

        let band = area_band(gray, self.min_area_fraction, self.max_area_fraction);
        let Some((contour, area_px)) = largest_contour(external_contours(&filled), Some(band)) else {
            return Ok(None);
        };

        let region = contour_mask(width, height, &contour);
        let edge_pixels = edges
            .pixels()
            .zip(region.pixels())
            .filter(|(edge, inside)| edge[0] > 0 && inside[0] > 0)
            .count();
        // Summed 8-bit edge intensity per unit area
        let edge_strength = if area_px > 0.0 {
            edge_pixels as f64 * 255.0 / area_px
        } else {
            0.0
        };
        let confidence = (edge_strength / 50.0).min(self.confidence_cap);

        tracing::debug!(
            target: "vision_pipeline",
            "Edge segmentation: area={:.0}px, edge pixels={}, confidence={:.3}",
            area_px,
            edge_pixels,
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
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn test_edge_fills_outlined_square() {
        let segmenter = EdgeSegmenter::from_config(&SegmentationConfig::default());
        let mut gray = GrayImage::from_pixel(200, 200, Luma([240]));
        draw_filled_rect_mut(&mut gray, Rect::at(50, 50).of_size(80, 80), Luma([40]));

        let candidate = segmenter
            .segment(&gray, &RgbImage::new(200, 200))
            .unwrap()
            .unwrap();
        assert!(candidate.area_px > 80.0 * 80.0 * 0.9, "{}", candidate.area_px);
        assert!(candidate.confidence > 0.0);
        assert!(candidate.confidence <= 0.5);
    }

    #[test]
    fn test_edge_rejects_flat_image() {
        let segmenter = EdgeSegmenter::from_config(&SegmentationConfig::default());
        let gray = GrayImage::from_pixel(120, 120, Luma([90]));
        assert!(segmenter
            .segment(&gray, &RgbImage::new(120, 120))
            .unwrap()
            .is_none());
    }
}
