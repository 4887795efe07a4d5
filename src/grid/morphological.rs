//! Morphological grid detector: isolates long thin dark structures with line-shaped
//! openings and takes component centroids as line positions.

use image::{GrayImage, Luma};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing;

use super::hough::score_grid_lines;
use super::lines::{merge_positions, ConfidenceWeights};
use super::types::{GridCandidate, GridLines, GridMethod, GridStrategy};
use crate::config::GridDetectionConfig;
use crate::errors::AppResult;
use crate::preprocessing::{
    adaptive_gaussian_threshold, apply_morphology, MorphologicalOperation, StructuringElement,
    ThresholdPolarity,
};

#[derive(Debug, Clone)]
pub struct MorphologicalGridDetector {
    kernel_length: u32,
    min_component_area: u32,
    merge_distance: f64,
}

impl MorphologicalGridDetector {
    pub fn from_config(config: &GridDetectionConfig) -> Self {
        Self {
            kernel_length: config.morph_kernel_length,
            min_component_area: config.morph_min_component_area,
            merge_distance: config.line_merge_distance,
        }
    }
}

impl GridStrategy for MorphologicalGridDetector {
    fn method(&self) -> GridMethod {
        GridMethod::Morphological
    }

    fn detect(&self, gray: &GrayImage) -> AppResult<GridCandidate> {
        let binary = adaptive_gaussian_threshold(gray, 11, 2.0, ThresholdPolarity::BinaryInverted)?;

        let horizontal_mask = apply_morphology(
            &binary,
            MorphologicalOperation::Opening,
            StructuringElement::rect(self.kernel_length, 1),
            1,
        );
        let vertical_mask = apply_morphology(
            &binary,
            MorphologicalOperation::Opening,
            StructuringElement::rect(1, self.kernel_length),
            1,
        );

        let horizontal = component_centroids(&horizontal_mask, self.min_component_area)
            .into_iter()
            .map(|(_, y)| y)
            .collect();
        let vertical = component_centroids(&vertical_mask, self.min_component_area)
            .into_iter()
            .map(|(x, _)| x)
            .collect();

        let lines = GridLines {
            horizontal: merge_positions(horizontal, self.merge_distance),
            vertical: merge_positions(vertical, self.merge_distance),
        };
        let candidate = score_grid_lines(
            GridMethod::Morphological,
            lines,
            ConfidenceWeights::MORPHOLOGICAL,
        );

        tracing::debug!(
            target: "vision_pipeline",
            "Morphological detector: {} horizontal, {} vertical, spacing={:.2}px, confidence={:.3}",
            candidate.lines.horizontal.len(),
            candidate.lines.vertical.len(),
            candidate.spacing_px,
            candidate.confidence
        );

        Ok(candidate)
    }
}

/// Centroids `(x, y)` of 8-connected foreground components with at least `min_area` pixels.
fn component_centroids(mask: &GrayImage, min_area: u32) -> Vec<(f64, f64)> {
    let labels = connected_components(mask, Connectivity::Eight, Luma([0u8]));

    let mut sums: Vec<(u64, f64, f64)> = Vec::new();
    for (x, y, label) in labels.enumerate_pixels() {
        let label = label[0] as usize;
        if label == 0 {
            continue;
        }
        if sums.len() < label {
            sums.resize(label, (0, 0.0, 0.0));
        }
        let entry = &mut sums[label - 1];
        entry.0 += 1;
        entry.1 += x as f64;
        entry.2 += y as f64;
    }

    sums.into_iter()
        .filter(|(count, _, _)| *count > 0 && *count >= min_area as u64)
        .map(|(count, sx, sy)| (sx / count as f64, sy / count as f64))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_gray_grid(width: u32, height: u32, spacing: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if (x + spacing / 2) % spacing < 2 || (y + spacing / 2) % spacing < 2 {
                Luma([100])
            } else {
                Luma([240])
            }
        })
    }

    #[test]
    fn test_morphological_detects_grid() {
        let detector = MorphologicalGridDetector::from_config(&GridDetectionConfig::default());
        let candidate = detector.detect(&create_gray_grid(400, 320, 40)).unwrap();
        assert!(
            (candidate.spacing_px - 40.0).abs() < 2.0,
            "spacing {}",
            candidate.spacing_px
        );
        assert!(candidate.confidence > 0.5, "confidence {}", candidate.confidence);
        assert!(candidate.confidence <= 1.0);
    }

    #[test]
    fn test_morphological_blank_image() {
        let detector = MorphologicalGridDetector::from_config(&GridDetectionConfig::default());
        let candidate = detector
            .detect(&GrayImage::from_pixel(120, 120, Luma([200])))
            .unwrap();
        assert_eq!(candidate.confidence, 0.0);
    }

    #[test]
    fn test_component_centroids_filters_small_components() {
        let mut mask = GrayImage::new(50, 50);
        for x in 0..40 {
            for y in 10..13 {
                mask.put_pixel(x, y, Luma([255]));
            }
        }
        mask.put_pixel(45, 45, Luma([255]));
        let centroids = component_centroids(&mask, 100);
        assert_eq!(centroids.len(), 1);
        assert!((centroids[0].0 - 19.5).abs() < 1e-9);
        assert!((centroids[0].1 - 11.0).abs() < 1e-9);
    }
}
