//! Relaxed Hough pass used after every strict detector missed the lowest tier.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::filter::gaussian_blur_f32;
use imageproc::hough::{detect_lines, LineDetectionOptions};
use tracing;

use super::hough::{lines_to_grid, score_grid_lines};
use super::lines::ConfidenceWeights;
use super::types::{GridCandidate, GridMethod, GridStrategy};
use crate::config::GridDetectionConfig;
use crate::errors::AppResult;

/// Heavier blur, several Canny pairs and vote thresholds, wider angle band.
#[derive(Debug, Clone)]
pub struct RelaxedHoughDetector {
    blur_sigma: f32,
    canny_pairs: Vec<(f32, f32)>,
    vote_fractions: Vec<f64>,
    angle_tolerance: f64,
    max_lines: usize,
    merge_distance: f64,
}

impl RelaxedHoughDetector {
    pub fn from_config(config: &GridDetectionConfig) -> Self {
        Self {
            blur_sigma: config.relaxed_blur_sigma,
            canny_pairs: config.relaxed_canny_pairs.clone(),
            vote_fractions: config.relaxed_vote_fractions.clone(),
            angle_tolerance: config.relaxed_angle_tolerance_degrees,
            max_lines: config.max_lines,
            merge_distance: config.line_merge_distance,
        }
    }
}

impl GridStrategy for RelaxedHoughDetector {
    fn method(&self) -> GridMethod {
        GridMethod::HoughRelaxed
    }

    fn detect(&self, gray: &GrayImage) -> AppResult<GridCandidate> {
        let (width, height) = gray.dimensions();
        let blurred = gaussian_blur_f32(gray, self.blur_sigma);
        let min_dim = width.min(height) as f64;

        let mut best = GridCandidate::empty(GridMethod::HoughRelaxed);
        for &(low, high) in &self.canny_pairs {
            let edges = canny(&blurred, low, high);
            for &fraction in &self.vote_fractions {
                let options = LineDetectionOptions {
                    vote_threshold: (fraction * min_dim).max(5.0) as u32,
                    suppression_radius: 8,
                };
                let mut lines = detect_lines(&edges, options);
                lines.truncate(self.max_lines);

                let grid = lines_to_grid(&lines, self.angle_tolerance, self.merge_distance, width, height);
                let candidate =
                    score_grid_lines(GridMethod::HoughRelaxed, grid, ConfidenceWeights::HOUGH);
                if candidate.confidence > best.confidence {
                    tracing::trace!(
                        target: "vision_pipeline",
                        "Relaxed pass improved: canny=({},{}), votes={:.2}, confidence={:.3}",
                        low,
                        high,
                        fraction,
                        candidate.confidence
                    );
                    best = candidate;
                }
            }
        }

        tracing::debug!(
            target: "vision_pipeline",
            "Relaxed Hough pass: spacing={:.2}px, confidence={:.3}",
            best.spacing_px,
            best.confidence
        );

        Ok(best)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn test_relaxed_detects_blurred_grid() {
        let detector = RelaxedHoughDetector::from_config(&GridDetectionConfig::default());
        let grid = GrayImage::from_fn(300, 240, |x, y| {
            if x % 30 < 3 || y % 30 < 3 {
                Luma([100])
            } else {
                Luma([220])
            }
        });
        let candidate = detector.detect(&grid).unwrap();
        assert!(candidate.is_usable(), "{:?}", candidate);
        assert!((candidate.spacing_px - 30.0).abs() < 3.0, "{}", candidate.spacing_px);
    }

    #[test]
    fn test_relaxed_blank_image() {
        let detector = RelaxedHoughDetector::from_config(&GridDetectionConfig::default());
        let candidate = detector
            .detect(&GrayImage::from_pixel(100, 100, Luma([255])))
            .unwrap();
        assert_eq!(candidate.confidence, 0.0);
        assert_eq!(candidate.method, GridMethod::HoughRelaxed);
    }
}
