//! Edge + Hough transform grid detector.

use image::GrayImage;
use imageproc::edges::canny;
use imageproc::hough::{detect_lines, LineDetectionOptions, PolarLine};
use tracing;

use super::lines::{
    classify_line, combine_orientations, line_position, merge_positions, spacing_stats,
    ConfidenceWeights, LineOrientation,
};
use super::types::{GridCandidate, GridLines, GridMethod, GridStrategy};
use crate::config::GridDetectionConfig;
use crate::errors::AppResult;
use crate::preprocessing::median_intensity;

/// Canny thresholds derived from the median intensity, as `(low, high)`.
pub fn adaptive_canny_thresholds(gray: &GrayImage) -> (f32, f32) {
    let median = median_intensity(gray) as f32;
    let high = (0.5 * median).clamp(30.0, 120.0);
    (high / 2.0, high)
}

/// Splits lines by orientation and merges nearby positions.
pub fn lines_to_grid(
    lines: &[PolarLine],
    tolerance: f64,
    merge_distance: f64,
    width: u32,
    height: u32,
) -> GridLines {
    let (mut horizontal, mut vertical) = (Vec::new(), Vec::new());
    for line in lines {
        if let Some(orientation) = classify_line(line, tolerance) {
            if let Some(position) = line_position(line, orientation, width, height) {
                match orientation {
                    LineOrientation::Horizontal => horizontal.push(position),
                    LineOrientation::Vertical => vertical.push(position),
                }
            }
        }
    }
    GridLines {
        horizontal: merge_positions(horizontal, merge_distance),
        vertical: merge_positions(vertical, merge_distance),
    }
}

/// Scores merged grid lines with the Hough weighting.
pub fn score_grid_lines(method: GridMethod, lines: GridLines, weights: ConfidenceWeights) -> GridCandidate {
    let horizontal = spacing_stats(&lines.horizontal);
    let vertical = spacing_stats(&lines.vertical);
    let (spacing_px, confidence) = combine_orientations(&horizontal, &vertical, weights);
    GridCandidate {
        method,
        spacing_px,
        confidence,
        lines,
    }
}

/// Canny edges followed by a sweep over Hough vote thresholds and suppression radii.
#[derive(Debug, Clone)]
pub struct HoughGridDetector {
    angle_tolerance: f64,
    vote_fractions: Vec<f64>,
    suppression_radii: Vec<u32>,
    max_lines: usize,
    merge_distance: f64,
}

impl HoughGridDetector {
    pub fn from_config(config: &GridDetectionConfig) -> Self {
        Self {
            angle_tolerance: config.angle_tolerance_degrees,
            vote_fractions: config.hough_vote_fractions.clone(),
            suppression_radii: config.hough_suppression_radii.clone(),
            max_lines: config.max_lines,
            merge_distance: config.line_merge_distance,
        }
    }
}

impl GridStrategy for HoughGridDetector {
    fn method(&self) -> GridMethod {
        GridMethod::Hough
    }

    fn detect(&self, gray: &GrayImage) -> AppResult<GridCandidate> {
        let (width, height) = gray.dimensions();
        let (low, high) = adaptive_canny_thresholds(gray);
        let edges = canny(gray, low, high);
        let min_dim = width.min(height) as f64;

        // Keep the sweep setting that yields the most axis-aligned lines
        let mut best: Option<(usize, Vec<PolarLine>)> = None;
        for &fraction in &self.vote_fractions {
            for &radius in &self.suppression_radii {
                let options = LineDetectionOptions {
                    vote_threshold: (fraction * min_dim).max(10.0) as u32,
                    suppression_radius: radius,
                };
                let lines = detect_lines(&edges, options);
                if lines.len() > self.max_lines {
                    continue;
                }
                let aligned = lines
                    .iter()
                    .filter(|line| classify_line(line, self.angle_tolerance).is_some())
                    .count();
                if best.as_ref().map_or(true, |(count, _)| aligned > *count) {
                    best = Some((aligned, lines));
                }
            }
        }

        let Some((aligned, lines)) = best else {
            return Ok(GridCandidate::empty(GridMethod::Hough));
        };

        let grid = lines_to_grid(&lines, self.angle_tolerance, self.merge_distance, width, height);
        let candidate = score_grid_lines(GridMethod::Hough, grid, ConfidenceWeights::HOUGH);

        tracing::debug!(
            target: "vision_pipeline",
            "Hough detector: canny=({:.0},{:.0}), {} aligned lines, {} horizontal, {} vertical, spacing={:.2}px, confidence={:.3}",
            low,
            high,
            aligned,
            candidate.lines.horizontal.len(),
            candidate.lines.vertical.len(),
            candidate.spacing_px,
            candidate.confidence
        );

        Ok(candidate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn create_gray_grid(width: u32, height: u32, spacing: u32) -> GrayImage {
        GrayImage::from_fn(width, height, |x, y| {
            if x % spacing < 2 || y % spacing < 2 {
                Luma([90])
            } else {
                Luma([245])
            }
        })
    }

    #[test]
    fn test_adaptive_canny_thresholds() {
        let bright = GrayImage::from_pixel(10, 10, Luma([250]));
        assert_eq!(adaptive_canny_thresholds(&bright), (60.0, 120.0));
        let dark = GrayImage::from_pixel(10, 10, Luma([20]));
        assert_eq!(adaptive_canny_thresholds(&dark), (15.0, 30.0));
    }

    #[test]
    fn test_hough_detects_regular_grid() {
        let detector = HoughGridDetector::from_config(&GridDetectionConfig::default());
        let candidate = detector.detect(&create_gray_grid(400, 300, 40)).unwrap();
        assert!(
            (candidate.spacing_px - 40.0).abs() < 2.0,
            "spacing {}",
            candidate.spacing_px
        );
        assert!(candidate.confidence > 0.7, "confidence {}", candidate.confidence);
        assert!(candidate.confidence <= 1.0);
    }

    #[test]
    fn test_hough_blank_image_has_zero_confidence() {
        let detector = HoughGridDetector::from_config(&GridDetectionConfig::default());
        let blank = GrayImage::from_pixel(200, 200, Luma([255]));
        let candidate = detector.detect(&blank).unwrap();
        assert_eq!(candidate.confidence, 0.0);
        assert_eq!(candidate.spacing_px, 0.0);
        assert!(!candidate.is_usable());
    }

    #[test]
    fn test_single_orientation_contributes_nothing() {
        let detector = HoughGridDetector::from_config(&GridDetectionConfig::default());
        let stripes = GrayImage::from_fn(300, 300, |x, _| {
            if x % 30 < 2 {
                Luma([80])
            } else {
                Luma([240])
            }
        });
        let candidate = detector.detect(&stripes).unwrap();
        assert_eq!(candidate.confidence, 0.0);
        assert!(!candidate.lines.vertical.is_empty());
    }
}
