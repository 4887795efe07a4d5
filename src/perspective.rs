//! # Perspective Correction
//!
//! Decides whether the grid in a photograph is close enough to axis-aligned to
//! measure directly and, when it is not, tries to rectify it with a homography
//! fitted to the outermost grid corners. A rectified image is only handed back
//! when its own quality score is strictly better than the input's.

use std::borrow::Cow;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::edges::canny;
use imageproc::geometric_transformations::{warp_into, Interpolation, Projection};
use imageproc::gradients::{horizontal_sobel, vertical_sobel};
use imageproc::hough::{detect_lines, LineDetectionOptions};
use serde::Serialize;
use tracing;

use crate::config::PerspectiveConfig;
use crate::errors::{AppError, AppResult};
use crate::grid::lines::{classify_line, LineOrientation};
use crate::preprocessing::to_grayscale;

/// Sub-pixel image coordinate `(x, y)`.
pub type Corner = (f32, f32);

/// Four grid corners in rectification order.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct GridCorners {
    pub top_left: Corner,
    pub top_right: Corner,
    pub bottom_right: Corner,
    pub bottom_left: Corner,
}

impl GridCorners {
    pub fn as_array(&self) -> [Corner; 4] {
        [self.top_left, self.top_right, self.bottom_right, self.bottom_left]
    }

    /// Mean lengths of opposite sides, `(width, height)`.
    pub fn mean_side_lengths(&self) -> (f32, f32) {
        let d = |a: Corner, b: Corner| ((a.0 - b.0).powi(2) + (a.1 - b.1).powi(2)).sqrt();
        let width = (d(self.top_left, self.top_right) + d(self.bottom_left, self.bottom_right)) / 2.0;
        let height = (d(self.top_left, self.bottom_left) + d(self.top_right, self.bottom_right)) / 2.0;
        (width, height)
    }
}

/// Axis alignment of the straight lines found in an image.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridQuality {
    /// Percentage of lines within the tolerance band of horizontal or vertical
    pub quality_score: f64,
    pub needs_correction: bool,
    pub reason: String,
    pub total_lines: usize,
    pub horizontal_lines: usize,
    pub vertical_lines: usize,
}

/// What `auto_correct_perspective` did and why.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerspectiveInfo {
    pub corrected: bool,
    pub reason: String,
    pub original_quality: f64,
    pub corrected_quality: Option<f64>,
    pub corners: Option<GridCorners>,
    pub output_size: Option<(u32, u32)>,
}

/// Checks and rectifies grid perspective.
#[derive(Debug, Clone, Default)]
pub struct PerspectiveCorrector {
    config: PerspectiveConfig,
}

impl PerspectiveCorrector {
    pub fn new(config: PerspectiveConfig) -> Self {
        Self { config }
    }

    /// Scores how axis-aligned the dominant straight lines are.
    pub fn estimate_grid_quality(&self, image: &RgbImage) -> GridQuality {
        let gray = to_grayscale(image);
        self.estimate_gray_quality(&gray)
    }

    fn estimate_gray_quality(&self, gray: &GrayImage) -> GridQuality {
        let edges = canny(gray, self.config.canny_low, self.config.canny_high);
        let lines = detect_lines(
            &edges,
            LineDetectionOptions {
                vote_threshold: self.config.hough_vote_threshold,
                suppression_radius: 8,
            },
        );

        if lines.is_empty() {
            return GridQuality {
                quality_score: 0.0,
                needs_correction: false,
                reason: "No lines detected".to_string(),
                total_lines: 0,
                horizontal_lines: 0,
                vertical_lines: 0,
            };
        }

        let tolerance = self.config.angle_tolerance_degrees;
        let (mut horizontal, mut vertical) = (0usize, 0usize);
        for line in &lines {
            match classify_line(line, tolerance) {
                Some(LineOrientation::Horizontal) => horizontal += 1,
                Some(LineOrientation::Vertical) => vertical += 1,
                None => {}
            }
        }

        let quality_score = (horizontal + vertical) as f64 / lines.len() as f64 * 100.0;
        let needs_correction = quality_score < self.config.quality_threshold;

        GridQuality {
            quality_score,
            needs_correction,
            reason: format!(
                "{:.1}% of {} lines are axis-aligned",
                quality_score,
                lines.len()
            ),
            total_lines: lines.len(),
            horizontal_lines: horizontal,
            vertical_lines: vertical,
        }
    }

    /// Finds the four outermost grid corners from Harris corner candidates.
    pub fn detect_grid_corners(&self, image: &RgbImage) -> Option<GridCorners> {
        let gray = to_grayscale(image);
        let candidates = harris_corners(
            &gray,
            self.config.harris_block_size,
            self.config.harris_k,
            self.config.harris_threshold_ratio,
        );

        tracing::debug!(
            target: "vision_pipeline",
            "Harris detector found {} corner candidates",
            candidates.len()
        );

        if candidates.len() < 4 {
            return None;
        }
        Some(order_corners(&candidates, image.width() as f32, image.height() as f32))
    }

    /// Maps `corners` onto an `output_size` rectangle.
    pub fn correct_perspective(
        &self,
        image: &RgbImage,
        corners: &GridCorners,
        output_size: (u32, u32),
    ) -> AppResult<RgbImage> {
        let (width, height) = output_size;
        if width == 0 || height == 0 {
            return Err(AppError::Processing(format!(
                "Invalid perspective output size {}x{}",
                width, height
            )));
        }

        let destination = [
            (0.0, 0.0),
            ((width - 1) as f32, 0.0),
            ((width - 1) as f32, (height - 1) as f32),
            (0.0, (height - 1) as f32),
        ];
        let projection = Projection::from_control_points(corners.as_array(), destination)
            .ok_or_else(|| {
                AppError::Processing("Degenerate corner configuration for homography".to_string())
            })?;

        let mut output = RgbImage::new(width, height);
        warp_into(
            image,
            &projection,
            Interpolation::Bilinear,
            Rgb([255, 255, 255]),
            &mut output,
        );
        Ok(output)
    }

    /// Rectifies the image only when that measurably improves grid alignment.
    pub fn auto_correct_perspective<'a>(
        &self,
        image: &'a RgbImage,
    ) -> (Cow<'a, RgbImage>, PerspectiveInfo) {
        let quality = self.estimate_grid_quality(image);
        let mut info = PerspectiveInfo {
            corrected: false,
            reason: String::new(),
            original_quality: quality.quality_score,
            corrected_quality: None,
            corners: None,
            output_size: None,
        };

        if !self.config.enabled {
            info.reason = "Perspective correction disabled".to_string();
            return (Cow::Borrowed(image), info);
        }

        if !quality.needs_correction {
            info.reason = "No correction needed".to_string();
            return (Cow::Borrowed(image), info);
        }

        let corners = match self.detect_grid_corners(image) {
            Some(corners) => corners,
            None => {
                info.reason = "Could not detect grid corners".to_string();
                return (Cow::Borrowed(image), info);
            }
        };
        info.corners = Some(corners);

        let output_size = scale_preserving_size(&corners, image.width(), image.height());
        info.output_size = Some(output_size);

        let corrected = match self.correct_perspective(image, &corners, output_size) {
            Ok(corrected) => corrected,
            Err(e) => {
                info.reason = format!("Correction failed: {}", e);
                return (Cow::Borrowed(image), info);
            }
        };

        let corrected_quality = self.estimate_grid_quality(&corrected);
        info.corrected_quality = Some(corrected_quality.quality_score);

        if corrected_quality.quality_score > quality.quality_score {
            info.corrected = true;
            info.reason = "Perspective corrected successfully".to_string();
            tracing::info!(
                original_quality = quality.quality_score,
                corrected_quality = corrected_quality.quality_score,
                width = output_size.0,
                height = output_size.1,
                "Perspective correction applied"
            );
            (Cow::Owned(corrected), info)
        } else {
            info.reason = "Correction did not improve quality".to_string();
            (Cow::Borrowed(image), info)
        }
    }
}

/// Output rectangle whose sides match the mean opposite side lengths of the quad.
fn scale_preserving_size(corners: &GridCorners, width: u32, height: u32) -> (u32, u32) {
    let (w, h) = corners.mean_side_lengths();
    let clamp = |value: f32, limit: u32| (value.round() as u32).clamp(16, limit.max(16) * 4);
    (clamp(w, width), clamp(h, height))
}

/// Local maxima of the Harris response above `ratio * max_response`.
fn harris_corners(gray: &GrayImage, block_size: u32, k: f32, ratio: f32) -> Vec<Corner> {
    let (width, height) = (gray.width() as usize, gray.height() as usize);
    if width < 3 || height < 3 {
        return Vec::new();
    }

    let gx = horizontal_sobel(gray);
    let gy = vertical_sobel(gray);

    let n = width * height;
    let (mut ixx, mut iyy, mut ixy) = (vec![0f64; n], vec![0f64; n], vec![0f64; n]);
    for (i, (dx, dy)) in gx.pixels().zip(gy.pixels()).enumerate() {
        let (dx, dy) = (dx[0] as f64, dy[0] as f64);
        ixx[i] = dx * dx;
        iyy[i] = dy * dy;
        ixy[i] = dx * dy;
    }

    let radius = (block_size / 2) as usize;
    let sxx = box_sum(&ixx, width, height, radius);
    let syy = box_sum(&iyy, width, height, radius);
    let sxy = box_sum(&ixy, width, height, radius);

    let k = k as f64;
    let response: Vec<f64> = (0..n)
        .map(|i| {
            let det = sxx[i] * syy[i] - sxy[i] * sxy[i];
            let trace = sxx[i] + syy[i];
            det - k * trace * trace
        })
        .collect();

    let max_response = response.iter().cloned().fold(f64::MIN, f64::max);
    if max_response <= 0.0 {
        return Vec::new();
    }
    let threshold = ratio as f64 * max_response;

    let mut corners = Vec::new();
    for y in 1..height - 1 {
        for x in 1..width - 1 {
            let value = response[y * width + x];
            if value <= threshold {
                continue;
            }
            let is_peak = (y - 1..=y + 1)
                .flat_map(|ny| (x - 1..=x + 1).map(move |nx| (nx, ny)))
                .all(|(nx, ny)| response[ny * width + nx] <= value);
            if is_peak {
                corners.push((x as f32, y as f32));
            }
        }
    }
    corners
}

/// Separable box sum with clamped borders.
fn box_sum(values: &[f64], width: usize, height: usize, radius: usize) -> Vec<f64> {
    let mut horizontal = vec![0f64; values.len()];
    for y in 0..height {
        let row = &values[y * width..(y + 1) * width];
        for x in 0..width {
            let lo = x.saturating_sub(radius);
            let hi = (x + radius).min(width - 1);
            horizontal[y * width + x] = row[lo..=hi].iter().sum();
        }
    }

    let mut output = vec![0f64; values.len()];
    for y in 0..height {
        let lo = y.saturating_sub(radius);
        let hi = (y + radius).min(height - 1);
        for x in 0..width {
            output[y * width + x] = (lo..=hi).map(|ny| horizontal[ny * width + x]).sum();
        }
    }
    output
}

/// Picks one corner per quadrant around the centroid, nearest to the matching image
/// corner; falls back to coordinate sum/difference extremes when a quadrant is empty.
fn order_corners(points: &[Corner], width: f32, height: f32) -> GridCorners {
    let n = points.len() as f32;
    let cx = points.iter().map(|p| p.0).sum::<f32>() / n;
    let cy = points.iter().map(|p| p.1).sum::<f32>() / n;

    let nearest = |target: Corner, in_quadrant: &dyn Fn(&Corner) -> bool| -> Option<Corner> {
        points
            .iter()
            .filter(|p| in_quadrant(p))
            .min_by(|a, b| {
                let da = (a.0 - target.0).powi(2) + (a.1 - target.1).powi(2);
                let db = (b.0 - target.0).powi(2) + (b.1 - target.1).powi(2);
                da.total_cmp(&db)
            })
            .copied()
    };

    let quadrants = (
        nearest((0.0, 0.0), &|p| p.0 < cx && p.1 < cy),
        nearest((width, 0.0), &|p| p.0 >= cx && p.1 < cy),
        nearest((width, height), &|p| p.0 >= cx && p.1 >= cy),
        nearest((0.0, height), &|p| p.0 < cx && p.1 >= cy),
    );

    if let (Some(top_left), Some(top_right), Some(bottom_right), Some(bottom_left)) = quadrants {
        return GridCorners {
            top_left,
            top_right,
            bottom_right,
            bottom_left,
        };
    }

    let by = |key: &dyn Fn(&Corner) -> f32, largest: bool| -> Corner {
        let iter = points.iter().copied();
        let pick = if largest {
            iter.max_by(|a, b| key(a).total_cmp(&key(b)))
        } else {
            iter.min_by(|a, b| key(a).total_cmp(&key(b)))
        };
        pick.unwrap_or((0.0, 0.0))
    };
    GridCorners {
        top_left: by(&|p| p.0 + p.1, false),
        top_right: by(&|p| p.0 - p.1, true),
        bottom_right: by(&|p| p.0 + p.1, true),
        bottom_left: by(&|p| p.0 - p.1, false),
    }
}
