//! Line classification, position merging and spacing statistics shared by the
//! grid strategies.

use imageproc::hough::PolarLine;

/// Orientation of a detected line in image terms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrientation {
    Horizontal,
    Vertical,
}

/// Classifies a Hough line within `tolerance` degrees of horizontal or vertical.
///
/// `PolarLine` stores the angle of the line normal, so 0/180 is a vertical line
/// and 90 a horizontal one.
pub fn classify_line(line: &PolarLine, tolerance: f64) -> Option<LineOrientation> {
    let angle = line.angle_in_degrees as f64;
    if angle <= tolerance || angle >= 180.0 - tolerance {
        Some(LineOrientation::Vertical)
    } else if (angle - 90.0).abs() <= tolerance {
        Some(LineOrientation::Horizontal)
    } else {
        None
    }
}

/// Where the line crosses the image centre: y at the middle column for horizontal
/// lines, x at the middle row for vertical ones.
pub fn line_position(line: &PolarLine, orientation: LineOrientation, width: u32, height: u32) -> Option<f64> {
    let theta = (line.angle_in_degrees as f64).to_radians();
    let (sin, cos) = theta.sin_cos();
    let r = line.r as f64;
    let position = match orientation {
        LineOrientation::Horizontal => {
            if sin.abs() < 1e-6 {
                return None;
            }
            (r - width as f64 / 2.0 * cos) / sin
        }
        LineOrientation::Vertical => {
            if cos.abs() < 1e-6 {
                return None;
            }
            (r - height as f64 / 2.0 * sin) / cos
        }
    };
    position.is_finite().then_some(position)
}

/// Sorts positions and replaces runs closer than `min_distance` by their mean.
pub fn merge_positions(mut positions: Vec<f64>, min_distance: f64) -> Vec<f64> {
    positions.retain(|p| p.is_finite());
    positions.sort_by(|a, b| a.total_cmp(b));

    let mut merged = Vec::new();
    let mut cluster: Vec<f64> = Vec::new();
    for position in positions {
        if let Some(&last) = cluster.last() {
            if position - last > min_distance {
                merged.push(cluster.iter().sum::<f64>() / cluster.len() as f64);
                cluster.clear();
            }
        }
        cluster.push(position);
    }
    if !cluster.is_empty() {
        merged.push(cluster.iter().sum::<f64>() / cluster.len() as f64);
    }
    merged
}

/// Spacing summary of one orientation.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct SpacingStats {
    /// Mean of the gaps within 25% of the median gap; 0 with fewer than two lines
    pub spacing: f64,
    /// 1 for perfectly even gaps, lowered by spread and by outlier gaps
    pub regularity: f64,
    pub line_count: usize,
}

pub fn spacing_stats(positions: &[f64]) -> SpacingStats {
    let line_count = positions.len();
    if line_count < 2 {
        return SpacingStats {
            line_count,
            ..Default::default()
        };
    }

    let mut gaps: Vec<f64> = positions.windows(2).map(|w| (w[1] - w[0]).abs()).collect();
    gaps.sort_by(|a, b| a.total_cmp(b));
    let median = gaps[gaps.len() / 2];
    if median <= 0.0 {
        return SpacingStats {
            line_count,
            ..Default::default()
        };
    }

    let inliers: Vec<f64> = gaps
        .iter()
        .copied()
        .filter(|gap| (gap - median).abs() <= 0.25 * median)
        .collect();
    let mean = inliers.iter().sum::<f64>() / inliers.len() as f64;
    let variance = inliers.iter().map(|g| (g - mean).powi(2)).sum::<f64>() / inliers.len() as f64;
    let evenness = (1.0 - variance.sqrt() / mean).clamp(0.0, 1.0);
    let inlier_ratio = inliers.len() as f64 / gaps.len() as f64;

    SpacingStats {
        spacing: mean,
        regularity: evenness * inlier_ratio,
        line_count,
    }
}

/// Relative weights of the three confidence components.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ConfidenceWeights {
    /// Agreement between horizontal and vertical spacing
    pub consistency: f64,
    /// Number of lines found, saturating at 20
    pub count: f64,
    /// Evenness of the gaps
    pub regularity: f64,
}

impl ConfidenceWeights {
    pub const HOUGH: Self = Self {
        consistency: 0.4,
        count: 0.3,
        regularity: 0.3,
    };
    pub const MORPHOLOGICAL: Self = Self {
        consistency: 0.5,
        count: 0.2,
        regularity: 0.3,
    };
}

/// Combines both orientations into `(mean spacing, confidence)`.
///
/// Either orientation without a spacing yields `(0, 0)`.
pub fn combine_orientations(
    horizontal: &SpacingStats,
    vertical: &SpacingStats,
    weights: ConfidenceWeights,
) -> (f64, f64) {
    if horizontal.spacing <= 0.0 || vertical.spacing <= 0.0 {
        return (0.0, 0.0);
    }
    let (h, v) = (horizontal.spacing, vertical.spacing);
    let consistency = 1.0 - (h - v).abs() / h.max(v);
    let count = ((horizontal.line_count + vertical.line_count) as f64 / 20.0).min(1.0);
    let regularity = (horizontal.regularity + vertical.regularity) / 2.0;

    let confidence = weights.consistency * consistency
        + weights.count * count
        + weights.regularity * regularity;
    ((h + v) / 2.0, confidence.clamp(0.0, 1.0))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn line(r: f32, angle: u32) -> PolarLine {
        PolarLine {
            r,
            angle_in_degrees: angle,
        }
    }

    #[test]
    fn test_classify_line() {
        assert_eq!(classify_line(&line(10.0, 0), 11.0), Some(LineOrientation::Vertical));
        assert_eq!(classify_line(&line(10.0, 175), 11.0), Some(LineOrientation::Vertical));
        assert_eq!(classify_line(&line(10.0, 90), 11.0), Some(LineOrientation::Horizontal));
        assert_eq!(classify_line(&line(10.0, 100), 11.0), Some(LineOrientation::Horizontal));
        assert_eq!(classify_line(&line(10.0, 45), 11.0), None);
        assert_eq!(classify_line(&line(10.0, 30), 23.0), None);
        assert_eq!(classify_line(&line(10.0, 20), 23.0), Some(LineOrientation::Vertical));
    }

    #[test]
    fn test_line_position_axis_aligned() {
        let vertical = line(120.0, 0);
        assert_eq!(
            line_position(&vertical, LineOrientation::Vertical, 800, 600),
            Some(120.0)
        );
        let horizontal = line(80.0, 90);
        let y = line_position(&horizontal, LineOrientation::Horizontal, 800, 600).unwrap();
        assert!((y - 80.0).abs() < 1e-6);
    }

    #[test]
    fn test_line_position_obtuse_normal() {
        // Normal at 180 degrees flips the sign of r
        let x = line_position(&line(-50.0, 180), LineOrientation::Vertical, 100, 100).unwrap();
        assert!((x - 50.0).abs() < 1e-6);
    }

    #[test]
    fn test_merge_positions() {
        let merged = merge_positions(vec![41.0, 0.0, 2.0, 39.0, 80.0], 4.0);
        assert_eq!(merged, vec![1.0, 40.0, 80.0]);
        assert!(merge_positions(Vec::new(), 4.0).is_empty());
    }

    #[test]
    fn test_spacing_stats_regular_grid() {
        let positions: Vec<f64> = (0..10).map(|i| 5.0 + i as f64 * 40.0).collect();
        let stats = spacing_stats(&positions);
        assert_eq!(stats.spacing, 40.0);
        assert_eq!(stats.regularity, 1.0);
        assert_eq!(stats.line_count, 10);
    }

    #[test]
    fn test_spacing_stats_ignores_missing_line() {
        let positions = vec![0.0, 40.0, 80.0, 160.0, 200.0, 240.0];
        let stats = spacing_stats(&positions);
        assert_eq!(stats.spacing, 40.0);
        assert!(stats.regularity < 1.0);
        assert!(stats.regularity > 0.7);
    }

    #[test]
    fn test_spacing_stats_single_line() {
        let stats = spacing_stats(&[12.0]);
        assert_eq!(stats.spacing, 0.0);
        assert_eq!(stats.line_count, 1);
    }

    #[test]
    fn test_combine_orientations() {
        let h = SpacingStats {
            spacing: 40.0,
            regularity: 1.0,
            line_count: 15,
        };
        let v = SpacingStats {
            spacing: 40.0,
            regularity: 1.0,
            line_count: 20,
        };
        let (spacing, confidence) = combine_orientations(&h, &v, ConfidenceWeights::HOUGH);
        assert_eq!(spacing, 40.0);
        assert!((confidence - 1.0).abs() < 1e-9);

        let empty = SpacingStats::default();
        assert_eq!(
            combine_orientations(&h, &empty, ConfidenceWeights::MORPHOLOGICAL),
            (0.0, 0.0)
        );
    }
}
