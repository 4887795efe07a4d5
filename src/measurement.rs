//! # Measurement Engine
//!
//! Converts a pixel-space contour and a pixels-per-mm scale into physical
//! dimensions and shape descriptors. Every ratio is defined as 0 when its
//! denominator vanishes.

use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing;

use crate::errors::{AppError, AppResult};
use crate::geometry::{arc_length, bounding_box, convex_hull, fit_ellipse, polygon_area};

/// Names of the fields reported by [`Measurements`], in declaration order.
pub const MEASUREMENT_NAMES: [&str; 18] = [
    "area_mm2",
    "perimeter_mm",
    "width_mm",
    "height_mm",
    "length_max_mm",
    "width_max_mm",
    "equivalent_diameter_mm",
    "circularity",
    "aspect_ratio",
    "solidity",
    "extent",
    "roundness",
    "compactness",
    "angle_degrees",
    "pixels_per_mm",
    "area_pixels",
    "perimeter_pixels",
    "major_axis_pixels",
];

/// Calibrated measurements of one sample contour.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Measurements {
    pub area_mm2: f64,
    pub perimeter_mm: f64,
    /// Bounding box extent along x
    pub width_mm: f64,
    /// Bounding box extent along y
    pub height_mm: f64,
    /// Major axis of the fitted ellipse
    pub length_max_mm: f64,
    /// Minor axis of the fitted ellipse
    pub width_max_mm: f64,
    pub equivalent_diameter_mm: f64,
    pub circularity: f64,
    pub aspect_ratio: f64,
    pub solidity: f64,
    pub extent: f64,
    pub roundness: f64,
    pub compactness: f64,
    pub angle_degrees: f64,
    pub pixels_per_mm: f64,
    pub area_pixels: u64,
    pub perimeter_pixels: f64,
    pub major_axis_pixels: f64,
}

impl Measurements {
    /// All-zero measurements carrying only the scale, for calibration-only results.
    pub fn zeroed(pixels_per_mm: f64) -> Self {
        Self {
            pixels_per_mm: round_to(pixels_per_mm, 2),
            ..Self::default()
        }
    }
}

/// Measures a closed contour. `Ok(None)` for an empty contour.
pub fn calculate_measurements(
    contour: &[Point<i32>],
    pixels_per_mm: f64,
) -> AppResult<Option<Measurements>> {
    if !(pixels_per_mm > 0.0 && pixels_per_mm.is_finite()) {
        return Err(AppError::Validation(format!(
            "Pixels per mm must be positive, got {}",
            pixels_per_mm
        )));
    }
    let Some(bbox) = bounding_box(contour) else {
        return Ok(None);
    };

    let area_px = polygon_area(contour);
    let perimeter_px = arc_length(contour, true);
    let hull_area = polygon_area(&convex_hull(contour));
    let box_area = bbox.area();

    let (major_px, minor_px, angle_degrees) = match fit_ellipse(contour) {
        Some(ellipse) => (ellipse.major_axis, ellipse.minor_axis, ellipse.angle_degrees),
        None => {
            let (w, h) = (bbox.width as f64, bbox.height as f64);
            (w.max(h), w.min(h), 0.0)
        }
    };

    let ratio = |numerator: f64, denominator: f64| {
        if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    };

    let area_mm2 = area_px / (pixels_per_mm * pixels_per_mm);
    let circularity = ratio(4.0 * std::f64::consts::PI * area_px, perimeter_px * perimeter_px);
    let aspect_ratio = ratio(major_px, minor_px);
    let solidity = ratio(area_px, hull_area);
    let extent = ratio(area_px, box_area);
    let roundness = ratio(4.0 * area_px, std::f64::consts::PI * major_px * major_px);
    let compactness = ratio((4.0 * area_px / std::f64::consts::PI).sqrt(), major_px);
    let equivalent_diameter_mm = 2.0 * (area_mm2 / std::f64::consts::PI).sqrt();

    tracing::debug!(
        target: "vision_pipeline",
        "Measured contour of {} points: area={:.0}px, perimeter={:.1}px, axes={:.1}/{:.1}px",
        contour.len(),
        area_px,
        perimeter_px,
        major_px,
        minor_px
    );

    Ok(Some(Measurements {
        area_mm2: round_to(area_mm2, 2),
        perimeter_mm: round_to(perimeter_px / pixels_per_mm, 2),
        width_mm: round_to(bbox.width as f64 / pixels_per_mm, 2),
        height_mm: round_to(bbox.height as f64 / pixels_per_mm, 2),
        length_max_mm: round_to(major_px / pixels_per_mm, 2),
        width_max_mm: round_to(minor_px / pixels_per_mm, 2),
        equivalent_diameter_mm: round_to(equivalent_diameter_mm, 2),
        circularity: round_to(circularity, 3),
        aspect_ratio: round_to(aspect_ratio, 2),
        solidity: round_to(solidity, 3),
        extent: round_to(extent, 3),
        roundness: round_to(roundness, 3),
        compactness: round_to(compactness, 3),
        angle_degrees: round_to(angle_degrees, 1),
        pixels_per_mm: round_to(pixels_per_mm, 2),
        area_pixels: area_px.round() as u64,
        perimeter_pixels: round_to(perimeter_px, 1),
        major_axis_pixels: round_to(major_px, 1),
    }))
}

/// Rounds to `decimals` places; non-finite values become 0.
pub fn round_to(value: f64, decimals: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(decimals);
    (value * factor).round() / factor
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segmentation::contours::external_contours;
    use image::{GrayImage, Luma};
    use imageproc::drawing::draw_polygon_mut;

    fn rectangle() -> Vec<Point<i32>> {
        vec![
            Point::new(0, 0),
            Point::new(100, 0),
            Point::new(100, 50),
            Point::new(0, 50),
        ]
    }

    #[test]
    fn test_rectangle_measurements() {
        let m = calculate_measurements(&rectangle(), 10.0).unwrap().unwrap();
        assert_eq!(m.area_mm2, 50.0);
        assert_eq!(m.perimeter_mm, 30.0);
        // Bounding box counts both edge pixels
        assert_eq!(m.width_mm, 10.1);
        assert_eq!(m.height_mm, 5.1);
        // Fewer than five points: axes come from the bounding box
        assert_eq!(m.length_max_mm, 10.1);
        assert_eq!(m.width_max_mm, 5.1);
        assert_eq!(m.aspect_ratio, 1.98);
        assert_eq!(m.solidity, 1.0);
        assert_eq!(m.extent, 0.971);
        assert_eq!(m.circularity, 0.698);
        assert_eq!(m.equivalent_diameter_mm, 7.98);
        assert_eq!(m.roundness, 0.624);
        assert_eq!(m.compactness, 0.79);
        assert_eq!(m.area_pixels, 5000);
        assert_eq!(m.angle_degrees, 0.0);
    }

    #[test]
    fn test_degenerate_contours_measurements() {
        let point = calculate_measurements(&[Point::new(3, 4)], 5.0).unwrap().unwrap();
        assert_eq!(point.area_mm2, 0.0);
        assert_eq!(point.circularity, 0.0);
        assert_eq!(point.solidity, 0.0);
        assert_eq!(point.extent, 0.0);
        // A single pixel is a 1x1 box
        assert_eq!(point.aspect_ratio, 1.0);
        assert_eq!(point.roundness, 0.0);
        assert_eq!(point.compactness, 0.0);

        let line: Vec<Point<i32>> = (0..6).map(|i| Point::new(i * 10, 0)).collect();
        let flat = calculate_measurements(&line, 5.0).unwrap().unwrap();
        assert_eq!(flat.area_mm2, 0.0);
        assert_eq!(flat.aspect_ratio, 51.0);
        assert_eq!(flat.length_max_mm, 10.2);
        assert_eq!(flat.solidity, 0.0);
    }

    #[test]
    fn test_empty_contour_and_bad_scale() {
        assert_eq!(calculate_measurements(&[], 10.0).unwrap(), None);
        assert!(calculate_measurements(&rectangle(), 0.0).is_err());
        assert!(calculate_measurements(&rectangle(), f64::NAN).is_err());
    }

    #[test]
    fn test_rotated_ellipse_aspect_ratio() {
        let mut mask = GrayImage::new(400, 400);
        let polygon: Vec<Point<i32>> = (0..180)
            .map(|i| {
                let t = i as f64 * std::f64::consts::TAU / 180.0;
                let (a, b, phi) = (120.0, 60.0, 30f64.to_radians());
                let x = 200.0 + a * t.cos() * phi.cos() - b * t.sin() * phi.sin();
                let y = 200.0 + a * t.cos() * phi.sin() + b * t.sin() * phi.cos();
                Point::new(x.round() as i32, y.round() as i32)
            })
            .collect();
        draw_polygon_mut(&mut mask, &polygon, Luma([255]));
        let contour = external_contours(&mask).remove(0);

        let m = calculate_measurements(&contour, 4.0).unwrap().unwrap();
        assert!((m.aspect_ratio - 2.0).abs() < 0.1, "{}", m.aspect_ratio);
        assert!((m.length_max_mm - 60.0).abs() < 2.0, "{}", m.length_max_mm);
        assert!((m.angle_degrees - 30.0).abs() < 3.0, "{}", m.angle_degrees);
        assert!(m.solidity > 0.95);
    }

    #[test]
    fn test_zeroed_and_rounding() {
        let zeroed = Measurements::zeroed(4.0);
        assert_eq!(zeroed.pixels_per_mm, 4.0);
        assert_eq!(zeroed.area_mm2, 0.0);
        assert_eq!(round_to(1.23456, 2), 1.23);
        assert_eq!(round_to(f64::INFINITY, 2), 0.0);
        assert_eq!(MEASUREMENT_NAMES.len(), 18);
    }
}
