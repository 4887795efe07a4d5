//! Contour extraction and selection over binary masks.

use image::GrayImage;
use imageproc::contours::{find_contours, BorderType};
use imageproc::point::Point;

use crate::geometry::{fill_contour, polygon_area, Contour};

/// Outer borders of the top-level foreground components. Any non-zero pixel is foreground.
pub fn external_contours(mask: &GrayImage) -> Vec<Contour> {
    find_contours::<i32>(mask)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .map(|c| c.points)
        .collect()
}

/// Largest contour by polygon area, optionally restricted to the open band `(min, max)`.
pub fn largest_contour(contours: Vec<Contour>, area_band: Option<(f64, f64)>) -> Option<(Contour, f64)> {
    contours
        .into_iter()
        .map(|contour| {
            let area = polygon_area(&contour);
            (contour, area)
        })
        .filter(|(_, area)| area_band.map_or(true, |(min, max)| *area > min && *area < max))
        .max_by(|a, b| a.1.total_cmp(&b.1))
}

/// Filled mask of one contour.
pub fn contour_mask(width: u32, height: u32, contour: &[Point<i32>]) -> GrayImage {
    let mut mask = GrayImage::new(width, height);
    fill_contour(&mut mask, contour);
    mask
}

/// `(min, max)` pixel areas for fractions of the image area.
pub fn area_band(gray: &GrayImage, min_fraction: f64, max_fraction: f64) -> (f64, f64) {
    let total = gray.width() as f64 * gray.height() as f64;
    (total * min_fraction, total * max_fraction)
}
