//! # Synthetic Test Image
//!
//! A white sheet with a square grid of known spacing and a rotated pink
//! ellipse standing in for a tissue sample. Used by the pipeline self-test,
//! the integration tests and the `generate_synthetic_image` binary.

use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_filled_rect_mut, draw_polygon_mut};
use imageproc::point::Point;
use imageproc::rect::Rect;
use rand::prelude::*;
use rand::rngs::StdRng;

const BACKGROUND: Rgb<u8> = Rgb([255, 255, 255]);
const TISSUE: Rgb<u8> = Rgb([200, 110, 130]);
const TISSUE_DARK: Rgb<u8> = Rgb([185, 95, 118]);

/// Parameters of the synthetic image.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticImageOptions {
    pub width: u32,
    pub height: u32,
    /// Distance between grid lines in pixels
    pub grid_spacing_px: u32,
    pub line_width: u32,
    /// Gray level of the grid lines
    pub line_gray: u8,
    pub ellipse_center: (f64, f64),
    pub semi_major_px: f64,
    pub semi_minor_px: f64,
    pub angle_degrees: f64,
    /// Uniform per-channel noise amplitude; 0 disables noise
    pub noise_amplitude: u8,
    pub seed: u64,
}

impl Default for SyntheticImageOptions {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            grid_spacing_px: 40,
            line_width: 2,
            line_gray: 150,
            ellipse_center: (400.0, 300.0),
            semi_major_px: 80.0,
            semi_minor_px: 60.0,
            angle_degrees: 30.0,
            noise_amplitude: 0,
            seed: 42,
        }
    }
}

impl SyntheticImageOptions {
    /// Scale the grid encodes for a given physical grid spacing.
    pub fn expected_pixels_per_mm(&self, grid_size_mm: f64) -> f64 {
        self.grid_spacing_px as f64 / grid_size_mm
    }

    /// Major over minor axis of the drawn ellipse.
    pub fn expected_aspect_ratio(&self) -> f64 {
        self.semi_major_px / self.semi_minor_px
    }
}

/// Default synthetic image: 800×600, 40 px grid, 80×60 px ellipse at 30°.
pub fn create_synthetic_test_image() -> RgbImage {
    create_synthetic_image(&SyntheticImageOptions::default())
}

pub fn create_synthetic_image(options: &SyntheticImageOptions) -> RgbImage {
    let mut image = RgbImage::from_pixel(options.width, options.height, BACKGROUND);
    let spacing = options.grid_spacing_px.max(1);
    let line_width = options.line_width.max(1);
    let line_color = Rgb([options.line_gray; 3]);

    for x in (0..options.width).step_by(spacing as usize) {
        draw_filled_rect_mut(
            &mut image,
            Rect::at(x as i32, 0).of_size(line_width, options.height),
            line_color,
        );
    }
    for y in (0..options.height).step_by(spacing as usize) {
        draw_filled_rect_mut(
            &mut image,
            Rect::at(0, y as i32).of_size(options.width, line_width),
            line_color,
        );
    }

    let outline = rotated_ellipse(
        options.ellipse_center,
        options.semi_major_px,
        options.semi_minor_px,
        options.angle_degrees,
    );
    if outline.len() >= 3 {
        draw_polygon_mut(&mut image, &outline, TISSUE);
    }

    // Texture spots along the major axis
    let (cx, cy) = options.ellipse_center;
    let (sin, cos) = options.angle_degrees.to_radians().sin_cos();
    let spot = (options.semi_minor_px / 6.0).round().max(1.0) as i32;
    for offset in [-0.45, 0.0, 0.45] {
        let along = offset * options.semi_major_px;
        let center = (
            (cx + along * cos).round() as i32,
            (cy + along * sin).round() as i32,
        );
        draw_filled_ellipse_mut(&mut image, center, spot, spot, TISSUE_DARK);
    }

    if options.noise_amplitude > 0 {
        add_noise(&mut image, options.noise_amplitude, options.seed);
    }
    image
}

/// Outline of an ellipse rotated clockwise in image coordinates.
fn rotated_ellipse(center: (f64, f64), a: f64, b: f64, angle_degrees: f64) -> Vec<Point<i32>> {
    let (sin, cos) = angle_degrees.to_radians().sin_cos();
    let mut points: Vec<Point<i32>> = Vec::with_capacity(360);
    for i in 0..360 {
        let t = (i as f64).to_radians();
        let (x, y) = (a * t.cos(), b * t.sin());
        let point = Point::new(
            (center.0 + x * cos - y * sin).round() as i32,
            (center.1 + x * sin + y * cos).round() as i32,
        );
        if points.last() != Some(&point) && points.first() != Some(&point) {
            points.push(point);
        }
    }
    points
}

fn add_noise(image: &mut RgbImage, amplitude: u8, seed: u64) {
    let mut rng = StdRng::seed_from_u64(seed);
    let amplitude = amplitude as i16;
    for pixel in image.pixels_mut() {
        for channel in pixel.0.iter_mut() {
            let delta = rng.random_range(-amplitude..=amplitude);
            *channel = (*channel as i16 + delta).clamp(0, 255) as u8;
        }
    }
}

/// Pure uniform noise, for robustness checks.
pub fn create_noise_image(width: u32, height: u32, seed: u64) -> RgbImage {
    let mut rng = StdRng::seed_from_u64(seed);
    RgbImage::from_fn(width, height, |_, _| {
        Rgb([rng.random(), rng.random(), rng.random()])
    })
}
