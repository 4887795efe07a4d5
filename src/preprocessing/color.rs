//! # Color Conversion Module
//!
//! Grayscale and HSV conversion of RGB rasters plus HSV range masking.
//! Hue uses the half-degree convention (0-180) so that the usual tissue hue
//! ranges can be written the same way photographers' tools report them.

use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};

/// Inclusive HSV box, hue in half degrees (0-180), saturation and value in 0-255.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvRange {
    pub lower: [u8; 3],
    pub upper: [u8; 3],
}

impl HsvRange {
    pub const fn new(lower: [u8; 3], upper: [u8; 3]) -> Self {
        Self { lower, upper }
    }

    pub fn contains(&self, hsv: [u8; 3]) -> bool {
        (0..3).all(|i| hsv[i] >= self.lower[i] && hsv[i] <= self.upper[i])
    }
}

/// Luma conversion of an RGB raster.
pub fn to_grayscale(image: &RgbImage) -> GrayImage {
    image::imageops::grayscale(image)
}

/// Converts one RGB pixel to HSV.
pub fn rgb_to_hsv(rgb: [u8; 3]) -> [u8; 3] {
    let [r, g, b] = rgb.map(|c| c as f32);
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let delta = max - min;

    let saturation = if max > 0.0 { delta / max * 255.0 } else { 0.0 };

    let mut hue = if delta == 0.0 {
        0.0
    } else if max == r {
        60.0 * (g - b) / delta
    } else if max == g {
        120.0 + 60.0 * (b - r) / delta
    } else {
        240.0 + 60.0 * (r - g) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    [
        (hue / 2.0).round().min(180.0) as u8,
        saturation.round() as u8,
        max as u8,
    ]
}

/// Foreground mask of pixels whose HSV value falls inside any of `ranges`.
pub fn hsv_range_mask(image: &RgbImage, ranges: &[HsvRange]) -> GrayImage {
    let mut mask = GrayImage::new(image.width(), image.height());
    for (out, pixel) in mask.pixels_mut().zip(image.pixels()) {
        let hsv = rgb_to_hsv(pixel.0);
        let inside = ranges.iter().any(|range| range.contains(hsv));
        *out = Luma([if inside { 255 } else { 0 }]);
    }
    mask
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    #[test]
    fn test_rgb_to_hsv_primaries() {
        assert_eq!(rgb_to_hsv([255, 0, 0]), [0, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 255, 0]), [60, 255, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 255]), [120, 255, 255]);
        assert_eq!(rgb_to_hsv([255, 255, 255]), [0, 0, 255]);
        assert_eq!(rgb_to_hsv([0, 0, 0]), [0, 0, 0]);
    }

    #[test]
    fn test_rgb_to_hsv_pink_tissue_tone() {
        let [h, s, v] = rgb_to_hsv([200, 110, 130]);
        assert!((160..=180).contains(&h), "hue {}", h);
        assert!(s >= 30);
        assert_eq!(v, 200);
    }

    #[test]
    fn test_hsv_range_mask() {
        let img = RgbImage::from_fn(4, 1, |x, _| match x {
            0 => Rgb([200, 110, 130]),
            1 => Rgb([255, 255, 255]),
            2 => Rgb([200, 120, 90]),
            _ => Rgb([40, 90, 200]),
        });
        let ranges = [
            HsvRange::new([0, 30, 50], [20, 255, 255]),
            HsvRange::new([160, 30, 50], [180, 255, 255]),
        ];
        let mask = hsv_range_mask(&img, &ranges);
        assert_eq!(mask.get_pixel(0, 0)[0], 255);
        assert_eq!(mask.get_pixel(1, 0)[0], 0);
        assert_eq!(mask.get_pixel(2, 0)[0], 255);
        assert_eq!(mask.get_pixel(3, 0)[0], 0);
    }

    #[test]
    fn test_to_grayscale_dimensions() {
        let img = RgbImage::from_pixel(7, 3, Rgb([10, 20, 30]));
        assert_eq!(to_grayscale(&img).dimensions(), (7, 3));
    }
}
