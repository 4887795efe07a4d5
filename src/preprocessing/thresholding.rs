//! # Image Thresholding Module
//!
//! Global (Otsu) and local (Gaussian-weighted adaptive) binarization for the grid and
//! segmentation strategies. Binary images use 0 for background and 255 for foreground.

use image::{GrayImage, Luma};
use imageproc::filter::gaussian_blur_f32;
use tracing;

use super::filtering::sigma_for_kernel;
use super::types::{PreprocessingError, ThresholdedImageResult};

/// Polarity of a binarization.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThresholdPolarity {
    /// Pixels above the threshold become 255
    Binary,
    /// Pixels above the threshold become 0
    BinaryInverted,
}

/// Applies Otsu's thresholding algorithm to convert an image to binary.
///
/// The optimal threshold maximizes the between-class variance of the histogram.
/// Pixels strictly above the threshold are foreground for `Binary` polarity.
pub fn apply_otsu_threshold(
    image: &GrayImage,
    polarity: ThresholdPolarity,
) -> Result<ThresholdedImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessingError::EmptyImage);
    }

    let mut histogram = [0u32; 256];
    let total_pixels = (image.width() * image.height()) as f64;
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }

    let optimal_threshold = find_otsu_threshold(&histogram, total_pixels)?;
    let binary_img = apply_threshold(image, optimal_threshold, polarity);

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "vision_pipeline",
        "Otsu thresholding completed in {}ms: threshold={}, dimensions={}x{}",
        processing_time.as_millis(),
        optimal_threshold,
        image.width(),
        image.height()
    );

    Ok(ThresholdedImageResult {
        image: binary_img,
        threshold: optimal_threshold,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Fixed-level binarization.
pub fn apply_threshold(image: &GrayImage, level: u8, polarity: ThresholdPolarity) -> GrayImage {
    let mut binary_img = GrayImage::new(image.width(), image.height());
    for (out, pixel) in binary_img.pixels_mut().zip(image.pixels()) {
        let above = pixel[0] > level;
        let foreground = match polarity {
            ThresholdPolarity::Binary => above,
            ThresholdPolarity::BinaryInverted => !above,
        };
        *out = Luma([if foreground { 255 } else { 0 }]);
    }
    binary_img
}

/// Gaussian-weighted adaptive threshold.
///
/// Each pixel is compared with the Gaussian-weighted mean of its `block_size`
/// neighbourhood minus `c`. With `Binary` polarity a pixel brighter than that local
/// threshold becomes foreground, with `BinaryInverted` a darker pixel does.
pub fn adaptive_gaussian_threshold(
    image: &GrayImage,
    block_size: u32,
    c: f32,
    polarity: ThresholdPolarity,
) -> Result<GrayImage, PreprocessingError> {
    if block_size < 3 || block_size % 2 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "adaptive block size",
            value: block_size.to_string(),
        });
    }
    if image.width() == 0 || image.height() == 0 {
        return Err(PreprocessingError::EmptyImage);
    }

    let local_mean = gaussian_blur_f32(image, sigma_for_kernel(block_size));

    let mut binary_img = GrayImage::new(image.width(), image.height());
    for ((out, pixel), mean) in binary_img
        .pixels_mut()
        .zip(image.pixels())
        .zip(local_mean.pixels())
    {
        let above = pixel[0] as f32 > mean[0] as f32 - c;
        let foreground = match polarity {
            ThresholdPolarity::Binary => above,
            ThresholdPolarity::BinaryInverted => !above,
        };
        *out = Luma([if foreground { 255 } else { 0 }]);
    }

    Ok(binary_img)
}

/// Median intensity of a grayscale image.
pub fn median_intensity(image: &GrayImage) -> u8 {
    let mut histogram = [0u32; 256];
    for pixel in image.pixels() {
        histogram[pixel[0] as usize] += 1;
    }
    let half = (image.width() as u64 * image.height() as u64).div_ceil(2);
    let mut cumulative = 0u64;
    for (value, count) in histogram.iter().enumerate() {
        cumulative += *count as u64;
        if cumulative >= half && cumulative > 0 {
            return value as u8;
        }
    }
    0
}

/// Finds the optimal threshold using Otsu's method by maximizing between-class variance.
fn find_otsu_threshold(
    histogram: &[u32; 256],
    total_pixels: f64,
) -> Result<u8, PreprocessingError> {
    if total_pixels <= 0.0 {
        return Err(PreprocessingError::EmptyImage);
    }

    let mut cumulative_sum = 0f64;
    let mut cumulative_weighted_sum = 0f64;
    let mut cumulative_sums = [0f64; 256];
    let mut cumulative_weighted_sums = [0f64; 256];

    for i in 0..256 {
        let pixel_count = histogram[i] as f64;
        cumulative_sum += pixel_count;
        cumulative_weighted_sum += (i as f64) * pixel_count;

        cumulative_sums[i] = cumulative_sum;
        cumulative_weighted_sums[i] = cumulative_weighted_sum;
    }

    let mut max_variance = 0f64;
    let mut optimal_threshold = 128u8;
    let total_weighted_sum = cumulative_weighted_sums[255];

    for threshold_idx in 0..255usize {
        let background = cumulative_sums[threshold_idx];
        let foreground = cumulative_sums[255] - background;
        if background == 0.0 || foreground == 0.0 {
            continue;
        }

        let w0 = background / total_pixels;
        let w1 = foreground / total_pixels;
        let mu0 = cumulative_weighted_sums[threshold_idx] / background;
        let mu1 = (total_weighted_sum - cumulative_weighted_sums[threshold_idx]) / foreground;

        let variance = w0 * w1 * (mu0 - mu1).powi(2);
        if variance > max_variance {
            max_variance = variance;
            optimal_threshold = threshold_idx as u8;
        }
    }

    Ok(optimal_threshold)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_two_tone_image() -> GrayImage {
        GrayImage::from_fn(10, 10, |x, _| Luma([if x < 5 { 25 } else { 225 }]))
    }

    #[test]
    fn test_apply_otsu_threshold_simple_image() {
        let img = create_two_tone_image();
        let result = apply_otsu_threshold(&img, ThresholdPolarity::Binary)
            .expect("apply_otsu_threshold should succeed with valid grayscale image");

        assert!((25..225).contains(&result.threshold));
        assert_eq!(result.image.get_pixel(0, 0)[0], 0);
        assert_eq!(result.image.get_pixel(9, 0)[0], 255);
        for pixel in result.image.pixels() {
            assert!(pixel[0] == 0 || pixel[0] == 255);
        }
    }

    #[test]
    fn test_apply_otsu_threshold_inverted() {
        let img = create_two_tone_image();
        let result = apply_otsu_threshold(&img, ThresholdPolarity::BinaryInverted).unwrap();
        assert_eq!(result.image.get_pixel(0, 0)[0], 255);
        assert_eq!(result.image.get_pixel(9, 0)[0], 0);
    }

    #[test]
    fn test_apply_otsu_threshold_uniform_image() {
        let img = GrayImage::from_pixel(10, 10, Luma([128]));
        let result = apply_otsu_threshold(&img, ThresholdPolarity::Binary)
            .expect("apply_otsu_threshold should succeed with uniform grayscale image");
        assert_eq!(result.threshold, 128);
    }

    #[test]
    fn test_find_otsu_threshold_binary_histogram() {
        let mut histogram = [0u32; 256];
        histogram[0] = 900;
        histogram[255] = 100;
        let threshold = find_otsu_threshold(&histogram, 1000.0).unwrap();
        assert!(threshold < 255);
    }

    #[test]
    fn test_find_otsu_threshold_empty() {
        let histogram = [0u32; 256];
        assert!(find_otsu_threshold(&histogram, 0.0).is_err());
    }

    #[test]
    fn test_adaptive_threshold_marks_dark_line() {
        // Dark vertical line on a light background
        let img = GrayImage::from_fn(40, 40, |x, _| Luma([if x == 20 || x == 21 { 150 } else { 240 }]));
        let binary =
            adaptive_gaussian_threshold(&img, 11, 2.0, ThresholdPolarity::BinaryInverted).unwrap();
        assert_eq!(binary.get_pixel(20, 20)[0], 255);
        assert_eq!(binary.get_pixel(5, 20)[0], 0);
    }

    #[test]
    fn test_adaptive_threshold_uniform_is_background_when_inverted() {
        let img = GrayImage::from_pixel(20, 20, Luma([100]));
        let binary =
            adaptive_gaussian_threshold(&img, 11, 2.0, ThresholdPolarity::BinaryInverted).unwrap();
        assert!(binary.pixels().all(|p| p[0] == 0));

        let binary = adaptive_gaussian_threshold(&img, 11, 2.0, ThresholdPolarity::Binary).unwrap();
        assert!(binary.pixels().all(|p| p[0] == 255));
    }

    #[test]
    fn test_adaptive_threshold_invalid_block() {
        let img = GrayImage::from_pixel(20, 20, Luma([100]));
        assert!(adaptive_gaussian_threshold(&img, 10, 2.0, ThresholdPolarity::Binary).is_err());
        assert!(adaptive_gaussian_threshold(&img, 1, 2.0, ThresholdPolarity::Binary).is_err());
    }

    #[test]
    fn test_median_intensity() {
        let img = create_two_tone_image();
        assert_eq!(median_intensity(&img), 25);
        let img = GrayImage::from_pixel(3, 3, Luma([77]));
        assert_eq!(median_intensity(&img), 77);
    }
}
