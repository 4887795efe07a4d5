//! # Image Filtering Module
//!
//! Smoothing, contrast enhancement and rectangular morphology on grayscale rasters.
//! These primitives feed both the preprocessor variants and the individual grid and
//! segmentation strategies.

use image::{GrayImage, Luma};
use imageproc::filter::{gaussian_blur_f32, median_filter};
use tracing;

use super::types::{
    ClaheImageResult, MorphologicalOperation, PreprocessingError, StructuringElement,
};

/// Sigma OpenCV derives for a Gaussian kernel of the given odd size.
pub fn sigma_for_kernel(kernel_size: u32) -> f32 {
    0.3 * ((kernel_size as f32 - 1.0) * 0.5 - 1.0) + 0.8
}

/// Gaussian smoothing with a kernel-size parameter rather than a sigma.
pub fn gaussian_blur(image: &GrayImage, kernel_size: u32) -> Result<GrayImage, PreprocessingError> {
    if kernel_size < 3 || kernel_size % 2 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "gaussian kernel size",
            value: kernel_size.to_string(),
        });
    }
    Ok(gaussian_blur_f32(image, sigma_for_kernel(kernel_size)))
}

/// Median filter over a square window of `kernel_size` pixels.
pub fn median_blur(image: &GrayImage, kernel_size: u32) -> Result<GrayImage, PreprocessingError> {
    if kernel_size < 3 || kernel_size % 2 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "median kernel size",
            value: kernel_size.to_string(),
        });
    }
    let radius = kernel_size / 2;
    Ok(median_filter(image, radius, radius))
}

/// Edge-preserving bilateral filter.
///
/// Each output pixel is a weighted mean over a circular neighbourhood of
/// `diameter` pixels, weighted by both spatial distance and intensity difference.
pub fn bilateral_filter(
    image: &GrayImage,
    diameter: u32,
    sigma_color: f32,
    sigma_space: f32,
) -> Result<GrayImage, PreprocessingError> {
    let start_time = std::time::Instant::now();

    if diameter == 0 || sigma_color <= 0.0 || sigma_space <= 0.0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "bilateral parameters",
            value: format!(
                "diameter={}, sigma_color={}, sigma_space={}",
                diameter, sigma_color, sigma_space
            ),
        });
    }

    let (width, height) = image.dimensions();
    let radius = (diameter / 2).max(1) as i32;

    // Spatial kernel restricted to a disc
    let mut offsets = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let dist2 = (dx * dx + dy * dy) as f32;
            if dist2.sqrt() <= radius as f32 {
                let weight = (-dist2 / (2.0 * sigma_space * sigma_space)).exp();
                offsets.push((dx, dy, weight));
            }
        }
    }

    let mut color_weights = [0f32; 256];
    for (diff, weight) in color_weights.iter_mut().enumerate() {
        let d = diff as f32;
        *weight = (-(d * d) / (2.0 * sigma_color * sigma_color)).exp();
    }

    let mut output = GrayImage::new(width, height);
    for y in 0..height as i32 {
        for x in 0..width as i32 {
            let center = image.get_pixel(x as u32, y as u32)[0];
            let mut sum = 0f32;
            let mut norm = 0f32;
            for &(dx, dy, spatial) in &offsets {
                let nx = (x + dx).clamp(0, width as i32 - 1) as u32;
                let ny = (y + dy).clamp(0, height as i32 - 1) as u32;
                let value = image.get_pixel(nx, ny)[0];
                let weight = spatial * color_weights[center.abs_diff(value) as usize];
                sum += weight * value as f32;
                norm += weight;
            }
            let filtered = if norm > 0.0 { sum / norm } else { center as f32 };
            output.put_pixel(
                x as u32,
                y as u32,
                Luma([filtered.round().clamp(0.0, 255.0) as u8]),
            );
        }
    }

    tracing::debug!(
        target: "vision_pipeline",
        "Bilateral filter completed in {}ms: diameter={}, sigma_color={}, sigma_space={}",
        start_time.elapsed().as_millis(),
        diameter,
        sigma_color,
        sigma_space
    );

    Ok(output)
}

/// Pixel-wise weighted sum `alpha * a + beta * b`, saturated to 8 bits.
pub fn weighted_blend(
    a: &GrayImage,
    alpha: f32,
    b: &GrayImage,
    beta: f32,
) -> Result<GrayImage, PreprocessingError> {
    if a.dimensions() != b.dimensions() {
        return Err(PreprocessingError::ProcessingFailed {
            message: format!(
                "cannot blend {:?} with {:?}",
                a.dimensions(),
                b.dimensions()
            ),
        });
    }
    let mut output = GrayImage::new(a.width(), a.height());
    for ((out, pa), pb) in output.pixels_mut().zip(a.pixels()).zip(b.pixels()) {
        let value = alpha * pa[0] as f32 + beta * pb[0] as f32;
        *out = Luma([value.round().clamp(0.0, 255.0) as u8]);
    }
    Ok(output)
}

/// Applies a morphological operation with a rectangular structuring element.
///
/// `iterations` repeats each elementary step, so an opening with two
/// iterations erodes twice and then dilates twice.
pub fn apply_morphology(
    image: &GrayImage,
    operation: MorphologicalOperation,
    kernel: StructuringElement,
    iterations: u32,
) -> GrayImage {
    match operation {
        MorphologicalOperation::Erosion => erode(image, kernel, iterations),
        MorphologicalOperation::Dilation => dilate(image, kernel, iterations),
        MorphologicalOperation::Opening => {
            let eroded = erode(image, kernel, iterations);
            dilate(&eroded, kernel, iterations)
        }
        MorphologicalOperation::Closing => {
            let dilated = dilate(image, kernel, iterations);
            erode(&dilated, kernel, iterations)
        }
        MorphologicalOperation::Gradient => {
            let dilated = dilate(image, kernel, iterations);
            let eroded = erode(image, kernel, iterations);
            let mut output = GrayImage::new(image.width(), image.height());
            for ((out, d), e) in output.pixels_mut().zip(dilated.pixels()).zip(eroded.pixels()) {
                *out = Luma([d[0].saturating_sub(e[0])]);
            }
            output
        }
    }
}

/// Minimum filter over the structuring element, repeated `iterations` times.
pub fn erode(image: &GrayImage, kernel: StructuringElement, iterations: u32) -> GrayImage {
    let mut current = image.clone();
    for _ in 0..iterations.max(1) {
        current = rank_filter(&current, kernel, u8::min, u8::MAX);
    }
    current
}

/// Maximum filter over the structuring element, repeated `iterations` times.
pub fn dilate(image: &GrayImage, kernel: StructuringElement, iterations: u32) -> GrayImage {
    let mut current = image.clone();
    for _ in 0..iterations.max(1) {
        current = rank_filter(&current, kernel, u8::max, u8::MIN);
    }
    current
}

/// Separable min/max filter. Pixels outside the image never win.
fn rank_filter(
    image: &GrayImage,
    kernel: StructuringElement,
    pick: fn(u8, u8) -> u8,
    identity: u8,
) -> GrayImage {
    let (width, height) = image.dimensions();

    let before_x = (kernel.width.max(1) as i64 - 1) / 2;
    let after_x = kernel.width.max(1) as i64 - 1 - before_x;
    let before_y = (kernel.height.max(1) as i64 - 1) / 2;
    let after_y = kernel.height.max(1) as i64 - 1 - before_y;

    let mut horizontal = GrayImage::new(width, height);
    for y in 0..height {
        for x in 0..width as i64 {
            let lo = (x - before_x).max(0) as u32;
            let hi = (x + after_x).min(width as i64 - 1) as u32;
            let mut acc = identity;
            for nx in lo..=hi {
                acc = pick(acc, image.get_pixel(nx, y)[0]);
            }
            horizontal.put_pixel(x as u32, y, Luma([acc]));
        }
    }

    let mut output = GrayImage::new(width, height);
    for y in 0..height as i64 {
        let lo = (y - before_y).max(0) as u32;
        let hi = (y + after_y).min(height as i64 - 1) as u32;
        for x in 0..width {
            let mut acc = identity;
            for ny in lo..=hi {
                acc = pick(acc, horizontal.get_pixel(x, ny)[0]);
            }
            output.put_pixel(x, y as u32, Luma([acc]));
        }
    }

    output
}

/// Applies Contrast Limited Adaptive Histogram Equalization (CLAHE) to enhance local contrast.
///
/// The image is divided into `tile_grid.0 x tile_grid.1` tiles. Each tile gets its own
/// clipped equalization curve and every pixel is mapped through a bilinear blend of the
/// curves of the four nearest tile centres, which avoids visible tile seams.
///
/// # Arguments
///
/// * `image` - The grayscale image to enhance
/// * `clip_limit` - Histogram clip limit relative to a uniform histogram (recommended: 2.0-4.0)
/// * `tile_grid` - Number of tiles along x and y (recommended: (8, 8))
///
/// # Returns
///
/// Returns a `Result` containing the contrast-enhanced image and metadata, or a `PreprocessingError`
pub fn apply_clahe(
    image: &GrayImage,
    clip_limit: f32,
    tile_grid: (u32, u32),
) -> Result<ClaheImageResult, PreprocessingError> {
    let start_time = std::time::Instant::now();

    if clip_limit <= 0.0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "clip limit",
            value: clip_limit.to_string(),
        });
    }

    if tile_grid.0 == 0 || tile_grid.1 == 0 {
        return Err(PreprocessingError::InvalidParameter {
            name: "tile grid",
            value: format!("{:?}", tile_grid),
        });
    }

    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return Err(PreprocessingError::EmptyImage);
    }

    let tile_width = width.div_ceil(tile_grid.0).max(1);
    let tile_height = height.div_ceil(tile_grid.1).max(1);
    let tiles_x = width.div_ceil(tile_width) as usize;
    let tiles_y = height.div_ceil(tile_height) as usize;

    // One lookup table per tile
    let mut luts = Vec::with_capacity(tiles_x * tiles_y);
    for tile_y in 0..tiles_y {
        for tile_x in 0..tiles_x {
            let start_x = tile_x as u32 * tile_width;
            let start_y = tile_y as u32 * tile_height;
            let end_x = (start_x + tile_width).min(width);
            let end_y = (start_y + tile_height).min(height);
            luts.push(tile_lut(image, start_x, start_y, end_x, end_y, clip_limit));
        }
    }

    let mut output = GrayImage::new(width, height);
    for (x, y, pixel) in image.enumerate_pixels() {
        let (x0, x1, fx) = tile_neighbours(x, tile_width, tiles_x);
        let (y0, y1, fy) = tile_neighbours(y, tile_height, tiles_y);
        let intensity = pixel[0] as usize;

        let top = luts[y0 * tiles_x + x0][intensity] * (1.0 - fx)
            + luts[y0 * tiles_x + x1][intensity] * fx;
        let bottom = luts[y1 * tiles_x + x0][intensity] * (1.0 - fx)
            + luts[y1 * tiles_x + x1][intensity] * fx;
        let value = top * (1.0 - fy) + bottom * fy;

        output.put_pixel(x, y, Luma([value.round().clamp(0.0, 255.0) as u8]));
    }

    let processing_time = start_time.elapsed();

    tracing::debug!(
        target: "vision_pipeline",
        "CLAHE applied in {}ms: clip_limit={}, tile_grid={:?}",
        processing_time.as_millis(),
        clip_limit,
        tile_grid
    );

    Ok(ClaheImageResult {
        image: output,
        clip_limit,
        tile_grid,
        processing_time_ms: processing_time.as_millis() as u32,
    })
}

/// Tile indices bracketing a coordinate and the interpolation weight toward the second.
fn tile_neighbours(coord: u32, tile_size: u32, tiles: usize) -> (usize, usize, f32) {
    let position = (coord as f32 + 0.5) / tile_size as f32 - 0.5;
    if position <= 0.0 {
        return (0, 0, 0.0);
    }
    let first = (position.floor() as usize).min(tiles - 1);
    let second = (first + 1).min(tiles - 1);
    let weight = if first == second {
        0.0
    } else {
        position - first as f32
    };
    (first, second, weight)
}

/// Clipped and redistributed equalization curve for a single tile.
fn tile_lut(
    image: &GrayImage,
    start_x: u32,
    start_y: u32,
    end_x: u32,
    end_y: u32,
    clip_limit: f32,
) -> [f32; 256] {
    let mut histogram = [0u32; 256];
    for y in start_y..end_y {
        for x in start_x..end_x {
            histogram[image.get_pixel(x, y)[0] as usize] += 1;
        }
    }

    let total_pixels = ((end_x - start_x) * (end_y - start_y)).max(1) as f32;

    // Apply clip limit
    let clip_limit_pixels = ((clip_limit * (total_pixels / 256.0)).round() as u32).max(1);
    let mut excess_pixels = 0u32;
    for count in &mut histogram {
        if *count > clip_limit_pixels {
            excess_pixels += *count - clip_limit_pixels;
            *count = clip_limit_pixels;
        }
    }

    // Redistribute excess pixels uniformly
    let uniform_increment = excess_pixels / 256;
    let mut remainder = excess_pixels % 256;
    for count in &mut histogram {
        *count += uniform_increment;
        if remainder > 0 {
            *count += 1;
            remainder -= 1;
        }
    }

    let mut lut = [0f32; 256];
    let mut cumulative = 0f32;
    for (i, count) in histogram.iter().enumerate() {
        cumulative += *count as f32 / total_pixels;
        lut[i] = (cumulative * 255.0).min(255.0);
    }
    lut
}
