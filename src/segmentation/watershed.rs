//! Marker-based watershed segmentation.
//!
//! Median denoise, morphological gradient, Otsu, opening. Sure background is a
//! dilation of the opened mask, sure foreground the core of its distance
//! transform. Markers flood the gradient image by priority and the largest
//! foreground region becomes the candidate, whatever its size.

use std::cmp::Reverse;
use std::collections::BinaryHeap;

use image::{GrayImage, Luma, RgbImage};
use imageproc::region_labelling::{connected_components, Connectivity};
use tracing;

use super::contours::{external_contours, largest_contour};
use super::types::{SegmentCandidate, SegmentationMethod, SegmentationStrategy};
use crate::config::SegmentationConfig;
use crate::errors::AppResult;
use crate::preprocessing::{
    apply_morphology, apply_otsu_threshold, dilate, median_blur, MorphologicalOperation,
    StructuringElement, ThresholdPolarity,
};

/// Marker of pixels left for the flood to decide
const UNKNOWN: u32 = 0;
/// Marker of sure background
const BACKGROUND: u32 = 1;

#[derive(Debug, Clone)]
pub struct WatershedSegmenter {
    confidence_cap: f64,
}

impl WatershedSegmenter {
    pub fn from_config(config: &SegmentationConfig) -> Self {
        Self {
            confidence_cap: config.watershed_confidence_cap,
        }
    }
}

impl SegmentationStrategy for WatershedSegmenter {
    fn method(&self) -> SegmentationMethod {
        SegmentationMethod::Watershed
    }

    fn segment(&self, gray: &GrayImage, _original: &RgbImage) -> AppResult<Option<SegmentCandidate>> {
        let kernel = StructuringElement::square(3);
        let denoised = median_blur(gray, 5)?;
        let gradient = apply_morphology(&denoised, MorphologicalOperation::Gradient, kernel, 1);
        let thresholded = apply_otsu_threshold(&gradient, ThresholdPolarity::Binary)?;
        let opening = apply_morphology(&thresholded.image, MorphologicalOperation::Opening, kernel, 2);
        let sure_background = dilate(&opening, kernel, 3);

        let distances = distance_transform(&opening);
        let max_distance = distances.iter().copied().fold(0.0f32, f32::max);
        if max_distance <= 0.0 {
            return Ok(None);
        }
        let sure_foreground = GrayImage::from_fn(gray.width(), gray.height(), |x, y| {
            let d = distances[(y * gray.width() + x) as usize];
            Luma([if d > 0.7 * max_distance { 255 } else { 0 }])
        });

        let markers = build_markers(&sure_foreground, &sure_background);
        let labels = flood(&gradient, markers);

        let Some(region) = largest_region_mask(&labels, gray.width(), gray.height()) else {
            return Ok(None);
        };

        let Some((contour, area_px)) = largest_contour(external_contours(&region), None) else {
            return Ok(None);
        };

        let total = gray.width() as f64 * gray.height() as f64;
        let confidence = (area_px / (total * 0.1)).min(self.confidence_cap);

        tracing::debug!(
            target: "vision_pipeline",
            "Watershed: Otsu={}, max distance={:.1}, region area={:.0}px, confidence={:.3}",
            thresholded.threshold,
            max_distance,
            area_px,
            confidence
        );

        Ok(Some(SegmentCandidate {
            contour,
            confidence,
            area_px,
        }))
    }
}

/// Chamfer approximation of the Euclidean distance from each foreground pixel
/// to the nearest background pixel. Background pixels are 0.
pub fn distance_transform(mask: &GrayImage) -> Vec<f32> {
    let (width, height) = (mask.width() as usize, mask.height() as usize);
    let far = (width + height) as f32;
    let diagonal = std::f32::consts::SQRT_2;
    let mut dist: Vec<f32> = mask
        .pixels()
        .map(|p| if p[0] == 0 { 0.0 } else { far })
        .collect();

    let idx = |x: usize, y: usize| y * width + x;

    for y in 0..height {
        for x in 0..width {
            let mut d = dist[idx(x, y)];
            if d == 0.0 {
                continue;
            }
            if x > 0 {
                d = d.min(dist[idx(x - 1, y)] + 1.0);
            }
            if y > 0 {
                d = d.min(dist[idx(x, y - 1)] + 1.0);
                if x > 0 {
                    d = d.min(dist[idx(x - 1, y - 1)] + diagonal);
                }
                if x + 1 < width {
                    d = d.min(dist[idx(x + 1, y - 1)] + diagonal);
                }
            }
            dist[idx(x, y)] = d;
        }
    }

    for y in (0..height).rev() {
        for x in (0..width).rev() {
            let mut d = dist[idx(x, y)];
            if d == 0.0 {
                continue;
            }
            if x + 1 < width {
                d = d.min(dist[idx(x + 1, y)] + 1.0);
            }
            if y + 1 < height {
                d = d.min(dist[idx(x, y + 1)] + 1.0);
                if x + 1 < width {
                    d = d.min(dist[idx(x + 1, y + 1)] + diagonal);
                }
                if x > 0 {
                    d = d.min(dist[idx(x - 1, y + 1)] + diagonal);
                }
            }
            dist[idx(x, y)] = d;
        }
    }

    dist
}

/// Foreground components get labels from 2 upwards, sure background 1, the
/// band between sure background and sure foreground 0.
fn build_markers(sure_foreground: &GrayImage, sure_background: &GrayImage) -> Vec<u32> {
    let components = connected_components(sure_foreground, Connectivity::Eight, Luma([0u8]));
    components
        .pixels()
        .zip(sure_background.pixels())
        .map(|(label, background)| {
            if label[0] > 0 {
                label[0] + 1
            } else if background[0] > 0 {
                UNKNOWN
            } else {
                BACKGROUND
            }
        })
        .collect()
}

/// Priority flood from the markers over `elevation`, lowest first. Every
/// pixel ends up labelled.
fn flood(elevation: &GrayImage, mut labels: Vec<u32>) -> Vec<u32> {
    let (width, height) = (elevation.width() as usize, elevation.height() as usize);
    let mut queue: BinaryHeap<Reverse<(u8, u64, usize, u32)>> = BinaryHeap::new();
    let mut order = 0u64;

    let neighbours = |index: usize| {
        let (x, y) = (index % width, index / width);
        let mut out = [None; 4];
        if x > 0 {
            out[0] = Some(index - 1);
        }
        if x + 1 < width {
            out[1] = Some(index + 1);
        }
        if y > 0 {
            out[2] = Some(index - width);
        }
        if y + 1 < height {
            out[3] = Some(index + width);
        }
        out
    };

    for index in 0..labels.len() {
        if labels[index] == UNKNOWN {
            continue;
        }
        for neighbour in neighbours(index).into_iter().flatten() {
            if labels[neighbour] == UNKNOWN {
                let level = elevation.as_raw()[neighbour];
                queue.push(Reverse((level, order, neighbour, labels[index])));
                order += 1;
            }
        }
    }

    while let Some(Reverse((_, _, index, label))) = queue.pop() {
        if labels[index] != UNKNOWN {
            continue;
        }
        labels[index] = label;
        for neighbour in neighbours(index).into_iter().flatten() {
            if labels[neighbour] == UNKNOWN {
                let level = elevation.as_raw()[neighbour];
                queue.push(Reverse((level, order, neighbour, label)));
                order += 1;
            }
        }
    }

    labels
}

/// Mask of the largest region with a foreground label.
fn largest_region_mask(labels: &[u32], width: u32, height: u32) -> Option<GrayImage> {
    let max_label = labels.iter().copied().max()?;
    if max_label <= BACKGROUND {
        return None;
    }
    let mut counts = vec![0u64; max_label as usize + 1];
    for &label in labels {
        counts[label as usize] += 1;
    }
    let (best, _) = counts
        .iter()
        .enumerate()
        .skip(BACKGROUND as usize + 1)
        .filter(|(_, count)| **count > 0)
        .max_by_key(|(_, count)| **count)?;

    let best = best as u32;
    Some(GrayImage::from_fn(width, height, |x, y| {
        Luma([if labels[(y * width + x) as usize] == best { 255 } else { 0 }])
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn test_distance_transform_of_square() {
        let mut mask = GrayImage::new(11, 11);
        draw_filled_rect_mut(&mut mask, Rect::at(1, 1).of_size(9, 9), Luma([255]));
        let dist = distance_transform(&mask);
        assert_eq!(dist[0], 0.0);
        assert_eq!(dist[11 + 1], 1.0);
        assert_eq!(dist[5 * 11 + 5], 5.0);
    }

    #[test]
    fn test_flood_labels_every_pixel() {
        let elevation = GrayImage::from_fn(5, 1, |x, _| Luma([[0, 10, 50, 10, 0][x as usize]]));
        let labels = flood(&elevation, vec![2, UNKNOWN, UNKNOWN, UNKNOWN, 3]);
        assert!(labels.iter().all(|&l| l != UNKNOWN));
        assert_eq!(labels[1], 2);
        assert_eq!(labels[3], 3);
    }

    #[test]
    fn test_largest_region_mask_ignores_background() {
        let labels = vec![1, 1, 1, 2, 3, 3];
        let mask = largest_region_mask(&labels, 6, 1).unwrap();
        assert_eq!(mask.get_pixel(4, 0)[0], 255);
        assert_eq!(mask.get_pixel(0, 0)[0], 0);
        assert!(largest_region_mask(&[1, 1, 0], 3, 1).is_none());
    }

    #[test]
    fn test_watershed_on_blank_image() {
        let segmenter = WatershedSegmenter::from_config(&SegmentationConfig::default());
        let gray = GrayImage::from_pixel(80, 80, Luma([200]));
        let original = RgbImage::from_pixel(80, 80, Rgb([200, 200, 200]));
        assert!(segmenter.segment(&gray, &original).unwrap().is_none());
    }

    /// Light sheet with a one-pixel checkerboard block. The texture survives
    /// the median filter, so the block has a solid high gradient.
    fn textured_block(size: u32, x0: u32, side: u32) -> GrayImage {
        GrayImage::from_fn(size, size, |x, y| {
            let inside = (x0..x0 + side).contains(&x) && (x0..x0 + side).contains(&y);
            match (inside, (x + y) % 2 == 0) {
                (false, _) => Luma([230]),
                (true, true) => Luma([0]),
                (true, false) => Luma([200]),
            }
        })
    }

    #[test]
    fn test_watershed_finds_textured_block() {
        let segmenter = WatershedSegmenter::from_config(&SegmentationConfig::default());
        // 30x30 block in 160x160: about 3.5% of the image
        let gray = textured_block(160, 65, 30);
        let original = RgbImage::new(160, 160);
        let candidate = segmenter
            .segment(&gray, &original)
            .unwrap()
            .expect("watershed should find the block");
        assert!(candidate.confidence > 0.0 && candidate.confidence <= 0.8);
        assert!(candidate.confidence < 0.8, "{}", candidate.confidence);
        assert!(candidate.area_px > 150.0 && candidate.area_px < 900.0, "{}", candidate.area_px);
    }

    #[test]
    fn test_watershed_confidence_is_capped() {
        let segmenter = WatershedSegmenter::from_config(&SegmentationConfig::default());
        let gray = textured_block(120, 20, 80);
        let original = RgbImage::new(120, 120);
        let candidate = segmenter
            .segment(&gray, &original)
            .unwrap()
            .expect("watershed should find the block");
        assert_eq!(candidate.confidence, 0.8);
    }

    #[test]
    fn test_watershed_keeps_regions_covering_most_of_the_image() {
        let segmenter = WatershedSegmenter::from_config(&SegmentationConfig::default());
        // 180x180 block in 200x200: 81% of the image
        let gray = textured_block(200, 10, 180);
        let original = RgbImage::new(200, 200);
        let candidate = segmenter
            .segment(&gray, &original)
            .unwrap()
            .expect("watershed should keep a large sample");
        assert_eq!(candidate.confidence, 0.8);
        assert!(candidate.area_px > 0.2 * 200.0 * 200.0, "{}", candidate.area_px);
    }

    #[test]
    fn test_watershed_keeps_regions_below_the_area_floor() {
        let config = SegmentationConfig::default();
        let segmenter = WatershedSegmenter::from_config(&config);
        let gray = textured_block(200, 94, 12);
        let original = RgbImage::new(200, 200);
        let candidate = segmenter
            .segment(&gray, &original)
            .unwrap()
            .expect("watershed should keep a small sample");
        assert!(candidate.area_px > 0.0);
        assert!(candidate.area_px < config.min_area_fraction * 200.0 * 200.0);
        assert!(candidate.confidence > 0.0 && candidate.confidence < 0.8);
    }
}
