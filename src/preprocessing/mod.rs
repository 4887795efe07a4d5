//! # Image Preprocessing Module
//!
//! This module provides the raster primitives and the named variant set shared by
//! perspective correction, grid detection and sample segmentation.
//!
//! The module is organized into focused sub-modules:
//! - `variants`: builds the per-analysis set of grayscale derivatives
//! - `filtering`: smoothing, CLAHE and rectangular morphology
//! - `thresholding`: Otsu and Gaussian-adaptive binarization
//! - `color`: grayscale/HSV conversion and HSV range masks
//! - `types`: shared types and error definitions

pub mod color;
pub mod filtering;
pub mod thresholding;
pub mod types;
pub mod variants;

// Re-export commonly used types and functions for convenience
pub use types::{
    ClaheImageResult, MorphologicalOperation, PreprocessedSet, PreprocessingError,
    PreprocessingVariant, StructuringElement, ThresholdedImageResult,
};

// Re-export main functions from sub-modules
pub use color::{hsv_range_mask, rgb_to_hsv, to_grayscale, HsvRange};
pub use filtering::{
    apply_clahe, apply_morphology, bilateral_filter, dilate, erode, gaussian_blur, median_blur,
    weighted_blend,
};
pub use thresholding::{
    adaptive_gaussian_threshold, apply_otsu_threshold, apply_threshold, median_intensity,
    ThresholdPolarity,
};
pub use variants::ImagePreprocessor;
