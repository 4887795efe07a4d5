//! # Shared Types for Image Preprocessing
//!
//! This module contains all the shared types, structs, and enums used across
//! the preprocessing sub-modules.

use image::GrayImage;

/// Errors that can occur during image preprocessing operations.
#[derive(Debug, Clone)]
pub enum PreprocessingError {
    /// Image has a zero dimension
    EmptyImage,
    /// A filter or threshold parameter is out of range
    InvalidParameter { name: &'static str, value: String },
    /// Image processing operation failed
    ProcessingFailed { message: String },
}

impl std::fmt::Display for PreprocessingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PreprocessingError::EmptyImage => {
                write!(f, "Image has zero width or height")
            }
            PreprocessingError::InvalidParameter { name, value } => {
                write!(f, "Invalid {}: {}", name, value)
            }
            PreprocessingError::ProcessingFailed { message } => {
                write!(f, "Image processing failed: {}", message)
            }
        }
    }
}

impl std::error::Error for PreprocessingError {}

/// Result of image thresholding operation.
#[derive(Debug, Clone)]
pub struct ThresholdedImageResult {
    /// The thresholded binary image
    pub image: GrayImage,
    /// Optimal threshold value found by Otsu's method
    pub threshold: u8,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Result of CLAHE contrast enhancement operation.
#[derive(Debug, Clone)]
pub struct ClaheImageResult {
    /// The contrast-enhanced image
    pub image: GrayImage,
    /// Clip limit used for histogram clipping
    pub clip_limit: f32,
    /// Number of tiles along each axis
    pub tile_grid: (u32, u32),
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

/// Types of morphological operations.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum MorphologicalOperation {
    /// Erosion operation (shrinks bright regions)
    Erosion,
    /// Dilation operation (expands bright regions)
    Dilation,
    /// Opening operation (erosion followed by dilation - removes noise)
    Opening,
    /// Closing operation (dilation followed by erosion - fills gaps)
    Closing,
    /// Dilation minus erosion, highlights region boundaries
    Gradient,
}

/// Rectangular structuring element, anchored at its centre.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StructuringElement {
    pub width: u32,
    pub height: u32,
}

impl StructuringElement {
    pub const fn rect(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub const fn square(size: u32) -> Self {
        Self::rect(size, size)
    }
}

/// Named derivative produced by the preprocessor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PreprocessingVariant {
    Gray,
    Enhanced,
    Bilateral,
    Gaussian,
    MorphClosed,
    Combined,
}

impl PreprocessingVariant {
    /// Every variant in production order.
    pub const ALL: [PreprocessingVariant; 6] = [
        PreprocessingVariant::Gray,
        PreprocessingVariant::Enhanced,
        PreprocessingVariant::Bilateral,
        PreprocessingVariant::Gaussian,
        PreprocessingVariant::MorphClosed,
        PreprocessingVariant::Combined,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PreprocessingVariant::Gray => "gray",
            PreprocessingVariant::Enhanced => "enhanced",
            PreprocessingVariant::Bilateral => "bilateral",
            PreprocessingVariant::Gaussian => "gaussian",
            PreprocessingVariant::MorphClosed => "morph_closed",
            PreprocessingVariant::Combined => "combined",
        }
    }
}

impl std::fmt::Display for PreprocessingVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The set of grayscale derivatives built once per analysed image.
///
/// Variants are stored in production order and are read-only once built.
#[derive(Debug, Clone)]
pub struct PreprocessedSet {
    variants: Vec<(PreprocessingVariant, GrayImage)>,
    /// Processing time in milliseconds
    pub processing_time_ms: u32,
}

impl PreprocessedSet {
    pub fn new(variants: Vec<(PreprocessingVariant, GrayImage)>, processing_time_ms: u32) -> Self {
        Self {
            variants,
            processing_time_ms,
        }
    }

    pub fn get(&self, variant: PreprocessingVariant) -> Option<&GrayImage> {
        self.variants
            .iter()
            .find(|(v, _)| *v == variant)
            .map(|(_, img)| img)
    }

    /// Image the grid detectors run on: the enhanced variant, else plain gray.
    pub fn grid_source(&self) -> Option<&GrayImage> {
        self.get(PreprocessingVariant::Enhanced)
            .or_else(|| self.get(PreprocessingVariant::Gray))
    }

    pub fn iter(&self) -> impl Iterator<Item = (PreprocessingVariant, &GrayImage)> {
        self.variants.iter().map(|(v, img)| (*v, img))
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.variants.iter().map(|(v, _)| v.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.variants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.variants.is_empty()
    }
}
