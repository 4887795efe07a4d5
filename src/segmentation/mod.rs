//! # Biopsy Segmentation
//!
//! Isolates the tissue sample contour with competing strategies over the
//! preprocessed variants.

pub mod adaptive;
pub mod color;
pub mod contours;
pub mod edge;
pub mod segmenter;
pub mod types;
pub mod watershed;

pub use adaptive::AdaptiveThresholdSegmenter;
pub use color::ColorSegmenter;
pub use edge::EdgeSegmenter;
pub use segmenter::{segment_biopsy, BiopsySegmenter};
pub use types::{SegmentCandidate, SegmentationMethod, SegmentationResult, SegmentationStrategy};
pub use watershed::WatershedSegmenter;
