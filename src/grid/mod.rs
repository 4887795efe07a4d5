//! # Grid Detection
//!
//! Recovers the pixels-per-mm scale from a printed reference grid using
//! competing line detectors and tiered confidence acceptance.

pub mod detector;
pub mod frequency;
pub mod hough;
pub mod lines;
pub mod morphological;
pub mod relaxed;
pub mod types;

pub use detector::{detect_grid_advanced, GridDetector};
pub use frequency::FrequencyGridDetector;
pub use hough::HoughGridDetector;
pub use morphological::MorphologicalGridDetector;
pub use relaxed::RelaxedHoughDetector;
pub use types::{GridCandidate, GridEstimate, GridLines, GridMethod, GridStrategy};
