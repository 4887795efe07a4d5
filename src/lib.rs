//! # Biopsy Vision
//!
//! Calibrated measurement of tissue samples photographed on a printed
//! reference grid. The pipeline recovers a pixels-per-millimeter scale from
//! the grid (or estimates one when no grid is visible), isolates the sample
//! contour and reports its physical dimensions and shape descriptors together
//! with an annotated overlay.

pub mod analysis;
pub mod calibration;
pub mod config;
pub mod errors;
pub mod geometry;
pub mod grid;
pub mod measurement;
pub mod observability;
pub mod observability_config;
pub mod overlay;
pub mod perspective;
pub mod preprocessing;
pub mod report;
pub mod segmentation;
pub mod synthetic;

// Re-export types for easier access
pub use analysis::{
    analyze_biopsy_complete, decode_image, detect_grid_only, processing_methods,
    segment_biopsy_only, test_vision_pipeline, AnalysisOrchestrator,
};
pub use calibration::CalibrationFallback;
pub use config::AppConfig;
pub use errors::{AppError, AppResult};
pub use grid::{detect_grid_advanced, GridDetector, GridEstimate, GridMethod};
pub use measurement::{calculate_measurements, Measurements};
pub use perspective::PerspectiveCorrector;
pub use preprocessing::ImagePreprocessor;
pub use report::AnalysisResult;
pub use segmentation::{segment_biopsy, BiopsySegmenter, SegmentationResult};
pub use synthetic::create_synthetic_test_image;
