//! # Application Error Types
//!
//! This module defines common error types used throughout the biopsy vision pipeline.
//! It provides structured error handling for configuration, input validation and
//! the individual image processing stages.

use std::fmt;

/// General application error type for consistent error handling
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// Configuration validation errors
    Config(String),
    /// Input validation errors (undecodable or undersized images, bad parameters)
    Validation(String),
    /// Image processing stage errors
    Processing(String),
    /// Result or overlay encoding errors
    Encoding(String),
    /// Internal application errors
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Config(msg) => write!(f, "[CONFIG] {}", msg),
            AppError::Validation(msg) => write!(f, "[VALIDATION] {}", msg),
            AppError::Processing(msg) => write!(f, "[PROCESSING] {}", msg),
            AppError::Encoding(msg) => write!(f, "[ENCODING] {}", msg),
            AppError::Internal(msg) => write!(f, "[INTERNAL] {}", msg),
        }
    }
}

impl std::error::Error for AppError {}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

impl From<image::ImageError> for AppError {
    fn from(err: image::ImageError) -> Self {
        AppError::Encoding(err.to_string())
    }
}

impl From<crate::preprocessing::PreprocessingError> for AppError {
    fn from(err: crate::preprocessing::PreprocessingError) -> Self {
        AppError::Processing(err.to_string())
    }
}

/// Result type alias for convenience
pub type AppResult<T> = Result<T, AppError>;

/// Standardized error logging utilities for consistent error reporting across the pipeline
pub mod error_logging {
    use tracing::error;

    /// Log a failed analysis stage with image context
    pub fn log_stage_error(
        error: &impl std::fmt::Display,
        stage: &str,
        operation: &str,
        image_dimensions: Option<(u32, u32)>,
    ) {
        error!(
            error = %error,
            stage = %stage,
            operation = %operation,
            image_width = ?image_dimensions.map(|d| d.0),
            image_height = ?image_dimensions.map(|d| d.1),
            "Analysis stage failed"
        );
    }

    /// Log a failed detector or segmentation strategy
    pub fn log_strategy_error(
        error: &impl std::fmt::Display,
        strategy: &str,
        variant: Option<&str>,
        processing_duration: Option<std::time::Duration>,
    ) {
        error!(
            error = %error,
            strategy = %strategy,
            variant = ?variant,
            processing_duration_ms = ?processing_duration.map(|d| d.as_millis()),
            "Vision strategy failed"
        );
    }

    /// Log input validation errors
    pub fn log_validation_error(
        error: &impl std::fmt::Display,
        operation: &str,
        input_type: &str,
        input_size: Option<usize>,
    ) {
        error!(
            error = %error,
            operation = %operation,
            input_type = %input_type,
            input_size_bytes = ?input_size,
            "Validation failed"
        );
    }

    /// Log encoding errors for results and overlays
    pub fn log_encoding_error(error: &impl std::fmt::Display, operation: &str, format: &str) {
        error!(
            error = %error,
            operation = %operation,
            format = %format,
            "Encoding failed"
        );
    }

    /// Log configuration errors during startup/initialization
    pub fn log_config_error(error: &impl std::fmt::Display, config_key: &str, operation: &str) {
        error!(
            error = %error,
            config_key = %config_key,
            operation = %operation,
            "Configuration error"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_prefixes() {
        assert_eq!(
            AppError::Validation("empty image".to_string()).to_string(),
            "[VALIDATION] empty image"
        );
        assert_eq!(
            AppError::Processing("hough failed".to_string()).to_string(),
            "[PROCESSING] hough failed"
        );
        assert!(AppError::Encoding("x".into()).to_string().starts_with("[ENCODING]"));
    }

    #[test]
    fn test_from_anyhow_maps_to_internal() {
        let err: AppError = anyhow::anyhow!("boom").into();
        assert_eq!(err, AppError::Internal("boom".to_string()));
    }

    #[test]
    fn test_from_preprocessing_error() {
        let err: AppError = crate::preprocessing::PreprocessingError::EmptyImage.into();
        assert!(matches!(err, AppError::Processing(_)));
    }
}
