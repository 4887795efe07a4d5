//! Observability module for centralized metrics, tracing, and logging setup.
//!
//! This module provides:
//! - Structured logging with configurable levels and formats
//! - Metrics collection with an optional Prometheus recorder
//! - Span helpers for pipeline stages and strategies
//! - Environment-specific configuration support

pub mod metrics;
pub mod tracing_mod;

use anyhow::Result;
use metrics_exporter_prometheus::PrometheusHandle;

use crate::observability_config::ObservabilityConfig;

pub use self::metrics::{
    init_metrics_with_config, record_analysis_metrics, record_error_metrics,
    record_fallback_metrics, record_grid_detection_metrics, record_perspective_metrics,
    record_segmentation_metrics, record_stage_metrics,
};
pub use self::tracing_mod::{init_tracing_with_config, stage_span, strategy_span};

/// Initialize the complete observability stack
pub fn init_observability() -> Result<Option<PrometheusHandle>> {
    let config = ObservabilityConfig::from_env();
    init_observability_with_config(&config)
}

/// Initialize the complete observability stack with custom configuration
pub fn init_observability_with_config(
    config: &ObservabilityConfig,
) -> Result<Option<PrometheusHandle>> {
    // Validate configuration
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Invalid observability configuration: {}", e))?;

    // Initialize tracing first
    init_tracing_with_config(config)?;

    // Initialize metrics
    let metrics_handle = init_metrics_with_config(config)?;

    tracing::info!(
        environment = %config.environment,
        metrics_enabled = %config.enable_metrics,
        stage_spans = %config.enable_stage_spans,
        "Observability stack initialized successfully"
    );
    Ok(metrics_handle)
}
