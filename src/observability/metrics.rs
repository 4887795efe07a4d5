//! Metrics collection module.
//!
//! This module provides:
//! - Prometheus recorder installation for the command line tool
//! - Recording functions for every pipeline stage

use anyhow::Result;
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::time::Duration;

use crate::observability_config::ObservabilityConfig;

/// Install the Prometheus recorder when metrics are enabled.
///
/// The returned handle renders the text exposition format; the CLI prints it on demand.
pub fn init_metrics_with_config(config: &ObservabilityConfig) -> Result<Option<PrometheusHandle>> {
    if !config.enable_metrics {
        tracing::info!("Metrics collection disabled");
        return Ok(None);
    }

    let handle = PrometheusBuilder::new().install_recorder()?;

    tracing::info!(
        metrics_enabled = %config.enable_metrics,
        "Metrics collection initialized"
    );
    Ok(Some(handle))
}

/// Record the outcome of a full analysis
pub fn record_analysis_metrics(success: bool, duration: Duration, image_pixels: u64) {
    metrics::counter!("analyses_total", "result" => if success { "success" } else { "failure" })
        .increment(1);
    metrics::histogram!("analysis_duration_seconds").record(duration.as_secs_f64());
    metrics::histogram!("analysis_image_pixels").record(image_pixels as f64);

    let ops_per_sec = if duration.as_secs_f64() > 0.0 {
        1.0 / duration.as_secs_f64()
    } else {
        0.0
    };
    metrics::histogram!("analysis_throughput_ops_per_sec").record(ops_per_sec);
}

/// Record the duration of one pipeline stage
pub fn record_stage_metrics(stage: &str, duration: Duration) {
    let stage = stage.to_string();
    metrics::histogram!("stage_duration_seconds", "stage" => stage).record(duration.as_secs_f64());
}

/// Record the grid detection outcome
pub fn record_grid_detection_metrics(method: &str, detected: bool, confidence: f64) {
    let method = method.to_string();
    metrics::counter!(
        "grid_detections_total",
        "method" => method.clone(),
        "result" => if detected { "detected" } else { "not_detected" }
    )
    .increment(1);
    metrics::histogram!("grid_detection_confidence", "method" => method).record(confidence);
}

/// Record the segmentation outcome
pub fn record_segmentation_metrics(method: &str, detected: bool, confidence: f64) {
    let method = method.to_string();
    metrics::counter!(
        "segmentations_total",
        "method" => method.clone(),
        "result" => if detected { "detected" } else { "not_detected" }
    )
    .increment(1);
    metrics::histogram!("segmentation_confidence", "method" => method).record(confidence);
}

/// Record whether perspective correction was applied
pub fn record_perspective_metrics(applied: bool, quality: f64) {
    metrics::counter!(
        "perspective_checks_total",
        "corrected" => if applied { "true" } else { "false" }
    )
    .increment(1);
    metrics::histogram!("perspective_quality_score").record(quality);
}

/// Record a calibration fallback
pub fn record_fallback_metrics(method: &str) {
    let method = method.to_string();
    metrics::counter!("calibration_fallbacks_total", "method" => method).increment(1);
}

/// Record error metrics
pub fn record_error_metrics(error_type: &str, component: &str) {
    let error_type = error_type.to_string();
    let component = component.to_string();
    metrics::counter!("errors_total", "type" => error_type, "component" => component).increment(1);
}
