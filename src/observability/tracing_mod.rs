//! Tracing and logging setup module.
//!
//! This module provides:
//! - Structured logging configuration
//! - Tracing span creation utilities for pipeline stages

use anyhow::Result;
use tracing_subscriber::prelude::*;

use crate::observability_config::ObservabilityConfig;

/// Initialize structured logging with tracing and configuration
pub fn init_tracing_with_config(config: &ObservabilityConfig) -> Result<()> {
    // Create the filter based on configuration
    let mut filter = tracing_subscriber::EnvFilter::from_default_env()
        .add_directive(format!("biopsy_vision={}", config.log_level).parse()?)
        .add_directive(format!("vision_pipeline={}", config.log_level).parse()?);

    // Per-stage override for the detector internals
    if let Ok(pipeline_log) = std::env::var("PIPELINE_LOG_LEVEL") {
        filter = filter.add_directive(format!("vision_pipeline={}", pipeline_log).parse()?);
    }

    // Pretty for development, JSON for everything else
    if config.use_pretty_logs() {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .pretty()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_thread_names(false),
            )
            .try_init()?;
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr)
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_thread_names(true),
            )
            .try_init()?;
    }

    tracing::info!(
        environment = %config.environment,
        log_level = %config.log_level,
        tags = ?config.get_tags(),
        "Tracing initialized with structured logging"
    );
    Ok(())
}

/// Create a span for a top-level pipeline stage
pub fn stage_span(stage: &str) -> tracing::Span {
    tracing::info_span!("analysis_stage", stage = stage, component = "vision")
}

/// Create a span for one detection or segmentation strategy run
pub fn strategy_span(strategy: &str, variant: Option<&str>) -> tracing::Span {
    tracing::debug_span!(
        "analysis_strategy",
        strategy = strategy,
        variant = variant,
        component = "vision"
    )
}
