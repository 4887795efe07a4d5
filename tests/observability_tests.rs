//! # Observability Tests Module
//!
//! Metrics recording, span helpers and configuration presets of the
//! observability layer. Recording functions must be safe to call without an
//! installed recorder or subscriber.

#[cfg(test)]
mod tests {
    use biopsy_vision::observability;
    use biopsy_vision::observability_config::{presets, ObservabilityConfig};
    use std::time::Duration;

    /// Test that metrics recording functions work without a recorder
    #[test]
    fn test_metrics_recording() {
        observability::record_analysis_metrics(true, Duration::from_millis(850), 800 * 600);
        observability::record_analysis_metrics(false, Duration::ZERO, 0);
        observability::record_stage_metrics("grid_detection", Duration::from_millis(120));
        observability::record_grid_detection_metrics("hough", true, 0.82);
        observability::record_segmentation_metrics("watershed", false, 0.0);
        observability::record_perspective_metrics(false, 100.0);
        observability::record_fallback_metrics("fallback_typical_scenario");
        observability::record_error_metrics("processing", "segmentation");
    }

    /// Test trace span creation
    #[test]
    fn test_span_creation() {
        let stage = observability::stage_span("segmentation");
        assert_eq!(stage.metadata().unwrap().name(), "analysis_stage");

        let strategy = observability::strategy_span("adaptive_threshold", Some("morph_closed"));
        let _enter_stage = stage.enter();
        let _enter_strategy = strategy.enter();
    }

    /// Test structured logging output format
    #[test]
    fn test_structured_logging_output() {
        use tracing::{debug, error, info, warn};

        debug!(target: "vision_pipeline", "Debug message from a raster stage");
        info!(stage = "grid_detection", duration_ms = 150, "Info message");
        warn!(stage = "grid_detection", method = "fallback_typical_scenario", "Warning message");
        error!(stage = "overlay", error = "encoding failed", "Error message");
    }

    #[test]
    fn test_presets_are_valid() {
        for config in [presets::development(), presets::production(), presets::minimal()] {
            assert!(config.validate().is_ok(), "{:?}", config);
        }
        assert!(presets::development().use_pretty_logs());
        assert!(!presets::production().use_pretty_logs());
        assert!(!presets::minimal().enable_metrics);
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = ObservabilityConfig {
            environment: " ".to_string(),
            ..ObservabilityConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(observability::init_observability_with_config(&config).is_err());
    }
}
