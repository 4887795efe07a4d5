//! # Pipeline Integration Tests
//!
//! End-to-end behaviour of the analysis pipeline on synthetic images:
//! calibration accuracy, measurement accuracy, graceful degradation and
//! result serialisation.

#[cfg(test)]
mod tests {
    use biopsy_vision::analysis::{
        analyze_biopsy_complete, detect_grid_only, segment_biopsy_only, test_vision_pipeline,
    };
    use biopsy_vision::geometry::Contour;
    use biopsy_vision::grid::detect_grid_advanced;
    use biopsy_vision::measurement::calculate_measurements;
    use biopsy_vision::perspective::PerspectiveCorrector;
    use biopsy_vision::report::AnalysisResult;
    use biopsy_vision::segmentation::segment_biopsy;
    use biopsy_vision::synthetic::{
        create_noise_image, create_synthetic_image, create_synthetic_test_image,
        SyntheticImageOptions,
    };
    use image::{Rgb, RgbImage};
    use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

    const GRID_SIZE_MM: f64 = 10.0;

    #[test]
    fn test_synthetic_grid_scale_within_tolerance() {
        let options = SyntheticImageOptions::default();
        let image = create_synthetic_test_image();
        let estimate = detect_grid_advanced(&image, GRID_SIZE_MM).unwrap();

        let expected = options.expected_pixels_per_mm(GRID_SIZE_MM);
        assert!(estimate.detected);
        assert!(estimate.pixels_per_mm > 0.0);
        assert!(
            (estimate.pixels_per_mm - expected).abs() / expected <= 0.15,
            "pixels_per_mm = {}",
            estimate.pixels_per_mm
        );
        assert!((0.0..=1.0).contains(&estimate.confidence));
    }

    #[test]
    fn test_synthetic_ellipse_aspect_ratio_within_tolerance() {
        let options = SyntheticImageOptions::default();
        let image = create_synthetic_test_image();
        let segmentation = segment_biopsy(&image).unwrap();
        assert!(segmentation.detected);

        let contour: Contour = segmentation.contour.unwrap();
        let measurements = calculate_measurements(&contour, 4.0).unwrap().unwrap();
        let expected = options.expected_aspect_ratio();
        assert!(
            (measurements.aspect_ratio - expected).abs() / expected <= 0.10,
            "aspect_ratio = {}",
            measurements.aspect_ratio
        );
    }

    #[test]
    fn test_complete_analysis_on_synthetic_image() {
        let image = create_synthetic_test_image();
        let result = analyze_biopsy_complete(&image, GRID_SIZE_MM, None).unwrap();

        assert!(result.success);
        assert!(result.grid_detection.grid_detected);
        assert!(result.biopsy_segmentation.detected);
        assert!(!result.manual_measurement_available);
        assert!(result.measurements.area_mm2 > 0.0);
        assert!(result.overlay_image.is_some());
        assert!((0.0..=1.0).contains(&result.confidence_overall));
        assert_eq!(result.image_info.width, 800);

        // 80 x 60 px semi-axes at 4 px/mm
        let expected_area = std::f64::consts::PI * 20.0 * 15.0;
        assert!(
            (result.measurements.area_mm2 - expected_area).abs() / expected_area < 0.15,
            "area = {}",
            result.measurements.area_mm2
        );
    }

    #[test]
    fn test_blank_image_still_succeeds() {
        let image = RgbImage::from_pixel(640, 480, Rgb([255, 255, 255]));
        let grid = detect_grid_advanced(&image, GRID_SIZE_MM).unwrap();
        assert!(!grid.detected);

        let result = analyze_biopsy_complete(&image, GRID_SIZE_MM, None).unwrap();
        assert!(result.success);
        assert!(!result.grid_detection.grid_detected);
        assert!(result.grid_detection.pixels_per_mm > 0.0);
        assert!(result.grid_detection.confidence <= 0.3);
        assert!(!result.warnings.is_empty());
        assert!(result.manual_measurement_available);
        assert_eq!(result.measurements.area_mm2, 0.0);
    }

    #[test]
    fn test_manual_calibration_skips_grid_detection() {
        let image = create_synthetic_test_image();
        let result = analyze_biopsy_complete(&image, GRID_SIZE_MM, Some(7.5)).unwrap();

        assert_eq!(result.grid_detection.method, "manual_calibration");
        assert_eq!(result.grid_detection.confidence, 0.9);
        assert_eq!(result.grid_detection.pixels_per_mm, 7.5);
        assert!(!result.grid_detection.grid_detected);
        assert!(result.grid_detection.perspective.is_none());
        assert_eq!(result.measurements.pixels_per_mm, 7.5);
    }

    #[test]
    fn test_noise_image_still_succeeds() {
        let image = create_noise_image(240, 180, 3);
        let result = analyze_biopsy_complete(&image, GRID_SIZE_MM, None).unwrap();
        assert!(result.success);
        assert!(result.grid_detection.pixels_per_mm > 0.0);
        assert!(result.confidence_overall.is_finite());
        assert!(result.to_json().is_ok());
    }

    #[test]
    fn test_result_json_round_trip() {
        let image = create_synthetic_test_image();
        let result = analyze_biopsy_complete(&image, GRID_SIZE_MM, None).unwrap();

        let json = result.to_json().unwrap();
        let decoded = AnalysisResult::from_json(&json).unwrap();
        assert_eq!(decoded, result);

        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert!(value["biopsy_segmentation"].get("contour").is_none());
        assert!(value["measurements"]["area_mm2"].is_f64());
    }

    #[test]
    fn test_perspective_correction_is_monotonic() {
        let corrector = PerspectiveCorrector::default();
        let aligned = create_synthetic_test_image();
        let (_, info) = corrector.auto_correct_perspective(&aligned);
        assert!(!info.corrected);

        let skewed = rotate_about_center(
            &aligned,
            20f32.to_radians(),
            Interpolation::Bilinear,
            Rgb([255, 255, 255]),
        );
        let (_, info) = corrector.auto_correct_perspective(&skewed);
        if info.corrected {
            let corrected_quality = info.corrected_quality.unwrap();
            assert!(corrected_quality > info.original_quality);
        }
    }

    #[test]
    fn test_grid_only_and_segmentation_only() {
        let image = create_synthetic_test_image();

        let grid = detect_grid_only(&image, GRID_SIZE_MM).unwrap();
        assert!(grid.success);
        assert!(grid.grid_detection.grid_detected);
        assert!(grid.grid_detection.horizontal_lines > 0);

        let segmentation = segment_biopsy_only(&image).unwrap();
        assert!(segmentation.success);
        assert!(segmentation.biopsy_segmentation.detected);
        assert!(segmentation.overlay_image.is_some());
    }

    #[test]
    fn test_denser_grid_scales_proportionally() {
        let options = SyntheticImageOptions {
            grid_spacing_px: 30,
            ..SyntheticImageOptions::default()
        };
        let image = create_synthetic_image(&options);
        let estimate = detect_grid_advanced(&image, GRID_SIZE_MM).unwrap();
        let expected = options.expected_pixels_per_mm(GRID_SIZE_MM);
        assert!(estimate.detected);
        assert!((estimate.pixels_per_mm - expected).abs() / expected <= 0.15);
    }

    /// Thin light lines and per-channel noise make the grid faint and the
    /// tissue edge ragged.
    #[test]
    fn test_faint_noisy_grid_still_calibrates_and_segments() {
        let options = SyntheticImageOptions {
            line_width: 1,
            line_gray: 200,
            noise_amplitude: 17,
            ..SyntheticImageOptions::default()
        };
        let image = create_synthetic_image(&options);
        let result = analyze_biopsy_complete(&image, GRID_SIZE_MM, None).unwrap();

        let expected_ppm = options.expected_pixels_per_mm(GRID_SIZE_MM);
        assert!(result.success);
        assert!(result.grid_detection.grid_detected, "{:?}", result.warnings);
        assert!(
            (result.grid_detection.pixels_per_mm - expected_ppm).abs() / expected_ppm <= 0.15,
            "pixels_per_mm = {}",
            result.grid_detection.pixels_per_mm
        );

        assert!(result.biopsy_segmentation.detected);
        let expected_aspect = options.expected_aspect_ratio();
        assert!(
            (result.measurements.aspect_ratio - expected_aspect).abs() / expected_aspect <= 0.15,
            "aspect_ratio = {}",
            result.measurements.aspect_ratio
        );
    }

    #[test]
    fn test_pipeline_self_test_passes() {
        let report = test_vision_pipeline().unwrap();
        assert!(report.passed, "{:?}", report.checks);
        assert_eq!(report.expected_pixels_per_mm, 4.0);
        assert_eq!(report.checks.len(), 4);
    }
}
