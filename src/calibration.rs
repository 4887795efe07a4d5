//! # Calibration Fallback
//!
//! Best-effort pixels-per-mm estimates for images where no grid could be
//! detected: scene-width heuristics, typical capture scenarios, validation of
//! a candidate scale against the implied scene size, and calibration from an
//! object of known size.

use image::RgbImage;
use imageproc::edges::canny;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::config::FallbackConfig;
use crate::errors::{AppError, AppResult};
use crate::geometry::{bounding_box, polygon_area};
use crate::grid::{GridEstimate, GridMethod};
use crate::observability::record_fallback_metrics;
use crate::preprocessing::to_grayscale;
use crate::segmentation::contours::external_contours;

/// Plausibility check of a pixels-per-mm value for a given image size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationValidation {
    pub valid: bool,
    pub confidence: f64,
    pub warnings: Vec<String>,
    pub suggestions: Vec<String>,
    pub scene_width_mm: f64,
    pub scene_height_mm: f64,
}

/// One scored fallback scale.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CalibrationCandidate {
    pub pixels_per_mm: f64,
    pub method: GridMethod,
    pub confidence: f64,
    pub description: String,
    pub validation: Option<CalibrationValidation>,
}

/// Chosen fallback scale plus every candidate that was considered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FallbackCalibration {
    pub pixels_per_mm: f64,
    pub confidence: f64,
    pub method: GridMethod,
    pub warning: String,
    pub candidates: Vec<CalibrationCandidate>,
}

/// Scale derived from a reference object of known size.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObjectCalibration {
    pub pixels_per_mm: f64,
    pub confidence: f64,
    pub method: GridMethod,
    pub object_size_px: u32,
    pub known_object_size_mm: f64,
    pub validation: CalibrationValidation,
}

#[derive(Debug, Clone, Default)]
pub struct CalibrationFallback {
    config: FallbackConfig,
}

impl CalibrationFallback {
    pub fn new(config: FallbackConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &FallbackConfig {
        &self.config
    }

    /// Assumes the image spans one of the typical scene widths and keeps the
    /// ratio closest to the ideal one, or the conservative constant when no
    /// width gives a plausible ratio.
    pub fn estimate_from_scene_width(&self, width: u32) -> CalibrationCandidate {
        let (low, high) = self.config.plausible_range;
        let ideal = self.config.ideal_pixels_per_mm;

        let mut best: Option<(f64, f64)> = None;
        for scene_width in &self.config.typical_scene_widths_mm {
            let pixels_per_mm = width as f64 / scene_width;
            if !(low..=high).contains(&pixels_per_mm) {
                continue;
            }
            let reasonableness = 1.0 - (pixels_per_mm - ideal).abs() / ideal;
            if reasonableness > best.map_or(0.0, |(_, r)| r) {
                best = Some((pixels_per_mm, reasonableness));
            }
        }

        let pixels_per_mm = best.map_or(self.config.conservative_pixels_per_mm, |(ppm, _)| ppm);
        debug!(
            target: "vision_pipeline",
            "Scene-width estimate for width {}: {:.2} px/mm (scene {:.1} mm)",
            width,
            pixels_per_mm,
            width as f64 / pixels_per_mm
        );

        CalibrationCandidate {
            pixels_per_mm,
            method: GridMethod::FallbackEmergencyEstimation,
            confidence: self.config.emergency_confidence,
            description: format!("Emergency calibration: {:.1} pixels/mm", pixels_per_mm),
            validation: None,
        }
    }

    pub fn validate_calibration(&self, pixels_per_mm: f64, dimensions: (u32, u32)) -> CalibrationValidation {
        let (width, height) = dimensions;
        let mut validation = CalibrationValidation {
            valid: false,
            confidence: 0.0,
            warnings: Vec::new(),
            suggestions: Vec::new(),
            scene_width_mm: 0.0,
            scene_height_mm: 0.0,
        };

        if !(pixels_per_mm > 0.0 && pixels_per_mm.is_finite()) {
            validation
                .warnings
                .push(format!("Invalid pixels/mm value: {}", pixels_per_mm));
            return validation;
        }

        let (valid_low, valid_high) = self.config.valid_range;
        if pixels_per_mm < valid_low {
            validation
                .warnings
                .push("Pixels/mm too low - the object may be too far away".to_string());
            validation
                .suggestions
                .push("Move the camera closer to the object".to_string());
        } else if pixels_per_mm > valid_high {
            validation
                .warnings
                .push("Pixels/mm too high - the object may be too close".to_string());
            validation
                .suggestions
                .push("Move the camera away from the object".to_string());
        } else {
            validation.valid = true;
        }

        let (optimal_low, optimal_high) = self.config.optimal_range;
        validation.confidence = if !validation.valid {
            0.0
        } else if (optimal_low..=optimal_high).contains(&pixels_per_mm) {
            1.0
        } else {
            let distance = (pixels_per_mm - optimal_low)
                .abs()
                .min((pixels_per_mm - optimal_high).abs());
            (1.0 - distance / 50.0).max(0.1)
        };

        validation.scene_width_mm = width as f64 / pixels_per_mm;
        validation.scene_height_mm = height as f64 / pixels_per_mm;

        let (w_low, w_high) = self.config.scene_width_range_mm;
        if !(w_low..=w_high).contains(&validation.scene_width_mm) {
            validation.warnings.push(format!(
                "Estimated scene width of {:.1}mm looks unusual",
                validation.scene_width_mm
            ));
        }
        let (h_low, h_high) = self.config.scene_height_range_mm;
        if !(h_low..=h_high).contains(&validation.scene_height_mm) {
            validation.warnings.push(format!(
                "Estimated scene height of {:.1}mm looks unusual",
                validation.scene_height_mm
            ));
        }

        validation
    }

    /// Scores the scene-width estimate and the typical scenarios, keeping the
    /// most confident. Ties keep the earlier candidate.
    pub fn get_fallback_calibration(&self, width: u32, height: u32) -> AppResult<FallbackCalibration> {
        if width == 0 || height == 0 {
            return Err(AppError::Validation(
                "Cannot estimate a calibration for an empty image".to_string(),
            ));
        }

        let mut candidates = vec![self.estimate_from_scene_width(width)];
        for (pixels_per_mm, scenario) in &self.config.typical_scenarios {
            let validation = self.validate_calibration(*pixels_per_mm, (width, height));
            candidates.push(CalibrationCandidate {
                pixels_per_mm: *pixels_per_mm,
                method: GridMethod::FallbackTypicalScenario,
                confidence: validation.confidence,
                description: scenario.clone(),
                validation: Some(validation),
            });
        }

        let best = candidates
            .iter()
            .fold(None::<&CalibrationCandidate>, |best, candidate| match best {
                Some(current) if candidate.confidence <= current.confidence => Some(current),
                _ => Some(candidate),
            })
            .cloned()
            .ok_or_else(|| AppError::Internal("No fallback calibration candidates".to_string()))?;

        info!(
            method = %best.method,
            pixels_per_mm = best.pixels_per_mm,
            confidence = best.confidence,
            candidates = candidates.len(),
            "Fallback calibration selected"
        );

        Ok(FallbackCalibration {
            pixels_per_mm: best.pixels_per_mm,
            confidence: best.confidence,
            method: best.method,
            warning: format!(
                "Using alternative calibration: {:.1} pixels/mm ({})",
                best.pixels_per_mm, best.description
            ),
            candidates,
        })
    }

    /// Image width over an assumed scene width. Always positive.
    pub fn last_resort_estimate(&self, width: u32) -> FallbackCalibration {
        let pixels_per_mm = width.max(1) as f64 / self.config.last_resort_scene_width_mm;
        FallbackCalibration {
            pixels_per_mm,
            confidence: self.config.emergency_confidence,
            method: GridMethod::FallbackImageSize,
            warning: format!(
                "Emergency calibration from image size: {:.2} pixels/mm (assumed {:.0}mm scene width)",
                pixels_per_mm, self.config.last_resort_scene_width_mm
            ),
            candidates: Vec::new(),
        }
    }

    /// Fallback scale that is always defined: the scored fallback, else the last resort.
    pub fn calibrate(&self, width: u32, height: u32) -> FallbackCalibration {
        let calibration = match self.get_fallback_calibration(width, height) {
            Ok(calibration) => calibration,
            Err(e) => {
                warn!(error = %e, "Fallback calibration failed, using image-size estimate");
                self.last_resort_estimate(width)
            }
        };
        record_fallback_metrics(calibration.method.as_str());
        calibration
    }

    /// Scale estimate for the measurement stage. Never marked as detected and
    /// never more confident than the emergency ceiling.
    pub fn to_estimate(&self, calibration: &FallbackCalibration) -> GridEstimate {
        GridEstimate {
            detected: false,
            pixels_per_mm: calibration.pixels_per_mm,
            confidence: calibration.confidence.min(self.config.emergency_confidence),
            method: calibration.method,
            warning: Some(calibration.warning.clone()),
            ..GridEstimate::not_detected()
        }
    }

    /// Calibrates from the largest edge contour, taken to be an object of
    /// `known_object_size_mm` along its longest bounding-box side.
    ///
    /// Returns `None` when no contour is found or the implied scale is invalid.
    pub fn auto_calibrate_with_object(
        &self,
        image: &RgbImage,
        known_object_size_mm: f64,
    ) -> AppResult<Option<ObjectCalibration>> {
        if !(known_object_size_mm > 0.0 && known_object_size_mm.is_finite()) {
            return Err(AppError::Validation(format!(
                "Known object size must be positive, got {}",
                known_object_size_mm
            )));
        }
        if image.width() == 0 || image.height() == 0 {
            return Err(AppError::Validation(
                "Cannot calibrate from an empty image".to_string(),
            ));
        }

        let edges = canny(&to_grayscale(image), 50.0, 150.0);
        let largest = external_contours(&edges)
            .into_iter()
            .max_by(|a, b| polygon_area(a).total_cmp(&polygon_area(b)));
        let Some(bbox) = largest.as_deref().and_then(bounding_box) else {
            debug!(target: "vision_pipeline", "No reference object contour found");
            return Ok(None);
        };

        let object_size_px = bbox.width.max(bbox.height);
        let pixels_per_mm = object_size_px as f64 / known_object_size_mm;
        let validation = self.validate_calibration(pixels_per_mm, image.dimensions());

        if !validation.valid {
            debug!(
                target: "vision_pipeline",
                "Reference object gives implausible scale {:.2} px/mm",
                pixels_per_mm
            );
            return Ok(None);
        }

        Ok(Some(ObjectCalibration {
            pixels_per_mm,
            confidence: validation.confidence,
            method: GridMethod::ObjectReference,
            object_size_px,
            known_object_size_mm,
            validation,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;
    use imageproc::drawing::draw_filled_rect_mut;
    use imageproc::rect::Rect;

    #[test]
    fn test_scene_width_prefers_ratio_near_ideal() {
        let fallback = CalibrationFallback::default();
        // 4000 / 100 = 40 exactly
        let candidate = fallback.estimate_from_scene_width(4000);
        assert_eq!(candidate.pixels_per_mm, 40.0);
        assert_eq!(candidate.method, GridMethod::FallbackEmergencyEstimation);
        assert_eq!(candidate.confidence, 0.3);
    }

    #[test]
    fn test_scene_width_uses_conservative_constant_for_small_images() {
        let fallback = CalibrationFallback::default();
        // 800 px gives at most 8 px/mm, below the plausible band
        let candidate = fallback.estimate_from_scene_width(800);
        assert_eq!(candidate.pixels_per_mm, 30.0);
    }

    #[test]
    fn test_validate_calibration_bands() {
        let fallback = CalibrationFallback::default();

        let optimal = fallback.validate_calibration(40.0, (4000, 3000));
        assert!(optimal.valid);
        assert_eq!(optimal.confidence, 1.0);
        assert!(optimal.warnings.is_empty());
        assert_eq!(optimal.scene_width_mm, 100.0);

        let low = fallback.validate_calibration(10.0, (4000, 3000));
        assert!(low.valid);
        assert!((low.confidence - 0.8).abs() < 1e-9);

        let far = fallback.validate_calibration(180.0, (4000, 3000));
        assert!(far.valid);
        assert_eq!(far.confidence, 0.1);

        let too_low = fallback.validate_calibration(2.0, (800, 600));
        assert!(!too_low.valid);
        assert_eq!(too_low.confidence, 0.0);
        assert_eq!(too_low.suggestions.len(), 1);

        let too_high = fallback.validate_calibration(250.0, (800, 600));
        assert!(!too_high.valid);
        assert!(too_high.warnings[0].contains("too high"));
    }

    #[test]
    fn test_validate_calibration_flags_unusual_scene() {
        let fallback = CalibrationFallback::default();
        // 800 px at 40 px/mm is a 20 mm scene
        let validation = fallback.validate_calibration(40.0, (800, 600));
        assert!(validation.valid);
        assert_eq!(validation.warnings.len(), 2);
    }

    #[test]
    fn test_fallback_picks_most_confident_candidate() {
        let fallback = CalibrationFallback::default();
        let calibration = fallback.get_fallback_calibration(800, 600).unwrap();
        // Emergency candidate is 30 px/mm at 0.3; the first typical scenario scores 1.0
        assert_eq!(calibration.pixels_per_mm, 25.0);
        assert_eq!(calibration.confidence, 1.0);
        assert_eq!(calibration.method, GridMethod::FallbackTypicalScenario);
        assert_eq!(calibration.candidates.len(), 4);
        assert!(calibration.warning.starts_with("Using alternative calibration: 25.0 pixels/mm"));
    }

    #[test]
    fn test_fallback_estimate_is_capped_and_flagged() {
        let fallback = CalibrationFallback::default();
        let calibration = fallback.calibrate(800, 600);
        let estimate = fallback.to_estimate(&calibration);
        assert!(!estimate.detected);
        assert!(estimate.has_scale());
        assert_eq!(estimate.confidence, 0.3);
        assert!(estimate.method.is_fallback());
        assert!(estimate.warning.is_some());
    }

    #[test]
    fn test_empty_image_uses_last_resort() {
        let fallback = CalibrationFallback::default();
        assert!(fallback.get_fallback_calibration(0, 10).is_err());
        let calibration = fallback.calibrate(0, 10);
        assert_eq!(calibration.method, GridMethod::FallbackImageSize);
        assert!(calibration.pixels_per_mm > 0.0);

        let sized = fallback.last_resort_estimate(1000);
        assert_eq!(sized.pixels_per_mm, 5.0);
    }

    #[test]
    fn test_object_calibration() {
        let fallback = CalibrationFallback::default();
        let mut image = RgbImage::from_pixel(1000, 800, Rgb([255, 255, 255]));
        // 150 px dark square standing in for a 15 mm reference card
        draw_filled_rect_mut(&mut image, Rect::at(300, 300).of_size(150, 150), Rgb([20, 20, 20]));

        let calibration = fallback
            .auto_calibrate_with_object(&image, 15.0)
            .unwrap()
            .unwrap();
        assert_eq!(calibration.method, GridMethod::ObjectReference);
        assert!((calibration.pixels_per_mm - 10.0).abs() < 0.3, "{}", calibration.pixels_per_mm);
        assert!(calibration.validation.valid);
    }

    #[test]
    fn test_object_calibration_without_object() {
        let fallback = CalibrationFallback::default();
        let blank = RgbImage::from_pixel(200, 200, Rgb([255, 255, 255]));
        assert_eq!(fallback.auto_calibrate_with_object(&blank, 20.0).unwrap(), None);
        assert!(fallback.auto_calibrate_with_object(&blank, 0.0).is_err());
    }
}
