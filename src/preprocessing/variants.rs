//! # Preprocessed Variant Builder
//!
//! Builds the named set of grayscale derivatives every detector draws from:
//! plain luma, CLAHE-enhanced, bilateral, Gaussian, morphologically closed and a
//! bilateral/closed blend. The input raster is only read.

use image::{GrayImage, RgbImage};
use tracing;

use super::color::to_grayscale;
use super::filtering::{apply_clahe, apply_morphology, bilateral_filter, gaussian_blur, weighted_blend};
use super::types::{
    MorphologicalOperation, PreprocessedSet, PreprocessingError, PreprocessingVariant,
    StructuringElement,
};
use crate::config::PreprocessingConfig;

/// Produces the per-analysis [`PreprocessedSet`].
#[derive(Debug, Clone, Default)]
pub struct ImagePreprocessor {
    config: PreprocessingConfig,
}

impl ImagePreprocessor {
    pub fn new(config: PreprocessingConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PreprocessingConfig {
        &self.config
    }

    /// Builds every variant in [`PreprocessingVariant::ALL`] order.
    pub fn preprocess_image(&self, image: &RgbImage) -> Result<PreprocessedSet, PreprocessingError> {
        let start_time = std::time::Instant::now();

        if image.width() == 0 || image.height() == 0 {
            return Err(PreprocessingError::EmptyImage);
        }

        let gray = to_grayscale(image);
        let enhanced = self.enhance(&gray)?;
        let bilateral = bilateral_filter(
            &enhanced,
            self.config.bilateral_diameter,
            self.config.bilateral_sigma_color,
            self.config.bilateral_sigma_space,
        )?;
        let gaussian = gaussian_blur(&enhanced, self.config.gaussian_kernel_size)?;
        let morph_closed = apply_morphology(
            &enhanced,
            MorphologicalOperation::Closing,
            StructuringElement::square(self.config.closing_kernel_size),
            1,
        );
        let weight = self.config.combined_bilateral_weight;
        let combined = weighted_blend(&bilateral, weight, &morph_closed, 1.0 - weight)?;

        let processing_time = start_time.elapsed();

        tracing::debug!(
            target: "vision_pipeline",
            "Preprocessing completed in {}ms: {} variants, dimensions={}x{}",
            processing_time.as_millis(),
            PreprocessingVariant::ALL.len(),
            image.width(),
            image.height()
        );

        Ok(PreprocessedSet::new(
            vec![
                (PreprocessingVariant::Gray, gray),
                (PreprocessingVariant::Enhanced, enhanced),
                (PreprocessingVariant::Bilateral, bilateral),
                (PreprocessingVariant::Gaussian, gaussian),
                (PreprocessingVariant::MorphClosed, morph_closed),
                (PreprocessingVariant::Combined, combined),
            ],
            processing_time.as_millis() as u32,
        ))
    }

    /// CLAHE enhancement alone, used when only the grid source is needed.
    pub fn enhance(&self, gray: &GrayImage) -> Result<GrayImage, PreprocessingError> {
        let result = apply_clahe(gray, self.config.clahe_clip_limit, self.config.clahe_tile_grid)?;
        Ok(result.image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgb;

    fn create_test_image() -> RgbImage {
        RgbImage::from_fn(64, 48, |x, y| {
            if x % 16 == 0 || y % 16 == 0 {
                Rgb([120, 120, 120])
            } else {
                Rgb([240, 240, 240])
            }
        })
    }

    #[test]
    fn test_preprocess_produces_all_variants_in_order() {
        let preprocessor = ImagePreprocessor::default();
        let set = preprocessor.preprocess_image(&create_test_image()).unwrap();

        assert_eq!(
            set.names(),
            vec!["gray", "enhanced", "bilateral", "gaussian", "morph_closed", "combined"]
        );
        for (_, img) in set.iter() {
            assert_eq!(img.dimensions(), (64, 48));
        }
    }

    #[test]
    fn test_preprocess_is_deterministic() {
        let preprocessor = ImagePreprocessor::default();
        let image = create_test_image();
        let a = preprocessor.preprocess_image(&image).unwrap();
        let b = preprocessor.preprocess_image(&image).unwrap();
        for variant in PreprocessingVariant::ALL {
            assert_eq!(a.get(variant), b.get(variant), "variant {}", variant);
        }
    }

    #[test]
    fn test_closing_erases_thin_dark_lines() {
        let preprocessor = ImagePreprocessor::default();
        let set = preprocessor.preprocess_image(&create_test_image()).unwrap();
        let closed = set.get(PreprocessingVariant::MorphClosed).unwrap();
        let enhanced = set.get(PreprocessingVariant::Enhanced).unwrap();
        // The one-pixel grid line is brighter after closing
        assert!(closed.get_pixel(16, 24)[0] > enhanced.get_pixel(16, 24)[0]);
    }

    #[test]
    fn test_preprocess_empty_image_fails() {
        let preprocessor = ImagePreprocessor::default();
        let result = preprocessor.preprocess_image(&RgbImage::new(0, 10));
        assert!(matches!(result, Err(PreprocessingError::EmptyImage)));
    }

    #[test]
    fn test_grid_source_is_enhanced() {
        let preprocessor = ImagePreprocessor::default();
        let set = preprocessor.preprocess_image(&create_test_image()).unwrap();
        assert_eq!(set.grid_source(), set.get(PreprocessingVariant::Enhanced));
    }
}
