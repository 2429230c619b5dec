// Image preprocessing: enhancement presets and margin masking.
//
// Pure functions of their inputs so re-runs with identical parameters are
// reproducible.

use image::{DynamicImage, GrayImage};
use imageproc::contrast::equalize_histogram;
use imageproc::filter::gaussian_blur_f32;
use std::sync::Arc;
use tracing::debug;

use crate::core::config::Config;
use crate::core::errors::{DetectionError, DetectionResult};
use crate::core::types::{BoundingBox, EnhancementPreset, ExtractionParameters, PageId};

/// Gaussian sigma for the light denoise pass; tuned for parchment grain at
/// typical folio scan resolutions.
const BLUR_SIGMA: f32 = 1.0;

/// Excluded border region of a page. A zero-band mask excludes nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MarginMask {
    page_width: u32,
    page_height: u32,
    band_x: u32,
    band_y: u32,
}

impl MarginMask {
    pub fn none(page_width: u32, page_height: u32) -> Self {
        Self {
            page_width,
            page_height,
            band_x: 0,
            band_y: 0,
        }
    }

    /// Mask excluding `fraction` of each edge.
    pub fn from_fraction(page_width: u32, page_height: u32, fraction: f32) -> Self {
        Self {
            page_width,
            page_height,
            band_x: (page_width as f32 * fraction) as u32,
            band_y: (page_height as f32 * fraction) as u32,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.band_x == 0 && self.band_y == 0
    }

    /// Whether a box intersects the excluded border region.
    pub fn excludes(&self, bbox: &BoundingBox) -> bool {
        if self.is_empty() {
            return false;
        }
        bbox.x < self.band_x
            || bbox.y < self.band_y
            || bbox.right() > self.page_width - self.band_x
            || bbox.bottom() > self.page_height - self.band_y
    }
}

/// Normalized page ready for detection.
pub struct PreprocessedPage {
    pub image: GrayImage,
    pub mask: MarginMask,
}

/// Image preprocessor: grayscale conversion, enhancement preset, margin mask.
pub struct Preprocessor {
    config: Arc<Config>,
}

impl Preprocessor {
    pub fn new(config: Arc<Config>) -> Self {
        Self { config }
    }

    /// Normalize a decoded page image for detection.
    ///
    /// No side effects; identical inputs yield identical outputs.
    pub fn normalize(
        &self,
        page_id: PageId,
        img: &DynamicImage,
        params: &ExtractionParameters,
    ) -> DetectionResult<PreprocessedPage> {
        let (width, height) = (img.width(), img.height());
        if width == 0 || height == 0 {
            return Err(DetectionError::InvalidImageSize {
                page_id,
                width,
                height,
            });
        }

        let gray = img.to_luma8();

        let image = match params.enhancement {
            EnhancementPreset::None => gray,
            EnhancementPreset::Default => gaussian_blur_f32(&gray, BLUR_SIGMA),
            EnhancementPreset::HighContrast => {
                gaussian_blur_f32(&equalize_histogram(&gray), BLUR_SIGMA)
            }
        };

        let mask = if params.ignore_margins {
            MarginMask::from_fraction(width, height, self.config.margin_fraction())
        } else {
            MarginMask::none(width, height)
        };

        debug!(
            page_id,
            ?params.enhancement,
            masked = !mask.is_empty(),
            "normalized page image"
        );

        Ok(PreprocessedPage { image, mask })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::config::test_config;
    use image::Luma;

    fn gradient_page() -> DynamicImage {
        DynamicImage::ImageLuma8(GrayImage::from_fn(100, 80, |x, y| {
            Luma([((x + y) % 256) as u8])
        }))
    }

    #[test]
    fn test_margin_mask_excludes_border_boxes() {
        let mask = MarginMask::from_fraction(200, 100, 0.05);
        // Band is 10px horizontally, 5px vertically.
        assert!(mask.excludes(&BoundingBox::new(0, 50, 20, 20)));
        assert!(mask.excludes(&BoundingBox::new(50, 0, 20, 20)));
        assert!(mask.excludes(&BoundingBox::new(185, 50, 10, 10)));
        assert!(!mask.excludes(&BoundingBox::new(50, 40, 20, 20)));

        let none = MarginMask::none(200, 100);
        assert!(!none.excludes(&BoundingBox::new(0, 0, 5, 5)));
    }

    #[test]
    fn test_normalize_is_deterministic() {
        let pre = Preprocessor::new(Arc::new(test_config()));
        let img = gradient_page();
        let params = ExtractionParameters::default();

        let a = pre.normalize(1, &img, &params).unwrap();
        let b = pre.normalize(1, &img, &params).unwrap();
        assert_eq!(a.image.as_raw(), b.image.as_raw());
        assert_eq!(a.mask, b.mask);
    }

    #[test]
    fn test_presets_differ() {
        let pre = Preprocessor::new(Arc::new(test_config()));
        let img = gradient_page();

        let plain = pre
            .normalize(
                1,
                &img,
                &ExtractionParameters {
                    enhancement: EnhancementPreset::None,
                    ..ExtractionParameters::default()
                },
            )
            .unwrap();
        let contrast = pre
            .normalize(
                1,
                &img,
                &ExtractionParameters {
                    enhancement: EnhancementPreset::HighContrast,
                    ..ExtractionParameters::default()
                },
            )
            .unwrap();
        assert_ne!(plain.image.as_raw(), contrast.image.as_raw());
    }

    #[test]
    fn test_zero_sized_image_rejected() {
        let pre = Preprocessor::new(Arc::new(test_config()));
        let img = DynamicImage::ImageLuma8(GrayImage::new(0, 0));
        let result = pre.normalize(7, &img, &ExtractionParameters::default());
        assert!(matches!(
            result,
            Err(DetectionError::InvalidImageSize { page_id: 7, .. })
        ));
    }

    #[test]
    fn test_margins_disabled_yields_empty_mask() {
        let pre = Preprocessor::new(Arc::new(test_config()));
        let img = gradient_page();
        let params = ExtractionParameters {
            ignore_margins: false,
            ..ExtractionParameters::default()
        };
        let out = pre.normalize(1, &img, &params).unwrap();
        assert!(out.mask.is_empty());
    }
}
