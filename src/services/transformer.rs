//! Preview rendering
//!
//! | Mode | Operation |
//! |------|-----------|
//! | Fill | `DynamicImage::resize_to_fill` (scale, then center crop) with `Lanczos3` |
//! | Resize | `DynamicImage::resize_exact` with `Lanczos3` |
//!
//! Output is always baseline JPEG.

use bytes::Bytes;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{ExtendedColorType, GenericImageView, ImageEncoder};

use crate::config::TransformConfig;
use crate::config::defaults::DEFAULT_MAX_OUTPUT_PIXELS;
use crate::errors::TransformError;
use crate::models::CropMode;

/// Largest width or height a JPEG frame header can carry
pub const MAX_JPEG_DIMENSION: u32 = 65_535;

/// Renders a source image into a preview. CPU bound; call from a blocking context.
#[cfg_attr(test, mockall::automock)]
pub trait Transformer: Send + Sync {
    fn transform(
        &self,
        image: &[u8],
        width: u32,
        height: u32,
        mode: CropMode,
    ) -> Result<Bytes, TransformError>;
}

#[derive(Debug, Clone)]
pub struct ImageTransformer {
    jpeg_quality: u8,
    max_output_pixels: u64,
}

impl ImageTransformer {
    pub fn new(config: &TransformConfig) -> Self {
        Self::with_limits(config.jpeg_quality, config.max_output_pixels)
    }

    pub fn with_quality(jpeg_quality: u8) -> Self {
        Self::with_limits(jpeg_quality, DEFAULT_MAX_OUTPUT_PIXELS)
    }

    pub fn with_limits(jpeg_quality: u8, max_output_pixels: u64) -> Self {
        Self {
            jpeg_quality: jpeg_quality.clamp(1, 100),
            max_output_pixels: max_output_pixels.max(1),
        }
    }

    fn exceeds_pixel_budget(&self, width: u64, height: u64) -> bool {
        width.saturating_mul(height) > self.max_output_pixels
    }
}

/// Size of the scaled image `resize_to_fill` produces before cropping
fn fill_scaled_dimensions(source: (u32, u32), target: (u32, u32)) -> (u64, u64) {
    let (source_width, source_height) = (f64::from(source.0), f64::from(source.1));
    let ratio = f64::max(
        f64::from(target.0) / source_width,
        f64::from(target.1) / source_height,
    );
    (
        ((source_width * ratio).round() as u64).max(1),
        ((source_height * ratio).round() as u64).max(1),
    )
}

impl Transformer for ImageTransformer {
    fn transform(
        &self,
        image: &[u8],
        width: u32,
        height: u32,
        mode: CropMode,
    ) -> Result<Bytes, TransformError> {
        if width == 0 || height == 0 {
            return Err(TransformError::InvalidDimensions { width, height });
        }
        // Checked before resampling so oversized requests never allocate
        if width > MAX_JPEG_DIMENSION
            || height > MAX_JPEG_DIMENSION
            || self.exceeds_pixel_budget(u64::from(width), u64::from(height))
        {
            return Err(TransformError::TooLarge { width, height });
        }

        let source = image::load_from_memory(image).map_err(TransformError::Decode)?;
        let rendered = match mode {
            CropMode::Fill => {
                let (scaled_width, scaled_height) =
                    fill_scaled_dimensions(source.dimensions(), (width, height));
                if self.exceeds_pixel_budget(scaled_width, scaled_height) {
                    return Err(TransformError::TooLarge { width, height });
                }
                source.resize_to_fill(width, height, FilterType::Lanczos3)
            }
            CropMode::Resize => source.resize_exact(width, height, FilterType::Lanczos3),
        };

        let rgb = rendered.to_rgb8();
        let mut encoded = Vec::new();
        JpegEncoder::new_with_quality(&mut encoded, self.jpeg_quality)
            .write_image(rgb.as_raw(), rgb.width(), rgb.height(), ExtendedColorType::Rgb8)
            .map_err(TransformError::Encode)?;

        Ok(Bytes::from(encoded))
    }
}
