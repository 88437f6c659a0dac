//! Format encoders
//!
//! The optimizer reaches encoders through [`FormatEncoder`] so a failing
//! encoder can be substituted in tests. [`DefaultEncoder`] writes PNG with
//! the `image` crate, progressive JPEG with `jpeg-encoder` and lossy WebP
//! with `webp`.

use crate::config::OutputFormat;
use crate::error::{BgRemovalError, Result};
use crate::services::format::{EncodeConfig, PNG_HIGH_COMPRESSION};
use image::codecs::png::{CompressionType, FilterType, PngEncoder};
use image::{DynamicImage, ImageEncoder};

/// Encodes an already channel-adapted image
pub trait FormatEncoder: Send + Sync {
    /// # Errors
    /// - Encoder failures for the configured format
    fn encode(&self, image: &DynamicImage, config: &EncodeConfig) -> Result<Vec<u8>>;
}

/// Encoder backed by `image`, `jpeg-encoder` and `webp`
#[derive(Debug, Clone, Copy, Default)]
pub struct DefaultEncoder;

impl FormatEncoder for DefaultEncoder {
    fn encode(&self, image: &DynamicImage, config: &EncodeConfig) -> Result<Vec<u8>> {
        match config.format {
            OutputFormat::Png => encode_png(image, config),
            OutputFormat::Jpeg => encode_jpeg(image, config),
            OutputFormat::WebP => encode_webp(image, config),
        }
    }
}

fn encode_png(image: &DynamicImage, config: &EncodeConfig) -> Result<Vec<u8>> {
    let compression = match config.compression_level {
        Some(level) if level >= PNG_HIGH_COMPRESSION => CompressionType::Best,
        Some(0) => CompressionType::Fast,
        _ => CompressionType::Default,
    };

    let mut buffer = Vec::new();
    let encoder = PngEncoder::new_with_quality(&mut buffer, compression, FilterType::Adaptive);
    encoder
        .write_image(
            image.as_bytes(),
            image.width(),
            image.height(),
            image.color().into(),
        )
        .map_err(|e| BgRemovalError::encode("png", e.to_string()))?;
    Ok(buffer)
}

fn encode_jpeg(image: &DynamicImage, config: &EncodeConfig) -> Result<Vec<u8>> {
    let width = u16::try_from(image.width())
        .map_err(|_| BgRemovalError::encode("jpeg", format!("width {} exceeds 65535", image.width())))?;
    let height = u16::try_from(image.height())
        .map_err(|_| BgRemovalError::encode("jpeg", format!("height {} exceeds 65535", image.height())))?;

    let (data, color_type) = match image {
        DynamicImage::ImageLuma8(gray) => (gray.as_raw().clone(), jpeg_encoder::ColorType::Luma),
        other => (other.to_rgb8().into_raw(), jpeg_encoder::ColorType::Rgb),
    };

    let mut buffer = Vec::new();
    let mut encoder = jpeg_encoder::Encoder::new(&mut buffer, config.quality.unwrap_or(95));
    encoder.set_progressive(config.progressive);
    encoder
        .encode(&data, width, height, color_type)
        .map_err(|e| BgRemovalError::encode("jpeg", e.to_string()))?;
    Ok(buffer)
}

fn encode_webp(image: &DynamicImage, config: &EncodeConfig) -> Result<Vec<u8>> {
    let mut webp_config = webp::WebPConfig::new()
        .map_err(|()| BgRemovalError::encode("webp", "failed to initialize encoder config"))?;
    webp_config.quality = f32::from(config.quality.unwrap_or(95));
    webp_config.method = i32::from(config.method.unwrap_or(4));
    webp_config.lossless = 0;

    let memory = match image {
        DynamicImage::ImageRgba8(rgba) => {
            webp::Encoder::from_rgba(rgba.as_raw(), rgba.width(), rgba.height())
                .encode_advanced(&webp_config)
        },
        other => {
            let rgb = other.to_rgb8();
            webp::Encoder::from_rgb(rgb.as_raw(), rgb.width(), rgb.height())
                .encode_advanced(&webp_config)
        },
    }
    .map_err(|e| BgRemovalError::encode("webp", format!("{e:?}")))?;

    Ok(memory.to_vec())
}
