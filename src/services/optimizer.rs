//! Format optimizer: channel adaptation, tiered encoding and PNG fallback

use crate::config::{FormatRequest, OutputFormat, QualityTier};
use crate::error::{BgRemovalError, Result};
use crate::services::encoders::{DefaultEncoder, FormatEncoder};
use crate::services::format::{choose_format, estimate_size, EncodeConfig};
use crate::types::{ChannelLayout, EncodedResult, RasterImage};
use image::{DynamicImage, Rgb, RgbImage};
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Background used when flattening transparency for formats without alpha
pub const FLATTEN_BACKGROUND: [u8; 3] = [255, 255, 255];

/// Adapt `image` to the channel layout `format` can carry
///
/// JPEG gets RGB with transparency composited over white. PNG and WebP get
/// RGBA when the image has any transparency and RGB otherwise; PNG keeps
/// opaque grayscale as is.
#[must_use]
pub fn prepare_for_format(image: &RasterImage, format: OutputFormat) -> DynamicImage {
    let transparent = image.has_transparency();
    match format {
        OutputFormat::Jpeg => {
            if image.has_alpha_channel() {
                DynamicImage::ImageRgb8(flatten(image))
            } else {
                DynamicImage::ImageRgb8(image.to_rgb8())
            }
        },
        OutputFormat::Png | OutputFormat::WebP if transparent => {
            DynamicImage::ImageRgba8(image.to_rgba8())
        },
        OutputFormat::Png if image.layout() == ChannelLayout::Grayscale => {
            DynamicImage::ImageLuma8(image.to_luma8())
        },
        OutputFormat::Png | OutputFormat::WebP => DynamicImage::ImageRgb8(image.to_rgb8()),
    }
}

/// Composite over [`FLATTEN_BACKGROUND`] using the alpha channel
fn flatten(image: &RasterImage) -> RgbImage {
    let rgba = image.to_rgba8();
    let mut rgb = RgbImage::new(rgba.width(), rgba.height());
    for (dst, src) in rgb.pixels_mut().zip(rgba.pixels()) {
        let alpha = u32::from(src.0[3]);
        let mut out = [0u8; 3];
        for (c, value) in out.iter_mut().enumerate() {
            let fg = u32::from(src.0[c]);
            let bg = u32::from(FLATTEN_BACKGROUND[c]);
            *value = ((fg * alpha + bg * (255 - alpha) + 127) / 255) as u8;
        }
        *dst = Rgb(out);
    }
    rgb
}

/// Chooses formats and encodes with a single lossless retry
#[derive(Clone)]
pub struct FormatOptimizer {
    encoder: Arc<dyn FormatEncoder>,
}

impl std::fmt::Debug for FormatOptimizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FormatOptimizer").finish_non_exhaustive()
    }
}

impl Default for FormatOptimizer {
    fn default() -> Self {
        Self::new(Arc::new(DefaultEncoder))
    }
}

impl FormatOptimizer {
    #[must_use]
    pub fn new(encoder: Arc<dyn FormatEncoder>) -> Self {
        Self { encoder }
    }

    /// Resolve a format request against the image and source hint
    #[must_use]
    pub fn resolve_format(
        &self,
        image: &RasterImage,
        request: FormatRequest,
        source_format_hint: Option<&str>,
    ) -> OutputFormat {
        match request {
            FormatRequest::Explicit(format) => format,
            FormatRequest::Auto => choose_format(image, source_format_hint),
        }
    }

    /// Encode `image` as `format` at `tier`, retrying once as PNG on failure
    ///
    /// # Errors
    /// - The PNG retry failed as well
    #[instrument(skip(self, image), fields(format = %format, tier = %tier, width = image.width(), height = image.height()))]
    pub fn optimize(&self, image: &RasterImage, format: OutputFormat, tier: QualityTier) -> Result<EncodedResult> {
        let estimated_size = estimate_size(image, format, tier);
        let config = EncodeConfig::for_format(format, tier);

        match self.encoder.encode(&prepare_for_format(image, format), &config) {
            Ok(bytes) => {
                debug!(bytes = bytes.len(), estimated_size, "Encoded output");
                Ok(EncodedResult {
                    bytes,
                    format,
                    requested_format: format,
                    estimated_size,
                    fallback_used: false,
                })
            },
            Err(e) => {
                warn!(error = %e, "Encoding failed, falling back to png");
                let fallback = EncodeConfig::for_format(OutputFormat::Png, tier);
                let bytes = self
                    .encoder
                    .encode(&prepare_for_format(image, OutputFormat::Png), &fallback)
                    .map_err(|fallback_error| {
                        BgRemovalError::encode(
                            OutputFormat::Png.name(),
                            format!("fallback after {format} failure ({e}) also failed: {fallback_error}"),
                        )
                    })?;
                log::info!("Encoded with png fallback after {format} failure");
                Ok(EncodedResult {
                    bytes,
                    format: OutputFormat::Png,
                    requested_format: format,
                    estimated_size: estimate_size(image, OutputFormat::Png, tier),
                    fallback_used: true,
                })
            },
        }
    }
}
