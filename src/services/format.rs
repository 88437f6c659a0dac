//! Output format selection and encode parameters
//!
//! Format choice is a pure function of the image's transparency and the
//! source hint. Per-format parameters and the size estimator are literal
//! tables keyed by format and quality tier.

use crate::config::{OutputFormat, QualityTier};
use crate::types::RasterImage;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// PNG zlib level used at ultra and high
pub const PNG_BASE_COMPRESSION: u8 = 6;
/// PNG zlib level used at medium and low
pub const PNG_HIGH_COMPRESSION: u8 = 9;
/// WebP encoder effort
pub const WEBP_METHOD: u8 = 6;

/// Per-format encoding parameters for one quality tier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncodeConfig {
    pub format: OutputFormat,
    /// Quality factor (0-100) for lossy formats
    pub quality: Option<u8>,
    /// Compression level (0-9) for the lossless format
    pub compression_level: Option<u8>,
    pub preserve_transparency: bool,
    pub progressive: bool,
    /// Encoder effort for WebP
    pub method: Option<u8>,
    pub optimize: bool,
}

impl EncodeConfig {
    /// Base parameters for `format` overridden by `tier`
    #[must_use]
    pub fn for_format(format: OutputFormat, tier: QualityTier) -> Self {
        match format {
            OutputFormat::Png => Self {
                format,
                quality: None,
                compression_level: Some(match tier {
                    QualityTier::Ultra | QualityTier::High => PNG_BASE_COMPRESSION,
                    QualityTier::Medium | QualityTier::Low => PNG_HIGH_COMPRESSION,
                }),
                preserve_transparency: true,
                progressive: false,
                method: None,
                optimize: true,
            },
            OutputFormat::Jpeg => Self {
                format,
                quality: Some(lossy_quality(tier)),
                compression_level: None,
                preserve_transparency: false,
                progressive: true,
                method: None,
                optimize: true,
            },
            OutputFormat::WebP => Self {
                format,
                quality: Some(lossy_quality(tier)),
                compression_level: None,
                preserve_transparency: true,
                progressive: false,
                method: Some(WEBP_METHOD),
                optimize: true,
            },
        }
    }
}

fn lossy_quality(tier: QualityTier) -> u8 {
    match tier {
        QualityTier::Ultra => 98,
        QualityTier::High => 95,
        QualityTier::Medium => 85,
        QualityTier::Low => 75,
    }
}

/// Whether a file name or format name denotes a photographic lossy source
#[must_use]
pub fn is_photographic_hint(hint: &str) -> bool {
    let hint = hint.trim();
    let candidate = Path::new(hint)
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or(hint);
    candidate.eq_ignore_ascii_case("jpg") || candidate.eq_ignore_ascii_case("jpeg")
}

/// Lossless when transparent, the photographic format when the hint says so, else lossless
#[must_use]
pub fn choose_format(image: &RasterImage, source_format_hint: Option<&str>) -> OutputFormat {
    if image.has_transparency() {
        return OutputFormat::Png;
    }
    match source_format_hint {
        Some(hint) if is_photographic_hint(hint) => OutputFormat::Jpeg,
        _ => OutputFormat::Png,
    }
}

/// Closed-form size estimate in bytes, for budgeting only
#[must_use]
pub fn estimate_size(image: &RasterImage, format: OutputFormat, tier: QualityTier) -> u64 {
    let pixels = u64::from(image.width()) * u64::from(image.height());
    let channels: f64 = if image.has_transparency() { 4.0 } else { 3.0 };

    let bytes = match format {
        OutputFormat::Png => pixels as f64 * channels * 0.7,
        OutputFormat::Jpeg => {
            let multiplier = match tier {
                QualityTier::Ultra => 0.8,
                QualityTier::High => 0.6,
                QualityTier::Medium => 0.4,
                QualityTier::Low => 0.2,
            };
            pixels as f64 * 3.0 * multiplier
        },
        OutputFormat::WebP => {
            let multiplier = match tier {
                QualityTier::Ultra => 0.7,
                QualityTier::High => 0.5,
                QualityTier::Medium => 0.3,
                QualityTier::Low => 0.15,
            };
            pixels as f64 * channels * multiplier
        },
    };
    bytes as u64
}
