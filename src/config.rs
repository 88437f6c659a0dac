//! Configuration types for the background removal pipeline

use crate::error::{BgRemovalError, Result};
use crate::strategy::StrategyRequest;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;

/// Default ceiling for the working resolution used by preprocessing
pub const DEFAULT_MAX_DIMENSION: u32 = 4096;

/// Named quality/size tradeoff level
///
/// Variants are declared from lowest to highest fidelity so that the derived
/// ordering follows output fidelity and size.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QualityTier {
    Low,
    Medium,
    High,
    Ultra,
}

impl QualityTier {
    /// All tiers, highest fidelity first
    pub const ALL: [QualityTier; 4] = [Self::Ultra, Self::High, Self::Medium, Self::Low];

    /// Long-edge ceiling associated with the tier
    #[must_use]
    pub fn max_dimension(self) -> u32 {
        match self {
            Self::Ultra => 8192,
            Self::High => 4096,
            Self::Medium => 2048,
            Self::Low => 1024,
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ultra => "ultra",
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
        }
    }
}

impl Default for QualityTier {
    fn default() -> Self {
        Self::High
    }
}

impl std::fmt::Display for QualityTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QualityTier {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ultra" => Ok(Self::Ultra),
            "high" => Ok(Self::High),
            "medium" => Ok(Self::Medium),
            "low" => Ok(Self::Low),
            _ => Err(BgRemovalError::unsupported_parameter(
                "quality tier",
                s,
                &Self::ALL.map(Self::as_str),
            )),
        }
    }
}

/// Output container formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// PNG, lossless with alpha channel transparency
    Png,
    /// JPEG, lossy photographic format without transparency
    Jpeg,
    /// WebP, lossy with alpha channel support
    WebP,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 3] = [Self::Png, Self::Jpeg, Self::WebP];

    /// Canonical lowercase name
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpeg",
            Self::WebP => "webp",
        }
    }

    /// Suggested file extension (without the dot)
    #[must_use]
    pub fn extension(self) -> &'static str {
        match self {
            Self::Png => "png",
            Self::Jpeg => "jpg",
            Self::WebP => "webp",
        }
    }

    /// MIME content type
    #[must_use]
    pub fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::WebP => "image/webp",
        }
    }

    #[must_use]
    pub fn supports_transparency(self) -> bool {
        match self {
            Self::Png | Self::WebP => true,
            Self::Jpeg => false,
        }
    }

    #[must_use]
    pub fn is_lossless(self) -> bool {
        matches!(self, Self::Png)
    }
}

impl Default for OutputFormat {
    fn default() -> Self {
        Self::Png
    }
}

impl std::fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OutputFormat {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "png" => Ok(Self::Png),
            "jpeg" | "jpg" => Ok(Self::Jpeg),
            "webp" => Ok(Self::WebP),
            _ => Err(BgRemovalError::unsupported_parameter(
                "output format",
                s,
                &Self::ALL.map(Self::name),
            )),
        }
    }
}

/// Requested output format: either chosen by the optimizer or explicit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FormatRequest {
    #[default]
    Auto,
    Explicit(OutputFormat),
}

impl FromStr for FormatRequest {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(Self::Auto);
        }
        s.parse::<OutputFormat>().map(Self::Explicit).map_err(|_| {
            BgRemovalError::unsupported_parameter("output format", s, &[
                "auto", "png", "jpeg", "webp",
            ])
        })
    }
}

impl std::fmt::Display for FormatRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(format) => write!(f, "{format}"),
        }
    }
}

/// Configuration for one pipeline invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[allow(clippy::struct_excessive_bools)]
pub struct PipelineConfig {
    /// Long-edge ceiling for the working resolution
    pub max_dimension: u32,

    /// Quality tier controlling encode parameters
    pub quality: QualityTier,

    /// Requested output format
    pub output_format: FormatRequest,

    /// Requested segmentation strategy
    pub strategy: StrategyRequest,

    /// Source file name or format name, used to keep photographic originals lossy
    pub source_format_hint: Option<String>,

    /// Run denoise/contrast/sharpen before segmentation
    pub enable_preprocessing: bool,

    /// Run mask restore/smoothing/edge refinement after segmentation
    pub enable_postprocessing: bool,

    /// Bypass the backend handle cache (fresh backend per request)
    pub disable_cache: bool,

    /// Directory holding `<strategy>.onnx` model files for delegated backends
    pub model_dir: Option<PathBuf>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_dimension: DEFAULT_MAX_DIMENSION,
            quality: QualityTier::default(),
            output_format: FormatRequest::default(),
            strategy: StrategyRequest::default(),
            source_format_hint: None,
            enable_preprocessing: true,
            enable_postprocessing: true,
            disable_cache: false,
            model_dir: None,
        }
    }
}

impl PipelineConfig {
    /// Create a new configuration builder for fluent API construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bgremove_pipeline::{PipelineConfig, QualityTier};
    ///
    /// let config = PipelineConfig::builder()
    ///     .quality(QualityTier::Medium)
    ///     .max_dimension(2048)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(config.max_dimension, 2048);
    /// ```
    #[must_use]
    pub fn builder() -> PipelineConfigBuilder {
        PipelineConfigBuilder::new()
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        if self.max_dimension == 0 {
            return Err(BgRemovalError::config_value_error(
                "max dimension",
                self.max_dimension,
                "1-65535",
                Some(DEFAULT_MAX_DIMENSION),
            ));
        }
        if self.max_dimension > u32::from(u16::MAX) {
            return Err(BgRemovalError::config_value_error(
                "max dimension",
                self.max_dimension,
                "1-65535",
                Some(DEFAULT_MAX_DIMENSION),
            ));
        }
        if let Some(dir) = &self.model_dir {
            if dir.as_os_str().is_empty() {
                return Err(BgRemovalError::invalid_config("model directory path is empty"));
            }
        }
        Ok(())
    }
}

/// Builder for `PipelineConfig`
#[derive(Debug, Default)]
pub struct PipelineConfigBuilder {
    config: PipelineConfig,
}

impl PipelineConfigBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PipelineConfig::default(),
        }
    }

    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    #[must_use]
    pub fn quality(mut self, quality: QualityTier) -> Self {
        self.config.quality = quality;
        self
    }

    #[must_use]
    pub fn output_format(mut self, format: FormatRequest) -> Self {
        self.config.output_format = format;
        self
    }

    #[must_use]
    pub fn strategy(mut self, strategy: StrategyRequest) -> Self {
        self.config.strategy = strategy;
        self
    }

    #[must_use]
    pub fn source_format_hint<S: Into<String>>(mut self, hint: S) -> Self {
        self.config.source_format_hint = Some(hint.into());
        self
    }

    #[must_use]
    pub fn enable_preprocessing(mut self, enable: bool) -> Self {
        self.config.enable_preprocessing = enable;
        self
    }

    #[must_use]
    pub fn enable_postprocessing(mut self, enable: bool) -> Self {
        self.config.enable_postprocessing = enable;
        self
    }

    #[must_use]
    pub fn disable_cache(mut self, disable: bool) -> Self {
        self.config.disable_cache = disable;
        self
    }

    #[must_use]
    pub fn model_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.config.model_dir = Some(dir.into());
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<PipelineConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
