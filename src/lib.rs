#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # Background Removal Pipeline
//!
//! A background removal library that picks a segmentation strategy per image,
//! preserves quality around the segmentation step and encodes the result in a
//! size-optimized format.
//!
//! ## Features
//!
//! - **Image Classification**: Portrait, product, artistic or general, with a strategy recommendation
//! - **Delegated Segmentation**: Model-backed strategies through a pluggable [`BackendFactory`]
//! - **Classical Segmentation**: In-process GrabCut and threshold fallback, no models required
//! - **Quality Pipeline**: Resolution capping, denoise, contrast and sharpening before segmentation;
//!   resolution restore, alpha smoothing and edge refinement after it
//! - **Format Optimization**: PNG, JPEG and WebP with quality tiers and a lossless fallback
//! - **Session Caching**: Backend handles created once per strategy and shared across requests
//! - **CLI Integration**: Optional command-line interface (enable with `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use bgremove_pipeline::{BackgroundRemovalProcessor, PipelineConfig, QualityTier};
//!
//! # fn example() -> anyhow::Result<()> {
//! let config = PipelineConfig::builder()
//!     .quality(QualityTier::High)
//!     .model_dir("models")
//!     .build()?;
//! let processor = BackgroundRemovalProcessor::new(config)?;
//!
//! let result = processor.process_file("input.jpg")?;
//! println!("{} via {} in {}ms", result.format(), result.strategy, result.timings.total_ms);
//! result.save(result.encoded.file_name("output"))?;
//! # Ok(())
//! # }
//! ```
//!
//! ### Feature Flags
//!
//! - `tract` (default): Pure Rust ONNX backend for delegated strategies
//! - `cli` (default): Command-line interface and progress reporting
//! - `tracing-json`: JSON log output for the CLI
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! bgremove-pipeline = { version = "0.1", default-features = false }
//! ```
//!
//! Without a backend factory every delegated strategy runs on the classical path.

pub mod backends;
pub mod catalog;
pub mod classical;
pub mod classifier;
#[cfg(feature = "cli")]
pub mod cli;
pub mod config;
pub mod error;
pub mod features;
pub mod inference;
pub mod processor;
pub mod quality;
pub mod segmentation;
pub mod services;
pub mod session_cache;
pub mod strategy;
#[cfg(feature = "cli")]
pub mod tracing_config;
pub mod types;
pub mod utils;

use tokio::io::AsyncRead;

// Public API exports
#[cfg(feature = "tract")]
pub use backends::{TractBackend, TractBackendFactory};
pub use catalog::{CatalogEntry, ImageCatalog, ImageKind, MemoryCatalog};
pub use classical::{ClassicalOutput, ClassicalSegmenter, CueDiagnostics};
pub use classifier::{Classification, ImageCategory, ImageClassifier};
pub use config::{FormatRequest, OutputFormat, PipelineConfig, PipelineConfigBuilder, QualityTier};
pub use error::{BgRemovalError, Result};
pub use features::{FeatureExtractor, FeatureVector};
pub use inference::{BackendFactory, NoBackendFactory, SegmentationBackend};
pub use processor::BackgroundRemovalProcessor;
pub use quality::QualityPipeline;
pub use segmentation::{SegmentationOrchestrator, SegmentationOutput};
pub use services::{
    choose_format, estimate_size, DefaultEncoder, EncodeConfig, FormatEncoder, FormatOptimizer,
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    TracingProgressReporter,
};
pub use session_cache::{SessionCache, SessionCacheStats, SessionInfo};
pub use strategy::{StrategyId, StrategyRequest};
pub use types::{
    ChannelLayout, EncodedResult, ProcessingResult, ProcessingTimings, RasterImage,
    SegmentationMask,
};

#[cfg(feature = "cli")]
pub use tracing_config::{init_cli_tracing, TracingConfig, TracingFormat};

/// Remove the background from encoded image bytes
///
/// Builds a processor from `config` with the default backend factory.
/// Callers handling many requests should create one
/// [`BackgroundRemovalProcessor`] and reuse it so backend handles are cached.
///
/// # Examples
///
/// ```rust,no_run
/// use bgremove_pipeline::{remove_background_from_bytes, PipelineConfig};
///
/// # fn example(upload_bytes: Vec<u8>) -> anyhow::Result<()> {
/// let config = PipelineConfig::builder().source_format_hint("upload.jpg").build()?;
/// let result = remove_background_from_bytes(&upload_bytes, &config)?;
/// let body = result.bytes().to_vec();
/// # Ok(())
/// # }
/// ```
pub fn remove_background_from_bytes(image_bytes: &[u8], config: &PipelineConfig) -> Result<ProcessingResult> {
    BackgroundRemovalProcessor::new(config.clone())?.process_bytes(image_bytes)
}

/// Remove the background from an async reader stream
///
/// ```rust,no_run
/// use bgremove_pipeline::{remove_background_from_reader, PipelineConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("large_image.jpg").await?;
/// let result = remove_background_from_reader(file, &PipelineConfig::default()).await?;
/// result.save("output.png")?;
/// # Ok(())
/// # }
/// ```
pub async fn remove_background_from_reader<R: AsyncRead + Unpin>(
    reader: R,
    config: &PipelineConfig,
) -> Result<ProcessingResult> {
    BackgroundRemovalProcessor::new(config.clone())?
        .process_reader(reader)
        .await
}
