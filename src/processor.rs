//! End-to-end background removal pipeline
//!
//! `BackgroundRemovalProcessor` runs one request through classification,
//! preprocessing, segmentation, postprocessing and encoding. It holds only
//! configuration and shared read-only collaborators, so a single processor
//! can serve concurrent requests through `&self`.

use crate::{
    classifier::{Classification, ImageClassifier},
    config::PipelineConfig,
    error::{BgRemovalError, Result},
    inference::BackendFactory,
    quality::QualityPipeline,
    segmentation::{SegmentationOrchestrator, SegmentationOutput},
    services::{
        FormatEncoder, FormatOptimizer, NoOpProgressReporter, ProcessingStage, ProgressReporter,
        ProgressTracker,
    },
    session_cache::SessionCache,
    strategy::StrategyId,
    types::{ProcessingResult, ProcessingTimings, RasterImage, SegmentationMask},
};
use instant::Instant;
use log::{debug, info};
use std::path::Path;
use std::sync::Arc;
use tracing::{info as trace_info, instrument, span, Level};

/// Unified background removal processor
pub struct BackgroundRemovalProcessor {
    config: PipelineConfig,
    classifier: ImageClassifier,
    quality: QualityPipeline,
    orchestrator: SegmentationOrchestrator,
    optimizer: FormatOptimizer,
    cache: Arc<SessionCache>,
    factory: Option<Arc<dyn BackendFactory>>,
    reporter: Arc<dyn ProgressReporter>,
}

impl std::fmt::Debug for BackgroundRemovalProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackgroundRemovalProcessor")
            .field("config", &self.config)
            .field("orchestrator", &self.orchestrator)
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

impl BackgroundRemovalProcessor {
    /// Create a processor with the default backend factory
    ///
    /// With the `tract` feature and a configured `model_dir`, delegated
    /// strategies whose model file exists run through Tract; every other
    /// delegated strategy runs the classical path.
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn new(config: PipelineConfig) -> Result<Self> {
        let factory = Self::default_factory(&config);
        Self::with_factory(config, factory)
    }

    /// Create a processor with a custom backend factory
    ///
    /// # Errors
    /// - Invalid configuration
    pub fn with_factory(config: PipelineConfig, factory: Option<Arc<dyn BackendFactory>>) -> Result<Self> {
        config.validate()?;
        let cache = Arc::new(SessionCache::new());
        Ok(Self {
            classifier: ImageClassifier::new(),
            quality: QualityPipeline::new(config.max_dimension),
            orchestrator: Self::build_orchestrator(&config, factory.clone(), Arc::clone(&cache)),
            optimizer: FormatOptimizer::default(),
            cache,
            factory,
            reporter: Arc::new(NoOpProgressReporter),
            config,
        })
    }

    /// Share a handle cache with other processors
    #[must_use]
    pub fn with_session_cache(mut self, cache: Arc<SessionCache>) -> Self {
        self.orchestrator = Self::build_orchestrator(&self.config, self.factory.clone(), Arc::clone(&cache));
        self.cache = cache;
        self
    }

    #[must_use]
    pub fn with_progress_reporter(mut self, reporter: Arc<dyn ProgressReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Replace the output encoder
    #[must_use]
    pub fn with_encoder(mut self, encoder: Arc<dyn FormatEncoder>) -> Self {
        self.optimizer = FormatOptimizer::new(encoder);
        self
    }

    #[cfg(feature = "tract")]
    fn default_factory(config: &PipelineConfig) -> Option<Arc<dyn BackendFactory>> {
        config.model_dir.as_ref().map(|dir| {
            let factory: Arc<dyn BackendFactory> =
                Arc::new(crate::backends::TractBackendFactory::new(dir.clone()));
            factory
        })
    }

    #[cfg(not(feature = "tract"))]
    fn default_factory(_config: &PipelineConfig) -> Option<Arc<dyn BackendFactory>> {
        None
    }

    fn build_orchestrator(
        config: &PipelineConfig,
        factory: Option<Arc<dyn BackendFactory>>,
        cache: Arc<SessionCache>,
    ) -> SegmentationOrchestrator {
        SegmentationOrchestrator::new(factory, cache).with_cache_disabled(config.disable_cache)
    }

    #[must_use]
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    #[must_use]
    pub fn session_cache(&self) -> &Arc<SessionCache> {
        &self.cache
    }

    /// Delegated strategies the configured factory can provide
    #[must_use]
    pub fn available_strategies(&self) -> Vec<StrategyId> {
        self.factory
            .as_ref()
            .map(|factory| factory.available_strategies())
            .unwrap_or_default()
    }

    /// Classify an image without processing it
    #[must_use]
    pub fn analyze(&self, image: &RasterImage) -> Classification {
        self.classifier.classify_image(image)
    }

    /// Process a decoded image
    ///
    /// # Errors
    /// - Unknown or failing delegated backend
    /// - Encoding failures that survive the lossless retry
    pub fn process_image(&self, image: &RasterImage) -> Result<ProcessingResult> {
        let tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        self.run(image, self.config.source_format_hint.as_deref(), ProcessingTimings::new(), tracker)
    }

    /// Decode and process image bytes
    ///
    /// # Errors
    /// - Undecodable input (client error, nothing else runs)
    /// - Any [`Self::process_image`] failure
    pub fn process_bytes(&self, bytes: &[u8]) -> Result<ProcessingResult> {
        self.process_bytes_with_hint(bytes, self.config.source_format_hint.as_deref())
    }

    /// Read and process an image file; the file name is the source hint unless one is configured
    ///
    /// # Errors
    /// - File read failures
    /// - Any [`Self::process_bytes`] failure
    pub fn process_file<P: AsRef<Path>>(&self, path: P) -> Result<ProcessingResult> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let file_name = path.file_name().and_then(|name| name.to_str());
        let hint = self.config.source_format_hint.as_deref().or(file_name);
        self.process_bytes_with_hint(&bytes, hint)
    }

    /// Read an async stream to the end and process it
    ///
    /// # Errors
    /// - Stream read failures
    /// - Any [`Self::process_bytes`] failure
    pub async fn process_reader<R: tokio::io::AsyncRead + Unpin>(&self, mut reader: R) -> Result<ProcessingResult> {
        use tokio::io::AsyncReadExt;

        let mut buffer = Vec::new();
        AsyncReadExt::read_to_end(&mut reader, &mut buffer).await?;
        self.process_bytes(&buffer)
    }

    fn process_bytes_with_hint(&self, bytes: &[u8], hint: Option<&str>) -> Result<ProcessingResult> {
        let mut tracker = ProgressTracker::new(Arc::clone(&self.reporter));
        tracker.report_stage(ProcessingStage::Decoding);
        let decode_start = Instant::now();
        let image = RasterImage::decode(bytes).map_err(|e| {
            tracker.report_error(&e.to_string());
            e
        })?;
        let mut timings = ProcessingTimings::new();
        timings.decode_ms = decode_start.elapsed().as_millis() as u64;
        debug!("Decoded {}", image.describe());
        self.run(&image, hint, timings, tracker)
    }

    #[instrument(
        skip(self, image, timings, tracker),
        fields(
            width = image.width(),
            height = image.height(),
            quality = %self.config.quality,
            format = %self.config.output_format
        )
    )]
    fn run(
        &self,
        image: &RasterImage,
        hint: Option<&str>,
        mut timings: ProcessingTimings,
        mut tracker: ProgressTracker,
    ) -> Result<ProcessingResult> {
        let total_start = Instant::now();

        tracker.report_stage(ProcessingStage::Analysis);
        let analysis_start = Instant::now();
        let (strategy, classification) = {
            let _span = span!(Level::DEBUG, "analysis").entered();
            self.classifier.resolve(image, self.config.strategy)
        };
        timings.analysis_ms = analysis_start.elapsed().as_millis() as u64;
        trace_info!(
            strategy = %strategy,
            category = classification.as_ref().map(|c| c.category.as_str()),
            "Selected segmentation strategy"
        );

        tracker.report_stage(ProcessingStage::Preprocessing);
        let preprocess_start = Instant::now();
        let working = if self.config.enable_preprocessing {
            let _span = span!(Level::DEBUG, "preprocessing", width = image.width(), height = image.height()).entered();
            self.quality.preprocess(image)?
        } else {
            image.clone()
        };
        timings.preprocessing_ms = preprocess_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Segmentation);
        let segmentation_start = Instant::now();
        let segmented: SegmentationOutput = {
            let _span = span!(Level::INFO, "segmentation", strategy = %strategy).entered();
            self.orchestrator.segment(strategy, &working).map_err(|e| {
                tracker.report_error(&e.to_string());
                e
            })?
        };
        timings.segmentation_ms = segmentation_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Postprocessing);
        let postprocess_start = Instant::now();
        let result = {
            let _span = span!(Level::DEBUG, "postprocessing", width = image.width(), height = image.height()).entered();
            if self.config.enable_postprocessing {
                self.quality.postprocess(&segmented.image, image)?
            } else {
                self.quality.restore_resolution(&segmented.image, image)?
            }
        };
        if result.dimensions() != image.dimensions() {
            return Err(BgRemovalError::processing_stage_error(
                "postprocessing",
                "result dimensions differ from the input",
                Some(&image.describe()),
            ));
        }
        let mask = SegmentationMask::from_dynamic(result.as_dynamic())?;
        timings.postprocessing_ms = postprocess_start.elapsed().as_millis() as u64;

        tracker.report_stage(ProcessingStage::Encoding);
        let encode_start = Instant::now();
        let encoded = {
            let format = self.optimizer.resolve_format(&result, self.config.output_format, hint);
            let _span = span!(Level::DEBUG, "encoding", format = %format).entered();
            self.optimizer.optimize(&result, format, self.config.quality).map_err(|e| {
                tracker.report_error(&e.to_string());
                e
            })?
        };
        timings.encode_ms = encode_start.elapsed().as_millis() as u64;

        timings.total_ms = total_start.elapsed().as_millis() as u64 + timings.decode_ms;
        tracker.report_completion(&timings);
        info!(
            "Processed {}x{} with {} ({}) into {} bytes of {}",
            image.width(),
            image.height(),
            strategy,
            segmented.backend,
            encoded.bytes.len(),
            encoded.format
        );

        Ok(ProcessingResult {
            encoded,
            classification,
            strategy,
            classical_path: segmented.classical_path,
            diagnostics: segmented.diagnostics,
            original_dimensions: image.dimensions(),
            working_dimensions: working.dimensions(),
            mask,
            timings,
        })
    }
}
