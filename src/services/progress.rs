//! Progress reporting service
//!
//! Separates progress reporting from the pipeline so each frontend can
//! surface stages its own way.

use crate::types::ProcessingTimings;
use instant::Instant;
use std::sync::Arc;

/// Pipeline stages in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProcessingStage {
    /// Decoding input bytes
    Decoding,
    /// Feature extraction and classification
    Analysis,
    /// Resolution bounding, denoise, contrast and sharpening
    Preprocessing,
    /// Delegated or classical mask generation
    Segmentation,
    /// Resolution restore, alpha smoothing and edge refinement
    Postprocessing,
    /// Output format selection and encoding
    Encoding,
    /// Processing completed
    Completed,
}

impl ProcessingStage {
    /// Get a human-readable description of the processing stage
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Decoding => "Decoding input image",
            Self::Analysis => "Analyzing image content",
            Self::Preprocessing => "Preprocessing image",
            Self::Segmentation => "Segmenting foreground",
            Self::Postprocessing => "Refining mask",
            Self::Encoding => "Encoding output",
            Self::Completed => "Processing completed",
        }
    }

    /// Typical progress percentage when this stage starts
    #[must_use]
    pub fn progress_percentage(self) -> u8 {
        match self {
            Self::Decoding => 5,
            Self::Analysis => 10,
            Self::Preprocessing => 20,
            Self::Segmentation => 35,
            Self::Postprocessing => 80,
            Self::Encoding => 90,
            Self::Completed => 100,
        }
    }
}

/// Progress update containing stage and timing information
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressUpdate {
    pub stage: ProcessingStage,
    /// Progress percentage (0-100)
    pub progress: u8,
    pub description: String,
    /// Elapsed time since processing started (milliseconds)
    pub elapsed_ms: u64,
}

impl ProgressUpdate {
    #[must_use]
    pub fn new(stage: ProcessingStage, start_time: Instant) -> Self {
        Self {
            progress: stage.progress_percentage(),
            description: stage.description().to_string(),
            elapsed_ms: start_time.elapsed().as_millis() as u64,
            stage,
        }
    }
}

/// Trait for reporting progress during pipeline runs
pub trait ProgressReporter: Send + Sync {
    fn report_progress(&self, update: ProgressUpdate);

    /// Report processing completion with final timings
    fn report_completion(&self, timings: &ProcessingTimings);

    /// Report an error during processing
    fn report_error(&self, stage: ProcessingStage, error: &str);
}

/// No-op progress reporter that discards all progress updates
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpProgressReporter;

impl ProgressReporter for NoOpProgressReporter {
    fn report_progress(&self, _update: ProgressUpdate) {}

    fn report_completion(&self, _timings: &ProcessingTimings) {}

    fn report_error(&self, _stage: ProcessingStage, _error: &str) {}
}

/// Emits progress as `tracing` events
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingProgressReporter {
    verbose: bool,
}

impl TracingProgressReporter {
    /// `verbose` adds per-stage timings to the completion event
    #[must_use]
    pub fn new(verbose: bool) -> Self {
        Self { verbose }
    }
}

impl ProgressReporter for TracingProgressReporter {
    fn report_progress(&self, update: ProgressUpdate) {
        tracing::info!(
            stage = ?update.stage,
            progress = update.progress,
            elapsed_ms = update.elapsed_ms,
            "{}",
            update.description
        );
    }

    fn report_completion(&self, timings: &ProcessingTimings) {
        tracing::info!(total_ms = timings.total_ms, "Background removal completed");
        if self.verbose {
            tracing::info!("{}", timings.summary());
        }
    }

    fn report_error(&self, stage: ProcessingStage, error: &str) {
        tracing::error!(stage = ?stage, "Error during {}: {error}", stage.description());
    }
}

/// Tracks the current stage of one pipeline run
pub struct ProgressTracker {
    reporter: Arc<dyn ProgressReporter>,
    start_time: Instant,
    current_stage: Option<ProcessingStage>,
}

impl std::fmt::Debug for ProgressTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProgressTracker")
            .field("current_stage", &self.current_stage)
            .finish_non_exhaustive()
    }
}

impl ProgressTracker {
    #[must_use]
    pub fn new(reporter: Arc<dyn ProgressReporter>) -> Self {
        Self {
            reporter,
            start_time: Instant::now(),
            current_stage: None,
        }
    }

    /// Create a progress tracker with no-op reporter
    #[must_use]
    pub fn no_op() -> Self {
        Self::new(Arc::new(NoOpProgressReporter))
    }

    pub fn report_stage(&mut self, stage: ProcessingStage) {
        self.current_stage = Some(stage);
        self.reporter
            .report_progress(ProgressUpdate::new(stage, self.start_time));
    }

    pub fn report_completion(&mut self, timings: &ProcessingTimings) {
        self.report_stage(ProcessingStage::Completed);
        self.reporter.report_completion(timings);
    }

    /// Report an error against the current stage
    pub fn report_error(&self, error: &str) {
        let stage = self.current_stage.unwrap_or(ProcessingStage::Decoding);
        self.reporter.report_error(stage, error);
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.start_time.elapsed().as_millis() as u64
    }

    #[must_use]
    pub fn current_stage(&self) -> Option<ProcessingStage> {
        self.current_stage
    }
}
