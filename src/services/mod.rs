//! Service layer: output formats, encoding and progress reporting

pub mod encoders;
pub mod format;
pub mod optimizer;
pub mod progress;

pub use encoders::{DefaultEncoder, FormatEncoder};
pub use format::{choose_format, estimate_size, is_photographic_hint, EncodeConfig};
pub use optimizer::{prepare_for_format, FormatOptimizer};
pub use progress::{
    NoOpProgressReporter, ProcessingStage, ProgressReporter, ProgressTracker, ProgressUpdate,
    TracingProgressReporter,
};
