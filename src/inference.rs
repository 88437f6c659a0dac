//! Delegated segmentation capability
//!
//! Learned models are reached through two traits: a [`BackendFactory`]
//! creates a [`SegmentationBackend`] for a strategy id, and the backend turns
//! an image into a mask-bearing image. Handles are shared read-only between
//! requests once created, so backends must be `Send + Sync`.

use crate::error::{BgRemovalError, Result};
use crate::strategy::StrategyId;
use image::DynamicImage;
use std::sync::Arc;

/// An initialized segmentation capability
pub trait SegmentationBackend: Send + Sync {
    /// Produce an image carrying a foreground mask for `image`
    ///
    /// The result is either RGBA/LA with the mask as alpha or a single-channel
    /// mask, with the same dimensions as the input.
    ///
    /// # Errors
    /// - Model execution failures
    /// - Invalid or unsupported input
    fn segment(&self, image: &DynamicImage) -> Result<DynamicImage>;

    /// Backend name for logs and diagnostics
    fn name(&self) -> &str;
}

/// Creates backends for delegated strategy ids
pub trait BackendFactory: Send + Sync {
    /// Create a backend for `strategy`
    ///
    /// Creation can be expensive (model load); callers cache the handle.
    ///
    /// # Errors
    /// - Unsupported strategy
    /// - Model loading failures
    fn create(&self, strategy: StrategyId) -> Result<Arc<dyn SegmentationBackend>>;

    /// Whether this factory can provide `strategy`
    fn supports(&self, strategy: StrategyId) -> bool;

    /// Strategies this factory can provide
    fn available_strategies(&self) -> Vec<StrategyId> {
        StrategyId::DELEGATED
            .into_iter()
            .filter(|s| self.supports(*s))
            .collect()
    }
}

/// Factory that provides nothing; every delegated id falls back to the classical path
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBackendFactory;

impl BackendFactory for NoBackendFactory {
    fn create(&self, strategy: StrategyId) -> Result<Arc<dyn SegmentationBackend>> {
        Err(BgRemovalError::invalid_config(format!(
            "No segmentation backend configured for strategy '{strategy}'"
        )))
    }

    fn supports(&self, _strategy: StrategyId) -> bool {
        false
    }
}
