//! Segmentation orchestration
//!
//! Chooses between the delegated path (a learned model reached through a
//! [`BackendFactory`]) and the classical in-process algorithms, and checks
//! that whatever comes back actually carries a mask.

use crate::classical::{ClassicalSegmenter, CueDiagnostics};
use crate::error::{BgRemovalError, Result};
use crate::inference::{BackendFactory, SegmentationBackend};
use crate::session_cache::SessionCache;
use crate::strategy::StrategyId;
use crate::types::{RasterImage, SegmentationMask};
use std::sync::Arc;
use tracing::{debug, info, instrument};

/// Name reported for masks produced in-process
pub const CLASSICAL_BACKEND_NAME: &str = "classical";

/// Mask-bearing output of one segmentation run
#[derive(Debug, Clone)]
pub struct SegmentationOutput {
    /// Working-resolution image with the mask as alpha
    pub image: RasterImage,
    pub mask: SegmentationMask,
    /// Strategy that was requested
    pub strategy: StrategyId,
    /// Whether the classical path produced the mask
    pub classical_path: bool,
    /// Backend that produced the mask
    pub backend: String,
    /// Cue measurements from the classical `enhanced` algorithm
    pub diagnostics: Option<CueDiagnostics>,
}

/// Routes a strategy id to the delegated or classical path
pub struct SegmentationOrchestrator {
    classical: ClassicalSegmenter,
    factory: Option<Arc<dyn BackendFactory>>,
    cache: Arc<SessionCache>,
    use_cache: bool,
}

impl std::fmt::Debug for SegmentationOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentationOrchestrator")
            .field("classical", &self.classical)
            .field("has_factory", &self.factory.is_some())
            .field("use_cache", &self.use_cache)
            .finish_non_exhaustive()
    }
}

impl Default for SegmentationOrchestrator {
    fn default() -> Self {
        Self::new(None, Arc::new(SessionCache::new()))
    }
}

impl SegmentationOrchestrator {
    #[must_use]
    pub fn new(factory: Option<Arc<dyn BackendFactory>>, cache: Arc<SessionCache>) -> Self {
        Self {
            classical: ClassicalSegmenter::new(),
            factory,
            cache,
            use_cache: true,
        }
    }

    /// Bypass the handle cache and create a fresh backend per request
    #[must_use]
    pub fn with_cache_disabled(mut self, disabled: bool) -> Self {
        self.use_cache = !disabled;
        self
    }

    #[must_use]
    pub fn with_classical(mut self, classical: ClassicalSegmenter) -> Self {
        self.classical = classical;
        self
    }

    /// Whether `strategy` would run on the delegated path
    #[must_use]
    pub fn is_delegated(&self, strategy: StrategyId) -> bool {
        strategy.is_delegated()
            && self
                .factory
                .as_ref()
                .is_some_and(|factory| factory.supports(strategy))
    }

    /// Segment `image` with `strategy`
    ///
    /// # Errors
    /// - Delegated backend creation or inference failures
    /// - Delegated results without a mask or with mismatched dimensions
    #[instrument(skip(self, image), fields(strategy = %strategy, width = image.width(), height = image.height()))]
    pub fn segment(&self, strategy: StrategyId, image: &RasterImage) -> Result<SegmentationOutput> {
        match &self.factory {
            Some(factory) if strategy.is_delegated() && factory.supports(strategy) => {
                self.segment_delegated(strategy, factory.as_ref(), image)
            },
            _ => {
                if strategy.is_delegated() {
                    info!("No backend provides {strategy}, using classical enhanced segmentation");
                }
                self.segment_classical(strategy, image)
            },
        }
    }

    fn segment_classical(&self, strategy: StrategyId, image: &RasterImage) -> Result<SegmentationOutput> {
        let algorithm = if strategy == StrategyId::Simple {
            StrategyId::Simple
        } else {
            StrategyId::Enhanced
        };
        let output = self.classical.segment(algorithm, image)?;
        Ok(SegmentationOutput {
            image: output.image,
            mask: output.mask,
            strategy,
            classical_path: true,
            backend: format!("{CLASSICAL_BACKEND_NAME}-{algorithm}"),
            diagnostics: output.diagnostics,
        })
    }

    fn segment_delegated(
        &self,
        strategy: StrategyId,
        factory: &dyn BackendFactory,
        image: &RasterImage,
    ) -> Result<SegmentationOutput> {
        let backend = self.backend_for(strategy, factory)?;
        debug!(backend = backend.name(), "Running delegated segmentation");

        let result = backend.segment(image.as_dynamic()).map_err(|e| match e {
            BgRemovalError::Segmentation { .. } => e,
            other => BgRemovalError::segmentation(strategy.as_str(), other.to_string()),
        })?;
        let (image, mask) = validate_delegated_result(strategy, image, result)?;

        Ok(SegmentationOutput {
            image,
            mask,
            strategy,
            classical_path: false,
            backend: backend.name().to_string(),
            diagnostics: None,
        })
    }

    fn backend_for(
        &self,
        strategy: StrategyId,
        factory: &dyn BackendFactory,
    ) -> Result<Arc<dyn SegmentationBackend>> {
        let created = if self.use_cache {
            self.cache.get_or_create(strategy, factory)
        } else {
            factory.create(strategy)
        };
        created.map_err(|e| {
            BgRemovalError::segmentation(strategy.as_str(), format!("backend unavailable: {e}"))
        })
    }
}

/// Check a delegated result and split it into an RGBA image and its mask
///
/// Single-channel results are treated as the mask and applied to `input`.
fn validate_delegated_result(
    strategy: StrategyId,
    input: &RasterImage,
    result: image::DynamicImage,
) -> Result<(RasterImage, SegmentationMask)> {
    let result_dims = (result.width(), result.height());
    if result_dims != input.dimensions() {
        return Err(BgRemovalError::segmentation(
            strategy.as_str(),
            format!(
                "backend returned {}x{} for a {}x{} input",
                result_dims.0,
                result_dims.1,
                input.width(),
                input.height()
            ),
        ));
    }

    let color = result.color();
    if !color.has_alpha() && color.channel_count() != 1 {
        return Err(BgRemovalError::segmentation(
            strategy.as_str(),
            format!("backend returned {color:?} without a mask component"),
        ));
    }

    let mask = SegmentationMask::from_dynamic(&result)
        .map_err(|e| BgRemovalError::segmentation(strategy.as_str(), e.to_string()))?;
    let image = if color.has_alpha() {
        RasterImage::from_dynamic(image::DynamicImage::ImageRgba8(result.to_rgba8()))?
    } else {
        mask.apply_to(input)?
    };
    Ok((image, mask))
}
