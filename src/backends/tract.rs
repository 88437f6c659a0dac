//! Tract backend for delegated segmentation models
//!
//! Loads `<model_dir>/<strategy>.onnx` with Tract, a pure Rust inference
//! library, and turns the model's saliency output into an alpha channel.

use crate::error::{BgRemovalError, Result};
use crate::inference::{BackendFactory, SegmentationBackend};
use crate::strategy::StrategyId;
use image::imageops::FilterType;
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use instant::Instant;
use ndarray::Array4;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tract_onnx::prelude::*;

type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

/// Input geometry and normalization a model was trained with
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ModelProfile {
    pub input_size: usize,
    pub mean: [f32; 3],
    pub std: [f32; 3],
}

impl ModelProfile {
    /// Profile for a delegated strategy, `None` for classical ids
    #[must_use]
    pub fn for_strategy(strategy: StrategyId) -> Option<Self> {
        match strategy {
            StrategyId::U2net | StrategyId::U2netHumanSeg | StrategyId::Silueta => Some(Self {
                input_size: 320,
                mean: [0.485, 0.456, 0.406],
                std: [0.229, 0.224, 0.225],
            }),
            StrategyId::IsnetGeneralUse => Some(Self {
                input_size: 1024,
                mean: [0.5, 0.5, 0.5],
                std: [1.0, 1.0, 1.0],
            }),
            StrategyId::Enhanced | StrategyId::Simple => None,
        }
    }

    /// NCHW tensor of `image` resized to the model input
    #[must_use]
    pub fn to_tensor(&self, image: &DynamicImage) -> Array4<f32> {
        let size = self.input_size;
        let resized = image
            .resize_exact(size as u32, size as u32, FilterType::Lanczos3)
            .to_rgb8();

        let mut tensor = Array4::<f32>::zeros((1, 3, size, size));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                let value = (f32::from(pixel[c]) / 255.0 - self.mean[c]) / self.std[c];
                tensor[[0, c, y as usize, x as usize]] = value;
            }
        }
        tensor
    }
}

/// Min-max normalize a single-channel model output into a mask image
pub fn output_to_mask(values: &[f32], width: u32, height: u32) -> Result<GrayImage> {
    if values.len() != (width as usize) * (height as usize) {
        return Err(BgRemovalError::processing(format!(
            "Model output has {} values, expected {width}x{height}",
            values.len()
        )));
    }

    let (min, max) = values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
    let range = max - min;
    let data = values
        .iter()
        .map(|&v| {
            let normalized = if range > f32::EPSILON { (v - min) / range } else { 0.0 };
            (normalized.clamp(0.0, 1.0) * 255.0).round() as u8
        })
        .collect();

    GrayImage::from_raw(width, height, data)
        .ok_or_else(|| BgRemovalError::internal("Mask buffer size mismatch"))
}

/// Tract backend for one segmentation model
#[derive(Debug)]
pub struct TractBackend {
    name: String,
    strategy: StrategyId,
    profile: ModelProfile,
    model: TractModel,
}

impl TractBackend {
    /// Load and optimize the ONNX model at `path`
    ///
    /// # Errors
    /// - Classical strategy ids
    /// - Missing or unreadable model file
    /// - Model graph Tract cannot optimize
    pub fn load(strategy: StrategyId, path: &Path) -> Result<Self> {
        let profile = ModelProfile::for_strategy(strategy).ok_or_else(|| {
            BgRemovalError::invalid_config(format!("Strategy '{strategy}' has no model"))
        })?;
        let load_start = Instant::now();

        log::info!("Loading model for {strategy} from {}", path.display());
        let size = profile.input_size;
        let model = onnx()
            .model_for_path(path)
            .map_err(|e| BgRemovalError::invalid_config(format!("Failed to load ONNX model: {e}")))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| BgRemovalError::invalid_config(format!("Failed to set model input: {e}")))?
            .into_optimized()
            .map_err(|e| BgRemovalError::invalid_config(format!("Failed to optimize model: {e}")))?
            .into_runnable()
            .map_err(|e| {
                BgRemovalError::invalid_config(format!("Failed to create runnable model: {e}"))
            })?;

        log::info!(
            "Tract backend for {strategy} ready in {}ms",
            load_start.elapsed().as_millis()
        );

        Ok(Self {
            name: format!("tract-{strategy}"),
            strategy,
            profile,
            model,
        })
    }

    #[must_use]
    pub fn profile(&self) -> ModelProfile {
        self.profile
    }

    fn infer(&self, input: Array4<f32>) -> Result<(Vec<f32>, u32, u32)> {
        let strategy = self.strategy.as_str();
        let outputs = self
            .model
            .run(tvec![Tensor::from(input).into()])
            .map_err(|e| BgRemovalError::segmentation(strategy, format!("Tract inference failed: {e}")))?;

        let output = outputs
            .into_iter()
            .next()
            .ok_or_else(|| BgRemovalError::segmentation(strategy, "No output tensor found"))?;
        let view = output.to_array_view::<f32>().map_err(|e| {
            BgRemovalError::segmentation(strategy, format!("Failed to read output tensor: {e}"))
        })?;

        let shape = view.shape();
        let (height, width) = match shape {
            [1, 1, h, w] | [1, h, w] => (*h, *w),
            _ => {
                return Err(BgRemovalError::segmentation(
                    strategy,
                    format!("Unexpected output tensor shape {shape:?}"),
                ))
            },
        };
        Ok((view.iter().copied().collect(), width as u32, height as u32))
    }
}

impl SegmentationBackend for TractBackend {
    fn segment(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let inference_start = Instant::now();
        let tensor = self.profile.to_tensor(image);
        let (values, out_width, out_height) = self.infer(tensor)?;

        let mask = output_to_mask(&values, out_width, out_height)?;
        let (width, height) = (image.width(), image.height());
        let mask = image::imageops::resize(&mask, width, height, FilterType::Lanczos3);

        let rgba = image.to_rgba8();
        let result = RgbaImage::from_fn(width, height, |x, y| {
            let p = rgba.get_pixel(x, y).0;
            let Luma([alpha]) = *mask.get_pixel(x, y);
            Rgba([p[0], p[1], p[2], alpha])
        });

        log::debug!(
            "{} segmented {width}x{height} in {}ms",
            self.name,
            inference_start.elapsed().as_millis()
        );
        Ok(DynamicImage::ImageRgba8(result))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Creates Tract backends from a directory of `<strategy>.onnx` files
#[derive(Debug, Clone)]
pub struct TractBackendFactory {
    model_dir: PathBuf,
}

impl TractBackendFactory {
    #[must_use]
    pub fn new<P: Into<PathBuf>>(model_dir: P) -> Self {
        Self {
            model_dir: model_dir.into(),
        }
    }

    /// Model file location for `strategy`
    #[must_use]
    pub fn model_path(&self, strategy: StrategyId) -> PathBuf {
        self.model_dir.join(format!("{}.onnx", strategy.as_str()))
    }
}

impl BackendFactory for TractBackendFactory {
    fn create(&self, strategy: StrategyId) -> Result<Arc<dyn SegmentationBackend>> {
        if !self.supports(strategy) {
            return Err(BgRemovalError::invalid_config(format!(
                "No model for '{strategy}' in {}",
                self.model_dir.display()
            )));
        }
        Ok(Arc::new(TractBackend::load(strategy, &self.model_path(strategy))?))
    }

    fn supports(&self, strategy: StrategyId) -> bool {
        strategy.is_delegated() && self.model_path(strategy).is_file()
    }
}
