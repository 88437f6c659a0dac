//! Test utilities and mock backends for delegated segmentation
//!
//! These mocks stand in for learned models so the orchestration, cache and
//! processor can be tested without model files.

use crate::{
    error::{BgRemovalError, Result},
    inference::{BackendFactory, SegmentationBackend},
    strategy::StrategyId,
};
use image::{DynamicImage, GrayImage, Luma, Rgba, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Shape of the image a mock backend returns
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockOutput {
    /// RGBA with a centered elliptical alpha mask
    Rgba,
    /// Single channel mask
    Mask,
    /// RGB without alpha (malformed for segmentation)
    RgbOnly,
    /// Correct channels but half the input size (malformed)
    WrongSize,
}

/// Mock segmentation backend
#[derive(Debug)]
pub struct MockSegmentationBackend {
    name: String,
    output: MockOutput,
    should_fail: bool,
    /// Call history for verification in tests
    call_history: Arc<Mutex<Vec<String>>>,
}

impl MockSegmentationBackend {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            output: MockOutput::Rgba,
            should_fail: false,
            call_history: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Create a mock backend whose `segment` always fails
    #[must_use]
    pub fn new_failing(name: &str) -> Self {
        let mut backend = Self::new(name);
        backend.should_fail = true;
        backend
    }

    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    /// Get the call history for verification in tests
    pub fn get_call_history(&self) -> Vec<String> {
        self.call_history.lock().unwrap().clone()
    }

    fn record_call(&self, method: &str) {
        if let Ok(mut history) = self.call_history.lock() {
            history.push(method.to_string());
        }
    }

    /// Elliptical foreground covering the middle of the frame
    fn ellipse_alpha(width: u32, height: u32, x: u32, y: u32) -> u8 {
        let cx = width as f32 / 2.0;
        let cy = height as f32 / 2.0;
        let rx = (width as f32 / 3.0).max(1.0);
        let ry = (height as f32 / 3.0).max(1.0);
        let dx = (x as f32 + 0.5 - cx) / rx;
        let dy = (y as f32 + 0.5 - cy) / ry;
        if dx * dx + dy * dy <= 1.0 {
            255
        } else {
            0
        }
    }
}

impl SegmentationBackend for MockSegmentationBackend {
    fn segment(&self, image: &DynamicImage) -> Result<DynamicImage> {
        self.record_call("segment");

        if self.should_fail {
            return Err(BgRemovalError::segmentation(
                self.name.as_str(),
                "Mock backend inference failed",
            ));
        }

        let (width, height) = (image.width(), image.height());
        let result = match self.output {
            MockOutput::Rgba => {
                let rgba = image.to_rgba8();
                DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
                    let p = rgba.get_pixel(x, y).0;
                    Rgba([p[0], p[1], p[2], Self::ellipse_alpha(width, height, x, y)])
                }))
            },
            MockOutput::Mask => DynamicImage::ImageLuma8(GrayImage::from_fn(width, height, |x, y| {
                Luma([Self::ellipse_alpha(width, height, x, y)])
            })),
            MockOutput::RgbOnly => DynamicImage::ImageRgb8(image.to_rgb8()),
            MockOutput::WrongSize => DynamicImage::ImageLuma8(GrayImage::new(
                (width / 2).max(1),
                (height / 2).max(1),
            )),
        };
        Ok(result)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Mock backend factory that counts creations
#[derive(Debug)]
pub struct MockBackendFactory {
    strategies: Vec<StrategyId>,
    output: MockOutput,
    fail_creation: bool,
    fail_inference: bool,
    creations: AtomicUsize,
}

impl MockBackendFactory {
    /// Factory supporting every delegated strategy
    #[must_use]
    pub fn new() -> Self {
        Self::with_strategies(&StrategyId::DELEGATED)
    }

    #[must_use]
    pub fn with_strategies(strategies: &[StrategyId]) -> Self {
        Self {
            strategies: strategies.to_vec(),
            output: MockOutput::Rgba,
            fail_creation: false,
            fail_inference: false,
            creations: AtomicUsize::new(0),
        }
    }

    /// Create a mock factory whose `create` fails
    #[must_use]
    pub fn new_creation_failing() -> Self {
        let mut factory = Self::new();
        factory.fail_creation = true;
        factory
    }

    /// Create a mock factory whose backends fail during inference
    #[must_use]
    pub fn new_inference_failing() -> Self {
        let mut factory = Self::new();
        factory.fail_inference = true;
        factory
    }

    #[must_use]
    pub fn with_output(mut self, output: MockOutput) -> Self {
        self.output = output;
        self
    }

    /// Number of backends created so far
    pub fn creation_count(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }
}

impl Default for MockBackendFactory {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendFactory for MockBackendFactory {
    fn create(&self, strategy: StrategyId) -> Result<Arc<dyn SegmentationBackend>> {
        if self.fail_creation {
            return Err(BgRemovalError::invalid_config(format!(
                "Mock backend creation failed for '{strategy}'"
            )));
        }
        if !self.supports(strategy) {
            return Err(BgRemovalError::invalid_config(format!(
                "Mock factory does not provide '{strategy}'"
            )));
        }

        self.creations.fetch_add(1, Ordering::SeqCst);
        let name = format!("mock-{strategy}");
        let backend = if self.fail_inference {
            MockSegmentationBackend::new_failing(&name)
        } else {
            MockSegmentationBackend::new(&name)
        };
        Ok(Arc::new(backend.with_output(self.output)))
    }

    fn supports(&self, strategy: StrategyId) -> bool {
        self.strategies.contains(&strategy)
    }
}

/// Test image helpers
pub mod test_helpers {
    use image::{DynamicImage, Rgb, RgbImage};

    /// Gradient RGB test image
    pub fn create_test_image(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([
                ((x * 255) / width.max(1)) as u8,
                ((y * 255) / height.max(1)) as u8,
                128,
            ])
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::test_helpers::create_test_image;
    use super::*;

    #[test]
    fn test_mock_backend_segment_rgba() {
        let backend = MockSegmentationBackend::new("mock");
        let out = backend.segment(&create_test_image(30, 20)).unwrap();
        assert_eq!((out.width(), out.height()), (30, 20));
        assert!(out.color().has_alpha());

        let rgba = out.to_rgba8();
        assert_eq!(rgba.get_pixel(15, 10).0[3], 255);
        assert_eq!(rgba.get_pixel(0, 0).0[3], 0);
        assert_eq!(backend.get_call_history(), vec!["segment"]);
    }

    #[test]
    fn test_mock_backend_failure() {
        let backend = MockSegmentationBackend::new_failing("broken");
        let err = backend.segment(&create_test_image(8, 8)).unwrap_err();
        assert!(matches!(err, BgRemovalError::Segmentation { .. }));
    }

    #[test]
    fn test_mock_factory_counts_creations() {
        let factory = MockBackendFactory::with_strategies(&[StrategyId::U2net]);
        assert!(factory.supports(StrategyId::U2net));
        assert!(!factory.supports(StrategyId::Silueta));

        factory.create(StrategyId::U2net).unwrap();
        assert!(factory.create(StrategyId::Silueta).is_err());
        assert_eq!(factory.creation_count(), 1);
    }

    #[test]
    fn test_mock_factory_creation_failure() {
        let factory = MockBackendFactory::new_creation_failing();
        assert!(factory.create(StrategyId::U2net).is_err());
        assert_eq!(factory.creation_count(), 0);
    }
}
