//! Shared fixtures for integration tests
//!
//! Synthetic images and mock delegated backends; no models are needed.

#![allow(dead_code)]

use bgremove_pipeline::{
    BackendFactory, BgRemovalError, PipelineConfig, RasterImage, Result, SegmentationBackend,
    StrategyId,
};
use image::{DynamicImage, GrayImage, ImageFormat, Luma, Rgb, RgbImage, RgbaImage};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Mask shape a mock backend produces
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MaskShape {
    /// Alpha 255 everywhere
    Opaque,
    /// Centered ellipse, transparent outside
    Ellipse,
}

pub struct MaskBackend {
    shape: MaskShape,
    name: String,
}

impl SegmentationBackend for MaskBackend {
    fn segment(&self, image: &DynamicImage) -> Result<DynamicImage> {
        let mut rgba = image.to_rgba8();
        let (width, height) = rgba.dimensions();
        let (cx, cy) = (width as f32 / 2.0, height as f32 / 2.0);
        let (rx, ry) = ((width as f32 / 3.0).max(1.0), (height as f32 / 3.0).max(1.0));
        for (x, y, pixel) in rgba.enumerate_pixels_mut() {
            pixel.0[3] = match self.shape {
                MaskShape::Opaque => 255,
                MaskShape::Ellipse => {
                    let dx = (x as f32 - cx) / rx;
                    let dy = (y as f32 - cy) / ry;
                    if dx * dx + dy * dy <= 1.0 {
                        255
                    } else {
                        0
                    }
                },
            };
        }
        Ok(DynamicImage::ImageRgba8(rgba))
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Factory serving every delegated strategy with one mask shape
pub struct MaskFactory {
    shape: MaskShape,
    fail: bool,
    creations: AtomicUsize,
}

impl MaskFactory {
    pub fn new(shape: MaskShape) -> Self {
        Self {
            shape,
            fail: false,
            creations: AtomicUsize::new(0),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::new(MaskShape::Opaque)
        }
    }

    pub fn creations(&self) -> usize {
        self.creations.load(Ordering::SeqCst)
    }
}

impl BackendFactory for MaskFactory {
    fn create(&self, strategy: StrategyId) -> Result<Arc<dyn SegmentationBackend>> {
        self.creations.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(BgRemovalError::processing(format!("model for {strategy} is corrupt")));
        }
        Ok(Arc::new(MaskBackend {
            shape: self.shape,
            name: format!("mask-{strategy}"),
        }))
    }

    fn supports(&self, strategy: StrategyId) -> bool {
        strategy.is_delegated()
    }
}

pub fn factory(shape: MaskShape) -> Arc<dyn BackendFactory> {
    Arc::new(MaskFactory::new(shape))
}

pub fn processor(
    config: PipelineConfig,
    shape: MaskShape,
) -> bgremove_pipeline::BackgroundRemovalProcessor {
    bgremove_pipeline::BackgroundRemovalProcessor::with_factory(config, Some(factory(shape)))
        .expect("valid configuration")
}

/// Gradient background with a darker rectangle in the middle
pub fn photo_like(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let inside = x > width / 3 && x < 2 * width / 3 && y > height / 4 && y < 3 * height / 4;
        if inside {
            Rgb([40, 70, (x % 64) as u8 + 100])
        } else {
            let shade = (200 + (x * 40 / width.max(1))) as u8;
            Rgb([shade, shade, (shade as u32 * 9 / 10) as u8])
        }
    })
}

/// Object on a plain white background
pub fn product_on_white(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        let dx = x as i64 - i64::from(width / 2);
        let dy = y as i64 - i64::from(height / 2);
        let r = i64::from(width.min(height) / 4);
        if dx * dx + dy * dy < r * r {
            Rgb([180, 40, 40])
        } else {
            Rgb([255, 255, 255])
        }
    })
}

/// RGBA image whose left half is fully transparent
pub fn half_transparent(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, y| {
        if x < width / 2 {
            image::Rgba([0, 0, 0, 0])
        } else {
            image::Rgba([(x % 256) as u8, (y % 256) as u8, 128, 255])
        }
    })
}

pub fn gray_ramp(width: u32, height: u32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, _| Luma([(x * 255 / width.max(1)) as u8]))
}

pub fn raster(image: DynamicImage) -> RasterImage {
    RasterImage::from_dynamic(image).expect("non-empty image")
}

pub fn encode(image: &DynamicImage, format: ImageFormat) -> Vec<u8> {
    let mut bytes = Vec::new();
    image
        .write_to(&mut std::io::Cursor::new(&mut bytes), format)
        .expect("encodable test image");
    bytes
}
