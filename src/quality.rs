//! Quality-preserving pre- and post-processing around segmentation
//!
//! Preprocessing bounds the working resolution and cleans the image before
//! segmentation. Postprocessing restores the source resolution and repairs
//! mask artifacts. Both return new images and never touch their inputs.

use crate::config::{QualityTier, DEFAULT_MAX_DIMENSION};
use crate::error::{BgRemovalError, Result};
use crate::features::{CANNY_HIGH, CANNY_LOW};
use crate::types::RasterImage;
use crate::utils::filters::{adjust_contrast, bilateral_filter, canny, gaussian_blur, unsharp_mask};
use crate::utils::morphology::{close, dilate, open, StructuringElement};
use image::imageops::{self, FilterType};
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use tracing::{debug, info_span};

/// Bilateral smoothing: neighbourhood diameter, color sigma, space sigma
pub const BILATERAL_DIAMETER: u32 = 9;
pub const BILATERAL_SIGMA_COLOR: f32 = 75.0;
pub const BILATERAL_SIGMA_SPACE: f32 = 75.0;

/// Multiplicative contrast boost around the mean luminance
pub const CONTRAST_FACTOR: f32 = 1.1;

/// Unsharp mask: blur radius, amount in percent, threshold
pub const UNSHARP_RADIUS: f32 = 1.0;
pub const UNSHARP_PERCENT: u32 = 120;
pub const UNSHARP_THRESHOLD: u8 = 3;

/// Resampling filter used for both downscaling and restoring
pub const RESAMPLE_FILTER: FilterType = FilterType::Lanczos3;

/// Proportional downscale so the long edge equals `ceiling`, rounded
///
/// Dimensions already within the ceiling are returned unchanged.
#[must_use]
pub fn downscaled_dimensions((width, height): (u32, u32), ceiling: u32) -> (u32, u32) {
    let long_edge = width.max(height);
    if long_edge <= ceiling || long_edge == 0 {
        return (width, height);
    }
    let scale = f64::from(ceiling) / f64::from(long_edge);
    let scaled = |dim: u32| ((f64::from(dim) * scale).round() as u32).clamp(1, ceiling);
    (scaled(width), scaled(height))
}

/// Tier-bounded output dimensions; never upscales
///
/// Each edge is rounded to the nearest pixel so the aspect ratio stays as
/// close to the source as integer dimensions allow.
#[must_use]
pub fn optimal_dimensions((width, height): (u32, u32), tier: QualityTier) -> (u32, u32) {
    let ceiling = tier.max_dimension();
    let long_edge = width.max(height);
    if long_edge <= ceiling {
        return (width, height);
    }
    let scale = f64::from(ceiling) / f64::from(long_edge);
    let scaled = |dim: u32| ((f64::from(dim) * scale).round() as u32).clamp(1, ceiling);
    (scaled(width), scaled(height))
}

/// Pre/post-processing stages around segmentation
#[derive(Debug, Clone)]
pub struct QualityPipeline {
    max_dimension: u32,
}

impl Default for QualityPipeline {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_DIMENSION)
    }
}

impl QualityPipeline {
    #[must_use]
    pub fn new(max_dimension: u32) -> Self {
        Self {
            max_dimension: max_dimension.max(1),
        }
    }

    #[must_use]
    pub fn max_dimension(&self) -> u32 {
        self.max_dimension
    }

    /// Working resolution the preprocessor will produce for `dimensions`
    #[must_use]
    pub fn working_dimensions(&self, dimensions: (u32, u32)) -> (u32, u32) {
        downscaled_dimensions(dimensions, self.max_dimension)
    }

    /// Normalize, bound resolution, denoise, boost contrast and sharpen
    ///
    /// Alpha, when present, is carried through untouched apart from resizing.
    pub fn preprocess(&self, image: &RasterImage) -> Result<RasterImage> {
        let span = info_span!("preprocess", width = image.width(), height = image.height());
        let _enter = span.enter();

        let keep_alpha = image.has_alpha_channel();
        let mut rgba = image.to_rgba8();

        let (width, height) = self.working_dimensions(image.dimensions());
        if (width, height) != image.dimensions() {
            debug!(from = ?image.dimensions(), to = ?(width, height), "Downscaling for segmentation");
            rgba = imageops::resize(&rgba, width, height, RESAMPLE_FILTER);
        }

        let (rgb, alpha) = split_alpha(&rgba);
        let rgb = bilateral_filter(&rgb, BILATERAL_DIAMETER, BILATERAL_SIGMA_COLOR, BILATERAL_SIGMA_SPACE);
        let rgb = adjust_contrast(&rgb, CONTRAST_FACTOR);
        let rgb = unsharp_mask(&rgb, UNSHARP_RADIUS, UNSHARP_PERCENT, UNSHARP_THRESHOLD);

        let output = if keep_alpha {
            DynamicImage::ImageRgba8(merge_alpha(&rgb, &alpha)?)
        } else {
            DynamicImage::ImageRgb8(rgb)
        };
        RasterImage::from_dynamic(output)
    }

    /// Restore source resolution, smooth the alpha channel and soften edge halos
    pub fn postprocess(&self, result: &RasterImage, original: &RasterImage) -> Result<RasterImage> {
        let span = info_span!(
            "postprocess",
            width = original.width(),
            height = original.height()
        );
        let _enter = span.enter();

        let restore = result.dimensions() != original.dimensions();
        if !result.has_alpha_channel() {
            if !restore {
                return Ok(result.clone());
            }
            let (width, height) = original.dimensions();
            let resized = result.as_dynamic().resize_exact(width, height, RESAMPLE_FILTER);
            return RasterImage::from_dynamic(resized);
        }

        let mut rgba = result.to_rgba8();
        if restore {
            debug!(from = ?result.dimensions(), to = ?original.dimensions(), "Restoring source resolution");
            rgba = imageops::resize(&rgba, original.width(), original.height(), RESAMPLE_FILTER);
        }

        let (rgb, alpha) = split_alpha(&rgba);
        let alpha = smooth_alpha(&alpha);
        let rgb = refine_edges(&rgb, &alpha);

        RasterImage::from_dynamic(DynamicImage::ImageRgba8(merge_alpha(&rgb, &alpha)?))
    }

    /// Resize `result` back to the original dimensions without any refinement
    pub fn restore_resolution(&self, result: &RasterImage, original: &RasterImage) -> Result<RasterImage> {
        if result.dimensions() == original.dimensions() {
            return Ok(result.clone());
        }
        let (width, height) = original.dimensions();
        RasterImage::from_dynamic(result.as_dynamic().resize_exact(width, height, RESAMPLE_FILTER))
    }
}

/// Gaussian 3x3 then close and open with a 3x3 ellipse
#[must_use]
pub fn smooth_alpha(alpha: &GrayImage) -> GrayImage {
    let kernel = StructuringElement::ellipse(3);
    let blurred = gaussian_blur(alpha, 3, 0.8);
    open(&close(&blurred, kernel), kernel)
}

/// Blur color only on the dilated edge band of the alpha channel
#[must_use]
pub fn refine_edges(rgb: &RgbImage, alpha: &GrayImage) -> RgbImage {
    let band = dilate(&canny(alpha, CANNY_LOW, CANNY_HIGH), StructuringElement::square(2));
    if band.pixels().all(|p| p.0[0] == 0) {
        return rgb.clone();
    }

    let softened = gaussian_blur(rgb, 3, 0.5);
    let mut out = rgb.clone();
    for ((dst, soft), edge) in out.pixels_mut().zip(softened.pixels()).zip(band.pixels()) {
        if edge.0[0] > 0 {
            *dst = *soft;
        }
    }
    out
}

fn split_alpha(rgba: &RgbaImage) -> (RgbImage, GrayImage) {
    let (width, height) = rgba.dimensions();
    let mut rgb = RgbImage::new(width, height);
    let mut alpha = GrayImage::new(width, height);
    for ((src, color), a) in rgba.pixels().zip(rgb.pixels_mut()).zip(alpha.pixels_mut()) {
        let [r, g, b, alpha_value] = src.0;
        color.0 = [r, g, b];
        a.0 = [alpha_value];
    }
    (rgb, alpha)
}

fn merge_alpha(rgb: &RgbImage, alpha: &GrayImage) -> Result<RgbaImage> {
    if rgb.dimensions() != alpha.dimensions() {
        return Err(BgRemovalError::processing_stage_error(
            "postprocessing",
            "color and alpha planes differ in size",
            None,
        ));
    }
    let (width, height) = rgb.dimensions();
    let mut rgba = RgbaImage::new(width, height);
    for ((dst, color), a) in rgba.pixels_mut().zip(rgb.pixels()).zip(alpha.pixels()) {
        let [r, g, b] = color.0;
        dst.0 = [r, g, b, a.0[0]];
    }
    Ok(rgba)
}
