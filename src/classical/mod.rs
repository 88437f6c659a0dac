//! Classical in-process segmentation
//!
//! Two strategies run without any learned model:
//!
//! - `enhanced` computes three cues: a bright/low-saturation background
//!   hint, a dilated edge map and a rectangle-seeded graph-cut labeling.
//!   Only the seeded labeling (or its Otsu threshold fallback) becomes the
//!   emitted mask; the other two cues are reported as diagnostics.
//! - `simple` thresholds blurred intensity against its local Gaussian mean
//!   and inverts the result.

pub mod grabcut;
pub mod maxflow;

use crate::error::{BgRemovalError, Result};
use crate::features::{CANNY_HIGH, CANNY_LOW};
use crate::strategy::StrategyId;
use crate::types::{RasterImage, SegmentationMask};
use crate::utils::color::{grayscale, rgb_to_hsv};
use crate::utils::filters::{adaptive_threshold_gaussian, canny, gaussian_blur};
use crate::utils::morphology::{close, dilate, open, StructuringElement};
use grabcut::{GrabCut, Rect};
use image::imageops::{self, FilterType};
use image::{GrayImage, Luma, RgbImage};
use serde::{Deserialize, Serialize};
use tracing::{debug, info_span, warn};

/// Graph-cut refinement rounds
pub const GRABCUT_ITERATIONS: usize = 5;

/// Long-edge cap of the copy the graph cut runs on
pub const GRABCUT_MAX_DIMENSION: u32 = 512;

/// Background hint: saturation at most this value...
pub const BACKGROUND_MAX_SATURATION: u8 = 30;
/// ...and value at least this one
pub const BACKGROUND_MIN_VALUE: u8 = 200;

/// How the seeded labeling was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SeedMethod {
    GraphCut,
    OtsuThreshold,
}

/// Cue measurements reported alongside an `enhanced` mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CueDiagnostics {
    /// Fraction of pixels matching the bright low-saturation background hint
    pub background_hint_fraction: f64,
    /// Fraction of pixels on the dilated edge map
    pub edge_fraction: f64,
    pub seed_method: SeedMethod,
    /// Fraction of mask values above 127
    pub foreground_fraction: f64,
}

/// Mask-bearing result of a classical strategy
#[derive(Debug, Clone)]
pub struct ClassicalOutput {
    /// Source color with the mask as alpha
    pub image: RasterImage,
    pub mask: SegmentationMask,
    pub diagnostics: Option<CueDiagnostics>,
}

/// Runs the classical strategies
#[derive(Debug, Clone)]
pub struct ClassicalSegmenter {
    iterations: usize,
    max_working_dimension: u32,
}

impl Default for ClassicalSegmenter {
    fn default() -> Self {
        Self {
            iterations: GRABCUT_ITERATIONS,
            max_working_dimension: GRABCUT_MAX_DIMENSION,
        }
    }
}

impl ClassicalSegmenter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the graph-cut working resolution cap
    #[must_use]
    pub fn with_max_working_dimension(mut self, dimension: u32) -> Self {
        self.max_working_dimension = dimension.max(1);
        self
    }

    /// `simple` for the simple strategy, `enhanced` for everything else
    pub fn segment(&self, strategy: StrategyId, image: &RasterImage) -> Result<ClassicalOutput> {
        match strategy {
            StrategyId::Simple => self.simple(image),
            _ => self.enhanced(image),
        }
    }

    /// Seeded graph-cut segmentation with cue diagnostics
    pub fn enhanced(&self, image: &RasterImage) -> Result<ClassicalOutput> {
        let span = info_span!("classical_enhanced", width = image.width(), height = image.height());
        let _enter = span.enter();

        let rgb = image.to_rgb8();
        let gray = grayscale(&rgb);

        let hint = background_hint(&rgb);
        let edges = edge_cue(&gray);
        let (labels, seed_method) = self.seeded_labels(&rgb, &gray);

        let (width, height) = rgb.dimensions();
        let raw = GrayImage::from_fn(width, height, |x, y| {
            let index = y as usize * width as usize + x as usize;
            Luma([if labels.get(index).copied().unwrap_or(false) { 255 } else { 0 }])
        });
        let mask = clean_mask(&raw);

        let diagnostics = CueDiagnostics {
            background_hint_fraction: nonzero_fraction(&hint),
            edge_fraction: nonzero_fraction(&edges),
            seed_method,
            foreground_fraction: above_fraction(&mask, 127),
        };
        debug!(?diagnostics, "Classical enhanced segmentation finished");

        compose(image, &mask, Some(diagnostics))
    }

    /// Adaptive-threshold segmentation
    pub fn simple(&self, image: &RasterImage) -> Result<ClassicalOutput> {
        let span = info_span!("classical_simple", width = image.width(), height = image.height());
        let _enter = span.enter();

        let gray = grayscale(&image.to_rgb8());
        let blurred = gaussian_blur(&gray, 5, 0.0);
        let thresholded = adaptive_threshold_gaussian(&blurred, 11, 2.0);

        let kernel = StructuringElement::square(3);
        let mut cleaned = open(&close(&thresholded, kernel), kernel);
        for pixel in cleaned.pixels_mut() {
            pixel.0[0] = 255 - pixel.0[0];
        }
        let mask = gaussian_blur(&cleaned, 3, 0.0);

        compose(image, &mask, None)
    }

    /// Graph-cut labels at full resolution, or Otsu labels when it fails
    fn seeded_labels(&self, rgb: &RgbImage, gray: &GrayImage) -> (Vec<bool>, SeedMethod) {
        match self.graph_cut_labels(rgb) {
            Ok(labels) => (labels, SeedMethod::GraphCut),
            Err(e) => {
                warn!(error = %e, "Seeded foreground extraction failed, using global threshold");
                (otsu_labels(gray), SeedMethod::OtsuThreshold)
            },
        }
    }

    fn graph_cut_labels(&self, rgb: &RgbImage) -> Result<Vec<bool>> {
        let (width, height) = rgb.dimensions();
        let long_edge = width.max(height);

        let working = if long_edge > self.max_working_dimension {
            let scale = f64::from(self.max_working_dimension) / f64::from(long_edge);
            let w = ((f64::from(width) * scale).round() as u32).max(1);
            let h = ((f64::from(height) * scale).round() as u32).max(1);
            imageops::resize(rgb, w, h, FilterType::Triangle)
        } else {
            rgb.clone()
        };

        let (ww, wh) = working.dimensions();
        let labels = GrabCut::new(&working, Rect::centered(ww, wh))?.run(self.iterations)?;
        if (ww, wh) == (width, height) {
            return Ok(labels);
        }

        let small = GrayImage::from_raw(
            ww,
            wh,
            labels.iter().map(|&fg| if fg { 255 } else { 0 }).collect(),
        )
        .ok_or_else(|| BgRemovalError::internal("label map size mismatch"))?;
        let restored = imageops::resize(&small, width, height, FilterType::Nearest);
        Ok(restored.pixels().map(|p| p.0[0] > 127).collect())
    }
}

/// Cue (i): pixels that look like a bright, unsaturated background (255)
#[must_use]
pub fn background_hint(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    let mut hint = GrayImage::new(width, height);
    for (dst, src) in hint.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = src.0;
        let (_, s, v) = rgb_to_hsv(r, g, b);
        let matches = s <= BACKGROUND_MAX_SATURATION && v >= BACKGROUND_MIN_VALUE;
        *dst = Luma([if matches { 255 } else { 0 }]);
    }
    hint
}

/// Cue (ii): Canny edges thickened by one 3x3 dilation
#[must_use]
pub fn edge_cue(gray: &GrayImage) -> GrayImage {
    dilate(&canny(gray, CANNY_LOW, CANNY_HIGH), StructuringElement::square(3))
}

/// Foreground where intensity exceeds the Otsu level
#[must_use]
pub fn otsu_labels(gray: &GrayImage) -> Vec<bool> {
    let level = imageproc::contrast::otsu_level(gray);
    gray.pixels().map(|p| p.0[0] > level).collect()
}

/// Close then open with a 5x5 ellipse, then a light 3x3 blur
fn clean_mask(raw: &GrayImage) -> GrayImage {
    let kernel = StructuringElement::ellipse(5);
    gaussian_blur(&open(&close(raw, kernel), kernel), 3, 0.0)
}

fn compose(image: &RasterImage, mask: &GrayImage, diagnostics: Option<CueDiagnostics>) -> Result<ClassicalOutput> {
    let mask = SegmentationMask::from_image(mask);
    let image = mask.apply_to(image)?;
    Ok(ClassicalOutput {
        image,
        mask,
        diagnostics,
    })
}

fn nonzero_fraction(image: &GrayImage) -> f64 {
    above_fraction(image, 0)
}

fn above_fraction(image: &GrayImage, level: u8) -> f64 {
    let total = image.pixels().len();
    if total == 0 {
        return 0.0;
    }
    image.pixels().filter(|p| p.0[0] > level).count() as f64 / total as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgb};

    fn raster(image: RgbImage) -> RasterImage {
        RasterImage::from_dynamic(DynamicImage::ImageRgb8(image)).unwrap()
    }

    fn object_on_white(size: u32) -> RgbImage {
        let mut image = RgbImage::from_pixel(size, size, Rgb([245, 245, 245]));
        let (lo, hi) = (size * 3 / 8, size * 5 / 8);
        for y in lo..hi {
            for x in lo..hi {
                image.put_pixel(x, y, Rgb([150, 30, 40]));
            }
        }
        image
    }

    #[test]
    fn test_enhanced_output_is_aligned_rgba() {
        let source = raster(object_on_white(64));
        let output = ClassicalSegmenter::new().enhanced(&source).unwrap();

        assert_eq!(output.image.dimensions(), (64, 64));
        assert!(output.image.has_alpha_channel());
        assert_eq!(output.mask.dimensions, (64, 64));
        assert_eq!(output.image.to_rgb8(), source.to_rgb8());

        let diagnostics = output.diagnostics.unwrap();
        assert_eq!(diagnostics.seed_method, SeedMethod::GraphCut);
        assert!(diagnostics.background_hint_fraction > 0.5);
        assert!(diagnostics.edge_fraction > 0.0);
    }

    #[test]
    fn test_enhanced_marks_object_and_drops_border() {
        let output = ClassicalSegmenter::new().enhanced(&raster(object_on_white(64))).unwrap();
        let mask = output.mask.to_image().unwrap();
        assert!(mask.get_pixel(32, 32).0[0] > 200);
        assert!(mask.get_pixel(1, 1).0[0] < 50);
    }

    #[test]
    fn test_working_copy_labels_are_restored() {
        let segmenter = ClassicalSegmenter::new().with_max_working_dimension(32);
        let output = segmenter.enhanced(&raster(object_on_white(96))).unwrap();
        assert_eq!(output.mask.dimensions, (96, 96));
        let mask = output.mask.to_image().unwrap();
        assert!(mask.get_pixel(48, 48).0[0] > 200);
    }

    #[test]
    fn test_uniform_image_gives_uniform_mask() {
        let output = ClassicalSegmenter::new()
            .enhanced(&raster(RgbImage::from_pixel(48, 48, Rgb([90, 140, 60]))))
            .unwrap();
        let stats = output.mask.statistics();
        assert!(
            stats.foreground_ratio < 0.05 || stats.foreground_ratio > 0.95,
            "foreground ratio {}",
            stats.foreground_ratio
        );
    }

    #[test]
    fn test_tiny_image_falls_back_to_threshold() {
        let output = ClassicalSegmenter::new()
            .enhanced(&raster(RgbImage::from_pixel(1, 1, Rgb([10, 10, 10]))))
            .unwrap();
        assert_eq!(
            output.diagnostics.unwrap().seed_method,
            SeedMethod::OtsuThreshold
        );
        assert_eq!(output.mask.dimensions, (1, 1));
    }

    #[test]
    fn test_cues_do_not_alter_emitted_mask() {
        // Object pixels that also match the background hint stay foreground
        let mut image = RgbImage::from_pixel(64, 64, Rgb([20, 20, 120]));
        for y in 24..40 {
            for x in 24..40 {
                image.put_pixel(x, y, Rgb([250, 250, 250]));
            }
        }
        let source = raster(image);
        let segmenter = ClassicalSegmenter::new();
        let output = segmenter.enhanced(&source).unwrap();

        let rgb = source.to_rgb8();
        let (labels, _) = segmenter.seeded_labels(&rgb, &grayscale(&rgb));
        let raw = GrayImage::from_fn(64, 64, |x, y| {
            Luma([if labels[(y * 64 + x) as usize] { 255 } else { 0 }])
        });
        assert_eq!(output.mask.data, clean_mask(&raw).into_raw());
        assert!(background_hint(&rgb).get_pixel(32, 32).0[0] == 255);
    }

    #[test]
    fn test_simple_strategy_mask() {
        let output = ClassicalSegmenter::new()
            .segment(StrategyId::Simple, &raster(object_on_white(40)))
            .unwrap();
        assert!(output.diagnostics.is_none());
        assert_eq!(output.mask.dimensions, (40, 40));
        // Flat regions sit above their local mean minus C and invert to background
        assert!(output.mask.to_image().unwrap().get_pixel(2, 2).0[0] < 50);
    }

    #[test]
    fn test_otsu_labels_split_bimodal_image() {
        let mut gray = GrayImage::from_pixel(10, 10, Luma([20]));
        for x in 0..5 {
            for y in 0..10 {
                gray.put_pixel(x, y, Luma([220]));
            }
        }
        let labels = otsu_labels(&gray);
        assert!(labels[0]);
        assert!(!labels[9]);
    }
}
