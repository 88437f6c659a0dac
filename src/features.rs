//! Feature extraction for image classification
//!
//! Computes explainable pixel statistics (color, edges, skin tones, contour
//! shapes and complexity) that the classifier's rule cascade consumes. All
//! measurements are deterministic functions of the pixel data.

use crate::types::RasterImage;
use crate::utils::color::{grayscale, rgb_to_hsv, rgb_to_ycrcb};
use crate::utils::filters::{canny, laplacian, mean_std, sobel_magnitude};
use crate::utils::morphology::{close, open, StructuringElement};
use image::{GrayImage, Luma, RgbImage};
use imageproc::contours::{find_contours, BorderType};
use imageproc::geometry::{approximate_polygon_dp, arc_length};
use imageproc::point::Point;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Canny hysteresis thresholds used for edge and contour statistics
pub const CANNY_LOW: f32 = 50.0;
pub const CANNY_HIGH: f32 = 150.0;

/// Minimum enclosed area (pixels) for a contour to count as large
pub const LARGE_CONTOUR_AREA: f64 = 1000.0;

/// Polygon approximation tolerance as a fraction of the contour perimeter
pub const POLYGON_EPSILON_RATIO: f64 = 0.02;

/// Skin tone chroma window (inclusive) in the Cr/Cb planes
const SKIN_CR: (u8, u8) = (133, 173);
const SKIN_CB: (u8, u8) = (77, 127);

/// Color distribution statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColorStats {
    pub mean_rgb: [f64; 3],
    pub std_rgb: [f64; 3],
    /// Fraction of pixels inside the skin chroma window after cleanup
    pub skin_fraction: f64,
    /// Distinct RGB triples divided by the pixel count
    pub color_diversity: f64,
    /// Mean hue on the `[0, 180)` scale
    pub dominant_hue: f64,
}

/// Edge and gradient statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EdgeStats {
    pub edge_density: f64,
    pub mean_gradient: f64,
    pub gradient_std: f64,
}

/// Coarse face-likelihood proxy, never a detector
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceStats {
    pub upper_skin_fraction: f64,
    pub face_probability: f64,
    pub likely_portrait: bool,
}

/// Contour and shape statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObjectStats {
    pub contour_count: usize,
    pub large_contour_count: usize,
    pub geometric_shapes: usize,
    pub object_likelihood: f64,
}

/// Coarse complexity bucket derived from entropy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComplexityLevel {
    Low,
    Medium,
    High,
}

impl ComplexityLevel {
    /// high above 6 bits, medium above 4 bits, else low
    #[must_use]
    pub fn from_entropy(entropy: f64) -> Self {
        if entropy > 6.0 {
            Self::High
        } else if entropy > 4.0 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Information content and texture statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComplexityStats {
    /// Shannon entropy of the intensity histogram, in bits
    pub entropy: f64,
    /// Intensity standard deviation
    pub texture_score: f64,
    /// Variance of the Laplacian response
    pub detail_score: f64,
    pub level: ComplexityLevel,
}

/// Everything the classifier knows about an image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub aspect_ratio: f64,
    pub dimensions: (u32, u32),
    pub color: ColorStats,
    pub edges: EdgeStats,
    pub face: FaceStats,
    pub objects: ObjectStats,
    pub complexity: ComplexityStats,
}

/// Stateless feature extractor
#[derive(Debug, Clone, Copy, Default)]
pub struct FeatureExtractor;

impl FeatureExtractor {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Compute the feature vector of an image
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn extract(&self, image: &RasterImage) -> FeatureVector {
        let rgb = image.to_rgb8();
        let gray = grayscale(&rgb);
        let (width, height) = rgb.dimensions();

        let skin = skin_mask(&rgb);
        let edges = canny(&gray, CANNY_LOW, CANNY_HIGH);

        let color = color_stats(&rgb, &skin);
        let edge_stats = edge_stats(&gray, &edges);
        let face = face_stats(&skin);
        let objects = object_stats(&edges);
        let complexity = complexity_stats(&gray);

        debug!(
            skin_fraction = color.skin_fraction,
            edge_density = edge_stats.edge_density,
            large_contours = objects.large_contour_count,
            entropy = complexity.entropy,
            "Extracted image features"
        );

        FeatureVector {
            aspect_ratio: f64::from(width) / f64::from(height.max(1)),
            dimensions: (width, height),
            color,
            edges: edge_stats,
            face,
            objects,
            complexity,
        }
    }
}

/// Skin-tone mask (255 = skin) cleaned with a 5x5 elliptical close then open
#[must_use]
pub fn skin_mask(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    let mut mask = GrayImage::new(width, height);
    for (dst, src) in mask.pixels_mut().zip(rgb.pixels()) {
        let [r, g, b] = src.0;
        let (_, cr, cb) = rgb_to_ycrcb(r, g, b);
        let inside = (SKIN_CR.0..=SKIN_CR.1).contains(&cr) && (SKIN_CB.0..=SKIN_CB.1).contains(&cb);
        *dst = Luma([if inside { 255 } else { 0 }]);
    }

    let kernel = StructuringElement::ellipse(5);
    open(&close(&mask, kernel), kernel)
}

fn fraction(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64
    }
}

fn color_stats(rgb: &RgbImage, skin: &GrayImage) -> ColorStats {
    let total = rgb.pixels().len();

    let mut mean_rgb = [0.0; 3];
    let mut std_rgb = [0.0; 3];
    for channel in 0..3 {
        let (mean, std) = mean_std(rgb.pixels().map(|p| f64::from(p.0[channel])));
        mean_rgb[channel] = mean;
        std_rgb[channel] = std;
    }

    // One bit per possible RGB triple
    let mut seen = vec![0u64; (1 << 24) / 64];
    let mut unique = 0usize;
    let mut hue_sum = 0.0;
    for p in rgb.pixels() {
        let [r, g, b] = p.0;
        let key = (usize::from(r) << 16) | (usize::from(g) << 8) | usize::from(b);
        let (word, bit) = (key / 64, key % 64);
        if seen[word] & (1 << bit) == 0 {
            seen[word] |= 1 << bit;
            unique += 1;
        }
        hue_sum += f64::from(rgb_to_hsv(r, g, b).0);
    }

    let skin_pixels = skin.pixels().filter(|p| p.0[0] > 0).count();

    ColorStats {
        mean_rgb,
        std_rgb,
        skin_fraction: fraction(skin_pixels, total),
        color_diversity: fraction(unique, total),
        dominant_hue: if total == 0 { 0.0 } else { hue_sum / total as f64 },
    }
}

fn edge_stats(gray: &GrayImage, edges: &GrayImage) -> EdgeStats {
    let edge_pixels = edges.pixels().filter(|p| p.0[0] > 0).count();
    let magnitude = sobel_magnitude(gray);
    let (mean_gradient, gradient_std) = mean_std(magnitude.iter().map(|&m| f64::from(m)));

    EdgeStats {
        edge_density: fraction(edge_pixels, edges.pixels().len()),
        mean_gradient,
        gradient_std,
    }
}

fn face_stats(skin: &GrayImage) -> FaceStats {
    let (width, height) = skin.dimensions();
    let upper_rows = height / 2;
    let upper_total = width as usize * upper_rows as usize;
    let upper_skin = skin
        .enumerate_pixels()
        .filter(|(_, y, p)| *y < upper_rows && p.0[0] > 0)
        .count();

    let upper_skin_fraction = fraction(upper_skin, upper_total);
    let face_probability = (upper_skin_fraction * 2.0).min(1.0);

    FaceStats {
        upper_skin_fraction,
        face_probability,
        likely_portrait: face_probability > 0.3,
    }
}

/// Enclosed area of a closed polygon (shoelace formula)
fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| i64::from(a.x) * i64::from(b.y) - i64::from(b.x) * i64::from(a.y))
        .sum();
    (twice as f64 / 2.0).abs()
}

fn object_stats(edges: &GrayImage) -> ObjectStats {
    let external: Vec<_> = find_contours::<i32>(edges)
        .into_iter()
        .filter(|c| matches!(c.border_type, BorderType::Outer) && c.parent.is_none())
        .collect();

    let large: Vec<_> = external
        .iter()
        .filter(|c| polygon_area(&c.points) > LARGE_CONTOUR_AREA)
        .collect();

    let geometric_shapes = large
        .iter()
        .filter(|c| {
            let epsilon = POLYGON_EPSILON_RATIO * arc_length(&c.points, true);
            let vertices = approximate_polygon_dp(&c.points, epsilon, true).len();
            (3..=8).contains(&vertices)
        })
        .count();

    ObjectStats {
        contour_count: external.len(),
        large_contour_count: large.len(),
        geometric_shapes,
        object_likelihood: (geometric_shapes as f64 / large.len().max(1) as f64).clamp(0.0, 1.0),
    }
}

fn complexity_stats(gray: &GrayImage) -> ComplexityStats {
    let mut histogram = [0u64; 256];
    for p in gray.pixels() {
        histogram[usize::from(p.0[0])] += 1;
    }
    let total: u64 = histogram.iter().sum();
    let entropy = if total == 0 {
        0.0
    } else {
        histogram
            .iter()
            .filter(|&&count| count > 0)
            .map(|&count| {
                let p = count as f64 / total as f64;
                -p * p.log2()
            })
            .sum()
    };

    let (_, texture_score) = mean_std(gray.pixels().map(|p| f64::from(p.0[0])));
    let (_, detail_std) = mean_std(laplacian(gray).into_iter().map(f64::from));

    ComplexityStats {
        entropy,
        texture_score,
        detail_score: detail_std * detail_std,
        level: ComplexityLevel::from_entropy(entropy),
    }
}
