//! Linear and non-linear filters on 8-bit images
//!
//! Fixed-size kernels use reflect-101 borders (`dcb|abcd|cba`) unless noted.
//! Edge detection and the unsharp-mask blur delegate to `imageproc`.

use crate::utils::color::luma;
use image::{GrayImage, ImageBuffer, Pixel, RgbImage};
use rayon::prelude::*;

#[derive(Debug, Clone, Copy)]
enum Border {
    Reflect101,
    Replicate,
}

fn border_index(i: i64, n: i64, border: Border) -> usize {
    if n <= 1 {
        return 0;
    }
    match border {
        Border::Replicate => i.clamp(0, n - 1) as usize,
        Border::Reflect101 => {
            let mut i = i;
            while i < 0 || i >= n {
                if i < 0 {
                    i = -i;
                }
                if i >= n {
                    i = 2 * n - 2 - i;
                }
            }
            i as usize
        },
    }
}

/// Normalized 1-D Gaussian kernel of odd length `size`
///
/// A non-positive `sigma` is derived from the size as
/// `0.3 * ((size - 1) * 0.5 - 1) + 0.8`.
#[must_use]
pub fn gaussian_kernel(size: u32, sigma: f32) -> Vec<f32> {
    let size = size.max(1) | 1;
    let sigma = if sigma > 0.0 {
        sigma
    } else {
        0.3 * ((size as f32 - 1.0) * 0.5 - 1.0) + 0.8
    };
    let half = (size / 2) as i32;
    let mut kernel: Vec<f32> = (-half..=half)
        .map(|i| (-((i * i) as f32) / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = kernel.iter().sum();
    for value in &mut kernel {
        *value /= sum;
    }
    kernel
}

/// Separable Gaussian blur with an explicit kernel size
///
/// Every channel, including alpha, is blurred.
#[must_use]
pub fn gaussian_blur<P>(image: &ImageBuffer<P, Vec<u8>>, size: u32, sigma: f32) -> ImageBuffer<P, Vec<u8>>
where
    P: Pixel<Subpixel = u8>,
{
    let (width, height) = image.dimensions();
    let kernel = gaussian_kernel(size, sigma);
    let data = separable_convolve(
        image.as_raw(),
        width,
        height,
        usize::from(P::CHANNEL_COUNT),
        &kernel,
        Border::Reflect101,
    );
    ImageBuffer::from_raw(width, height, data).unwrap_or_else(|| image.clone())
}

fn separable_convolve(
    src: &[u8],
    width: u32,
    height: u32,
    channels: usize,
    kernel: &[f32],
    border: Border,
) -> Vec<u8> {
    let (w, h) = (i64::from(width), i64::from(height));
    let half = (kernel.len() / 2) as i64;
    let stride = width as usize * channels;
    if stride == 0 {
        return src.to_vec();
    }

    let mut horizontal = vec![0f32; src.len()];
    horizontal
        .par_chunks_mut(stride)
        .enumerate()
        .for_each(|(y, row)| {
            let line = &src[y * stride..(y + 1) * stride];
            for x in 0..w {
                for c in 0..channels {
                    let mut sum = 0.0;
                    for (k, weight) in kernel.iter().enumerate() {
                        let sx = border_index(x + k as i64 - half, w, border);
                        sum += f32::from(line[sx * channels + c]) * weight;
                    }
                    row[x as usize * channels + c] = sum;
                }
            }
        });

    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        for (i, dst) in row.iter_mut().enumerate() {
            let mut sum = 0.0;
            for (k, weight) in kernel.iter().enumerate() {
                let sy = border_index(y as i64 + k as i64 - half, h, border);
                sum += horizontal[sy * stride + i] * weight;
            }
            *dst = sum.round().clamp(0.0, 255.0) as u8;
        }
    });
    out
}

/// Edge-preserving bilateral smoothing
///
/// Neighbours inside a disc of `diameter / 2` are weighted by spatial
/// distance and by the summed absolute color difference to the center.
/// Rows are filtered in parallel; the output does not depend on scheduling.
#[must_use]
pub fn bilateral_filter(image: &RgbImage, diameter: u32, sigma_color: f32, sigma_space: f32) -> RgbImage {
    let (width, height) = image.dimensions();
    let (w, h) = (i64::from(width), i64::from(height));
    let radius = i64::from((diameter / 2).max(1));
    let stride = width as usize * 3;
    if stride == 0 {
        return image.clone();
    }

    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let color_coeff = -0.5 / (sigma_color * sigma_color);

    let mut taps = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2 <= (radius * radius) as f32 {
                taps.push((dx, dy, (r2 * space_coeff).exp()));
            }
        }
    }
    let color_weights: Vec<f32> = (0..3 * 256)
        .map(|d| ((d * d) as f32 * color_coeff).exp())
        .collect();

    let src = image.as_raw();
    let mut out = vec![0u8; src.len()];
    out.par_chunks_mut(stride).enumerate().for_each(|(y, row)| {
        let y = y as i64;
        for x in 0..w {
            let center = (y as usize * stride) + x as usize * 3;
            let c0 = &src[center..center + 3];
            let mut sum = [0f32; 3];
            let mut norm = 0f32;
            for &(dx, dy, space_weight) in &taps {
                let sx = border_index(x + dx, w, Border::Reflect101);
                let sy = border_index(y + dy, h, Border::Reflect101);
                let offset = sy * stride + sx * 3;
                let p = &src[offset..offset + 3];
                let diff = p.iter().zip(c0).map(|(&a, &b)| a.abs_diff(b) as usize).sum::<usize>();
                let weight = space_weight * color_weights[diff];
                for c in 0..3 {
                    sum[c] += f32::from(p[c]) * weight;
                }
                norm += weight;
            }
            let dst = &mut row[x as usize * 3..x as usize * 3 + 3];
            for c in 0..3 {
                dst[c] = (sum[c] / norm).round().clamp(0.0, 255.0) as u8;
            }
        }
    });

    RgbImage::from_raw(width, height, out).unwrap_or_else(|| image.clone())
}

/// Scale every channel away from the mean luminance by `factor`
#[must_use]
pub fn adjust_contrast(image: &RgbImage, factor: f32) -> RgbImage {
    let pixels = (image.width() as u64 * image.height() as u64).max(1);
    let total: u64 = image
        .pixels()
        .map(|p| u64::from(luma(p.0[0], p.0[1], p.0[2])))
        .sum();
    let mean = (total as f64 / pixels as f64 + 0.5).floor() as f32;

    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        for value in &mut pixel.0 {
            let adjusted = mean + factor * (f32::from(*value) - mean);
            *value = adjusted.round().clamp(0.0, 255.0) as u8;
        }
    }
    out
}

/// Unsharp mask: add `percent` of the high-pass detail where it exceeds `threshold`
#[must_use]
pub fn unsharp_mask(image: &RgbImage, sigma: f32, percent: u32, threshold: u8) -> RgbImage {
    let blurred = imageproc::filter::gaussian_blur_f32(image, sigma);
    let amount = percent as f32 / 100.0;
    let threshold = i32::from(threshold);

    let mut out = image.clone();
    for (dst, soft) in out.pixels_mut().zip(blurred.pixels()) {
        for (value, &smooth) in dst.0.iter_mut().zip(&soft.0) {
            let diff = i32::from(*value) - i32::from(smooth);
            if diff.abs() >= threshold {
                let sharpened = f32::from(*value) + diff as f32 * amount;
                *value = sharpened.round().clamp(0.0, 255.0) as u8;
            }
        }
    }
    out
}

/// Gaussian-weighted adaptive threshold
///
/// A pixel becomes 255 when it is brighter than its `block_size`
/// neighbourhood's weighted mean minus `c`, else 0.
#[must_use]
pub fn adaptive_threshold_gaussian(image: &GrayImage, block_size: u32, c: f32) -> GrayImage {
    let (width, height) = image.dimensions();
    let kernel = gaussian_kernel(block_size, 0.0);
    let local_mean = separable_convolve(image.as_raw(), width, height, 1, &kernel, Border::Replicate);
    let delta = c.ceil() as i32;

    let data = image
        .as_raw()
        .iter()
        .zip(&local_mean)
        .map(|(&v, &mean)| {
            if i32::from(v) - i32::from(mean) > -delta {
                255
            } else {
                0
            }
        })
        .collect();
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// 4-neighbour Laplacian response
#[must_use]
pub fn laplacian(image: &GrayImage) -> Vec<f32> {
    let (width, height) = image.dimensions();
    let (w, h) = (i64::from(width), i64::from(height));
    let src = image.as_raw();
    let at = |x: i64, y: i64| {
        let sx = border_index(x, w, Border::Reflect101);
        let sy = border_index(y, h, Border::Reflect101);
        f32::from(src[sy * width as usize + sx])
    };

    let mut out = Vec::with_capacity(src.len());
    for y in 0..h {
        for x in 0..w {
            out.push(at(x - 1, y) + at(x + 1, y) + at(x, y - 1) + at(x, y + 1) - 4.0 * at(x, y));
        }
    }
    out
}

/// Binary Canny edge map (255 on edges)
#[must_use]
pub fn canny(image: &GrayImage, low: f32, high: f32) -> GrayImage {
    imageproc::edges::canny(image, low, high)
}

/// Per-pixel Sobel gradient magnitude
#[must_use]
pub fn sobel_magnitude(image: &GrayImage) -> Vec<f32> {
    let gx = imageproc::gradients::horizontal_sobel(image);
    let gy = imageproc::gradients::vertical_sobel(image);
    gx.pixels()
        .zip(gy.pixels())
        .map(|(x, y)| {
            let (x, y) = (f32::from(x.0[0]), f32::from(y.0[0]));
            (x * x + y * y).sqrt()
        })
        .collect()
}

/// Mean and population standard deviation
#[must_use]
pub fn mean_std<I>(values: I) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let mut count = 0u64;
    let mut sum = 0.0;
    let mut sum_sq = 0.0;
    for v in values {
        count += 1;
        sum += v;
        sum_sq += v * v;
    }
    if count == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / count as f64;
    let variance = (sum_sq / count as f64 - mean * mean).max(0.0);
    (mean, variance.sqrt())
}
