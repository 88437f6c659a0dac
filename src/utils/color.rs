//! Color space conversions on 8-bit samples
//!
//! Conversions use the BT.601 luma weights and the 8-bit value ranges common
//! to computer vision toolkits: hue in `[0, 180)`, saturation and value in
//! `[0, 255]`, chroma planes offset by 128.

use image::{GrayImage, Luma, RgbImage};

/// BT.601 luma of one pixel, rounded
#[must_use]
pub fn luma(r: u8, g: u8, b: u8) -> u8 {
    let y = 0.299 * f32::from(r) + 0.587 * f32::from(g) + 0.114 * f32::from(b);
    y.round().clamp(0.0, 255.0) as u8
}

/// Convert to single-channel intensity with BT.601 weights
#[must_use]
pub fn grayscale(image: &RgbImage) -> GrayImage {
    let (width, height) = image.dimensions();
    let mut gray = GrayImage::new(width, height);
    for (dst, src) in gray.pixels_mut().zip(image.pixels()) {
        let [r, g, b] = src.0;
        *dst = Luma([luma(r, g, b)]);
    }
    gray
}

/// RGB to (Y, Cr, Cb)
#[must_use]
pub fn rgb_to_ycrcb(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let y = 0.299 * rf + 0.587 * gf + 0.114 * bf;
    let cr = (rf - y) * 0.713 + 128.0;
    let cb = (bf - y) * 0.564 + 128.0;
    (to_u8(y), to_u8(cr), to_u8(cb))
}

/// RGB to (H, S, V) with hue halved into `[0, 180)`
#[must_use]
pub fn rgb_to_hsv(r: u8, g: u8, b: u8) -> (u8, u8, u8) {
    let max = r.max(g).max(b);
    let min = r.min(g).min(b);
    let v = max;
    if max == 0 {
        return (0, 0, 0);
    }

    let delta = f32::from(max - min);
    let s = to_u8(255.0 * delta / f32::from(max));
    if delta == 0.0 {
        return (0, s, v);
    }

    let (rf, gf, bf) = (f32::from(r), f32::from(g), f32::from(b));
    let mut hue = if max == r {
        60.0 * (gf - bf) / delta
    } else if max == g {
        120.0 + 60.0 * (bf - rf) / delta
    } else {
        240.0 + 60.0 * (rf - gf) / delta
    };
    if hue < 0.0 {
        hue += 360.0;
    }

    let h = (hue / 2.0).round();
    let h = if h >= 180.0 { 0 } else { h as u8 };
    (h, s, v)
}

fn to_u8(value: f32) -> u8 {
    value.round().clamp(0.0, 255.0) as u8
}
