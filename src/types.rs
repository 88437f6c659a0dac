//! Core value types flowing between pipeline stages

use crate::classical::CueDiagnostics;
use crate::classifier::Classification;
use crate::config::OutputFormat;
use crate::error::{BgRemovalError, Result};
use crate::strategy::StrategyId;
use image::codecs::png::PngDecoder;
use image::{
    DynamicImage, ExtendedColorType, GrayImage, ImageBuffer, ImageDecoder, ImageFormat, Luma, RgbImage,
    RgbaImage,
};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Channel layout of a [`RasterImage`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChannelLayout {
    Grayscale,
    GrayscaleAlpha,
    Rgb,
    Rgba,
    /// Palette source, expanded to RGB or RGBA pixels on construction
    Indexed { transparency_key: bool },
}

impl ChannelLayout {
    /// Number of channels stored per pixel
    #[must_use]
    pub fn channels(self) -> usize {
        match self {
            Self::Grayscale => 1,
            Self::GrayscaleAlpha => 2,
            Self::Rgb | Self::Indexed { transparency_key: false } => 3,
            Self::Rgba | Self::Indexed { transparency_key: true } => 4,
        }
    }

    /// Whether the layout carries an alpha component
    #[must_use]
    pub fn has_alpha(self) -> bool {
        matches!(
            self,
            Self::GrayscaleAlpha | Self::Rgba | Self::Indexed { transparency_key: true }
        )
    }
}

/// `Some(has tRNS)` for palette PNGs, `None` for anything else
fn png_palette_transparency(bytes: &[u8]) -> Option<bool> {
    if image::guess_format(bytes).ok()? != ImageFormat::Png {
        return None;
    }
    let decoder = PngDecoder::new(Cursor::new(bytes)).ok()?;
    match decoder.original_color_type() {
        // Indexed PNGs report their packed index depth as an unknown type
        ExtendedColorType::Unknown(_) => Some(decoder.color_type().has_alpha()),
        _ => None,
    }
}

/// Owned, immutable pixel buffer handed from one stage to the next
///
/// Every stage produces a new `RasterImage`; nothing mutates one after
/// construction. Buffer length always equals `width * height * channels`.
#[derive(Debug, Clone)]
pub struct RasterImage {
    image: DynamicImage,
    layout: ChannelLayout,
}

impl RasterImage {
    /// Wrap a decoded image, normalizing exotic sample types to 8 bits
    pub fn from_dynamic(image: DynamicImage) -> Result<Self> {
        if image.width() == 0 || image.height() == 0 {
            return Err(BgRemovalError::invalid_input(format!(
                "Image has degenerate dimensions {}x{}",
                image.width(),
                image.height()
            )));
        }

        let (image, layout) = match image {
            DynamicImage::ImageLuma8(_) => (image, ChannelLayout::Grayscale),
            DynamicImage::ImageLumaA8(_) => (image, ChannelLayout::GrayscaleAlpha),
            DynamicImage::ImageRgb8(_) => (image, ChannelLayout::Rgb),
            DynamicImage::ImageRgba8(_) => (image, ChannelLayout::Rgba),
            DynamicImage::ImageLuma16(_) => {
                (DynamicImage::ImageLuma8(image.to_luma8()), ChannelLayout::Grayscale)
            },
            DynamicImage::ImageLumaA16(_) => (
                DynamicImage::ImageLumaA8(image.to_luma_alpha8()),
                ChannelLayout::GrayscaleAlpha,
            ),
            other if other.color().has_alpha() => {
                (DynamicImage::ImageRgba8(other.to_rgba8()), ChannelLayout::Rgba)
            },
            other => (DynamicImage::ImageRgb8(other.to_rgb8()), ChannelLayout::Rgb),
        };

        Ok(Self { image, layout })
    }

    /// Build an image from raw interleaved samples
    pub fn from_raw(width: u32, height: u32, layout: ChannelLayout, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * layout.channels();
        if data.len() != expected {
            return Err(BgRemovalError::invalid_input(format!(
                "Buffer length {} does not match {}x{} with {} channels",
                data.len(),
                width,
                height,
                layout.channels()
            )));
        }

        let image = match layout {
            ChannelLayout::Grayscale => ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLuma8),
            ChannelLayout::GrayscaleAlpha => {
                ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageLumaA8)
            },
            ChannelLayout::Rgb | ChannelLayout::Indexed { transparency_key: false } => {
                ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgb8)
            },
            ChannelLayout::Rgba | ChannelLayout::Indexed { transparency_key: true } => {
                ImageBuffer::from_raw(width, height, data).map(DynamicImage::ImageRgba8)
            },
        }
        .ok_or_else(|| BgRemovalError::invalid_input("Failed to build image from raw buffer"))?;

        let mut raster = Self::from_dynamic(image)?;
        raster.layout = layout;
        Ok(raster)
    }

    /// Expand a palette image; `transparent_index` marks the transparency key
    pub fn from_indexed(
        width: u32,
        height: u32,
        palette: &[[u8; 3]],
        indices: &[u8],
        transparent_index: Option<u8>,
    ) -> Result<Self> {
        if indices.len() != width as usize * height as usize {
            return Err(BgRemovalError::invalid_input(format!(
                "Index buffer length {} does not match {}x{}",
                indices.len(),
                width,
                height
            )));
        }

        let keyed = transparent_index.is_some();
        let channels = if keyed { 4 } else { 3 };
        let mut data = Vec::with_capacity(indices.len() * channels);
        for &index in indices {
            let rgb = palette.get(usize::from(index)).ok_or_else(|| {
                BgRemovalError::invalid_input(format!(
                    "Palette index {index} out of range for {} entries",
                    palette.len()
                ))
            })?;
            data.extend_from_slice(rgb);
            if keyed {
                data.push(if Some(index) == transparent_index { 0 } else { 255 });
            }
        }

        Self::from_raw(
            width,
            height,
            ChannelLayout::Indexed {
                transparency_key: keyed,
            },
            data,
        )
    }

    /// Decode encoded bytes, rejecting anything that is not an image
    ///
    /// Palette PNGs are expanded to RGB or RGBA but keep the
    /// [`ChannelLayout::Indexed`] layout, so a transparency key counts as
    /// transparency even when no pixel uses the keyed entry.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let image = image::load_from_memory(bytes)
            .map_err(|e| BgRemovalError::invalid_input(format!("Failed to decode image: {e}")))?;
        let mut raster = Self::from_dynamic(image)?;
        if let Some(transparency_key) = png_palette_transparency(bytes) {
            raster.layout = ChannelLayout::Indexed { transparency_key };
        }
        Ok(raster)
    }

    #[must_use]
    pub fn width(&self) -> u32 {
        self.image.width()
    }

    #[must_use]
    pub fn height(&self) -> u32 {
        self.image.height()
    }

    #[must_use]
    pub fn dimensions(&self) -> (u32, u32) {
        (self.image.width(), self.image.height())
    }

    #[must_use]
    pub fn layout(&self) -> ChannelLayout {
        self.layout
    }

    #[must_use]
    pub fn channels(&self) -> usize {
        self.layout.channels()
    }

    #[must_use]
    pub fn pixel_count(&self) -> usize {
        self.width() as usize * self.height() as usize
    }

    /// Interleaved samples
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        self.image.as_bytes()
    }

    #[must_use]
    pub fn as_dynamic(&self) -> &DynamicImage {
        &self.image
    }

    #[must_use]
    pub fn into_dynamic(self) -> DynamicImage {
        self.image
    }

    #[must_use]
    pub fn has_alpha_channel(&self) -> bool {
        self.layout.has_alpha()
    }

    /// Whether any pixel is not fully opaque, or the palette has a transparency key
    #[must_use]
    pub fn has_transparency(&self) -> bool {
        match self.layout {
            ChannelLayout::Indexed { transparency_key } => transparency_key,
            ChannelLayout::GrayscaleAlpha => self.as_bytes().chunks_exact(2).any(|p| p[1] < 255),
            ChannelLayout::Rgba => self.as_bytes().chunks_exact(4).any(|p| p[3] < 255),
            ChannelLayout::Grayscale | ChannelLayout::Rgb => false,
        }
    }

    #[must_use]
    pub fn to_rgb8(&self) -> RgbImage {
        self.image.to_rgb8()
    }

    #[must_use]
    pub fn to_rgba8(&self) -> RgbaImage {
        self.image.to_rgba8()
    }

    #[must_use]
    pub fn to_luma8(&self) -> GrayImage {
        self.image.to_luma8()
    }

    /// Short description for logs and error context
    #[must_use]
    pub fn describe(&self) -> String {
        format!("{}x{} {:?}", self.width(), self.height(), self.layout)
    }
}

impl TryFrom<DynamicImage> for RasterImage {
    type Error = BgRemovalError;

    fn try_from(image: DynamicImage) -> Result<Self> {
        Self::from_dynamic(image)
    }
}

/// Single-channel foreground opacity aligned with an image
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentationMask {
    /// Mask values (0-255), row major
    pub data: Vec<u8>,

    /// Mask dimensions (width, height)
    pub dimensions: (u32, u32),
}

impl SegmentationMask {
    #[must_use]
    pub fn new(data: Vec<u8>, dimensions: (u32, u32)) -> Self {
        Self { data, dimensions }
    }

    #[must_use]
    pub fn from_image(image: &GrayImage) -> Self {
        Self::new(image.as_raw().clone(), image.dimensions())
    }

    /// Extract the alpha channel (or the single channel) of an image
    pub fn from_dynamic(image: &DynamicImage) -> Result<Self> {
        let (width, height) = (image.width(), image.height());
        let data = match image {
            DynamicImage::ImageLuma8(gray) => gray.as_raw().clone(),
            other if other.color().has_alpha() => {
                other.to_rgba8().pixels().map(|p| p.0[3]).collect()
            },
            other if other.color().channel_count() == 1 => other.to_luma8().into_raw(),
            _ => {
                return Err(BgRemovalError::processing(
                    "Image carries neither an alpha channel nor a single mask channel",
                ))
            },
        };
        Ok(Self::new(data, (width, height)))
    }

    pub fn to_image(&self) -> Result<GrayImage> {
        let (width, height) = self.dimensions;
        ImageBuffer::<Luma<u8>, _>::from_raw(width, height, self.data.clone())
            .ok_or_else(|| BgRemovalError::processing("Failed to create image from mask data"))
    }

    /// Combine the mask with an image's color as its alpha channel
    pub fn apply_to(&self, image: &RasterImage) -> Result<RasterImage> {
        if image.dimensions() != self.dimensions {
            return Err(BgRemovalError::processing(format!(
                "Image {}x{} and mask {}x{} dimensions do not match",
                image.width(),
                image.height(),
                self.dimensions.0,
                self.dimensions.1
            )));
        }

        let mut rgba = image.to_rgba8();
        for (pixel, &alpha) in rgba.pixels_mut().zip(&self.data) {
            pixel.0[3] = alpha;
        }
        RasterImage::from_dynamic(DynamicImage::ImageRgba8(rgba))
    }

    #[must_use]
    pub fn statistics(&self) -> MaskStatistics {
        let total_pixels = self.data.len();
        let foreground_pixels = self.data.iter().filter(|&&x| x > 127).count();
        let background_pixels = total_pixels - foreground_pixels;
        let ratio = |n: usize| {
            if total_pixels == 0 {
                0.0
            } else {
                n as f32 / total_pixels as f32
            }
        };

        MaskStatistics {
            total_pixels,
            foreground_pixels,
            background_pixels,
            foreground_ratio: ratio(foreground_pixels),
            background_ratio: ratio(background_pixels),
        }
    }
}

/// Statistics about a segmentation mask
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MaskStatistics {
    pub total_pixels: usize,
    pub foreground_pixels: usize,
    pub background_pixels: usize,
    pub foreground_ratio: f32,
    pub background_ratio: f32,
}

/// Encoded output of the format optimizer
#[derive(Debug, Clone)]
pub struct EncodedResult {
    pub bytes: Vec<u8>,
    /// Format actually used, which differs from the requested one after a fallback
    pub format: OutputFormat,
    pub requested_format: OutputFormat,
    pub estimated_size: u64,
    pub fallback_used: bool,
}

impl EncodedResult {
    #[must_use]
    pub fn actual_size(&self) -> u64 {
        self.bytes.len() as u64
    }

    /// Suggested file extension
    #[must_use]
    pub fn extension(&self) -> &'static str {
        self.format.extension()
    }

    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }

    /// File name for `stem` using the suggested extension
    #[must_use]
    pub fn file_name(&self, stem: &str) -> String {
        format!("{stem}.{}", self.extension())
    }
}

/// Per-stage timing breakdown of one pipeline run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProcessingTimings {
    pub decode_ms: u64,
    pub analysis_ms: u64,
    pub preprocessing_ms: u64,
    pub segmentation_ms: u64,
    pub postprocessing_ms: u64,
    pub encode_ms: u64,
    pub total_ms: u64,
}

impl ProcessingTimings {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Time not attributed to any stage
    #[must_use]
    pub fn other_overhead_ms(&self) -> u64 {
        let measured = self.decode_ms
            + self.analysis_ms
            + self.preprocessing_ms
            + self.segmentation_ms
            + self.postprocessing_ms
            + self.encode_ms;
        self.total_ms.saturating_sub(measured)
    }

    /// One-line summary for logs
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Total: {}ms | Decode: {}ms | Analysis: {}ms | Preprocess: {}ms | Segmentation: {}ms | Postprocess: {}ms | Encode: {}ms",
            self.total_ms,
            self.decode_ms,
            self.analysis_ms,
            self.preprocessing_ms,
            self.segmentation_ms,
            self.postprocessing_ms,
            self.encode_ms
        )
    }
}

/// Everything one pipeline invocation produced
#[derive(Debug, Clone)]
pub struct ProcessingResult {
    pub encoded: EncodedResult,
    /// Present when the strategy came from the classifier
    pub classification: Option<Classification>,
    /// Strategy that was requested or recommended
    pub strategy: StrategyId,
    /// Whether the classical path produced the mask
    pub classical_path: bool,
    /// Cue measurements from the classical `enhanced` strategy
    pub diagnostics: Option<CueDiagnostics>,
    pub original_dimensions: (u32, u32),
    pub working_dimensions: (u32, u32),
    pub mask: SegmentationMask,
    pub timings: ProcessingTimings,
}

impl ProcessingResult {
    /// Encoded bytes
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.encoded.bytes
    }

    #[must_use]
    pub fn format(&self) -> OutputFormat {
        self.encoded.format
    }

    /// Write the encoded bytes to a file
    pub fn save<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        std::fs::write(path, &self.encoded.bytes)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Rgba;

    #[test]
    fn test_from_raw_validates_length() {
        let err = RasterImage::from_raw(2, 2, ChannelLayout::Rgb, vec![0; 11]).unwrap_err();
        assert!(err.is_client_error());

        let image = RasterImage::from_raw(2, 2, ChannelLayout::Rgb, vec![0; 12]).unwrap();
        assert_eq!(image.as_bytes().len(), 12);
        assert_eq!(image.channels(), 3);
    }

    #[test]
    fn test_zero_dimensions_rejected() {
        let err = RasterImage::from_dynamic(DynamicImage::new_rgb8(0, 10)).unwrap_err();
        assert!(matches!(err, BgRemovalError::InvalidInput(_)));
    }

    #[test]
    fn test_sixteen_bit_images_normalized() {
        let image = RasterImage::from_dynamic(DynamicImage::new_rgba16(4, 4)).unwrap();
        assert_eq!(image.layout(), ChannelLayout::Rgba);
        assert_eq!(image.as_bytes().len(), 4 * 4 * 4);
    }

    #[test]
    fn test_transparency_detection() {
        let opaque = RgbaImage::from_pixel(3, 3, Rgba([10, 20, 30, 255]));
        let raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(opaque.clone())).unwrap();
        assert!(raster.has_alpha_channel());
        assert!(!raster.has_transparency());

        let mut translucent = opaque;
        translucent.put_pixel(1, 1, Rgba([10, 20, 30, 128]));
        let raster = RasterImage::from_dynamic(DynamicImage::ImageRgba8(translucent)).unwrap();
        assert!(raster.has_transparency());
    }

    #[test]
    fn test_indexed_transparency_key() {
        let palette = [[0, 0, 0], [255, 255, 255]];
        let keyed = RasterImage::from_indexed(2, 1, &palette, &[0, 1], Some(1)).unwrap();
        assert!(keyed.has_transparency());
        assert_eq!(keyed.as_bytes(), &[0, 0, 0, 255, 255, 255, 255, 0]);

        let plain = RasterImage::from_indexed(2, 1, &palette, &[0, 1], None).unwrap();
        assert!(!plain.has_transparency());
        assert_eq!(plain.channels(), 3);

        assert!(RasterImage::from_indexed(2, 1, &palette, &[0, 7], None).is_err());
    }

    fn crc32(data: &[u8]) -> u32 {
        let mut crc = 0xFFFF_FFFFu32;
        for &byte in data {
            crc ^= u32::from(byte);
            for _ in 0..8 {
                crc = if crc & 1 == 1 { (crc >> 1) ^ 0xEDB8_8320 } else { crc >> 1 };
            }
        }
        !crc
    }

    fn chunk(out: &mut Vec<u8>, kind: &[u8; 4], data: &[u8]) {
        out.extend_from_slice(&(data.len() as u32).to_be_bytes());
        let mut body = kind.to_vec();
        body.extend_from_slice(data);
        out.extend_from_slice(&body);
        out.extend_from_slice(&crc32(&body).to_be_bytes());
    }

    /// 2x1 palette PNG where both pixels use entry 0
    fn palette_png(trns: Option<&[u8]>) -> Vec<u8> {
        let scanline = [0u8, 0, 0];
        let (mut a, mut b) = (1u32, 0u32);
        for &byte in &scanline {
            a = (a + u32::from(byte)) % 65521;
            b = (b + a) % 65521;
        }
        let len = scanline.len() as u16;
        let mut zlib = vec![0x78, 0x01, 0x01];
        zlib.extend_from_slice(&len.to_le_bytes());
        zlib.extend_from_slice(&(!len).to_le_bytes());
        zlib.extend_from_slice(&scanline);
        zlib.extend_from_slice(&((b << 16) | a).to_be_bytes());

        let mut png = vec![0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];
        let mut ihdr = Vec::new();
        ihdr.extend_from_slice(&2u32.to_be_bytes());
        ihdr.extend_from_slice(&1u32.to_be_bytes());
        ihdr.extend_from_slice(&[8, 3, 0, 0, 0]);
        chunk(&mut png, b"IHDR", &ihdr);
        chunk(&mut png, b"PLTE", &[200, 10, 10, 0, 0, 0]);
        if let Some(trns) = trns {
            chunk(&mut png, b"tRNS", trns);
        }
        chunk(&mut png, b"IDAT", &zlib);
        chunk(&mut png, b"IEND", &[]);
        png
    }

    #[test]
    fn test_decoded_palette_keeps_transparency_key() {
        let keyed = RasterImage::decode(&palette_png(Some(&[255, 0]))).unwrap();
        assert_eq!(keyed.layout(), ChannelLayout::Indexed { transparency_key: true });
        assert!(keyed.as_bytes().chunks_exact(4).all(|p| p[3] == 255));
        assert!(keyed.has_transparency());

        let plain = RasterImage::decode(&palette_png(None)).unwrap();
        assert_eq!(plain.layout(), ChannelLayout::Indexed { transparency_key: false });
        assert!(!plain.has_transparency());
        assert_eq!(plain.as_bytes(), &[200, 10, 10, 200, 10, 10]);

        let mut rgb_png = Vec::new();
        plain
            .as_dynamic()
            .write_to(&mut Cursor::new(&mut rgb_png), ImageFormat::Png)
            .unwrap();
        assert_eq!(RasterImage::decode(&rgb_png).unwrap().layout(), ChannelLayout::Rgb);
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let err = RasterImage::decode(b"definitely not an image").unwrap_err();
        assert!(err.is_client_error());
    }

    #[test]
    fn test_mask_apply_and_statistics() {
        let image = RasterImage::from_raw(2, 2, ChannelLayout::Rgb, vec![100; 12]).unwrap();
        let mask = SegmentationMask::new(vec![255, 255, 0, 0], (2, 2));

        let stats = mask.statistics();
        assert_eq!(stats.foreground_pixels, 2);
        assert_eq!(stats.foreground_ratio, 0.5);

        let applied = mask.apply_to(&image).unwrap();
        assert_eq!(applied.layout(), ChannelLayout::Rgba);
        assert!(applied.has_transparency());

        let wrong = SegmentationMask::new(vec![0; 9], (3, 3));
        assert!(wrong.apply_to(&image).is_err());
    }

    #[test]
    fn test_mask_from_alpha_channel() {
        let mut rgba = RgbaImage::from_pixel(2, 1, Rgba([1, 2, 3, 255]));
        rgba.put_pixel(1, 0, Rgba([1, 2, 3, 7]));
        let mask = SegmentationMask::from_dynamic(&DynamicImage::ImageRgba8(rgba)).unwrap();
        assert_eq!(mask.data, vec![255, 7]);

        let rgb = DynamicImage::new_rgb8(2, 2);
        assert!(SegmentationMask::from_dynamic(&rgb).is_err());
    }

    #[test]
    fn test_timing_overhead() {
        let timings = ProcessingTimings {
            preprocessing_ms: 10,
            segmentation_ms: 50,
            total_ms: 70,
            ..ProcessingTimings::default()
        };
        assert_eq!(timings.other_overhead_ms(), 10);
        assert!(timings.summary().contains("Segmentation: 50ms"));
    }
}
