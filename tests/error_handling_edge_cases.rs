//! Error taxonomy and edge case testing
//!
//! Client-side rejections, delegated failures, encode fallback and
//! transparency safety on unusual inputs.

mod common;

use bgremove_pipeline::{
    BackgroundRemovalProcessor, BgRemovalError, DefaultEncoder, EncodeConfig, FormatEncoder,
    FormatRequest, OutputFormat, PipelineConfig, QualityTier, Result, StrategyId, StrategyRequest,
};
use common::{MaskFactory, MaskShape};
use image::{DynamicImage, GenericImageView, ImageFormat};
use std::sync::Arc;

/// Encoder that rejects every format but PNG
struct PngOnlyEncoder;

impl FormatEncoder for PngOnlyEncoder {
    fn encode(&self, image: &DynamicImage, config: &EncodeConfig) -> Result<Vec<u8>> {
        if config.format == OutputFormat::Png {
            DefaultEncoder.encode(image, config)
        } else {
            Err(BgRemovalError::encode(config.format.name(), "encoder unavailable"))
        }
    }
}

struct BrokenEncoder;

impl FormatEncoder for BrokenEncoder {
    fn encode(&self, _image: &DynamicImage, config: &EncodeConfig) -> Result<Vec<u8>> {
        Err(BgRemovalError::encode(config.format.name(), "disk full"))
    }
}

#[test]
fn test_undecodable_bytes_are_client_errors() {
    let processor = common::processor(PipelineConfig::default(), MaskShape::Opaque);
    for bytes in [&b""[..], b"GIF89a-not-really", &[0x89, b'P', b'N', b'G', 0, 0, 0]] {
        let err = processor.process_bytes(bytes).unwrap_err();
        assert!(err.is_client_error(), "expected client error, got {err}");
    }
}

#[test]
fn test_unknown_parameters_list_valid_values() {
    let err = "watershed".parse::<StrategyId>().unwrap_err();
    assert!(err.is_client_error());
    let message = err.to_string();
    assert!(message.contains("watershed"));
    assert!(message.contains("u2net_human_seg"));
    assert!(message.contains("enhanced"));

    let err = "tiff".parse::<FormatRequest>().unwrap_err();
    assert!(err.is_client_error());
    assert!(err.to_string().contains("webp"));

    assert!("extreme".parse::<QualityTier>().unwrap_err().is_client_error());
    assert!("".parse::<StrategyRequest>().is_err());
}

#[test]
fn test_delegated_creation_failure_is_not_recovered() {
    let config = PipelineConfig::builder()
        .strategy(StrategyRequest::Explicit(StrategyId::U2net))
        .build()
        .unwrap();
    let processor =
        BackgroundRemovalProcessor::with_factory(config, Some(Arc::new(MaskFactory::failing()))).unwrap();
    let input = common::raster(DynamicImage::ImageRgb8(common::photo_like(32, 32)));

    let err = processor.process_image(&input).unwrap_err();
    assert!(matches!(err, BgRemovalError::Segmentation { .. }));
    assert!(!err.is_client_error());
    assert!(err.to_string().contains("u2net"));
    assert!(processor.session_cache().sessions().is_empty());
}

#[test]
fn test_encode_failure_falls_back_to_png() {
    let config = PipelineConfig::builder()
        .output_format(FormatRequest::Explicit(OutputFormat::WebP))
        .build()
        .unwrap();
    let processor = common::processor(config, MaskShape::Ellipse).with_encoder(Arc::new(PngOnlyEncoder));
    let input = common::raster(DynamicImage::ImageRgb8(common::photo_like(40, 30)));

    let result = processor.process_image(&input).unwrap();
    assert_eq!(result.format(), OutputFormat::Png);
    assert_eq!(result.encoded.requested_format, OutputFormat::WebP);
    assert!(result.encoded.fallback_used);
    let decoded = image::load_from_memory_with_format(result.bytes(), ImageFormat::Png).unwrap();
    assert_eq!(decoded.dimensions(), (40, 30));
}

#[test]
fn test_double_encode_failure_is_surfaced() {
    let processor = common::processor(PipelineConfig::default(), MaskShape::Ellipse)
        .with_encoder(Arc::new(BrokenEncoder));
    let input = common::raster(DynamicImage::ImageRgb8(common::photo_like(20, 20)));

    let err = processor.process_image(&input).unwrap_err();
    assert!(matches!(err, BgRemovalError::Encode { .. }));
    assert!(err.to_string().contains("disk full"));
}

#[test]
fn test_transparent_results_never_become_jpeg_implicitly() {
    let config = PipelineConfig::builder()
        .source_format_hint("camera.JPEG")
        .build()
        .unwrap();
    let processor = common::processor(config, MaskShape::Ellipse);

    let inputs = [
        DynamicImage::ImageRgb8(common::photo_like(64, 48)),
        DynamicImage::ImageRgba8(common::half_transparent(64, 48)),
        DynamicImage::ImageLuma8(common::gray_ramp(64, 48)),
    ];
    for input in inputs {
        let result = processor.process_image(&common::raster(input)).unwrap();
        assert!(result.mask.data.iter().any(|&a| a < 255));
        assert_eq!(result.format(), OutputFormat::Png);
    }
}

#[test]
fn test_tiny_and_degenerate_images() {
    let processor = common::processor(PipelineConfig::default(), MaskShape::Ellipse);
    for (width, height) in [(1, 1), (1, 40), (40, 1), (3, 2)] {
        let input = common::raster(DynamicImage::ImageRgb8(common::photo_like(width, height)));
        let result = processor.process_image(&input).unwrap();
        assert_eq!(result.mask.dimensions, (width, height));
    }

    let classical = BackgroundRemovalProcessor::with_factory(
        PipelineConfig::builder()
            .strategy(StrategyRequest::Explicit(StrategyId::Enhanced))
            .build()
            .unwrap(),
        None,
    )
    .unwrap();
    let uniform = common::raster(DynamicImage::ImageRgb8(image::RgbImage::from_pixel(
        24,
        24,
        image::Rgb([128, 128, 128]),
    )));
    let result = classical.process_image(&uniform).unwrap();
    assert_eq!(result.mask.dimensions, (24, 24));
}

#[test]
fn test_invalid_configuration_is_rejected() {
    assert!(PipelineConfig::builder().max_dimension(0).build().is_err());
    let config = PipelineConfig {
        model_dir: Some(std::path::PathBuf::new()),
        ..PipelineConfig::default()
    };
    assert!(BackgroundRemovalProcessor::new(config).is_err());
}
