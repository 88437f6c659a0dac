//! Classification behavior through the public API

mod common;

use bgremove_pipeline::{
    ImageCategory, ImageClassifier, PipelineConfig, StrategyId, StrategyRequest,
};
use common::MaskShape;
use image::DynamicImage;

#[test]
fn test_classification_is_deterministic() {
    let classifier = ImageClassifier::new();
    let image = common::raster(DynamicImage::ImageRgb8(common::photo_like(160, 120)));

    let first = classifier.classify_image(&image);
    let second = classifier.classify_image(&image);
    assert_eq!(first, second);
    assert_eq!(first.primary_strategy, first.category.primary_strategy());
    assert!((0.0..=1.0).contains(&first.confidence));
    assert!(!first.alternate_strategies.contains(&first.primary_strategy));
}

#[test]
fn test_every_category_recommends_a_delegated_strategy() {
    for category in ImageCategory::ALL {
        assert!(category.primary_strategy().is_delegated());
        assert!(!category.description().is_empty());
    }
}

#[test]
fn test_recommend_honors_known_overrides_only() {
    let classifier = ImageClassifier::new();
    let image = common::raster(DynamicImage::ImageRgb8(common::product_on_white(90, 90)));
    let recommended = classifier.classify_image(&image).primary_strategy;

    for id in StrategyId::ALL {
        assert_eq!(classifier.recommend(&image, Some(id.as_str())), id);
    }
    assert_eq!(classifier.recommend(&image, Some("mystery-model")), recommended);
    assert_eq!(classifier.recommend(&image, None), recommended);
}

#[test]
fn test_pipeline_reports_classifier_choice_only_for_auto() {
    let image = common::raster(DynamicImage::ImageRgb8(common::photo_like(80, 80)));

    let auto = common::processor(PipelineConfig::default(), MaskShape::Ellipse);
    let analysis = auto.analyze(&image);
    let result = auto.process_image(&image).unwrap();
    let classification = result.classification.unwrap();
    assert_eq!(result.strategy, analysis.primary_strategy);
    assert_eq!(classification.category, analysis.category);

    let explicit = common::processor(
        PipelineConfig::builder()
            .strategy(StrategyRequest::Explicit(StrategyId::Simple))
            .build()
            .unwrap(),
        MaskShape::Ellipse,
    );
    let result = explicit.process_image(&image).unwrap();
    assert!(result.classification.is_none());
    assert_eq!(result.strategy, StrategyId::Simple);
}

#[test]
fn test_classification_serializes_for_reporting() {
    let classifier = ImageClassifier::new();
    let image = common::raster(DynamicImage::ImageLuma8(common::gray_ramp(64, 32)));
    let json = serde_json::to_value(classifier.classify_image(&image)).unwrap();

    for key in ["category", "confidence", "primary_strategy", "alternate_strategies", "features"] {
        assert!(json.get(key).is_some(), "missing {key}");
    }
    assert_eq!(json["features"]["dimensions"], serde_json::json!([64, 32]));
}
