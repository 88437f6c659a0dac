//! Rule-based image classification and strategy recommendation
//!
//! The cascade below and the category strategy tables are fixed contract
//! values. Confidence is a constant baseline rather than a model output.

use crate::features::{ComplexityLevel, FeatureExtractor, FeatureVector};
use crate::strategy::{StrategyId, StrategyRequest};
use crate::types::RasterImage;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

/// Confidence reported for every classification
pub const BASELINE_CONFIDENCE: f32 = 0.8;

/// Image categories recognized by the classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageCategory {
    Portrait,
    Product,
    Artistic,
    General,
}

impl ImageCategory {
    pub const ALL: [ImageCategory; 4] = [Self::Portrait, Self::Product, Self::Artistic, Self::General];

    /// Ordered candidate strategies, primary first
    #[must_use]
    pub fn strategies(self) -> &'static [StrategyId] {
        match self {
            Self::Portrait => &[StrategyId::U2netHumanSeg, StrategyId::U2net],
            Self::Product => &[StrategyId::Silueta, StrategyId::U2net],
            Self::Artistic => &[StrategyId::IsnetGeneralUse, StrategyId::U2net],
            Self::General => &[StrategyId::U2net],
        }
    }

    #[must_use]
    pub fn primary_strategy(self) -> StrategyId {
        match self.strategies().first() {
            Some(&strategy) => strategy,
            None => StrategyId::U2net,
        }
    }

    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::Portrait => "Human portraits and people",
            Self::Product => "Product photos and objects",
            Self::Artistic => "Artistic images and complex scenes",
            Self::General => "General purpose images",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Portrait => "portrait",
            Self::Product => "product",
            Self::Artistic => "artistic",
            Self::General => "general",
        }
    }
}

impl std::fmt::Display for ImageCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of classifying one image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Classification {
    pub category: ImageCategory,
    pub confidence: f32,
    pub primary_strategy: StrategyId,
    pub alternate_strategies: Vec<StrategyId>,
    pub description: String,
    /// Features the decision was based on
    pub features: FeatureVector,
}

/// Maps feature vectors to categories and strategies
#[derive(Debug, Clone, Default)]
pub struct ImageClassifier {
    extractor: FeatureExtractor,
}

impl ImageClassifier {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Category decided by the fixed-priority rule cascade (first match wins)
    #[must_use]
    pub fn categorize(features: &FeatureVector) -> ImageCategory {
        let face = &features.face;
        let objects = &features.objects;
        let complexity = &features.complexity;

        if face.likely_portrait && face.face_probability > 0.4 && features.color.skin_fraction > 0.15 {
            return ImageCategory::Portrait;
        }

        if objects.object_likelihood > 0.6
            && objects.geometric_shapes > 0
            && matches!(complexity.level, ComplexityLevel::Low | ComplexityLevel::Medium)
        {
            return ImageCategory::Product;
        }

        if complexity.level == ComplexityLevel::High && complexity.entropy > 6.5 {
            return ImageCategory::Artistic;
        }

        ImageCategory::General
    }

    /// Classify from an already extracted feature vector
    #[must_use]
    pub fn classify(&self, features: &FeatureVector) -> Classification {
        let category = Self::categorize(features);
        let strategies = category.strategies();

        Classification {
            category,
            confidence: BASELINE_CONFIDENCE,
            primary_strategy: category.primary_strategy(),
            alternate_strategies: strategies.iter().skip(1).copied().collect(),
            description: category.description().to_string(),
            features: features.clone(),
        }
    }

    /// Extract features and classify
    #[instrument(skip(self, image), fields(width = image.width(), height = image.height()))]
    pub fn classify_image(&self, image: &RasterImage) -> Classification {
        let features = self.extractor.extract(image);
        let classification = self.classify(&features);
        debug!(
            category = %classification.category,
            strategy = %classification.primary_strategy,
            "Classified image"
        );
        classification
    }

    /// The override verbatim when it names a known strategy, else the primary recommendation
    #[must_use]
    pub fn recommend(&self, image: &RasterImage, user_override: Option<&str>) -> StrategyId {
        if let Some(strategy) = user_override.and_then(StrategyId::from_known) {
            return strategy;
        }
        self.classify_image(image).primary_strategy
    }

    /// Resolve a parsed request; classification is returned when it was computed
    #[must_use]
    pub fn resolve(&self, image: &RasterImage, request: StrategyRequest) -> (StrategyId, Option<Classification>) {
        match request {
            StrategyRequest::Explicit(strategy) => (strategy, None),
            StrategyRequest::Auto => {
                let classification = self.classify_image(image);
                (classification.primary_strategy, Some(classification))
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::{ColorStats, ComplexityStats, EdgeStats, FaceStats, ObjectStats};
    use image::{DynamicImage, Rgb, RgbImage};

    fn features() -> FeatureVector {
        FeatureVector {
            aspect_ratio: 1.0,
            dimensions: (100, 100),
            color: ColorStats {
                mean_rgb: [128.0; 3],
                std_rgb: [20.0; 3],
                skin_fraction: 0.0,
                color_diversity: 0.1,
                dominant_hue: 30.0,
            },
            edges: EdgeStats {
                edge_density: 0.05,
                mean_gradient: 10.0,
                gradient_std: 5.0,
            },
            face: FaceStats {
                upper_skin_fraction: 0.0,
                face_probability: 0.0,
                likely_portrait: false,
            },
            objects: ObjectStats {
                contour_count: 0,
                large_contour_count: 0,
                geometric_shapes: 0,
                object_likelihood: 0.0,
            },
            complexity: ComplexityStats {
                entropy: 5.0,
                texture_score: 20.0,
                detail_score: 100.0,
                level: ComplexityLevel::Medium,
            },
        }
    }

    #[test]
    fn test_portrait_rule() {
        let mut f = features();
        f.face = FaceStats {
            upper_skin_fraction: 0.3,
            face_probability: 0.6,
            likely_portrait: true,
        };
        f.color.skin_fraction = 0.2;
        let classification = ImageClassifier::new().classify(&f);
        assert_eq!(classification.category, ImageCategory::Portrait);
        assert_eq!(classification.primary_strategy, StrategyId::U2netHumanSeg);
        assert_eq!(classification.alternate_strategies, vec![StrategyId::U2net]);

        // Skin fraction at the boundary does not qualify
        f.color.skin_fraction = 0.15;
        assert_eq!(ImageClassifier::categorize(&f), ImageCategory::General);
    }

    #[test]
    fn test_portrait_takes_priority_over_product() {
        let mut f = features();
        f.face = FaceStats {
            upper_skin_fraction: 0.5,
            face_probability: 1.0,
            likely_portrait: true,
        };
        f.color.skin_fraction = 0.5;
        f.objects.geometric_shapes = 2;
        f.objects.large_contour_count = 2;
        f.objects.object_likelihood = 1.0;
        assert_eq!(ImageClassifier::categorize(&f), ImageCategory::Portrait);
    }

    #[test]
    fn test_product_rule_requires_moderate_complexity() {
        let mut f = features();
        f.objects = ObjectStats {
            contour_count: 3,
            large_contour_count: 1,
            geometric_shapes: 1,
            object_likelihood: 1.0,
        };
        assert_eq!(ImageClassifier::categorize(&f), ImageCategory::Product);

        f.complexity.level = ComplexityLevel::High;
        f.complexity.entropy = 6.2;
        assert_eq!(ImageClassifier::categorize(&f), ImageCategory::General);
    }

    #[test]
    fn test_artistic_rule() {
        let mut f = features();
        f.complexity.level = ComplexityLevel::High;
        f.complexity.entropy = 7.1;
        let classification = ImageClassifier::new().classify(&f);
        assert_eq!(classification.category, ImageCategory::Artistic);
        assert_eq!(classification.primary_strategy, StrategyId::IsnetGeneralUse);
    }

    #[test]
    fn test_general_fallback_and_constant_confidence() {
        let classifier = ImageClassifier::new();
        let classification = classifier.classify(&features());
        assert_eq!(classification.category, ImageCategory::General);
        assert_eq!(classification.primary_strategy, StrategyId::U2net);
        assert!(classification.alternate_strategies.is_empty());

        for category in ImageCategory::ALL {
            assert!(!category.strategies().is_empty());
        }
        assert_eq!(classification.confidence, BASELINE_CONFIDENCE);
    }

    #[test]
    fn test_classification_is_deterministic() {
        let f = features();
        let classifier = ImageClassifier::new();
        assert_eq!(classifier.classify(&f), classifier.classify(&f));
    }

    #[test]
    fn test_recommend_honors_known_override() {
        let image = RasterImage::from_dynamic(DynamicImage::ImageRgb8(RgbImage::from_pixel(
            32,
            32,
            Rgb([200, 200, 200]),
        )))
        .unwrap();
        let classifier = ImageClassifier::new();

        assert_eq!(classifier.recommend(&image, Some("silueta")), StrategyId::Silueta);
        assert_eq!(classifier.recommend(&image, Some("simple")), StrategyId::Simple);
        assert_eq!(classifier.recommend(&image, Some("not-a-model")), StrategyId::U2net);
        assert_eq!(classifier.recommend(&image, None), StrategyId::U2net);
    }

    #[test]
    fn test_resolve_only_classifies_auto_requests() {
        let image = RasterImage::from_dynamic(DynamicImage::new_rgb8(16, 16)).unwrap();
        let classifier = ImageClassifier::new();

        let (strategy, classification) =
            classifier.resolve(&image, StrategyRequest::Explicit(StrategyId::Enhanced));
        assert_eq!(strategy, StrategyId::Enhanced);
        assert!(classification.is_none());

        let (strategy, classification) = classifier.resolve(&image, StrategyRequest::Auto);
        assert_eq!(strategy, StrategyId::U2net);
        assert_eq!(classification.unwrap().category, ImageCategory::General);
    }
}
