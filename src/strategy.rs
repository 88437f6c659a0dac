//! Segmentation strategy identifiers
//!
//! A strategy id selects which segmentation approach processes an image: one
//! of the learned models served by a delegated backend, or one of the
//! classical algorithms that run in-process.

use crate::error::{BgRemovalError, Result};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Known segmentation strategies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StrategyId {
    /// General purpose salient object model
    #[serde(rename = "u2net")]
    U2net,
    /// Model trained for people and portraits
    #[serde(rename = "u2net_human_seg")]
    U2netHumanSeg,
    /// Compact model suited to products and objects
    #[serde(rename = "silueta")]
    Silueta,
    /// Model for artistic images and complex scenes
    #[serde(rename = "isnet-general-use")]
    IsnetGeneralUse,
    /// Classical three-cue fusion with seeded foreground extraction
    #[serde(rename = "enhanced")]
    Enhanced,
    /// Classical adaptive local thresholding
    #[serde(rename = "simple")]
    Simple,
}

impl StrategyId {
    /// Every known strategy id
    pub const ALL: [StrategyId; 6] = [
        Self::U2net,
        Self::U2netHumanSeg,
        Self::Silueta,
        Self::IsnetGeneralUse,
        Self::Enhanced,
        Self::Simple,
    ];

    /// Strategies served by a delegated (learned model) backend
    pub const DELEGATED: [StrategyId; 4] = [
        Self::U2net,
        Self::U2netHumanSeg,
        Self::Silueta,
        Self::IsnetGeneralUse,
    ];

    /// Literal identifier string
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::U2net => "u2net",
            Self::U2netHumanSeg => "u2net_human_seg",
            Self::Silueta => "silueta",
            Self::IsnetGeneralUse => "isnet-general-use",
            Self::Enhanced => "enhanced",
            Self::Simple => "simple",
        }
    }

    /// Human-readable description
    #[must_use]
    pub fn description(self) -> &'static str {
        match self {
            Self::U2net => "General purpose model",
            Self::U2netHumanSeg => "Optimized for people and portraits",
            Self::Silueta => "Compact model for products and objects",
            Self::IsnetGeneralUse => "High quality model for complex scenes",
            Self::Enhanced => "Color, edge and seeded graph-cut segmentation",
            Self::Simple => "Adaptive threshold segmentation",
        }
    }

    /// Whether the strategy requires a delegated backend
    #[must_use]
    pub fn is_delegated(self) -> bool {
        !self.is_classical()
    }

    /// Whether the strategy runs a classical in-process algorithm
    #[must_use]
    pub fn is_classical(self) -> bool {
        matches!(self, Self::Enhanced | Self::Simple)
    }

    /// Look up a known id, `None` for anything else
    #[must_use]
    pub fn from_known(id: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == id)
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyId {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        Self::from_known(s.trim()).ok_or_else(|| {
            BgRemovalError::unsupported_parameter("strategy", s, &Self::ALL.map(Self::as_str))
        })
    }
}

/// Requested strategy: classifier recommendation or an explicit id
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StrategyRequest {
    #[default]
    Auto,
    Explicit(StrategyId),
}

impl FromStr for StrategyRequest {
    type Err = BgRemovalError;

    fn from_str(s: &str) -> Result<Self> {
        let trimmed = s.trim();
        if trimmed == "auto" {
            return Ok(Self::Auto);
        }
        StrategyId::from_known(trimmed)
            .map(Self::Explicit)
            .ok_or_else(|| {
                let mut valid = vec!["auto"];
                valid.extend(StrategyId::ALL.map(StrategyId::as_str));
                BgRemovalError::unsupported_parameter("strategy", s, &valid)
            })
    }
}

impl std::fmt::Display for StrategyRequest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => f.write_str("auto"),
            Self::Explicit(id) => write!(f, "{id}"),
        }
    }
}
