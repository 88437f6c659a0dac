//! Conversion from CLI arguments to pipeline configuration

use crate::cli::main_impl::Cli;
use crate::{
    config::{FormatRequest, PipelineConfig, QualityTier},
    strategy::StrategyRequest,
};
use anyhow::{Context, Result};

pub(crate) struct CliConfigBuilder;

impl CliConfigBuilder {
    /// Build a `PipelineConfig` from CLI arguments
    pub(crate) fn from_cli(cli: &Cli) -> Result<PipelineConfig> {
        let strategy: StrategyRequest = cli.strategy.parse().context("Invalid --strategy")?;
        let quality: QualityTier = cli.quality.parse().context("Invalid --quality")?;
        let output_format: FormatRequest = cli.format.parse().context("Invalid --format")?;

        let mut builder = PipelineConfig::builder()
            .strategy(strategy)
            .quality(quality)
            .output_format(output_format)
            .max_dimension(cli.max_dimension)
            .enable_preprocessing(!cli.no_preprocess)
            .enable_postprocessing(!cli.no_postprocess)
            .disable_cache(cli.no_cache);
        if let Some(dir) = &cli.model_dir {
            builder = builder.model_dir(dir.clone());
        }
        if let Some(hint) = &cli.source_format {
            builder = builder.source_format_hint(hint.as_str());
        }

        builder.build().context("Invalid configuration")
    }
}
