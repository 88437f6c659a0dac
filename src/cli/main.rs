//! Background Removal CLI Tool
//!
//! Command-line front end for the strategy-selecting pipeline.

use super::config::CliConfigBuilder;
use crate::{
    processor::BackgroundRemovalProcessor, services::TracingProgressReporter,
    tracing_config::init_cli_tracing, types::RasterImage, ProcessingResult,
};
use anyhow::{Context, Result};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use log::{error, info, warn};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Extensions picked up when walking directories
const IMAGE_EXTENSIONS: [&str; 4] = ["jpg", "jpeg", "png", "webp"];

/// Background removal with automatic strategy selection
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
#[command(name = "bgremove-pipeline")]
#[allow(clippy::struct_excessive_bools)]
pub struct Cli {
    /// Input image files or directories (use "-" for stdin)
    #[arg(value_name = "INPUT", required = true)]
    pub input: Vec<String>,

    /// Output file (single input) or directory (batch processing). Use "-" for stdout.
    #[arg(short, long, value_name = "OUTPUT")]
    pub output: Option<String>,

    /// Segmentation strategy: auto, u2net, u2net_human_seg, silueta, isnet-general-use, simple, enhanced
    #[arg(short, long, default_value = "auto")]
    pub strategy: String,

    /// Quality tier: ultra, high, medium, low
    #[arg(short, long, default_value = "high")]
    pub quality: String,

    /// Output format: auto, png, jpeg, webp
    #[arg(short, long, default_value = "auto")]
    pub format: String,

    /// Print the classification as JSON instead of removing the background
    #[arg(long)]
    pub analyze: bool,

    /// Long-edge ceiling for the working resolution
    #[arg(long, default_value_t = crate::config::DEFAULT_MAX_DIMENSION)]
    pub max_dimension: u32,

    /// Directory with `<strategy>.onnx` model files
    #[arg(long, value_name = "DIR")]
    pub model_dir: Option<PathBuf>,

    /// Source format hint; defaults to each input's file name
    #[arg(long, value_name = "HINT")]
    pub source_format: Option<String>,

    /// Skip denoise, contrast and sharpening before segmentation
    #[arg(long)]
    pub no_preprocess: bool,

    /// Skip alpha smoothing and edge refinement after segmentation
    #[arg(long)]
    pub no_postprocess: bool,

    /// Create a fresh backend for every image
    #[arg(long)]
    pub no_cache: bool,

    /// Process directories recursively
    #[arg(short, long)]
    pub recursive: bool,

    /// Enable verbose logging (-v: DEBUG, -vv: TRACE)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

pub async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_cli_tracing(cli.verbose).context("Failed to initialize tracing")?;

    let config = CliConfigBuilder::from_cli(&cli).context("Failed to build configuration")?;
    info!("Input(s): {}", cli.input.join(", "));
    info!(
        "Strategy: {}, quality: {}, format: {}",
        config.strategy, config.quality, config.output_format
    );

    let processor = BackgroundRemovalProcessor::new(config)
        .context("Failed to create processor")?
        .with_progress_reporter(Arc::new(TracingProgressReporter::new(cli.verbose > 0)));
    let available = processor.available_strategies();
    if !available.is_empty() {
        info!(
            "Model-backed strategies: {}",
            available.iter().map(ToString::to_string).collect::<Vec<_>>().join(", ")
        );
    }

    let start = Instant::now();
    let processed = process_inputs(&cli, &processor)?;
    info!(
        "Processed {} image(s) in {:.2}s",
        processed,
        start.elapsed().as_secs_f64()
    );
    Ok(())
}

fn process_inputs(cli: &Cli, processor: &BackgroundRemovalProcessor) -> Result<usize> {
    if cli.input.len() == 1 && cli.input.first().is_some_and(|s| s == "-") {
        return process_stdin(cli, processor).map(|()| 1);
    }

    let files = collect_inputs(&cli.input, cli.recursive)?;
    if files.is_empty() {
        warn!("No supported image files found in the provided inputs");
        return Ok(0);
    }
    info!("Found {} image file(s) to process", files.len());

    if cli.analyze {
        for file in &files {
            analyze_file(processor, file)?;
        }
        return Ok(files.len());
    }

    let output_dir = if files.len() > 1 {
        prepare_output_dir(cli.output.as_deref())?
    } else {
        None
    };

    let progress = if files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}")?
                .progress_chars("#>-"),
        );
        Some(pb)
    } else {
        None
    };

    let mut processed_count = 0;
    let mut failed_count = 0;
    for file in &files {
        if let Some(pb) = &progress {
            pb.set_message(format!("Processing {}", file.display()));
        }

        let explicit_output = if files.len() == 1 {
            cli.output.as_deref()
        } else {
            None
        };
        match process_file(processor, file, explicit_output, output_dir.as_deref()) {
            Ok(()) => processed_count += 1,
            Err(e) => {
                error!("Failed to process {}: {:#}", file.display(), e);
                failed_count += 1;
            },
        }

        if let Some(pb) = &progress {
            pb.inc(1);
        }
    }

    if let Some(pb) = progress {
        pb.finish_with_message(format!(
            "Completed! Processed: {processed_count}, Failed: {failed_count}"
        ));
    }
    if failed_count > 0 {
        if processed_count == 0 {
            anyhow::bail!("All {failed_count} input(s) failed to process");
        }
        warn!("Some files failed to process. Processed: {processed_count}, Failed: {failed_count}");
    }
    Ok(processed_count)
}

/// Expand inputs into a sorted list of image files
fn collect_inputs(inputs: &[String], recursive: bool) -> Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for input in inputs {
        let path = PathBuf::from(input);
        if path.is_file() {
            if is_image_file(&path) {
                files.push(path);
            } else {
                warn!("Skipping unsupported file: {}", path.display());
            }
        } else if path.is_dir() {
            files.extend(find_image_files(&path, recursive)?);
        } else {
            anyhow::bail!(
                "Input path does not exist or is not accessible: {}",
                path.display()
            );
        }
    }
    files.sort();
    Ok(files)
}

fn find_image_files(dir: &Path, recursive: bool) -> Result<Vec<PathBuf>> {
    let walker = walkdir::WalkDir::new(dir)
        .min_depth(1)
        .max_depth(if recursive { usize::MAX } else { 1 });
    let mut files = Vec::new();
    for entry in walker {
        let entry = entry.with_context(|| format!("Failed to read directory {}", dir.display()))?;
        if entry.file_type().is_file() && is_image_file(entry.path()) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

fn prepare_output_dir(output: Option<&str>) -> Result<Option<PathBuf>> {
    let Some(output) = output else {
        return Ok(None);
    };
    if output == "-" {
        anyhow::bail!("Cannot use stdout (-) as output when processing multiple files");
    }
    let output_path = PathBuf::from(output);
    if output_path.is_file() {
        anyhow::bail!(
            "Output path exists and is a file, not a directory: {}",
            output_path.display()
        );
    }
    std::fs::create_dir_all(&output_path)
        .with_context(|| format!("Failed to create output directory: {}", output_path.display()))?;
    Ok(Some(output_path))
}

fn analyze_file(processor: &BackgroundRemovalProcessor, path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let image = RasterImage::decode(&bytes).with_context(|| format!("Failed to decode {}", path.display()))?;
    let classification = processor.analyze(&image);
    let report = serde_json::json!({
        "file": path.display().to_string(),
        "classification": classification,
    });
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn process_file(
    processor: &BackgroundRemovalProcessor,
    input: &Path,
    explicit_output: Option<&str>,
    output_dir: Option<&Path>,
) -> Result<()> {
    let result = processor
        .process_file(input)
        .with_context(|| format!("Failed to remove background from {}", input.display()))?;
    log_result(input, &result);

    if explicit_output == Some("-") {
        return write_stdout(result.bytes());
    }
    let output_path = match explicit_output {
        Some(path) => PathBuf::from(path),
        None => generate_output_path(input, output_dir, &result),
    };
    result
        .save(&output_path)
        .with_context(|| format!("Failed to write {}", output_path.display()))?;
    info!("Saved {}", output_path.display());
    Ok(())
}

fn process_stdin(cli: &Cli, processor: &BackgroundRemovalProcessor) -> Result<()> {
    let data = read_stdin()?;
    if cli.analyze {
        let image = RasterImage::decode(&data).context("Failed to decode stdin data")?;
        println!("{}", serde_json::to_string_pretty(&processor.analyze(&image))?);
        return Ok(());
    }

    let result = processor
        .process_bytes(&data)
        .context("Failed to remove background from stdin data")?;
    log_result(Path::new("<stdin>"), &result);
    match cli.output.as_deref() {
        Some(path) if path != "-" => result
            .save(path)
            .with_context(|| format!("Failed to write {path}")),
        _ => write_stdout(result.bytes()),
    }
}

fn log_result(input: &Path, result: &ProcessingResult) {
    info!(
        "{}: {} ({}) -> {} bytes of {}{}",
        input.display(),
        result.strategy,
        if result.classical_path { "classical" } else { "model" },
        result.bytes().len(),
        result.format(),
        if result.encoded.fallback_used { " (fallback)" } else { "" }
    );
    if let Some(classification) = &result.classification {
        info!(
            "  ├─ Category: {} ({:.0}% confidence)",
            classification.category,
            classification.confidence * 100.0
        );
    }
    info!("  └─ {}", result.timings.summary());
}

fn read_stdin() -> Result<Vec<u8>> {
    let mut buffer = Vec::new();
    io::stdin()
        .read_to_end(&mut buffer)
        .context("Failed to read image data from stdin")?;
    if buffer.is_empty() {
        anyhow::bail!("No data received from stdin");
    }
    Ok(buffer)
}

fn write_stdout(data: &[u8]) -> Result<()> {
    let mut stdout = io::stdout();
    stdout.write_all(data).context("Failed to write image data to stdout")?;
    stdout.flush().context("Failed to flush stdout")?;
    Ok(())
}

/// `<stem>_bg_removed.<ext>` next to the input or inside `output_dir`
fn generate_output_path(input: &Path, output_dir: Option<&Path>, result: &ProcessingResult) -> PathBuf {
    let stem = input.file_stem().unwrap_or_default().to_string_lossy();
    let file_name = result.encoded.file_name(&format!("{stem}_bg_removed"));
    let dir = output_dir.unwrap_or_else(|| input.parent().unwrap_or(Path::new(".")));
    dir.join(file_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_is_image_file() {
        assert!(is_image_file(Path::new("a.JPG")));
        assert!(is_image_file(Path::new("dir/b.webp")));
        assert!(!is_image_file(Path::new("notes.txt")));
        assert!(!is_image_file(Path::new("no_extension")));
    }

    #[test]
    fn test_collect_inputs_walks_directories() {
        let dir = TempDir::new().unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        std::fs::write(dir.path().join("b.png"), b"x").unwrap();
        std::fs::write(dir.path().join("a.jpg"), b"x").unwrap();
        std::fs::write(dir.path().join("readme.md"), b"x").unwrap();
        std::fs::write(nested.join("c.webp"), b"x").unwrap();

        let root = dir.path().to_string_lossy().to_string();
        let flat = collect_inputs(&[root.clone()], false).unwrap();
        assert_eq!(flat.len(), 2);
        assert!(flat[0].ends_with("a.jpg"));

        let recursive = collect_inputs(&[root], true).unwrap();
        assert_eq!(recursive.len(), 3);
    }

    #[test]
    fn test_missing_input_is_an_error() {
        assert!(collect_inputs(&["/definitely/not/here.png".to_string()], false).is_err());
    }

    #[test]
    fn test_prepare_output_dir_rejects_stdout() {
        assert!(prepare_output_dir(Some("-")).is_err());
        assert!(prepare_output_dir(None).unwrap().is_none());
    }
}
