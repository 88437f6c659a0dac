//! Background Removal Pipeline CLI Tool
//!
//! Command-line interface for removing backgrounds with automatic strategy
//! selection and format optimization.

#[cfg(feature = "cli")]
use bgremove_pipeline::cli;

#[cfg(feature = "cli")]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    cli::main().await
}

#[cfg(not(feature = "cli"))]
fn main() {
    eprintln!("CLI feature not enabled. Please rebuild with --features cli");
    std::process::exit(1);
}
