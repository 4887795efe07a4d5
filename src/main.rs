//! biopsy-vision CLI: run the measurement pipeline on image files.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::Engine;
use biopsy_vision::analysis::{self, AnalysisOrchestrator};
use biopsy_vision::config::AppConfig;
use biopsy_vision::observability;
use clap::{Args, Parser, Subcommand};
use image::RgbImage;
use serde::Serialize;
use tracing::info;

#[derive(Parser)]
#[command(name = "biopsy-vision")]
#[command(about = "Calibrated measurement of biopsy samples photographed on a reference grid")]
#[command(version)]
struct Cli {
    /// Print Prometheus metrics to stderr when done.
    #[arg(long, global = true)]
    metrics: bool,

    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Calibrate, segment and measure a sample.
    Analyze(AnalyzeArgs),

    /// Detect the reference grid only.
    DetectGrid {
        /// Path to the input image.
        image: PathBuf,

        /// Physical grid spacing in millimeters.
        #[arg(long)]
        grid_size_mm: Option<f64>,
    },

    /// Segment the sample without calibration.
    Segment {
        /// Path to the input image.
        image: PathBuf,

        /// Path to write the contour overlay (JPEG).
        #[arg(long)]
        overlay: Option<PathBuf>,
    },

    /// Scale from a reference object of known size, or the fallback estimate.
    Calibrate {
        /// Path to the input image.
        image: PathBuf,

        /// Longest side of the reference object in millimeters.
        #[arg(long)]
        object_size_mm: Option<f64>,
    },

    /// Run the pipeline on the built-in synthetic image.
    SelfTest,

    /// List the available processing methods.
    Methods,
}

#[derive(Debug, Clone, Args)]
struct AnalyzeArgs {
    /// Path to the input image.
    image: PathBuf,

    /// Physical grid spacing in millimeters.
    #[arg(long)]
    grid_size_mm: Option<f64>,

    /// Known scale; skips grid detection.
    #[arg(long)]
    pixels_per_mm: Option<f64>,

    /// Path to write the result (JSON) instead of stdout.
    #[arg(long)]
    output: Option<PathBuf>,

    /// Path to write the overlay (JPEG).
    #[arg(long)]
    overlay: Option<PathBuf>,
}

fn main() -> Result<()> {
    // Load environment variables from .env file first
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    let mut config = AppConfig::from_env()
        .map_err(|e| anyhow::anyhow!("Configuration error: {}", e))?;
    if cli.metrics {
        config.observability.enable_metrics = true;
    }
    config
        .validate()
        .map_err(|e| anyhow::anyhow!("Configuration validation failed: {}", e))?;

    let metrics_handle = observability::init_observability_with_config(&config.observability)?;
    info!(config = %config.summary(), "Configuration loaded");

    let outcome = run(cli.command, config, cli.pretty);

    if let Some(handle) = metrics_handle.filter(|_| cli.metrics) {
        eprintln!("{}", handle.render());
    }
    outcome
}

fn run(command: Commands, mut config: AppConfig, pretty: bool) -> Result<()> {
    match command {
        Commands::Analyze(args) => {
            if let Some(grid_size_mm) = args.grid_size_mm {
                config.grid.grid_size_mm = grid_size_mm;
                config
                    .grid
                    .validate()
                    .map_err(|e| anyhow::anyhow!("Invalid grid size: {}", e))?;
            }
            let image = load_image(&args.image)?;
            let orchestrator = AnalysisOrchestrator::new(config);
            let result = orchestrator.analyze(&image, args.pixels_per_mm)?;

            if let (Some(path), Some(encoded)) = (&args.overlay, &result.overlay_image) {
                write_overlay(path, encoded)?;
            }
            let json = to_json(&result, pretty)?;
            match &args.output {
                Some(path) => fs::write(path, json)
                    .with_context(|| format!("Failed to write {}", path.display()))?,
                None => println!("{}", json),
            }
        }
        Commands::DetectGrid { image, grid_size_mm } => {
            if let Some(grid_size_mm) = grid_size_mm {
                config.grid.grid_size_mm = grid_size_mm;
            }
            config
                .grid
                .validate()
                .map_err(|e| anyhow::anyhow!("Invalid grid size: {}", e))?;
            let image = load_image(&image)?;
            let result = AnalysisOrchestrator::new(config).detect_grid_only(&image)?;
            println!("{}", to_json(&result, pretty)?);
        }
        Commands::Segment { image, overlay } => {
            let image = load_image(&image)?;
            let result = AnalysisOrchestrator::new(config).segment_only(&image)?;
            if let (Some(path), Some(encoded)) = (&overlay, &result.overlay_image) {
                write_overlay(path, encoded)?;
            }
            println!("{}", to_json(&result, pretty)?);
        }
        Commands::Calibrate { image, object_size_mm } => {
            let image = load_image(&image)?;
            let orchestrator = AnalysisOrchestrator::new(config);
            let fallback = orchestrator.fallback();
            let json = match object_size_mm {
                Some(size_mm) => match fallback.auto_calibrate_with_object(&image, size_mm)? {
                    Some(calibration) => to_json(&calibration, pretty)?,
                    None => {
                        info!("No valid reference object found, using fallback estimate");
                        to_json(&fallback.calibrate(image.width(), image.height()), pretty)?
                    }
                },
                None => to_json(&fallback.calibrate(image.width(), image.height()), pretty)?,
            };
            println!("{}", json);
        }
        Commands::SelfTest => {
            let report = analysis::test_vision_pipeline()?;
            for check in &report.checks {
                eprintln!("{}", check);
            }
            println!("{}", to_json(&report, pretty)?);
            if !report.passed {
                anyhow::bail!("Vision pipeline self-test failed");
            }
        }
        Commands::Methods => {
            println!("{}", to_json(&analysis::processing_methods(), pretty)?);
        }
    }
    Ok(())
}

fn load_image(path: &Path) -> Result<RgbImage> {
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(analysis::decode_image(&bytes)?)
}

fn write_overlay(path: &Path, encoded: &str) -> Result<()> {
    let bytes = base64::engine::general_purpose::STANDARD
        .decode(encoded)
        .context("Overlay is not valid base64")?;
    fs::write(path, bytes).with_context(|| format!("Failed to write {}", path.display()))?;
    info!(path = %path.display(), "Overlay written");
    Ok(())
}

fn to_json<T: Serialize>(value: &T, pretty: bool) -> Result<String> {
    let json = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    Ok(json)
}
