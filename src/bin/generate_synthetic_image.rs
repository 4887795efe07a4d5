//! Writes the synthetic grid + ellipse test image to disk.

use std::path::PathBuf;

use anyhow::{Context, Result};
use biopsy_vision::synthetic::{create_synthetic_image, SyntheticImageOptions};
use clap::Parser;

#[derive(Parser)]
#[command(name = "generate_synthetic_image")]
#[command(about = "Generate a synthetic biopsy-on-grid test image")]
struct Cli {
    /// Output path; the format follows the extension.
    #[arg(long, default_value = "tmp/synthetic_biopsy.png")]
    output: PathBuf,

    /// Grid spacing in pixels.
    #[arg(long, default_value = "40")]
    spacing: u32,

    /// Per-channel noise amplitude (0 disables noise).
    #[arg(long, default_value = "0")]
    noise: u8,

    /// Noise seed.
    #[arg(long, default_value = "42")]
    seed: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let options = SyntheticImageOptions {
        grid_spacing_px: cli.spacing,
        noise_amplitude: cli.noise,
        seed: cli.seed,
        ..SyntheticImageOptions::default()
    };
    let image = create_synthetic_image(&options);

    if let Some(parent) = cli.output.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    image
        .save(&cli.output)
        .with_context(|| format!("Failed to write {}", cli.output.display()))?;

    println!(
        "Wrote {} ({}x{}, grid spacing {} px, expected {:.2} px/mm at 10 mm)",
        cli.output.display(),
        image.width(),
        image.height(),
        options.grid_spacing_px,
        options.expected_pixels_per_mm(10.0)
    );
    Ok(())
}
