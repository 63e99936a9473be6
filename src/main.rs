// SPDX-License-Identifier: GPL-3.0-only

use camera_preview::backends::camera::CameraPosition;
use camera_preview::render::FilterType;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "camera-preview")]
#[command(about = "Single and dual camera preview, stills and recording")]
#[command(version = camera_preview::constants::app_info::version())]
struct Cli {
    /// Config file (default: <config dir>/camera-preview/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List available cameras
    List,

    /// Run the live preview for a while and report render statistics
    Preview {
        /// Preview duration in seconds (Ctrl+C stops early)
        #[arg(short, long, default_value = "5")]
        seconds: u64,

        /// Camera to preview (front, back, ultra-wide)
        #[arg(short, long)]
        position: Option<CameraPosition>,

        /// Preview front and back together
        #[arg(long)]
        dual: bool,

        /// Filter applied to the preview
        #[arg(short, long, default_value = "standard")]
        filter: FilterType,

        /// Save the last rendered preview image here
        #[arg(long)]
        snapshot: Option<PathBuf>,
    },

    /// Take a picture-in-picture photo with the front and back cameras
    CaptureDual {
        /// Output file path (default: ~/Pictures/camera-preview/DUAL_TIMESTAMP.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Take a photo
    Photo {
        /// Camera to use (front, back, ultra-wide)
        #[arg(short, long)]
        position: Option<CameraPosition>,

        /// Output file path (default: ~/Pictures/camera-preview/IMG_TIMESTAMP.jpg)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Record frames as a numbered JPEG sequence
    Record {
        /// Recording duration in seconds
        #[arg(short, long, default_value = "3")]
        seconds: u64,

        /// Camera to use (front, back, ultra-wide)
        #[arg(short, long)]
        position: Option<CameraPosition>,

        /// Output directory (default: ~/Videos/camera-preview/REC_TIMESTAMP)
        #[arg(short, long)]
        output_dir: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging
    // Set RUST_LOG environment variable to control log level
    // Examples: RUST_LOG=debug, RUST_LOG=camera_preview=debug, RUST_LOG=info
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();
    let config = cli::load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::List => cli::list_cameras(),
        Commands::Preview {
            seconds,
            position,
            dual,
            filter,
            snapshot,
        } => cli::preview(&config, seconds, position, dual, filter, snapshot),
        Commands::CaptureDual { output } => cli::capture_dual(&config, output),
        Commands::Photo { position, output } => cli::take_photo(&config, position, output),
        Commands::Record {
            seconds,
            position,
            output_dir,
        } => cli::record(&config, seconds, position, output_dir),
    }
}
