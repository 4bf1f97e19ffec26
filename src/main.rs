// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand, ValueEnum};
use mediacap::capture::DeviceKind;
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "mediacap")]
#[command(about = "Capture devices and record hardware-encoded H.264")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum SourceKind {
    Camera,
    Monitor,
}

impl From<SourceKind> for DeviceKind {
    fn from(kind: SourceKind) -> Self {
        match kind {
            SourceKind::Camera => DeviceKind::Camera,
            SourceKind::Monitor => DeviceKind::Monitor,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// List available capture devices
    ListDevices,

    /// Record an H.264 elementary stream from a video device
    Record {
        /// Source kind to record from
        #[arg(short, long, value_enum, default_value = "camera")]
        kind: SourceKind,

        /// Device index (from 'mediacap list-devices')
        #[arg(short, long, default_value = "0")]
        device: usize,

        /// Recording duration in seconds
        #[arg(long, default_value = "10")]
        duration: u64,

        /// Target frame rate
        #[arg(short, long, default_value = "30")]
        fps: u32,

        /// Output file path (default: capture_N.h264)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=mediacap=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::ListDevices => cli::list_devices(),
        Commands::Record {
            kind,
            device,
            duration,
            fps,
            output,
        } => cli::record(kind.into(), device, duration, fps, output),
    }
}
