// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use gatevision::errors::PipelineError;
use std::path::PathBuf;
use std::process::ExitCode;

mod cli;

#[derive(Parser)]
#[command(name = "gatevision")]
#[command(about = "High-throughput industrial vision pipeline: conveyor part counting and surface-defect inspection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file path (default: platform config dir / gatevision / config.json).
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the pipeline and run until Ctrl+C.
    Run {
        /// Part profile to run (defaults to the configuration's active part).
        #[arg(long)]
        part: Option<String>,

        /// Print keyboard controls and accept live start/pause packaging,
        /// reset counter, and reset packaging keystrokes during the run.
        #[arg(long)]
        interactive: bool,

        #[command(subcommand)]
        source: SourceCommand,
    },

    /// Select the part profile `run` loads by default.
    SelectPart { part_id: String },

    /// Switch a part profile's active detection method.
    SelectMethod { part_id: String, method_id: String },

    /// Set the Packaging Controller's target count.
    SetTarget { target: u32 },

    /// Merge a JSON patch onto a part's persisted per-method config override.
    UpdateConfig {
        part_id: String,
        method_id: String,
        /// JSON object patch, e.g. '{"min_area": 40}'.
        patch: String,
    },

    /// Validate and rewrite the configuration file.
    SaveConfig,

    /// List every `method_id` known to the Method Registry.
    ListMethods,

    /// Run the pipeline against a synthetic source for a fixed frame
    /// count and report achieved throughput. No hardware required.
    Bench {
        /// Part profile to run (defaults to the configuration's active part).
        #[arg(long)]
        part: Option<String>,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        #[arg(long, default_value_t = 1000)]
        frames: u32,
    },
}

#[derive(Subcommand)]
enum SourceCommand {
    /// Capture from a V4L2 Mono8 device.
    Camera {
        #[arg(long, default_value = "/dev/video0")]
        device: PathBuf,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        #[arg(long, default_value_t = 2000)]
        exposure_us: u32,
        #[arg(long, default_value_t = 280.0)]
        fps: f32,
    },
    /// Replay a raw Mono8 stream file, looping forever.
    VideoFile {
        path: PathBuf,
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        #[arg(long, default_value_t = 30.0)]
        fps: f32,
    },
    /// Generate frames in-process; no hardware required.
    Synthetic {
        #[arg(long, default_value_t = 640)]
        width: u32,
        #[arg(long, default_value_t = 480)]
        height: u32,
        #[arg(long, default_value_t = 30.0)]
        fps: f32,
    },
}

fn main() -> ExitCode {
    // RUST_LOG controls verbosity, e.g. RUST_LOG=gatevision=debug.
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run { part, interactive, source } => cli::run(cli.config, part, to_source_arg(source), interactive),
        Commands::SelectPart { part_id } => cli::select_part(cli.config, part_id),
        Commands::SelectMethod { part_id, method_id } => cli::select_method(cli.config, part_id, method_id),
        Commands::SetTarget { target } => cli::set_target(cli.config, target),
        Commands::UpdateConfig { part_id, method_id, patch } => cli::update_config(cli.config, part_id, method_id, patch),
        Commands::SaveConfig => cli::save_config(cli.config),
        Commands::ListMethods => cli::list_methods(),
        Commands::Bench { part, width, height, frames } => cli::bench(cli.config, part, width, height, frames),
    };

    match result {
        Ok(()) => ExitCode::from(0),
        Err(err @ PipelineError::ConfigInvalid { .. }) => {
            eprintln!("error: {err}");
            ExitCode::from(2)
        }
        Err(err @ PipelineError::SourceUnavailable(_)) => {
            eprintln!("error: {err}");
            ExitCode::from(3)
        }
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(1)
        }
    }
}

fn to_source_arg(source: SourceCommand) -> cli::SourceArg {
    match source {
        SourceCommand::Camera {
            device,
            width,
            height,
            exposure_us,
            fps,
        } => cli::SourceArg::Camera {
            device_path: device,
            width,
            height,
            exposure_us,
            target_fps: fps,
        },
        SourceCommand::VideoFile { path, width, height, fps } => cli::SourceArg::VideoFile {
            path,
            width,
            height,
            declared_fps: fps,
        },
        SourceCommand::Synthetic { width, height, fps } => cli::SourceArg::Synthetic { width, height, fps },
    }
}
