// SPDX-License-Identifier: GPL-3.0-only

//! `gatevision-monitor`: runs the pipeline against a synthetic or recorded
//! source and renders the [`terminal`] dashboard over it, for operators
//! without a physical camera attached. The production path is
//! `gatevision run`; this binary mirrors the teacher's separate `terminal`
//! mode entry point as its own executable instead of a subcommand, since
//! the dashboard owns the whole screen for the life of the process.

#[path = "../terminal.rs"]
mod terminal;

use clap::Parser;
use gatevision::config::Config;
use gatevision::frame::SyntheticSource;
use gatevision::Orchestrator;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use terminal::DashboardObserver;

#[derive(Parser)]
#[command(name = "gatevision-monitor")]
#[command(about = "Terminal dashboard over a running gatevision pipeline")]
struct Args {
    /// Configuration file path (default: platform config dir / gatevision / config.json).
    #[arg(long)]
    config: Option<PathBuf>,

    /// Part profile to run (defaults to the configuration's active part).
    #[arg(long)]
    part: Option<String>,

    #[arg(long, default_value_t = 640)]
    width: u32,
    #[arg(long, default_value_t = 480)]
    height: u32,
    #[arg(long, default_value_t = 60.0)]
    fps: f32,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();

    let args = Args::parse();

    let path = match args.config {
        Some(path) => path,
        None => Config::default_path()?,
    };
    let mut config = if path.exists() { Config::load(&path)? } else { Config::default() };
    if let Some(part) = args.part {
        config.active_part_id = Some(part);
        config.validate()?;
    }
    let active = config.active_part()?.clone();

    let (width, height, fps) = (args.width, args.height, args.fps);
    let generator = Arc::new(move |seq: u64| {
        let phase = (seq % 200) as u8;
        vec![phase.wrapping_mul(3).wrapping_add(40); (width * height) as usize]
    });
    let source = Box::new(SyntheticSource::new(width, height, fps, generator));

    let mut orchestrator = Orchestrator::new(source, width, height, &config, &active.part_id)?;
    let observer = DashboardObserver::new();
    orchestrator.register_observer(Box::new(observer.clone()));
    orchestrator.start()?;
    orchestrator.start_packaging();

    let stop = Arc::new(AtomicBool::new(false));
    let stop_clone = stop.clone();
    let tick_handle = thread::spawn(move || {
        while !stop_clone.load(Ordering::SeqCst) {
            if orchestrator.tick().is_err() {
                break;
            }
            thread::sleep(Duration::from_millis(1));
        }
        orchestrator.stop();
    });

    let dashboard_result = terminal::run(observer);
    stop.store(true, Ordering::SeqCst);
    let _ = tick_handle.join();
    dashboard_result
}
