// SPDX-License-Identifier: GPL-3.0-only

//! Operator CLI commands. `run` starts the pipeline and blocks until
//! Ctrl+C or, in `--interactive` mode, a quit keystroke; there is no IPC
//! layer to a separately-running process, so start/stop/reset-counter/
//! reset-packaging/reload-config are exposed as keyboard controls inside
//! that same session rather than as standalone subcommands. select-part,
//! select-method, set-target, update-config, and save-config are one-shot
//! commands against the persisted configuration file. bench runs the
//! pipeline against a `SyntheticSource` for a fixed frame count and reports
//! achieved throughput.
//!
//! Grounded on the teacher's `cli.rs`: one function per operator verb,
//! `ctrlc::set_handler` plus an `Arc<AtomicBool>` stop flag for graceful
//! interruption (`record_video`), and plain `println!` progress reporting
//! for a headless CLI.

use gatevision::config::{Config, MethodEntryConfig};
use gatevision::errors::{PipelineError, PipelineResult};
use gatevision::frame::{CameraSource, FrameSource, SourceConfig, SyntheticSource, VideoFileSource};
use gatevision::orchestrator::Orchestrator;
use gatevision::registry::MethodRegistry;
use crossterm::event::{self, Event, KeyCode, KeyEventKind};
use crossterm::terminal::{disable_raw_mode, enable_raw_mode};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Config I/O is the only place this CLI reaches for `tokio`: a small
/// current-thread runtime wraps the async `tokio::fs` calls, mirroring the
/// teacher's `Runtime::new()?.block_on(async { .. })` pattern in
/// `take_photo`/`process_burst_mode` for its own I/O-bound work. The
/// per-frame hot path never touches this runtime.
fn io_runtime() -> PipelineResult<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(|err| PipelineError::SourceUnavailable(format!("failed to start tokio runtime: {err}")))
}

async fn read_config_async(path: &Path) -> PipelineResult<Config> {
    if !tokio::fs::try_exists(path).await.unwrap_or(false) {
        return Ok(Config::default());
    }
    let bytes = tokio::fs::read(path).await?;
    let config: Config = serde_json::from_slice(&bytes)?;
    config.validate()?;
    Ok(config)
}

async fn write_config_async(config: &Config, path: &Path) -> PipelineResult<()> {
    config.validate()?;
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let tmp_path = path.with_extension("json.tmp");
    let bytes = serde_json::to_vec_pretty(config)?;
    tokio::fs::write(&tmp_path, &bytes).await?;
    tokio::fs::rename(&tmp_path, path).await?;
    Ok(())
}

fn persist_config(config: &Config, path: &Path) -> PipelineResult<()> {
    io_runtime()?.block_on(write_config_async(config, path))
}

/// Which concrete Frame Source `run` should build. A vendor GigE
/// SDK is not represented here; `Camera` covers the V4L2 path this
/// crate implements in its place.
pub enum SourceArg {
    Camera {
        device_path: PathBuf,
        width: u32,
        height: u32,
        exposure_us: u32,
        target_fps: f32,
    },
    VideoFile {
        path: PathBuf,
        width: u32,
        height: u32,
        declared_fps: f32,
    },
    Synthetic {
        width: u32,
        height: u32,
        fps: f32,
    },
}

fn resolve_config_path(config_path: Option<PathBuf>) -> PipelineResult<PathBuf> {
    match config_path {
        Some(path) => Ok(path),
        None => Config::default_path(),
    }
}

fn load_config(config_path: Option<PathBuf>) -> PipelineResult<(Config, PathBuf)> {
    let path = resolve_config_path(config_path)?;
    let config = io_runtime()?.block_on(read_config_async(&path))?;
    Ok((config, path))
}

/// `gatevision run`. Exit codes are decided by the caller in
/// `main` based on the error kind this returns (ConfigInvalid -> 2,
/// SourceUnavailable at startup -> 3).
pub fn run(config_path: Option<PathBuf>, part_id: Option<String>, source: SourceArg, interactive: bool) -> PipelineResult<()> {
    let (mut config, resolved_path) = load_config(config_path)?;
    config.validate()?;
    if let Some(part_id) = part_id {
        config.active_part_id = Some(part_id);
        config.validate()?;
    }
    let active = config.active_part()?.clone();

    let (source_box, source_width, source_height): (Box<dyn FrameSource>, u32, u32) = match source {
        SourceArg::Camera {
            device_path,
            width,
            height,
            exposure_us,
            target_fps,
        } => {
            let cfg = SourceConfig::Camera {
                device_path,
                width,
                height,
                exposure_us,
                target_fps,
            };
            (Box::new(CameraSource::open(cfg)?), width, height)
        }
        SourceArg::VideoFile {
            path,
            width,
            height,
            declared_fps,
        } => {
            let cfg = SourceConfig::VideoFile {
                path,
                width,
                height,
                declared_fps,
            };
            (Box::new(VideoFileSource::open(cfg)?), width, height)
        }
        SourceArg::Synthetic { width, height, fps } => {
            let generator = Arc::new(move |_seq: u64| vec![60u8; (width * height) as usize]);
            (Box::new(SyntheticSource::new(width, height, fps, generator)), width, height)
        }
    };

    let mut orchestrator = Orchestrator::new(source_box, source_width, source_height, &config, &active.part_id)?;
    orchestrator.start()?;
    orchestrator.start_packaging();
    println!(
        "[{}] pipeline started: part `{}`, method `{}`",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        active.part_id,
        orchestrator.method_id()
    );
    info!(part_id = %active.part_id, method_id = orchestrator.method_id(), "pipeline started");

    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_clone = stop_flag.clone();
    ctrlc::set_handler(move || {
        stop_flag_clone.store(true, Ordering::SeqCst);
    })
    .map_err(|err| PipelineError::SourceUnavailable(format!("failed to install Ctrl+C handler: {err}")))?;

    if interactive {
        println!(
            "[s] start packaging  [p] pause packaging  [r] reset counter  [z] reset packaging  \
             [u] reload detector config  [q] quit"
        );
        enable_raw_mode().map_err(|err| PipelineError::SourceUnavailable(err.to_string()))?;
    }

    let result = run_loop(&mut orchestrator, &stop_flag, interactive, &resolved_path, &active.part_id);

    if interactive {
        let _ = disable_raw_mode();
    }
    orchestrator.stop();
    info!("pipeline stopped");
    result
}

fn run_loop(
    orchestrator: &mut Orchestrator,
    stop_flag: &Arc<AtomicBool>,
    interactive: bool,
    config_path: &Path,
    part_id: &str,
) -> PipelineResult<()> {
    while !stop_flag.load(Ordering::SeqCst) {
        orchestrator.tick()?;

        if interactive {
            match event::poll(Duration::from_millis(0)) {
                Ok(true) => {
                    if let Ok(Event::Key(key)) = event::read() {
                        if key.kind == KeyEventKind::Press {
                            match key.code {
                                KeyCode::Char('q') => stop_flag.store(true, Ordering::SeqCst),
                                KeyCode::Char('s') => orchestrator.start_packaging(),
                                KeyCode::Char('p') => orchestrator.pause_packaging(),
                                KeyCode::Char('r') => orchestrator.reset_counter(),
                                KeyCode::Char('z') => orchestrator.reset_packaging(),
                                KeyCode::Char('u') => match reload_detector_config(orchestrator, config_path, part_id) {
                                    Ok(()) => info!("detector config reloaded"),
                                    Err(err) => warn!(error = %err, "failed to reload detector config"),
                                },
                                _ => {}
                            }
                        }
                    }
                }
                Ok(false) => {}
                Err(err) => warn!(error = %err, "terminal event poll failed"),
            }
        }
    }
    Ok(())
}

/// `[u]` keystroke handler: re-read the persisted config and patch the
/// currently-active detector in place with `part_id`'s current method
/// override, without a method switch and without disturbing gate or
/// packaging state.
fn reload_detector_config(orchestrator: &mut Orchestrator, config_path: &Path, part_id: &str) -> PipelineResult<()> {
    let config = io_runtime()?.block_on(read_config_async(config_path))?;
    let part = config
        .parts
        .iter()
        .find(|p| p.part_id == part_id)
        .ok_or_else(|| PipelineError::ConfigInvalid {
            field: "part_id".to_string(),
            reason: format!("no part profile named `{part_id}`"),
        })?;
    let method_id = orchestrator.method_id().to_string();
    let entry = part
        .available_methods
        .iter()
        .find(|m| m.method_id == method_id)
        .ok_or_else(|| PipelineError::ConfigInvalid {
            field: "method_id".to_string(),
            reason: format!("part `{part_id}` has no method `{method_id}`"),
        })?;
    let effective = config.effective_method_config(&method_id, &entry.config);
    orchestrator.update_detector_config(&effective)
}

/// `gatevision select-part`: persist which part profile `run` should
/// load by default.
pub fn select_part(config_path: Option<PathBuf>, part_id: String) -> PipelineResult<()> {
    let (mut config, path) = load_config(config_path)?;
    config.active_part_id = Some(part_id.clone());
    config.validate()?;
    persist_config(&config, &path)?;
    println!("active part set to `{part_id}`");
    Ok(())
}

/// `gatevision select-method`: change `part_id`'s `current_method_id`,
/// adding the method to its candidate list if it isn't already present.
pub fn select_method(config_path: Option<PathBuf>, part_id: String, method_id: String) -> PipelineResult<()> {
    if !MethodRegistry::is_known(&method_id) {
        return Err(PipelineError::MethodUnknown(method_id));
    }
    let (mut config, path) = load_config(config_path)?;
    let part = config
        .parts
        .iter_mut()
        .find(|p| p.part_id == part_id)
        .ok_or_else(|| PipelineError::ConfigInvalid {
            field: "part_id".to_string(),
            reason: format!("no part profile named `{part_id}`"),
        })?;
    if !part.available_methods.iter().any(|m| m.method_id == method_id) {
        part.available_methods.push(MethodEntryConfig {
            method_id: method_id.clone(),
            config: serde_json::Value::Null,
        });
    }
    part.current_method_id = method_id.clone();
    config.validate()?;
    persist_config(&config, &path)?;
    println!("part `{part_id}` now uses method `{method_id}`");
    Ok(())
}

/// `gatevision set-target`: update the Packaging Controller's target count.
pub fn set_target(config_path: Option<PathBuf>, target: u32) -> PipelineResult<()> {
    let (mut config, path) = load_config(config_path)?;
    config.packaging.target = target;
    config.validate()?;
    persist_config(&config, &path)?;
    println!("packaging target set to {target}");
    Ok(())
}

/// `gatevision save-config`: validate and rewrite the configuration
/// file, normalizing its on-disk representation.
pub fn save_config(config_path: Option<PathBuf>) -> PipelineResult<()> {
    let (config, path) = load_config(config_path)?;
    persist_config(&config, &path)?;
    println!("configuration saved to {}", path.display());
    Ok(())
}

/// `gatevision list-methods`: print every `method_id` the Method Registry knows.
pub fn list_methods() -> PipelineResult<()> {
    for method_id in MethodRegistry::list() {
        println!("{method_id}");
    }
    Ok(())
}

/// `gatevision update-config`: merge a JSON patch onto `method_id`'s
/// persisted per-part config override. Takes effect the next time that
/// method is constructed or switched to (a `run --interactive` session
/// already on that method picks it up live via the `[u]` keystroke).
pub fn update_config(config_path: Option<PathBuf>, part_id: String, method_id: String, patch_json: String) -> PipelineResult<()> {
    let patch: serde_json::Value = serde_json::from_str(&patch_json).map_err(|err| PipelineError::ConfigInvalid {
        field: "patch".to_string(),
        reason: err.to_string(),
    })?;

    let (mut config, path) = load_config(config_path)?;
    let part = config
        .parts
        .iter_mut()
        .find(|p| p.part_id == part_id)
        .ok_or_else(|| PipelineError::ConfigInvalid {
            field: "part_id".to_string(),
            reason: format!("no part profile named `{part_id}`"),
        })?;
    let entry = part
        .available_methods
        .iter_mut()
        .find(|m| m.method_id == method_id)
        .ok_or_else(|| PipelineError::ConfigInvalid {
            field: "method_id".to_string(),
            reason: format!("part `{part_id}` has no method `{method_id}`"),
        })?;
    entry.config = Config::merge_config_override(&entry.config, &patch);
    config.validate()?;
    persist_config(&config, &path)?;
    println!("part `{part_id}` method `{method_id}` config patched");
    Ok(())
}

/// `gatevision bench`: run the pipeline against a `SyntheticSource` for a
/// fixed frame count and report achieved throughput. No hardware required.
pub fn bench(config_path: Option<PathBuf>, part_id: Option<String>, width: u32, height: u32, frames: u32) -> PipelineResult<()> {
    let (mut config, _path) = load_config(config_path)?;
    if let Some(part_id) = part_id {
        config.active_part_id = Some(part_id);
        config.validate()?;
    }
    let active = config.active_part()?.clone();

    let generator = Arc::new(move |seq: u64| {
        let phase = (seq % 200) as u8;
        vec![phase.wrapping_mul(3).wrapping_add(40); (width * height) as usize]
    });
    let source = Box::new(SyntheticSource::new(width, height, 1000.0, generator));
    let mut orchestrator = Orchestrator::new(source, width, height, &config, &active.part_id)?;
    orchestrator.start()?;

    let started = Instant::now();
    for _ in 0..frames {
        orchestrator.tick()?;
    }
    let elapsed = started.elapsed();
    orchestrator.stop();

    let achieved_fps = frames as f64 / elapsed.as_secs_f64().max(f64::EPSILON);
    println!(
        "processed {frames} frames in {:.3}s ({achieved_fps:.1} fps) — part `{}`, method `{}`",
        elapsed.as_secs_f64(),
        active.part_id,
        orchestrator.method_id(),
    );
    Ok(())
}
