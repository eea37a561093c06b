// SPDX-License-Identifier: GPL-3.0-only

//! Pipeline Orchestrator: pulls frames from the active Frame Source,
//! applies downscale and frame-skip, delegates to the active Detector, feeds
//! the Gate Counter's new crossings to the Packaging Controller, and fans
//! out a `PipelineEvent` to every registered observer.
//!
//! Grounded on the teacher's `CameraBackendManager` (`backends::camera::manager`):
//! a `Mutex`-guarded piece of lifecycle state with methods that take the lock,
//! do one thing, and release it, generalized from "manage one backend" to
//! "run the per-frame pipeline and fan out to observers": no global
//! mutable state beyond the orchestrator's registered-observer list.

use crate::config::Config;
use crate::detect::{Detector, DetectorResult};
use crate::errors::{PipelineError, PipelineResult};
use crate::events::{
    DetectorResultSummary, FrameProcessedEvent, GateCrossingEvent, MethodChangedEvent,
    Observer, PackagingCompleteEvent, PackagingStateChangedEvent, PipelineEvent,
};
use crate::frame::{Frame, FrameSource};
use crate::packaging::PackagingController;
use crate::registry::MethodRegistry;
use serde_json::Value;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{error, info, warn};

/// Resolve the frame dimensions the detector actually operates on after a
/// configured downscale factor is applied.
fn scaled_dims(width: u32, height: u32, ratio: f32) -> (u32, u32) {
    if (ratio - 1.0).abs() < f32::EPSILON {
        return (width, height);
    }
    let w = ((width as f32) * ratio).round().max(1.0) as u32;
    let h = ((height as f32) * ratio).round().max(1.0) as u32;
    (w, h)
}

/// Nearest-neighbor resample of a Mono8 buffer. Coarse by design: the
/// pipeline trades resample quality for throughput at the 280 fps target.
fn downscale(frame: &Frame, ratio: f32) -> Frame {
    let (new_width, new_height) = scaled_dims(frame.width, frame.height, ratio);
    if new_width == frame.width && new_height == frame.height {
        return frame.clone();
    }
    let mut data = vec![0u8; (new_width as usize) * (new_height as usize)];
    for y in 0..new_height {
        let sy = ((y as f32) / ratio).min((frame.height - 1) as f32) as u32;
        for x in 0..new_width {
            let sx = ((x as f32) / ratio).min((frame.width - 1) as f32) as u32;
            data[(y * new_width + x) as usize] = frame.pixel(sx, sy).unwrap_or(0);
        }
    }
    Frame::new(new_width, new_height, frame.sequence, data)
}

/// Runs the per-frame pipeline. Owns the active Detector, the
/// Packaging Controller, and the observer list; the Frame Source is handed
/// in already constructed as a separate concern.
pub struct Orchestrator {
    source: Box<dyn FrameSource>,
    detector: Box<dyn Detector>,
    packaging: PackagingController,
    observers: Arc<Mutex<Vec<Box<dyn Observer>>>>,
    frame_counter: u64,
    downscale_ratio: f32,
    frame_skip: u32,
    detector_width: u32,
    detector_height: u32,
    part_id: String,
    method_id: String,
    running: bool,
}

impl Orchestrator {
    /// Build an orchestrator for `part_id`'s currently-selected method,
    /// against a Frame Source that produces `source_width x source_height`
    /// frames (before any configured downscale).
    pub fn new(
        source: Box<dyn FrameSource>,
        source_width: u32,
        source_height: u32,
        config: &Config,
        part_id: &str,
    ) -> PipelineResult<Self> {
        let part = config
            .parts
            .iter()
            .find(|p| p.part_id == part_id)
            .ok_or_else(|| PipelineError::ConfigInvalid {
                field: "part_id".to_string(),
                reason: format!("no part profile named `{part_id}`"),
            })?;
        let method_entry = part
            .available_methods
            .iter()
            .find(|m| m.method_id == part.current_method_id)
            .ok_or_else(|| PipelineError::ConfigInvalid {
                field: "parts[].current_method_id".to_string(),
                reason: "current_method_id not found among available_methods".to_string(),
            })?;

        let ratio = config.performance.downscale.ratio();
        let (detector_width, detector_height) = scaled_dims(source_width, source_height, ratio);
        let effective_config = config.effective_method_config(&method_entry.method_id, &method_entry.config);
        let detector = MethodRegistry::create(&method_entry.method_id, detector_width, detector_height, &effective_config)?;

        info!(
            part_id = %part.part_id,
            method_id = %method_entry.method_id,
            detector_width,
            detector_height,
            "orchestrator constructed"
        );

        Ok(Self {
            source,
            detector,
            packaging: PackagingController::new(config.packaging),
            observers: Arc::new(Mutex::new(Vec::new())),
            frame_counter: 0,
            downscale_ratio: ratio,
            frame_skip: config.performance.frame_skip,
            detector_width,
            detector_height,
            part_id: part.part_id.clone(),
            method_id: method_entry.method_id.clone(),
            running: false,
        })
    }

    /// Register a passive observer. Only permitted outside the
    /// processing loop, guarded by the same lock `publish` takes.
    pub fn register_observer(&self, observer: Box<dyn Observer>) {
        self.observers
            .lock()
            .expect("observer list mutex poisoned")
            .push(observer);
    }

    pub fn part_id(&self) -> &str {
        &self.part_id
    }

    pub fn method_id(&self) -> &str {
        &self.method_id
    }

    pub fn packaging_state(&self) -> crate::packaging::PackagingState {
        self.packaging.state()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Start the Frame Source's producer thread and begin accepting ticks.
    pub fn start(&mut self) -> PipelineResult<()> {
        self.source.start()?;
        self.running = true;
        Ok(())
    }

    /// Stop the processing loop and the Frame Source.
    pub fn stop(&mut self) {
        self.running = false;
        self.source.stop();
    }

    /// Reset the active detector's accumulators (operator "reset counter").
    pub fn reset_counter(&mut self) {
        self.detector.reset();
    }

    /// Reset the Packaging Controller to Idle (operator "reset packaging").
    pub fn reset_packaging(&mut self) {
        self.packaging.reset();
    }

    /// Apply a partial JSON config patch to the active detector in place
    /// (§4.C `update_config`), without destroying and reconstructing it the
    /// way [`Orchestrator::set_method`] does — the path for an operator
    /// tuning thresholds on a running pipeline rather than switching methods.
    pub fn update_detector_config(&mut self, partial: &Value) -> PipelineResult<()> {
        self.detector.update_config(partial)
    }

    pub fn start_packaging(&mut self) {
        self.packaging.start();
    }

    pub fn pause_packaging(&mut self) {
        self.packaging.pause();
    }

    /// Switch the active detector to `method_id`.
    ///
    /// Pauses the loop, instantiates the new detector via the Method
    /// Registry, resets it, carries Gate Counter state across if both the
    /// old and new detector share the Counting intent, resets Packaging
    /// Controller state if the intent changed, then resumes and publishes
    /// `method_changed` exactly once.
    pub fn set_method(&mut self, part_id: &str, method_id: &str, config: &Value) -> PipelineResult<()> {
        let was_running = self.running;
        self.running = false;

        let old_intent = self.detector.intent();
        let mut new_detector = MethodRegistry::create(method_id, self.detector_width, self.detector_height, config)?;
        new_detector.reset();

        if old_intent == new_detector.intent() {
            if let Some(snapshot) = self.detector.gate_snapshot() {
                new_detector.restore_gate(snapshot);
            }
        } else {
            self.packaging.reset();
        }

        let new_intent = new_detector.intent();
        self.detector = new_detector;
        self.part_id = part_id.to_string();
        self.method_id = method_id.to_string();
        self.running = was_running;

        info!(part_id, method_id, "method switched");
        self.publish(PipelineEvent::MethodChanged(MethodChangedEvent {
            part_id: part_id.to_string(),
            method_id: method_id.to_string(),
            intent: new_intent,
        }));
        Ok(())
    }

    fn frame_period(&self) -> Duration {
        let fps = self.source.fps().max(1.0);
        Duration::from_secs_f32(1.0 / fps)
    }

    /// Run the tick loop until `stop()` is called or a fatal error occurs.
    pub fn run(&mut self) -> PipelineResult<()> {
        while self.running {
            self.tick()?;
        }
        Ok(())
    }

    /// One orchestrator iteration: read, downscale, frame-skip,
    /// detect, route to Gate Counter / Packaging Controller, publish.
    pub fn tick(&mut self) -> PipelineResult<()> {
        if !self.running {
            return Ok(());
        }
        self.frame_counter += 1;

        let frame = match self.source.read() {
            Some(frame) => frame,
            None => {
                std::thread::sleep(self.frame_period());
                return Ok(());
            }
        };

        let frame = if (self.downscale_ratio - 1.0).abs() > f32::EPSILON {
            downscale(&frame, self.downscale_ratio)
        } else {
            frame
        };

        if self.frame_skip > 0 && self.frame_counter % (self.frame_skip as u64 + 1) != 0 {
            return Ok(());
        }

        let result = match self.detector.process_frame(&frame) {
            Ok(result) => result,
            Err(PipelineError::DetectorTransient(msg)) => {
                warn!(sequence = frame.sequence, error = %msg, "detector transient error; frame skipped");
                return Ok(());
            }
            Err(PipelineError::DetectorFatal(msg)) => {
                error!(sequence = frame.sequence, error = %msg, "detector fatal error; stopping orchestrator");
                self.running = false;
                return Err(PipelineError::DetectorFatal(msg));
            }
            Err(other) => return Err(other),
        };

        self.publish_frame_result(&frame, &result);

        if let DetectorResult::Counting(outcome) = &result {
            if outcome.new_crossings > 0 {
                self.publish(PipelineEvent::GateCrossing(GateCrossingEvent {
                    sequence: frame.sequence,
                    count_after: outcome.crossing_count,
                    crossings_in_frame: outcome.new_crossings,
                }));
            }

            let just_completed = self.packaging.on_count_changed(outcome.crossing_count as u32);
            let state = self.packaging.state();
            self.publish(PipelineEvent::PackagingStateChanged(PackagingStateChangedEvent {
                mode: state.mode,
                current: state.current,
                target: state.target,
                speed_a: state.vibrator_a_speed,
                speed_b: state.vibrator_b_speed,
            }));
            if just_completed {
                self.publish(PipelineEvent::PackagingComplete(PackagingCompleteEvent {
                    target: state.target,
                    final_count: state.current,
                }));
            }
        }

        Ok(())
    }

    fn publish_frame_result(&self, frame: &Frame, result: &DetectorResult) {
        let annotated_frame = match result {
            DetectorResult::Counting(outcome) => outcome.annotated_frame.clone(),
            DetectorResult::Defect(_) => None,
        };
        self.publish(PipelineEvent::FrameProcessed(FrameProcessedEvent {
            sequence: frame.sequence,
            fps: self.source.fps(),
            detector_intent: self.detector.intent(),
            annotated_frame,
            detector_results: DetectorResultSummary::from(result),
        }));
    }

    /// Fan out one event to every observer in registration order; an
    /// observer that errors is logged and unregistered.
    fn publish(&self, event: PipelineEvent) {
        let mut observers = self.observers.lock().expect("observer list mutex poisoned");
        observers.retain_mut(|observer| match observer.on_event(&event) {
            Ok(()) => true,
            Err(err) => {
                warn!(error = %err, "observer errored; unregistering");
                false
            }
        });
    }
}
