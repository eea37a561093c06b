// SPDX-License-Identifier: GPL-3.0-only

//! Counting Detector (§4.C): background subtraction → cleaned mask →
//! connected components → area filter → Gate Counter, with an optional
//! annotated-frame render. Grounded on the teacher's frame-processing task
//! shape (`app::frame_processor::tasks`, a per-frame analysis step
//! producing structured results) and the `CameraBackend` trait's
//! `enable`/lifecycle verbs.

use crate::detect::annotate::annotate_counting_frame;
use crate::detect::background::{BackgroundConfig, BackgroundSubtractor};
use crate::detect::edges::{adaptive_threshold, canny};
use crate::detect::morphology::{and_combine, clean_mask, clean_mask_ultra_high_speed, or_combine};
use crate::detect::{apply_partial_config, components, CountingOutcome, Detection, Detector, DetectorIntent, DetectorResult};
use crate::errors::PipelineResult;
use crate::frame::{crop, Frame, RoiConfig};
use crate::gate::{GateConfig, GateCounter, GateSnapshot};
use serde::{Deserialize, Serialize};

/// Configuration for the Counting Detector (§3 "Detection config (counting)"),
/// plus the ambient multi-strategy/ultra-high-speed knobs (§4.C, §9 OQ2).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct CountingConfig {
    pub min_area: u32,
    pub max_area: u32,
    pub bg_history: u32,
    pub bg_var_threshold: f32,
    pub bg_learning_rate: f32,
    pub gate_trigger_radius: f32,
    pub gate_history_frames: u64,
    pub gate_ratio: f32,
    pub roi_enabled: bool,
    pub roi_height: u32,
    pub roi_position_ratio: f32,
    /// `[AMBIENT]`: enables the Canny+adaptive-threshold multi-strategy mask.
    pub multi_strategy_enabled: bool,
    pub canny_low: f32,
    pub canny_high: f32,
    pub adaptive_block_size: u32,
    pub adaptive_c: f32,
    /// §9 OQ2: explicit operator toggle, no auto-detection of achievable fps.
    pub ultra_high_speed_enabled: bool,
    pub high_speed_min_area: u32,
    pub high_speed_max_area: u32,
    pub high_speed_bg_history: u32,
    pub annotate_enabled: bool,
}

impl Default for CountingConfig {
    fn default() -> Self {
        Self {
            min_area: 80,
            max_area: 20_000,
            bg_history: 300,
            bg_var_threshold: 9.0,
            bg_learning_rate: 0.01,
            gate_trigger_radius: 30.0,
            gate_history_frames: 15,
            gate_ratio: 0.5,
            roi_enabled: true,
            roi_height: 200,
            roi_position_ratio: 0.4,
            multi_strategy_enabled: false,
            canny_low: 60.0,
            canny_high: 140.0,
            adaptive_block_size: 15,
            adaptive_c: 12.0,
            ultra_high_speed_enabled: false,
            high_speed_min_area: 40,
            high_speed_max_area: 12_000,
            high_speed_bg_history: 60,
            annotate_enabled: true,
        }
    }
}

fn roi_config(config: &CountingConfig) -> RoiConfig {
    RoiConfig {
        enabled: config.roi_enabled,
        height: config.roi_height,
        position_ratio: config.roi_position_ratio,
    }
}

fn background_config(config: &CountingConfig) -> BackgroundConfig {
    let history = if config.ultra_high_speed_enabled {
        config.high_speed_bg_history
    } else {
        config.bg_history
    };
    BackgroundConfig {
        history,
        var_threshold: config.bg_var_threshold,
        learning_rate: config.bg_learning_rate,
    }
}

fn gate_config(config: &CountingConfig) -> GateConfig {
    GateConfig {
        gate_ratio: config.gate_ratio,
        gate_trigger_radius: config.gate_trigger_radius,
        gate_history_frames: config.gate_history_frames,
    }
}

/// The counting detector: MOG2-style background subtraction feeding an
/// internal [`GateCounter`] (§3: gate state is "owned exclusively by D",
/// carried with the detector and preserved across a method switch within
/// the counting intent via [`CountingDetector::gate_snapshot`]/
/// [`CountingDetector::restore_gate`]).
pub struct CountingDetector {
    config: CountingConfig,
    background: BackgroundSubtractor,
    gate: GateCounter,
    enabled: bool,
    width: u32,
    height: u32,
}

impl CountingDetector {
    pub fn new(width: u32, height: u32, config: CountingConfig) -> Self {
        let roi = roi_config(&config);
        let roi_descriptor = crate::frame::resolve(height, &roi);
        Self {
            background: BackgroundSubtractor::new(width, roi_descriptor.height, background_config(&config)),
            gate: GateCounter::new(gate_config(&config)),
            config,
            enabled: true,
            width,
            height,
        }
    }

    fn apply_config(&mut self, config: CountingConfig) {
        self.background.update_config(background_config(&config));
        self.gate.update_config(gate_config(&config));
        self.config = config;
    }

    pub fn gate_snapshot(&self) -> GateSnapshot {
        self.gate.snapshot()
    }

    pub fn restore_gate(&mut self, snapshot: GateSnapshot) {
        self.gate.restore(snapshot);
    }

    pub fn crossing_count(&self) -> u64 {
        self.gate.crossing_count()
    }
}

impl Detector for CountingDetector {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn reset(&mut self) {
        self.background.reset();
        self.gate.reset();
    }

    fn update_config(&mut self, partial: &serde_json::Value) -> PipelineResult<()> {
        let merged = apply_partial_config(&self.config, partial)?;
        self.apply_config(merged);
        Ok(())
    }

    fn intent(&self) -> DetectorIntent {
        DetectorIntent::Counting
    }

    fn gate_snapshot(&self) -> Option<GateSnapshot> {
        Some(CountingDetector::gate_snapshot(self))
    }

    fn restore_gate(&mut self, snapshot: GateSnapshot) {
        CountingDetector::restore_gate(self, snapshot)
    }

    fn process_frame(&mut self, frame: &Frame) -> PipelineResult<DetectorResult> {
        debug_assert_eq!((frame.width, frame.height), (self.width, self.height));
        if !self.enabled {
            // L2: a disabled detector leaves crossing_count (and every other
            // accumulator) untouched; it reports the frame as empty rather
            // than advancing any internal state.
            return Ok(DetectorResult::Counting(CountingOutcome {
                annotated_frame: None,
                count: self.gate.crossing_count(),
                crossing_count: self.gate.crossing_count(),
                objects: Vec::new(),
                new_crossings: 0,
            }));
        }
        let roi = roi_config(&self.config);
        let (view, y_offset) = crop(frame, &roi);
        let width = view.width;
        let height = view.height();
        let gray = view.data();

        let raw_mask = self.background.apply(gray);

        let (mask, min_area, max_area) = if self.config.ultra_high_speed_enabled {
            let cleaned = clean_mask_ultra_high_speed(&raw_mask);
            (cleaned, self.config.high_speed_min_area, self.config.high_speed_max_area)
        } else {
            let cleaned = clean_mask(&raw_mask);
            let combined = if self.config.multi_strategy_enabled {
                let canny_mask = canny(
                    gray,
                    width,
                    height,
                    self.config.canny_low / 2.0,
                    self.config.canny_high / 2.0,
                );
                let canny_masked = and_combine(&canny_mask, &cleaned);
                let adaptive_mask = adaptive_threshold(gray, width, height, self.config.adaptive_block_size, self.config.adaptive_c);
                let adaptive_masked = and_combine(&adaptive_mask, &cleaned);
                or_combine(&or_combine(&cleaned, &canny_masked), &adaptive_masked)
            } else {
                cleaned
            };
            (combined, self.config.min_area, self.config.max_area)
        };

        let stats = components::label_components(&mask);
        let mut objects = Vec::new();
        for s in stats {
            if s.bbox_w == 0 || s.bbox_h == 0 {
                continue;
            }
            if s.area < min_area || s.area > max_area {
                continue;
            }
            objects.push(Detection {
                bbox_x: s.bbox_x,
                bbox_y: s.bbox_y + y_offset,
                bbox_w: s.bbox_w,
                bbox_h: s.bbox_h,
                centroid_x: s.centroid_x,
                centroid_y: s.centroid_y + y_offset,
                area: s.area,
            });
        }

        let crossings = self.gate.on_frame(&objects, y_offset, height);
        let crossing_count = self.gate.crossing_count();

        // Annotation is optional and off the counting path (§4.C step 7): an
        // encode failure is logged and degrades to no annotated frame rather
        // than failing (and thereby skipping) the counting result itself.
        let annotated_frame = if self.config.annotate_enabled {
            let gate_y = self.gate.gate_y(y_offset, height);
            match annotate_counting_frame(frame, y_offset, height, gate_y, &objects, crossing_count) {
                Ok(png) => Some(png),
                Err(err) => {
                    tracing::warn!(error = %err, "annotated-frame encode failed; publishing without one");
                    None
                }
            }
        } else {
            None
        };

        Ok(DetectorResult::Counting(CountingOutcome {
            annotated_frame,
            count: crossing_count,
            crossing_count,
            objects,
            new_crossings: crossings.len(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;

    fn make_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(width, height, 0, vec![value; (width * height) as usize])
    }

    #[test]
    fn static_background_produces_no_detections() {
        let config = CountingConfig {
            roi_enabled: false,
            annotate_enabled: false,
            ..CountingConfig::default()
        };
        let mut detector = CountingDetector::new(64, 64, config);
        for _ in 0..10 {
            let result = detector.process_frame(&make_frame(64, 64, 60)).unwrap();
            if let DetectorResult::Counting(outcome) = result {
                assert!(outcome.objects.is_empty());
            } else {
                panic!("expected counting outcome");
            }
        }
    }

    #[test]
    fn reset_clears_gate_count_and_background_model() {
        let config = CountingConfig {
            roi_enabled: false,
            annotate_enabled: false,
            ..CountingConfig::default()
        };
        let mut detector = CountingDetector::new(32, 32, config);
        for _ in 0..5 {
            detector.process_frame(&make_frame(32, 32, 60)).unwrap();
        }
        detector.reset();
        let result = detector.process_frame(&make_frame(32, 32, 200)).unwrap();
        if let DetectorResult::Counting(outcome) = result {
            // First frame after reset re-seeds the background model; no detections yet.
            assert!(outcome.objects.is_empty());
            assert_eq!(outcome.crossing_count, 0);
        } else {
            panic!("expected counting outcome");
        }
    }

    #[test]
    fn gate_snapshot_round_trips_through_a_fresh_detector() {
        let config = CountingConfig {
            roi_enabled: false,
            annotate_enabled: false,
            ..CountingConfig::default()
        };
        let mut detector = CountingDetector::new(32, 32, config);
        for _ in 0..3 {
            detector.process_frame(&make_frame(32, 32, 60)).unwrap();
        }
        let snapshot = detector.gate_snapshot();
        let mut other = CountingDetector::new(32, 32, config);
        other.restore_gate(snapshot);
        assert_eq!(other.gate_snapshot().crossing_count(), detector.gate_snapshot().crossing_count());
    }

    #[test]
    fn l2_disabling_then_enabling_leaves_crossing_count_unchanged() {
        let config = CountingConfig {
            roi_enabled: false,
            annotate_enabled: false,
            ..CountingConfig::default()
        };
        let mut detector = CountingDetector::new(32, 32, config);
        for _ in 0..3 {
            detector.process_frame(&make_frame(32, 32, 60)).unwrap();
        }
        let before = detector.crossing_count();
        detector.disable();
        for _ in 0..5 {
            detector.process_frame(&make_frame(32, 32, 255)).unwrap();
        }
        assert_eq!(detector.crossing_count(), before);
        detector.enable();
        assert_eq!(detector.crossing_count(), before);
    }

    #[test]
    fn update_config_patches_only_the_named_fields() {
        let mut detector = CountingDetector::new(32, 32, CountingConfig::default());
        detector
            .update_config(&serde_json::json!({"min_area": 5, "max_area": 6000}))
            .unwrap();
        assert_eq!(detector.config.min_area, 5);
        assert_eq!(detector.config.max_area, 6000);
        // Unpatched fields keep their default value.
        assert_eq!(detector.config.gate_ratio, CountingConfig::default().gate_ratio);
    }

    #[test]
    fn update_config_rejects_a_patch_with_the_wrong_field_type() {
        let mut detector = CountingDetector::new(32, 32, CountingConfig::default());
        let result = detector.update_config(&serde_json::json!({"min_area": "not-a-number"}));
        assert!(matches!(result, Err(PipelineError::ConfigInvalid { .. })));
    }
}
