// SPDX-License-Identifier: GPL-3.0-only

//! Gate Counter: a pure function of the ordered detection stream.
//! No teacher analog exists for counting; the struct/impl shape follows
//! the teacher's bounded-state-struct convention (`#[derive(Debug, Clone,
//! Default)]`, `Vec`-backed bounded collections).

use crate::detect::Detection;
use serde::{Deserialize, Serialize};

/// A short-lived fingerprint of a counted detection, used for de-duplication.
#[derive(Debug, Clone, Copy, PartialEq)]
struct TriggerRecord {
    cx: u32,
    cy: u32,
    frame_index_at_insert: u64,
}

/// Configuration driving gate placement and de-duplication.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GateConfig {
    pub gate_ratio: f32,
    pub gate_trigger_radius: f32,
    pub gate_history_frames: u64,
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            gate_ratio: 0.5,
            gate_trigger_radius: 30.0,
            gate_history_frames: 15,
        }
    }
}

/// A virtual-gate crossing accepted on one frame, carried in the `gate_crossing` event payload.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Crossing {
    pub cx: u32,
    pub cy: u32,
}

/// A point-in-time copy of the counter's state, used to carry gate state
/// across a method switch within the same intent.
#[derive(Debug, Clone)]
pub struct GateSnapshot {
    crossing_count: u64,
    frame_index: u64,
    triggered: Vec<TriggerRecord>,
}

impl GateSnapshot {
    pub fn crossing_count(&self) -> u64 {
        self.crossing_count
    }
}

/// The Gate Counter state machine. Not thread-safe for concurrent
/// callers; the orchestrator guarantees `on_frame` is called sequentially
/// from a single thread.
#[derive(Debug, Clone)]
pub struct GateCounter {
    config: GateConfig,
    crossing_count: u64,
    frame_index: u64,
    triggered: Vec<TriggerRecord>,
}

impl GateCounter {
    pub fn new(config: GateConfig) -> Self {
        Self {
            config,
            crossing_count: 0,
            frame_index: 0,
            triggered: Vec::new(),
        }
    }

    pub fn update_config(&mut self, config: GateConfig) {
        self.config = config;
    }

    pub fn crossing_count(&self) -> u64 {
        self.crossing_count
    }

    /// The gate line's Y coordinate for a given ROI descriptor.
    pub fn gate_y(&self, roi_y0: u32, roi_height: u32) -> u32 {
        let ratio = self.config.gate_ratio.clamp(0.0, 1.0);
        roi_y0 + ((roi_height as f32) * ratio).floor() as u32
    }

    /// Advance frame_index, evict stale triggers, accept or dedupe each
    /// candidate crossing, return the newly accepted ones.
    pub fn on_frame(&mut self, detections: &[Detection], roi_y0: u32, roi_height: u32) -> Vec<Crossing> {
        self.frame_index += 1;
        let gate_y = self.gate_y(roi_y0, roi_height);

        let frame_index = self.frame_index;
        let history = self.config.gate_history_frames;
        self.triggered
            .retain(|record| record.frame_index_at_insert + history > frame_index);

        let radius_sq = self.config.gate_trigger_radius * self.config.gate_trigger_radius;
        let mut new_crossings = Vec::new();

        for detection in detections {
            if detection.centroid_y < gate_y {
                continue;
            }
            let cx = detection.centroid_x;
            let cy = detection.centroid_y;
            let is_duplicate = self.triggered.iter().any(|record| {
                let dx = record.cx as f32 - cx as f32;
                let dy = record.cy as f32 - cy as f32;
                dx * dx + dy * dy < radius_sq
            });
            if is_duplicate {
                continue;
            }
            self.triggered.push(TriggerRecord {
                cx,
                cy,
                frame_index_at_insert: frame_index,
            });
            self.crossing_count += 1;
            new_crossings.push(Crossing { cx, cy });
        }

        new_crossings
    }

    /// Reset to the initial state: zero count, clear triggers, zero frame index.
    pub fn reset(&mut self) {
        self.crossing_count = 0;
        self.frame_index = 0;
        self.triggered.clear();
    }

    pub fn snapshot(&self) -> GateSnapshot {
        GateSnapshot {
            crossing_count: self.crossing_count,
            frame_index: self.frame_index,
            triggered: self.triggered.clone(),
        }
    }

    pub fn restore(&mut self, snapshot: GateSnapshot) {
        self.crossing_count = snapshot.crossing_count;
        self.frame_index = snapshot.frame_index;
        self.triggered = snapshot.triggered;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn detection_at(cx: u32, cy: u32) -> Detection {
        Detection {
            bbox_x: cx.saturating_sub(5),
            bbox_y: cy.saturating_sub(5),
            bbox_w: 10,
            bbox_h: 10,
            centroid_x: cx,
            centroid_y: cy,
            area: 100,
        }
    }

    fn counter() -> GateCounter {
        GateCounter::new(GateConfig {
            gate_ratio: 0.5,
            gate_trigger_radius: 10.0,
            gate_history_frames: 5,
        })
    }

    #[test]
    fn p1_detection_below_gate_is_ignored() {
        let mut gate = counter();
        // roi_y0=0, roi_height=100 => gate_y=50; centroid above gate line.
        let crossings = gate.on_frame(&[detection_at(10, 20)], 0, 100);
        assert!(crossings.is_empty());
        assert_eq!(gate.crossing_count(), 0);
    }

    #[test]
    fn p2_detection_at_or_past_gate_is_counted() {
        let mut gate = counter();
        let crossings = gate.on_frame(&[detection_at(10, 60)], 0, 100);
        assert_eq!(crossings.len(), 1);
        assert_eq!(gate.crossing_count(), 1);
    }

    #[test]
    fn p3_same_object_across_consecutive_frames_counts_once() {
        let mut gate = counter();
        gate.on_frame(&[detection_at(10, 60)], 0, 100);
        let crossings = gate.on_frame(&[detection_at(11, 61)], 0, 100);
        assert!(crossings.is_empty());
        assert_eq!(gate.crossing_count(), 1);
    }

    #[test]
    fn p4_trigger_expires_after_history_window() {
        let mut gate = counter();
        gate.on_frame(&[detection_at(10, 60)], 0, 100);
        for _ in 0..5 {
            gate.on_frame(&[], 0, 100);
        }
        // History window has elapsed; the same position crosses again.
        let crossings = gate.on_frame(&[detection_at(10, 60)], 0, 100);
        assert_eq!(crossings.len(), 1);
        assert_eq!(gate.crossing_count(), 2);
    }

    #[test]
    fn l2_crossing_count_is_monotonically_non_decreasing() {
        let mut gate = counter();
        let mut prev = gate.crossing_count();
        for i in 0..50u32 {
            gate.on_frame(&[detection_at(10 + i * 20, 60)], 0, 100);
            assert!(gate.crossing_count() >= prev);
            prev = gate.crossing_count();
        }
    }

    #[test]
    fn reset_zeroes_all_state() {
        let mut gate = counter();
        gate.on_frame(&[detection_at(10, 60)], 0, 100);
        gate.reset();
        assert_eq!(gate.crossing_count(), 0);
        let crossings = gate.on_frame(&[detection_at(10, 60)], 0, 100);
        assert_eq!(crossings.len(), 1);
    }

    #[test]
    fn snapshot_and_restore_round_trip_state() {
        let mut gate = counter();
        gate.on_frame(&[detection_at(10, 60)], 0, 100);
        let snap = gate.snapshot();
        let mut other = counter();
        other.restore(snap);
        assert_eq!(other.crossing_count(), 1);
        // Same position is still deduped because the trigger carried over.
        let crossings = other.on_frame(&[detection_at(10, 60)], 0, 100);
        assert!(crossings.is_empty());
    }

    #[test]
    fn two_distinct_objects_beyond_radius_both_count() {
        let mut gate = counter();
        let crossings = gate.on_frame(&[detection_at(10, 60), detection_at(200, 60)], 0, 100);
        assert_eq!(crossings.len(), 2);
        assert_eq!(gate.crossing_count(), 2);
    }

    #[test]
    fn a_detection_exactly_at_the_trigger_radius_is_not_a_duplicate() {
        // radius = 10.0, so a detection exactly 10px away is the strict
        // boundary case: "lies within Euclidean distance" is < not <=.
        let mut gate = counter();
        gate.on_frame(&[detection_at(10, 60)], 0, 100);
        let crossings = gate.on_frame(&[detection_at(20, 60)], 0, 100);
        assert_eq!(crossings.len(), 1, "exactly-radius distance must count, not dedupe");
        assert_eq!(gate.crossing_count(), 2);
    }
}
