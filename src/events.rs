// SPDX-License-Identifier: GPL-3.0-only

//! Observer event payloads. Plain serde data types, matching the
//! teacher's `CameraFrame`/`DeviceInfo` plain-data style; `Serialize` is
//! added since these cross the CLI/monitor boundary as data.

use crate::constants::VibratorSpeed;
use crate::detect::{DetectorIntent, DetectorResult};
use crate::packaging::PackagingMode;
use serde::{Deserialize, Serialize};

/// Published once per orchestrator tick, as `frame_processed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FrameProcessedEvent {
    pub sequence: u64,
    pub fps: f32,
    pub detector_intent: DetectorIntent,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub annotated_frame: Option<Vec<u8>>,
    pub detector_results: DetectorResultSummary,
}

/// A serializable summary of a [`DetectorResult`] (the full `DetectorResult`
/// carries an optional PNG buffer inline on the counting variant, so this
/// mirrors its shape for the event payload rather than re-deriving serde on
/// the processing-path type).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "intent")]
pub enum DetectorResultSummary {
    Counting {
        count: u64,
        crossing_count: u64,
        object_count: usize,
        new_crossings: usize,
    },
    Defect {
        is_defective: bool,
        defect_count: usize,
        pass_rate: f32,
    },
}

impl From<&DetectorResult> for DetectorResultSummary {
    fn from(result: &DetectorResult) -> Self {
        match result {
            DetectorResult::Counting(outcome) => DetectorResultSummary::Counting {
                count: outcome.count,
                crossing_count: outcome.crossing_count,
                object_count: outcome.objects.len(),
                new_crossings: outcome.new_crossings,
            },
            DetectorResult::Defect(outcome) => DetectorResultSummary::Defect {
                is_defective: outcome.is_defective,
                defect_count: outcome.defects.len(),
                pass_rate: outcome.pass_rate,
            },
        }
    }
}

/// Published whenever the Gate Counter accepts one or more crossings on a
/// frame, as `gate_crossing`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct GateCrossingEvent {
    pub sequence: u64,
    pub count_after: u64,
    pub crossings_in_frame: usize,
}

/// Published whenever the Packaging Controller's state changes, as `packaging_state_changed`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PackagingStateChangedEvent {
    pub mode: PackagingMode,
    pub current: u32,
    pub target: u32,
    pub speed_a: VibratorSpeed,
    pub speed_b: VibratorSpeed,
}

/// Published exactly once, the tick the Packaging Controller reaches its target, as `packaging_complete`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PackagingCompleteEvent {
    pub target: u32,
    pub final_count: u32,
}

/// Published exactly once per method switch, as `method_changed`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodChangedEvent {
    pub part_id: String,
    pub method_id: String,
    pub intent: DetectorIntent,
}

/// The full set of events an observer may receive in one orchestrator tick.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum PipelineEvent {
    FrameProcessed(FrameProcessedEvent),
    GateCrossing(GateCrossingEvent),
    PackagingStateChanged(PackagingStateChangedEvent),
    PackagingComplete(PackagingCompleteEvent),
    MethodChanged(MethodChangedEvent),
}

/// A pull-model passive listener invoked synchronously in orchestrator
/// order. An observer that errors is logged and unregistered.
pub trait Observer: Send {
    fn on_event(&mut self, event: &PipelineEvent) -> Result<(), String>;
}
