// SPDX-License-Identifier: GPL-3.0-only

//! Detection: background subtraction, morphology, connected components,
//! and the two pluggable detector intents (§4.C, §4.C').

pub mod annotate;
pub mod background;
pub mod components;
pub mod counting;
pub mod defect;
pub mod edges;
pub mod morphology;

use crate::errors::{PipelineError, PipelineResult};
use crate::frame::Frame;
use serde::{Deserialize, Serialize};

/// Merge a partial JSON config patch onto a detector's current typed
/// config and re-parse it: the shared implementation behind every
/// concrete `Detector::update_config` (§4.C public contract). Fields
/// absent from `partial` keep their current value; a non-object `partial`
/// leaves `current` untouched.
pub(crate) fn apply_partial_config<T>(current: &T, partial: &serde_json::Value) -> PipelineResult<T>
where
    T: Serialize + for<'de> Deserialize<'de>,
{
    let mut merged = serde_json::to_value(current).map_err(|err| PipelineError::ConfigInvalid {
        field: "detector_config".to_string(),
        reason: err.to_string(),
    })?;
    if let (serde_json::Value::Object(base), serde_json::Value::Object(patch)) = (&mut merged, partial) {
        for (key, value) in patch {
            base.insert(key.clone(), value.clone());
        }
    }
    serde_json::from_value(merged).map_err(|err| PipelineError::ConfigInvalid {
        field: "detector_config".to_string(),
        reason: err.to_string(),
    })
}

/// A single detected region, always expressed in full-frame coordinates (§3).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Detection {
    pub bbox_x: u32,
    pub bbox_y: u32,
    pub bbox_w: u32,
    pub bbox_h: u32,
    pub centroid_x: u32,
    pub centroid_y: u32,
    pub area: u32,
}

impl Detection {
    /// I6: the centroid lies inside the bbox inflated by 1 px.
    pub fn centroid_within_inflated_bbox(&self) -> bool {
        let x0 = self.bbox_x.saturating_sub(1);
        let y0 = self.bbox_y.saturating_sub(1);
        let x1 = self.bbox_x + self.bbox_w + 1;
        let y1 = self.bbox_y + self.bbox_h + 1;
        self.centroid_x >= x0 && self.centroid_x <= x1 && self.centroid_y >= y0 && self.centroid_y <= y1
    }
}

/// Which intent a detector serves; drives gate/packaging state reset on switch (§4.F).
pub use crate::constants::DetectorIntent;

/// Outcome of processing one frame through a Counting detector (§4.C).
#[derive(Debug, Clone)]
pub struct CountingOutcome {
    pub annotated_frame: Option<Vec<u8>>,
    pub count: u64,
    pub crossing_count: u64,
    pub objects: Vec<Detection>,
    pub new_crossings: usize,
}

/// Accumulated totals and per-frame outcome of a Defect detector (§4.C').
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectOutcome {
    pub defects: Vec<DefectRegion>,
    pub is_defective: bool,
    pub defect_types: Vec<DefectKind>,
    pub pass_rate: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DefectKind {
    Scratch,
    Dent,
    Discoloration,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefectRegion {
    pub bbox_x: u32,
    pub bbox_y: u32,
    pub bbox_w: u32,
    pub bbox_h: u32,
    pub area: u32,
    pub kind: DefectKind,
}

/// Common lifecycle every detector implements (§4.C).
pub trait Detector: Send {
    fn enable(&mut self);
    fn disable(&mut self);
    fn reset(&mut self);
    /// Apply a partial JSON config patch to the live detector, without
    /// destroying and reconstructing it the way a method switch does
    /// (§4.C public contract: `update_config(partial_config) -> Result`).
    fn update_config(&mut self, partial: &serde_json::Value) -> PipelineResult<()>;
    fn intent(&self) -> DetectorIntent;
    /// Process one already-cropped-and-downscaled frame. Returns an
    /// intent-specific outcome encoded in `DetectorResult`.
    fn process_frame(&mut self, frame: &Frame) -> PipelineResult<DetectorResult>;

    /// Gate Counter state, carried across a method switch within the same
    /// intent (§3, §4.F). `None` for detectors that don't own gate state.
    fn gate_snapshot(&self) -> Option<crate::gate::GateSnapshot> {
        None
    }

    /// Restore gate state captured by [`Detector::gate_snapshot`] on a
    /// freshly constructed detector of the same intent.
    fn restore_gate(&mut self, _snapshot: crate::gate::GateSnapshot) {}
}

/// A `Detector`'s output, tagged by intent so the orchestrator can route it
/// to the Gate Counter / Packaging Controller or to defect accounting
/// without downcasting.
#[derive(Debug, Clone)]
pub enum DetectorResult {
    Counting(CountingOutcome),
    Defect(DefectOutcome),
}
