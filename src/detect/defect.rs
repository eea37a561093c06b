// SPDX-License-Identifier: GPL-3.0-only

//! Defect Detector: gray → blur → Canny → anomaly mask → contour
//! classification. Classification table and the edge-density measure
//! follow `original_source/models/detection_methods/traditional/`,
//! adapted to this crate's exact class boundaries.

use crate::detect::components::{label_components, ComponentStats};
use crate::detect::edges::{canny, gaussian_blur_5x5, mean_stddev};
use crate::detect::morphology::{closing, opening, or_combine, Mask};
use crate::detect::{apply_partial_config, DefectKind, DefectOutcome, DefectRegion, Detector, DetectorIntent, DetectorResult};
use crate::errors::PipelineResult;
use crate::frame::Frame;
use serde::{Deserialize, Serialize};

/// Fraction of a contour's bbox perimeter pixels that coincide
/// with a Canny edge, thresholded here, defining "high edge density".
const HIGH_EDGE_DENSITY_THRESHOLD: f32 = 0.35;

/// Configuration for the Defect Detector.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct DefectConfig {
    pub canny_low: f32,
    pub canny_high: f32,
    pub gray_anomaly_stddev_multiplier: f32,
    pub min_defect_area: u32,
    pub max_defect_area: u32,
}

impl Default for DefectConfig {
    fn default() -> Self {
        Self {
            canny_low: 50.0,
            canny_high: 120.0,
            gray_anomaly_stddev_multiplier: 2.5,
            min_defect_area: 30,
            max_defect_area: 15_000,
        }
    }
}

/// Running totals accumulated across every inspected frame.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct DefectTotals {
    pub inspected: u64,
    pub defective: u64,
    pub scratch_count: u64,
    pub dent_count: u64,
    pub discoloration_count: u64,
}

fn anomaly_mask(gray: &[u8], width: u32, height: u32, k: f32) -> Mask {
    let (mean, stddev) = mean_stddev(gray);
    let lower = mean - k * stddev;
    let upper = mean + k * stddev;
    let mut mask = Mask::zeros(width, height);
    for (i, &pixel) in gray.iter().enumerate() {
        let v = pixel as f32;
        if v < lower || v > upper {
            mask.data[i] = 255;
        }
    }
    mask
}

/// Fraction of a bbox's perimeter pixels that are set in `edges` (the
/// edge-density measure used by `classify`).
fn edge_density(edges: &Mask, stats: &ComponentStats) -> f32 {
    let x0 = stats.bbox_x;
    let y0 = stats.bbox_y;
    let x1 = stats.bbox_x + stats.bbox_w - 1;
    let y1 = stats.bbox_y + stats.bbox_h - 1;
    let mut perimeter = 0u32;
    let mut on_edge = 0u32;
    for x in x0..=x1 {
        for &y in &[y0, y1] {
            perimeter += 1;
            if edges.get(x, y) == 255 {
                on_edge += 1;
            }
        }
    }
    for y in y0..=y1 {
        for &x in &[x0, x1] {
            perimeter += 1;
            if edges.get(x, y) == 255 {
                on_edge += 1;
            }
        }
    }
    if perimeter == 0 {
        0.0
    } else {
        on_edge as f32 / perimeter as f32
    }
}

fn classify(stats: &ComponentStats, edges: &Mask) -> DefectKind {
    let aspect_ratio = stats.bbox_w as f32 / stats.bbox_h.max(1) as f32;
    let density = edge_density(edges, stats);
    if (aspect_ratio > 3.0 || aspect_ratio < 1.0 / 3.0) && density >= HIGH_EDGE_DENSITY_THRESHOLD {
        DefectKind::Scratch
    } else if (0.7..=1.3).contains(&aspect_ratio) {
        DefectKind::Dent
    } else {
        DefectKind::Discoloration
    }
}

/// Surface-defect classifier: edge + statistical anomaly detection with
/// running pass/fail totals.
pub struct DefectDetector {
    config: DefectConfig,
    totals: DefectTotals,
    enabled: bool,
}

impl DefectDetector {
    pub fn new(config: DefectConfig) -> Self {
        Self {
            config,
            totals: DefectTotals::default(),
            enabled: true,
        }
    }

    pub fn totals(&self) -> DefectTotals {
        self.totals
    }
}

impl Detector for DefectDetector {
    fn enable(&mut self) {
        self.enabled = true;
    }

    fn disable(&mut self) {
        self.enabled = false;
    }

    fn reset(&mut self) {
        self.totals = DefectTotals::default();
    }

    fn update_config(&mut self, partial: &serde_json::Value) -> PipelineResult<()> {
        self.config = apply_partial_config(&self.config, partial)?;
        Ok(())
    }

    fn intent(&self) -> DetectorIntent {
        DetectorIntent::Defect
    }

    fn process_frame(&mut self, frame: &Frame) -> PipelineResult<DetectorResult> {
        if !self.enabled {
            let totals = self.totals;
            let pass_rate = if totals.inspected == 0 {
                1.0
            } else {
                1.0 - (totals.defective as f32 / totals.inspected as f32)
            };
            return Ok(DetectorResult::Defect(DefectOutcome {
                defects: Vec::new(),
                is_defective: false,
                defect_types: Vec::new(),
                pass_rate,
            }));
        }
        let width = frame.width;
        let height = frame.height;
        let gray = frame.data();

        let blurred = gaussian_blur_5x5(gray, width, height);
        let edges = canny(&blurred, width, height, self.config.canny_low, self.config.canny_high);
        let edges_closed = closing(&edges, 3);
        let anomalies = anomaly_mask(&blurred, width, height, self.config.gray_anomaly_stddev_multiplier);
        let combined = or_combine(&edges_closed, &anomalies);
        let denoised = opening(&combined, 3);

        let stats = label_components(&denoised);
        let mut defects = Vec::new();
        for s in &stats {
            if s.area < self.config.min_defect_area || s.area > self.config.max_defect_area {
                continue;
            }
            let kind = classify(s, &edges_closed);
            defects.push(DefectRegion {
                bbox_x: s.bbox_x,
                bbox_y: s.bbox_y,
                bbox_w: s.bbox_w,
                bbox_h: s.bbox_h,
                area: s.area,
                kind,
            });
        }

        self.totals.inspected += 1;
        let is_defective = !defects.is_empty();
        if is_defective {
            self.totals.defective += 1;
            for d in &defects {
                match d.kind {
                    DefectKind::Scratch => self.totals.scratch_count += 1,
                    DefectKind::Dent => self.totals.dent_count += 1,
                    DefectKind::Discoloration => self.totals.discoloration_count += 1,
                }
            }
        }

        let pass_rate = if self.totals.inspected == 0 {
            1.0
        } else {
            1.0 - (self.totals.defective as f32 / self.totals.inspected as f32)
        };
        let defect_types = defects.iter().map(|d| d.kind).collect();

        Ok(DetectorResult::Defect(DefectOutcome {
            defects,
            is_defective,
            defect_types,
            pass_rate,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PipelineError;

    fn uniform_frame(width: u32, height: u32, value: u8) -> Frame {
        Frame::new(width, height, 0, vec![value; (width * height) as usize])
    }

    #[test]
    fn uniform_surface_has_no_defects() {
        let mut detector = DefectDetector::new(DefectConfig::default());
        let result = detector.process_frame(&uniform_frame(64, 64, 128)).unwrap();
        if let DetectorResult::Defect(outcome) = result {
            assert!(!outcome.is_defective);
            assert!(outcome.defects.is_empty());
        } else {
            panic!("expected defect outcome");
        }
        assert_eq!(detector.totals().inspected, 1);
        assert_eq!(detector.totals().defective, 0);
    }

    #[test]
    fn reset_clears_running_totals() {
        let mut detector = DefectDetector::new(DefectConfig::default());
        detector.process_frame(&uniform_frame(32, 32, 100)).unwrap();
        detector.process_frame(&uniform_frame(32, 32, 100)).unwrap();
        detector.reset();
        assert_eq!(detector.totals().inspected, 0);
    }

    #[test]
    fn a_dark_blotch_on_bright_surface_is_flagged_defective() {
        let mut data = vec![220u8; 64 * 64];
        for y in 20..40u32 {
            for x in 20..40u32 {
                data[(y * 64 + x) as usize] = 30;
            }
        }
        let frame = Frame::new(64, 64, 0, data);
        let mut detector = DefectDetector::new(DefectConfig {
            min_defect_area: 10,
            ..DefectConfig::default()
        });
        let result = detector.process_frame(&frame).unwrap();
        if let DetectorResult::Defect(outcome) = result {
            assert!(outcome.is_defective);
            assert!(!outcome.defects.is_empty());
        } else {
            panic!("expected defect outcome");
        }
    }

    #[test]
    fn l2_disabling_then_enabling_leaves_totals_unchanged() {
        let mut detector = DefectDetector::new(DefectConfig::default());
        detector.process_frame(&uniform_frame(32, 32, 100)).unwrap();
        let before = detector.totals();
        detector.disable();
        detector.process_frame(&uniform_frame(32, 32, 100)).unwrap();
        detector.process_frame(&uniform_frame(32, 32, 100)).unwrap();
        assert_eq!(detector.totals().inspected, before.inspected);
        detector.enable();
        assert_eq!(detector.totals().inspected, before.inspected);
    }

    #[test]
    fn update_config_patches_only_the_named_field() {
        let mut detector = DefectDetector::new(DefectConfig::default());
        detector.update_config(&serde_json::json!({"min_defect_area": 5})).unwrap();
        assert_eq!(detector.config.min_defect_area, 5);
        assert_eq!(detector.config.canny_low, DefectConfig::default().canny_low);
    }

    #[test]
    fn update_config_rejects_a_patch_with_the_wrong_field_type() {
        let mut detector = DefectDetector::new(DefectConfig::default());
        let result = detector.update_config(&serde_json::json!({"min_defect_area": "not-a-number"}));
        assert!(matches!(result, Err(PipelineError::ConfigInvalid { .. })));
    }
}
