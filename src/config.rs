// SPDX-License-Identifier: GPL-3.0-only

//! Persisted configuration (§6). Plain `serde_json` load/save with an
//! atomic write, replacing the teacher's `cosmic_config`-derived
//! `CosmicConfigEntry` mechanism (libcosmic/GUI-only) with the
//! `dirs`-resolved JSON file convention the non-GUI pack examples use.

use crate::detect::counting::CountingConfig;
use crate::detect::defect::DefectConfig;
use crate::errors::{PipelineError, PipelineResult};
use crate::gate::GateConfig;
use crate::packaging::PackagingConfig;
use crate::registry::MethodRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, error};

/// Global defaults applied when a part's method entry doesn't override a field (§6 "detection" section).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionDefaults {
    pub counting: CountingConfig,
    pub defect: DefectConfig,
}

impl Default for DetectionDefaults {
    fn default() -> Self {
        Self {
            counting: CountingConfig::default(),
            defect: DefectConfig::default(),
        }
    }
}

/// Frame-rate/resource knobs (§4.F downscale, frame-skip).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub downscale: crate::constants::DownscaleFactor,
    pub frame_skip: u32,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self {
            downscale: crate::constants::DownscaleFactor::Full,
            frame_skip: 0,
        }
    }
}

/// One entry in a part profile's ordered method list (§3 "Part profile").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodEntryConfig {
    pub method_id: String,
    #[serde(default)]
    pub config: serde_json::Value,
}

/// A part profile: an ordered list of candidate detection methods plus the
/// one currently active (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartProfile {
    pub part_id: String,
    pub part_name: String,
    pub available_methods: Vec<MethodEntryConfig>,
    pub current_method_id: String,
}

/// The full persisted configuration record (§6): detection, gate,
/// performance, packaging, plus the part library.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub detection: DetectionDefaults,
    pub gate: GateConfig,
    pub performance: PerformanceConfig,
    pub packaging: PackagingConfig,
    pub parts: Vec<PartProfile>,
    /// `[AMBIENT]`: which part profile the operator last selected via the
    /// CLI surface (§6 "select part"). Falls back to the first part when unset.
    #[serde(default)]
    pub active_part_id: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            detection: DetectionDefaults::default(),
            gate: GateConfig::default(),
            performance: PerformanceConfig::default(),
            packaging: PackagingConfig::default(),
            parts: vec![PartProfile {
                part_id: "default".to_string(),
                part_name: "Default part".to_string(),
                available_methods: vec![MethodEntryConfig {
                    method_id: crate::constants::METHOD_COUNTING_BACKGROUND_SUBTRACTION.to_string(),
                    config: serde_json::Value::Null,
                }],
                current_method_id: crate::constants::METHOD_COUNTING_BACKGROUND_SUBTRACTION.to_string(),
            }],
            active_part_id: None,
        }
    }
}

impl Config {
    /// Resolve the effective config `Value` the Method Registry should build
    /// `method_id` from: the matching `detection` section (`counting` or
    /// `defect`) as the base, with `override_value`'s fields applied on top
    /// (§3 "Detection config" + §6 "detection" section global defaults).
    /// Unrecognised method-id prefixes fall back to the override alone.
    pub fn effective_method_config(&self, method_id: &str, override_value: &serde_json::Value) -> serde_json::Value {
        let base = if method_id.starts_with("counting.") {
            let defaults = serde_json::to_value(self.detection.counting).unwrap_or(serde_json::Value::Null);
            // The persisted top-level `gate` section (§6) is the
            // authoritative source for gate_ratio/gate_trigger_radius/
            // gate_history_frames; it's merged on top of the `detection`
            // section's own copies of those same three fields so editing
            // `gate` in the config file actually changes counting behavior.
            let gate = serde_json::to_value(self.gate).unwrap_or(serde_json::Value::Null);
            merge_json(defaults, &gate)
        } else if method_id.starts_with("defect.") {
            serde_json::to_value(self.detection.defect).unwrap_or(serde_json::Value::Null)
        } else {
            return override_value.clone();
        };
        merge_json(base, override_value)
    }

    /// Merge a JSON patch onto a part's persisted per-method config
    /// override (a shallow object merge; fields in `patch` replace the
    /// matching field in `base`). Exposed for the CLI's `update-config`
    /// command, which patches `MethodEntryConfig::config` directly rather
    /// than going through [`Config::effective_method_config`]'s detection-
    /// defaults merge.
    pub fn merge_config_override(base: &serde_json::Value, patch: &serde_json::Value) -> serde_json::Value {
        merge_json(base.clone(), patch)
    }

    /// Resolve the config file path: `dirs::config_dir()/gatevision/config.json`.
    pub fn default_path() -> PipelineResult<PathBuf> {
        let base = dirs::config_dir().ok_or_else(|| PipelineError::ConfigInvalid {
            field: "<path>".to_string(),
            reason: "no platform config directory available".to_string(),
        })?;
        Ok(base.join("gatevision").join("config.json"))
    }

    /// Load and validate the configuration at `path`. §6: invalid files are
    /// rejected with a precise error naming the first violated invariant.
    pub fn load(path: &Path) -> PipelineResult<Self> {
        let bytes = std::fs::read(path)?;
        let config: Config = serde_json::from_slice(&bytes)?;
        config.validate()?;
        debug!(path = %path.display(), "loaded configuration");
        Ok(config)
    }

    /// Load from the default path, falling back to built-in defaults if the
    /// file is absent (not present is not an error; a malformed file is).
    pub fn load_or_default() -> PipelineResult<Self> {
        let path = Self::default_path()?;
        if !path.exists() {
            return Ok(Config::default());
        }
        Self::load(&path)
    }

    /// Write atomically: serialize to a sibling temp file, then rename over
    /// the target so a crash mid-save cannot corrupt the live file.
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("json.tmp");
        let bytes = serde_json::to_vec_pretty(self)?;
        std::fs::write(&tmp_path, &bytes)?;
        std::fs::rename(&tmp_path, path)?;
        debug!(path = %path.display(), "saved configuration");
        Ok(())
    }

    /// I1-I3 plus "every part profile must have at least one method whose
    /// `method_id` is known to the Method Registry" (§6).
    pub fn validate(&self) -> PipelineResult<()> {
        validate_counting(&self.detection.counting)?;

        if !(0.0..=1.0).contains(&self.gate.gate_ratio) {
            return Err(invalid("gate.gate_ratio", "must be in [0, 1]"));
        }
        if self.gate.gate_trigger_radius <= 0.0 {
            return Err(invalid("gate.gate_trigger_radius", "must be > 0"));
        }

        for part in &self.parts {
            if part.available_methods.is_empty() {
                return Err(invalid("parts[].available_methods", "must contain at least one method"));
            }
            let known = part
                .available_methods
                .iter()
                .any(|m| MethodRegistry::is_known(&m.method_id));
            if !known {
                return Err(invalid(
                    "parts[].available_methods[].method_id",
                    "no method in this part profile is known to the registry",
                ));
            }
            if !part.available_methods.iter().any(|m| m.method_id == part.current_method_id) {
                return Err(invalid(
                    "parts[].current_method_id",
                    "must name one of this part's available methods",
                ));
            }
        }

        if let Some(active) = &self.active_part_id {
            if !self.parts.iter().any(|p| &p.part_id == active) {
                return Err(invalid("active_part_id", "must name one of `parts[].part_id`"));
            }
        }

        Ok(())
    }

    /// Resolve the part profile the CLI/orchestrator should run: the
    /// explicitly-selected `active_part_id`, or the first part if unset.
    pub fn active_part(&self) -> PipelineResult<&PartProfile> {
        let part_id = self.active_part_id.as_deref();
        match part_id {
            Some(id) => self.parts.iter().find(|p| p.part_id == id).ok_or_else(|| PipelineError::ConfigInvalid {
                field: "active_part_id".to_string(),
                reason: format!("no part profile named `{id}`"),
            }),
            None => self.parts.first().ok_or_else(|| PipelineError::ConfigInvalid {
                field: "parts".to_string(),
                reason: "configuration has no part profiles".to_string(),
            }),
        }
    }
}

/// Shallow object merge: fields present in `overrides` replace the matching
/// field in `base`; a non-object `overrides` (e.g. `Value::Null`, meaning
/// "no override") leaves `base` untouched.
fn merge_json(base: serde_json::Value, overrides: &serde_json::Value) -> serde_json::Value {
    match (base, overrides) {
        (serde_json::Value::Object(mut base_map), serde_json::Value::Object(override_map)) => {
            for (key, value) in override_map {
                base_map.insert(key.clone(), value.clone());
            }
            serde_json::Value::Object(base_map)
        }
        (base, _) => base,
    }
}

fn validate_counting(config: &CountingConfig) -> PipelineResult<()> {
    if config.min_area == 0 || config.max_area == 0 || config.min_area >= config.max_area {
        return Err(invalid("detection.counting.min_area/max_area", "require 0 < min_area < max_area"));
    }
    if !(0.0..=1.0).contains(&config.roi_position_ratio) {
        return Err(invalid("detection.counting.roi_position_ratio", "must be in [0, 1]"));
    }
    if !(0.0..=1.0).contains(&config.gate_ratio) {
        return Err(invalid("detection.counting.gate_ratio", "must be in [0, 1]"));
    }
    if config.gate_trigger_radius <= 0.0 {
        return Err(invalid("detection.counting.gate_trigger_radius", "must be > 0"));
    }
    Ok(())
}

fn invalid(field: &str, reason: &str) -> PipelineError {
    error!(field, reason, "configuration invariant violated");
    PipelineError::ConfigInvalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_method_config_merges_part_override_onto_detection_defaults() {
        let mut config = Config::default();
        config.detection.counting.min_area = 50;
        config.detection.counting.max_area = 9000;
        let override_value = serde_json::json!({"max_area": 1234});
        let effective = config.effective_method_config(
            crate::constants::METHOD_COUNTING_BACKGROUND_SUBTRACTION,
            &override_value,
        );
        assert_eq!(effective["min_area"], 50);
        assert_eq!(effective["max_area"], 1234);
    }

    #[test]
    fn effective_method_config_with_null_override_is_the_plain_defaults() {
        let config = Config::default();
        let effective = config.effective_method_config(
            crate::constants::METHOD_DEFECT_EDGE_ANOMALY,
            &serde_json::Value::Null,
        );
        assert_eq!(effective["canny_low"], config.detection.defect.canny_low as f64);
    }

    #[test]
    fn effective_method_config_consults_the_top_level_gate_section() {
        let mut config = Config::default();
        config.gate.gate_trigger_radius = 99.0;
        config.gate.gate_history_frames = 42;
        let effective = config.effective_method_config(
            crate::constants::METHOD_COUNTING_BACKGROUND_SUBTRACTION,
            &serde_json::Value::Null,
        );
        assert_eq!(effective["gate_trigger_radius"], 99.0);
        assert_eq!(effective["gate_history_frames"], 42);
    }

    #[test]
    fn l1_save_then_load_round_trips_field_for_field() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        let original = Config::default();
        original.save(&path).unwrap();
        let loaded = Config::load(&path).unwrap();
        assert_eq!(loaded.gate, original.gate);
        assert_eq!(loaded.performance, original.performance);
        assert_eq!(loaded.packaging, original.packaging);
        assert_eq!(loaded.parts.len(), original.parts.len());
    }

    #[test]
    fn default_config_passes_validation() {
        assert!(Config::default().validate().is_ok());
    }

    #[test]
    fn invalid_min_area_is_rejected_naming_the_field() {
        let mut config = Config::default();
        config.detection.counting.min_area = 500;
        config.detection.counting.max_area = 100;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("min_area"));
    }

    #[test]
    fn part_with_unknown_method_id_is_rejected() {
        let mut config = Config::default();
        config.parts[0].available_methods = vec![MethodEntryConfig {
            method_id: "not.a.real.method".to_string(),
            config: serde_json::Value::Null,
        }];
        config.parts[0].current_method_id = "not.a.real.method".to_string();
        let err = config.validate().unwrap_err();
        assert!(matches!(err, PipelineError::ConfigInvalid { .. }));
    }

    #[test]
    fn malformed_json_file_is_rejected_at_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, b"{ not valid json").unwrap();
        assert!(Config::load(&path).is_err());
    }
}
