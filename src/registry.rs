// SPDX-License-Identifier: GPL-3.0-only

//! Method Registry: a static `method_id -> constructor` map.
//! Grounded on the teacher's `backends::camera::get_backend_for_type`
//! factory function, generalized from a fixed match over 2-3 backend
//! kinds to an open map so new detector methods register without the
//! orchestrator knowing their concrete type.

use crate::constants::{
    METHOD_COUNTING_BACKGROUND_SUBTRACTION, METHOD_COUNTING_ULTRA_HIGH_SPEED, METHOD_DEFECT_EDGE_ANOMALY,
};
use crate::detect::counting::{CountingConfig, CountingDetector};
use crate::detect::defect::{DefectConfig, DefectDetector};
use crate::detect::Detector;
use crate::errors::{PipelineError, PipelineResult};
use serde_json::Value;
use tracing::warn;

/// A method descriptor: its identifier and the constructor the Orchestrator
/// invokes on a method switch.
pub struct MethodEntry {
    pub method_id: &'static str,
    build: fn(width: u32, height: u32, config: &Value) -> PipelineResult<Box<dyn Detector>>,
}

fn build_background_subtraction(width: u32, height: u32, config: &Value) -> PipelineResult<Box<dyn Detector>> {
    let parsed = parse_or_default::<CountingConfig>(config, METHOD_COUNTING_BACKGROUND_SUBTRACTION);
    Ok(Box::new(CountingDetector::new(width, height, parsed)))
}

fn build_ultra_high_speed(width: u32, height: u32, config: &Value) -> PipelineResult<Box<dyn Detector>> {
    let mut parsed = parse_or_default::<CountingConfig>(config, METHOD_COUNTING_ULTRA_HIGH_SPEED);
    parsed.ultra_high_speed_enabled = true;
    Ok(Box::new(CountingDetector::new(width, height, parsed)))
}

fn build_defect_edge_anomaly(_width: u32, _height: u32, config: &Value) -> PipelineResult<Box<dyn Detector>> {
    let parsed = parse_or_default::<DefectConfig>(config, METHOD_DEFECT_EDGE_ANOMALY);
    Ok(Box::new(DefectDetector::new(parsed)))
}

/// Deserialize `config` into `T`, falling back to `T::default()` with a
/// warning when fields are missing or unrecognised: config fields not
/// recognised by the target method are ignored with a warning.
fn parse_or_default<T: Default + serde::de::DeserializeOwned>(config: &Value, method_id: &str) -> T {
    if config.is_null() {
        return T::default();
    }
    match serde_json::from_value(config.clone()) {
        Ok(parsed) => parsed,
        Err(err) => {
            warn!(method_id, error = %err, "falling back to default method configuration");
            T::default()
        }
    }
}

const ENTRIES: [MethodEntry; 3] = [
    MethodEntry {
        method_id: METHOD_COUNTING_BACKGROUND_SUBTRACTION,
        build: build_background_subtraction,
    },
    MethodEntry {
        method_id: METHOD_COUNTING_ULTRA_HIGH_SPEED,
        build: build_ultra_high_speed,
    },
    MethodEntry {
        method_id: METHOD_DEFECT_EDGE_ANOMALY,
        build: build_defect_edge_anomaly,
    },
];

/// Holds the built-in `method_id -> constructor` map.
pub struct MethodRegistry;

impl MethodRegistry {
    /// Instantiate the detector named by `method_id`. Unknown ids are a hard error.
    pub fn create(method_id: &str, width: u32, height: u32, config: &Value) -> PipelineResult<Box<dyn Detector>> {
        let entry = ENTRIES
            .iter()
            .find(|e| e.method_id == method_id)
            .ok_or_else(|| PipelineError::MethodUnknown(method_id.to_string()))?;
        (entry.build)(width, height, config)
    }

    /// List every known method id.
    pub fn list() -> Vec<&'static str> {
        ENTRIES.iter().map(|e| e.method_id).collect()
    }

    pub fn is_known(method_id: &str) -> bool {
        ENTRIES.iter().any(|e| e.method_id == method_id)
    }
}
