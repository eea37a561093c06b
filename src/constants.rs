// SPDX-License-Identifier: GPL-3.0-only

//! Crate-wide default values and small closed enums.
//!
//! Mirrors the teacher's `constants.rs`: closed enums with an `ALL` const
//! array for iteration, and doc-commented default values kept next to the
//! type they parametrize rather than scattered across call sites.

use serde::{Deserialize, Serialize};

/// Vibrator speed command, one of five discrete duty-cycle levels (§4.E).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum VibratorSpeed {
    Full,
    Medium,
    Slow,
    Creep,
    #[default]
    Stop,
}

impl VibratorSpeed {
    /// All variants, in descending order of intensity.
    pub const ALL: [VibratorSpeed; 5] = [
        VibratorSpeed::Full,
        VibratorSpeed::Medium,
        VibratorSpeed::Slow,
        VibratorSpeed::Creep,
        VibratorSpeed::Stop,
    ];

    /// Default mapping to a physical duty-cycle percentage (§6).
    pub fn duty_cycle_percent(&self) -> u8 {
        match self {
            VibratorSpeed::Full => 100,
            VibratorSpeed::Medium => 60,
            VibratorSpeed::Slow => 30,
            VibratorSpeed::Creep => 10,
            VibratorSpeed::Stop => 0,
        }
    }
}

/// Downscale factors the orchestrator may apply before ROI cropping (§4.F).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub enum DownscaleFactor {
    #[default]
    Full,
    ThreeQuarter,
    Half,
    ThreeTenths,
}

impl DownscaleFactor {
    pub const ALL: [DownscaleFactor; 4] = [
        DownscaleFactor::Full,
        DownscaleFactor::ThreeQuarter,
        DownscaleFactor::Half,
        DownscaleFactor::ThreeTenths,
    ];

    pub fn ratio(&self) -> f32 {
        match self {
            DownscaleFactor::Full => 1.0,
            DownscaleFactor::ThreeQuarter => 0.75,
            DownscaleFactor::Half => 0.5,
            DownscaleFactor::ThreeTenths => 0.3,
        }
    }
}

/// Which intent a detector serves (§3 "Part profile", GLOSSARY "Intent").
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectorIntent {
    Counting,
    Defect,
}

/// Detection method identifiers known to the built-in [`crate::registry::MethodRegistry`] (§4.G).
pub const METHOD_COUNTING_BACKGROUND_SUBTRACTION: &str = "counting.background_subtraction";
pub const METHOD_COUNTING_ULTRA_HIGH_SPEED: &str = "counting.ultra_high_speed";
pub const METHOD_DEFECT_EDGE_ANOMALY: &str = "defect.edge_anomaly";

/// Frame-source failure tolerance before the source degrades (§4.A).
pub const MAX_CONSECUTIVE_READ_ERRORS: u32 = 3;

/// Producer-thread driver read timeout, in milliseconds (§5).
pub const SOURCE_READ_TIMEOUT_MS: u64 = 100;

/// `stop()` join timeout for the frame-source producer thread, in milliseconds (§5).
pub const SOURCE_STOP_JOIN_TIMEOUT_MS: u64 = 2_000;

/// Nominal target camera geometry from the reference deployment (§1, §6).
pub const REFERENCE_FRAME_WIDTH: u32 = 640;
pub const REFERENCE_FRAME_HEIGHT: u32 = 480;
pub const REFERENCE_TARGET_FPS: f32 = 280.0;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vibrator_speed_duty_cycle_defaults() {
        assert_eq!(VibratorSpeed::Full.duty_cycle_percent(), 100);
        assert_eq!(VibratorSpeed::Medium.duty_cycle_percent(), 60);
        assert_eq!(VibratorSpeed::Slow.duty_cycle_percent(), 30);
        assert_eq!(VibratorSpeed::Creep.duty_cycle_percent(), 10);
        assert_eq!(VibratorSpeed::Stop.duty_cycle_percent(), 0);
    }

    #[test]
    fn duty_cycle_is_monotonically_descending_across_all() {
        let mut prev = 101u8;
        for speed in VibratorSpeed::ALL {
            let pct = speed.duty_cycle_percent();
            assert!(pct < prev, "duty cycle should strictly decrease across ALL");
            prev = pct;
        }
    }

    #[test]
    fn downscale_ratio_matches_configured_set() {
        let ratios: Vec<f32> = DownscaleFactor::ALL.iter().map(|d| d.ratio()).collect();
        assert_eq!(ratios, vec![1.0, 0.75, 0.5, 0.3]);
    }
}
