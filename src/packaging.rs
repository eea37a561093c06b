// SPDX-License-Identifier: GPL-3.0-only

//! Packaging Controller: maps count progress to a pair of vibrator
//! speed commands through a small closed state machine. Speed enum mirrors
//! the teacher's `constants::BitratePreset` table-lookup pattern.

use crate::constants::VibratorSpeed;
use serde::{Deserialize, Serialize};

/// Progress thresholds gating each speed tier.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackagingConfig {
    pub target: u32,
    pub t_medium: f32,
    pub t_slow: f32,
    pub t_creep: f32,
}

impl Default for PackagingConfig {
    fn default() -> Self {
        Self {
            target: 100,
            t_medium: 0.5,
            t_slow: 0.75,
            t_creep: 0.9,
        }
    }
}

/// The controller's mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum PackagingMode {
    #[default]
    Idle,
    Running,
    Paused,
    Complete,
}

/// Current packaging state, published to observers as `packaging_state_changed`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PackagingState {
    pub mode: PackagingMode,
    pub current: u32,
    pub target: u32,
    pub vibrator_a_speed: VibratorSpeed,
    pub vibrator_b_speed: VibratorSpeed,
}

/// The packaging/dosing state machine.
pub struct PackagingController {
    config: PackagingConfig,
    mode: PackagingMode,
    current: u32,
    complete_fired: bool,
}

impl PackagingController {
    pub fn new(config: PackagingConfig) -> Self {
        Self {
            config,
            mode: PackagingMode::Idle,
            current: 0,
            complete_fired: false,
        }
    }

    pub fn update_config(&mut self, config: PackagingConfig) {
        self.config = config;
    }

    pub fn state(&self) -> PackagingState {
        let (vibrator_a_speed, vibrator_b_speed) = self.speeds();
        PackagingState {
            mode: self.mode,
            current: self.current,
            target: self.config.target,
            vibrator_a_speed,
            vibrator_b_speed,
        }
    }

    pub fn start(&mut self) {
        if self.mode == PackagingMode::Idle || self.mode == PackagingMode::Paused {
            self.mode = PackagingMode::Running;
        }
    }

    pub fn pause(&mut self) {
        if self.mode == PackagingMode::Running {
            self.mode = PackagingMode::Paused;
        }
    }

    pub fn reset(&mut self) {
        self.mode = PackagingMode::Idle;
        self.current = 0;
        self.complete_fired = false;
    }

    /// Update the running count and advance the state machine.
    /// Returns `true` exactly once, the tick `packaging_complete` first fires.
    pub fn on_count_changed(&mut self, current: u32) -> bool {
        self.current = current;
        let mut just_completed = false;
        if self.mode == PackagingMode::Running && current >= self.config.target && !self.complete_fired {
            self.mode = PackagingMode::Complete;
            self.complete_fired = true;
            just_completed = true;
        }
        just_completed
    }

    fn progress(&self) -> f32 {
        if self.config.target == 0 {
            1.0
        } else {
            self.current as f32 / self.config.target as f32
        }
    }

    fn speeds(&self) -> (VibratorSpeed, VibratorSpeed) {
        if self.mode == PackagingMode::Complete {
            return (VibratorSpeed::Stop, VibratorSpeed::Stop);
        }
        if self.mode != PackagingMode::Running {
            return (VibratorSpeed::Stop, VibratorSpeed::Stop);
        }
        let progress = self.progress();
        if progress >= 1.0 {
            (VibratorSpeed::Stop, VibratorSpeed::Stop)
        } else if progress >= self.config.t_creep {
            (VibratorSpeed::Creep, VibratorSpeed::Slow)
        } else if progress >= self.config.t_slow {
            (VibratorSpeed::Slow, VibratorSpeed::Medium)
        } else if progress >= self.config.t_medium {
            (VibratorSpeed::Medium, VibratorSpeed::Full)
        } else {
            (VibratorSpeed::Full, VibratorSpeed::Full)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> PackagingConfig {
        PackagingConfig {
            target: 100,
            t_medium: 0.5,
            t_slow: 0.75,
            t_creep: 0.9,
        }
    }

    #[test]
    fn idle_controller_keeps_vibrators_stopped() {
        let controller = PackagingController::new(config());
        let state = controller.state();
        assert_eq!(state.mode, PackagingMode::Idle);
        assert_eq!(state.vibrator_a_speed, VibratorSpeed::Stop);
    }

    #[test]
    fn p7_speed_tiers_follow_the_policy_table() {
        let mut controller = PackagingController::new(config());
        controller.start();

        controller.on_count_changed(10);
        assert_eq!(controller.state().vibrator_a_speed, VibratorSpeed::Full);

        controller.on_count_changed(60);
        assert_eq!(controller.state().vibrator_a_speed, VibratorSpeed::Medium);
        assert_eq!(controller.state().vibrator_b_speed, VibratorSpeed::Full);

        controller.on_count_changed(80);
        assert_eq!(controller.state().vibrator_a_speed, VibratorSpeed::Slow);
        assert_eq!(controller.state().vibrator_b_speed, VibratorSpeed::Medium);

        controller.on_count_changed(95);
        assert_eq!(controller.state().vibrator_a_speed, VibratorSpeed::Creep);
        assert_eq!(controller.state().vibrator_b_speed, VibratorSpeed::Slow);
    }

    #[test]
    fn s5_reaching_target_fires_complete_once_and_stops_both_vibrators() {
        let mut controller = PackagingController::new(config());
        controller.start();
        assert!(!controller.on_count_changed(99));
        assert!(controller.on_count_changed(100));
        assert_eq!(controller.state().mode, PackagingMode::Complete);
        assert_eq!(controller.state().vibrator_a_speed, VibratorSpeed::Stop);
        assert_eq!(controller.state().vibrator_b_speed, VibratorSpeed::Stop);
        // Further count changes never refire completion.
        assert!(!controller.on_count_changed(101));
    }

    #[test]
    fn pause_then_resume_preserves_current_count() {
        let mut controller = PackagingController::new(config());
        controller.start();
        controller.on_count_changed(40);
        controller.pause();
        assert_eq!(controller.state().mode, PackagingMode::Paused);
        assert_eq!(controller.state().current, 40);
        controller.start();
        assert_eq!(controller.state().mode, PackagingMode::Running);
    }

    #[test]
    fn reset_returns_to_idle_with_zeroed_count() {
        let mut controller = PackagingController::new(config());
        controller.start();
        controller.on_count_changed(100);
        controller.reset();
        let state = controller.state();
        assert_eq!(state.mode, PackagingMode::Idle);
        assert_eq!(state.current, 0);
    }
}
