// SPDX-License-Identifier: GPL-3.0-only

//! Adaptive background subtraction (§4.C step 2), Zivkovic-style per-pixel
//! Gaussian model. Single component per pixel rather than a full mixture:
//! the conveyor background is static and front-lit, so one adaptive
//! Gaussian per pixel tracks it without the multi-modal machinery a
//! cluttered scene would need.

use crate::detect::morphology::Mask;

const INITIAL_VARIANCE: f32 = 400.0;
const MIN_VARIANCE: f32 = 4.0;

#[derive(Debug, Clone, Copy)]
struct PixelModel {
    mean: f32,
    variance: f32,
    frames_seen: u32,
}

impl Default for PixelModel {
    fn default() -> Self {
        Self {
            mean: 0.0,
            variance: INITIAL_VARIANCE,
            frames_seen: 0,
        }
    }
}

/// Parameters controlling the background model (§3 "Detection config (counting)").
#[derive(Debug, Clone, Copy)]
pub struct BackgroundConfig {
    pub history: u32,
    pub var_threshold: f32,
    pub learning_rate: f32,
}

/// Per-pixel adaptive Gaussian background/foreground classifier.
pub struct BackgroundSubtractor {
    width: u32,
    height: u32,
    config: BackgroundConfig,
    models: Vec<PixelModel>,
}

impl BackgroundSubtractor {
    pub fn new(width: u32, height: u32, config: BackgroundConfig) -> Self {
        Self {
            width,
            height,
            config,
            models: vec![PixelModel::default(); (width as usize) * (height as usize)],
        }
    }

    /// Re-initialise the model to a blank state (`reset()`, §4.C).
    pub fn reset(&mut self) {
        self.models.fill(PixelModel::default());
    }

    pub fn update_config(&mut self, config: BackgroundConfig) {
        self.config = config;
    }

    /// Classify each pixel of `gray` (row-major, one byte per pixel, same
    /// shape as the model) as foreground (255) or background (0), updating
    /// the model for pixels classified as background.
    pub fn apply(&mut self, gray: &[u8]) -> Mask {
        debug_assert_eq!(gray.len(), self.models.len());
        let mut mask = Mask::zeros(self.width, self.height);
        let history = self.config.history.max(1) as f32;

        for (i, &pixel) in gray.iter().enumerate() {
            let model = &mut self.models[i];
            if model.frames_seen == 0 {
                model.mean = pixel as f32;
                model.frames_seen = 1;
                // First observation of a pixel is always background.
                continue;
            }

            let diff = pixel as f32 - model.mean;
            let dist2 = diff * diff;
            let is_foreground = dist2 > self.config.var_threshold * model.variance;

            if is_foreground {
                mask.data[i] = 255;
            } else {
                let alpha = if (model.frames_seen as f32) < history {
                    1.0 / (model.frames_seen as f32 + 1.0)
                } else {
                    self.config.learning_rate
                };
                model.mean += alpha * diff;
                model.variance = (model.variance + alpha * (dist2 - model.variance)).max(MIN_VARIANCE);
            }
            model.frames_seen = model.frames_seen.saturating_add(1);
        }

        mask
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config() -> BackgroundConfig {
        BackgroundConfig {
            history: 20,
            var_threshold: 9.0,
            learning_rate: 0.05,
        }
    }

    #[test]
    fn static_scene_settles_to_no_foreground() {
        let mut sub = BackgroundSubtractor::new(4, 4, config());
        let frame = vec![100u8; 16];
        for _ in 0..30 {
            let mask = sub.apply(&frame);
            assert!(mask.data.iter().all(|&p| p == 0));
        }
    }

    #[test]
    fn a_bright_intrusion_is_flagged_foreground_after_warmup() {
        let mut sub = BackgroundSubtractor::new(4, 4, config());
        let background = vec![50u8; 16];
        for _ in 0..30 {
            sub.apply(&background);
        }
        let mut intrusion = background.clone();
        intrusion[5] = 250;
        let mask = sub.apply(&intrusion);
        assert_eq!(mask.data[5], 255);
        assert_eq!(mask.data[0], 0);
    }

    #[test]
    fn reset_clears_the_learned_model() {
        let mut sub = BackgroundSubtractor::new(2, 2, config());
        sub.apply(&[50, 50, 50, 50]);
        sub.apply(&[50, 50, 50, 50]);
        sub.reset();
        // First frame after reset always re-seeds as background, regardless of value.
        let mask = sub.apply(&[200, 200, 200, 200]);
        assert!(mask.data.iter().all(|&p| p == 0));
    }
}
