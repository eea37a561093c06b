// SPDX-License-Identifier: GPL-3.0-only

//! ROI Cropper: a pure function of frame shape and config.

use super::frame::Frame;
use serde::{Deserialize, Serialize};

/// Configuration driving the region of interest.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RoiConfig {
    pub enabled: bool,
    pub height: u32,
    pub position_ratio: f32,
}

impl Default for RoiConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            height: 200,
            position_ratio: 0.4,
        }
    }
}

/// The resolved, per-frame ROI descriptor. Invariant: `0 <= y0 < y0 +
/// height <= frame height`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RoiDescriptor {
    pub y0: u32,
    pub height: u32,
}

/// A zero-copy view over the rows of a frame that fall inside the ROI.
pub struct RoiView<'a> {
    pub descriptor: RoiDescriptor,
    pub width: u32,
    data: &'a [u8],
}

impl<'a> RoiView<'a> {
    pub fn row(&self, y: u32) -> &[u8] {
        let start = (y as usize) * (self.width as usize);
        &self.data[start..start + self.width as usize]
    }

    pub fn pixel(&self, x: u32, y: u32) -> u8 {
        self.data[(y as usize) * (self.width as usize) + (x as usize)]
    }

    pub fn height(&self) -> u32 {
        self.descriptor.height
    }

    /// The full ROI pixel buffer, row-major, contiguous.
    pub fn data(&self) -> &[u8] {
        self.data
    }
}

/// Resolve the ROI descriptor for a frame of the given height:
/// `y0 = floor(H * position_ratio)`, `height = min(configured,
/// H - y0)`; when disabled the ROI spans the full frame.
pub fn resolve(frame_height: u32, config: &RoiConfig) -> RoiDescriptor {
    if !config.enabled {
        return RoiDescriptor {
            y0: 0,
            height: frame_height,
        };
    }
    let ratio = config.position_ratio.clamp(0.0, 1.0);
    let y0 = ((frame_height as f32) * ratio).floor() as u32;
    let y0 = y0.min(frame_height.saturating_sub(1));
    let height = config.height.min(frame_height - y0).max(1);
    RoiDescriptor { y0, height }
}

/// Crop `frame` to its resolved ROI, returning the view plus the vertical
/// offset (`y0`) needed to translate detector output back to full-frame
/// coordinates. Allocates nothing beyond the view; never mutates
/// `frame`.
pub fn crop<'a>(frame: &'a Frame, config: &RoiConfig) -> (RoiView<'a>, u32) {
    let descriptor = resolve(frame.height, config);
    let width = frame.width;
    let start = (descriptor.y0 as usize) * (width as usize);
    let end = start + (descriptor.height as usize) * (width as usize);
    let view = RoiView {
        descriptor,
        width,
        data: &frame.data()[start..end],
    };
    (view, descriptor.y0)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(height: u32) -> Frame {
        Frame::new(4, height, 0, vec![0u8; (4 * height) as usize])
    }

    #[test]
    fn disabled_roi_spans_full_frame() {
        let config = RoiConfig {
            enabled: false,
            ..RoiConfig::default()
        };
        let d = resolve(480, &config);
        assert_eq!(d.y0, 0);
        assert_eq!(d.height, 480);
    }

    #[test]
    fn enabled_roi_derives_y0_from_position_ratio() {
        let config = RoiConfig {
            enabled: true,
            height: 200,
            position_ratio: 0.4,
        };
        let d = resolve(480, &config);
        assert_eq!(d.y0, 192); // floor(480 * 0.4)
        assert_eq!(d.height, 200);
    }

    #[test]
    fn roi_height_is_clamped_to_remaining_frame() {
        let config = RoiConfig {
            enabled: true,
            height: 500,
            position_ratio: 0.9,
        };
        let d = resolve(480, &config);
        // y0 = floor(480*0.9) = 432, remaining = 48
        assert_eq!(d.y0, 432);
        assert_eq!(d.height, 48);
        assert!(d.y0 + d.height <= 480);
    }

    #[test]
    fn crop_view_matches_source_rows() {
        let mut buf = vec![0u8; 4 * 10];
        for y in 0..10u32 {
            for x in 0..4u32 {
                buf[(y * 4 + x) as usize] = (y * 10 + x) as u8;
            }
        }
        let f = Frame::new(4, 10, 0, buf);
        let config = RoiConfig {
            enabled: true,
            height: 3,
            position_ratio: 0.5,
        };
        let (view, y_offset) = crop(&f, &config);
        assert_eq!(y_offset, 5);
        assert_eq!(view.height(), 3);
        assert_eq!(view.row(0), [50, 51, 52, 53]);
    }

    #[test]
    fn invariant_holds_for_every_resolved_descriptor() {
        for h in [1u32, 2, 10, 479, 480, 481, 1000] {
            for ratio in [0.0, 0.1, 0.5, 0.9, 1.0] {
                let config = RoiConfig {
                    enabled: true,
                    height: 200,
                    position_ratio: ratio,
                };
                let d = resolve(h, &config);
                assert!(d.y0 < d.y0 + d.height);
                assert!(d.y0 + d.height <= h);
            }
        }
    }
}
