// SPDX-License-Identifier: GPL-3.0-only

//! Frame acquisition and ROI cropping.

pub mod frame;
pub mod roi;
pub mod source;

pub use frame::Frame;
pub use roi::{crop, resolve, RoiConfig, RoiDescriptor, RoiView};
pub use source::{CameraSource, FrameSource, SourceConfig, SyntheticGenerator, SyntheticSource, VideoFileSource};
