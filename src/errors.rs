// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the vision pipeline.

use std::fmt;

/// Result type alias using [`PipelineError`].
pub type PipelineResult<T> = Result<T, PipelineError>;

/// The error kinds the pipeline can raise, each carrying the context needed to act on it.
#[derive(Debug, Clone)]
pub enum PipelineError {
    /// A configuration field failed validation, or names an unknown method_id.
    ConfigInvalid { field: String, reason: String },
    /// The frame source cannot be opened or has stopped producing frames entirely.
    SourceUnavailable(String),
    /// The frame source hit `MAX_CONSECUTIVE_READ_ERRORS` and now returns `None` until restarted.
    SourceDegraded(String),
    /// A `method_id` was requested that the Method Registry does not know.
    MethodUnknown(String),
    /// A single frame was dropped; informational, never fatal.
    FrameDropped { sequence: u64, reason: String },
    /// A detector failed on one frame but can continue; the frame is skipped.
    DetectorTransient(String),
    /// A detector failed unrecoverably; the orchestrator must stop.
    DetectorFatal(String),
}

impl fmt::Display for PipelineError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PipelineError::ConfigInvalid { field, reason } => {
                write!(f, "invalid configuration field `{field}`: {reason}")
            }
            PipelineError::SourceUnavailable(msg) => write!(f, "frame source unavailable: {msg}"),
            PipelineError::SourceDegraded(msg) => write!(f, "frame source degraded: {msg}"),
            PipelineError::MethodUnknown(method_id) => {
                write!(f, "unknown detection method: {method_id}")
            }
            PipelineError::FrameDropped { sequence, reason } => {
                write!(f, "frame {sequence} dropped: {reason}")
            }
            PipelineError::DetectorTransient(msg) => write!(f, "detector transient error: {msg}"),
            PipelineError::DetectorFatal(msg) => write!(f, "detector fatal error: {msg}"),
        }
    }
}

impl std::error::Error for PipelineError {}

impl From<std::io::Error> for PipelineError {
    fn from(err: std::io::Error) -> Self {
        PipelineError::SourceUnavailable(err.to_string())
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::ConfigInvalid {
            field: "<root>".to_string(),
            reason: err.to_string(),
        }
    }
}
