//! Error types for frame ingestion, buffering and tracking.

use thiserror::Error;

use crate::pipeline::Stage;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrackerError>;

/// A single failed attempt to read a frame from a source.
///
/// These are transient: the driver skips the frame and keeps going until too
/// many happen in a row.
#[derive(Error, Debug)]
pub enum SourceReadError {
    #[error("failed to decode frame {frame}: {reason}")]
    Decode { frame: u64, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image decoding error: {0}")]
    Image(#[from] image::ImageError),
}

#[derive(Error, Debug)]
pub enum TrackerError {
    #[error("frame buffer is at capacity ({capacity} frames); pop before pushing")]
    BufferCapacity { capacity: usize },

    #[error("stage {stage:?} recorded out of pipeline order on frame {frame}")]
    StageOutOfOrder { stage: Stage, frame: u64 },

    #[error("assignment infeasible: {0}")]
    AssignmentInfeasible(String),

    #[error(
        "source {source_id} aborted after {failures} consecutive failures ({frames_read} frames read)"
    )]
    SourceAborted {
        source_id: String,
        failures: u32,
        frames_read: u64,
    },

    #[error("run for {source_id} was cancelled")]
    Cancelled { source_id: String },

    #[error("image processing failed: {0}")]
    Processing(String),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Read(#[from] SourceReadError),
}

impl TrackerError {
    pub fn processing<S: Into<String>>(msg: S) -> Self {
        Self::Processing(msg.into())
    }

    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Whether the error stops processing of the current source.
    ///
    /// Processing errors only cost the frame they happened on.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, Self::Processing(_) | Self::AssignmentInfeasible(_))
    }
}
