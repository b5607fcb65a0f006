//! Counting birds entering and leaving a roost from video.
//!
//! Frames flow through a fixed-size [`FrameBuffer`] so that windowed
//! foreground separation can see temporal context, the resulting blobs are
//! linked into tracks by the [`SegmentTracker`], and track starts and ends are
//! classified into [`Event`]s relative to a region of interest (the roost
//! opening) and the frame edge. The [`AlgorithmDriver`] runs the whole loop
//! for one video and contains decode failures.

pub mod error;
pub mod pipeline;
pub mod tracker;

pub use error::{Result, SourceReadError, TrackerError};
pub use pipeline::{
    AlgorithmDriver, BatchJob, BatchOutcome, CropRegion, DriverConfig, EventSink, EventSummary,
    Frame, FrameBuffer, FrameSource, ImageProcessor, ImageSequenceSource, Phase, ProcessorConfig,
    RawFrame, RunReport, Stage, StandardProcessor, process_batch, process_batch_parallel,
    publish_completed,
};
pub use tracker::{
    Boundary, Direction, Event, Rect, RegionProps, RoiMask, Segment, SegmentStatus,
    SegmentTracker, Track, TrackState, TrackerConfig,
};
