//! A video frame and the images derived from it while it sits in the buffer.

use std::time::Duration;

use image::{GrayImage, RgbImage};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::tracker::{RegionProps, Segment};

/// Processing stages, in the order they run.
///
/// Each frame stores at most one image per stage and stages may only be
/// recorded in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Stage {
    Grayscale,
    Cropped,
    Resized,
    /// Output of windowed background separation
    Foreground,
    Smoothed,
    Thresholded,
    Opened,
}

impl Stage {
    pub const COUNT: usize = 7;

    pub const ALL: [Stage; Stage::COUNT] = [
        Stage::Grayscale,
        Stage::Cropped,
        Stage::Resized,
        Stage::Foreground,
        Stage::Smoothed,
        Stage::Thresholded,
        Stage::Opened,
    ];

    #[inline]
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        match self {
            Stage::Grayscale => "grayscale",
            Stage::Cropped => "crop",
            Stage::Resized => "resize",
            Stage::Foreground => "foreground",
            Stage::Smoothed => "smooth",
            Stage::Thresholded => "threshold",
            Stage::Opened => "opened",
        }
    }
}

/// Timestamp of frame `sequence_number` at `frame_rate` frames per second.
pub fn timestamp_for(sequence_number: u64, frame_rate: f64) -> Duration {
    Duration::from_secs_f64(sequence_number as f64 / frame_rate)
}

/// `HH:MM:SS.ffffff`
pub fn format_timestamp(timestamp: Duration) -> String {
    let secs = timestamp.as_secs();
    format!(
        "{:02}:{:02}:{:02}.{:06}",
        secs / 3600,
        (secs / 60) % 60,
        secs % 60,
        timestamp.subsec_micros()
    )
}

#[derive(Debug, Clone)]
pub struct Frame {
    sequence_number: u64,
    timestamp: Duration,
    raw: Option<RgbImage>,
    stages: [Option<GrayImage>; Stage::COUNT],
    segments: Vec<Segment>,
    synthetic: bool,
}

impl Frame {
    pub fn new(sequence_number: u64, timestamp: Duration, raw: RgbImage) -> Self {
        Self {
            sequence_number,
            timestamp,
            raw: Some(raw),
            stages: Default::default(),
            segments: Vec::new(),
            synthetic: false,
        }
    }

    /// Placeholder pushed while draining so the tail of the video still gets
    /// a full window. Carries no image and is never tracked.
    pub fn synthetic(sequence_number: u64, timestamp: Duration) -> Self {
        Self {
            sequence_number,
            timestamp,
            raw: None,
            stages: Default::default(),
            segments: Vec::new(),
            synthetic: true,
        }
    }

    /// A frame whose regions were already extracted elsewhere.
    pub fn from_regions(sequence_number: u64, timestamp: Duration, regions: Vec<RegionProps>) -> Self {
        let mut frame = Self {
            sequence_number,
            timestamp,
            raw: None,
            stages: Default::default(),
            segments: Vec::new(),
            synthetic: false,
        };
        frame.set_segments(regions);
        frame
    }

    pub fn sequence_number(&self) -> u64 {
        self.sequence_number
    }

    pub fn timestamp(&self) -> Duration {
        self.timestamp
    }

    pub fn is_synthetic(&self) -> bool {
        self.synthetic
    }

    pub fn raw_image(&self) -> Option<&RgbImage> {
        self.raw.as_ref()
    }

    pub fn stage(&self, stage: Stage) -> Option<&GrayImage> {
        self.stages[stage.index()].as_ref()
    }

    /// Most recently recorded stage and its image.
    pub fn latest(&self) -> Option<(Stage, &GrayImage)> {
        Stage::ALL
            .iter()
            .rev()
            .find_map(|&stage| self.stage(stage).map(|image| (stage, image)))
    }

    /// Store the output of `stage`.
    ///
    /// Fails if this stage or any later one is already present, which keeps
    /// the stages in pipeline order.
    pub fn record(&mut self, stage: Stage, image: GrayImage) -> Result<()> {
        if self.stages[stage.index()..].iter().any(Option::is_some) {
            return Err(TrackerError::StageOutOfOrder {
                stage,
                frame: self.sequence_number,
            });
        }
        self.stages[stage.index()] = Some(image);
        Ok(())
    }

    /// Replace the segment list; order follows the component labels given.
    pub fn set_segments(&mut self, regions: Vec<RegionProps>) {
        self.segments = regions
            .into_iter()
            .map(|props| Segment::new(props, self.sequence_number, self.timestamp))
            .collect();
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }

    pub fn num_segments(&self) -> usize {
        self.segments.len()
    }

    pub fn into_segments(self) -> Vec<Segment> {
        self.segments
    }
}
