//! Per-video frame loop: fill the window, segment, track, drain.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::pipeline::buffer::FrameBuffer;
use crate::pipeline::frame::{Frame, Stage, timestamp_for};
use crate::pipeline::processor::ImageProcessor;
use crate::pipeline::source::FrameSource;
use crate::tracker::{Event, RoiMask, SegmentTracker, TrackerConfig};

/// Configuration for the AlgorithmDriver.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriverConfig {
    /// Frames in the background-separation window
    pub buffer_capacity: usize,
    /// Consecutive failed frames that abort the video
    pub failure_threshold: u32,
    /// Used when the source does not report a frame rate
    pub frame_rate: f64,
    /// Log progress every this many tracked frames, 0 disables
    pub progress_interval: u64,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            buffer_capacity: 21,
            failure_threshold: 10,
            frame_rate: 30.0,
            progress_interval: 25,
        }
    }
}

impl DriverConfig {
    pub fn validate(&self) -> Result<()> {
        if self.buffer_capacity == 0 {
            return Err(TrackerError::config("buffer_capacity must be at least 1"));
        }
        if self.failure_threshold == 0 {
            return Err(TrackerError::config("failure_threshold must be at least 1"));
        }
        if !self.frame_rate.is_finite() || self.frame_rate <= 0.0 {
            return Err(TrackerError::config(format!(
                "frame_rate must be positive, got {}",
                self.frame_rate
            )));
        }
        Ok(())
    }
}

/// Where the loop is relative to the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Reading the first `capacity - 1` frames; nothing is segmented yet
    Filling,
    /// Every new frame completes a window and releases the oldest frame
    Steady,
    /// Source exhausted; synthetic frames push the tail through
    Draining,
}

/// Result of a completed run over one source.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub source_id: String,
    /// Events in the order tracks started or ended
    pub events: Vec<Event>,
    pub frames_read: u64,
    /// Frames that went through the tracker
    pub frames_processed: u64,
    /// Frames lost to read or processing failures
    pub frames_skipped: u64,
}

/// Runs the buffer, image stages and tracker over one video.
///
/// A driver is consumed by [`run`](Self::run), so every source starts with
/// an empty buffer and a fresh tracker.
pub struct AlgorithmDriver<P: ImageProcessor> {
    processor: P,
    buffer: FrameBuffer,
    tracker: SegmentTracker,
    config: DriverConfig,
    phase: Phase,
    source_id: String,
    frame_rate: f64,
    frames_read: u64,
    frames_skipped: u64,
    consecutive_failures: u32,
    next_sequence: u64,
    cancel: Option<Arc<AtomicBool>>,
}

impl<P: ImageProcessor> AlgorithmDriver<P> {
    pub fn new(
        processor: P,
        roi: RoiMask,
        tracker_config: TrackerConfig,
        config: DriverConfig,
    ) -> Result<Self> {
        config.validate()?;
        tracker_config.validate()?;
        Ok(Self {
            processor,
            buffer: FrameBuffer::new(config.buffer_capacity)?,
            tracker: SegmentTracker::new(roi, tracker_config),
            frame_rate: config.frame_rate,
            config,
            phase: Phase::Filling,
            source_id: String::new(),
            frames_read: 0,
            frames_skipped: 0,
            consecutive_failures: 0,
            next_sequence: 0,
            cancel: None,
        })
    }

    /// Stop between iterations once `flag` is set; the run then returns
    /// [`TrackerError::Cancelled`] and its events are dropped.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    /// Process `source` to the end.
    ///
    /// Returns [`TrackerError::SourceAborted`] when too many frames in a row
    /// fail; partial events are discarded in that case.
    pub fn run<S: FrameSource>(mut self, source: &mut S) -> Result<RunReport> {
        self.source_id = source.id().to_string();
        self.frame_rate = source
            .frame_rate()
            .filter(|rate| rate.is_finite() && *rate > 0.0)
            .unwrap_or(self.config.frame_rate);
        let total = source.total_frame_count();
        info!(
            "{}: processing {} frames at {:.2} fps",
            self.source_id,
            total.map_or_else(|| "an unknown number of".to_string(), |t| t.to_string()),
            self.frame_rate
        );

        loop {
            if self.is_cancelled() {
                info!("{}: cancelled after {} frames", self.source_id, self.frames_read);
                return Err(TrackerError::Cancelled {
                    source_id: self.source_id,
                });
            }
            match self.phase {
                Phase::Filling | Phase::Steady => self.read_step(source, total)?,
                Phase::Draining => {
                    if !self.drain_step()? {
                        break;
                    }
                }
            }
        }

        self.tracker.finish();
        let events = self.tracker.take_events();
        info!(
            "{}: done, {} frames read, {} skipped, {} events",
            self.source_id,
            self.frames_read,
            self.frames_skipped,
            events.len()
        );

        Ok(RunReport {
            source_id: self.source_id,
            events,
            frames_read: self.frames_read,
            frames_processed: self.tracker.frames_seen(),
            frames_skipped: self.frames_skipped,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn tracker(&self) -> &SegmentTracker {
        &self.tracker
    }

    pub fn buffer(&self) -> &FrameBuffer {
        &self.buffer
    }

    pub fn processor(&self) -> &P {
        &self.processor
    }

    fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::Relaxed))
    }

    fn read_step<S: FrameSource>(&mut self, source: &mut S, total: Option<u64>) -> Result<()> {
        match source.read_next_frame() {
            Ok(Some(raw)) => {
                self.frames_read += 1;
                self.next_sequence = raw.sequence_number + 1;
                let timestamp = timestamp_for(raw.sequence_number, self.frame_rate);
                let frame = Frame::new(raw.sequence_number, timestamp, raw.image);
                match self.ingest(frame) {
                    Ok(()) => self.consecutive_failures = 0,
                    Err(err) if !err.is_fatal() => self.record_failure(&err.to_string())?,
                    Err(err) => return Err(err),
                }
            }
            Ok(None) => {
                debug!("{}: source exhausted after {} reads", self.source_id, self.frames_read);
                self.phase = Phase::Draining;
                return Ok(());
            }
            Err(err) => {
                // the failed read still used up a frame
                self.frames_read += 1;
                self.next_sequence += 1;
                self.record_failure(&err.to_string())?;
            }
        }

        if total.is_some_and(|total| self.frames_read >= total) {
            self.phase = Phase::Draining;
        } else if self.phase == Phase::Filling
            && self.frames_read >= self.buffer.capacity().saturating_sub(1) as u64
        {
            debug!("{}: window filled, entering steady state", self.source_id);
            self.phase = Phase::Steady;
        }
        Ok(())
    }

    fn record_failure(&mut self, reason: &str) -> Result<()> {
        self.consecutive_failures += 1;
        self.frames_skipped += 1;
        warn!(
            "{}: skipping frame {} ({} consecutive failures): {reason}",
            self.source_id, self.frames_read, self.consecutive_failures
        );
        if self.consecutive_failures >= self.config.failure_threshold {
            error!(
                "{}: too many consecutive failures, abandoning video",
                self.source_id
            );
            return Err(TrackerError::SourceAborted {
                source_id: self.source_id.clone(),
                failures: self.consecutive_failures,
                frames_read: self.frames_read,
            });
        }
        Ok(())
    }

    fn ingest(&mut self, mut frame: Frame) -> Result<()> {
        self.preprocess(&mut frame)?;
        self.buffer.push(frame)?;
        if self.buffer.is_full() {
            self.process_window()?;
        }
        Ok(())
    }

    fn preprocess(&self, frame: &mut Frame) -> Result<()> {
        let raw = frame.raw_image().ok_or_else(|| {
            TrackerError::processing(format!("frame {} has no image", frame.sequence_number()))
        })?;
        let gray = self.processor.grayscale(raw);
        let cropped = self.processor.crop(&gray)?;
        let resized = self.processor.resize(&cropped);

        // the window is separated as a whole, so every resident frame must match
        let window_size = self
            .buffer
            .iter()
            .find_map(|resident| resident.stage(Stage::Resized))
            .map(|image| image.dimensions());
        if let Some(expected) = window_size.filter(|&size| size != resized.dimensions()) {
            return Err(TrackerError::processing(format!(
                "frame {} is {:?} after resizing but the window holds {:?} frames",
                frame.sequence_number(),
                resized.dimensions(),
                expected
            )));
        }

        frame.record(Stage::Grayscale, gray)?;
        frame.record(Stage::Cropped, cropped)?;
        frame.record(Stage::Resized, resized)?;
        Ok(())
    }

    /// Segment the oldest frame against the whole window, then hand it to
    /// the tracker. A segmentation failure costs that frame its segments
    /// but the frame still advances.
    fn process_window(&mut self) -> Result<()> {
        match self.segment_oldest() {
            Ok(()) => {}
            Err(err) if !err.is_fatal() => {
                warn!("{}: {err}; frame tracked without segments", self.source_id);
                self.frames_skipped += 1;
            }
            Err(err) => return Err(err),
        }
        self.advance();
        Ok(())
    }

    fn segment_oldest(&mut self) -> Result<()> {
        match self.buffer.oldest() {
            Some(oldest) if !oldest.is_synthetic() => {}
            _ => return Ok(()),
        }

        let window = self.buffer.snapshot(Stage::Resized);
        let mut foreground = self.processor.separate_foreground(&window)?;
        if foreground.is_empty() {
            return Err(TrackerError::processing(
                "foreground separation returned no images",
            ));
        }
        let foreground = foreground.swap_remove(0);

        let smoothed = self.processor.smooth(&foreground);
        let thresholded = self.processor.threshold(&smoothed);
        let opened = self.processor.morphological_open(&thresholded);
        let labels = self.processor.label_components(&opened);
        let regions = self.processor.region_properties(&labels);

        let Some(frame) = self.buffer.oldest_mut() else {
            return Ok(());
        };
        frame.record(Stage::Foreground, foreground)?;
        frame.record(Stage::Smoothed, smoothed)?;
        frame.record(Stage::Thresholded, thresholded)?;
        frame.record(Stage::Opened, opened)?;
        frame.set_segments(regions);
        Ok(())
    }

    fn advance(&mut self) {
        let Some(frame) = self.buffer.pop() else {
            return;
        };
        if frame.is_synthetic() {
            return;
        }
        self.tracker.update(frame);

        let processed = self.tracker.frames_seen();
        if self.config.progress_interval > 0 && processed % self.config.progress_interval == 0 {
            info!("{}: {processed} frames processed", self.source_id);
        }
    }

    /// One draining iteration; returns false once no real frame is left.
    fn drain_step(&mut self) -> Result<bool> {
        if self.buffer.real_len() == 0 {
            while self.buffer.pop().is_some() {}
            return Ok(false);
        }
        if !self.buffer.is_full() {
            let sequence = self.next_sequence;
            self.next_sequence += 1;
            let timestamp = timestamp_for(sequence, self.frame_rate);
            self.buffer.push(Frame::synthetic(sequence, timestamp))?;
        }
        if self.buffer.is_full() {
            self.process_window()?;
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = DriverConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.buffer_capacity, 21);
        assert_eq!(config.failure_threshold, 10);
    }

    #[test]
    fn test_config_rejects_bad_values() {
        let zero_threshold = DriverConfig {
            failure_threshold: 0,
            ..DriverConfig::default()
        };
        assert!(matches!(zero_threshold.validate(), Err(TrackerError::Config(_))));

        for frame_rate in [0.0, -25.0, f64::NAN] {
            let config = DriverConfig {
                frame_rate,
                ..DriverConfig::default()
            };
            assert!(config.validate().is_err());
        }
    }
}
