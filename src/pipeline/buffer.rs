//! Fixed-capacity window of frames.

use image::GrayImage;

use crate::error::{Result, TrackerError};
use crate::pipeline::frame::{Frame, Stage};

/// Ring buffer of frames, oldest at the head.
///
/// The buffer never drops a frame on its own: pushing into a full buffer is
/// an error, and frames only leave through [`pop`](Self::pop).
#[derive(Debug)]
pub struct FrameBuffer {
    slots: Vec<Option<Frame>>,
    head: usize,
    len: usize,
    frames_processed: u64,
}

impl FrameBuffer {
    pub fn new(capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(TrackerError::config("frame buffer capacity must be at least 1"));
        }
        Ok(Self {
            slots: std::iter::repeat_with(|| None).take(capacity).collect(),
            head: 0,
            len: 0,
            frames_processed: 0,
        })
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Number of resident frames.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn is_full(&self) -> bool {
        self.len == self.capacity()
    }

    /// Frames popped so far.
    pub fn frames_processed(&self) -> u64 {
        self.frames_processed
    }

    #[inline]
    fn slot(&self, offset: usize) -> usize {
        (self.head + offset) % self.capacity()
    }

    /// Insert at the newest end.
    pub fn push(&mut self, frame: Frame) -> Result<()> {
        if self.is_full() {
            return Err(TrackerError::BufferCapacity {
                capacity: self.capacity(),
            });
        }
        debug_assert!(
            self.newest()
                .is_none_or(|newest| newest.sequence_number() < frame.sequence_number())
        );
        let tail = self.slot(self.len);
        self.slots[tail] = Some(frame);
        self.len += 1;
        Ok(())
    }

    /// Remove and return the oldest frame.
    pub fn pop(&mut self) -> Option<Frame> {
        if self.is_empty() {
            return None;
        }
        let frame = self.slots[self.head].take();
        self.head = self.slot(1);
        self.len -= 1;
        self.frames_processed += 1;
        frame
    }

    pub fn oldest(&self) -> Option<&Frame> {
        self.iter().next()
    }

    pub fn oldest_mut(&mut self) -> Option<&mut Frame> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.head].as_mut()
    }

    pub fn newest(&self) -> Option<&Frame> {
        if self.is_empty() {
            return None;
        }
        self.slots[self.slot(self.len - 1)].as_ref()
    }

    /// Frames oldest first.
    pub fn iter(&self) -> impl Iterator<Item = &Frame> + '_ {
        (0..self.len).filter_map(move |offset| self.slots[self.slot(offset)].as_ref())
    }

    /// Resident frames that came from the source rather than draining.
    pub fn real_len(&self) -> usize {
        self.iter().filter(|frame| !frame.is_synthetic()).count()
    }

    /// The `stage` image of every resident frame that has one, oldest first.
    ///
    /// Synthetic frames carry no images and are skipped.
    pub fn snapshot(&self, stage: Stage) -> Vec<&GrayImage> {
        self.iter().filter_map(|frame| frame.stage(stage)).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use image::RgbImage;

    use super::*;

    fn frame(n: u64) -> Frame {
        Frame::new(n, Duration::from_secs(n), RgbImage::new(1, 1))
    }

    #[test]
    fn test_fill_and_pop() {
        let mut buffer = FrameBuffer::new(3).unwrap();
        for n in 1..=3 {
            buffer.push(frame(n)).unwrap();
        }

        assert!(buffer.is_full());
        assert_eq!(buffer.pop().unwrap().sequence_number(), 1);
        assert_eq!(buffer.frames_processed(), 1);
        assert_eq!(buffer.len(), 2);
    }

    #[test]
    fn test_push_beyond_capacity_fails() {
        let mut buffer = FrameBuffer::new(2).unwrap();
        buffer.push(frame(1)).unwrap();
        buffer.push(frame(2)).unwrap();

        let err = buffer.push(frame(3)).unwrap_err();
        assert!(matches!(err, TrackerError::BufferCapacity { capacity: 2 }));
        assert_eq!(buffer.len(), 2);
        assert_eq!(buffer.oldest().unwrap().sequence_number(), 1);
    }

    #[test]
    fn test_fifo_across_wraparound() {
        let mut buffer = FrameBuffer::new(3).unwrap();
        let mut popped = Vec::new();
        for n in 1..=10 {
            buffer.push(frame(n)).unwrap();
            assert!(buffer.len() <= buffer.capacity());
            if buffer.is_full() {
                let smallest = buffer.iter().map(Frame::sequence_number).min();
                let oldest = buffer.pop().unwrap().sequence_number();
                assert_eq!(Some(oldest), smallest);
                popped.push(oldest);
            }
        }
        while let Some(frame) = buffer.pop() {
            popped.push(frame.sequence_number());
        }

        assert_eq!(popped, (1..=10).collect::<Vec<_>>());
        assert_eq!(buffer.frames_processed(), 10);
        assert!(buffer.is_empty());
        assert!(buffer.pop().is_none());
    }

    #[test]
    fn test_snapshot_in_buffer_order() {
        let mut buffer = FrameBuffer::new(4).unwrap();
        for n in 1..=3 {
            let mut f = frame(n);
            f.record(Stage::Resized, GrayImage::new(n as u32, 1)).unwrap();
            buffer.push(f).unwrap();
        }
        buffer.push(Frame::synthetic(4, Duration::ZERO)).unwrap();

        let widths: Vec<u32> = buffer
            .snapshot(Stage::Resized)
            .iter()
            .map(|image| image.width())
            .collect();
        assert_eq!(widths, vec![1, 2, 3]);
        assert!(buffer.snapshot(Stage::Opened).is_empty());
        assert_eq!(buffer.real_len(), 3);
        assert_eq!(buffer.newest().unwrap().sequence_number(), 4);
    }

    #[test]
    fn test_zero_capacity_rejected() {
        assert!(matches!(FrameBuffer::new(0), Err(TrackerError::Config(_))));
    }
}
