//! A single object followed across frames.

use crate::tracker::segment::Segment;
use crate::tracker::track_state::{SegmentStatus, TrackState};

/// Chain of segments believed to be one bird.
///
/// Only descriptors are kept, never frame images, so a track outlives the
/// frames its segments came from.
#[derive(Debug, Clone)]
pub struct Track {
    /// Identifier, unique within one tracker run
    pub id: u64,
    /// Current lifecycle state
    pub state: TrackState,
    /// Consecutive frames without a matching segment
    pub misses: u32,
    history: Vec<Segment>,
}

impl Track {
    pub(crate) fn start(id: u64, mut segment: Segment) -> Self {
        segment.track_id = Some(id);
        Self {
            id,
            state: TrackState::Pending,
            misses: 0,
            history: vec![segment],
        }
    }

    /// Most recent segment; this is the row the next cost matrix uses.
    pub fn latest(&self) -> &Segment {
        // a track is never created without its first segment
        &self.history[self.history.len() - 1]
    }

    pub fn first(&self) -> &Segment {
        &self.history[0]
    }

    /// Segments oldest first, in strictly increasing frame order.
    pub fn history(&self) -> &[Segment] {
        &self.history
    }

    pub fn len(&self) -> usize {
        self.history.len()
    }

    pub fn is_empty(&self) -> bool {
        self.history.is_empty()
    }

    pub fn start_frame(&self) -> u64 {
        self.first().parent_frame_number
    }

    pub fn end_frame(&self) -> u64 {
        self.latest().parent_frame_number
    }

    pub fn is_live(&self) -> bool {
        self.state != TrackState::Terminated
    }

    pub(crate) fn link(&mut self, mut segment: Segment) {
        debug_assert!(segment.parent_frame_number > self.end_frame());
        segment.status = SegmentStatus::Matched;
        segment.track_id = Some(self.id);
        self.history.push(segment);
        self.misses = 0;
        if self.state == TrackState::Pending {
            self.state = TrackState::Active;
        }
    }

    pub(crate) fn mark_missed(&mut self) {
        self.misses += 1;
    }

    pub(crate) fn mark_terminated(&mut self) {
        self.state = TrackState::Terminated;
        if let Some(last) = self.history.last_mut() {
            last.status = SegmentStatus::Terminated;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::tracker::segment::RegionProps;

    fn segment_at(frame: u64, x: f64, y: f64) -> Segment {
        Segment::new(
            RegionProps::square(1, x, y, 3.0),
            frame,
            Duration::from_secs(frame),
        )
    }

    #[test]
    fn test_second_observation_activates() {
        let mut track = Track::start(1, segment_at(1, 10.0, 10.0));
        assert_eq!(track.state, TrackState::Pending);
        assert_eq!(track.first().track_id, Some(1));

        track.mark_missed();
        track.link(segment_at(3, 12.0, 10.0));

        assert_eq!(track.state, TrackState::Active);
        assert_eq!(track.misses, 0);
        assert_eq!(track.len(), 2);
        assert_eq!(track.latest().status, SegmentStatus::Matched);
        assert_eq!((track.start_frame(), track.end_frame()), (1, 3));
    }

    #[test]
    fn test_terminate_marks_last_segment() {
        let mut track = Track::start(4, segment_at(1, 0.0, 0.0));
        track.link(segment_at(2, 1.0, 0.0));
        track.mark_terminated();

        assert!(!track.is_live());
        assert_eq!(track.history()[0].status, SegmentStatus::Unmatched);
        assert_eq!(track.latest().status, SegmentStatus::Terminated);
    }
}
