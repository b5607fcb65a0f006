use std::fmt;
use std::time::Duration;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::pipeline::format_timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Direction {
    /// A track started
    Appeared,
    /// A track ended
    Disappeared,
}

/// Where a track started or ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Boundary {
    /// Inside the region-of-interest mask (the roost opening)
    RegionOfInterest,
    /// Within the edge margin of the frame
    FrameEdge,
    /// Neither; usually a segmentation artefact
    Ambiguous,
}

/// A classified track start or end.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub track_id: u64,
    pub direction: Direction,
    pub boundary: Boundary,
    /// Frame of the segment the event was decided on
    pub frame_number: u64,
    pub timestamp: Duration,
    pub centroid: Point2<f64>,
    /// Number of segments in the track when the event fired
    pub track_length: usize,
}

impl Event {
    /// A bird entering the roost: a track that vanished into the opening.
    pub fn is_roost_entry(&self) -> bool {
        self.direction == Direction::Disappeared && self.boundary == Boundary::RegionOfInterest
    }

    /// A bird leaving the roost: a track that emerged from the opening.
    pub fn is_roost_exit(&self) -> bool {
        self.direction == Direction::Appeared && self.boundary == Boundary::RegionOfInterest
    }
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "track {} {:?} at {:?} (frame {}, {}, ({:.1}, {:.1}))",
            self.track_id,
            self.direction,
            self.boundary,
            self.frame_number,
            format_timestamp(self.timestamp),
            self.centroid.x,
            self.centroid.y
        )
    }
}
