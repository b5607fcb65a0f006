use serde::{Deserialize, Serialize};

/// Lifecycle of a track.
///
/// `Pending -> Active -> Terminated`; a pending track may also terminate
/// directly once it has missed enough frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TrackState {
    /// Seen in exactly one frame so far
    #[default]
    Pending,
    /// Matched in at least one later frame
    Active,
    /// Aged out or flushed at end of stream
    Terminated,
}

/// Linkage state of a single segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum SegmentStatus {
    /// Not assigned to an existing track (it may have started a new one)
    #[default]
    Unmatched,
    /// Appended to an existing track
    Matched,
    /// Last segment of a terminated track
    Terminated,
}
