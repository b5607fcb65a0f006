mod event;
mod matching;
mod rect;
mod roi;
mod segment;
mod segment_tracker;
mod track;
mod track_state;

pub use event::{Boundary, Direction, Event};
pub use matching::{AssignmentResult, FORBIDDEN_COST, cost_matrix, interpret, segment_cost, solve};
pub use rect::Rect;
pub use roi::RoiMask;
pub use segment::{RegionProps, Segment};
pub use segment_tracker::{SegmentTracker, TrackerConfig};
pub use track::Track;
pub use track_state::{SegmentStatus, TrackState};
