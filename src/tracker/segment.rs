//! Foreground blobs detected in a single frame.

use std::time::Duration;

use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::tracker::rect::Rect;
use crate::tracker::track_state::SegmentStatus;

/// Shape and position descriptors of one connected foreground region.
///
/// This is the whole capability set the tracker consumes from region
/// labelling; anything else the image library knows about a region is
/// dropped at this boundary.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegionProps {
    /// Connected-component label, unique within its frame
    pub label: u32,
    /// Pixel count
    pub area: u32,
    /// Mean pixel position (x = column, y = row)
    pub centroid: Point2<f64>,
    /// Bounding box in pixel coordinates
    pub bbox: Rect,
}

impl RegionProps {
    pub fn new(label: u32, area: u32, centroid: Point2<f64>, bbox: Rect) -> Self {
        Self {
            label,
            area,
            centroid,
            bbox,
        }
    }

    /// A square region of side `size` centred on `(x, y)`.
    pub fn square(label: u32, x: f64, y: f64, size: f64) -> Self {
        let half = size / 2.0;
        let bbox = Rect::new(x - half, y - half, size, size);
        Self {
            label,
            area: bbox.area().round() as u32,
            centroid: bbox.center(),
            bbox,
        }
    }
}

/// A region bound to the frame it was found in, plus its track linkage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    /// Component label, unique within the parent frame
    pub id: u32,
    pub parent_frame_number: u64,
    pub parent_timestamp: Duration,
    pub centroid: Point2<f64>,
    pub area: u32,
    pub bbox: Rect,
    pub status: SegmentStatus,
    /// Track this segment belongs to, once the tracker has placed it
    pub track_id: Option<u64>,
}

impl Segment {
    pub fn new(props: RegionProps, frame_number: u64, timestamp: Duration) -> Self {
        Self {
            id: props.label,
            parent_frame_number: frame_number,
            parent_timestamp: timestamp,
            centroid: props.centroid,
            area: props.area,
            bbox: props.bbox,
            status: SegmentStatus::Unmatched,
            track_id: None,
        }
    }
}
