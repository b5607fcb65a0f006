//! Frame-to-frame segment tracking and entry/exit event detection.

use log::{debug, info, warn};
use nalgebra::Point2;
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::pipeline::Frame;
use crate::tracker::event::{Boundary, Direction, Event};
use crate::tracker::matching::{self, AssignmentResult};
use crate::tracker::roi::RoiMask;
use crate::tracker::segment::Segment;
use crate::tracker::track::Track;
use crate::tracker::track_state::TrackState;

/// Configuration for the SegmentTracker.
///
/// Distances are in pixels of the processed (cropped and resized) frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerConfig {
    /// Matches costing more than this are discarded even if the solver chose them
    pub rejection_threshold: f64,
    /// Placeholder cost of leaving a track or a segment unmatched
    pub no_match_cost: f64,
    /// Cost scale for candidates near the region of interest
    pub roi_cost_multiplier: f64,
    /// Distance from the mask that still counts as near it
    pub roi_proximity: usize,
    /// Consecutive misses a track survives; one more terminates it
    pub miss_tolerance: u32,
    /// Distance from the frame border that counts as the edge
    pub edge_margin: f64,
    /// Emit events for every track start and end, ambiguous ones included
    pub report_all_transitions: bool,
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            rejection_threshold: 20.0,
            no_match_cost: 25.0,
            roi_cost_multiplier: 1.5,
            roi_proximity: 3,
            miss_tolerance: 3,
            edge_margin: 5.0,
            report_all_transitions: false,
        }
    }
}

impl TrackerConfig {
    pub fn validate(&self) -> Result<()> {
        let non_negative = [
            ("rejection_threshold", self.rejection_threshold),
            ("no_match_cost", self.no_match_cost),
            ("roi_cost_multiplier", self.roi_cost_multiplier),
            ("edge_margin", self.edge_margin),
        ];
        for (name, value) in non_negative {
            if !value.is_finite() || value < 0.0 {
                return Err(TrackerError::config(format!(
                    "{name} must be finite and non-negative, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Links segments across frames into tracks and classifies where tracks
/// start and end.
///
/// Feed it frames in sequence order through [`update`](Self::update) and
/// call [`finish`](Self::finish) once the stream is exhausted.
pub struct SegmentTracker {
    tracks: Vec<Track>,
    terminated_tracks: Vec<Track>,
    events: Vec<Event>,
    roi: RoiMask,
    config: TrackerConfig,
    next_track_id: u64,
    frames_seen: u64,
    last_frame: Option<u64>,
}

impl SegmentTracker {
    pub fn new(roi: RoiMask, config: TrackerConfig) -> Self {
        Self {
            tracks: Vec::new(),
            terminated_tracks: Vec::new(),
            events: Vec::new(),
            roi,
            config,
            next_track_id: 0,
            frames_seen: 0,
            last_frame: None,
        }
    }

    /// Consume one frame and return the events it produced.
    ///
    /// The frame is dropped afterwards; tracks keep only segment descriptors.
    /// Frames must arrive in increasing sequence order; a repeated or older
    /// frame is skipped without touching any track.
    pub fn update(&mut self, frame: Frame) -> Vec<Event> {
        let frame_number = frame.sequence_number();
        if let Some(last) = self.last_frame.filter(|&last| frame_number <= last) {
            warn!("frame {frame_number} arrived after frame {last}; skipped");
            return Vec::new();
        }
        self.last_frame = Some(frame_number);
        self.frames_seen += 1;

        let incoming: Vec<Segment> = frame
            .into_segments()
            .into_iter()
            .filter(|segment| {
                let finite = segment.centroid.x.is_finite() && segment.centroid.y.is_finite();
                if !finite {
                    warn!(
                        "frame {frame_number}: segment {} has a non-finite centroid; dropped",
                        segment.id
                    );
                }
                finite
            })
            .collect();
        let segment_points: Vec<Point2<f64>> = incoming.iter().map(|s| s.centroid).collect();
        let mut segments: Vec<Option<Segment>> = incoming.into_iter().map(Some).collect();

        // Step 1: cost between each live track's latest segment and the new segments
        let track_points: Vec<Point2<f64>> =
            self.tracks.iter().map(|t| t.latest().centroid).collect();
        let costs = matching::cost_matrix(&track_points, &segment_points, &self.roi, &self.config);

        // Steps 2 and 3: solve, then drop semantically implausible pairs
        let AssignmentResult {
            matches,
            unmatched_tracks,
            unmatched_segments,
            ..
        } = self.assign(&costs, frame_number);

        debug!(
            "frame {frame_number}: {} tracks, {} segments, {} matched",
            track_points.len(),
            segment_points.len(),
            matches.len()
        );

        // Step 4: link matched segments
        for (itrack, isegment) in matches {
            if let Some(segment) = segments[isegment].take() {
                self.tracks[itrack].link(segment);
            }
        }

        // Step 5: age unmatched tracks, then classify terminations and starts
        for itrack in unmatched_tracks {
            let track = &mut self.tracks[itrack];
            track.mark_missed();
            if track.misses > self.config.miss_tolerance {
                track.mark_terminated();
            }
        }

        let mut events = Vec::new();
        let (ended, live): (Vec<Track>, Vec<Track>) = self
            .tracks
            .drain(..)
            .partition(|t| t.state == TrackState::Terminated);
        self.tracks = live;
        for track in ended {
            events.extend(self.evaluate_termination(&track));
            self.terminated_tracks.push(track);
        }

        for isegment in unmatched_segments {
            if let Some(segment) = segments[isegment].take() {
                let track = Track::start(self.next_id(), segment);
                events.extend(self.evaluate_start(&track));
                self.tracks.push(track);
            }
        }

        // Step 6: nothing of the frame is retained beyond the tracks' segments
        self.record(&events);
        events
    }

    /// Terminate every remaining track and evaluate it for an event.
    ///
    /// Called at end of stream so no track vanishes without a decision.
    pub fn finish(&mut self) -> Vec<Event> {
        let mut events = Vec::new();
        for mut track in std::mem::take(&mut self.tracks) {
            track.mark_terminated();
            events.extend(self.evaluate_termination(&track));
            self.terminated_tracks.push(track);
        }
        self.record(&events);
        events
    }

    fn assign(&self, costs: &Array2<f64>, frame_number: u64) -> AssignmentResult {
        let (rows, cols) = costs.dim();
        match matching::solve(costs, self.config.no_match_cost) {
            Ok(result) => matching::interpret(result, costs, self.config.rejection_threshold),
            Err(err) => {
                warn!("frame {frame_number}: {err}; treating every track and segment as unmatched");
                AssignmentResult::unmatched(rows, cols, self.config.no_match_cost)
            }
        }
    }

    fn next_id(&mut self) -> u64 {
        self.next_track_id += 1;
        self.next_track_id
    }

    fn event_for(&self, track: &Track, segment: &Segment, direction: Direction) -> Event {
        Event {
            track_id: track.id,
            direction,
            boundary: self.roi.classify(&segment.centroid, self.config.edge_margin),
            frame_number: segment.parent_frame_number,
            timestamp: segment.parent_timestamp,
            centroid: segment.centroid,
            track_length: track.len(),
        }
    }

    /// New tracks count only when they emerge from the opening.
    fn evaluate_start(&self, track: &Track) -> Option<Event> {
        let event = self.event_for(track, track.first(), Direction::Appeared);
        (event.boundary == Boundary::RegionOfInterest || self.config.report_all_transitions)
            .then_some(event)
    }

    /// Ended tracks count when last seen in the opening or at the frame edge.
    fn evaluate_termination(&self, track: &Track) -> Option<Event> {
        let event = self.event_for(track, track.latest(), Direction::Disappeared);
        if event.boundary == Boundary::Ambiguous && !self.config.report_all_transitions {
            debug!(
                "track {} ended mid-frame after {} segments; no event",
                track.id,
                track.len()
            );
            return None;
        }
        Some(event)
    }

    fn record(&mut self, events: &[Event]) {
        for event in events {
            info!("{event}");
        }
        self.events.extend_from_slice(events);
    }

    /// Pending and active tracks.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn terminated_tracks(&self) -> &[Track] {
        &self.terminated_tracks
    }

    /// Every event so far, in the order tracks started or ended.
    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn take_events(&mut self) -> Vec<Event> {
        std::mem::take(&mut self.events)
    }

    pub fn frames_seen(&self) -> u64 {
        self.frames_seen
    }

    pub fn roi(&self) -> &RoiMask {
        &self.roi
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }
}
