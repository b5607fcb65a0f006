//! Tallying events and handing them to storage.

use std::collections::BTreeMap;
use std::convert::Infallible;

use log::debug;

use crate::pipeline::batch::BatchOutcome;
use crate::tracker::{Boundary, Direction, Event};

/// Receives the events of completed runs.
///
/// Persistence lives behind this trait; the crate itself only ships the
/// in-memory collector.
pub trait EventSink {
    type Error;

    fn accept(&mut self, run_id: &str, events: &[Event]) -> Result<(), Self::Error>;
}

impl EventSink for Vec<(String, Vec<Event>)> {
    type Error = Infallible;

    fn accept(&mut self, run_id: &str, events: &[Event]) -> Result<(), Self::Error> {
        self.push((run_id.to_string(), events.to_vec()));
        Ok(())
    }
}

/// Send every completed run to `sink`. Failed runs never reach it.
///
/// Returns how many runs were published.
pub fn publish_completed<K: EventSink>(
    outcomes: &[BatchOutcome],
    sink: &mut K,
) -> Result<usize, K::Error> {
    let mut published = 0;
    for outcome in outcomes {
        let Some(report) = outcome.report() else {
            debug!("{}: not published, run did not complete", outcome.source_id);
            continue;
        };
        sink.accept(&outcome.source_id, &report.events)?;
        published += 1;
    }
    Ok(published)
}

/// Event counts per direction and boundary.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EventSummary {
    counts: BTreeMap<(Direction, Boundary), usize>,
}

impl EventSummary {
    pub fn from_events<'a>(events: impl IntoIterator<Item = &'a Event>) -> Self {
        let mut summary = Self::default();
        for event in events {
            summary.record(event);
        }
        summary
    }

    pub fn record(&mut self, event: &Event) {
        *self
            .counts
            .entry((event.direction, event.boundary))
            .or_default() += 1;
    }

    pub fn count(&self, direction: Direction, boundary: Boundary) -> usize {
        self.counts
            .get(&(direction, boundary))
            .copied()
            .unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Birds that went into the roost minus birds that came out.
    pub fn net_roost_entries(&self) -> i64 {
        let entries = self.count(Direction::Disappeared, Boundary::RegionOfInterest) as i64;
        let exits = self.count(Direction::Appeared, Boundary::RegionOfInterest) as i64;
        entries - exits
    }
}
