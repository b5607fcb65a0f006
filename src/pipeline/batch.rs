//! Running the driver over many videos.

use log::{error, info};
use rayon::prelude::*;

use crate::error::Result;
use crate::pipeline::driver::{AlgorithmDriver, DriverConfig, RunReport};
use crate::pipeline::processor::ImageProcessor;
use crate::pipeline::source::FrameSource;
use crate::tracker::{RoiMask, TrackerConfig};

/// One video to process, with the processor and ROI that belong to it.
pub struct BatchJob<S, P> {
    pub source: S,
    pub processor: P,
    pub roi: RoiMask,
}

impl<S, P> BatchJob<S, P> {
    pub fn new(source: S, processor: P, roi: RoiMask) -> Self {
        Self {
            source,
            processor,
            roi,
        }
    }
}

/// What happened to one video of a batch.
#[derive(Debug)]
pub struct BatchOutcome {
    pub source_id: String,
    pub result: Result<RunReport>,
}

impl BatchOutcome {
    pub fn is_complete(&self) -> bool {
        self.result.is_ok()
    }

    pub fn report(&self) -> Option<&RunReport> {
        self.result.as_ref().ok()
    }
}

fn run_job<S, P>(
    job: BatchJob<S, P>,
    tracker_config: &TrackerConfig,
    config: &DriverConfig,
) -> BatchOutcome
where
    S: FrameSource,
    P: ImageProcessor,
{
    let BatchJob {
        mut source,
        processor,
        roi,
    } = job;
    let source_id = source.id().to_string();
    let result = AlgorithmDriver::new(processor, roi, tracker_config.clone(), config.clone())
        .and_then(|driver| driver.run(&mut source));

    match &result {
        Ok(report) => info!("{source_id}: {} events", report.events.len()),
        Err(err) => error!("{source_id}: run failed: {err}"),
    }
    BatchOutcome { source_id, result }
}

/// Process videos one after another. A failed video does not stop the batch.
pub fn process_batch<S, P>(
    jobs: Vec<BatchJob<S, P>>,
    tracker_config: &TrackerConfig,
    config: &DriverConfig,
) -> Vec<BatchOutcome>
where
    S: FrameSource,
    P: ImageProcessor,
{
    jobs.into_iter()
        .map(|job| run_job(job, tracker_config, config))
        .collect()
}

/// Process videos on the rayon pool. Each video gets its own driver and
/// tracker, so outcomes match [`process_batch`] and keep the input order.
pub fn process_batch_parallel<S, P>(
    jobs: Vec<BatchJob<S, P>>,
    tracker_config: &TrackerConfig,
    config: &DriverConfig,
) -> Vec<BatchOutcome>
where
    S: FrameSource + Send,
    P: ImageProcessor + Send,
{
    jobs.into_par_iter()
        .map(|job| run_job(job, tracker_config, config))
        .collect()
}
