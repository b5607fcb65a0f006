mod batch;
mod buffer;
mod driver;
mod frame;
mod processor;
mod report;
mod source;

pub use batch::{BatchJob, BatchOutcome, process_batch, process_batch_parallel};
pub use buffer::FrameBuffer;
pub use driver::{AlgorithmDriver, DriverConfig, Phase, RunReport};
pub use frame::{Frame, Stage, format_timestamp, timestamp_for};
pub use processor::{
    CropRegion, ImageProcessor, LabelImage, ProcessorConfig, StandardProcessor, label_foreground,
    region_properties, threshold_to_zero,
};
pub use report::{EventSink, EventSummary, publish_completed};
pub use source::{FrameSource, ImageSequenceSource, RawFrame};
