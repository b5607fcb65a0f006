use std::collections::VecDeque;
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

use image::{GrayImage, Rgb, RgbImage};
use imageproc::region_labelling::Connectivity;

use roost_count::pipeline::{LabelImage, label_foreground, region_properties, threshold_to_zero};
use roost_count::{
    AlgorithmDriver, BatchJob, Boundary, Direction, DriverConfig, FrameSource, ImageProcessor,
    RawFrame, Rect, RegionProps, RoiMask, SourceReadError, TrackerConfig, TrackerError,
    process_batch, process_batch_parallel,
};

const WIDTH: u32 = 200;
const HEIGHT: u32 = 150;

/// Frames are either an image or a decode failure.
struct ScriptedSource {
    id: String,
    script: VecDeque<Option<RgbImage>>,
    total: u64,
    next: u64,
}

impl ScriptedSource {
    fn new(id: &str, script: Vec<Option<RgbImage>>) -> Self {
        Self {
            id: id.to_string(),
            total: script.len() as u64,
            script: script.into(),
            next: 0,
        }
    }
}

impl FrameSource for ScriptedSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn total_frame_count(&self) -> Option<u64> {
        Some(self.total)
    }

    fn read_next_frame(&mut self) -> Result<Option<RawFrame>, SourceReadError> {
        let Some(entry) = self.script.pop_front() else {
            return Ok(None);
        };
        let sequence_number = self.next;
        self.next += 1;
        match entry {
            Some(image) => Ok(Some(RawFrame {
                sequence_number,
                image,
            })),
            None => Err(SourceReadError::Decode {
                frame: sequence_number,
                reason: "corrupt packet".to_string(),
            }),
        }
    }
}

/// Treats anything bright as a bird; the background is already black.
struct BrightBlobProcessor;

impl ImageProcessor for BrightBlobProcessor {
    fn grayscale(&self, image: &RgbImage) -> GrayImage {
        image::imageops::grayscale(image)
    }

    fn crop(&self, image: &GrayImage) -> roost_count::Result<GrayImage> {
        Ok(image.clone())
    }

    fn resize(&self, image: &GrayImage) -> GrayImage {
        image.clone()
    }

    fn separate_foreground(&self, window: &[&GrayImage]) -> roost_count::Result<Vec<GrayImage>> {
        Ok(window.iter().map(|image| (*image).clone()).collect())
    }

    fn smooth(&self, image: &GrayImage) -> GrayImage {
        image.clone()
    }

    fn threshold(&self, image: &GrayImage) -> GrayImage {
        threshold_to_zero(image, 128)
    }

    fn morphological_open(&self, image: &GrayImage) -> GrayImage {
        image.clone()
    }

    fn label_components(&self, image: &GrayImage) -> LabelImage {
        label_foreground(image, Connectivity::Eight)
    }

    fn region_properties(&self, labels: &LabelImage) -> Vec<RegionProps> {
        region_properties(labels, 1)
    }
}

fn roost() -> RoiMask {
    RoiMask::from_rect(
        WIDTH as usize,
        HEIGHT as usize,
        Rect::new(80.0, 100.0, 40.0, 20.0),
        3,
    )
}

fn sky() -> RgbImage {
    RgbImage::new(WIDTH, HEIGHT)
}

/// A 5x5 white bird centred on (cx, cy).
fn bird_at(cx: u32, cy: u32) -> RgbImage {
    let mut image = sky();
    for y in cy - 2..=cy + 2 {
        for x in cx - 2..=cx + 2 {
            image.put_pixel(x, y, Rgb([255, 255, 255]));
        }
    }
    image
}

/// A bird dropping from y=40 into the opening, then six empty frames.
fn roosting_video() -> Vec<Option<RgbImage>> {
    let mut frames: Vec<Option<RgbImage>> = (0..9).map(|i| Some(bird_at(100, 40 + 8 * i))).collect();
    frames.extend((0..6).map(|_| Some(sky())));
    frames
}

fn driver(config: DriverConfig) -> AlgorithmDriver<BrightBlobProcessor> {
    AlgorithmDriver::new(BrightBlobProcessor, roost(), TrackerConfig::default(), config).unwrap()
}

#[test]
fn test_bird_entering_roost_end_to_end() {
    let mut source = ScriptedSource::new("roost-entry", roosting_video());
    let report = driver(DriverConfig {
        buffer_capacity: 5,
        ..DriverConfig::default()
    })
    .run(&mut source)
    .unwrap();

    assert_eq!(report.source_id, "roost-entry");
    assert_eq!(report.frames_read, 15);
    assert_eq!(report.frames_processed, 15);
    assert_eq!(report.frames_skipped, 0);
    assert_eq!(report.events.len(), 1);

    let event = &report.events[0];
    assert_eq!(event.direction, Direction::Disappeared);
    assert_eq!(event.boundary, Boundary::RegionOfInterest);
    assert_eq!(event.frame_number, 8);
    assert_eq!(event.track_length, 9);
    assert!((event.centroid.x - 100.0).abs() < 1e-9);
    assert!((event.centroid.y - 104.0).abs() < 1e-9);
}

#[test]
fn test_video_shorter_than_buffer() {
    let frames = (0..3).map(|_| Some(bird_at(100, 110))).collect();
    let mut source = ScriptedSource::new("short", frames);
    let report = driver(DriverConfig::default()).run(&mut source).unwrap();

    assert_eq!(report.frames_processed, 3);
    assert_eq!(report.events.len(), 2);
    assert!(report.events[0].is_roost_exit());
    assert!(report.events[1].is_roost_entry());
    assert_eq!(report.events[0].track_id, report.events[1].track_id);
    assert_eq!(report.events[1].track_length, 3);
}

#[test]
fn test_consecutive_failures_abort() {
    let mut script: Vec<Option<RgbImage>> = vec![None; 12];
    script.push(Some(sky()));
    let mut source = ScriptedSource::new("broken", script);

    let err = driver(DriverConfig::default()).run(&mut source).unwrap_err();
    match err {
        TrackerError::SourceAborted {
            source_id,
            failures,
            frames_read,
        } => {
            assert_eq!(source_id, "broken");
            assert_eq!(failures, 10);
            assert_eq!(frames_read, 10);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_isolated_failures_are_skipped() {
    let mut script = roosting_video();
    script[2] = None;
    script[5] = None;
    script[11] = None;
    let mut source = ScriptedSource::new("flaky", script);

    let report = driver(DriverConfig {
        buffer_capacity: 5,
        failure_threshold: 2,
        ..DriverConfig::default()
    })
    .run(&mut source)
    .unwrap();

    assert_eq!(report.frames_read, 15);
    assert_eq!(report.frames_skipped, 3);
    assert_eq!(report.frames_processed, 12);
    assert_eq!(report.events.len(), 1);
    assert!(report.events[0].is_roost_entry());
}

#[test]
fn test_odd_sized_frame_is_skipped() {
    let mut script = roosting_video();
    script[4] = Some(RgbImage::new(50, 50));
    let mut source = ScriptedSource::new("odd-size", script);

    let report = driver(DriverConfig {
        buffer_capacity: 5,
        ..DriverConfig::default()
    })
    .run(&mut source)
    .unwrap();

    assert_eq!(report.frames_read, 15);
    assert_eq!(report.frames_skipped, 1);
    assert_eq!(report.frames_processed, 14);
    assert_eq!(report.events.len(), 1);
    assert!(report.events[0].is_roost_entry());
    assert_eq!(report.events[0].track_length, 8);
}

#[test]
fn test_cancelled_run_returns_no_report() {
    let flag = Arc::new(AtomicBool::new(true));
    let mut source = ScriptedSource::new("cancelled", roosting_video());

    let result = driver(DriverConfig::default())
        .with_cancel_flag(flag)
        .run(&mut source);
    assert!(matches!(result, Err(TrackerError::Cancelled { .. })));
}

#[test]
fn test_invalid_config_rejected() {
    let result = AlgorithmDriver::new(
        BrightBlobProcessor,
        roost(),
        TrackerConfig::default(),
        DriverConfig {
            buffer_capacity: 0,
            ..DriverConfig::default()
        },
    );
    assert!(matches!(result, Err(TrackerError::Config(_))));
}

fn batch() -> Vec<BatchJob<ScriptedSource, BrightBlobProcessor>> {
    vec![
        BatchJob::new(
            ScriptedSource::new("good", roosting_video()),
            BrightBlobProcessor,
            roost(),
        ),
        BatchJob::new(
            ScriptedSource::new("bad", vec![None; 15]),
            BrightBlobProcessor,
            roost(),
        ),
        BatchJob::new(
            ScriptedSource::new("also-good", roosting_video()),
            BrightBlobProcessor,
            roost(),
        ),
    ]
}

#[test]
fn test_batch_continues_past_failed_video() {
    let config = DriverConfig {
        buffer_capacity: 5,
        ..DriverConfig::default()
    };
    let outcomes = process_batch(batch(), &TrackerConfig::default(), &config);

    assert_eq!(outcomes.len(), 3);
    assert!(outcomes[0].is_complete());
    assert!(!outcomes[1].is_complete());
    assert!(outcomes[2].is_complete());
    assert_eq!(outcomes[2].report().unwrap().events.len(), 1);
}

#[test]
fn test_parallel_batch_matches_sequential() {
    let config = DriverConfig {
        buffer_capacity: 5,
        ..DriverConfig::default()
    };
    let sequential = process_batch(batch(), &TrackerConfig::default(), &config);
    let parallel = process_batch_parallel(batch(), &TrackerConfig::default(), &config);

    for (a, b) in sequential.iter().zip(&parallel) {
        assert_eq!(a.source_id, b.source_id);
        assert_eq!(a.is_complete(), b.is_complete());
        if let (Some(a), Some(b)) = (a.report(), b.report()) {
            assert_eq!(a.events, b.events);
        }
    }
}
