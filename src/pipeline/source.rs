//! Frame sources feeding the driver.

use std::path::{Path, PathBuf};

use image::RgbImage;
use log::debug;

use crate::error::SourceReadError;

/// One decoded frame as handed over by a source.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub sequence_number: u64,
    pub image: RgbImage,
}

/// Trait for anything that yields video frames in order.
///
/// A failed read must still consume that frame's slot so the next call moves
/// on; the driver relies on this to make progress past corrupt frames.
///
/// # Example
///
/// ```ignore
/// use roost_count::{FrameSource, RawFrame, SourceReadError};
///
/// struct Camera { /* ... */ }
///
/// impl FrameSource for Camera {
///     fn id(&self) -> &str { "camera-0" }
///     fn total_frame_count(&self) -> Option<u64> { None }
///     fn read_next_frame(&mut self) -> Result<Option<RawFrame>, SourceReadError> {
///         Ok(None)
///     }
/// }
/// ```
pub trait FrameSource {
    /// Identifier used in logs and reports.
    fn id(&self) -> &str;

    /// Number of frames the source will yield, if known up front.
    fn total_frame_count(&self) -> Option<u64>;

    /// Frames per second; the driver falls back to its configured rate.
    fn frame_rate(&self) -> Option<f64> {
        None
    }

    /// Read the next frame, `Ok(None)` once the source is exhausted.
    fn read_next_frame(&mut self) -> Result<Option<RawFrame>, SourceReadError>;
}

const IMAGE_EXTENSIONS: [&str; 6] = ["png", "jpg", "jpeg", "bmp", "tif", "tiff"];

/// Frames previously extracted to image files, one file per frame.
///
/// Files are taken from `dir` and its immediate subdirectories (frames are
/// commonly grouped into per-minute folders), sorted by file name, and numbered
/// from `first_frame`.
#[derive(Debug)]
pub struct ImageSequenceSource {
    id: String,
    paths: Vec<PathBuf>,
    cursor: usize,
    first_frame: u64,
    frame_rate: Option<f64>,
}

impl ImageSequenceSource {
    pub fn open<P: AsRef<Path>>(dir: P) -> Result<Self, SourceReadError> {
        let dir = dir.as_ref();
        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.is_dir() {
                for nested in std::fs::read_dir(&path)? {
                    let nested = nested?.path();
                    if is_image(&nested) {
                        paths.push(nested);
                    }
                }
            } else if is_image(&path) {
                paths.push(path);
            }
        }
        paths.sort_by(|a, b| a.file_name().cmp(&b.file_name()));
        debug!("{}: found {} frame files", dir.display(), paths.len());

        Ok(Self {
            id: dir
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| dir.display().to_string()),
            paths,
            cursor: 0,
            first_frame: 1,
            frame_rate: None,
        })
    }

    /// Number frames starting at `first_frame` instead of 1.
    pub fn with_first_frame(mut self, first_frame: u64) -> Self {
        self.first_frame = first_frame;
        self
    }

    pub fn with_frame_rate(mut self, frame_rate: f64) -> Self {
        self.frame_rate = Some(frame_rate);
        self
    }

    /// Restrict to the files at positions `start..=end` of the sorted list.
    pub fn with_range(mut self, start: usize, end: usize) -> Self {
        let end = end.min(self.paths.len().saturating_sub(1));
        self.paths = if start <= end && start < self.paths.len() {
            self.paths.drain(start..=end).collect()
        } else {
            Vec::new()
        };
        self
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }
}

fn is_image(path: &Path) -> bool {
    path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl FrameSource for ImageSequenceSource {
    fn id(&self) -> &str {
        &self.id
    }

    fn total_frame_count(&self) -> Option<u64> {
        Some(self.paths.len() as u64)
    }

    fn frame_rate(&self) -> Option<f64> {
        self.frame_rate
    }

    fn read_next_frame(&mut self) -> Result<Option<RawFrame>, SourceReadError> {
        let Some(path) = self.paths.get(self.cursor) else {
            return Ok(None);
        };
        let sequence_number = self.first_frame + self.cursor as u64;
        self.cursor += 1;

        let image = image::open(path)?.to_rgb8();
        Ok(Some(RawFrame {
            sequence_number,
            image,
        }))
    }
}
