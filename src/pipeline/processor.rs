//! Per-pixel image stages, treated by the driver as black boxes.

use std::collections::BTreeMap;

use image::imageops::{self, FilterType};
use image::{GrayImage, ImageBuffer, Luma, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::region_labelling::{Connectivity, connected_components};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, TrackerError};
use crate::tracker::{Rect, RegionProps};

/// Connected-component labels, 0 is background.
pub type LabelImage = ImageBuffer<Luma<u32>, Vec<u32>>;

/// Trait for the image-processing stages the driver calls.
///
/// Every method is a pure transform. `separate_foreground` is the only
/// windowed stage: it receives the whole buffer snapshot, oldest first, and
/// returns one foreground image per input in the same order.
pub trait ImageProcessor {
    fn grayscale(&self, image: &RgbImage) -> GrayImage;

    fn crop(&self, image: &GrayImage) -> Result<GrayImage>;

    fn resize(&self, image: &GrayImage) -> GrayImage;

    fn separate_foreground(&self, window: &[&GrayImage]) -> Result<Vec<GrayImage>>;

    fn smooth(&self, image: &GrayImage) -> GrayImage;

    fn threshold(&self, image: &GrayImage) -> GrayImage;

    fn morphological_open(&self, image: &GrayImage) -> GrayImage;

    fn label_components(&self, image: &GrayImage) -> LabelImage;

    /// Descriptors of each labelled region, in label order.
    fn region_properties(&self, labels: &LabelImage) -> Vec<RegionProps>;
}

/// Rectangle of the raw frame to keep, in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CropRegion {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Parameters of the [`StandardProcessor`] stages.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProcessorConfig {
    /// Region around the roost opening; `None` keeps the full frame
    pub crop: Option<CropRegion>,
    /// Output (width, height) after cropping; `None` keeps the cropped size
    pub resize: Option<(u32, u32)>,
    /// Gaussian sigma of the smoothing stage, 0 disables it
    pub blur_sigma: f32,
    /// Foreground values at or below this are zeroed
    pub threshold: u8,
    /// Radius of the square opening element (1 => 3x3)
    pub opening_radius: u8,
    /// 4-connectivity when true, 8-connectivity otherwise
    pub four_connected: bool,
    /// Regions smaller than this many pixels are dropped
    pub min_area: u32,
    /// Foreground is darker than the background (birds against sky)
    pub darker_foreground: bool,
}

impl Default for ProcessorConfig {
    fn default() -> Self {
        Self {
            crop: None,
            resize: None,
            blur_sigma: 1.0,
            threshold: 15,
            opening_radius: 1,
            four_connected: true,
            min_area: 1,
            darker_foreground: true,
        }
    }
}

/// Default stages built on `image` and `imageproc`.
///
/// Background separation takes the per-pixel temporal median of the window
/// as the background estimate.
#[derive(Debug, Clone, Default)]
pub struct StandardProcessor {
    config: ProcessorConfig,
}

impl StandardProcessor {
    pub fn new(config: ProcessorConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &ProcessorConfig {
        &self.config
    }
}

impl ImageProcessor for StandardProcessor {
    fn grayscale(&self, image: &RgbImage) -> GrayImage {
        imageops::grayscale(image)
    }

    fn crop(&self, image: &GrayImage) -> Result<GrayImage> {
        let Some(region) = self.config.crop else {
            return Ok(image.clone());
        };
        let (width, height) = image.dimensions();
        let fits = region.x.checked_add(region.width).is_some_and(|right| right <= width)
            && region.y.checked_add(region.height).is_some_and(|bottom| bottom <= height);
        if !fits || region.width == 0 || region.height == 0 {
            return Err(TrackerError::processing(format!(
                "crop {region:?} does not fit a {width}x{height} frame"
            )));
        }
        Ok(imageops::crop_imm(image, region.x, region.y, region.width, region.height).to_image())
    }

    fn resize(&self, image: &GrayImage) -> GrayImage {
        match self.config.resize {
            Some((width, height)) if (width, height) != image.dimensions() => {
                imageops::resize(image, width, height, FilterType::Triangle)
            }
            _ => image.clone(),
        }
    }

    fn separate_foreground(&self, window: &[&GrayImage]) -> Result<Vec<GrayImage>> {
        let Some(first) = window.first() else {
            return Err(TrackerError::processing("foreground separation needs at least one frame"));
        };
        let (width, height) = first.dimensions();
        if window.iter().any(|image| image.dimensions() != (width, height)) {
            return Err(TrackerError::processing("frames in the window differ in size"));
        }

        let mut values = vec![0u8; window.len()];
        let middle = window.len() / 2;
        let background = GrayImage::from_fn(width, height, |x, y| {
            for (value, image) in values.iter_mut().zip(window) {
                *value = image.get_pixel(x, y).0[0];
            }
            let (_, median, _) = values.select_nth_unstable(middle);
            Luma([*median])
        });

        let darker = self.config.darker_foreground;
        Ok(window
            .iter()
            .map(|image| {
                GrayImage::from_fn(width, height, |x, y| {
                    let bg = background.get_pixel(x, y).0[0];
                    let px = image.get_pixel(x, y).0[0];
                    Luma([if darker { bg.saturating_sub(px) } else { bg.abs_diff(px) }])
                })
            })
            .collect())
    }

    fn smooth(&self, image: &GrayImage) -> GrayImage {
        if self.config.blur_sigma > 0.0 {
            imageops::blur(image, self.config.blur_sigma)
        } else {
            image.clone()
        }
    }

    fn threshold(&self, image: &GrayImage) -> GrayImage {
        threshold_to_zero(image, self.config.threshold)
    }

    fn morphological_open(&self, image: &GrayImage) -> GrayImage {
        if self.config.opening_radius == 0 {
            return image.clone();
        }
        imageproc::morphology::open(image, Norm::LInf, self.config.opening_radius)
    }

    fn label_components(&self, image: &GrayImage) -> LabelImage {
        let connectivity = if self.config.four_connected {
            Connectivity::Four
        } else {
            Connectivity::Eight
        };
        label_foreground(image, connectivity)
    }

    fn region_properties(&self, labels: &LabelImage) -> Vec<RegionProps> {
        region_properties(labels, self.config.min_area)
    }
}

/// Zero every pixel at or below `value`, keep the rest.
pub fn threshold_to_zero(image: &GrayImage, value: u8) -> GrayImage {
    let mut out = image.clone();
    for pixel in out.pixels_mut() {
        if pixel.0[0] <= value {
            pixel.0[0] = 0;
        }
    }
    out
}

/// Label non-zero pixels; intensity differences inside a blob are ignored.
pub fn label_foreground(image: &GrayImage, connectivity: Connectivity) -> LabelImage {
    let mut binary = image.clone();
    for pixel in binary.pixels_mut() {
        if pixel.0[0] > 0 {
            pixel.0[0] = 255;
        }
    }
    connected_components(&binary, connectivity, Luma([0u8]))
}

#[derive(Debug, Clone, Copy)]
struct RegionAccumulator {
    area: u32,
    sum_x: f64,
    sum_y: f64,
    min_x: u32,
    min_y: u32,
    max_x: u32,
    max_y: u32,
}

/// Area, centroid and bounding box of each label, ascending by label.
pub fn region_properties(labels: &LabelImage, min_area: u32) -> Vec<RegionProps> {
    let mut regions: BTreeMap<u32, RegionAccumulator> = BTreeMap::new();
    for (x, y, pixel) in labels.enumerate_pixels() {
        let label = pixel.0[0];
        if label == 0 {
            continue;
        }
        let acc = regions.entry(label).or_insert(RegionAccumulator {
            area: 0,
            sum_x: 0.0,
            sum_y: 0.0,
            min_x: x,
            min_y: y,
            max_x: x,
            max_y: y,
        });
        acc.area += 1;
        acc.sum_x += x as f64;
        acc.sum_y += y as f64;
        acc.min_x = acc.min_x.min(x);
        acc.min_y = acc.min_y.min(y);
        acc.max_x = acc.max_x.max(x);
        acc.max_y = acc.max_y.max(y);
    }

    regions
        .into_iter()
        .filter(|(_, acc)| acc.area >= min_area)
        .map(|(label, acc)| {
            let area = acc.area as f64;
            RegionProps::new(
                label,
                acc.area,
                Point2::new(acc.sum_x / area, acc.sum_y / area),
                Rect::from_tlbr(
                    acc.min_x as f64,
                    acc.min_y as f64,
                    acc.max_x as f64 + 1.0,
                    acc.max_y as f64 + 1.0,
                ),
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    fn sky_with_bird(x0: u32, y0: u32) -> RgbImage {
        RgbImage::from_fn(24, 24, |x, y| {
            let inside = (x0..x0 + 5).contains(&x) && (y0..y0 + 5).contains(&y);
            if inside { Rgb([0, 0, 0]) } else { Rgb([255, 255, 255]) }
        })
    }

    #[test]
    fn test_region_properties() {
        let mut labels = LabelImage::new(6, 4);
        for (x, y) in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            labels.put_pixel(x, y, Luma([1]));
        }
        labels.put_pixel(5, 3, Luma([2]));

        let regions = region_properties(&labels, 1);
        assert_eq!(regions.len(), 2);
        assert_eq!(regions[0].label, 1);
        assert_eq!(regions[0].area, 4);
        assert_eq!(regions[0].centroid, Point2::new(0.5, 0.5));
        assert_eq!(regions[0].bbox, Rect::new(0.0, 0.0, 2.0, 2.0));
        assert_eq!(regions[1].centroid, Point2::new(5.0, 3.0));

        let filtered = region_properties(&labels, 2);
        assert_eq!(filtered.len(), 1);
        assert_eq!(filtered[0].label, 1);
    }

    #[test]
    fn test_threshold_to_zero() {
        let image = GrayImage::from_raw(4, 1, vec![0, 15, 16, 200]).unwrap();
        let out = threshold_to_zero(&image, 15);
        assert_eq!(out.into_raw(), vec![0, 0, 16, 200]);
    }

    #[test]
    fn test_median_background_isolates_moving_blob() {
        let processor = StandardProcessor::default();
        let frames: Vec<GrayImage> = (0..5)
            .map(|i| processor.grayscale(&sky_with_bird(4 + 4 * i, 8)))
            .collect();
        let window: Vec<&GrayImage> = frames.iter().collect();

        let foreground = processor.separate_foreground(&window).unwrap();
        assert_eq!(foreground.len(), 5);
        assert_eq!(foreground[0].get_pixel(6, 10).0[0], 255);
        assert_eq!(foreground[0].get_pixel(20, 20).0[0], 0);
        assert_eq!(foreground[0].get_pixel(16, 10).0[0], 0);
    }

    #[test]
    fn test_full_stage_chain_finds_one_region() {
        let processor = StandardProcessor::default();
        let frames: Vec<GrayImage> = (0..5)
            .map(|i| processor.grayscale(&sky_with_bird(4 + 4 * i, 8)))
            .collect();
        let window: Vec<&GrayImage> = frames.iter().collect();
        let foreground = processor.separate_foreground(&window).unwrap();

        let smoothed = processor.smooth(&foreground[0]);
        let thresholded = processor.threshold(&smoothed);
        let opened = processor.morphological_open(&thresholded);
        let labels = processor.label_components(&opened);
        let regions = processor.region_properties(&labels);

        assert_eq!(regions.len(), 1);
        assert!((regions[0].centroid.x - 6.0).abs() < 0.5);
        assert!((regions[0].centroid.y - 10.0).abs() < 0.5);
    }

    #[test]
    fn test_crop_and_resize() {
        let processor = StandardProcessor::new(ProcessorConfig {
            crop: Some(CropRegion {
                x: 4,
                y: 2,
                width: 10,
                height: 8,
            }),
            resize: Some((5, 4)),
            ..ProcessorConfig::default()
        });
        let gray = processor.grayscale(&sky_with_bird(0, 0));

        let cropped = processor.crop(&gray).unwrap();
        assert_eq!(cropped.dimensions(), (10, 8));
        assert_eq!(processor.resize(&cropped).dimensions(), (5, 4));

        let small = GrayImage::new(8, 8);
        assert!(matches!(
            processor.crop(&small),
            Err(TrackerError::Processing(_))
        ));
    }

    #[test]
    fn test_mismatched_window_is_rejected() {
        let processor = StandardProcessor::default();
        let a = GrayImage::new(4, 4);
        let b = GrayImage::new(5, 4);
        assert!(processor.separate_foreground(&[&a, &b]).is_err());
        assert!(processor.separate_foreground(&[]).is_err());
    }
}
