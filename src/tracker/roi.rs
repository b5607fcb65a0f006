//! Region-of-interest mask marking the roost opening.

use image::GrayImage;
use nalgebra::Point2;
use ndarray::Array2;

use crate::tracker::event::Boundary;
use crate::tracker::rect::Rect;

/// Boolean mask over the processed frame, indexed `[row, col]`.
///
/// Also carries a dilated copy of the mask so the cost function can tell
/// whether a candidate lies near the opening without rescanning.
#[derive(Debug, Clone)]
pub struct RoiMask {
    mask: Array2<bool>,
    near: Array2<bool>,
    proximity: usize,
}

impl RoiMask {
    /// Wrap `mask`, treating pixels within `proximity` (Chebyshev distance)
    /// of the mask as near it.
    pub fn new(mask: Array2<bool>, proximity: usize) -> Self {
        let near = dilate(&mask, proximity);
        Self {
            mask,
            near,
            proximity,
        }
    }

    /// Mask of `width` x `height` pixels whose centres fall inside `region`.
    pub fn from_rect(width: usize, height: usize, region: Rect, proximity: usize) -> Self {
        let mask = Array2::from_shape_fn((height, width), |(row, col)| {
            region.contains(&Point2::new(col as f64, row as f64))
        });
        Self::new(mask, proximity)
    }

    /// Mask from an image: every non-zero pixel is inside.
    pub fn from_image(image: &GrayImage, proximity: usize) -> Self {
        let (width, height) = image.dimensions();
        let mask = Array2::from_shape_fn((height as usize, width as usize), |(row, col)| {
            image.get_pixel(col as u32, row as u32).0[0] > 0
        });
        Self::new(mask, proximity)
    }

    /// A frame with no opening at all; only edge events are possible.
    pub fn empty(width: usize, height: usize) -> Self {
        Self::new(Array2::from_elem((height, width), false), 0)
    }

    pub fn width(&self) -> usize {
        self.mask.ncols()
    }

    pub fn height(&self) -> usize {
        self.mask.nrows()
    }

    pub fn proximity(&self) -> usize {
        self.proximity
    }

    pub fn mask(&self) -> &Array2<bool> {
        &self.mask
    }

    fn pixel(&self, point: &Point2<f64>) -> Option<[usize; 2]> {
        let col = point.x.round();
        let row = point.y.round();
        if !(col >= 0.0 && row >= 0.0) {
            return None;
        }
        let (col, row) = (col as usize, row as usize);
        (col < self.width() && row < self.height()).then_some([row, col])
    }

    pub fn contains(&self, point: &Point2<f64>) -> bool {
        self.pixel(point).is_some_and(|idx| self.mask[idx])
    }

    pub fn is_near(&self, point: &Point2<f64>) -> bool {
        self.pixel(point).is_some_and(|idx| self.near[idx])
    }

    /// Whether `point` is within `margin` pixels of the frame border, or
    /// outside the frame altogether.
    pub fn is_at_edge(&self, point: &Point2<f64>, margin: f64) -> bool {
        let max_x = self.width() as f64 - 1.0;
        let max_y = self.height() as f64 - 1.0;
        point.x < margin || point.y < margin || point.x > max_x - margin || point.y > max_y - margin
    }

    /// The mask wins over the edge when both apply.
    pub fn classify(&self, point: &Point2<f64>, edge_margin: f64) -> Boundary {
        if self.contains(point) {
            Boundary::RegionOfInterest
        } else if self.is_at_edge(point, edge_margin) {
            Boundary::FrameEdge
        } else {
            Boundary::Ambiguous
        }
    }
}

fn dilate(mask: &Array2<bool>, radius: usize) -> Array2<bool> {
    if radius == 0 {
        return mask.clone();
    }
    let (rows, cols) = mask.dim();
    let mut near = mask.clone();
    for ((row, col), &inside) in mask.indexed_iter() {
        if !inside {
            continue;
        }
        for r in row.saturating_sub(radius)..=(row + radius).min(rows - 1) {
            for c in col.saturating_sub(radius)..=(col + radius).min(cols - 1) {
                near[[r, c]] = true;
            }
        }
    }
    near
}
