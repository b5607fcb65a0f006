//! Cost matrix formulation and track-to-segment assignment.

use log::debug;
use nalgebra::Point2;
use ndarray::Array2;

use crate::error::{Result, TrackerError};
use crate::tracker::roi::RoiMask;
use crate::tracker::segment_tracker::TrackerConfig;

/// Cost used for cells the solver must never pick.
pub const FORBIDDEN_COST: f64 = 1.0e6;

/// Cost of continuing a track at `from` with a segment at `to`.
///
/// Plain Euclidean distance in open sky; candidates near the opening are
/// scaled by `roi_cost_multiplier` since birds diving in or climbing out
/// move differently from birds crossing the frame.
pub fn segment_cost(
    from: &Point2<f64>,
    to: &Point2<f64>,
    roi: &RoiMask,
    config: &TrackerConfig,
) -> f64 {
    let distance = nalgebra::distance(from, to);
    if roi.is_near(to) {
        distance * config.roi_cost_multiplier
    } else {
        distance
    }
}

/// Rows are track positions, columns are candidate segment positions.
pub fn cost_matrix(
    tracks: &[Point2<f64>],
    candidates: &[Point2<f64>],
    roi: &RoiMask,
    config: &TrackerConfig,
) -> Array2<f64> {
    Array2::from_shape_fn((tracks.len(), candidates.len()), |(i, j)| {
        segment_cost(&tracks[i], &candidates[j], roi, config)
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    /// (track row, segment column) pairs
    pub matches: Vec<(usize, usize)>,
    pub unmatched_tracks: Vec<usize>,
    pub unmatched_segments: Vec<usize>,
    /// Matched costs plus one no-match placeholder per unmatched row and column
    pub total_cost: f64,
}

impl AssignmentResult {
    /// Nothing matched: every row and column is left over.
    pub fn unmatched(rows: usize, cols: usize, no_match_cost: f64) -> Self {
        Self {
            matches: Vec::new(),
            unmatched_tracks: (0..rows).collect(),
            unmatched_segments: (0..cols).collect(),
            total_cost: (rows + cols) as f64 * no_match_cost,
        }
    }
}

/// Minimum-cost partial matching over `cost_matrix`.
///
/// The matrix is augmented to `(rows + cols)` square with a no-match
/// placeholder for each row and each column, so the solver may leave any
/// track or segment unpaired when that is cheaper. Non-finite costs make
/// the problem infeasible.
pub fn solve(cost_matrix: &Array2<f64>, no_match_cost: f64) -> Result<AssignmentResult> {
    let (num_rows, num_cols) = cost_matrix.dim();

    if let Some(bad) = cost_matrix.iter().find(|c| !c.is_finite()) {
        return Err(TrackerError::AssignmentInfeasible(format!(
            "cost matrix contains {bad}"
        )));
    }
    if !no_match_cost.is_finite() || no_match_cost < 0.0 {
        return Err(TrackerError::AssignmentInfeasible(format!(
            "no-match cost {no_match_cost} is not a finite non-negative number"
        )));
    }

    if num_rows == 0 || num_cols == 0 {
        return Ok(AssignmentResult::unmatched(num_rows, num_cols, no_match_cost));
    }

    let size = num_rows + num_cols;
    let mut padded = Array2::<f64>::from_elem((size, size), FORBIDDEN_COST);

    for i in 0..num_rows {
        for j in 0..num_cols {
            padded[[i, j]] = cost_matrix[[i, j]].min(FORBIDDEN_COST);
        }
        padded[[i, num_cols + i]] = no_match_cost;
    }
    for j in 0..num_cols {
        padded[[num_rows + j, j]] = no_match_cost;
    }
    for i in num_rows..size {
        for j in num_cols..size {
            padded[[i, j]] = 0.0;
        }
    }

    let (row_to_col, _) = lapjv::lapjv(&padded).map_err(|_| {
        TrackerError::AssignmentInfeasible(format!("no solution for {num_rows}x{num_cols} matrix"))
    })?;

    let mut matches = vec![];
    let mut unmatched_tracks = vec![];
    let mut unmatched_segments_mask: Vec<bool> = vec![true; num_cols];
    let mut total_cost = 0.0;

    for (row_idx, &col_idx) in row_to_col.iter().take(num_rows).enumerate() {
        if col_idx < num_cols && cost_matrix[[row_idx, col_idx]] < FORBIDDEN_COST {
            matches.push((row_idx, col_idx));
            unmatched_segments_mask[col_idx] = false;
            total_cost += cost_matrix[[row_idx, col_idx]];
        } else {
            unmatched_tracks.push(row_idx);
            total_cost += no_match_cost;
        }
    }

    let unmatched_segments: Vec<usize> = unmatched_segments_mask
        .iter()
        .enumerate()
        .filter_map(|(j, &u)| if u { Some(j) } else { None })
        .collect();
    total_cost += unmatched_segments.len() as f64 * no_match_cost;

    Ok(AssignmentResult {
        matches,
        unmatched_tracks,
        unmatched_segments,
        total_cost,
    })
}

/// Drop solver matches whose cost exceeds `rejection_threshold`.
///
/// The solver only knows numeric optimality; a pairing can be the cheapest
/// available and still be too far apart to be the same bird.
pub fn interpret(
    assignment: AssignmentResult,
    cost_matrix: &Array2<f64>,
    rejection_threshold: f64,
) -> AssignmentResult {
    let AssignmentResult {
        matches,
        mut unmatched_tracks,
        mut unmatched_segments,
        total_cost,
    } = assignment;

    let mut accepted = Vec::with_capacity(matches.len());
    for (row, col) in matches {
        let cost = cost_matrix[[row, col]];
        if cost <= rejection_threshold {
            accepted.push((row, col));
        } else {
            debug!("rejecting match track row {row} -> segment {col} at cost {cost:.2}");
            unmatched_tracks.push(row);
            unmatched_segments.push(col);
        }
    }
    unmatched_tracks.sort_unstable();
    unmatched_segments.sort_unstable();

    AssignmentResult {
        matches: accepted,
        unmatched_tracks,
        unmatched_segments,
        total_cost,
    }
}
