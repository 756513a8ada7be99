//! Cross-rotation bookkeeping: per-cell best scores and acceptance votes.

use crate::metrics::MetricScores;
use crate::{FitError, Metric, PerMetric};
use map_fitter_core::{GridIndex, GridSize, RasterGeometry, RasterMap};
use nalgebra::Vector2;

/// Best hypothesis seen so far in one accumulator cell for one metric.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellBest {
    /// Raw (unscaled) metric value.
    pub score: f64,
    pub rotation_deg: f64,
    /// Position of the rotation in the sweep.
    pub rotation_step: usize,
    /// Fine reference cell the candidate was anchored on.
    pub reference_index: GridIndex,
}

impl CellBest {
    /// Whether `self` replaces `incumbent` under `metric`.
    ///
    /// Strictly better scores win; equal scores fall back to the earlier
    /// (rotation step, reference index). The result depends on the two
    /// values only, so the merge order of candidates never matters.
    pub fn supersedes(&self, incumbent: &CellBest, metric: Metric) -> bool {
        if metric.is_better(self.score, incumbent.score) {
            return true;
        }
        if metric.is_better(incumbent.score, self.score) {
            return false;
        }
        (self.rotation_step, self.reference_index)
            < (incumbent.rotation_step, incumbent.reference_index)
    }
}

/// Coarse raster holding, per cell and metric, the best score over all rotations.
///
/// Coarse cell `(r, c)` covers the fine reference cells
/// `[r * stride, (r + 1) * stride) x [c * stride, (c + 1) * stride)`, so the
/// grid has `ceil(rows / stride) x ceil(cols / stride)` cells and shares its
/// `(0, 0)` corner with the reference map.
#[derive(Clone, Debug)]
pub struct AccumulatorGrid {
    geometry: RasterGeometry,
    stride: usize,
    cells: Vec<PerMetric<Option<CellBest>>>,
}

impl AccumulatorGrid {
    /// Grid covering `reference` at `stride` times its resolution.
    pub fn new(reference: &RasterGeometry, stride: usize) -> Result<Self, FitError> {
        let stride = stride.max(1);
        let size = GridSize::new(
            reference.size.rows.div_ceil(stride),
            reference.size.cols.div_ceil(stride),
        );
        let resolution = reference.resolution * stride as f64;
        let coarse_length = Vector2::new(
            size.rows as f64 * resolution,
            size.cols as f64 * resolution,
        );
        // Shift the center so both grids start at the same corner.
        let center = reference.center + (reference.length() - coarse_length) * 0.5;
        let geometry = RasterGeometry::new(size, resolution, center)?;
        Ok(Self {
            cells: vec![PerMetric::default(); size.len()],
            geometry,
            stride,
        })
    }

    #[inline]
    pub fn geometry(&self) -> &RasterGeometry {
        &self.geometry
    }

    /// Coarse cell containing a logical fine reference index.
    #[inline]
    pub fn coarse_index(&self, reference_index: GridIndex) -> Option<GridIndex> {
        if reference_index.row < 0 || reference_index.col < 0 {
            return None;
        }
        let s = self.stride as i32;
        let index = GridIndex::new(reference_index.row / s, reference_index.col / s);
        self.geometry.size.contains(index).then_some(index)
    }

    /// Cell content at a logical coarse index.
    pub fn cell(&self, index: GridIndex) -> Option<&PerMetric<Option<CellBest>>> {
        self.geometry
            .size
            .linear(index)
            .map(|offset| &self.cells[offset])
    }

    /// Offer `best` for `metric` at the coarse cell of `best.reference_index`.
    ///
    /// Returns `true` when the cell was updated. Indices outside the grid
    /// and non-finite scores are ignored.
    pub fn offer(&mut self, metric: Metric, best: CellBest) -> bool {
        if !best.score.is_finite() {
            return false;
        }
        let Some(offset) = self
            .coarse_index(best.reference_index)
            .and_then(|idx| self.geometry.size.linear(idx))
        else {
            return false;
        };
        let slot = &mut self.cells[offset][metric];
        let replace = match slot {
            None => true,
            Some(incumbent) => best.supersedes(incumbent, metric),
        };
        if replace {
            *slot = Some(best);
        }
        replace
    }

    /// Offer every defined score of one candidate.
    pub fn record(
        &mut self,
        scores: &MetricScores,
        rotation_deg: f64,
        rotation_step: usize,
        reference_index: GridIndex,
    ) {
        for (metric, score) in scores.iter() {
            let Some(score) = *score else {
                continue;
            };
            self.offer(
                metric,
                CellBest {
                    score,
                    rotation_deg,
                    rotation_step,
                    reference_index,
                },
            );
        }
    }

    /// Iterate over `(coarse index, per-metric bests)` in row-major order.
    pub fn cells(&self) -> impl Iterator<Item = (GridIndex, &PerMetric<Option<CellBest>>)> {
        let cols = self.geometry.size.cols;
        self.cells.iter().enumerate().map(move |(i, cell)| {
            (GridIndex::new((i / cols) as i32, (i % cols) as i32), cell)
        })
    }

    /// Export the grid as a raster with display-scaled score layers and
    /// winning-rotation layers; empty cells are NaN.
    pub fn snapshot(&self) -> RasterMap {
        let mut map = RasterMap::new(self.geometry);
        for metric in Metric::ALL {
            let (score_layer, rotation_layer) = metric.layer_names();
            map.add_layer_from_fn(score_layer, |idx| {
                self.cell(idx)
                    .and_then(|c| c[metric])
                    .map_or(f32::NAN, |b| metric.display_value(b.score))
            });
            map.add_layer_from_fn(rotation_layer, |idx| {
                self.cell(idx)
                    .and_then(|c| c[metric])
                    .map_or(f32::NAN, |b| b.rotation_deg as f32)
            });
        }
        map
    }
}

/// Fine-resolution count of rotations that produced a valid match per reference cell.
#[derive(Clone, Debug)]
pub struct VoteGrid {
    size: GridSize,
    counts: Vec<u32>,
}

impl VoteGrid {
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            counts: vec![0; size.len()],
        }
    }

    #[inline]
    pub fn increment(&mut self, index: GridIndex) {
        if let Some(offset) = self.size.linear(index) {
            self.counts[offset] += 1;
        }
    }

    #[inline]
    pub fn count(&self, index: GridIndex) -> u32 {
        self.size.linear(index).map_or(0, |offset| self.counts[offset])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nalgebra::Point2;

    fn reference() -> RasterGeometry {
        RasterGeometry::new(GridSize::new(20, 20), 0.5, Point2::origin()).expect("geometry")
    }

    fn best(score: f64, rotation_step: usize, row: i32) -> CellBest {
        CellBest {
            score,
            rotation_deg: rotation_step as f64 * 90.0,
            rotation_step,
            reference_index: GridIndex::new(row, 0),
        }
    }

    #[test]
    fn coarse_grid_uses_stride_resolution() {
        let acc = AccumulatorGrid::new(&reference(), 5).expect("grid");
        assert_eq!(acc.geometry().size, GridSize::new(4, 4));
        assert_eq!(acc.geometry().resolution, 2.5);
        assert_eq!(acc.geometry().center, Point2::origin());
    }

    #[test]
    fn partial_blocks_get_their_own_cells() {
        let g = RasterGeometry::new(GridSize::new(22, 21), 0.5, Point2::new(1.0, -2.0))
            .expect("geometry");
        let acc = AccumulatorGrid::new(&g, 5).expect("grid");
        assert_eq!(acc.geometry().size, GridSize::new(5, 5));

        // Every strided anchor has a cell, the first one included.
        for anchor in g.size.strided(5) {
            let coarse = acc.coarse_index(anchor).expect("anchor inside coarse grid");
            assert_eq!(coarse, GridIndex::new(anchor.row / 5, anchor.col / 5));
        }
        assert_eq!(acc.coarse_index(GridIndex::new(21, 20)), Some(GridIndex::new(4, 4)));
        assert_eq!(acc.coarse_index(GridIndex::new(25, 0)), None);
        assert_eq!(acc.coarse_index(GridIndex::new(-1, 0)), None);

        // Coarse cell (0, 0) is centered on the middle of fine block (0..5, 0..5).
        let coarse = acc.geometry().position_of(GridIndex::ZERO).expect("inside");
        let fine = g.position_of(GridIndex::new(2, 2)).expect("inside");
        assert!((coarse - fine).norm() < 1e-12, "{coarse} vs {fine}");
    }

    #[test]
    fn reference_smaller_than_stride_has_one_cell() {
        let g = RasterGeometry::new(GridSize::new(2, 2), 1.0, Point2::origin()).expect("g");
        let acc = AccumulatorGrid::new(&g, 5).expect("grid");
        assert_eq!(acc.geometry().size, GridSize::new(1, 1));
        assert_eq!(acc.coarse_index(GridIndex::ZERO), Some(GridIndex::ZERO));
    }

    #[test]
    fn comparator_respects_metric_direction() {
        let mut acc = AccumulatorGrid::new(&reference(), 5).expect("grid");
        assert!(acc.offer(Metric::Ncc, best(0.2, 0, 0)));
        assert!(acc.offer(Metric::Ncc, best(0.8, 1, 1)));
        assert!(!acc.offer(Metric::Ncc, best(0.5, 2, 2)));

        assert!(acc.offer(Metric::Ssd, best(0.4, 0, 0)));
        assert!(acc.offer(Metric::Ssd, best(0.1, 1, 3)));
        assert!(!acc.offer(Metric::Ssd, best(0.3, 2, 4)));

        let cell = acc.cell(GridIndex::ZERO).expect("cell");
        assert_eq!(cell.ncc.expect("ncc").score, 0.8);
        assert_eq!(cell.ssd.expect("ssd").rotation_step, 1);
        assert!(cell.sad.is_none());
    }

    #[test]
    fn merge_order_does_not_change_result() {
        let offers = [
            best(0.5, 2, 3),
            best(0.9, 1, 4),
            best(0.9, 0, 3),
            best(0.9, 0, 2),
            best(0.1, 3, 1),
        ];

        let mut forward = AccumulatorGrid::new(&reference(), 5).expect("grid");
        let mut backward = forward.clone();
        for b in offers {
            forward.offer(Metric::Ncc, b);
        }
        for b in offers.iter().rev() {
            backward.offer(Metric::Ncc, *b);
        }
        let a = forward.cell(GridIndex::ZERO).expect("cell").ncc.expect("ncc");
        let b = backward.cell(GridIndex::ZERO).expect("cell").ncc.expect("ncc");
        assert_eq!(a, b);
        assert_eq!(a.reference_index, GridIndex::new(2, 0));
    }

    #[test]
    fn outside_indices_and_nan_scores_are_ignored() {
        let mut acc = AccumulatorGrid::new(&reference(), 5).expect("grid");
        assert!(!acc.offer(Metric::Mi, best(1.0, 0, 50)));
        assert!(!acc.offer(Metric::Mi, best(f64::NAN, 0, 0)));
    }

    #[test]
    fn snapshot_scales_scores_for_display() {
        let mut acc = AccumulatorGrid::new(&reference(), 5).expect("grid");
        let mut b = best(1.0, 1, 7);
        b.reference_index = GridIndex::new(7, 12);
        acc.offer(Metric::Ncc, b);
        b.score = 0.2;
        acc.offer(Metric::Sad, b);

        let p = reference().position_of(GridIndex::new(7, 12)).expect("inside");
        let snap = acc.snapshot();
        assert_eq!(snap.at_position("correlation", p), Some(2.5));
        assert_eq!(snap.at_position("rotationNCC", p), Some(90.0));
        assert_eq!(snap.at_position("SAD", p), Some(1.0));
        assert_eq!(snap.at_position("SSD", p), None);
        assert_eq!(snap.at_position("correlation", Point2::new(-4.0, -4.0)), None);
    }

    #[test]
    fn votes_count_per_cell() {
        let mut votes = VoteGrid::new(GridSize::new(3, 3));
        votes.increment(GridIndex::new(1, 2));
        votes.increment(GridIndex::new(1, 2));
        votes.increment(GridIndex::new(5, 5));
        assert_eq!(votes.count(GridIndex::new(1, 2)), 2);
        assert_eq!(votes.count(GridIndex::new(0, 0)), 0);
        assert_eq!(votes.count(GridIndex::new(5, 5)), 0);
    }
}
