use crate::accumulator::{AccumulatorGrid, CellBest, VoteGrid};
use crate::{Metric, MetricThresholds, PerMetric};
use map_fitter_core::{GridIndex, RasterGeometry};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Globally best pose for one metric.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseEstimate {
    /// Reference-map position of the live map center.
    pub position: Point2<f64>,
    pub rotation_deg: f64,
    /// Raw metric value.
    pub score: f64,
    /// Fine reference cell of the winning candidate.
    pub reference_index: GridIndex,
}

/// Pick, per metric, the best accumulator cell that every rotation matched.
///
/// A cell is eligible only if the fine reference cell its winner was
/// anchored on collected `rotations_tested` votes and its raw score passes
/// the metric's threshold. Metrics without an eligible cell yield `None`.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(rotations = rotations_tested))
)]
pub fn select_best_poses(
    accumulator: &AccumulatorGrid,
    votes: &VoteGrid,
    rotations_tested: usize,
    thresholds: &MetricThresholds,
    reference: &RasterGeometry,
) -> PerMetric<Option<PoseEstimate>> {
    PerMetric::from_fn(|metric| {
        let threshold = thresholds.get(metric);
        let mut winner: Option<CellBest> = None;
        for (_, cell) in accumulator.cells() {
            let Some(candidate) = cell[metric] else {
                continue;
            };
            if votes.count(candidate.reference_index) as usize != rotations_tested {
                continue;
            }
            if !metric.accepts(candidate.score, threshold) {
                continue;
            }
            if winner.map_or(true, |w| candidate.supersedes(&w, metric)) {
                winner = Some(candidate);
            }
        }

        let best = winner?;
        let position = reference.position_of(best.reference_index)?;
        log::debug!(
            "{metric}: {:.5} at ({:.3}, {:.3}), rotation {}",
            best.score,
            position.x,
            position.y,
            best.rotation_deg
        );
        Some(PoseEstimate {
            position,
            rotation_deg: best.rotation_deg,
            score: best.score,
            reference_index: best.reference_index,
        })
    })
}

/// Pose used to anchor the vertical offset: NCC first, then SSD, SAD, MI.
pub fn anchor_pose(poses: &PerMetric<Option<PoseEstimate>>) -> Option<(Metric, PoseEstimate)> {
    Metric::ALL
        .into_iter()
        .find_map(|m| poses[m].map(|pose| (m, pose)))
}
