//! Accuracy bookkeeping against a known pose.

use crate::select::PoseEstimate;
use crate::PerMetric;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Known pose of the live map inside the reference map.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    pub position: Point2<f64>,
    pub rotation_deg: f64,
}

/// Deviation of one estimated pose from the ground truth.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PoseError {
    /// Euclidean distance in map units.
    pub position_error: f64,
    /// Absolute angular difference in `[0, 180]` degrees.
    pub rotation_error_deg: f64,
    pub correct: bool,
}

/// Position error below which a match counts as correct.
pub const CORRECT_POSITION_TOLERANCE: f64 = 0.5;

/// Shortest angular distance between two headings, in degrees.
pub fn angular_distance_deg(a: f64, b: f64) -> f64 {
    let d = (a - b).rem_euclid(360.0);
    d.min(360.0 - d)
}

impl PoseError {
    /// A pose is correct when it lands within [`CORRECT_POSITION_TOLERANCE`]
    /// of the truth and less than one rotation step away from it.
    pub fn between(pose: &PoseEstimate, truth: &GroundTruth, angle_increment_deg: f64) -> Self {
        let position_error = (pose.position - truth.position).norm();
        let rotation_error_deg = angular_distance_deg(pose.rotation_deg, truth.rotation_deg);
        Self {
            position_error,
            rotation_error_deg,
            correct: position_error < CORRECT_POSITION_TOLERANCE
                && rotation_error_deg < angle_increment_deg,
        }
    }
}

/// Running totals for one metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricStatistics {
    pub searches: usize,
    /// Searches where the metric produced a pose.
    pub found: usize,
    pub cumulative_position_error: f64,
    pub correct_matches: usize,
}

impl MetricStatistics {
    /// Mean position error over the searches that produced a pose.
    pub fn mean_position_error(&self) -> Option<f64> {
        (self.found > 0).then(|| self.cumulative_position_error / self.found as f64)
    }
}

/// Accuracy of every metric across a series of searches.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchStatistics {
    pub per_metric: PerMetric<MetricStatistics>,
}

impl MatchStatistics {
    /// Fold one search into the totals and return its per-metric errors.
    pub fn record(
        &mut self,
        poses: &PerMetric<Option<PoseEstimate>>,
        truth: &GroundTruth,
        angle_increment_deg: f64,
    ) -> PerMetric<Option<PoseError>> {
        let errors = poses.map(|_, pose| {
            pose.as_ref()
                .map(|p| PoseError::between(p, truth, angle_increment_deg))
        });
        for (metric, error) in errors.iter() {
            let stats = &mut self.per_metric[metric];
            stats.searches += 1;
            if let Some(e) = error {
                stats.found += 1;
                stats.cumulative_position_error += e.position_error;
                stats.correct_matches += usize::from(e.correct);
            }
        }
        errors
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use map_fitter_core::GridIndex;

    fn pose(x: f64, y: f64, rotation_deg: f64) -> PoseEstimate {
        PoseEstimate {
            position: Point2::new(x, y),
            rotation_deg,
            score: 0.0,
            reference_index: GridIndex::ZERO,
        }
    }

    #[test]
    fn angular_distance_wraps() {
        assert_eq!(angular_distance_deg(350.0, 10.0), 20.0);
        assert_eq!(angular_distance_deg(0.0, 180.0), 180.0);
        assert_eq!(angular_distance_deg(90.0, 450.0), 0.0);
    }

    #[test]
    fn correctness_needs_position_and_rotation() {
        let truth = GroundTruth {
            position: Point2::new(1.0, 1.0),
            rotation_deg: 90.0,
        };
        assert!(PoseError::between(&pose(1.3, 1.0, 90.0), &truth, 10.0).correct);
        assert!(!PoseError::between(&pose(1.6, 1.0, 90.0), &truth, 10.0).correct);
        assert!(!PoseError::between(&pose(1.0, 1.0, 100.0), &truth, 10.0).correct);
    }

    #[test]
    fn statistics_accumulate_over_searches() {
        let truth = GroundTruth {
            position: Point2::new(0.0, 0.0),
            rotation_deg: 0.0,
        };
        let mut stats = MatchStatistics::default();
        let mut poses: PerMetric<Option<PoseEstimate>> = PerMetric::default();
        poses.ncc = Some(pose(0.3, 0.3, 0.0));
        stats.record(&poses, &truth, 360.0);
        poses.ncc = Some(pose(3.0, 4.0, 0.0));
        let errors = stats.record(&poses, &truth, 360.0);

        assert_eq!(errors.ncc.map(|e| e.correct), Some(false));
        assert!(errors.ssd.is_none());
        let ncc = stats.per_metric.ncc;
        assert_eq!((ncc.searches, ncc.found, ncc.correct_matches), (2, 2, 1));
        let expected = 0.18f64.sqrt() + 5.0;
        assert_abs_diff_eq!(ncc.cumulative_position_error, expected, epsilon = 1e-12);
        assert_abs_diff_eq!(
            ncc.mean_position_error().expect("found"),
            expected / 2.0,
            epsilon = 1e-12
        );
        assert_eq!(stats.per_metric.ssd.searches, 2);
        assert_eq!(stats.per_metric.ssd.mean_position_error(), None);
    }
}
