//! Exhaustive rotation/translation sweep and the single-flight fitter.

use crate::accumulator::{AccumulatorGrid, VoteGrid};
use crate::matching::{extract_matches, MapPair, MatchRejection, SamplePattern};
use crate::metrics::{evaluate_metrics, MetricScores};
use crate::select::{anchor_pose, select_best_poses, PoseEstimate};
use crate::stats::{GroundTruth, MatchStatistics, PoseError};
use crate::z_offset::estimate_z_offset;
use crate::{FitError, Metric, PerMetric, SearchParams};
use log::{debug, info, trace, warn};
use map_fitter_core::{GridIndex, RasterMap};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

#[cfg(feature = "rayon")]
use rayon::prelude::*;
#[cfg(feature = "tracing")]
use tracing::instrument;

/// Receiver of the accumulator snapshot exported after every rotation.
pub trait AccumulatorSink {
    fn publish(&mut self, rotation_deg: f64, snapshot: &RasterMap);

    /// Sinks returning `false` skip snapshot construction entirely.
    fn wants_snapshots(&self) -> bool {
        true
    }
}

impl<F> AccumulatorSink for F
where
    F: FnMut(f64, &RasterMap),
{
    fn publish(&mut self, rotation_deg: f64, snapshot: &RasterMap) {
        self(rotation_deg, snapshot)
    }
}

/// Sink discarding every snapshot.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl AccumulatorSink for NullSink {
    fn publish(&mut self, _rotation_deg: f64, _snapshot: &RasterMap) {}

    fn wants_snapshots(&self) -> bool {
        false
    }
}

/// Sink keeping every snapshot in sweep order.
#[derive(Clone, Debug, Default)]
pub struct SnapshotCollector {
    pub snapshots: Vec<(f64, RasterMap)>,
}

impl AccumulatorSink for SnapshotCollector {
    fn publish(&mut self, rotation_deg: f64, snapshot: &RasterMap) {
        self.snapshots.push((rotation_deg, snapshot.clone()));
    }
}

/// Best candidate of one metric within a single rotation.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationBest {
    pub score: f64,
    pub reference_index: GridIndex,
    pub position: Point2<f64>,
}

/// Per-rotation record of a sweep.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RotationSummary {
    pub rotation_deg: f64,
    pub candidates_matched: usize,
    pub best: PerMetric<Option<RotationBest>>,
}

/// Result of one exhaustive search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Best pose per metric, `None` when nothing passed the gates.
    pub poses: PerMetric<Option<PoseEstimate>>,
    /// Metric whose pose anchored the z-offset estimate.
    pub z_anchor: Option<Metric>,
    /// `mean(reference) - mean(live)` at the anchor pose.
    pub z_offset: Option<f64>,
    pub rotations: Vec<RotationSummary>,
    pub candidates_evaluated: usize,
    pub candidates_matched: usize,
    pub elapsed: Duration,
}

impl SearchOutcome {
    #[inline]
    pub fn rotations_tested(&self) -> usize {
        self.rotations.len()
    }
}

struct Evaluation {
    reference_index: GridIndex,
    position: Point2<f64>,
    scores: MetricScores,
}

fn evaluate_candidate(
    pair: &MapPair<'_>,
    pattern: &SamplePattern,
    anchor: GridIndex,
    params: &SearchParams,
) -> Option<Evaluation> {
    let set = match extract_matches(pair, pattern, anchor, params.required_overlap) {
        Ok(set) => set,
        Err(rejection) => {
            if let MatchRejection::InsufficientOverlap { matches, points } = rejection {
                trace!("anchor {anchor:?}: {matches}/{points} samples overlap");
            }
            return None;
        }
    };
    let position = pair.reference.geometry().position_of(anchor)?;
    Some(Evaluation {
        reference_index: anchor,
        position,
        scores: evaluate_metrics(&set, params.weighting),
    })
}

#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip_all, fields(rotation = rotation_deg))
)]
fn sweep_rotation(
    pair: &MapPair<'_>,
    params: &SearchParams,
    rotation_deg: f64,
    rotation_step: usize,
    anchors: &[GridIndex],
    accumulator: &mut AccumulatorGrid,
    votes: &mut VoteGrid,
) -> RotationSummary {
    let pattern = SamplePattern::new(pair, rotation_deg, params.correlation_stride);

    #[cfg(feature = "rayon")]
    let evaluations: Vec<Evaluation> = anchors
        .par_iter()
        .filter_map(|&anchor| evaluate_candidate(pair, &pattern, anchor, params))
        .collect();
    #[cfg(not(feature = "rayon"))]
    let evaluations: Vec<Evaluation> = anchors
        .iter()
        .filter_map(|&anchor| evaluate_candidate(pair, &pattern, anchor, params))
        .collect();

    let mut best: PerMetric<Option<RotationBest>> = PerMetric::default();
    for eval in &evaluations {
        votes.increment(eval.reference_index);
        accumulator.record(
            &eval.scores,
            rotation_deg,
            rotation_step,
            eval.reference_index,
        );
        for (metric, score) in eval.scores.iter() {
            let Some(score) = *score else {
                continue;
            };
            let slot = &mut best[metric];
            if slot.map_or(true, |b| metric.is_better(score, b.score)) {
                *slot = Some(RotationBest {
                    score,
                    reference_index: eval.reference_index,
                    position: eval.position,
                });
            }
        }
    }

    debug!(
        "rotation {rotation_deg:6.1}: {}/{} anchors matched ({} samples), best NCC {:?}",
        evaluations.len(),
        anchors.len(),
        pattern.len(),
        best.ncc.map(|b| b.score)
    );

    RotationSummary {
        rotation_deg,
        candidates_matched: evaluations.len(),
        best,
    }
}

/// Align `live` against `reference` by sweeping every rotation and anchor.
///
/// The accumulator snapshot of every rotation goes to `sink`. After the
/// sweep the best pose per metric is selected and the vertical offset is
/// estimated at the NCC pose (or the first metric that found one).
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip_all, fields(
        live_rows = live.size().rows,
        live_cols = live.size().cols,
        reference_rows = reference.size().rows,
        reference_cols = reference.size().cols,
    ))
)]
pub fn exhaustive_search(
    live: &RasterMap,
    reference: &RasterMap,
    params: &SearchParams,
    sink: &mut dyn AccumulatorSink,
) -> Result<SearchOutcome, FitError> {
    params.validate()?;
    let started = Instant::now();
    let pair = MapPair::new(live, reference, &params.layers)?;

    if params.required_overlap >= 1.0 {
        warn!(
            "required_overlap {} rejects every candidate",
            params.required_overlap
        );
    }
    let (ls, rs) = (live.size(), reference.size());
    if ls.rows > rs.rows || ls.cols > rs.cols {
        warn!("live map {ls:?} is larger than the reference map {rs:?}");
    }

    let rotations = params.rotations();
    let anchors: Vec<GridIndex> = reference
        .size()
        .strided(params.position_search_stride)
        .collect();
    let mut accumulator =
        AccumulatorGrid::new(reference.geometry(), params.position_search_stride)?;
    let mut votes = VoteGrid::new(reference.size());

    info!(
        "fitting {}x{} live map against {}x{} reference: {} rotations x {} anchors",
        ls.rows,
        ls.cols,
        rs.rows,
        rs.cols,
        rotations.len(),
        anchors.len()
    );

    let mut summaries = Vec::with_capacity(rotations.len());
    for (step, &rotation_deg) in rotations.iter().enumerate() {
        let summary = sweep_rotation(
            &pair,
            params,
            rotation_deg,
            step,
            &anchors,
            &mut accumulator,
            &mut votes,
        );
        if sink.wants_snapshots() {
            sink.publish(rotation_deg, &accumulator.snapshot());
        }
        summaries.push(summary);
    }

    let poses = select_best_poses(
        &accumulator,
        &votes,
        rotations.len(),
        &params.thresholds,
        reference.geometry(),
    );

    let anchor = anchor_pose(&poses);
    let z_offset = anchor.and_then(|(metric, pose)| {
        let z = estimate_z_offset(
            &pair,
            pose.position,
            pose.rotation_deg,
            params.correlation_stride,
        );
        match z {
            Ok(z) => Some(z),
            Err(err) => {
                warn!("z offset at {metric} pose failed: {err}");
                None
            }
        }
    });

    let candidates_matched = summaries.iter().map(|s| s.candidates_matched).sum();
    let outcome = SearchOutcome {
        poses,
        z_anchor: anchor.map(|(metric, _)| metric),
        z_offset,
        candidates_evaluated: anchors.len() * rotations.len(),
        candidates_matched,
        rotations: summaries,
        elapsed: started.elapsed(),
    };

    for (metric, pose) in outcome.poses.iter() {
        match pose {
            Some(p) => info!(
                "best {metric} {:.5} at ({:.3}, {:.3}), rotation {}",
                p.score, p.position.x, p.position.y, p.rotation_deg
            ),
            None => info!("best {metric}: none found"),
        }
    }
    info!(
        "search done in {:.3}s, z offset {:?}",
        outcome.elapsed.as_secs_f64(),
        outcome.z_offset
    );

    Ok(outcome)
}

/// Search state of a [`MapFitter`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SearchState {
    Idle,
    Searching,
}

struct SearchGuard<'a> {
    state: &'a Mutex<SearchState>,
}

impl Drop for SearchGuard<'_> {
    fn drop(&mut self) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = SearchState::Idle;
    }
}

/// Map fitter owning the search configuration.
///
/// At most one search runs at a time: a trigger arriving while a search is
/// in progress is dropped, not queued.
pub struct MapFitter {
    params: SearchParams,
    state: Mutex<SearchState>,
    statistics: Mutex<MatchStatistics>,
}

impl MapFitter {
    pub fn new(params: SearchParams) -> Result<Self, FitError> {
        params.validate()?;
        Ok(Self {
            params,
            state: Mutex::new(SearchState::Idle),
            statistics: Mutex::new(MatchStatistics::default()),
        })
    }

    #[inline]
    pub fn params(&self) -> &SearchParams {
        &self.params
    }

    pub fn state(&self) -> SearchState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn begin(&self) -> Option<SearchGuard<'_>> {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        match *state {
            SearchState::Searching => None,
            SearchState::Idle => {
                *state = SearchState::Searching;
                Some(SearchGuard { state: &self.state })
            }
        }
    }

    /// Run a search unless one is already in progress.
    ///
    /// Returns `Ok(None)` when the trigger was dropped.
    pub fn trigger(
        &self,
        live: &RasterMap,
        reference: &RasterMap,
        sink: &mut dyn AccumulatorSink,
    ) -> Result<Option<SearchOutcome>, FitError> {
        let Some(_guard) = self.begin() else {
            info!("search already in progress, dropping trigger");
            return Ok(None);
        };
        exhaustive_search(live, reference, &self.params, sink).map(Some)
    }

    /// Score `outcome` against a known pose and fold it into the running statistics.
    pub fn record_ground_truth(
        &self,
        outcome: &SearchOutcome,
        truth: &GroundTruth,
    ) -> PerMetric<Option<PoseError>> {
        let mut stats = self
            .statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        let errors = stats.record(&outcome.poses, truth, self.params.angle_increment_deg);
        for (metric, s) in stats.per_metric.iter() {
            debug!(
                "{metric}: cumulative error {:.3}, {} correct of {} searches",
                s.cumulative_position_error, s.correct_matches, s.searches
            );
        }
        errors
    }

    /// Copy of the statistics accumulated by [`MapFitter::record_ground_truth`].
    pub fn statistics(&self) -> MatchStatistics {
        self.statistics
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
