//! Live/reference sample pairing for one pose hypothesis.

use crate::{FitError, LayerNames};
use map_fitter_core::{GridIndex, RasterMap};
use nalgebra::DMatrix;
use serde::{Deserialize, Serialize};

/// One pose hypothesis: a rotation and a reference-map anchor cell.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub rotation_deg: f64,
    /// Logical reference index the live map center is placed on.
    pub reference_index: GridIndex,
}

/// Input maps of one search with their layers resolved.
#[derive(Clone, Copy, Debug)]
pub struct MapPair<'a> {
    pub live: &'a RasterMap,
    pub reference: &'a RasterMap,
    live_elevation: &'a DMatrix<f32>,
    live_variance: &'a DMatrix<f32>,
    reference_elevation: &'a DMatrix<f32>,
}

impl<'a> MapPair<'a> {
    /// Resolve the elevation/variance layers and check the maps are comparable.
    pub fn new(
        live: &'a RasterMap,
        reference: &'a RasterMap,
        layers: &LayerNames,
    ) -> Result<Self, FitError> {
        let live_elevation = live.layer(&layers.elevation)?;
        let live_variance = live.layer(&layers.variance)?;
        let reference_elevation = reference.layer(&layers.elevation)?;

        let (lr, rr) = (live.resolution(), reference.resolution());
        if (lr - rr).abs() > 1e-9 * lr.max(rr) {
            return Err(FitError::ResolutionMismatch {
                live: lr,
                reference: rr,
            });
        }

        Ok(Self {
            live,
            reference,
            live_elevation,
            live_variance,
            reference_elevation,
        })
    }

    #[inline]
    fn live_at(&self, buffer: GridIndex) -> (f32, f32) {
        let at = (buffer.row as usize, buffer.col as usize);
        (self.live_elevation[at], self.live_variance[at])
    }

    /// Defined reference elevation at a logical index.
    #[inline]
    pub(crate) fn reference_elevation(&self, logical: GridIndex) -> Option<f32> {
        let geometry = self.reference.geometry();
        if !geometry.size.contains(logical) {
            return None;
        }
        let b = geometry.buffer_index(logical);
        let v = self.reference_elevation[(b.row as usize, b.col as usize)];
        (!v.is_nan()).then_some(v)
    }

    /// Defined live elevation at a logical index.
    #[inline]
    pub(crate) fn live_elevation(&self, logical: GridIndex) -> Option<f32> {
        let geometry = self.live.geometry();
        if !geometry.size.contains(logical) {
            return None;
        }
        let (v, _) = self.live_at(geometry.buffer_index(logical));
        (!v.is_nan()).then_some(v)
    }
}

/// Offset of a logical live cell from the live map's geometric center, in cells.
#[inline]
pub(crate) fn center_offset(live: &RasterMap, index: GridIndex) -> (f64, f64) {
    let size = live.size();
    (
        index.row as f64 - size.rows as f64 / 2.0,
        index.col as f64 - size.cols as f64 / 2.0,
    )
}

/// Rotate a cell offset by `-rotation_deg`.
#[inline]
pub(crate) fn rotate_inverse(offset: (f64, f64), rotation_deg: f64) -> (f64, f64) {
    let (s, c) = rotation_deg.to_radians().sin_cos();
    let (dr, dc) = offset;
    (c * dr + s * dc, -s * dr + c * dc)
}

/// Round to the nearest cell, halves towards +inf (same rule as position lookups).
#[inline]
pub(crate) fn nearest_cell(v: f64) -> i32 {
    (v + 0.5).floor() as i32
}

#[derive(Clone, Copy, Debug)]
struct PatternSample {
    elevation: f32,
    variance: f32,
    offset: GridIndex,
}

/// Defined live samples of one rotation with their rotated reference offsets.
///
/// The pattern depends only on the live map and the rotation, so a sweep
/// builds it once per rotation and reuses it for every anchor.
#[derive(Clone, Debug)]
pub struct SamplePattern {
    rotation_deg: f64,
    samples: Vec<PatternSample>,
}

impl SamplePattern {
    pub fn new(pair: &MapPair<'_>, rotation_deg: f64, stride: usize) -> Self {
        let live = pair.live;
        let geometry = live.geometry();
        let samples = live
            .size()
            .strided(stride)
            .filter_map(|index| {
                let (elevation, variance) = pair.live_at(geometry.buffer_index(index));
                if elevation.is_nan() {
                    return None;
                }
                let (dr, dc) = rotate_inverse(center_offset(live, index), rotation_deg);
                Some(PatternSample {
                    elevation,
                    variance,
                    offset: GridIndex::new(nearest_cell(dr), nearest_cell(dc)),
                })
            })
            .collect();
        Self {
            rotation_deg,
            samples,
        }
    }

    #[inline]
    pub fn rotation_deg(&self) -> f64 {
        self.rotation_deg
    }

    /// Number of defined live samples (`points`).
    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

/// Matched (live, reference) elevation pairs of one candidate.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct MatchSet {
    pub live: Vec<f32>,
    pub reference: Vec<f32>,
    /// `1 / variance` of each matched live cell.
    pub live_inverse_variance: Vec<f32>,
    pub live_mean: f64,
    pub reference_mean: f64,
}

impl MatchSet {
    #[inline]
    pub fn len(&self) -> usize {
        self.live.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

/// Why a candidate produced no [`MatchSet`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MatchRejection {
    /// No live sample found a defined reference counterpart.
    NoSamples { points: usize },
    /// Too few of the live samples found a counterpart.
    InsufficientOverlap { matches: usize, points: usize },
}

/// Pair live samples with reference cells for `anchor` under `pattern`'s rotation.
///
/// Succeeds iff `matches > points * required_overlap` and at least one
/// sample matched.
pub fn extract_matches(
    pair: &MapPair<'_>,
    pattern: &SamplePattern,
    anchor: GridIndex,
    required_overlap: f64,
) -> Result<MatchSet, MatchRejection> {
    let points = pattern.len();
    let mut set = MatchSet {
        live: Vec::with_capacity(points),
        reference: Vec::with_capacity(points),
        live_inverse_variance: Vec::with_capacity(points),
        ..MatchSet::default()
    };
    let mut live_sum = 0.0f64;
    let mut reference_sum = 0.0f64;

    for sample in &pattern.samples {
        let Some(reference) = pair.reference_elevation(anchor + sample.offset) else {
            continue;
        };
        live_sum += sample.elevation as f64;
        reference_sum += reference as f64;
        set.live.push(sample.elevation);
        set.reference.push(reference);
        set.live_inverse_variance.push(1.0 / sample.variance);
    }

    let matches = set.len();
    if matches == 0 {
        return Err(MatchRejection::NoSamples { points });
    }
    if (matches as f64) <= points as f64 * required_overlap {
        return Err(MatchRejection::InsufficientOverlap { matches, points });
    }

    set.live_mean = live_sum / matches as f64;
    set.reference_mean = reference_sum / matches as f64;
    Ok(set)
}

/// Convenience wrapper building the pattern for a single candidate.
pub fn extract_candidate(
    pair: &MapPair<'_>,
    candidate: Candidate,
    correlation_stride: usize,
    required_overlap: f64,
) -> Result<MatchSet, MatchRejection> {
    let pattern = SamplePattern::new(pair, candidate.rotation_deg, correlation_stride);
    extract_matches(pair, &pattern, candidate.reference_index, required_overlap)
}
