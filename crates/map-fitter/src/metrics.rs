//! Similarity scores of a [`MatchSet`].
//!
//! SSD and SAD share one kernel parameterised by the pairwise error norm;
//! NCC and both error metrics take an optional per-sample weight
//! ([`SampleWeighting::InverseVariance`]). A metric without a defined value
//! (zero variance for NCC, zero total weight) comes back as `None` and is
//! left out of every comparison.

use crate::{MatchSet, PerMetric, SampleWeighting};

/// Full-scale value of the 16-bit fixed-point elevation encoding.
///
/// Mean-centered samples are divided by this before differencing so the
/// SSD/SAD magnitudes stay in a bounded range.
pub const ELEVATION_RANGE: f64 = 65535.0;

/// Number of histogram bins per axis used for mutual information.
pub const MI_BINS: usize = 256;

/// Scores of one candidate, `None` where the metric is undefined.
pub type MetricScores = PerMetric<Option<f64>>;

/// Pairwise error of two normalised, mean-centered samples.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorNorm {
    Absolute,
    Squared,
}

impl ErrorNorm {
    #[inline]
    fn apply(self, diff: f64) -> f64 {
        match self {
            ErrorNorm::Absolute => diff.abs(),
            ErrorNorm::Squared => diff * diff,
        }
    }
}

/// Weight of sample `i`; non-finite or non-positive weights drop the sample.
#[inline]
fn sample_weight(set: &MatchSet, weighting: SampleWeighting, i: usize) -> Option<f64> {
    match weighting {
        SampleWeighting::Uniform => Some(1.0),
        SampleWeighting::InverseVariance => {
            let w = set.live_inverse_variance[i] as f64;
            (w.is_finite() && w > 0.0).then_some(w)
        }
    }
}

/// Weighted mean of `norm(live_i - reference_i)` over normalised, centered samples.
pub fn mean_error(set: &MatchSet, norm: ErrorNorm, weighting: SampleWeighting) -> Option<f64> {
    let mut error = 0.0;
    let mut normalization = 0.0;
    for i in 0..set.len() {
        let Some(w) = sample_weight(set, weighting, i) else {
            continue;
        };
        let live = (set.live[i] as f64 - set.live_mean) / ELEVATION_RANGE;
        let reference = (set.reference[i] as f64 - set.reference_mean) / ELEVATION_RANGE;
        error += w * norm.apply(live - reference);
        normalization += w;
    }
    (normalization > 0.0).then(|| error / normalization)
}

/// Normalized cross-correlation in `[-1, 1]`.
pub fn normalized_cross_correlation(set: &MatchSet, weighting: SampleWeighting) -> Option<f64> {
    let mut cross = 0.0;
    let mut live_norm = 0.0;
    let mut reference_norm = 0.0;
    for i in 0..set.len() {
        let Some(w) = sample_weight(set, weighting, i) else {
            continue;
        };
        let live = set.live[i] as f64 - set.live_mean;
        let reference = set.reference[i] as f64 - set.reference_mean;
        cross += w * live * reference;
        live_norm += w * live * live;
        reference_norm += w * reference * reference;
    }
    if live_norm <= 0.0 || reference_norm <= 0.0 {
        return None;
    }
    let ncc = cross / (live_norm * reference_norm).sqrt();
    ncc.is_finite().then(|| ncc.clamp(-1.0, 1.0))
}

#[inline]
fn mi_bin(value: f32, mean: f64) -> usize {
    let half = (MI_BINS / 2 - 1) as f64;
    let b = ((value as f64 - mean) / ELEVATION_RANGE * half + half).floor();
    b.clamp(0.0, (MI_BINS - 1) as f64) as usize
}

fn entropy<'a>(probabilities: impl Iterator<Item = &'a f64>) -> f64 {
    -probabilities
        .filter(|&&p| p > 0.0)
        .map(|&p| p * p.ln())
        .sum::<f64>()
}

/// Mutual information `H(live) + H(reference) - H(joint)` of the
/// mean-centered samples quantised into [`MI_BINS`] bins.
pub fn mutual_information(set: &MatchSet) -> Option<f64> {
    let n = set.len();
    if n == 0 {
        return None;
    }
    let mut live_hist = vec![0.0f64; MI_BINS];
    let mut reference_hist = vec![0.0f64; MI_BINS];
    let mut joint_hist = vec![0.0f64; MI_BINS * MI_BINS];

    let inc = 1.0 / n as f64;
    for (&l, &r) in set.live.iter().zip(&set.reference) {
        let bl = mi_bin(l, set.live_mean);
        let br = mi_bin(r, set.reference_mean);
        live_hist[bl] += inc;
        reference_hist[br] += inc;
        joint_hist[bl * MI_BINS + br] += inc;
    }

    let mi = entropy(live_hist.iter()) + entropy(reference_hist.iter())
        - entropy(joint_hist.iter());
    Some(mi)
}

/// Score a match set with all metrics.
pub fn evaluate_metrics(set: &MatchSet, weighting: SampleWeighting) -> MetricScores {
    if set.is_empty() {
        return MetricScores::default();
    }
    PerMetric {
        ncc: normalized_cross_correlation(set, weighting),
        ssd: mean_error(set, ErrorNorm::Squared, weighting),
        sad: mean_error(set, ErrorNorm::Absolute, weighting),
        mi: mutual_information(set),
    }
}
