//! Similarity metrics and their orderings.

use serde::{Deserialize, Serialize};
use std::ops::{Index, IndexMut};

/// Similarity metric used to score one pose hypothesis.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Metric {
    /// Normalized cross-correlation, higher is better.
    Ncc,
    /// Mean squared difference of centered samples, lower is better.
    Ssd,
    /// Mean absolute difference of centered samples, lower is better.
    Sad,
    /// Mutual information of the quantized samples, higher is better.
    Mi,
}

impl Metric {
    pub const ALL: [Metric; 4] = [Metric::Ncc, Metric::Ssd, Metric::Sad, Metric::Mi];

    #[inline]
    pub const fn slot(self) -> usize {
        match self {
            Metric::Ncc => 0,
            Metric::Ssd => 1,
            Metric::Sad => 2,
            Metric::Mi => 3,
        }
    }

    pub const fn name(self) -> &'static str {
        match self {
            Metric::Ncc => "NCC",
            Metric::Ssd => "SSD",
            Metric::Sad => "SAD",
            Metric::Mi => "MI",
        }
    }

    #[inline]
    pub const fn higher_is_better(self) -> bool {
        matches!(self, Metric::Ncc | Metric::Mi)
    }

    /// Strict "`candidate` beats `incumbent`" under this metric's ordering.
    #[inline]
    pub fn is_better(self, candidate: f64, incumbent: f64) -> bool {
        if self.higher_is_better() {
            candidate > incumbent
        } else {
            candidate < incumbent
        }
    }

    /// Whether `score` passes the acceptance threshold of this metric.
    #[inline]
    pub fn accepts(self, score: f64, threshold: f64) -> bool {
        if self.higher_is_better() {
            score >= threshold
        } else {
            score <= threshold
        }
    }

    /// Value written to exported accumulator layers.
    #[inline]
    pub fn display_value(self, score: f64) -> f32 {
        let v = match self {
            Metric::Ncc => score + 1.5,
            Metric::Ssd | Metric::Sad => score * 5.0,
            Metric::Mi => score,
        };
        v as f32
    }

    /// Names of the (score, rotation) layers of an exported accumulator.
    pub const fn layer_names(self) -> (&'static str, &'static str) {
        match self {
            Metric::Ncc => ("correlation", "rotationNCC"),
            Metric::Ssd => ("SSD", "rotationSSD"),
            Metric::Sad => ("SAD", "rotationSAD"),
            Metric::Mi => ("MI", "rotationMI"),
        }
    }
}

impl std::fmt::Display for Metric {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// One value per [`Metric`], indexable by metric.
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PerMetric<T> {
    pub ncc: T,
    pub ssd: T,
    pub sad: T,
    pub mi: T,
}

impl<T> PerMetric<T> {
    pub fn from_fn(mut f: impl FnMut(Metric) -> T) -> Self {
        Self {
            ncc: f(Metric::Ncc),
            ssd: f(Metric::Ssd),
            sad: f(Metric::Sad),
            mi: f(Metric::Mi),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Metric, &T) -> U) -> PerMetric<U> {
        PerMetric {
            ncc: f(Metric::Ncc, &self.ncc),
            ssd: f(Metric::Ssd, &self.ssd),
            sad: f(Metric::Sad, &self.sad),
            mi: f(Metric::Mi, &self.mi),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (Metric, &T)> {
        Metric::ALL.into_iter().map(move |m| (m, &self[m]))
    }
}

impl<T> Index<Metric> for PerMetric<T> {
    type Output = T;

    fn index(&self, metric: Metric) -> &T {
        match metric {
            Metric::Ncc => &self.ncc,
            Metric::Ssd => &self.ssd,
            Metric::Sad => &self.sad,
            Metric::Mi => &self.mi,
        }
    }
}

impl<T> IndexMut<Metric> for PerMetric<T> {
    fn index_mut(&mut self, metric: Metric) -> &mut T {
        match metric {
            Metric::Ncc => &mut self.ncc,
            Metric::Ssd => &mut self.ssd,
            Metric::Sad => &mut self.sad,
            Metric::Mi => &mut self.mi,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn orderings_follow_metric_direction() {
        assert!(Metric::Ncc.is_better(0.9, 0.5));
        assert!(!Metric::Ncc.is_better(0.5, 0.5));
        assert!(Metric::Ssd.is_better(0.1, 0.2));
        assert!(Metric::Sad.is_better(0.0, 1e-9));
        assert!(Metric::Mi.is_better(-1.0, -2.0));
    }

    #[test]
    fn thresholds_are_inclusive() {
        assert!(Metric::Ncc.accepts(0.0, 0.0));
        assert!(!Metric::Ncc.accepts(-0.1, 0.0));
        assert!(Metric::Ssd.accepts(10.0, 10.0));
        assert!(!Metric::Sad.accepts(10.5, 10.0));
        assert!(Metric::Mi.accepts(-10.0, -10.0));
    }

    #[test]
    fn display_scaling() {
        assert_eq!(Metric::Ncc.display_value(1.0), 2.5);
        assert_eq!(Metric::Ssd.display_value(0.5), 2.5);
        assert_eq!(Metric::Mi.display_value(0.25), 0.25);
    }

    #[test]
    fn per_metric_indexing() {
        let mut v = PerMetric::from_fn(|m| m.slot());
        assert_eq!(v[Metric::Sad], 2);
        v[Metric::Mi] = 42;
        assert_eq!(v.mi, 42);
        let names: Vec<_> = v.iter().map(|(m, _)| m.name()).collect();
        assert_eq!(names, ["NCC", "SSD", "SAD", "MI"]);
    }
}
