use crate::{FitError, Metric, PerMetric};
use serde::{Deserialize, Serialize};

/// Acceptance thresholds applied by the best-pose selector.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricThresholds {
    /// Minimal NCC.
    #[serde(alias = "correlation_threshold")]
    pub ncc: f64,
    /// Maximal SSD.
    #[serde(alias = "SSD_threshold")]
    pub ssd: f64,
    /// Maximal SAD.
    #[serde(alias = "SAD_threshold")]
    pub sad: f64,
    /// Minimal mutual information.
    #[serde(alias = "MI_threshold")]
    pub mi: f64,
}

impl Default for MetricThresholds {
    fn default() -> Self {
        Self {
            ncc: 0.0,
            ssd: 10.0,
            sad: 10.0,
            mi: -10.0,
        }
    }
}

impl MetricThresholds {
    #[inline]
    pub fn get(&self, metric: Metric) -> f64 {
        match metric {
            Metric::Ncc => self.ncc,
            Metric::Ssd => self.ssd,
            Metric::Sad => self.sad,
            Metric::Mi => self.mi,
        }
    }

    pub fn as_per_metric(&self) -> PerMetric<f64> {
        PerMetric::from_fn(|m| self.get(m))
    }
}

/// Per-sample weighting of the NCC/SSD/SAD metrics.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SampleWeighting {
    /// Every matched sample counts once.
    #[default]
    Uniform,
    /// Samples are weighted by the inverse of the live-map variance.
    InverseVariance,
}

/// Layer names read from the input maps.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerNames {
    /// Elevation layer, required on both maps.
    pub elevation: String,
    /// Variance layer, required on the live map.
    pub variance: String,
}

impl Default for LayerNames {
    fn default() -> Self {
        Self {
            elevation: "elevation".to_owned(),
            variance: "variance".to_owned(),
        }
    }
}

/// Configuration of one exhaustive search.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchParams {
    /// Rotation step in degrees; 360 disables the rotation search.
    #[serde(alias = "angle_increment")]
    pub angle_increment_deg: f64,
    /// Step, in reference cells, between candidate anchor positions.
    #[serde(alias = "position_increment_search")]
    pub position_search_stride: usize,
    /// Step, in live cells, between sampled live cells.
    #[serde(alias = "position_increment_correlation")]
    pub correlation_stride: usize,
    /// A candidate is kept when `matches > points * required_overlap`.
    pub required_overlap: f64,
    #[serde(flatten)]
    pub thresholds: MetricThresholds,
    pub weighting: SampleWeighting,
    pub layers: LayerNames,
}

impl Default for SearchParams {
    fn default() -> Self {
        Self {
            angle_increment_deg: 360.0,
            position_search_stride: 5,
            correlation_stride: 5,
            required_overlap: 0.75,
            thresholds: MetricThresholds::default(),
            weighting: SampleWeighting::Uniform,
            layers: LayerNames::default(),
        }
    }
}

impl SearchParams {
    pub fn validate(&self) -> Result<(), FitError> {
        let inc = self.angle_increment_deg;
        if !(inc.is_finite() && inc > 0.0 && inc <= 360.0) {
            return Err(FitError::InvalidParams(format!(
                "angle_increment_deg must be in (0, 360], got {inc}"
            )));
        }
        if self.position_search_stride == 0 {
            return Err(FitError::InvalidParams(
                "position_search_stride must be at least 1".to_owned(),
            ));
        }
        if self.correlation_stride == 0 {
            return Err(FitError::InvalidParams(
                "correlation_stride must be at least 1".to_owned(),
            ));
        }
        let overlap = self.required_overlap;
        if !(overlap.is_finite() && overlap >= 0.0) {
            return Err(FitError::InvalidParams(format!(
                "required_overlap must be finite and non-negative, got {overlap}"
            )));
        }
        Ok(())
    }

    /// Rotation angles of the sweep: `0, inc, 2 inc, ...` below 360 degrees.
    pub fn rotations(&self) -> Vec<f64> {
        let inc = self.angle_increment_deg;
        if !(inc.is_finite() && inc > 0.0) {
            return Vec::new();
        }
        // Tolerate accumulated rounding so that e.g. 120 yields exactly three angles.
        let count = ((360.0 / inc) - 1e-9).ceil().max(1.0) as usize;
        (0..count).map(|k| k as f64 * inc).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_disable_rotation_search() {
        let p = SearchParams::default();
        assert_eq!(p.rotations(), vec![0.0]);
        assert_eq!(p.position_search_stride, 5);
        assert_eq!(p.correlation_stride, 5);
        assert_eq!(p.thresholds, MetricThresholds::default());
        p.validate().expect("defaults are valid");
    }

    #[test]
    fn rotation_sweep_covers_full_circle() {
        let p = SearchParams {
            angle_increment_deg: 90.0,
            ..SearchParams::default()
        };
        assert_eq!(p.rotations(), vec![0.0, 90.0, 180.0, 270.0]);

        let p = SearchParams {
            angle_increment_deg: 7.0,
            ..SearchParams::default()
        };
        let r = p.rotations();
        assert_eq!(r.len(), 52);
        assert!(*r.last().expect("non-empty") < 360.0);
    }

    #[test]
    fn validation_rejects_degenerate_values() {
        for bad in [
            SearchParams {
                angle_increment_deg: 0.0,
                ..SearchParams::default()
            },
            SearchParams {
                angle_increment_deg: 400.0,
                ..SearchParams::default()
            },
            SearchParams {
                position_search_stride: 0,
                ..SearchParams::default()
            },
            SearchParams {
                correlation_stride: 0,
                ..SearchParams::default()
            },
            SearchParams {
                required_overlap: f64::NAN,
                ..SearchParams::default()
            },
        ] {
            assert!(matches!(bad.validate(), Err(FitError::InvalidParams(_))));
        }
    }

    #[test]
    fn accepts_legacy_parameter_names() {
        let json = r#"{
            "angle_increment": 45,
            "position_increment_search": 3,
            "position_increment_correlation": 2,
            "required_overlap": 0.5,
            "correlation_threshold": 0.6,
            "SSD_threshold": 4.0
        }"#;
        let p: SearchParams = serde_json::from_str(json).expect("parse");
        assert_eq!(p.angle_increment_deg, 45.0);
        assert_eq!(p.position_search_stride, 3);
        assert_eq!(p.correlation_stride, 2);
        assert_eq!(p.required_overlap, 0.5);
        assert_eq!(p.thresholds.ncc, 0.6);
        assert_eq!(p.thresholds.ssd, 4.0);
        assert_eq!(p.thresholds.sad, 10.0);
        assert_eq!(p.weighting, SampleWeighting::Uniform);
    }
}
