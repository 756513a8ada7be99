use crate::matching::{center_offset, rotate_inverse};
use crate::{FitError, MapPair};
use nalgebra::Point2;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Vertical offset `mean(reference) - mean(live)` for the live map placed at
/// `position` (its center) and rotated by `rotation_deg`.
///
/// Samples the live map on the `stride` grid like the match extractor but
/// anchors in continuous map coordinates and applies no overlap gate.
/// Fails with [`FitError::NoOverlap`] when no sample matched.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "info", skip(pair), fields(x = position.x, y = position.y))
)]
pub fn estimate_z_offset(
    pair: &MapPair<'_>,
    position: Point2<f64>,
    rotation_deg: f64,
    stride: usize,
) -> Result<f64, FitError> {
    let resolution = pair.live.resolution();
    let reference = pair.reference.geometry();

    let mut live_sum = 0.0f64;
    let mut reference_sum = 0.0f64;
    let mut matches = 0usize;

    for index in pair.live.size().strided(stride) {
        let Some(live) = pair.live_elevation(index) else {
            continue;
        };
        let (dr, dc) = rotate_inverse(center_offset(pair.live, index), rotation_deg);
        // Index axes point along -x / -y.
        let target = Point2::new(position.x - dr * resolution, position.y - dc * resolution);
        let Some(reference) = reference
            .index_of(target)
            .and_then(|idx| pair.reference_elevation(idx))
        else {
            continue;
        };
        live_sum += live as f64;
        reference_sum += reference as f64;
        matches += 1;
    }

    if matches == 0 {
        return Err(FitError::NoOverlap);
    }
    let n = matches as f64;
    Ok(reference_sum / n - live_sum / n)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LayerNames;
    use approx::assert_abs_diff_eq;
    use map_fitter_core::{GridIndex, GridSize, RasterGeometry, RasterMap};

    fn terrain(idx: GridIndex) -> f32 {
        let (r, c) = (idx.row as f32, idx.col as f32);
        (0.3 * r).sin() * 40.0 + (0.2 * c).cos() * 25.0 + 0.5 * r * c
    }

    fn maps(offset: f32) -> (RasterMap, RasterMap) {
        let g = RasterGeometry::new(GridSize::new(30, 30), 0.2, Point2::new(4.0, -2.0))
            .expect("geometry");
        let mut reference = RasterMap::new(g);
        reference.add_layer_from_fn("elevation", terrain);

        let g = RasterGeometry::new(GridSize::new(10, 10), 0.2, Point2::origin()).expect("g");
        let mut live = RasterMap::new(g);
        live.add_layer_from_fn("elevation", |i| {
            terrain(i + GridIndex::new(7, 9)) + offset
        });
        live.add_constant_layer("variance", 1.0);
        (live, reference)
    }

    #[test]
    fn identical_maps_have_zero_offset() {
        let (live, reference) = maps(0.0);
        let pair = MapPair::new(&live, &reference, &LayerNames::default()).expect("pair");
        // live center sits on reference cell (12, 14)
        let anchor = reference
            .geometry()
            .position_of(GridIndex::new(12, 14))
            .expect("inside");
        let z = estimate_z_offset(&pair, anchor, 0.0, 1).expect("overlap");
        assert_abs_diff_eq!(z, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn recovers_constant_bias() {
        let (live, reference) = maps(3.5);
        let pair = MapPair::new(&live, &reference, &LayerNames::default()).expect("pair");
        let anchor = reference
            .geometry()
            .position_of(GridIndex::new(12, 14))
            .expect("inside");
        let z = estimate_z_offset(&pair, anchor, 0.0, 2).expect("overlap");
        assert_abs_diff_eq!(z, -3.5, epsilon = 1e-4);
    }

    #[test]
    fn no_overlap_is_reported() {
        let (live, reference) = maps(0.0);
        let pair = MapPair::new(&live, &reference, &LayerNames::default()).expect("pair");
        let far = Point2::new(100.0, 100.0);
        assert!(matches!(
            estimate_z_offset(&pair, far, 0.0, 1),
            Err(FitError::NoOverlap)
        ));
    }
}
