//! Multi-layer elevation raster with circular-buffer storage.

use crate::index::{to_buffer_index, GridIndex, GridSize};
use crate::RasterError;
use nalgebra::{DMatrix, Point2, Vector2};
use std::collections::BTreeMap;

/// Placement of a regular grid in the map plane.
///
/// Rows run along x and columns along y, both *decreasing* with the index:
/// logical cell (0, 0) is the corner at `center + length / 2`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RasterGeometry {
    /// Cell edge length in map units.
    pub resolution: f64,
    /// Map-frame position of the raster center.
    pub center: Point2<f64>,
    pub size: GridSize,
    /// Buffer slot holding logical cell (0, 0).
    pub start_index: GridIndex,
}

impl RasterGeometry {
    pub fn new(size: GridSize, resolution: f64, center: Point2<f64>) -> Result<Self, RasterError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(RasterError::InvalidGeometry(format!(
                "resolution must be positive, got {resolution}"
            )));
        }
        if size.is_empty() {
            return Err(RasterError::InvalidGeometry(format!(
                "empty raster size {size:?}"
            )));
        }
        Ok(Self {
            resolution,
            center,
            size,
            start_index: GridIndex::ZERO,
        })
    }

    /// Geometry covering `length` at `resolution`; the cell count is rounded.
    pub fn from_length(
        length: Vector2<f64>,
        resolution: f64,
        center: Point2<f64>,
    ) -> Result<Self, RasterError> {
        if !(resolution.is_finite() && resolution > 0.0) {
            return Err(RasterError::InvalidGeometry(format!(
                "resolution must be positive, got {resolution}"
            )));
        }
        let rows = (length.x / resolution).round().max(0.0) as usize;
        let cols = (length.y / resolution).round().max(0.0) as usize;
        Self::new(GridSize::new(rows, cols), resolution, center)
    }

    pub fn with_start_index(mut self, start_index: GridIndex) -> Self {
        self.start_index = crate::index::wrap_grid_index(start_index, self.size);
        self
    }

    /// Side lengths in map units.
    #[inline]
    pub fn length(&self) -> Vector2<f64> {
        Vector2::new(
            self.size.rows as f64 * self.resolution,
            self.size.cols as f64 * self.resolution,
        )
    }

    /// Map position of a logical cell center.
    pub fn position_of(&self, index: GridIndex) -> Option<Point2<f64>> {
        if !self.size.contains(index) {
            return None;
        }
        let half = self.length() * 0.5;
        Some(Point2::new(
            self.center.x + half.x - (index.row as f64 + 0.5) * self.resolution,
            self.center.y + half.y - (index.col as f64 + 0.5) * self.resolution,
        ))
    }

    /// Logical index of the cell containing `position`.
    pub fn index_of(&self, position: Point2<f64>) -> Option<GridIndex> {
        let half = self.length() * 0.5;
        let u = (half.x - (position.x - self.center.x)) / self.resolution;
        let v = (half.y - (position.y - self.center.y)) / self.resolution;
        if !(u.is_finite() && v.is_finite()) {
            return None;
        }
        let index = GridIndex::new(u.floor() as i32, v.floor() as i32);
        self.size.contains(index).then_some(index)
    }

    #[inline]
    pub fn contains_position(&self, position: Point2<f64>) -> bool {
        self.index_of(position).is_some()
    }

    /// Storage slot of a logical index.
    #[inline]
    pub fn buffer_index(&self, logical: GridIndex) -> GridIndex {
        to_buffer_index(logical, self.size, self.start_index)
    }
}

/// Raster of named `f32` layers sharing one geometry. NaN marks undefined cells.
///
/// Layer matrices are stored in buffer order; every accessor taking a
/// [`GridIndex`] expects a logical index.
#[derive(Clone, Debug)]
pub struct RasterMap {
    geometry: RasterGeometry,
    layers: BTreeMap<String, DMatrix<f32>>,
}

impl RasterMap {
    pub fn new(geometry: RasterGeometry) -> Self {
        Self {
            geometry,
            layers: BTreeMap::new(),
        }
    }

    #[inline]
    pub fn geometry(&self) -> &RasterGeometry {
        &self.geometry
    }

    #[inline]
    pub fn size(&self) -> GridSize {
        self.geometry.size
    }

    #[inline]
    pub fn resolution(&self) -> f64 {
        self.geometry.resolution
    }

    /// Insert (or replace) a layer given in buffer order.
    pub fn insert_layer(
        &mut self,
        name: impl Into<String>,
        data: DMatrix<f32>,
    ) -> Result<(), RasterError> {
        let name = name.into();
        let got = GridSize::new(data.nrows(), data.ncols());
        if got != self.geometry.size {
            return Err(RasterError::LayerShape {
                name,
                expected: self.geometry.size,
                got,
            });
        }
        self.layers.insert(name, data);
        Ok(())
    }

    /// Builder form of [`RasterMap::insert_layer`].
    pub fn with_layer(
        mut self,
        name: impl Into<String>,
        data: DMatrix<f32>,
    ) -> Result<Self, RasterError> {
        self.insert_layer(name, data)?;
        Ok(self)
    }

    /// Insert a layer with every cell set to `value`.
    pub fn add_constant_layer(&mut self, name: impl Into<String>, value: f32) {
        let size = self.geometry.size;
        self.layers
            .insert(name.into(), DMatrix::from_element(size.rows, size.cols, value));
    }

    /// Insert a layer whose values are computed from the logical index.
    pub fn add_layer_from_fn<F>(&mut self, name: impl Into<String>, mut f: F)
    where
        F: FnMut(GridIndex) -> f32,
    {
        let size = self.geometry.size;
        let mut data = DMatrix::from_element(size.rows, size.cols, f32::NAN);
        for r in 0..size.rows {
            for c in 0..size.cols {
                let logical = GridIndex::new(r as i32, c as i32);
                let b = self.geometry.buffer_index(logical);
                data[(b.row as usize, b.col as usize)] = f(logical);
            }
        }
        self.layers.insert(name.into(), data);
    }

    #[inline]
    pub fn has_layer(&self, name: &str) -> bool {
        self.layers.contains_key(name)
    }

    pub fn layer_names(&self) -> impl Iterator<Item = &str> {
        self.layers.keys().map(String::as_str)
    }

    /// Raw buffer-ordered layer data.
    pub fn layer(&self, name: &str) -> Result<&DMatrix<f32>, RasterError> {
        self.layers
            .get(name)
            .ok_or_else(|| RasterError::MissingLayer(name.to_owned()))
    }

    /// Value at a logical index; `None` out of bounds or for a missing layer.
    ///
    /// Undefined cells come back as `Some(NaN)`.
    pub fn get(&self, name: &str, index: GridIndex) -> Option<f32> {
        if !self.geometry.size.contains(index) {
            return None;
        }
        let data = self.layers.get(name)?;
        let b = self.geometry.buffer_index(index);
        Some(data[(b.row as usize, b.col as usize)])
    }

    /// Defined (non-NaN) value at a logical index.
    #[inline]
    pub fn defined(&self, name: &str, index: GridIndex) -> Option<f32> {
        self.get(name, index).filter(|v| !v.is_nan())
    }

    /// Defined value of the cell containing `position`.
    pub fn at_position(&self, name: &str, position: Point2<f64>) -> Option<f32> {
        let index = self.geometry.index_of(position)?;
        self.defined(name, index)
    }

    pub fn set(&mut self, name: &str, index: GridIndex, value: f32) -> Result<(), RasterError> {
        let size = self.geometry.size;
        if !size.contains(index) {
            return Err(RasterError::IndexOutOfBounds { index, size });
        }
        let b = self.geometry.buffer_index(index);
        let data = self
            .layers
            .get_mut(name)
            .ok_or_else(|| RasterError::MissingLayer(name.to_owned()))?;
        data[(b.row as usize, b.col as usize)] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn geometry(rows: usize, cols: usize) -> RasterGeometry {
        RasterGeometry::new(GridSize::new(rows, cols), 0.5, Point2::new(2.0, -1.0))
            .expect("geometry")
    }

    #[test]
    fn corner_cells_map_to_expected_positions() {
        let g = geometry(4, 6);
        let p00 = g.position_of(GridIndex::new(0, 0)).expect("inside");
        assert_abs_diff_eq!(p00.x, 2.0 + 1.0 - 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(p00.y, -1.0 + 1.5 - 0.25, epsilon = 1e-12);

        let p_last = g.position_of(GridIndex::new(3, 5)).expect("inside");
        assert_abs_diff_eq!(p_last.x, 2.0 - 1.0 + 0.25, epsilon = 1e-12);
        assert_abs_diff_eq!(p_last.y, -1.0 - 1.5 + 0.25, epsilon = 1e-12);
        assert!(g.position_of(GridIndex::new(4, 0)).is_none());
    }

    #[test]
    fn index_position_round_trip() {
        let g = geometry(5, 3);
        for r in 0..5 {
            for c in 0..3 {
                let idx = GridIndex::new(r, c);
                let p = g.position_of(idx).expect("inside");
                assert_eq!(g.index_of(p), Some(idx));
            }
        }
        assert!(g.index_of(Point2::new(100.0, 0.0)).is_none());
    }

    #[test]
    fn from_length_rounds_cell_count() {
        let g = RasterGeometry::from_length(Vector2::new(10.0, 7.4), 2.5, Point2::origin())
            .expect("geometry");
        assert_eq!(g.size, GridSize::new(4, 3));
    }

    #[test]
    fn rejects_bad_geometry() {
        assert!(RasterGeometry::new(GridSize::new(0, 3), 1.0, Point2::origin()).is_err());
        assert!(RasterGeometry::new(GridSize::new(3, 3), 0.0, Point2::origin()).is_err());
    }

    #[test]
    fn logical_reads_follow_start_index() {
        let g = geometry(3, 4).with_start_index(GridIndex::new(1, 2));
        let mut map = RasterMap::new(g);
        map.add_layer_from_fn("elevation", |idx| (idx.row * 10 + idx.col) as f32);

        for r in 0..3 {
            for c in 0..4 {
                let v = map.get("elevation", GridIndex::new(r, c)).expect("value");
                assert_eq!(v, (r * 10 + c) as f32);
            }
        }
        // logical (0, 0) lives at buffer slot (1, 2)
        let raw = map.layer("elevation").expect("layer");
        assert_eq!(raw[(1, 2)], 0.0);
    }

    #[test]
    fn layer_shape_is_enforced() {
        let mut map = RasterMap::new(geometry(3, 3));
        let err = map
            .insert_layer("elevation", DMatrix::zeros(3, 4))
            .expect_err("shape mismatch");
        assert!(matches!(err, RasterError::LayerShape { .. }));
        assert!(matches!(
            map.layer("variance"),
            Err(RasterError::MissingLayer(_))
        ));
    }

    #[test]
    fn nan_cells_are_undefined() {
        let mut map = RasterMap::new(geometry(2, 2));
        map.add_constant_layer("elevation", f32::NAN);
        map.set("elevation", GridIndex::new(1, 1), 3.0).expect("set");
        assert!(map.get("elevation", GridIndex::new(0, 0)).expect("in range").is_nan());
        assert_eq!(map.defined("elevation", GridIndex::new(0, 0)), None);
        assert_eq!(map.defined("elevation", GridIndex::new(1, 1)), Some(3.0));
        let p = map.geometry().position_of(GridIndex::new(1, 1)).expect("inside");
        assert_eq!(map.at_position("elevation", p), Some(3.0));
    }
}
