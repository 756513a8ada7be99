//! Cell indices and circular-buffer index arithmetic.
//!
//! A raster stores its cells in a ring buffer: the *logical* index is the
//! spatially meaningful one (row 0 is the +x edge of the map), while the
//! *buffer* index is the storage slot. The two differ by a start-index
//! dependent shift, taken modulo the grid size.

use serde::{Deserialize, Serialize};
use std::ops::{Add, Sub};

/// Signed (row, col) cell index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct GridIndex {
    pub row: i32,
    pub col: i32,
}

impl GridIndex {
    pub const ZERO: GridIndex = GridIndex { row: 0, col: 0 };

    #[inline]
    pub const fn new(row: i32, col: i32) -> Self {
        Self { row, col }
    }
}

impl Add for GridIndex {
    type Output = GridIndex;

    #[inline]
    fn add(self, rhs: GridIndex) -> GridIndex {
        GridIndex::new(self.row + rhs.row, self.col + rhs.col)
    }
}

impl Sub for GridIndex {
    type Output = GridIndex;

    #[inline]
    fn sub(self, rhs: GridIndex) -> GridIndex {
        GridIndex::new(self.row - rhs.row, self.col - rhs.col)
    }
}

/// Number of rows and columns of a raster.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GridSize {
    pub rows: usize,
    pub cols: usize,
}

impl GridSize {
    #[inline]
    pub const fn new(rows: usize, cols: usize) -> Self {
        Self { rows, cols }
    }

    /// Total number of cells.
    #[inline]
    pub fn len(&self) -> usize {
        self.rows * self.cols
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    /// Whether `index` addresses a cell of this grid.
    #[inline]
    pub fn contains(&self, index: GridIndex) -> bool {
        index.row >= 0
            && index.col >= 0
            && (index.row as usize) < self.rows
            && (index.col as usize) < self.cols
    }

    /// Row-major linear offset of an in-range index.
    #[inline]
    pub fn linear(&self, index: GridIndex) -> Option<usize> {
        self.contains(index)
            .then(|| index.row as usize * self.cols + index.col as usize)
    }

    /// Row-major iterator over every `stride`-th index, starting at (0, 0).
    ///
    /// A zero stride yields nothing.
    pub fn strided(&self, stride: usize) -> impl Iterator<Item = GridIndex> + '_ {
        let (rows, cols) = if stride == 0 {
            (0, 0)
        } else {
            (self.rows, self.cols)
        };
        let step = stride.max(1);
        (0..rows).step_by(step).flat_map(move |r| {
            (0..cols)
                .step_by(step)
                .map(move |c| GridIndex::new(r as i32, c as i32))
        })
    }
}

/// Normalise a signed index into `[0, len)`.
///
/// `len` must be non-zero.
#[inline]
pub fn wrap_index(index: i64, len: usize) -> usize {
    index.rem_euclid(len as i64) as usize
}

/// Wrap both components of `index` into `size`.
#[inline]
pub fn wrap_grid_index(index: GridIndex, size: GridSize) -> GridIndex {
    GridIndex::new(
        wrap_index(index.row as i64, size.rows) as i32,
        wrap_index(index.col as i64, size.cols) as i32,
    )
}

/// Storage slot of a logical index for a buffer wrapping at `start`.
#[inline]
pub fn to_buffer_index(logical: GridIndex, size: GridSize, start: GridIndex) -> GridIndex {
    wrap_grid_index(logical + start, size)
}

/// Logical index of a storage slot for a buffer wrapping at `start`.
#[inline]
pub fn to_logical_index(buffer: GridIndex, size: GridSize, start: GridIndex) -> GridIndex {
    wrap_grid_index(buffer - start, size)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_handles_negative_and_overflowing_indices() {
        assert_eq!(wrap_index(-1, 10), 9);
        assert_eq!(wrap_index(-21, 10), 9);
        assert_eq!(wrap_index(10, 10), 0);
        assert_eq!(wrap_index(37, 10), 7);
        assert_eq!(wrap_index(4, 10), 4);
    }

    #[test]
    fn buffer_and_logical_conversions_are_inverse() {
        let size = GridSize::new(7, 5);
        for start in [GridIndex::ZERO, GridIndex::new(3, 4), GridIndex::new(6, 1)] {
            for r in 0..7 {
                for c in 0..5 {
                    let logical = GridIndex::new(r, c);
                    let buffer = to_buffer_index(logical, size, start);
                    assert!(size.contains(buffer));
                    assert_eq!(to_logical_index(buffer, size, start), logical);
                }
            }
        }
    }

    #[test]
    fn zero_start_is_identity() {
        let size = GridSize::new(4, 6);
        let idx = GridIndex::new(2, 5);
        assert_eq!(to_buffer_index(idx, size, GridIndex::ZERO), idx);
    }

    #[test]
    fn strided_iteration_is_row_major() {
        let size = GridSize::new(5, 4);
        let visited: Vec<_> = size.strided(2).collect();
        assert_eq!(
            visited,
            vec![
                GridIndex::new(0, 0),
                GridIndex::new(0, 2),
                GridIndex::new(2, 0),
                GridIndex::new(2, 2),
                GridIndex::new(4, 0),
                GridIndex::new(4, 2),
            ]
        );
        assert_eq!(size.strided(0).count(), 0);
    }

    #[test]
    fn contains_rejects_out_of_range() {
        let size = GridSize::new(3, 3);
        assert!(size.contains(GridIndex::new(2, 2)));
        assert!(!size.contains(GridIndex::new(3, 0)));
        assert!(!size.contains(GridIndex::new(0, -1)));
        assert_eq!(size.linear(GridIndex::new(1, 2)), Some(5));
        assert_eq!(size.linear(GridIndex::new(-1, 2)), None);
    }
}
