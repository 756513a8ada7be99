//! Raster types for elevation map fitting.
//!
//! Grid geometry (index <-> position), circular-buffer index arithmetic and
//! a multi-layer `f32` raster with NaN as the "no data" marker. The matching
//! itself lives in the `map-fitter` crate.

mod error;
mod index;
mod logger;
mod raster;

pub use error::RasterError;
pub use index::{
    to_buffer_index, to_logical_index, wrap_grid_index, wrap_index, GridIndex, GridSize,
};
pub use raster::{RasterGeometry, RasterMap};

#[cfg(feature = "tracing")]
pub use logger::init_tracing;

pub use logger::{init_with_filter, init_with_level, LogFilter, LogFilterError};
