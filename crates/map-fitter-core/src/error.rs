use crate::{GridIndex, GridSize};

/// Errors raised by raster construction and access.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum RasterError {
    #[error("layer `{0}` not found")]
    MissingLayer(String),
    #[error("layer `{name}` has shape {got:?}, map expects {expected:?}")]
    LayerShape {
        name: String,
        expected: GridSize,
        got: GridSize,
    },
    #[error("index {index:?} outside raster of size {size:?}")]
    IndexOutOfBounds { index: GridIndex, size: GridSize },
    #[error("invalid raster geometry: {0}")]
    InvalidGeometry(String),
}
