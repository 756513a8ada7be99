use map_fitter_core::RasterError;

/// Errors returned by the map fitter.
#[derive(thiserror::Error, Debug)]
pub enum FitError {
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error("invalid search parameters: {0}")]
    InvalidParams(String),
    #[error("live map resolution {live} differs from reference resolution {reference}")]
    ResolutionMismatch { live: f64, reference: f64 },
    #[error("no live sample overlaps a defined reference cell")]
    NoOverlap,
}
