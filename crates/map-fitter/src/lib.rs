//! Exhaustive pose search aligning a live elevation map to a reference map.
//!
//! For every rotation `0, inc, 2 inc, ...` and every strided anchor cell of
//! the reference map, live samples are paired with reference cells and
//! scored with four similarity metrics (NCC, SSD, SAD, MI). The best score
//! per coarse cell is kept across rotations, and a pose is only reported if
//! its anchor cell produced a valid match under every rotation. The vertical
//! offset between the maps is estimated at the winning pose.
//!
//! ```no_run
//! use map_fitter::{exhaustive_search, load_raster, NullSink, SearchParams};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let live = load_raster("live.json")?;
//! let reference = load_raster("reference.json")?;
//! let params = SearchParams {
//!     angle_increment_deg: 10.0,
//!     ..SearchParams::default()
//! };
//! let outcome = exhaustive_search(&live, &reference, &params, &mut NullSink)?;
//! if let Some(pose) = outcome.poses.ncc {
//!     println!("NCC {:.3} at {:?}, {} deg", pose.score, pose.position, pose.rotation_deg);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! ## Features
//! - `cli` (default): the `map-fitter` binary.
//! - `rayon`: evaluate the anchors of one rotation in parallel.
//! - `tracing`: `tracing` spans on the search entry points.

mod accumulator;
mod error;
mod io;
mod matching;
mod metric;
mod metrics;
mod params;
mod search;
mod select;
mod stats;
mod z_offset;

pub use accumulator::{AccumulatorGrid, CellBest, VoteGrid};
pub use error::FitError;
pub use io::{
    load_raster, write_raster, FitConfig, FitIoError, FitReport, RasterMapFile, SnapshotWriter,
};
pub use matching::{
    extract_candidate, extract_matches, Candidate, MapPair, MatchRejection, MatchSet,
    SamplePattern,
};
pub use metric::{Metric, PerMetric};
pub use metrics::{
    evaluate_metrics, mean_error, mutual_information, normalized_cross_correlation, ErrorNorm,
    MetricScores, ELEVATION_RANGE, MI_BINS,
};
pub use params::{LayerNames, MetricThresholds, SampleWeighting, SearchParams};
pub use search::{
    exhaustive_search, AccumulatorSink, MapFitter, NullSink, RotationBest, RotationSummary,
    SearchOutcome, SearchState, SnapshotCollector,
};
pub use select::{anchor_pose, select_best_poses, PoseEstimate};
pub use stats::{
    angular_distance_deg, GroundTruth, MatchStatistics, MetricStatistics, PoseError,
    CORRECT_POSITION_TOLERANCE,
};
pub use z_offset::estimate_z_offset;

pub use map_fitter_core::{GridIndex, GridSize, RasterError, RasterGeometry, RasterMap};
