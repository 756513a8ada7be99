//! JSON configuration, raster map files and reports.

use crate::search::{AccumulatorSink, SearchOutcome};
use crate::stats::{GroundTruth, PoseError};
use crate::{FitError, PerMetric, SearchParams};
use map_fitter_core::{GridIndex, GridSize, RasterError, RasterGeometry, RasterMap};
use nalgebra::{DMatrix, Point2};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::{
    fs,
    path::{Path, PathBuf},
};

#[derive(thiserror::Error, Debug)]
pub enum FitIoError {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Raster(#[from] RasterError),
    #[error(transparent)]
    Fit(#[from] FitError),
}

fn load_json<T: for<'de> Deserialize<'de>>(path: impl AsRef<Path>) -> Result<T, FitIoError> {
    let raw = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&raw)?)
}

fn write_json<T: Serialize>(value: &T, path: impl AsRef<Path>) -> Result<(), FitIoError> {
    let json = serde_json::to_string_pretty(value)?;
    fs::write(path, json)?;
    Ok(())
}

/// On-disk form of a [`RasterMap`].
///
/// Layers are row-major arrays in buffer order; `null` marks an undefined cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RasterMapFile {
    pub resolution: f64,
    pub center: [f64; 2],
    pub rows: usize,
    pub cols: usize,
    #[serde(default)]
    pub start_index: [i32; 2],
    pub layers: BTreeMap<String, Vec<Option<f32>>>,
}

impl RasterMapFile {
    pub fn from_raster(map: &RasterMap) -> Self {
        let g = map.geometry();
        let layers = map
            .layer_names()
            .filter_map(|name| map.layer(name).ok().map(|data| (name, data)))
            .map(|(name, data)| {
                let values = (0..data.nrows())
                    .flat_map(|r| (0..data.ncols()).map(move |c| data[(r, c)]))
                    .map(|v| (!v.is_nan()).then_some(v))
                    .collect();
                (name.to_owned(), values)
            })
            .collect();
        Self {
            resolution: g.resolution,
            center: [g.center.x, g.center.y],
            rows: g.size.rows,
            cols: g.size.cols,
            start_index: [g.start_index.row, g.start_index.col],
            layers,
        }
    }

    pub fn to_raster(&self) -> Result<RasterMap, RasterError> {
        let size = GridSize::new(self.rows, self.cols);
        let geometry = RasterGeometry::new(
            size,
            self.resolution,
            Point2::new(self.center[0], self.center[1]),
        )?
        .with_start_index(GridIndex::new(self.start_index[0], self.start_index[1]));

        let mut map = RasterMap::new(geometry);
        for (name, values) in &self.layers {
            if values.len() != size.len() {
                return Err(RasterError::LayerShape {
                    name: name.clone(),
                    expected: size,
                    got: GridSize::new(values.len() / self.cols.max(1), self.cols),
                });
            }
            let data = DMatrix::from_row_iterator(
                self.rows,
                self.cols,
                values.iter().map(|v| v.unwrap_or(f32::NAN)),
            );
            map.insert_layer(name.clone(), data)?;
        }
        Ok(map)
    }

    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, FitIoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), FitIoError> {
        write_json(self, path)
    }
}

/// Read a raster map file straight into a [`RasterMap`].
pub fn load_raster(path: impl AsRef<Path>) -> Result<RasterMap, FitIoError> {
    Ok(RasterMapFile::load_json(path)?.to_raster()?)
}

/// Write `map` as a raster map file.
pub fn write_raster(map: &RasterMap, path: impl AsRef<Path>) -> Result<(), FitIoError> {
    RasterMapFile::from_raster(map).write_json(path)
}

/// Configuration of one command-line fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitConfig {
    pub live_map: PathBuf,
    pub reference_map: PathBuf,
    #[serde(default)]
    pub report_path: Option<PathBuf>,
    /// Directory receiving one accumulator snapshot per rotation.
    #[serde(default)]
    pub snapshot_dir: Option<PathBuf>,
    #[serde(default)]
    pub ground_truth: Option<GroundTruth>,
    #[serde(default)]
    pub params: SearchParams,
}

impl FitConfig {
    /// Load a JSON config from disk.
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, FitIoError> {
        load_json(path)
    }

    /// Write this config to disk as pretty JSON.
    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), FitIoError> {
        write_json(self, path)
    }

    /// Resolve the output report path.
    pub fn report_path(&self) -> PathBuf {
        self.report_path
            .clone()
            .unwrap_or_else(|| PathBuf::from("map_fit_report.json"))
    }
}

/// Serialized result of one command-line fit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitReport {
    pub live_map: PathBuf,
    pub reference_map: PathBuf,
    pub params: SearchParams,
    pub outcome: SearchOutcome,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ground_truth: Option<GroundTruth>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<PerMetric<Option<PoseError>>>,
}

impl FitReport {
    pub fn load_json(path: impl AsRef<Path>) -> Result<Self, FitIoError> {
        load_json(path)
    }

    pub fn write_json(&self, path: impl AsRef<Path>) -> Result<(), FitIoError> {
        write_json(self, path)
    }
}

/// Sink writing every accumulator snapshot to `dir` as a raster map file.
///
/// Files are named `accumulator_<step>.json`. Write failures do not abort
/// the search; the first one is kept and can be taken with [`SnapshotWriter::finish`].
pub struct SnapshotWriter {
    dir: PathBuf,
    written: usize,
    error: Option<FitIoError>,
}

impl SnapshotWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, FitIoError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            written: 0,
            error: None,
        })
    }

    /// Number of snapshots written so far.
    pub fn written(&self) -> usize {
        self.written
    }

    /// Number of snapshots written, or the first write error.
    pub fn finish(self) -> Result<usize, FitIoError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.written),
        }
    }
}

impl AccumulatorSink for SnapshotWriter {
    fn publish(&mut self, rotation_deg: f64, snapshot: &RasterMap) {
        if self.error.is_some() {
            return;
        }
        let path = self.dir.join(format!("accumulator_{:03}.json", self.written));
        match write_raster(snapshot, &path) {
            Ok(()) => {
                log::debug!("rotation {rotation_deg}: snapshot written to {}", path.display());
                self.written += 1;
            }
            Err(err) => {
                log::warn!("failed to write snapshot {}: {err}", path.display());
                self.error = Some(err);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn sample_map() -> RasterMap {
        let g = RasterGeometry::new(GridSize::new(3, 4), 0.25, Point2::new(1.0, -1.0))
            .expect("geometry")
            .with_start_index(GridIndex::new(1, 2));
        let mut map = RasterMap::new(g);
        map.add_layer_from_fn("elevation", |i| {
            if i == GridIndex::new(2, 3) {
                f32::NAN
            } else {
                (i.row * 10 + i.col) as f32
            }
        });
        map.add_constant_layer("variance", 0.1);
        map
    }

    #[test]
    fn raster_file_preserves_logical_values() {
        let map = sample_map();
        let file = RasterMapFile::from_raster(&map);
        assert_eq!(file.layers["elevation"].len(), 12);
        assert_eq!(file.layers["elevation"].iter().filter(|v| v.is_none()).count(), 1);

        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("map.json");
        write_raster(&map, &path).expect("write");
        let loaded = load_raster(&path).expect("load");

        assert_eq!(loaded.geometry(), map.geometry());
        assert_eq!(loaded.defined("elevation", GridIndex::new(1, 2)), Some(12.0));
        assert_eq!(loaded.defined("elevation", GridIndex::new(2, 3)), None);
        assert_eq!(loaded.get("variance", GridIndex::new(0, 0)), Some(0.1));
    }

    #[test]
    fn truncated_layer_is_rejected() {
        let mut file = RasterMapFile::from_raster(&sample_map());
        file.layers
            .get_mut("elevation")
            .expect("layer")
            .truncate(8);
        assert!(matches!(
            file.to_raster(),
            Err(RasterError::LayerShape { .. })
        ));
    }

    #[test]
    fn config_parses_with_defaults() {
        let json = r#"{
            "live_map": "live.json",
            "reference_map": "reference.json",
            "ground_truth": { "position": [1.5, -2.0], "rotation_deg": 90.0 },
            "params": { "angle_increment": 90, "required_overlap": 0.6 }
        }"#;
        let dir = tempdir().expect("tempdir");
        let path = dir.path().join("fit.json");
        fs::write(&path, json).expect("write");

        let config = FitConfig::load_json(&path).expect("load");
        assert_eq!(config.params.angle_increment_deg, 90.0);
        assert_eq!(config.params.position_search_stride, 5);
        assert_eq!(config.report_path(), PathBuf::from("map_fit_report.json"));
        let truth = config.ground_truth.expect("truth");
        assert_eq!(truth.position, Point2::new(1.5, -2.0));

        let copy = dir.path().join("copy.json");
        config.write_json(&copy).expect("write");
        assert_eq!(FitConfig::load_json(&copy).expect("reload"), config);
    }

    #[test]
    fn snapshot_writer_numbers_files() {
        let dir = tempdir().expect("tempdir");
        let mut writer = SnapshotWriter::new(dir.path().join("snapshots")).expect("writer");
        writer.publish(0.0, &sample_map());
        writer.publish(90.0, &sample_map());
        assert_eq!(writer.finish().expect("no errors"), 2);
        assert!(dir.path().join("snapshots/accumulator_001.json").exists());
    }
}
