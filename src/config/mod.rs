//! Configuration types for the LiDAR pipeline.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::core::loaders::{AnyReader, CsvReader, LasReader};
use crate::processors::voxel::Reducer;

/// What to do when a tile header cannot be read during indexing.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtentErrorPolicy {
    /// Abort the whole index build.
    #[default]
    FailFast,
    /// Drop the tile and record it in the index's skipped list.
    Skip,
}

/// Tile file format to index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileFormat {
    #[default]
    Las,
    Csv,
}

impl TileFormat {
    /// Reader for tiles of this format.
    pub fn reader(self) -> AnyReader {
        match self {
            TileFormat::Las => AnyReader::Las(LasReader),
            TileFormat::Csv => AnyReader::Csv(CsvReader),
        }
    }
}

/// Configuration for tile indexing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Worker threads for header reads and per-tile processing
    #[serde(default = "default_n_jobs")]
    pub n_jobs: usize,

    /// Read header extents while indexing; disable for very large collections
    #[serde(default = "default_get_bounding_boxes")]
    pub get_bounding_boxes: bool,

    /// Policy for unreadable tile headers
    #[serde(default)]
    pub on_extent_error: ExtentErrorPolicy,

    /// Tile format
    #[serde(default)]
    pub format: TileFormat,
}

fn default_n_jobs() -> usize {
    1
}

fn default_get_bounding_boxes() -> bool {
    true
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            n_jobs: default_n_jobs(),
            get_bounding_boxes: default_get_bounding_boxes(),
            on_extent_error: ExtentErrorPolicy::default(),
            format: TileFormat::default(),
        }
    }
}

/// Configuration for stitching neighbor tiles.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StitchConfig {
    /// Distance (in coordinate units) to grow each tile footprint by
    #[serde(default)]
    pub buffer_distance: f64,
}

/// Configuration for voxel binning and aggregation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoxelConfig {
    /// Edge length of a voxel
    #[serde(default = "default_cell_size")]
    pub cell_size: f64,

    /// Field summarized in each voxel
    #[serde(default = "default_field")]
    pub field: String,

    /// Statistic used to summarize each voxel
    #[serde(default)]
    pub reducer: Reducer,
}

fn default_cell_size() -> f64 {
    1.0
}

fn default_field() -> String {
    "z".to_string()
}

impl Default for VoxelConfig {
    fn default() -> Self {
        Self {
            cell_size: default_cell_size(),
            field: default_field(),
            reducer: Reducer::default(),
        }
    }
}

/// Configuration for raster/vector export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Value written for voxels that hold no points
    #[serde(default = "default_nodata")]
    pub nodata: f64,

    /// UTM zone label (e.g. "10N") used when tiles carry no projection
    #[serde(default)]
    pub utm_zone: Option<String>,
}

fn default_nodata() -> f64 {
    -9999.0
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            nodata: default_nodata(),
            utm_zone: None,
        }
    }
}

/// Main pipeline configuration combining all sub-configs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    pub index: IndexConfig,

    #[serde(default)]
    pub stitch: StitchConfig,

    #[serde(default)]
    pub voxel: VoxelConfig,

    #[serde(default)]
    pub export: ExportConfig,
}

impl PipelineConfig {
    /// Load configuration from a YAML file.
    pub fn from_yaml<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a YAML file.
    pub fn to_yaml<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = serde_yaml::to_string(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Reject settings that would fail later, before any tile is touched.
    pub fn validate(&self) -> Result<(), String> {
        if self.index.n_jobs == 0 {
            return Err("index.n_jobs must be > 0".to_string());
        }
        if !(self.stitch.buffer_distance >= 0.0) {
            return Err(format!(
                "stitch.buffer_distance must be >= 0, got {}",
                self.stitch.buffer_distance
            ));
        }
        if !(self.voxel.cell_size.is_finite() && self.voxel.cell_size > 0.0) {
            return Err(format!("voxel.cell_size must be > 0, got {}", self.voxel.cell_size));
        }
        Ok(())
    }
}
