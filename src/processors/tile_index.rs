//! Spatial catalog over a directory of point cloud tiles.
//!
//! A `TileIndex` holds one `Tile` per discovered file in directory-scan order,
//! together with the worker count used for every parallel operation derived
//! from it. Neighbor queries are a linear scan over tile footprints, which is
//! plenty for collections of a few thousand tiles.

use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use thiserror::Error;

use crate::config::{ExtentErrorPolicy, IndexConfig};
use crate::core::geometry::{BoundingBox, BufferedBox, GeometryError, Polygon};
use crate::core::loaders::{find_point_files, LoaderError, PointCloudReader};

use super::dispatch::{DispatchError, Dispatcher, WorkerError};

/// Errors that can occur while building or querying a tile index.
#[derive(Debug, Error)]
pub enum TileIndexError {
    #[error("No point cloud files found in directory: {0}")]
    NoFilesFound(PathBuf),

    #[error("Failed to scan directory {path}: {source}")]
    Scan {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Failed to read extents of {path}: {source}")]
    ExtentRead {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    #[error("Tile {0} has no bounding box; build the index with bounding boxes enabled")]
    MissingGeometry(PathBuf),

    #[error("Tile index {index} out of range for index of {len} tiles")]
    OutOfRange { index: usize, len: usize },

    #[error(transparent)]
    Dispatch(#[from] DispatchError),
}

impl From<GeometryError> for TileIndexError {
    fn from(err: GeometryError) -> Self {
        TileIndexError::InvalidConfig(err.to_string())
    }
}

/// Result type for tile index operations.
pub type Result<T> = std::result::Result<T, TileIndexError>;

/// One point cloud file and its planimetric footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    path: PathBuf,
    bbox: Option<BoundingBox>,
}

impl Tile {
    pub fn new(path: impl Into<PathBuf>, bbox: Option<BoundingBox>) -> Self {
        Self {
            path: path.into(),
            bbox,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Footprint, or `None` when the index was built without bounding boxes.
    pub fn bbox(&self) -> Option<&BoundingBox> {
        self.bbox.as_ref()
    }

    fn require_bbox(&self) -> Result<&BoundingBox> {
        self.bbox
            .as_ref()
            .ok_or_else(|| TileIndexError::MissingGeometry(self.path.clone()))
    }
}

/// A file left out of the index because its header could not be read.
#[derive(Debug, Clone, PartialEq)]
pub struct SkippedTile {
    pub path: PathBuf,
    pub reason: String,
}

/// Ordered collection of tiles with its worker configuration.
#[derive(Debug, Clone)]
pub struct TileIndex {
    tiles: Vec<Tile>,
    n_jobs: usize,
    skipped: Vec<SkippedTile>,
}

impl TileIndex {
    /// Indexes every tile under `directory` that `reader` understands.
    ///
    /// Header extents are read in parallel with `config.n_jobs` workers.
    /// Under `ExtentErrorPolicy::FailFast` the first unreadable header
    /// aborts the build; under `Skip` the tile is dropped and listed in
    /// [`TileIndex::skipped`].
    pub fn build<R: PointCloudReader>(directory: &Path, reader: &R, config: &IndexConfig) -> Result<Self> {
        validate_jobs(config.n_jobs)?;

        let paths = find_point_files(directory, reader.extensions()).map_err(|source| TileIndexError::Scan {
            path: directory.to_path_buf(),
            source,
        })?;
        if paths.is_empty() {
            return Err(TileIndexError::NoFilesFound(directory.to_path_buf()));
        }

        info!("Found {} tiles under {}", paths.len(), directory.display());

        let tiles: Vec<Tile> = paths.into_iter().map(|p| Tile::new(p, None)).collect();
        let index = TileIndex {
            tiles,
            n_jobs: config.n_jobs,
            skipped: Vec::new(),
        };

        if config.get_bounding_boxes {
            index.with_bounding_boxes(reader, config.on_extent_error)
        } else {
            Ok(index)
        }
    }

    /// Wraps tiles whose extents are already known.
    pub fn from_tiles(tiles: Vec<Tile>, n_jobs: usize) -> Result<Self> {
        validate_jobs(n_jobs)?;
        Ok(TileIndex {
            tiles,
            n_jobs,
            skipped: Vec::new(),
        })
    }

    /// Reads header extents for every tile, replacing any existing footprints.
    pub fn with_bounding_boxes<R: PointCloudReader>(self, reader: &R, policy: ExtentErrorPolicy) -> Result<Self> {
        let dispatcher = Dispatcher::new(self.n_jobs)?;
        let paths = self.paths();
        let read = |path: &PathBuf| reader.read_extents(path).map(|extents| extents.bbox());

        let mut skipped = self.skipped;
        let tiles = match policy {
            ExtentErrorPolicy::FailFast => {
                let boxes = dispatcher.apply(&paths, read).map_err(extent_error(&paths))?;
                paths
                    .into_iter()
                    .zip(boxes)
                    .map(|(path, bbox)| Tile::new(path, Some(bbox)))
                    .collect()
            }
            ExtentErrorPolicy::Skip => {
                let outcomes = dispatcher.apply_best_effort(&paths, read);
                let mut tiles = Vec::with_capacity(paths.len());
                for (path, outcome) in paths.into_iter().zip(outcomes) {
                    match outcome {
                        Ok(bbox) => tiles.push(Tile::new(path, Some(bbox))),
                        Err(err) => {
                            warn!("Skipping {}: {}", path.display(), err.source);
                            skipped.push(SkippedTile {
                                path,
                                reason: err.source.to_string(),
                            });
                        }
                    }
                }
                tiles
            }
        };

        debug!("Built footprints for {} tiles ({} skipped)", tiles.len(), skipped.len());

        Ok(TileIndex {
            tiles,
            n_jobs: self.n_jobs,
            skipped,
        })
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn tiles(&self) -> &[Tile] {
        &self.tiles
    }

    pub fn get(&self, index: usize) -> Result<&Tile> {
        self.tiles.get(index).ok_or(TileIndexError::OutOfRange {
            index,
            len: self.tiles.len(),
        })
    }

    pub fn paths(&self) -> Vec<PathBuf> {
        self.tiles.iter().map(|t| t.path.clone()).collect()
    }

    /// Number of workers used for parallel operations on this index.
    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    /// Files dropped by a skip-and-continue build.
    pub fn skipped(&self) -> &[SkippedTile] {
        &self.skipped
    }

    /// Footprint polygons in index order.
    pub fn polygons(&self) -> Result<Vec<Polygon>> {
        self.tiles
            .iter()
            .map(|t| t.require_bbox().map(BoundingBox::to_polygon))
            .collect()
    }

    /// Returns a view where every tile also carries a footprint buffered by `distance`.
    pub fn buffer(&self, distance: f64) -> Result<BufferedTileIndex> {
        if !(distance >= 0.0) {
            return Err(TileIndexError::InvalidConfig(format!(
                "buffer distance must be >= 0, got {}",
                distance
            )));
        }

        let tiles = self
            .tiles
            .iter()
            .map(|tile| {
                let buffered = tile.require_bbox()?.buffer(distance)?;
                Ok(BufferedTile {
                    tile: tile.clone(),
                    buffered,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(BufferedTileIndex {
            tiles,
            distance,
            n_jobs: self.n_jobs,
            skipped: self.skipped.clone(),
        })
    }

    /// Tiles whose footprint meets tile `index`'s footprint buffered by `distance`.
    pub fn intersecting(&self, index: usize, distance: f64) -> Result<TileIndex> {
        self.buffer(distance)?.intersecting(index)
    }

    /// Runs `func` on every tile with this index's worker count, in index order.
    ///
    /// The first failing tile aborts the run; its error is returned as a
    /// [`WorkerError`] naming the tile.
    pub fn par_apply<T, E, F>(&self, func: F) -> anyhow::Result<Vec<T>>
    where
        T: Send,
        E: std::error::Error + Send + Sync + 'static,
        F: Fn(&Tile) -> std::result::Result<T, E> + Sync + Send,
    {
        let dispatcher = Dispatcher::new(self.n_jobs)?;
        Ok(dispatcher.apply(&self.tiles, func)?)
    }
}

/// A tile paired with its buffered footprint.
#[derive(Debug, Clone, PartialEq)]
pub struct BufferedTile {
    pub tile: Tile,
    pub buffered: BufferedBox,
}

/// A tile index whose footprints have been buffered by a fixed distance.
#[derive(Debug, Clone)]
pub struct BufferedTileIndex {
    tiles: Vec<BufferedTile>,
    distance: f64,
    n_jobs: usize,
    skipped: Vec<SkippedTile>,
}

impl BufferedTileIndex {
    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }

    pub fn distance(&self) -> f64 {
        self.distance
    }

    pub fn n_jobs(&self) -> usize {
        self.n_jobs
    }

    /// Files dropped when the source index was built.
    pub fn skipped(&self) -> &[SkippedTile] {
        &self.skipped
    }

    pub fn tiles(&self) -> &[BufferedTile] {
        &self.tiles
    }

    pub fn get(&self, index: usize) -> Result<&BufferedTile> {
        self.tiles.get(index).ok_or(TileIndexError::OutOfRange {
            index,
            len: self.tiles.len(),
        })
    }

    /// The unbuffered index the view was derived from.
    pub fn unbuffered(&self) -> TileIndex {
        TileIndex {
            tiles: self.tiles.iter().map(|t| t.tile.clone()).collect(),
            n_jobs: self.n_jobs,
            skipped: self.skipped.clone(),
        }
    }

    /// Buffered footprint polygons with `segments` vertices per rounded corner.
    pub fn buffered_polygons(&self, segments: usize) -> Vec<Polygon> {
        self.tiles.iter().map(|t| t.buffered.to_polygon(segments)).collect()
    }

    /// Tiles whose unbuffered footprint meets the buffered footprint of tile `index`.
    ///
    /// The result keeps index order and worker count, and always contains
    /// tile `index` itself.
    pub fn intersecting(&self, index: usize) -> Result<TileIndex> {
        let target = &self.get(index)?.buffered;

        let tiles: Vec<Tile> = self
            .tiles
            .iter()
            .filter_map(|candidate| {
                let bbox = candidate.buffered.inner();
                target.intersects(bbox).then(|| candidate.tile.clone())
            })
            .collect();

        debug!(
            "Tile {} intersects {} tiles at buffer {}",
            index,
            tiles.len(),
            self.distance
        );

        Ok(TileIndex {
            tiles,
            n_jobs: self.n_jobs,
            skipped: self.skipped.clone(),
        })
    }
}

fn validate_jobs(n_jobs: usize) -> Result<()> {
    if n_jobs == 0 {
        return Err(TileIndexError::InvalidConfig("n_jobs must be > 0".to_string()));
    }
    Ok(())
}

fn extent_error(paths: &[PathBuf]) -> impl Fn(WorkerError<LoaderError>) -> TileIndexError + '_ {
    move |err| TileIndexError::ExtentRead {
        path: paths[err.index].clone(),
        source: err.source,
    }
}
