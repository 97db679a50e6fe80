//! Merging tiles with their buffered neighbors.
//!
//! Computations near a tile edge (canopy maxima, local statistics) need
//! points from the adjoining tiles. Stitching loads the target tile plus
//! every tile whose footprint meets the target's buffered footprint and
//! concatenates them. The result deliberately contains a halo of neighbor
//! points; crop with [`StitchedTile::core`] once the computation is done.

use std::path::{Path, PathBuf};

use log::debug;
use thiserror::Error;

use crate::core::geometry::{BoundingBox, BufferedBox};
use crate::core::loaders::{LoaderError, PointCloud, PointCloudReader};

use super::dispatch::Dispatcher;
use super::tile_index::{Tile, TileIndex, TileIndexError};

/// Errors that can occur while stitching.
#[derive(Debug, Error)]
pub enum StitchError {
    #[error(transparent)]
    Index(#[from] TileIndexError),

    #[error("Failed to read points of {path}: {source}")]
    PointRead {
        path: PathBuf,
        #[source]
        source: LoaderError,
    },

    /// Failure inside a caller-supplied per-tile function.
    #[error("{0}")]
    Task(Box<dyn std::error::Error + Send + Sync>),
}

/// A target tile merged with its neighbors.
#[derive(Debug, Clone)]
pub struct StitchedTile {
    /// The tile the stitch was built for.
    pub tile: Tile,
    /// Footprint of the tile grown by the buffer distance.
    pub buffered: BufferedBox,
    /// Neighbor files merged into `cloud`, in index order, excluding the target.
    pub neighbors: Vec<PathBuf>,
    /// Target points first, then each neighbor's points.
    pub cloud: PointCloud,
}

impl StitchedTile {
    /// The unbuffered footprint, i.e. the region results should be clipped to.
    pub fn footprint(&self) -> &BoundingBox {
        self.buffered.inner()
    }

    /// Points of the stitched cloud inside the unbuffered footprint.
    pub fn core(&self) -> PointCloud {
        self.cloud.crop_xy(self.footprint())
    }
}

/// Loads tile `tile_index` merged with every tile intersecting its footprint
/// buffered by `distance`.
pub fn stitch<R: PointCloudReader>(
    index: &TileIndex,
    tile_index: usize,
    distance: f64,
    reader: &R,
) -> Result<PointCloud, StitchError> {
    Ok(stitch_tile(index, tile_index, distance, reader)?.cloud)
}

/// Like [`stitch`], keeping the target tile, its buffer and the neighbor list.
pub fn stitch_tile<R: PointCloudReader>(
    index: &TileIndex,
    tile_index: usize,
    distance: f64,
    reader: &R,
) -> Result<StitchedTile, StitchError> {
    let buffered_index = index.buffer(distance)?;
    let target = buffered_index.get(tile_index)?.clone();
    let intersecting = buffered_index.intersecting(tile_index)?;

    let read = |path: &Path| {
        reader.read_points(path).map_err(|source| StitchError::PointRead {
            path: path.to_path_buf(),
            source,
        })
    };

    let mut cloud = read(target.tile.path())?;
    let own_points = cloud.len();

    let neighbors: Vec<PathBuf> = intersecting
        .paths()
        .into_iter()
        .filter(|path| path.as_path() != target.tile.path())
        .collect();

    for path in &neighbors {
        cloud.append(&read(path.as_path())?);
    }

    debug!(
        "Stitched {} with {} neighbors: {} -> {} points",
        target.tile.path().display(),
        neighbors.len(),
        own_points,
        cloud.len()
    );

    Ok(StitchedTile {
        tile: target.tile,
        buffered: target.buffered,
        neighbors,
        cloud,
    })
}

/// Stitches every tile of the index in parallel, in index order.
pub fn stitch_all<R: PointCloudReader>(
    index: &TileIndex,
    distance: f64,
    reader: &R,
) -> anyhow::Result<Vec<StitchedTile>> {
    par_apply_stitched(index, distance, reader, Ok)
}

/// Stitches each tile and hands it to `func`, with the index's worker count.
///
/// Results come back in index order. The first failure, whether while
/// stitching or inside `func`, aborts the run and is returned as a
/// [`WorkerError<StitchError>`] naming the tile position.
pub fn par_apply_stitched<R, T, F>(
    index: &TileIndex,
    distance: f64,
    reader: &R,
    func: F,
) -> anyhow::Result<Vec<T>>
where
    R: PointCloudReader,
    T: Send,
    F: Fn(StitchedTile) -> Result<T, StitchError> + Sync + Send,
{
    let dispatcher = Dispatcher::new(index.n_jobs())?;
    let positions: Vec<usize> = (0..index.len()).collect();

    let results = dispatcher.apply(&positions, |&position| {
        let stitched = stitch_tile(index, position, distance, reader)?;
        func(stitched)
    })?;

    Ok(results)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::IndexConfig;
    use crate::core::loaders::CsvReader;
    use crate::processors::dispatch::WorkerError;
    use std::fs::File;
    use std::io::Write;
    use tempfile::TempDir;

    /// Writes a tile with `count` points spread across `bbox`.
    fn write_tile(dir: &Path, name: &str, bbox: BoundingBox, count: usize) {
        let mut file = File::create(dir.join(name)).unwrap();
        writeln!(file, "x,y,z,intensity").unwrap();
        for i in 0..count {
            let t = i as f64 / (count - 1).max(1) as f64;
            let x = bbox.min_x + t * bbox.width();
            let y = bbox.min_y + t * bbox.height();
            writeln!(file, "{},{},{},{}", x, y, i, i * 10).unwrap();
        }
    }

    /// Tiles a (10 pts), b (5 pts) adjacent; c (7 pts) 50 units away.
    fn collection() -> (TempDir, TileIndex) {
        let temp_dir = TempDir::new().unwrap();
        write_tile(temp_dir.path(), "a.csv", BoundingBox::new(0.0, 10.0, 0.0, 10.0), 10);
        write_tile(temp_dir.path(), "b.csv", BoundingBox::new(10.0, 20.0, 0.0, 10.0), 5);
        write_tile(temp_dir.path(), "c.csv", BoundingBox::new(70.0, 80.0, 0.0, 10.0), 7);

        let config = IndexConfig {
            n_jobs: 2,
            ..IndexConfig::default()
        };
        let index = TileIndex::build(temp_dir.path(), &CsvReader, &config).unwrap();
        (temp_dir, index)
    }

    #[test]
    fn test_stitch_adds_neighbor_points() {
        let (_dir, index) = collection();

        let cloud = stitch(&index, 0, 1.0, &CsvReader).unwrap();
        assert_eq!(cloud.len(), 15);
        // Target points come first.
        assert_eq!(cloud.x[0], 0.0);
        assert_eq!(cloud.x[10], 10.0);
    }

    #[test]
    fn test_stitch_isolated_tile_equals_own_points() {
        let (_dir, index) = collection();

        let stitched = stitch_tile(&index, 2, 5.0, &CsvReader).unwrap();
        assert!(stitched.neighbors.is_empty());
        assert_eq!(stitched.cloud.len(), 7);
    }

    #[test]
    fn test_stitch_never_shrinks() {
        let (_dir, index) = collection();

        for i in 0..index.len() {
            let own = CsvReader.read_points(index.get(i).unwrap().path()).unwrap().len();
            for distance in [0.5, 5.0, 100.0] {
                let stitched = stitch(&index, i, distance, &CsvReader).unwrap();
                assert!(stitched.len() >= own);
            }
        }
    }

    #[test]
    fn test_large_buffer_reaches_far_tile() {
        let (_dir, index) = collection();

        let stitched = stitch_tile(&index, 0, 60.0, &CsvReader).unwrap();
        let names: Vec<String> = stitched
            .neighbors
            .iter()
            .map(|p| p.file_name().unwrap().to_string_lossy().to_string())
            .collect();
        assert_eq!(names, vec!["b.csv", "c.csv"]);
        assert_eq!(stitched.cloud.len(), 22);
    }

    #[test]
    fn test_core_drops_halo() {
        let (_dir, index) = collection();

        let stitched = stitch_tile(&index, 1, 1.0, &CsvReader).unwrap();
        assert_eq!(stitched.cloud.len(), 15);
        // a's last point sits on the shared edge x = 10 and is kept.
        assert_eq!(stitched.core().len(), 6);
        assert_eq!(stitched.footprint(), &BoundingBox::new(10.0, 20.0, 0.0, 10.0));
    }

    #[test]
    fn test_stitch_rejects_negative_distance() {
        let (_dir, index) = collection();
        assert!(matches!(
            stitch(&index, 0, -1.0, &CsvReader),
            Err(StitchError::Index(TileIndexError::InvalidConfig(_)))
        ));
    }

    #[test]
    fn test_stitch_reports_unreadable_neighbor() {
        let (dir, index) = collection();
        std::fs::write(dir.path().join("b.csv"), "x,y,z\nbad,0,0\n").unwrap();

        match stitch(&index, 0, 1.0, &CsvReader) {
            Err(StitchError::PointRead { path, .. }) => assert!(path.ends_with("b.csv")),
            other => panic!("expected point read error, got {:?}", other),
        }
    }

    #[test]
    fn test_stitch_all_in_index_order() {
        let (_dir, index) = collection();

        let stitched = stitch_all(&index, 1.0, &CsvReader).unwrap();
        let sizes: Vec<usize> = stitched.iter().map(|s| s.cloud.len()).collect();
        assert_eq!(sizes, vec![15, 15, 7]);
        assert_eq!(stitched[2].tile.path(), index.get(2).unwrap().path());
    }

    #[test]
    fn test_par_apply_stitched_failure_names_tile() {
        let (_dir, index) = collection();

        let err = par_apply_stitched(&index, 1.0, &CsvReader, |stitched| {
            if stitched.neighbors.is_empty() {
                Err(StitchError::Task("tile has no neighbors".into()))
            } else {
                Ok(stitched.cloud.len())
            }
        })
        .unwrap_err();

        let worker = err.downcast_ref::<WorkerError<StitchError>>().unwrap();
        assert_eq!(worker.index, 2);
        assert_eq!(worker.source.to_string(), "tile has no neighbors");
    }
}
