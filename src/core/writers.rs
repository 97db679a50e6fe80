//! Raster and vector exporters.
//!
//! This module writes pipeline results to plain GIS interchange formats:
//! - ESRI ASCII grids (`.asc`) with an optional `.prj` sidecar
//! - One ASCII grid per z layer of a voxel array
//! - CSV tables of tile footprints with WKT polygons

use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::processors::tile_index::{TileIndex, TileIndexError};
use crate::processors::voxel::VoxelArray;

/// Vertices per rounded corner when exporting buffered footprints.
const CORNER_SEGMENTS: usize = 8;

/// Errors that can occur during write operations.
#[derive(Error, Debug)]
pub enum WriteError {
    /// Failed to create parent directories.
    #[error("failed to create parent directories for '{path}': {source}")]
    CreateDirectory {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to create or open file for writing.
    #[error("failed to create file '{path}': {source}")]
    CreateFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// Failed to write data to file.
    #[error("failed to write to file '{path}': {source}")]
    WriteFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// CSV writing error.
    #[error("CSV write error for '{path}': {source}")]
    CsvError {
        path: String,
        #[source]
        source: csv::Error,
    },

    /// Raster values do not match the declared grid size.
    #[error("grid length mismatch: header declares {expected} cells, got {actual} values")]
    LengthMismatch { expected: usize, actual: usize },

    /// Tile geometry was unavailable.
    #[error(transparent)]
    Index(#[from] TileIndexError),
}

/// Result type for write operations.
pub type Result<T> = std::result::Result<T, WriteError>;

/// Georeferencing header of an ESRI ASCII grid.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridHeader {
    pub ncols: usize,
    pub nrows: usize,
    /// X of the lower-left corner
    pub xllcorner: f64,
    /// Y of the lower-left corner
    pub yllcorner: f64,
    pub cellsize: f64,
    pub nodata: f64,
}

/// Creates parent directories for a file path if they don't exist.
fn ensure_parent_dirs(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent).map_err(|e| WriteError::CreateDirectory {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
    }
    Ok(())
}

/// Creates a buffered writer for the given path.
fn create_buffered_writer(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).map_err(|e| WriteError::CreateFile {
        path: path.display().to_string(),
        source: e,
    })?;
    Ok(BufWriter::new(file))
}

/// Write one raster layer as an ESRI ASCII grid.
///
/// `layer` is row-major with row 0 at the minimum y, as produced by
/// [`VoxelArray::layer`]; rows are written north first as the format
/// requires. NaN values are written as `header.nodata`.
///
/// # Arguments
///
/// * `path` - Output `.asc` path (parent directories will be created if needed)
/// * `layer` - `nrows * ncols` cell values
/// * `header` - Grid georeferencing
/// * `wkt` - Projection written to a `.prj` sidecar next to `path`, if given
///
/// # Errors
///
/// Returns an error if:
/// - `layer` does not hold `nrows * ncols` values
/// - Parent directories cannot be created
/// - A file cannot be created or written to
pub fn write_ascii_grid(path: &Path, layer: &[f64], header: &GridHeader, wkt: Option<&str>) -> Result<()> {
    let expected = header.nrows * header.ncols;
    if layer.len() != expected {
        return Err(WriteError::LengthMismatch {
            expected,
            actual: layer.len(),
        });
    }

    ensure_parent_dirs(path)?;
    let mut writer = create_buffered_writer(path)?;
    let path_str = path.display().to_string();
    let write_err = |e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    };

    writeln!(writer, "ncols {}", header.ncols).map_err(write_err)?;
    writeln!(writer, "nrows {}", header.nrows).map_err(write_err)?;
    writeln!(writer, "xllcorner {}", header.xllcorner).map_err(write_err)?;
    writeln!(writer, "yllcorner {}", header.yllcorner).map_err(write_err)?;
    writeln!(writer, "cellsize {}", header.cellsize).map_err(write_err)?;
    writeln!(writer, "NODATA_value {}", header.nodata).map_err(write_err)?;

    if header.ncols > 0 {
        for row in layer.chunks(header.ncols).rev() {
            let line: Vec<String> = row
                .iter()
                .map(|&v| if v.is_nan() { header.nodata } else { v })
                .map(|v| v.to_string())
                .collect();
            writeln!(writer, "{}", line.join(" ")).map_err(write_err)?;
        }
    }

    writer.flush().map_err(write_err)?;

    if let Some(wkt) = wkt {
        let prj_path = path.with_extension("prj");
        fs::write(&prj_path, wkt).map_err(|e| WriteError::WriteFile {
            path: prj_path.display().to_string(),
            source: e,
        })?;
    }

    Ok(())
}

/// Write every z layer of a voxel array as `<stem>_z<k>.asc` under `dir`.
///
/// Unoccupied voxels are written as `nodata`. Returns the written grid
/// paths in layer order.
pub fn write_voxel_layers(
    dir: &Path,
    stem: &str,
    array: &VoxelArray,
    cell_size: f64,
    origin: [f64; 2],
    nodata: f64,
    wkt: Option<&str>,
) -> Result<Vec<PathBuf>> {
    fs::create_dir_all(dir).map_err(|e| WriteError::CreateDirectory {
        path: dir.display().to_string(),
        source: e,
    })?;

    let [nrows, ncols, layers] = array.shape();
    let header = GridHeader {
        ncols,
        nrows,
        xllcorner: origin[0],
        yllcorner: origin[1],
        cellsize: cell_size,
        nodata,
    };
    let filled = array.filled(nodata);

    let mut written = Vec::with_capacity(layers);
    for (k, layer) in (0..layers).filter_map(|k| filled.layer(k).map(|l| (k, l))) {
        let path = dir.join(format!("{}_z{:03}.asc", stem, k));
        write_ascii_grid(&path, &layer, &header, wkt)?;
        written.push(path);
    }

    Ok(written)
}

/// Write tile footprints to CSV with WKT polygons.
///
/// Columns are `path,min_x,max_x,min_y,max_y,wkt`, plus `buffered_wkt`
/// when a buffer distance is given.
///
/// # Errors
///
/// Returns an error if the index was built without bounding boxes, the
/// distance is negative, or the file cannot be written.
pub fn write_tile_polygons(path: &Path, index: &TileIndex, distance: Option<f64>) -> Result<()> {
    let polygons = index.polygons()?;
    let buffered = match distance {
        Some(d) => Some(index.buffer(d)?.buffered_polygons(CORNER_SEGMENTS)),
        None => None,
    };

    ensure_parent_dirs(path)?;
    let mut csv_writer = csv::Writer::from_writer(create_buffered_writer(path)?);
    let path_str = path.display().to_string();
    let csv_err = |e| WriteError::CsvError {
        path: path_str.clone(),
        source: e,
    };

    let mut header = vec!["path", "min_x", "max_x", "min_y", "max_y", "wkt"];
    if buffered.is_some() {
        header.push("buffered_wkt");
    }
    csv_writer.write_record(&header).map_err(csv_err)?;

    for (i, (tile, polygon)) in index.tiles().iter().zip(&polygons).enumerate() {
        // polygons() already guarantees every tile has a bbox
        let Some(bbox) = tile.bbox() else { continue };
        let mut record = vec![
            tile.path().display().to_string(),
            bbox.min_x.to_string(),
            bbox.max_x.to_string(),
            bbox.min_y.to_string(),
            bbox.max_y.to_string(),
            polygon.to_wkt(),
        ];
        if let Some(buffered) = &buffered {
            record.push(buffered[i].to_wkt());
        }
        csv_writer.write_record(&record).map_err(csv_err)?;
    }

    csv_writer.flush().map_err(|e| WriteError::WriteFile {
        path: path_str.clone(),
        source: e,
    })?;

    Ok(())
}
