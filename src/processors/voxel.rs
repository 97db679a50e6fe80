//! Voxel binning and per-cell aggregation.
//!
//! A `VoxelGrid` discretizes a point cloud's bounding volume into a regular
//! grid and groups point indices by cell. Bin assignment is reproducible
//! across runs and platforms:
//!
//! - `dim = floor((max - min) / cell_size)` per axis, so a trailing partial
//!   cell is folded into its neighbor rather than forming its own bin
//! - bin edges are `dim` evenly spaced values from `min` to `max` inclusive
//! - a point's bin is the first edge `>=` its coordinate, clamped to `dim - 1`
//!
//! Aggregation reduces each occupied cell to one scalar and returns a dense
//! `VoxelArray` with an occupancy mask, so empty cells are distinguishable
//! from cells whose aggregate is zero.
//!
//! # Example
//!
//! ```
//! use lidar_pipeline::core::loaders::PointCloud;
//! use lidar_pipeline::processors::voxel::{Reducer, VoxelGrid};
//!
//! let cloud = PointCloud::from_xyz(vec![0.0, 0.0], vec![0.0, 0.0], vec![5.0, 9.0]);
//! let grid = VoxelGrid::new(&cloud, 10.0).unwrap();
//! let array = grid.aggregate("z", Reducer::Max).unwrap();
//! assert_eq!(array.get_cell(0, 0, 0), Some(9.0));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

use log::debug;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::geometry::BoundingBox;
use crate::core::loaders::PointCloud;

/// Errors that can occur during voxelization.
#[derive(Debug, Error, PartialEq)]
pub enum VoxelError {
    #[error("cell size must be a finite value > 0, got {0}")]
    InvalidCellSize(f64),

    #[error("grid of {cells:?} cells along x, y and z is too large to allocate")]
    GridTooLarge { cells: [f64; 3] },

    #[error("unknown point field '{0}'")]
    UnknownField(String),

    #[error("unknown reducer '{0}' (expected max, min, mean, sum, count or first)")]
    UnknownReducer(String),
}

/// Integer cell coordinate `(i, j, k)` along x, y and z.
pub type CellKey = (usize, usize, usize);

/// Statistic used to reduce the values of one voxel to a scalar.
///
/// NaN values (fields missing on stitched neighbors) are ignored by every
/// reducer except `Count` and `First`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reducer {
    #[default]
    Max,
    Min,
    Mean,
    Sum,
    Count,
    First,
}

impl Reducer {
    pub fn reduce(&self, values: &[f64]) -> f64 {
        let valid = values.iter().copied().filter(|v| !v.is_nan());
        match self {
            Reducer::Max => valid.reduce(f64::max).unwrap_or(f64::NAN),
            Reducer::Min => valid.reduce(f64::min).unwrap_or(f64::NAN),
            Reducer::Sum => valid.sum(),
            Reducer::Mean => {
                let (sum, count) = valid.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
                if count == 0 {
                    f64::NAN
                } else {
                    sum / count as f64
                }
            }
            Reducer::Count => values.len() as f64,
            Reducer::First => values.first().copied().unwrap_or(f64::NAN),
        }
    }
}

impl FromStr for Reducer {
    type Err = VoxelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "max" => Ok(Reducer::Max),
            "min" => Ok(Reducer::Min),
            "mean" => Ok(Reducer::Mean),
            "sum" => Ok(Reducer::Sum),
            "count" => Ok(Reducer::Count),
            "first" => Ok(Reducer::First),
            other => Err(VoxelError::UnknownReducer(other.to_string())),
        }
    }
}

impl fmt::Display for Reducer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Reducer::Max => "max",
            Reducer::Min => "min",
            Reducer::Mean => "mean",
            Reducer::Sum => "sum",
            Reducer::Count => "count",
            Reducer::First => "first",
        };
        f.write_str(name)
    }
}

/// Grid dimensions: `m` rows along y, `n` columns along x, `p` layers along z.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct GridDims {
    pub m: usize,
    pub n: usize,
    pub p: usize,
}

impl GridDims {
    /// Array shape `(m, n, p)`.
    pub fn shape(&self) -> [usize; 3] {
        [self.m, self.n, self.p]
    }

    /// Total cells, saturating at `usize::MAX`.
    pub fn cell_count(&self) -> usize {
        self.m.saturating_mul(self.n).saturating_mul(self.p)
    }
}

/// A regular 3D grid over a borrowed point cloud.
#[derive(Debug, Clone)]
pub struct VoxelGrid<'a> {
    cloud: &'a PointCloud,
    cell_size: f64,
    origin: [f64; 3],
    extent: [f64; 3],
    dims: GridDims,
    edges: [Vec<f64>; 3],
    cells: HashMap<CellKey, Vec<usize>>,
}

impl<'a> VoxelGrid<'a> {
    /// Bins every point of `cloud` into cells of edge length `cell_size`.
    ///
    /// An empty cloud yields a grid with zero dimensions and no cells.
    pub fn new(cloud: &'a PointCloud, cell_size: f64) -> Result<Self, VoxelError> {
        if !(cell_size.is_finite() && cell_size > 0.0) {
            return Err(VoxelError::InvalidCellSize(cell_size));
        }

        let Some(extents) = cloud.extents() else {
            return Ok(Self {
                cloud,
                cell_size,
                origin: [0.0; 3],
                extent: [0.0; 3],
                dims: GridDims::default(),
                edges: [Vec::new(), Vec::new(), Vec::new()],
                cells: HashMap::new(),
            });
        };

        let counts: [f64; 3] =
            std::array::from_fn(|axis| axis_cells(extents.min[axis], extents.max[axis], cell_size));
        let axis_dims = checked_dims(counts).ok_or(VoxelError::GridTooLarge { cells: counts })?;
        let edges: [Vec<f64>; 3] =
            std::array::from_fn(|axis| linspace(extents.min[axis], extents.max[axis], axis_dims[axis]));

        let mut cells: HashMap<CellKey, Vec<usize>> = HashMap::new();
        for idx in 0..cloud.len() {
            let key = (
                bin(&edges[0], cloud.x[idx]),
                bin(&edges[1], cloud.y[idx]),
                bin(&edges[2], cloud.z[idx]),
            );
            cells.entry(key).or_default().push(idx);
        }

        let dims = GridDims {
            m: axis_dims[1],
            n: axis_dims[0],
            p: axis_dims[2],
        };

        debug!(
            "Voxelized {} points into {}x{}x{} grid ({} occupied cells)",
            cloud.len(),
            dims.m,
            dims.n,
            dims.p,
            cells.len()
        );

        Ok(Self {
            cloud,
            cell_size,
            origin: extents.min,
            extent: extents.max,
            dims,
            edges,
            cells,
        })
    }

    pub fn cell_size(&self) -> f64 {
        self.cell_size
    }

    /// Minimum corner `(x, y, z)`.
    pub fn origin(&self) -> [f64; 3] {
        self.origin
    }

    /// Maximum corner `(x, y, z)`.
    pub fn extent(&self) -> [f64; 3] {
        self.extent
    }

    pub fn dims(&self) -> GridDims {
        self.dims
    }

    pub fn cloud(&self) -> &'a PointCloud {
        self.cloud
    }

    /// Bin edges along axis 0 (x), 1 (y) or 2 (z).
    pub fn edges(&self, axis: usize) -> &[f64] {
        &self.edges[axis]
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Point indices in cell `(i, j, k)`, if occupied.
    pub fn cell(&self, i: usize, j: usize, k: usize) -> Option<&[usize]> {
        self.cells.get(&(i, j, k)).map(Vec::as_slice)
    }

    pub fn cells(&self) -> &HashMap<CellKey, Vec<usize>> {
        &self.cells
    }

    /// Cell coordinate an arbitrary point would fall in, clamped to the grid.
    ///
    /// Returns `None` for a grid built from an empty cloud.
    pub fn bin_of(&self, x: f64, y: f64, z: f64) -> Option<CellKey> {
        if self.dims.cell_count() == 0 {
            return None;
        }
        Some((bin(&self.edges[0], x), bin(&self.edges[1], y), bin(&self.edges[2], z)))
    }

    /// Row and column ranges of the cells covering `bbox`, clamped to the grid.
    pub fn window(&self, bbox: &BoundingBox) -> Option<(Range<usize>, Range<usize>)> {
        let (i0, j0, _) = self.bin_of(bbox.min_x, bbox.min_y, self.origin[2])?;
        let (i1, j1, _) = self.bin_of(bbox.max_x, bbox.max_y, self.origin[2])?;
        Some((j0..j1 + 1, i0..i1 + 1))
    }

    /// Lower-left `(x, y)` of cell row `row`, column `col` at nominal
    /// `cell_size` spacing from the origin, as used to georeference exports.
    ///
    /// Bin edges are spaced `extent / (dim - 1)`, so this corner can differ
    /// from the binning by up to one cell.
    pub fn nominal_corner(&self, row: usize, col: usize) -> [f64; 2] {
        [
            self.origin[0] + col as f64 * self.cell_size,
            self.origin[1] + row as f64 * self.cell_size,
        ]
    }

    /// Reduces `field` within every occupied cell with a built-in statistic.
    pub fn aggregate(&self, field: &str, reducer: Reducer) -> Result<VoxelArray, VoxelError> {
        self.aggregate_with(field, |values| reducer.reduce(values))
    }

    /// Reduces `field` within every occupied cell with a custom function.
    pub fn aggregate_with<F>(&self, field: &str, reduce: F) -> Result<VoxelArray, VoxelError>
    where
        F: Fn(&[f64]) -> f64,
    {
        let values = self
            .cloud
            .field(field)
            .ok_or_else(|| VoxelError::UnknownField(field.to_string()))?;

        let mut array = VoxelArray::zeros(self.dims);
        let mut scratch = Vec::new();
        for (&(i, j, k), members) in &self.cells {
            scratch.clear();
            scratch.extend(members.iter().map(|&idx| values[idx]));
            array.set(j, i, k, reduce(&scratch));
        }

        Ok(array)
    }
}

/// Dense `(m, n, p)` array of cell aggregates with an occupancy mask.
///
/// Cell `(i, j, k)` of the grid lives at row `j`, column `i`, layer `k`.
/// Unoccupied cells hold `0.0` and are flagged in the mask.
#[derive(Debug, Clone, PartialEq)]
pub struct VoxelArray {
    shape: [usize; 3],
    values: Vec<f64>,
    occupied: Vec<bool>,
}

impl VoxelArray {
    pub fn zeros(dims: GridDims) -> Self {
        let len = dims.cell_count();
        Self {
            shape: dims.shape(),
            values: vec![0.0; len],
            occupied: vec![false; len],
        }
    }

    /// `(rows, cols, layers)`.
    pub fn shape(&self) -> [usize; 3] {
        self.shape
    }

    fn offset(&self, row: usize, col: usize, layer: usize) -> Option<usize> {
        let [m, n, p] = self.shape;
        (row < m && col < n && layer < p).then(|| (row * n + col) * p + layer)
    }

    fn set(&mut self, row: usize, col: usize, layer: usize, value: f64) {
        if let Some(at) = self.offset(row, col, layer) {
            self.values[at] = value;
            self.occupied[at] = true;
        }
    }

    pub fn get(&self, row: usize, col: usize, layer: usize) -> Option<f64> {
        self.offset(row, col, layer).map(|at| self.values[at])
    }

    /// Value of grid cell `(i, j, k)`.
    pub fn get_cell(&self, i: usize, j: usize, k: usize) -> Option<f64> {
        self.get(j, i, k)
    }

    pub fn is_occupied(&self, row: usize, col: usize, layer: usize) -> bool {
        self.offset(row, col, layer)
            .map(|at| self.occupied[at])
            .unwrap_or(false)
    }

    pub fn occupied_count(&self) -> usize {
        self.occupied.iter().filter(|&&o| o).count()
    }

    /// Raw values in row-major `(row, col, layer)` order.
    pub fn values(&self) -> &[f64] {
        &self.values
    }

    /// One z layer as a row-major `rows x cols` raster, row 0 at minimum y.
    pub fn layer(&self, layer: usize) -> Option<Vec<f64>> {
        let [m, n, p] = self.shape;
        if layer >= p {
            return None;
        }
        let mut out = Vec::with_capacity(m * n);
        for row in 0..m {
            for col in 0..n {
                out.push(self.values[(row * n + col) * p + layer]);
            }
        }
        Some(out)
    }

    /// Copy with every unoccupied cell set to `nodata`.
    pub fn filled(&self, nodata: f64) -> VoxelArray {
        let values = self
            .values
            .iter()
            .zip(&self.occupied)
            .map(|(&v, &occupied)| if occupied { v } else { nodata })
            .collect();
        VoxelArray {
            shape: self.shape,
            values,
            occupied: self.occupied.clone(),
        }
    }

    /// Sub-array of the given rows and columns across all layers.
    pub fn window(&self, rows: Range<usize>, cols: Range<usize>) -> VoxelArray {
        let [m, n, p] = self.shape;
        let rows = rows.start.min(m)..rows.end.min(m);
        let cols = cols.start.min(n)..cols.end.min(n);

        let shape = [rows.len(), cols.len(), p];
        let len = shape[0] * shape[1] * p;
        let mut values = Vec::with_capacity(len);
        let mut occupied = Vec::with_capacity(len);
        for row in rows {
            let start = (row * n + cols.start) * p;
            let end = (row * n + cols.end) * p;
            values.extend_from_slice(&self.values[start..end]);
            occupied.extend_from_slice(&self.occupied[start..end]);
        }

        VoxelArray {
            shape,
            values,
            occupied,
        }
    }
}

/// Largest cell count a dense `f64` array can address.
const MAX_CELLS: usize = isize::MAX as usize / std::mem::size_of::<f64>();

fn axis_cells(min: f64, max: f64, cell_size: f64) -> f64 {
    // A non-empty cloud always needs at least one bin per axis.
    ((max - min) / cell_size).floor().max(1.0)
}

/// Per-axis dims, or `None` when the grid could not be allocated.
fn checked_dims(counts: [f64; 3]) -> Option<[usize; 3]> {
    let mut dims = [0usize; 3];
    let mut total = 1usize;
    for (dim, &count) in dims.iter_mut().zip(&counts) {
        if !(count <= MAX_CELLS as f64) {
            return None;
        }
        *dim = count as usize;
        total = total.checked_mul(*dim)?;
    }
    (total <= MAX_CELLS).then_some(dims)
}

fn linspace(start: f64, stop: f64, count: usize) -> Vec<f64> {
    match count {
        0 => Vec::new(),
        1 => vec![start],
        _ => {
            let step = (stop - start) / (count - 1) as f64;
            let mut edges: Vec<f64> = (0..count).map(|i| start + step * i as f64).collect();
            edges[count - 1] = stop;
            edges
        }
    }
}

/// Index of the first edge `>= value`, clamped to the last bin.
#[inline]
fn bin(edges: &[f64], value: f64) -> usize {
    edges
        .partition_point(|&edge| edge < value)
        .min(edges.len().saturating_sub(1))
}
