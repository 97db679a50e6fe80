//! Parallel processing pipeline for tiled LiDAR point cloud collections.
//!
//! This crate provides tools for:
//! - Indexing a directory of LAS or CSV tiles by their planimetric footprints
//! - Finding neighbor tiles within a buffer distance of a tile
//! - Stitching a tile with its neighbors to avoid edge effects
//! - Binning points into a voxel grid and reducing each cell to a scalar
//! - Exporting tile footprints and voxel layers to CSV and ASCII grids
//!
//! # Example
//!
//! ```no_run
//! use lidar_pipeline::config::IndexConfig;
//! use lidar_pipeline::core::loaders::LasReader;
//! use lidar_pipeline::processors::{stitch, Reducer, TileIndex, VoxelGrid};
//! use std::path::Path;
//!
//! let index = TileIndex::build(Path::new("tiles/"), &LasReader, &IndexConfig::default()).unwrap();
//! let cloud = stitch(&index, 0, 25.0, &LasReader).unwrap();
//! let grid = VoxelGrid::new(&cloud, 1.0).unwrap();
//! let canopy = grid.aggregate("z", Reducer::Max).unwrap();
//! ```

pub mod cli;
pub mod config;
pub mod core;
pub mod processors;

pub use config::{ExportConfig, IndexConfig, PipelineConfig, StitchConfig, VoxelConfig};
pub use core::loaders::PointCloud;
pub use processors::{Dispatcher, TileIndex, VoxelGrid};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
