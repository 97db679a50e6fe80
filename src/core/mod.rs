//! Core data types, geometry and I/O operations.

pub mod geometry;
pub mod loaders;
pub mod projection;
pub mod writers;

pub use geometry::{BoundingBox, BufferedBox, GeometryError, Polygon};
pub use loaders::{CsvReader, Extents, LasReader, LoaderError, PointCloud, PointCloudReader};
pub use projection::{ProjectionError, ProjectionResolver, UtmResolver, UtmZone};
pub use writers::{write_ascii_grid, write_tile_polygons, write_voxel_layers, GridHeader, WriteError};
