//! Tile catalog, parallel dispatch, stitching and voxelization.

pub mod dispatch;
pub mod stitch;
pub mod tile_index;
pub mod voxel;

// Re-export key types for convenience
pub use dispatch::{DispatchError, Dispatcher, WorkerError};
pub use stitch::{par_apply_stitched, stitch, stitch_all, stitch_tile, StitchError, StitchedTile};
pub use tile_index::{BufferedTile, BufferedTileIndex, SkippedTile, Tile, TileIndex, TileIndexError};
pub use voxel::{GridDims, Reducer, VoxelArray, VoxelError, VoxelGrid};
