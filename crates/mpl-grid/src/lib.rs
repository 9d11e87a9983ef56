//! Voxel grid storage for the MPL engine.
//!
//! Owns the dense per-layer `u8` buffers, the staging/publish double
//! buffer used by the tick loop, Moore-neighborhood aggregation, per-tick
//! changesets, versioned snapshots, and the pattern interchange format.
//! The tick *scheduler* lives in `mpl-core`; this crate only provides the
//! data structures it drives.

mod buffer;
mod changeset;
mod layer;
mod neighborhood;
pub mod pattern;
mod snapshot;

pub use buffer::{GridSize, StagingBuffer, VoxelBuffer};
pub use changeset::{ChangedCell, Changeset};
pub use layer::Layer;
pub use neighborhood::{neighbor_summary, NeighborSummary, MOORE_OFFSETS};
pub use pattern::{ApplyOptions, MergeMode, Pattern, PatternError, PatternMeta};
pub use snapshot::{common_layer_size, CellState, GridSnapshot, LayerSnapshot};
