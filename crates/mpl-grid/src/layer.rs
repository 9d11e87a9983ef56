//! Named grid layers.

use crate::buffer::{GridSize, VoxelBuffer};

/// One named voxel layer: identity + display defaults + cell storage.
///
/// The UI can override `visible`/`opacity`; the values here are only
/// the engine-side defaults carried into layer snapshots.
#[derive(Debug, Clone)]
pub struct Layer {
    /// Stable id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Default visibility.
    pub visible: bool,
    /// Default opacity, 0..1.
    pub opacity: f32,
    /// Cell storage.
    pub buffer: VoxelBuffer,
}

impl Layer {
    /// Create a visible, fully opaque layer with zeroed cells.
    pub fn new(id: impl Into<String>, name: impl Into<String>, size: GridSize) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            visible: true,
            opacity: 1.0,
            buffer: VoxelBuffer::new(size),
        }
    }
}
