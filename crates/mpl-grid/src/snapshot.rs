//! Read-only snapshots published once per tick.
//!
//! Consumers poll `{version, snapshot}` pairs and treat an unchanged
//! `version` as "no new data". Snapshots are built only after the
//! write-buffer swap completes, so they always observe a fully
//! pre-tick or fully post-tick grid.

use crate::buffer::{GridSize, VoxelBuffer};
use crate::layer::Layer;
use log::warn;

/// State of one cell at snapshot time.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellState {
    pub value: u8,
    pub position: (usize, usize, usize),
    pub step: u64,
    pub timestamp_ms: u64,
}

/// A single-grid snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct GridSnapshot {
    /// Monotonic publish counter; bumps once per tick/reset.
    pub version: u64,
    /// The tick this snapshot reflects.
    pub step: u64,
    pub size: GridSize,
    /// Flattened cells, index = `x + y*sx + z*sx*sy`.
    pub channel: Vec<u8>,
    /// Wall-clock creation time (display metadata only — excluded from
    /// determinism guarantees).
    pub timestamp_ms: u64,
}

impl GridSnapshot {
    /// Capture a buffer.
    pub fn capture(buffer: &VoxelBuffer, version: u64, step: u64, timestamp_ms: u64) -> Self {
        Self {
            version,
            step,
            size: buffer.size(),
            channel: buffer.as_slice().to_vec(),
            timestamp_ms,
        }
    }

    /// Cell state at a coordinate; `None` out of range.
    pub fn state_at(&self, x: i64, y: i64, z: i64) -> Option<CellState> {
        if !self.size.contains(x, y, z) {
            return None;
        }
        let idx = self.size.index(x as usize, y as usize, z as usize);
        Some(CellState {
            value: self.channel[idx],
            position: (x as usize, y as usize, z as usize),
            step: self.step,
            timestamp_ms: self.timestamp_ms,
        })
    }
}

/// One layer in a multi-layer snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct LayerSnapshot {
    pub id: String,
    pub name: String,
    pub visible: bool,
    pub opacity: f32,
    pub size: GridSize,
    pub channel: Vec<u8>,
}

impl LayerSnapshot {
    /// Capture a layer.
    pub fn capture(layer: &Layer) -> Self {
        Self {
            id: layer.id.clone(),
            name: layer.name.clone(),
            visible: layer.visible,
            opacity: layer.opacity,
            size: layer.buffer.size(),
            channel: layer.buffer.as_slice().to_vec(),
        }
    }
}

/// Validate that every layer shares one size; falls back to the first
/// layer's dimensions (with a warning) rather than failing.
pub fn common_layer_size(layers: &[LayerSnapshot]) -> Option<GridSize> {
    let first = layers.first()?.size;
    if layers.iter().any(|l| l.size != first) {
        warn!(
            "layer snapshot dimensions are inconsistent; falling back to {}x{}x{}",
            first.x, first.y, first.z
        );
    }
    Some(first)
}
