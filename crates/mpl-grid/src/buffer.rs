//! Dense voxel buffer with staging/publish double buffering.
//!
//! The lifecycle per tick mirrors a ping-pong arena: a staging copy is
//! taken from the published cells, rule writes land in staging, and
//! `publish()` swaps staging in while diffing the two buffers into a
//! changed-index list. Readers between publishes always observe a fully
//! pre-tick or fully post-tick buffer, never a torn one.

use serde::{Deserialize, Serialize};

/// Grid dimensions, fixed at construction.
///
/// The flat index formula is `i = x + y*sx + z*sx*sy` and never changes
/// for the buffer's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridSize {
    pub x: usize,
    pub y: usize,
    pub z: usize,
}

impl GridSize {
    /// Create a new size. Panics on a zero dimension — that is a host
    /// integration bug, not bad MPL source.
    pub fn new(x: usize, y: usize, z: usize) -> Self {
        assert!(x > 0 && y > 0 && z > 0, "grid dimensions must be non-zero");
        Self { x, y, z }
    }

    /// Total cell count.
    pub fn len(&self) -> usize {
        self.x * self.y * self.z
    }

    /// A grid is never empty; kept for clippy symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Flat index for an in-bounds coordinate.
    #[inline]
    pub fn index(&self, x: usize, y: usize, z: usize) -> usize {
        x + y * self.x + z * self.x * self.y
    }

    /// Bounds check for possibly-negative coordinates.
    #[inline]
    pub fn contains(&self, x: i64, y: i64, z: i64) -> bool {
        x >= 0
            && y >= 0
            && z >= 0
            && (x as usize) < self.x
            && (y as usize) < self.y
            && (z as usize) < self.z
    }

    /// Coordinate for a flat index.
    #[inline]
    pub fn coords(&self, index: usize) -> (usize, usize, usize) {
        let x = index % self.x;
        let y = (index / self.x) % self.y;
        let z = index / (self.x * self.y);
        (x, y, z)
    }
}

/// A dense buffer of byte-valued cells.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VoxelBuffer {
    size: GridSize,
    cells: Vec<u8>,
}

impl VoxelBuffer {
    /// Create a zeroed buffer.
    pub fn new(size: GridSize) -> Self {
        Self {
            size,
            cells: vec![0; size.len()],
        }
    }

    /// Buffer dimensions.
    pub fn size(&self) -> GridSize {
        self.size
    }

    /// Read a cell. Out-of-range coordinates read as 0.
    #[inline]
    pub fn get(&self, x: i64, y: i64, z: i64) -> u8 {
        if self.size.contains(x, y, z) {
            self.cells[self.size.index(x as usize, y as usize, z as usize)]
        } else {
            0
        }
    }

    /// Write a cell. Out-of-range coordinates are a silent no-op
    /// (compatibility-preserving clamp behavior); returns whether the
    /// write landed.
    #[inline]
    pub fn set(&mut self, x: i64, y: i64, z: i64, value: u8) -> bool {
        if self.size.contains(x, y, z) {
            let idx = self.size.index(x as usize, y as usize, z as usize);
            self.cells[idx] = value;
            true
        } else {
            false
        }
    }

    /// Zero every cell.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }

    /// Raw cell slice in flat index order.
    pub fn as_slice(&self) -> &[u8] {
        &self.cells
    }

    /// Mutable raw cell slice. The length invariant (`len == x*y*z`)
    /// must hold; slices are never resized.
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.cells
    }

    /// Replace the whole contents from a same-sized slice.
    /// Panics on length mismatch — host integration bug.
    pub fn copy_from(&mut self, data: &[u8]) {
        assert_eq!(
            data.len(),
            self.cells.len(),
            "channel length must match grid size"
        );
        self.cells.copy_from_slice(data);
    }

    /// Begin a tick: take a staging copy of the published cells.
    pub fn begin_staging(&self) -> StagingBuffer {
        StagingBuffer {
            size: self.size,
            cells: self.cells.clone(),
        }
    }

    /// Publish a staging buffer, swapping it in and returning the flat
    /// indices whose values changed this tick.
    ///
    /// Panics if the staging buffer came from a different-sized grid —
    /// that is an engine invariant violation, not a user error.
    pub fn publish(&mut self, staging: StagingBuffer) -> Vec<usize> {
        assert_eq!(
            staging.size, self.size,
            "staging buffer size must match the published buffer"
        );
        let changed: Vec<usize> = self
            .cells
            .iter()
            .zip(staging.cells.iter())
            .enumerate()
            .filter_map(|(i, (old, new))| (old != new).then_some(i))
            .collect();
        self.cells = staging.cells;
        changed
    }
}

/// The write buffer for one tick. Starts as a copy of the pre-tick
/// state so unwritten cells carry over unchanged; all rule writes land
/// here while reads keep seeing the published buffer.
#[derive(Debug, Clone)]
pub struct StagingBuffer {
    size: GridSize,
    cells: Vec<u8>,
}

impl StagingBuffer {
    /// Write a cell. Out-of-range coordinates are a silent no-op.
    #[inline]
    pub fn set(&mut self, x: i64, y: i64, z: i64, value: u8) -> bool {
        if self.size.contains(x, y, z) {
            let idx = self.size.index(x as usize, y as usize, z as usize);
            self.cells[idx] = value;
            true
        } else {
            false
        }
    }

    /// Write by flat index.
    #[inline]
    pub fn set_index(&mut self, index: usize, value: u8) {
        self.cells[index] = value;
    }

    /// Zero the staging buffer.
    pub fn clear(&mut self) {
        self.cells.fill(0);
    }
}
