//! The grid host port — the seam between the evaluator and the engine.
//!
//! The evaluator never touches voxel storage directly; every grid
//! side effect goes through [`GridHost`]. The simulation engine
//! implements this for both top-level program execution and per-cell
//! rule evaluation (where the neighbor context is populated and tick
//! mutation is rejected).

use crate::error::RuntimeResult;
use crate::value::{FnTable, FunctionValue, Value};
use std::rc::Rc;

/// Aggregates over a cell's 26-neighborhood (3D Moore), computed from
/// the pre-tick buffer. Out-of-bounds neighbors count as value 0.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NeighborStats {
    /// Neighbors with a non-zero value.
    pub alive: u32,
    /// Sum of neighbor values.
    pub sum: f64,
    /// Number of in-bounds neighbors.
    pub count: u32,
    /// Maximum neighbor value.
    pub max: u8,
}

/// Side-effect port the evaluator calls into.
pub trait GridHost {
    /// `set(x, y[, z])` — write full intensity at the coordinate.
    /// Out-of-range coordinates are a silent no-op.
    fn set_cell(&mut self, x: f64, y: f64, z: f64) -> RuntimeResult<()>;

    /// `clear()` — zero the active layer.
    fn clear(&mut self) -> RuntimeResult<()>;

    /// `step()` — run one simulation tick to completion.
    fn step(&mut self) -> RuntimeResult<()>;

    /// `layer(n)` — select the active layer for `set`/`clear`.
    fn select_layer(&mut self, index: f64) -> RuntimeResult<()>;

    /// Read a cell value from the grid (pre-tick buffer during a tick).
    /// Out-of-range reads yield 0.
    fn cell_at(&self, x: f64, y: f64, z: f64) -> f64;

    /// Next value from the seeded random stream, in `[0, 1)`.
    fn random(&mut self) -> f64;

    /// Re-seed the random stream.
    fn reseed(&mut self, seed: u64);

    /// `print(...)` output sink.
    fn print(&mut self, text: &str);

    /// Register a rule as an active simulation rule.
    ///
    /// `resolved` carries the program-declared rule and a snapshot of
    /// the helper tables captured at activation time; `None` lets the
    /// host resolve the name against its hot-reloaded rule set.
    fn activate_rule(
        &mut self,
        name: &str,
        resolved: Option<(Rc<FunctionValue>, FnTable)>,
        args: Vec<Value>,
    ) -> RuntimeResult<()>;

    /// Remove a rule from the active set. Unknown names are a no-op.
    fn deactivate_rule(&mut self, name: &str) -> RuntimeResult<()>;

    /// Neighbor aggregates for the cell currently under rule
    /// evaluation; `None` outside a tick.
    fn neighbor_stats(&self) -> Option<NeighborStats>;
}
