//! The MPL virtual machine.
//!
//! Wires the pipeline together: source text → lexer → parser →
//! evaluator, with the grid engine, rule registry, seeded RNG, and
//! trace port hanging off one [`Vm`] instance. No process-wide mutable
//! state — everything a component needs is passed by reference from
//! the owning `Vm`.

mod sim;
mod trace;
mod vm;

pub use sim::{ActiveRule, RuleOrigin, Simulation};
pub use trace::{NullTracer, RuleTrace, RuleTracer, TraceCollector, TraceEntry, TraceSummary, VoxelPos};
pub use vm::{ExecReport, LayerSpec, Vm, VmConfig};
