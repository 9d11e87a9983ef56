//! MPL tree-walking evaluator.
//!
//! Executes MPL programs directly from the AST. All side effects flow
//! through two seams: the scoped [`Environment`] and the [`GridHost`]
//! port (grid mutation, ticks, randomness, diagnostics).

mod env;
mod error;
mod evaluator;
mod host;
mod value;

pub use env::{Environment, ScopeHandle};
pub use error::{RuntimeError, RuntimeResult};
pub use evaluator::{is_builtin, Evaluator, Limits};
pub use host::{GridHost, NeighborStats};
pub use value::{FnTable, FunctionValue, Value};
