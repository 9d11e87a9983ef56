//! MPL rule registry: staged compilation and atomic hot reload.
//!
//! Rule source is compiled off to the side into an immutable
//! [`CompiledUnit`]; `apply_staged` publishes it with a single swap, so
//! the active set is never partially updated.

mod registry;

pub use registry::{
    fnv1a_hash, CompileResult, CompiledUnit, ReloadEvent, RuleInfo, RuleRegistry,
};
