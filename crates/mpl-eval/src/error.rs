//! Runtime error types for the MPL evaluator.

use crate::value::Value;
use thiserror::Error;

/// Evaluation error.
///
/// Every variant except [`RuntimeError::Return`] is recoverable at the
/// top-level `run()` boundary: the host may log it and continue with
/// the next statement or abort the run; engine invariants survive
/// either way.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RuntimeError {
    /// Read or assignment of a variable that was never declared.
    #[error("undefined variable '{0}'")]
    UndefinedVariable(String),

    /// Call target is not a declared function, rule, or builtin.
    #[error("undefined callable '{0}'")]
    UndefinedCallable(String),

    /// Operand types don't fit the operation and no coercion applies.
    #[error("type mismatch: {0}")]
    TypeMismatch(String),

    /// `for..of` over a value that is neither an array nor an object.
    #[error("not iterable: {0}")]
    NotIterable(String),

    /// Call depth exceeded the configured recursion limit.
    #[error("stack overflow: call depth exceeded {limit}")]
    StackOverflow { limit: usize },

    /// The configured operation budget ran out mid-program.
    #[error("operation budget exhausted")]
    OpBudgetExhausted,

    /// The host's cancellation flag was raised.
    #[error("cancelled")]
    Cancelled,

    /// Neighbor builtins called outside rule evaluation.
    #[error("'{0}' is only available during rule evaluation")]
    NotInRuleContext(String),

    /// `step()` (or another tick-mutating call) inside a rule body.
    #[error("ticks cannot be nested: {0}")]
    NestedTick(String),

    /// A builtin was called with arguments it cannot accept.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Internal control flow for `return` — unwinds to the call site
    /// and is never surfaced to the host.
    #[error("return outside of a function")]
    Return(Value),
}

/// Result alias for evaluator operations.
pub type RuntimeResult<T> = Result<T, RuntimeError>;
