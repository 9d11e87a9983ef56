//! Shared types for the MPL language engine.
//!
//! This crate defines the AST node types, source spans, and structured
//! error types used across all engine stages.

mod error;
mod span;
pub mod ast;

pub use error::{CompileErrors, ErrorCategory, ErrorCode, MplError, Severity, MAX_ERRORS};
pub use span::{SourceFile, Span};

/// Result type used throughout the MPL compilation pipeline.
pub type Result<T> = std::result::Result<T, MplError>;
