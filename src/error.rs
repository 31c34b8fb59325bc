//! Error types for the backend core.
//!
//! Failures at this layer always indicate an internal inconsistency rather
//! than a user source error; user-correctable input is rejected upstream
//! (parsing, type checking) before the backend runs.

use thiserror::Error;

/// Errors produced by the backend core.
#[derive(Debug, Error)]
pub enum BackendError {
    /// A statement does not match the form a pass or analysis expects, e.g.
    /// a statement-expression reaching available-expressions analysis. The
    /// payload is the offending statement's textual form.
    #[error("ill-formed IR statement: {0}")]
    IrShape(String),

    /// The register allocator reached a state that the spill fallback should
    /// make impossible, e.g. an empty interference graph with unresolved
    /// spill candidates left over.
    #[error("register allocator inconsistency: {0}")]
    Allocator(String),
}

/// Result type alias for backend operations.
pub type Result<T> = std::result::Result<T, BackendError>;
