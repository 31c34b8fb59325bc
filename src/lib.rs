//! Optimizing backend core for a compiler.
//!
//! Consumes, per function, a linear label-addressed intermediate
//! representation (_IR_) statement list plus a frame descriptor, and produces
//! a temporary-to-register mapping together with the optimized, possibly
//! spill-rewritten statement list.
//!
//! The pipeline is: control-flow graph (_CFG_) construction over individual
//! statements, iterative dataflow analyses (liveness, reaching definitions,
//! available expressions), dominator/loop analysis, classical optimization
//! passes, and Chaitin-style graph-coloring register allocation with
//! spill-and-retry.

#![forbid(unsafe_code)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)]
#![allow(clippy::module_name_repetitions)]
#![warn(rust_2018_idioms)]
#![warn(missing_debug_implementations)]

pub mod analysis;
pub mod error;
pub mod graph;
pub mod ir;
pub mod passes;
pub mod regalloc;
pub mod trace;

pub use error::{BackendError, Result};
pub use ir::{BinOp, Expr, Frame, Function, Stmt, Temp, UnOp};
pub use passes::optimize::{Opts, optimize_function};
pub use regalloc::{Allocation, allocate};

/// Runs the full backend on one function: the optimization pipeline to its
/// global fixed point, then register allocation (which may rewrite the body
/// further with spill code).
///
/// On success the function body holds the final statement list and the
/// returned [`Allocation`] maps every temporary, including the precolored
/// frame pointer, to a register index.
///
/// # Errors
///
/// Returns an error if a statement violates the shape an analysis requires
/// (the IR is expected well-formed by this stage), or if the register
/// allocator detects an internal inconsistency.
pub fn process_function(func: &mut Function, opts: &Opts) -> Result<Allocation> {
    optimize_function(func, opts)?;
    allocate(func, opts.registers)
}
