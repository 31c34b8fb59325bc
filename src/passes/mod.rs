//! Optimization Passes
//!
//! Classical dataflow-driven optimizations over one function's _IR_. Each
//! pass mutates statements or graph structure in place and reports whether
//! anything changed; [`optimize::optimize_function`] drives the enabled set
//! to a global fixed point.

pub mod cse;
pub mod dce;
pub mod fold;
pub mod hoist;
pub mod induction;
pub mod optimize;
pub mod peephole;
pub mod propagate;
