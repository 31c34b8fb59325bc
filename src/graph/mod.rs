//! Graph Model
//!
//! Generic directed graph used for control-flow analysis, plus the
//! control-flow graph (_CFG_) built over individual _IR_ statements.

pub mod cfg;
pub mod flow;

pub use cfg::Cfg;
pub use flow::{Graph, NodeId};
