//! Dead-Code Elimination
//!
//! Removes moves into temporaries that are dead on exit of their node.
//! Liveness is computed once up front; removing a dead definition cannot
//! grow any remaining node's live-out set, so one snapshot sweep reaches the
//! pass's fixed point.

use crate::analysis::liveness;
use crate::error::Result;
use crate::graph::Cfg;
use crate::ir::{Expr, Frame, Stmt};

/// Removes dead definitions from the graph. Returns `true` if anything was
/// removed.
///
/// # Errors
///
/// Returns an error if a statement is not in linearized form.
pub fn eliminate_dead_code(cfg: &mut Cfg, frame: &Frame) -> Result<bool> {
    let live = liveness::analyze(cfg, frame)?;
    let mut changed = false;

    for n in cfg.nodes().to_vec() {
        let Stmt::Move {
            dst: Expr::Temp(t),
            src,
        } = cfg.stmt(n)
        else {
            continue;
        };

        // A dead destination does not make an embedded call dead.
        if src.contains_call() {
            continue;
        }

        let is_dead = live
            .live_out_of(n)
            .is_none_or(|out| !out.contains(t));
        if is_dead {
            cfg.graph_mut().remove_node(n);
            changed = true;
        }
    }

    Ok(changed)
}
