//! Loop-Invariant Code Hoisting
//!
//! Moves loop-invariant computations into the loop's preheader. A candidate
//! is a binary or unary computation into a temporary defined exactly once in
//! the loop, with every operand proven invariant recursively through
//! reaching definitions. Candidates are hoisted only when doing so cannot
//! change any observed value: the candidate must dominate every loop exit
//! where its temporary leaves alive, and the temporary must not already be
//! live entering the header.
//!
//! Loops are processed innermost first; the pass applies at most one loop's
//! hoists per invocation and reports the change, leaving re-analysis to the
//! pipeline driver.

use std::collections::HashSet;

use crate::analysis::dominance::{self, Dominators};
use crate::analysis::liveness::{self, Liveness};
use crate::analysis::loops::LoopNest;
use crate::analysis::reaching::{self, ReachingDefs};
use crate::error::Result;
use crate::graph::{Cfg, NodeId};
use crate::ir::{Expr, Frame, LabelGen, Stmt};

/// Hoists invariant computations out of one loop. Returns `true` if
/// anything moved.
///
/// # Errors
///
/// Returns an error if a statement is not in linearized form.
pub fn hoist_invariants(cfg: &mut Cfg, frame: &Frame, labels: &mut LabelGen) -> Result<bool> {
    let doms = dominance::analyze(cfg);
    let mut nest = LoopNest::find(cfg, &doms);
    let nest_order = nest.inner_to_outer();
    if nest_order.is_empty() {
        return Ok(false);
    }

    let rd = reaching::analyze(cfg)?;
    let live = liveness::analyze(cfg, frame)?;

    for idx in nest_order {
        let candidates = hoistable(cfg, &nest, idx, &doms, &rd, &live);
        if candidates.is_empty() {
            continue;
        }

        nest.preheader(cfg, idx, labels);
        for m in candidates {
            let stmt = cfg.stmt(m).clone();
            nest.append_to_preheader(cfg, idx, stmt);
            cfg.graph_mut().remove_node(m);
        }

        // Facts are stale now; the driver re-runs the pass for the
        // remaining loops.
        return Ok(true);
    }

    Ok(false)
}

/// Hoistable member nodes of one loop, in layout order.
fn hoistable(
    cfg: &Cfg,
    nest: &LoopNest,
    idx: usize,
    doms: &Dominators,
    rd: &ReachingDefs,
    live: &Liveness,
) -> Vec<NodeId> {
    let members = &nest.loops[idx].members;
    let Some(header) = nest.loops[idx].header else {
        return vec![];
    };
    let exits = nest.exit_edges(cfg, idx);

    let mut out = vec![];
    for &m in cfg.nodes() {
        if !members.contains(&m) {
            continue;
        }
        let Stmt::Move {
            dst: Expr::Temp(t),
            src,
        } = cfg.stmt(m)
        else {
            continue;
        };
        let (t, src) = (*t, src);

        if !matches!(src, Expr::Binary { .. } | Expr::Unary { .. }) {
            continue;
        }
        // Memory contents may change within the loop; calls always stay.
        if src.has_side_effects() || src.reads_memory() {
            continue;
        }

        // Exactly one in-loop definition of the destination.
        let in_loop_defs = rd
            .defs_of
            .get(&t)
            .map_or(0, |sites| sites.iter().filter(|d| members.contains(d)).count());
        if in_loop_defs != 1 {
            continue;
        }

        let mut visiting = HashSet::from([m]);
        if !is_invariant_expr(cfg, rd, members, m, src, &mut visiting) {
            continue;
        }

        // The pre-hoist value must not be observable: not live into the
        // header, and the definition must dominate every exit its value
        // escapes through.
        if live.live_in.get(&header).is_some_and(|l| l.contains(&t)) {
            continue;
        }
        let escapes_undominated = exits.iter().any(|&(x, s)| {
            live.live_in.get(&s).is_some_and(|l| l.contains(&t)) && !doms.dominates(m, x)
        });
        if escapes_undominated {
            continue;
        }

        out.push(m);
    }

    out
}

/// Recursive invariance proof for an expression evaluated at node `at`:
/// every operand temporary either has all reaching definitions outside the
/// loop, or has a single in-loop reaching definition that is itself
/// invariant. `visiting` breaks definition cycles (which are variant).
fn is_invariant_expr(
    cfg: &Cfg,
    rd: &ReachingDefs,
    members: &HashSet<NodeId>,
    at: NodeId,
    e: &Expr,
    visiting: &mut HashSet<NodeId>,
) -> bool {
    let mut operands = vec![];
    e.collect_temps(&mut operands);

    operands.into_iter().all(|u| {
        let defs = rd.reaching_defs_of(at, u);
        if defs.iter().all(|d| !members.contains(d)) {
            return true;
        }

        let [d] = defs[..] else {
            return false;
        };
        if !visiting.insert(d) {
            return false;
        }
        let invariant = match cfg.stmt(d) {
            Stmt::Move {
                dst: Expr::Temp(_),
                src,
            } if !src.has_side_effects() && !src.reads_memory() => {
                is_invariant_expr(cfg, rd, members, d, src, visiting)
            }
            _ => false,
        };
        visiting.remove(&d);
        invariant
    })
}
