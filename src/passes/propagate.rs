//! Constant and Copy Propagation
//!
//! Rewrites reads of a temporary whose value is fully determined by a single
//! reaching definition: constant propagation substitutes the literal, copy
//! propagation substitutes the copied-from temporary. Both are driven by
//! reaching-definitions analysis.

use std::collections::HashSet;

use crate::analysis::reaching::{self, ReachingDefs};
use crate::error::Result;
use crate::graph::{Cfg, NodeId};
use crate::ir::{Expr, Stmt, Temp};

/// Replaces reads of temporaries whose single reaching definition is a
/// constant move. Returns `true` if anything changed.
///
/// # Errors
///
/// Propagates dataflow errors.
pub fn propagate_constants(cfg: &mut Cfg) -> Result<bool> {
    let rd = reaching::analyze(cfg)?;
    let mut changed = false;

    for &n in &cfg.nodes().to_vec() {
        for u in unique_reads(cfg.stmt(n)) {
            let [d] = rd.reaching_defs_of(n, u)[..] else {
                continue;
            };
            if d == n {
                continue;
            }

            let Stmt::Move {
                src: src @ Expr::Const(_),
                ..
            } = cfg.stmt(d)
            else {
                continue;
            };
            let value = src.clone();

            cfg.stmt_mut(n)
                .for_each_read_expr(&mut |e| changed |= e.replace_temp(u, &value));
        }
    }

    Ok(changed)
}

/// Replaces reads of temporaries whose single reaching definition is a
/// temporary-to-temporary copy, when the copied-from temporary provably
/// holds the same value along every path from the definition. Returns
/// `true` if anything changed.
///
/// # Errors
///
/// Propagates dataflow errors.
pub fn propagate_copies(cfg: &mut Cfg) -> Result<bool> {
    let rd = reaching::analyze(cfg)?;
    let mut changed = false;

    for &n in &cfg.nodes().to_vec() {
        for u in unique_reads(cfg.stmt(n)) {
            let [d] = rd.reaching_defs_of(n, u)[..] else {
                continue;
            };
            if d == n {
                continue;
            }

            let Stmt::Move {
                src: Expr::Temp(v), ..
            } = cfg.stmt(d)
            else {
                continue;
            };
            let v = *v;

            // The copy source must not be redefined between the copy and
            // the use.
            if v == u || path_redefines(cfg, &rd, n, d, v) {
                continue;
            }

            let src = Expr::Temp(v);
            cfg.stmt_mut(n)
                .for_each_read_expr(&mut |e| changed |= e.replace_temp(u, &src));
        }
    }

    Ok(changed)
}

/// Temporaries a statement reads, deduplicated, in first-read order.
fn unique_reads(stmt: &Stmt) -> Vec<Temp> {
    let mut seen = HashSet::new();
    stmt.read_temps()
        .into_iter()
        .filter(|t| seen.insert(*t))
        .collect()
}

/// Returns `true` if some path from the defining node `d` to the use at `n`
/// passes through a definition of `v`.
///
/// Enumerated as an exhaustive backward search from `n` that stops at `d`:
/// every visited node lies on some `d`-to-`n` path because the single
/// reaching definition guarantees all entry-to-`n` paths run through `d`.
// NOTE: exponential-free (visited set) but still a full backward walk per
// candidate; a dominance-based sufficient condition would be cheaper.
fn path_redefines(cfg: &Cfg, rd: &ReachingDefs, n: NodeId, d: NodeId, v: Temp) -> bool {
    let defines_v = |m: NodeId| {
        rd.defs_of
            .get(&v)
            .is_some_and(|sites| sites.contains(&m))
    };

    let mut visited = HashSet::from([n, d]);
    let mut worklist: Vec<NodeId> = cfg.graph().preds(n).to_vec();

    while let Some(m) = worklist.pop() {
        if !visited.insert(m) {
            continue;
        }
        if defines_v(m) {
            return true;
        }
        worklist.extend(cfg.graph().preds(m).iter().copied());
    }

    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::BinOp;

    fn mv(dst: u32, src: Expr) -> Stmt {
        Stmt::Move {
            dst: Expr::Temp(Temp(dst)),
            src,
        }
    }

    fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn single_constant_definition_propagates() {
        let body = vec![
            mv(1, Expr::Const(7)),
            mv(2, add(Expr::Temp(Temp(1)), Expr::Const(1))),
        ];
        let mut cfg = Cfg::build(&body);

        assert!(propagate_constants(&mut cfg).expect("pass should succeed"));
        let n = cfg.nodes()[1];
        assert_eq!(*cfg.stmt(n), mv(2, add(Expr::Const(7), Expr::Const(1))));
    }

    #[test]
    fn merged_definitions_do_not_propagate() {
        let body = vec![
            Stmt::CJump {
                cond: Expr::Temp(Temp(9)),
                pos: "a".into(),
                neg: "b".into(),
            },
            Stmt::Label("a".into()),
            mv(1, Expr::Const(1)),
            Stmt::Jump("join".into()),
            Stmt::Label("b".into()),
            mv(1, Expr::Const(2)),
            Stmt::Label("join".into()),
            mv(2, Expr::Temp(Temp(1))),
        ];
        let mut cfg = Cfg::build(&body);

        assert!(!propagate_constants(&mut cfg).expect("pass should succeed"));
    }

    #[test]
    fn copy_propagates_when_source_is_stable() {
        let body = vec![
            mv(1, Expr::Const(7)),
            mv(2, Expr::Temp(Temp(1))),
            mv(3, add(Expr::Temp(Temp(2)), Expr::Const(1))),
        ];
        let mut cfg = Cfg::build(&body);

        assert!(propagate_copies(&mut cfg).expect("pass should succeed"));
        let n = cfg.nodes()[2];
        assert_eq!(
            *cfg.stmt(n),
            mv(3, add(Expr::Temp(Temp(1)), Expr::Const(1)))
        );
    }

    #[test]
    fn copy_blocked_by_intervening_source_redefinition() {
        let body = vec![
            mv(1, Expr::Const(7)),
            mv(2, Expr::Temp(Temp(1))),
            mv(1, Expr::Const(8)),
            mv(3, Expr::Temp(Temp(2))),
        ];
        let mut cfg = Cfg::build(&body);

        assert!(!propagate_copies(&mut cfg).expect("pass should succeed"));
        let n = cfg.nodes()[3];
        assert_eq!(*cfg.stmt(n), mv(3, Expr::Temp(Temp(2))));
    }
}
