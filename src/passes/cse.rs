//! Common-Subexpression Elimination
//!
//! For each move whose source contains a sub-expression available on entry,
//! finds every nearest upstream computation of that sub-expression, routes
//! the computed value through one fresh shared temporary, and rewrites the
//! use to read it. Available-expressions analysis restarts after every
//! rewrite, since the graph has changed.

use std::collections::HashSet;

use crate::analysis::available;
use crate::error::Result;
use crate::graph::{Cfg, NodeId};
use crate::ir::{Expr, Stmt, TempGen};

/// Eliminates redundant sub-expression computations. Returns `true` if
/// anything changed.
///
/// # Errors
///
/// Returns an error if a statement is not in linearized form.
pub fn eliminate_subexprs(cfg: &mut Cfg, temps: &mut TempGen) -> Result<bool> {
    let mut changed = false;

    'restart: loop {
        let ae = available::analyze(cfg)?;

        for &n in &cfg.nodes().to_vec() {
            let Stmt::Move {
                dst: Expr::Temp(_),
                src,
            } = cfg.stmt(n)
            else {
                continue;
            };
            let Some(avail) = ae.avail_in.get(&n) else {
                continue;
            };
            let Some(target) = find_available(src, avail) else {
                continue;
            };
            let target = target.clone();

            let providers = find_providers(cfg, n, &target);
            // A node feeding itself around a cycle cannot be split in two.
            if providers.is_empty() || providers.contains(&n) {
                continue;
            }

            let shared = temps.fresh();
            for p in providers {
                let Stmt::Move {
                    dst: Expr::Temp(d), ..
                } = cfg.stmt(p)
                else {
                    continue;
                };
                let d = *d;

                // Compute into the shared temporary once, then restore the
                // original destination with a copy.
                *cfg.stmt_mut(p) = Stmt::Move {
                    dst: Expr::Temp(shared),
                    src: target.clone(),
                };
                cfg.graph_mut().insert_after(
                    p,
                    Stmt::Move {
                        dst: Expr::Temp(d),
                        src: Expr::Temp(shared),
                    },
                );
            }

            if let Stmt::Move { src, .. } = cfg.stmt_mut(n) {
                replace_subexpr(src, &target, &Expr::Temp(shared));
            }

            changed = true;
            continue 'restart;
        }

        break;
    }

    Ok(changed)
}

/// Largest sub-expression of `e` present in the available set, outermost
/// first.
fn find_available<'e>(e: &'e Expr, avail: &HashSet<Expr>) -> Option<&'e Expr> {
    if matches!(e, Expr::Binary { .. } | Expr::Mem(_)) && avail.contains(e) {
        return Some(e);
    }
    match e {
        Expr::Const(_) | Expr::Temp(_) | Expr::Name(_) => None,
        Expr::Mem(addr) => find_available(addr, avail),
        Expr::Binary { lhs, rhs, .. } => {
            find_available(lhs, avail).or_else(|| find_available(rhs, avail))
        }
        Expr::Unary { expr, .. } => find_available(expr, avail),
        Expr::Call { args, .. } => args.iter().find_map(|a| find_available(a, avail)),
        Expr::Seq { .. } => None,
    }
}

/// Nearest upstream nodes computing `target` with no intervening kill.
///
/// Availability at the starting node guarantees every backward path reaches
/// a computation before any kill, so the search stops a path at whichever it
/// meets first.
fn find_providers(cfg: &Cfg, n: NodeId, target: &Expr) -> Vec<NodeId> {
    let mut providers = vec![];
    let mut visited: HashSet<NodeId> = HashSet::new();
    let mut worklist: Vec<NodeId> = cfg.graph().preds(n).to_vec();

    while let Some(m) = worklist.pop() {
        if !visited.insert(m) {
            continue;
        }

        let stmt = cfg.stmt(m);
        if let Stmt::Move {
            dst: Expr::Temp(_),
            src,
        } = stmt
            && src == target
        {
            providers.push(m);
            continue;
        }
        if kills(stmt, target) {
            continue;
        }

        worklist.extend(cfg.graph().preds(m).iter().copied());
    }

    providers.sort_unstable();
    providers
}

fn kills(stmt: &Stmt, e: &Expr) -> bool {
    if stmt.defined_temp().is_some_and(|t| e.mentions(t)) {
        return true;
    }
    stmt.clobbers_memory() && e.reads_memory()
}

/// Replaces every occurrence of `target` in `e` with `to`.
fn replace_subexpr(e: &mut Expr, target: &Expr, to: &Expr) {
    if e == target {
        *e = to.clone();
        return;
    }
    match e {
        Expr::Const(_) | Expr::Temp(_) | Expr::Name(_) => {}
        Expr::Mem(addr) => replace_subexpr(addr, target, to),
        Expr::Binary { lhs, rhs, .. } => {
            replace_subexpr(lhs, target, to);
            replace_subexpr(rhs, target, to);
        }
        Expr::Unary { expr, .. } => replace_subexpr(expr, target, to),
        Expr::Call { args, .. } => {
            for arg in args {
                replace_subexpr(arg, target, to);
            }
        }
        Expr::Seq { .. } => {}
    }
}
