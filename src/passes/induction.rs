//! Induction-Variable Strength Reduction
//!
//! Classifies loop temporaries as basic induction variables (`i <- i ± c`
//! with `c` loop-invariant) or derived ones (`k <- j op c` with `j` basic),
//! then replaces a derived variable's multiplication or addition with a
//! running temporary: initialized in the preheader, bumped additively next
//! to every update of the governing variable, and copied into the derived
//! variable at its original definition.
//!
//! One reduction is applied per invocation; the pipeline driver re-runs the
//! pass until none remain.

use std::collections::{HashMap, HashSet};

use crate::analysis::dominance;
use crate::analysis::loops::LoopNest;
use crate::error::Result;
use crate::graph::{Cfg, NodeId};
use crate::ir::{BinOp, Expr, LabelGen, Stmt, Temp, TempGen};

/// One `i <- i ± c` update site of a basic induction variable.
struct Update {
    node: NodeId,
    op: BinOp,
    step: Expr,
}

/// A derived variable's single definition `k <- j op c`.
struct Derived {
    node: NodeId,
    temp: Temp,
    governing: Temp,
    op: BinOp,
    coeff: Expr,
}

/// Reduces one derived induction variable to additive updates. Returns
/// `true` if a reduction was applied.
///
/// # Errors
///
/// Propagates dataflow errors from loop discovery.
pub fn reduce_induction_variables(
    cfg: &mut Cfg,
    temps: &mut TempGen,
    labels: &mut LabelGen,
) -> Result<bool> {
    let doms = dominance::analyze(cfg);
    let mut nest = LoopNest::find(cfg, &doms);

    for idx in nest.inner_to_outer() {
        let found = {
            let members = &nest.loops[idx].members;
            let defined = defined_in_loop(cfg, members);
            let mut basic = basic_variables(cfg, members, &defined);
            find_derived(cfg, members, &basic, &defined)
                .map(|d| (basic.remove(&d.governing).unwrap_or_default(), d))
        };
        let Some((updates, derived)) = found else {
            continue;
        };

        let Stmt::Move { src: seed_src, .. } = cfg.stmt(derived.node).clone() else {
            continue;
        };

        let runner = temps.fresh();
        nest.preheader(cfg, idx, labels);

        // Seed the runner with the derived expression evaluated on the
        // governing variable's entry value.
        nest.append_to_preheader(
            cfg,
            idx,
            Stmt::Move {
                dst: Expr::Temp(runner),
                src: seed_src,
            },
        );

        // Bump the runner alongside every update of the governing variable,
        // scaling the step for multiplicative derivations.
        for u in &updates {
            let delta = match derived.op {
                BinOp::Multiply => Expr::Binary {
                    op: BinOp::Multiply,
                    lhs: Box::new(u.step.clone()),
                    rhs: Box::new(derived.coeff.clone()),
                },
                _ => u.step.clone(),
            };
            let bump = Stmt::Move {
                dst: Expr::Temp(runner),
                src: Expr::Binary {
                    op: u.op,
                    lhs: Box::new(Expr::Temp(runner)),
                    rhs: Box::new(delta),
                },
            };
            let node = cfg.graph_mut().insert_after(u.node, bump);
            nest.add_member(idx, node);
        }

        *cfg.stmt_mut(derived.node) = Stmt::Move {
            dst: Expr::Temp(derived.temp),
            src: Expr::Temp(runner),
        };

        return Ok(true);
    }

    Ok(false)
}

/// Temporaries with at least one definition inside the loop.
fn defined_in_loop(cfg: &Cfg, members: &HashSet<NodeId>) -> HashSet<Temp> {
    members
        .iter()
        .filter_map(|&m| cfg.stmt(m).defined_temp())
        .collect()
}

/// A loop-invariant operand: a constant, or a temporary never defined in the
/// loop.
fn invariant_operand(e: &Expr, defined: &HashSet<Temp>) -> bool {
    match e {
        Expr::Const(_) => true,
        Expr::Temp(t) => !defined.contains(t),
        _ => false,
    }
}

/// Basic induction variables: every in-loop definition of the temporary is
/// an additive update by a loop-invariant step.
fn basic_variables(
    cfg: &Cfg,
    members: &HashSet<NodeId>,
    defined: &HashSet<Temp>,
) -> HashMap<Temp, Vec<Update>> {
    let mut updates: HashMap<Temp, Vec<Update>> = HashMap::new();
    let mut disqualified: HashSet<Temp> = HashSet::new();

    for &m in members {
        let Some(t) = cfg.stmt(m).defined_temp() else {
            continue;
        };
        match additive_update(cfg.stmt(m), t, defined) {
            Some((op, step)) => {
                updates.entry(t).or_default().push(Update { node: m, op, step });
            }
            None => {
                disqualified.insert(t);
            }
        }
    }

    updates.retain(|t, _| !disqualified.contains(t));
    updates
}

/// Matches `t <- t + c`, `t <- c + t`, or `t <- t - c` with invariant `c`.
fn additive_update(stmt: &Stmt, t: Temp, defined: &HashSet<Temp>) -> Option<(BinOp, Expr)> {
    let Stmt::Move {
        src: Expr::Binary { op, lhs, rhs },
        ..
    } = stmt
    else {
        return None;
    };

    let is_t = |e: &Expr| matches!(e, Expr::Temp(u) if *u == t);
    match op {
        BinOp::Add if is_t(lhs) && invariant_operand(rhs, defined) => {
            Some((BinOp::Add, (**rhs).clone()))
        }
        BinOp::Add if is_t(rhs) && invariant_operand(lhs, defined) => {
            Some((BinOp::Add, (**lhs).clone()))
        }
        BinOp::Subtract if is_t(lhs) && invariant_operand(rhs, defined) => {
            Some((BinOp::Subtract, (**rhs).clone()))
        }
        _ => None,
    }
}

/// First derived variable in layout order: a single in-loop definition
/// `k <- j op c` with `j` basic, `k` not basic, and `c` invariant.
fn find_derived(
    cfg: &Cfg,
    members: &HashSet<NodeId>,
    basic: &HashMap<Temp, Vec<Update>>,
    defined: &HashSet<Temp>,
) -> Option<Derived> {
    for &m in cfg.nodes() {
        if !members.contains(&m) {
            continue;
        }
        let Stmt::Move {
            dst: Expr::Temp(k),
            src: Expr::Binary { op, lhs, rhs },
        } = cfg.stmt(m)
        else {
            continue;
        };
        let k = *k;
        if basic.contains_key(&k) {
            continue;
        }

        let def_count = members
            .iter()
            .filter(|&&d| cfg.stmt(d).defined_temp() == Some(k))
            .count();
        if def_count != 1 {
            continue;
        }

        let candidate = |j: &Expr, c: &Expr| -> Option<(Temp, Expr)> {
            let Expr::Temp(j) = j else { return None };
            (basic.contains_key(j) && *j != k && invariant_operand(c, defined))
                .then(|| (*j, c.clone()))
        };

        let matched = match op {
            BinOp::Multiply | BinOp::Add => {
                candidate(lhs, rhs).or_else(|| candidate(rhs, lhs))
            }
            BinOp::Subtract => candidate(lhs, rhs),
            _ => None,
        };

        if let Some((governing, coeff)) = matched {
            return Some(Derived {
                node: m,
                temp: k,
                governing,
                op: *op,
                coeff,
            });
        }
    }

    None
}
