//! Available Expressions
//!
//! Forward, intersection-based data-flow analysis computing which computed
//! expressions (binary operations and memory reads appearing as move
//! sources) are available on entry to each _CFG_ node. Drives
//! common-subexpression elimination.

use std::collections::{HashMap, HashSet};

use crate::analysis::{DataFlowAnalysis, ensure_linear, run_analysis};
use crate::error::Result;
use crate::graph::{Cfg, NodeId};
use crate::ir::{Expr, Stmt};

/// Per-node available-expression facts.
#[derive(Debug)]
pub struct AvailableExprs {
    pub avail_in: HashMap<NodeId, HashSet<Expr>>,
    pub avail_out: HashMap<NodeId, HashSet<Expr>>,
}

struct AvailableAnalysis {
    /// Every expression any node generates: the universal set the
    /// intersection meet starts from.
    universe: HashSet<Expr>,
}

/// Returns the expression a statement makes available: the source of a move
/// into a temporary, when that source is a binary operation or a memory
/// read.
fn generated(stmt: &Stmt) -> Option<&Expr> {
    match stmt {
        Stmt::Move {
            dst: Expr::Temp(_),
            src,
        } if matches!(src, Expr::Binary { .. } | Expr::Mem(_)) => Some(src),
        _ => None,
    }
}

impl DataFlowAnalysis for AvailableAnalysis {
    type Fact = HashSet<Expr>;

    #[inline]
    fn is_forward(&self) -> bool {
        true
    }

    fn initial(&self, _cfg: &Cfg) -> Self::Fact {
        // Nodes start at the universal set so the intersection meet
        // converges from above.
        self.universe.clone()
    }

    fn boundary(&self, _cfg: &Cfg) -> Self::Fact {
        // Nothing is available on function entry.
        Self::Fact::default()
    }

    fn meet(&self, acc: &mut Self::Fact, incoming: &Self::Fact) {
        acc.retain(|e| incoming.contains(e));
    }

    fn transfer(&self, cfg: &Cfg, node: NodeId, incoming: &Self::Fact) -> Result<Self::Fact> {
        let stmt = cfg.stmt(node);
        // Statement-expressions are explicitly forbidden here; the upstream
        // linearizer must have removed them.
        ensure_linear(stmt)?;

        let mut fact = incoming.clone();

        // Kill every expression referencing a redefined temporary.
        if let Some(t) = stmt.defined_temp() {
            fact.retain(|e| !e.mentions(t));
        }

        // Memory-writing and calling statements kill every expression
        // containing a memory read.
        if stmt.clobbers_memory() {
            fact.retain(|e| !e.reads_memory());
        }

        if let Some(e) = generated(stmt) {
            // A computation of `t <- f(t)` does not survive its own kill.
            let self_killed = stmt.defined_temp().is_some_and(|t| e.mentions(t));
            if !self_killed && !e.has_side_effects() {
                fact.insert(e.clone());
            }
        }

        Ok(fact)
    }
}

/// Runs available-expressions analysis over the control-flow graph.
///
/// # Errors
///
/// Returns an error if a statement-expression or statement sequence reaches
/// the analysis.
pub fn analyze(cfg: &Cfg) -> Result<AvailableExprs> {
    let mut universe = HashSet::new();
    for &n in cfg.nodes() {
        if let Some(e) = generated(cfg.stmt(n)) {
            universe.insert(e.clone());
        }
    }

    let analysis = AvailableAnalysis { universe };
    let facts = run_analysis(cfg, &analysis)?;

    Ok(AvailableExprs {
        avail_in: facts.inputs,
        avail_out: facts.outputs,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BinOp, Temp};

    fn mv(dst: u32, src: Expr) -> Stmt {
        Stmt::Move {
            dst: Expr::Temp(Temp(dst)),
            src,
        }
    }

    fn add(lhs: u32, rhs: u32) -> Expr {
        Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Temp(Temp(lhs))),
            rhs: Box::new(Expr::Temp(Temp(rhs))),
        }
    }

    #[test]
    fn computed_expression_becomes_available() {
        let body = vec![mv(3, add(1, 2)), mv(4, add(1, 2))];
        let cfg = Cfg::build(&body);
        let ae = analyze(&cfg).expect("analysis should succeed");

        let nodes = cfg.nodes();
        assert!(ae.avail_in[&nodes[1]].contains(&add(1, 2)));
        assert!(ae.avail_in[&nodes[0]].is_empty());
    }

    #[test]
    fn redefining_an_operand_kills_the_expression() {
        let body = vec![mv(3, add(1, 2)), mv(1, Expr::Const(0)), mv(4, add(1, 2))];
        let cfg = Cfg::build(&body);
        let ae = analyze(&cfg).expect("analysis should succeed");

        let nodes = cfg.nodes();
        assert!(!ae.avail_in[&nodes[2]].contains(&add(1, 2)));
    }

    #[test]
    fn calls_kill_memory_reads() {
        let mem = Expr::Mem(Box::new(Expr::Temp(Temp(1))));
        let body = vec![
            mv(2, mem.clone()),
            Stmt::Expr(Expr::Call {
                target: "g".into(),
                args: vec![],
            }),
            mv(3, mem.clone()),
        ];
        let cfg = Cfg::build(&body);
        let ae = analyze(&cfg).expect("analysis should succeed");

        let nodes = cfg.nodes();
        assert!(ae.avail_in[&nodes[1]].contains(&mem));
        assert!(!ae.avail_in[&nodes[2]].contains(&mem));
    }

    #[test]
    fn intersection_at_join_requires_both_paths() {
        let body = vec![
            Stmt::CJump {
                cond: Expr::Temp(Temp(9)),
                pos: "then".into(),
                neg: "else".into(),
            },
            Stmt::Label("then".into()),
            mv(3, add(1, 2)),
            Stmt::Jump("join".into()),
            Stmt::Label("else".into()),
            mv(4, Expr::Const(0)),
            Stmt::Label("join".into()),
            mv(5, add(1, 2)),
        ];
        let cfg = Cfg::build(&body);
        let ae = analyze(&cfg).expect("analysis should succeed");

        let nodes = cfg.nodes();
        // Only one path computes the sum, so it is not available at the
        // join.
        assert!(!ae.avail_in[&nodes[7]].contains(&add(1, 2)));
    }

    #[test]
    fn statement_expression_is_rejected() {
        let body = vec![Stmt::Expr(Expr::Seq {
            stmt: Box::new(Stmt::Label("l".into())),
            expr: Box::new(Expr::Const(0)),
        })];
        let cfg = Cfg::build(&body);

        assert!(analyze(&cfg).is_err());
    }
}
