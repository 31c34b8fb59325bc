//! Data Flow Analysis
//!
//! Generic framework for bi-directional data-flow analyses over a
//! control-flow graph (_CFG_), plus the concrete analyses the optimization
//! passes and the register allocator consume.

pub mod available;
pub mod dominance;
pub mod liveness;
pub mod loops;
pub mod reaching;

use std::collections::{HashMap, HashSet, VecDeque};

use crate::error::{BackendError, Result};
use crate::graph::{Cfg, NodeId};
use crate::ir::{Expr, Stmt};

/// Trait for performing data-flow analysis over a control-flow graph
/// (bi-directional).
pub trait DataFlowAnalysis {
    /// Information being tracked at each program point.
    type Fact: Clone + PartialEq;

    /// Returns `true` if this is a forward analysis.
    fn is_forward(&self) -> bool;

    /// Starting value for every node's `in`/`out` sets. Must be the identity
    /// element of [`meet`]: the empty set for union-based analyses, the
    /// universal set for intersection-based ones.
    ///
    /// [`meet`]: DataFlowAnalysis::meet
    fn initial(&self, cfg: &Cfg) -> Self::Fact;

    /// Fact forced at the graph boundary: the entry node's `in` set for a
    /// forward analysis, or the `out` set of successor-less nodes for a
    /// backward one.
    fn boundary(&self, cfg: &Cfg) -> Self::Fact;

    /// Merges a neighboring fact into the accumulator (union or
    /// intersection, per analysis).
    fn meet(&self, acc: &mut Self::Fact, incoming: &Self::Fact);

    /// Propagates the incoming fact through one node's statement.
    ///
    /// # Errors
    ///
    /// Returns an error if the statement violates the shape this analysis
    /// requires.
    fn transfer(&self, cfg: &Cfg, node: NodeId, incoming: &Self::Fact) -> Result<Self::Fact>;
}

/// Per-node `in`/`out` facts computed by [`run_analysis`].
#[derive(Debug)]
pub struct DataFlowFacts<F> {
    pub inputs: HashMap<NodeId, F>,
    pub outputs: HashMap<NodeId, F>,
}

/// Fixed-point solver for a data-flow analysis over a control-flow graph,
/// iterating a worklist until facts converge.
///
/// Terminates because every analysis updates its facts monotonically over a
/// finite lattice.
///
/// # Errors
///
/// Propagates IR-shape errors raised by the analysis' transfer function.
pub fn run_analysis<A: DataFlowAnalysis>(cfg: &Cfg, a: &A) -> Result<DataFlowFacts<A::Fact>> {
    let init = a.initial(cfg);

    // Working in post-order (reverse post-order for forward analyses)
    // minimizes the number of times a node needs to be revisited.
    let mut order = cfg.graph().post_order(cfg.entry());
    if a.is_forward() {
        order.reverse();
    }

    let mut facts = DataFlowFacts {
        inputs: HashMap::with_capacity(order.len()),
        outputs: HashMap::with_capacity(order.len()),
    };
    for &n in &order {
        facts.inputs.insert(n, init.clone());
        facts.outputs.insert(n, init.clone());
    }

    let mut seen: HashSet<NodeId> = order.iter().copied().collect();
    let mut worklist: VecDeque<NodeId> = order.into_iter().collect();

    while let Some(node) = worklist.pop_front() {
        // Ensures we reflect the state of the worklist.
        seen.remove(&node);

        let incoming = merge_neighbors(cfg, a, &facts, node, &init);

        let changed = if a.is_forward() {
            let out = a.transfer(cfg, node, &incoming)?;
            let changed = facts.outputs.get(&node) != Some(&out);
            facts.inputs.insert(node, incoming);
            facts.outputs.insert(node, out);
            changed
        } else {
            let r#in = a.transfer(cfg, node, &incoming)?;
            let changed = facts.inputs.get(&node) != Some(&r#in);
            facts.outputs.insert(node, incoming);
            facts.inputs.insert(node, r#in);
            changed
        };

        if changed {
            let next_nodes = if a.is_forward() {
                cfg.graph().succs(node)
            } else {
                cfg.graph().preds(node)
            };

            for &next in next_nodes {
                // Only revisit nodes the analysis initialized (reachable
                // ones) and that are not already queued.
                if facts.inputs.contains_key(&next) && seen.insert(next) {
                    worklist.push_back(next);
                }
            }
        }
    }

    Ok(facts)
}

/// Merges the relevant neighbor facts for `node`: predecessor `out` sets for
/// a forward analysis, successor `in` sets for a backward one. Boundary
/// nodes take the boundary fact instead.
fn merge_neighbors<A: DataFlowAnalysis>(
    cfg: &Cfg,
    a: &A,
    facts: &DataFlowFacts<A::Fact>,
    node: NodeId,
    init: &A::Fact,
) -> A::Fact {
    if a.is_forward() {
        if node == cfg.entry() {
            // The entry's incoming fact is forced, even if back edges reach
            // the first statement.
            return a.boundary(cfg);
        }

        let mut acc = init.clone();
        for p in cfg.graph().preds(node) {
            if let Some(out) = facts.outputs.get(p) {
                a.meet(&mut acc, out);
            }
        }
        acc
    } else {
        let succs = cfg.graph().succs(node);
        if succs.is_empty() {
            return a.boundary(cfg);
        }

        let mut acc = init.clone();
        for s in succs {
            if let Some(r#in) = facts.inputs.get(s) {
                a.meet(&mut acc, r#in);
            }
        }
        acc
    }
}

/// Rejects statement forms the analyses cannot tolerate: statement sequences
/// and embedded statement-expressions, which linearization is required to
/// have removed.
pub(crate) fn ensure_linear(stmt: &Stmt) -> Result<()> {
    let ill_formed = match stmt {
        Stmt::Seq(_) => true,
        Stmt::Move { dst, src } => {
            dst.contains_seq()
                || src.contains_seq()
                || !matches!(dst, Expr::Temp(_) | Expr::Mem(_))
        }
        Stmt::Expr(e) => e.contains_seq(),
        Stmt::CJump { cond, .. } => cond.contains_seq(),
        Stmt::Label(_) | Stmt::Jump(_) => false,
    };

    if ill_formed {
        return Err(BackendError::IrShape(stmt.to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    use crate::ir::{BinOp, Temp};

    /// Wraps an analysis and records every fact its transfer produces, per
    /// node, in visit order.
    struct Recording<A: DataFlowAnalysis> {
        inner: A,
        history: RefCell<HashMap<NodeId, Vec<A::Fact>>>,
    }

    impl<A: DataFlowAnalysis> Recording<A> {
        fn new(inner: A) -> Self {
            Self {
                inner,
                history: RefCell::new(HashMap::new()),
            }
        }
    }

    impl<A: DataFlowAnalysis> DataFlowAnalysis for Recording<A> {
        type Fact = A::Fact;

        fn is_forward(&self) -> bool {
            self.inner.is_forward()
        }

        fn initial(&self, cfg: &Cfg) -> Self::Fact {
            self.inner.initial(cfg)
        }

        fn boundary(&self, cfg: &Cfg) -> Self::Fact {
            self.inner.boundary(cfg)
        }

        fn meet(&self, acc: &mut Self::Fact, incoming: &Self::Fact) {
            self.inner.meet(acc, incoming);
        }

        fn transfer(&self, cfg: &Cfg, node: NodeId, incoming: &Self::Fact) -> Result<Self::Fact> {
            let fact = self.inner.transfer(cfg, node, incoming)?;
            self.history
                .borrow_mut()
                .entry(node)
                .or_default()
                .push(fact.clone());
            Ok(fact)
        }
    }

    /// Forward union analysis: each node's fact accumulates the indices of
    /// the nodes on some path to it.
    struct UnionNodes;

    impl DataFlowAnalysis for UnionNodes {
        type Fact = HashSet<usize>;

        fn is_forward(&self) -> bool {
            true
        }

        fn initial(&self, _cfg: &Cfg) -> Self::Fact {
            HashSet::new()
        }

        fn boundary(&self, _cfg: &Cfg) -> Self::Fact {
            HashSet::new()
        }

        fn meet(&self, acc: &mut Self::Fact, incoming: &Self::Fact) {
            acc.extend(incoming.iter().copied());
        }

        fn transfer(&self, _cfg: &Cfg, node: NodeId, incoming: &Self::Fact) -> Result<Self::Fact> {
            let mut fact = incoming.clone();
            fact.insert(node.0);
            Ok(fact)
        }
    }

    /// Forward intersection analysis: each node's fact keeps the indices of
    /// the nodes on every path to it.
    struct IntersectNodes {
        universe: HashSet<usize>,
    }

    impl DataFlowAnalysis for IntersectNodes {
        type Fact = HashSet<usize>;

        fn is_forward(&self) -> bool {
            true
        }

        fn initial(&self, _cfg: &Cfg) -> Self::Fact {
            self.universe.clone()
        }

        fn boundary(&self, _cfg: &Cfg) -> Self::Fact {
            HashSet::new()
        }

        fn meet(&self, acc: &mut Self::Fact, incoming: &Self::Fact) {
            acc.retain(|e| incoming.contains(e));
        }

        fn transfer(&self, _cfg: &Cfg, node: NodeId, incoming: &Self::Fact) -> Result<Self::Fact> {
            let mut fact = incoming.clone();
            fact.insert(node.0);
            Ok(fact)
        }
    }

    fn looping_body() -> Vec<Stmt> {
        vec![
            Stmt::Label("top".into()),
            Stmt::Move {
                dst: Expr::Temp(Temp(1)),
                src: Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::Temp(Temp(1))),
                    rhs: Box::new(Expr::Const(1)),
                },
            },
            Stmt::CJump {
                cond: Expr::Binary {
                    op: BinOp::OrdLess,
                    lhs: Box::new(Expr::Temp(Temp(1))),
                    rhs: Box::new(Expr::Const(10)),
                },
                pos: "top".into(),
                neg: "out".into(),
            },
            Stmt::Label("out".into()),
        ]
    }

    #[test]
    fn union_facts_only_grow_and_iteration_is_bounded() {
        let body = looping_body();
        let cfg = Cfg::build(&body);
        let analysis = Recording::new(UnionNodes);

        run_analysis(&cfg, &analysis).expect("analysis should succeed");

        let history = analysis.history.borrow();
        let mut visits = 0;
        for facts in history.values() {
            visits += facts.len();
            for pair in facts.windows(2) {
                assert!(
                    pair[0].is_subset(&pair[1]),
                    "union fact shrank between iterations"
                );
            }
        }

        // Around the back edge every node is revisited at most once per
        // lattice step, so the visit count stays well under nodes squared.
        let n = cfg.nodes().len();
        assert!(visits <= n * (n + 1), "solver exceeded the iteration bound");
    }

    #[test]
    fn intersection_facts_only_shrink_on_a_looping_graph() {
        let body = looping_body();
        let cfg = Cfg::build(&body);
        let universe: HashSet<usize> = cfg.nodes().iter().map(|n| n.0).collect();
        let analysis = Recording::new(IntersectNodes { universe });

        run_analysis(&cfg, &analysis).expect("analysis should succeed");

        let history = analysis.history.borrow();
        assert_eq!(history.len(), cfg.nodes().len());
        for facts in history.values() {
            for pair in facts.windows(2) {
                assert!(
                    pair[1].is_subset(&pair[0]),
                    "intersection fact grew between iterations"
                );
            }
        }
    }
}
