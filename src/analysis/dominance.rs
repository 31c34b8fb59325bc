//! Dominance Analysis
//!
//! Computes the dominator set and immediate dominator of every reachable
//! _CFG_ node with the classic iterative meet-over-predecessors fixed point.
//! Feeds back-edge detection and natural-loop construction.

use std::collections::{HashMap, HashSet};

use crate::graph::{Cfg, NodeId};

/// Dominator sets and immediate dominators for one control-flow graph.
#[derive(Debug)]
pub struct Dominators {
    doms: HashMap<NodeId, HashSet<NodeId>>,
    idom: HashMap<NodeId, Option<NodeId>>,
}

impl Dominators {
    /// Returns `true` if `d` dominates `n`. Every node dominates itself.
    #[inline]
    #[must_use]
    pub fn dominates(&self, d: NodeId, n: NodeId) -> bool {
        self.doms.get(&n).is_some_and(|set| set.contains(&d))
    }

    /// Dominator set of `n`, if `n` is reachable.
    #[inline]
    #[must_use]
    pub fn dominators(&self, n: NodeId) -> Option<&HashSet<NodeId>> {
        self.doms.get(&n)
    }

    /// Immediate dominator of `n` (`None` for the entry node).
    #[inline]
    #[must_use]
    pub fn idom(&self, n: NodeId) -> Option<NodeId> {
        self.idom.get(&n).copied().flatten()
    }
}

/// Computes dominators for every node reachable from the entry.
///
/// The entry dominates only itself; every other node's dominator set is
/// itself plus the intersection of all predecessors' sets, iterated to a
/// fixed point. The sets only shrink, so the iteration terminates.
#[must_use]
pub fn analyze(cfg: &Cfg) -> Dominators {
    let mut order = cfg.graph().post_order(cfg.entry());
    order.reverse();

    let reachable: HashSet<NodeId> = order.iter().copied().collect();

    let mut doms: HashMap<NodeId, HashSet<NodeId>> = HashMap::with_capacity(order.len());
    for &n in &order {
        if n == cfg.entry() {
            doms.insert(n, HashSet::from([n]));
        } else {
            doms.insert(n, reachable.clone());
        }
    }

    let mut changed = true;
    while changed {
        changed = false;

        for &n in &order {
            if n == cfg.entry() {
                continue;
            }

            let mut new: Option<HashSet<NodeId>> = None;
            for p in cfg.graph().preds(n) {
                // Unreachable predecessors contribute nothing.
                let Some(pdoms) = doms.get(p) else {
                    continue;
                };
                new = Some(match new {
                    None => pdoms.clone(),
                    Some(acc) => acc.intersection(pdoms).copied().collect(),
                });
            }

            let mut new = new.unwrap_or_default();
            new.insert(n);

            if doms[&n] != new {
                doms.insert(n, new);
                changed = true;
            }
        }
    }

    let idom = immediate_dominators(&doms, cfg.entry());

    Dominators { doms, idom }
}

/// The immediate dominator of `n` is the unique strict dominator of `n`
/// that does not dominate any other strict dominator of `n`.
fn immediate_dominators(
    doms: &HashMap<NodeId, HashSet<NodeId>>,
    entry: NodeId,
) -> HashMap<NodeId, Option<NodeId>> {
    let mut idom = HashMap::with_capacity(doms.len());

    for (&n, set) in doms {
        if n == entry {
            idom.insert(n, None);
            continue;
        }

        let candidates: Vec<NodeId> = set.iter().copied().filter(|&d| d != n).collect();
        let found = candidates.iter().copied().find(|&d| {
            candidates
                .iter()
                .all(|&c| c == d || !doms.get(&c).is_some_and(|cd| cd.contains(&d)))
        });

        idom.insert(n, found);
    }

    idom
}
