//! Reaching Definitions
//!
//! Forward data-flow analysis computing, for every _CFG_ node, the set of
//! definition sites (nodes moving into a single temporary) whose value may
//! still be current on entry. Drives constant and copy propagation and the
//! loop-invariance proofs.

use std::collections::{HashMap, HashSet};

use crate::analysis::{DataFlowAnalysis, run_analysis};
use crate::error::Result;
use crate::graph::{Cfg, NodeId};
use crate::ir::Temp;

/// Per-node reaching-definition facts.
#[derive(Debug)]
pub struct ReachingDefs {
    /// Every definition site of each temporary.
    pub defs_of: HashMap<Temp, HashSet<NodeId>>,
    pub reach_in: HashMap<NodeId, HashSet<NodeId>>,
    pub reach_out: HashMap<NodeId, HashSet<NodeId>>,
}

impl ReachingDefs {
    /// Definitions of `t` reaching the entry of `n`, sorted for determinism.
    #[must_use]
    pub fn reaching_defs_of(&self, n: NodeId, t: Temp) -> Vec<NodeId> {
        let Some(reach) = self.reach_in.get(&n) else {
            return vec![];
        };
        let Some(sites) = self.defs_of.get(&t) else {
            return vec![];
        };

        let mut defs: Vec<NodeId> = reach.intersection(sites).copied().collect();
        defs.sort_unstable();
        defs
    }
}

struct ReachingAnalysis {
    /// Temporary each definition node defines.
    def_temp: HashMap<NodeId, Temp>,
    defs_of: HashMap<Temp, HashSet<NodeId>>,
}

impl DataFlowAnalysis for ReachingAnalysis {
    type Fact = HashSet<NodeId>;

    #[inline]
    fn is_forward(&self) -> bool {
        true
    }

    fn initial(&self, _cfg: &Cfg) -> Self::Fact {
        Self::Fact::default()
    }

    fn boundary(&self, _cfg: &Cfg) -> Self::Fact {
        // No definition reaches the function entry.
        Self::Fact::default()
    }

    fn meet(&self, acc: &mut Self::Fact, incoming: &Self::Fact) {
        acc.extend(incoming.iter().copied());
    }

    fn transfer(&self, _cfg: &Cfg, node: NodeId, incoming: &Self::Fact) -> Result<Self::Fact> {
        let mut fact = incoming.clone();

        if let Some(t) = self.def_temp.get(&node) {
            // A definition kills all other definitions of the same
            // destination temporary and generates itself.
            if let Some(sites) = self.defs_of.get(t) {
                for site in sites {
                    fact.remove(site);
                }
            }
            fact.insert(node);
        }

        Ok(fact)
    }
}

/// Runs reaching-definitions analysis over the control-flow graph.
///
/// # Errors
///
/// Propagates solver errors; the analysis itself imposes no shape
/// constraints beyond linearized statements.
pub fn analyze(cfg: &Cfg) -> Result<ReachingDefs> {
    let mut def_temp = HashMap::new();
    let mut defs_of: HashMap<Temp, HashSet<NodeId>> = HashMap::new();

    for &n in cfg.nodes() {
        if let Some(t) = cfg.stmt(n).defined_temp() {
            def_temp.insert(n, t);
            defs_of.entry(t).or_default().insert(n);
        }
    }

    let analysis = ReachingAnalysis { def_temp, defs_of };
    let facts = run_analysis(cfg, &analysis)?;

    Ok(ReachingDefs {
        defs_of: analysis.defs_of,
        reach_in: facts.inputs,
        reach_out: facts.outputs,
    })
}
