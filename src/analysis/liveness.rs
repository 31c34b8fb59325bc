//! Liveness Analysis
//!
//! Backward data-flow analysis computing, for every _CFG_ node, the set of
//! temporaries whose value is needed on entry (`live_in`) and on exit
//! (`live_out`). Drives dead-code elimination and interference-graph
//! construction.

use std::collections::{HashMap, HashSet};

use crate::analysis::{DataFlowAnalysis, ensure_linear, run_analysis};
use crate::error::Result;
use crate::graph::{Cfg, NodeId};
use crate::ir::{Frame, Stmt, Temp};

/// Per-node liveness facts, plus the `use`/`def` sets they were derived
/// from.
#[derive(Debug)]
pub struct Liveness {
    pub uses: HashMap<NodeId, HashSet<Temp>>,
    pub defs: HashMap<NodeId, HashSet<Temp>>,
    pub live_in: HashMap<NodeId, HashSet<Temp>>,
    pub live_out: HashMap<NodeId, HashSet<Temp>>,
}

impl Liveness {
    /// Temporaries live on exit of `n` (empty for nodes the analysis never
    /// reached).
    #[inline]
    #[must_use]
    pub fn live_out_of(&self, n: NodeId) -> Option<&HashSet<Temp>> {
        self.live_out.get(&n)
    }
}

struct LivenessAnalysis {
    uses: HashMap<NodeId, HashSet<Temp>>,
    defs: HashMap<NodeId, HashSet<Temp>>,
    return_value: Temp,
}

impl DataFlowAnalysis for LivenessAnalysis {
    type Fact = HashSet<Temp>;

    #[inline]
    fn is_forward(&self) -> bool {
        false
    }

    fn initial(&self, _cfg: &Cfg) -> Self::Fact {
        // The identity element for the meet operator (union) is the empty
        // set.
        Self::Fact::default()
    }

    fn boundary(&self, _cfg: &Cfg) -> Self::Fact {
        // Nodes with no successors model the implicit return: the function's
        // return-value temporary is live there.
        let mut fact = Self::Fact::default();
        fact.insert(self.return_value);
        fact
    }

    fn meet(&self, acc: &mut Self::Fact, incoming: &Self::Fact) {
        acc.extend(incoming.iter().copied());
    }

    fn transfer(&self, _cfg: &Cfg, node: NodeId, outgoing: &Self::Fact) -> Result<Self::Fact> {
        // in[n] = use[n] ∪ (out[n] − def[n])
        let mut fact = outgoing.clone();
        if let Some(defs) = self.defs.get(&node) {
            for d in defs {
                fact.remove(d);
            }
        }
        if let Some(uses) = self.uses.get(&node) {
            fact.extend(uses.iter().copied());
        }
        Ok(fact)
    }
}

/// Derives the `use`/`def` sets of one statement: temporaries read anywhere
/// in its expression trees are uses; the destination temporary of a move is
/// its definition.
fn use_def(stmt: &Stmt) -> Result<(HashSet<Temp>, HashSet<Temp>)> {
    ensure_linear(stmt)?;

    let uses: HashSet<Temp> = stmt.read_temps().into_iter().collect();
    let mut defs = HashSet::new();
    if let Some(t) = stmt.defined_temp() {
        defs.insert(t);
    }

    Ok((uses, defs))
}

/// Runs liveness analysis over the control-flow graph.
///
/// # Errors
///
/// Returns an error if a statement is not in linearized form.
pub fn analyze(cfg: &Cfg, frame: &Frame) -> Result<Liveness> {
    let mut uses = HashMap::new();
    let mut defs = HashMap::new();

    for &n in cfg.nodes() {
        let (u, d) = use_def(cfg.stmt(n))?;
        uses.insert(n, u);
        defs.insert(n, d);
    }

    let analysis = LivenessAnalysis {
        uses,
        defs,
        return_value: frame.return_value,
    };
    let facts = run_analysis(cfg, &analysis)?;

    Ok(Liveness {
        uses: analysis.uses,
        defs: analysis.defs,
        live_in: facts.inputs,
        live_out: facts.outputs,
    })
}
