//! Diagnostic Traces
//!
//! Serializable per-node snapshots of the liveness analysis, for the
//! surrounding tool to dump on request. Set contents are sorted so output is
//! deterministic.

use serde::Serialize;

use crate::analysis::liveness::Liveness;
use crate::graph::{Cfg, NodeId};
use crate::ir::Temp;

/// One node's statement and liveness sets, in printable form.
#[derive(Debug, Serialize)]
pub struct NodeTrace {
    pub id: usize,
    pub stmt: String,
    pub uses: Vec<String>,
    pub defs: Vec<String>,
    pub live_in: Vec<String>,
    pub live_out: Vec<String>,
}

/// Builds one trace entry per node, in layout order.
#[must_use]
pub fn liveness_report(cfg: &Cfg, live: &Liveness) -> Vec<NodeTrace> {
    let temp_set = |map: &std::collections::HashMap<NodeId, std::collections::HashSet<Temp>>,
                    n: NodeId|
     -> Vec<String> {
        let mut temps: Vec<Temp> = map
            .get(&n)
            .map(|s| s.iter().copied().collect())
            .unwrap_or_default();
        temps.sort_unstable();
        temps.into_iter().map(|t| t.to_string()).collect()
    };

    cfg.nodes()
        .iter()
        .map(|&n| NodeTrace {
            id: n.0,
            stmt: cfg.stmt(n).to_string(),
            uses: temp_set(&live.uses, n),
            defs: temp_set(&live.defs, n),
            live_in: temp_set(&live.live_in, n),
            live_out: temp_set(&live.live_out, n),
        })
        .collect()
}
