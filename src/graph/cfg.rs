//! Control-Flow Graph
//!
//! Builds a control-flow graph (_CFG_) over the individual statements of one
//! function's linear _IR_, with conditional and unconditional jumps resolved
//! to edges, and flattens the graph back into a statement list once passes
//! have mutated it.

use std::collections::HashMap;

use crate::graph::flow::{Graph, NodeId};
use crate::ir::Stmt;

/// Control-flow graph for one function. Nodes wrap individual statements;
/// edges are possible execution transfers.
#[derive(Debug)]
pub struct Cfg {
    graph: Graph<Stmt>,
    entry: NodeId,
    /// Maps each label to its corresponding node.
    label_map: HashMap<String, NodeId>,
}

impl Cfg {
    /// Builds the control-flow graph for the given statement list.
    ///
    /// The first pass creates one node per statement in order, so that jump
    /// targets resolve to a stable identity; the second pass adds edges. A
    /// jump whose target label lies outside the function (e.g. the exit
    /// label) yields no edge: the function boundary is the graph boundary.
    ///
    /// # Panics
    ///
    /// Panics if `body` is empty; empty functions are not optimized.
    #[must_use]
    pub fn build(body: &[Stmt]) -> Self {
        assert!(!body.is_empty(), "cannot build a CFG for an empty function");

        let mut graph = Graph::new();
        let mut label_map = HashMap::new();

        let nodes: Vec<NodeId> = body
            .iter()
            .map(|stmt| {
                let id = graph.add_node(stmt.clone());
                if let Stmt::Label(label) = stmt {
                    label_map.insert(label.clone(), id);
                }
                id
            })
            .collect();

        for (i, stmt) in body.iter().enumerate() {
            let node = nodes[i];

            match stmt {
                Stmt::Jump(target) => {
                    if let Some(target_id) = label_map.get(target) {
                        graph.add_edge(node, *target_id);
                    }
                }
                Stmt::CJump { pos, neg, .. } => {
                    if let Some(neg_id) = label_map.get(neg) {
                        graph.add_edge(node, *neg_id);
                    }
                    if let Some(pos_id) = label_map.get(pos) {
                        graph.add_edge(node, *pos_id);
                    }
                }
                _ => {
                    if let Some(next) = nodes.get(i + 1) {
                        graph.add_edge(node, *next);
                    }
                }
            }
        }

        Self {
            graph,
            entry: nodes[0],
            label_map,
        }
    }

    /// The unique entry node (the first statement's node).
    #[inline]
    #[must_use]
    pub const fn entry(&self) -> NodeId {
        self.entry
    }

    /// Underlying graph, immutable.
    #[inline]
    #[must_use]
    pub const fn graph(&self) -> &Graph<Stmt> {
        &self.graph
    }

    /// Underlying graph, mutable. Passes that iterate while mutating must
    /// snapshot the node collections they iterate.
    #[inline]
    pub const fn graph_mut(&mut self) -> &mut Graph<Stmt> {
        &mut self.graph
    }

    /// Statement wrapped by node `n`.
    #[inline]
    #[must_use]
    pub fn stmt(&self, n: NodeId) -> &Stmt {
        self.graph.value(n)
    }

    /// Statement wrapped by node `n`, mutable.
    #[inline]
    pub fn stmt_mut(&mut self, n: NodeId) -> &mut Stmt {
        self.graph.value_mut(n)
    }

    /// Node a label resolves to, if the label belongs to this function.
    #[inline]
    #[must_use]
    pub fn node_of_label(&self, label: &str) -> Option<NodeId> {
        self.label_map.get(label).copied()
    }

    /// Registers a label created by a pass (e.g. a synthesized preheader) so
    /// later jump resolution sees it.
    #[inline]
    pub fn register_label(&mut self, label: String, node: NodeId) {
        self.label_map.insert(label, node);
    }

    /// Live nodes in layout (emission) order.
    #[inline]
    #[must_use]
    pub fn nodes(&self) -> &[NodeId] {
        self.graph.layout()
    }

    /// Flattens the graph back into the provided statement list, returning
    /// `true` if changes were made (indicating further optimization is
    /// possible).
    #[must_use]
    pub fn apply(&self, body: &mut Vec<Stmt>) -> bool {
        let mut flattened: Vec<Stmt> = self
            .graph
            .layout()
            .iter()
            .map(|&n| self.graph.value(n).clone())
            .collect();

        let is_changed = flattened != *body;

        if is_changed {
            std::mem::swap(body, &mut flattened);
        }

        is_changed
    }
}
