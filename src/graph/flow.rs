//! Generic directed graph of payload-carrying nodes.
//!
//! Nodes live in an arena and are addressed through stable [`NodeId`]
//! handles, so adjacency is a non-owning relation and removal never shifts
//! other nodes. A separate layout order records the linear position of every
//! live node, used when flattening a control-flow graph back into a
//! statement list.

use std::collections::HashSet;

/// Stable handle for a node in a [`Graph`].
///
/// Handles identify nodes, never contents: two nodes with equal payloads are
/// still distinct nodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub usize);

#[derive(Debug)]
struct Slot<T> {
    value: T,
    /// Nodes that can execute before.
    preds: Vec<NodeId>,
    /// Nodes that can execute after.
    succs: Vec<NodeId>,
}

/// Directed graph with stable node handles and a linear layout order.
#[derive(Debug)]
pub struct Graph<T> {
    slots: Vec<Option<Slot<T>>>,
    /// Live nodes in linear (emission) order.
    layout: Vec<NodeId>,
}

impl<T> Default for Graph<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Graph<T> {
    /// Returns a new, empty graph.
    #[inline]
    #[must_use]
    pub const fn new() -> Self {
        Self {
            slots: Vec::new(),
            layout: Vec::new(),
        }
    }

    /// Number of live nodes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.layout.len()
    }

    /// Returns `true` if the graph contains no nodes.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.layout.is_empty()
    }

    /// Returns `true` if `n` refers to a live node.
    #[inline]
    #[must_use]
    pub fn contains(&self, n: NodeId) -> bool {
        self.slots.get(n.0).is_some_and(Option::is_some)
    }

    /// Live nodes in layout order.
    #[inline]
    #[must_use]
    pub fn layout(&self) -> &[NodeId] {
        &self.layout
    }

    fn slot(&self, n: NodeId) -> &Slot<T> {
        self.slots[n.0]
            .as_ref()
            .expect("node handle should refer to a live node")
    }

    fn slot_mut(&mut self, n: NodeId) -> &mut Slot<T> {
        self.slots[n.0]
            .as_mut()
            .expect("node handle should refer to a live node")
    }

    /// Returns the payload of node `n`.
    ///
    /// # Panics
    ///
    /// Panics if `n` was removed from the graph.
    #[inline]
    #[must_use]
    pub fn value(&self, n: NodeId) -> &T {
        &self.slot(n).value
    }

    /// Returns the payload of node `n` mutably.
    ///
    /// # Panics
    ///
    /// Panics if `n` was removed from the graph.
    #[inline]
    pub fn value_mut(&mut self, n: NodeId) -> &mut T {
        &mut self.slot_mut(n).value
    }

    /// Predecessors of `n`, in insertion order.
    #[inline]
    #[must_use]
    pub fn preds(&self, n: NodeId) -> &[NodeId] {
        &self.slot(n).preds
    }

    /// Successors of `n`, in insertion order.
    #[inline]
    #[must_use]
    pub fn succs(&self, n: NodeId) -> &[NodeId] {
        &self.slot(n).succs
    }

    /// Adds a node at the end of the layout order, returning its handle.
    pub fn add_node(&mut self, value: T) -> NodeId {
        let id = NodeId(self.slots.len());
        self.slots.push(Some(Slot {
            value,
            preds: vec![],
            succs: vec![],
        }));
        self.layout.push(id);
        id
    }

    fn layout_position(&self, n: NodeId) -> usize {
        // NOTE: O(n) time complexity.
        self.layout
            .iter()
            .position(|id| *id == n)
            .expect("node should be present in the layout order")
    }

    /// Adds a node immediately before `anchor` in the layout order, without
    /// touching any edges.
    pub fn place_before(&mut self, anchor: NodeId, value: T) -> NodeId {
        let pos = self.layout_position(anchor);
        let id = self.add_node(value);
        self.layout.pop();
        self.layout.insert(pos, id);
        id
    }

    /// Adds a node immediately after `anchor` in the layout order, without
    /// touching any edges.
    pub fn place_after(&mut self, anchor: NodeId, value: T) -> NodeId {
        let pos = self.layout_position(anchor);
        let id = self.add_node(value);
        self.layout.pop();
        self.layout.insert(pos + 1, id);
        id
    }

    /// Adds a directed edge `a -> b`, mirrored in both endpoints' adjacency
    /// sets. Adding an existing edge is a no-op.
    pub fn add_edge(&mut self, a: NodeId, b: NodeId) {
        if self.slot(a).succs.contains(&b) {
            return;
        }
        self.slot_mut(a).succs.push(b);
        self.slot_mut(b).preds.push(a);
    }

    /// Removes the directed edge `a -> b` from both endpoints, if present.
    pub fn remove_edge(&mut self, a: NodeId, b: NodeId) {
        self.slot_mut(a).succs.retain(|id| *id != b);
        self.slot_mut(b).preds.retain(|id| *id != a);
    }

    /// Inserts a new node before `n`: every predecessor of `n` is rerouted
    /// to the new node, which is then linked to `n` and placed before it in
    /// the layout order.
    pub fn insert_before(&mut self, n: NodeId, value: T) -> NodeId {
        let new = self.place_before(n, value);

        for p in self.slot(n).preds.clone() {
            self.remove_edge(p, n);
            self.add_edge(p, new);
        }
        self.add_edge(new, n);

        new
    }

    /// Inserts a new node after `n`: every successor of `n` is rerouted from
    /// the new node, which `n` is then linked to and which is placed after
    /// `n` in the layout order.
    pub fn insert_after(&mut self, n: NodeId, value: T) -> NodeId {
        let new = self.place_after(n, value);

        for s in self.slot(n).succs.clone() {
            self.remove_edge(n, s);
            self.add_edge(new, s);
        }
        self.add_edge(n, new);

        new
    }

    /// Removes node `n`, splicing every predecessor to every successor so
    /// reachability through `n` is preserved.
    pub fn remove_node(&mut self, n: NodeId) {
        let preds = self.slot(n).preds.clone();
        let succs = self.slot(n).succs.clone();

        for &p in &preds {
            self.remove_edge(p, n);
        }
        for &s in &succs {
            self.remove_edge(n, s);
        }
        for &p in &preds {
            for &s in &succs {
                // Splicing must not reintroduce a self-loop through the
                // removed node.
                if p != n && s != n {
                    self.add_edge(p, s);
                }
            }
        }

        let pos = self.layout_position(n);
        self.layout.remove(pos);
        self.slots[n.0] = None;
    }

    /// Returns the reachable nodes in post order from `entry` (depth-first,
    /// following successor edges).
    #[must_use]
    pub fn post_order(&self, entry: NodeId) -> Vec<NodeId> {
        let mut post = Vec::with_capacity(self.len());
        let mut visited = HashSet::with_capacity(self.len());

        // Iterative DFS; the second stack entry tracks how many successors
        // have been expanded.
        let mut stack = vec![(entry, 0usize)];
        visited.insert(entry);

        while let Some((node, child)) = stack.pop() {
            let succs = self.succs(node);
            if child < succs.len() {
                stack.push((node, child + 1));
                let next = succs[child];
                if visited.insert(next) {
                    stack.push((next, 0));
                }
            } else {
                post.push(node);
            }
        }

        post
    }
}
