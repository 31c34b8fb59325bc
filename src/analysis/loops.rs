//! Natural Loop Analysis
//!
//! Identifies back edges and natural loops from dominance information,
//! assembles the loop-nesting tree rooted at a synthetic whole-function
//! loop, and synthesizes preheader nodes used as insertion points for
//! hoisted and initialization code.

use std::collections::{HashMap, HashSet};

use crate::analysis::dominance::Dominators;
use crate::graph::{Cfg, NodeId};
use crate::ir::{LabelGen, Stmt};

/// Insertion range of a loop's preheader: `first` is the label node, `last`
/// the cursor after which hoisted code is appended.
#[derive(Debug, Clone, Copy)]
pub struct Preheader {
    pub first: NodeId,
    pub last: NodeId,
}

/// One natural loop (or the synthetic whole-function root).
#[derive(Debug)]
pub struct LoopInfo {
    /// Header node; `None` only for the whole-function root.
    pub header: Option<NodeId>,
    /// Member nodes, header included.
    pub members: HashSet<NodeId>,
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    pub preheader: Option<Preheader>,
}

/// Loop-nesting tree for one function.
#[derive(Debug)]
pub struct LoopNest {
    pub loops: Vec<LoopInfo>,
    pub root: usize,
}

impl LoopNest {
    /// Discovers every natural loop in the graph.
    ///
    /// A back edge is any edge `n -> h` where `h` dominates `n`; the natural
    /// loop of that edge is the backward closure from `n` that stops at `h`.
    /// Loops sharing a header are merged, then nested by containment of
    /// their member sets under a synthetic whole-function root.
    #[must_use]
    pub fn find(cfg: &Cfg, doms: &Dominators) -> Self {
        let reachable = cfg.graph().post_order(cfg.entry());

        let mut members_by_header: HashMap<NodeId, HashSet<NodeId>> = HashMap::new();
        for &n in &reachable {
            for &s in cfg.graph().succs(n) {
                if doms.dominates(s, n) {
                    let members = members_by_header.entry(s).or_default();
                    collect_natural_loop(cfg, n, s, members);
                }
            }
        }

        let mut loops: Vec<LoopInfo> = vec![LoopInfo {
            header: None,
            members: reachable.iter().copied().collect(),
            parent: None,
            children: vec![],
            preheader: None,
        }];
        let root = 0;

        let mut headers: Vec<NodeId> = members_by_header.keys().copied().collect();
        headers.sort_unstable();
        for header in headers {
            let members = members_by_header
                .remove(&header)
                .expect("header key should be present");
            loops.push(LoopInfo {
                header: Some(header),
                members,
                parent: None,
                children: vec![],
                preheader: None,
            });
        }

        // Parent of each loop: the smallest loop strictly containing it.
        for i in 1..loops.len() {
            let mut parent = root;
            for j in 1..loops.len() {
                if i == j {
                    continue;
                }
                let strictly_contains = loops[j].members.len() > loops[i].members.len()
                    && loops[i].members.is_subset(&loops[j].members);
                if strictly_contains
                    && (parent == root || loops[j].members.len() < loops[parent].members.len())
                {
                    parent = j;
                }
            }
            loops[i].parent = Some(parent);
        }
        for i in 1..loops.len() {
            let parent = loops[i].parent.expect("non-root loop should have a parent");
            loops[parent].children.push(i);
        }

        Self { loops, root }
    }

    /// Non-root loop indices, innermost first (smaller member sets before
    /// the loops containing them), so preheaders and rewrites are applied
    /// bottom-up.
    #[must_use]
    pub fn inner_to_outer(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.loops.len()).filter(|&i| i != self.root).collect();
        order.sort_by_key(|&i| (self.loops[i].members.len(), i));
        order
    }

    /// Edges leaving the loop: `(member, outside successor)` pairs.
    #[must_use]
    pub fn exit_edges(&self, cfg: &Cfg, idx: usize) -> Vec<(NodeId, NodeId)> {
        let members = &self.loops[idx].members;
        let mut exits = vec![];
        for &m in members {
            if !cfg.graph().contains(m) {
                continue;
            }
            for &s in cfg.graph().succs(m) {
                if !members.contains(&s) {
                    exits.push((m, s));
                }
            }
        }
        exits
    }

    /// Adds a node created by a pass to the given loop and every enclosing
    /// loop, keeping member sets honest about the loop body's real extent.
    pub fn add_member(&mut self, idx: usize, node: NodeId) {
        let mut cur = Some(idx);
        while let Some(i) = cur {
            self.loops[i].members.insert(node);
            cur = self.loops[i].parent;
        }
    }

    fn add_to_ancestors(&mut self, idx: usize, node: NodeId) {
        if let Some(parent) = self.loops[idx].parent {
            self.add_member(parent, node);
        }
    }

    /// Returns the loop's preheader, synthesizing it on first use.
    ///
    /// Synthesis inserts one label-only node before the header and reroutes
    /// every predecessor of the header that is not a loop member to it,
    /// retargeting rerouted jumps at the new label. A sole outside
    /// predecessor that already falls through to the header is reused as the
    /// cursor instead, so repeated pipeline iterations do not stack
    /// preheaders. Jump statements never qualify: code appended after a jump
    /// in layout order would be unreachable.
    ///
    /// # Panics
    ///
    /// Panics if called on the whole-function root, which has no header.
    pub fn preheader(&mut self, cfg: &mut Cfg, idx: usize, labels: &mut LabelGen) -> Preheader {
        if let Some(ph) = self.loops[idx].preheader {
            return ph;
        }

        let header = self.loops[idx]
            .header
            .expect("the whole-function loop has no preheader");

        let outside: Vec<NodeId> = cfg
            .graph()
            .preds(header)
            .iter()
            .copied()
            .filter(|p| !self.loops[idx].members.contains(p))
            .collect();

        // Reuse an existing preheader: a sole outside predecessor whose
        // only successor is the header, reached by falling through. A jump
        // reaches the header without passing anything appended after it.
        if let [q] = outside[..]
            && cfg.graph().succs(q) == [header]
            && !matches!(cfg.stmt(q), Stmt::Jump(_) | Stmt::CJump { .. })
        {
            let ph = Preheader { first: q, last: q };
            self.loops[idx].preheader = Some(ph);
            return ph;
        }

        let label = labels.fresh("ph");
        let node = cfg
            .graph_mut()
            .place_before(header, Stmt::Label(label.clone()));

        let header_label = match cfg.stmt(header) {
            Stmt::Label(l) => Some(l.clone()),
            _ => None,
        };

        for p in outside {
            cfg.graph_mut().remove_edge(p, header);
            cfg.graph_mut().add_edge(p, node);
            if let Some(hl) = &header_label {
                retarget_jump(cfg.stmt_mut(p), hl, &label);
            }
        }
        cfg.graph_mut().add_edge(node, header);
        cfg.register_label(label, node);

        // The preheader sits inside every enclosing loop but outside this
        // one.
        self.add_to_ancestors(idx, node);

        let ph = Preheader {
            first: node,
            last: node,
        };
        self.loops[idx].preheader = Some(ph);
        ph
    }

    /// Appends a statement at the end of the loop's preheader, advancing the
    /// insertion cursor, and returns the new node.
    ///
    /// # Panics
    ///
    /// Panics if the preheader has not been synthesized yet.
    pub fn append_to_preheader(&mut self, cfg: &mut Cfg, idx: usize, stmt: Stmt) -> NodeId {
        let ph = self.loops[idx]
            .preheader
            .expect("preheader should be synthesized before appending");

        let node = cfg.graph_mut().insert_after(ph.last, stmt);
        self.loops[idx].preheader = Some(Preheader {
            first: ph.first,
            last: node,
        });
        self.add_to_ancestors(idx, node);
        node
    }
}

/// Backward closure from the back-edge source `n`, stopping at the header.
fn collect_natural_loop(cfg: &Cfg, n: NodeId, header: NodeId, members: &mut HashSet<NodeId>) {
    members.insert(header);

    let mut worklist = vec![n];
    while let Some(m) = worklist.pop() {
        if members.insert(m) {
            worklist.extend(cfg.graph().preds(m).iter().copied());
        }
    }
}

/// Rewrites jump targets equal to `old` into `new` in one statement.
fn retarget_jump(stmt: &mut Stmt, old: &str, new: &str) {
    match stmt {
        Stmt::Jump(target) if *target == *old => *target = new.to_string(),
        Stmt::CJump { pos, neg, .. } => {
            if *pos == *old {
                *pos = new.to_string();
            }
            if *neg == *old {
                *neg = new.to_string();
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analysis::dominance;
    use crate::ir::{BinOp, Expr, Temp};

    fn mv(dst: u32, src: Expr) -> Stmt {
        Stmt::Move {
            dst: Expr::Temp(Temp(dst)),
            src,
        }
    }

    fn less(t: u32, bound: i64) -> Expr {
        Expr::Binary {
            op: BinOp::OrdLess,
            lhs: Box::new(Expr::Temp(Temp(t))),
            rhs: Box::new(Expr::Const(bound)),
        }
    }

    fn while_loop() -> Vec<Stmt> {
        vec![
            mv(1, Expr::Const(0)),
            Stmt::Label("top".into()),
            mv(
                1,
                Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::Temp(Temp(1))),
                    rhs: Box::new(Expr::Const(1)),
                },
            ),
            Stmt::CJump {
                cond: less(1, 10),
                pos: "top".into(),
                neg: "out".into(),
            },
            Stmt::Label("out".into()),
        ]
    }

    /// A loop entered through a branch, so the header's outside predecessor
    /// cannot serve as a preheader cursor.
    fn guarded_loop() -> Vec<Stmt> {
        vec![
            Stmt::CJump {
                cond: less(9, 10),
                pos: "top".into(),
                neg: "out".into(),
            },
            Stmt::Label("top".into()),
            mv(
                1,
                Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::Temp(Temp(1))),
                    rhs: Box::new(Expr::Const(1)),
                },
            ),
            Stmt::CJump {
                cond: less(1, 10),
                pos: "top".into(),
                neg: "out".into(),
            },
            Stmt::Label("out".into()),
        ]
    }

    #[test]
    fn single_loop_is_discovered_with_its_members() {
        let body = while_loop();
        let cfg = Cfg::build(&body);
        let doms = dominance::analyze(&cfg);
        let nest = LoopNest::find(&cfg, &doms);

        assert_eq!(nest.loops.len(), 2);

        let header = cfg.node_of_label("top").expect("label should resolve");
        let inner = &nest.loops[nest.inner_to_outer()[0]];
        assert_eq!(inner.header, Some(header));
        assert_eq!(inner.members.len(), 3);
        assert_eq!(inner.parent, Some(nest.root));
    }

    #[test]
    fn nested_loops_form_a_containment_tree() {
        let body = vec![
            Stmt::Label("outer".into()),
            Stmt::Label("inner".into()),
            mv(1, Expr::Const(1)),
            Stmt::CJump {
                cond: less(1, 10),
                pos: "inner".into(),
                neg: "mid".into(),
            },
            Stmt::Label("mid".into()),
            Stmt::CJump {
                cond: less(2, 20),
                pos: "outer".into(),
                neg: "out".into(),
            },
            Stmt::Label("out".into()),
        ];
        let cfg = Cfg::build(&body);
        let doms = dominance::analyze(&cfg);
        let nest = LoopNest::find(&cfg, &doms);

        assert_eq!(nest.loops.len(), 3);

        let order = nest.inner_to_outer();
        let inner = &nest.loops[order[0]];
        let outer = &nest.loops[order[1]];
        assert!(inner.members.is_subset(&outer.members));
        assert_eq!(inner.parent, Some(order[1]));
        assert_eq!(outer.parent, Some(nest.root));
    }

    #[test]
    fn preheader_reroutes_only_outside_predecessors() {
        let body = guarded_loop();
        let mut cfg = Cfg::build(&body);
        let doms = dominance::analyze(&cfg);
        let mut nest = LoopNest::find(&cfg, &doms);
        let mut labels = LabelGen::new("f".into());

        let idx = nest.inner_to_outer()[0];
        let header = nest.loops[idx].header.expect("loop should have a header");
        let back_edge_src = cfg.nodes()[3];

        let ph = nest.preheader(&mut cfg, idx, &mut labels);

        // The loop entry now flows through the preheader, and the entry
        // branch was retargeted at its label.
        assert_eq!(cfg.graph().succs(ph.last), &[header]);
        assert!(cfg.graph().preds(ph.first).contains(&cfg.entry()));
        let Stmt::CJump { pos, .. } = cfg.stmt(cfg.entry()) else {
            panic!("entry should still be a conditional jump");
        };
        assert_eq!(cfg.node_of_label(pos), Some(ph.first));

        // The back edge still targets the header directly.
        assert!(cfg.graph().succs(back_edge_src).contains(&header));
        assert!(!cfg.graph().succs(back_edge_src).contains(&ph.first));
    }

    #[test]
    fn synthesized_preheader_is_reused_across_invocations() {
        let body = guarded_loop();
        let mut cfg = Cfg::build(&body);
        let doms = dominance::analyze(&cfg);
        let mut labels = LabelGen::new("f".into());

        let mut nest = LoopNest::find(&cfg, &doms);
        let idx = nest.inner_to_outer()[0];
        let ph = nest.preheader(&mut cfg, idx, &mut labels);

        // A fresh analysis over the mutated graph finds the same node.
        let doms = dominance::analyze(&cfg);
        let mut nest = LoopNest::find(&cfg, &doms);
        let idx = nest.inner_to_outer()[0];
        let reused = nest.preheader(&mut cfg, idx, &mut labels);

        assert_eq!(reused.first, ph.first);
    }

    #[test]
    fn jump_predecessor_forces_a_synthesized_preheader() {
        // The loop is entered through an unconditional jump; appending after
        // the jump in layout order would put code where control never flows,
        // so a labeled node must be synthesized instead.
        let body = vec![
            mv(2, Expr::Const(9)),
            Stmt::Jump("top".into()),
            Stmt::Label("top".into()),
            mv(
                1,
                Expr::Binary {
                    op: BinOp::Add,
                    lhs: Box::new(Expr::Temp(Temp(1))),
                    rhs: Box::new(Expr::Const(1)),
                },
            ),
            Stmt::CJump {
                cond: less(1, 10),
                pos: "top".into(),
                neg: "out".into(),
            },
            Stmt::Label("out".into()),
        ];
        let mut cfg = Cfg::build(&body);
        let doms = dominance::analyze(&cfg);
        let mut nest = LoopNest::find(&cfg, &doms);
        let mut labels = LabelGen::new("f".into());

        let idx = nest.inner_to_outer()[0];
        let header = nest.loops[idx].header.expect("loop should have a header");
        let jump = cfg.nodes()[1];

        let ph = nest.preheader(&mut cfg, idx, &mut labels);

        // A fresh label was inserted between the jump and the header, and
        // the jump retargeted at it.
        assert_ne!(ph.first, jump);
        assert!(matches!(cfg.stmt(ph.first), Stmt::Label(_)));
        assert_eq!(cfg.graph().succs(jump), &[ph.first]);
        assert_eq!(cfg.graph().succs(ph.last), &[header]);
        let Stmt::Jump(target) = cfg.stmt(jump) else {
            panic!("entry jump should survive");
        };
        assert_eq!(cfg.node_of_label(target), Some(ph.first));

        // Appended code lands between the jump and the header.
        nest.append_to_preheader(&mut cfg, idx, mv(3, Expr::Const(1)));
        let mut out = body;
        assert!(cfg.apply(&mut out));
        let jump_pos = out
            .iter()
            .position(|s| matches!(s, Stmt::Jump(_)))
            .expect("jump should remain");
        let seed_pos = out
            .iter()
            .position(|s| *s == mv(3, Expr::Const(1)))
            .expect("appended move should be present");
        let header_pos = out
            .iter()
            .position(|s| *s == Stmt::Label("top".into()))
            .expect("header label should remain");
        assert!(jump_pos < seed_pos && seed_pos < header_pos);
    }

    #[test]
    fn fallthrough_predecessor_serves_as_the_cursor() {
        let body = while_loop();
        let mut cfg = Cfg::build(&body);
        let doms = dominance::analyze(&cfg);
        let mut nest = LoopNest::find(&cfg, &doms);
        let mut labels = LabelGen::new("f".into());

        let idx = nest.inner_to_outer()[0];
        let ph = nest.preheader(&mut cfg, idx, &mut labels);

        // The initializer falling into the header is the whole preheader;
        // no node was synthesized.
        assert_eq!(ph.first, cfg.entry());
        assert_eq!(cfg.nodes().len(), body.len());
    }

    #[test]
    fn appending_advances_the_preheader_cursor() {
        let body = while_loop();
        let mut cfg = Cfg::build(&body);
        let doms = dominance::analyze(&cfg);
        let mut nest = LoopNest::find(&cfg, &doms);
        let mut labels = LabelGen::new("f".into());

        let idx = nest.inner_to_outer()[0];
        let header = nest.loops[idx].header.expect("loop should have a header");
        nest.preheader(&mut cfg, idx, &mut labels);

        let a = nest.append_to_preheader(&mut cfg, idx, mv(7, Expr::Const(1)));
        let b = nest.append_to_preheader(&mut cfg, idx, mv(8, Expr::Const(2)));

        assert_eq!(cfg.graph().succs(a), &[b]);
        assert_eq!(cfg.graph().succs(b), &[header]);
        assert!(!nest.loops[idx].members.contains(&a));
    }
}
