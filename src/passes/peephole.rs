//! Peephole Cleanup
//!
//! Structural tidying after the dataflow-driven passes: jumps whose target
//! is the next statement in layout order are dropped, and labels no jump
//! references anymore are dropped with them. The entry node and the
//! function's own label always survive.

use std::collections::HashSet;

use crate::graph::Cfg;
use crate::ir::{Frame, Stmt};

/// Removes redundant jumps and unreferenced labels. Returns `true` if
/// anything was removed.
pub fn cleanup(cfg: &mut Cfg, frame: &Frame) -> bool {
    let mut changed = remove_jumps_to_next(cfg);
    changed |= remove_unreferenced_labels(cfg, frame);
    changed
}

fn remove_jumps_to_next(cfg: &mut Cfg) -> bool {
    let layout = cfg.nodes().to_vec();
    let mut removable = vec![];

    for pair in layout.windows(2) {
        let (n, next) = (pair[0], pair[1]);
        if n == cfg.entry() {
            continue;
        }
        if let Stmt::Jump(target) = cfg.stmt(n)
            && cfg.node_of_label(target) == Some(next)
        {
            removable.push(n);
        }
    }

    for n in &removable {
        cfg.graph_mut().remove_node(*n);
    }
    !removable.is_empty()
}

fn remove_unreferenced_labels(cfg: &mut Cfg, frame: &Frame) -> bool {
    let mut referenced: HashSet<&str> = HashSet::new();
    for &n in cfg.nodes() {
        match cfg.stmt(n) {
            Stmt::Jump(target) => {
                referenced.insert(target);
            }
            Stmt::CJump { pos, neg, .. } => {
                referenced.insert(pos);
                referenced.insert(neg);
            }
            _ => {}
        }
    }
    let referenced: HashSet<String> = referenced.into_iter().map(str::to_owned).collect();

    let mut removable = vec![];
    for &n in cfg.nodes() {
        if n == cfg.entry() {
            continue;
        }
        if let Stmt::Label(l) = cfg.stmt(n)
            && *l != frame.label
            && !referenced.contains(l)
        {
            removable.push(n);
        }
    }

    for n in &removable {
        cfg.graph_mut().remove_node(*n);
    }
    !removable.is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Expr, Temp};

    fn test_frame() -> Frame {
        Frame {
            label: "f".into(),
            static_depth: 0,
            locals_size: 0,
            args_size: 0,
            frame_pointer: Temp(0),
            return_value: Temp(100),
        }
    }

    fn mv(dst: u32, v: i64) -> Stmt {
        Stmt::Move {
            dst: Expr::Temp(Temp(dst)),
            src: Expr::Const(v),
        }
    }

    #[test]
    fn jump_to_next_statement_is_dropped() {
        let mut body = vec![
            mv(1, 5),
            Stmt::Jump("l".into()),
            Stmt::Label("l".into()),
            mv(2, 6),
        ];
        let mut cfg = Cfg::build(&body);

        assert!(cleanup(&mut cfg, &test_frame()));
        assert!(cfg.apply(&mut body));
        // The label loses its only reference in the same sweep.
        assert_eq!(body, vec![mv(1, 5), mv(2, 6)]);
    }

    #[test]
    fn referenced_label_survives() {
        let mut body = vec![
            Stmt::Label("top".into()),
            mv(1, 5),
            Stmt::Jump("top".into()),
        ];
        let mut cfg = Cfg::build(&body);

        assert!(!cleanup(&mut cfg, &test_frame()));
        assert!(!cfg.apply(&mut body));
    }

    #[test]
    fn unreferenced_label_is_dropped() {
        let mut body = vec![mv(1, 5), Stmt::Label("dead".into()), mv(2, 6)];
        let mut cfg = Cfg::build(&body);

        assert!(cleanup(&mut cfg, &test_frame()));
        assert!(cfg.apply(&mut body));
        assert_eq!(body, vec![mv(1, 5), mv(2, 6)]);
    }

    #[test]
    fn function_label_is_preserved() {
        let body = vec![Stmt::Label("g".into()), Stmt::Label("f".into()), mv(1, 5)];
        let mut cfg = Cfg::build(&body);

        let _ = cleanup(&mut cfg, &test_frame());
        let mut out = body;
        let _ = cfg.apply(&mut out);
        assert!(out.contains(&Stmt::Label("f".into())));
    }
}
