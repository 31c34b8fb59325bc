//! Register Allocation
//!
//! Chaitin-style graph coloring over liveness-derived interference, with
//! iterative spilling. Per attempt: build the interference graph, simplify
//! nodes below the register budget, mark potential spills when none remain,
//! then select colors off the stack. Temporaries that fail to color are
//! rewritten to stack-slot loads and stores through fresh short-lived
//! temporaries, and the whole allocation restarts from a fresh graph.

use std::collections::{HashMap, HashSet};

use crate::analysis::liveness::{self, Liveness};
use crate::error::{BackendError, Result};
use crate::graph::Cfg;
use crate::ir::{BinOp, Expr, Function, Stmt, Temp};

/// Final temporary-to-register mapping for one function.
///
/// General temporaries receive indices below the register budget; the frame
/// pointer is precolored to the reserved index equal to the budget.
#[derive(Debug)]
pub struct Allocation {
    pub colors: HashMap<Temp, usize>,
}

impl Allocation {
    /// Register index assigned to `t`, if `t` appears in the function.
    #[inline]
    #[must_use]
    pub fn register_of(&self, t: Temp) -> Option<usize> {
        self.colors.get(&t).copied()
    }
}

/// Outcome of one coloring attempt.
enum Coloring {
    Complete(HashMap<Temp, usize>),
    Spilled(Vec<Temp>),
}

/// Allocates registers for every temporary in the function, rewriting the
/// body with spill code as needed.
///
/// # Errors
///
/// Returns an error if the register budget is zero, if a statement is not in
/// linearized form, or if spill-introduced temporaries would themselves need
/// spilling (the program cannot be allocated within the budget).
pub fn allocate(func: &mut Function, registers: usize) -> Result<Allocation> {
    if registers == 0 {
        return Err(BackendError::Allocator(
            "register budget must be at least one".into(),
        ));
    }

    let fp = func.frame.frame_pointer;
    if func.body.is_empty() {
        let colors = HashMap::from([(fp, registers)]);
        return Ok(Allocation { colors });
    }

    // Spill code addresses its slots through temporaries with live ranges of
    // one or two statements; if even those fail to color, the budget cannot
    // hold the program.
    let mut no_spill: HashSet<Temp> = HashSet::new();

    loop {
        let cfg = Cfg::build(&func.body);
        let live = liveness::analyze(&cfg, &func.frame)?;
        let interference = build_interference(&cfg, &live, fp);

        match color(&interference, registers, &no_spill)? {
            Coloring::Complete(mut colors) => {
                colors.insert(fp, registers);
                return Ok(Allocation { colors });
            }
            Coloring::Spilled(spills) => {
                for t in spills {
                    if no_spill.contains(&t) {
                        return Err(BackendError::Allocator(format!(
                            "spill temporary {t} cannot itself be spilled"
                        )));
                    }
                    log::debug!("spilling {t} in `{}`", func.frame.label);
                    rewrite_spill(func, t, &mut no_spill);
                }
            }
        }
    }
}

/// Builds the interference graph: every temporary read or defined anywhere
/// becomes a node, and each definition interferes with everything live-out
/// of its statement. The frame pointer never contends for a general register
/// and is excluded.
fn build_interference(
    cfg: &Cfg,
    live: &Liveness,
    fp: Temp,
) -> HashMap<Temp, HashSet<Temp>> {
    let mut graph: HashMap<Temp, HashSet<Temp>> = HashMap::new();

    for &n in cfg.nodes() {
        for t in cfg.stmt(n).read_temps() {
            graph.entry(t).or_default();
        }
        let Some(d) = cfg.stmt(n).defined_temp() else {
            continue;
        };
        graph.entry(d).or_default();

        let Some(out) = live.live_out_of(n) else {
            continue;
        };
        for &t in out {
            if t != d {
                graph.entry(d).or_default().insert(t);
                graph.entry(t).or_default().insert(d);
            }
        }
    }

    graph.remove(&fp);
    for neighbors in graph.values_mut() {
        neighbors.remove(&fp);
    }
    graph
}

/// One simplify/spill/select attempt over a fixed interference graph.
fn color(
    interference: &HashMap<Temp, HashSet<Temp>>,
    registers: usize,
    no_spill: &HashSet<Temp>,
) -> Result<Coloring> {
    let mut work = interference.clone();
    let mut stack: Vec<Temp> = Vec::with_capacity(work.len());

    while !work.is_empty() {
        // Simplify: any node below the budget, lowest index first for
        // determinism.
        let picked = work
            .iter()
            .filter(|(_, neighbors)| neighbors.len() < registers)
            .map(|(t, _)| *t)
            .min();

        // Potential spill: the highest-degree spillable node.
        let picked = match picked {
            Some(t) => t,
            None => work
                .iter()
                .filter(|(t, _)| !no_spill.contains(t))
                .max_by_key(|(t, neighbors)| (neighbors.len(), std::cmp::Reverse(t.0)))
                .map(|(t, _)| *t)
                .ok_or_else(|| {
                    BackendError::Allocator(
                        "only unspillable temporaries remain above the register budget".into(),
                    )
                })?,
        };

        work.remove(&picked);
        for neighbors in work.values_mut() {
            neighbors.remove(&picked);
        }
        stack.push(picked);
    }

    // Select: reinsert with original edges, taking the lowest register no
    // colored neighbor holds.
    let mut colors: HashMap<Temp, usize> = HashMap::with_capacity(stack.len());
    let mut spilled: Vec<Temp> = vec![];

    while let Some(t) = stack.pop() {
        let used: HashSet<usize> = interference[&t]
            .iter()
            .filter_map(|n| colors.get(n).copied())
            .collect();

        match (0..registers).find(|c| !used.contains(c)) {
            Some(c) => {
                colors.insert(t, c);
            }
            None => spilled.push(t),
        }
    }

    if spilled.is_empty() {
        Ok(Coloring::Complete(colors))
    } else {
        spilled.sort_unstable();
        Ok(Coloring::Spilled(spilled))
    }
}

/// Rewrites every use and definition of `t` to go through a fresh temporary
/// and a dedicated stack slot: uses load from the slot just before the
/// statement, definitions store to it just after.
fn rewrite_spill(func: &mut Function, t: Temp, no_spill: &mut HashSet<Temp>) {
    let offset = func.frame.alloc_spill_slot();
    let fp = func.frame.frame_pointer;
    let slot = || {
        Expr::Mem(Box::new(Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(Expr::Temp(fp)),
            rhs: Box::new(Expr::Const(offset)),
        }))
    };

    let mut out: Vec<Stmt> = Vec::with_capacity(func.body.len());
    for mut stmt in std::mem::take(&mut func.body) {
        if stmt.read_temps().contains(&t) {
            let loaded = func.temps.fresh();
            no_spill.insert(loaded);
            stmt.for_each_read_expr(&mut |e| {
                e.replace_temp(t, &Expr::Temp(loaded));
            });
            out.push(Stmt::Move {
                dst: Expr::Temp(loaded),
                src: slot(),
            });
        }

        if stmt.defined_temp() == Some(t) {
            let stored = func.temps.fresh();
            no_spill.insert(stored);
            if let Stmt::Move { dst, .. } = &mut stmt {
                *dst = Expr::Temp(stored);
            }
            out.push(stmt);
            out.push(Stmt::Move {
                dst: slot(),
                src: Expr::Temp(stored),
            });
        } else {
            out.push(stmt);
        }
    }

    func.body = out;
}
