//! Optimization Pipeline
//!
//! Drives the enabled passes to a global fixed point. Passes interact (copy
//! propagation exposes dead code, folding exposes constant branches), so
//! every round re-runs the whole enabled set until a full round reports no
//! change. Each graph pass gets a freshly built control-flow graph and its
//! mutations are flattened back into the function body immediately, so no
//! pass ever observes another pass's dangling nodes.

use crate::error::Result;
use crate::graph::Cfg;
use crate::ir::{Function, Stmt};
use crate::passes::{cse, dce, fold, hoist, induction, peephole, propagate};

/// Pass toggles and the register budget for one backend run.
#[derive(Debug, Clone)]
pub struct Opts {
    pub fold: bool,
    pub symbolic_fold: bool,
    pub cse: bool,
    pub const_prop: bool,
    pub copy_prop: bool,
    pub dce: bool,
    pub hoist: bool,
    pub induction: bool,
    pub peephole: bool,
    /// General-purpose register count available to the allocator.
    pub registers: usize,
}

impl Opts {
    /// Every pass enabled.
    #[must_use]
    pub const fn all(registers: usize) -> Self {
        Self {
            fold: true,
            symbolic_fold: true,
            cse: true,
            const_prop: true,
            copy_prop: true,
            dce: true,
            hoist: true,
            induction: true,
            peephole: true,
            registers,
        }
    }

    /// Every pass disabled; the allocator still runs.
    #[must_use]
    pub const fn none(registers: usize) -> Self {
        Self {
            fold: false,
            symbolic_fold: false,
            cse: false,
            const_prop: false,
            copy_prop: false,
            dce: false,
            hoist: false,
            induction: false,
            peephole: false,
            registers,
        }
    }

    #[must_use]
    pub const fn any_enabled(&self) -> bool {
        self.fold
            || self.symbolic_fold
            || self.cse
            || self.const_prop
            || self.copy_prop
            || self.dce
            || self.hoist
            || self.induction
            || self.peephole
    }
}

/// Runs the enabled passes over one function until a full round changes
/// nothing.
///
/// # Errors
///
/// Propagates IR-shape errors from the analyses.
pub fn optimize_function(func: &mut Function, opts: &Opts) -> Result<()> {
    if func.body.is_empty() || !opts.any_enabled() {
        return Ok(());
    }

    let mut round = 0usize;
    loop {
        round += 1;
        log::debug!("optimizing `{}`: round {round}", func.frame.label);

        let mut changed = false;
        if opts.fold {
            changed |= fold::fold_constants(&mut func.body);
        }
        if opts.symbolic_fold {
            changed |= fold::fold_symbolic(&mut func.body);
        }
        if opts.cse {
            changed |= with_cfg(&mut func.body, |cfg| {
                cse::eliminate_subexprs(cfg, &mut func.temps)
            })?;
        }
        if opts.const_prop {
            changed |= with_cfg(&mut func.body, propagate::propagate_constants)?;
        }
        if opts.copy_prop {
            changed |= with_cfg(&mut func.body, propagate::propagate_copies)?;
        }
        if opts.dce {
            changed |= with_cfg(&mut func.body, |cfg| {
                dce::eliminate_dead_code(cfg, &func.frame)
            })?;
        }
        if opts.hoist {
            changed |= with_cfg(&mut func.body, |cfg| {
                hoist::hoist_invariants(cfg, &func.frame, &mut func.labels)
            })?;
        }
        if opts.induction {
            changed |= with_cfg(&mut func.body, |cfg| {
                induction::reduce_induction_variables(cfg, &mut func.temps, &mut func.labels)
            })?;
        }
        if opts.peephole {
            changed |= with_cfg(&mut func.body, |cfg| Ok(peephole::cleanup(cfg, &func.frame)))?;
        }

        if !changed {
            log::debug!(
                "optimizing `{}`: fixed point after {round} round(s)",
                func.frame.label
            );
            return Ok(());
        }
    }
}

/// Builds a control-flow graph over the body, runs one pass, and flattens
/// the result back. Reports a change if the pass did or the flattened body
/// differs.
fn with_cfg<F>(body: &mut Vec<Stmt>, pass: F) -> Result<bool>
where
    F: FnOnce(&mut Cfg) -> Result<bool>,
{
    if body.is_empty() {
        return Ok(false);
    }
    let mut cfg = Cfg::build(body);
    let changed = pass(&mut cfg)?;
    Ok(cfg.apply(body) || changed)
}
