//! Intermediate Representation
//!
//! Linear, label-addressed intermediate representation (_IR_) consumed by the
//! backend: one statement list per function plus a frame descriptor. The
//! upstream translator produces this form; the backend mutates it in place
//! and hands the rewritten list to final code emission.

use std::fmt;

/// Machine word size in bytes, used for spill-slot sizing.
pub const WORD_SIZE: i64 = 8;

/// A temporary: an abstract register not yet assigned a machine register.
///
/// Temporaries are compared by identity of their index, never by the value
/// they hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Temp(pub u32);

impl fmt::Display for Temp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "t{}", self.0)
    }
}

/// Allocator for fresh temporaries within one function.
#[derive(Debug, Clone)]
pub struct TempGen {
    next: u32,
}

impl TempGen {
    /// Returns a generator whose first fresh temporary is `t<next>`.
    #[inline]
    #[must_use]
    pub const fn new(next: u32) -> Self {
        Self { next }
    }

    /// Returns a new, unused temporary.
    #[inline]
    pub fn fresh(&mut self) -> Temp {
        let t = Temp(self.next);
        self.next += 1;
        t
    }
}

/// Allocator for fresh labels within one function.
///
/// The `.` in generated labels guarantees they cannot collide with
/// user-defined labels, which upstream name resolution forbids from
/// containing `.`.
#[derive(Debug, Clone)]
pub struct LabelGen {
    base: String,
    count: u32,
}

impl LabelGen {
    /// Returns a generator scoped to the given function label.
    #[inline]
    #[must_use]
    pub const fn new(base: String) -> Self {
        Self { base, count: 0 }
    }

    /// Returns a new label identifier, appending the provided suffix.
    pub fn fresh(&mut self, suffix: &str) -> String {
        let label = format!("{}.lbl.{}.{suffix}", self.base, self.count);
        self.count += 1;
        label
    }
}

/// Binary operators over signed 64-bit integer and boolean (0/1) semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    BitAnd,
    BitOr,
    BitXor,
    ShiftLeft,
    ShiftRight,
    LogAnd,
    LogOr,
    Eq,
    NotEq,
    OrdLess,
    OrdLessEq,
    OrdGreater,
    OrdGreaterEq,
}

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnOp {
    Negate,
    Complement,
    Not,
}

/// _IR_ expression.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Expr {
    /// Constant integer value (64-bit).
    Const(i64),
    /// Read of a temporary.
    Temp(Temp),
    /// Symbolic address of a label.
    Name(String),
    /// Read of the memory word at the address the inner expression yields.
    Mem(Box<Expr>),
    /// Binary operation on two sub-expressions.
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// Unary operation on a sub-expression.
    Unary { op: UnOp, expr: Box<Expr> },
    /// Call of the function named by `target`.
    Call { target: String, args: Vec<Expr> },
    /// Statement-expression: evaluate `stmt` for effect, then `expr`.
    ///
    /// Linearization eliminates these before the backend runs; analyses that
    /// cannot tolerate one report an IR-shape error.
    Seq { stmt: Box<Stmt>, expr: Box<Expr> },
}

impl Expr {
    /// Returns `true` if evaluating this expression could have an observable
    /// side effect (a call or an embedded statement).
    #[must_use]
    pub fn has_side_effects(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Temp(_) | Expr::Name(_) => false,
            Expr::Mem(addr) => addr.has_side_effects(),
            Expr::Binary { lhs, rhs, .. } => lhs.has_side_effects() || rhs.has_side_effects(),
            Expr::Unary { expr, .. } => expr.has_side_effects(),
            Expr::Call { .. } | Expr::Seq { .. } => true,
        }
    }

    /// Returns `true` if this expression contains a memory read anywhere in
    /// its tree.
    #[must_use]
    pub fn reads_memory(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Temp(_) | Expr::Name(_) => false,
            Expr::Mem(_) => true,
            Expr::Binary { lhs, rhs, .. } => lhs.reads_memory() || rhs.reads_memory(),
            Expr::Unary { expr, .. } => expr.reads_memory(),
            Expr::Call { args, .. } => args.iter().any(Expr::reads_memory),
            Expr::Seq { expr, .. } => expr.reads_memory(),
        }
    }

    /// Returns `true` if this expression contains a call anywhere in its
    /// tree.
    #[must_use]
    pub fn contains_call(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Temp(_) | Expr::Name(_) => false,
            Expr::Mem(addr) => addr.contains_call(),
            Expr::Binary { lhs, rhs, .. } => lhs.contains_call() || rhs.contains_call(),
            Expr::Unary { expr, .. } => expr.contains_call(),
            Expr::Call { .. } => true,
            Expr::Seq { expr, .. } => expr.contains_call(),
        }
    }

    /// Returns `true` if the temporary `t` is read anywhere in this tree.
    #[must_use]
    pub fn mentions(&self, t: Temp) -> bool {
        match self {
            Expr::Const(_) | Expr::Name(_) => false,
            Expr::Temp(u) => *u == t,
            Expr::Mem(addr) => addr.mentions(t),
            Expr::Binary { lhs, rhs, .. } => lhs.mentions(t) || rhs.mentions(t),
            Expr::Unary { expr, .. } => expr.mentions(t),
            Expr::Call { args, .. } => args.iter().any(|a| a.mentions(t)),
            Expr::Seq { expr, .. } => expr.mentions(t),
        }
    }

    /// Returns `true` if this tree embeds a statement-expression.
    #[must_use]
    pub fn contains_seq(&self) -> bool {
        match self {
            Expr::Const(_) | Expr::Temp(_) | Expr::Name(_) => false,
            Expr::Mem(addr) => addr.contains_seq(),
            Expr::Binary { lhs, rhs, .. } => lhs.contains_seq() || rhs.contains_seq(),
            Expr::Unary { expr, .. } => expr.contains_seq(),
            Expr::Call { args, .. } => args.iter().any(Expr::contains_seq),
            Expr::Seq { .. } => true,
        }
    }

    /// Collects every temporary read in this tree into `out`.
    pub fn collect_temps(&self, out: &mut Vec<Temp>) {
        match self {
            Expr::Const(_) | Expr::Name(_) => {}
            Expr::Temp(t) => out.push(*t),
            Expr::Mem(addr) => addr.collect_temps(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_temps(out);
                rhs.collect_temps(out);
            }
            Expr::Unary { expr, .. } => expr.collect_temps(out),
            Expr::Call { args, .. } => {
                for arg in args {
                    arg.collect_temps(out);
                }
            }
            Expr::Seq { expr, .. } => expr.collect_temps(out),
        }
    }

    /// Replaces every read of `from` with the expression `to`, returning
    /// `true` if at least one replacement happened.
    pub fn replace_temp(&mut self, from: Temp, to: &Expr) -> bool {
        match self {
            Expr::Const(_) | Expr::Name(_) => false,
            Expr::Temp(t) => {
                if *t == from {
                    *self = to.clone();
                    true
                } else {
                    false
                }
            }
            Expr::Mem(addr) => addr.replace_temp(from, to),
            Expr::Binary { lhs, rhs, .. } => {
                // Avoid short-circuiting so both operands are rewritten.
                let l = lhs.replace_temp(from, to);
                let r = rhs.replace_temp(from, to);
                l || r
            }
            Expr::Unary { expr, .. } => expr.replace_temp(from, to),
            Expr::Call { args, .. } => {
                let mut changed = false;
                for arg in args {
                    changed |= arg.replace_temp(from, to);
                }
                changed
            }
            Expr::Seq { expr, .. } => expr.replace_temp(from, to),
        }
    }
}

/// _IR_ statement.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Stmt {
    /// Associates a label with a location in the function.
    Label(String),
    /// Unconditionally transfers control to the statement after the label.
    Jump(String),
    /// Transfers control to `pos` if `cond` evaluates non-zero, `neg`
    /// otherwise.
    CJump {
        cond: Expr,
        pos: String,
        neg: String,
    },
    /// Evaluates `src` and stores the result into `dst`, which must be a
    /// temporary or a memory location.
    Move { dst: Expr, src: Expr },
    /// Evaluates an expression for its side effects, discarding the value.
    Expr(Expr),
    /// Statement sequence. Linearization flattens these away; the backend
    /// treats one as an IR-shape violation.
    Seq(Vec<Stmt>),
}

impl Stmt {
    /// Returns the temporary this statement defines, if it is a move into a
    /// single temporary.
    #[inline]
    #[must_use]
    pub fn defined_temp(&self) -> Option<Temp> {
        match self {
            Stmt::Move {
                dst: Expr::Temp(t), ..
            } => Some(*t),
            _ => None,
        }
    }

    /// Visits every expression this statement *reads*, mutably. The
    /// destination temporary of a move is a definition, not a read, and is
    /// skipped; the address of a memory-write destination is a read and is
    /// visited.
    pub fn for_each_read_expr<F: FnMut(&mut Expr)>(&mut self, f: &mut F) {
        match self {
            Stmt::Move { dst, src } => {
                if let Expr::Mem(addr) = dst {
                    f(addr);
                }
                f(src);
            }
            Stmt::CJump { cond, .. } => f(cond),
            Stmt::Expr(e) => f(e),
            Stmt::Label(_) | Stmt::Jump(_) => {}
            Stmt::Seq(stmts) => {
                for stmt in stmts {
                    stmt.for_each_read_expr(f);
                }
            }
        }
    }

    /// Temporaries this statement reads, in traversal order (duplicates
    /// preserved).
    #[must_use]
    pub fn read_temps(&self) -> Vec<Temp> {
        let mut out = vec![];
        match self {
            Stmt::Move { dst, src } => {
                if let Expr::Mem(addr) = dst {
                    addr.collect_temps(&mut out);
                }
                src.collect_temps(&mut out);
            }
            Stmt::CJump { cond, .. } => cond.collect_temps(&mut out),
            Stmt::Expr(e) => e.collect_temps(&mut out),
            Stmt::Label(_) | Stmt::Jump(_) => {}
            Stmt::Seq(stmts) => {
                for stmt in stmts {
                    out.extend(stmt.read_temps());
                }
            }
        }
        out
    }

    /// Returns `true` if this statement may write memory or transfer control
    /// out of the function body (calls included).
    #[must_use]
    pub fn clobbers_memory(&self) -> bool {
        match self {
            Stmt::Move { dst, src } => {
                matches!(dst, Expr::Mem(_)) || src.contains_call() || dst.contains_call()
            }
            Stmt::Expr(e) => e.contains_call(),
            Stmt::CJump { cond, .. } => cond.contains_call(),
            Stmt::Label(_) | Stmt::Jump(_) | Stmt::Seq(_) => false,
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinOp::Add => "+",
            BinOp::Subtract => "-",
            BinOp::Multiply => "*",
            BinOp::Divide => "/",
            BinOp::Modulo => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::ShiftLeft => "<<",
            BinOp::ShiftRight => ">>",
            BinOp::LogAnd => "&&",
            BinOp::LogOr => "||",
            BinOp::Eq => "==",
            BinOp::NotEq => "!=",
            BinOp::OrdLess => "<",
            BinOp::OrdLessEq => "<=",
            BinOp::OrdGreater => ">",
            BinOp::OrdGreaterEq => ">=",
        };
        f.write_str(s)
    }
}

impl fmt::Display for UnOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UnOp::Negate => "-",
            UnOp::Complement => "~",
            UnOp::Not => "!",
        };
        f.write_str(s)
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Const(v) => write!(f, "{v}"),
            Expr::Temp(t) => write!(f, "{t}"),
            Expr::Name(l) => write!(f, "&{l}"),
            Expr::Mem(addr) => write!(f, "M[{addr}]"),
            Expr::Binary { op, lhs, rhs } => write!(f, "({lhs} {op} {rhs})"),
            Expr::Unary { op, expr } => write!(f, "{op}({expr})"),
            Expr::Call { target, args } => {
                write!(f, "{target}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
            Expr::Seq { stmt, expr } => write!(f, "({stmt}; {expr})"),
        }
    }
}

impl fmt::Display for Stmt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Stmt::Label(l) => write!(f, "{l}:"),
            Stmt::Jump(l) => write!(f, "jump {l}"),
            Stmt::CJump { cond, pos, neg } => write!(f, "cjump {cond} ? {pos} : {neg}"),
            Stmt::Move { dst, src } => write!(f, "{dst} <- {src}"),
            Stmt::Expr(e) => write!(f, "{e}"),
            Stmt::Seq(stmts) => {
                write!(f, "{{ ")?;
                for stmt in stmts {
                    write!(f, "{stmt}; ")?;
                }
                write!(f, "}}")
            }
        }
    }
}

/// Frame descriptor for one function, produced by upstream stack-layout
/// computation.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Function entry label.
    pub label: String,
    /// Static nesting depth of the function.
    pub static_depth: u32,
    /// Size of the locals area in bytes; grows as spill slots are allocated.
    pub locals_size: i64,
    /// Size of the incoming arguments area in bytes.
    pub args_size: i64,
    /// Frame pointer temporary, precolored to its own reserved register.
    pub frame_pointer: Temp,
    /// Return value temporary, implicitly live at every function exit.
    pub return_value: Temp,
}

impl Frame {
    /// Reserves one word of spill storage in the locals area and returns the
    /// slot's offset from the frame pointer.
    #[inline]
    pub fn alloc_spill_slot(&mut self) -> i64 {
        self.locals_size += WORD_SIZE;
        -self.locals_size
    }
}

/// One function in backend form: its frame, its linear statement list, and
/// the generators used to mint fresh temporaries and labels.
#[derive(Debug)]
pub struct Function {
    pub frame: Frame,
    pub body: Vec<Stmt>,
    pub temps: TempGen,
    pub labels: LabelGen,
}

impl Function {
    /// Wraps an upstream statement list and frame descriptor. `next_temp`
    /// must be larger than the index of every temporary appearing in `body`.
    #[must_use]
    pub fn new(frame: Frame, body: Vec<Stmt>, next_temp: u32) -> Self {
        let labels = LabelGen::new(frame.label.clone());
        Self {
            frame,
            body,
            temps: TempGen::new(next_temp),
            labels,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Fn {:?}", self.frame.label)?;
        for stmt in &self.body {
            writeln!(f, "{:8}{stmt}", "")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn add(lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op: BinOp::Add,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    #[test]
    fn replace_temp_rewrites_all_reads() {
        let mut e = add(Expr::Temp(Temp(1)), add(Expr::Temp(Temp(1)), Expr::Const(2)));
        let changed = e.replace_temp(Temp(1), &Expr::Const(7));

        assert!(changed);
        assert!(!e.mentions(Temp(1)));
    }

    #[test]
    fn collect_temps_walks_nested_trees() {
        let e = Expr::Mem(Box::new(add(Expr::Temp(Temp(3)), Expr::Temp(Temp(4)))));
        let mut temps = vec![];
        e.collect_temps(&mut temps);

        assert_eq!(temps, vec![Temp(3), Temp(4)]);
    }

    #[test]
    fn spill_slots_grow_the_locals_area() {
        let mut frame = Frame {
            label: "f".into(),
            static_depth: 0,
            locals_size: 16,
            args_size: 0,
            frame_pointer: Temp(0),
            return_value: Temp(1),
        };

        assert_eq!(frame.alloc_spill_slot(), -24);
        assert_eq!(frame.alloc_spill_slot(), -32);
        assert_eq!(frame.locals_size, 32);
    }

    #[test]
    fn side_effect_detection_finds_calls() {
        let call = Expr::Call {
            target: "g".into(),
            args: vec![],
        };
        assert!(add(Expr::Const(1), call).has_side_effects());
        assert!(!add(Expr::Const(1), Expr::Temp(Temp(2))).has_side_effects());
    }
}
