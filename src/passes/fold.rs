//! Constant Folding
//!
//! Bottom-up evaluation of expression trees: sub-expressions whose operands
//! are all constant are replaced by one constant, using wrapping signed
//! 64-bit integer and 0/1 boolean semantics. The symbolic variant also
//! applies algebraic identities that need only one constant operand.
//! Conditional jumps on a constant condition degrade to unconditional
//! jumps.
//!
//! Folding works on the linear statement list directly; it needs no flow
//! information.

use crate::ir::{BinOp, Expr, Stmt, UnOp};

/// Folds fully-constant sub-expressions in every statement. Returns `true`
/// if anything changed.
pub fn fold_constants(body: &mut [Stmt]) -> bool {
    fold_body(body, false)
}

/// Constant folding plus algebraic identities (`x*0`, `x*1`, `x+0`, boolean
/// absorption) that hold with only one constant operand. Returns `true` if
/// anything changed.
pub fn fold_symbolic(body: &mut [Stmt]) -> bool {
    fold_body(body, true)
}

fn fold_body(body: &mut [Stmt], symbolic: bool) -> bool {
    let mut changed = false;

    for stmt in body {
        stmt.for_each_read_expr(&mut |e| changed |= fold_expr(e, symbolic));

        // A constant condition decides the branch now.
        if let Stmt::CJump { cond, pos, neg } = stmt
            && let Expr::Const(v) = cond
        {
            let target = if *v != 0 { pos.clone() } else { neg.clone() };
            *stmt = Stmt::Jump(target);
            changed = true;
        }
    }

    changed
}

fn fold_expr(e: &mut Expr, symbolic: bool) -> bool {
    match e {
        Expr::Const(_) | Expr::Temp(_) | Expr::Name(_) => false,
        Expr::Mem(addr) => fold_expr(addr, symbolic),
        Expr::Unary { op, expr } => {
            let mut changed = fold_expr(expr, symbolic);
            if let Expr::Const(v) = **expr {
                *e = Expr::Const(eval_unary(*op, v));
                changed = true;
            }
            changed
        }
        Expr::Binary { op, lhs, rhs } => {
            let mut changed = fold_expr(lhs, symbolic);
            changed |= fold_expr(rhs, symbolic);

            if let (Expr::Const(a), Expr::Const(b)) = (&**lhs, &**rhs) {
                if let Some(v) = eval_binary(*op, *a, *b) {
                    *e = Expr::Const(v);
                    return true;
                }
                return changed;
            }

            if symbolic && let Some(simplified) = apply_identity(*op, lhs, rhs) {
                *e = simplified;
                return true;
            }
            changed
        }
        Expr::Call { args, .. } => {
            let mut changed = false;
            for arg in args {
                changed |= fold_expr(arg, symbolic);
            }
            changed
        }
        // Statement-expressions are left for linearization to report.
        Expr::Seq { .. } => false,
    }
}

/// Evaluates a binary operation over two constants. Division and modulo by
/// zero and out-of-range shifts do not fold.
fn eval_binary(op: BinOp, a: i64, b: i64) -> Option<i64> {
    let v = match op {
        BinOp::Add => a.wrapping_add(b),
        BinOp::Subtract => a.wrapping_sub(b),
        BinOp::Multiply => a.wrapping_mul(b),
        BinOp::Divide => {
            if b == 0 {
                return None;
            }
            a.wrapping_div(b)
        }
        BinOp::Modulo => {
            if b == 0 {
                return None;
            }
            a.wrapping_rem(b)
        }
        BinOp::BitAnd => a & b,
        BinOp::BitOr => a | b,
        BinOp::BitXor => a ^ b,
        BinOp::ShiftLeft | BinOp::ShiftRight => {
            let Ok(shift) = u32::try_from(b) else {
                return None;
            };
            if shift >= 64 {
                return None;
            }
            if op == BinOp::ShiftLeft { a << shift } else { a >> shift }
        }
        BinOp::LogAnd => i64::from(a != 0 && b != 0),
        BinOp::LogOr => i64::from(a != 0 || b != 0),
        BinOp::Eq => i64::from(a == b),
        BinOp::NotEq => i64::from(a != b),
        BinOp::OrdLess => i64::from(a < b),
        BinOp::OrdLessEq => i64::from(a <= b),
        BinOp::OrdGreater => i64::from(a > b),
        BinOp::OrdGreaterEq => i64::from(a >= b),
    };
    Some(v)
}

fn eval_unary(op: UnOp, v: i64) -> i64 {
    match op {
        UnOp::Negate => v.wrapping_neg(),
        UnOp::Complement => !v,
        UnOp::Not => i64::from(v == 0),
    }
}

/// Algebraic identities needing one constant operand. Identities that erase
/// the other operand apply only when it is side-effect free.
fn apply_identity(op: BinOp, lhs: &Expr, rhs: &Expr) -> Option<Expr> {
    let erasable = |e: &Expr| !e.has_side_effects();

    match op {
        BinOp::Add => match (lhs, rhs) {
            (Expr::Const(0), other) | (other, Expr::Const(0)) => Some(other.clone()),
            _ => None,
        },
        BinOp::Subtract => match rhs {
            Expr::Const(0) => Some(lhs.clone()),
            _ => None,
        },
        BinOp::Multiply => match (lhs, rhs) {
            (Expr::Const(0), other) | (other, Expr::Const(0)) if erasable(other) => {
                Some(Expr::Const(0))
            }
            (Expr::Const(1), other) | (other, Expr::Const(1)) => Some(other.clone()),
            _ => None,
        },
        BinOp::Divide => match rhs {
            Expr::Const(1) => Some(lhs.clone()),
            _ => None,
        },
        BinOp::LogAnd => match (lhs, rhs) {
            (Expr::Const(0), other) | (other, Expr::Const(0)) if erasable(other) => {
                Some(Expr::Const(0))
            }
            _ => None,
        },
        BinOp::LogOr => match (lhs, rhs) {
            (Expr::Const(c), other) | (other, Expr::Const(c)) if *c != 0 && erasable(other) => {
                Some(Expr::Const(1))
            }
            _ => None,
        },
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::Temp;

    fn bin(op: BinOp, lhs: Expr, rhs: Expr) -> Expr {
        Expr::Binary {
            op,
            lhs: Box::new(lhs),
            rhs: Box::new(rhs),
        }
    }

    fn mv(dst: u32, src: Expr) -> Stmt {
        Stmt::Move {
            dst: Expr::Temp(Temp(dst)),
            src,
        }
    }

    #[test]
    fn nested_constant_tree_folds_to_one_constant() {
        // t1 <- (2 + 3) * (10 - 4)
        let src = bin(
            BinOp::Multiply,
            bin(BinOp::Add, Expr::Const(2), Expr::Const(3)),
            bin(BinOp::Subtract, Expr::Const(10), Expr::Const(4)),
        );
        let mut body = vec![mv(1, src)];

        assert!(fold_constants(&mut body));
        assert_eq!(body[0], mv(1, Expr::Const(30)));
    }

    #[test]
    fn folding_is_idempotent() {
        let mut body = vec![mv(1, bin(BinOp::Add, Expr::Const(2), Expr::Const(3)))];

        assert!(fold_constants(&mut body));
        let once = body.clone();
        assert!(!fold_constants(&mut body));
        assert_eq!(body, once);
    }

    #[test]
    fn division_by_zero_does_not_fold() {
        let mut body = vec![mv(1, bin(BinOp::Divide, Expr::Const(4), Expr::Const(0)))];

        assert!(!fold_constants(&mut body));
        assert_eq!(body[0], mv(1, bin(BinOp::Divide, Expr::Const(4), Expr::Const(0))));
    }

    #[test]
    fn constant_condition_becomes_unconditional_jump() {
        let mut body = vec![
            Stmt::CJump {
                cond: bin(BinOp::OrdLess, Expr::Const(1), Expr::Const(2)),
                pos: "then".into(),
                neg: "else".into(),
            },
            Stmt::Label("then".into()),
            Stmt::Label("else".into()),
        ];

        assert!(fold_constants(&mut body));
        assert_eq!(body[0], Stmt::Jump("then".into()));
    }

    #[test]
    fn symbolic_identities_need_one_constant() {
        let t = Expr::Temp(Temp(2));
        let mut body = vec![
            mv(1, bin(BinOp::Multiply, t.clone(), Expr::Const(1))),
            mv(3, bin(BinOp::Add, Expr::Const(0), t.clone())),
            mv(4, bin(BinOp::Multiply, t.clone(), Expr::Const(0))),
        ];

        assert!(!fold_constants(&mut body.clone()));
        assert!(fold_symbolic(&mut body));
        assert_eq!(body[0], mv(1, t.clone()));
        assert_eq!(body[1], mv(3, t));
        assert_eq!(body[2], mv(4, Expr::Const(0)));
    }

    #[test]
    fn erasing_identities_keep_side_effects() {
        let call = Expr::Call {
            target: "g".into(),
            args: vec![],
        };
        let src = bin(BinOp::Multiply, call.clone(), Expr::Const(0));
        let mut body = vec![mv(1, src.clone())];

        assert!(!fold_symbolic(&mut body));
        assert_eq!(body[0], mv(1, src));
    }
}
