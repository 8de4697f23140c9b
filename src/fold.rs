//! Constant folding.
//!
//! Folding never consults an entity store: attribute access, `has`, tags,
//! `in`, `is` and `is ... in` stay as they are even over literal operands.
//! A node whose evaluation fails is kept unfolded, so the error still
//! surfaces when the expression is evaluated for real.

use std::sync::Arc;

use crate::ast::Expr;
use crate::eval::{Environment, evaluate};
use crate::hierarchy::HierarchyCache;
use crate::types::{Entities, Value};

/// Folds every sub-tree whose inputs are all literals.
pub fn fold(expr: &Expr) -> Expr {
    let entities = Entities::empty();
    let hierarchy = HierarchyCache::new();
    let env = Environment::detached(&entities, &hierarchy);
    fold_in(expr, &env)
}

fn is_literal(expr: &Expr) -> bool {
    matches!(expr, Expr::Value(_))
}

pub(crate) fn known_bool(expr: &Expr) -> Option<bool> {
    match expr {
        Expr::Value(Value::Bool(b)) => Some(*b),
        _ => None,
    }
}

/// Replaces `node` by its value when evaluation succeeds.
fn eager(node: Expr, env: &Environment<'_>) -> Expr {
    match evaluate(&node, env) {
        Ok(value) => Expr::Value(value),
        Err(_) => node,
    }
}

/// Reuses the original `Arc` when folding left a child untouched.
pub(crate) fn share(original: &Arc<Expr>, folded: Expr) -> Arc<Expr> {
    if **original == folded {
        Arc::clone(original)
    } else {
        Arc::new(folded)
    }
}

fn fold_in(expr: &Expr, env: &Environment<'_>) -> Expr {
    match expr {
        Expr::Value(_) | Expr::Var(_) | Expr::Error(_) => expr.clone(),
        Expr::Unary { op, arg } => {
            let folded = fold_in(arg, env);
            let literal = is_literal(&folded);
            let node = Expr::Unary {
                op: *op,
                arg: share(arg, folded),
            };
            if literal { eager(node, env) } else { node }
        }
        Expr::Binary { op, lhs, rhs } => {
            let (l, r) = (fold_in(lhs, env), fold_in(rhs, env));
            let literal = !op.reads_entities() && is_literal(&l) && is_literal(&r);
            let node = Expr::Binary {
                op: *op,
                lhs: share(lhs, l),
                rhs: share(rhs, r),
            };
            if literal { eager(node, env) } else { node }
        }
        Expr::And { lhs, rhs } => {
            let (l, r) = (fold_in(lhs, env), fold_in(rhs, env));
            match known_bool(&l) {
                Some(false) => l,
                Some(true) if is_literal(&r) => eager(Expr::and(l, r), env),
                _ => Expr::And {
                    lhs: share(lhs, l),
                    rhs: share(rhs, r),
                },
            }
        }
        Expr::Or { lhs, rhs } => {
            let (l, r) = (fold_in(lhs, env), fold_in(rhs, env));
            match known_bool(&l) {
                Some(true) => l,
                Some(false) if is_literal(&r) => eager(Expr::or(l, r), env),
                _ => Expr::Or {
                    lhs: share(lhs, l),
                    rhs: share(rhs, r),
                },
            }
        }
        Expr::If {
            cond,
            then_expr,
            else_expr,
        } => {
            let c = fold_in(cond, env);
            match known_bool(&c) {
                Some(true) => fold_in(then_expr, env),
                Some(false) => fold_in(else_expr, env),
                _ => Expr::If {
                    cond: share(cond, c),
                    then_expr: share(then_expr, fold_in(then_expr, env)),
                    else_expr: share(else_expr, fold_in(else_expr, env)),
                },
            }
        }
        Expr::GetAttr { expr: inner, attr } => Expr::GetAttr {
            expr: share(inner, fold_in(inner, env)),
            attr: attr.clone(),
        },
        Expr::HasAttr { expr: inner, attr } => Expr::HasAttr {
            expr: share(inner, fold_in(inner, env)),
            attr: attr.clone(),
        },
        Expr::Is {
            expr: inner,
            entity_type,
        } => Expr::Is {
            expr: share(inner, fold_in(inner, env)),
            entity_type: entity_type.clone(),
        },
        Expr::IsIn {
            expr: inner,
            entity_type,
            target,
        } => Expr::IsIn {
            expr: share(inner, fold_in(inner, env)),
            entity_type: entity_type.clone(),
            target: share(target, fold_in(target, env)),
        },
        Expr::Like {
            expr: inner,
            pattern,
        } => {
            let folded = fold_in(inner, env);
            let literal = is_literal(&folded);
            let node = Expr::Like {
                expr: share(inner, folded),
                pattern: pattern.clone(),
            };
            if literal { eager(node, env) } else { node }
        }
        Expr::Set(items) => {
            let items: Vec<Expr> = items.iter().map(|item| fold_in(item, env)).collect();
            let literal = items.iter().all(is_literal);
            let node = Expr::Set(Arc::new(items));
            if literal { eager(node, env) } else { node }
        }
        Expr::Record(fields) => {
            let fields: Vec<(String, Expr)> = fields
                .iter()
                .map(|(key, value)| (key.clone(), fold_in(value, env)))
                .collect();
            let literal = fields.iter().all(|(_, value)| is_literal(value));
            let node = Expr::Record(Arc::new(fields));
            if literal { eager(node, env) } else { node }
        }
        Expr::Call { func, args } => {
            let args: Vec<Expr> = args.iter().map(|arg| fold_in(arg, env)).collect();
            let literal = args.iter().all(is_literal);
            let node = Expr::Call {
                func: *func,
                args: Arc::new(args),
            };
            if literal { eager(node, env) } else { node }
        }
    }
}
