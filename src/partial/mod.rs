//! Partial evaluation against a request whose dimensions may be unknown.
//!
//! Known request terms are substituted and folded. Parts that depend on a
//! variable or an ignored term stay as the original expression nodes, so the
//! residual expression still reads the request when it is finally evaluated.
//! Errors found on the way become [`Expr::Error`] nodes instead of dropping
//! the policy, and are raised only if evaluation actually reaches them.

mod term;

pub use term::Term;

use std::sync::Arc;

use crate::ast::{Expr, Var};
use crate::error::EvalError;
use crate::eval::{Environment, evaluate};
use crate::fold::{known_bool, share};
use crate::hierarchy::HierarchyCache;
use crate::types::{Condition, ConditionKind, EntityStore, Policy, ScopeConstraint, Type, Value};

/// The four request dimensions as terms, plus the entity store used to
/// resolve entity-dependent nodes whose operands are known.
pub struct PartialEnvironment<'e> {
    env: Environment<'e>,
    terms: [&'e Term; 4],
}

impl<'e> PartialEnvironment<'e> {
    pub fn new(
        entities: &'e dyn EntityStore,
        hierarchy: &'e HierarchyCache,
        principal: &'e Term,
        action: &'e Term,
        resource: &'e Term,
        context: &'e Term,
    ) -> Self {
        PartialEnvironment {
            env: Environment::detached(entities, hierarchy),
            terms: [principal, action, resource, context],
        }
    }

    fn term(&self, var: Var) -> &'e Term {
        match var {
            Var::Principal => self.terms[0],
            Var::Action => self.terms[1],
            Var::Resource => self.terms[2],
            Var::Context => self.terms[3],
        }
    }
}

/// Result of partially evaluating a sub-tree.
enum Partial<'t> {
    Expr(Expr),
    /// A variable or attribute chain over a term that is not fully known.
    /// `node` is the original expression, kept as the residual.
    Term { term: &'t Term, node: Expr },
}

impl Partial<'_> {
    fn into_expr(self) -> Expr {
        match self {
            Partial::Expr(expr) | Partial::Term { node: expr, .. } => expr,
        }
    }
}

/// A literal when `term` is fully known, otherwise `node` kept as is.
fn from_term<'t>(term: &'t Term, node: &Expr) -> Partial<'t> {
    match term.to_value() {
        Some(value) => Partial::Expr(Expr::Value(value)),
        None => Partial::Term {
            term,
            node: node.clone(),
        },
    }
}

/// What a strict node can do with its already-reduced operands.
enum Operands {
    /// Every operand is a literal: evaluate the node.
    Known,
    /// Evaluation would reach this error before anything unknown.
    Raise(EvalError),
    Residual,
}

fn operands<'a>(children: impl IntoIterator<Item = &'a Expr>) -> Operands {
    for child in children {
        match child {
            Expr::Value(_) => {}
            Expr::Error(err) => return Operands::Raise(err.clone()),
            _ => return Operands::Residual,
        }
    }
    Operands::Known
}

fn bool_operand(expr: &Expr) -> Result<Option<bool>, EvalError> {
    match expr {
        Expr::Value(Value::Bool(b)) => Ok(Some(*b)),
        Expr::Value(other) => Err(EvalError::type_error(&[Type::Bool], other.type_of())),
        Expr::Error(err) => Err(err.clone()),
        _ => Ok(None),
    }
}

/// Partially evaluates `expr` against the known parts of the request.
pub fn partial(expr: &Expr, env: &PartialEnvironment<'_>) -> Expr {
    reduce(expr, env).into_expr()
}

fn reduce<'t>(expr: &Expr, penv: &PartialEnvironment<'t>) -> Partial<'t> {
    let settle = |node: Expr, children: Operands| match children {
        Operands::Known => Partial::Expr(match evaluate(&node, &penv.env) {
            Ok(value) => Expr::Value(value),
            Err(err) => Expr::Error(err),
        }),
        Operands::Raise(err) => Partial::Expr(Expr::Error(err)),
        Operands::Residual => Partial::Expr(node),
    };

    match expr {
        Expr::Value(_) | Expr::Error(_) => Partial::Expr(expr.clone()),
        Expr::Var(var) => from_term(penv.term(*var), expr),
        Expr::GetAttr { expr: inner, attr } => match reduce(inner, penv) {
            Partial::Term { term, .. } => project(term, attr, expr),
            Partial::Expr(reduced) => {
                let ops = operands([&reduced]);
                settle(
                    Expr::GetAttr {
                        expr: share(inner, reduced),
                        attr: attr.clone(),
                    },
                    ops,
                )
            }
        },
        Expr::HasAttr { expr: inner, attr } => match reduce(inner, penv) {
            Partial::Term { term, .. } => match term {
                Term::Record(fields) => Partial::Expr(Expr::val(fields.contains_key(attr))),
                Term::Ignore => Partial::Expr(Expr::val(true)),
                Term::Set(_) => Partial::Expr(Expr::Error(EvalError::type_error(
                    &[Type::Record, Type::Entity],
                    Type::Set,
                ))),
                Term::Variable(_) | Term::Value(_) => Partial::Expr(expr.clone()),
            },
            Partial::Expr(reduced) => {
                let ops = operands([&reduced]);
                settle(
                    Expr::HasAttr {
                        expr: share(inner, reduced),
                        attr: attr.clone(),
                    },
                    ops,
                )
            }
        },
        Expr::And { lhs, rhs } => {
            let l = reduce(lhs, penv).into_expr();
            match bool_operand(&l) {
                Err(err) => Partial::Expr(Expr::Error(err)),
                Ok(Some(false)) => Partial::Expr(l),
                Ok(Some(true)) => {
                    let r = reduce(rhs, penv).into_expr();
                    Partial::Expr(match bool_operand(&r) {
                        Err(err) => Expr::Error(err),
                        Ok(Some(_)) => r,
                        Ok(None) => Expr::And {
                            lhs: share(lhs, l),
                            rhs: share(rhs, r),
                        },
                    })
                }
                // The unknown left side may still raise, so a literal on the
                // right does not decide the node.
                Ok(None) => Partial::Expr(Expr::And {
                    lhs: share(lhs, l),
                    rhs: share(rhs, reduce(rhs, penv).into_expr()),
                }),
            }
        }
        Expr::Or { lhs, rhs } => {
            let l = reduce(lhs, penv).into_expr();
            match bool_operand(&l) {
                Err(err) => Partial::Expr(Expr::Error(err)),
                Ok(Some(true)) => Partial::Expr(l),
                Ok(Some(false)) => {
                    let r = reduce(rhs, penv).into_expr();
                    Partial::Expr(match bool_operand(&r) {
                        Err(err) => Expr::Error(err),
                        Ok(Some(_)) => r,
                        Ok(None) => Expr::Or {
                            lhs: share(lhs, l),
                            rhs: share(rhs, r),
                        },
                    })
                }
                // The unknown left side may still raise, so a literal on the
                // right does not decide the node.
                Ok(None) => Partial::Expr(Expr::Or {
                    lhs: share(lhs, l),
                    rhs: share(rhs, reduce(rhs, penv).into_expr()),
                }),
            }
        }
        Expr::If {
            cond,
            then_expr,
            else_expr,
        } => {
            let c = reduce(cond, penv).into_expr();
            match bool_operand(&c) {
                Err(err) => Partial::Expr(Expr::Error(err)),
                Ok(Some(true)) => reduce(then_expr, penv),
                Ok(Some(false)) => reduce(else_expr, penv),
                Ok(None) => Partial::Expr(Expr::If {
                    cond: share(cond, c),
                    then_expr: share(then_expr, partial(then_expr, penv)),
                    else_expr: share(else_expr, partial(else_expr, penv)),
                }),
            }
        }
        Expr::Unary { op, arg } => {
            let a = partial(arg, penv);
            let ops = operands([&a]);
            settle(
                Expr::Unary {
                    op: *op,
                    arg: share(arg, a),
                },
                ops,
            )
        }
        Expr::Binary { op, lhs, rhs } => {
            let (l, r) = (partial(lhs, penv), partial(rhs, penv));
            let ops = operands([&l, &r]);
            settle(
                Expr::Binary {
                    op: *op,
                    lhs: share(lhs, l),
                    rhs: share(rhs, r),
                },
                ops,
            )
        }
        Expr::Like {
            expr: inner,
            pattern,
        } => {
            let reduced = partial(inner, penv);
            let ops = operands([&reduced]);
            settle(
                Expr::Like {
                    expr: share(inner, reduced),
                    pattern: pattern.clone(),
                },
                ops,
            )
        }
        Expr::Is {
            expr: inner,
            entity_type,
        } => {
            let reduced = partial(inner, penv);
            let ops = operands([&reduced]);
            settle(
                Expr::Is {
                    expr: share(inner, reduced),
                    entity_type: entity_type.clone(),
                },
                ops,
            )
        }
        Expr::IsIn {
            expr: inner,
            entity_type,
            target,
        } => {
            let reduced = partial(inner, penv);
            let mismatched = matches!(
                &reduced,
                Expr::Value(Value::EntityUid(uid)) if uid.entity_type() != entity_type
            );
            // The target is never read when the subject has another type.
            if mismatched {
                return Partial::Expr(Expr::val(false));
            }
            let t = partial(target, penv);
            let ops = operands([&reduced, &t]);
            settle(
                Expr::IsIn {
                    expr: share(inner, reduced),
                    entity_type: entity_type.clone(),
                    target: share(target, t),
                },
                ops,
            )
        }
        Expr::Set(items) => {
            let items: Vec<Expr> = items.iter().map(|item| partial(item, penv)).collect();
            let ops = operands(&items);
            settle(Expr::Set(Arc::new(items)), ops)
        }
        Expr::Record(fields) => {
            let fields: Vec<(String, Expr)> = fields
                .iter()
                .map(|(key, value)| (key.clone(), partial(value, penv)))
                .collect();
            let ops = operands(fields.iter().map(|(_, value)| value));
            settle(Expr::Record(Arc::new(fields)), ops)
        }
        Expr::Call { func, args } => {
            let args: Vec<Expr> = args.iter().map(|arg| partial(arg, penv)).collect();
            let ops = operands(&args);
            settle(
                Expr::Call {
                    func: *func,
                    args: Arc::new(args),
                },
                ops,
            )
        }
    }
}

/// Attribute access on a term that is not fully known.
fn project<'t>(term: &'t Term, attr: &str, node: &Expr) -> Partial<'t> {
    match term {
        Term::Record(fields) => match fields.get(attr) {
            Some(field) => from_term(field, node),
            None => Partial::Expr(Expr::Error(EvalError::AttributeAccess {
                attr: attr.to_string(),
                on: "record".to_string(),
            })),
        },
        Term::Set(_) => Partial::Expr(Expr::Error(EvalError::type_error(
            &[Type::Record, Type::Entity],
            Type::Set,
        ))),
        Term::Variable(_) | Term::Ignore | Term::Value(_) => Partial::Term {
            term,
            node: node.clone(),
        },
    }
}

/// Partially evaluates a policy's scope and conditions.
///
/// Returns `None` when the policy can never match this request: a scope or
/// `when` condition reduced to `false`, or an `unless` condition reduced to
/// `true`. Scopes reduced to `true` become [`ScopeConstraint::Any`] and
/// satisfied conditions are removed; everything else is kept, with its
/// condition bodies reduced.
pub fn partial_policy(policy: &Policy, env: &PartialEnvironment<'_>) -> Option<Policy> {
    let scope = |constraint: &ScopeConstraint, var: Var| -> Option<ScopeConstraint> {
        match known_bool(&partial(&constraint.to_expr(var), env)) {
            Some(false) => None,
            Some(true) => Some(ScopeConstraint::Any),
            None => Some(constraint.clone()),
        }
    };

    let principal = scope(&policy.principal, Var::Principal)?;
    let action = scope(&policy.action, Var::Action)?;
    let resource = scope(&policy.resource, Var::Resource)?;

    let mut conditions = Vec::with_capacity(policy.conditions.len());
    for condition in &policy.conditions {
        let body = partial(&condition.body, env);
        if never_holds(condition.kind, &body) {
            return None;
        }
        match (condition.kind, known_bool(&body)) {
            (ConditionKind::When, Some(false)) | (ConditionKind::Unless, Some(true)) => return None,
            (ConditionKind::When, Some(true)) | (ConditionKind::Unless, Some(false)) => {}
            (kind, None) => conditions.push(Condition { kind, body }),
        }
    }

    Some(Policy {
        effect: policy.effect,
        principal,
        action,
        resource,
        conditions,
    })
}

/// `when { x && false }` and `unless { x || true }` rule the policy out
/// whatever `x` does: it either short-circuits into the literal or raises,
/// and both end in no match.
fn never_holds(kind: ConditionKind, body: &Expr) -> bool {
    match (kind, body) {
        (ConditionKind::When, Expr::And { rhs, .. }) => known_bool(rhs) == Some(false),
        (ConditionKind::Unless, Expr::Or { rhs, .. }) => known_bool(rhs) == Some(true),
        _ => false,
    }
}
