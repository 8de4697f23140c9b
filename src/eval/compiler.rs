//! Lowers expression trees to trees of evaluator closures.
//!
//! Each node becomes exactly one closure that owns its compiled children, so
//! a policy is walked once at compile time and never re-matched per request.

use crate::ast::Expr;
use crate::error::EvalError;
use crate::types::Value;

use super::{Environment, ops};

/// A compiled expression.
pub type Evaluator = Box<dyn Fn(&Environment<'_>) -> Result<Value, EvalError> + Send + Sync>;

fn boxed<F>(f: F) -> Evaluator
where
    F: Fn(&Environment<'_>) -> Result<Value, EvalError> + Send + Sync + 'static,
{
    Box::new(f)
}

fn compile_all(exprs: &[Expr]) -> Vec<Evaluator> {
    exprs.iter().map(compile).collect()
}

pub fn compile(expr: &Expr) -> Evaluator {
    match expr {
        Expr::Value(v) => {
            let v = v.clone();
            boxed(move |_| Ok(v.clone()))
        }
        Expr::Var(var) => {
            let var = *var;
            boxed(move |env| Ok(env.var(var).clone()))
        }
        Expr::Error(err) => {
            let err = err.clone();
            boxed(move |_| Err(err.clone()))
        }
        Expr::Unary { op, arg } => {
            let op = *op;
            let arg = compile(arg);
            boxed(move |env| ops::unary(op, &arg(env)?))
        }
        Expr::Binary { op, lhs, rhs } => {
            let op = *op;
            let (lhs, rhs) = (compile(lhs), compile(rhs));
            boxed(move |env| {
                let l = lhs(env)?;
                let r = rhs(env)?;
                ops::binary(op, &l, &r, env)
            })
        }
        Expr::And { lhs, rhs } => {
            let (lhs, rhs) = (compile(lhs), compile(rhs));
            boxed(move |env| {
                let l = lhs(env)?;
                if !l.as_bool()? {
                    return Ok(l);
                }
                let r = rhs(env)?;
                r.as_bool()?;
                Ok(r)
            })
        }
        Expr::Or { lhs, rhs } => {
            let (lhs, rhs) = (compile(lhs), compile(rhs));
            boxed(move |env| {
                let l = lhs(env)?;
                if l.as_bool()? {
                    return Ok(l);
                }
                let r = rhs(env)?;
                r.as_bool()?;
                Ok(r)
            })
        }
        Expr::If {
            cond,
            then_expr,
            else_expr,
        } => {
            let cond = compile(cond);
            let (then_expr, else_expr) = (compile(then_expr), compile(else_expr));
            boxed(move |env| {
                if cond(env)?.as_bool()? {
                    then_expr(env)
                } else {
                    else_expr(env)
                }
            })
        }
        Expr::GetAttr { expr, attr } => {
            let (inner, attr) = (compile(expr), attr.clone());
            boxed(move |env| ops::get_attr(&inner(env)?, &attr, env))
        }
        Expr::HasAttr { expr, attr } => {
            let (inner, attr) = (compile(expr), attr.clone());
            boxed(move |env| ops::has_attr(&inner(env)?, &attr, env).map(Value::Bool))
        }
        Expr::Like { expr, pattern } => {
            let (inner, pattern) = (compile(expr), pattern.clone());
            boxed(move |env| ops::like(&inner(env)?, &pattern).map(Value::Bool))
        }
        Expr::Is { expr, entity_type } => {
            let (inner, entity_type) = (compile(expr), entity_type.clone());
            boxed(move |env| ops::is_entity_type(&inner(env)?, &entity_type).map(Value::Bool))
        }
        Expr::IsIn {
            expr,
            entity_type,
            target,
        } => {
            let (inner, entity_type) = (compile(expr), entity_type.clone());
            let target = compile(target);
            boxed(move |env| {
                let subject = inner(env)?;
                if !ops::is_entity_type(&subject, &entity_type)? {
                    return Ok(Value::Bool(false));
                }
                ops::is_in(&subject, &target(env)?, env).map(Value::Bool)
            })
        }
        Expr::Set(items) => {
            let items = compile_all(items);
            boxed(move |env| {
                let values = items
                    .iter()
                    .map(|item| item(env))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::set(values))
            })
        }
        Expr::Record(fields) => {
            let fields: Vec<(String, Evaluator)> = fields
                .iter()
                .map(|(key, value)| (key.clone(), compile(value)))
                .collect();
            boxed(move |env| {
                let values = fields
                    .iter()
                    .map(|(key, value)| Ok((key.clone(), value(env)?)))
                    .collect::<Result<Vec<_>, EvalError>>()?;
                Ok(ops::record(values))
            })
        }
        Expr::Call { func, args } => {
            let func = *func;
            let args = compile_all(args);
            boxed(move |env| {
                func.check_arity(args.len())?;
                let values = args
                    .iter()
                    .map(|arg| arg(env))
                    .collect::<Result<Vec<_>, _>>()?;
                func.apply(&values)
            })
        }
    }
}
