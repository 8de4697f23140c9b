//! Expression evaluation against one request and one entity store.

mod compiler;
mod ops;

pub use compiler::{Evaluator, compile};

use crate::ast::{Expr, Var};
use crate::error::EvalError;
use crate::hierarchy::HierarchyCache;
use crate::types::{EntityStore, EntityUid, Request, Value};

/// Everything an evaluation can read: the request variables, the entity
/// store and the hierarchy memo shared by every policy evaluated against
/// this store.
pub struct Environment<'e> {
    entities: &'e dyn EntityStore,
    hierarchy: &'e HierarchyCache,
    vars: [Value; 4],
}

impl<'e> Environment<'e> {
    pub fn new(entities: &'e dyn EntityStore, request: &Request, hierarchy: &'e HierarchyCache) -> Self {
        Environment {
            entities,
            hierarchy,
            vars: [
                Value::EntityUid(request.principal.clone()),
                Value::EntityUid(request.action.clone()),
                Value::EntityUid(request.resource.clone()),
                request.context.clone(),
            ],
        }
    }

    /// An environment with no request: principal, action and resource are
    /// the unspecified entity and the context is empty. Used to evaluate
    /// sub-trees whose operands are all literals.
    pub fn detached(entities: &'e dyn EntityStore, hierarchy: &'e HierarchyCache) -> Self {
        let unspecified = Value::EntityUid(EntityUid::unspecified());
        Environment {
            entities,
            hierarchy,
            vars: [
                unspecified.clone(),
                unspecified.clone(),
                unspecified,
                Value::empty_record(),
            ],
        }
    }

    pub fn var(&self, var: Var) -> &Value {
        match var {
            Var::Principal => &self.vars[0],
            Var::Action => &self.vars[1],
            Var::Resource => &self.vars[2],
            Var::Context => &self.vars[3],
        }
    }

    pub fn entities(&self) -> &'e dyn EntityStore {
        self.entities
    }
}

/// Compiles and runs `expr` once. Callers evaluating the same expression
/// repeatedly should keep the [`Evaluator`] from [`compile`] instead.
pub fn evaluate(expr: &Expr, env: &Environment<'_>) -> Result<Value, EvalError> {
    compile(expr)(env)
}
