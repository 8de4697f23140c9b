//! A single, fully concrete authorization request.

use std::fmt::{Display, Formatter, Result as FmtResult};

use crate::error::PolicyError;

use super::{EntityUid, Value};

/// Principal, action and resource are entity references; the context is a
/// record (empty when not supplied).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Request {
    pub principal: EntityUid,
    pub action: EntityUid,
    pub resource: EntityUid,
    pub context: Value,
}

impl Request {
    pub fn new(principal: EntityUid, action: EntityUid, resource: EntityUid) -> Self {
        Request {
            principal,
            action,
            resource,
            context: Value::empty_record(),
        }
    }

    /// Replaces the context, which must be a record.
    pub fn with_context(mut self, context: Value) -> Result<Self, PolicyError> {
        if !matches!(context, Value::Record(_)) {
            return Err(PolicyError::RequestTypeError(format!(
                "context must be a record, got {}",
                context.type_of()
            )));
        }
        self.context = context;
        Ok(self)
    }

    /// Builds a request from untyped values, rejecting anything that is not an
    /// entity reference in the principal/action/resource slots.
    pub fn from_values(
        principal: &Value,
        action: &Value,
        resource: &Value,
        context: Value,
    ) -> Result<Self, PolicyError> {
        let entity = |slot: &str, v: &Value| match v {
            Value::EntityUid(uid) => Ok(uid.clone()),
            other => Err(PolicyError::RequestTypeError(format!(
                "{slot} must be an entity, got {}",
                other.type_of()
            ))),
        };
        Request::new(
            entity("principal", principal)?,
            entity("action", action)?,
            entity("resource", resource)?,
        )
        .with_context(context)
    }
}

impl Display for Request {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(
            f,
            "principal={}, action={}, resource={}, context={}",
            self.principal, self.action, self.resource, self.context
        )
    }
}
