//! Operator semantics shared by compiled evaluators.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use crate::ast::{BinaryOp, Pattern, UnaryOp};
use crate::error::EvalError;
use crate::types::{Entity, EntityType, EntityUid, Type, Value};

use super::Environment;

pub(crate) fn unary(op: UnaryOp, arg: &Value) -> Result<Value, EvalError> {
    match op {
        UnaryOp::Not => Ok(Value::Bool(!arg.as_bool()?)),
        UnaryOp::Neg => arg.neg(),
        UnaryOp::IsEmpty => Ok(Value::Bool(arg.as_set()?.is_empty())),
    }
}

pub(crate) fn binary(
    op: BinaryOp,
    lhs: &Value,
    rhs: &Value,
    env: &Environment<'_>,
) -> Result<Value, EvalError> {
    let ordered = |accept: fn(Ordering) -> bool| lhs.compare(rhs).map(|ord| Value::Bool(accept(ord)));
    match op {
        BinaryOp::Eq => Ok(Value::Bool(lhs == rhs)),
        BinaryOp::NotEq => Ok(Value::Bool(lhs != rhs)),
        BinaryOp::Less => ordered(Ordering::is_lt),
        BinaryOp::LessEq => ordered(Ordering::is_le),
        BinaryOp::Greater => ordered(Ordering::is_gt),
        BinaryOp::GreaterEq => ordered(Ordering::is_ge),
        BinaryOp::Add => lhs.add(rhs),
        BinaryOp::Sub => lhs.sub(rhs),
        BinaryOp::Mul => lhs.mul(rhs),
        BinaryOp::In => is_in(lhs, rhs, env).map(Value::Bool),
        BinaryOp::Contains => lhs.contains(rhs).map(Value::Bool),
        BinaryOp::ContainsAll => lhs.contains_all(rhs).map(Value::Bool),
        BinaryOp::ContainsAny => lhs.contains_any(rhs).map(Value::Bool),
        BinaryOp::GetTag => get_tag(lhs, rhs, env),
        BinaryOp::HasTag => has_tag(lhs, rhs, env).map(Value::Bool),
    }
}

/// Hierarchy membership. The right side is one entity or a set of entities.
pub(crate) fn is_in(lhs: &Value, rhs: &Value, env: &Environment<'_>) -> Result<bool, EvalError> {
    let entity = lhs.as_entity()?;
    match rhs {
        Value::EntityUid(target) => Ok(env.hierarchy.is_ancestor(env.entities, entity, target)),
        Value::Set(items) => {
            let targets = items
                .iter()
                .map(|item| item.as_entity().cloned())
                .collect::<Result<Vec<EntityUid>, _>>()?;
            Ok(env.hierarchy.is_in_set(env.entities, entity, &targets))
        }
        other => Err(EvalError::type_error(
            &[Type::Entity, Type::Set],
            other.type_of(),
        )),
    }
}

pub(crate) fn is_entity_type(value: &Value, entity_type: &EntityType) -> Result<bool, EvalError> {
    Ok(value.as_entity()?.entity_type() == entity_type)
}

pub(crate) fn like(value: &Value, pattern: &Pattern) -> Result<bool, EvalError> {
    Ok(pattern.wildcard_match(value.as_str()?))
}

fn lookup_entity<'e>(
    uid: &EntityUid,
    attr: &str,
    env: &Environment<'e>,
) -> Result<&'e Entity, EvalError> {
    if uid.is_unspecified() {
        return Err(EvalError::UnspecifiedEntity {
            attr: attr.to_string(),
        });
    }
    env.entities
        .entity(uid)
        .ok_or_else(|| EvalError::EntityNotExist(uid.clone()))
}

pub(crate) fn get_attr(value: &Value, attr: &str, env: &Environment<'_>) -> Result<Value, EvalError> {
    match value {
        Value::Record(fields) => fields.get(attr).cloned().ok_or_else(|| EvalError::AttributeAccess {
            attr: attr.to_string(),
            on: "record".to_string(),
        }),
        Value::EntityUid(uid) => {
            let entity = lookup_entity(uid, attr, env)?;
            entity
                .attr(attr)
                .cloned()
                .ok_or_else(|| EvalError::AttributeAccess {
                    attr: attr.to_string(),
                    on: uid.to_string(),
                })
        }
        other => Err(EvalError::type_error(
            &[Type::Record, Type::Entity],
            other.type_of(),
        )),
    }
}

/// Like [`get_attr`] but a missing key or entity yields `false`.
pub(crate) fn has_attr(value: &Value, attr: &str, env: &Environment<'_>) -> Result<bool, EvalError> {
    match value {
        Value::Record(fields) => Ok(fields.contains_key(attr)),
        Value::EntityUid(uid) => Ok(env
            .entities
            .entity(uid)
            .is_some_and(|entity| entity.attr(attr).is_some())),
        other => Err(EvalError::type_error(
            &[Type::Record, Type::Entity],
            other.type_of(),
        )),
    }
}

fn get_tag(lhs: &Value, rhs: &Value, env: &Environment<'_>) -> Result<Value, EvalError> {
    let uid = lhs.as_entity()?;
    let tag = rhs.as_str()?;
    let entity = lookup_entity(uid, tag, env)?;
    entity.tag(tag).cloned().ok_or_else(|| EvalError::TagAccess {
        tag: tag.to_string(),
        entity: uid.clone(),
    })
}

fn has_tag(lhs: &Value, rhs: &Value, env: &Environment<'_>) -> Result<bool, EvalError> {
    let uid = lhs.as_entity()?;
    let tag = rhs.as_str()?;
    Ok(env
        .entities
        .entity(uid)
        .is_some_and(|entity| entity.tag(tag).is_some()))
}

/// Builds a record from evaluated fields; a repeated key keeps its last value.
pub(crate) fn record(fields: impl IntoIterator<Item = (String, Value)>) -> Value {
    let fields: BTreeMap<String, Value> = fields.into_iter().collect();
    Value::Record(fields.into())
}
