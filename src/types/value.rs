//! Runtime values produced by evaluating expressions.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::sync::Arc;

use itertools::Itertools;
use serde::{Deserialize, Serialize};
use strum_macros::Display as StrumDisplay;

use crate::error::EvalError;

use super::{Datetime, Decimal, Duration, EntityUid, IpAddr};

/// The type tag of a [`Value`], used in error reporting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, StrumDisplay)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Type {
    Bool,
    Long,
    String,
    Set,
    Record,
    Entity,
    Ipaddr,
    Decimal,
    Datetime,
    Duration,
}

/// An immutable runtime value.
///
/// Sets and records share their contents behind an [`Arc`], so cloning a
/// value never copies its elements. Set equality ignores order and
/// duplicates.
#[derive(Debug, Clone)]
pub enum Value {
    Bool(bool),
    Long(i64),
    String(Arc<str>),
    Set(Arc<Vec<Value>>),
    Record(Arc<BTreeMap<String, Value>>),
    EntityUid(EntityUid),
    IpAddr(IpAddr),
    Decimal(Decimal),
    Datetime(Datetime),
    Duration(Duration),
}

impl Value {
    pub fn set(values: impl IntoIterator<Item = Value>) -> Self {
        Value::Set(Arc::new(values.into_iter().collect()))
    }

    pub fn record<K: Into<String>>(fields: impl IntoIterator<Item = (K, Value)>) -> Self {
        Value::Record(Arc::new(
            fields.into_iter().map(|(k, v)| (k.into(), v)).collect(),
        ))
    }

    pub fn empty_record() -> Self {
        Value::Record(Arc::new(BTreeMap::new()))
    }

    pub fn type_of(&self) -> Type {
        match self {
            Value::Bool(_) => Type::Bool,
            Value::Long(_) => Type::Long,
            Value::String(_) => Type::String,
            Value::Set(_) => Type::Set,
            Value::Record(_) => Type::Record,
            Value::EntityUid(_) => Type::Entity,
            Value::IpAddr(_) => Type::Ipaddr,
            Value::Decimal(_) => Type::Decimal,
            Value::Datetime(_) => Type::Datetime,
            Value::Duration(_) => Type::Duration,
        }
    }

    fn mismatch(&self, expected: Type) -> EvalError {
        EvalError::type_error(&[expected], self.type_of())
    }

    pub fn as_bool(&self) -> Result<bool, EvalError> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.mismatch(Type::Bool)),
        }
    }

    pub fn as_long(&self) -> Result<i64, EvalError> {
        match self {
            Value::Long(n) => Ok(*n),
            other => Err(other.mismatch(Type::Long)),
        }
    }

    pub fn as_str(&self) -> Result<&str, EvalError> {
        match self {
            Value::String(s) => Ok(s),
            other => Err(other.mismatch(Type::String)),
        }
    }

    pub fn as_set(&self) -> Result<&[Value], EvalError> {
        match self {
            Value::Set(items) => Ok(items),
            other => Err(other.mismatch(Type::Set)),
        }
    }

    pub fn as_record(&self) -> Result<&BTreeMap<String, Value>, EvalError> {
        match self {
            Value::Record(fields) => Ok(fields),
            other => Err(other.mismatch(Type::Record)),
        }
    }

    pub fn as_entity(&self) -> Result<&EntityUid, EvalError> {
        match self {
            Value::EntityUid(uid) => Ok(uid),
            other => Err(other.mismatch(Type::Entity)),
        }
    }

    pub fn as_ipaddr(&self) -> Result<&IpAddr, EvalError> {
        match self {
            Value::IpAddr(ip) => Ok(ip),
            other => Err(other.mismatch(Type::Ipaddr)),
        }
    }

    pub fn as_decimal(&self) -> Result<Decimal, EvalError> {
        match self {
            Value::Decimal(d) => Ok(*d),
            other => Err(other.mismatch(Type::Decimal)),
        }
    }

    pub fn as_datetime(&self) -> Result<Datetime, EvalError> {
        match self {
            Value::Datetime(d) => Ok(*d),
            other => Err(other.mismatch(Type::Datetime)),
        }
    }

    pub fn as_duration(&self) -> Result<Duration, EvalError> {
        match self {
            Value::Duration(d) => Ok(*d),
            other => Err(other.mismatch(Type::Duration)),
        }
    }

    /// Checked `+` over longs.
    pub fn add(&self, rhs: &Value) -> Result<Value, EvalError> {
        let (a, b) = (self.as_long()?, rhs.as_long()?);
        a.checked_add(b)
            .map(Value::Long)
            .ok_or_else(|| EvalError::overflow("+", &[a, b]))
    }

    /// Checked `-` over longs.
    pub fn sub(&self, rhs: &Value) -> Result<Value, EvalError> {
        let (a, b) = (self.as_long()?, rhs.as_long()?);
        a.checked_sub(b)
            .map(Value::Long)
            .ok_or_else(|| EvalError::overflow("-", &[a, b]))
    }

    /// Checked `*` over longs.
    pub fn mul(&self, rhs: &Value) -> Result<Value, EvalError> {
        let (a, b) = (self.as_long()?, rhs.as_long()?);
        a.checked_mul(b)
            .map(Value::Long)
            .ok_or_else(|| EvalError::overflow("*", &[a, b]))
    }

    /// Checked unary `-` over longs.
    pub fn neg(&self) -> Result<Value, EvalError> {
        let a = self.as_long()?;
        a.checked_neg()
            .map(Value::Long)
            .ok_or_else(|| EvalError::overflow("neg", &[a]))
    }

    /// Orders two values of the same orderable type.
    pub fn compare(&self, rhs: &Value) -> Result<Ordering, EvalError> {
        match (self, rhs) {
            (Value::Long(a), Value::Long(b)) => Ok(a.cmp(b)),
            (Value::Decimal(a), Value::Decimal(b)) => Ok(a.cmp(b)),
            (Value::Datetime(a), Value::Datetime(b)) => Ok(a.cmp(b)),
            (Value::Duration(a), Value::Duration(b)) => Ok(a.cmp(b)),
            _ => Err(EvalError::NotComparable {
                lhs: self.type_of(),
                rhs: rhs.type_of(),
            }),
        }
    }

    pub fn contains(&self, item: &Value) -> Result<bool, EvalError> {
        Ok(self.as_set()?.contains(item))
    }

    pub fn contains_all(&self, other: &Value) -> Result<bool, EvalError> {
        let (haystack, needles) = (self.as_set()?, other.as_set()?);
        Ok(needles.iter().all(|n| haystack.contains(n)))
    }

    pub fn contains_any(&self, other: &Value) -> Result<bool, EvalError> {
        let (haystack, needles) = (self.as_set()?, other.as_set()?);
        Ok(needles.iter().any(|n| haystack.contains(n)))
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Set(a), Value::Set(b)) => {
                Arc::ptr_eq(a, b)
                    || (a.iter().all(|x| b.contains(x)) && b.iter().all(|x| a.contains(x)))
            }
            (Value::Record(a), Value::Record(b)) => Arc::ptr_eq(a, b) || a == b,
            (Value::EntityUid(a), Value::EntityUid(b)) => a == b,
            (Value::IpAddr(a), Value::IpAddr(b)) => a == b,
            (Value::Decimal(a), Value::Decimal(b)) => a == b,
            (Value::Datetime(a), Value::Datetime(b)) => a == b,
            (Value::Duration(a), Value::Duration(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Display for Value {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Long(n) => write!(f, "{n}"),
            Value::String(s) => write!(f, "\"{}\"", s.escape_debug()),
            Value::Set(items) => write!(f, "[{}]", items.iter().join(", ")),
            Value::Record(fields) => write!(
                f,
                "{{{}}}",
                fields
                    .iter()
                    .map(|(k, v)| format!("\"{}\": {v}", k.escape_debug()))
                    .join(", ")
            ),
            Value::EntityUid(uid) => write!(f, "{uid}"),
            Value::IpAddr(ip) => write!(f, "ip(\"{ip}\")"),
            Value::Decimal(d) => write!(f, "decimal(\"{d}\")"),
            Value::Datetime(d) => write!(f, "datetime(\"{d}\")"),
            Value::Duration(d) => write!(f, "duration(\"{d}\")"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::String(Arc::from(v))
    }
}

impl From<EntityUid> for Value {
    fn from(v: EntityUid) -> Self {
        Value::EntityUid(v)
    }
}

impl From<IpAddr> for Value {
    fn from(v: IpAddr) -> Self {
        Value::IpAddr(v)
    }
}

impl From<Decimal> for Value {
    fn from(v: Decimal) -> Self {
        Value::Decimal(v)
    }
}

impl From<Datetime> for Value {
    fn from(v: Datetime) -> Self {
        Value::Datetime(v)
    }
}

impl From<Duration> for Value {
    fn from(v: Duration) -> Self {
        Value::Duration(v)
    }
}
