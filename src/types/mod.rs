//! The data model: values, entities, requests, policies and decisions.
//!
//! Canonical string forms:
//! - Entity: `User::"alice"` or `NS::User::"alice"`
//! - Decimal: `decimal("1.2345")`, four fractional digits at most
//! - IP address: `ip("10.0.0.1")` or `ip("10.0.0.0/8")`

mod datetime;
mod decimal;
mod decision;
mod entity;
mod entity_uid;
mod ipaddr;
mod policy;
mod request;
mod value;

pub use datetime::{Datetime, Duration};
pub use decimal::Decimal;
pub use decision::{Decision, Diagnostics, PolicyEvaluationError, PolicyId, Response};
pub use entity::{Entities, Entity, EntityStore};
pub use entity_uid::{EntityType, EntityUid};
pub use ipaddr::IpAddr;
pub use policy::{Condition, ConditionKind, Effect, Policy, PolicySet, ScopeConstraint};
pub use request::Request;
pub use value::{Type, Value};
