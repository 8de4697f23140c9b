//! Entity identifiers: a namespaced type path plus an id.

use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::error::PolicyError;

/// A namespaced entity type name, e.g. `User` or `Infra::Host`.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct EntityType(String);

impl EntityType {
    pub fn new(name: impl Into<String>) -> Self {
        EntityType(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Namespace segments preceding the base type name.
    pub fn namespace(&self) -> Vec<&str> {
        let mut segments: Vec<&str> = self.0.split("::").collect();
        segments.pop();
        segments
    }

    /// The type name without its namespace.
    pub fn basename(&self) -> &str {
        self.0.rsplit("::").next().unwrap_or(&self.0)
    }
}

impl Display for EntityType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for EntityType {
    fn from(v: &str) -> Self {
        EntityType::new(v)
    }
}

/// Identifies a principal, action, resource or any other entity.
///
/// The zero value (empty type and empty id) is the "unspecified" entity used
/// when a batch request leaves an entity dimension ignored. Attribute access on
/// it fails with [`crate::EvalError::UnspecifiedEntity`].
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize, ToSchema,
)]
pub struct EntityUid {
    #[serde(rename = "type")]
    entity_type: EntityType,
    id: String,
}

impl EntityUid {
    pub fn new(entity_type: impl Into<EntityType>, id: impl Into<String>) -> Self {
        EntityUid {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    /// The sentinel for an entity dimension that was deliberately left out.
    pub fn unspecified() -> Self {
        EntityUid::default()
    }

    pub fn is_unspecified(&self) -> bool {
        self.entity_type.0.is_empty() && self.id.is_empty()
    }

    pub fn entity_type(&self) -> &EntityType {
        &self.entity_type
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Display for EntityUid {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}::\"{}\"", self.entity_type, self.id.escape_debug())
    }
}

/// Parses the `Ns::Type::"id"` form. Quotes around the id are required; the
/// type path is everything before the final `::`.
impl FromStr for EntityUid {
    type Err = PolicyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || PolicyError::InvalidFormat(format!("not an entity uid: {s}"));
        let quote = s.find("::\"").ok_or_else(invalid)?;
        let (ty, rest) = s.split_at(quote);
        let id = rest
            .strip_prefix("::\"")
            .and_then(|r| r.strip_suffix('"'))
            .ok_or_else(invalid)?;
        if ty.is_empty() || ty.split("::").any(|seg| seg.is_empty()) {
            return Err(invalid());
        }
        Ok(EntityUid::new(ty, id))
    }
}
