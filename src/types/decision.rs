//! Authorization decisions and the diagnostics that explain them.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};
use utoipa::ToSchema;

use crate::error::EvalError;

/// Identifier of a policy within a policy set.
#[derive(
    Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(transparent)]
pub struct PolicyId(String);

impl PolicyId {
    pub fn new(id: impl Into<String>) -> Self {
        PolicyId(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for PolicyId {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for PolicyId {
    fn from(id: &str) -> Self {
        PolicyId::new(id)
    }
}

impl From<String> for PolicyId {
    fn from(id: String) -> Self {
        PolicyId(id)
    }
}

#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    ToSchema,
    StrumDisplay,
    EnumString,
)]
pub enum Decision {
    Allow,
    Deny,
}

/// A policy whose condition raised an error. The policy is treated as not
/// matching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct PolicyEvaluationError {
    pub policy_id: PolicyId,
    #[schema(value_type = String)]
    pub error: EvalError,
}

impl Display for PolicyEvaluationError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}: {}", self.policy_id, self.error)
    }
}

/// Why a decision came out the way it did.
///
/// `reasons` lists the matching policies of the determining effect: the
/// forbids for a deny caused by a forbid, the permits for an allow, and
/// nothing for a default deny.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Diagnostics {
    pub reasons: Vec<PolicyId>,
    pub errors: Vec<PolicyEvaluationError>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Response {
    pub decision: Decision,
    pub diagnostics: Diagnostics,
}

impl Response {
    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

impl Display for Response {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}", self.decision)?;
        if !self.diagnostics.reasons.is_empty() {
            let reasons: Vec<&str> = self.diagnostics.reasons.iter().map(PolicyId::as_str).collect();
            write!(f, " (reasons: {})", reasons.join(", "))?;
        }
        if !self.diagnostics.errors.is_empty() {
            write!(f, " ({} error(s))", self.diagnostics.errors.len())?;
        }
        Ok(())
    }
}
