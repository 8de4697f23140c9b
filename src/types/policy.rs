//! Policies and ordered policy sets.

use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};
use strum_macros::{Display as StrumDisplay, EnumString};
use utoipa::ToSchema;

use crate::ast::{Expr, Var};
use crate::error::PolicyError;

use super::{EntityType, EntityUid, PolicyId, Value};

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
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Effect {
    Permit,
    Forbid,
}

/// Constraint on one of the principal, action or resource slots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeConstraint {
    Any,
    Eq(EntityUid),
    In(EntityUid),
    InSet(Vec<EntityUid>),
    Is(EntityType),
    IsIn(EntityType, EntityUid),
}

impl ScopeConstraint {
    /// Lowers the constraint to a boolean expression over `var`.
    pub fn to_expr(&self, var: Var) -> Expr {
        let subject = Expr::var(var);
        match self {
            ScopeConstraint::Any => Expr::val(true),
            ScopeConstraint::Eq(uid) => Expr::eq(subject, Expr::entity(uid.clone())),
            ScopeConstraint::In(uid) => Expr::is_in(subject, Expr::entity(uid.clone())),
            ScopeConstraint::InSet(uids) => Expr::is_in(
                subject,
                Expr::val(Value::set(uids.iter().cloned().map(Value::EntityUid))),
            ),
            ScopeConstraint::Is(ty) => Expr::is_entity_type(subject, ty.clone()),
            ScopeConstraint::IsIn(ty, uid) => {
                Expr::is_entity_type_in(subject, ty.clone(), Expr::entity(uid.clone()))
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, StrumDisplay)]
#[strum(serialize_all = "lowercase")]
pub enum ConditionKind {
    When,
    Unless,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub kind: ConditionKind,
    pub body: Expr,
}

impl Condition {
    pub fn when(body: Expr) -> Self {
        Condition {
            kind: ConditionKind::When,
            body,
        }
    }

    pub fn unless(body: Expr) -> Self {
        Condition {
            kind: ConditionKind::Unless,
            body,
        }
    }

    /// The condition as a boolean expression that must hold for a match.
    pub fn to_expr(&self) -> Expr {
        match self.kind {
            ConditionKind::When => self.body.clone(),
            ConditionKind::Unless => Expr::not(self.body.clone()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Policy {
    pub effect: Effect,
    pub principal: ScopeConstraint,
    pub action: ScopeConstraint,
    pub resource: ScopeConstraint,
    pub conditions: Vec<Condition>,
}

impl Policy {
    /// A policy with an unconstrained scope and no conditions.
    pub fn new(effect: Effect) -> Self {
        Policy {
            effect,
            principal: ScopeConstraint::Any,
            action: ScopeConstraint::Any,
            resource: ScopeConstraint::Any,
            conditions: Vec::new(),
        }
    }

    pub fn permit() -> Self {
        Policy::new(Effect::Permit)
    }

    pub fn forbid() -> Self {
        Policy::new(Effect::Forbid)
    }

    pub fn with_principal(mut self, scope: ScopeConstraint) -> Self {
        self.principal = scope;
        self
    }

    pub fn with_action(mut self, scope: ScopeConstraint) -> Self {
        self.action = scope;
        self
    }

    pub fn with_resource(mut self, scope: ScopeConstraint) -> Self {
        self.resource = scope;
        self
    }

    pub fn when(mut self, body: Expr) -> Self {
        self.conditions.push(Condition::when(body));
        self
    }

    pub fn unless(mut self, body: Expr) -> Self {
        self.conditions.push(Condition::unless(body));
        self
    }

    /// The whole policy as one boolean expression:
    /// `principal && (action && (resource && (c1 && c2)))`.
    pub fn to_expr(&self) -> Expr {
        let mut parts = vec![
            self.principal.to_expr(Var::Principal),
            self.action.to_expr(Var::Action),
            self.resource.to_expr(Var::Resource),
        ];
        parts.extend(self.conditions.iter().map(Condition::to_expr));

        let mut parts = parts.into_iter().rev();
        let last = parts.next().unwrap_or_else(|| Expr::val(true));
        parts.fold(last, |acc, part| Expr::and(part, acc))
    }
}

impl Display for Policy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}({})", self.effect, self.to_expr())
    }
}

/// An ordered collection of uniquely named policies.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PolicySet {
    policies: Vec<(PolicyId, Policy)>,
}

impl PolicySet {
    pub fn new() -> Self {
        PolicySet::default()
    }

    pub fn from_policies<I, K>(policies: I) -> Result<Self, PolicyError>
    where
        I: IntoIterator<Item = (K, Policy)>,
        K: Into<PolicyId>,
    {
        let mut set = PolicySet::new();
        for (id, policy) in policies {
            set.add(id, policy)?;
        }
        Ok(set)
    }

    pub fn add(&mut self, id: impl Into<PolicyId>, policy: Policy) -> Result<(), PolicyError> {
        let id = id.into();
        if self.get(&id).is_some() {
            return Err(PolicyError::DuplicatePolicyId(id.to_string()));
        }
        self.policies.push((id, policy));
        Ok(())
    }

    pub fn get(&self, id: &PolicyId) -> Option<&Policy> {
        self.policies
            .iter()
            .find(|(pid, _)| pid == id)
            .map(|(_, policy)| policy)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PolicyId, &Policy)> {
        self.policies.iter().map(|(id, policy)| (id, policy))
    }

    pub fn ids(&self) -> Vec<PolicyId> {
        self.policies.iter().map(|(id, _)| id.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.policies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.policies.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> EntityUid {
        EntityUid::new("User", "alice")
    }

    #[test]
    fn test_to_expr_right_associates() {
        let policy = Policy::permit()
            .with_principal(ScopeConstraint::Eq(alice()))
            .with_resource(ScopeConstraint::Is(EntityType::new("Photo")))
            .when(Expr::get_attr(Expr::context(), "mfa"))
            .unless(Expr::get_attr(Expr::resource(), "private"));

        assert_eq!(
            policy.to_expr().to_string(),
            r#"((principal == User::"alice") && (true && ((resource is Photo) && (context["mfa"] && !(resource["private"])))))"#
        );
    }

    #[test]
    fn test_scope_lowering() {
        let group = EntityUid::new("Group", "admins");
        assert_eq!(
            ScopeConstraint::IsIn(EntityType::new("User"), group.clone())
                .to_expr(Var::Principal)
                .to_string(),
            r#"(principal is User in Group::"admins")"#
        );
        assert_eq!(
            ScopeConstraint::InSet(vec![group]).to_expr(Var::Action).to_string(),
            r#"(action in [Group::"admins"])"#
        );
    }

    #[test]
    fn test_policy_set_rejects_duplicates() {
        let result = PolicySet::from_policies([
            ("p0", Policy::permit()),
            ("p0", Policy::forbid()),
        ]);
        assert!(matches!(result, Err(PolicyError::DuplicatePolicyId(id)) if id == "p0"));
    }

    #[test]
    fn test_policy_set_keeps_order() {
        let set = PolicySet::from_policies([
            ("b", Policy::permit()),
            ("a", Policy::forbid()),
        ])
        .unwrap();
        assert_eq!(set.ids(), vec![PolicyId::new("b"), PolicyId::new("a")]);
        assert_eq!(set.get(&PolicyId::new("a")).map(|p| p.effect), Some(Effect::Forbid));
    }
}
