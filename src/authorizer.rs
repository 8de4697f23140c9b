//! Compiled policies and the permit/forbid decision.

use std::fmt::{Debug, Formatter, Result as FmtResult};

use tracing::{trace, warn};

use crate::error::EvalError;
use crate::eval::{Environment, Evaluator, compile};
use crate::types::{
    Decision, Diagnostics, Effect, Policy, PolicyEvaluationError, PolicyId, PolicySet, Response,
};

/// A policy together with its evaluator, built once and reused for every
/// request.
pub struct CompiledPolicy {
    id: PolicyId,
    policy: Policy,
    evaluator: Evaluator,
}

impl CompiledPolicy {
    pub fn new(id: PolicyId, policy: Policy) -> Self {
        let evaluator = compile(&policy.to_expr());
        CompiledPolicy {
            id,
            policy,
            evaluator,
        }
    }

    pub fn id(&self) -> &PolicyId {
        &self.id
    }

    pub fn effect(&self) -> Effect {
        self.policy.effect
    }

    pub fn policy(&self) -> &Policy {
        &self.policy
    }

    /// Whether the policy matches. A non-boolean result is a type error.
    pub fn is_satisfied(&self, env: &Environment<'_>) -> Result<bool, EvalError> {
        (self.evaluator)(env)?.as_bool()
    }
}

impl Debug for CompiledPolicy {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.debug_struct("CompiledPolicy")
            .field("id", &self.id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

pub fn compile_set(set: &PolicySet) -> Vec<CompiledPolicy> {
    set.iter()
        .map(|(id, policy)| CompiledPolicy::new(id.clone(), policy.clone()))
        .collect()
}

/// Evaluates every policy in order and combines the outcomes: any matching
/// forbid denies, otherwise any matching permit allows, otherwise deny.
///
/// A policy that fails to evaluate does not match; its error is reported in
/// the diagnostics.
pub fn authorize<'p>(
    policies: impl IntoIterator<Item = &'p CompiledPolicy>,
    env: &Environment<'_>,
) -> Response {
    let mut forbids = Vec::new();
    let mut permits = Vec::new();
    let mut errors = Vec::new();

    for policy in policies {
        match policy.is_satisfied(env) {
            Ok(true) => {
                trace!(event = "Request", phase = "Policy", policy = policy.id().as_str(), matched = true);
                match policy.effect() {
                    Effect::Forbid => forbids.push(policy.id().clone()),
                    Effect::Permit => permits.push(policy.id().clone()),
                }
            }
            Ok(false) => {
                trace!(event = "Request", phase = "Policy", policy = policy.id().as_str(), matched = false);
            }
            Err(error) => {
                warn!(
                    event = "Request",
                    phase = "Policy",
                    policy = policy.id().as_str(),
                    error = error.to_string()
                );
                errors.push(PolicyEvaluationError {
                    policy_id: policy.id().clone(),
                    error,
                });
            }
        }
    }

    let (decision, reasons) = if !forbids.is_empty() {
        (Decision::Deny, forbids)
    } else if !permits.is_empty() {
        (Decision::Allow, permits)
    } else {
        (Decision::Deny, Vec::new())
    };

    Response {
        decision,
        diagnostics: Diagnostics { reasons, errors },
    }
}
