use std::sync::{Arc, RwLock};

use tracing::{debug, info};

use crate::authorizer::{CompiledPolicy, authorize, compile_set};
use crate::batch::{self, BatchOptions, BatchRequest, BatchResult, BatchStats};
use crate::error::PolicyError;
use crate::eval::Environment;
use crate::hierarchy::HierarchyCache;
use crate::types::{EntityStore, PolicyId, PolicySet, Request, Response, Value};

/// The main engine handle. Cloneable and thread-safe.
///
/// Policies are compiled once when loaded. Each call takes a snapshot of the
/// current set, so a reload never blocks on or changes an evaluation that is
/// already running.
#[derive(Clone)]
pub struct PolicyEngine {
    inner: Arc<RwLock<Arc<Vec<CompiledPolicy>>>>,
}

impl PolicyEngine {
    pub fn new(policies: PolicySet) -> Self {
        let compiled = compile_set(&policies);
        info!(event = "Engine", phase = "Load", policies = compiled.len());
        PolicyEngine {
            inner: Arc::new(RwLock::new(Arc::new(compiled))),
        }
    }

    /// Replaces the policy set.
    pub fn reload(&self, policies: PolicySet) -> Result<(), PolicyError> {
        let compiled = compile_set(&policies);
        info!(event = "Engine", phase = "Reload", policies = compiled.len());
        *self.inner.write()? = Arc::new(compiled);
        Ok(())
    }

    /// Ids of the loaded policies, in declaration order.
    pub fn policies(&self) -> Result<Vec<PolicyId>, PolicyError> {
        let snapshot = self.snapshot()?;
        Ok(snapshot.iter().map(|p| p.id().clone()).collect())
    }

    fn snapshot(&self) -> Result<Arc<Vec<CompiledPolicy>>, PolicyError> {
        Ok(Arc::clone(&*self.inner.read()?))
    }

    pub fn is_authorized(
        &self,
        store: &dyn EntityStore,
        request: &Request,
    ) -> Result<Response, PolicyError> {
        debug!(
            event = "Request",
            phase = "Evaluation",
            principal = request.principal.to_string(),
            action = request.action.to_string(),
            resource = request.resource.to_string(),
            context = request.context.to_string()
        );

        if !matches!(request.context, Value::Record(_)) {
            return Err(PolicyError::RequestTypeError(format!(
                "context must be a record, got {}",
                request.context.type_of()
            )));
        }

        let policies = self.snapshot()?;
        let hierarchy = HierarchyCache::new();
        let env = Environment::new(store, request, &hierarchy);
        let response = authorize(policies.iter(), &env);

        debug!(
            event = "Request",
            phase = "Result",
            decision = response.decision.to_string(),
            reasons = response.diagnostics.reasons.len(),
            errors = response.diagnostics.errors.len()
        );
        Ok(response)
    }

    /// Evaluates every combination of candidate values in `request`, calling
    /// `callback` once per combination.
    ///
    /// Stops with [`PolicyError::Cancelled`] when the cancel token in
    /// `options` fires; results already passed to `callback` stand.
    pub fn batch_authorize<F>(
        &self,
        store: &dyn EntityStore,
        request: &BatchRequest,
        options: &BatchOptions,
        callback: F,
    ) -> Result<BatchStats, PolicyError>
    where
        F: FnMut(BatchResult),
    {
        let policies = self.snapshot()?;
        let stats = batch::run(&policies, store, request, options, callback)?;
        debug!(
            event = "Batch",
            phase = "Result",
            leaves = stats.leaves,
            pruned = stats.pruned_policies,
            prune_us = stats.prune_time.as_micros() as u64,
            eval_us = stats.eval_time.as_micros() as u64
        );
        Ok(stats)
    }
}

#[cfg(test)]
mod tests;
