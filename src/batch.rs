//! Batch authorization: every combination of candidate values for the
//! variables of a partly known request.
//!
//! The search is a depth-first walk. At each node the known dimensions are
//! used to partially evaluate the remaining policies, and policies that can
//! no longer match are dropped before the next variable is expanded.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use itertools::Either;
use once_cell::unsync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{debug, trace, warn};

use crate::authorizer::{CompiledPolicy, authorize};
use crate::error::PolicyError;
use crate::eval::Environment;
use crate::hierarchy::HierarchyCache;
use crate::partial::{PartialEnvironment, Term, partial_policy};
use crate::timers::PhaseTimer;
use crate::types::{EntityStore, EntityUid, Policy, PolicyId, Request, Response, Value};

/// A request whose dimensions are terms, together with the candidate values
/// of every variable the terms mention.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchRequest {
    pub principal: Term,
    pub action: Term,
    pub resource: Term,
    pub context: Term,
    pub variables: BTreeMap<String, Vec<Value>>,
}

impl BatchRequest {
    pub fn new(
        principal: impl Into<Term>,
        action: impl Into<Term>,
        resource: impl Into<Term>,
        context: impl Into<Term>,
    ) -> Self {
        BatchRequest {
            principal: principal.into(),
            action: action.into(),
            resource: resource.into(),
            context: context.into(),
            variables: BTreeMap::new(),
        }
    }

    pub fn with_variable(
        mut self,
        name: impl Into<String>,
        candidates: impl IntoIterator<Item = Value>,
    ) -> Self {
        self.variables
            .insert(name.into(), candidates.into_iter().collect());
        self
    }

    fn terms(&self) -> [&Term; 4] {
        [&self.principal, &self.action, &self.resource, &self.context]
    }
}

/// Which variable the search expands next.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionOrder {
    /// The variable with the fewest candidates, ties broken by declaration.
    #[default]
    FewestCandidates,
    /// Principal, action, resource, then context; by name within each.
    Declared,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub expansion: ExpansionOrder,
    /// Partially evaluate and drop policies before each expansion. When off,
    /// every leaf is evaluated against the full policy set.
    pub prune: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        SearchConfig {
            expansion: ExpansionOrder::default(),
            prune: true,
        }
    }
}

/// Cooperative cancellation flag, checked between expansions.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        CancelToken::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Clone, Default)]
pub struct BatchOptions {
    pub config: SearchConfig,
    pub cancel: Option<CancelToken>,
}

/// One leaf of the search. The callback owns it and may keep it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchResult {
    pub request: Request,
    /// The candidate chosen for every variable on the path to this leaf.
    pub values: BTreeMap<String, Value>,
    pub response: Response,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub leaves: usize,
    pub pruned_policies: usize,
    pub prune_time: Duration,
    pub eval_time: Duration,
}

/// The policies still in play at a node of the search.
enum Candidates<'p> {
    Compiled(&'p [CompiledPolicy]),
    /// Partially evaluated policies, compiled on first use by a leaf.
    Residual {
        policies: Vec<(PolicyId, Policy)>,
        compiled: OnceCell<Vec<CompiledPolicy>>,
    },
}

impl Candidates<'_> {
    fn iter(&self) -> impl Iterator<Item = (&PolicyId, &Policy)> {
        match self {
            Candidates::Compiled(set) => Either::Left(set.iter().map(|c| (c.id(), c.policy()))),
            Candidates::Residual { policies, .. } => {
                Either::Right(policies.iter().map(|(id, policy)| (id, policy)))
            }
        }
    }

    fn len(&self) -> usize {
        match self {
            Candidates::Compiled(set) => set.len(),
            Candidates::Residual { policies, .. } => policies.len(),
        }
    }

    fn compiled(&self) -> &[CompiledPolicy] {
        match self {
            Candidates::Compiled(set) => set,
            Candidates::Residual { policies, compiled } => compiled.get_or_init(|| {
                policies
                    .iter()
                    .map(|(id, policy)| CompiledPolicy::new(id.clone(), policy.clone()))
                    .collect()
            }),
        }
    }
}

const DIMENSIONS: [&str; 4] = ["principal", "action", "resource", "context"];

/// Checks every dimension and candidate before the search starts and returns
/// the referenced variables in declaration order.
fn validate(request: &BatchRequest) -> Result<Vec<String>, PolicyError> {
    let mut declared: Vec<String> = Vec::new();
    for (slot, term) in DIMENSIONS.into_iter().zip(request.terms()) {
        let mut names = BTreeSet::new();
        term.collect_variables(&mut names);
        for name in names {
            if !request.variables.contains_key(&name) {
                return Err(PolicyError::UnboundVariable(name));
            }
            if !declared.contains(&name) {
                declared.push(name);
            }
        }

        let is_context = slot == "context";
        let check = |value: &Value| -> Result<(), PolicyError> {
            let ok = if is_context {
                matches!(value, Value::Record(_))
            } else {
                matches!(value, Value::EntityUid(_))
            };
            if ok {
                return Ok(());
            }
            let expected = if is_context { "a record" } else { "an entity" };
            Err(PolicyError::RequestTypeError(format!(
                "{slot} must be {expected}, got {}",
                value.type_of()
            )))
        };
        match term {
            Term::Ignore => {}
            Term::Value(value) => check(value)?,
            Term::Variable(name) => {
                for candidate in request.variables.get(name).into_iter().flatten() {
                    check(candidate)?;
                }
            }
            Term::Record(_) if is_context => {}
            Term::Record(_) | Term::Set(_) => {
                let shape = if matches!(term, Term::Set(_)) { "set" } else { "record" };
                let expected = if is_context { "a record" } else { "an entity" };
                return Err(PolicyError::RequestTypeError(format!(
                    "{slot} must be {expected}, got {shape}"
                )));
            }
        }
    }
    Ok(declared)
}

/// Replaces ignored dimensions by their defaults.
fn with_defaults(terms: &[Term; 4]) -> [Term; 4] {
    let unspecified = Value::EntityUid(EntityUid::unspecified());
    [
        terms[0].with_defaults(&unspecified),
        terms[1].with_defaults(&unspecified),
        terms[2].with_defaults(&unspecified),
        terms[3].with_defaults(&Value::empty_record()),
    ]
}

struct Search<'a, F> {
    store: &'a dyn EntityStore,
    hierarchy: HierarchyCache,
    variables: &'a BTreeMap<String, Vec<Value>>,
    config: &'a SearchConfig,
    cancel: Option<&'a CancelToken>,
    callback: F,
    stats: BatchStats,
}

impl<F> Search<'_, F>
where
    F: FnMut(BatchResult),
{
    fn search(
        &mut self,
        terms: &[Term; 4],
        pending: &[String],
        values: &mut BTreeMap<String, Value>,
        candidates: &Candidates<'_>,
    ) -> Result<(), PolicyError> {
        if pending.is_empty() && !terms.iter().any(Term::contains_ignore) {
            return self.emit(terms, values, candidates);
        }

        let pruned = if self.config.prune {
            Some(self.prune(terms, candidates))
        } else {
            None
        };
        let candidates = pruned.as_ref().unwrap_or(candidates);

        let defaulted;
        let terms = if pending.len() <= 1 {
            defaulted = with_defaults(terms);
            &defaulted
        } else {
            terms
        };
        if pending.is_empty() {
            return self.emit(terms, values, candidates);
        }

        let mut rest = pending.to_vec();
        let next = rest.remove(self.pick(pending));
        let variables = self.variables;
        let choices = variables
            .get(&next)
            .ok_or_else(|| PolicyError::UnboundVariable(next.clone()))?;

        debug!(
            event = "Batch",
            phase = "Expand",
            variable = next.as_str(),
            candidates = choices.len(),
            remaining = rest.len(),
            policies = candidates.len()
        );

        for value in choices {
            if self.cancel.is_some_and(CancelToken::is_cancelled) {
                warn!(
                    event = "Batch",
                    phase = "Cancelled",
                    variable = next.as_str(),
                    leaves = self.stats.leaves
                );
                return Err(PolicyError::Cancelled);
            }
            let bound = terms.each_ref().map(|term| term.substitute(&next, value));
            values.insert(next.clone(), value.clone());
            self.search(&bound, &rest, values, candidates)?;
        }
        values.remove(&next);
        Ok(())
    }

    fn pick(&self, pending: &[String]) -> usize {
        match self.config.expansion {
            ExpansionOrder::Declared => 0,
            ExpansionOrder::FewestCandidates => pending
                .iter()
                .enumerate()
                .min_by_key(|(_, name)| self.variables.get(*name).map_or(0, Vec::len))
                .map_or(0, |(idx, _)| idx),
        }
    }

    fn prune<'p>(&mut self, terms: &[Term; 4], candidates: &Candidates<'_>) -> Candidates<'p> {
        let _timer = PhaseTimer::new(&mut self.stats.prune_time);
        let env = PartialEnvironment::new(
            self.store,
            &self.hierarchy,
            &terms[0],
            &terms[1],
            &terms[2],
            &terms[3],
        );

        let mut kept = Vec::with_capacity(candidates.len());
        for (id, policy) in candidates.iter() {
            match partial_policy(policy, &env) {
                Some(reduced) => kept.push((id.clone(), reduced)),
                None => {
                    trace!(event = "Batch", phase = "Prune", policy = id.as_str());
                    self.stats.pruned_policies += 1;
                }
            }
        }
        debug!(
            event = "Batch",
            phase = "Prune",
            kept = kept.len(),
            dropped = candidates.len() - kept.len()
        );

        Candidates::Residual {
            policies: kept,
            compiled: OnceCell::new(),
        }
    }

    fn emit(
        &mut self,
        terms: &[Term; 4],
        values: &BTreeMap<String, Value>,
        candidates: &Candidates<'_>,
    ) -> Result<(), PolicyError> {
        let [principal, action, resource, context] = terms.each_ref().map(Term::to_value);
        let (Some(principal), Some(action), Some(resource), Some(context)) =
            (principal, action, resource, context)
        else {
            return Err(PolicyError::RequestTypeError(
                "batch leaf is not fully bound".to_string(),
            ));
        };
        let request = Request::from_values(&principal, &action, &resource, context)?;

        let response = {
            let _timer = PhaseTimer::new(&mut self.stats.eval_time);
            let env = Environment::new(self.store, &request, &self.hierarchy);
            authorize(candidates.compiled(), &env)
        };
        trace!(
            event = "Batch",
            phase = "Leaf",
            request = request.to_string(),
            decision = response.decision.to_string()
        );

        self.stats.leaves += 1;
        (self.callback)(BatchResult {
            request,
            values: values.clone(),
            response,
        });
        Ok(())
    }
}

/// Runs the batch search over `policies`, calling `callback` once per leaf
/// in depth-first order.
pub(crate) fn run<F>(
    policies: &[CompiledPolicy],
    store: &dyn EntityStore,
    request: &BatchRequest,
    options: &BatchOptions,
    callback: F,
) -> Result<BatchStats, PolicyError>
where
    F: FnMut(BatchResult),
{
    let pending = validate(request)?;
    debug!(
        event = "Batch",
        phase = "Start",
        variables = pending.len(),
        policies = policies.len(),
        prune = options.config.prune
    );

    let mut search = Search {
        store,
        hierarchy: HierarchyCache::new(),
        variables: &request.variables,
        config: &options.config,
        cancel: options.cancel.as_ref(),
        callback,
        stats: BatchStats::default(),
    };
    let terms = request.terms().map(Term::clone);
    search.search(
        &terms,
        &pending,
        &mut BTreeMap::new(),
        &Candidates::Compiled(policies),
    )?;
    Ok(search.stats)
}

#[cfg(test)]
mod tests {
    use super::*;
    use yare::parameterized;

    fn user(id: &str) -> Value {
        Value::EntityUid(EntityUid::new("User", id))
    }

    fn base() -> BatchRequest {
        BatchRequest::new(
            Term::variable("who"),
            EntityUid::new("Action", "view"),
            Term::Ignore,
            Term::record([("ip", Term::variable("addr"))]),
        )
        .with_variable("who", [user("alice"), user("bob")])
        .with_variable("addr", [Value::from("10.0.0.1")])
    }

    #[test]
    fn test_validate_lists_variables_in_declaration_order() {
        let request = BatchRequest {
            resource: Term::variable("what"),
            ..base()
        }
        .with_variable("what", [Value::EntityUid(EntityUid::new("Photo", "a"))]);
        assert_eq!(validate(&request).unwrap(), vec!["who", "what", "addr"]);
    }

    #[test]
    fn test_validate_rejects_unbound_variable() {
        let request = BatchRequest {
            action: Term::variable("verb"),
            ..base()
        };
        assert!(matches!(
            validate(&request),
            Err(PolicyError::UnboundVariable(name)) if name == "verb"
        ));
    }

    #[parameterized(
        literal_principal = { BatchRequest { principal: Term::Value(Value::Long(1)), ..base() }, "principal must be an entity, got long" },
        candidate_principal = { base().with_variable("who", [Value::from("alice")]), "principal must be an entity, got string" },
        record_resource = { BatchRequest { resource: Term::record([("id", Term::Ignore)]), ..base() }, "resource must be an entity, got record" },
        set_context = { BatchRequest { context: Term::set([]), ..base() }, "context must be a record, got set" },
        literal_context = { BatchRequest { context: Term::Value(Value::Bool(true)), ..base() }, "context must be a record, got bool" },
    )]
    fn test_validate_rejects_malformed_dimensions(request: BatchRequest, message: &str) {
        match validate(&request) {
            Err(PolicyError::RequestTypeError(got)) => assert_eq!(got, message),
            other => panic!("expected a request type error, got {other:?}"),
        }
    }

    #[test]
    fn test_defaults_fill_ignored_dimensions() {
        let terms = with_defaults(&[
            Term::Ignore,
            Term::from(EntityUid::new("Action", "view")),
            Term::Ignore,
            Term::record([("skip", Term::Ignore), ("keep", Term::Value(Value::Long(1)))]),
        ]);
        assert_eq!(terms[0], Term::from(EntityUid::unspecified()));
        assert_eq!(terms[2], Term::from(EntityUid::unspecified()));
        assert_eq!(
            terms[3].to_value(),
            Some(Value::record([("keep", Value::Long(1))]))
        );
    }

    #[test]
    fn test_search_config_defaults() {
        let config: SearchConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config, SearchConfig::default());
        assert!(config.prune);
        assert_eq!(config.expansion, ExpansionOrder::FewestCandidates);

        let config: SearchConfig =
            serde_json::from_str(r#"{"expansion": "declared", "prune": false}"#).unwrap();
        assert_eq!(config.expansion, ExpansionOrder::Declared);
        assert!(!config.prune);
    }

    #[test]
    fn test_cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let observer = token.clone();
        assert!(!observer.is_cancelled());
        token.cancel();
        assert!(observer.is_cancelled());
    }
}
