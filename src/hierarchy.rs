//! Reachability over the entity parent graph, backing the `in` operator.
//!
//! Searches are iterative and keep a visited set, so cyclic graphs terminate
//! and graphs with many shared ancestors are walked once per query instead of
//! once per path. Answers are memoized per `(entity, target)` pair for the
//! lifetime of the cache, which callers scope to one request or one batch run
//! over a single entity store.

use std::cell::RefCell;
use std::collections::{HashMap, HashSet};

use tracing::trace;

use crate::types::{EntityStore, EntityUid};

#[derive(Debug, Default)]
pub struct HierarchyCache {
    memo: RefCell<HashMap<(EntityUid, EntityUid), bool>>,
}

impl HierarchyCache {
    pub fn new() -> Self {
        HierarchyCache::default()
    }

    /// True when `entity == target` or `target` is reachable from `entity`
    /// through parent edges. Entities missing from the store have no parents.
    pub fn is_ancestor(&self, store: &dyn EntityStore, entity: &EntityUid, target: &EntityUid) -> bool {
        if entity == target {
            return true;
        }
        if let Some(hit) = self.cached(entity, target) {
            return hit;
        }
        let targets = HashSet::from([target]);
        let found = self.search(store, entity, &targets);
        found.is_some()
    }

    /// True when `entity` is any of `targets` or reaches one of them.
    pub fn is_in_set(&self, store: &dyn EntityStore, entity: &EntityUid, targets: &[EntityUid]) -> bool {
        if targets.contains(entity) {
            return true;
        }

        let mut pending = HashSet::new();
        for target in targets {
            match self.cached(entity, target) {
                Some(true) => return true,
                Some(false) => {}
                None => {
                    pending.insert(target);
                }
            }
        }
        if pending.is_empty() {
            return false;
        }
        self.search(store, entity, &pending).is_some()
    }

    /// Number of memoized pairs.
    pub fn len(&self) -> usize {
        self.memo.borrow().len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.borrow().is_empty()
    }

    fn cached(&self, entity: &EntityUid, target: &EntityUid) -> Option<bool> {
        self.memo
            .borrow()
            .get(&(entity.clone(), target.clone()))
            .copied()
    }

    /// Walks the parents of `start` with an explicit stack until one of
    /// `targets` is found. Each parent is tested before it is queued.
    fn search(
        &self,
        store: &dyn EntityStore,
        start: &EntityUid,
        targets: &HashSet<&EntityUid>,
    ) -> Option<EntityUid> {
        let mut visited: HashSet<&EntityUid> = HashSet::from([start]);
        let mut stack: Vec<&EntityUid> = vec![start];
        let mut found = None;

        'walk: while let Some(uid) = stack.pop() {
            let Some(entity) = store.entity(uid) else {
                continue;
            };
            for parent in entity.parents() {
                if targets.contains(parent) {
                    found = Some(parent.clone());
                    break 'walk;
                }
                if visited.insert(parent) {
                    stack.push(parent);
                }
            }
        }

        trace!(
            event = "Hierarchy",
            phase = "Search",
            entity = start.to_string(),
            targets = targets.len(),
            visited = visited.len(),
            found = found.is_some()
        );

        let mut memo = self.memo.borrow_mut();
        match &found {
            Some(target) => {
                memo.insert((start.clone(), target.clone()), true);
            }
            // An exhausted walk covered the full ancestor closure of every
            // visited node, so none of them reaches any of the targets.
            None => {
                for uid in &visited {
                    for target in targets {
                        memo.insert(((*uid).clone(), (*target).clone()), false);
                    }
                }
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Entities, Entity};
    use std::time::{Duration, Instant};

    fn uid(id: &str) -> EntityUid {
        EntityUid::new("Node", id)
    }

    fn chain() -> Entities {
        Entities::from_entities([
            Entity::new(uid("a")).with_parent(uid("b")),
            Entity::new(uid("b")).with_parent(uid("c")),
            Entity::new(uid("c")),
        ])
        .unwrap()
    }

    #[test]
    fn test_reflexive() {
        let cache = HierarchyCache::new();
        let store = Entities::empty();
        assert!(cache.is_ancestor(&store, &uid("x"), &uid("x")));
        assert!(cache.is_in_set(&store, &uid("x"), &[uid("y"), uid("x")]));
    }

    #[test]
    fn test_transitive() {
        let cache = HierarchyCache::new();
        let store = chain();
        assert!(cache.is_ancestor(&store, &uid("a"), &uid("c")));
        assert!(!cache.is_ancestor(&store, &uid("c"), &uid("a")));
        assert!(cache.is_in_set(&store, &uid("a"), &[uid("z"), uid("c")]));
        assert!(!cache.is_in_set(&store, &uid("b"), &[uid("a"), uid("z")]));
        assert!(!cache.is_in_set(&store, &uid("b"), &[]));
    }

    #[test]
    fn test_missing_entity_has_no_parents() {
        let cache = HierarchyCache::new();
        let store = chain();
        assert!(!cache.is_ancestor(&store, &uid("ghost"), &uid("c")));
    }

    #[test]
    fn test_cycle_terminates() {
        let store = Entities::from_entities([
            Entity::new(uid("a")).with_parent(uid("b")),
            Entity::new(uid("b")).with_parent(uid("c")),
            Entity::new(uid("c")).with_parent(uid("a")),
        ])
        .unwrap();
        let cache = HierarchyCache::new();
        assert!(!cache.is_ancestor(&store, &uid("a"), &uid("d")));
        assert!(cache.is_ancestor(&store, &uid("a"), &uid("c")));
        assert!(cache.is_ancestor(&store, &uid("c"), &uid("b")));
    }

    #[test]
    fn test_memoizes_negative_walk() {
        let cache = HierarchyCache::new();
        let store = chain();
        assert!(!cache.is_ancestor(&store, &uid("a"), &uid("z")));
        // a, b and c were all visited and none reaches z.
        assert_eq!(cache.len(), 3);
        assert_eq!(cache.cached(&uid("b"), &uid("z")), Some(false));
        assert!(cache.is_ancestor(&store, &uid("a"), &uid("b")));
        assert_eq!(cache.cached(&uid("a"), &uid("b")), Some(true));
    }

    /// `n0 -> {l0, r0} -> n1 -> {l1, r1} -> ... -> n100`: 2^100 distinct paths.
    fn diamonds(depth: usize) -> Entities {
        let mut entities = Vec::new();
        for i in 0..depth {
            let next = uid(&format!("n{}", i + 1));
            entities.push(
                Entity::new(uid(&format!("n{i}")))
                    .with_parents([uid(&format!("l{i}")), uid(&format!("r{i}"))]),
            );
            entities.push(Entity::new(uid(&format!("l{i}"))).with_parent(next.clone()));
            entities.push(Entity::new(uid(&format!("r{i}"))).with_parent(next));
        }
        entities.push(Entity::new(uid(&format!("n{depth}"))));
        Entities::from_entities(entities).unwrap()
    }

    #[test]
    fn test_diamond_chain_is_linear() {
        let store = diamonds(100);
        let cache = HierarchyCache::new();
        let start = Instant::now();
        assert!(!cache.is_ancestor(&store, &uid("n0"), &uid("missing")));
        assert!(cache.is_ancestor(&store, &uid("n0"), &uid("n100")));
        assert!(!cache.is_in_set(&store, &uid("n0"), &[uid("x"), uid("y")]));
        assert!(start.elapsed() < Duration::from_secs(1));
    }
}
