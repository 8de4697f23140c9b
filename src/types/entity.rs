//! Entities and the store the evaluator reads them from.

use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::PolicyError;

use super::{EntityUid, Value};

/// An entity: its attributes, tags and direct parents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entity {
    uid: EntityUid,
    parents: HashSet<EntityUid>,
    attrs: BTreeMap<String, Value>,
    tags: BTreeMap<String, Value>,
}

impl Entity {
    pub fn new(uid: EntityUid) -> Self {
        Entity {
            uid,
            parents: HashSet::new(),
            attrs: BTreeMap::new(),
            tags: BTreeMap::new(),
        }
    }

    pub fn with_parent(mut self, parent: EntityUid) -> Self {
        self.parents.insert(parent);
        self
    }

    pub fn with_parents(mut self, parents: impl IntoIterator<Item = EntityUid>) -> Self {
        self.parents.extend(parents);
        self
    }

    pub fn with_attr(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attrs.insert(key.into(), value.into());
        self
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn uid(&self) -> &EntityUid {
        &self.uid
    }

    pub fn parents(&self) -> &HashSet<EntityUid> {
        &self.parents
    }

    pub fn attr(&self, key: &str) -> Option<&Value> {
        self.attrs.get(key)
    }

    pub fn attrs(&self) -> &BTreeMap<String, Value> {
        &self.attrs
    }

    pub fn tag(&self, key: &str) -> Option<&Value> {
        self.tags.get(key)
    }
}

/// Read-only source of entities, consulted synchronously during evaluation.
pub trait EntityStore {
    fn entity(&self, uid: &EntityUid) -> Option<&Entity>;
}

/// An in-memory [`EntityStore`].
#[derive(Debug, Clone, Default)]
pub struct Entities {
    by_uid: HashMap<EntityUid, Entity>,
}

impl Entities {
    pub fn empty() -> Self {
        Entities::default()
    }

    /// Builds a store, rejecting duplicate uids.
    pub fn from_entities(entities: impl IntoIterator<Item = Entity>) -> Result<Self, PolicyError> {
        let mut store = Entities::empty();
        for entity in entities {
            store.add(entity)?;
        }
        Ok(store)
    }

    pub fn add(&mut self, entity: Entity) -> Result<(), PolicyError> {
        if self.by_uid.contains_key(entity.uid()) {
            return Err(PolicyError::DuplicateEntity(entity.uid().to_string()));
        }
        self.by_uid.insert(entity.uid().clone(), entity);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.by_uid.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_uid.is_empty()
    }
}

impl EntityStore for Entities {
    fn entity(&self, uid: &EntityUid) -> Option<&Entity> {
        self.by_uid.get(uid)
    }
}
