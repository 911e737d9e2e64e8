//! Storage view: the normalized snapshot the engine reads from.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{EntityRef, StoredEntity};

/// All stored entities of one type, keyed by id.
pub type TypeStore = BTreeMap<String, StoredEntity>;

/// A normalized snapshot: type name -> id -> stored entity.
///
/// On the wire this is `{"<type>": {"<id>": <entity>, ...}, ...}`. The map
/// key is authoritative for lookups. The engine never mutates a view; hosts
/// build a new one (or mutate their own copy) between calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageView {
    stores: BTreeMap<String, TypeStore>,
}

impl StorageView {
    /// Create an empty view.
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entity, replacing any entity with the same identity.
    pub fn insert(&mut self, entity: StoredEntity) -> Option<StoredEntity> {
        self.stores
            .entry(entity.entity_type.clone())
            .or_default()
            .insert(entity.id.clone(), entity)
    }

    /// Register a type with no entities yet.
    pub fn ensure_type(&mut self, entity_type: impl Into<String>) {
        self.stores.entry(entity_type.into()).or_default();
    }

    /// Remove an entity by reference.
    pub fn remove(&mut self, reference: &EntityRef) -> Option<StoredEntity> {
        self.stores
            .get_mut(&reference.entity_type)?
            .remove(&reference.id)
    }

    /// The sub-store for a type, if the type is present at all.
    pub fn type_store(&self, entity_type: &str) -> Option<&TypeStore> {
        self.stores.get(entity_type)
    }

    /// Look up an entity by reference.
    pub fn get(&self, reference: &EntityRef) -> Option<&StoredEntity> {
        self.type_store(&reference.entity_type)?.get(&reference.id)
    }

    /// Mutable lookup, for hosts that keep a view as their working copy.
    pub fn get_mut(&mut self, reference: &EntityRef) -> Option<&mut StoredEntity> {
        self.stores
            .get_mut(&reference.entity_type)?
            .get_mut(&reference.id)
    }

    /// Returns true if the type has a sub-store.
    pub fn contains_type(&self, entity_type: &str) -> bool {
        self.stores.contains_key(entity_type)
    }

    /// Type names present in the view.
    pub fn types(&self) -> impl Iterator<Item = &str> {
        self.stores.keys().map(String::as_str)
    }

    /// Every stored entity, grouped by type.
    pub fn entities(&self) -> impl Iterator<Item = &StoredEntity> {
        self.stores.values().flat_map(|store| store.values())
    }

    /// Total number of stored entities.
    pub fn len(&self) -> usize {
        self.stores.values().map(BTreeMap::len).sum()
    }

    /// Returns true if no entities are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl FromIterator<StoredEntity> for StorageView {
    fn from_iter<I: IntoIterator<Item = StoredEntity>>(iter: I) -> Self {
        let mut view = Self::new();
        for entity in iter {
            view.insert(entity);
        }
        view
    }
}

/// Supplies the current storage snapshot on demand.
///
/// Re-invoked on every call that does not receive an explicit view, so a
/// source backed by a changing store always hands out the latest snapshot.
pub trait StorageSource: Send + Sync {
    /// Current snapshot.
    fn snapshot(&self) -> Arc<StorageView>;
}

impl<F> StorageSource for F
where
    F: Fn() -> Arc<StorageView> + Send + Sync,
{
    fn snapshot(&self) -> Arc<StorageView> {
        self()
    }
}
