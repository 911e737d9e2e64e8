//! DENORM Test Utilities
//!
//! Shared test infrastructure for the DENORM workspace:
//! - A monotonic freshness clock standing in for the host's status stamping
//! - Test fixtures for the reference scenario and a mutable shared store
//! - Proptest generators for random, possibly cyclic, entity graphs
//! - Custom assertions for identity and cycle-stub checks

// Re-export core types for convenience
pub use denorm_core::{
    DenormalizeError, DenormalizeResult, DenormalizedCollection, DenormalizedEntity,
    DenormalizerConfig, EntityRef, Freshness, MissingPolicy, Related, Relationship,
    StorageView, StoredEntity, TaggedCollection,
};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

// ============================================================================
// FRESHNESS CLOCK
// ============================================================================

/// Hands out strictly increasing freshness markers.
#[derive(Debug, Default)]
pub struct FreshnessClock {
    last: AtomicU64,
}

impl FreshnessClock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Next marker, newer than every marker handed out before.
    pub fn stamp(&self) -> Freshness {
        Freshness::new(self.last.fetch_add(1, Ordering::SeqCst) + 1)
    }

    /// The most recent marker handed out.
    pub fn current(&self) -> Freshness {
        Freshness::new(self.last.load(Ordering::SeqCst))
    }

    /// Re-stamp an entity in `view`. Returns the new marker, or `None` if the
    /// entity is not stored.
    pub fn touch(&self, view: &mut StorageView, reference: &EntityRef) -> Option<Freshness> {
        let entity = view.get_mut(reference)?;
        let freshness = self.stamp();
        entity.freshness = freshness;
        Some(freshness)
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built stores for common testing scenarios.

    use super::*;
    use serde_json::{json, Value};

    pub const TYPE1: &str = "type1";
    pub const TYPE2: &str = "type2.test";

    pub fn type1(id: &str) -> EntityRef {
        EntityRef::new(id, TYPE1)
    }

    pub fn type2(id: &str) -> EntityRef {
        EntityRef::new(id, TYPE2)
    }

    /// A stored entity whose only attribute is `name`, equal to its id.
    pub fn named(id: &str, entity_type: &str, clock: &FreshnessClock) -> StoredEntity {
        StoredEntity::new(id, entity_type)
            .with_attribute("name", id)
            .with_freshness(clock.stamp())
    }

    /// The reference scenario:
    ///
    /// - `type1Id1` relates to `[type1Id2, type1Id3]` under `type1` and to
    ///   `type2Id1` under `type2.test`
    /// - `type1Id3` relates to `[type1Id2]` under `type1`
    pub fn scenario_storage(clock: &FreshnessClock) -> StorageView {
        [
            named("type1Id1", TYPE1, clock)
                .with_relationship("type1", vec![type1("type1Id2"), type1("type1Id3")])
                .with_relationship("type2.test", type2("type2Id1")),
            named("type1Id2", TYPE1, clock),
            named("type1Id3", TYPE1, clock).with_relationship("type1", vec![type1("type1Id2")]),
            named("type2Id1", TYPE2, clock),
        ]
        .into_iter()
        .collect()
    }

    /// The reference scenario in its wire form.
    pub fn scenario_json() -> Value {
        json!({
            "type1": {
                "type1Id1": {
                    "id": "type1Id1",
                    "type": "type1",
                    "attributes": {"name": "type1Id1"},
                    "relationships": {
                        "type1": {"data": [
                            {"id": "type1Id2", "type": "type1"},
                            {"id": "type1Id3", "type": "type1"},
                        ]},
                        "type2.test": {"data": {"id": "type2Id1", "type": "type2.test"}},
                    },
                    "modified": 1,
                },
                "type1Id2": {
                    "id": "type1Id2",
                    "type": "type1",
                    "attributes": {"name": "type1Id2"},
                    "modified": 2,
                },
                "type1Id3": {
                    "id": "type1Id3",
                    "type": "type1",
                    "attributes": {"name": "type1Id3"},
                    "relationships": {
                        "type1": {"data": [{"id": "type1Id2", "type": "type1"}]},
                    },
                    "modified": 3,
                },
            },
            "type2.test": {
                "type2Id1": {
                    "id": "type2Id1",
                    "type": "type2.test",
                    "attributes": {"name": "type2Id1"},
                    "modified": 4,
                },
            },
        })
    }

    /// Expected plain-data rendering of `type1Id1` in the reference scenario.
    pub fn scenario_expected() -> Value {
        json!({
            "id": "type1Id1",
            "type": "type1",
            "name": "type1Id1",
            "type2.test": {"id": "type2Id1", "type": "type2.test", "name": "type2Id1"},
            "type1": [
                {"id": "type1Id2", "type": "type1", "name": "type1Id2"},
                {
                    "id": "type1Id3",
                    "type": "type1",
                    "name": "type1Id3",
                    "type1": [{"id": "type1Id2", "type": "type1", "name": "type1Id2"}],
                },
            ],
        })
    }

    /// A store that tests mutate between calls while a denormalizer reads
    /// snapshots from it.
    #[derive(Debug, Default)]
    pub struct SharedStore {
        view: RwLock<Arc<StorageView>>,
    }

    impl SharedStore {
        pub fn new(view: StorageView) -> Arc<Self> {
            Arc::new(Self {
                view: RwLock::new(Arc::new(view)),
            })
        }

        /// Current snapshot.
        pub fn snapshot(&self) -> Arc<StorageView> {
            Arc::clone(&self.view.read().unwrap_or_else(PoisonError::into_inner))
        }

        /// Apply a change to a copy of the current snapshot and publish it.
        pub fn update<R>(&self, change: impl FnOnce(&mut StorageView) -> R) -> R {
            let mut guard = self.view.write().unwrap_or_else(PoisonError::into_inner);
            let mut next = StorageView::clone(&guard);
            let result = change(&mut next);
            *guard = Arc::new(next);
            result
        }

        /// A storage source closure reading from this store.
        pub fn source(self: &Arc<Self>) -> impl Fn() -> Arc<StorageView> + Send + Sync + 'static {
            let store = Arc::clone(self);
            move || store.snapshot()
        }
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for random entity graphs.
    //!
    //! Nodes are `node:n0 .. node:n{k-1}`. Relationship targets are drawn from
    //! `0..=k`, so index `k` is a dangling reference and cycles of any length
    //! occur freely.

    use super::*;
    use proptest::prelude::*;

    pub const GRAPH_TYPE: &str = "node";

    /// Reference to the node at `index`.
    pub fn node_ref(index: usize) -> EntityRef {
        EntityRef::new(format!("n{index}"), GRAPH_TYPE)
    }

    fn arb_node(index: usize, nodes: usize) -> impl Strategy<Value = StoredEntity> {
        (
            proptest::option::of(0..=nodes),
            prop::collection::vec(0..=nodes, 0..4),
            0u64..1_000,
            any::<i32>(),
        )
            .prop_map(move |(next, links, freshness, weight)| {
                let mut entity = StoredEntity::new(format!("n{index}"), GRAPH_TYPE)
                    .with_attribute("weight", weight)
                    .with_freshness(Freshness::new(freshness));
                if let Some(target) = next {
                    entity = entity.with_relationship("next", node_ref(target));
                }
                if !links.is_empty() {
                    entity = entity.with_relationship(
                        "links",
                        links.into_iter().map(node_ref).collect::<Vec<_>>(),
                    );
                }
                entity
            })
    }

    /// A random graph of `1..=max_nodes` nodes.
    pub fn arb_graph(max_nodes: usize) -> impl Strategy<Value = StorageView> {
        (1..=max_nodes.max(1)).prop_flat_map(|nodes| {
            (0..nodes)
                .map(|index| arb_node(index, nodes))
                .collect::<Vec<_>>()
                .prop_map(|entities| entities.into_iter().collect::<StorageView>())
        })
    }

    /// A random graph together with the index of one of its nodes.
    pub fn arb_graph_with_node(max_nodes: usize) -> impl Strategy<Value = (StorageView, usize)> {
        arb_graph(max_nodes).prop_flat_map(|view| {
            let nodes = view.len();
            (Just(view), 0..nodes)
        })
    }

    /// Ordered node ids for a collection over a graph of `nodes` nodes.
    pub fn arb_member_ids(nodes: usize) -> impl Strategy<Value = Vec<String>> {
        prop::collection::vec((0..nodes.max(1)).prop_map(|i| format!("n{i}")), 0..6)
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions for identity and nesting checks.

    use super::*;
    use std::collections::HashSet;
    use std::fmt::Debug;

    /// Assert that two results are the same allocation.
    #[track_caller]
    pub fn assert_same<T: Debug>(first: &Arc<T>, second: &Arc<T>) {
        assert!(
            Arc::ptr_eq(first, second),
            "Expected the same Arc, got distinct values: {:?} vs {:?}",
            first,
            second
        );
    }

    /// Assert that two results are distinct allocations.
    #[track_caller]
    pub fn assert_not_same<T: Debug>(first: &Arc<T>, second: &Arc<T>) {
        assert!(
            !Arc::ptr_eq(first, second),
            "Expected a new Arc, got the cached one: {:?}",
            first
        );
    }

    /// Assert that a result is a `RootNotFound` failure.
    #[track_caller]
    pub fn assert_root_not_found<T: Debug>(result: &DenormalizeResult<T>) {
        match result {
            Err(DenormalizeError::RootNotFound { .. }) => {}
            other => panic!("Expected RootNotFound error, got: {:?}", other),
        }
    }

    /// Assert that a result is a `MalformedRelationship` failure.
    #[track_caller]
    pub fn assert_malformed<T: Debug>(result: &DenormalizeResult<T>) {
        match result {
            Err(DenormalizeError::MalformedRelationship { .. }) => {}
            other => panic!("Expected MalformedRelationship error, got: {:?}", other),
        }
    }

    /// Deepest chain of nested entities, counting the root as 1.
    pub fn nesting_depth(entity: &DenormalizedEntity) -> usize {
        1 + entity
            .relationships
            .values()
            .map(|related| match related {
                Related::One(child) => nesting_depth(child),
                Related::Many(children) => children
                    .iter()
                    .map(|child| nesting_depth(child))
                    .max()
                    .unwrap_or(0),
                Related::Null => 0,
            })
            .max()
            .unwrap_or(0)
    }

    /// Assert that an identity repeated on a path is a stub with no
    /// relationships of its own.
    #[track_caller]
    pub fn assert_cycles_stubbed(entity: &DenormalizedEntity) {
        fn visit(entity: &DenormalizedEntity, path: &mut HashSet<EntityRef>) {
            let reference = entity.reference();
            if path.contains(&reference) {
                assert!(
                    entity.relationships.is_empty(),
                    "Repeated {} on a path must be a stub, got relationships {:?}",
                    reference,
                    entity.relationships.keys().collect::<Vec<_>>()
                );
                return;
            }
            path.insert(reference.clone());
            for related in entity.relationships.values() {
                match related {
                    Related::One(child) => visit(child, path),
                    Related::Many(children) => {
                        for child in children {
                            visit(child, path);
                        }
                    }
                    Related::Null => {}
                }
            }
            path.remove(&reference);
        }

        visit(entity, &mut HashSet::new());
    }
}
