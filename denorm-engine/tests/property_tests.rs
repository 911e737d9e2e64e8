//! Property tests over random, possibly cyclic, entity graphs.

use std::collections::{BTreeSet, VecDeque};
use std::sync::Arc;

use denorm_engine::{Denormalizer, EntityRef, Freshness, StorageView, TaggedCollection};
use denorm_test_utils::assertions::{assert_cycles_stubbed, nesting_depth};
use denorm_test_utils::generators::{
    arb_graph, arb_graph_with_node, arb_member_ids, node_ref, GRAPH_TYPE,
};
use proptest::prelude::*;

/// Every entity reachable from `root` through resolvable references.
fn reachable(view: &StorageView, root: &EntityRef) -> BTreeSet<EntityRef> {
    let mut seen = BTreeSet::new();
    let mut queue = VecDeque::from([root.clone()]);
    while let Some(reference) = queue.pop_front() {
        let Some(stored) = view.get(&reference) else {
            continue;
        };
        if !seen.insert(reference) {
            continue;
        }
        for relationship in stored.relationships.values() {
            queue.extend(relationship.targets().cloned());
        }
    }
    seen
}

fn bump(view: &mut StorageView, reference: &EntityRef) {
    let latest = view
        .entities()
        .map(|entity| entity.freshness)
        .max()
        .unwrap_or_default();
    if let Some(entity) = view.get_mut(reference) {
        entity.freshness = Freshness::new(latest.value() + 1);
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn prop_unchanged_view_returns_same_arc((view, index) in arb_graph_with_node(8)) {
        let mut denormalizer = Denormalizer::default();
        let root = node_ref(index);

        let first = denormalizer.denormalize_item_from(&root, &view).unwrap();
        let second = denormalizer.denormalize_item_from(&root, &view).unwrap();

        prop_assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn prop_cycles_terminate_with_stubs((view, index) in arb_graph_with_node(8)) {
        let mut denormalizer = Denormalizer::default();
        let result = denormalizer.denormalize_item_from(&node_ref(index), &view).unwrap();

        assert_cycles_stubbed(&result);
        // A path holds each node at most once, plus one closing stub.
        prop_assert!(nesting_depth(&result) <= view.len() + 1);
    }

    #[test]
    fn prop_change_propagates_to_dependents(
        (view, root) in arb_graph_with_node(8),
        changed in 0usize..8,
    ) {
        let changed = node_ref(changed % view.len());
        let root = node_ref(root);
        let mut denormalizer = Denormalizer::default();

        let before = denormalizer.denormalize_item_from(&root, &view).unwrap();
        let mut next = view.clone();
        bump(&mut next, &changed);
        let after = denormalizer.denormalize_item_from(&root, &next).unwrap();

        prop_assert_eq!(before.to_value(), after.to_value());
        if reachable(&view, &root).contains(&changed) {
            prop_assert!(!Arc::ptr_eq(&before, &after));
            prop_assert!(after.freshness() >= next.get(&changed).unwrap().freshness);
        } else {
            prop_assert!(Arc::ptr_eq(&before, &after));
        }
    }

    #[test]
    fn prop_collection_order_is_identity(
        (view, ids) in arb_graph(6).prop_flat_map(|view| {
            let nodes = view.len();
            (Just(view), arb_member_ids(nodes))
        }),
    ) {
        let mut denormalizer = Denormalizer::default();
        let reversed: Vec<String> = ids.iter().rev().cloned().collect();
        let forward = TaggedCollection::new(GRAPH_TYPE, "", ids.clone());
        let backward = TaggedCollection::new(GRAPH_TYPE, "", reversed.clone());

        let first = denormalizer.denormalize_collection(&forward, Some(&view)).unwrap();
        let second = denormalizer.denormalize_collection(&backward, Some(&view)).unwrap();

        prop_assert_eq!(first.len(), ids.len());
        if ids != reversed {
            prop_assert!(!Arc::ptr_eq(&first, &second));
        } else {
            prop_assert!(Arc::ptr_eq(&first, &second));
        }
    }
}
