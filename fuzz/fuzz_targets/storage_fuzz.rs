//! Fuzz test for denormalizing arbitrary storage snapshots
//!
//! Parses the input as a storage view and denormalizes every stored entity
//! twice, looking for panics, non-termination on cyclic graphs and broken
//! identity on unchanged input.
//!
//! Run with: cargo +nightly fuzz run storage_fuzz -- -max_total_time=60

#![no_main]

use std::sync::Arc;

use denorm_core::{DenormalizeError, StorageView, TaggedCollection};
use denorm_engine::Denormalizer;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(view) = serde_json::from_slice::<StorageView>(data) else {
        return;
    };
    let mut denormalizer = Denormalizer::default();

    for entity in view.entities() {
        let reference = entity.reference();
        match denormalizer.denormalize_item_from(&reference, &view) {
            Ok(first) => {
                let second = denormalizer
                    .denormalize_item_from(&reference, &view)
                    .expect("second build of an unchanged view must succeed");
                assert!(Arc::ptr_eq(&first, &second), "unchanged view must hit the cache");
            }
            // The map key decides lookups, so an entity whose own id or type
            // disagrees with its key is legitimately unreachable.
            Err(DenormalizeError::RootNotFound { .. }) => {}
            Err(DenormalizeError::MalformedRelationship { .. }) => {}
            Err(other) => panic!("unexpected error: {other}"),
        }
    }

    for entity_type in view.types() {
        let ids: Vec<String> = view
            .type_store(entity_type)
            .map(|store| store.keys().cloned().collect())
            .unwrap_or_default();
        let collection = TaggedCollection::new(entity_type, "fuzz", ids);
        denormalizer
            .denormalize_collection(&collection, Some(&view))
            .expect("collections skip failing members");
    }
});
