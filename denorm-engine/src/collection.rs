//! Collection denormalizer.
//!
//! Each member id of a tagged collection goes through the item path, so
//! members share identity with direct item calls. The assembled list is then
//! cached as a unit under the full collection key, id order included.

use std::sync::Arc;

use denorm_core::{
    DenormalizeResult, DenormalizedCollection, DenormalizerConfig, FingerprintBuilder,
    StorageView, TaggedCollection,
};
use tracing::warn;

use crate::cache::CacheManager;

/// Denormalize every member of `collection`, in order.
///
/// A member that does not resolve, or whose build fails, is left out of the
/// result; the other members are unaffected.
pub fn denormalize_collection(
    cache: &mut CacheManager,
    collection: &TaggedCollection,
    view: &StorageView,
    config: &DenormalizerConfig,
) -> DenormalizeResult<Arc<DenormalizedCollection>> {
    let mut fingerprint = FingerprintBuilder::collection(&collection.schema, &collection.tag);
    let mut items = Vec::with_capacity(collection.len());

    for reference in collection.references() {
        match cache.item(&reference, view, config) {
            Ok(entry) => {
                fingerprint.child(&entry.built);
                items.push(entry.result);
            }
            Err(err) if err.is_item_scoped() => {
                cache.record_failed_member();
                if err.is_root_not_found() {
                    fingerprint.missing(&reference);
                } else {
                    fingerprint.failed(&reference);
                }
                warn!(
                    schema = %collection.schema,
                    tag = %collection.tag,
                    member = %reference.id,
                    error = %err,
                    "collection member skipped"
                );
            }
            Err(err) => return Err(err),
        }
    }

    Ok(cache.settle_collection(collection, fingerprint.finish(), items))
}

#[cfg(test)]
mod tests {
    use super::*;
    use denorm_core::{EntityRef, Freshness, Relationship, StoredEntity};
    use serde_json::json;

    fn view() -> StorageView {
        [
            StoredEntity::new("a", "t")
                .with_attribute("name", "a")
                .with_freshness(Freshness::new(1)),
            StoredEntity::new("b", "t")
                .with_attribute("name", "b")
                .with_freshness(Freshness::new(4)),
            StoredEntity::new("bad", "t")
                .with_relationship("oops", Relationship::Malformed(json!([1, 2])))
                .with_freshness(Freshness::new(2)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_members_in_order() {
        let mut cache = CacheManager::new();
        let collection = TaggedCollection::new("t", "", ["b", "a"]);

        let result =
            denormalize_collection(&mut cache, &collection, &view(), &DenormalizerConfig::default())
                .unwrap();

        assert_eq!(
            result.to_value(),
            json!([
                {"id": "b", "type": "t", "name": "b"},
                {"id": "a", "type": "t", "name": "a"},
            ])
        );
        assert_eq!(result.freshness, Freshness::new(4));
        assert_eq!(result.schema, "t");
    }

    #[test]
    fn test_members_share_item_identity() {
        let config = DenormalizerConfig::default();
        let mut cache = CacheManager::new();
        let view = view();

        let item = cache.get_or_build(&EntityRef::new("a", "t"), &view, &config).unwrap();
        let collection = TaggedCollection::new("t", "", ["a"]);
        let result = denormalize_collection(&mut cache, &collection, &view, &config).unwrap();

        assert!(Arc::ptr_eq(&item, &result.items[0]));
    }

    #[test]
    fn test_failed_and_missing_members_skipped() {
        let mut cache = CacheManager::new();
        let collection = TaggedCollection::new("t", "", ["a", "ghost", "bad", "b"]);

        let result =
            denormalize_collection(&mut cache, &collection, &view(), &DenormalizerConfig::default())
                .unwrap();

        let ids: Vec<_> = result.iter().map(|e| e.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b"]);
        assert_eq!(cache.stats().failed_members, 2);
    }

    #[test]
    fn test_empty_collection() {
        let mut cache = CacheManager::new();
        let collection = TaggedCollection::new("t", "none", Vec::<String>::new());

        let result =
            denormalize_collection(&mut cache, &collection, &view(), &DenormalizerConfig::default())
                .unwrap();

        assert!(result.is_empty());
        assert_eq!(result.freshness, Freshness::zero());
    }
}
