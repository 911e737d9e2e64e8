//! Cache manager: identity-preserving memoization of denormalized outputs.
//!
//! Entries are keyed by identity (`(type, id)` for items, the whole tagged
//! collection for collections) and store the [`Fingerprint`] the result was
//! built from. Every call still walks the graph, because freshness depends
//! on everything transitively reachable; the cache only decides whether the
//! freshly walked result is handed out or the previously stored `Arc` is.
//!
//! Stale entries are replaced, never deleted, so the cache is bounded by
//! the number of distinct identities and collections seen.

use std::collections::HashMap;
use std::sync::Arc;

use denorm_core::{
    DenormalizeError, DenormalizeResult, DenormalizedCollection, DenormalizedEntity,
    DenormalizerConfig, EntityRef, Fingerprint, StorageView, TaggedCollection,
};
use tracing::debug;

use crate::resolver::resolve;
use crate::walker::{Node, RelationshipWalker, Visiting};

/// Statistics about cache usage and non-fatal conditions.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Item calls that returned the stored result.
    pub item_hits: u64,
    /// Item calls that stored a new result.
    pub item_misses: u64,
    /// Collection calls that returned the stored result.
    pub collection_hits: u64,
    /// Collection calls that stored a new result.
    pub collection_misses: u64,
    /// Number of item entries currently held.
    pub item_entries: u64,
    /// Number of collection entries currently held.
    pub collection_entries: u64,
    /// Nested references that did not resolve.
    pub missing_references: u64,
    /// Cycle stubs emitted.
    pub cycles_short_circuited: u64,
    /// Stubs emitted because of the configured depth limit.
    pub depth_limited: u64,
    /// Nested subtrees handed out again within the walk that built them.
    pub subtrees_reused: u64,
    /// Collection members dropped because their build failed or their root
    /// did not resolve.
    pub failed_members: u64,
}

impl CacheStats {
    /// Calculate the hit rate over items and collections (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let hits = self.item_hits + self.collection_hits;
        let total = hits + self.item_misses + self.collection_misses;
        if total == 0 {
            0.0
        } else {
            hits as f64 / total as f64
        }
    }
}

/// A stored result and the fingerprint it was built from.
#[derive(Debug, Clone)]
pub struct CacheEntry<T> {
    pub built: Fingerprint,
    pub result: Arc<T>,
}

/// Item and collection caches owned by one denormalizer.
#[derive(Debug, Default)]
pub struct CacheManager {
    items: HashMap<EntityRef, CacheEntry<DenormalizedEntity>>,
    collections: HashMap<TaggedCollection, CacheEntry<DenormalizedCollection>>,
    stats: CacheStats,
}

impl CacheManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// Denormalize a root reference, reusing the stored result when nothing
    /// it was built from has changed.
    ///
    /// Fails with [`DenormalizeError::RootNotFound`] if the reference itself
    /// does not resolve.
    pub fn get_or_build(
        &mut self,
        reference: &EntityRef,
        view: &StorageView,
        config: &DenormalizerConfig,
    ) -> DenormalizeResult<Arc<DenormalizedEntity>> {
        self.item(reference, view, config).map(|entry| entry.result)
    }

    /// Item path returning the fingerprint alongside the result.
    pub(crate) fn item(
        &mut self,
        reference: &EntityRef,
        view: &StorageView,
        config: &DenormalizerConfig,
    ) -> DenormalizeResult<CacheEntry<DenormalizedEntity>> {
        let stored = resolve(reference, view).map_err(|cause| DenormalizeError::RootNotFound {
            reference: reference.clone(),
            cause,
        })?;

        let mut visiting = Visiting::new();
        let node = RelationshipWalker::new(config, &mut self.stats).build(
            stored,
            view,
            &mut visiting,
            0,
        )?;
        Ok(self.settle_item(reference, node))
    }

    fn settle_item(&mut self, reference: &EntityRef, node: Node) -> CacheEntry<DenormalizedEntity> {
        if let Some(entry) = self.items.get(reference) {
            if entry.built == node.fingerprint {
                self.stats.item_hits += 1;
                debug!(%reference, fingerprint = %entry.built, "item cache hit");
                return entry.clone();
            }
        }

        self.stats.item_misses += 1;
        debug!(%reference, fingerprint = %node.fingerprint, "item cache miss");
        let entry = CacheEntry {
            built: node.fingerprint,
            result: node.entity,
        };
        self.items.insert(reference.clone(), entry.clone());
        entry
    }

    /// Return the stored collection if it was built from the same
    /// fingerprint, otherwise store and return the freshly built one.
    pub fn settle_collection(
        &mut self,
        collection: &TaggedCollection,
        fingerprint: Fingerprint,
        items: Vec<Arc<DenormalizedEntity>>,
    ) -> Arc<DenormalizedCollection> {
        if let Some(entry) = self.collections.get(collection) {
            if entry.built == fingerprint {
                self.stats.collection_hits += 1;
                debug!(
                    schema = %collection.schema,
                    tag = %collection.tag,
                    fingerprint = %fingerprint,
                    "collection cache hit"
                );
                return Arc::clone(&entry.result);
            }
        }

        self.stats.collection_misses += 1;
        debug!(
            schema = %collection.schema,
            tag = %collection.tag,
            fingerprint = %fingerprint,
            "collection cache miss"
        );
        let result = Arc::new(DenormalizedCollection {
            schema: collection.schema.clone(),
            tag: collection.tag.clone(),
            items,
            freshness: fingerprint.latest(),
        });
        self.collections.insert(
            collection.clone(),
            CacheEntry {
                built: fingerprint,
                result: Arc::clone(&result),
            },
        );
        result
    }

    /// Record a collection member that was dropped.
    pub(crate) fn record_failed_member(&mut self) {
        self.stats.failed_members += 1;
    }

    /// The stored item entry, if any.
    pub fn cached_item(&self, reference: &EntityRef) -> Option<&CacheEntry<DenormalizedEntity>> {
        self.items.get(reference)
    }

    /// The stored collection entry, if any.
    pub fn cached_collection(
        &self,
        collection: &TaggedCollection,
    ) -> Option<&CacheEntry<DenormalizedCollection>> {
        self.collections.get(collection)
    }

    /// Current statistics.
    pub fn stats(&self) -> CacheStats {
        CacheStats {
            item_entries: self.items.len() as u64,
            collection_entries: self.collections.len() as u64,
            ..self.stats.clone()
        }
    }

    /// Drop every entry. Counters are kept.
    pub fn clear(&mut self) {
        self.items.clear();
        self.collections.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denorm_core::{Freshness, NotFound, StoredEntity};

    fn view(b_freshness: u64) -> StorageView {
        [
            StoredEntity::new("a", "t")
                .with_attribute("name", "a")
                .with_relationship("next", EntityRef::new("b", "t"))
                .with_freshness(Freshness::new(1)),
            StoredEntity::new("b", "t")
                .with_attribute("name", "b")
                .with_freshness(Freshness::new(b_freshness)),
            StoredEntity::new("lone", "t").with_freshness(Freshness::new(1)),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_cache_stats_hit_rate() {
        let stats = CacheStats {
            item_hits: 60,
            collection_hits: 20,
            item_misses: 15,
            collection_misses: 5,
            ..Default::default()
        };
        assert!((stats.hit_rate() - 0.8).abs() < 0.001);

        let empty_stats = CacheStats::default();
        assert!((empty_stats.hit_rate() - 0.0).abs() < 0.001);
    }

    #[test]
    fn test_repeated_build_returns_same_arc() {
        let config = DenormalizerConfig::default();
        let mut cache = CacheManager::new();
        let view = view(2);
        let a = EntityRef::new("a", "t");

        let first = cache.get_or_build(&a, &view, &config).unwrap();
        let second = cache.get_or_build(&a, &view, &config).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        let stats = cache.stats();
        assert_eq!(stats.item_misses, 1);
        assert_eq!(stats.item_hits, 1);
        assert_eq!(stats.item_entries, 1);
    }

    #[test]
    fn test_descendant_change_replaces_entry() {
        let config = DenormalizerConfig::default();
        let mut cache = CacheManager::new();
        let a = EntityRef::new("a", "t");

        let first = cache.get_or_build(&a, &view(2), &config).unwrap();
        let second = cache.get_or_build(&a, &view(3), &config).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(first.to_value(), second.to_value());
        assert_eq!(second.freshness, Freshness::new(3));
        assert!(Arc::ptr_eq(&cache.cached_item(&a).unwrap().result, &second));
    }

    #[test]
    fn test_unrelated_entity_keeps_identity() {
        let config = DenormalizerConfig::default();
        let mut cache = CacheManager::new();
        let lone = EntityRef::new("lone", "t");

        let first = cache.get_or_build(&lone, &view(2), &config).unwrap();
        let second = cache.get_or_build(&lone, &view(3), &config).unwrap();

        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn test_root_not_found() {
        let config = DenormalizerConfig::default();
        let mut cache = CacheManager::new();

        let err = cache
            .get_or_build(&EntityRef::new("ghost", "t"), &view(2), &config)
            .unwrap_err();
        assert!(matches!(
            err,
            DenormalizeError::RootNotFound {
                cause: NotFound::MissingId { .. },
                ..
            }
        ));
        assert_eq!(cache.stats().item_entries, 0);
    }

    #[test]
    fn test_clear_forgets_entries() {
        let config = DenormalizerConfig::default();
        let mut cache = CacheManager::new();
        let view = view(2);
        let a = EntityRef::new("a", "t");

        let first = cache.get_or_build(&a, &view, &config).unwrap();
        cache.clear();
        let second = cache.get_or_build(&a, &view, &config).unwrap();

        assert!(!Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().item_misses, 2);
    }

    #[test]
    fn test_settle_collection_identity() {
        let mut cache = CacheManager::new();
        let collection = TaggedCollection::new("t", "", ["a"]);
        let fingerprint = denorm_core::FingerprintBuilder::collection("t", "").finish();

        let first = cache.settle_collection(&collection, fingerprint, Vec::new());
        let second = cache.settle_collection(&collection, fingerprint, Vec::new());

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(cache.stats().collection_hits, 1);
        assert!(cache.cached_collection(&collection).is_some());
    }
}
