//! The denormalizer: one engine instance owning its caches.

use std::fmt;
use std::sync::Arc;

use denorm_core::{
    DenormalizeError, DenormalizeResult, DenormalizedCollection, DenormalizedEntity,
    DenormalizerConfig, EntityRef, StorageSource, StorageView, TaggedCollection,
};

use crate::cache::{CacheManager, CacheStats};
use crate::collection;

/// Resolves normalized references into nested, cached outputs.
///
/// Cache entries live as long as the instance. Calls are synchronous and
/// take `&mut self`; see [`crate::SharedDenormalizer`] for use across
/// threads.
///
/// # Example
///
/// ```ignore
/// let mut denormalizer = Denormalizer::default();
/// let first = denormalizer.denormalize_item_from(&reference, &view)?;
/// let again = denormalizer.denormalize_item_from(&reference, &view)?;
/// assert!(Arc::ptr_eq(&first, &again));
/// ```
pub struct Denormalizer {
    config: DenormalizerConfig,
    cache: CacheManager,
    source: Option<Box<dyn StorageSource>>,
}

impl Denormalizer {
    /// Create a denormalizer that is always handed an explicit view.
    pub fn new(config: DenormalizerConfig) -> DenormalizeResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            cache: CacheManager::new(),
            source: None,
        })
    }

    /// Create a denormalizer that reads from `source` whenever a call does
    /// not supply a view.
    pub fn with_source(
        config: DenormalizerConfig,
        source: impl StorageSource + 'static,
    ) -> DenormalizeResult<Self> {
        let mut denormalizer = Self::new(config)?;
        denormalizer.source = Some(Box::new(source));
        Ok(denormalizer)
    }

    /// Get the configuration.
    pub fn config(&self) -> &DenormalizerConfig {
        &self.config
    }

    /// Returns true if a storage source is configured.
    pub fn has_source(&self) -> bool {
        self.source.is_some()
    }

    fn snapshot(&self) -> DenormalizeResult<Arc<StorageView>> {
        self.source
            .as_ref()
            .map(|source| source.snapshot())
            .ok_or(DenormalizeError::NoStorageSource)
    }

    /// Denormalize a root reference from the configured source's current
    /// snapshot.
    pub fn denormalize_item(
        &mut self,
        reference: &EntityRef,
    ) -> DenormalizeResult<Arc<DenormalizedEntity>> {
        let view = self.snapshot()?;
        self.denormalize_item_from(reference, &view)
    }

    /// Denormalize a root reference from an explicit view.
    ///
    /// Repeated calls return the same `Arc` until something reachable from
    /// the root changes freshness.
    pub fn denormalize_item_from(
        &mut self,
        reference: &EntityRef,
        view: &StorageView,
    ) -> DenormalizeResult<Arc<DenormalizedEntity>> {
        self.cache.get_or_build(reference, view, &self.config)
    }

    /// Denormalize a tagged collection from `view`, or from the configured
    /// source when no view is given.
    pub fn denormalize_collection(
        &mut self,
        collection: &TaggedCollection,
        view: Option<&StorageView>,
    ) -> DenormalizeResult<Arc<DenormalizedCollection>> {
        let snapshot;
        let view = match view {
            Some(view) => view,
            None => {
                snapshot = self.snapshot()?;
                snapshot.as_ref()
            }
        };
        collection::denormalize_collection(&mut self.cache, collection, view, &self.config)
    }

    /// Cache statistics.
    pub fn stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Cache manager, for inspecting stored entries.
    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Drop every cache entry.
    pub fn clear(&mut self) {
        self.cache.clear();
    }
}

impl Default for Denormalizer {
    fn default() -> Self {
        Self {
            config: DenormalizerConfig::default(),
            cache: CacheManager::new(),
            source: None,
        }
    }
}

impl fmt::Debug for Denormalizer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Denormalizer")
            .field("config", &self.config)
            .field("cache", &self.cache.stats())
            .field("has_source", &self.has_source())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use denorm_core::{Freshness, StoredEntity};
    use std::sync::RwLock;

    fn view(freshness: u64) -> StorageView {
        [StoredEntity::new("a", "t")
            .with_attribute("name", "a")
            .with_freshness(Freshness::new(freshness))]
        .into_iter()
        .collect()
    }

    #[test]
    fn test_invalid_config_rejected() {
        let err = Denormalizer::new(DenormalizerConfig::new().with_max_depth(0)).unwrap_err();
        assert!(matches!(err, DenormalizeError::Config(_)));
    }

    #[test]
    fn test_no_source() {
        let mut denormalizer = Denormalizer::default();
        assert!(!denormalizer.has_source());
        assert_eq!(
            denormalizer.denormalize_item(&EntityRef::new("a", "t")).unwrap_err(),
            DenormalizeError::NoStorageSource
        );
        assert_eq!(
            denormalizer
                .denormalize_collection(&TaggedCollection::new("t", "", ["a"]), None)
                .unwrap_err(),
            DenormalizeError::NoStorageSource
        );
    }

    #[test]
    fn test_source_is_reinvoked_per_call() {
        let store = Arc::new(RwLock::new(Arc::new(view(1))));
        let handle = Arc::clone(&store);
        let source = move || Arc::clone(&handle.read().unwrap());

        let mut denormalizer =
            Denormalizer::with_source(DenormalizerConfig::default(), source).unwrap();
        let a = EntityRef::new("a", "t");

        let first = denormalizer.denormalize_item(&a).unwrap();
        let cached = denormalizer.denormalize_item(&a).unwrap();
        assert!(Arc::ptr_eq(&first, &cached));

        *store.write().unwrap() = Arc::new(view(2));
        let refreshed = denormalizer.denormalize_item(&a).unwrap();
        assert!(!Arc::ptr_eq(&first, &refreshed));
        assert_eq!(refreshed.freshness, Freshness::new(2));
    }

    #[test]
    fn test_explicit_view_overrides_source() {
        let mut denormalizer =
            Denormalizer::with_source(DenormalizerConfig::default(), || Arc::new(view(1)))
                .unwrap();
        let collection = TaggedCollection::new("t", "", ["a"]);

        let from_source = denormalizer.denormalize_collection(&collection, None).unwrap();
        let from_view = denormalizer
            .denormalize_collection(&collection, Some(&view(5)))
            .unwrap();

        assert_eq!(from_source.freshness, Freshness::new(1));
        assert_eq!(from_view.freshness, Freshness::new(5));
    }

    #[test]
    fn test_debug_does_not_require_source_debug() {
        let denormalizer =
            Denormalizer::with_source(DenormalizerConfig::default(), || Arc::new(view(1)))
                .unwrap();
        assert!(format!("{:?}", denormalizer).contains("has_source: true"));
    }
}
