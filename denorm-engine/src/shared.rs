//! Thread-safe handle around a [`Denormalizer`].

use std::sync::{Arc, Mutex, MutexGuard};

use denorm_core::{
    DenormalizeError, DenormalizeResult, DenormalizedCollection, DenormalizedEntity,
    DenormalizerConfig, EntityRef, StorageSource, StorageView, TaggedCollection,
};

use crate::cache::CacheStats;
use crate::Denormalizer;

/// Cloneable handle serializing access to one denormalizer.
///
/// Every clone shares the same caches, so identity is preserved across
/// threads.
#[derive(Debug, Clone)]
pub struct SharedDenormalizer {
    inner: Arc<Mutex<Denormalizer>>,
}

impl SharedDenormalizer {
    pub fn new(denormalizer: Denormalizer) -> Self {
        Self {
            inner: Arc::new(Mutex::new(denormalizer)),
        }
    }

    /// Create a shared denormalizer backed by a storage source.
    pub fn with_source(
        config: DenormalizerConfig,
        source: impl StorageSource + 'static,
    ) -> DenormalizeResult<Self> {
        Denormalizer::with_source(config, source).map(Self::new)
    }

    fn lock(&self) -> DenormalizeResult<MutexGuard<'_, Denormalizer>> {
        self.inner
            .lock()
            .map_err(|_| DenormalizeError::LockPoisoned)
    }

    pub fn denormalize_item(
        &self,
        reference: &EntityRef,
    ) -> DenormalizeResult<Arc<DenormalizedEntity>> {
        self.lock()?.denormalize_item(reference)
    }

    pub fn denormalize_item_from(
        &self,
        reference: &EntityRef,
        view: &StorageView,
    ) -> DenormalizeResult<Arc<DenormalizedEntity>> {
        self.lock()?.denormalize_item_from(reference, view)
    }

    pub fn denormalize_collection(
        &self,
        collection: &TaggedCollection,
        view: Option<&StorageView>,
    ) -> DenormalizeResult<Arc<DenormalizedCollection>> {
        self.lock()?.denormalize_collection(collection, view)
    }

    pub fn stats(&self) -> DenormalizeResult<CacheStats> {
        Ok(self.lock()?.stats())
    }

    pub fn clear(&self) -> DenormalizeResult<()> {
        self.lock()?.clear();
        Ok(())
    }
}

impl From<Denormalizer> for SharedDenormalizer {
    fn from(denormalizer: Denormalizer) -> Self {
        Self::new(denormalizer)
    }
}
