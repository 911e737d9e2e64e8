//! DENORM Engine - Cached Denormalization
//!
//! Walks a normalized storage view from a root reference (or the members of
//! a tagged collection) and produces nested outputs. Results are memoized
//! per identity and handed out again as the same `Arc` until something they
//! were built from changes.

pub mod cache;
pub mod collection;
pub mod denormalizer;
pub mod resolver;
pub mod shared;
pub mod walker;

pub use cache::{CacheEntry, CacheManager, CacheStats};
pub use denormalizer::Denormalizer;
pub use resolver::resolve;
pub use shared::SharedDenormalizer;
pub use walker::{Node, RelationshipWalker, Visiting, Walk};

// Re-export the data types so hosts only need one dependency
pub use denorm_core::{
    ConfigError, DenormalizeError, DenormalizeResult, DenormalizedCollection, DenormalizedEntity,
    DenormalizerConfig, EntityRef, Fingerprint, Freshness, MissingPolicy, NotFound, Related,
    Relationship, StorageSource, StorageView, StoredEntity, TaggedCollection,
};
