//! DENORM Core - Data Types
//!
//! Pure data structures for resolving a normalized entity graph into nested
//! objects. The engine that walks and caches lives in `denorm-engine`; this
//! crate only describes what goes in (storage views, stored entities,
//! relationship declarations, freshness markers) and what comes out.

pub mod collection;
pub mod config;
pub mod denormalized;
pub mod entity;
pub mod error;
pub mod freshness;
pub mod identity;
pub mod storage;

pub use collection::TaggedCollection;
pub use config::{DenormalizerConfig, MissingPolicy};
pub use denormalized::{DenormalizedCollection, DenormalizedEntity, Related};
pub use entity::{Attributes, Relationship, StoredEntity};
pub use error::{ConfigError, DenormalizeError, DenormalizeResult, NotFound};
pub use freshness::{Fingerprint, FingerprintBuilder, Freshness};
pub use identity::EntityRef;
pub use storage::{StorageSource, StorageView, TypeStore};
