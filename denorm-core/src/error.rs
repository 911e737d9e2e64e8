//! Error types for denormalization

use thiserror::Error;

use crate::EntityRef;

/// Why a reference did not resolve in a storage view.
///
/// This is a report, not a failure: callers decide whether a miss is
/// tolerated or escalated.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum NotFound {
    #[error("no sub-store for type {entity_type}")]
    MissingType { entity_type: String },

    #[error("no {entity_type} with id {id}")]
    MissingId { entity_type: String, id: String },
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for denormalization calls.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DenormalizeError {
    #[error("Root entity {reference} not found: {cause}")]
    RootNotFound {
        reference: EntityRef,
        #[source]
        cause: NotFound,
    },

    #[error("Malformed relationship {relationship} on {entity_type}:{id}: {found}")]
    MalformedRelationship {
        entity_type: String,
        id: String,
        relationship: String,
        found: serde_json::Value,
    },

    #[error("No storage view given and no storage source configured")]
    NoStorageSource,

    #[error("Denormalizer lock poisoned")]
    LockPoisoned,

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

impl DenormalizeError {
    /// Returns true if the error only concerns the item being built, so a
    /// collection can drop that member and carry on.
    pub fn is_item_scoped(&self) -> bool {
        matches!(
            self,
            Self::RootNotFound { .. } | Self::MalformedRelationship { .. }
        )
    }

    /// Returns true for [`DenormalizeError::RootNotFound`].
    pub fn is_root_not_found(&self) -> bool {
        matches!(self, Self::RootNotFound { .. })
    }
}

/// Result type alias for denormalization calls.
pub type DenormalizeResult<T> = Result<T, DenormalizeError>;

// =============================================================================
// TESTS
// =============================================================================
