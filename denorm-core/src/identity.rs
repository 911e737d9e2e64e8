//! Identity types for stored entities

use serde::{Deserialize, Serialize};
use std::fmt;

/// Reference to a stored entity by `(type, id)`.
///
/// This is both the shape of a relationship target on the wire
/// (`{"id": "...", "type": "..."}`) and the cache identity of an item.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityRef {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
}

impl EntityRef {
    /// Create a reference from an id and a type name.
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
        }
    }
}

impl fmt::Display for EntityRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity_type, self.id)
    }
}
