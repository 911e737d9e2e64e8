//! Stored (normalized) entities and their relationship declarations.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

use crate::{EntityRef, Freshness};

/// Flattened attribute map of an entity.
pub type Attributes = Map<String, Value>;

/// A relationship declaration, classified once when the snapshot is read.
///
/// On the wire a relationship is `{"data": <ref>}`, `{"data": [<ref>, ...]}`
/// or `{"data": null}`. Anything else is kept as [`Relationship::Malformed`]
/// so that a single bad entity does not make the whole snapshot unreadable.
#[derive(Debug, Clone, PartialEq)]
pub enum Relationship {
    /// A single reference.
    Single(EntityRef),
    /// An ordered sequence of references.
    Many(Vec<EntityRef>),
    /// Declared, but with no target.
    Empty,
    /// Neither a reference nor a sequence of references.
    Malformed(Value),
}

impl Relationship {
    /// Classify a raw relationship value.
    pub fn from_value(value: Value) -> Self {
        match Self::classify(&value) {
            Some(relationship) => relationship,
            None => Self::Malformed(value),
        }
    }

    fn classify(value: &Value) -> Option<Self> {
        let data = value.as_object()?.get("data")?;
        match data {
            Value::Null => Some(Self::Empty),
            Value::Object(_) => EntityRef::deserialize(data).ok().map(Self::Single),
            Value::Array(items) => items
                .iter()
                .map(|item| EntityRef::deserialize(item).ok())
                .collect::<Option<Vec<_>>>()
                .map(Self::Many),
            _ => None,
        }
    }

    /// Wire representation of this relationship.
    pub fn to_value(&self) -> Value {
        match self {
            Self::Single(reference) => json!({ "data": reference }),
            Self::Many(references) => json!({ "data": references }),
            Self::Empty => json!({ "data": null }),
            Self::Malformed(raw) => raw.clone(),
        }
    }

    /// Returns true if this relationship could not be classified.
    pub fn is_malformed(&self) -> bool {
        matches!(self, Self::Malformed(_))
    }

    /// Iterate the references this relationship points at.
    pub fn targets(&self) -> impl Iterator<Item = &EntityRef> {
        let slice: &[EntityRef] = match self {
            Self::Single(reference) => std::slice::from_ref(reference),
            Self::Many(references) => references,
            Self::Empty | Self::Malformed(_) => &[],
        };
        slice.iter()
    }
}

impl From<EntityRef> for Relationship {
    fn from(reference: EntityRef) -> Self {
        Self::Single(reference)
    }
}

impl From<Vec<EntityRef>> for Relationship {
    fn from(references: Vec<EntityRef>) -> Self {
        Self::Many(references)
    }
}

impl Serialize for Relationship {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_value().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Relationship {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Value::deserialize(deserializer).map(Self::from_value)
    }
}

/// An entity as it sits in normalized storage.
///
/// The engine only ever reads these. `freshness` is written by the
/// status-stamping collaborator under the well-known `modified` field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredEntity {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub relationships: BTreeMap<String, Relationship>,
    #[serde(rename = "modified", default)]
    pub freshness: Freshness,
}

impl StoredEntity {
    /// Create an entity with no attributes or relationships.
    pub fn new(id: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            entity_type: entity_type.into(),
            attributes: Attributes::new(),
            relationships: BTreeMap::new(),
            freshness: Freshness::zero(),
        }
    }

    /// Reference to this entity.
    pub fn reference(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.entity_type.clone())
    }

    /// Set an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Declare a relationship.
    pub fn with_relationship(
        mut self,
        key: impl Into<String>,
        relationship: impl Into<Relationship>,
    ) -> Self {
        self.relationships.insert(key.into(), relationship.into());
        self
    }

    /// Set the freshness marker.
    pub fn with_freshness(mut self, freshness: Freshness) -> Self {
        self.freshness = freshness;
        self
    }
}
