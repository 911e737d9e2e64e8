//! Denormalized output types.
//!
//! Outputs are plain nested data. Relationship slots hold `Arc`s so that an
//! unchanged result can be handed out again as the very same allocation;
//! `Arc::ptr_eq` on two results is the cheap "did anything change" check.

use serde::ser::{SerializeMap, Serializer};
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::{Attributes, EntityRef, Freshness};

/// Contents of one relationship slot in a denormalized entity.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    One(Arc<DenormalizedEntity>),
    Many(Vec<Arc<DenormalizedEntity>>),
    /// Null-filled slot (missing or empty single reference).
    Null,
}

impl Related {
    /// The single entity in this slot, if it holds one.
    pub fn as_one(&self) -> Option<&Arc<DenormalizedEntity>> {
        match self {
            Self::One(entity) => Some(entity),
            _ => None,
        }
    }

    /// The entities in this slot, if it holds a sequence.
    pub fn as_many(&self) -> Option<&[Arc<DenormalizedEntity>]> {
        match self {
            Self::Many(entities) => Some(entities),
            _ => None,
        }
    }

    /// Plain-data rendering of this slot.
    pub fn to_value(&self) -> Value {
        match self {
            Self::One(entity) => entity.to_value(),
            Self::Many(entities) => Value::Array(entities.iter().map(|e| e.to_value()).collect()),
            Self::Null => Value::Null,
        }
    }
}

impl Serialize for Related {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Self::One(entity) => (**entity).serialize(serializer),
            Self::Many(entities) => serializer.collect_seq(entities.iter().map(Arc::as_ref)),
            Self::Null => serializer.serialize_none(),
        }
    }
}

/// A stored entity with its relationships replaced by the targets' own
/// denormalized forms.
///
/// `freshness` is the most recent marker of this entity and everything
/// reachable through it; it is not part of the plain-data rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct DenormalizedEntity {
    pub id: String,
    pub entity_type: String,
    pub attributes: Attributes,
    pub relationships: BTreeMap<String, Related>,
    pub freshness: Freshness,
}

impl DenormalizedEntity {
    /// Reference to the entity this was built from.
    pub fn reference(&self) -> EntityRef {
        EntityRef::new(self.id.clone(), self.entity_type.clone())
    }

    /// Aggregate freshness of this output.
    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    /// A flattened attribute.
    pub fn attribute(&self, key: &str) -> Option<&Value> {
        self.attributes.get(key)
    }

    /// A relationship slot.
    pub fn related(&self, key: &str) -> Option<&Related> {
        self.relationships.get(key)
    }

    /// Attributes that appear in the flattened rendering. `id` and `type`
    /// always come from identity, and a relationship shadows an attribute of
    /// the same name.
    fn visible_attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.attributes.iter().filter(move |(key, _)| {
            key.as_str() != "id"
                && key.as_str() != "type"
                && !self.relationships.contains_key(key.as_str())
        })
    }

    /// Plain-data rendering: `{id, type, ...attributes, ...relationships}`.
    pub fn to_value(&self) -> Value {
        let mut object = Map::new();
        object.insert("id".to_string(), Value::String(self.id.clone()));
        object.insert("type".to_string(), Value::String(self.entity_type.clone()));
        for (key, value) in self.visible_attributes() {
            object.insert(key.clone(), value.clone());
        }
        for (key, related) in &self.relationships {
            object.insert(key.clone(), related.to_value());
        }
        Value::Object(object)
    }
}

impl Serialize for DenormalizedEntity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry("id", &self.id)?;
        map.serialize_entry("type", &self.entity_type)?;
        for (key, value) in self.visible_attributes() {
            map.serialize_entry(key, value)?;
        }
        for (key, related) in &self.relationships {
            map.serialize_entry(key, related)?;
        }
        map.end()
    }
}

/// Ordered denormalized members of a tagged collection.
#[derive(Debug, Clone, PartialEq)]
pub struct DenormalizedCollection {
    pub schema: String,
    pub tag: String,
    pub items: Vec<Arc<DenormalizedEntity>>,
    pub freshness: Freshness,
}

impl DenormalizedCollection {
    /// Aggregate freshness over all members.
    pub fn freshness(&self) -> Freshness {
        self.freshness
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<DenormalizedEntity>> {
        self.items.iter()
    }

    /// Plain-data rendering: an array of member renderings.
    pub fn to_value(&self) -> Value {
        Value::Array(self.items.iter().map(|item| item.to_value()).collect())
    }
}

impl Serialize for DenormalizedCollection {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.items.iter().map(Arc::as_ref))
    }
}
