//! Tagged collections of entity ids.

use serde::{Deserialize, Serialize};

use crate::EntityRef;

/// An ordered id sequence annotated with the type it is drawn from
/// (`schema`) and the logical grouping it represents (`tag`).
///
/// The whole value, including id order, is the collection cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaggedCollection {
    pub schema: String,
    #[serde(default)]
    pub tag: String,
    pub ids: Vec<String>,
}

impl TaggedCollection {
    pub fn new<I, S>(schema: impl Into<String>, tag: impl Into<String>, ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            schema: schema.into(),
            tag: tag.into(),
            ids: ids.into_iter().map(Into::into).collect(),
        }
    }

    /// Member references, in order.
    pub fn references(&self) -> impl Iterator<Item = EntityRef> + '_ {
        self.ids
            .iter()
            .map(move |id| EntityRef::new(id.clone(), self.schema.clone()))
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}
