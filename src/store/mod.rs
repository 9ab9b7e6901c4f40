//! Normalized entity store
//!
//! A keyed table of entity field-sets that every UI surface reads from.
//! Writes are synchronous and visible to the next read; there is no
//! buffering layer between a patch and the data it patches.

mod shared;

pub use shared::SharedStore;

use crate::patch::Identified;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Identity of an entity: type tag plus numeric id.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct EntityKey {
    pub typename: String,
    pub id: i64,
}

impl EntityKey {
    pub fn new(typename: impl Into<String>, id: i64) -> Self {
        Self {
            typename: typename.into(),
            id,
        }
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.typename, self.id)
    }
}

/// A list-member entity representing a fact between two entities,
/// e.g. "user X thanked comment Y".
///
/// Records are only ever replaced whole, never patched field by field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelationRecord {
    pub key: EntityKey,
    /// Weak reference to the acting user; a lookup key only.
    pub author: EntityKey,
    /// Milliseconds since epoch
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<u64>,
}

impl RelationRecord {
    pub fn new(key: EntityKey, author: EntityKey) -> Self {
        Self {
            key,
            author,
            created_at: None,
        }
    }

    pub fn with_created_at(mut self, created_at: u64) -> Self {
        self.created_at = Some(created_at);
        self
    }

    /// Field-set stored under the record's own key when normalized
    pub fn to_fields(&self) -> Fields {
        let mut fields = Fields::new();
        fields.insert("id".to_string(), FieldValue::Scalar(self.key.id.into()));
        fields.insert(
            "author".to_string(),
            FieldValue::Scalar(serde_json::json!({
                "__typename": self.author.typename,
                "id": self.author.id,
            })),
        );
        if let Some(created_at) = self.created_at {
            fields.insert("createdAt".to_string(), FieldValue::Scalar(created_at.into()));
        }
        fields
    }
}

impl Identified for RelationRecord {
    fn id(&self) -> i64 {
        self.key.id
    }
}

/// Value of a single entity field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "lowercase")]
pub enum FieldValue {
    Scalar(serde_json::Value),
    Records(Vec<RelationRecord>),
}

impl FieldValue {
    pub fn as_scalar(&self) -> Option<&serde_json::Value> {
        match self {
            FieldValue::Scalar(value) => Some(value),
            FieldValue::Records(_) => None,
        }
    }

    pub fn as_records(&self) -> Option<&[RelationRecord]> {
        match self {
            FieldValue::Records(records) => Some(records.as_slice()),
            FieldValue::Scalar(_) => None,
        }
    }
}

/// Field name to value mapping of one entity
pub type Fields = BTreeMap<String, FieldValue>;

/// Keyed table of entity field-sets
#[derive(Debug, Default, Clone)]
pub struct EntityStore {
    entities: HashMap<EntityKey, Fields>,
    /// Entities taken out by a pending delete. Invisible to reads, but still
    /// patched by confirmations and rollbacks of other pending mutations.
    detached: HashMap<EntityKey, Fields>,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &EntityKey) -> Option<&Fields> {
        self.entities.get(key)
    }

    pub fn contains(&self, key: &EntityKey) -> bool {
        self.entities.contains_key(key)
    }

    /// Replace the whole field-set of an entity
    pub fn set(&mut self, key: EntityKey, fields: Fields) {
        self.entities.insert(key, fields);
    }

    /// Remove an entity. Returns false (and does nothing) if it was absent.
    pub fn evict(&mut self, key: &EntityKey) -> bool {
        let evicted = self.entities.remove(key).is_some();
        if evicted {
            tracing::trace!(%key, "evicted entity");
        }
        evicted
    }

    /// Replace `fields[field]` with `updater(current)` in one step.
    ///
    /// Returns false without calling the updater when the entity is absent;
    /// a patch against an evicted entity is a no-op, not a failure.
    pub fn modify<F>(&mut self, key: &EntityKey, field: &str, updater: F) -> bool
    where
        F: FnOnce(Option<&FieldValue>) -> FieldValue,
    {
        match self.entities.get_mut(key) {
            Some(fields) => {
                let next = updater(fields.get(field));
                fields.insert(field.to_string(), next);
                true
            }
            None => false,
        }
    }

    /// Remove a single field. Returns false if the entity is absent.
    pub fn clear_field(&mut self, key: &EntityKey, field: &str) -> bool {
        match self.entities.get_mut(key) {
            Some(fields) => {
                fields.remove(field);
                true
            }
            None => false,
        }
    }

    /// Merge scalar values into an entity, creating it when absent
    pub fn merge_scalars<I>(&mut self, key: EntityKey, values: I)
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        let fields = self.entities.entry(key).or_default();
        for (name, value) in values {
            fields.insert(name, FieldValue::Scalar(value));
        }
    }

    pub fn scalar(&self, key: &EntityKey, field: &str) -> Option<&serde_json::Value> {
        self.get(key)?.get(field)?.as_scalar()
    }

    /// Records of a relation list. A missing or non-list field reads as an
    /// empty list; `None` means the entity itself is absent.
    pub fn records(&self, key: &EntityKey, field: &str) -> Option<&[RelationRecord]> {
        let fields = self.get(key)?;
        Some(fields.get(field).and_then(FieldValue::as_records).unwrap_or(&[]))
    }

    // === Detached entities ===

    /// Move an entity out of view until [`reattach`](Self::reattach) or
    /// [`discard_detached`](Self::discard_detached). Returns false if absent.
    pub fn detach(&mut self, key: &EntityKey) -> bool {
        match self.entities.remove(key) {
            Some(fields) => {
                self.detached.insert(key.clone(), fields);
                tracing::trace!(%key, "detached entity");
                true
            }
            None => false,
        }
    }

    /// Bring a detached entity back. A live entity written under the same key
    /// in the meantime wins and the detached copy is dropped.
    pub fn reattach(&mut self, key: &EntityKey) -> bool {
        let Some(fields) = self.detached.remove(key) else {
            return false;
        };
        if self.entities.contains_key(key) {
            tracing::debug!(%key, "entity rewritten while detached, keeping live copy");
            return false;
        }
        self.entities.insert(key.clone(), fields);
        true
    }

    pub fn discard_detached(&mut self, key: &EntityKey) -> Option<Fields> {
        self.detached.remove(key)
    }

    pub fn detached(&self, key: &EntityKey) -> Option<&Fields> {
        self.detached.get(key)
    }

    fn settled_mut(&mut self, key: &EntityKey) -> Option<&mut Fields> {
        match self.entities.get_mut(key) {
            Some(fields) => Some(fields),
            None => self.detached.get_mut(key),
        }
    }

    /// Like [`modify`](Self::modify), but also reaches a detached entity
    pub fn modify_settled<F>(&mut self, key: &EntityKey, field: &str, updater: F) -> bool
    where
        F: FnOnce(Option<&FieldValue>) -> FieldValue,
    {
        match self.settled_mut(key) {
            Some(fields) => {
                let next = updater(fields.get(field));
                fields.insert(field.to_string(), next);
                true
            }
            None => false,
        }
    }

    pub fn clear_field_settled(&mut self, key: &EntityKey, field: &str) -> bool {
        match self.settled_mut(key) {
            Some(fields) => {
                fields.remove(field);
                true
            }
            None => false,
        }
    }

    /// Merge scalars into a live or detached entity; absent entities are skipped
    pub fn merge_settled<I>(&mut self, key: &EntityKey, values: I) -> bool
    where
        I: IntoIterator<Item = (String, serde_json::Value)>,
    {
        match self.settled_mut(key) {
            Some(fields) => {
                for (name, value) in values {
                    fields.insert(name, FieldValue::Scalar(value));
                }
                true
            }
            None => false,
        }
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }
}
