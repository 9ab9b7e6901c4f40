//! Uncommitted edit drafts
//!
//! A draft lives beside the store, not in it. Typing never touches the cache
//! and cancelling never talks to the remote.

use crate::store::{EntityKey, SharedStore};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EditDraft {
    key: EntityKey,
    field: String,
    confirmed: String,
    text: String,
}

impl EditDraft {
    /// Start editing `field` of `key` from its current value.
    /// Returns `None` if the entity is not in the store.
    pub fn begin(store: &SharedStore, key: EntityKey, field: impl Into<String>) -> Option<Self> {
        let field = field.into();
        let confirmed = store.read(|s| {
            s.get(&key).map(|_| {
                s.scalar(&key, &field)
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string()
            })
        })?;

        Some(Self {
            key,
            field,
            text: confirmed.clone(),
            confirmed,
        })
    }

    pub fn key(&self) -> &EntityKey {
        &self.key
    }

    pub fn field(&self) -> &str {
        &self.field
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Last value the draft started from
    pub fn confirmed(&self) -> &str {
        &self.confirmed
    }

    pub fn set_text(&mut self, text: impl Into<String>) {
        self.text = text.into();
    }

    pub fn is_dirty(&self) -> bool {
        self.text != self.confirmed
    }

    /// Discard edits and return to the confirmed value
    pub fn cancel(&mut self) -> &str {
        self.text = self.confirmed.clone();
        &self.text
    }
}
