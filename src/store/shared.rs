//! Clone-able handle to one entity store

use super::EntityStore;
use std::sync::{Arc, PoisonError, RwLock};

/// Shared handle to a single [`EntityStore`].
///
/// Reads and writes go through closures so a guard can never be held across
/// an `.await`. A poisoned lock is recovered: the store holds plain data and
/// every write is a whole-field replacement.
#[derive(Debug, Clone, Default)]
pub struct SharedStore {
    inner: Arc<RwLock<EntityStore>>,
}

impl SharedStore {
    pub fn new(store: EntityStore) -> Self {
        Self {
            inner: Arc::new(RwLock::new(store)),
        }
    }

    pub fn read<R>(&self, f: impl FnOnce(&EntityStore) -> R) -> R {
        let guard = self.inner.read().unwrap_or_else(PoisonError::into_inner);
        f(&guard)
    }

    pub fn write<R>(&self, f: impl FnOnce(&mut EntityStore) -> R) -> R {
        let mut guard = self.inner.write().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Copy of the current table, for inspection and tests
    pub fn snapshot(&self) -> EntityStore {
        self.read(EntityStore::clone)
    }
}
