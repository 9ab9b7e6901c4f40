//! Reconciliation of optimistic state
//!
//! Each optimistic patch has three steps here: `apply_*` writes it before the
//! remote call, `confirm_*` merges the authoritative result, and `rollback_*`
//! inverts it. All steps treat an evicted target as a no-op.
//!
//! An entity removed by a pending delete is detached rather than evicted.
//! `confirm_*` and `rollback_*` of other flights still patch it, so a failed
//! delete restores the entity with every other flight's resolution applied.

use crate::config::CacheConfig;
use crate::error::{CacheError, Result};
use crate::ids::is_temporary;
use crate::patch;
use crate::store::{EntityKey, EntityStore, FieldValue, RelationRecord};
use crate::traits::{DeletedId, RemoteEntity};
use serde::{Deserialize, Serialize};

/// Relation list on a parent entity that holds a child
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParentLink {
    pub key: EntityKey,
    pub field: String,
}

impl ParentLink {
    pub fn new(key: EntityKey, field: impl Into<String>) -> Self {
        Self {
            key,
            field: field.into(),
        }
    }
}

/// A record taken out of a relation list, with the slot it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedRecord {
    pub record: RelationRecord,
    pub index: usize,
}

/// An entity detached from the store, with the parent slot it came from
#[derive(Debug, Clone, PartialEq)]
pub struct RemovedEntity {
    pub key: EntityKey,
    pub slot: Option<(ParentLink, RemovedRecord)>,
}

/// Read the records of `field`, transform them, write them back.
/// Returns false when `key` is not in the store.
fn patch_records<F>(store: &mut EntityStore, key: &EntityKey, field: &str, f: F) -> bool
where
    F: FnOnce(&[RelationRecord]) -> Vec<RelationRecord>,
{
    store.modify(key, field, |current| {
        let list = current.and_then(FieldValue::as_records).unwrap_or(&[]);
        FieldValue::Records(f(list))
    })
}

/// [`patch_records`] that also reaches an entity detached by a pending delete
fn settle_records<F>(store: &mut EntityStore, key: &EntityKey, field: &str, f: F) -> bool
where
    F: FnOnce(&[RelationRecord]) -> Vec<RelationRecord>,
{
    store.modify_settled(key, field, |current| {
        let list = current.and_then(FieldValue::as_records).unwrap_or(&[]);
        FieldValue::Records(f(list))
    })
}

#[derive(Debug, Clone)]
pub struct Reconciler {
    thanks_field: String,
    evict_on_delete: bool,
}

impl Reconciler {
    pub fn new(config: &CacheConfig) -> Self {
        Self {
            thanks_field: config.schema.thanks_field.clone(),
            evict_on_delete: config.mutations.evict_on_delete,
        }
    }

    pub fn thanks_field(&self) -> &str {
        &self.thanks_field
    }

    // === Relation create ===

    /// Append the optimistic record and normalize it under its temporary key
    pub fn apply_create(&self, store: &mut EntityStore, parent: &EntityKey, record: &RelationRecord) -> bool {
        let applied = patch_records(store, parent, &self.thanks_field, |list| {
            patch::append(list, record.clone())
        });
        if applied {
            store.set(record.key.clone(), record.to_fields());
        }
        applied
    }

    /// Swap the optimistic record for the confirmed one.
    ///
    /// The placeholder is found by logical identity (same author on the same
    /// parent) because its id differs from the confirmed id. A detached
    /// parent is patched too. Returns `Ok(false)` when the parent is gone.
    pub fn confirm_create(
        &self,
        store: &mut EntityStore,
        parent: &EntityKey,
        optimistic: &RelationRecord,
        confirmed: &RelationRecord,
    ) -> Result<bool> {
        if is_temporary(confirmed.key.id) {
            return Err(CacheError::ReservedServerId(confirmed.key.id));
        }

        if optimistic.key != confirmed.key {
            store.evict(&optimistic.key);
        }

        let applied = settle_records(store, parent, &self.thanks_field, |list| {
            patch::replace_matching(
                list,
                |r| r.key == optimistic.key || r.author == confirmed.author,
                confirmed.clone(),
            )
        });

        if applied {
            store.set(confirmed.key.clone(), confirmed.to_fields());
        } else {
            tracing::debug!(%parent, record = %confirmed.key, "parent evicted before create confirmed");
        }
        Ok(applied)
    }

    /// Remove the optimistic record and its normalized entity
    pub fn rollback_create(&self, store: &mut EntityStore, parent: &EntityKey, optimistic: &RelationRecord) {
        let id = optimistic.key.id;
        settle_records(store, parent, &self.thanks_field, |list| patch::remove_by_id(list, id));
        store.evict(&optimistic.key);
    }

    // === Relation delete ===

    /// Take the record out of the parent's list, remembering its slot.
    /// Returns `None` when the parent or the record is absent.
    pub fn apply_delete(&self, store: &mut EntityStore, parent: &EntityKey, record_id: i64) -> Option<RemovedRecord> {
        let list = store.records(parent, &self.thanks_field)?;
        let index = patch::position_of(list, record_id)?;
        let record = list[index].clone();

        patch_records(store, parent, &self.thanks_field, |list| patch::remove_by_id(list, record_id));
        Some(RemovedRecord { record, index })
    }

    /// Make sure the record is gone and evict its entity
    pub fn confirm_delete(&self, store: &mut EntityStore, parent: &EntityKey, removed: &RemovedRecord, deleted: DeletedId) {
        settle_records(store, parent, &self.thanks_field, |list| patch::remove_by_id(list, deleted.id));
        if self.evict_on_delete {
            store.evict(&removed.record.key);
        }
    }

    /// Put the record back at its original position
    pub fn rollback_delete(&self, store: &mut EntityStore, parent: &EntityKey, removed: &RemovedRecord) {
        let restored = settle_records(store, parent, &self.thanks_field, |list| {
            patch::insert_at(list, removed.index, removed.record.clone())
        });
        if restored {
            store.set(removed.record.key.clone(), removed.record.to_fields());
        }
    }

    // === Scalar field update ===

    /// Write `value` into `field`, returning the previous value.
    /// Returns `None` when the entity is absent.
    pub fn apply_update(
        &self,
        store: &mut EntityStore,
        key: &EntityKey,
        field: &str,
        value: serde_json::Value,
    ) -> Option<Option<FieldValue>> {
        let previous = store.get(key)?.get(field).cloned();
        store.modify(key, field, |_| FieldValue::Scalar(value));
        Some(previous)
    }

    pub fn confirm_update(&self, store: &mut EntityStore, key: &EntityKey, entity: &RemoteEntity) -> bool {
        store.merge_settled(key, entity.fields.clone())
    }

    pub fn rollback_update(&self, store: &mut EntityStore, key: &EntityKey, field: &str, previous: Option<FieldValue>) {
        match previous {
            Some(value) => {
                store.modify_settled(key, field, |_| value);
            }
            None => {
                store.clear_field_settled(key, field);
            }
        }
    }

    // === Entity delete ===

    /// Take the entity out of its parent list and detach it
    pub fn apply_entity_delete(
        &self,
        store: &mut EntityStore,
        key: &EntityKey,
        parent: Option<&ParentLink>,
    ) -> Option<RemovedEntity> {
        if !store.contains(key) {
            return None;
        }

        let slot = parent.and_then(|link| {
            let list = store.records(&link.key, &link.field)?;
            let index = patch::position_of(list, key.id)?;
            let record = list[index].clone();
            patch_records(store, &link.key, &link.field, |list| patch::remove_by_id(list, key.id));
            Some((link.clone(), RemovedRecord { record, index }))
        });

        store.detach(key);
        Some(RemovedEntity { key: key.clone(), slot })
    }

    /// Drop the detached entity and evict the records it owned
    pub fn confirm_entity_delete(&self, store: &mut EntityStore, removed: &RemovedEntity) {
        if let Some((link, slot)) = &removed.slot {
            let id = slot.record.key.id;
            patch_records(store, &link.key, &link.field, |list| patch::remove_by_id(list, id));
        }
        store.evict(&removed.key);
        let fields = store.discard_detached(&removed.key).unwrap_or_default();

        if self.evict_on_delete {
            let owned = fields
                .get(&self.thanks_field)
                .and_then(FieldValue::as_records)
                .unwrap_or(&[]);
            for record in owned {
                store.evict(&record.key);
            }
        }
    }

    /// Reattach the entity and restore its slot in the parent list.
    ///
    /// The reattached fields already carry whatever other flights resolved
    /// while it was detached; records still pending keep their temporary id
    /// until their own flight resolves.
    pub fn rollback_entity_delete(&self, store: &mut EntityStore, removed: &RemovedEntity) {
        store.reattach(&removed.key);

        if let Some((link, slot)) = &removed.slot {
            patch_records(store, &link.key, &link.field, |list| {
                patch::insert_at(list, slot.index, slot.record.clone())
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Fields;
    use serde_json::json;

    fn comment() -> EntityKey {
        EntityKey::new("Comment", 42)
    }

    fn thanks(id: i64, author: i64) -> RelationRecord {
        RelationRecord::new(EntityKey::new("CommentThanks", id), EntityKey::new("User", author))
    }

    fn store_with(records: Vec<RelationRecord>) -> EntityStore {
        let mut store = EntityStore::new();
        let mut fields = Fields::new();
        fields.insert("body".into(), FieldValue::Scalar(json!("hello")));
        fields.insert("thanks".into(), FieldValue::Records(records.clone()));
        store.set(comment(), fields);
        for record in records {
            store.set(record.key.clone(), record.to_fields());
        }
        store
    }

    fn reconciler() -> Reconciler {
        Reconciler::new(&CacheConfig::default())
    }

    fn thanks_of(store: &EntityStore) -> Vec<RelationRecord> {
        store.records(&comment(), "thanks").unwrap().to_vec()
    }

    #[test]
    fn test_create_confirm_replaces_placeholder() {
        let r = reconciler();
        let mut store = store_with(vec![thanks(7, 1)]);

        let optimistic = thanks(-1, 5);
        assert!(r.apply_create(&mut store, &comment(), &optimistic));
        assert!(store.contains(&optimistic.key));

        let confirmed = thanks(901, 5);
        assert!(r.confirm_create(&mut store, &comment(), &optimistic, &confirmed).unwrap());

        assert_eq!(thanks_of(&store), vec![thanks(7, 1), thanks(901, 5)]);
        assert!(!store.contains(&optimistic.key));
        assert!(store.contains(&confirmed.key));
    }

    #[test]
    fn test_create_confirm_rejects_temporary_server_id() {
        let r = reconciler();
        let mut store = store_with(vec![]);
        let optimistic = thanks(-1, 5);
        r.apply_create(&mut store, &comment(), &optimistic);

        let err = r
            .confirm_create(&mut store, &comment(), &optimistic, &thanks(-9, 5))
            .unwrap_err();
        assert_eq!(err, CacheError::ReservedServerId(-9));
    }

    #[test]
    fn test_create_rollback_restores_list() {
        let r = reconciler();
        let before = vec![thanks(7, 1), thanks(8, 2)];
        let mut store = store_with(before.clone());

        let optimistic = thanks(-1, 5);
        r.apply_create(&mut store, &comment(), &optimistic);
        r.rollback_create(&mut store, &comment(), &optimistic);

        assert_eq!(thanks_of(&store), before);
        assert!(!store.contains(&optimistic.key));
    }

    #[test]
    fn test_delete_rollback_restores_order() {
        let r = reconciler();
        let before = vec![thanks(7, 1), thanks(901, 5), thanks(8, 2)];
        let mut store = store_with(before.clone());

        let removed = r.apply_delete(&mut store, &comment(), 901).unwrap();
        assert_eq!(removed.index, 1);
        assert_eq!(thanks_of(&store), vec![thanks(7, 1), thanks(8, 2)]);

        r.rollback_delete(&mut store, &comment(), &removed);
        assert_eq!(thanks_of(&store), before);
    }

    #[test]
    fn test_delete_confirm_evicts_record() {
        let r = reconciler();
        let mut store = store_with(vec![thanks(901, 5)]);

        let removed = r.apply_delete(&mut store, &comment(), 901).unwrap();
        r.confirm_delete(&mut store, &comment(), &removed, DeletedId { id: 901 });

        assert!(thanks_of(&store).is_empty());
        assert!(!store.contains(&EntityKey::new("CommentThanks", 901)));
    }

    #[test]
    fn test_stale_parent_is_noop() {
        let r = reconciler();
        let mut store = EntityStore::new();
        let optimistic = thanks(-1, 5);

        assert!(!r.apply_create(&mut store, &comment(), &optimistic));
        assert!(r.apply_delete(&mut store, &comment(), 901).is_none());
        assert!(!r
            .confirm_create(&mut store, &comment(), &optimistic, &thanks(901, 5))
            .unwrap());
        assert!(store.is_empty());
    }

    #[test]
    fn test_update_rollback_restores_previous() {
        let r = reconciler();
        let mut store = store_with(vec![]);

        let previous = r
            .apply_update(&mut store, &comment(), "body", json!("hello world"))
            .unwrap();
        assert_eq!(store.scalar(&comment(), "body"), Some(&json!("hello world")));

        r.rollback_update(&mut store, &comment(), "body", previous);
        assert_eq!(store.scalar(&comment(), "body"), Some(&json!("hello")));
    }

    #[test]
    fn test_entity_delete_rollback_restores_slot() {
        let r = reconciler();
        let mut store = store_with(vec![thanks(901, 5), thanks(-4, 6)]);

        let post = EntityKey::new("Post", 1);
        let siblings = vec![
            RelationRecord::new(EntityKey::new("Comment", 41), EntityKey::new("User", 2)),
            RelationRecord::new(comment(), EntityKey::new("User", 3)),
        ];
        let mut post_fields = Fields::new();
        post_fields.insert("comments".into(), FieldValue::Records(siblings.clone()));
        store.set(post.clone(), post_fields);

        let link = ParentLink::new(post.clone(), "comments");
        let removed = r.apply_entity_delete(&mut store, &comment(), Some(&link)).unwrap();
        assert!(!store.contains(&comment()));
        assert_eq!(store.records(&post, "comments").unwrap(), &siblings[..1]);

        r.rollback_entity_delete(&mut store, &removed);
        assert_eq!(store.records(&post, "comments").unwrap(), &siblings[..]);
        // The pending placeholder stays until its own flight resolves
        assert_eq!(thanks_of(&store), vec![thanks(901, 5), thanks(-4, 6)]);
        assert!(store.detached(&comment()).is_none());
    }

    #[test]
    fn test_update_rollback_while_detached_survives_restore() {
        let r = reconciler();
        let mut store = store_with(vec![]);

        let previous = r
            .apply_update(&mut store, &comment(), "body", json!("hello world"))
            .unwrap();
        let removed = r.apply_entity_delete(&mut store, &comment(), None).unwrap();

        r.rollback_update(&mut store, &comment(), "body", previous);
        r.rollback_entity_delete(&mut store, &removed);

        assert_eq!(store.scalar(&comment(), "body"), Some(&json!("hello")));
    }

    #[test]
    fn test_update_confirm_while_detached_survives_restore() {
        let r = reconciler();
        let mut store = store_with(vec![]);

        r.apply_update(&mut store, &comment(), "body", json!("hello world"));
        let removed = r.apply_entity_delete(&mut store, &comment(), None).unwrap();

        let mut server = std::collections::BTreeMap::new();
        server.insert("body".to_string(), json!("hello world"));
        server.insert("edited".to_string(), json!(true));
        assert!(r.confirm_update(&mut store, &comment(), &RemoteEntity { id: 42, fields: server }));
        r.rollback_entity_delete(&mut store, &removed);

        assert_eq!(store.scalar(&comment(), "body"), Some(&json!("hello world")));
        assert_eq!(store.scalar(&comment(), "edited"), Some(&json!(true)));
    }

    #[test]
    fn test_create_confirm_while_detached_survives_restore() {
        let r = reconciler();
        let mut store = store_with(vec![thanks(7, 1)]);

        let optimistic = thanks(-1, 5);
        r.apply_create(&mut store, &comment(), &optimistic);
        let removed = r.apply_entity_delete(&mut store, &comment(), None).unwrap();

        assert!(r
            .confirm_create(&mut store, &comment(), &optimistic, &thanks(901, 5))
            .unwrap());
        r.rollback_entity_delete(&mut store, &removed);

        assert_eq!(thanks_of(&store), vec![thanks(7, 1), thanks(901, 5)]);
        assert!(store.contains(&EntityKey::new("CommentThanks", 901)));
    }

    #[test]
    fn test_create_rollback_while_detached_survives_restore() {
        let r = reconciler();
        let mut store = store_with(vec![thanks(7, 1)]);

        let optimistic = thanks(-1, 5);
        r.apply_create(&mut store, &comment(), &optimistic);
        let removed = r.apply_entity_delete(&mut store, &comment(), None).unwrap();

        r.rollback_create(&mut store, &comment(), &optimistic);
        r.rollback_entity_delete(&mut store, &removed);

        assert_eq!(thanks_of(&store), vec![thanks(7, 1)]);
    }

    #[test]
    fn test_delete_rollback_while_detached_survives_restore() {
        let r = reconciler();
        let before = vec![thanks(7, 1), thanks(901, 5)];
        let mut store = store_with(before.clone());

        let removed_record = r.apply_delete(&mut store, &comment(), 901).unwrap();
        let removed = r.apply_entity_delete(&mut store, &comment(), None).unwrap();

        r.rollback_delete(&mut store, &comment(), &removed_record);
        r.rollback_entity_delete(&mut store, &removed);

        assert_eq!(thanks_of(&store), before);
    }

    #[test]
    fn test_entity_delete_confirm_evicts_owned_records() {
        let r = reconciler();
        let mut store = store_with(vec![thanks(901, 5)]);

        let removed = r.apply_entity_delete(&mut store, &comment(), None).unwrap();
        r.confirm_entity_delete(&mut store, &removed);

        assert!(store.is_empty());
    }
}
