//! Shared fixtures for integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use optimistic_cache::{
    CacheConfig, CacheError, CurrentUser, DeletedId, EntityKey, FieldValue, Fields,
    MutationCoordinator, NotifyKind, Notifier, RelationRecord, RemoteApi, RemoteEntity,
    Result, SharedStore, StaticIdentity,
};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

pub const COMMENT: i64 = 42;
pub const ME: i64 = 5;
pub const OTHER: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Op {
    CreateRecord,
    DeleteRecord,
    UpdateField,
    DeleteEntity,
}

/// Remote double: hands out server ids from 901, can fail or hold calls
pub struct ScriptedRemote {
    next_id: AtomicI64,
    hold: AtomicBool,
    fail: Mutex<Vec<Op>>,
    calls: Mutex<Vec<Op>>,
    gate: Notify,
    entered: Notify,
    confirmed_id: Mutex<Option<i64>>,
}

impl ScriptedRemote {
    pub fn new() -> Self {
        Self {
            next_id: AtomicI64::new(901),
            hold: AtomicBool::new(false),
            fail: Mutex::new(Vec::new()),
            calls: Mutex::new(Vec::new()),
            gate: Notify::new(),
            entered: Notify::new(),
            confirmed_id: Mutex::new(None),
        }
    }

    /// Every call waits for `release` before answering
    pub fn hold_responses(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    pub fn release(&self) {
        self.gate.notify_one();
    }

    /// Resolves once a call has reached the remote
    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn fail_next(&self, op: Op) {
        self.fail.lock().unwrap().push(op);
    }

    /// Force the id the next create confirms with
    pub fn confirm_with_id(&self, id: i64) {
        *self.confirmed_id.lock().unwrap() = Some(id);
    }

    pub fn calls(&self) -> Vec<Op> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, op: Op) -> usize {
        self.calls().iter().filter(|c| **c == op).count()
    }

    async fn enter(&self, op: Op) -> Result<()> {
        self.calls.lock().unwrap().push(op);
        self.entered.notify_one();
        if self.hold.load(Ordering::SeqCst) {
            self.gate.notified().await;
        }

        let mut fail = self.fail.lock().unwrap();
        if let Some(index) = fail.iter().position(|f| *f == op) {
            fail.remove(index);
            return Err(CacheError::Network("connection reset".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl RemoteApi for ScriptedRemote {
    async fn create_relation_record(&self, _parent_id: i64, author_id: i64) -> Result<RelationRecord> {
        self.enter(Op::CreateRecord).await?;
        let id = self
            .confirmed_id
            .lock()
            .unwrap()
            .take()
            .unwrap_or_else(|| self.next_id.fetch_add(1, Ordering::SeqCst));
        Ok(thanks(id, author_id))
    }

    async fn delete_relation_record(&self, record_id: i64) -> Result<DeletedId> {
        self.enter(Op::DeleteRecord).await?;
        Ok(DeletedId { id: record_id })
    }

    async fn update_entity_field(&self, entity_id: i64, field: &str, value: serde_json::Value) -> Result<RemoteEntity> {
        self.enter(Op::UpdateField).await?;
        let mut fields = BTreeMap::new();
        fields.insert(field.to_string(), value);
        fields.insert("updatedAt".to_string(), json!(1_700_000_000_000u64));
        Ok(RemoteEntity { id: entity_id, fields })
    }

    async fn delete_entity(&self, entity_id: i64) -> Result<DeletedId> {
        self.enter(Op::DeleteEntity).await?;
        Ok(DeletedId { id: entity_id })
    }
}

/// Collects notifications for assertions
#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<(NotifyKind, String)>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<(NotifyKind, String)> {
        self.messages.lock().unwrap().clone()
    }

    pub fn errors(&self) -> usize {
        self.messages().iter().filter(|(k, _)| *k == NotifyKind::Error).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        self.messages.lock().unwrap().push((kind, message.to_string()));
    }
}

pub fn user_key(id: i64) -> EntityKey {
    EntityKey::new("User", id)
}

pub fn comment_key(id: i64) -> EntityKey {
    EntityKey::new("Comment", id)
}

pub fn thanks(id: i64, author: i64) -> RelationRecord {
    RelationRecord::new(EntityKey::new("CommentThanks", id), user_key(author))
}

/// Put a comment written by `author` into the store, with its thanks normalized
pub fn seed_comment(store: &SharedStore, id: i64, author: i64, body: &str, records: Vec<RelationRecord>) {
    store.write(|s| {
        let mut fields = Fields::new();
        fields.insert("id".into(), FieldValue::Scalar(json!(id)));
        fields.insert("body".into(), FieldValue::Scalar(json!(body)));
        fields.insert(
            "author".into(),
            FieldValue::Scalar(json!({"__typename": "User", "id": author})),
        );
        fields.insert("thanks".into(), FieldValue::Records(records.clone()));
        s.set(comment_key(id), fields);

        for record in records {
            s.set(record.key.clone(), record.to_fields());
        }
        s.merge_scalars(
            user_key(author),
            [("handle".to_string(), json!(format!("user{}", author)))],
        );
    });
}

pub fn thanks_of(store: &SharedStore, comment: i64) -> Vec<RelationRecord> {
    store.read(|s| {
        s.records(&comment_key(comment), "thanks")
            .map(<[RelationRecord]>::to_vec)
            .unwrap_or_default()
    })
}

pub fn me() -> CurrentUser {
    CurrentUser::new(ME, "robin").with_name("Robin")
}

pub struct Harness {
    pub coordinator: Arc<MutationCoordinator>,
    pub remote: Arc<ScriptedRemote>,
    pub notifier: Arc<RecordingNotifier>,
    pub store: SharedStore,
}

pub fn harness_with(user: Option<CurrentUser>, config: &CacheConfig) -> Harness {
    let store = SharedStore::default();
    let remote = Arc::new(ScriptedRemote::new());
    let notifier = Arc::new(RecordingNotifier::default());
    let identity = match user {
        Some(user) => StaticIdentity::signed_in(user),
        None => StaticIdentity::anonymous(),
    };

    let coordinator = Arc::new(MutationCoordinator::new(
        config,
        store.clone(),
        remote.clone(),
        Arc::new(identity),
        notifier.clone(),
    ));

    Harness {
        coordinator,
        remote,
        notifier,
        store,
    }
}

pub fn harness() -> Harness {
    harness_with(Some(me()), &CacheConfig::default())
}
