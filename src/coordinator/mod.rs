//! Mutation coordinator
//!
//! Turns one user action into an optimistic lifecycle:
//!
//! 1. take the single-flight marker for (entity, action family), or reject
//! 2. patch the store synchronously, before the first `.await`
//! 3. call the remote
//! 4. reconcile on success, roll back and notify on failure
//! 5. release the marker
//!
//! Futures returned here must be driven to completion: a mutation dropped
//! mid-flight releases its marker but leaves its optimistic patch in place.

mod edit;
mod flight;

pub use edit::EditDraft;
pub use flight::{ActionFamily, FlightTicket, InFlight, MutationState, MutationTarget};

use crate::config::{CacheConfig, SchemaConfig};
use crate::error::CacheError;
use crate::ids::{is_temporary, TempIdGenerator};
use crate::reconcile::{ParentLink, Reconciler};
use crate::store::{EntityKey, RelationRecord, SharedStore};
use crate::traits::{
    CurrentUser, DeletedId, IdentityProvider, NotifyKind, Notifier, RemoteApi, RemoteEntity, UserDisplay,
};
use std::sync::Arc;

/// Why an action was refused without touching the store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RejectReason {
    /// A mutation of the same family is pending on the same entity
    InFlight,
    /// The target entity is no longer in the store
    StaleTarget,
    /// No signed-in user
    Unauthenticated,
    /// The user already holds the record being created
    AlreadyApplied,
    /// The user holds no record to delete
    NothingToRemove,
    /// The draft equals the confirmed value
    Unchanged,
}

/// Result of one user action
#[derive(Debug, Clone, PartialEq)]
pub enum MutationOutcome<T> {
    /// The remote accepted the change and the store holds the authoritative result
    Confirmed(T),
    /// The remote failed; the optimistic patch was inverted
    RolledBack(CacheError),
    /// Nothing was attempted
    Rejected(RejectReason),
}

impl<T> MutationOutcome<T> {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, MutationOutcome::Confirmed(_))
    }

    pub fn is_rolled_back(&self) -> bool {
        matches!(self, MutationOutcome::RolledBack(_))
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, MutationOutcome::Rejected(_))
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> MutationOutcome<U> {
        match self {
            MutationOutcome::Confirmed(value) => MutationOutcome::Confirmed(f(value)),
            MutationOutcome::RolledBack(error) => MutationOutcome::RolledBack(error),
            MutationOutcome::Rejected(reason) => MutationOutcome::Rejected(reason),
        }
    }
}

/// What a thanks toggle ended up doing
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThanksChange {
    Created(RelationRecord),
    Deleted(DeletedId),
}

/// Everything a comment row needs to render
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommentView {
    pub id: i64,
    pub body: String,
    pub author: Option<UserDisplay>,
    pub thanks_count: usize,
    /// The current user holds a thanks on this comment
    pub has_thanked: bool,
    /// The current user wrote this comment
    pub can_edit: bool,
    /// Signed in and not the author
    pub can_thank: bool,
    /// A thanks mutation is pending; the control should be disabled
    pub thanks_busy: bool,
}

fn current_time_ms() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Id held in an author scalar, either `{"id": n, ...}` or a bare number
fn author_id(value: &serde_json::Value) -> Option<i64> {
    match value {
        serde_json::Value::Object(map) => map.get("id").and_then(serde_json::Value::as_i64),
        other => other.as_i64(),
    }
}

pub struct MutationCoordinator {
    store: SharedStore,
    ids: TempIdGenerator,
    in_flight: InFlight,
    reconciler: Reconciler,
    schema: SchemaConfig,
    notify_on_success: bool,
    remote: Arc<dyn RemoteApi>,
    identity: Arc<dyn IdentityProvider>,
    notifier: Arc<dyn Notifier>,
}

impl MutationCoordinator {
    pub fn new(
        config: &CacheConfig,
        store: SharedStore,
        remote: Arc<dyn RemoteApi>,
        identity: Arc<dyn IdentityProvider>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            store,
            ids: TempIdGenerator::starting_at(config.mutations.temp_id_start),
            in_flight: InFlight::new(),
            reconciler: Reconciler::new(config),
            schema: config.schema.clone(),
            notify_on_success: config.mutations.notify_on_success,
            remote,
            identity,
            notifier,
        }
    }

    pub fn store(&self) -> &SharedStore {
        &self.store
    }

    pub fn comment_key(&self, comment_id: i64) -> EntityKey {
        EntityKey::new(self.schema.comment_type.as_str(), comment_id)
    }

    fn user_key(&self, user_id: i64) -> EntityKey {
        EntityKey::new(self.schema.user_type.as_str(), user_id)
    }

    pub fn state(&self, target: &MutationTarget) -> MutationState {
        self.in_flight.state(target)
    }

    pub fn thanks_state(&self, comment_id: i64) -> MutationState {
        self.state(&MutationTarget::new(self.comment_key(comment_id), ActionFamily::Thanks))
    }

    // === Read model ===

    pub fn thanks_count(&self, comment_id: i64) -> usize {
        let key = self.comment_key(comment_id);
        self.store
            .read(|s| s.records(&key, &self.schema.thanks_field).map_or(0, <[_]>::len))
    }

    /// The current user's record on the comment, if any
    fn own_thanks(&self, comment_id: i64, user: &CurrentUser) -> Option<RelationRecord> {
        let key = self.comment_key(comment_id);
        let author = self.user_key(user.id);
        self.store.read(|s| {
            s.records(&key, &self.schema.thanks_field)?
                .iter()
                .find(|r| r.author == author)
                .cloned()
        })
    }

    pub fn has_thanked(&self, comment_id: i64) -> bool {
        match self.identity.current_user() {
            Some(user) => self.own_thanks(comment_id, &user).is_some(),
            None => false,
        }
    }

    pub fn comment_view(&self, comment_id: i64) -> Option<CommentView> {
        let key = self.comment_key(comment_id);
        let user = self.identity.current_user();

        let (body, author_id, thanks) = self.store.read(|s| {
            let fields = s.get(&key)?;
            let body = fields
                .get(&self.schema.body_field)
                .and_then(|v| v.as_scalar())
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let author_id = fields
                .get(&self.schema.author_field)
                .and_then(|v| v.as_scalar())
                .and_then(author_id);
            let thanks = s.records(&key, &self.schema.thanks_field)?.to_vec();
            Some((body, author_id, thanks))
        })?;

        let author = author_id.and_then(|id| self.user_display(id));
        let can_edit = matches!((&user, author_id), (Some(u), Some(a)) if u.id == a);
        let has_thanked = user
            .as_ref()
            .map(|u| {
                let me = self.user_key(u.id);
                thanks.iter().any(|r| r.author == me)
            })
            .unwrap_or(false);

        Some(CommentView {
            id: comment_id,
            body,
            author,
            thanks_count: thanks.len(),
            has_thanked,
            can_edit,
            can_thank: user.is_some() && !can_edit,
            thanks_busy: self.thanks_state(comment_id) == MutationState::Pending,
        })
    }

    fn user_display(&self, user_id: i64) -> Option<UserDisplay> {
        let key = self.user_key(user_id);
        self.store.read(|s| {
            let text = |field: &str| {
                s.scalar(&key, field)
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            };
            Some(UserDisplay {
                id: user_id,
                handle: text("handle")?,
                name: text("name"),
                avatar: text("profileImage"),
            })
        })
    }

    // === Thanks ===

    /// Thank the comment as the current user.
    ///
    /// The store shows a record with a temporary id immediately; on success it
    /// is replaced in place by the confirmed record.
    pub async fn create_thanks(&self, comment_id: i64) -> MutationOutcome<RelationRecord> {
        let Some(user) = self.identity.current_user() else {
            return MutationOutcome::Rejected(RejectReason::Unauthenticated);
        };
        let parent = self.comment_key(comment_id);
        let Some(ticket) = self
            .in_flight
            .try_acquire(MutationTarget::new(parent.clone(), ActionFamily::Thanks))
        else {
            tracing::debug!(%parent, "thanks already pending, create rejected");
            return MutationOutcome::Rejected(RejectReason::InFlight);
        };

        let author = self.user_key(user.id);
        let holds = self.store.read(|s| {
            s.records(&parent, &self.schema.thanks_field)
                .map(|list| list.iter().any(|r| r.author == author))
        });
        match holds {
            None => return self.stale(&parent),
            Some(true) => return MutationOutcome::Rejected(RejectReason::AlreadyApplied),
            Some(false) => {}
        }

        let temp_id = match self.ids.next() {
            Ok(id) => id,
            Err(e) => return self.fail("thank comment", &parent, e),
        };
        let optimistic = RelationRecord::new(
            EntityKey::new(self.schema.record_type.as_str(), temp_id),
            author.clone(),
        )
        .with_created_at(current_time_ms());

        let applied = self.store.write(|s| {
            let applied = self.reconciler.apply_create(s, &parent, &optimistic);
            if applied {
                s.merge_scalars(author.clone(), user.to_scalars());
            }
            applied
        });
        if !applied {
            return self.stale(&parent);
        }
        tracing::debug!(%parent, record = %optimistic.key, "optimistic thanks applied");

        let outcome = match self.remote.create_relation_record(comment_id, user.id).await {
            Ok(confirmed) => {
                let merged = self.store.write(|s| {
                    self.reconciler.confirm_create(s, &parent, &optimistic, &confirmed)
                });
                match merged {
                    Ok(_) => {
                        tracing::debug!(%parent, record = %confirmed.key, "thanks confirmed");
                        self.succeed("Thanks sent");
                        MutationOutcome::Confirmed(confirmed)
                    }
                    Err(e) => {
                        self.store.write(|s| self.reconciler.rollback_create(s, &parent, &optimistic));
                        self.fail("thank comment", &parent, e)
                    }
                }
            }
            Err(e) => {
                self.store.write(|s| self.reconciler.rollback_create(s, &parent, &optimistic));
                self.fail("thank comment", &parent, e)
            }
        };

        drop(ticket);
        outcome
    }

    /// Withdraw the current user's thanks from the comment
    pub async fn delete_thanks(&self, comment_id: i64) -> MutationOutcome<DeletedId> {
        let Some(user) = self.identity.current_user() else {
            return MutationOutcome::Rejected(RejectReason::Unauthenticated);
        };
        let parent = self.comment_key(comment_id);
        let Some(ticket) = self
            .in_flight
            .try_acquire(MutationTarget::new(parent.clone(), ActionFamily::Thanks))
        else {
            tracing::debug!(%parent, "thanks already pending, delete rejected");
            return MutationOutcome::Rejected(RejectReason::InFlight);
        };

        if !self.store.read(|s| s.contains(&parent)) {
            return self.stale(&parent);
        }
        let record_id = match self.own_thanks(comment_id, &user) {
            Some(record) if !is_temporary(record.key.id) => record.key.id,
            _ => return MutationOutcome::Rejected(RejectReason::NothingToRemove),
        };

        let Some(removed) = self
            .store
            .write(|s| self.reconciler.apply_delete(s, &parent, record_id))
        else {
            return self.stale(&parent);
        };
        tracing::debug!(%parent, record = %removed.record.key, "optimistic thanks removal applied");

        let outcome = match self.remote.delete_relation_record(record_id).await {
            Ok(deleted) => {
                self.store
                    .write(|s| self.reconciler.confirm_delete(s, &parent, &removed, deleted));
                tracing::debug!(%parent, record = %removed.record.key, "thanks removal confirmed");
                self.succeed("Thanks removed");
                MutationOutcome::Confirmed(deleted)
            }
            Err(e) => {
                self.store
                    .write(|s| self.reconciler.rollback_delete(s, &parent, &removed));
                self.fail("remove thanks", &parent, e)
            }
        };

        drop(ticket);
        outcome
    }

    /// Create or delete the current user's thanks, whichever flips the state
    pub async fn toggle_thanks(&self, comment_id: i64) -> MutationOutcome<ThanksChange> {
        if self.has_thanked(comment_id) {
            self.delete_thanks(comment_id).await.map(ThanksChange::Deleted)
        } else {
            self.create_thanks(comment_id).await.map(ThanksChange::Created)
        }
    }

    // === Field edits ===

    /// Write a scalar field optimistically and confirm it remotely
    pub async fn update_field(
        &self,
        key: EntityKey,
        field: &str,
        value: serde_json::Value,
    ) -> MutationOutcome<RemoteEntity> {
        let Some(ticket) = self.in_flight.try_acquire(MutationTarget::new(
            key.clone(),
            ActionFamily::EditField(field.to_string()),
        )) else {
            tracing::debug!(%key, field, "edit already pending, rejected");
            return MutationOutcome::Rejected(RejectReason::InFlight);
        };

        let Some(previous) = self
            .store
            .write(|s| self.reconciler.apply_update(s, &key, field, value.clone()))
        else {
            return self.stale(&key);
        };
        tracing::debug!(%key, field, "optimistic edit applied");

        let outcome = match self.remote.update_entity_field(key.id, field, value).await {
            Ok(entity) => {
                self.store
                    .write(|s| self.reconciler.confirm_update(s, &key, &entity));
                tracing::debug!(%key, field, "edit confirmed");
                self.succeed("Changes saved");
                MutationOutcome::Confirmed(entity)
            }
            Err(e) => {
                self.store
                    .write(|s| self.reconciler.rollback_update(s, &key, field, previous));
                self.fail("save changes", &key, e)
            }
        };

        drop(ticket);
        outcome
    }

    /// Start editing a comment body
    pub fn begin_edit(&self, comment_id: i64) -> Option<EditDraft> {
        EditDraft::begin(&self.store, self.comment_key(comment_id), self.schema.body_field.as_str())
    }

    /// Commit a draft. An unchanged draft makes no remote call.
    pub async fn save_draft(&self, draft: EditDraft) -> MutationOutcome<RemoteEntity> {
        if !draft.is_dirty() {
            return MutationOutcome::Rejected(RejectReason::Unchanged);
        }
        let value = serde_json::Value::String(draft.text().to_string());
        self.update_field(draft.key().clone(), draft.field(), value).await
    }

    // === Entity delete ===

    /// Remove an entity (and its slot in `parent`) optimistically
    pub async fn delete_entity(&self, key: EntityKey, parent: Option<ParentLink>) -> MutationOutcome<DeletedId> {
        let Some(ticket) = self
            .in_flight
            .try_acquire(MutationTarget::new(key.clone(), ActionFamily::DeleteEntity))
        else {
            tracing::debug!(%key, "delete already pending, rejected");
            return MutationOutcome::Rejected(RejectReason::InFlight);
        };

        let Some(removed) = self
            .store
            .write(|s| self.reconciler.apply_entity_delete(s, &key, parent.as_ref()))
        else {
            return self.stale(&key);
        };
        tracing::debug!(%key, "optimistic delete applied");

        let outcome = match self.remote.delete_entity(key.id).await {
            Ok(deleted) => {
                self.store
                    .write(|s| self.reconciler.confirm_entity_delete(s, &removed));
                tracing::debug!(%key, "delete confirmed");
                self.succeed("Comment deleted");
                MutationOutcome::Confirmed(deleted)
            }
            Err(e) => {
                self.store
                    .write(|s| self.reconciler.rollback_entity_delete(s, &removed));
                self.fail("delete comment", &key, e)
            }
        };

        drop(ticket);
        outcome
    }

    /// Delete a comment, detaching it from `parent`'s comment list if given
    pub async fn delete_comment(&self, comment_id: i64, parent: Option<EntityKey>) -> MutationOutcome<DeletedId> {
        let link = parent.map(|key| ParentLink::new(key, self.schema.comments_field.as_str()));
        self.delete_entity(self.comment_key(comment_id), link).await
    }

    // === Outcome helpers ===

    fn stale<T>(&self, key: &EntityKey) -> MutationOutcome<T> {
        tracing::warn!(%key, "target no longer in store, action ignored");
        MutationOutcome::Rejected(RejectReason::StaleTarget)
    }

    fn succeed(&self, message: &str) {
        if self.notify_on_success {
            self.notifier.notify(NotifyKind::Info, message);
        }
    }

    fn fail<T>(&self, action: &str, key: &EntityKey, error: CacheError) -> MutationOutcome<T> {
        tracing::warn!(%key, %error, "failed to {}, optimistic change rolled back", action);
        self.notifier
            .notify(NotifyKind::Error, &format!("Could not {}: {}", action, error));
        MutationOutcome::RolledBack(error)
    }
}
