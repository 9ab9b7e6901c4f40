//! Optimistic Cache - Client-held comment cache with optimistic mutations
//!
//! Lets a UI apply a change (thank a comment, edit its body, delete it)
//! immediately, then reconciles against the authoritative remote result or
//! rolls the change back.
//!
//! # Architecture
//!
//! - **Store**: normalized `Type:id` → fields table, read synchronously by the UI
//! - **Ids**: negative temporary ids, disjoint from persisted ids
//! - **Patch**: pure list transforms (append, remove by id, replace by identity)
//! - **Coordinator**: single-flight guard per (entity, action family) and the
//!   apply → remote → confirm/rollback lifecycle
//! - **Reconcile**: merges confirmed results, inverts failed patches, evicts
//!   records nothing references anymore
//!
//! # Example
//!
//! ```rust,ignore
//! use optimistic_cache::{CacheConfig, MutationCoordinator, SharedStore, StaticIdentity, TracingNotifier};
//! use std::sync::Arc;
//!
//! let config = CacheConfig::load("cache.toml")?;
//! let coordinator = MutationCoordinator::new(
//!     &config,
//!     SharedStore::default(),
//!     Arc::new(my_graphql_remote),
//!     Arc::new(StaticIdentity::signed_in(user)),
//!     Arc::new(TracingNotifier),
//! );
//!
//! // Store shows the thanks before this resolves
//! let outcome = coordinator.toggle_thanks(42).await;
//! ```

// Error types
pub mod error;

// TOML configuration
pub mod config;

// Tracing subscriber setup
pub mod telemetry;

// Normalized entity store
pub mod store;

// Temporary identifiers
pub mod ids;

// Pure patch functions
pub mod patch;

// Collaborator traits
pub mod traits;

// Confirm / rollback of optimistic patches
pub mod reconcile;

// Single-flight mutation lifecycle
pub mod coordinator;

pub use config::{CacheConfig, LoggingConfig, MutationConfig, SchemaConfig};
pub use coordinator::{
    ActionFamily, CommentView, EditDraft, MutationCoordinator, MutationOutcome, MutationState,
    MutationTarget, RejectReason, ThanksChange,
};
pub use error::{CacheError, Result};
pub use ids::{is_temporary, TempIdGenerator};
pub use reconcile::{ParentLink, Reconciler};
pub use store::{EntityKey, EntityStore, FieldValue, Fields, RelationRecord, SharedStore};
pub use traits::{
    CurrentUser, DeletedId, IdentityProvider, NotifyKind, Notifier, RemoteApi, RemoteEntity,
    StaticIdentity, TracingNotifier, UserDisplay,
};
