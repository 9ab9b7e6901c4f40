//! Collaborator traits
//!
//! The cache reaches the transport, the identity provider, and the
//! notification surface only through these traits.

mod identity;
mod notify;
mod remote;

pub use identity::{CurrentUser, IdentityProvider, StaticIdentity, UserDisplay};
pub use notify::{NotifyKind, Notifier, TracingNotifier};
pub use remote::{DeletedId, RemoteApi, RemoteEntity};
