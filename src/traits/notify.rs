//! User-visible notifications

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyKind {
    Info,
    Error,
}

impl fmt::Display for NotifyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotifyKind::Info => write!(f, "info"),
            NotifyKind::Error => write!(f, "error"),
        }
    }
}

/// Fire-and-forget notification surface (toasts, banners).
///
/// Implementations must not block; the cache never waits on a notification.
pub trait Notifier: Send + Sync {
    fn notify(&self, kind: NotifyKind, message: &str);
}

/// Notifier that only logs
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, kind: NotifyKind, message: &str) {
        match kind {
            NotifyKind::Info => tracing::info!(target: "optimistic_cache::notify", "{}", message),
            NotifyKind::Error => tracing::error!(target: "optimistic_cache::notify", "{}", message),
        }
    }
}
