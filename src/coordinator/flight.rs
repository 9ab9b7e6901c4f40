//! Single-flight markers
//!
//! At most one mutation per (entity, action family) may be pending. A second
//! attempt is rejected, never queued.

use crate::store::EntityKey;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

/// Group of actions sharing one guard.
///
/// Creating and deleting a thanks are one family, so a toggle cannot race
/// its own inverse.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ActionFamily {
    Thanks,
    EditField(String),
    DeleteEntity,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MutationTarget {
    pub entity: EntityKey,
    pub family: ActionFamily,
}

impl MutationTarget {
    pub fn new(entity: EntityKey, family: ActionFamily) -> Self {
        Self { entity, family }
    }
}

/// Observable state of a target between invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutationState {
    Idle,
    Pending,
}

/// Registry of pending markers
#[derive(Debug, Clone, Default)]
pub struct InFlight {
    pending: Arc<Mutex<HashSet<MutationTarget>>>,
}

impl InFlight {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the marker for `target`, or return `None` if it is already set
    pub fn try_acquire(&self, target: MutationTarget) -> Option<FlightTicket> {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if !pending.insert(target.clone()) {
            return None;
        }
        Some(FlightTicket {
            target,
            pending: Arc::clone(&self.pending),
        })
    }

    pub fn state(&self, target: &MutationTarget) -> MutationState {
        let pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        if pending.contains(target) {
            MutationState::Pending
        } else {
            MutationState::Idle
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Held for the lifetime of one mutation; dropping it clears the marker.
#[derive(Debug)]
pub struct FlightTicket {
    target: MutationTarget,
    pending: Arc<Mutex<HashSet<MutationTarget>>>,
}

impl FlightTicket {
    pub fn target(&self) -> &MutationTarget {
        &self.target
    }
}

impl Drop for FlightTicket {
    fn drop(&mut self) {
        let mut pending = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
        pending.remove(&self.target);
    }
}
