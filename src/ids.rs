//! Temporary identifiers for records that have not been persisted yet.
//!
//! Persisted ids are non-negative. Temporary ids count down from a negative
//! start and are never reused within a process, so an optimistic record can
//! neither collide with a confirmed one nor with another optimistic record
//! still in flight.

use crate::error::{CacheError, Result};
use std::sync::atomic::{AtomicI64, Ordering};

/// True if `id` lies in the temporary range
pub fn is_temporary(id: i64) -> bool {
    id < 0
}

#[derive(Debug)]
pub struct TempIdGenerator {
    next: AtomicI64,
}

impl TempIdGenerator {
    pub fn new() -> Self {
        Self {
            next: AtomicI64::new(-1),
        }
    }

    /// Generator whose first id is `start`; a non-negative start is clamped to -1
    pub fn starting_at(start: i64) -> Self {
        Self {
            next: AtomicI64::new(start.min(-1)),
        }
    }

    /// Hand out the next temporary id.
    ///
    /// Fails once `i64::MIN` has been issued instead of wrapping into the
    /// persisted range.
    pub fn next(&self) -> Result<i64> {
        let mut current = self.next.load(Ordering::Relaxed);
        loop {
            if current == i64::MAX {
                return Err(CacheError::TempIdsExhausted);
            }
            // i64::MAX marks exhaustion once i64::MIN has been handed out
            let following = current.checked_sub(1).unwrap_or(i64::MAX);
            match self.next.compare_exchange_weak(
                current,
                following,
                Ordering::Relaxed,
                Ordering::Relaxed,
            ) {
                Ok(_) => return Ok(current),
                Err(actual) => current = actual,
            }
        }
    }
}

impl Default for TempIdGenerator {
    fn default() -> Self {
        Self::new()
    }
}
