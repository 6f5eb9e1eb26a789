//! Per-session turn locks.
//!
//! When several callers share one registry, each session may have at most one
//! append/assemble cycle in flight. A second caller for the same session is
//! turned away instead of queued.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use taconite_core::session::SessionId;
use tokio::sync::OwnedMutexGuard;

/// Held for the duration of one turn. Dropping it releases the session.
pub type TurnGuard = OwnedMutexGuard<()>;

#[derive(Debug, Default)]
pub struct SessionTurns {
    locks: Mutex<HashMap<SessionId, Arc<tokio::sync::Mutex<()>>>>,
}

impl SessionTurns {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock_for(&self, id: &SessionId) -> Arc<tokio::sync::Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(id.clone()).or_default().clone()
    }

    /// Start a turn on `id`, or `None` if one is already running.
    pub fn try_begin(&self, id: &SessionId) -> Option<TurnGuard> {
        self.lock_for(id).try_lock_owned().ok()
    }

    /// Whether a turn is currently running on `id`.
    pub fn is_busy(&self, id: &SessionId) -> bool {
        let locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks
            .get(id)
            .is_some_and(|lock| lock.try_lock().is_err())
    }

    /// Drop the lock entry of a deleted session.
    ///
    /// The entry stays while any guard on it is alive: a turn that claimed the
    /// lock in the meantime keeps excluding later callers.
    pub fn forget(&self, id: &SessionId) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        if locks.get(id).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            locks.remove(id);
        }
    }
}
