//! Per-user serialization for check-then-act sequences.
//!
//! Failure counting and session-cap enforcement are lost-update races when
//! two logins for the same user interleave. A keyed mutex map serializes
//! them per user while leaving different users fully concurrent.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use uuid::Uuid;

/// Map of per-user async mutexes. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct UserLocks {
    locks: Arc<DashMap<Uuid, Arc<Mutex<()>>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lock for one user, creating it on first use. The guard
    /// is owned so it can be held across awaits.
    pub async fn acquire(&self, user_id: Uuid) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .clone();
        lock.lock_owned().await
    }
}
