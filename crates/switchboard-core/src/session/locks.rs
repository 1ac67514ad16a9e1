//! Per-user operation serialization.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::{Mutex, OwnedMutexGuard};

use switchboard_types::user::UserId;

/// One async mutex per user.
///
/// Operations on different users never contend. The `Arc` is cloned out of
/// the map before awaiting so no `DashMap` guard is held across `.await`.
/// An entry is dropped again once its last holder and waiter are gone.
#[derive(Debug, Default)]
pub struct UserLocks {
    locks: DashMap<UserId, Arc<Mutex<()>>>,
}

impl UserLocks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wait for exclusive access to a user's session state.
    pub async fn lock(&self, user_id: &UserId) -> UserGuard<'_> {
        let mutex = self
            .locks
            .entry(user_id.clone())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone();
        let guard = mutex.lock_owned().await;
        UserGuard {
            locks: self,
            user_id: user_id.clone(),
            guard: Some(guard),
        }
    }

    /// Number of users with a held or awaited lock.
    pub fn len(&self) -> usize {
        self.locks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.locks.is_empty()
    }
}

/// Exclusive access to one user. Releasing the last reference prunes the
/// user's entry.
#[derive(Debug)]
pub struct UserGuard<'a> {
    locks: &'a UserLocks,
    user_id: UserId,
    guard: Option<OwnedMutexGuard<()>>,
}

impl Drop for UserGuard<'_> {
    fn drop(&mut self) {
        drop(self.guard.take());
        // Clones are taken under the shard lock, so a count of 1 means only
        // the map still refers to this mutex.
        self.locks
            .locks
            .remove_if(&self.user_id, |_, mutex| Arc::strong_count(mutex) == 1);
    }
}
