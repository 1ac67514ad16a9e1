//! Registry of in-flight handshakes.
//!
//! A `PendingVerification` lives between `start_verification` and
//! `submit_verification`. Entries are single-use: `complete` removes the
//! entry whether or not it has expired. A background sweeper tears down
//! entries nobody came back for.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use switchboard_types::session::{ApiCredentials, mask_phone};
use switchboard_types::user::UserId;

use crate::remote::BoxRemoteSession;

/// A remote session that has begun but not finished the handshake.
#[derive(Debug, Clone)]
pub struct PendingVerification {
    pub user_id: UserId,
    pub session: BoxRemoteSession,
    /// Normalized phone number.
    pub phone: String,
    pub credentials: ApiCredentials,
    pub started_at: DateTime<Utc>,
}

impl PendingVerification {
    pub fn is_expired(&self, now: DateTime<Utc>, ttl: Duration) -> bool {
        (now - self.started_at).to_std().unwrap_or_default() > ttl
    }

    pub fn expires_at(&self, ttl: Duration) -> DateTime<Utc> {
        self.started_at + TimeDelta::from_std(ttl).unwrap_or(TimeDelta::zero())
    }
}

/// Why `complete` did not hand back a live entry.
#[derive(Debug)]
pub enum CompleteError {
    NotFound,
    /// The entry was removed but is past its TTL. The caller owns teardown.
    Expired(PendingVerification),
}

/// At most one pending handshake per user.
#[derive(Debug)]
pub struct VerificationRegistry {
    pending: DashMap<UserId, PendingVerification>,
    ttl: Duration,
}

impl VerificationRegistry {
    pub fn new(ttl: Duration) -> Self {
        Self {
            pending: DashMap::new(),
            ttl,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Register a new handshake.
    ///
    /// Fails if the user already has one; the rejected entry is handed back
    /// so the caller can tear its session down.
    pub fn begin(&self, pending: PendingVerification) -> Result<(), PendingVerification> {
        match self.pending.entry(pending.user_id.clone()) {
            Entry::Occupied(_) => Err(pending),
            Entry::Vacant(slot) => {
                debug!(
                    user_id = %pending.user_id,
                    phone = %mask_phone(&pending.phone),
                    "verification pending"
                );
                slot.insert(pending);
                Ok(())
            }
        }
    }

    /// Cloned snapshot of a user's pending entry.
    pub fn get(&self, user_id: &UserId) -> Option<PendingVerification> {
        self.pending.get(user_id).map(|r| r.value().clone())
    }

    pub fn contains(&self, user_id: &UserId) -> bool {
        self.pending.contains_key(user_id)
    }

    /// Atomically take a user's entry.
    pub fn complete(
        &self,
        user_id: &UserId,
        now: DateTime<Utc>,
    ) -> Result<PendingVerification, CompleteError> {
        let (_, pending) = self.pending.remove(user_id).ok_or(CompleteError::NotFound)?;
        if pending.is_expired(now, self.ttl) {
            return Err(CompleteError::Expired(pending));
        }
        Ok(pending)
    }

    /// Remove an entry without checking its age.
    pub fn remove(&self, user_id: &UserId) -> Option<PendingVerification> {
        self.pending.remove(user_id).map(|(_, v)| v)
    }

    /// Remove every expired entry and disconnect its session.
    ///
    /// Returns the number of entries swept.
    pub async fn sweep_expired(&self, now: DateTime<Utc>) -> usize {
        let expired: Vec<UserId> = self
            .pending
            .iter()
            .filter(|r| r.value().is_expired(now, self.ttl))
            .map(|r| r.key().clone())
            .collect();

        let mut swept = 0;
        for user_id in expired {
            // Re-check under the shard lock; the entry may have been replaced.
            let Some((_, pending)) = self
                .pending
                .remove_if(&user_id, |_, p| p.is_expired(now, self.ttl))
            else {
                continue;
            };
            pending.session.disconnect().await;
            info!(user_id = %user_id, "expired pending verification");
            swept += 1;
        }
        swept
    }

    /// Run `sweep_expired` every `interval` until `cancel` fires.
    pub fn spawn_sweeper(
        registry: Arc<Self>,
        interval: Duration,
        cancel: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        registry.sweep_expired(Utc::now()).await;
                    }
                }
            }
            debug!("verification sweeper stopped");
        })
    }

    /// Tear down every pending entry regardless of age.
    pub async fn drain(&self) -> usize {
        let users: Vec<UserId> = self.pending.iter().map(|r| r.key().clone()).collect();
        let mut drained = 0;
        for user_id in users {
            if let Some(pending) = self.remove(&user_id) {
                pending.session.disconnect().await;
                drained += 1;
            }
        }
        drained
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedSession;

    const TTL: Duration = Duration::from_secs(15 * 60);

    fn pending(user: &str, started_at: DateTime<Utc>) -> (PendingVerification, ScriptedSession) {
        let script = ScriptedSession::new();
        let entry = PendingVerification {
            user_id: UserId::new(user),
            session: script.boxed(),
            phone: "+84912345678".to_string(),
            credentials: ApiCredentials::new(1, "hash"),
            started_at,
        };
        (entry, script)
    }

    #[test]
    fn begin_rejects_second_entry() {
        let registry = VerificationRegistry::new(TTL);
        let (first, _) = pending("u1", Utc::now());
        let (second, _) = pending("u1", Utc::now());

        registry.begin(first).unwrap();
        let rejected = registry.begin(second).unwrap_err();
        assert_eq!(rejected.user_id.as_str(), "u1");
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn complete_is_single_use() {
        let registry = VerificationRegistry::new(TTL);
        let (entry, _) = pending("u1", Utc::now());
        registry.begin(entry).unwrap();

        let user = UserId::new("u1");
        assert!(registry.complete(&user, Utc::now()).is_ok());
        assert!(matches!(
            registry.complete(&user, Utc::now()),
            Err(CompleteError::NotFound)
        ));
    }

    #[test]
    fn complete_removes_expired_entry() {
        let registry = VerificationRegistry::new(TTL);
        let (entry, _) = pending("u1", Utc::now() - TimeDelta::minutes(16));
        registry.begin(entry).unwrap();

        let user = UserId::new("u1");
        assert!(matches!(
            registry.complete(&user, Utc::now()),
            Err(CompleteError::Expired(_))
        ));
        assert!(!registry.contains(&user));
    }

    #[tokio::test]
    async fn sweep_tears_down_only_expired() {
        let registry = VerificationRegistry::new(TTL);
        let (old, old_script) = pending("old", Utc::now() - TimeDelta::minutes(20));
        let (fresh, fresh_script) = pending("fresh", Utc::now());
        registry.begin(old).unwrap();
        registry.begin(fresh).unwrap();

        assert_eq!(registry.sweep_expired(Utc::now()).await, 1);
        assert!(!registry.contains(&UserId::new("old")));
        assert!(registry.contains(&UserId::new("fresh")));
        assert_eq!(old_script.disconnects(), 1);
        assert_eq!(fresh_script.disconnects(), 0);
    }

    #[test]
    fn expires_at_adds_ttl() {
        let started = Utc::now();
        let (entry, _) = pending("u1", started);
        assert_eq!(entry.expires_at(TTL), started + TimeDelta::minutes(15));
    }
}
