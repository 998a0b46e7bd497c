use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::store::{CoordinationError, CoordinationStore};
use super::types::{lease_expiry, ResourceLockRecord};
use crate::config::CoordinationConfig;

/// Lease timing for one acquisition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockOptions {
    /// How long the lease lives once written
    pub ttl: Duration,
    /// Total time to keep polling before giving up
    pub wait: Duration,
    /// Delay between polls
    pub poll: Duration,
}

impl Default for LockOptions {
    fn default() -> Self {
        let config = CoordinationConfig::default();
        Self::from_config(&config)
    }
}

impl LockOptions {
    pub fn from_config(config: &CoordinationConfig) -> Self {
        Self {
            ttl: Duration::from_millis(config.lock_ttl_ms),
            wait: Duration::from_millis(config.lock_wait_ms),
            poll: Duration::from_millis(config.lock_poll_ms),
        }
    }
}

/// TTL-leased mutual exclusion over named world resources.
///
/// Contention and store failures never surface as errors: `acquire` answers
/// `false` and the caller decides whether that is fatal for its step.
#[derive(Debug, Clone)]
pub struct ResourceLockManager {
    store: Arc<CoordinationStore>,
    owner: String,
    defaults: LockOptions,
}

impl ResourceLockManager {
    pub fn new(store: Arc<CoordinationStore>, owner: impl Into<String>) -> Self {
        Self {
            store,
            owner: owner.into(),
            defaults: LockOptions::default(),
        }
    }

    pub fn with_defaults(mut self, defaults: LockOptions) -> Self {
        self.defaults = defaults;
        self
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn defaults(&self) -> LockOptions {
        self.defaults
    }

    /// Acquire with the manager's default lease timing.
    pub async fn acquire_default(&self, resource_key: &str) -> bool {
        self.acquire(resource_key, self.defaults).await
    }

    /// Poll until `resource_key` is leased to this owner or `options.wait`
    /// elapses. At least one attempt is always made.
    pub async fn acquire(&self, resource_key: &str, options: LockOptions) -> bool {
        if lease_expiry(Utc::now(), options.ttl).is_none() {
            warn!(
                owner = %self.owner,
                resource = %resource_key,
                ttl_ms = options.ttl.as_millis() as u64,
                "Lease length out of range, not acquiring"
            );
            return false;
        }

        let deadline = Instant::now() + options.wait;
        let mut polls = 0u32;

        loop {
            polls += 1;
            match self.try_acquire(resource_key, options.ttl).await {
                Ok(true) => {
                    info!(
                        owner = %self.owner,
                        resource = %resource_key,
                        polls = polls,
                        ttl_ms = options.ttl.as_millis() as u64,
                        "Resource lock acquired"
                    );
                    return true;
                }
                Ok(false) => {
                    debug!(owner = %self.owner, resource = %resource_key, "Resource lock held by another owner");
                }
                Err(e) => {
                    warn!(owner = %self.owner, resource = %resource_key, error = %e, "Resource lock attempt failed");
                }
            }

            let now = Instant::now();
            if now >= deadline {
                info!(
                    owner = %self.owner,
                    resource = %resource_key,
                    polls = polls,
                    wait_ms = options.wait.as_millis() as u64,
                    "Gave up waiting for resource lock"
                );
                return false;
            }
            tokio::time::sleep(options.poll.min(deadline - now)).await;
        }
    }

    /// A single acquisition attempt. `Ok(false)` means another owner holds a
    /// live lease, or `ttl` is too long to express as an expiry.
    pub async fn try_acquire(&self, resource_key: &str, ttl: Duration) -> Result<bool, CoordinationError> {
        let owner = self.owner.clone();

        self.store
            .update(move |state, now| {
                let free = state
                    .locks
                    .get(resource_key)
                    .map_or(true, |record| record.is_available_to(&owner, now));
                let Some(expires_at) = lease_expiry(now, ttl).filter(|_| free) else {
                    return false;
                };
                state.locks.insert(
                    resource_key.to_string(),
                    ResourceLockRecord {
                        owner,
                        owner_since: now,
                        expires_at,
                    },
                );
                true
            })
            .await
    }

    /// Remove the lease only if this owner still holds it.
    pub async fn release(&self, resource_key: &str) -> bool {
        let owner = self.owner.as_str();
        let result = self
            .store
            .update(|state, _now| {
                let owned = state
                    .locks
                    .get(resource_key)
                    .is_some_and(|record| record.owner == owner);
                if owned {
                    state.locks.remove(resource_key);
                }
                owned
            })
            .await;

        match result {
            Ok(true) => {
                info!(owner = %self.owner, resource = %resource_key, "Resource lock released");
                true
            }
            Ok(false) => {
                debug!(owner = %self.owner, resource = %resource_key, "Release skipped, lock not owned");
                false
            }
            Err(e) => {
                warn!(owner = %self.owner, resource = %resource_key, error = %e, "Resource lock release failed");
                false
            }
        }
    }

    /// The live lease on `resource_key`, if any. Falls back to a lock-free
    /// read when the store is busy.
    pub async fn holder(&self, resource_key: &str) -> Option<ResourceLockRecord> {
        let state = match self.store.read().await {
            Ok(state) => state,
            Err(e) => {
                debug!(resource = %resource_key, error = %e, "Falling back to lock-free read");
                self.store.peek()
            }
        };
        state
            .locks
            .get(resource_key)
            .filter(|record| !record.is_expired(Utc::now()))
            .cloned()
    }
}
