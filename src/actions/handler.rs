// Handler contract between the executor and the game-client runtime

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

use super::types::ActionStep;
use crate::coordination::{LockOptions, ResourceLockManager};

/// Performs one action against the world.
///
/// An `Err` is an opaque, possibly transient failure; the executor keeps only
/// its display string and decides whether to retry.
#[async_trait]
pub trait ActionHandler<W: ?Sized + Sync>: Send + Sync {
    async fn handle(&self, world: &W, step: &ActionStep) -> Result<()>;
}

#[async_trait]
impl<W, H> ActionHandler<W> for Arc<H>
where
    W: ?Sized + Sync,
    H: ActionHandler<W> + ?Sized,
{
    async fn handle(&self, world: &W, step: &ActionStep) -> Result<()> {
        (**self).handle(world, step).await
    }
}

/// Wraps a handler so that container steps hold the container's resource
/// lease for the duration of the inner call.
///
/// Steps without a resource key pass straight through. Failing to acquire
/// the lease is reported as a handler failure, which the executor retries.
pub struct LockedHandler<H> {
    inner: H,
    locks: ResourceLockManager,
    options: LockOptions,
}

impl<H> LockedHandler<H> {
    pub fn new(inner: H, locks: ResourceLockManager) -> Self {
        let options = locks.defaults();
        Self {
            inner,
            locks,
            options,
        }
    }

    pub fn with_options(mut self, options: LockOptions) -> Self {
        self.options = options;
        self
    }
}

#[async_trait]
impl<W, H> ActionHandler<W> for LockedHandler<H>
where
    W: ?Sized + Sync,
    H: ActionHandler<W>,
{
    async fn handle(&self, world: &W, step: &ActionStep) -> Result<()> {
        let Some(key) = step.action.resource_key() else {
            return self.inner.handle(world, step).await;
        };

        if !self.locks.acquire(&key, self.options).await {
            return Err(anyhow!("resource busy: {key}"));
        }

        let mut lease = HeldLease {
            locks: &self.locks,
            key: Some(key),
        };
        let outcome = self.inner.handle(world, step).await;
        if let Some(key) = lease.key.take() {
            self.locks.release(&key).await;
        }
        outcome
    }
}

/// A lease still held by an in-progress call. If the call is cancelled
/// before releasing, the release is handed to the runtime on drop.
struct HeldLease<'a> {
    locks: &'a ResourceLockManager,
    key: Option<String>,
}

impl Drop for HeldLease<'_> {
    fn drop(&mut self) {
        let Some(key) = self.key.take() else {
            return;
        };
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let locks = self.locks.clone();
                runtime.spawn(async move {
                    locks.release(&key).await;
                });
            }
            Err(_) => {
                warn!(resource = %key, "No runtime to release abandoned lease, leaving it to expire");
            }
        }
    }
}
