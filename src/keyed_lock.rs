//! Per-identity mutual exclusion.
//!
//! Each key maps to its own async mutex, created on first use and dropped
//! again once nobody holds or waits for it. Unrelated keys never contend.

use dashmap::DashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

type LockMap = DashMap<String, Arc<Mutex<()>>>;

#[derive(Default)]
pub struct IdentityKeyedLock {
    locks: Arc<LockMap>,
}

/// Held for the duration of a critical section. Dropping it releases the
/// key and removes the map entry if no other task is queued on it.
pub struct KeyedGuard {
    // Field order matters: the mutex guard must go before the slot.
    _guard: OwnedMutexGuard<()>,
    _slot: Slot,
}

struct Slot {
    key: String,
    locks: Arc<LockMap>,
    mutex: Option<Arc<Mutex<()>>>,
}

impl Slot {
    fn checkout(locks: &Arc<LockMap>, key: &str) -> (Self, Arc<Mutex<()>>) {
        let mutex = locks.entry(key.to_owned()).or_insert_with(Default::default).clone();
        let slot = Self {
            key: key.to_owned(),
            locks: locks.clone(),
            mutex: Some(mutex.clone()),
        };
        (slot, mutex)
    }
}

impl Drop for Slot {
    fn drop(&mut self) {
        drop(self.mutex.take());
        // Only the map's own reference left means no holder and no waiter.
        self.locks.remove_if(&self.key, |_, m| Arc::strong_count(m) == 1);
    }
}

impl IdentityKeyedLock {
    pub fn new() -> Self {
        Self::default()
    }

    /// Waits until `key` is free. Cancel-safe: dropping the returned future
    /// before it resolves never takes the lock.
    pub async fn acquire(&self, key: &str) -> KeyedGuard {
        let (slot, mutex) = Slot::checkout(&self.locks, key);
        let guard = mutex.lock_owned().await;
        tracing::trace!(key, "identity lock acquired");
        KeyedGuard { _guard: guard, _slot: slot }
    }

    /// Runs `critical` with `key` held, releasing on every exit path
    /// including panics and cancellation.
    pub async fn with_lock<F, Fut, T>(&self, key: &str, critical: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _guard = self.acquire(key).await;
        critical().await
    }

    /// Number of keys currently held or waited on.
    pub fn active_keys(&self) -> usize {
        self.locks.len()
    }

    /// Drops entries left behind by cancelled waiters.
    pub fn prune(&self) -> usize {
        let before = self.locks.len();
        self.locks.retain(|_, m| Arc::strong_count(m) > 1);
        before.saturating_sub(self.locks.len())
    }
}
