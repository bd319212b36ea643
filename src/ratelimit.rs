use chrono::NaiveDate;
use std::sync::Arc;
use tracing::{debug, error};

use crate::counter::DailyCounter;
use crate::error::ReviewError;
use crate::identity::Identity;
use crate::keyed_lock::{IdentityKeyedLock, KeyedGuard};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdmitDecision {
    Allowed { count_after: u32 },
    Rejected { count_after: u32, limit: u32 },
}

impl AdmitDecision {
    pub fn is_allowed(&self) -> bool {
        matches!(self, AdmitDecision::Allowed { .. })
    }
}

/// An identity's lock, held from `wait_turn` until its admission is decided.
pub struct Turn {
    _lock: KeyedGuard,
    key: String,
}

impl Turn {
    fn release(self) -> String {
        self.key
    }
}

/// Decides whether an identity may create another review today.
///
/// The check-and-increment for one identity always runs under that
/// identity's lock, including any storage round-trip the counter makes.
/// Counter failures are surfaced as errors and never admit.
pub struct RateLimitedSubmissionGuard {
    locks: IdentityKeyedLock,
    counter: Arc<dyn DailyCounter>,
    limit: u32,
}

impl RateLimitedSubmissionGuard {
    pub fn new(counter: Arc<dyn DailyCounter>, limit: u32) -> Self {
        Self {
            locks: IdentityKeyedLock::new(),
            counter,
            limit,
        }
    }

    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Waits until `identity` may be evaluated. Dropping the future before
    /// it resolves leaves both the lock and the counter untouched.
    pub async fn wait_turn(&self, identity: &Identity) -> Turn {
        let key = identity.key();
        let lock = self.locks.acquire(&key).await;
        Turn { _lock: lock, key }
    }

    /// Decides a held turn against the configured limit. The lock is
    /// released once the counter has answered.
    pub async fn admit_turn(&self, turn: Turn, day: NaiveDate) -> Result<AdmitDecision, ReviewError> {
        self.decide(turn, day, self.limit).await
    }

    pub async fn admit(&self, identity: &Identity, day: NaiveDate) -> Result<AdmitDecision, ReviewError> {
        self.admit_with_limit(identity, day, self.limit).await
    }

    pub async fn admit_with_limit(
        &self,
        identity: &Identity,
        day: NaiveDate,
        limit: u32,
    ) -> Result<AdmitDecision, ReviewError> {
        let turn = self.wait_turn(identity).await;
        self.decide(turn, day, limit).await
    }

    async fn decide(&self, turn: Turn, day: NaiveDate, limit: u32) -> Result<AdmitDecision, ReviewError> {
        let increment = self.check_and_increment(&turn.key, day, limit).await;
        let key = turn.release();

        let (admitted, count_after) = increment.map_err(|e| {
            error!("Rate window check failed for {}: {}", key, e);
            fail_closed(e)
        })?;

        debug!(key = %key, %day, count_after, admitted, "admission evaluated");

        if admitted {
            Ok(AdmitDecision::Allowed { count_after })
        } else {
            Ok(AdmitDecision::Rejected { count_after, limit })
        }
    }

    async fn check_and_increment(
        &self,
        key: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<(bool, u32), ReviewError> {
        if limit == 0 {
            let current = self.counter.peek(key, day).await?;
            return Ok((false, current));
        }
        let inc = self.counter.increment_if_below(key, day, limit).await?;
        Ok((inc.admitted, inc.count_after))
    }

    /// Returns a slot reserved by `admit` whose write never happened.
    pub async fn rollback(&self, identity: &Identity, day: NaiveDate) -> Result<u32, ReviewError> {
        let key = identity.key();
        self.locks
            .with_lock(&key, || self.counter.release(&key, day))
            .await
            .map_err(fail_closed)
    }

    pub async fn reviews_today(&self, identity: &Identity, day: NaiveDate) -> Result<u32, ReviewError> {
        self.counter.peek(&identity.key(), day).await.map_err(fail_closed)
    }

    /// Drops past windows and idle lock entries.
    pub async fn maintain(&self, today: NaiveDate) -> Result<(u64, usize), ReviewError> {
        let windows = self.counter.evict_before(today).await.map_err(fail_closed)?;
        let locks = self.locks.prune();
        Ok((windows, locks))
    }

    pub fn active_locks(&self) -> usize {
        self.locks.active_keys()
    }
}

fn fail_closed(e: ReviewError) -> ReviewError {
    match e {
        e @ ReviewError::StorageUnavailable(_) => e,
        other => ReviewError::StorageUnavailable(other.to_string()),
    }
}
