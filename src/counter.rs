use async_trait::async_trait;
use chrono::NaiveDate;
use dashmap::DashMap;

use crate::error::ReviewError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Increment {
    pub admitted: bool,
    pub count_after: u32,
}

/// Per-identity, per-day admission counts.
///
/// Callers mediate access through the identity lock; implementations backed
/// by shared storage must still make `increment_if_below` a single atomic
/// conditional update.
#[async_trait]
pub trait DailyCounter: Send + Sync {
    async fn peek(&self, key: &str, day: NaiveDate) -> Result<u32, ReviewError>;

    async fn increment_if_below(
        &self,
        key: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Increment, ReviewError>;

    /// Gives back one reserved slot. Returns the count afterwards.
    async fn release(&self, key: &str, day: NaiveDate) -> Result<u32, ReviewError>;

    /// Removes windows dated before `day`. Returns how many were dropped.
    async fn evict_before(&self, day: NaiveDate) -> Result<u64, ReviewError>;
}

#[derive(Default)]
pub struct MemoryDailyCounter {
    windows: DashMap<(String, NaiveDate), u32>,
}

impl MemoryDailyCounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn window_count(&self) -> usize {
        self.windows.len()
    }
}

#[async_trait]
impl DailyCounter for MemoryDailyCounter {
    async fn peek(&self, key: &str, day: NaiveDate) -> Result<u32, ReviewError> {
        Ok(self
            .windows
            .get(&(key.to_owned(), day))
            .map(|c| *c)
            .unwrap_or(0))
    }

    async fn increment_if_below(
        &self,
        key: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Increment, ReviewError> {
        let mut count = self.windows.entry((key.to_owned(), day)).or_insert(0);
        if *count >= limit {
            return Ok(Increment { admitted: false, count_after: *count });
        }
        *count += 1;
        Ok(Increment { admitted: true, count_after: *count })
    }

    async fn release(&self, key: &str, day: NaiveDate) -> Result<u32, ReviewError> {
        match self.windows.get_mut(&(key.to_owned(), day)) {
            Some(mut count) => {
                *count = count.saturating_sub(1);
                Ok(*count)
            }
            None => Ok(0),
        }
    }

    async fn evict_before(&self, day: NaiveDate) -> Result<u64, ReviewError> {
        let before = self.windows.len();
        self.windows.retain(|(_, d), _| *d >= day);
        Ok(before.saturating_sub(self.windows.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 5, d).unwrap()
    }

    #[tokio::test]
    async fn increments_up_to_limit() {
        let counter = MemoryDailyCounter::new();
        for expected in 1..=3 {
            let inc = counter.increment_if_below("name:a", day(1), 3).await.unwrap();
            assert_eq!(inc, Increment { admitted: true, count_after: expected });
        }
        let inc = counter.increment_if_below("name:a", day(1), 3).await.unwrap();
        assert_eq!(inc, Increment { admitted: false, count_after: 3 });
        assert_eq!(counter.peek("name:a", day(1)).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn zero_limit_never_admits() {
        let counter = MemoryDailyCounter::new();
        let inc = counter.increment_if_below("name:a", day(1), 0).await.unwrap();
        assert!(!inc.admitted);
        assert_eq!(inc.count_after, 0);
    }

    #[tokio::test]
    async fn windows_are_per_day_and_per_key() {
        let counter = MemoryDailyCounter::new();
        counter.increment_if_below("name:a", day(1), 1).await.unwrap();
        assert!(!counter.increment_if_below("name:a", day(1), 1).await.unwrap().admitted);
        assert!(counter.increment_if_below("name:a", day(2), 1).await.unwrap().admitted);
        assert!(counter.increment_if_below("name:b", day(1), 1).await.unwrap().admitted);
        assert_eq!(counter.peek("name:c", day(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn release_and_evict() {
        let counter = MemoryDailyCounter::new();
        counter.increment_if_below("name:a", day(1), 5).await.unwrap();
        counter.increment_if_below("name:a", day(2), 5).await.unwrap();
        counter.increment_if_below("name:a", day(2), 5).await.unwrap();

        assert_eq!(counter.release("name:a", day(2)).await.unwrap(), 1);
        assert_eq!(counter.release("name:missing", day(2)).await.unwrap(), 0);

        assert_eq!(counter.evict_before(day(2)).await.unwrap(), 1);
        assert_eq!(counter.window_count(), 1);
        assert_eq!(counter.peek("name:a", day(2)).await.unwrap(), 1);
    }
}
