use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::atomic::{AtomicI64, Ordering};

use crate::error::ReviewError;
use crate::review::{NewReview, Review};

/// Relational review storage.
#[async_trait]
pub trait ReviewStore: Send + Sync {
    async fn insert(&self, review: NewReview) -> Result<Review, ReviewError>;

    /// Newest first.
    async fn list_for_anime(&self, anime_id: i64, limit: u32) -> Result<Vec<Review>, ReviewError>;

    async fn get(&self, id: i64) -> Result<Option<Review>, ReviewError>;

    /// `false` if no such review.
    async fn delete(&self, id: i64) -> Result<bool, ReviewError>;

    async fn count_by_user(&self, anime_id: i64, username: &str) -> Result<u64, ReviewError>;

    fn backend_name(&self) -> &'static str;
}

pub struct MemoryReviewStore {
    reviews: RwLock<Vec<Review>>,
    next_id: AtomicI64,
}

impl MemoryReviewStore {
    pub fn new() -> Self {
        Self {
            reviews: RwLock::new(Vec::new()),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryReviewStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReviewStore for MemoryReviewStore {
    async fn insert(&self, review: NewReview) -> Result<Review, ReviewError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let review = review.into_review(id);
        self.reviews.write().push(review.clone());
        Ok(review)
    }

    async fn list_for_anime(&self, anime_id: i64, limit: u32) -> Result<Vec<Review>, ReviewError> {
        let mut rows: Vec<Review> = self
            .reviews
            .read()
            .iter()
            .filter(|r| r.anime_id == anime_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| {
            (b.post_date, b.post_time, b.id).cmp(&(a.post_date, a.post_time, a.id))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn get(&self, id: i64) -> Result<Option<Review>, ReviewError> {
        Ok(self.reviews.read().iter().find(|r| r.id == id).cloned())
    }

    async fn delete(&self, id: i64) -> Result<bool, ReviewError> {
        let mut reviews = self.reviews.write();
        let before = reviews.len();
        reviews.retain(|r| r.id != id);
        Ok(reviews.len() != before)
    }

    async fn count_by_user(&self, anime_id: i64, username: &str) -> Result<u64, ReviewError> {
        Ok(self
            .reviews
            .read()
            .iter()
            .filter(|r| r.anime_id == anime_id && r.username == username)
            .count() as u64)
    }

    fn backend_name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn new_review(anime_id: i64, user: &str, hour: u32) -> NewReview {
        NewReview {
            anime_id,
            username: user.into(),
            score: Some(8),
            review: format!("{} at {}", user, hour),
            post_date: NaiveDate::from_ymd_opt(2024, 6, 1).unwrap(),
            post_time: NaiveTime::from_hms_opt(hour, 0, 0).unwrap(),
        }
    }

    #[tokio::test]
    async fn insert_list_delete() {
        let store = MemoryReviewStore::new();
        let a = store.insert(new_review(1, "alice", 9)).await.unwrap();
        let b = store.insert(new_review(1, "bob", 11)).await.unwrap();
        store.insert(new_review(2, "alice", 12)).await.unwrap();
        assert_ne!(a.id, b.id);

        let listed = store.list_for_anime(1, 200).await.unwrap();
        assert_eq!(listed.iter().map(|r| r.id).collect::<Vec<_>>(), vec![b.id, a.id]);
        assert_eq!(store.list_for_anime(1, 1).await.unwrap().len(), 1);
        assert_eq!(store.count_by_user(1, "alice").await.unwrap(), 1);

        assert!(store.delete(a.id).await.unwrap());
        assert!(!store.delete(a.id).await.unwrap());
        assert!(store.get(a.id).await.unwrap().is_none());
        assert_eq!(store.get(b.id).await.unwrap(), Some(b));
    }
}
