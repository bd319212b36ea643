//! SQLite persistence for reviews and daily rate windows.
//!
//! Dates and times are stored as `YYYY-MM-DD` / `HH:MM:SS` text, which keeps
//! lexical and chronological order identical.

use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime};
use sqlx::sqlite::{SqlitePool, SqlitePoolOptions, SqliteRow};
use sqlx::Row;
use std::time::Duration;
use tracing::info;

use crate::counter::{DailyCounter, Increment};
use crate::error::ReviewError;
use crate::review::{NewReview, Review};
use crate::store::ReviewStore;

const DATE_FORMAT: &str = "%Y-%m-%d";
const TIME_FORMAT: &str = "%H:%M:%S";

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS reviews (
        id        INTEGER PRIMARY KEY AUTOINCREMENT,
        anime_id  INTEGER NOT NULL,
        username  TEXT    NOT NULL,
        score     INTEGER,
        review    TEXT    NOT NULL,
        post_date TEXT    NOT NULL,
        post_time TEXT    NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_reviews_anime ON reviews (anime_id, post_date, post_time)",
    "CREATE TABLE IF NOT EXISTS review_quota (
        identity TEXT    NOT NULL,
        day      TEXT    NOT NULL,
        used     INTEGER NOT NULL,
        PRIMARY KEY (identity, day)
    )",
];

fn storage(e: sqlx::Error) -> ReviewError {
    ReviewError::StorageUnavailable(e.to_string())
}

fn day_key(day: NaiveDate) -> String {
    day.format(DATE_FORMAT).to_string()
}

pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, ReviewError> {
    let mut options = SqlitePoolOptions::new().max_connections(max_connections.max(1));

    // Each connection to an in-memory database is its own database.
    if database_url.contains(":memory:") {
        options = options
            .max_connections(1)
            .idle_timeout(None::<Duration>)
            .max_lifetime(None::<Duration>);
    }

    let pool = options.connect(database_url).await.map_err(storage)?;
    migrate(&pool).await?;
    info!("SQLite storage ready at {}", database_url);
    Ok(pool)
}

pub async fn migrate(pool: &SqlitePool) -> Result<(), ReviewError> {
    for statement in SCHEMA {
        sqlx::query(*statement).execute(pool).await.map_err(storage)?;
    }
    Ok(())
}

#[derive(Clone)]
pub struct SqliteReviewStore {
    pool: SqlitePool,
}

impl SqliteReviewStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn review_from_row(row: &SqliteRow) -> Result<Review, ReviewError> {
    let post_date: String = row.try_get("post_date").map_err(storage)?;
    let post_time: String = row.try_get("post_time").map_err(storage)?;

    Ok(Review {
        id: row.try_get("id").map_err(storage)?,
        anime_id: row.try_get("anime_id").map_err(storage)?,
        username: row.try_get("username").map_err(storage)?,
        score: row.try_get("score").map_err(storage)?,
        review: row.try_get("review").map_err(storage)?,
        post_date: NaiveDate::parse_from_str(&post_date, DATE_FORMAT)
            .map_err(|e| ReviewError::StorageUnavailable(format!("bad post_date {:?}: {}", post_date, e)))?,
        post_time: NaiveTime::parse_from_str(&post_time, TIME_FORMAT)
            .map_err(|e| ReviewError::StorageUnavailable(format!("bad post_time {:?}: {}", post_time, e)))?,
    })
}

#[async_trait]
impl ReviewStore for SqliteReviewStore {
    async fn insert(&self, review: NewReview) -> Result<Review, ReviewError> {
        let result = sqlx::query(
            "INSERT INTO reviews (anime_id, username, score, review, post_date, post_time)
             VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(review.anime_id)
        .bind(&review.username)
        .bind(review.score)
        .bind(&review.review)
        .bind(day_key(review.post_date))
        .bind(review.post_time.format(TIME_FORMAT).to_string())
        .execute(&self.pool)
        .await
        .map_err(|e| ReviewError::WriteFailure(e.to_string()))?;

        Ok(review.into_review(result.last_insert_rowid()))
    }

    async fn list_for_anime(&self, anime_id: i64, limit: u32) -> Result<Vec<Review>, ReviewError> {
        let rows = sqlx::query(
            "SELECT id, anime_id, username, score, review, post_date, post_time
               FROM reviews
              WHERE anime_id = ?
              ORDER BY post_date DESC, post_time DESC, id DESC
              LIMIT ?",
        )
        .bind(anime_id)
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;

        rows.iter().map(review_from_row).collect()
    }

    async fn get(&self, id: i64) -> Result<Option<Review>, ReviewError> {
        let row = sqlx::query(
            "SELECT id, anime_id, username, score, review, post_date, post_time
               FROM reviews WHERE id = ? LIMIT 1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        row.as_ref().map(review_from_row).transpose()
    }

    async fn delete(&self, id: i64) -> Result<bool, ReviewError> {
        let result = sqlx::query("DELETE FROM reviews WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected() > 0)
    }

    async fn count_by_user(&self, anime_id: i64, username: &str) -> Result<u64, ReviewError> {
        let n: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM reviews WHERE anime_id = ? AND username = ?")
            .bind(anime_id)
            .bind(username)
            .fetch_one(&self.pool)
            .await
            .map_err(storage)?;
        Ok(n.max(0) as u64)
    }

    fn backend_name(&self) -> &'static str {
        "sqlite"
    }
}

/// Rate windows shared by every process pointed at the same database.
#[derive(Clone)]
pub struct SqliteDailyCounter {
    pool: SqlitePool,
}

impl SqliteDailyCounter {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl DailyCounter for SqliteDailyCounter {
    async fn peek(&self, key: &str, day: NaiveDate) -> Result<u32, ReviewError> {
        let used: Option<i64> =
            sqlx::query_scalar("SELECT used FROM review_quota WHERE identity = ? AND day = ?")
                .bind(key)
                .bind(day_key(day))
                .fetch_optional(&self.pool)
                .await
                .map_err(storage)?;
        Ok(used.unwrap_or(0).max(0) as u32)
    }

    async fn increment_if_below(
        &self,
        key: &str,
        day: NaiveDate,
        limit: u32,
    ) -> Result<Increment, ReviewError> {
        if limit == 0 {
            let current = self.peek(key, day).await?;
            return Ok(Increment { admitted: false, count_after: current });
        }

        // Single conditional upsert: no row comes back when the window is full.
        let used: Option<i64> = sqlx::query_scalar(
            "INSERT INTO review_quota (identity, day, used) VALUES (?1, ?2, 1)
             ON CONFLICT (identity, day) DO UPDATE SET used = used + 1 WHERE used < ?3
             RETURNING used",
        )
        .bind(key)
        .bind(day_key(day))
        .bind(i64::from(limit))
        .fetch_optional(&self.pool)
        .await
        .map_err(storage)?;

        match used {
            Some(used) => Ok(Increment { admitted: true, count_after: used.max(0) as u32 }),
            None => {
                let current = self.peek(key, day).await?;
                Ok(Increment { admitted: false, count_after: current })
            }
        }
    }

    async fn release(&self, key: &str, day: NaiveDate) -> Result<u32, ReviewError> {
        sqlx::query("UPDATE review_quota SET used = used - 1 WHERE identity = ? AND day = ? AND used > 0")
            .bind(key)
            .bind(day_key(day))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        self.peek(key, day).await
    }

    async fn evict_before(&self, day: NaiveDate) -> Result<u64, ReviewError> {
        let result = sqlx::query("DELETE FROM review_quota WHERE day < ?")
            .bind(day_key(day))
            .execute(&self.pool)
            .await
            .map_err(storage)?;
        Ok(result.rows_affected())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn memory_pool() -> SqlitePool {
        connect("sqlite::memory:", 1).await.unwrap()
    }

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 7, d).unwrap()
    }

    #[tokio::test]
    async fn conditional_upsert_stops_at_limit() {
        let counter = SqliteDailyCounter::new(memory_pool().await);

        for expected in 1..=3 {
            let inc = counter.increment_if_below("name:a", day(1), 3).await.unwrap();
            assert_eq!(inc, Increment { admitted: true, count_after: expected });
        }
        let inc = counter.increment_if_below("name:a", day(1), 3).await.unwrap();
        assert_eq!(inc, Increment { admitted: false, count_after: 3 });

        assert!(counter.increment_if_below("name:a", day(2), 3).await.unwrap().admitted);
        assert_eq!(counter.peek("name:b", day(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn release_and_evict_windows() {
        let counter = SqliteDailyCounter::new(memory_pool().await);
        counter.increment_if_below("name:a", day(1), 3).await.unwrap();
        counter.increment_if_below("name:a", day(2), 3).await.unwrap();

        assert_eq!(counter.release("name:a", day(2)).await.unwrap(), 0);
        assert_eq!(counter.release("name:a", day(2)).await.unwrap(), 0);

        assert_eq!(counter.evict_before(day(2)).await.unwrap(), 1);
        assert_eq!(counter.peek("name:a", day(1)).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn reviews_round_trip_through_sqlite() {
        let store = SqliteReviewStore::new(memory_pool().await);
        let base = NewReview {
            anime_id: 21,
            username: "luffy".into(),
            score: None,
            review: "Gum gum".into(),
            post_date: day(3),
            post_time: NaiveTime::from_hms_opt(8, 30, 0).unwrap(),
        };

        let first = store.insert(base.clone()).await.unwrap();
        let second = store
            .insert(NewReview {
                score: Some(10),
                post_time: NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
                ..base
            })
            .await
            .unwrap();

        let listed = store.list_for_anime(21, 200).await.unwrap();
        assert_eq!(listed, vec![second.clone(), first.clone()]);
        assert_eq!(store.count_by_user(21, "luffy").await.unwrap(), 2);
        assert_eq!(store.get(first.id).await.unwrap(), Some(first.clone()));

        assert!(store.delete(first.id).await.unwrap());
        assert!(!store.delete(first.id).await.unwrap());
        assert_eq!(store.list_for_anime(21, 200).await.unwrap(), vec![second]);
        assert_eq!(store.backend_name(), "sqlite");
    }
}
