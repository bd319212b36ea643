//! Review writes gated by the daily limit.
//!
//! Request lifecycle: validate, wait for the identity's turn, then admit
//! (lock held only for the check-and-increment) and persist. Everything from
//! the increment onward runs in its own task, so a dropped request still
//! finishes the write or returns the reserved slot.

use chrono::NaiveDate;
use serde_json::{json, Value};
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::activity::{ActivityAction, ActivityLog};
use crate::clock::Clock;
use crate::config::ReviewsConfig;
use crate::error::ReviewError;
use crate::identity::Identity;
use crate::metrics::Metrics;
use crate::ratelimit::{AdmitDecision, RateLimitedSubmissionGuard, Turn};
use crate::review::{normalize_score, post_time, sanitize_review_text, NewReview, Review};
use crate::store::ReviewStore;

/// Raw submission as received from the client.
#[derive(Debug, Clone)]
pub struct Submission {
    pub anime_id: i64,
    pub identity: Identity,
    pub score: Option<Value>,
    pub text: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Created {
    pub review: Review,
    pub reviews_today: u32,
    pub remaining_today: u32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub reviews_today: u32,
    pub remaining_today: u32,
    pub limit: u32,
}

pub struct ReviewWriteCoordinator {
    guard: Arc<RateLimitedSubmissionGuard>,
    store: Arc<dyn ReviewStore>,
    clock: Arc<dyn Clock>,
    activity: Arc<ActivityLog>,
    metrics: Arc<Metrics>,
    limits: ReviewsConfig,
}

/// Validated review waiting for admission.
struct Draft {
    anime_id: i64,
    identity: Identity,
    score: Option<i64>,
    text: String,
}

/// Handles moved into the detached admit-and-write task.
#[derive(Clone)]
struct Writer {
    guard: Arc<RateLimitedSubmissionGuard>,
    store: Arc<dyn ReviewStore>,
    clock: Arc<dyn Clock>,
    activity: Arc<ActivityLog>,
    metrics: Arc<Metrics>,
}

impl ReviewWriteCoordinator {
    pub fn new(
        guard: Arc<RateLimitedSubmissionGuard>,
        store: Arc<dyn ReviewStore>,
        clock: Arc<dyn Clock>,
        activity: Arc<ActivityLog>,
        metrics: Arc<Metrics>,
        limits: ReviewsConfig,
    ) -> Self {
        Self { guard, store, clock, activity, metrics, limits }
    }

    pub fn guard(&self) -> &Arc<RateLimitedSubmissionGuard> {
        &self.guard
    }

    pub fn store(&self) -> &Arc<dyn ReviewStore> {
        &self.store
    }

    fn writer(&self) -> Writer {
        Writer {
            guard: self.guard.clone(),
            store: self.store.clone(),
            clock: self.clock.clone(),
            activity: self.activity.clone(),
            metrics: self.metrics.clone(),
        }
    }

    /// Validates, waits for the identity's turn, then hands the turn to a
    /// detached task that admits and writes. A request dropped while queued
    /// touches nothing; once the turn is held the task always ends in a
    /// stored review, a rejection, or a returned slot.
    pub async fn submit(&self, submission: Submission) -> Result<Created, ReviewError> {
        self.metrics.inc_submissions();

        let (text, score) = match validate(&submission, &self.limits) {
            Ok(v) => v,
            Err(e) => {
                self.metrics.inc_validation_failures();
                return Err(e);
            }
        };

        let draft = Draft {
            anime_id: submission.anime_id,
            identity: submission.identity,
            score,
            text,
        };

        let turn = self.guard.wait_turn(&draft.identity).await;
        let writer = self.writer();

        tokio::spawn(async move { writer.admit_and_persist(turn, draft).await })
            .await
            .map_err(|e| ReviewError::WriteFailure(format!("review task aborted: {}", e)))?
    }

    pub async fn list(&self, anime_id: i64) -> Result<Vec<Review>, ReviewError> {
        self.store.list_for_anime(anime_id, self.limits.list_limit).await
    }

    /// Deleting never refunds quota.
    pub async fn delete(&self, id: i64, actor: &Identity) -> Result<Review, ReviewError> {
        let review = self
            .store
            .get(id)
            .await?
            .ok_or_else(|| ReviewError::NotFound("Review".into()))?;

        if !self.store.delete(id).await? {
            return Err(ReviewError::NotFound("Review".into()));
        }

        self.metrics.inc_deleted();
        info!("Review {} deleted by {}", id, actor.username);
        self.activity.record(
            actor.user_id,
            &actor.username,
            ActivityAction::DeleteReview,
            json!({ "reviewId": id, "animeId": review.anime_id, "author": review.username }),
        );
        Ok(review)
    }

    pub async fn quota(&self, identity: &Identity) -> Result<Quota, ReviewError> {
        let limit = self.guard.limit();
        let reviews_today = self.guard.reviews_today(identity, self.clock.today()).await?;
        Ok(Quota {
            reviews_today,
            remaining_today: limit.saturating_sub(reviews_today),
            limit,
        })
    }

    pub async fn maintain(&self) -> Result<(u64, usize), ReviewError> {
        self.guard.maintain(self.clock.today()).await
    }
}

impl Writer {
    async fn admit_and_persist(self, turn: Turn, draft: Draft) -> Result<Created, ReviewError> {
        let now = self.clock.now();
        let day = now.date_naive();
        let Draft { anime_id, identity, score, text } = draft;

        let decision = match self.guard.admit_turn(turn, day).await {
            Ok(d) => d,
            Err(e) => {
                self.metrics.inc_storage_errors();
                return Err(e);
            }
        };

        let reviews_today = match decision {
            AdmitDecision::Allowed { count_after } => count_after,
            AdmitDecision::Rejected { count_after, limit } => {
                self.metrics.inc_rate_limited();
                warn!("Daily review limit reached for {} ({}/{})", identity.username, count_after, limit);
                self.activity.record(
                    identity.user_id,
                    &identity.username,
                    ActivityAction::ReviewRateLimited,
                    json!({ "animeId": anime_id, "reviewsToday": count_after, "limit": limit }),
                );
                return Err(ReviewError::RateLimitExceeded { reviews_today: count_after, limit });
            }
        };

        let new_review = NewReview {
            anime_id,
            username: identity.username.clone(),
            score,
            review: text,
            post_date: day,
            post_time: post_time(now.time()),
        };

        let review = self.persist(&identity, day, new_review).await?;

        self.metrics.inc_admitted();
        info!(
            "Review {} created for anime {} by {} ({}/{} today)",
            review.id, review.anime_id, review.username, reviews_today, self.guard.limit()
        );
        self.activity.record(
            identity.user_id,
            &identity.username,
            ActivityAction::AddReview,
            json!({ "animeId": review.anime_id, "reviewId": review.id, "score": review.score }),
        );

        Ok(Created {
            review,
            reviews_today,
            remaining_today: self.guard.limit().saturating_sub(reviews_today),
        })
    }

    /// Inserts an admitted review, returning its slot if the insert fails.
    async fn persist(&self, identity: &Identity, day: NaiveDate, review: NewReview) -> Result<Review, ReviewError> {
        match self.store.insert(review).await {
            Ok(review) => Ok(review),
            Err(e) => {
                self.metrics.inc_write_failures();
                error!("Review insert failed for {}: {}", identity.username, e);
                match self.guard.rollback(identity, day).await {
                    Ok(count) => {
                        self.metrics.inc_rollbacks();
                        warn!("Returned quota slot to {} (now {} today)", identity.username, count);
                    }
                    Err(re) => error!("Quota rollback failed for {}: {}", identity.username, re),
                }
                Err(match e {
                    e @ ReviewError::WriteFailure(_) => e,
                    other => ReviewError::WriteFailure(other.to_string()),
                })
            }
        }
    }
}

fn validate(submission: &Submission, limits: &ReviewsConfig) -> Result<(String, Option<i64>), ReviewError> {
    let text = sanitize_review_text(submission.text.as_deref(), limits.max_review_chars)?;
    let score = normalize_score(submission.score.as_ref())?;
    Ok((text, score))
}
