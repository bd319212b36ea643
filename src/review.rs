use chrono::{NaiveDate, NaiveTime, Timelike};
use serde::Serialize;
use serde_json::Value;

use crate::error::ReviewError;

pub const MAX_SCORE: i64 = 10;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Review {
    pub id: i64,
    pub anime_id: i64,
    #[serde(rename = "user")]
    pub username: String,
    pub score: Option<i64>,
    pub review: String,
    #[serde(rename = "postDate")]
    pub post_date: NaiveDate,
    #[serde(rename = "postTime")]
    pub post_time: NaiveTime,
}

/// A review that passed validation and admission, not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewReview {
    pub anime_id: i64,
    pub username: String,
    pub score: Option<i64>,
    pub review: String,
    pub post_date: NaiveDate,
    pub post_time: NaiveTime,
}

impl NewReview {
    pub fn into_review(self, id: i64) -> Review {
        Review {
            id,
            anime_id: self.anime_id,
            username: self.username,
            score: self.score,
            review: self.review,
            post_date: self.post_date,
            post_time: self.post_time,
        }
    }
}

/// Whole seconds only, matching the stored `HH:MM:SS` form.
pub fn post_time(time: NaiveTime) -> NaiveTime {
    time.with_nanosecond(0).unwrap_or(time)
}

/// Absent, null and blank scores mean "no score". Anything numeric is
/// rounded and clamped to 0..=10; other values are rejected.
pub fn normalize_score(input: Option<&Value>) -> Result<Option<i64>, ReviewError> {
    let n = match input {
        None | Some(Value::Null) => return Ok(None),
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) if s.trim().is_empty() => return Ok(None),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        Some(_) => None,
    };

    match n {
        Some(n) if n.is_finite() => Ok(Some((n.round() as i64).clamp(0, MAX_SCORE))),
        _ => Err(ReviewError::Validation("Score must be a number between 0 and 10".into())),
    }
}

pub fn sanitize_review_text(input: Option<&str>, max_chars: usize) -> Result<String, ReviewError> {
    let trimmed = input.unwrap_or_default().trim();
    if trimmed.is_empty() {
        return Err(ReviewError::Validation("Review text is required".into()));
    }
    Ok(trimmed.chars().take(max_chars).collect())
}
