use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::activity::{ActivityEntry, ActivityStats};
use crate::coordinator::{Created, Quota};
use crate::review::Review;

// Request bodies
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReviewBody {
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub score: Option<Value>,
    #[serde(default)]
    pub review: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuotaQuery {
    pub user: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogActionBody {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub action: Option<String>,
    #[serde(default)]
    pub details: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LogsQuery {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: Option<String>,
    pub limit: Option<usize>,
}

// Response envelopes
#[derive(Debug, Clone, Serialize)]
pub struct DataBody<T> {
    pub success: bool,
    pub data: T,
}

impl<T> DataBody<T> {
    pub fn ok(data: T) -> Self {
        Self { success: true, data }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MessageBody {
    pub success: bool,
    pub message: String,
}

impl MessageBody {
    pub fn ok(message: impl Into<String>) -> Self {
        Self { success: true, message: message.into() }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reviews_today: Option<u32>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreatedBody {
    pub success: bool,
    pub data: Review,
    pub reviews_today: u32,
    pub remaining_today: u32,
}

impl From<Created> for CreatedBody {
    fn from(c: Created) -> Self {
        Self {
            success: true,
            data: c.review,
            reviews_today: c.reviews_today,
            remaining_today: c.remaining_today,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuotaPayload {
    pub reviews_today: u32,
    pub remaining_today: u32,
    pub limit: u32,
}

impl From<Quota> for QuotaPayload {
    fn from(q: Quota) -> Self {
        Self {
            reviews_today: q.reviews_today,
            remaining_today: q.remaining_today,
            limit: q.limit,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthBody {
    pub ok: bool,
    pub storage: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatsBody {
    pub active_locks: usize,
    pub daily_limit: u32,
}

pub type LogsBody = DataBody<Vec<ActivityEntry>>;
pub type LogStatsBody = DataBody<ActivityStats>;

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn review_body_tolerates_missing_fields() {
        let body: ReviewBody = serde_json::from_value(json!({"review": "ok"})).unwrap();
        assert!(body.user.is_none());
        assert!(body.score.is_none());
        assert_eq!(body.review.as_deref(), Some("ok"));
    }

    #[test]
    fn log_action_body_uses_camel_case() {
        let body: LogActionBody =
            serde_json::from_value(json!({"userId": 4, "action": "search", "details": {"q": "eva"}})).unwrap();
        assert_eq!(body.user_id, Some(4));
        assert!(body.username.is_none());
        assert_eq!(body.action.as_deref(), Some("search"));
        assert_eq!(body.details, Some(json!({"q": "eva"})));
    }

    #[test]
    fn error_body_omits_count_when_absent() {
        let body = ErrorBody { success: false, message: "nope".into(), reviews_today: None };
        assert_eq!(serde_json::to_value(&body).unwrap(), json!({"success": false, "message": "nope"}));

        let body = ErrorBody { success: false, message: "limit".into(), reviews_today: Some(10) };
        assert_eq!(serde_json::to_value(&body).unwrap()["reviewsToday"], json!(10));
    }
}
