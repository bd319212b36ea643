use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::{BTreeMap, VecDeque};

/// Recorded action. Review writes use the named variants; anything a client
/// reports (`view_anime`, `search`, `login`, ...) is kept as `Other`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ActivityAction {
    AddReview,
    ReviewRateLimited,
    DeleteReview,
    Other(String),
}

impl ActivityAction {
    pub fn parse(s: &str) -> Self {
        match s {
            "add_review" => Self::AddReview,
            "review_rate_limited" => Self::ReviewRateLimited,
            "delete_review" => Self::DeleteReview,
            other => Self::Other(other.to_string()),
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::AddReview => "add_review",
            Self::ReviewRateLimited => "review_rate_limited",
            Self::DeleteReview => "delete_review",
            Self::Other(name) => name,
        }
    }
}

impl Serialize for ActivityAction {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityEntry {
    pub user_id: Option<i64>,
    pub username: String,
    pub action: ActivityAction,
    pub details: Value,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Default, Clone)]
pub struct ActivityFilter {
    pub user_id: Option<i64>,
    pub username: Option<String>,
    pub action: Option<ActivityAction>,
    pub limit: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionCount {
    pub action: ActivityAction,
    pub count: u64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActivityStats {
    pub total_actions: u64,
    pub action_breakdown: Vec<ActionCount>,
    pub period: &'static str,
}

/// Bounded, newest-last log of review activity. The oldest entry is
/// dropped once `capacity` is reached.
pub struct ActivityLog {
    entries: Mutex<VecDeque<ActivityEntry>>,
    capacity: usize,
}

impl ActivityLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: Mutex::new(VecDeque::with_capacity(capacity.min(4096))),
            capacity,
        }
    }

    pub fn record(&self, user_id: Option<i64>, username: &str, action: ActivityAction, details: Value) {
        self.push(ActivityEntry {
            user_id,
            username: username.to_string(),
            action,
            details,
            timestamp: Utc::now(),
        });
    }

    pub fn push(&self, entry: ActivityEntry) {
        let mut entries = self.entries.lock();
        if entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry);
    }

    /// Newest first.
    pub fn recent(&self, filter: &ActivityFilter) -> Vec<ActivityEntry> {
        self.entries
            .lock()
            .iter()
            .rev()
            .filter(|e| filter.user_id.map_or(true, |id| e.user_id == Some(id)))
            .filter(|e| filter.username.as_deref().map_or(true, |u| e.username == u))
            .filter(|e| filter.action.as_ref().map_or(true, |a| &e.action == a))
            .take(filter.limit)
            .cloned()
            .collect()
    }

    pub fn stats(&self, now: DateTime<Utc>) -> ActivityStats {
        let since = now - Duration::hours(24);
        let mut counts: BTreeMap<ActivityAction, u64> = BTreeMap::new();

        for entry in self.entries.lock().iter().filter(|e| e.timestamp >= since) {
            *counts.entry(entry.action.clone()).or_insert(0) += 1;
        }

        let total_actions = counts.values().sum();
        let mut action_breakdown: Vec<ActionCount> = counts
            .into_iter()
            .map(|(action, count)| ActionCount { action, count })
            .collect();
        action_breakdown.sort_by(|a, b| b.count.cmp(&a.count));

        ActivityStats { total_actions, action_breakdown, period: "last_24_hours" }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn capacity_drops_oldest() {
        let log = ActivityLog::new(2);
        log.record(None, "a", ActivityAction::AddReview, json!({"n": 1}));
        log.record(None, "a", ActivityAction::AddReview, json!({"n": 2}));
        log.record(None, "a", ActivityAction::AddReview, json!({"n": 3}));

        let all = log.recent(&ActivityFilter { limit: 10, ..Default::default() });
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].details, json!({"n": 3}));
        assert_eq!(all[1].details, json!({"n": 2}));
    }

    #[test]
    fn filters_by_user_and_action() {
        let log = ActivityLog::new(10);
        log.record(Some(1), "alice", ActivityAction::AddReview, Value::Null);
        log.record(None, "bob", ActivityAction::ReviewRateLimited, Value::Null);
        log.record(Some(1), "alice", ActivityAction::DeleteReview, Value::Null);

        let alice = log.recent(&ActivityFilter {
            username: Some("alice".into()),
            limit: 10,
            ..Default::default()
        });
        assert_eq!(alice.len(), 2);

        let by_id = log.recent(&ActivityFilter { user_id: Some(1), limit: 10, ..Default::default() });
        assert_eq!(by_id.len(), 2);
        assert!(by_id.iter().all(|e| e.username == "alice"));

        let limited = log.recent(&ActivityFilter {
            action: Some(ActivityAction::ReviewRateLimited),
            limit: 10,
            ..Default::default()
        });
        assert_eq!(limited.len(), 1);
        assert_eq!(limited[0].username, "bob");
    }

    #[test]
    fn stats_cover_last_day_only() {
        let log = ActivityLog::new(10);
        let now = Utc::now();
        log.push(ActivityEntry {
            user_id: None,
            username: "old".into(),
            action: ActivityAction::AddReview,
            details: Value::Null,
            timestamp: now - Duration::hours(30),
        });
        log.record(None, "x", ActivityAction::AddReview, Value::Null);
        log.record(None, "x", ActivityAction::AddReview, Value::Null);
        log.record(None, "x", ActivityAction::DeleteReview, Value::Null);

        let stats = log.stats(now + Duration::seconds(1));
        assert_eq!(stats.total_actions, 3);
        assert_eq!(stats.action_breakdown[0].action, ActivityAction::AddReview);
        assert_eq!(stats.action_breakdown[0].count, 2);
    }

    #[test]
    fn action_names_round_trip() {
        assert_eq!(ActivityAction::parse("add_review"), ActivityAction::AddReview);
        assert_eq!(ActivityAction::parse("login"), ActivityAction::Other("login".into()));
        assert_eq!(serde_json::to_value(ActivityAction::ReviewRateLimited).unwrap(), json!("review_rate_limited"));
        assert_eq!(serde_json::to_value(ActivityAction::parse("view_anime")).unwrap(), json!("view_anime"));
    }

    #[test]
    fn client_actions_are_counted_by_name() {
        let log = ActivityLog::new(10);
        log.record(None, "anonymous", ActivityAction::parse("search"), json!({"q": "mecha"}));
        log.record(None, "anonymous", ActivityAction::parse("search"), Value::Null);
        log.record(Some(3), "kira", ActivityAction::AddReview, Value::Null);

        let stats = log.stats(Utc::now() + Duration::seconds(1));
        assert_eq!(stats.total_actions, 3);
        assert_eq!(stats.action_breakdown[0].action, ActivityAction::Other("search".into()));
        assert_eq!(stats.action_breakdown[0].count, 2);

        let searches = log.recent(&ActivityFilter {
            action: Some(ActivityAction::parse("search")),
            limit: 10,
            ..Default::default()
        });
        assert_eq!(searches.len(), 2);
    }
}
