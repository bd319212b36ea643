use axum::{
    Json, Router,
    routing::{delete, get},
    response::IntoResponse,
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
};
use tower_http::cors::{CorsLayer, Any};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use std::net::SocketAddr;
use std::sync::Arc;
use anyhow::Result;

use crate::activity::{ActivityAction, ActivityFilter, ActivityLog};
use crate::clock::{Clock, SystemClock};
use crate::config::{Config, StorageBackend};
use crate::coordinator::{ReviewWriteCoordinator, Submission};
use crate::counter::{DailyCounter, MemoryDailyCounter};
use crate::error::ReviewError;
use crate::identity::{Auth, Identity};
use crate::metrics::Metrics;
use crate::protocol::{
    CreatedBody, DataBody, HealthBody, LogActionBody, LogStatsBody, LogsBody, LogsQuery, MessageBody,
    QuotaPayload, QuotaQuery, ReviewBody, StatsBody,
};
use crate::ratelimit::RateLimitedSubmissionGuard;
use crate::review::Review;
use crate::sqlite::{self, SqliteDailyCounter, SqliteReviewStore};
use crate::store::{MemoryReviewStore, ReviewStore};

const DEFAULT_LOG_LIMIT: usize = 50;
const MAX_LOG_LIMIT: usize = 500;
const MAX_ACTION_CHARS: usize = 64;

#[derive(Clone)]
pub struct AppState {
    pub coordinator: Arc<ReviewWriteCoordinator>,
    pub activity: Arc<ActivityLog>,
    pub metrics: Arc<Metrics>,
    pub config: Config,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ReviewStore>,
        counter: Arc<dyn DailyCounter>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let metrics = Arc::new(Metrics::new());
        let activity = Arc::new(ActivityLog::new(config.activity.capacity));
        let guard = Arc::new(RateLimitedSubmissionGuard::new(counter, config.reviews.daily_limit));
        let coordinator = Arc::new(ReviewWriteCoordinator::new(
            guard,
            store,
            clock,
            activity.clone(),
            metrics.clone(),
            config.reviews.clone(),
        ));
        Self { coordinator, activity, metrics, config }
    }

    /// Wires storage according to `[storage]`.
    pub async fn from_config(config: Config) -> Result<Self, ReviewError> {
        let (store, counter): (Arc<dyn ReviewStore>, Arc<dyn DailyCounter>) = match config.storage.backend {
            StorageBackend::Memory => {
                warn!("Using in-memory storage; reviews and quotas are lost on restart");
                (
                    Arc::new(MemoryReviewStore::new()),
                    Arc::new(MemoryDailyCounter::new()),
                )
            }
            StorageBackend::Sqlite => {
                let pool = sqlite::connect(&config.storage.database_url, config.storage.max_connections).await?;
                (
                    Arc::new(SqliteReviewStore::new(pool.clone())),
                    Arc::new(SqliteDailyCounter::new(pool)),
                )
            }
        };
        Ok(Self::new(config, store, counter, Arc::new(SystemClock)))
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/stats", get(stats_handler))
        .route("/api/anime/:id/reviews", get(list_reviews).post(create_review))
        .route("/api/reviews/quota", get(quota_handler))
        .route("/api/reviews/:id", delete(delete_review))
        .route("/api/logs", get(logs_handler).post(log_action_handler))
        .route("/api/logs/stats", get(log_stats_handler))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::new().allow_origin(Any).allow_methods(Any).allow_headers(Any))
        .with_state(state)
}

pub async fn run(state: AppState) -> Result<()> {
    let addr: SocketAddr = state.config.server.bind_addr.parse()?;
    let app = router(state);

    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let storage = state.coordinator.store().backend_name();
    (StatusCode::OK, Json(HealthBody { ok: true, storage }))
}

async fn stats_handler(State(state): State<AppState>) -> impl IntoResponse {
    let guard = state.coordinator.guard();
    Json(StatsBody {
        active_locks: guard.active_locks(),
        daily_limit: guard.limit(),
    })
}

async fn list_reviews(
    State(state): State<AppState>,
    Path(anime_id): Path<i64>,
) -> Result<Json<DataBody<Vec<Review>>>, ReviewError> {
    let reviews = state.coordinator.list(anime_id).await?;
    Ok(Json(DataBody::ok(reviews)))
}

async fn create_review(
    State(state): State<AppState>,
    Path(anime_id): Path<i64>,
    Auth(auth): Auth,
    body: Result<Json<ReviewBody>, JsonRejection>,
) -> Result<(StatusCode, Json<CreatedBody>), ReviewError> {
    let Json(body) = body.map_err(|e| {
        warn!("Malformed review body: {}", e);
        ReviewError::Validation(e.body_text())
    })?;

    let max_name = state.config.reviews.max_username_chars;
    let submission = Submission {
        anime_id,
        identity: Identity::resolve(auth.as_ref(), body.user.as_deref(), max_name),
        score: body.score,
        text: body.review,
    };

    let created = state.coordinator.submit(submission).await?;
    Ok((StatusCode::CREATED, Json(created.into())))
}

async fn delete_review(
    State(state): State<AppState>,
    Path(id): Path<i64>,
    Auth(auth): Auth,
) -> Result<Json<MessageBody>, ReviewError> {
    let max_name = state.config.reviews.max_username_chars;
    let actor = Identity::resolve(auth.as_ref(), None, max_name);
    state.coordinator.delete(id, &actor).await?;
    Ok(Json(MessageBody::ok("Review deleted")))
}

async fn quota_handler(
    State(state): State<AppState>,
    Auth(auth): Auth,
    Query(query): Query<QuotaQuery>,
) -> Result<Json<DataBody<QuotaPayload>>, ReviewError> {
    let max_name = state.config.reviews.max_username_chars;
    let identity = Identity::resolve(auth.as_ref(), query.user.as_deref(), max_name);
    let quota = state.coordinator.quota(&identity).await?;
    Ok(Json(DataBody::ok(quota.into())))
}

async fn logs_handler(
    State(state): State<AppState>,
    Query(query): Query<LogsQuery>,
) -> Result<Json<LogsBody>, ReviewError> {
    let action = query
        .action
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .map(ActivityAction::parse);

    let filter = ActivityFilter {
        user_id: query.user_id,
        username: query.username.filter(|u| !u.is_empty()),
        action,
        limit: query.limit.unwrap_or(DEFAULT_LOG_LIMIT).min(MAX_LOG_LIMIT),
    };
    Ok(Json(DataBody::ok(state.activity.recent(&filter))))
}

async fn log_action_handler(
    State(state): State<AppState>,
    Auth(auth): Auth,
    body: Result<Json<LogActionBody>, JsonRejection>,
) -> Result<Json<MessageBody>, ReviewError> {
    let Json(body) = body.map_err(|e| ReviewError::Validation(e.body_text()))?;

    let action = body
        .action
        .as_deref()
        .map(str::trim)
        .filter(|a| !a.is_empty())
        .ok_or_else(|| ReviewError::Validation("Action is required".into()))?;
    if action.chars().count() > MAX_ACTION_CHARS {
        return Err(ReviewError::Validation(format!(
            "Action must be at most {} characters",
            MAX_ACTION_CHARS
        )));
    }

    let max_name = state.config.reviews.max_username_chars;
    let (user_id, username) = match auth {
        Some(ctx) => (ctx.user_id, ctx.username),
        None => (
            body.user_id,
            body.username
                .as_deref()
                .map(str::trim)
                .filter(|u| !u.is_empty())
                .map(|u| u.chars().take(max_name).collect())
                .unwrap_or_else(|| "anonymous".to_string()),
        ),
    };

    state.activity.record(
        user_id,
        &username,
        ActivityAction::parse(action),
        body.details.unwrap_or_else(|| serde_json::json!({})),
    );
    Ok(Json(MessageBody::ok("Action logged")))
}

async fn log_stats_handler(State(state): State<AppState>) -> Json<LogStatsBody> {
    Json(DataBody::ok(state.activity.stats(chrono::Utc::now())))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
