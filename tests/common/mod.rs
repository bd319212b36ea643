#![allow(dead_code)]

use std::sync::Arc;

use anime_hub::clock::FixedClock;
use anime_hub::config::Config;
use anime_hub::counter::{DailyCounter, MemoryDailyCounter};
use anime_hub::server::{router, AppState};
use anime_hub::store::{MemoryReviewStore, ReviewStore};
use axum::body::{to_bytes, Body};
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use chrono::{Local, TimeZone};
use serde_json::Value;
use tower::ServiceExt;

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub clock: Arc<FixedClock>,
    pub store: Arc<dyn ReviewStore>,
}

pub fn noon() -> chrono::DateTime<Local> {
    Local.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()
}

pub fn memory_app(daily_limit: u32) -> TestApp {
    let store: Arc<dyn ReviewStore> = Arc::new(MemoryReviewStore::new());
    let counter: Arc<dyn DailyCounter> = Arc::new(MemoryDailyCounter::new());
    app_with(daily_limit, store, counter)
}

pub fn app_with(daily_limit: u32, store: Arc<dyn ReviewStore>, counter: Arc<dyn DailyCounter>) -> TestApp {
    let mut config = Config::default();
    config.reviews.daily_limit = daily_limit;

    let clock = Arc::new(FixedClock::new(noon()));
    let state = AppState::new(config, store.clone(), counter, clock.clone());
    TestApp { app: router(state.clone()), state, clock, store }
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, body)
}

pub fn post_review(anime_id: i64, body: &Value) -> Request<Body> {
    post_json(&format!("/api/anime/{}/reviews", anime_id), body)
}

pub fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}
