use axum::{Router, routing::get};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::info;

use crate::config::MetricsConfig;

#[derive(Default)]
pub struct Metrics {
    pub submissions_total: AtomicU64,
    pub submissions_admitted: AtomicU64,
    pub submissions_rate_limited: AtomicU64,
    pub validation_failures: AtomicU64,
    pub write_failures: AtomicU64,
    pub quota_rollbacks: AtomicU64,
    pub storage_errors: AtomicU64,
    pub reviews_deleted: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inc_submissions(&self) {
        self.submissions_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_admitted(&self) {
        self.submissions_admitted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rate_limited(&self) {
        self.submissions_rate_limited.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_validation_failures(&self) {
        self.validation_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_write_failures(&self) {
        self.write_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_rollbacks(&self) {
        self.quota_rollbacks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_storage_errors(&self) {
        self.storage_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_deleted(&self) {
        self.reviews_deleted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn format_prometheus(&self) -> String {
        let counters: [(&str, &str, &AtomicU64); 8] = [
            ("reviews_submissions_total", "Review submissions received", &self.submissions_total),
            ("reviews_submissions_admitted", "Submissions admitted by the daily limit", &self.submissions_admitted),
            ("reviews_submissions_rate_limited", "Submissions rejected by the daily limit", &self.submissions_rate_limited),
            ("reviews_validation_failures", "Submissions rejected by input validation", &self.validation_failures),
            ("reviews_write_failures", "Admitted reviews that failed to persist", &self.write_failures),
            ("reviews_quota_rollbacks", "Reserved quota slots returned after a failed write", &self.quota_rollbacks),
            ("reviews_storage_errors", "Rate window storage failures", &self.storage_errors),
            ("reviews_deleted", "Reviews deleted", &self.reviews_deleted),
        ];

        let mut out = String::new();
        for (name, help, value) in counters {
            out.push_str(&format!(
                "# HELP {name} {help}\n# TYPE {name} counter\n{name} {}\n",
                value.load(Ordering::Relaxed)
            ));
        }
        out
    }
}

pub async fn run_metrics_server(config: MetricsConfig, metrics: Arc<Metrics>) {
    if !config.enable {
        return;
    }

    let path = config.path.clone();
    let app = Router::new()
        .route(&path, get(move || {
            let m = metrics.clone();
            async move { m.format_prometheus() }
        }));

    let addr: std::net::SocketAddr = match config.bind_addr.parse() {
        Ok(a) => a,
        Err(e) => {
            tracing::error!("Invalid metrics bind address: {}", e);
            return;
        }
    };

    info!("Metrics server listening on {}{}", addr, path);

    match TcpListener::bind(addr).await {
        Ok(listener) => {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Metrics server stopped: {}", e);
            }
        }
        Err(e) => tracing::error!("Failed to bind metrics listener: {}", e),
    }
}
