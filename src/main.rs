use anyhow::Result;
use tracing::{info, warn};
use std::time::Duration;

use anime_hub::config;
use anime_hub::metrics::run_metrics_server;
use anime_hub::server::{self, AppState};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("anime_hub=info".parse()?)
        )
        .init();

    info!("Starting anime-hub");

    let config = config::load_config()?;
    info!("Configuration loaded");
    info!("Server: {}", config.server.bind_addr);
    info!("Daily review limit: {}", config.reviews.daily_limit);

    let state = AppState::from_config(config.clone()).await?;

    tokio::spawn(run_metrics_server(config.metrics.clone(), state.metrics.clone()));

    // Periodic eviction of past rate windows and idle identity locks
    let coordinator = state.coordinator.clone();
    let interval_secs = config.maintenance.interval_secs.max(1);
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(interval_secs));
        loop {
            interval.tick().await;
            match coordinator.maintain().await {
                Ok((windows, locks)) => {
                    info!("Maintenance: evicted {} rate windows, pruned {} idle locks", windows, locks)
                }
                Err(e) => warn!("Maintenance failed: {}", e),
            }
        }
    });

    server::run(state).await?;

    Ok(())
}
