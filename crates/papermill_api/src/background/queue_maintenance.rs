//! Periodic queue maintenance: stale-task reset and retention cleanup.
//!
//! A single long-lived task drives both passes on independent cadences
//! using `tokio::time::interval`. On startup both run once after a short
//! grace delay, so a restarted server recovers abandoned claims without
//! waiting a full interval.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use papermill_db::queue::QueueService;

use crate::config::ServerConfig;

/// Delay before the first maintenance pass after startup.
const STARTUP_GRACE: Duration = Duration::from_secs(10);

/// Thresholds and cadences for the maintenance loop.
#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    pub reset_interval: Duration,
    pub purge_interval: Duration,
    pub stale_timeout: chrono::Duration,
    pub retention: chrono::Duration,
}

impl MaintenanceConfig {
    pub fn from_server_config(config: &ServerConfig) -> Self {
        Self {
            reset_interval: Duration::from_secs(
                config.maintenance_reset_interval_minutes * 60,
            ),
            purge_interval: Duration::from_secs(
                config.maintenance_purge_interval_hours * 3600,
            ),
            stale_timeout: chrono::Duration::minutes(config.stale_timeout_minutes),
            retention: chrono::Duration::days(config.purge_retention_days),
        }
    }
}

/// Run the maintenance loop until `cancel` is triggered.
pub async fn run(queue: QueueService, config: MaintenanceConfig, cancel: CancellationToken) {
    tracing::info!(
        reset_interval_secs = config.reset_interval.as_secs(),
        purge_interval_secs = config.purge_interval.as_secs(),
        stale_timeout_mins = config.stale_timeout.num_minutes(),
        retention_days = config.retention.num_days(),
        "Queue maintenance started",
    );

    tokio::select! {
        _ = cancel.cancelled() => {
            tracing::info!("Queue maintenance stopping before first pass");
            return;
        }
        _ = tokio::time::sleep(STARTUP_GRACE) => {}
    }

    // Both tickers fire immediately on the first tick, giving the
    // run-once-after-grace behaviour.
    let mut reset_ticker = tokio::time::interval(config.reset_interval);
    let mut purge_ticker = tokio::time::interval(config.purge_interval);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("Queue maintenance stopping");
                break;
            }
            _ = reset_ticker.tick() => {
                match queue.reset_stale(config.stale_timeout).await {
                    Ok(0) => tracing::debug!("Stale reset: nothing to do"),
                    Ok(count) => tracing::warn!(count, "Stale reset: requeued abandoned tasks"),
                    Err(e) => tracing::error!(error = %e, "Stale reset failed"),
                }
            }
            _ = purge_ticker.tick() => {
                match queue.purge_old(config.retention).await {
                    Ok(0) => tracing::debug!("Retention purge: nothing to do"),
                    Ok(count) => tracing::info!(count, "Retention purge: deleted old tasks"),
                    Err(e) => tracing::error!(error = %e, "Retention purge failed"),
                }
            }
        }
    }
}
