//! Cleanup Worker (spec §4.7): periodic retention pruning across inventory
//! records, diffs, and resolved alerts.

use chrono::{Duration, Utc};
use invpipe_core::shutdown::ShutdownHandle;
use invpipe_database::repository::{AlertRepository, DiffRepository, InventoryRepository};
use std::time::Duration as StdDuration;
use tracing::{info, warn};

/// Resolved alerts older than 30 days are pruned (spec §4.7).
const RESOLVED_ALERT_RETENTION_DAYS: i64 = 30;

/// Low/medium diffs are pruned after `max_age`; high/critical diffs get
/// double that window (spec §4.7).
const LOW_MEDIUM_SEVERITIES: &[&str] = &["low", "medium"];
const HIGH_CRITICAL_SEVERITIES: &[&str] = &["high", "critical"];

pub struct CleanupConfig {
    pub record_retention_per_system: i64,
    /// The spec's single `max_age` (spec §4.7): the age cutoff for inventory
    /// records and low/medium diffs; high/critical diffs get double this.
    pub max_age: Duration,
    pub run_interval: StdDuration,
}

pub struct CleanupWorker {
    inventory: InventoryRepository,
    diffs: DiffRepository,
    alerts: AlertRepository,
    config: CleanupConfig,
}

impl CleanupWorker {
    pub fn new(
        inventory: InventoryRepository,
        diffs: DiffRepository,
        alerts: AlertRepository,
        config: CleanupConfig,
    ) -> Self {
        Self { inventory, diffs, alerts, config }
    }

    pub async fn run(&self, shutdown: ShutdownHandle) {
        info!(interval_secs = self.config.run_interval.as_secs(), "cleanup worker started");

        let mut ticker = tokio::time::interval(self.config.run_interval);
        while !shutdown.is_shutting_down() {
            ticker.tick().await;
            self.tick().await;
        }

        info!("cleanup worker stopped");
    }

    pub async fn tick(&self) {
        let record_cutoff = Utc::now() - self.config.max_age;
        match self
            .inventory
            .delete_beyond_retention(self.config.record_retention_per_system, record_cutoff)
            .await
        {
            Ok(count) => {
                if count > 0 {
                    info!(count, "pruned inventory records beyond retention");
                }
            }
            Err(e) => warn!(error = %e, "failed to prune inventory records"),
        }

        let low_cutoff = Utc::now() - self.config.max_age;
        match self.diffs.delete_older_than(low_cutoff, LOW_MEDIUM_SEVERITIES).await {
            Ok(count) if count > 0 => info!(count, "pruned low/medium diffs"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to prune low/medium diffs"),
        }

        let high_cutoff = Utc::now() - self.config.max_age * 2;
        match self.diffs.delete_older_than(high_cutoff, HIGH_CRITICAL_SEVERITIES).await {
            Ok(count) if count > 0 => info!(count, "pruned high/critical diffs"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to prune high/critical diffs"),
        }

        let alert_cutoff = Utc::now() - Duration::days(RESOLVED_ALERT_RETENTION_DAYS);
        match self.alerts.delete_resolved_older_than(alert_cutoff).await {
            Ok(count) if count > 0 => info!(count, "pruned resolved alerts"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "failed to prune resolved alerts"),
        }
    }
}
