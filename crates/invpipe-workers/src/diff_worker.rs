//! Diff Worker (spec §4.4): loads the predecessor snapshot, runs the diff
//! engine, persists significant changes, and raises a notification job.

use crate::job::{DiffJob, NotificationJob};
use crate::stats::WorkerStatsHandle;
use invpipe_core::error::Result;
use invpipe_core::shutdown::ShutdownHandle;
use invpipe_database::repository::{AlertRepository, DiffRepository, InventoryRepository, NewDiff};
use invpipe_database::InventoryAlertRow;
use invpipe_queue::{QueueManager, QueueMessage, RequeueOutcome};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Paths that change on every snapshot and carry no operational meaning
/// (spec §4.4 step 3 — "filtered via an ignore list of volatile paths").
const IGNORED_PREFIXES: &[&str] = &["facts.timestamp", "facts.uptime", "facts.cluster.last_seen"];

/// Diffs are persisted in sub-batches of this size under the worker's
/// transaction budget (spec §4.4 step 4).
const DIFF_INSERT_CHUNK: usize = 100;

pub struct DiffWorker {
    queue: Arc<QueueManager>,
    queue_name: String,
    notification_queue_name: String,
    inventory: InventoryRepository,
    diffs: DiffRepository,
    alerts: AlertRepository,
    dequeue_timeout: Duration,
    stats: WorkerStatsHandle,
}

impl DiffWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        queue: Arc<QueueManager>,
        queue_name: impl Into<String>,
        notification_queue_name: impl Into<String>,
        inventory: InventoryRepository,
        diffs: DiffRepository,
        alerts: AlertRepository,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            notification_queue_name: notification_queue_name.into(),
            inventory,
            diffs,
            alerts,
            dequeue_timeout,
            stats: WorkerStatsHandle::new("diff"),
        }
    }

    pub fn stats(&self) -> WorkerStatsHandle {
        self.stats.clone()
    }

    pub async fn run(&self, shutdown: ShutdownHandle) {
        info!(queue = %self.queue_name, "diff worker started");

        while !shutdown.is_shutting_down() {
            let message = match self.queue.dequeue(&self.queue_name, self.dequeue_timeout).await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "diff worker dequeue failed");
                    continue;
                }
            };

            if let Err(e) = self.handle_message(message.clone()).await {
                warn!(job_id = %message.id, error = %e, "failed to process diff job, requeuing");
                self.stats.record_failed();
                let system_id = serde_json::from_value::<DiffJob>(message.payload.clone())
                    .ok()
                    .map(|job| job.system_id);
                match self.queue.requeue(&self.queue_name, message).await {
                    Ok(RequeueOutcome::Requeued) => {}
                    Ok(RequeueOutcome::Failed) => self.raise_retry_ceiling_alert(system_id, &e).await,
                    Err(e) => warn!(error = %e, "failed to requeue diff job"),
                }
                continue;
            }

            self.stats.record_processed();
        }

        info!("diff worker stopped");
    }

    async fn handle_message(&self, message: QueueMessage) -> Result<()> {
        let job: DiffJob = serde_json::from_value(message.payload)
            .map_err(|e| invpipe_core::error::Error::serialization(e.to_string()))?;

        let current = self
            .inventory
            .get(job.record_id)
            .await?
            .ok_or_else(|| {
                invpipe_core::error::Error::not_found("inventory_record", job.record_id.to_string())
            })?;

        let predecessor = self
            .inventory
            .latest_processed_before(job.system_id, job.record_id)
            .await?;

        let Some(predecessor) = predecessor else {
            // First snapshot for this system: nothing to diff against, but
            // the record still needs to end up processed (spec §4.4 step 1).
            self.inventory.mark_processed(job.record_id, false, 0).await?;
            return Ok(());
        };

        let raw_diffs = invpipe_diff::diff(&predecessor.data, &current.data);
        let significant = invpipe_diff::filter_significant(raw_diffs, IGNORED_PREFIXES);

        if significant.is_empty() {
            self.inventory.mark_processed(job.record_id, false, 0).await?;
            return Ok(());
        }

        let new_diffs: Vec<NewDiff> = significant
            .iter()
            .map(|d| NewDiff {
                system_id: job.system_id,
                previous_id: Some(predecessor.id),
                current_id: job.record_id,
                diff_type: d.diff_type.to_string(),
                field_path: d.field_path.clone(),
                previous_value: d.previous_value.clone(),
                current_value: d.current_value.clone(),
                severity: d.severity.to_string(),
                category: d.category.to_string(),
            })
            .collect();

        let mut diff_ids = Vec::with_capacity(new_diffs.len());
        for chunk in new_diffs.chunks(DIFF_INSERT_CHUNK) {
            let ids = self.diffs.insert_batch(chunk).await?;
            diff_ids.extend(ids);
        }

        self.inventory
            .mark_processed(job.record_id, true, significant.len() as i32)
            .await?;

        let severity = invpipe_diff::max_severity(&significant)
            .map(|s| s.to_string())
            .unwrap_or_else(|| "low".to_string());

        let notification = NotificationJob::Diff {
            system_id: job.system_id,
            record_id: job.record_id,
            diff_ids,
            summary: format!("{} field(s) changed", significant.len()),
            severity,
        };

        let payload = serde_json::to_value(&notification)
            .map_err(|e| invpipe_core::error::Error::serialization(e.to_string()))?;
        self.queue.enqueue(&self.notification_queue_name, payload).await?;

        Ok(())
    }

    /// A diff job that exceeded the retry ceiling is a health warning, not
    /// just a log line (spec §4.4's failure semantics).
    async fn raise_retry_ceiling_alert(&self, system_id: Option<Uuid>, cause: &invpipe_core::error::Error) {
        let alert = InventoryAlertRow {
            id: Uuid::new_v4(),
            system_id,
            alert_type: "diff_retry_ceiling_exceeded".to_string(),
            message: format!("diff job exceeded max retry attempts: {cause}"),
            severity: "high".to_string(),
            is_resolved: false,
            resolved_at: None,
            created_at: chrono::Utc::now(),
        };
        if let Err(e) = self.alerts.insert(&alert).await {
            warn!(error = %e, "failed to record retry-ceiling alert");
        }
    }
}
