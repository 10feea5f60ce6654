//! Notification Worker (spec §4.5): summarizes a diff batch and delivers it
//! through a pluggable sink, then marks the diffs sent.

use crate::job::{AlertNotification, NotificationJob};
use crate::stats::WorkerStatsHandle;
use invpipe_core::error::Result;
use invpipe_core::shutdown::ShutdownHandle;
use invpipe_database::repository::DiffRepository;
use invpipe_database::InventoryDiffRow;
use invpipe_queue::{QueueManager, QueueMessage};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

/// Diffs are marked sent in sub-batches under a single context budget
/// (spec §4.5 step 4).
const MARK_SENT_CHUNK: usize = 50;

/// Where a formatted notification goes. The log sink is the only
/// implementation today; downstream channels (webhook, email) plug in here
/// without touching the worker loop. Delivery is at-least-once — a sink may
/// be invoked more than once for the same job if the worker crashes between
/// delivery and the subsequent `mark_sent` calls, so implementations must
/// tolerate duplicates.
#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, summary: &str, severity: &str);
}

/// Logs the formatted summary at INFO. The default and, for now, only sink.
pub struct LogSink;

#[async_trait::async_trait]
impl NotificationSink for LogSink {
    async fn deliver(&self, summary: &str, severity: &str) {
        info!(severity, "{summary}");
    }
}

pub struct NotificationWorker {
    queue: Arc<QueueManager>,
    queue_name: String,
    diffs: DiffRepository,
    sink: Arc<dyn NotificationSink>,
    dequeue_timeout: Duration,
    stats: WorkerStatsHandle,
}

impl NotificationWorker {
    pub fn new(
        queue: Arc<QueueManager>,
        queue_name: impl Into<String>,
        diffs: DiffRepository,
        sink: Arc<dyn NotificationSink>,
        dequeue_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            diffs,
            sink,
            dequeue_timeout,
            stats: WorkerStatsHandle::new("notification"),
        }
    }

    pub fn stats(&self) -> WorkerStatsHandle {
        self.stats.clone()
    }

    pub async fn run(&self, shutdown: ShutdownHandle) {
        info!(queue = %self.queue_name, "notification worker started");

        while !shutdown.is_shutting_down() {
            let message = match self.queue.dequeue(&self.queue_name, self.dequeue_timeout).await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "notification worker dequeue failed");
                    continue;
                }
            };

            if let Err(e) = self.handle_message(message.clone()).await {
                warn!(job_id = %message.id, error = %e, "failed to deliver notification, requeuing");
                self.stats.record_failed();
                if let Err(e) = self.queue.requeue(&self.queue_name, message).await {
                    warn!(error = %e, "failed to requeue notification job");
                }
                continue;
            }

            self.stats.record_processed();
        }

        info!("notification worker stopped");
    }

    async fn handle_message(&self, message: QueueMessage) -> Result<()> {
        let job: NotificationJob = serde_json::from_value(message.payload)
            .map_err(|e| invpipe_core::error::Error::serialization(e.to_string()))?;

        match job {
            NotificationJob::Diff {
                system_id,
                record_id,
                diff_ids,
                summary,
                severity,
            } => {
                let diffs = self.diffs.get_by_ids(&diff_ids).await?;
                let rendered = format_diff_summary(system_id, record_id, &summary, &severity, &diffs);
                self.sink.deliver(&rendered, &severity).await;

                for chunk in diff_ids.chunks(MARK_SENT_CHUNK) {
                    for id in chunk {
                        self.diffs.mark_sent(*id).await?;
                    }
                }
            }
            NotificationJob::Alert { alert } => {
                let rendered = format_alert(&alert);
                self.sink.deliver(&rendered, &alert.severity).await;
            }
            NotificationJob::SystemStatus {
                system_id,
                message,
                severity,
            } => {
                let rendered = format_system_status(system_id, &message);
                self.sink.deliver(&rendered, &severity).await;
            }
        }

        Ok(())
    }
}

/// Groups diffs by category and renders a `+`/`~`/`-` line per change.
fn format_diff_summary(
    system_id: Uuid,
    record_id: i64,
    summary: &str,
    severity: &str,
    diffs: &[InventoryDiffRow],
) -> String {
    let mut by_category: BTreeMap<&str, Vec<&InventoryDiffRow>> = BTreeMap::new();
    for diff in diffs {
        by_category.entry(diff.category.as_str()).or_default().push(diff);
    }

    let mut out = format!("system {system_id} record {record_id}: {summary} ({severity})");

    for (category, rows) in by_category {
        out.push_str(&format!("\n[{category}]"));
        for row in rows {
            let marker = match row.diff_type.as_str() {
                "create" => "+",
                "delete" => "-",
                _ => "~",
            };
            out.push_str(&format!("\n  {marker} {}", row.field_path));
        }
    }

    out
}

/// Renders an operational alert raised outside the diff pipeline.
fn format_alert(alert: &AlertNotification) -> String {
    match alert.system_id {
        Some(system_id) => format!(
            "alert [{}] system {system_id}: {} ({})",
            alert.alert_type, alert.message, alert.severity
        ),
        None => format!("alert [{}]: {} ({})", alert.alert_type, alert.message, alert.severity),
    }
}

/// Renders a health/lifecycle status change for a system, or the pipeline as
/// a whole when `system_id` is absent.
fn format_system_status(system_id: Option<Uuid>, message: &str) -> String {
    match system_id {
        Some(system_id) => format!("system {system_id}: {message}"),
        None => message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn diff_row(category: &str, diff_type: &str, field_path: &str) -> InventoryDiffRow {
        InventoryDiffRow {
            id: 1,
            system_id: Uuid::nil(),
            previous_id: Some(1),
            current_id: 2,
            diff_type: diff_type.to_string(),
            field_path: field_path.to_string(),
            previous_value: None,
            current_value: None,
            severity: "medium".to_string(),
            category: category.to_string(),
            notification_sent: false,
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_format_diff_summary_groups_by_category_with_markers() {
        let diffs = vec![
            diff_row("network", "update", "networking.fqdn"),
            diff_row("hardware", "create", "hardware.disks[1]"),
        ];
        let summary = format_diff_summary(Uuid::nil(), 2, "2 field(s) changed", "high", &diffs);
        assert!(summary.contains("[hardware]"));
        assert!(summary.contains("+ hardware.disks[1]"));
        assert!(summary.contains("~ networking.fqdn"));
    }

    #[test]
    fn test_format_alert_includes_system_id_when_present() {
        let alert = AlertNotification {
            system_id: Some(Uuid::nil()),
            alert_type: "retry_ceiling".to_string(),
            message: "diff job exceeded max attempts".to_string(),
            severity: "high".to_string(),
        };
        let rendered = format_alert(&alert);
        assert!(rendered.contains("retry_ceiling"));
        assert!(rendered.contains(&Uuid::nil().to_string()));
    }

    #[test]
    fn test_format_system_status_without_system_id_is_pipeline_wide() {
        let rendered = format_system_status(None, "delayed-queue promotion unavailable");
        assert_eq!(rendered, "delayed-queue promotion unavailable");
    }
}
