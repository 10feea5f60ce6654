//! Typed payloads carried by each queue, encoded into/out of the generic
//! [`invpipe_queue::QueueMessage`] JSON body.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Payload on the ingestion queue: a raw inventory snapshot, not yet hashed
/// or stored (spec §4.2/§4.3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestJob {
    pub system_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub data: serde_json::Value,
}

/// Payload on the processing queue: a stored record awaiting diffing
/// (spec §4.3.3, §4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiffJob {
    pub system_id: Uuid,
    pub record_id: i64,
}

/// Payload on the notification queue (spec §4.5): dispatched by `type` into
/// a diff summary, an operational alert, or a system status change.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum NotificationJob {
    /// The diffs a diff-worker run produced for one record, plus the
    /// precomputed overall severity (spec §4.4 step 6).
    Diff {
        system_id: Uuid,
        record_id: i64,
        diff_ids: Vec<i64>,
        summary: String,
        severity: String,
    },
    /// An operational alert raised outside the diff pipeline (e.g. a worker
    /// exceeding its retry ceiling).
    Alert { alert: AlertNotification },
    /// A health/lifecycle status change for a system.
    SystemStatus {
        system_id: Option<Uuid>,
        message: String,
        severity: String,
    },
}

/// The `job.alert` payload for a `NotificationJob::Alert` (spec §4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertNotification {
    pub system_id: Option<Uuid>,
    pub alert_type: String,
    pub message: String,
    pub severity: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ingest_job_round_trips_through_json() {
        let job = IngestJob {
            system_id: Uuid::new_v4(),
            timestamp: Utc::now(),
            data: serde_json::json!({"facts": {}}),
        };
        let encoded = serde_json::to_value(&job).unwrap();
        let decoded: IngestJob = serde_json::from_value(encoded).unwrap();
        assert_eq!(decoded.system_id, job.system_id);
    }
}
