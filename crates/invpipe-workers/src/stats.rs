//! Per-worker operator-facing counters (spec §6: "a stats accessor per
//! worker returning `{ processed, failed, last_activity, is_healthy,
//! queue_lengths, ... }`").

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Clone, Serialize)]
pub struct WorkerStats {
    pub name: String,
    pub processed: u64,
    pub failed: u64,
    pub dropped: u64,
    pub last_activity: Option<DateTime<Utc>>,
    pub is_healthy: bool,
}

/// Shared, cheaply-cloneable counters one worker task updates as it runs.
#[derive(Clone)]
pub struct WorkerStatsHandle {
    name: String,
    processed: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    dropped: Arc<AtomicU64>,
    last_activity: Arc<RwLock<Option<DateTime<Utc>>>>,
}

impl WorkerStatsHandle {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            processed: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            dropped: Arc::new(AtomicU64::new(0)),
            last_activity: Arc::new(RwLock::new(None)),
        }
    }

    pub fn record_processed(&self) {
        self.processed.fetch_add(1, Ordering::Relaxed);
        *self.last_activity.write() = Some(Utc::now());
    }

    pub fn record_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
        *self.last_activity.write() = Some(Utc::now());
    }

    pub fn record_dropped(&self) {
        self.dropped.fetch_add(1, Ordering::Relaxed);
    }

    /// Healthy means activity within the last 5 minutes, once any activity
    /// has happened at all (a worker that never ran isn't unhealthy, just idle).
    pub fn snapshot(&self) -> WorkerStats {
        let last_activity = *self.last_activity.read();
        let is_healthy = last_activity
            .map(|t| Utc::now().signed_duration_since(t) < chrono::Duration::minutes(5))
            .unwrap_or(true);

        WorkerStats {
            name: self.name.clone(),
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            last_activity,
            is_healthy,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_handle_reports_healthy_with_no_activity() {
        let handle = WorkerStatsHandle::new("inventory");
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.processed, 0);
        assert!(snapshot.is_healthy);
        assert!(snapshot.last_activity.is_none());
    }

    #[test]
    fn test_counters_increment() {
        let handle = WorkerStatsHandle::new("diff");
        handle.record_processed();
        handle.record_processed();
        handle.record_failed();
        let snapshot = handle.snapshot();
        assert_eq!(snapshot.processed, 2);
        assert_eq!(snapshot.failed, 1);
        assert!(snapshot.last_activity.is_some());
    }
}
