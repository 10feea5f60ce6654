//! Delayed-message scheduler (spec §4.6): a single periodic tick that
//! promotes due delayed messages back onto each queue's pending list.

use invpipe_core::shutdown::ShutdownHandle;
use invpipe_database::repository::AlertRepository;
use invpipe_database::InventoryAlertRow;
use invpipe_queue::QueueManager;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use uuid::Uuid;

pub struct DelayedScheduler {
    queue: Arc<QueueManager>,
    queue_names: Vec<String>,
    alerts: AlertRepository,
    interval: Duration,
    running: Arc<AtomicBool>,
    /// The still-open alert raised for the current connectivity outage, if
    /// any. Cleared (and resolved) the first tick that succeeds again.
    open_alert: Mutex<Option<Uuid>>,
}

impl DelayedScheduler {
    pub fn new(
        queue: Arc<QueueManager>,
        queue_names: Vec<String>,
        alerts: AlertRepository,
        interval: Duration,
    ) -> Self {
        Self {
            queue,
            queue_names,
            alerts,
            interval,
            running: Arc::new(AtomicBool::new(false)),
            open_alert: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub async fn run(&self, shutdown: ShutdownHandle) {
        self.running.store(true, Ordering::SeqCst);
        info!(interval_secs = self.interval.as_secs(), "delayed scheduler started");

        let mut ticker = tokio::time::interval(self.interval);
        while !shutdown.is_shutting_down() {
            ticker.tick().await;
            self.tick().await;
        }

        self.running.store(false, Ordering::SeqCst);
        info!("delayed scheduler stopped");
    }

    /// One promotion pass over every configured queue. Exposed separately
    /// from `run` so it can be driven directly in tests.
    ///
    /// The scheduler's only failure mode is store connectivity (spec §4.6);
    /// a failure on any queue flips the health flag by raising an alert, and
    /// the first fully-clean pass afterward resolves it.
    pub async fn tick(&self) {
        let mut any_failure = false;

        for queue_name in &self.queue_names {
            match self.queue.process_delayed(queue_name).await {
                Ok(0) => {}
                Ok(count) => info!(queue = %queue_name, count, "promoted delayed messages"),
                Err(e) => {
                    warn!(queue = %queue_name, error = %e, "failed to promote delayed messages");
                    any_failure = true;
                }
            }
        }

        if any_failure {
            self.raise_connectivity_alert().await;
        } else {
            self.resolve_connectivity_alert().await;
        }
    }

    async fn raise_connectivity_alert(&self) {
        if self.open_alert.lock().is_some() {
            return;
        }

        let alert = InventoryAlertRow {
            id: Uuid::new_v4(),
            system_id: None,
            alert_type: "scheduler_connectivity_failure".to_string(),
            message: "delayed-message promotion failed against the queue store".to_string(),
            severity: "high".to_string(),
            is_resolved: false,
            resolved_at: None,
            created_at: chrono::Utc::now(),
        };
        let id = alert.id;
        match self.alerts.insert(&alert).await {
            Ok(()) => *self.open_alert.lock() = Some(id),
            Err(e) => warn!(error = %e, "failed to record scheduler connectivity alert"),
        }
    }

    async fn resolve_connectivity_alert(&self) {
        let id = self.open_alert.lock().take();
        let Some(id) = id else {
            return;
        };

        if let Err(e) = self.alerts.resolve(id).await {
            warn!(error = %e, "failed to resolve scheduler connectivity alert");
            *self.open_alert.lock() = Some(id);
        }
    }
}
