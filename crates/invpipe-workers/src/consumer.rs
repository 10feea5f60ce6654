//! Consumer Loop (spec §4.2): the single task that drains the ingestion
//! queue and hands messages to the inventory worker's batch channel.

use crate::job::IngestJob;
use crate::stats::WorkerStatsHandle;
use invpipe_core::breaker::{should_drop, CircuitBreaker};
use invpipe_core::shutdown::ShutdownHandle;
use invpipe_queue::{QueueManager, QueueMessage};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

pub struct ConsumerLoop {
    queue: Arc<QueueManager>,
    queue_name: String,
    batch_tx: mpsc::Sender<(QueueMessage, IngestJob)>,
    breaker: Arc<CircuitBreaker>,
    drop_threshold: f64,
    dequeue_timeout: Duration,
    send_timeout: Duration,
    stats: WorkerStatsHandle,
}

impl ConsumerLoop {
    pub fn new(
        queue: Arc<QueueManager>,
        queue_name: impl Into<String>,
        batch_tx: mpsc::Sender<(QueueMessage, IngestJob)>,
        breaker: Arc<CircuitBreaker>,
        drop_threshold: f64,
        dequeue_timeout: Duration,
        send_timeout: Duration,
    ) -> Self {
        Self {
            queue,
            queue_name: queue_name.into(),
            batch_tx,
            breaker,
            drop_threshold,
            dequeue_timeout,
            send_timeout,
            stats: WorkerStatsHandle::new("consumer"),
        }
    }

    pub fn stats(&self) -> WorkerStatsHandle {
        self.stats.clone()
    }

    /// Runs until `shutdown.is_shutting_down()`.
    pub async fn run(&self, shutdown: ShutdownHandle) {
        info!(queue = %self.queue_name, "consumer loop started");

        while !shutdown.is_shutting_down() {
            if self.breaker.is_open() {
                tokio::time::sleep(self.breaker.reset_timeout()).await;
                continue;
            }

            let message = match self.queue.dequeue(&self.queue_name, self.dequeue_timeout).await {
                Ok(Some(m)) => m,
                Ok(None) => continue,
                Err(e) => {
                    warn!(error = %e, "consumer dequeue failed");
                    self.breaker.record_failure();
                    continue;
                }
            };

            self.handle_message(message).await;
        }

        info!("consumer loop stopped");
    }

    async fn handle_message(&self, message: QueueMessage) {
        let ingest: IngestJob = match serde_json::from_value(message.payload.clone()) {
            Ok(job) => job,
            Err(e) => {
                warn!(job_id = %message.id, error = %e, "malformed inventory payload, discarding");
                self.stats.record_dropped();
                return;
            }
        };

        let len = self.batch_tx.max_capacity() - self.batch_tx.capacity();
        if should_drop(len, self.batch_tx.max_capacity(), self.drop_threshold) {
            warn!(job_id = %message.id, "batch channel over backpressure threshold, dropping message");
            self.stats.record_dropped();
            self.breaker.record_failure();
            return;
        }

        let requeue_on_timeout = message.clone();
        match tokio::time::timeout(self.send_timeout, self.batch_tx.send((message, ingest))).await {
            Ok(Ok(())) => {
                self.stats.record_processed();
                self.breaker.record_success();
            }
            Ok(Err(mpsc::error::SendError((message, _)))) => {
                warn!(job_id = %message.id, "batch channel closed");
                self.stats.record_failed();
            }
            Err(_) => {
                warn!(job_id = %requeue_on_timeout.id, "batch channel send timed out, requeuing");
                if let Err(e) = self.queue.requeue(&self.queue_name, requeue_on_timeout).await {
                    warn!(error = %e, "failed to requeue timed-out message");
                }
                self.stats.record_failed();
            }
        }
    }
}
