//! Inventory Worker / Batch Writer (spec §4.3): batches inserts, derives
//! system fields, extracts applications, and hands completed records on
//! to the diff queue.

use crate::derive::{derive_system_fields, extract_applications};
use crate::job::{DiffJob, IngestJob};
use crate::stats::WorkerStatsHandle;
use chrono::Utc;
use invpipe_core::error::Result;
use invpipe_core::shutdown::ShutdownHandle;
use invpipe_database::repository::{ApplicationRepository, InventoryRepository, SystemRepository};
use invpipe_database::ApplicationRow;
use invpipe_queue::{QueueManager, QueueMessage};
use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// Payloads above this size only get a structured warning, never an error
/// (spec §4.3 step 3).
const LARGE_PAYLOAD_BYTES: usize = 1024 * 1024;

pub struct InventoryWorker {
    rx: mpsc::Receiver<(QueueMessage, IngestJob)>,
    pool: PgPool,
    systems: SystemRepository,
    inventory: InventoryRepository,
    applications: ApplicationRepository,
    inventory_queue: Arc<QueueManager>,
    inventory_queue_name: String,
    processing_queue: Arc<QueueManager>,
    processing_queue_name: String,
    batch_size: usize,
    flush_interval: Duration,
    stats: WorkerStatsHandle,
}

impl InventoryWorker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        rx: mpsc::Receiver<(QueueMessage, IngestJob)>,
        pool: PgPool,
        systems: SystemRepository,
        inventory: InventoryRepository,
        applications: ApplicationRepository,
        inventory_queue: Arc<QueueManager>,
        inventory_queue_name: impl Into<String>,
        processing_queue: Arc<QueueManager>,
        processing_queue_name: impl Into<String>,
        batch_size: usize,
        flush_interval: Duration,
    ) -> Self {
        Self {
            rx,
            pool,
            systems,
            inventory,
            applications,
            inventory_queue,
            inventory_queue_name: inventory_queue_name.into(),
            processing_queue,
            processing_queue_name: processing_queue_name.into(),
            batch_size,
            flush_interval,
            stats: WorkerStatsHandle::new("inventory"),
        }
    }

    pub fn stats(&self) -> WorkerStatsHandle {
        self.stats.clone()
    }

    pub async fn run(&mut self, shutdown: ShutdownHandle) {
        info!("inventory worker started");
        let mut batch = Vec::with_capacity(self.batch_size);
        let mut ticker = tokio::time::interval(self.flush_interval);

        loop {
            tokio::select! {
                maybe_job = self.rx.recv() => {
                    match maybe_job {
                        Some(entry) => {
                            batch.push(entry);
                            if batch.len() >= self.batch_size {
                                self.flush(&mut batch).await;
                            }
                        }
                        None => break,
                    }
                }
                _ = ticker.tick() => {
                    if !batch.is_empty() {
                        self.flush(&mut batch).await;
                    }
                }
            }

            if shutdown.is_shutting_down() && self.rx.is_empty() {
                break;
            }
        }

        if !batch.is_empty() {
            info!(count = batch.len(), "flushing residual batch on shutdown");
            self.flush(&mut batch).await;
        }

        info!("inventory worker stopped");
    }

    /// One batch's worth of work. Spec §4.3 step 5 / §7: each job's writes
    /// (record insert, system field derivation, application upserts,
    /// soft-deletes) commit or roll back together in one transaction. A
    /// failing job never leaves partial writes, and is requeued onto the
    /// ingestion queue rather than dropped (testable invariant 8).
    async fn flush(&mut self, batch: &mut Vec<(QueueMessage, IngestJob)>) {
        let entries = std::mem::take(batch);
        let mut inserted_ids = Vec::with_capacity(entries.len());

        for (message, job) in entries {
            match self.process_one(&job).await {
                Ok(record_id) => inserted_ids.push((job.system_id, record_id)),
                Err(e) => {
                    warn!(system_id = %job.system_id, error = %e, "failed to persist inventory record, requeuing batch");
                    self.stats.record_failed();
                    if let Err(e) = self.inventory_queue.requeue(&self.inventory_queue_name, message).await {
                        warn!(error = %e, "failed to requeue inventory job");
                    }
                }
            }
        }

        self.enqueue_diff_jobs(inserted_ids).await;
    }

    async fn process_one(&self, job: &IngestJob) -> Result<i64> {
        let body = serde_json::to_vec(&job.data)
            .map_err(|e| invpipe_core::error::Error::serialization(e.to_string()))?;
        let data_size = body.len();
        if data_size > LARGE_PAYLOAD_BYTES {
            warn!(system_id = %job.system_id, bytes = data_size, "large inventory payload");
        }

        let mut hasher = Sha256::new();
        hasher.update(&body);
        let data_hash = format!("{:x}", hasher.finalize());

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| invpipe_core::error::Error::database_with_source("failed to open transaction", e))?;

        let record_id = self
            .inventory
            .insert(&mut *tx, job.system_id, job.timestamp, job.data.clone(), &data_hash, data_size as i64)
            .await?;

        let derived = derive_system_fields(&job.data);
        if !derived.is_empty() {
            self.systems
                .upsert_derived_fields(
                    &mut *tx,
                    job.system_id,
                    derived.name.as_deref(),
                    derived.fqdn.as_deref(),
                    derived.version.as_deref(),
                    derived.product_type.as_deref(),
                    derived.ipv4_address.as_deref(),
                )
                .await?;
        }

        let system = self.systems.get(&mut *tx, job.system_id).await?;
        let fqdn = system.as_ref().and_then(|s| s.fqdn.as_deref());
        let extracted = extract_applications(&job.data, fqdn);

        let mut seen_module_ids = Vec::with_capacity(extracted.len());
        for app in &extracted {
            seen_module_ids.push(app.module_id.clone());
            let row = ApplicationRow {
                id: ApplicationRow::derive_id(job.system_id, &app.module_id),
                system_id: job.system_id,
                module_id: app.module_id.clone(),
                instance_of: app.instance_of.clone(),
                display_name: app.display_name.clone(),
                node_id: app.node_id,
                node_label: app.node_label.clone(),
                version: app.version.clone(),
                url: app.url.clone(),
                inventory_data: app.inventory_data.clone(),
                is_user_facing: app.is_user_facing,
                status: "unassigned".to_string(),
                first_seen_at: Utc::now(),
                last_inventory_at: Utc::now(),
                deleted_at: None,
                updated_at: Utc::now(),
            };
            self.applications.upsert(&mut *tx, &row).await?;
        }

        if !seen_module_ids.is_empty() || job.data.get("installation").and_then(|v| v.as_str()) == Some("nethserver") {
            self.applications
                .soft_delete_missing(&mut *tx, job.system_id, &seen_module_ids)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| invpipe_core::error::Error::database_with_source("failed to commit inventory transaction", e))?;

        Ok(record_id)
    }

    /// Spec §4.3: enqueue happens for every inserted record; the diff
    /// worker itself discovers whether a predecessor exists.
    async fn enqueue_diff_jobs(&self, records: Vec<(uuid::Uuid, i64)>) {
        for (system_id, record_id) in records {
            let job = DiffJob { system_id, record_id };
            let payload = match serde_json::to_value(&job) {
                Ok(v) => v,
                Err(e) => {
                    warn!(error = %e, "failed to encode diff job");
                    continue;
                }
            };

            match tokio::time::timeout(
                Duration::from_secs(30),
                self.processing_queue.enqueue(&self.processing_queue_name, payload),
            )
            .await
            {
                Ok(Ok(_)) => self.stats.record_processed(),
                Ok(Err(e)) => warn!(system_id = %system_id, error = %e, "failed to enqueue diff job"),
                Err(_) => warn!(system_id = %system_id, "timed out enqueueing diff job"),
            }
        }
    }
}
