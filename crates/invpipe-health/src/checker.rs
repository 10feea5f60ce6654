//! Health checker: database, queue, and per-worker liveness (spec §6).

use crate::status::{ComponentHealth, HealthReport, ServiceHealth};
use chrono::Utc;
use invpipe_core::breaker::CircuitBreaker;
use invpipe_queue::QueueManager;
use invpipe_workers::WorkerStatsHandle;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::warn;

pub struct HealthChecker {
    database: Option<sqlx::PgPool>,
    queue: Option<Arc<QueueManager>>,
    workers: Vec<WorkerStatsHandle>,
    breaker: Option<Arc<CircuitBreaker>>,
    started_at: chrono::DateTime<Utc>,
    last_db_success: Arc<RwLock<Option<chrono::DateTime<Utc>>>>,
    last_queue_success: Arc<RwLock<Option<chrono::DateTime<Utc>>>>,
    timeout: Duration,
}

impl HealthChecker {
    pub fn builder() -> HealthCheckerBuilder {
        HealthCheckerBuilder::new()
    }

    pub async fn check_all(&self) -> HealthReport {
        let start = Instant::now();
        let mut report = HealthReport::new();

        report.service = ServiceHealth {
            uptime_seconds: Utc::now().signed_duration_since(self.started_at).num_seconds() as u64,
            started_at: self.started_at,
            ..ServiceHealth::default()
        };

        if let Some(ref pool) = self.database {
            report.add_component("database", self.check_database(pool).await);
        }

        if let Some(ref queue) = self.queue {
            report.add_component("queue", self.check_queue(queue).await);
        }

        for handle in &self.workers {
            let snapshot = handle.snapshot();
            let health = if snapshot.is_healthy {
                ComponentHealth::healthy()
            } else {
                ComponentHealth::degraded("no recent activity")
            }
            .with_type("worker")
            .with_detail("processed", snapshot.processed)
            .with_detail("failed", snapshot.failed)
            .with_detail("dropped", snapshot.dropped);

            report.add_component(format!("worker.{}", snapshot.name), health);
        }

        report.calculate_status();
        report.check_duration_ms = start.elapsed().as_millis() as u64;
        report.timestamp = Utc::now();

        report
    }

    async fn check_database(&self, pool: &sqlx::PgPool) -> ComponentHealth {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, sqlx::query("SELECT 1").execute(pool)).await;
        let response_time = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(_)) => {
                *self.last_db_success.write().await = Some(Utc::now());
                let mut health = ComponentHealth::healthy()
                    .with_type("postgresql")
                    .with_response_time(response_time)
                    .with_detail("pool_size", pool.size())
                    .with_detail("idle_connections", pool.num_idle());

                if response_time > 1000 {
                    health = ComponentHealth::degraded("slow response time")
                        .with_type("postgresql")
                        .with_response_time(response_time);
                }
                health
            }
            Ok(Err(e)) => {
                warn!(error = %e, "database health check failed");
                ComponentHealth::unhealthy(format!("query failed: {e}"))
                    .with_type("postgresql")
                    .with_response_time(response_time)
            }
            Err(_) => {
                warn!("database health check timed out");
                ComponentHealth::unhealthy("connection timeout").with_type("postgresql")
            }
        }
    }

    async fn check_queue(&self, queue: &QueueManager) -> ComponentHealth {
        let start = Instant::now();
        let result = tokio::time::timeout(self.timeout, queue.health_check()).await;
        let response_time = start.elapsed().as_millis() as u64;

        match result {
            Ok(Ok(())) => {
                *self.last_queue_success.write().await = Some(Utc::now());
                ComponentHealth::healthy()
                    .with_type("redis")
                    .with_response_time(response_time)
            }
            Ok(Err(e)) => {
                warn!(error = %e, "queue health check failed");
                ComponentHealth::unhealthy(format!("command failed: {e}"))
                    .with_type("redis")
                    .with_response_time(response_time)
            }
            Err(_) => {
                warn!("queue health check timed out");
                ComponentHealth::unhealthy("connection timeout").with_type("redis")
            }
        }
    }

    /// Liveness: the process can respond at all.
    pub async fn check_liveness(&self) -> bool {
        true
    }

    /// Readiness: database and queue are both reachable.
    pub async fn check_readiness(&self) -> bool {
        if let Some(ref pool) = self.database {
            let result =
                tokio::time::timeout(Duration::from_secs(5), sqlx::query("SELECT 1").execute(pool)).await;
            if result.is_err() || result.unwrap().is_err() {
                return false;
            }
        }

        if let Some(ref queue) = self.queue {
            let result = tokio::time::timeout(Duration::from_secs(3), queue.health_check()).await;
            if result.is_err() || result.unwrap().is_err() {
                return false;
            }
        }

        true
    }

    pub async fn check_startup(&self) -> bool {
        let uptime = Utc::now().signed_duration_since(self.started_at).num_seconds();
        if uptime < 2 {
            return false;
        }
        self.check_readiness().await
    }

    /// Raw per-worker stats for the `/stats` surface (spec §6), distinct from
    /// the rolled-up `HealthReport` components.
    pub fn worker_stats(&self) -> Vec<invpipe_workers::WorkerStats> {
        self.workers.iter().map(|h| h.snapshot()).collect()
    }

    /// `true` if the circuit breaker is currently open (spec §4.8), for the
    /// `/metrics` gauge. `false` when no breaker was registered.
    pub fn breaker_open(&self) -> bool {
        self.breaker.as_ref().map(|b| b.is_open()).unwrap_or(false)
    }
}

pub struct HealthCheckerBuilder {
    database: Option<sqlx::PgPool>,
    queue: Option<Arc<QueueManager>>,
    workers: Vec<WorkerStatsHandle>,
    breaker: Option<Arc<CircuitBreaker>>,
    timeout: Duration,
}

impl HealthCheckerBuilder {
    pub fn new() -> Self {
        Self {
            database: None,
            queue: None,
            workers: Vec::new(),
            breaker: None,
            timeout: Duration::from_secs(10),
        }
    }

    pub fn with_database(mut self, pool: sqlx::PgPool) -> Self {
        self.database = Some(pool);
        self
    }

    pub fn with_queue(mut self, queue: Arc<QueueManager>) -> Self {
        self.queue = Some(queue);
        self
    }

    pub fn with_worker(mut self, handle: WorkerStatsHandle) -> Self {
        self.workers.push(handle);
        self
    }

    pub fn with_breaker(mut self, breaker: Arc<CircuitBreaker>) -> Self {
        self.breaker = Some(breaker);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn build(self) -> HealthChecker {
        HealthChecker {
            database: self.database,
            queue: self.queue,
            workers: self.workers,
            breaker: self.breaker,
            started_at: Utc::now(),
            last_db_success: Arc::new(RwLock::new(None)),
            last_queue_success: Arc::new(RwLock::new(None)),
            timeout: self.timeout,
        }
    }
}

impl Default for HealthCheckerBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults_to_no_components() {
        let checker = HealthChecker::builder().with_timeout(Duration::from_secs(5)).build();
        assert!(checker.database.is_none());
        assert!(checker.queue.is_none());
        assert!(checker.workers.is_empty());
    }
}
