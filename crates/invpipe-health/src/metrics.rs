//! Prometheus metrics for the operator surface (spec §6): per-worker
//! counters plus the breaker/queue-health gauges, registered once and
//! re-populated from the live `HealthChecker` on every scrape.

use prometheus_client::encoding::EncodeLabelSet;
use prometheus_client::metrics::{family::Family, gauge::Gauge};
use prometheus_client::registry::Registry;

#[derive(Clone, Debug, Hash, PartialEq, Eq, EncodeLabelSet)]
pub struct WorkerLabels {
    pub worker: String,
}

/// The worker counters are already cumulative in `WorkerStatsHandle`, so
/// they're exposed here as gauges set to the current total on every
/// scrape rather than as Prometheus counters incremented by a delta.
pub struct PipelineMetrics {
    registry: Registry,
    processed_total: Family<WorkerLabels, Gauge>,
    failed_total: Family<WorkerLabels, Gauge>,
    dropped_total: Family<WorkerLabels, Gauge>,
    worker_healthy: Family<WorkerLabels, Gauge>,
    breaker_open: Gauge,
    queue_healthy: Gauge,
}

impl PipelineMetrics {
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let processed_total = Family::<WorkerLabels, Gauge>::default();
        registry.register(
            "invpipe_worker_processed_total",
            "Total jobs processed by this worker",
            processed_total.clone(),
        );

        let failed_total = Family::<WorkerLabels, Gauge>::default();
        registry.register(
            "invpipe_worker_failed_total",
            "Total jobs that failed in this worker",
            failed_total.clone(),
        );

        let dropped_total = Family::<WorkerLabels, Gauge>::default();
        registry.register(
            "invpipe_worker_dropped_total",
            "Total jobs dropped under backpressure",
            dropped_total.clone(),
        );

        let worker_healthy = Family::<WorkerLabels, Gauge>::default();
        registry.register(
            "invpipe_worker_healthy",
            "1 if the worker has had recent activity or never ran, 0 otherwise",
            worker_healthy.clone(),
        );

        let breaker_open = Gauge::default();
        registry.register(
            "invpipe_circuit_breaker_open",
            "1 if the consumer's circuit breaker is currently open",
            breaker_open.clone(),
        );

        let queue_healthy = Gauge::default();
        registry.register(
            "invpipe_queue_healthy",
            "1 if the last queue health check succeeded",
            queue_healthy.clone(),
        );

        Self {
            registry,
            processed_total,
            failed_total,
            dropped_total,
            worker_healthy,
            breaker_open,
            queue_healthy,
        }
    }

    /// `WorkerStats` already holds cumulative totals, so each scrape sets
    /// the gauges to the current value rather than incrementing by a delta.
    pub fn update(
        &self,
        workers: &[invpipe_workers::WorkerStats],
        breaker_open: bool,
        queue_healthy: bool,
    ) {
        for worker in workers {
            let labels = WorkerLabels { worker: worker.name.clone() };
            self.processed_total.get_or_create(&labels).set(worker.processed as i64);
            self.failed_total.get_or_create(&labels).set(worker.failed as i64);
            self.dropped_total.get_or_create(&labels).set(worker.dropped as i64);
            self.worker_healthy
                .get_or_create(&labels)
                .set(if worker.is_healthy { 1 } else { 0 });
        }

        self.breaker_open.set(if breaker_open { 1 } else { 0 });
        self.queue_healthy.set(if queue_healthy { 1 } else { 0 });
    }

    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        prometheus_client::encoding::text::encode(&mut buffer, &self.registry).unwrap();
        buffer
    }
}

impl Default for PipelineMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use invpipe_workers::WorkerStats;

    #[test]
    fn test_update_then_encode_contains_worker_label() {
        let metrics = PipelineMetrics::new();
        let stats = vec![WorkerStats {
            name: "inventory".to_string(),
            processed: 5,
            failed: 1,
            dropped: 0,
            last_activity: None,
            is_healthy: true,
        }];
        metrics.update(&stats, false, true);
        let body = metrics.encode();
        assert!(body.contains("invpipe_worker_processed_total"));
        assert!(body.contains("worker=\"inventory\""));
    }
}
