//! Axum router exposing the operator health/stats surface (spec §6).

use crate::handlers::{
    health_handler, healthz_handler, liveness_handler, metrics_handler, readiness_handler,
    stats_handler, startup_handler,
};
use crate::HealthState;
use axum::routing::get;
use axum::Router;
use std::sync::Arc;

pub struct HealthRouter;

impl HealthRouter {
    pub fn new(state: Arc<HealthState>) -> Router {
        Router::new()
            .route("/health", get(health_handler))
            .route("/health/live", get(liveness_handler))
            .route("/health/ready", get(readiness_handler))
            .route("/health/startup", get(startup_handler))
            .route("/healthz", get(healthz_handler))
            .route("/readyz", get(readiness_handler))
            .route("/stats", get(stats_handler))
            .route("/metrics", get(metrics_handler))
            .with_state(state)
    }
}
