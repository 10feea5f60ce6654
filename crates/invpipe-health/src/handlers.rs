//! HTTP handlers for the operator-facing health and stats surface (spec §6).

use crate::probes::{ProbeResult, ProbeType};
use crate::status::{HealthStatus, KubernetesProbeResponse};
use crate::HealthState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use std::sync::Arc;
use std::time::Instant;

pub struct HealthResponse {
    status: StatusCode,
    body: serde_json::Value,
}

impl IntoResponse for HealthResponse {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}

/// GET /health
pub async fn health_handler(State(state): State<Arc<HealthState>>) -> HealthResponse {
    let report = state.get_health(false).await;
    let status = match report.status {
        HealthStatus::Healthy | HealthStatus::Degraded => StatusCode::OK,
        HealthStatus::Unhealthy => StatusCode::SERVICE_UNAVAILABLE,
    };

    HealthResponse {
        status,
        body: serde_json::to_value(&report).unwrap_or_default(),
    }
}

/// GET /health/live
pub async fn liveness_handler(State(state): State<Arc<HealthState>>) -> HealthResponse {
    let start = Instant::now();
    let alive = state.checker.check_liveness().await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if alive {
        let result = ProbeResult::success(ProbeType::Liveness, duration_ms);
        HealthResponse { status: StatusCode::OK, body: serde_json::to_value(&result).unwrap_or_default() }
    } else {
        let result = ProbeResult::failure(ProbeType::Liveness, "application not alive", duration_ms);
        HealthResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: serde_json::to_value(&result).unwrap_or_default(),
        }
    }
}

/// GET /health/ready and GET /readyz
pub async fn readiness_handler(State(state): State<Arc<HealthState>>) -> HealthResponse {
    let start = Instant::now();
    let ready = state.checker.check_readiness().await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if ready {
        let result = ProbeResult::success(ProbeType::Readiness, duration_ms);
        HealthResponse { status: StatusCode::OK, body: serde_json::to_value(&result).unwrap_or_default() }
    } else {
        let result = ProbeResult::failure(ProbeType::Readiness, "application not ready", duration_ms);
        HealthResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: serde_json::to_value(&result).unwrap_or_default(),
        }
    }
}

/// GET /health/startup
pub async fn startup_handler(State(state): State<Arc<HealthState>>) -> HealthResponse {
    let start = Instant::now();
    let started = state.checker.check_startup().await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if started {
        let result = ProbeResult::success(ProbeType::Startup, duration_ms);
        HealthResponse { status: StatusCode::OK, body: serde_json::to_value(&result).unwrap_or_default() }
    } else {
        let result = ProbeResult::failure(ProbeType::Startup, "application still starting", duration_ms);
        HealthResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: serde_json::to_value(&result).unwrap_or_default(),
        }
    }
}

/// GET /healthz — terse pass/fail used by external load balancers.
pub async fn healthz_handler(State(state): State<Arc<HealthState>>) -> HealthResponse {
    let ready = state.checker.check_readiness().await;

    if ready {
        HealthResponse { status: StatusCode::OK, body: serde_json::to_value(KubernetesProbeResponse::pass()).unwrap_or_default() }
    } else {
        HealthResponse {
            status: StatusCode::SERVICE_UNAVAILABLE,
            body: serde_json::to_value(KubernetesProbeResponse::fail("service not ready")).unwrap_or_default(),
        }
    }
}

/// GET /stats — raw per-worker counters (spec §6).
pub async fn stats_handler(State(state): State<Arc<HealthState>>) -> Json<serde_json::Value> {
    let stats = state.checker.worker_stats();
    Json(serde_json::json!({ "workers": stats }))
}

/// GET /metrics — Prometheus exposition format (spec §6).
pub async fn metrics_handler(State(state): State<Arc<HealthState>>) -> Response {
    let stats = state.checker.worker_stats();
    let queue_healthy = state.checker.check_readiness().await;
    state.metrics.update(&stats, state.checker.breaker_open(), queue_healthy);

    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "application/openmetrics-text; version=1.0.0; charset=utf-8")],
        body,
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_response_carries_status() {
        let response = HealthResponse { status: StatusCode::OK, body: serde_json::json!({"status": "ok"}) };
        assert_eq!(response.status, StatusCode::OK);
    }
}
