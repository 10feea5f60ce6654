//! Health status types and responses.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Overall health status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded,
    Unhealthy,
}

impl HealthStatus {
    pub fn to_http_status(&self) -> u16 {
        match self {
            HealthStatus::Healthy => 200,
            HealthStatus::Degraded => 200,
            HealthStatus::Unhealthy => 503,
        }
    }

    pub fn is_operational(&self) -> bool {
        matches!(self, HealthStatus::Healthy | HealthStatus::Degraded)
    }
}

impl Default for HealthStatus {
    fn default() -> Self {
        Self::Healthy
    }
}

/// Component health status.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Degraded,
    Down,
    Unknown,
}

impl ComponentStatus {
    pub fn to_health_status(&self) -> HealthStatus {
        match self {
            ComponentStatus::Up => HealthStatus::Healthy,
            ComponentStatus::Degraded => HealthStatus::Degraded,
            ComponentStatus::Down | ComponentStatus::Unknown => HealthStatus::Unhealthy,
        }
    }
}

/// Health check report.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HealthReport {
    pub status: HealthStatus,
    pub timestamp: DateTime<Utc>,
    pub service: ServiceHealth,

    #[serde(skip_serializing_if = "HashMap::is_empty")]
    pub components: HashMap<String, ComponentHealth>,

    pub check_duration_ms: u64,
}

impl Default for HealthReport {
    fn default() -> Self {
        Self {
            status: HealthStatus::Healthy,
            timestamp: Utc::now(),
            service: ServiceHealth::default(),
            components: HashMap::new(),
            check_duration_ms: 0,
        }
    }
}

impl HealthReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_component(&mut self, name: impl Into<String>, health: ComponentHealth) {
        self.components.insert(name.into(), health);
    }

    /// Database down fails the whole report; anything else degrades it.
    pub fn calculate_status(&mut self) {
        let mut has_critical_down = false;
        let mut has_degraded = false;

        for (name, component) in &self.components {
            match component.status {
                ComponentStatus::Down => {
                    if is_critical_component(name) {
                        has_critical_down = true;
                    } else {
                        has_degraded = true;
                    }
                }
                ComponentStatus::Degraded => has_degraded = true,
                ComponentStatus::Unknown => {
                    if is_critical_component(name) {
                        has_degraded = true;
                    }
                }
                ComponentStatus::Up => {}
            }
        }

        self.status = if has_critical_down {
            HealthStatus::Unhealthy
        } else if has_degraded {
            HealthStatus::Degraded
        } else {
            HealthStatus::Healthy
        };
    }
}

fn is_critical_component(name: &str) -> bool {
    matches!(name.to_lowercase().as_str(), "database" | "queue")
}

/// Service health information.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServiceHealth {
    pub name: String,
    pub version: String,
    pub environment: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub instance_id: Option<String>,

    pub uptime_seconds: u64,
    pub started_at: DateTime<Utc>,
}

impl Default for ServiceHealth {
    fn default() -> Self {
        Self {
            name: "inventory-pipeline".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            environment: std::env::var("INVPIPE_ENV").unwrap_or_else(|_| "development".to_string()),
            instance_id: std::env::var("HOSTNAME").ok(),
            uptime_seconds: 0,
            started_at: Utc::now(),
        }
    }
}

/// Individual component health.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ComponentHealth {
    pub status: ComponentStatus,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub component_type: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<HashMap<String, serde_json::Value>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_success: Option<DateTime<Utc>>,
}

impl ComponentHealth {
    pub fn healthy() -> Self {
        Self {
            status: ComponentStatus::Up,
            component_type: None,
            response_time_ms: None,
            details: None,
            error: None,
            last_success: Some(Utc::now()),
        }
    }

    pub fn unhealthy(error: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Down,
            component_type: None,
            response_time_ms: None,
            details: None,
            error: Some(error.into()),
            last_success: None,
        }
    }

    pub fn degraded(reason: impl Into<String>) -> Self {
        Self {
            status: ComponentStatus::Degraded,
            component_type: None,
            response_time_ms: None,
            details: None,
            error: Some(reason.into()),
            last_success: Some(Utc::now()),
        }
    }

    pub fn with_type(mut self, component_type: impl Into<String>) -> Self {
        self.component_type = Some(component_type.into());
        self
    }

    pub fn with_response_time(mut self, ms: u64) -> Self {
        self.response_time_ms = Some(ms);
        self
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Serialize) -> Self {
        let details = self.details.get_or_insert_with(HashMap::new);
        if let Ok(v) = serde_json::to_value(value) {
            details.insert(key.into(), v);
        }
        self
    }
}

/// Kubernetes-style probe response.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KubernetesProbeResponse {
    pub status: String,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl KubernetesProbeResponse {
    pub fn pass() -> Self {
        Self {
            status: "pass".to_string(),
            timestamp: Utc::now(),
            message: None,
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            status: "fail".to_string(),
            timestamp: Utc::now(),
            message: Some(message.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_status_http_codes() {
        assert_eq!(HealthStatus::Healthy.to_http_status(), 200);
        assert_eq!(HealthStatus::Degraded.to_http_status(), 200);
        assert_eq!(HealthStatus::Unhealthy.to_http_status(), 503);
    }

    #[test]
    fn test_component_health_builder() {
        let health = ComponentHealth::healthy()
            .with_type("database")
            .with_response_time(15)
            .with_detail("connections", 42);

        assert_eq!(health.status, ComponentStatus::Up);
        assert_eq!(health.component_type, Some("database".to_string()));
        assert_eq!(health.response_time_ms, Some(15));
    }

    #[test]
    fn test_calculate_status() {
        let mut report = HealthReport::new();

        report.add_component("database", ComponentHealth::healthy());
        report.add_component("queue", ComponentHealth::healthy());
        report.calculate_status();
        assert_eq!(report.status, HealthStatus::Healthy);

        report.add_component("queue", ComponentHealth::degraded("slow"));
        report.calculate_status();
        assert_eq!(report.status, HealthStatus::Degraded);

        report.add_component("database", ComponentHealth::unhealthy("connection failed"));
        report.calculate_status();
        assert_eq!(report.status, HealthStatus::Unhealthy);
    }
}
