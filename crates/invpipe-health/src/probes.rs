//! Kubernetes-style probe result types, used by the liveness/readiness/
//! startup handlers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProbeType {
    Liveness,
    Readiness,
    Startup,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProbeResult {
    pub probe: ProbeType,
    pub passed: bool,
    pub duration_ms: u64,
    pub timestamp: DateTime<Utc>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ProbeResult {
    pub fn success(probe: ProbeType, duration_ms: u64) -> Self {
        Self {
            probe,
            passed: true,
            duration_ms,
            timestamp: Utc::now(),
            message: None,
        }
    }

    pub fn failure(probe: ProbeType, message: impl Into<String>, duration_ms: u64) -> Self {
        Self {
            probe,
            passed: false,
            duration_ms,
            timestamp: Utc::now(),
            message: Some(message.into()),
        }
    }
}

/// Knobs for how often each probe is allowed to run (operator-facing
/// documentation only; the handlers themselves always check live).
#[derive(Clone, Debug)]
pub struct ProbeConfig {
    pub liveness_timeout: std::time::Duration,
    pub readiness_timeout: std::time::Duration,
    pub startup_timeout: std::time::Duration,
}

impl Default for ProbeConfig {
    fn default() -> Self {
        Self {
            liveness_timeout: std::time::Duration::from_secs(2),
            readiness_timeout: std::time::Duration::from_secs(5),
            startup_timeout: std::time::Duration::from_secs(10),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_probe_result_success_has_no_message() {
        let result = ProbeResult::success(ProbeType::Liveness, 3);
        assert!(result.passed);
        assert!(result.message.is_none());
    }

    #[test]
    fn test_probe_result_failure_carries_message() {
        let result = ProbeResult::failure(ProbeType::Readiness, "db down", 12);
        assert!(!result.passed);
        assert_eq!(result.message.as_deref(), Some("db down"));
    }
}
