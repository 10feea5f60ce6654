//! Unified error type for the inventory pipeline, built on thiserror.
//!
//! Every crate boundary (queue, database, diff, workers) returns this error
//! so the worker supervision loop can classify failures (retryable vs not)
//! in one place instead of each worker duplicating that policy.

use thiserror::Error;

/// The unified error type for pipeline operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("queue error: {message}")]
    Queue {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: String, id: String },

    #[error("operation timed out: {operation} exceeded {timeout_secs}s")]
    Timeout { operation: String, timeout_secs: u64 },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("migration error: {message}")]
    Migration { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error("shutdown in progress")]
    ShutdownInProgress,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn database(message: impl Into<String>) -> Self {
        Error::Database {
            message: message.into(),
            source: None,
        }
    }

    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn queue(message: impl Into<String>) -> Self {
        Error::Queue {
            message: message.into(),
            source: None,
        }
    }

    pub fn queue_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Queue {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, timeout_secs: u64) -> Self {
        Error::Timeout {
            operation: operation.into(),
            timeout_secs,
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Error::Serialization {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }

    pub fn migration(message: impl Into<String>) -> Self {
        Error::Migration {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Classifies whether the consumer loop / workers should requeue-with-backoff
    /// (true) or discard / route straight to the failed structure (false).
    /// Malformed payloads surface as `Serialization` and are never retryable
    /// (spec §7: "log, discard, do not retry").
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::Queue { .. } | Error::Timeout { .. }
        )
    }
}

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_classification() {
        assert!(Error::database("connection reset").is_retryable());
        assert!(Error::queue("pool exhausted").is_retryable());
        assert!(Error::timeout("dequeue", 10).is_retryable());
        assert!(!Error::serialization("bad json").is_retryable());
        assert!(!Error::not_found("system", "s1").is_retryable());
    }

    #[test]
    fn test_database_with_source_preserves_message() {
        let io_err = std::io::Error::new(std::io::ErrorKind::Other, "connection refused");
        let err = Error::database_with_source("failed to acquire connection", io_err);
        assert_eq!(
            err.to_string(),
            "database error: failed to acquire connection"
        );
    }
}
