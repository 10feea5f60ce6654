//! Shared primitives for the inventory ingestion & change-detection
//! pipeline: configuration, the unified error type, graceful shutdown, and
//! the circuit breaker / backpressure primitives every worker depends on.

pub mod breaker;
pub mod config;
pub mod error;
pub mod shutdown;

pub use breaker::{BreakerState, CircuitBreaker};
pub use config::AppConfig;
pub use error::{Error, Result};
pub use shutdown::{
    ShutdownController, ShutdownExecutor, ShutdownHandle, ShutdownPhase, TaskGuard,
};

/// Crate version, exposed for the health/stats surface.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
