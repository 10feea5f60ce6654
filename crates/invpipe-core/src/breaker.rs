//! Circuit breaker and backpressure primitives (spec §4.8).
//!
//! Three states: `closed` (normal), `open` (tripped, calls should be skipped),
//! `half-open` (probing after the reset timeout). State and counters are
//! held behind a `parking_lot::Mutex` rather than split across separate
//! atomics, because a transition reads and writes several fields together
//! and must not be observed half-updated.

use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    Closed,
    Open,
    HalfOpen,
}

struct Inner {
    state: BreakerState,
    consecutive_failures: u32,
    last_failure_at: Option<Instant>,
}

/// A three-state failure-isolation breaker shared across a worker's calls
/// into its downstream store.
pub struct CircuitBreaker {
    inner: Mutex<Inner>,
    max_failures: u32,
    reset_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(max_failures: u32, reset_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                consecutive_failures: 0,
                last_failure_at: None,
            }),
            max_failures,
            reset_timeout,
        }
    }

    pub fn shared(max_failures: u32, reset_timeout: Duration) -> Arc<Self> {
        Arc::new(Self::new(max_failures, reset_timeout))
    }

    /// Current state, first promoting `open` to `half-open` if the reset
    /// timeout has elapsed since the last recorded failure.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.inner.lock();
        if inner.state == BreakerState::Open {
            if let Some(last_failure) = inner.last_failure_at {
                if last_failure.elapsed() >= self.reset_timeout {
                    inner.state = BreakerState::HalfOpen;
                }
            }
        }
        inner.state
    }

    pub fn is_open(&self) -> bool {
        self.state() == BreakerState::Open
    }

    pub fn record_success(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures = 0;
        inner.state = BreakerState::Closed;
        inner.last_failure_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.inner.lock();
        inner.consecutive_failures += 1;
        inner.last_failure_at = Some(Instant::now());
        if inner.consecutive_failures >= self.max_failures {
            inner.state = BreakerState::Open;
        }
    }

    pub fn reset_timeout(&self) -> Duration {
        self.reset_timeout
    }
}

/// Ratio-based backpressure check on a bounded channel: true once
/// `len/cap` exceeds `drop_threshold` (spec §4.2, §4.8).
pub fn should_drop(len: usize, cap: usize, drop_threshold: f64) -> bool {
    if cap == 0 {
        return true;
    }
    (len as f64 / cap as f64) > drop_threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_closed_by_default() {
        let breaker = CircuitBreaker::new(5, Duration::from_secs(30));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_opens_after_max_failures() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_success_resets_counter() {
        let breaker = CircuitBreaker::new(3, Duration::from_secs(30));
        breaker.record_failure();
        breaker.record_failure();
        breaker.record_success();
        breaker.record_failure();
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[test]
    fn test_half_open_after_reset_timeout() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[test]
    fn test_half_open_failure_reopens() {
        let breaker = CircuitBreaker::new(1, Duration::from_millis(10));
        breaker.record_failure();
        std::thread::sleep(Duration::from_millis(20));
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
        breaker.record_failure();
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[test]
    fn test_drop_threshold() {
        assert!(!should_drop(8, 10, 0.8));
        assert!(should_drop(9, 10, 0.8));
    }
}
