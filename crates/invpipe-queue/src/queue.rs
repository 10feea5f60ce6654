//! Redis-backed queue manager (spec §4.1).
//!
//! Each named queue is realised as a pending list, a delayed sorted set
//! keyed by visibility-time epoch millis, and a terminal failed list.
//! Message bodies live under a separate `data:{id}` key so the
//! list/sorted-set entries stay small fixed-width ids.

use chrono::Utc;
use invpipe_core::error::{Error, Result};
use redis::AsyncCommands;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

/// A dequeued message: its id, payload, and how many times it's been tried.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueMessage {
    pub id: String,
    pub payload: serde_json::Value,
    pub attempt: u32,
}

/// Snapshot of one queue's depth and health (spec §4.1, §6).
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub queue: String,
    pub pending: u64,
    pub delayed: u64,
    pub failed: u64,
    pub health: QueueHealth,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum QueueHealth {
    Healthy,
    Warning,
    Critical,
}

/// What became of a message handed to [`QueueManager::requeue`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequeueOutcome {
    /// Scheduled back onto the delayed set with backoff.
    Requeued,
    /// Retry ceiling exceeded; routed to the failed structure instead.
    Failed,
}

/// Retry ceiling and exponential backoff bounds, shared by every queue so
/// no worker computes its own retry policy (spec §9).
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_cap: Duration,
}

impl RetryPolicy {
    /// Exponential backoff with full jitter, capped at `backoff_cap`
    /// (spec §4.1: "1s, 5s, 30s, 2m, 10m").
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let exp = self.backoff_base.as_millis() as u64 * 5u64.saturating_pow(attempt.saturating_sub(1));
        let capped = exp.min(self.backoff_cap.as_millis() as u64);
        let jittered = rand::thread_rng().gen_range(capped / 2..=capped.max(1));
        Duration::from_millis(jittered.max(1))
    }
}

/// Ceiling above which a queue's failed-count is reported critical
/// (spec §4.1 Stats).
const FAILED_CRITICAL_THRESHOLD: u64 = 100;
const FAILED_WARNING_THRESHOLD: u64 = 10;

/// The Queue Manager: thin wrapper over a `deadpool_redis::Pool`, leasing a
/// connection per call rather than holding one sticky across awaits.
#[derive(Clone)]
pub struct QueueManager {
    pool: deadpool_redis::Pool,
    prefix: String,
    retry: RetryPolicy,
}

impl QueueManager {
    pub fn new(pool: deadpool_redis::Pool, prefix: impl Into<String>, retry: RetryPolicy) -> Self {
        Self {
            pool,
            prefix: prefix.into(),
            retry,
        }
    }

    fn pending_key(&self, queue: &str) -> String {
        format!("{}:{}:pending", self.prefix, queue)
    }

    fn delayed_key(&self, queue: &str) -> String {
        format!("{}:{}:delayed", self.prefix, queue)
    }

    fn failed_key(&self, queue: &str) -> String {
        format!("{}:{}:failed", self.prefix, queue)
    }

    fn data_key(&self, queue: &str, id: &str) -> String {
        format!("{}:{}:data:{}", self.prefix, queue, id)
    }

    async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool
            .get()
            .await
            .map_err(|e| Error::queue_with_source("failed to acquire redis connection", e))
    }

    /// Appends a message with a fresh id and `attempt=0`.
    pub async fn enqueue(&self, queue: &str, payload: serde_json::Value) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        let message = QueueMessage {
            id: id.clone(),
            payload,
            attempt: 0,
        };
        let body = serde_json::to_string(&message)
            .map_err(|e| Error::serialization(format!("failed to encode queue message: {e}")))?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set(self.data_key(queue, &id), body)
            .await
            .map_err(|e| Error::queue_with_source("failed to store message body", e))?;
        let _: () = conn
            .lpush(self.pending_key(queue), &id)
            .await
            .map_err(|e| Error::queue_with_source("failed to push to pending list", e))?;

        Ok(id)
    }

    /// Blocking pop with a maximum wait. Returns `None` on timeout, never
    /// an error for a plain timeout.
    pub async fn dequeue(&self, queue: &str, timeout: Duration) -> Result<Option<QueueMessage>> {
        let mut conn = self.connection().await?;
        let popped: Option<(String, String)> = conn
            .brpop(self.pending_key(queue), timeout.as_secs_f64())
            .await
            .map_err(|e| Error::queue_with_source("failed to dequeue", e))?;

        let Some((_list, id)) = popped else {
            return Ok(None);
        };

        let body: Option<String> = conn
            .get(self.data_key(queue, &id))
            .await
            .map_err(|e| Error::queue_with_source("failed to fetch message body", e))?;

        let Some(body) = body else {
            // Data blob expired or was never written; treat as a missed message.
            return Ok(None);
        };

        let message: QueueMessage = serde_json::from_str(&body)
            .map_err(|e| Error::serialization(format!("failed to decode queue message: {e}")))?;

        Ok(Some(message))
    }

    /// Increments `attempt`; routes to the failed structure once the retry
    /// ceiling is exceeded, otherwise schedules into the delayed set with
    /// visibility time `now + backoff(attempt)`.
    pub async fn requeue(&self, queue: &str, mut message: QueueMessage) -> Result<RequeueOutcome> {
        message.attempt += 1;

        if message.attempt > self.retry.max_attempts {
            self.fail(queue, message).await?;
            return Ok(RequeueOutcome::Failed);
        }

        let delay = self.retry.backoff_for(message.attempt);
        let visible_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
        let score = visible_at.timestamp_millis();

        let body = serde_json::to_string(&message)
            .map_err(|e| Error::serialization(format!("failed to encode queue message: {e}")))?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set(self.data_key(queue, &message.id), body)
            .await
            .map_err(|e| Error::queue_with_source("failed to store message body", e))?;
        let _: () = conn
            .zadd(self.delayed_key(queue), &message.id, score)
            .await
            .map_err(|e| Error::queue_with_source("failed to schedule delayed message", e))?;

        Ok(RequeueOutcome::Requeued)
    }

    async fn fail(&self, queue: &str, message: QueueMessage) -> Result<()> {
        tracing::warn!(
            queue,
            job_id = %message.id,
            attempt = message.attempt,
            "retry ceiling exceeded, routing to failed structure"
        );

        let body = serde_json::to_string(&message)
            .map_err(|e| Error::serialization(format!("failed to encode queue message: {e}")))?;

        let mut conn = self.connection().await?;
        let _: () = conn
            .set(self.data_key(queue, &message.id), body)
            .await
            .map_err(|e| Error::queue_with_source("failed to store message body", e))?;
        let _: () = conn
            .lpush(self.failed_key(queue), &message.id)
            .await
            .map_err(|e| Error::queue_with_source("failed to push to failed list", e))?;

        Ok(())
    }

    /// Moves all delayed entries whose visibility time has elapsed back
    /// onto the main queue. Returns the number promoted.
    pub async fn process_delayed(&self, queue: &str) -> Result<u64> {
        let mut conn = self.connection().await?;
        let now = Utc::now().timestamp_millis();

        let due: Vec<String> = conn
            .zrangebyscore(self.delayed_key(queue), 0, now)
            .await
            .map_err(|e| Error::queue_with_source("failed to scan delayed set", e))?;

        if due.is_empty() {
            return Ok(0);
        }

        for id in &due {
            let _: () = conn
                .zrem(self.delayed_key(queue), id)
                .await
                .map_err(|e| Error::queue_with_source("failed to remove promoted delayed entry", e))?;
            let _: () = conn
                .lpush(self.pending_key(queue), id)
                .await
                .map_err(|e| Error::queue_with_source("failed to promote delayed entry", e))?;
        }

        Ok(due.len() as u64)
    }

    /// Pending count, failed count, and a synthesised health rating.
    pub async fn stats(&self, queue: &str) -> Result<QueueStats> {
        let mut conn = self.connection().await?;

        let pending: u64 = conn
            .llen(self.pending_key(queue))
            .await
            .map_err(|e| Error::queue_with_source("failed to read pending length", e))?;
        let delayed: u64 = conn
            .zcard(self.delayed_key(queue))
            .await
            .map_err(|e| Error::queue_with_source("failed to read delayed cardinality", e))?;
        let failed: u64 = conn
            .llen(self.failed_key(queue))
            .await
            .map_err(|e| Error::queue_with_source("failed to read failed length", e))?;

        let health = if failed > FAILED_CRITICAL_THRESHOLD {
            QueueHealth::Critical
        } else if failed > FAILED_WARNING_THRESHOLD {
            QueueHealth::Warning
        } else {
            QueueHealth::Healthy
        };

        Ok(QueueStats {
            queue: queue.to_string(),
            pending,
            delayed,
            failed,
            health,
        })
    }

    /// `PING` round trip, used by the readiness probe (spec §6).
    pub async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut conn)
            .await
            .map_err(|e| Error::queue_with_source("redis PING failed", e))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backoff_is_bounded_by_cap() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_secs(1),
            backoff_cap: Duration::from_secs(600),
        };
        for attempt in 1..=5 {
            let delay = policy.backoff_for(attempt);
            assert!(delay <= Duration::from_secs(600));
            assert!(delay.as_millis() > 0);
        }
    }

    #[test]
    fn test_backoff_grows_with_attempt() {
        let policy = RetryPolicy {
            max_attempts: 5,
            backoff_base: Duration::from_millis(1000),
            backoff_cap: Duration::from_secs(600),
        };
        // Jitter makes exact comparison unreliable, but the cap for attempt 1
        // should be well below the cap for attempt 4.
        let cap_attempt_1 = 1000u64;
        let cap_attempt_4 = (1000u64 * 5u64.pow(3)).min(600_000);
        assert!(cap_attempt_1 < cap_attempt_4);
    }

    #[test]
    fn test_queue_health_thresholds() {
        assert_eq!(
            if 5u64 > FAILED_WARNING_THRESHOLD {
                QueueHealth::Warning
            } else {
                QueueHealth::Healthy
            },
            QueueHealth::Healthy
        );
        assert_eq!(
            if 150u64 > FAILED_CRITICAL_THRESHOLD {
                QueueHealth::Critical
            } else {
                QueueHealth::Warning
            },
            QueueHealth::Critical
        );
    }
}
