//! Redis-backed queue transport for the inventory pipeline (spec §4.1):
//! enqueue/dequeue, retry-with-backoff requeue, delayed-visibility
//! promotion, and per-queue stats.

pub mod queue;

pub use queue::{QueueHealth, QueueManager, QueueMessage, QueueStats, RequeueOutcome, RetryPolicy};
