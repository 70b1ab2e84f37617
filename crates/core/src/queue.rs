//! Durable queue abstraction shared by the import and notification flows.
//!
//! The store guarantees at-least-once delivery: a claimed job that is neither
//! completed nor failed is eventually released back to pending. Idempotency
//! keys only dedupe against live (pending or processing) rows, so a key can
//! be re-enqueued once its previous job finished.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use punchsync_domain::Result;
use serde_json::Value;

/// Logical queues multiplexed over one durable store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueName {
    Import,
    Notification,
}

impl QueueName {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Notification => "notification",
        }
    }
}

impl std::fmt::Display for QueueName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Retry behaviour applied per queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, the first delivery included.
    pub max_attempts: u32,
    pub base_delay: Duration,
}

impl RetryPolicy {
    pub const fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self { max_attempts, base_delay }
    }

    /// Import jobs: 3 attempts, 60s base backoff.
    pub const fn import() -> Self {
        Self::new(3, Duration::from_secs(60))
    }

    /// Notification jobs: 3 attempts, 10s base backoff.
    pub const fn notification() -> Self {
        Self::new(3, Duration::from_secs(10))
    }

    /// Delay before the attempt after `attempt`: `base * 2^(attempt - 1)`.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << exponent)
    }

    pub fn exhausted(&self, attempt: u32) -> bool {
        attempt >= self.max_attempts
    }
}

/// Result of an idempotent enqueue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnqueueOutcome {
    Enqueued,
    /// A live job already carries this key; the enqueue was a no-op.
    Duplicate,
}

/// Result of recording a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retried { next_attempt_at: DateTime<Utc> },
    /// Attempt limit reached; the job is dead and will not run again.
    Exhausted,
}

/// One claimed job handed to a worker.
#[derive(Debug, Clone)]
pub struct JobDelivery {
    pub id: i64,
    pub queue: QueueName,
    pub key: String,
    pub payload: Value,
    /// 1-based number of the attempt this delivery represents.
    pub attempt: u32,
}

/// Durable, idempotent work queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Insert a job unless a live row already carries the same key.
    async fn enqueue(&self, queue: QueueName, key: &str, payload: Value)
        -> Result<EnqueueOutcome>;

    /// Claim up to `limit` due jobs, atomically marking them processing.
    async fn claim_due(&self, queue: QueueName, limit: usize) -> Result<Vec<JobDelivery>>;

    /// Mark a claimed job done.
    async fn complete(&self, delivery_id: i64) -> Result<()>;

    /// Record a failed attempt; schedules a retry or kills the job.
    async fn fail(&self, delivery_id: i64, error: &str) -> Result<FailureOutcome>;

    /// Requeue claims older than `claim_ttl`, left behind by crashed workers.
    async fn release_stale(&self, queue: QueueName, claim_ttl: Duration) -> Result<usize>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_doubles_per_attempt() {
        let policy = RetryPolicy::import();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(60));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(120));
        assert_eq!(policy.backoff_delay(3), Duration::from_secs(240));
    }

    #[test]
    fn notification_policy_uses_short_base() {
        let policy = RetryPolicy::notification();
        assert_eq!(policy.backoff_delay(1), Duration::from_secs(10));
        assert_eq!(policy.backoff_delay(2), Duration::from_secs(20));
    }

    #[test]
    fn exhaustion_counts_the_first_delivery() {
        let policy = RetryPolicy::new(3, Duration::from_secs(1));
        assert!(!policy.exhausted(1));
        assert!(!policy.exhausted(2));
        assert!(policy.exhausted(3));
        assert!(policy.exhausted(4));
    }

    #[test]
    fn backoff_exponent_is_clamped() {
        let policy = RetryPolicy::new(u32::MAX, Duration::from_secs(1));
        // Far past any realistic attempt count; must not overflow.
        assert_eq!(policy.backoff_delay(100), Duration::from_secs(1 << 16));
    }
}
