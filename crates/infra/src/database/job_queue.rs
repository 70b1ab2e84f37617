//! SQLite-backed implementation of the durable job queue port.
//!
//! Both logical queues share one `jobs` table. Idempotency is enforced by a
//! partial unique index over live rows, so a completed or dead job never
//! blocks re-enqueueing the same key. Claims mark rows `processing` and
//! count the attempt; crashed workers are recovered by `release_stale`.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Utc};
use punchsync_core::{EnqueueOutcome, FailureOutcome, JobDelivery, JobQueue, QueueName, RetryPolicy};
use punchsync_domain::{PunchSyncError, Result};
use rusqlite::params;
use serde_json::Value;
use tokio::task;
use tracing::warn;

use super::manager::DbManager;
use crate::errors::InfraError;

/// Durable queue over the shared SQLite pool.
pub struct SqliteJobQueue {
    db: Arc<DbManager>,
}

impl SqliteJobQueue {
    /// Construct a queue backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }
}

#[async_trait]
impl JobQueue for SqliteJobQueue {
    async fn enqueue(
        &self,
        queue: QueueName,
        key: &str,
        payload: Value,
    ) -> Result<EnqueueOutcome> {
        let db = Arc::clone(&self.db);
        let key = key.to_string();

        task::spawn_blocking(move || -> Result<EnqueueOutcome> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    ENQUEUE_SQL,
                    params![queue.as_str(), key, payload.to_string(), now_epoch()],
                )
                .map_err(map_sql_error)?;

            // OR IGNORE swallows exactly the live-key uniqueness violation.
            if changed == 0 {
                Ok(EnqueueOutcome::Duplicate)
            } else {
                Ok(EnqueueOutcome::Enqueued)
            }
        })
        .await
        .map_err(map_join_error)?
    }

    async fn claim_due(&self, queue: QueueName, limit: usize) -> Result<Vec<JobDelivery>> {
        if limit == 0 {
            return Ok(Vec::new());
        }

        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<JobDelivery>> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            let now = now_epoch();

            let mut deliveries = Vec::new();
            {
                let mut stmt = tx.prepare(CLAIM_SELECT_SQL).map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![queue.as_str(), now, usize_to_i64(limit)], |row| {
                        Ok((
                            row.get::<_, i64>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, i64>(3)?,
                        ))
                    })
                    .map_err(map_sql_error)?;

                for row in rows {
                    let (id, key, raw_payload, attempts) = row.map_err(map_sql_error)?;
                    let payload = serde_json::from_str(&raw_payload).map_err(|e| {
                        PunchSyncError::Database(format!("corrupt payload for job {id}: {e}"))
                    })?;
                    deliveries.push(JobDelivery {
                        id,
                        queue,
                        key,
                        payload,
                        attempt: i64_to_u32(attempts) + 1,
                    });
                }
            }

            for delivery in &deliveries {
                tx.execute(CLAIM_MARK_SQL, params![now, delivery.id]).map_err(map_sql_error)?;
            }

            tx.commit().map_err(map_sql_error)?;
            Ok(deliveries)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn complete(&self, delivery_id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            let changed =
                conn.execute(COMPLETE_SQL, params![delivery_id]).map_err(map_sql_error)?;
            if changed == 0 {
                return Err(PunchSyncError::NotFound(format!(
                    "queued job {delivery_id} not found"
                )));
            }
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn fail(&self, delivery_id: i64, error: &str) -> Result<FailureOutcome> {
        let db = Arc::clone(&self.db);
        let error = error.to_string();

        task::spawn_blocking(move || -> Result<FailureOutcome> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;

            let (raw_queue, attempts): (String, i64) = tx
                .query_row(FAIL_SELECT_SQL, params![delivery_id], |row| {
                    Ok((row.get(0)?, row.get(1)?))
                })
                .map_err(map_sql_error)?;

            let policy = policy_for(parse_queue(&raw_queue)?);
            let attempt = i64_to_u32(attempts);

            let outcome = if policy.exhausted(attempt) {
                tx.execute(FAIL_DEAD_SQL, params![error, delivery_id]).map_err(map_sql_error)?;
                FailureOutcome::Exhausted
            } else {
                let delay = policy.backoff_delay(attempt);
                let next_attempt_at = Utc::now() + chrono_secs(delay);
                tx.execute(
                    FAIL_RETRY_SQL,
                    params![next_attempt_at.timestamp(), error, delivery_id],
                )
                .map_err(map_sql_error)?;
                FailureOutcome::Retried { next_attempt_at }
            };

            tx.commit().map_err(map_sql_error)?;
            Ok(outcome)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn release_stale(&self, queue: QueueName, claim_ttl: Duration) -> Result<usize> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<usize> {
            let mut conn = db.get_connection()?;
            let tx = conn.transaction().map_err(map_sql_error)?;
            let now = now_epoch();
            let cutoff = now.saturating_sub(duration_secs_i64(claim_ttl));
            let policy = policy_for(queue);

            let stale: Vec<(i64, i64)> = {
                let mut stmt = tx.prepare(STALE_SELECT_SQL).map_err(map_sql_error)?;
                let rows = stmt
                    .query_map(params![queue.as_str(), cutoff], |row| {
                        Ok((row.get(0)?, row.get(1)?))
                    })
                    .map_err(map_sql_error)?;
                rows.collect::<std::result::Result<_, _>>().map_err(map_sql_error)?
            };

            let mut released = 0;
            for (id, attempts) in stale {
                if policy.exhausted(i64_to_u32(attempts)) {
                    warn!(job_id = id, queue = %queue, "expired claim had no attempts left, killing job");
                    tx.execute(STALE_DEAD_SQL, params![id]).map_err(map_sql_error)?;
                } else {
                    tx.execute(STALE_REQUEUE_SQL, params![now, id]).map_err(map_sql_error)?;
                }
                released += 1;
            }

            tx.commit().map_err(map_sql_error)?;
            Ok(released)
        })
        .await
        .map_err(map_join_error)?
    }
}

/// Retry policy applied to jobs on the given queue.
fn policy_for(queue: QueueName) -> RetryPolicy {
    match queue {
        QueueName::Import => RetryPolicy::import(),
        QueueName::Notification => RetryPolicy::notification(),
    }
}

fn parse_queue(raw: &str) -> Result<QueueName> {
    match raw {
        "import" => Ok(QueueName::Import),
        "notification" => Ok(QueueName::Notification),
        other => Err(PunchSyncError::Database(format!("unknown queue in jobs table: {other}"))),
    }
}

const ENQUEUE_SQL: &str = "INSERT OR IGNORE INTO jobs
        (queue, idempotency_key, payload, status, attempts, next_attempt_at, created_at)
    VALUES (?1, ?2, ?3, 'pending', 0, 0, ?4)";

const CLAIM_SELECT_SQL: &str = "SELECT id, idempotency_key, payload, attempts
    FROM jobs
    WHERE queue = ?1 AND status = 'pending' AND next_attempt_at <= ?2
    ORDER BY next_attempt_at ASC, id ASC
    LIMIT ?3";

const CLAIM_MARK_SQL: &str = "UPDATE jobs
    SET status = 'processing', attempts = attempts + 1, claimed_at = ?1
    WHERE id = ?2";

const COMPLETE_SQL: &str = "UPDATE jobs
    SET status = 'completed', claimed_at = NULL
    WHERE id = ?1";

const FAIL_SELECT_SQL: &str = "SELECT queue, attempts FROM jobs WHERE id = ?1";

const FAIL_DEAD_SQL: &str = "UPDATE jobs
    SET status = 'dead', last_error = ?1, claimed_at = NULL
    WHERE id = ?2";

const FAIL_RETRY_SQL: &str = "UPDATE jobs
    SET status = 'pending', next_attempt_at = ?1, last_error = ?2, claimed_at = NULL
    WHERE id = ?3";

const STALE_SELECT_SQL: &str = "SELECT id, attempts
    FROM jobs
    WHERE queue = ?1 AND status = 'processing'
        AND claimed_at IS NOT NULL AND claimed_at <= ?2";

const STALE_DEAD_SQL: &str = "UPDATE jobs
    SET status = 'dead', last_error = 'claim expired', claimed_at = NULL
    WHERE id = ?1";

const STALE_REQUEUE_SQL: &str = "UPDATE jobs
    SET status = 'pending', next_attempt_at = ?1, claimed_at = NULL
    WHERE id = ?2";

fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

fn chrono_secs(delay: Duration) -> ChronoDuration {
    ChronoDuration::seconds(duration_secs_i64(delay))
}

fn duration_secs_i64(delay: Duration) -> i64 {
    i64::try_from(delay.as_secs()).unwrap_or(i64::MAX)
}

fn usize_to_i64(value: usize) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn i64_to_u32(value: i64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

fn map_sql_error(err: rusqlite::Error) -> PunchSyncError {
    PunchSyncError::from(InfraError::from(err))
}

fn map_join_error(err: task::JoinError) -> PunchSyncError {
    PunchSyncError::from(InfraError::from(err))
}
