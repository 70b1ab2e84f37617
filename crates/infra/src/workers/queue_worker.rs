//! Generic polling consumer for the durable job queues.
//!
//! The worker claims due jobs in batches and hands each delivery to its
//! handler. A handler error records a failed attempt, which either schedules
//! a retry with backoff or kills the job once its attempts are spent. The
//! implementation keeps the runtime rules used elsewhere in this crate: the
//! loop task is tracked by join handle, cancellation is explicit and every
//! batch runs under a timeout.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use punchsync_core::{FailureOutcome, JobDelivery, JobQueue, QueueName};
use punchsync_domain::{PunchSyncError, WorkerConfig};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

/// Per-queue processing logic plugged into the generic worker.
#[async_trait]
pub trait JobHandler: Send + Sync {
    /// Queue this handler consumes.
    fn queue(&self) -> QueueName;

    /// Process one claimed delivery. An error schedules a retry.
    async fn handle(&self, delivery: &JobDelivery) -> Result<(), PunchSyncError>;
}

/// Configuration for a queue worker.
#[derive(Debug, Clone)]
pub struct QueueWorkerConfig {
    /// Interval between polling attempts.
    pub poll_interval: Duration,
    /// Maximum number of jobs to claim per tick.
    pub batch_size: usize,
    /// Deliveries processed in parallel within one batch.
    pub concurrency: usize,
    /// Claims older than this are treated as abandoned by a crashed worker.
    pub claim_ttl: Duration,
    /// Timeout for processing a single batch.
    pub processing_timeout: Duration,
    /// Join timeout when stopping.
    pub join_timeout: Duration,
}

impl Default for QueueWorkerConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(5),
            batch_size: 10,
            concurrency: 4,
            claim_ttl: Duration::from_secs(600),
            processing_timeout: Duration::from_secs(300),
            join_timeout: Duration::from_secs(5),
        }
    }
}

impl QueueWorkerConfig {
    /// Build from the shared worker settings, defaults for the timeouts.
    pub fn from_settings(settings: &WorkerConfig) -> Self {
        Self {
            poll_interval: Duration::from_secs(settings.poll_interval_secs),
            batch_size: settings.batch_size,
            // Zero would disable the concurrency cap entirely.
            concurrency: settings.concurrency.max(1),
            claim_ttl: Duration::from_secs(settings.claim_ttl_secs),
            ..Default::default()
        }
    }
}

/// Queue worker with explicit lifecycle management.
pub struct QueueWorker {
    queue: Arc<dyn JobQueue>,
    handler: Arc<dyn JobHandler>,
    config: QueueWorkerConfig,
    cancellation: CancellationToken,
    task_handle: Option<JoinHandle<()>>,
}

impl QueueWorker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: QueueWorkerConfig,
    ) -> Self {
        Self { queue, handler, config, cancellation: CancellationToken::new(), task_handle: None }
    }

    /// Start the worker, spawning the background processing task.
    #[instrument(skip(self), fields(queue = %self.handler.queue()))]
    pub async fn start(&mut self) -> Result<(), String> {
        if self.is_running() {
            return Err("Worker already running".to_string());
        }

        info!(queue = %self.handler.queue(), "starting queue worker");

        self.cancellation = CancellationToken::new();

        let queue = Arc::clone(&self.queue);
        let handler = Arc::clone(&self.handler);
        let config = self.config.clone();
        let cancel = self.cancellation.clone();

        let handle = tokio::spawn(async move {
            Self::process_loop(queue, handler, config, cancel).await;
        });

        self.task_handle = Some(handle);
        Ok(())
    }

    /// Stop the worker and wait for the processing task to finish.
    #[instrument(skip(self), fields(queue = %self.handler.queue()))]
    pub async fn stop(&mut self) -> Result<(), String> {
        if !self.is_running() {
            return Err("Worker not running".to_string());
        }

        info!(queue = %self.handler.queue(), "stopping queue worker");

        self.cancellation.cancel();

        if let Some(handle) = self.task_handle.take() {
            let join_timeout = self.config.join_timeout;
            match tokio::time::timeout(join_timeout, handle).await {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    warn!(queue = %self.handler.queue(), "worker task panicked: {e}");
                    return Err("Worker task panicked".to_string());
                }
                Err(_) => {
                    warn!(queue = %self.handler.queue(), "worker task did not stop within timeout");
                    return Err("Worker task timeout".to_string());
                }
            }
        }

        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a worker instance is active.
    pub fn is_running(&self) -> bool {
        self.task_handle.is_some()
    }

    async fn process_loop(
        queue: Arc<dyn JobQueue>,
        handler: Arc<dyn JobHandler>,
        config: QueueWorkerConfig,
        cancel: CancellationToken,
    ) {
        let name = handler.queue();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(queue = %name, "worker process loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.poll_interval) => {
                    match tokio::time::timeout(
                        config.processing_timeout,
                        Self::process_batch(&queue, &handler, &config),
                    )
                    .await
                    {
                        Ok(Ok(())) => {}
                        Ok(Err(e)) => {
                            error!(queue = %name, error = %e, "batch processing failed");
                        }
                        Err(_) => {
                            warn!(
                                queue = %name,
                                timeout_secs = config.processing_timeout.as_secs(),
                                "batch processing timed out"
                            );
                        }
                    }
                }
            }
        }
    }

    /// One tick: release abandoned claims, claim due jobs, settle each one.
    async fn process_batch(
        queue: &Arc<dyn JobQueue>,
        handler: &Arc<dyn JobHandler>,
        config: &QueueWorkerConfig,
    ) -> Result<(), String> {
        let name = handler.queue();

        let released = queue
            .release_stale(name, config.claim_ttl)
            .await
            .map_err(|e| format!("failed to release stale claims: {e}"))?;
        if released > 0 {
            warn!(queue = %name, released, "requeued stale claims");
        }

        let deliveries = queue
            .claim_due(name, config.batch_size)
            .await
            .map_err(|e| format!("failed to claim due jobs: {e}"))?;

        if deliveries.is_empty() {
            debug!(queue = %name, "no due jobs");
            return Ok(());
        }

        info!(queue = %name, count = deliveries.len(), "processing claimed batch");

        stream::iter(deliveries)
            .for_each_concurrent(config.concurrency, |delivery| {
                let queue = Arc::clone(queue);
                let handler = Arc::clone(handler);
                async move {
                    Self::settle_delivery(&queue, &handler, &delivery).await;
                }
            })
            .await;

        Ok(())
    }

    async fn settle_delivery(
        queue: &Arc<dyn JobQueue>,
        handler: &Arc<dyn JobHandler>,
        delivery: &JobDelivery,
    ) {
        match handler.handle(delivery).await {
            Ok(()) => {
                debug!(
                    queue = %delivery.queue,
                    key = %delivery.key,
                    attempt = delivery.attempt,
                    "job completed"
                );
                if let Err(err) = queue.complete(delivery.id).await {
                    warn!(
                        queue = %delivery.queue,
                        key = %delivery.key,
                        error = %err,
                        "failed to mark job completed"
                    );
                }
            }
            Err(err) => {
                warn!(
                    queue = %delivery.queue,
                    key = %delivery.key,
                    attempt = delivery.attempt,
                    error = %err,
                    "job attempt failed"
                );
                match queue.fail(delivery.id, &truncate_reason(&err.to_string())).await {
                    Ok(FailureOutcome::Retried { next_attempt_at }) => {
                        debug!(
                            queue = %delivery.queue,
                            key = %delivery.key,
                            retry_at = %next_attempt_at,
                            "job scheduled for retry"
                        );
                    }
                    Ok(FailureOutcome::Exhausted) => {
                        error!(
                            queue = %delivery.queue,
                            key = %delivery.key,
                            attempts = delivery.attempt,
                            "job attempts exhausted; giving up"
                        );
                    }
                    Err(mark_err) => {
                        warn!(
                            queue = %delivery.queue,
                            key = %delivery.key,
                            error = %mark_err,
                            "failed to record job failure"
                        );
                    }
                }
            }
        }
    }
}

fn truncate_reason(reason: &str) -> String {
    const MAX_LEN: usize = 256;
    if reason.len() <= MAX_LEN {
        return reason.to_string();
    }

    let mut truncated = reason.chars().take(MAX_LEN.saturating_sub(3)).collect::<String>();
    truncated.push_str("...");
    truncated
}

impl Drop for QueueWorker {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(queue = %self.handler.queue(), "QueueWorker dropped while running; cancelling tasks");
            self.cancellation.cancel();
        }
    }
}
