//! Interval-driven reconciliation of unnotified import records.
//!
//! Each tick runs one reconciliation pass of the notification service, which
//! turns unnotified records into queued notification jobs. The loop is
//! deliberately tight (seconds, not minutes) so operators hear about a
//! finished or failed import shortly after the ERP records it.

use std::sync::Arc;
use std::time::Duration;

use punchsync_core::NotificationService;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

type TaskHandle = Arc<Mutex<Option<JoinHandle<()>>>>;

/// Configuration for the reconcile scheduler.
#[derive(Debug, Clone)]
pub struct ReconcileSchedulerConfig {
    /// Delay between reconciliation passes.
    pub interval: Duration,
    /// Timeout applied to a single pass.
    pub tick_timeout: Duration,
    /// Timeout for awaiting the loop task on stop.
    pub join_timeout: Duration,
}

impl Default for ReconcileSchedulerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(10),
            tick_timeout: Duration::from_secs(30),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Reconciliation scheduler with explicit lifecycle management.
pub struct ReconcileScheduler {
    service: Arc<NotificationService>,
    config: ReconcileSchedulerConfig,
    cancellation_token: CancellationToken,
    task_handle: TaskHandle,
}

impl ReconcileScheduler {
    pub fn new(service: Arc<NotificationService>, config: ReconcileSchedulerConfig) -> Self {
        Self {
            service,
            config,
            cancellation_token: CancellationToken::new(),
            task_handle: Arc::new(Mutex::new(None)),
        }
    }

    /// Start the background loop.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        // A fresh token supports restart after stop.
        self.cancellation_token = CancellationToken::new();

        let service = Arc::clone(&self.service);
        let config = self.config.clone();
        let cancel = self.cancellation_token.clone();

        let handle = tokio::spawn(async move {
            Self::reconcile_loop(service, config, cancel).await;
        });

        *self.task_handle.lock().await = Some(handle);

        info!(
            scheduler = "reconcile",
            interval_secs = self.config.interval.as_secs(),
            "reconcile scheduler started"
        );
        Ok(())
    }

    /// Stop the loop and wait for it to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation_token.cancel();

        if let Some(handle) = self.task_handle.lock().await.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!(scheduler = "reconcile", event = "stop", "reconcile scheduler stopped");
        Ok(())
    }

    /// A scheduler is running while its loop task exists and has not finished.
    pub fn is_running(&self) -> bool {
        self.task_handle
            .try_lock()
            .ok()
            .and_then(|guard| guard.as_ref().map(|h| !h.is_finished()))
            .unwrap_or(false)
    }

    async fn reconcile_loop(
        service: Arc<NotificationService>,
        config: ReconcileSchedulerConfig,
        cancel: CancellationToken,
    ) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    debug!(scheduler = "reconcile", "reconcile loop cancelled");
                    break;
                }
                _ = tokio::time::sleep(config.interval) => {
                    match tokio::time::timeout(config.tick_timeout, service.reconcile()).await {
                        Ok(Ok(enqueued)) => {
                            if enqueued > 0 {
                                debug!(scheduler = "reconcile", enqueued, "reconcile pass finished");
                            }
                        }
                        Ok(Err(err)) => {
                            error!(scheduler = "reconcile", error = %err, "reconcile pass failed");
                        }
                        Err(_) => {
                            warn!(
                                scheduler = "reconcile",
                                timeout_secs = config.tick_timeout.as_secs(),
                                "reconcile pass timed out"
                            );
                        }
                    }
                }
            }
        }
    }
}

/// Best-effort cleanup when the owner forgets to stop.
impl Drop for ReconcileScheduler {
    fn drop(&mut self) {
        if !self.cancellation_token.is_cancelled() {
            warn!(scheduler = "reconcile", "ReconcileScheduler dropped while running; cancelling");
            self.cancellation_token.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use punchsync_core::{
        EnqueueOutcome, FailureOutcome, ImportRepository, JobDelivery, JobQueue, Notifier,
        NotificationConfig, ObjectStore, QueueName,
    };
    use punchsync_domain::{
        ErpJobLog, ErpJobRef, ImportLogRecord, ImportRecord, JobStatus, PendingNotification,
        Result as DomainResult, StoredObject,
    };

    use super::*;

    struct StubRepository {
        pending: Vec<PendingNotification>,
        scans: AtomicUsize,
    }

    impl StubRepository {
        fn with_pending(pending: Vec<PendingNotification>) -> Self {
            Self { pending, scans: AtomicUsize::new(0) }
        }
    }

    #[async_trait]
    impl ImportRepository for StubRepository {
        async fn find_latest_erp_job(
            &self,
            _created_by: &str,
            _process_name: &str,
        ) -> DomainResult<Option<ErpJobRef>> {
            Ok(None)
        }

        async fn erp_job_status(&self, _job_id: i64) -> DomainResult<Option<JobStatus>> {
            Ok(None)
        }

        async fn erp_job_logs(&self, _job_id: i64) -> DomainResult<Vec<ErpJobLog>> {
            Ok(Vec::new())
        }

        async fn upsert_record(&self, _record: &ImportRecord) -> DomainResult<()> {
            Ok(())
        }

        async fn record_by_job(&self, _job_id: i64) -> DomainResult<Option<ImportRecord>> {
            Ok(None)
        }

        async fn update_status(&self, _job_id: i64, _status: JobStatus) -> DomainResult<()> {
            Ok(())
        }

        async fn mark_notified(&self, _job_id: i64) -> DomainResult<()> {
            Ok(())
        }

        async fn pending_notifications(&self) -> DomainResult<Vec<PendingNotification>> {
            self.scans.fetch_add(1, Ordering::SeqCst);
            Ok(self.pending.clone())
        }

        async fn insert_log_record(&self, _record: &ImportLogRecord) -> DomainResult<bool> {
            Ok(true)
        }

        async fn log_records(&self, _job_id: i64) -> DomainResult<Vec<ImportLogRecord>> {
            Ok(Vec::new())
        }
    }

    struct NullStore;

    #[async_trait]
    impl ObjectStore for NullStore {
        async fn put(
            &self,
            bucket: &str,
            key: &str,
            _body: &[u8],
            _content_type: &str,
        ) -> DomainResult<StoredObject> {
            Ok(StoredObject {
                bucket: bucket.to_string(),
                key: key.to_string(),
                location_url: format!("http://store/{bucket}/{key}"),
            })
        }
    }

    struct NullNotifier;

    #[async_trait]
    impl Notifier for NullNotifier {
        async fn send(&self, _text: &str) -> DomainResult<()> {
            Ok(())
        }
    }

    struct CountingQueue {
        enqueued: AtomicUsize,
    }

    #[async_trait]
    impl JobQueue for CountingQueue {
        async fn enqueue(
            &self,
            _queue: QueueName,
            _key: &str,
            _payload: serde_json::Value,
        ) -> DomainResult<EnqueueOutcome> {
            self.enqueued.fetch_add(1, Ordering::SeqCst);
            Ok(EnqueueOutcome::Enqueued)
        }

        async fn claim_due(
            &self,
            _queue: QueueName,
            _limit: usize,
        ) -> DomainResult<Vec<JobDelivery>> {
            Ok(Vec::new())
        }

        async fn complete(&self, _delivery_id: i64) -> DomainResult<()> {
            Ok(())
        }

        async fn fail(&self, _delivery_id: i64, _error: &str) -> DomainResult<FailureOutcome> {
            Ok(FailureOutcome::Exhausted)
        }

        async fn release_stale(
            &self,
            _queue: QueueName,
            _claim_ttl: Duration,
        ) -> DomainResult<usize> {
            Ok(0)
        }
    }

    fn fast_config() -> ReconcileSchedulerConfig {
        ReconcileSchedulerConfig {
            interval: Duration::from_millis(50),
            tick_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(2),
        }
    }

    fn build_scheduler(
        repo: Arc<StubRepository>,
        queue: Arc<CountingQueue>,
    ) -> ReconcileScheduler {
        let service = Arc::new(NotificationService::new(
            repo,
            Arc::new(NullStore),
            Arc::new(NullNotifier),
            queue,
            NotificationConfig::default(),
        ));
        ReconcileScheduler::new(service, fast_config())
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn ticks_enqueue_pending_notifications() {
        let repo = Arc::new(StubRepository::with_pending(vec![PendingNotification {
            job_id: 412,
            status: JobStatus::RUNNING,
        }]));
        let queue = Arc::new(CountingQueue { enqueued: AtomicUsize::new(0) });
        let mut scheduler = build_scheduler(repo.clone(), queue.clone());

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_millis(300)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(repo.scans.load(Ordering::SeqCst) >= 2, "loop should have scanned repeatedly");
        assert!(queue.enqueued.load(Ordering::SeqCst) >= 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_transitions_are_tracked() {
        let repo = Arc::new(StubRepository::with_pending(Vec::new()));
        let queue = Arc::new(CountingQueue { enqueued: AtomicUsize::new(0) });
        let mut scheduler = build_scheduler(repo, queue);

        assert!(!scheduler.is_running());
        scheduler.start().await.expect("start succeeds");
        assert!(scheduler.is_running());
        scheduler.stop().await.expect("stop succeeds");
        assert!(!scheduler.is_running());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected() {
        let repo = Arc::new(StubRepository::with_pending(Vec::new()));
        let queue = Arc::new(CountingQueue { enqueued: AtomicUsize::new(0) });
        let mut scheduler = build_scheduler(repo, queue);

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_after_stop_succeeds() {
        let repo = Arc::new(StubRepository::with_pending(Vec::new()));
        let queue = Arc::new(CountingQueue { enqueued: AtomicUsize::new(0) });
        let mut scheduler = build_scheduler(repo, queue);

        scheduler.start().await.expect("start succeeds");
        scheduler.stop().await.expect("stop succeeds");
        scheduler.start().await.expect("start again");
        scheduler.stop().await.expect("stop again");
    }
}
