//! Cron-driven producer for the daily import workload.
//!
//! On every tick the scheduler asks the import routine to enqueue one job per
//! cataloged device for the current date, mirrored companies included. The
//! queue coalesces duplicate keys, so a cron that fires several times a day
//! keeps re-offering the same work without duplicating it.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use punchsync_core::ImportRoutine;
use tokio::task::JoinHandle;
use tokio_cron_scheduler::{Job, JobScheduler};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};

use crate::scheduling::error::{SchedulerError, SchedulerResult};

/// Configuration for the routine scheduler.
#[derive(Debug, Clone)]
pub struct RoutineSchedulerConfig {
    /// Cron expression (seconds field included) describing the schedule.
    pub cron_expression: String,
    /// Timeout applied to a single routine execution.
    pub job_timeout: Duration,
    /// Timeout for starting the underlying scheduler.
    pub start_timeout: Duration,
    /// Timeout for stopping the scheduler.
    pub stop_timeout: Duration,
    /// Timeout for awaiting the monitor task join handle.
    pub join_timeout: Duration,
}

impl Default for RoutineSchedulerConfig {
    fn default() -> Self {
        Self {
            cron_expression: "0 0 */2 * * *".into(), // every two hours
            job_timeout: Duration::from_secs(300),
            start_timeout: Duration::from_secs(5),
            stop_timeout: Duration::from_secs(5),
            join_timeout: Duration::from_secs(5),
        }
    }
}

/// Import routine scheduler with explicit lifecycle management.
pub struct RoutineScheduler {
    scheduler: Option<JobScheduler>,
    config: RoutineSchedulerConfig,
    monitor_handle: Option<JoinHandle<()>>,
    cancellation: CancellationToken,
    routine: Arc<ImportRoutine>,
}

impl RoutineScheduler {
    /// Create a scheduler with the default configuration.
    pub fn new(cron_expression: String, routine: Arc<ImportRoutine>) -> Self {
        let config = RoutineSchedulerConfig { cron_expression, ..Default::default() };
        Self::with_config(config, routine)
    }

    /// Create a scheduler with a custom configuration.
    pub fn with_config(config: RoutineSchedulerConfig, routine: Arc<ImportRoutine>) -> Self {
        Self {
            scheduler: None,
            config,
            monitor_handle: None,
            cancellation: CancellationToken::new(),
            routine,
        }
    }

    /// Start the scheduler, spawning the monitoring task.
    #[instrument(skip(self))]
    pub async fn start(&mut self) -> SchedulerResult<()> {
        if self.is_running() {
            return Err(SchedulerError::AlreadyRunning);
        }

        self.cancellation = CancellationToken::new();

        let scheduler_instance = self.build_scheduler().await?;
        let start_timeout = self.config.start_timeout;

        tokio::time::timeout(start_timeout, scheduler_instance.start())
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: start_timeout.as_secs() })?
            .map_err(|e| SchedulerError::StartFailed(e.to_string()))?;

        self.scheduler = Some(scheduler_instance);

        let cancel = self.cancellation.clone();
        let handle = tokio::spawn(async move {
            cancel.cancelled().await;
            debug!(scheduler = "routine", event = "monitor_cancelled", "monitor cancelled");
        });

        self.monitor_handle = Some(handle);
        info!(scheduler = "routine", cron = %self.config.cron_expression, "routine scheduler started");
        Ok(())
    }

    /// Stop the scheduler and wait for the monitor task to finish.
    #[instrument(skip(self))]
    pub async fn stop(&mut self) -> SchedulerResult<()> {
        if !self.is_running() {
            return Err(SchedulerError::NotRunning);
        }

        self.cancellation.cancel();

        let mut scheduler = match self.scheduler.take() {
            Some(scheduler) => scheduler,
            None => return Err(SchedulerError::NotRunning),
        };

        let stop_timeout = self.config.stop_timeout;
        tokio::time::timeout(stop_timeout, async move { scheduler.shutdown().await })
            .await
            .map_err(|_| SchedulerError::Timeout { seconds: stop_timeout.as_secs() })?
            .map_err(|e| SchedulerError::StopFailed(e.to_string()))?;

        if let Some(handle) = self.monitor_handle.take() {
            let join_timeout = self.config.join_timeout;
            tokio::time::timeout(join_timeout, handle)
                .await
                .map_err(|_| SchedulerError::Timeout { seconds: join_timeout.as_secs() })?
                .map_err(|e| SchedulerError::TaskJoinFailed(e.to_string()))?;
        }

        info!(scheduler = "routine", event = "stop", "routine scheduler stopped");
        self.cancellation = CancellationToken::new();
        Ok(())
    }

    /// Returns true when a scheduler instance is active.
    pub fn is_running(&self) -> bool {
        self.scheduler.is_some()
    }

    async fn build_scheduler(&self) -> SchedulerResult<JobScheduler> {
        let scheduler =
            JobScheduler::new().await.map_err(|e| SchedulerError::CreationFailed(e.to_string()))?;

        let cron_expr = self.config.cron_expression.clone();
        let routine = self.routine.clone();
        let job_timeout = self.config.job_timeout;

        let job_definition = Job::new_async(cron_expr.as_str(), move |_id, _lock| {
            let routine = routine.clone();

            Box::pin(async move {
                let today = Utc::now().date_naive();

                match tokio::time::timeout(job_timeout, routine.enqueue_daily(today)).await {
                    Ok(Ok(summary)) => {
                        info!(
                            scheduler = "routine",
                            date = %today,
                            enqueued = summary.enqueued,
                            coalesced = summary.coalesced,
                            "import routine tick finished"
                        );
                    }
                    Ok(Err(err)) => {
                        error!(
                            scheduler = "routine",
                            date = %today,
                            error = %err,
                            "import routine tick failed"
                        );
                    }
                    Err(_) => {
                        warn!(
                            scheduler = "routine",
                            timeout_secs = job_timeout.as_secs(),
                            "import routine tick timed out"
                        );
                    }
                }
            })
        })
        .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        let job_id = job_definition.guid();
        scheduler
            .add(job_definition)
            .await
            .map_err(|e| SchedulerError::JobRegistrationFailed(e.to_string()))?;

        debug!(cron = %self.config.cron_expression, job_id = %job_id, "registered import routine job");
        Ok(scheduler)
    }
}

impl Drop for RoutineScheduler {
    fn drop(&mut self) {
        if self.is_running() {
            warn!(
                scheduler = "routine",
                event = "drop_cancel",
                "RoutineScheduler dropped while running; cancelling tasks"
            );
            self.cancellation.cancel();
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use punchsync_core::{
        EnqueueOutcome, EquipmentCatalog, FailureOutcome, JobDelivery, JobQueue, QueueName,
    };
    use punchsync_domain::Result as DomainResult;

    use super::*;

    struct CountingQueue {
        enqueued: AtomicUsize,
    }

    impl CountingQueue {
        fn new() -> Self {
            Self { enqueued: AtomicUsize::new(0) }
        }
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

    fn fast_config() -> RoutineSchedulerConfig {
        RoutineSchedulerConfig {
            cron_expression: "*/1 * * * * *".into(), // every second
            job_timeout: Duration::from_secs(2),
            start_timeout: Duration::from_secs(2),
            stop_timeout: Duration::from_secs(2),
            join_timeout: Duration::from_secs(2),
        }
    }

    fn test_routine(queue: Arc<CountingQueue>) -> Arc<ImportRoutine> {
        Arc::new(ImportRoutine::new(Arc::new(EquipmentCatalog::builtin()), queue))
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn lifecycle_enqueues_the_daily_workload() {
        let queue = Arc::new(CountingQueue::new());
        let mut scheduler = RoutineScheduler::with_config(fast_config(), test_routine(queue.clone()));

        scheduler.start().await.expect("start succeeds");
        tokio::time::sleep(Duration::from_secs(2)).await;
        scheduler.stop().await.expect("stop succeeds");

        assert!(!scheduler.is_running());
        // Each tick enqueues the full workload: seven devices, each
        // mirrored into the partner company.
        let enqueued = queue.enqueued.load(Ordering::SeqCst);
        assert!(enqueued >= 14, "at least one tick should have fired, got {enqueued}");
        assert_eq!(enqueued % 14, 0, "ticks enqueue whole catalog passes, got {enqueued}");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn double_start_is_rejected() {
        let queue = Arc::new(CountingQueue::new());
        let mut scheduler = RoutineScheduler::with_config(fast_config(), test_routine(queue));

        scheduler.start().await.expect("first start");
        let err = scheduler.start().await.expect_err("second start fails");
        assert!(matches!(err, SchedulerError::AlreadyRunning));
        scheduler.stop().await.expect("stop succeeds");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn restart_after_stop_succeeds() {
        let queue = Arc::new(CountingQueue::new());
        let mut scheduler = RoutineScheduler::with_config(fast_config(), test_routine(queue));

        scheduler.start().await.expect("start succeeds");
        scheduler.stop().await.expect("stop succeeds");
        assert!(!scheduler.is_running());

        scheduler.start().await.expect("start again");
        scheduler.stop().await.expect("stop again");
    }

    #[tokio::test]
    async fn stop_without_start_is_rejected() {
        let queue = Arc::new(CountingQueue::new());
        let mut scheduler = RoutineScheduler::with_config(fast_config(), test_routine(queue));

        let err = scheduler.stop().await.expect_err("stop fails");
        assert!(matches!(err, SchedulerError::NotRunning));
    }
}
