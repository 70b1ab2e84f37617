//! Application context wiring the domain services to their adapters.
//!
//! Everything long-lived hangs off this struct: the SQLite pool, the durable
//! queues, the HTTP integrations and the background loops. Construction is
//! side-effect free apart from opening the database and running migrations;
//! nothing polls or ticks until `start_all` is called.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Context as AnyhowContext};
use chrono::NaiveDate;
use punchsync_core::{
    EquipmentCatalog, ImportPipeline, ImportPipelineConfig, ImportRepository, ImportRoutine,
    JobQueue, NotificationConfig, NotificationService, ObjectStore,
};
use punchsync_domain::{BatchReport, Config, EnqueueSummary};
use punchsync_infra::{
    DbManager, ErpProcessClient, HttpClient, HttpObjectStore, ImportJobHandler,
    NotificationJobHandler, QueueWorker, QueueWorkerConfig, ReconcileScheduler,
    ReconcileSchedulerConfig, RoutineScheduler, SqliteImportRepository, SqliteJobQueue,
    TerminalClient, WebhookNotifier,
};
use tracing::{info, warn};

/// Long-lived application state shared across the daemon.
pub struct AppContext {
    db: Arc<DbManager>,
    pipeline: Arc<ImportPipeline>,
    routine: Arc<ImportRoutine>,
    import_worker: QueueWorker,
    notify_worker: QueueWorker,
    routine_scheduler: RoutineScheduler,
    reconcile_scheduler: ReconcileScheduler,
}

impl AppContext {
    /// Build the full object graph from loaded configuration.
    pub fn initialize(config: &Config) -> anyhow::Result<Self> {
        let db = Arc::new(
            DbManager::new(&config.database.path, config.database.pool_size)
                .context("failed to open the application database")?,
        );
        db.run_migrations().context("failed to run database migrations")?;

        let queue: Arc<dyn JobQueue> = Arc::new(SqliteJobQueue::new(Arc::clone(&db)));
        let repository: Arc<dyn ImportRepository> =
            Arc::new(SqliteImportRepository::new(Arc::clone(&db)));

        // The queue already retries failed jobs with backoff, so the clients
        // behind the handlers get a single attempt each. Archive uploads sit
        // outside that loop for log harvesting and keep transport retries.
        let single_attempt =
            HttpClient::builder().max_attempts(1).build().context("failed to build HTTP client")?;
        let archive_http = HttpClient::new().context("failed to build archive HTTP client")?;

        let terminal = Arc::new(TerminalClient::new(&config.terminal, single_attempt.clone()));
        let erp = Arc::new(ErpProcessClient::new(&config.erp, single_attempt.clone()));
        let store: Arc<dyn ObjectStore> =
            Arc::new(HttpObjectStore::new(&config.archive, archive_http));
        let notifier = Arc::new(WebhookNotifier::new(&config.notifier, single_attempt));

        let catalog = Arc::new(EquipmentCatalog::builtin());

        let pipeline = Arc::new(ImportPipeline::new(
            terminal,
            erp,
            Arc::clone(&store),
            Arc::clone(&repository),
            Arc::clone(&catalog),
            ImportPipelineConfig {
                erp_import_path: config.erp.import_path.clone(),
                artifact_bucket: config.archive.artifact_bucket.clone(),
                settle_delay: Duration::from_secs(config.erp.settle_secs),
            },
        ));

        let routine = Arc::new(ImportRoutine::new(Arc::clone(&catalog), Arc::clone(&queue)));

        let notification = Arc::new(NotificationService::new(
            Arc::clone(&repository),
            store,
            notifier,
            Arc::clone(&queue),
            NotificationConfig {
                log_bucket: config.archive.log_bucket.clone(),
                log_prefix: config.archive.log_prefix.clone(),
            },
        ));

        let worker_config = QueueWorkerConfig::from_settings(&config.workers);
        let import_worker = QueueWorker::new(
            Arc::clone(&queue),
            Arc::new(ImportJobHandler::new(Arc::clone(&pipeline))),
            worker_config.clone(),
        );
        let notify_worker = QueueWorker::new(
            Arc::clone(&queue),
            Arc::new(NotificationJobHandler::new(Arc::clone(&notification))),
            worker_config,
        );

        let routine_scheduler =
            RoutineScheduler::new(config.scheduler.routine_cron.clone(), Arc::clone(&routine));
        let reconcile_scheduler = ReconcileScheduler::new(
            notification,
            ReconcileSchedulerConfig {
                interval: Duration::from_secs(config.scheduler.reconcile_interval_secs),
                ..Default::default()
            },
        );

        info!(db_path = %config.database.path, "application context initialised");

        Ok(Self {
            db,
            pipeline,
            routine,
            import_worker,
            notify_worker,
            routine_scheduler,
            reconcile_scheduler,
        })
    }

    /// Start the workers and schedulers. Fails fast on the first component
    /// that will not come up; already-started components stay running so the
    /// caller can still `stop_all`.
    pub async fn start_all(&mut self) -> anyhow::Result<()> {
        self.db.health_check().context("database health check failed")?;

        self.import_worker
            .start()
            .await
            .map_err(|e| anyhow!("import worker failed to start: {e}"))?;
        self.notify_worker
            .start()
            .await
            .map_err(|e| anyhow!("notification worker failed to start: {e}"))?;
        self.routine_scheduler.start().await.context("routine scheduler failed to start")?;
        self.reconcile_scheduler.start().await.context("reconcile scheduler failed to start")?;

        info!("all background services started");
        Ok(())
    }

    /// Stop everything, schedulers first so no new work is produced while the
    /// workers drain. Individual stop failures are logged, not propagated.
    pub async fn stop_all(&mut self) {
        if self.routine_scheduler.is_running() {
            if let Err(e) = self.routine_scheduler.stop().await {
                warn!(error = %e, "routine scheduler did not stop cleanly");
            }
        }
        if self.reconcile_scheduler.is_running() {
            if let Err(e) = self.reconcile_scheduler.stop().await {
                warn!(error = %e, "reconcile scheduler did not stop cleanly");
            }
        }
        if self.import_worker.is_running() {
            if let Err(e) = self.import_worker.stop().await {
                warn!(error = %e, "import worker did not stop cleanly");
            }
        }
        if self.notify_worker.is_running() {
            if let Err(e) = self.notify_worker.stop().await {
                warn!(error = %e, "notification worker did not stop cleanly");
            }
        }

        info!("all background services stopped");
    }

    /// Enqueue the daily workload for an explicit date, outside the cron.
    pub async fn trigger_routine(&self, date: NaiveDate) -> anyhow::Result<EnqueueSummary> {
        self.routine.enqueue_daily(date).await.context("routine enqueue failed")
    }

    /// Run the import pipeline synchronously for a device selection,
    /// bypassing the queue. `selection = None` covers the whole catalog.
    pub async fn run_batch(&self, selection: Option<&[i64]>, date: NaiveDate) -> BatchReport {
        self.pipeline.process_batch(selection, date).await
    }
}

#[cfg(test)]
mod tests {
    use punchsync_domain::{
        ArchiveConfig, DatabaseConfig, ErpConfig, NotifierConfig, SchedulerConfig, TerminalConfig,
        WorkerConfig,
    };
    use tempfile::TempDir;

    use super::*;

    fn test_config(temp_dir: &TempDir) -> Config {
        Config {
            terminal: TerminalConfig {
                base_url: "http://127.0.0.1:1".into(),
                email: "ops@example.com".into(),
                password: "secret".into(),
                session_ttl_secs: 1200,
            },
            erp: ErpConfig {
                base_url: "http://127.0.0.1:1".into(),
                username: "erp".into(),
                password: "secret".into(),
                import_path: "Z:\\imports\\".into(),
                settle_secs: 0,
            },
            archive: ArchiveConfig {
                endpoint: "http://127.0.0.1:1".into(),
                artifact_bucket: "afd-artifacts".into(),
                log_bucket: "afd-logs".into(),
                log_prefix: "logs/".into(),
            },
            notifier: NotifierConfig { webhook_url: "http://127.0.0.1:1/hook".into() },
            database: DatabaseConfig {
                path: temp_dir.path().join("app.db").to_string_lossy().into_owned(),
                pool_size: 2,
            },
            scheduler: SchedulerConfig {
                routine_cron: "0 0 */2 * * *".into(),
                reconcile_interval_secs: 60,
            },
            workers: WorkerConfig::default(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn context_starts_and_stops_cleanly() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let mut ctx = AppContext::initialize(&test_config(&temp_dir)).expect("context built");

        ctx.start_all().await.expect("start succeeds");
        ctx.stop_all().await;
    }

    #[tokio::test]
    async fn trigger_routine_enqueues_the_catalog() {
        let temp_dir = TempDir::new().expect("temp dir created");
        let ctx = AppContext::initialize(&test_config(&temp_dir)).expect("context built");

        let summary =
            ctx.trigger_routine(NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"))
                .await
                .expect("enqueue succeeds");
        // Seven devices, each mirrored into the partner company.
        assert_eq!(summary.enqueued, 14);
        assert_eq!(summary.coalesced, 0);

        let again = ctx
            .trigger_routine(NaiveDate::from_ymd_opt(2024, 3, 1).expect("valid date"))
            .await
            .expect("second enqueue succeeds");
        assert_eq!(again.enqueued, 0);
        assert_eq!(again.coalesced, 14);
    }
}
