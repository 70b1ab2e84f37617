//! Status reconciliation and notification delivery.
//!
//! The reconciliation scan turns unnotified import records into queued
//! notification jobs. The worker side re-reads the live ERP status, persists
//! drift, and sends one operator message once the job lands in the
//! terminal/attention range. Delivery runs before the notified flag is set,
//! so a crash between the two can repeat a message; redelivered jobs whose
//! record is already flagged are dropped up front.

use std::collections::HashSet;
use std::sync::Arc;

use punchsync_domain::{
    ImportLogRecord, ImportRecord, JobStatus, NotificationJob, PunchSyncError, Result,
};
use tracing::{debug, info, instrument, warn};

use crate::ports::{ImportRepository, Notifier, ObjectStore};
use crate::queue::{EnqueueOutcome, JobQueue, QueueName};

/// Where harvested ERP logs are archived.
#[derive(Debug, Clone)]
pub struct NotificationConfig {
    pub log_bucket: String,
    /// Prefix prepended to `<job id>/<log name>` keys.
    pub log_prefix: String,
}

impl Default for NotificationConfig {
    fn default() -> Self {
        Self { log_bucket: "afd-logs".to_string(), log_prefix: "logs/".to_string() }
    }
}

/// Outcome of one notification job attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    /// The ERP has no execution row yet; the record stays pollable.
    Skipped,
    /// Status outside the attention range; nothing to send.
    NotRequired,
    Notified,
    /// Redelivery of a job whose record was already flagged.
    AlreadyNotified,
}

pub struct NotificationService {
    repository: Arc<dyn ImportRepository>,
    store: Arc<dyn ObjectStore>,
    notifier: Arc<dyn Notifier>,
    queue: Arc<dyn JobQueue>,
    config: NotificationConfig,
}

impl NotificationService {
    pub fn new(
        repository: Arc<dyn ImportRepository>,
        store: Arc<dyn ObjectStore>,
        notifier: Arc<dyn Notifier>,
        queue: Arc<dyn JobQueue>,
        config: NotificationConfig,
    ) -> Self {
        Self { repository, store, notifier, queue, config }
    }

    /// One reconciliation pass: enqueue a notification job for every
    /// unnotified record that is not plain finished.
    ///
    /// Returns how many jobs were actually enqueued; duplicates of jobs
    /// still live on the queue are coalesced.
    #[instrument(skip(self))]
    pub async fn reconcile(&self) -> Result<usize> {
        let pending = self.repository.pending_notifications().await?;
        debug!(pending = pending.len(), "reconciliation scan");

        let mut enqueued = 0;
        for item in &pending {
            let job = NotificationJob::new(item.job_id, item.status);
            let payload =
                serde_json::to_value(job).map_err(|e| PunchSyncError::Internal(e.to_string()))?;

            match self
                .queue
                .enqueue(QueueName::Notification, &job.idempotency_key(), payload)
                .await?
            {
                EnqueueOutcome::Enqueued => {
                    debug!(job_id = item.job_id, "notification job enqueued");
                    enqueued += 1;
                }
                EnqueueOutcome::Duplicate => {
                    debug!(job_id = item.job_id, "notification job already queued");
                }
            }
        }

        if enqueued > 0 {
            info!(enqueued, pending = pending.len(), "notification jobs enqueued");
        }
        Ok(enqueued)
    }

    /// Handle one notification job.
    ///
    /// Errors propagate so the queue retries; the log harvest is the one
    /// best-effort step inside.
    #[instrument(skip(self), fields(job_id = job.job_id))]
    pub async fn process(&self, job: &NotificationJob) -> Result<NotifyOutcome> {
        let live = match self.repository.erp_job_status(job.job_id).await? {
            Some(status) => status,
            None => {
                warn!("no live ERP status yet; leaving the record for the next scan");
                return Ok(NotifyOutcome::Skipped);
            }
        };

        if live != job.last_status {
            self.repository.update_status(job.job_id, live).await?;
            info!(from = %job.last_status, to = %live, "import record status updated");
        }

        if !live.requires_notification() {
            return Ok(NotifyOutcome::NotRequired);
        }

        let record = self.repository.record_by_job(job.job_id).await?.ok_or_else(|| {
            PunchSyncError::NotFound(format!("import record for ERP job {}", job.job_id))
        })?;

        if record.notified {
            debug!("record already notified; dropping redelivery");
            return Ok(NotifyOutcome::AlreadyNotified);
        }

        let logs = self.harvest_logs(job.job_id).await;
        let message = compose_message(&record, live, &logs);

        self.notifier.send(&message).await?;
        self.repository.mark_notified(job.job_id).await?;
        info!(status = %live, "operator notified");

        Ok(NotifyOutcome::Notified)
    }

    /// Archive ERP execution logs not yet recorded for this job. Failures
    /// are logged and the notification goes out without log references.
    async fn harvest_logs(&self, job_id: i64) -> Vec<ImportLogRecord> {
        match self.try_harvest(job_id).await {
            Ok(logs) => logs,
            Err(e) => {
                warn!(job_id, error = %e, "log harvest failed; notifying without logs");
                Vec::new()
            }
        }
    }

    async fn try_harvest(&self, job_id: i64) -> Result<Vec<ImportLogRecord>> {
        let known = self.repository.log_records(job_id).await?;
        let known_names: HashSet<&str> = known.iter().map(|r| r.log_name.as_str()).collect();

        let mut harvested = Vec::new();
        for log in self.repository.erp_job_logs(job_id).await? {
            if known_names.contains(log.name.as_str()) {
                continue;
            }

            let key = format!("{}{}/{}", self.config.log_prefix, job_id, log.name);
            let stored = self
                .store
                .put(&self.config.log_bucket, &key, log.content.as_bytes(), "text/plain")
                .await?;

            let record =
                ImportLogRecord { job_id, log_name: log.name, location_url: stored.location_url };
            if self.repository.insert_log_record(&record).await? {
                debug!(job_id, log_name = %record.log_name, "job log archived");
                harvested.push(record);
            }
        }

        // Retries keep referencing logs harvested on earlier attempts.
        let mut logs = known;
        logs.extend(harvested);
        Ok(logs)
    }
}

fn compose_message(record: &ImportRecord, status: JobStatus, logs: &[ImportLogRecord]) -> String {
    let mut message = format!(
        "*Punch import job notification*\n\n\
         *ERP job:* {}\n\
         *Company:* {}\n\
         *Device:* {}\n\
         *Status:* {}\n\
         *File:* {}",
        record.job_id,
        record.company_code,
        record.device_name,
        status.describe(),
        record.file_path
    );

    if let Some(url) = &record.archive_url {
        message.push_str(&format!("\n*Archive:* {url}"));
    }
    for log in logs {
        message.push_str(&format!("\n*Log:* {}: {}", log.log_name, log.location_url));
    }

    message
}
