//! Port interfaces implemented by the infrastructure layer.

use async_trait::async_trait;
use chrono::NaiveDate;
use punchsync_domain::{
    DeviceLookup, ErpJobLog, ErpJobRef, ImportLogRecord, ImportProcessRequest, ImportRecord,
    JobStatus, PendingNotification, Result, StoredObject,
};

/// Authenticated access to the terminal-management API.
#[async_trait]
pub trait TerminalGateway: Send + Sync {
    /// Ensure a usable session exists, logging in when absent or expired.
    async fn ensure_session(&self) -> Result<()>;

    /// Page through the remote catalog looking for the target ids.
    async fn find_devices(&self, device_ids: &[i64]) -> Result<DeviceLookup>;

    /// Download the raw AFD feed for one device and one day.
    async fn download_afd(&self, device_id: i64, date: NaiveDate) -> Result<String>;
}

/// Remote trigger for the ERP batch-import procedure.
#[async_trait]
pub trait ErpImporter: Send + Sync {
    /// Returns the raw response body; callers compare it to the sentinel.
    async fn execute_import(&self, request: &ImportProcessRequest) -> Result<String>;
}

/// Archival object store.
///
/// `put` replaces by key, so artifact re-runs converge on one object;
/// append-only log storage is achieved by never reusing a log key.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn put(
        &self,
        bucket: &str,
        key: &str,
        body: &[u8],
        content_type: &str,
    ) -> Result<StoredObject>;
}

/// Operator notification channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Import bookkeeping plus the ERP job-registry reads the pipeline needs.
#[async_trait]
pub trait ImportRepository: Send + Sync {
    /// Most recently created ERP job matching the process signature.
    async fn find_latest_erp_job(
        &self,
        created_by: &str,
        process_name: &str,
    ) -> Result<Option<ErpJobRef>>;

    /// Live execution status; `None` while the job server has recorded nothing.
    async fn erp_job_status(&self, job_id: i64) -> Result<Option<JobStatus>>;

    /// Execution logs attached to an ERP job.
    async fn erp_job_logs(&self, job_id: i64) -> Result<Vec<ErpJobLog>>;

    /// Insert or replace the record referencing an ERP job.
    async fn upsert_record(&self, record: &ImportRecord) -> Result<()>;

    async fn record_by_job(&self, job_id: i64) -> Result<Option<ImportRecord>>;

    async fn update_status(&self, job_id: i64, status: JobStatus) -> Result<()>;

    async fn mark_notified(&self, job_id: i64) -> Result<()>;

    /// Unnotified records whose status is anything but finished.
    async fn pending_notifications(&self) -> Result<Vec<PendingNotification>>;

    /// Returns false when the (job, log name) pair was already recorded.
    async fn insert_log_record(&self, record: &ImportLogRecord) -> Result<bool>;

    async fn log_records(&self, job_id: i64) -> Result<Vec<ImportLogRecord>>;
}
