//! Persisted import bookkeeping records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::JobStatus;

/// One row per triggered ERP import job.
///
/// Created by the import pipeline once a correlating ERP job is found;
/// afterwards only the status and notified flag change, and only through the
/// notification worker. Rows are never deleted here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportRecord {
    pub job_id: i64,
    pub company_code: i64,
    pub device_name: String,
    pub status: JobStatus,
    /// Path under which the ERP server reads the archived artifact.
    pub file_path: String,
    /// Object-store URL of the archived artifact, when the upload succeeded.
    pub archive_url: Option<String>,
    pub notified: bool,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// One archived ERP execution log; unique per (job, log name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportLogRecord {
    pub job_id: i64,
    pub log_name: String,
    pub location_url: String,
}

/// Projection used by the reconciliation scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingNotification {
    pub job_id: i64,
    pub status: JobStatus,
}

/// Receipt for an object placed in the archival store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredObject {
    pub bucket: String,
    pub key: String,
    pub location_url: String,
}
