//! Queue messages and ERP job types.

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use serde::{Deserialize, Serialize};

use crate::constants::{IMPORT_JOB_KEY_PREFIX, NOTIFY_JOB_KEY_PREFIX};
use crate::types::EquipmentMapping;

/// Per-device import work item carried on the import queue.
///
/// The equipment snapshot is authoritative: mirrored jobs carry a company
/// code that differs from the catalog entry for the same device, so workers
/// must never re-resolve it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportJob {
    pub equipment: EquipmentMapping,
    pub reference_date: NaiveDate,
}

impl ImportJob {
    pub fn new(equipment: EquipmentMapping, reference_date: NaiveDate) -> Self {
        Self { equipment, reference_date }
    }

    /// Stable key coalescing duplicate enqueues of the same device, company
    /// and day.
    pub fn idempotency_key(&self) -> String {
        format!(
            "{IMPORT_JOB_KEY_PREFIX}-{}-{}-{}",
            self.equipment.device_id,
            self.equipment.company_code,
            reference_date_epoch(self.reference_date)
        )
    }
}

/// Seconds since the Unix epoch at midnight UTC of the reference date.
pub fn reference_date_epoch(date: NaiveDate) -> i64 {
    date.and_time(NaiveTime::MIN).and_utc().timestamp()
}

/// Status-poll work item carried on the notification queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NotificationJob {
    pub job_id: i64,
    pub last_status: JobStatus,
}

impl NotificationJob {
    pub fn new(job_id: i64, last_status: JobStatus) -> Self {
        Self { job_id, last_status }
    }

    pub fn idempotency_key(&self) -> String {
        format!("{NOTIFY_JOB_KEY_PREFIX}-{}", self.job_id)
    }
}

/// ERP job execution status code.
///
/// The code set is owned by the ERP's job server; anything outside the known
/// range is carried verbatim and described by the fallback text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobStatus(pub i64);

impl JobStatus {
    pub const NOT_STARTED: Self = Self(0);
    pub const RUNNING: Self = Self(1);
    pub const FINISHED: Self = Self(2);
    pub const CANCELLED: Self = Self(3);
    pub const INTERRUPTED: Self = Self(4);
    pub const FAILED: Self = Self(5);
    pub const WARNING: Self = Self(6);
    pub const SERVER_FAILURE: Self = Self(7);
    pub const SUSPENDED: Self = Self(8);
    pub const NO_AFFINITY: Self = Self(9);

    pub fn code(self) -> i64 {
        self.0
    }

    /// Normal completion; the one state reconciliation never re-polls.
    pub fn is_finished(self) -> bool {
        self == Self::FINISHED
    }

    /// Terminal or attention states that are worth one operator notification.
    pub fn requires_notification(self) -> bool {
        (3..=9).contains(&self.0)
    }

    /// Operator-facing description of the status code.
    pub fn describe(self) -> &'static str {
        match self.0 {
            0 => "the job has not been executed yet",
            1 => "the job is currently running",
            2 => "the job finished normally",
            3 => "the job execution was cancelled",
            4 => "the job execution started and was interrupted",
            5 => "the job execution failed with an error",
            6 => "the job finished with warnings",
            7 => "the job server failed and the job did not finish",
            8 => "the job execution is suspended until it is enabled again",
            9 => "no job server with matching affinity was available",
            _ => "the job is scheduled to run at its programmed date",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Reference to an ERP job row, as returned by the correlation lookup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErpJobRef {
    pub id: i64,
    /// Absent until the job server writes its first execution row.
    pub status: Option<JobStatus>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// One execution log attached to an ERP job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErpJobLog {
    pub job_id: i64,
    pub name: String,
    pub content: String,
}

/// Input for the ERP batch-import procedure call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImportProcessRequest {
    pub company_code: i64,
    pub terminal_code: i64,
    pub file_path: String,
    pub reference_date: NaiveDate,
}
