//! Pipeline outcome reporting types.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Import pipeline stages, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Lookup,
    Download,
    Save,
    Import,
    Complete,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lookup => "lookup",
            Self::Download => "download",
            Self::Save => "save",
            Self::Import => "import",
            Self::Complete => "complete",
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-device outcome of one pipeline run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessingResult {
    pub equipment_id: i64,
    pub equipment_name: String,
    pub success: bool,
    /// Furthest stage reached before stopping.
    pub stage: Stage,
    pub message: String,
    pub artifact_url: Option<String>,
    pub processed_at: DateTime<Utc>,
}

impl ProcessingResult {
    pub fn succeeded(
        equipment_id: i64,
        equipment_name: impl Into<String>,
        message: impl Into<String>,
        artifact_url: Option<String>,
    ) -> Self {
        Self {
            equipment_id,
            equipment_name: equipment_name.into(),
            success: true,
            stage: Stage::Complete,
            message: message.into(),
            artifact_url,
            processed_at: Utc::now(),
        }
    }

    pub fn failed(
        equipment_id: i64,
        equipment_name: impl Into<String>,
        stage: Stage,
        message: impl Into<String>,
        artifact_url: Option<String>,
    ) -> Self {
        Self {
            equipment_id,
            equipment_name: equipment_name.into(),
            success: false,
            stage,
            message: message.into(),
            artifact_url,
            processed_at: Utc::now(),
        }
    }
}

/// Aggregated outcome of a synchronous batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchReport {
    pub reference_date: NaiveDate,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ProcessingResult>,
    pub executed_at: DateTime<Utc>,
}

impl BatchReport {
    pub fn from_results(reference_date: NaiveDate, results: Vec<ProcessingResult>) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            reference_date,
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
            results,
            executed_at: Utc::now(),
        }
    }
}

/// Outcome of one routine scheduling pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueSummary {
    pub enqueued: usize,
    /// Duplicate keys coalesced by the queue.
    pub coalesced: usize,
}
