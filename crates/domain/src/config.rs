//! Configuration structures
//!
//! Typed configuration for every subsystem. Values are loaded by the infra
//! config loader (environment first, file fallback); defaults here mirror the
//! production deployment.

use serde::{Deserialize, Serialize};

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub terminal: TerminalConfig,
    pub erp: ErpConfig,
    pub archive: ArchiveConfig,
    pub notifier: NotifierConfig,
    pub database: DatabaseConfig,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    #[serde(default)]
    pub workers: WorkerConfig,
}

/// Terminal-management API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    /// Bearer tokens carry no server-side expiry; sessions are re-acquired
    /// after this many seconds.
    #[serde(default = "default_session_ttl_secs")]
    pub session_ttl_secs: u64,
}

/// ERP process API access.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErpConfig {
    pub base_url: String,
    pub username: String,
    pub password: String,
    /// Path prefix (trailing separator included) under which the ERP server
    /// sees archived artifacts.
    pub import_path: String,
    /// Wait between archiving an artifact and asking the ERP to read it, and
    /// again between triggering the import and correlating the created job.
    #[serde(default = "default_settle_secs")]
    pub settle_secs: u64,
}

/// Archival object store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArchiveConfig {
    pub endpoint: String,
    pub artifact_bucket: String,
    pub log_bucket: String,
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
}

/// Operator notification channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotifierConfig {
    pub webhook_url: String,
}

/// Local SQLite database.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub path: String,
    #[serde(default = "default_pool_size")]
    pub pool_size: u32,
}

/// Timer-driven producers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Cron expression (seconds field included) for the daily import routine.
    pub routine_cron: String,
    /// Interval between reconciliation scans of unnotified import records.
    pub reconcile_interval_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self { routine_cron: "0 0 */2 * * *".to_string(), reconcile_interval_secs: 10 }
    }
}

/// Queue worker tuning, shared by the import and notification pools.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub poll_interval_secs: u64,
    pub batch_size: usize,
    pub concurrency: usize,
    /// Claims older than this are treated as abandoned by a crashed worker.
    pub claim_ttl_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self { poll_interval_secs: 5, batch_size: 10, concurrency: 4, claim_ttl_secs: 600 }
    }
}

fn default_session_ttl_secs() -> u64 {
    1200
}

fn default_settle_secs() -> u64 {
    5
}

fn default_log_prefix() -> String {
    "logs/".to_string()
}

fn default_pool_size() -> u32 {
    4
}
