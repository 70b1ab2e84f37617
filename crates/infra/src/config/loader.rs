//! Configuration loader
//!
//! Loads application configuration from environment variables or files.
//!
//! ## Loading Strategy
//! 1. First, attempts to load from environment variables
//! 2. If incomplete, falls back to loading from file
//! 3. Probes multiple paths for config files
//! 4. Supports JSON and TOML formats
//!
//! ## Environment Variables
//! - `PUNCHSYNC_TERMINAL_BASE_URL`: Terminal-management API base URL
//! - `PUNCHSYNC_TERMINAL_EMAIL`: Terminal API login email
//! - `PUNCHSYNC_TERMINAL_PASSWORD`: Terminal API login password
//! - `PUNCHSYNC_TERMINAL_SESSION_TTL`: Session lifetime in seconds (optional)
//! - `PUNCHSYNC_ERP_BASE_URL`: ERP REST API base URL
//! - `PUNCHSYNC_ERP_USERNAME`: ERP basic-auth username
//! - `PUNCHSYNC_ERP_PASSWORD`: ERP basic-auth password
//! - `PUNCHSYNC_ERP_IMPORT_PATH`: Path prefix the ERP uses to read artifacts
//! - `PUNCHSYNC_ERP_SETTLE_SECS`: Wait before the ERP reads an artifact (optional)
//! - `PUNCHSYNC_ARCHIVE_ENDPOINT`: Object store endpoint
//! - `PUNCHSYNC_ARCHIVE_ARTIFACT_BUCKET`: Bucket for AFD artifacts
//! - `PUNCHSYNC_ARCHIVE_LOG_BUCKET`: Bucket for harvested ERP logs
//! - `PUNCHSYNC_ARCHIVE_LOG_PREFIX`: Key prefix for harvested logs (optional)
//! - `PUNCHSYNC_WEBHOOK_URL`: Operator notification webhook
//! - `PUNCHSYNC_DB_PATH`: Database file path
//! - `PUNCHSYNC_DB_POOL_SIZE`: Connection pool size (optional)
//! - `PUNCHSYNC_ROUTINE_CRON`: Cron expression for the import routine (optional)
//! - `PUNCHSYNC_RECONCILE_INTERVAL`: Reconciliation interval in seconds (optional)
//! - `PUNCHSYNC_WORKER_POLL_INTERVAL`: Queue poll interval in seconds (optional)
//! - `PUNCHSYNC_WORKER_BATCH_SIZE`: Jobs claimed per poll (optional)
//! - `PUNCHSYNC_WORKER_CONCURRENCY`: Jobs processed in parallel (optional)
//! - `PUNCHSYNC_WORKER_CLAIM_TTL`: Seconds before a claim is abandoned (optional)
//!
//! ## File Locations
//! The loader probes the following paths (in order):
//! 1. `./config.json` or `./config.toml` (current working directory)
//! 2. `./punchsync.json` or `./punchsync.toml` (current working directory)
//! 3. `../config.json` or `../config.toml` (parent directory)
//! 4. `../../config.json` or `../../config.toml` (grandparent directory)
//! 5. Relative to executable location

use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use punchsync_domain::{
    ArchiveConfig, Config, DatabaseConfig, ErpConfig, NotifierConfig, PunchSyncError, Result,
    SchedulerConfig, TerminalConfig, WorkerConfig,
};

/// Load configuration with automatic fallback strategy
///
/// First attempts to load from environment variables. If any required
/// variables are missing, falls back to loading from a config file.
///
/// # Errors
/// Returns `PunchSyncError::Config` if:
/// - Configuration cannot be loaded from either source
/// - File format is invalid
/// - Required fields are missing
pub fn load() -> Result<Config> {
    // Try loading from environment first
    match load_from_env() {
        Ok(config) => {
            tracing::info!("Configuration loaded from environment variables");
            Ok(config)
        }
        Err(e) => {
            tracing::debug!(error = ?e, "Failed to load from environment, trying file");
            // Fall back to file
            load_from_file(None)
        }
    }
}

/// Load configuration from environment variables
///
/// All required environment variables must be present. Returns an error
/// if any are missing.
///
/// # Environment Variables
/// See module documentation for the complete list.
///
/// # Errors
/// Returns `PunchSyncError::Config` if required variables are missing
/// or have invalid values.
pub fn load_from_env() -> Result<Config> {
    let scheduler_defaults = SchedulerConfig::default();
    let worker_defaults = WorkerConfig::default();

    let terminal = TerminalConfig {
        base_url: env_var("PUNCHSYNC_TERMINAL_BASE_URL")?,
        email: env_var("PUNCHSYNC_TERMINAL_EMAIL")?,
        password: env_var("PUNCHSYNC_TERMINAL_PASSWORD")?,
        session_ttl_secs: env_parse_or("PUNCHSYNC_TERMINAL_SESSION_TTL", 1200)?,
    };

    let erp = ErpConfig {
        base_url: env_var("PUNCHSYNC_ERP_BASE_URL")?,
        username: env_var("PUNCHSYNC_ERP_USERNAME")?,
        password: env_var("PUNCHSYNC_ERP_PASSWORD")?,
        import_path: env_var("PUNCHSYNC_ERP_IMPORT_PATH")?,
        settle_secs: env_parse_or("PUNCHSYNC_ERP_SETTLE_SECS", 5)?,
    };

    let archive = ArchiveConfig {
        endpoint: env_var("PUNCHSYNC_ARCHIVE_ENDPOINT")?,
        artifact_bucket: env_var("PUNCHSYNC_ARCHIVE_ARTIFACT_BUCKET")?,
        log_bucket: env_var("PUNCHSYNC_ARCHIVE_LOG_BUCKET")?,
        log_prefix: env_string_or("PUNCHSYNC_ARCHIVE_LOG_PREFIX", "logs/"),
    };

    let notifier = NotifierConfig { webhook_url: env_var("PUNCHSYNC_WEBHOOK_URL")? };

    let database = DatabaseConfig {
        path: env_var("PUNCHSYNC_DB_PATH")?,
        pool_size: env_parse_or("PUNCHSYNC_DB_POOL_SIZE", 4)?,
    };

    let scheduler = SchedulerConfig {
        routine_cron: env_string_or("PUNCHSYNC_ROUTINE_CRON", &scheduler_defaults.routine_cron),
        reconcile_interval_secs: env_parse_or(
            "PUNCHSYNC_RECONCILE_INTERVAL",
            scheduler_defaults.reconcile_interval_secs,
        )?,
    };

    let workers = WorkerConfig {
        poll_interval_secs: env_parse_or(
            "PUNCHSYNC_WORKER_POLL_INTERVAL",
            worker_defaults.poll_interval_secs,
        )?,
        batch_size: env_parse_or("PUNCHSYNC_WORKER_BATCH_SIZE", worker_defaults.batch_size)?,
        concurrency: env_parse_or("PUNCHSYNC_WORKER_CONCURRENCY", worker_defaults.concurrency)?,
        claim_ttl_secs: env_parse_or("PUNCHSYNC_WORKER_CLAIM_TTL", worker_defaults.claim_ttl_secs)?,
    };

    Ok(Config { terminal, erp, archive, notifier, database, scheduler, workers })
}

/// Load configuration from a file
///
/// If `path` is `None`, probes multiple locations for config files.
/// Supports both JSON and TOML formats (detected by file extension).
///
/// # Arguments
/// * `path` - Optional path to config file. If `None`, uses
///   [`probe_config_paths`].
///
/// # Errors
/// Returns `PunchSyncError::Config` if:
/// - File not found (when path is specified)
/// - No config file found (when path is `None`)
/// - File format is invalid
/// - Required fields are missing
pub fn load_from_file(path: Option<PathBuf>) -> Result<Config> {
    let config_path = match path {
        Some(p) => {
            if !p.exists() {
                return Err(PunchSyncError::Config(format!(
                    "Config file not found: {}",
                    p.display()
                )));
            }
            p
        }
        None => probe_config_paths().ok_or_else(|| {
            PunchSyncError::Config(
                "No config file found in any of the standard locations".to_string(),
            )
        })?,
    };

    tracing::info!(path = %config_path.display(), "Loading configuration from file");

    let contents = std::fs::read_to_string(&config_path)
        .map_err(|e| PunchSyncError::Config(format!("Failed to read config file: {}", e)))?;

    parse_config(&contents, &config_path)
}

/// Parse configuration from string content
///
/// Format is detected by file extension (`.json` or `.toml`).
///
/// # Arguments
/// * `contents` - File contents as string
/// * `path` - Path to the file (for format detection and error messages)
///
/// # Errors
/// Returns `PunchSyncError::Config` if format is invalid or parsing fails.
fn parse_config(contents: &str, path: &Path) -> Result<Config> {
    let extension = path.extension().and_then(|e| e.to_str()).unwrap_or("json");

    match extension {
        "toml" => toml::from_str(contents)
            .map_err(|e| PunchSyncError::Config(format!("Invalid TOML format: {}", e))),
        "json" => serde_json::from_str(contents)
            .map_err(|e| PunchSyncError::Config(format!("Invalid JSON format: {}", e))),
        _ => Err(PunchSyncError::Config(format!("Unsupported config format: {}", extension))),
    }
}

/// Probe multiple paths for configuration files
///
/// Searches for config files in the following locations (in order):
/// 1. Current working directory (`./config.{json,toml}`,
///    `./punchsync.{json,toml}`)
/// 2. Parent directories (up to 2 levels)
/// 3. Relative to executable location
///
/// # Returns
/// The first config file found, or `None` if no file exists.
pub fn probe_config_paths() -> Option<PathBuf> {
    let mut candidates = Vec::new();

    // Try current working directory
    if let Ok(cwd) = std::env::current_dir() {
        candidates.extend(vec![
            cwd.join("config.json"),
            cwd.join("config.toml"),
            cwd.join("punchsync.json"),
            cwd.join("punchsync.toml"),
            cwd.join("../config.json"),
            cwd.join("../config.toml"),
            cwd.join("../../config.json"),
            cwd.join("../../config.toml"),
        ]);
    }

    // Try relative to executable
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            candidates.extend(vec![
                exe_dir.join("config.json"),
                exe_dir.join("config.toml"),
                exe_dir.join("punchsync.json"),
                exe_dir.join("punchsync.toml"),
                exe_dir.join("../config.json"),
                exe_dir.join("../config.toml"),
                exe_dir.join("../../config.json"),
                exe_dir.join("../../config.toml"),
            ]);
        }
    }

    // Return first existing candidate
    candidates.into_iter().find(|path| path.exists())
}

/// Get required environment variable
///
/// # Errors
/// Returns `PunchSyncError::Config` if the variable is not set.
fn env_var(key: &str) -> Result<String> {
    std::env::var(key).map_err(|_| {
        PunchSyncError::Config(format!("Missing required environment variable: {}", key))
    })
}

/// Parse an optional environment variable, falling back to a default
///
/// # Errors
/// Returns `PunchSyncError::Config` if the variable is set but does not
/// parse as the expected type. A missing variable is not an error.
fn env_parse_or<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| PunchSyncError::Config(format!("Invalid value for {}: {}", key, e))),
        Err(_) => Ok(default),
    }
}

/// Read an optional string environment variable, falling back to a default
fn env_string_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}
