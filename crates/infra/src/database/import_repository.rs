//! SQLite-backed implementation of the import bookkeeping port.
//!
//! Owns the `import_records` and `import_log_records` tables, plus reads of
//! the mirrored ERP job registry (`erp_jobs`, `erp_job_logs`). The mirror is
//! fed outside the pipeline (`upsert_erp_job`), standing in for the linked
//! execution views the ERP exposes in production.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use punchsync_core::ImportRepository;
use punchsync_domain::{
    ErpJobLog, ErpJobRef, ImportLogRecord, ImportRecord, JobStatus, PendingNotification,
    PunchSyncError, Result,
};
use rusqlite::{params, OptionalExtension, Row};
use tokio::task;

use super::manager::DbManager;
use crate::errors::InfraError;

/// Repository over the shared SQLite pool.
pub struct SqliteImportRepository {
    db: Arc<DbManager>,
}

impl SqliteImportRepository {
    /// Construct a repository backed by the shared database manager.
    pub fn new(db: Arc<DbManager>) -> Self {
        Self { db }
    }

    /// Insert or replace one row of the mirrored ERP job registry.
    pub async fn upsert_erp_job(&self, job: &ErpJobRef, process_name: &str) -> Result<()> {
        let db = Arc::clone(&self.db);
        let job = job.clone();
        let process_name = process_name.to_string();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                ERP_JOB_UPSERT_SQL,
                params![
                    job.id,
                    process_name,
                    job.status.map(JobStatus::code),
                    job.created_by,
                    job.created_at.timestamp(),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    /// Insert or replace one mirrored ERP execution log.
    pub async fn upsert_erp_log(&self, log: &ErpJobLog) -> Result<()> {
        let db = Arc::clone(&self.db);
        let log = log.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(ERP_LOG_UPSERT_SQL, params![log.job_id, log.name, log.content])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }
}

#[async_trait]
impl ImportRepository for SqliteImportRepository {
    async fn find_latest_erp_job(
        &self,
        created_by: &str,
        process_name: &str,
    ) -> Result<Option<ErpJobRef>> {
        let db = Arc::clone(&self.db);
        let created_by = created_by.to_string();
        let process_name = process_name.to_string();

        task::spawn_blocking(move || -> Result<Option<ErpJobRef>> {
            let conn = db.get_connection()?;
            conn.query_row(ERP_JOB_LATEST_SQL, params![created_by, process_name], map_erp_job_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn erp_job_status(&self, job_id: i64) -> Result<Option<JobStatus>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<JobStatus>> {
            let conn = db.get_connection()?;
            let status: Option<Option<i64>> = conn
                .query_row(ERP_JOB_STATUS_SQL, params![job_id], |row| row.get(0))
                .optional()
                .map_err(map_sql_error)?;

            // A missing row and a row the job server has not touched yet are
            // the same thing to callers.
            Ok(status.flatten().map(JobStatus))
        })
        .await
        .map_err(map_join_error)?
    }

    async fn erp_job_logs(&self, job_id: i64) -> Result<Vec<ErpJobLog>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<ErpJobLog>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(ERP_LOGS_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![job_id], |row| {
                    Ok(ErpJobLog { job_id: row.get(0)?, name: row.get(1)?, content: row.get(2)? })
                })
                .map_err(map_sql_error)?;
            rows.collect::<std::result::Result<_, _>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn upsert_record(&self, record: &ImportRecord) -> Result<()> {
        let db = Arc::clone(&self.db);
        let record = record.clone();

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(
                RECORD_UPSERT_SQL,
                params![
                    record.job_id,
                    record.company_code,
                    record.device_name,
                    record.status.code(),
                    record.file_path,
                    record.archive_url,
                    record.notified,
                    record.created_by,
                    record.created_at.timestamp(),
                ],
            )
            .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn record_by_job(&self, job_id: i64) -> Result<Option<ImportRecord>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Option<ImportRecord>> {
            let conn = db.get_connection()?;
            conn.query_row(RECORD_BY_JOB_SQL, params![job_id], map_record_row)
                .optional()
                .map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn update_status(&self, job_id: i64, status: JobStatus) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            // No-op when the record does not exist yet; the caller surfaces
            // the missing record where it matters.
            conn.execute(STATUS_UPDATE_SQL, params![status.code(), job_id])
                .map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn mark_notified(&self, job_id: i64) -> Result<()> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<()> {
            let conn = db.get_connection()?;
            conn.execute(MARK_NOTIFIED_SQL, params![job_id]).map_err(map_sql_error)?;
            Ok(())
        })
        .await
        .map_err(map_join_error)?
    }

    async fn pending_notifications(&self) -> Result<Vec<PendingNotification>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<PendingNotification>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(PENDING_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map([], |row| {
                    Ok(PendingNotification {
                        job_id: row.get(0)?,
                        status: JobStatus(row.get(1)?),
                    })
                })
                .map_err(map_sql_error)?;
            rows.collect::<std::result::Result<_, _>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn insert_log_record(&self, record: &ImportLogRecord) -> Result<bool> {
        let db = Arc::clone(&self.db);
        let record = record.clone();

        task::spawn_blocking(move || -> Result<bool> {
            let conn = db.get_connection()?;
            let changed = conn
                .execute(
                    LOG_RECORD_INSERT_SQL,
                    params![record.job_id, record.log_name, record.location_url, now_epoch()],
                )
                .map_err(map_sql_error)?;
            Ok(changed > 0)
        })
        .await
        .map_err(map_join_error)?
    }

    async fn log_records(&self, job_id: i64) -> Result<Vec<ImportLogRecord>> {
        let db = Arc::clone(&self.db);

        task::spawn_blocking(move || -> Result<Vec<ImportLogRecord>> {
            let conn = db.get_connection()?;
            let mut stmt = conn.prepare(LOG_RECORDS_SQL).map_err(map_sql_error)?;
            let rows = stmt
                .query_map(params![job_id], |row| {
                    Ok(ImportLogRecord {
                        job_id: row.get(0)?,
                        log_name: row.get(1)?,
                        location_url: row.get(2)?,
                    })
                })
                .map_err(map_sql_error)?;
            rows.collect::<std::result::Result<_, _>>().map_err(map_sql_error)
        })
        .await
        .map_err(map_join_error)?
    }
}

const ERP_JOB_UPSERT_SQL: &str = "INSERT OR REPLACE INTO erp_jobs
        (id, process_name, status, created_by, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5)";

const ERP_LOG_UPSERT_SQL: &str = "INSERT OR REPLACE INTO erp_job_logs (job_id, log_name, content)
    VALUES (?1, ?2, ?3)";

const ERP_JOB_LATEST_SQL: &str = "SELECT id, status, created_by, created_at
    FROM erp_jobs
    WHERE created_by = ?1 AND process_name = ?2
    ORDER BY created_at DESC, id DESC
    LIMIT 1";

const ERP_JOB_STATUS_SQL: &str = "SELECT status FROM erp_jobs WHERE id = ?1";

const ERP_LOGS_SQL: &str = "SELECT job_id, log_name, content
    FROM erp_job_logs
    WHERE job_id = ?1
    ORDER BY log_name ASC";

const RECORD_UPSERT_SQL: &str = "INSERT OR REPLACE INTO import_records
        (erp_job_id, company_code, device_name, status, file_path, archive_url,
         notified, created_by, created_at)
    VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)";

const RECORD_BY_JOB_SQL: &str = "SELECT erp_job_id, company_code, device_name, status, file_path,
        archive_url, notified, created_by, created_at
    FROM import_records
    WHERE erp_job_id = ?1";

const STATUS_UPDATE_SQL: &str = "UPDATE import_records SET status = ?1 WHERE erp_job_id = ?2";

const MARK_NOTIFIED_SQL: &str = "UPDATE import_records SET notified = 1 WHERE erp_job_id = ?1";

const PENDING_SQL: &str = "SELECT erp_job_id, status
    FROM import_records
    WHERE notified = 0 AND status <> 2
    ORDER BY created_at ASC";

const LOG_RECORD_INSERT_SQL: &str = "INSERT OR IGNORE INTO import_log_records
        (erp_job_id, log_name, location_url, created_at)
    VALUES (?1, ?2, ?3, ?4)";

const LOG_RECORDS_SQL: &str = "SELECT erp_job_id, log_name, location_url
    FROM import_log_records
    WHERE erp_job_id = ?1
    ORDER BY log_name ASC";

fn map_erp_job_row(row: &Row<'_>) -> rusqlite::Result<ErpJobRef> {
    Ok(ErpJobRef {
        id: row.get(0)?,
        status: row.get::<_, Option<i64>>(1)?.map(JobStatus),
        created_by: row.get(2)?,
        created_at: epoch_to_datetime(row.get(3)?),
    })
}

fn map_record_row(row: &Row<'_>) -> rusqlite::Result<ImportRecord> {
    Ok(ImportRecord {
        job_id: row.get(0)?,
        company_code: row.get(1)?,
        device_name: row.get(2)?,
        status: JobStatus(row.get(3)?),
        file_path: row.get(4)?,
        archive_url: row.get(5)?,
        notified: row.get(6)?,
        created_by: row.get(7)?,
        created_at: epoch_to_datetime(row.get(8)?),
    })
}

fn epoch_to_datetime(secs: i64) -> DateTime<Utc> {
    DateTime::from_timestamp(secs, 0).unwrap_or_default()
}

fn now_epoch() -> i64 {
    Utc::now().timestamp()
}

fn map_sql_error(err: rusqlite::Error) -> PunchSyncError {
    PunchSyncError::from(InfraError::from(err))
}

fn map_join_error(err: task::JoinError) -> PunchSyncError {
    PunchSyncError::from(InfraError::from(err))
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn setup_repository() -> (SqliteImportRepository, Arc<DbManager>, TempDir) {
        let temp_dir = TempDir::new().expect("temp dir created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("manager created");
        manager.run_migrations().expect("migrations applied");
        let manager = Arc::new(manager);
        let repo = SqliteImportRepository::new(Arc::clone(&manager));

        (repo, manager, temp_dir)
    }

    fn sample_record(job_id: i64, status: JobStatus) -> ImportRecord {
        ImportRecord {
            job_id,
            company_code: 1,
            device_name: "Dock 6".into(),
            status,
            file_path: "Z:/import/01-03-2024 Dock 6.txt".into(),
            archive_url: Some("https://archive.local/afd/01-03-2024 Dock 6.txt".into()),
            notified: false,
            created_by: "PortalMatriculaInt".into(),
            created_at: Utc::now(),
        }
    }

    fn erp_job(id: i64, status: Option<JobStatus>, created_at: i64) -> ErpJobRef {
        ErpJobRef {
            id,
            status,
            created_by: "PortalMatriculaInt".into(),
            created_at: epoch_to_datetime(created_at),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn upsert_and_fetch_round_trips_record() {
        let (repo, _db, _tmp) = setup_repository().await;
        let record = sample_record(412, JobStatus::NOT_STARTED);

        repo.upsert_record(&record).await.expect("upsert succeeds");

        let fetched = repo.record_by_job(412).await.expect("fetch succeeds").expect("row exists");
        assert_eq!(fetched.job_id, 412);
        assert_eq!(fetched.device_name, "Dock 6");
        assert_eq!(fetched.status, JobStatus::NOT_STARTED);
        assert!(!fetched.notified);
        assert_eq!(fetched.created_at.timestamp(), record.created_at.timestamp());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_record_reads_as_none() {
        let (repo, _db, _tmp) = setup_repository().await;
        assert!(repo.record_by_job(999).await.expect("fetch succeeds").is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn pending_scan_excludes_finished_and_notified_rows() {
        let (repo, _db, _tmp) = setup_repository().await;

        repo.upsert_record(&sample_record(1, JobStatus::NOT_STARTED)).await.expect("upsert");
        repo.upsert_record(&sample_record(2, JobStatus::RUNNING)).await.expect("upsert");
        repo.upsert_record(&sample_record(3, JobStatus::FINISHED)).await.expect("upsert");
        repo.upsert_record(&sample_record(4, JobStatus::FAILED)).await.expect("upsert");
        let mut notified = sample_record(5, JobStatus::FAILED);
        notified.notified = true;
        repo.upsert_record(&notified).await.expect("upsert");

        let pending = repo.pending_notifications().await.expect("scan succeeds");
        let ids: Vec<i64> = pending.iter().map(|p| p.job_id).collect();

        // Finished rows and already-notified rows drop out; everything else
        // stays eligible, the not-yet-started ones included.
        assert_eq!(ids, vec![1, 2, 4]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_status_and_mark_notified_change_the_row() {
        let (repo, _db, _tmp) = setup_repository().await;
        repo.upsert_record(&sample_record(412, JobStatus::RUNNING)).await.expect("upsert");

        repo.update_status(412, JobStatus::FAILED).await.expect("status updated");
        repo.mark_notified(412).await.expect("notified set");

        let fetched = repo.record_by_job(412).await.expect("fetch").expect("row exists");
        assert_eq!(fetched.status, JobStatus::FAILED);
        assert!(fetched.notified);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_status_on_missing_record_is_a_no_op() {
        let (repo, _db, _tmp) = setup_repository().await;
        repo.update_status(999, JobStatus::FAILED).await.expect("update tolerated");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn correlation_returns_the_latest_matching_job() {
        let (repo, _db, _tmp) = setup_repository().await;

        repo.upsert_erp_job(&erp_job(100, None, 1_709_250_000), "PtoProcImportacaoBatidas")
            .await
            .expect("seed");
        repo.upsert_erp_job(&erp_job(101, None, 1_709_260_000), "PtoProcImportacaoBatidas")
            .await
            .expect("seed");
        // Different process, newer still; must not win.
        repo.upsert_erp_job(&erp_job(102, None, 1_709_270_000), "OtherProcess")
            .await
            .expect("seed");

        let found = repo
            .find_latest_erp_job("PortalMatriculaInt", "PtoProcImportacaoBatidas")
            .await
            .expect("lookup succeeds")
            .expect("job found");
        assert_eq!(found.id, 101);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn correlation_misses_when_nothing_matches() {
        let (repo, _db, _tmp) = setup_repository().await;

        let found = repo
            .find_latest_erp_job("PortalMatriculaInt", "PtoProcImportacaoBatidas")
            .await
            .expect("lookup succeeds");
        assert!(found.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn job_status_treats_missing_and_unexecuted_alike() {
        let (repo, _db, _tmp) = setup_repository().await;

        repo.upsert_erp_job(&erp_job(200, None, 1_709_250_000), "PtoProcImportacaoBatidas")
            .await
            .expect("seed");
        repo.upsert_erp_job(
            &erp_job(201, Some(JobStatus::INTERRUPTED), 1_709_250_100),
            "PtoProcImportacaoBatidas",
        )
        .await
        .expect("seed");

        assert_eq!(repo.erp_job_status(999).await.expect("query"), None);
        assert_eq!(repo.erp_job_status(200).await.expect("query"), None);
        assert_eq!(repo.erp_job_status(201).await.expect("query"), Some(JobStatus::INTERRUPTED));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn erp_logs_round_trip() {
        let (repo, _db, _tmp) = setup_repository().await;

        let log = ErpJobLog {
            job_id: 412,
            name: "execution.log".into(),
            content: "line 1\nline 2".into(),
        };
        repo.upsert_erp_log(&log).await.expect("seed");

        let logs = repo.erp_job_logs(412).await.expect("fetch");
        assert_eq!(logs, vec![log]);
        assert!(repo.erp_job_logs(999).await.expect("fetch").is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn log_record_insert_reports_new_rows_only() {
        let (repo, _db, _tmp) = setup_repository().await;

        let record = ImportLogRecord {
            job_id: 412,
            log_name: "execution.log".into(),
            location_url: "https://archive.local/afd-logs/logs/412/execution.log".into(),
        };

        assert!(repo.insert_log_record(&record).await.expect("first insert"));
        assert!(!repo.insert_log_record(&record).await.expect("second insert"));

        let rows = repo.log_records(412).await.expect("fetch");
        assert_eq!(rows, vec![record]);
    }
}
