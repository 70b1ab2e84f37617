//! Shared fixtures for infra integration tests.

use std::sync::Arc;

use punchsync_infra::database::DbManager;
use tempfile::TempDir;

/// Temporary database wrapper that keeps the underlying file alive for the
/// duration of a test run.
pub struct TestDatabase {
    pub manager: Arc<DbManager>,
    _temp_dir: TempDir,
}

impl TestDatabase {
    /// Create a migrated temporary database with default pool sizing.
    pub fn new() -> Self {
        let temp_dir = TempDir::new().expect("temp dir should be created");
        let db_path = temp_dir.path().join("test.db");

        let manager = DbManager::new(&db_path, 4).expect("db manager should be created");
        manager.run_migrations().expect("migrations should apply");

        Self { manager: Arc::new(manager), _temp_dir: temp_dir }
    }

    /// Read one i64 from a single-row query.
    pub fn query_i64(&self, sql: &str) -> i64 {
        let conn = self.manager.get_connection().expect("connection should be available");
        conn.query_row(sql, [], |row| row.get(0)).expect("query should succeed")
    }

    /// Collect one text column across all rows of a query.
    pub fn query_strings(&self, sql: &str) -> Vec<String> {
        let conn = self.manager.get_connection().expect("connection should be available");
        let mut stmt = conn.prepare(sql).expect("statement should prepare");
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .expect("query should run")
            .collect::<Result<Vec<_>, _>>()
            .expect("rows should map");
        rows
    }
}

impl Default for TestDatabase {
    fn default() -> Self {
        Self::new()
    }
}
