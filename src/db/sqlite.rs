//! SQLite adapter over a single shared connection.
//!
//! SQLite has no pool: one handle is opened per process and callers are
//! serialized on its mutex. Read-only transactions are not supported, so the
//! engine relies on the read path's unconditional rollback.

use crate::db::adapter::{DbAdapter, StatementOutput};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, NormalizedResult};
use futures_util::TryStreamExt;
use sqlx::Connection as _;
use sqlx::sqlite::{SqliteConnectOptions, SqliteConnection, SqliteQueryResult, SqliteRow};
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};
use tracing::{debug, info, warn};

pub type SqliteOutput = StatementOutput<SqliteRow, SqliteQueryResult>;

/// The single process-wide SQLite handle.
pub type SqliteHandle = Arc<Mutex<SqliteConnection>>;

const MEMORY_DATABASE: &str = ":memory:";

#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteAdapter;

impl SqliteAdapter {
    fn connect_options(config: &ConnectionConfig) -> DbResult<SqliteConnectOptions> {
        let path = config
            .database
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .ok_or_else(|| {
                DbError::configuration("DB_NAME must name the SQLite database file (or :memory:)")
            })?;

        let options = if path == MEMORY_DATABASE {
            SqliteConnectOptions::from_str("sqlite::memory:").map_err(|e| {
                DbError::configuration(format!("Invalid SQLite database '{}': {}", path, e))
            })?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
        };

        Ok(options.busy_timeout(config.connect_timeout))
    }

    async fn run(handle: &mut OwnedMutexGuard<SqliteConnection>, sql: &str) -> DbResult<()> {
        sqlx::Executor::execute(&mut **handle, sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

impl DbAdapter for SqliteAdapter {
    type Pool = SqliteHandle;
    type Handle = OwnedMutexGuard<SqliteConnection>;
    type Raw = SqliteOutput;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn create_pool(&self, config: &ConnectionConfig) -> DbResult<SqliteHandle> {
        let options = Self::connect_options(config)?;
        let connection = SqliteConnection::connect_with(&options)
            .await
            .map_err(|e| DbError::connect_failed(DatabaseType::SQLite, &e))?;

        info!(
            database = config.database.as_deref().unwrap_or_default(),
            "SQLite database opened"
        );
        Ok(Arc::new(Mutex::new(connection)))
    }

    async fn acquire(&self, pool: &SqliteHandle) -> DbResult<OwnedMutexGuard<SqliteConnection>> {
        Ok(Arc::clone(pool).lock_owned().await)
    }

    async fn begin(&self, handle: &mut OwnedMutexGuard<SqliteConnection>) -> DbResult<()> {
        Self::run(handle, "BEGIN").await
    }

    async fn commit(&self, handle: &mut OwnedMutexGuard<SqliteConnection>) -> DbResult<()> {
        Self::run(handle, "COMMIT").await
    }

    async fn rollback(&self, handle: &mut OwnedMutexGuard<SqliteConnection>) -> DbResult<()> {
        Self::run(handle, "ROLLBACK").await
    }

    async fn set_read_only(&self, _handle: &mut OwnedMutexGuard<SqliteConnection>) -> DbResult<()> {
        warn!("SQLite has no read-only transactions; relying on rollback");
        Ok(())
    }

    async fn unset_read_only(
        &self,
        _handle: &mut OwnedMutexGuard<SqliteConnection>,
    ) -> DbResult<()> {
        warn!("SQLite has no read-only transactions; nothing to unset");
        Ok(())
    }

    async fn execute(
        &self,
        handle: &mut OwnedMutexGuard<SqliteConnection>,
        sql: &str,
    ) -> DbResult<SqliteOutput> {
        let items = sqlx::raw_sql(sql)
            .fetch_many(&mut **handle)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(StatementOutput::collect(items))
    }

    fn release(&self, handle: OwnedMutexGuard<SqliteConnection>) {
        drop(handle);
    }

    /// The handle cannot be replaced, so the best that can be done is to
    /// close any transaction left open before unlocking it.
    async fn discard(&self, mut handle: OwnedMutexGuard<SqliteConnection>) {
        if let Err(e) = Self::run(&mut handle, "ROLLBACK").await {
            debug!(error = %e, "No transaction to roll back on discarded SQLite handle");
        }
        warn!("SQLite handle kept after discard; it is the only connection");
    }

    fn normalize_result(&self, raw: SqliteOutput) -> NormalizedResult {
        raw.normalize_with(|results| {
            let affected: u64 = results.iter().map(SqliteQueryResult::rows_affected).sum();
            let insert_id = results
                .iter()
                .map(SqliteQueryResult::last_insert_rowid)
                .filter(|id| *id > 0)
                .last()
                .and_then(|id| u64::try_from(id).ok());
            NormalizedResult::acknowledgment(affected, insert_id, Some(affected))
        })
    }

    fn supports_read_only_mode(&self) -> bool {
        false
    }

    async fn close(&self, _pool: &SqliteHandle) {
        debug!("SQLite handle is closed when the process exits");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_database_path_required() {
        let err = SqliteAdapter::connect_options(&ConnectionConfig::default()).unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("DB_NAME"));
    }

    #[test]
    fn test_memory_database_accepted() {
        assert!(SqliteAdapter::connect_options(&ConnectionConfig::sqlite(":memory:")).is_ok());
    }

    #[tokio::test]
    async fn test_select_one_returns_row() {
        let adapter = SqliteAdapter;
        let pool = adapter
            .create_pool(&ConnectionConfig::sqlite(":memory:"))
            .await
            .unwrap();
        let mut handle = adapter.acquire(&pool).await.unwrap();
        let raw = adapter.execute(&mut handle, "SELECT 1").await.unwrap();
        adapter.release(handle);

        let result = adapter.normalize_result(raw);
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows[0].get("1"), Some(&serde_json::json!(1)));
    }

    #[tokio::test]
    async fn test_insert_acknowledgment_reports_changes() {
        let adapter = SqliteAdapter;
        let pool = adapter
            .create_pool(&ConnectionConfig::sqlite(":memory:"))
            .await
            .unwrap();
        let mut handle = adapter.acquire(&pool).await.unwrap();
        adapter
            .execute(&mut handle, "CREATE TABLE t (id INTEGER PRIMARY KEY, name TEXT)")
            .await
            .unwrap();
        let raw = adapter
            .execute(&mut handle, "INSERT INTO t (name) VALUES ('a'), ('b')")
            .await
            .unwrap();

        let result = adapter.normalize_result(raw);
        assert!(result.rows.is_empty());
        assert_eq!(result.affected_rows, Some(2));
        assert_eq!(result.changed_rows, Some(2));
        assert_eq!(result.insert_id, Some(2));
    }

    #[tokio::test]
    async fn test_read_only_toggles_are_noops() {
        let adapter = SqliteAdapter;
        let pool = adapter
            .create_pool(&ConnectionConfig::sqlite(":memory:"))
            .await
            .unwrap();
        let mut handle = adapter.acquire(&pool).await.unwrap();
        assert!(adapter.set_read_only(&mut handle).await.is_ok());
        assert!(adapter.unset_read_only(&mut handle).await.is_ok());
        assert!(!adapter.supports_read_only_mode());
    }
}
