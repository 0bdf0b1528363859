//! Adapter factory and the runtime-selected backend.
//!
//! The backend is picked once at startup from `DB_TYPE`. [`BackendAdapter`]
//! implements [`DbAdapter`] by delegating to the selected variant, so the
//! execution engine is written once against the trait.

use crate::db::adapter::DbAdapter;
use crate::db::mysql::{MySqlAdapter, MySqlOutput};
use crate::db::postgres::{PgOutput, PostgresAdapter};
use crate::db::sqlite::{SqliteAdapter, SqliteHandle, SqliteOutput};
use crate::error::{DbError, DbResult};
use crate::impl_db_dispatch;
use crate::models::{ConnectionConfig, DatabaseType, NormalizedResult};
use sqlx::pool::PoolConnection;
use sqlx::sqlite::SqliteConnection;
use sqlx::{MySql, MySqlPool, PgPool, Postgres};
use tokio::sync::OwnedMutexGuard;
use tracing::warn;

/// Build the adapter for a backend identifier (`mysql`, `postgres`, `sqlite`, ...).
pub fn create_adapter(identifier: &str) -> DbResult<BackendAdapter> {
    DatabaseType::from_identifier(identifier)
        .map(BackendAdapter::from)
        .ok_or_else(|| {
            DbError::configuration(format!(
                "Unsupported database type '{}'. Expected one of: mysql, mariadb, postgres, postgresql, pg, sqlite, sqlite3",
                identifier
            ))
        })
}

#[derive(Debug, Clone, Copy)]
pub enum BackendAdapter {
    MySql(MySqlAdapter),
    Postgres(PostgresAdapter),
    SQLite(SqliteAdapter),
}

impl From<DatabaseType> for BackendAdapter {
    fn from(db_type: DatabaseType) -> Self {
        match db_type {
            DatabaseType::MySQL => Self::MySql(MySqlAdapter),
            DatabaseType::PostgreSQL => Self::Postgres(PostgresAdapter),
            DatabaseType::SQLite => Self::SQLite(SqliteAdapter),
        }
    }
}

#[derive(Debug, Clone)]
pub enum BackendPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqliteHandle),
}

pub enum BackendHandle {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(OwnedMutexGuard<SqliteConnection>),
}

pub enum BackendOutput {
    MySql(MySqlOutput),
    Postgres(PgOutput),
    SQLite(SqliteOutput),
}

macro_rules! impl_from_variants {
    ($enum:ident { $($variant:ident($ty:ty)),+ $(,)? }) => {
        $(
            impl From<$ty> for $enum {
                fn from(value: $ty) -> Self {
                    Self::$variant(value)
                }
            }
        )+
    };
}

impl_from_variants!(BackendPool {
    MySql(MySqlPool),
    Postgres(PgPool),
    SQLite(SqliteHandle),
});

impl_from_variants!(BackendHandle {
    MySql(PoolConnection<MySql>),
    Postgres(PoolConnection<Postgres>),
    SQLite(OwnedMutexGuard<SqliteConnection>),
});

impl_from_variants!(BackendOutput {
    MySql(MySqlOutput),
    Postgres(PgOutput),
    SQLite(SqliteOutput),
});

fn mismatch(what: &str) -> DbError {
    DbError::internal(format!("{} belongs to a different backend", what))
}

impl DbAdapter for BackendAdapter {
    type Pool = BackendPool;
    type Handle = BackendHandle;
    type Raw = BackendOutput;

    fn database_type(&self) -> DatabaseType {
        impl_db_dispatch!(BackendAdapter, self, {
            MySql(a) => a.database_type(),
            Postgres(a) => a.database_type(),
            SQLite(a) => a.database_type(),
        })
    }

    async fn create_pool(&self, config: &ConnectionConfig) -> DbResult<BackendPool> {
        impl_db_dispatch!(BackendAdapter, self, {
            MySql(a) => a.create_pool(config).await.map(Into::into),
            Postgres(a) => a.create_pool(config).await.map(Into::into),
            SQLite(a) => a.create_pool(config).await.map(Into::into),
        })
    }

    async fn acquire(&self, pool: &BackendPool) -> DbResult<BackendHandle> {
        impl_db_dispatch!(self, BackendPool, pool, |a, p| a.acquire(p).await.map(Into::into),
            else Err(mismatch("pool")))
    }

    async fn begin(&self, handle: &mut BackendHandle) -> DbResult<()> {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.begin(h).await,
            else Err(mismatch("connection")))
    }

    async fn commit(&self, handle: &mut BackendHandle) -> DbResult<()> {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.commit(h).await,
            else Err(mismatch("connection")))
    }

    async fn rollback(&self, handle: &mut BackendHandle) -> DbResult<()> {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.rollback(h).await,
            else Err(mismatch("connection")))
    }

    async fn set_read_only(&self, handle: &mut BackendHandle) -> DbResult<()> {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.set_read_only(h).await,
            else Err(mismatch("connection")))
    }

    async fn unset_read_only(&self, handle: &mut BackendHandle) -> DbResult<()> {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.unset_read_only(h).await,
            else Err(mismatch("connection")))
    }

    async fn execute(&self, handle: &mut BackendHandle, sql: &str) -> DbResult<BackendOutput> {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.execute(h, sql).await.map(Into::into),
            else Err(mismatch("connection")))
    }

    fn release(&self, handle: BackendHandle) {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.release(h),
            else warn!("Dropping connection from a different backend"))
    }

    async fn discard(&self, handle: BackendHandle) {
        impl_db_dispatch!(self, BackendHandle, handle, |a, h| a.discard(h).await,
            else warn!("Dropping connection from a different backend"))
    }

    fn normalize_result(&self, raw: BackendOutput) -> NormalizedResult {
        impl_db_dispatch!(self, BackendOutput, raw, |a, r| a.normalize_result(r), else {
            warn!("Ignoring result from a different backend");
            NormalizedResult::empty()
        })
    }

    fn supports_read_only_mode(&self) -> bool {
        impl_db_dispatch!(BackendAdapter, self, {
            MySql(a) => a.supports_read_only_mode(),
            Postgres(a) => a.supports_read_only_mode(),
            SQLite(a) => a.supports_read_only_mode(),
        })
    }

    async fn close(&self, pool: &BackendPool) {
        impl_db_dispatch!(self, BackendPool, pool, |a, p| a.close(p).await,
            else warn!("Pool belongs to a different backend"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_adapter_aliases() {
        for (id, expected) in [
            ("mysql", DatabaseType::MySQL),
            ("MariaDB", DatabaseType::MySQL),
            ("postgres", DatabaseType::PostgreSQL),
            ("pg", DatabaseType::PostgreSQL),
            ("sqlite3", DatabaseType::SQLite),
        ] {
            assert_eq!(create_adapter(id).unwrap().database_type(), expected);
        }
    }

    #[test]
    fn test_unknown_backend_is_configuration_error() {
        let err = create_adapter("oracle").unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("oracle"));
    }

    #[test]
    fn test_read_only_support_per_backend() {
        assert!(BackendAdapter::from(DatabaseType::MySQL).supports_read_only_mode());
        assert!(BackendAdapter::from(DatabaseType::PostgreSQL).supports_read_only_mode());
        assert!(!BackendAdapter::from(DatabaseType::SQLite).supports_read_only_mode());
    }

    #[tokio::test]
    async fn test_sqlite_through_backend_dispatch() {
        let adapter = create_adapter("sqlite").unwrap();
        let pool = adapter
            .create_pool(&ConnectionConfig::sqlite(":memory:"))
            .await
            .unwrap();
        let mut handle = adapter.acquire(&pool).await.unwrap();
        let raw = adapter.execute(&mut handle, "SELECT 2 AS two").await.unwrap();
        adapter.release(handle);

        let result = adapter.normalize_result(raw);
        assert_eq!(result.rows[0].get("two"), Some(&serde_json::json!(2)));
    }
}
