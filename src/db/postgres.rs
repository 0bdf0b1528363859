//! PostgreSQL adapter over a sqlx connection pool.

use crate::db::adapter::{DbAdapter, StatementOutput};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, NormalizedResult};
use futures_util::TryStreamExt;
use sqlx::PgPool;
use sqlx::pool::PoolConnection;
use sqlx::postgres::{PgConnectOptions, PgPoolOptions, PgQueryResult, PgRow, PgSslMode, Postgres};
use tracing::{debug, info};

pub type PgOutput = StatementOutput<PgRow, PgQueryResult>;

/// Pooled PostgreSQL backend with native read-only transactions.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresAdapter;

impl PostgresAdapter {
    fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let mut options = PgConnectOptions::new();

        options = match &config.socket_path {
            Some(path) => options.socket(path),
            None => options
                .host(&config.host)
                .port(config.port_or_default(DatabaseType::PostgreSQL).unwrap_or(5432)),
        };

        if let Some(user) = &config.user {
            options = options.username(user);
        }
        if let Some(password) = &config.password {
            options = options.password(password);
        }
        if let Some(database) = &config.database {
            options = options.database(database);
        }

        if let Some(tls) = &config.tls {
            options = options.ssl_mode(if tls.reject_unauthorized {
                PgSslMode::VerifyFull
            } else {
                PgSslMode::Require
            });
            if let Some(ca) = &tls.ca {
                options = options.ssl_root_cert(ca);
            }
            if let Some(cert) = &tls.cert {
                options = options.ssl_client_cert(cert);
            }
            if let Some(key) = &tls.key {
                options = options.ssl_client_key(key);
            }
        }

        options
    }

    async fn run(handle: &mut PoolConnection<Postgres>, sql: &str) -> DbResult<()> {
        sqlx::Executor::execute(&mut **handle, sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

impl DbAdapter for PostgresAdapter {
    type Pool = PgPool;
    type Handle = PoolConnection<Postgres>;
    type Raw = PgOutput;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::PostgreSQL
    }

    async fn create_pool(&self, config: &ConnectionConfig) -> DbResult<PgPool> {
        let pool = PgPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(config.connect_timeout)
            .connect_with(Self::connect_options(config))
            .await
            .map_err(|e| DbError::connect_failed(DatabaseType::PostgreSQL, &e))?;

        info!(
            host = %config.host,
            database = config.database.as_deref().unwrap_or("<multi>"),
            pool_size = config.pool_size,
            "PostgreSQL pool created"
        );
        Ok(pool)
    }

    async fn acquire(&self, pool: &PgPool) -> DbResult<PoolConnection<Postgres>> {
        Ok(pool.acquire().await?)
    }

    async fn begin(&self, handle: &mut PoolConnection<Postgres>) -> DbResult<()> {
        Self::run(handle, "BEGIN").await
    }

    async fn commit(&self, handle: &mut PoolConnection<Postgres>) -> DbResult<()> {
        Self::run(handle, "COMMIT").await
    }

    async fn rollback(&self, handle: &mut PoolConnection<Postgres>) -> DbResult<()> {
        Self::run(handle, "ROLLBACK").await
    }

    async fn set_read_only(&self, handle: &mut PoolConnection<Postgres>) -> DbResult<()> {
        Self::run(handle, "SET TRANSACTION READ ONLY").await
    }

    /// The read-only flag is transaction scoped; the session default is
    /// reasserted so nothing leaks into the next borrower.
    async fn unset_read_only(&self, handle: &mut PoolConnection<Postgres>) -> DbResult<()> {
        Self::run(handle, "SET SESSION CHARACTERISTICS AS TRANSACTION READ WRITE").await
    }

    async fn execute(
        &self,
        handle: &mut PoolConnection<Postgres>,
        sql: &str,
    ) -> DbResult<PgOutput> {
        let items = sqlx::raw_sql(sql)
            .fetch_many(&mut **handle)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(StatementOutput::collect(items))
    }

    fn release(&self, handle: PoolConnection<Postgres>) {
        drop(handle);
    }

    async fn discard(&self, handle: PoolConnection<Postgres>) {
        drop(handle.detach());
        debug!("PostgreSQL connection detached from pool");
    }

    fn normalize_result(&self, raw: PgOutput) -> NormalizedResult {
        raw.normalize_with(|results| {
            let affected = results.iter().map(PgQueryResult::rows_affected).sum();
            NormalizedResult::acknowledgment(affected, None, None)
        })
    }

    fn supports_read_only_mode(&self) -> bool {
        true
    }

    async fn close(&self, pool: &PgPool) {
        pool.close().await;
        info!("PostgreSQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acknowledgment_has_no_insert_id() {
        let output = PgOutput {
            rows: Vec::new(),
            results: vec![PgQueryResult::default()],
        };
        let result = PostgresAdapter.normalize_result(output);
        assert_eq!(result.affected_rows, Some(0));
        assert_eq!(result.insert_id, None);
        assert_eq!(result.changed_rows, None);
    }

    #[test]
    fn test_supports_read_only() {
        assert!(PostgresAdapter.supports_read_only_mode());
        assert_eq!(PostgresAdapter.database_type(), DatabaseType::PostgreSQL);
    }
}
