//! MySQL / MariaDB adapter over a sqlx connection pool.

use crate::db::adapter::{DbAdapter, StatementOutput};
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, DatabaseType, NormalizedResult};
use futures_util::TryStreamExt;
use sqlx::MySqlPool;
use sqlx::mysql::{
    MySql, MySqlConnectOptions, MySqlPoolOptions, MySqlQueryResult, MySqlRow, MySqlSslMode,
};
use sqlx::pool::PoolConnection;
use tracing::{debug, info};

pub type MySqlOutput = StatementOutput<MySqlRow, MySqlQueryResult>;

/// Closes the empty transaction opened by `begin` and reopens it read-only.
/// MySQL rejects `SET TRANSACTION` inside an open transaction.
const READ_ONLY_RESTART: [&str; 2] = ["ROLLBACK", "START TRANSACTION READ ONLY"];

/// Pooled MySQL backend.
///
/// Read-only mode restarts the (still empty) transaction as
/// `START TRANSACTION READ ONLY`; nothing is changed at session level.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlAdapter;

impl MySqlAdapter {
    fn connect_options(config: &ConnectionConfig) -> DbResult<MySqlConnectOptions> {
        let mut options = MySqlConnectOptions::new().charset("utf8mb4");

        options = match &config.socket_path {
            Some(path) => {
                if !path.exists() {
                    return Err(DbError::connection(
                        format!("Socket path does not exist: {}", path.display()),
                        "Check DB_SOCKET_PATH or unset it to connect over TCP",
                    ));
                }
                options.socket(path)
            }
            None => options
                .host(&config.host)
                .port(config.port_or_default(DatabaseType::MySQL).unwrap_or(3306)),
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
                MySqlSslMode::VerifyIdentity
            } else {
                MySqlSslMode::Required
            });
            if let Some(ca) = &tls.ca {
                options = options.ssl_ca(ca);
            }
            if let Some(cert) = &tls.cert {
                options = options.ssl_client_cert(cert);
            }
            if let Some(key) = &tls.key {
                options = options.ssl_client_key(key);
            }
        }

        Ok(options)
    }

    async fn run(handle: &mut PoolConnection<MySql>, sql: &str) -> DbResult<()> {
        sqlx::Executor::execute(&mut **handle, sqlx::raw_sql(sql)).await?;
        Ok(())
    }
}

impl DbAdapter for MySqlAdapter {
    type Pool = MySqlPool;
    type Handle = PoolConnection<MySql>;
    type Raw = MySqlOutput;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn create_pool(&self, config: &ConnectionConfig) -> DbResult<MySqlPool> {
        let options = Self::connect_options(config)?;
        let pool = MySqlPoolOptions::new()
            .max_connections(config.pool_size.max(1))
            .acquire_timeout(config.connect_timeout)
            .connect_with(options)
            .await
            .map_err(|e| DbError::connect_failed(DatabaseType::MySQL, &e))?;

        info!(
            host = %config.host,
            database = config.database.as_deref().unwrap_or("<multi>"),
            pool_size = config.pool_size,
            "MySQL pool created"
        );
        Ok(pool)
    }

    async fn acquire(&self, pool: &MySqlPool) -> DbResult<PoolConnection<MySql>> {
        Ok(pool.acquire().await?)
    }

    async fn begin(&self, handle: &mut PoolConnection<MySql>) -> DbResult<()> {
        Self::run(handle, "START TRANSACTION").await
    }

    async fn commit(&self, handle: &mut PoolConnection<MySql>) -> DbResult<()> {
        Self::run(handle, "COMMIT").await
    }

    async fn rollback(&self, handle: &mut PoolConnection<MySql>) -> DbResult<()> {
        Self::run(handle, "ROLLBACK").await
    }

    async fn set_read_only(&self, handle: &mut PoolConnection<MySql>) -> DbResult<()> {
        for sql in READ_ONLY_RESTART {
            Self::run(handle, sql).await?;
        }
        Ok(())
    }

    /// Read-only is scoped to the transaction, so the closing rollback
    /// already restores read-write.
    async fn unset_read_only(&self, _handle: &mut PoolConnection<MySql>) -> DbResult<()> {
        Ok(())
    }

    async fn execute(&self, handle: &mut PoolConnection<MySql>, sql: &str) -> DbResult<MySqlOutput> {
        let items = sqlx::raw_sql(sql)
            .fetch_many(&mut **handle)
            .try_collect::<Vec<_>>()
            .await?;
        Ok(StatementOutput::collect(items))
    }

    fn release(&self, handle: PoolConnection<MySql>) {
        drop(handle);
    }

    async fn discard(&self, handle: PoolConnection<MySql>) {
        // Detached connections are closed instead of returning to the pool.
        drop(handle.detach());
        debug!("MySQL connection detached from pool");
    }

    fn normalize_result(&self, raw: MySqlOutput) -> NormalizedResult {
        raw.normalize_with(|results| {
            let affected = results.iter().map(MySqlQueryResult::rows_affected).sum();
            let insert_id = results
                .iter()
                .map(MySqlQueryResult::last_insert_id)
                .filter(|id| *id > 0)
                .last();
            NormalizedResult::acknowledgment(affected, insert_id, None)
        })
    }

    fn supports_read_only_mode(&self) -> bool {
        true
    }

    async fn close(&self, pool: &MySqlPool) {
        pool.close().await;
        info!("MySQL pool closed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::TlsConfig;
    use std::path::PathBuf;

    #[test]
    fn test_missing_socket_is_connection_error() {
        let config = ConnectionConfig {
            socket_path: Some(PathBuf::from("/nonexistent/mysqld.sock")),
            ..ConnectionConfig::default()
        };
        let err = MySqlAdapter::connect_options(&config).unwrap_err();
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.to_string().contains("mysqld.sock"));
    }

    #[test]
    fn test_options_accept_tls_material() {
        let config = ConnectionConfig {
            user: Some("app".to_string()),
            password: Some("secret".to_string()),
            database: Some("shop".to_string()),
            tls: TlsConfig::from_parts(Some(PathBuf::from("/etc/ssl/ca.pem")), None, None, false),
            ..ConnectionConfig::default()
        };
        assert!(MySqlAdapter::connect_options(&config).is_ok());
    }

    #[test]
    fn test_empty_output_normalizes_to_empty() {
        let result = MySqlAdapter.normalize_result(MySqlOutput::default());
        assert!(result.rows.is_empty());
        assert_eq!(result.affected_rows, None);
    }

    #[test]
    fn test_acknowledgment_sums_affected_rows() {
        let output = MySqlOutput {
            rows: Vec::new(),
            results: vec![MySqlQueryResult::default(), MySqlQueryResult::default()],
        };
        let result = MySqlAdapter.normalize_result(output);
        assert_eq!(result.affected_rows, Some(0));
        assert_eq!(result.insert_id, None);
        assert!(MySqlAdapter.supports_read_only_mode());
    }

    #[test]
    fn test_read_only_restart_leaves_session_untouched() {
        assert_eq!(READ_ONLY_RESTART.last(), Some(&"START TRANSACTION READ ONLY"));
        assert!(READ_ONLY_RESTART.iter().all(|sql| !sql.contains("SESSION")));
    }
}
