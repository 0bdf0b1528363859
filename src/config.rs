//! Configuration handling for the SQL bridge.
//!
//! This module provides configuration management via CLI arguments and environment variables.
//! Configuration is read once at startup and converted into immutable
//! [`ConnectionConfig`] and [`PermissionPolicy`] values.

use crate::db::ExecutionSettings;
use crate::error::{DbError, DbResult};
use crate::models::{
    ConnectionConfig, OperationFlags, PermissionPolicy, TlsConfig, WriteOperation,
    connection::{DEFAULT_CONNECT_TIMEOUT_SECS, DEFAULT_HOST, DEFAULT_POOL_SIZE},
};
use clap::builder::BoolishValueParser;
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HTTP_HOST: &str = "127.0.0.1";
pub const DEFAULT_HTTP_PORT: u16 = 8080;
pub const DEFAULT_MCP_ENDPOINT: &str = "/";
pub const DEFAULT_DB_TYPE: &str = "mysql";

/// Transport mode for the MCP server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum TransportMode {
    /// Standard input/output (for CLI integration)
    #[default]
    Stdio,
    /// Streamable HTTP (for web clients)
    Http,
}

impl std::fmt::Display for TransportMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Stdio => write!(f, "stdio"),
            Self::Http => write!(f, "http"),
        }
    }
}

/// Configuration for the SQL bridge.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "sql-bridge",
    about = "MCP server that runs SQL against MySQL, PostgreSQL or SQLite under a permission policy",
    version,
    author
)]
pub struct Config {
    /// Backend identifier (mysql, mariadb, postgres, postgresql, pg, sqlite, sqlite3)
    #[arg(long, default_value = DEFAULT_DB_TYPE, env = "DB_TYPE")]
    pub db_type: String,

    /// Database host
    #[arg(long, default_value = DEFAULT_HOST, env = "DB_HOST")]
    pub db_host: String,

    /// Database port (defaults to 3306 for MySQL, 5432 for PostgreSQL)
    #[arg(long, env = "DB_PORT")]
    pub db_port: Option<u16>,

    /// Unix socket path, used instead of host/port when set
    #[arg(long, env = "DB_SOCKET_PATH")]
    pub db_socket_path: Option<PathBuf>,

    #[arg(long, env = "DB_USER")]
    pub db_user: Option<String>,

    #[arg(long, env = "DB_PASSWORD", hide_env_values = true)]
    pub db_password: Option<String>,

    /// Database name (SQLite: file path). Leave unset for multi-database mode.
    #[arg(long, env = "DB_NAME")]
    pub db_name: Option<String>,

    /// Maximum pooled connections
    #[arg(long, default_value_t = DEFAULT_POOL_SIZE, env = "DB_POOL_SIZE")]
    pub db_pool_size: u32,

    /// Connection timeout in seconds
    #[arg(long, default_value_t = DEFAULT_CONNECT_TIMEOUT_SECS, env = "DB_CONNECT_TIMEOUT")]
    pub db_connect_timeout: u64,

    /// CA certificate for TLS
    #[arg(long, env = "DB_SSL_CA")]
    pub db_ssl_ca: Option<PathBuf>,

    /// Client certificate for TLS
    #[arg(long, env = "DB_SSL_CERT")]
    pub db_ssl_cert: Option<PathBuf>,

    /// Client key for TLS
    #[arg(long, env = "DB_SSL_KEY")]
    pub db_ssl_key: Option<PathBuf>,

    /// Verify the server certificate when TLS is configured
    #[arg(
        long,
        env = "DB_SSL_REJECT_UNAUTHORIZED",
        default_value_t = true,
        action = ArgAction::Set,
        value_parser = BoolishValueParser::new()
    )]
    pub db_ssl_reject_unauthorized: bool,

    #[arg(long, env = "ALLOW_INSERT_OPERATION")]
    pub allow_insert_operation: bool,

    #[arg(long, env = "ALLOW_UPDATE_OPERATION")]
    pub allow_update_operation: bool,

    #[arg(long, env = "ALLOW_DELETE_OPERATION")]
    pub allow_delete_operation: bool,

    #[arg(long, env = "ALLOW_DDL_OPERATION")]
    pub allow_ddl_operation: bool,

    /// Per-schema INSERT overrides, e.g. "app:true,audit:false"
    #[arg(long, env = "SCHEMA_INSERT_PERMISSIONS")]
    pub schema_insert_permissions: Option<String>,

    /// Per-schema UPDATE overrides
    #[arg(long, env = "SCHEMA_UPDATE_PERMISSIONS")]
    pub schema_update_permissions: Option<String>,

    /// Per-schema DELETE overrides
    #[arg(long, env = "SCHEMA_DELETE_PERMISSIONS")]
    pub schema_delete_permissions: Option<String>,

    /// Per-schema DDL overrides
    #[arg(long, env = "SCHEMA_DDL_PERMISSIONS")]
    pub schema_ddl_permissions: Option<String>,

    /// Allow writes when no database is bound (DB_NAME unset)
    #[arg(long, env = "MULTI_DB_WRITE_MODE")]
    pub multi_db_write_mode: bool,

    /// Reject every write statement
    #[arg(long, env = "DB_READ_ONLY_MODE")]
    pub db_read_only_mode: bool,

    /// Skip the session read-only toggle on the read path
    #[arg(long, env = "DB_DISABLE_READ_ONLY_TRANSACTIONS")]
    pub db_disable_read_only_transactions: bool,

    /// Abort statements running longer than this many milliseconds
    #[arg(long, env = "DB_QUERY_TIMEOUT_MS")]
    pub db_query_timeout_ms: Option<u64>,

    /// Transport mode (stdio or http)
    #[arg(
        short,
        long,
        value_enum,
        default_value = "stdio",
        env = "MCP_TRANSPORT"
    )]
    pub transport: TransportMode,

    /// HTTP host to bind to (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_HTTP_HOST,
        env = "MCP_HTTP_HOST"
    )]
    pub http_host: String,

    /// HTTP port to bind to (only used with http transport)
    #[arg(
        long,
        default_value_t = DEFAULT_HTTP_PORT,
        env = "MCP_HTTP_PORT"
    )]
    pub http_port: u16,

    /// MCP endpoint path (only used with http transport)
    #[arg(
        long,
        default_value = DEFAULT_MCP_ENDPOINT,
        env = "MCP_ENDPOINT"
    )]
    pub mcp_endpoint: String,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info", env = "MCP_LOG_LEVEL")]
    pub log_level: String,

    /// Enable JSON logging format
    #[arg(long, env = "MCP_JSON_LOGS")]
    pub json_logs: bool,

    /// Authentication tokens for HTTP transport.
    /// Can be specified multiple times or as comma-separated values.
    /// When set, all HTTP requests must include a valid Bearer token.
    #[arg(
        long = "auth-token",
        value_name = "TOKEN",
        env = "MCP_AUTH_TOKENS",
        value_delimiter = ','
    )]
    pub auth_tokens: Vec<String>,
}

impl Config {
    /// Create a default configuration (useful for testing).
    pub fn default_config() -> Self {
        Self {
            db_type: DEFAULT_DB_TYPE.to_string(),
            db_host: DEFAULT_HOST.to_string(),
            db_port: None,
            db_socket_path: None,
            db_user: None,
            db_password: None,
            db_name: None,
            db_pool_size: DEFAULT_POOL_SIZE,
            db_connect_timeout: DEFAULT_CONNECT_TIMEOUT_SECS,
            db_ssl_ca: None,
            db_ssl_cert: None,
            db_ssl_key: None,
            db_ssl_reject_unauthorized: true,
            allow_insert_operation: false,
            allow_update_operation: false,
            allow_delete_operation: false,
            allow_ddl_operation: false,
            schema_insert_permissions: None,
            schema_update_permissions: None,
            schema_delete_permissions: None,
            schema_ddl_permissions: None,
            multi_db_write_mode: false,
            db_read_only_mode: false,
            db_disable_read_only_transactions: false,
            db_query_timeout_ms: None,
            transport: TransportMode::Stdio,
            http_host: DEFAULT_HTTP_HOST.to_string(),
            http_port: DEFAULT_HTTP_PORT,
            mcp_endpoint: DEFAULT_MCP_ENDPOINT.to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            auth_tokens: Vec::new(),
        }
    }

    /// Build the immutable connection settings.
    pub fn connection_config(&self) -> ConnectionConfig {
        ConnectionConfig {
            host: self.db_host.clone(),
            port: self.db_port,
            socket_path: self.db_socket_path.clone(),
            user: self.db_user.clone(),
            password: self.db_password.clone(),
            database: self
                .db_name
                .as_deref()
                .map(str::trim)
                .filter(|name| !name.is_empty())
                .map(String::from),
            pool_size: self.db_pool_size.max(1),
            connect_timeout: Duration::from_secs(self.db_connect_timeout),
            tls: TlsConfig::from_parts(
                self.db_ssl_ca.clone(),
                self.db_ssl_cert.clone(),
                self.db_ssl_key.clone(),
                self.db_ssl_reject_unauthorized,
            ),
        }
    }

    /// Build the permission policy from global flags and schema overrides.
    pub fn permission_policy(&self) -> DbResult<PermissionPolicy> {
        let mut policy = PermissionPolicy {
            global: OperationFlags {
                insert: self.allow_insert_operation,
                update: self.allow_update_operation,
                delete: self.allow_delete_operation,
                ddl: self.allow_ddl_operation,
            },
            read_only_mode: self.db_read_only_mode,
            multi_db_write_allowed: self.multi_db_write_mode,
            ..PermissionPolicy::default()
        };

        let overrides = [
            (WriteOperation::Insert, &self.schema_insert_permissions),
            (WriteOperation::Update, &self.schema_update_permissions),
            (WriteOperation::Delete, &self.schema_delete_permissions),
            (WriteOperation::Ddl, &self.schema_ddl_permissions),
        ];
        for (op, raw) in overrides {
            let Some(raw) = raw else { continue };
            let entries = parse_schema_permissions(raw).map_err(|e| {
                DbError::configuration(format!("{}: {}", op.schema_env_var(), e))
            })?;
            for (schema, allowed) in entries {
                policy = policy.with_schema_override(schema, op, allowed);
            }
        }

        Ok(policy)
    }

    /// Engine settings derived from timeout and read-only toggles.
    pub fn execution_settings(&self) -> ExecutionSettings {
        ExecutionSettings {
            query_timeout: self.db_query_timeout_ms.map(Duration::from_millis),
            read_only_transactions: !self.db_disable_read_only_transactions,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

/// Parse a schema permission list such as `"db1:true, db2:false"`.
///
/// Empty entries are ignored. Values accept true/false, 1/0, yes/no and on/off.
pub fn parse_schema_permissions(raw: &str) -> Result<Vec<(String, bool)>, String> {
    let mut entries = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|e| !e.is_empty()) {
        let (schema, value) = entry
            .rsplit_once(':')
            .ok_or_else(|| format!("expected 'schema:true|false', got '{}'", entry))?;
        let schema = schema.trim();
        if schema.is_empty() {
            return Err(format!("missing schema name in '{}'", entry));
        }
        let allowed = match value.trim().to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => true,
            "false" | "0" | "no" | "off" => false,
            other => return Err(format!("invalid value '{}' for schema '{}'", other, schema)),
        };
        entries.push((schema.to_string(), allowed));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.transport, TransportMode::Stdio);
        assert_eq!(config.http_host, DEFAULT_HTTP_HOST);
        assert_eq!(config.http_port, DEFAULT_HTTP_PORT);
        assert!(config.db_ssl_reject_unauthorized);
    }

    #[test]
    fn test_parse_schema_permissions() {
        let entries = parse_schema_permissions("db1:true, db2:false,,db3:1").unwrap();
        assert_eq!(
            entries,
            vec![
                ("db1".to_string(), true),
                ("db2".to_string(), false),
                ("db3".to_string(), true),
            ]
        );
    }

    #[test]
    fn test_parse_schema_permissions_rejects_garbage() {
        assert!(parse_schema_permissions("db1").is_err());
        assert!(parse_schema_permissions(":true").is_err());
        assert!(parse_schema_permissions("db1:maybe").is_err());
    }

    #[test]
    fn test_permission_policy_from_flags() {
        let config = Config {
            allow_insert_operation: false,
            allow_update_operation: true,
            schema_insert_permissions: Some("test_db:true".to_string()),
            schema_ddl_permissions: Some("scratch:true,prod:false".to_string()),
            db_read_only_mode: true,
            ..Config::default()
        };
        let policy = config.permission_policy().unwrap();
        assert!(!policy.global.insert);
        assert!(policy.global.update);
        assert!(policy.read_only_mode);
        assert_eq!(
            policy.schema_override("test_db", WriteOperation::Insert),
            Some(true)
        );
        assert_eq!(
            policy.schema_override("prod", WriteOperation::Ddl),
            Some(false)
        );
    }

    #[test]
    fn test_malformed_override_is_configuration_error() {
        let config = Config {
            schema_delete_permissions: Some("nope".to_string()),
            ..Config::default()
        };
        let err = config.permission_policy().unwrap_err();
        assert!(err.is_fatal());
        assert!(err.to_string().contains("SCHEMA_DELETE_PERMISSIONS"));
    }

    #[test]
    fn test_connection_config_blank_database_is_multi_db() {
        let config = Config {
            db_name: Some("  ".to_string()),
            ..Config::default()
        };
        assert!(config.connection_config().is_multi_database());
    }

    #[test]
    fn test_execution_settings() {
        let config = Config {
            db_query_timeout_ms: Some(1500),
            db_disable_read_only_transactions: true,
            ..Config::default()
        };
        let settings = config.execution_settings();
        assert_eq!(settings.query_timeout, Some(Duration::from_millis(1500)));
        assert!(!settings.read_only_transactions);
    }

    #[test]
    fn test_parse_from_args() {
        let config = Config::try_parse_from([
            "sql-bridge",
            "--db-type",
            "sqlite",
            "--db-name",
            "/tmp/app.db",
            "--allow-insert-operation",
            "--db-ssl-reject-unauthorized",
            "false",
        ])
        .unwrap();
        assert_eq!(config.db_type, "sqlite");
        assert!(config.allow_insert_operation);
        assert!(!config.db_ssl_reject_unauthorized);
    }
}
