//! Connection-related data models.
//!
//! This module defines the backend identifier and the immutable connection
//! settings shared by every adapter.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_HOST: &str = "127.0.0.1";
pub const DEFAULT_POOL_SIZE: u32 = 10;
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Supported database types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Includes MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Parse a backend identifier such as `mysql`, `pg` or `sqlite3`.
    pub fn from_identifier(identifier: &str) -> Option<Self> {
        match identifier.trim().to_lowercase().as_str() {
            "postgres" | "postgresql" | "pg" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" | "sqlite3" => Some(Self::SQLite),
            _ => None,
        }
    }

    /// Get the display name for this database type.
    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Get the default port for this database type.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            Self::PostgreSQL => Some(5432),
            Self::MySQL => Some(3306),
            Self::SQLite => None,
        }
    }
}

impl fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// TLS material for the database connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TlsConfig {
    pub ca: Option<PathBuf>,
    pub cert: Option<PathBuf>,
    pub key: Option<PathBuf>,
    /// Verify the server certificate and host name (default: true)
    pub reject_unauthorized: bool,
}

impl TlsConfig {
    /// Build TLS settings, returning `None` when no material is configured.
    pub fn from_parts(
        ca: Option<PathBuf>,
        cert: Option<PathBuf>,
        key: Option<PathBuf>,
        reject_unauthorized: bool,
    ) -> Option<Self> {
        if ca.is_none() && cert.is_none() && key.is_none() {
            return None;
        }
        Some(Self {
            ca,
            cert,
            key,
            reject_unauthorized,
        })
    }
}

/// Immutable connection settings.
///
/// `database` is optional: without it the server runs in multi-database mode.
/// For SQLite it holds the database file path.
#[derive(Clone)]
pub struct ConnectionConfig {
    pub host: String,
    pub port: Option<u16>,
    pub socket_path: Option<PathBuf>,
    pub user: Option<String>,
    /// Contains sensitive data - never log
    pub password: Option<String>,
    pub database: Option<String>,
    pub pool_size: u32,
    pub connect_timeout: Duration,
    pub tls: Option<TlsConfig>,
}

impl ConnectionConfig {
    /// Settings for a single SQLite database file.
    pub fn sqlite(path: impl Into<String>) -> Self {
        Self {
            database: Some(path.into()),
            ..Self::default()
        }
    }

    /// True when no database is bound at the connection level.
    pub fn is_multi_database(&self) -> bool {
        self.database.is_none()
    }

    /// Port to connect to, falling back to the backend default.
    pub fn port_or_default(&self, db_type: DatabaseType) -> Option<u16> {
        self.port.or_else(|| db_type.default_port())
    }
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_HOST.to_string(),
            port: None,
            socket_path: None,
            user: None,
            password: None,
            database: None,
            pool_size: DEFAULT_POOL_SIZE,
            connect_timeout: Duration::from_secs(DEFAULT_CONNECT_TIMEOUT_SECS),
            tls: None,
        }
    }
}

impl fmt::Debug for ConnectionConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("socket_path", &self.socket_path)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("database", &self.database)
            .field("pool_size", &self.pool_size)
            .field("connect_timeout", &self.connect_timeout)
            .field("tls", &self.tls)
            .finish()
    }
}
