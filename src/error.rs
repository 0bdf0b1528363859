//! Error types for the SQL bridge.
//!
//! Only `Configuration` errors stop the process. Everything raised while
//! serving a tool call is rendered into an error envelope with
//! [`DbError::envelope_message`].

use crate::models::DatabaseType;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    /// A statement the backend rejected. `message` is the backend's own text.
    #[error("Database error: {message}")]
    Database {
        message: String,
        /// SQLSTATE or backend error code, e.g. "42P01"
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Permission denied: {operation} - {reason}")]
    Permission { operation: String, reason: String },

    #[error("Timeout: {operation} exceeded {limit_ms} ms")]
    Timeout { operation: String, limit_ms: u64 },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn permission(operation: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Permission {
            operation: operation.into(),
            reason: reason.into(),
        }
    }

    pub fn timeout(operation: impl Into<String>, limit_ms: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            limit_ms,
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Connection error for a failed pool or handle creation, with a hint
    /// pointing at the settings most likely to be wrong.
    pub fn connect_failed(db_type: DatabaseType, error: &sqlx::Error) -> Self {
        Self::connection(
            format!("Failed to connect to {}: {}", db_type, error),
            connect_hint(db_type, error),
        )
    }

    /// Operator hint. Logged and attached to RPC errors, never put in envelopes.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } | Self::Database { suggestion, .. } => {
                Some(suggestion)
            }
            _ => None,
        }
    }

    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Only configuration errors may stop the process.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Configuration { .. })
    }

    /// Text of the error envelope. Backend and input messages pass through
    /// verbatim; denials carry their full explanation.
    pub fn envelope_message(&self) -> String {
        match self {
            Self::Permission { reason, .. } => format!("Error: {}", reason),
            Self::Database { message, .. } | Self::InvalidInput { message } => {
                format!("Error executing query: {}", message)
            }
            other => format!("Error executing query: {}", other),
        }
    }
}

fn connect_hint(db_type: DatabaseType, error: &sqlx::Error) -> String {
    let text = error.to_string().to_lowercase();
    let mentions = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if mentions(&["connection refused"]) {
        return format!(
            "Check that the {} server is running and reachable at DB_HOST/DB_PORT",
            db_type
        );
    }

    let hint = if mentions(&["authentication", "password"]) {
        "Verify DB_USER and DB_PASSWORD"
    } else if mentions(&["does not exist", "unknown database"]) {
        "Check that DB_NAME names an existing database"
    } else if mentions(&["tls", "ssl"]) {
        "Check DB_SSL_CA, DB_SSL_CERT, DB_SSL_KEY and DB_SSL_REJECT_UNAUTHORIZED"
    } else if db_type == DatabaseType::SQLite {
        "Verify DB_NAME points to a writable file path"
    } else {
        "Verify DB_HOST, DB_PORT or DB_SOCKET_PATH"
    };
    hint.to_string()
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => DbError::database(
                db_err.message(),
                db_err.code().map(|c| c.into_owned()),
                "Check the SQL syntax and the objects it references",
            ),
            sqlx::Error::PoolTimedOut => DbError::connection(
                "Timed out waiting for a pooled connection",
                "All connections are busy; raise DB_POOL_SIZE or retry later",
            ),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Restart the server")
            }
            sqlx::Error::Io(e) => DbError::connection(
                format!("I/O error: {}", e),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(e) => DbError::connection(
                format!("TLS error: {}", e),
                "Verify DB_SSL_CA, DB_SSL_CERT and DB_SSL_KEY",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::Configuration(e) => {
                DbError::connection(e.to_string(), "Check the DB_* connection settings")
            }
            other => DbError::internal(other.to_string()),
        }
    }
}

pub type DbResult<T> = Result<T, DbError>;

/// Faults outside statement execution surface as JSON-RPC errors. Statement
/// failures never take this path; they are error envelopes.
impl From<DbError> for rmcp::ErrorData {
    fn from(err: DbError) -> Self {
        let data = err
            .suggestion()
            .map(|hint| serde_json::json!({ "suggestion": hint }));
        match err {
            DbError::InvalidInput { .. } | DbError::Permission { .. } => {
                rmcp::ErrorData::invalid_params(err.to_string(), data)
            }
            _ => rmcp::ErrorData::internal_error(err.to_string(), data),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_configuration_is_fatal() {
        assert!(DbError::configuration("unknown backend").is_fatal());
        assert!(!DbError::connection("err", "hint").is_fatal());
        assert!(!DbError::timeout("execute_sql", 50).is_fatal());
        assert!(!DbError::internal("boom").is_fatal());
    }

    #[test]
    fn test_backend_message_passes_through() {
        let err = DbError::database(
            "Table 'shop.nope' doesn't exist",
            Some("42S02".into()),
            "hint",
        );
        assert_eq!(
            err.envelope_message(),
            "Error executing query: Table 'shop.nope' doesn't exist"
        );
        assert_eq!(err.sql_state(), Some("42S02"));
        assert_eq!(err.suggestion(), Some("hint"));
    }

    #[test]
    fn test_denial_uses_reason_only() {
        let err = DbError::permission("INSERT", "INSERT operations are not allowed");
        assert_eq!(err.envelope_message(), "Error: INSERT operations are not allowed");
    }

    #[test]
    fn test_invalid_input_message() {
        let err = DbError::invalid_input("sql must not be empty");
        assert_eq!(
            err.envelope_message(),
            "Error executing query: sql must not be empty"
        );
        assert_eq!(err.suggestion(), None);
    }

    #[test]
    fn test_timeout_message() {
        let err = DbError::timeout("execute_sql", 250);
        assert_eq!(
            err.envelope_message(),
            "Error executing query: Timeout: execute_sql exceeded 250 ms"
        );
    }

    #[test]
    fn test_pool_timeout_is_a_connection_error() {
        let err = DbError::from(sqlx::Error::PoolTimedOut);
        assert!(matches!(err, DbError::Connection { .. }));
        assert!(err.suggestion().unwrap().contains("DB_POOL_SIZE"));
    }

    #[test]
    fn test_rpc_error_codes() {
        let invalid: rmcp::ErrorData = DbError::invalid_input("bad").into();
        assert_eq!(invalid.code.0, -32602);

        let internal: rmcp::ErrorData = DbError::connection("down", "start it").into();
        assert_eq!(internal.code.0, -32603);
        assert_eq!(
            internal.data,
            Some(serde_json::json!({ "suggestion": "start it" }))
        );
    }

    #[test]
    fn test_connect_hint_for_sqlite() {
        let err = DbError::connect_failed(DatabaseType::SQLite, &sqlx::Error::PoolClosed);
        assert_eq!(
            err.suggestion(),
            Some("Verify DB_NAME points to a writable file path")
        );
    }
}
