//! `execute_sql` and `show_permissions` tool handlers.

use crate::db::{DbAdapter, QueryExecutor};
use crate::error::{DbError, DbResult};
use crate::models::{PermissionPolicy, ResponseEnvelope};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Input for the execute_sql tool.
#[derive(Debug, Clone, Deserialize, JsonSchema)]
pub struct ExecuteSqlInput {
    /// SQL to run. Reads run in a rolled-back transaction; writes are subject to the permission policy.
    pub sql: String,
}

/// Effective permissions, as reported by show_permissions.
#[derive(Debug, Clone, Serialize)]
pub struct PermissionsReport<'a> {
    pub backend: String,
    /// Database bound at connection level; absent in multi-database mode
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database: Option<&'a str>,
    pub multi_database: bool,
    pub read_only_transactions: bool,
    #[serde(flatten)]
    pub policy: &'a PermissionPolicy,
}

pub struct ExecuteToolHandler<A: DbAdapter> {
    executor: Arc<QueryExecutor<A>>,
}

impl<A: DbAdapter> ExecuteToolHandler<A> {
    pub fn new(executor: Arc<QueryExecutor<A>>) -> Self {
        Self { executor }
    }

    pub async fn execute_sql(&self, input: ExecuteSqlInput) -> ResponseEnvelope {
        let sql = input.sql.trim();
        if sql.is_empty() {
            return ResponseEnvelope::error(
                DbError::invalid_input("sql must not be empty").envelope_message(),
            );
        }
        self.executor.execute_sql(sql).await
    }

    /// Effective permissions as pretty JSON.
    pub fn show_permissions(&self) -> DbResult<String> {
        let guard = self.executor.guard();
        let adapter = self.executor.adapter();
        let report = PermissionsReport {
            backend: adapter.database_type().to_string(),
            database: guard.default_schema(),
            multi_database: guard.is_multi_database(),
            read_only_transactions: self.executor.settings().read_only_transactions
                && adapter.supports_read_only_mode(),
            policy: guard.policy(),
        };
        serde_json::to_string_pretty(&report)
            .map_err(|e| DbError::internal(format!("Failed to render permissions: {}", e)))
    }
}

impl<A: DbAdapter> Clone for ExecuteToolHandler<A> {
    fn clone(&self) -> Self {
        Self {
            executor: Arc::clone(&self.executor),
        }
    }
}
