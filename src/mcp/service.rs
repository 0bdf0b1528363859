//! MCP service implementation using rmcp.
//!
//! Exposes the execution engine as the `execute_sql` tool plus a
//! `show_permissions` tool describing the effective write policy.

use crate::db::{BackendAdapter, QueryExecutor};
use crate::models::ResponseEnvelope;
use crate::tools::execute::{ExecuteSqlInput, ExecuteToolHandler};
use rmcp::{
    ErrorData, ServerHandler,
    handler::server::tool::ToolRouter,
    handler::server::wrapper::Parameters,
    model::{CallToolResult, Content, Implementation, ProtocolVersion, ServerCapabilities, ServerInfo},
    tool, tool_handler, tool_router,
};
use std::sync::Arc;

/// Envelopes are always delivered as tool results; `is_error` carries failure.
fn into_call_result(envelope: ResponseEnvelope) -> CallToolResult {
    let content: Vec<Content> = envelope
        .content
        .into_iter()
        .map(|c| Content::text(c.text))
        .collect();
    if envelope.is_error {
        CallToolResult::error(content)
    } else {
        CallToolResult::success(content)
    }
}

#[derive(Clone)]
pub struct SqlService {
    handler: ExecuteToolHandler<BackendAdapter>,
    /// Tool router for MCP tool dispatch (auto-generated)
    tool_router: ToolRouter<Self>,
}

impl SqlService {
    pub fn new(executor: Arc<QueryExecutor<BackendAdapter>>) -> Self {
        Self {
            handler: ExecuteToolHandler::new(executor),
            tool_router: Self::tool_router(),
        }
    }
}

#[tool_router]
impl SqlService {
    #[tool(
        description = "Execute a SQL statement.\nReads run inside a transaction that is always rolled back (read-only where the backend supports it).\nINSERT, UPDATE, DELETE and DDL run only when the permission policy allows them for the target schema; use `show_permissions` to see it.\nReturns rows as JSON or a write summary, followed by the execution time."
    )]
    async fn execute_sql(
        &self,
        Parameters(input): Parameters<ExecuteSqlInput>,
    ) -> Result<CallToolResult, ErrorData> {
        Ok(into_call_result(self.handler.execute_sql(input).await))
    }

    #[tool(
        description = "Show the effective write permissions: global flags, per-schema overrides, read-only and multi-database modes."
    )]
    async fn show_permissions(&self) -> Result<CallToolResult, ErrorData> {
        let report = self.handler.show_permissions()?;
        Ok(CallToolResult::success(vec![Content::text(report)]))
    }
}

#[tool_handler]
impl ServerHandler for SqlService {
    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_03_26,
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "sql-bridge".to_owned(),
                title: Some("SQL Bridge".to_owned()),
                version: env!("CARGO_PKG_VERSION").to_owned(),
                icons: None,
                website_url: None,
            },
            instructions: Some(
                "SQL access to a single MySQL, PostgreSQL or SQLite database.\n\
                \n\
                ## Tools\n\
                - `execute_sql`: run any statement; errors come back as tool errors with the backend message\n\
                - `show_permissions`: which write kinds are allowed, globally and per schema\n\
                \n\
                ## Writes\n\
                INSERT, UPDATE, DELETE and DDL are denied unless enabled. A denial names the\n\
                environment variable that would allow it. Without DB_NAME (multi-database mode)\n\
                writes additionally require MULTI_DB_WRITE_MODE=true.\n\
                \n\
                ## Schemas\n\
                Qualify tables (`db.table`) to target a schema other than the default one."
                    .to_string(),
            ),
        }
    }
}
