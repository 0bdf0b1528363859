//! Stdio transport for the MCP server.
//!
//! JSON-RPC travels over stdin/stdout, so all logging goes to stderr.

use crate::db::{BackendAdapter, QueryExecutor};
use crate::error::{DbError, DbResult};
use crate::mcp::SqlService;
use crate::transport::{Transport, wait_for_signal};
use rmcp::{ServiceExt, transport::stdio};
use std::sync::Arc;
use tracing::{info, warn};

/// Why the stdio session ended.
enum StdioExit {
    /// The client closed stdin or the session failed.
    Client(DbResult<()>),
    Signal,
}

pub struct StdioTransport {
    executor: Arc<QueryExecutor<BackendAdapter>>,
}

impl StdioTransport {
    pub fn new(executor: Arc<QueryExecutor<BackendAdapter>>) -> Self {
        Self { executor }
    }
}

impl Transport for StdioTransport {
    async fn run(&self) -> DbResult<()> {
        info!("Starting MCP server with stdio transport");

        let session = SqlService::new(Arc::clone(&self.executor))
            .serve(stdio())
            .await
            .map_err(|e| DbError::internal(format!("Failed to start stdio transport: {}", e)))?;

        let exit = tokio::select! {
            result = session.waiting() => StdioExit::Client(
                result
                    .map(|reason| info!(?reason, "Stdio session ended"))
                    .map_err(|e| DbError::internal(format!("Stdio transport error: {}", e))),
            ),
            _ = wait_for_signal() => StdioExit::Signal,
        };

        if let StdioExit::Signal = exit {
            info!("Shutdown signal received (send again to force exit)");
            tokio::spawn(async {
                wait_for_signal().await;
                warn!("Received second signal, forcing immediate exit");
                std::process::exit(1);
            });
        }

        info!("Closing database connections");
        self.executor.close().await;

        match exit {
            StdioExit::Client(outcome) => outcome,
            StdioExit::Signal => {
                // The stdin reader is blocked in a read that cannot be cancelled.
                info!("Exiting process");
                std::process::exit(0)
            }
        }
    }

    fn name(&self) -> &'static str {
        "stdio"
    }
}
