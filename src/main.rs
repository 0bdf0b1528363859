//! SQL Bridge - Main entry point.
//!
//! Serves a single MySQL, PostgreSQL or SQLite database over MCP with
//! permission-checked, transaction-wrapped statement execution.

use clap::Parser;
use sql_bridge::auth::AuthConfig;
use sql_bridge::config::{Config, TransportMode};
use sql_bridge::db::{DbAdapter, QueryExecutor, create_adapter};
use sql_bridge::error::DbError;
use sql_bridge::tools::PermissionGuard;
use sql_bridge::transport::{HttpTransport, StdioTransport, Transport};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Initialize the tracing subscriber. Logs go to stderr; stdout belongs to
/// the stdio transport.
fn init_tracing(config: &Config) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));

    let subscriber = tracing_subscriber::registry().with(filter);

    if config.json_logs {
        subscriber
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        subscriber
            .with(
                fmt::layer()
                    .with_target(true)
                    .with_thread_ids(false)
                    .with_writer(std::io::stderr),
            )
            .init();
    }
}

/// Build the executor and transport from configuration, then serve.
async fn run(config: Config) -> Result<(), DbError> {
    let adapter = create_adapter(&config.db_type)?;
    let policy = config.permission_policy()?;
    let connection = config.connection_config();
    let settings = config.execution_settings();

    info!(
        backend = %adapter.database_type(),
        database = connection.database.as_deref().unwrap_or("<multi>"),
        read_only_mode = policy.read_only_mode,
        multi_db_write = policy.multi_db_write_allowed,
        query_timeout_ms = ?settings.query_timeout.map(|t| t.as_millis()),
        "Configuration loaded"
    );

    let guard = PermissionGuard::new(policy, connection.database.clone());
    let executor = Arc::new(QueryExecutor::new(adapter, connection, guard, settings));

    // An unreachable backend is a startup failure, not a per-call error.
    executor
        .warm_up()
        .await
        .map_err(|e| DbError::configuration(e.to_string()))?;

    match config.transport {
        TransportMode::Stdio => StdioTransport::new(executor).run().await,
        TransportMode::Http => {
            let auth = AuthConfig::from_tokens(&config.auth_tokens).map_err(DbError::configuration)?;
            info!(
                host = %config.http_host,
                port = config.http_port,
                endpoint = %config.mcp_endpoint,
                "Using HTTP transport"
            );
            HttpTransport::new(
                executor,
                auth,
                &config.http_host,
                config.http_port,
                &config.mcp_endpoint,
            )
            .run()
            .await
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let config = Config::parse();
    init_tracing(&config);

    info!(
        transport = %config.transport,
        "Starting SQL Bridge v{}",
        env!("CARGO_PKG_VERSION")
    );

    match run(config).await {
        Ok(()) => {
            info!("Server shutdown complete");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, fatal = e.is_fatal(), "Server error");
            ExitCode::FAILURE
        }
    }
}
