//! Streamable HTTP transport, optionally behind bearer-token auth.

use crate::auth::{AuthConfig, auth_middleware};
use crate::db::{BackendAdapter, QueryExecutor};
use crate::error::{DbError, DbResult};
use crate::mcp::SqlService;
use crate::transport::{Transport, wait_for_signal};
use axum::Router;
use rmcp::transport::streamable_http_server::{
    StreamableHttpService, session::local::LocalSessionManager,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tracing::{info, warn};

/// Open SSE streams can hold graceful shutdown forever; give up after this.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

pub struct HttpTransport {
    executor: Arc<QueryExecutor<BackendAdapter>>,
    auth: Arc<AuthConfig>,
    host: String,
    port: u16,
    endpoint: String,
}

impl HttpTransport {
    pub fn new(
        executor: Arc<QueryExecutor<BackendAdapter>>,
        auth: AuthConfig,
        host: impl Into<String>,
        port: u16,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            executor,
            auth: Arc::new(auth),
            host: host.into(),
            port,
            endpoint: endpoint.into(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// MCP service mounted at the endpoint, wrapped in auth when tokens are configured.
    pub fn router(&self) -> Router {
        let executor = Arc::clone(&self.executor);
        let mcp = StreamableHttpService::new(
            move || Ok(SqlService::new(Arc::clone(&executor))),
            LocalSessionManager::default().into(),
            Default::default(),
        );

        let router = match self.endpoint.as_str() {
            // nest_service panics on "/"
            "/" => Router::new().fallback_service(mcp),
            path => Router::new().nest_service(path, mcp),
        };

        if !self.auth.is_enabled() {
            warn!("HTTP transport running without authentication");
            return router;
        }
        info!(tokens = self.auth.token_count(), "Bearer authentication enabled");
        router.layer(axum::middleware::from_fn_with_state(
            Arc::clone(&self.auth),
            auth_middleware,
        ))
    }

    async fn bind(&self) -> DbResult<TcpListener> {
        let addr = self.bind_addr();
        TcpListener::bind(&addr).await.map_err(|e| {
            DbError::configuration(format!(
                "Failed to bind {} (check MCP_HTTP_HOST/MCP_HTTP_PORT): {}",
                addr, e
            ))
        })
    }
}

/// Resolves once shutdown has started and then either the drain timeout
/// passes or a second signal arrives. Never resolves if `started` is dropped
/// without firing.
async fn drain_deadline(started: oneshot::Receiver<()>) {
    if started.await.is_err() {
        return std::future::pending().await;
    }
    info!(
        timeout_secs = DRAIN_TIMEOUT.as_secs(),
        "Draining HTTP sessions (send signal again to force exit)"
    );
    tokio::select! {
        _ = tokio::time::sleep(DRAIN_TIMEOUT) => warn!("Drain timeout reached, forcing exit"),
        _ = wait_for_signal() => warn!("Received second signal, forcing exit"),
    }
}

impl Transport for HttpTransport {
    async fn run(&self) -> DbResult<()> {
        let listener = self.bind().await?;
        info!(addr = %self.bind_addr(), endpoint = %self.endpoint, "MCP HTTP endpoint ready");

        let (started_tx, started_rx) = oneshot::channel();
        let server = axum::serve(listener, self.router()).with_graceful_shutdown(async move {
            wait_for_signal().await;
            let _ = started_tx.send(());
        });

        let outcome = tokio::select! {
            served = server => served
                .map(|()| info!("HTTP server stopped"))
                .map_err(|e| DbError::internal(format!("HTTP server error: {}", e))),
            _ = drain_deadline(started_rx) => Ok(()),
        };

        info!("Closing database connections");
        self.executor.close().await;
        outcome
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
