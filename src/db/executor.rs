//! Execution engine.
//!
//! Runs one SQL statement end to end and always answers with a
//! [`ResponseEnvelope`]:
//!
//! - **Write path** (permitted write kinds): acquire, begin, execute, commit.
//!   Any failure rolls back.
//! - **Read path** (everything else): acquire, begin, optionally set the
//!   session read-only, execute, then always roll back and unset read-only.
//!
//! Permission denials short-circuit before a connection is acquired. Cleanup
//! failures are logged and never replace the primary outcome. A connection
//! whose transaction could not be closed is discarded instead of released.

use crate::db::adapter::DbAdapter;
use crate::db::connection::Connection;
use crate::error::{DbError, DbResult};
use crate::models::{ConnectionConfig, NormalizedResult, QueryClassification, ResponseEnvelope};
use crate::tools::format::{format_read_response, format_write_response};
use crate::tools::guard::PermissionGuard;
use crate::tools::sql_classifier::classify;
use std::time::{Duration, Instant};
use tokio::sync::OnceCell;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Engine knobs that are not part of the permission policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecutionSettings {
    /// Upper bound for the backend call; `None` waits indefinitely
    pub query_timeout: Option<Duration>,
    /// Wrap reads in a read-only transaction when the backend supports it
    pub read_only_transactions: bool,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self {
            query_timeout: None,
            read_only_transactions: true,
        }
    }
}

/// Executes statements against one backend through its adapter.
///
/// The pool is created lazily on first use; concurrent first calls share a
/// single creation attempt. A failed attempt is not cached, so the next call
/// retries.
pub struct QueryExecutor<A: DbAdapter> {
    adapter: A,
    config: ConnectionConfig,
    guard: PermissionGuard,
    settings: ExecutionSettings,
    pool: OnceCell<A::Pool>,
}

impl<A: DbAdapter> QueryExecutor<A> {
    pub fn new(
        adapter: A,
        config: ConnectionConfig,
        guard: PermissionGuard,
        settings: ExecutionSettings,
    ) -> Self {
        Self {
            adapter,
            config,
            guard,
            settings,
            pool: OnceCell::new(),
        }
    }

    pub fn adapter(&self) -> &A {
        &self.adapter
    }

    pub fn guard(&self) -> &PermissionGuard {
        &self.guard
    }

    pub fn settings(&self) -> ExecutionSettings {
        self.settings
    }

    /// The shared pool, created on first call.
    pub async fn pool(&self) -> DbResult<&A::Pool> {
        self.pool
            .get_or_try_init(|| async {
                info!(backend = %self.adapter.database_type(), "Creating connection pool");
                self.adapter.create_pool(&self.config).await
            })
            .await
    }

    /// Create the pool eagerly so an unreachable backend surfaces at startup.
    pub async fn warm_up(&self) -> DbResult<()> {
        self.pool().await.map(|_| ())
    }

    /// Close the pool if it was ever created.
    pub async fn close(&self) {
        if let Some(pool) = self.pool.get() {
            self.adapter.close(pool).await;
        }
    }

    /// Classify and run `sql`. Never fails: every outcome is an envelope.
    pub async fn execute_sql(&self, sql: &str) -> ResponseEnvelope {
        let classification = classify(sql, self.adapter.database_type());
        self.execute_classified(sql, &classification).await
    }

    pub async fn execute_classified(
        &self,
        sql: &str,
        classification: &QueryClassification,
    ) -> ResponseEnvelope {
        let kinds: Vec<&str> = classification.kinds.iter().map(|k| k.as_str()).collect();
        let schema = self.guard.target_schema(classification);

        if let Err(denial) = self.guard.check_read_only(classification) {
            warn!(kinds = ?kinds, "Write rejected by read-only mode");
            return ResponseEnvelope::error(DbError::from(denial).envelope_message());
        }
        if let Err(denial) = self.guard.check(classification) {
            warn!(kinds = ?kinds, schema = ?schema, "Write rejected by permission policy");
            return ResponseEnvelope::error(DbError::from(denial).envelope_message());
        }

        let outcome = if classification.is_write() {
            self.run_write(sql).await
        } else {
            self.run_read(sql).await
        };

        match outcome {
            Ok((result, elapsed)) => {
                info!(
                    kinds = ?kinds,
                    schema = ?schema,
                    elapsed_ms = elapsed.as_secs_f64() * 1000.0,
                    "Statement executed"
                );
                // Summaries describe the first write target.
                match classification.targets.iter().next() {
                    Some(target) => {
                        let target_schema =
                            target.schema.as_deref().or(self.guard.default_schema());
                        format_write_response(&result, target.operation, target_schema, elapsed)
                    }
                    None => format_read_response(&result, elapsed),
                }
            }
            Err(e) => {
                warn!(
                    kinds = ?kinds,
                    error = %e,
                    sql_state = e.sql_state(),
                    suggestion = e.suggestion(),
                    "Statement failed"
                );
                ResponseEnvelope::error(e.envelope_message())
            }
        }
    }

    async fn acquire(&self) -> DbResult<Connection<A::Handle>> {
        let pool = self.pool().await?;
        let handle = self.adapter.acquire(pool).await?;
        Ok(Connection::new(handle))
    }

    /// Run the statement under the optional timeout. Elapsed time covers
    /// only the backend call.
    async fn timed_execute(
        &self,
        conn: &mut Connection<A::Handle>,
        sql: &str,
    ) -> DbResult<(NormalizedResult, Duration)> {
        let start = Instant::now();
        let raw = match self.settings.query_timeout {
            Some(limit) => match timeout(limit, conn.execute(&self.adapter, sql)).await {
                Ok(result) => result?,
                Err(_) => {
                    conn.mark_faulted();
                    return Err(DbError::timeout(
                        "execute_sql",
                        u64::try_from(limit.as_millis()).unwrap_or(u64::MAX),
                    ));
                }
            },
            None => conn.execute(&self.adapter, sql).await?,
        };
        let elapsed = start.elapsed();
        Ok((self.adapter.normalize_result(raw), elapsed))
    }

    async fn run_write(&self, sql: &str) -> DbResult<(NormalizedResult, Duration)> {
        let mut conn = self.acquire().await?;

        let outcome = async {
            conn.begin(&self.adapter).await?;
            let output = self.timed_execute(&mut conn, sql).await?;
            conn.commit(&self.adapter).await?;
            Ok::<_, DbError>(output)
        }
        .await;

        if outcome.is_err() {
            if let Err(e) = conn.rollback(&self.adapter).await {
                warn!(error = %e, "Rollback after failed write did not complete");
            }
        }

        conn.finish(&self.adapter).await;
        outcome
    }

    async fn run_read(&self, sql: &str) -> DbResult<(NormalizedResult, Duration)> {
        let mut conn = self.acquire().await?;
        let read_only =
            self.settings.read_only_transactions && self.adapter.supports_read_only_mode();

        let outcome = async {
            conn.begin(&self.adapter).await?;
            if read_only {
                conn.set_read_only(&self.adapter).await?;
            }
            self.timed_execute(&mut conn, sql).await
        }
        .await;

        // Reads never commit.
        if let Err(e) = conn.rollback(&self.adapter).await {
            warn!(error = %e, "Rollback after read did not complete");
        }
        if let Err(e) = conn.unset_read_only(&self.adapter).await {
            warn!(error = %e, "Failed to restore read-write mode");
        }
        debug!(state = ?conn.state(), "Read transaction closed");

        conn.finish(&self.adapter).await;
        outcome
    }
}
