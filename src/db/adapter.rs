//! Backend adapter contract.
//!
//! An adapter wraps one backend's native pool, connection and transaction
//! primitives behind a uniform surface. Adapters are stateless: pools and
//! handles are owned by the caller and passed back in.

use crate::db::types::RowToJson;
use crate::error::DbResult;
use crate::models::{ConnectionConfig, DatabaseType, NormalizedResult};
use sqlx::Either;
use std::future::Future;

/// Uniform capability surface over a database backend.
///
/// `begin`, `commit` and `rollback` issue the backend's transaction
/// statements unconditionally; idempotence across a logical transaction is
/// provided by [`Connection`](crate::db::Connection), which tracks state.
pub trait DbAdapter: Send + Sync + 'static {
    /// Shared pool (or single shared handle) created once per process.
    type Pool: Send + Sync + 'static;
    /// Checked-out connection, exclusively owned by one call.
    type Handle: Send + 'static;
    /// Backend-native statement output.
    type Raw: Send + 'static;

    fn database_type(&self) -> DatabaseType;

    /// Create the pool. Fails with a connection error when the backend is
    /// unreachable or misconfigured.
    fn create_pool(
        &self,
        config: &ConnectionConfig,
    ) -> impl Future<Output = DbResult<Self::Pool>> + Send;

    fn acquire(&self, pool: &Self::Pool) -> impl Future<Output = DbResult<Self::Handle>> + Send;

    fn begin(&self, handle: &mut Self::Handle) -> impl Future<Output = DbResult<()>> + Send;

    fn commit(&self, handle: &mut Self::Handle) -> impl Future<Output = DbResult<()>> + Send;

    fn rollback(&self, handle: &mut Self::Handle) -> impl Future<Output = DbResult<()>> + Send;

    /// Put the open transaction (and session) into read-only mode.
    fn set_read_only(&self, handle: &mut Self::Handle)
    -> impl Future<Output = DbResult<()>> + Send;

    /// Restore read-write mode for the session before it goes back to the pool.
    fn unset_read_only(
        &self,
        handle: &mut Self::Handle,
    ) -> impl Future<Output = DbResult<()>> + Send;

    fn execute(
        &self,
        handle: &mut Self::Handle,
        sql: &str,
    ) -> impl Future<Output = DbResult<Self::Raw>> + Send;

    /// Return a healthy connection to the pool.
    fn release(&self, handle: Self::Handle);

    /// Drop a connection whose state can no longer be trusted.
    fn discard(&self, handle: Self::Handle) -> impl Future<Output = ()> + Send;

    fn normalize_result(&self, raw: Self::Raw) -> NormalizedResult;

    fn supports_read_only_mode(&self) -> bool;

    /// Close the pool at shutdown.
    fn close(&self, pool: &Self::Pool) -> impl Future<Output = ()> + Send;
}

/// Rows and completion records collected from one `fetch_many` stream.
#[derive(Debug)]
pub struct StatementOutput<R, D> {
    pub rows: Vec<R>,
    pub results: Vec<D>,
}

impl<R, D> StatementOutput<R, D> {
    /// Split the interleaved stream items into rows and completions.
    pub fn collect(items: Vec<Either<D, R>>) -> Self {
        let mut rows = Vec::new();
        let mut results = Vec::new();
        for item in items {
            match item {
                Either::Left(done) => results.push(done),
                Either::Right(row) => rows.push(row),
            }
        }
        Self { rows, results }
    }
}

impl<R: RowToJson, D> StatementOutput<R, D> {
    /// Rows win when the statement produced any; otherwise the completion
    /// records are summarized by `acknowledge`.
    pub fn normalize_with(
        self,
        acknowledge: impl FnOnce(&[D]) -> NormalizedResult,
    ) -> NormalizedResult {
        if !self.rows.is_empty() {
            let rows = self.rows.iter().map(RowToJson::to_json_map).collect();
            return NormalizedResult::from_rows(rows);
        }
        if self.results.is_empty() {
            return NormalizedResult::empty();
        }
        acknowledge(&self.results)
    }
}

impl<R, D> Default for StatementOutput<R, D> {
    fn default() -> Self {
        Self {
            rows: Vec::new(),
            results: Vec::new(),
        }
    }
}
