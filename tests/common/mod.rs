//! Shared test fixtures: a recording in-memory adapter and executor builders.

#![allow(dead_code)]

use sql_bridge::db::{DbAdapter, ExecutionSettings, QueryExecutor};
use sql_bridge::error::{DbError, DbResult};
use sql_bridge::models::{
    ConnectionConfig, DatabaseType, NormalizedResult, OperationFlags, PermissionPolicy, Row,
};
use sql_bridge::tools::PermissionGuard;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Acquire,
    Begin,
    SetReadOnly,
    Execute,
    Commit,
    Rollback,
    UnsetReadOnly,
    Release,
    Discard,
}

/// What the mock backend hands back from `execute`.
#[derive(Debug, Clone)]
pub enum MockOutput {
    Rows(Vec<Row>),
    Ack { affected: u64, insert_id: Option<u64> },
}

/// Knobs for the recording adapter. Everything succeeds by default.
#[derive(Debug, Clone)]
pub struct Behavior {
    pub supports_read_only: bool,
    pub output: MockOutput,
    pub fail_pool: bool,
    pub fail_acquire: bool,
    pub fail_set_read_only: bool,
    pub fail_execute: Option<String>,
    pub fail_commit: bool,
    pub fail_rollback: bool,
    pub fail_unset_read_only: bool,
    pub pool_delay: Option<Duration>,
    pub execute_delay: Option<Duration>,
}

impl Default for Behavior {
    fn default() -> Self {
        Self {
            supports_read_only: true,
            output: MockOutput::Rows(vec![row(&[("1", serde_json::json!(1))])]),
            fail_pool: false,
            fail_acquire: false,
            fail_set_read_only: false,
            fail_execute: None,
            fail_commit: false,
            fail_rollback: false,
            fail_unset_read_only: false,
            pool_delay: None,
            execute_delay: None,
        }
    }
}

pub fn row(columns: &[(&str, serde_json::Value)]) -> Row {
    columns
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}

/// Adapter that records every call it receives.
#[derive(Clone, Default)]
pub struct RecordingAdapter {
    pub behavior: Behavior,
    events: Arc<Mutex<Vec<Event>>>,
    pools_created: Arc<AtomicUsize>,
    next_handle: Arc<AtomicU64>,
}

impl RecordingAdapter {
    pub fn new(behavior: Behavior) -> Self {
        Self {
            behavior,
            ..Self::default()
        }
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push(event);
    }

    pub fn events(&self) -> Vec<Event> {
        self.events.lock().unwrap().clone()
    }

    pub fn count(&self, event: Event) -> usize {
        self.events().iter().filter(|e| **e == event).count()
    }

    pub fn pools_created(&self) -> usize {
        self.pools_created.load(Ordering::SeqCst)
    }

    fn fail(message: &str) -> DbError {
        DbError::database(message, None, "mock failure")
    }
}

impl DbAdapter for RecordingAdapter {
    type Pool = ();
    type Handle = u64;
    type Raw = MockOutput;

    fn database_type(&self) -> DatabaseType {
        DatabaseType::MySQL
    }

    async fn create_pool(&self, _config: &ConnectionConfig) -> DbResult<()> {
        self.pools_created.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.behavior.pool_delay {
            tokio::time::sleep(delay).await;
        }
        if self.behavior.fail_pool {
            return Err(DbError::connection("backend unreachable", "start it"));
        }
        Ok(())
    }

    async fn acquire(&self, _pool: &()) -> DbResult<u64> {
        if self.behavior.fail_acquire {
            return Err(DbError::connection("pool exhausted", "retry"));
        }
        self.record(Event::Acquire);
        Ok(self.next_handle.fetch_add(1, Ordering::SeqCst))
    }

    async fn begin(&self, _handle: &mut u64) -> DbResult<()> {
        self.record(Event::Begin);
        Ok(())
    }

    async fn commit(&self, _handle: &mut u64) -> DbResult<()> {
        self.record(Event::Commit);
        if self.behavior.fail_commit {
            return Err(Self::fail("commit failed"));
        }
        Ok(())
    }

    async fn rollback(&self, _handle: &mut u64) -> DbResult<()> {
        self.record(Event::Rollback);
        if self.behavior.fail_rollback {
            return Err(Self::fail("rollback failed"));
        }
        Ok(())
    }

    async fn set_read_only(&self, _handle: &mut u64) -> DbResult<()> {
        self.record(Event::SetReadOnly);
        if self.behavior.fail_set_read_only {
            return Err(Self::fail("cannot set read only"));
        }
        Ok(())
    }

    async fn unset_read_only(&self, _handle: &mut u64) -> DbResult<()> {
        self.record(Event::UnsetReadOnly);
        if self.behavior.fail_unset_read_only {
            return Err(Self::fail("cannot unset read only"));
        }
        Ok(())
    }

    async fn execute(&self, _handle: &mut u64, _sql: &str) -> DbResult<MockOutput> {
        self.record(Event::Execute);
        if let Some(delay) = self.behavior.execute_delay {
            tokio::time::sleep(delay).await;
        }
        match &self.behavior.fail_execute {
            Some(message) => Err(Self::fail(message)),
            None => Ok(self.behavior.output.clone()),
        }
    }

    fn release(&self, _handle: u64) {
        self.record(Event::Release);
    }

    async fn discard(&self, _handle: u64) {
        self.record(Event::Discard);
    }

    fn normalize_result(&self, raw: MockOutput) -> NormalizedResult {
        match raw {
            MockOutput::Rows(rows) => NormalizedResult::from_rows(rows),
            MockOutput::Ack {
                affected,
                insert_id,
            } => NormalizedResult::acknowledgment(affected, insert_id, None),
        }
    }

    fn supports_read_only_mode(&self) -> bool {
        self.behavior.supports_read_only
    }

    async fn close(&self, _pool: &()) {}
}

pub fn allow_all() -> PermissionPolicy {
    PermissionPolicy {
        global: OperationFlags::all_allowed(),
        ..PermissionPolicy::default()
    }
}

/// Executor over a recording adapter bound to database `app`.
pub fn executor(
    behavior: Behavior,
    policy: PermissionPolicy,
) -> (QueryExecutor<RecordingAdapter>, RecordingAdapter) {
    executor_with(behavior, policy, Some("app"), ExecutionSettings::default())
}

pub fn executor_with(
    behavior: Behavior,
    policy: PermissionPolicy,
    database: Option<&str>,
    settings: ExecutionSettings,
) -> (QueryExecutor<RecordingAdapter>, RecordingAdapter) {
    let adapter = RecordingAdapter::new(behavior);
    let config = ConnectionConfig {
        database: database.map(String::from),
        ..ConnectionConfig::default()
    };
    let guard = PermissionGuard::new(policy, config.database.clone());
    let executor = QueryExecutor::new(adapter.clone(), config, guard, settings);
    (executor, adapter)
}
