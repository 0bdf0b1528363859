//! Checked-out connection with explicit transaction state.

use crate::db::DbAdapter;
use crate::error::DbResult;
use tracing::{debug, warn};

/// Lifecycle of a checked-out connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Idle,
    TransactionOpen,
    ReadOnlySet,
    Executing,
    TransactionClosed,
    /// A statement was abandoned mid-flight; the session cannot be spoken to again
    Faulted,
}

/// A connection exclusively owned by one call.
///
/// Transaction control is idempotent: `begin` on an open transaction,
/// `commit`/`rollback` on a closed one and `unset_read_only` without a prior
/// `set_read_only` are no-ops. [`Connection::finish`] only returns the handle
/// to the pool when the transaction is closed, read-only mode is cleared and
/// no cleanup step failed; anything else is discarded.
pub struct Connection<H> {
    handle: H,
    state: ConnectionState,
    read_only: bool,
    poisoned: bool,
}

impl<H: Send + 'static> Connection<H> {
    pub fn new(handle: H) -> Self {
        Self {
            handle,
            state: ConnectionState::Idle,
            read_only: false,
            poisoned: false,
        }
    }

    pub fn state(&self) -> ConnectionState {
        self.state
    }

    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    /// Whether a cleanup step failed, leaving session state unknown.
    pub fn is_poisoned(&self) -> bool {
        self.poisoned
    }

    pub fn is_transaction_open(&self) -> bool {
        matches!(
            self.state,
            ConnectionState::TransactionOpen
                | ConnectionState::ReadOnlySet
                | ConnectionState::Executing
        )
    }

    pub async fn begin<A>(&mut self, adapter: &A) -> DbResult<()>
    where
        A: DbAdapter<Handle = H>,
    {
        if self.is_transaction_open() || self.state == ConnectionState::Faulted {
            return Ok(());
        }
        adapter.begin(&mut self.handle).await?;
        self.state = ConnectionState::TransactionOpen;
        debug!("Transaction opened");
        Ok(())
    }

    pub async fn set_read_only<A>(&mut self, adapter: &A) -> DbResult<()>
    where
        A: DbAdapter<Handle = H>,
    {
        // Recorded before the call so a partial failure still gets unset.
        self.read_only = true;
        adapter.set_read_only(&mut self.handle).await?;
        if self.is_transaction_open() {
            self.state = ConnectionState::ReadOnlySet;
        }
        debug!("Read-only mode set");
        Ok(())
    }

    pub async fn execute<A>(&mut self, adapter: &A, sql: &str) -> DbResult<A::Raw>
    where
        A: DbAdapter<Handle = H>,
    {
        let previous = self.state;
        self.state = ConnectionState::Executing;
        let result = adapter.execute(&mut self.handle, sql).await;
        self.state = previous;
        result
    }

    pub async fn commit<A>(&mut self, adapter: &A) -> DbResult<()>
    where
        A: DbAdapter<Handle = H>,
    {
        if !self.is_transaction_open() {
            return Ok(());
        }
        adapter.commit(&mut self.handle).await?;
        self.state = ConnectionState::TransactionClosed;
        debug!("Transaction committed");
        Ok(())
    }

    pub async fn rollback<A>(&mut self, adapter: &A) -> DbResult<()>
    where
        A: DbAdapter<Handle = H>,
    {
        if !self.is_transaction_open() {
            return Ok(());
        }
        match adapter.rollback(&mut self.handle).await {
            Ok(()) => {
                self.state = ConnectionState::TransactionClosed;
                debug!("Transaction rolled back");
                Ok(())
            }
            Err(e) => {
                self.poisoned = true;
                Err(e)
            }
        }
    }

    pub async fn unset_read_only<A>(&mut self, adapter: &A) -> DbResult<()>
    where
        A: DbAdapter<Handle = H>,
    {
        if !self.read_only || self.state == ConnectionState::Faulted {
            return Ok(());
        }
        // Cleared even on failure so it is attempted exactly once.
        self.read_only = false;
        if let Err(e) = adapter.unset_read_only(&mut self.handle).await {
            self.poisoned = true;
            return Err(e);
        }
        debug!("Read-only mode cleared");
        Ok(())
    }

    /// Abandon the session, e.g. after its statement timed out. Later
    /// transaction control becomes a no-op and the handle is discarded.
    pub fn mark_faulted(&mut self) {
        self.state = ConnectionState::Faulted;
    }

    /// Hand the connection back: released to the pool when clean, discarded otherwise.
    pub async fn finish<A>(self, adapter: &A)
    where
        A: DbAdapter<Handle = H>,
    {
        let clean = !self.poisoned
            && !self.read_only
            && matches!(
                self.state,
                ConnectionState::Idle | ConnectionState::TransactionClosed
            );
        if clean {
            adapter.release(self.handle);
        } else {
            warn!(
                state = ?self.state,
                read_only = self.read_only,
                poisoned = self.poisoned,
                "Discarding connection"
            );
            adapter.discard(self.handle).await;
        }
    }
}
