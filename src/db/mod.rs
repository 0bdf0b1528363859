//! Database layer.
//!
//! - `adapter`: the contract every backend implements
//! - `mysql`, `postgres`, `sqlite`: the backends
//! - `factory`: backend selection and enum dispatch
//! - `connection`: transaction state of a checked-out connection
//! - `executor`: the execution engine
//! - `types`: row decoding to JSON

pub mod adapter;
pub mod connection;
pub mod executor;
pub mod factory;
#[macro_use]
pub mod macros;
pub mod mysql;
pub mod postgres;
pub mod sqlite;
pub mod types;

pub use adapter::{DbAdapter, StatementOutput};
pub use connection::{Connection, ConnectionState};
pub use executor::{ExecutionSettings, QueryExecutor};
pub use factory::{BackendAdapter, BackendHandle, BackendOutput, BackendPool, create_adapter};
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use sqlite::SqliteAdapter;
