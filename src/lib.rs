//! SQL Bridge Library
//!
//! Executes raw SQL against MySQL, PostgreSQL or SQLite on behalf of MCP
//! clients. Every statement is classified, checked against a write
//! permission policy and run inside a transaction whose discipline depends
//! on whether it reads or writes. Callers always get a response envelope.

pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod mcp;
pub mod models;
pub mod tools;
pub mod transport;

pub use config::Config;
pub use db::{BackendAdapter, DbAdapter, ExecutionSettings, QueryExecutor, create_adapter};
pub use error::{DbError, DbResult};
pub use mcp::SqlService;
pub use models::ResponseEnvelope;
