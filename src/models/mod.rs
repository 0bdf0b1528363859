//! Data models for the SQL bridge.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod permission;
pub mod query;

// Re-export commonly used types
pub use connection::{ConnectionConfig, DatabaseType, TlsConfig};
pub use permission::{OperationFlags, PermissionPolicy, SchemaOverrides, WriteOperation};
pub use query::{
    NormalizedResult, QueryClassification, ResponseEnvelope, Row, StatementKind, TextContent,
    WriteTarget,
};
