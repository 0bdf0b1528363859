//! SQL analysis, permission checks and tool handlers.
//!
//! - `sql_classifier`: statement kinds and target schema of raw SQL
//! - `guard`: write permission evaluation
//! - `format`: response envelopes for results
//! - `execute`: the `execute_sql` and `show_permissions` handlers

pub mod execute;
pub mod format;
pub mod guard;
pub mod sql_classifier;

pub use execute::{ExecuteSqlInput, ExecuteToolHandler, PermissionsReport};
pub use guard::{DenialReason, PermissionDenial, PermissionGuard};
pub use sql_classifier::classify;
