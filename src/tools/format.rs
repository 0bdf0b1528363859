//! Response normalizer.
//!
//! Turns a [`NormalizedResult`] into the text blocks of a [`ResponseEnvelope`]:
//! a summary (or the rows as pretty JSON) followed by the execution time.

use crate::models::{NormalizedResult, ResponseEnvelope, Row, WriteOperation};
use std::time::Duration;

/// Timing entry, in milliseconds with two decimals.
pub fn format_elapsed(elapsed: Duration) -> String {
    format!(
        "Query execution time: {:.2} ms",
        elapsed.as_secs_f64() * 1000.0
    )
}

pub fn format_rows(rows: &[Row]) -> String {
    serde_json::to_string_pretty(rows).unwrap_or_else(|_| "[]".to_string())
}

/// Human-readable summary of a write acknowledgment.
pub fn write_summary(result: &NormalizedResult, op: WriteOperation, schema: &str) -> String {
    let affected = result.affected_rows.unwrap_or(0);
    match op {
        WriteOperation::Insert => format!(
            "Insert successful on schema '{}'. Affected rows: {}, Last insert ID: {}",
            schema,
            affected,
            result.insert_id.unwrap_or(0)
        ),
        WriteOperation::Update => format!(
            "Update successful on schema '{}'. Affected rows: {}, Changed rows: {}",
            schema,
            affected,
            result.changed_rows.unwrap_or(affected)
        ),
        WriteOperation::Delete => format!(
            "Delete successful on schema '{}'. Affected rows: {}",
            schema, affected
        ),
        WriteOperation::Ddl => format!("DDL operation successful on schema '{}'.", schema),
    }
}

/// Envelope for a committed write.
///
/// Statements that return rows (`RETURNING`, or a trailing `SELECT` in a
/// batch) show the rows instead of the summary.
pub fn format_write_response(
    result: &NormalizedResult,
    op: WriteOperation,
    schema: Option<&str>,
    elapsed: Duration,
) -> ResponseEnvelope {
    let body = if result.rows.is_empty() {
        write_summary(result, op, schema.unwrap_or("default"))
    } else {
        format_rows(&result.rows)
    };
    ResponseEnvelope::success([body, format_elapsed(elapsed)])
}

/// Envelope for a read: the rows as a pretty-printed JSON array.
pub fn format_read_response(result: &NormalizedResult, elapsed: Duration) -> ResponseEnvelope {
    ResponseEnvelope::success([format_rows(&result.rows), format_elapsed(elapsed)])
}
