//! Row decoding into JSON objects.
//!
//! MySQL and PostgreSQL columns are decoded by their declared type: the type
//! name picks a [`ColumnKind`], and the kind picks which Rust types are tried.
//! A value none of those types accepts (arrays, ranges, intervals, `inet`,
//! `money`) is returned as the text the server sent. SQLite columns are loosely
//! typed, so each value is decoded by its storage class instead.

use crate::models::{DatabaseType, Row};
use serde_json::Value as JsonValue;
use sqlx::mysql::{MySqlRow, MySqlTypeInfo, MySqlValueRef};
use sqlx::postgres::{PgRow, PgTypeInfo, PgValueRef};
use sqlx::sqlite::SqliteRow;
use sqlx::{Column, Decode, Row as _, Type, TypeInfo, ValueRef};
use tracing::warn;

/// What a declared column type decodes as.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnKind {
    Integer,
    Float,
    Decimal,
    Boolean,
    Temporal,
    Text,
    Binary,
    Json,
    Uuid,
    Other,
}

impl ColumnKind {
    /// Classify a declared type name such as `BIGINT UNSIGNED` or `timestamptz`.
    pub fn of(type_name: &str, backend: DatabaseType) -> Self {
        let name = type_name.to_ascii_lowercase();
        let name = name.as_str();

        match name {
            // Arrays (`INT4[]`, `_int4`), ranges and vectors carry an element
            // type name but are not scalars of that type.
            _ if name.ends_with("[]") || name.starts_with('_') => Self::Other,
            _ if name.ends_with("range") || name.ends_with("vector") => Self::Other,
            // Both contain "int"/"numeric"-like fragments but are not numbers.
            "interval" | "point" => Self::Other,
            "numeric" if backend == DatabaseType::SQLite => Self::Float,
            _ if name.contains("decimal") || name.contains("numeric") => Self::Decimal,
            _ if name.contains("int") || name.contains("serial") || name.contains("tiny") => {
                Self::Integer
            }
            "bool" | "boolean" => Self::Boolean,
            "real" => Self::Float,
            _ if name.contains("float") || name.contains("double") => Self::Float,
            "datetime" | "date" | "time" | "timetz" => Self::Temporal,
            _ if name.starts_with("timestamp") => Self::Temporal,
            "json" | "jsonb" => Self::Json,
            "uuid" => Self::Uuid,
            "bytea" => Self::Binary,
            _ if name.contains("blob") || name.contains("binary") => Self::Binary,
            "name" => Self::Text,
            _ if name.contains("char") || name.contains("text") => Self::Text,
            _ => Self::Other,
        }
    }
}

/// DECIMAL/NUMERIC kept as the server's own text so no precision is lost.
#[derive(Debug)]
pub struct DecimalText(pub String);

fn is_decimal_type(info: &impl TypeInfo) -> bool {
    let name = info.name().to_ascii_lowercase();
    name.contains("decimal") || name.contains("numeric")
}

macro_rules! decimal_text_for {
    ($db:ty, $info:ty, $value:ident) => {
        impl Type<$db> for DecimalText {
            fn type_info() -> $info {
                <String as Type<$db>>::type_info()
            }

            fn compatible(ty: &$info) -> bool {
                is_decimal_type(ty)
            }
        }

        impl<'r> Decode<'r, $db> for DecimalText {
            fn decode(value: $value<'r>) -> Result<Self, sqlx::error::BoxDynError> {
                <&str as Decode<$db>>::decode(value).map(|s| DecimalText(s.to_owned()))
            }
        }
    };
}

decimal_text_for!(sqlx::MySql, MySqlTypeInfo, MySqlValueRef);
decimal_text_for!(sqlx::Postgres, PgTypeInfo, PgValueRef);

/// Binary payloads: valid UTF-8 stays readable, anything else becomes base64.
pub fn binary_to_json(bytes: &[u8]) -> JsonValue {
    use base64::{Engine as _, engine::general_purpose::STANDARD};

    let text = match std::str::from_utf8(bytes) {
        Ok(s) => s.to_owned(),
        Err(_) => STANDARD.encode(bytes),
    };
    JsonValue::String(text)
}

/// JSON has no NaN or infinity, so those are rendered as text.
fn float_to_json(v: f64) -> JsonValue {
    match serde_json::Number::from_f64(v) {
        Some(n) => JsonValue::Number(n),
        None => JsonValue::String(v.to_string()),
    }
}

fn display_to_json<T: ToString>(v: T) -> JsonValue {
    JsonValue::String(v.to_string())
}

/// Text columns declared as JSON are embedded as structured values when they parse.
fn text_to_json(text: String, declared: &str) -> JsonValue {
    if declared.to_ascii_lowercase().contains("json") {
        if let Ok(parsed) = serde_json::from_str(&text) {
            return parsed;
        }
    }
    JsonValue::String(text)
}

/// Try each Rust type in order; the first one the column decodes as wins.
/// SQL NULL becomes JSON null. `None` when no listed type accepts the column.
macro_rules! first_decoded {
    ($row:expr, $idx:expr; $($ty:ty => $map:expr),+ $(,)?) => {{
        let mut decoded: Option<JsonValue> = None;
        $(
            if decoded.is_none() {
                if let Ok(cell) = $row.try_get::<Option<$ty>, _>($idx) {
                    decoded = Some(cell.map($map).unwrap_or(JsonValue::Null));
                }
            }
        )+
        decoded
    }};
}

/// Text form of a present value regardless of its declared type. Results of
/// `raw_sql` come back in the text protocol, so this is what the server sent.
macro_rules! untyped_text {
    ($row:expr, $idx:expr, $declared:expr) => {{
        match $row.try_get_raw($idx) {
            Ok(raw) if !raw.is_null() => match $row.try_get_unchecked::<String, _>($idx) {
                Ok(text) => JsonValue::String(text),
                Err(e) => {
                    warn!(
                        column = $idx,
                        declared = $declared,
                        error = %e,
                        "Column value could not be decoded"
                    );
                    JsonValue::Null
                }
            },
            _ => JsonValue::Null,
        }
    }};
}

macro_rules! temporal_value {
    ($row:expr, $idx:expr) => {{
        use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};
        first_decoded!($row, $idx;
            DateTime<Utc> => |t| JsonValue::String(t.to_rfc3339()),
            NaiveDateTime => display_to_json,
            NaiveDate => display_to_json,
            NaiveTime => display_to_json,
        )
    }};
}

/// Conversion of a backend row into a JSON object keyed by column name.
pub trait RowToJson {
    fn to_json_map(&self) -> Row;
}

/// Walk the columns of any sqlx row, decoding each with `value_at(ordinal, declared type)`.
fn object_from<R: sqlx::Row>(row: &R, value_at: impl Fn(usize, &str) -> JsonValue) -> Row {
    row.columns()
        .iter()
        .map(|col| {
            let value = value_at(col.ordinal(), col.type_info().name());
            (col.name().to_owned(), value)
        })
        .collect()
}

impl RowToJson for MySqlRow {
    fn to_json_map(&self) -> Row {
        object_from(self, |idx, declared| mysql_value(self, idx, declared))
    }
}

impl RowToJson for PgRow {
    fn to_json_map(&self) -> Row {
        object_from(self, |idx, declared| postgres_value(self, idx, declared))
    }
}

impl RowToJson for SqliteRow {
    fn to_json_map(&self) -> Row {
        object_from(self, |idx, declared| sqlite_value(self, idx, declared))
    }
}

fn mysql_value(row: &MySqlRow, idx: usize, declared: &str) -> JsonValue {
    mysql_typed_value(row, idx, declared).unwrap_or_else(|| untyped_text!(row, idx, declared))
}

fn mysql_typed_value(row: &MySqlRow, idx: usize, declared: &str) -> Option<JsonValue> {
    match ColumnKind::of(declared, DatabaseType::MySQL) {
        ColumnKind::Integer => first_decoded!(row, idx;
            i64 => JsonValue::from,
            u64 => JsonValue::from,
            i32 => JsonValue::from,
            i16 => JsonValue::from,
            i8 => JsonValue::from,
        ),
        ColumnKind::Float => first_decoded!(row, idx;
            f64 => float_to_json,
            f32 => |v| float_to_json(f64::from(v)),
        ),
        ColumnKind::Decimal => first_decoded!(row, idx; DecimalText => |d| JsonValue::String(d.0)),
        ColumnKind::Boolean => first_decoded!(row, idx; bool => JsonValue::Bool),
        ColumnKind::Temporal => temporal_value!(row, idx),
        ColumnKind::Binary => first_decoded!(row, idx; Vec<u8> => |b| binary_to_json(&b)),
        ColumnKind::Json => first_decoded!(row, idx; JsonValue => std::convert::identity),
        // YEAR, BIT, ENUM and SET land here and need the numeric/binary fallbacks.
        ColumnKind::Text | ColumnKind::Uuid | ColumnKind::Other => first_decoded!(row, idx;
            String => |s| text_to_json(s, declared),
            i64 => JsonValue::from,
            Vec<u8> => |b| binary_to_json(&b),
        ),
    }
}

fn postgres_value(row: &PgRow, idx: usize, declared: &str) -> JsonValue {
    postgres_typed_value(row, idx, declared).unwrap_or_else(|| untyped_text!(row, idx, declared))
}

fn postgres_typed_value(row: &PgRow, idx: usize, declared: &str) -> Option<JsonValue> {
    match ColumnKind::of(declared, DatabaseType::PostgreSQL) {
        ColumnKind::Integer => first_decoded!(row, idx;
            i64 => JsonValue::from,
            i32 => JsonValue::from,
            i16 => JsonValue::from,
        ),
        ColumnKind::Float => first_decoded!(row, idx;
            f64 => float_to_json,
            f32 => |v| float_to_json(f64::from(v)),
        ),
        ColumnKind::Decimal => first_decoded!(row, idx; DecimalText => |d| JsonValue::String(d.0)),
        ColumnKind::Boolean => first_decoded!(row, idx; bool => JsonValue::Bool),
        ColumnKind::Temporal => temporal_value!(row, idx),
        ColumnKind::Binary => first_decoded!(row, idx; Vec<u8> => |b| binary_to_json(&b)),
        ColumnKind::Json => first_decoded!(row, idx; JsonValue => std::convert::identity),
        ColumnKind::Uuid => first_decoded!(row, idx; uuid::Uuid => display_to_json),
        ColumnKind::Text | ColumnKind::Other => first_decoded!(row, idx; String => JsonValue::String),
    }
}

fn sqlite_value(row: &SqliteRow, idx: usize, declared: &str) -> JsonValue {
    let storage_class = match row.try_get_raw(idx) {
        Ok(raw) if raw.is_null() => return JsonValue::Null,
        Ok(raw) => raw.type_info().name().to_ascii_uppercase(),
        Err(_) => return JsonValue::Null,
    };

    let decoded = match storage_class.as_str() {
        "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(idx).map(JsonValue::from),
        "REAL" | "NUMERIC" => row.try_get::<f64, _>(idx).map(float_to_json),
        "BLOB" => row.try_get::<Vec<u8>, _>(idx).map(|b| binary_to_json(&b)),
        _ => row
            .try_get::<String, _>(idx)
            .map(|s| text_to_json(s, declared)),
    };
    decoded.unwrap_or(JsonValue::Null)
}
