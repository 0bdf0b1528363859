//! Query-related data models.

use crate::models::WriteOperation;
use serde::Serialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeSet;
use std::fmt;

/// A row as returned to the caller: column name to JSON value.
pub type Row = Map<String, JsonValue>;

/// Kind of a single SQL statement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
    Delete,
    Create,
    Alter,
    Drop,
    Truncate,
    Other,
}

impl StatementKind {
    /// The write operation gating this kind, or `None` for reads.
    pub fn write_operation(&self) -> Option<WriteOperation> {
        match self {
            Self::Insert => Some(WriteOperation::Insert),
            Self::Update => Some(WriteOperation::Update),
            Self::Delete => Some(WriteOperation::Delete),
            Self::Create | Self::Alter | Self::Drop | Self::Truncate => Some(WriteOperation::Ddl),
            Self::Select | Self::Other => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Select => "SELECT",
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Create => "CREATE",
            Self::Alter => "ALTER",
            Self::Drop => "DROP",
            Self::Truncate => "TRUNCATE",
            Self::Other => "OTHER",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A write operation and the schema it lands in.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct WriteTarget {
    pub operation: WriteOperation,
    /// `None` means the default schema
    pub schema: Option<String>,
}

/// Statement kinds found in a SQL text plus the schemas they target.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct QueryClassification {
    pub kinds: BTreeSet<StatementKind>,
    /// First schema qualifier seen; `None` means the default schema
    pub schema: Option<String>,
    /// Every write operation paired with each schema it lands in. A batch
    /// writing to two schemas yields a target per schema.
    pub targets: BTreeSet<WriteTarget>,
}

impl QueryClassification {
    /// Classification of a single statement whose writes all land in `schema`.
    pub fn new(kinds: impl IntoIterator<Item = StatementKind>, schema: Option<String>) -> Self {
        let kinds: Vec<StatementKind> = kinds.into_iter().collect();
        let mut classification = Self::default();
        classification.record(&kinds, &[schema]);
        classification
    }

    /// Add one statement: its `kinds`, with every write kind landing in each
    /// of `schemas`. No schemas means the default schema.
    pub fn record(&mut self, kinds: &[StatementKind], schemas: &[Option<String>]) {
        let default = [None];
        let schemas = if schemas.is_empty() { &default[..] } else { schemas };
        for kind in kinds {
            self.kinds.insert(*kind);
            let Some(operation) = kind.write_operation() else {
                continue;
            };
            for schema in schemas {
                self.targets.insert(WriteTarget {
                    operation,
                    schema: schema.clone(),
                });
            }
        }
        if self.schema.is_none() {
            self.schema = schemas.iter().flatten().next().cloned();
        }
    }

    pub fn contains(&self, kind: StatementKind) -> bool {
        self.kinds.contains(&kind)
    }

    /// Write operations required by this statement, deduplicated and ordered.
    pub fn write_operations(&self) -> BTreeSet<WriteOperation> {
        self.kinds
            .iter()
            .filter_map(StatementKind::write_operation)
            .collect()
    }

    pub fn is_write(&self) -> bool {
        self.kinds.iter().any(|k| k.write_operation().is_some())
    }
}

/// Backend-neutral result shape.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct NormalizedResult {
    pub rows: Vec<Row>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub affected_rows: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_rows: Option<u64>,
}

impl NormalizedResult {
    /// Result of a statement that produced rows.
    pub fn from_rows(rows: Vec<Row>) -> Self {
        Self {
            rows,
            ..Self::default()
        }
    }

    /// Result of a write acknowledgment.
    pub fn acknowledgment(
        affected_rows: u64,
        insert_id: Option<u64>,
        changed_rows: Option<u64>,
    ) -> Self {
        Self {
            rows: Vec::new(),
            affected_rows: Some(affected_rows),
            insert_id,
            changed_rows,
        }
    }

    /// Result of an unrecognized shape.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// A single typed content block of a response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TextContent {
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub text: String,
}

impl TextContent {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            kind: "text",
            text: text.into(),
        }
    }
}

/// The only shape ever handed back to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseEnvelope {
    pub content: Vec<TextContent>,
    pub is_error: bool,
}

impl ResponseEnvelope {
    pub fn success(texts: impl IntoIterator<Item = String>) -> Self {
        Self {
            content: texts.into_iter().map(TextContent::text).collect(),
            is_error: false,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            content: vec![TextContent::text(text)],
            is_error: true,
        }
    }

    /// Text of the first content block.
    pub fn first_text(&self) -> Option<&str> {
        self.content.first().map(|c| c.text.as_str())
    }
}
