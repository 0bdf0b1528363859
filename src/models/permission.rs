//! Permission policy models.

use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt;

/// Write operation categories that the policy can allow or deny.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WriteOperation {
    Insert,
    Update,
    Delete,
    /// CREATE, ALTER, DROP and TRUNCATE
    Ddl,
}

impl WriteOperation {
    pub const ALL: [WriteOperation; 4] = [Self::Insert, Self::Update, Self::Delete, Self::Ddl];

    pub fn label(&self) -> &'static str {
        match self {
            Self::Insert => "INSERT",
            Self::Update => "UPDATE",
            Self::Delete => "DELETE",
            Self::Ddl => "DDL",
        }
    }

    /// Environment variable holding the global flag for this operation.
    pub fn global_env_var(&self) -> &'static str {
        match self {
            Self::Insert => "ALLOW_INSERT_OPERATION",
            Self::Update => "ALLOW_UPDATE_OPERATION",
            Self::Delete => "ALLOW_DELETE_OPERATION",
            Self::Ddl => "ALLOW_DDL_OPERATION",
        }
    }

    /// Environment variable holding the per-schema overrides for this operation.
    pub fn schema_env_var(&self) -> &'static str {
        match self {
            Self::Insert => "SCHEMA_INSERT_PERMISSIONS",
            Self::Update => "SCHEMA_UPDATE_PERMISSIONS",
            Self::Delete => "SCHEMA_DELETE_PERMISSIONS",
            Self::Ddl => "SCHEMA_DDL_PERMISSIONS",
        }
    }
}

impl fmt::Display for WriteOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Global allow flags, one per write operation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct OperationFlags {
    pub insert: bool,
    pub update: bool,
    pub delete: bool,
    pub ddl: bool,
}

impl OperationFlags {
    pub fn all_allowed() -> Self {
        Self {
            insert: true,
            update: true,
            delete: true,
            ddl: true,
        }
    }

    pub fn get(&self, op: WriteOperation) -> bool {
        match op {
            WriteOperation::Insert => self.insert,
            WriteOperation::Update => self.update,
            WriteOperation::Delete => self.delete,
            WriteOperation::Ddl => self.ddl,
        }
    }
}

/// Per-schema overrides. `None` means "not set, use the global flag".
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SchemaOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub insert: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delete: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ddl: Option<bool>,
}

impl SchemaOverrides {
    pub fn get(&self, op: WriteOperation) -> Option<bool> {
        match op {
            WriteOperation::Insert => self.insert,
            WriteOperation::Update => self.update,
            WriteOperation::Delete => self.delete,
            WriteOperation::Ddl => self.ddl,
        }
    }

    pub fn set(&mut self, op: WriteOperation, allowed: bool) {
        let slot = match op {
            WriteOperation::Insert => &mut self.insert,
            WriteOperation::Update => &mut self.update,
            WriteOperation::Delete => &mut self.delete,
            WriteOperation::Ddl => &mut self.ddl,
        };
        *slot = Some(allowed);
    }
}

/// Process-wide permission policy, loaded once at startup.
#[derive(Debug, Clone, Default, Serialize)]
pub struct PermissionPolicy {
    pub global: OperationFlags,
    pub per_schema: BTreeMap<String, SchemaOverrides>,
    /// Blocks every write kind regardless of the other flags
    pub read_only_mode: bool,
    /// Opt-in for writes when no database is bound
    pub multi_db_write_allowed: bool,
}

impl PermissionPolicy {
    /// Add a schema override.
    pub fn with_schema_override(
        mut self,
        schema: impl Into<String>,
        op: WriteOperation,
        allowed: bool,
    ) -> Self {
        self.per_schema
            .entry(schema.into())
            .or_default()
            .set(op, allowed);
        self
    }

    /// Explicit override for `schema`, if one was configured.
    pub fn schema_override(&self, schema: &str, op: WriteOperation) -> Option<bool> {
        self.per_schema.get(schema).and_then(|o| o.get(op))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_override_lookup() {
        let policy = PermissionPolicy::default()
            .with_schema_override("test_db", WriteOperation::Insert, true)
            .with_schema_override("test_db", WriteOperation::Delete, false);

        assert_eq!(
            policy.schema_override("test_db", WriteOperation::Insert),
            Some(true)
        );
        assert_eq!(
            policy.schema_override("test_db", WriteOperation::Delete),
            Some(false)
        );
        assert_eq!(policy.schema_override("test_db", WriteOperation::Update), None);
        assert_eq!(policy.schema_override("other", WriteOperation::Insert), None);
    }

    #[test]
    fn test_env_var_names() {
        assert_eq!(
            WriteOperation::Ddl.global_env_var(),
            "ALLOW_DDL_OPERATION"
        );
        assert_eq!(
            WriteOperation::Update.schema_env_var(),
            "SCHEMA_UPDATE_PERMISSIONS"
        );
    }
}
