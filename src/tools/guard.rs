//! Write permission guard.
//!
//! Resolves whether each write target of a classified statement (an
//! operation and the schema it lands in) may run. Resolution order per target:
//!
//! 1. Multi-database mode without `MULTI_DB_WRITE_MODE` denies every write
//! 2. A schema override (`SCHEMA_<OP>_PERMISSIONS`) for the target schema
//! 3. The global flag (`ALLOW_<OP>_OPERATION`)
//!
//! A statement, or a whole batch, is denied when any of its targets is denied.

use crate::error::DbError;
use crate::models::{PermissionPolicy, QueryClassification, WriteOperation};
use std::fmt;

/// Why a write was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DenialReason {
    ReadOnlyMode,
    MultiDatabase,
    Policy,
}

/// A refused write operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PermissionDenial {
    pub operation: WriteOperation,
    pub schema: Option<String>,
    pub reason: DenialReason,
}

impl PermissionDenial {
    fn schema_label(&self) -> &str {
        self.schema.as_deref().unwrap_or("default")
    }

    /// Explanation naming the operation, the schema and the variable to change.
    pub fn message(&self) -> String {
        let op = self.operation.label();
        match self.reason {
            DenialReason::ReadOnlyMode => format!(
                "{} operations are blocked because DB_READ_ONLY_MODE is enabled. Set DB_READ_ONLY_MODE=false to allow writes.",
                op
            ),
            DenialReason::MultiDatabase => format!(
                "{} operations are not allowed in multi-database mode. Set MULTI_DB_WRITE_MODE=true to enable writes across schemas.",
                op
            ),
            DenialReason::Policy => format!(
                "{} operations are not allowed for schema '{}'. Set {}=true or add '{}:true' to {} to enable.",
                op,
                self.schema_label(),
                self.operation.global_env_var(),
                self.schema_label(),
                self.operation.schema_env_var()
            ),
        }
    }
}

impl fmt::Display for PermissionDenial {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message())
    }
}

impl From<PermissionDenial> for DbError {
    fn from(denial: PermissionDenial) -> Self {
        DbError::permission(denial.operation.label(), denial.message())
    }
}

/// Evaluates classified statements against the permission policy.
#[derive(Debug, Clone)]
pub struct PermissionGuard {
    policy: PermissionPolicy,
    /// Database bound at the connection level; `None` means multi-database mode
    default_schema: Option<String>,
}

impl PermissionGuard {
    pub fn new(policy: PermissionPolicy, default_schema: Option<String>) -> Self {
        Self {
            policy,
            default_schema,
        }
    }

    pub fn policy(&self) -> &PermissionPolicy {
        &self.policy
    }

    pub fn default_schema(&self) -> Option<&str> {
        self.default_schema.as_deref()
    }

    pub fn is_multi_database(&self) -> bool {
        self.default_schema.is_none()
    }

    /// Schema a statement effectively targets.
    pub fn target_schema<'a>(&'a self, classification: &'a QueryClassification) -> Option<&'a str> {
        classification
            .schema
            .as_deref()
            .or(self.default_schema.as_deref())
    }

    /// Whether `op` may run against `schema` (`None` = default schema).
    pub fn is_allowed(&self, op: WriteOperation, schema: Option<&str>) -> bool {
        self.resolve(op, schema).is_none()
    }

    fn resolve(&self, op: WriteOperation, schema: Option<&str>) -> Option<DenialReason> {
        if self.is_multi_database() && !self.policy.multi_db_write_allowed {
            return Some(DenialReason::MultiDatabase);
        }

        let target = schema.or(self.default_schema.as_deref());
        let allowed = target
            .and_then(|s| self.policy.schema_override(s, op))
            .unwrap_or_else(|| self.policy.global.get(op));

        if allowed {
            None
        } else {
            Some(DenialReason::Policy)
        }
    }

    /// Refuse any write while read-only mode is on.
    pub fn check_read_only(
        &self,
        classification: &QueryClassification,
    ) -> Result<(), PermissionDenial> {
        if !self.policy.read_only_mode {
            return Ok(());
        }
        match classification.targets.iter().next() {
            Some(target) => Err(PermissionDenial {
                operation: target.operation,
                schema: target
                    .schema
                    .as_deref()
                    .or(self.default_schema.as_deref())
                    .map(String::from),
                reason: DenialReason::ReadOnlyMode,
            }),
            None => Ok(()),
        }
    }

    /// Check every write target against its own schema; the first denial wins.
    pub fn check(&self, classification: &QueryClassification) -> Result<(), PermissionDenial> {
        for target in &classification.targets {
            let schema = target.schema.as_deref().or(self.default_schema.as_deref());
            if let Some(reason) = self.resolve(target.operation, schema) {
                return Err(PermissionDenial {
                    operation: target.operation,
                    schema: schema.map(String::from),
                    reason,
                });
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{OperationFlags, StatementKind};

    fn insert_into(schema: Option<&str>) -> QueryClassification {
        QueryClassification::new([StatementKind::Insert], schema.map(String::from))
    }

    #[test]
    fn test_schema_override_beats_global() {
        let policy = PermissionPolicy::default().with_schema_override(
            "test_db",
            WriteOperation::Insert,
            true,
        );
        let guard = PermissionGuard::new(policy, Some("main".to_string()));

        assert!(guard.check(&insert_into(Some("test_db"))).is_ok());

        let denial = guard.check(&insert_into(Some("other_db"))).unwrap_err();
        assert_eq!(denial.reason, DenialReason::Policy);
        assert_eq!(denial.schema.as_deref(), Some("other_db"));
    }

    #[test]
    fn test_schema_override_can_deny_when_global_allows() {
        let policy = PermissionPolicy {
            global: OperationFlags::all_allowed(),
            ..PermissionPolicy::default()
        }
        .with_schema_override("prod", WriteOperation::Delete, false);
        let guard = PermissionGuard::new(policy, Some("prod".to_string()));

        let delete = QueryClassification::new([StatementKind::Delete], None);
        assert!(guard.check(&delete).is_err());
        let update = QueryClassification::new([StatementKind::Update], None);
        assert!(guard.check(&update).is_ok());
    }

    #[test]
    fn test_unqualified_statement_uses_default_schema_override() {
        let policy =
            PermissionPolicy::default().with_schema_override("app", WriteOperation::Insert, true);
        let guard = PermissionGuard::new(policy, Some("app".to_string()));
        assert!(guard.check(&insert_into(None)).is_ok());
    }

    #[test]
    fn test_multi_database_denies_regardless_of_flags() {
        let policy = PermissionPolicy {
            global: OperationFlags::all_allowed(),
            ..PermissionPolicy::default()
        }
        .with_schema_override("test_db", WriteOperation::Insert, true);
        let guard = PermissionGuard::new(policy, None);

        let denial = guard.check(&insert_into(Some("test_db"))).unwrap_err();
        assert_eq!(denial.reason, DenialReason::MultiDatabase);
        assert!(denial.message().contains("MULTI_DB_WRITE_MODE"));
    }

    #[test]
    fn test_multi_database_opt_in() {
        let policy = PermissionPolicy {
            global: OperationFlags::all_allowed(),
            multi_db_write_allowed: true,
            ..PermissionPolicy::default()
        };
        let guard = PermissionGuard::new(policy, None);
        assert!(guard.check(&insert_into(Some("any"))).is_ok());
    }

    #[test]
    fn test_any_denied_kind_denies_statement() {
        let policy = PermissionPolicy {
            global: OperationFlags {
                insert: true,
                ..OperationFlags::default()
            },
            ..PermissionPolicy::default()
        };
        let guard = PermissionGuard::new(policy, Some("db".to_string()));
        let mixed = QueryClassification::new([StatementKind::Insert, StatementKind::Create], None);

        let denial = guard.check(&mixed).unwrap_err();
        assert_eq!(denial.operation, WriteOperation::Ddl);
    }

    #[test]
    fn test_batch_denied_when_one_schema_is_denied() {
        let policy = PermissionPolicy::default().with_schema_override(
            "test_db",
            WriteOperation::Insert,
            true,
        );
        let guard = PermissionGuard::new(policy, Some("test_db".to_string()));

        let mut batch = insert_into(Some("test_db"));
        assert!(guard.check(&batch).is_ok());

        batch.record(&[StatementKind::Insert], &[Some("prod".to_string())]);
        let denial = guard.check(&batch).unwrap_err();
        assert_eq!(denial.operation, WriteOperation::Insert);
        assert_eq!(denial.schema.as_deref(), Some("prod"));
    }

    #[test]
    fn test_reads_always_pass() {
        let guard = PermissionGuard::new(PermissionPolicy::default(), None);
        let select = QueryClassification::new([StatementKind::Select], None);
        assert!(guard.check(&select).is_ok());
        assert!(guard.check_read_only(&select).is_ok());
    }

    #[test]
    fn test_read_only_mode_message() {
        let policy = PermissionPolicy {
            global: OperationFlags::all_allowed(),
            read_only_mode: true,
            ..PermissionPolicy::default()
        };
        let guard = PermissionGuard::new(policy, Some("db".to_string()));
        let update = QueryClassification::new([StatementKind::Update], None);

        let denial = guard.check_read_only(&update).unwrap_err();
        assert_eq!(denial.reason, DenialReason::ReadOnlyMode);
        assert!(denial.message().contains("DB_READ_ONLY_MODE"));
    }

    #[test]
    fn test_policy_message_names_variables() {
        let guard = PermissionGuard::new(PermissionPolicy::default(), Some("shop".to_string()));
        let denial = guard.check(&insert_into(None)).unwrap_err();
        let message = denial.message();
        assert!(message.contains("INSERT"));
        assert!(message.contains("'shop'"));
        assert!(message.contains("ALLOW_INSERT_OPERATION"));
        assert!(message.contains("SCHEMA_INSERT_PERMISSIONS"));
    }

    #[test]
    fn test_denial_converts_to_permission_error() {
        let guard = PermissionGuard::new(PermissionPolicy::default(), Some("shop".to_string()));
        let err: DbError = guard.check(&insert_into(None)).unwrap_err().into();
        assert!(matches!(err, DbError::Permission { .. }));
        assert!(err.envelope_message().starts_with("Error: INSERT operations"));
    }
}
