use std::fmt;

use serde::Serialize;

use crate::core::{ColumnPresence, SchemaError, TableRef};

/// Step of a run at which an error occurred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Validate,
    Inspect,
    Begin,
    AddColumn,
    Normalize,
    SetDefault,
    SetNotNull,
    AddConstraint,
    Commit,
    Verify,
    Describe,
}

impl Step {
    pub fn as_str(&self) -> &'static str {
        match self {
            Step::Validate => "validate",
            Step::Inspect => "inspect",
            Step::Begin => "begin",
            Step::AddColumn => "add_column",
            Step::Normalize => "normalize",
            Step::SetDefault => "set_default",
            Step::SetNotNull => "set_not_null",
            Step::AddConstraint => "add_constraint",
            Step::Commit => "commit",
            Step::Verify => "verify",
            Step::Describe => "describe",
        }
    }

    /// Steps that run inside the migration transaction.
    pub fn is_transactional(&self) -> bool {
        matches!(
            self,
            Step::AddColumn
                | Step::Normalize
                | Step::SetDefault
                | Step::SetNotNull
                | Step::AddConstraint
                | Step::Commit
        )
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the open transaction after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RollbackStatus {
    /// No transaction was open.
    NotNeeded,
    /// The table is exactly as it was found.
    RolledBack,
    /// The table state is unknown and needs manual inspection.
    Failed,
}

impl fmt::Display for RollbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollbackStatus::NotNeeded => write!(f, "not needed"),
            RollbackStatus::RolledBack => write!(f, "rolled back"),
            RollbackStatus::Failed => write!(f, "FAILED"),
        }
    }
}

/// Failure of a runner operation, with enough context for an operator to
/// repair the table by hand.
#[derive(Debug)]
pub struct MigrationError {
    pub step: Step,
    pub table: TableRef,
    pub column: Option<String>,
    /// Column state observed before any change; `None` when the run failed
    /// before the column was inspected.
    pub pre_state: Option<ColumnPresence>,
    pub rollback: RollbackStatus,
    pub source: SchemaError,
}

pub type MigrationResult<T> = std::result::Result<T, MigrationError>;

impl MigrationError {
    pub fn new(step: Step, table: &TableRef, column: Option<&str>, source: SchemaError) -> Self {
        Self {
            step,
            table: table.clone(),
            column: column.map(str::to_string),
            pre_state: None,
            rollback: RollbackStatus::NotNeeded,
            source,
        }
    }

    pub fn with_pre_state(mut self, pre_state: ColumnPresence) -> Self {
        self.pre_state = Some(pre_state);
        self
    }

    pub fn with_rollback(mut self, rollback: RollbackStatus) -> Self {
        self.rollback = rollback;
        self
    }

    /// Failure kind of the underlying error, e.g. `constraint_violation`.
    pub fn kind(&self) -> &'static str {
        self.source.kind()
    }

    pub fn is_unrecoverable(&self) -> bool {
        self.source.is_unrecoverable()
    }

    pub fn target(&self) -> String {
        match &self.column {
            Some(column) => format!("{}.{}", self.table, column),
            None => self.table.to_string(),
        }
    }
}

impl fmt::Display for MigrationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "step '{}' failed on {}: {}", self.step, self.target(), self.source)?;
        if let Some(pre_state) = &self.pre_state {
            write!(f, " (before: {}", pre_state)?;
        } else {
            write!(f, " (before: unknown")?;
        }
        write!(f, "; rollback: {})", self.rollback)
    }
}

impl std::error::Error for MigrationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.source)
    }
}
