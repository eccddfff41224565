use thiserror::Error;

/// Failure kinds reported by catalog reads, DDL and data normalization.
///
/// An already-present column is not an error: the runner reports it as a
/// normal outcome.
#[derive(Error, Debug)]
pub enum SchemaError {
    #[error("Connectivity error: {0}")]
    Connectivity(String),

    #[error("Permission denied: {0}")]
    Permission(String),

    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    #[error("Schema conflict: {0}")]
    SchemaConflict(String),

    #[error("Table '{0}' not found")]
    TableNotFound(String),

    #[error("Invalid column specification: {0}")]
    InvalidSpec(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Execution error: {0}")]
    Execution(String),

    #[error("Unrecoverable state: {original}; rollback also failed: {rollback}")]
    Unrecoverable {
        original: Box<SchemaError>,
        rollback: Box<SchemaError>,
    },
}

impl SchemaError {
    /// Short machine-readable name of the failure kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Connectivity(_) => "connectivity",
            Self::Permission(_) => "permission",
            Self::ConstraintViolation(_) => "constraint_violation",
            Self::SchemaConflict(_) => "schema_conflict",
            Self::TableNotFound(_) => "table_not_found",
            Self::InvalidSpec(_) => "invalid_spec",
            Self::Config(_) => "config",
            Self::Execution(_) => "execution",
            Self::Unrecoverable { .. } => "unrecoverable_state",
        }
    }

    pub fn is_unrecoverable(&self) -> bool {
        matches!(self, Self::Unrecoverable { .. })
    }

    pub fn unrecoverable(original: SchemaError, rollback: SchemaError) -> Self {
        Self::Unrecoverable {
            original: Box::new(original),
            rollback: Box::new(rollback),
        }
    }
}

pub type Result<T> = std::result::Result<T, SchemaError>;

impl<T> From<std::sync::PoisonError<T>> for SchemaError {
    fn from(err: std::sync::PoisonError<T>) -> Self {
        Self::Execution(format!("lock poisoned: {}", err))
    }
}
