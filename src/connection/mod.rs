pub mod config;
pub mod postgres;
pub mod sql;

use async_trait::async_trait;

use crate::core::{
    CheckConstraint, ColumnInfo, ConstraintInfo, DataType, Result, TableRef, Value, ValueCount,
};

pub use config::MigratorConfig;
pub use postgres::PgDatabase;

/// Database connection handle the runner is driven through.
///
/// Implementations own exactly one connection; the runner never shares it.
/// Reads report a missing table as `SchemaError::TableNotFound` and never
/// as an absent column.
#[async_trait]
pub trait Database: Send + Sync {
    /// All columns of `table`, in ordinal order.
    async fn describe_table(&self, table: &TableRef) -> Result<Vec<ColumnInfo>>;

    /// A single column, or `None` when the table has no such column.
    async fn column_info(&self, table: &TableRef, column: &str) -> Result<Option<ColumnInfo>>;

    /// CHECK constraints on `table` whose definition text mentions `column`.
    async fn check_constraints(&self, table: &TableRef, column: &str)
        -> Result<Vec<ConstraintInfo>>;

    /// Row count per distinct value of `column`, NULL included.
    async fn value_counts(&self, table: &TableRef, column: &str) -> Result<Vec<ValueCount>>;

    async fn row_count(&self, table: &TableRef) -> Result<u64>;

    /// Opens a transaction. Dropping it without `commit` rolls it back.
    async fn begin(&mut self) -> Result<Box<dyn SchemaTransaction + '_>>;
}

/// Schema and data mutations executed inside one database transaction.
#[async_trait]
pub trait SchemaTransaction: Send {
    /// Adds a nullable column without a default.
    async fn add_column(&mut self, table: &TableRef, column: &str, data_type: &DataType)
        -> Result<()>;

    /// Sets every NULL or empty-string value of `column` to `value`.
    /// Returns the number of rows rewritten.
    async fn normalize_empty(&mut self, table: &TableRef, column: &str, value: &Value)
        -> Result<u64>;

    async fn set_column_default(&mut self, table: &TableRef, column: &str, value: &Value)
        -> Result<()>;

    async fn set_not_null(&mut self, table: &TableRef, column: &str) -> Result<()>;

    /// Installs `check`; fails with `ConstraintViolation` if a row violates it.
    async fn add_check_constraint(&mut self, table: &TableRef, check: &CheckConstraint)
        -> Result<()>;

    async fn commit(self: Box<Self>) -> Result<()>;

    async fn rollback(self: Box<Self>) -> Result<()>;
}
