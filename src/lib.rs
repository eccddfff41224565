// ============================================================================
// column-migrator Library
// ============================================================================
//
// Idempotent, transactional add-column migrations with catalog verification.
//
//   core         errors, values and catalog types
//   connection   Database / SchemaTransaction seams, PostgreSQL backend
//   storage      in-memory backend with fault injection
//   transaction  bookkeeping of in-memory transactions
//   migration    plan, runner, outcomes
//   result       operator-facing report
//
// ============================================================================

pub mod connection;
pub mod core;
pub mod migration;
pub mod result;
pub mod storage;
pub mod transaction;

pub use connection::{Database, MigratorConfig, PgDatabase, SchemaTransaction};
pub use crate::core::{ColumnPresence, Result, SchemaError, TableDescriptor, TableRef, Value};
pub use migration::{
    ColumnSpec, Finding, MigrationError, MigrationOutcome, MigrationPlan, MigrationResult,
    MigrationRunner, RollbackStatus, RunState, Step, VerificationSnapshot,
};
pub use result::{BufferSink, ConsoleSink, LogSink, NullSink, ReportSink, ReportTable};
pub use storage::{FaultPoint, MemoryDatabase};
