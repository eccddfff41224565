// ============================================================================
// Migration Module
// ============================================================================
//
// Idempotent add-column migrations:
//
//   MigrationPlan    validates the request without touching the database
//   MigrationRunner  inspects, applies the plan in one transaction, verifies
//   RunState         the run's state machine, for logs and outcomes
//
// ============================================================================

pub mod error;
pub mod outcome;
pub mod plan;
pub mod runner;
pub mod state;

pub use error::{MigrationError, MigrationResult, RollbackStatus, Step};
pub use outcome::{Finding, MigrationOutcome, VerificationSnapshot};
pub use plan::{ColumnSpec, MigrationPlan};
pub use runner::MigrationRunner;
pub use state::RunState;
