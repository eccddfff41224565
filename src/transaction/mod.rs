// ============================================================================
// Transaction Module
// ============================================================================
//
// Bookkeeping for in-memory schema transactions. Isolation itself comes from
// the storage layer: a transaction holds the catalog write lock and mutates a
// copy-on-write working catalog that replaces the committed one on commit.
//
// ============================================================================

pub mod change;
pub mod state;

pub use change::Change;
pub use state::{TransactionId, TransactionJournal, TransactionRecord, TransactionState};
