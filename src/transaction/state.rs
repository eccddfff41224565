// ============================================================================
// Transaction State Management
// ============================================================================
//
// Lifecycle of an in-memory schema transaction:
//
//   Active ──commit──> Committed
//     │
//     └──rollback / drop──> Aborted
//
// ============================================================================

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use super::Change;
use crate::core::{Result, SchemaError};

static NEXT_TXN_ID: AtomicU64 = AtomicU64::new(1);

/// Unique identifier for a transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransactionId(pub u64);

impl TransactionId {
    pub fn next() -> Self {
        TransactionId(NEXT_TXN_ID.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "txn_{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionState {
    Active,
    Committed,
    Aborted,
}

impl TransactionState {
    pub fn is_active(&self) -> bool {
        matches!(self, TransactionState::Active)
    }
}

impl std::fmt::Display for TransactionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransactionState::Active => write!(f, "ACTIVE"),
            TransactionState::Committed => write!(f, "COMMITTED"),
            TransactionState::Aborted => write!(f, "ABORTED"),
        }
    }
}

/// Journal of an open transaction.
#[derive(Debug)]
pub struct TransactionJournal {
    id: TransactionId,
    state: TransactionState,
    changes: Vec<Change>,
    started: Instant,
}

impl TransactionJournal {
    pub fn begin() -> Self {
        Self {
            id: TransactionId::next(),
            state: TransactionState::Active,
            changes: Vec::new(),
            started: Instant::now(),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.id
    }

    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Record a change; only an active transaction accepts changes.
    pub fn record(&mut self, change: Change) -> Result<()> {
        self.ensure_active("record a change in")?;
        self.changes.push(change);
        Ok(())
    }

    /// Moves the journal into a terminal state and returns its record.
    ///
    /// Changes of an aborted transaction are kept in the record so that
    /// reports can show what was undone.
    pub fn finish(&mut self, state: TransactionState) -> Result<TransactionRecord> {
        self.ensure_active("finish")?;
        self.state = state;
        Ok(TransactionRecord {
            id: self.id,
            state,
            changes: std::mem::take(&mut self.changes),
            duration: self.started.elapsed(),
        })
    }

    fn ensure_active(&self, action: &str) -> Result<()> {
        if !self.state.is_active() {
            return Err(SchemaError::Execution(format!(
                "Cannot {} transaction {}: it is already {}",
                action, self.id, self.state
            )));
        }
        Ok(())
    }
}

/// Finished transaction, kept in the in-memory database history.
#[derive(Debug, Clone)]
pub struct TransactionRecord {
    pub id: TransactionId,
    pub state: TransactionState,
    pub changes: Vec<Change>,
    pub duration: Duration,
}

impl TransactionRecord {
    pub fn is_committed(&self) -> bool {
        self.state == TransactionState::Committed
    }
}
