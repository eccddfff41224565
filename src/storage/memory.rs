use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use tokio::sync::{OwnedRwLockWriteGuard, RwLock};

use super::{Catalog, ColumnDef, Table};
use crate::connection::{Database, SchemaTransaction};
use crate::core::{
    CheckConstraint, ColumnInfo, ConstraintInfo, DataType, Result, Row, SchemaError, TableRef,
    Value, ValueCount,
};
use crate::transaction::{Change, TransactionJournal, TransactionRecord, TransactionState};

/// Points inside a transaction where a failure can be injected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Begin,
    AddColumn,
    Normalize,
    SetDefault,
    SetNotNull,
    AddConstraint,
    Commit,
    Rollback,
}

#[derive(Debug, Default)]
struct Control {
    /// One-shot failures, consumed when the point is reached.
    faults: HashMap<FaultPoint, SchemaError>,
    /// One-shot delays, consumed like faults.
    delays: HashMap<FaultPoint, Duration>,
    latency: Option<Duration>,
    catalog_denied: bool,
    disconnected: bool,
    /// Column another writer commits just before the next transaction starts.
    racing_column: Option<(TableRef, ColumnDef)>,
    history: Vec<TransactionRecord>,
}

/// In-memory [`Database`] with PostgreSQL-like DDL semantics.
///
/// A transaction takes the catalog write lock for its whole lifetime (as
/// `ALTER TABLE` takes an exclusive lock) and works on a copy-on-write clone
/// that replaces the committed catalog only on commit. Clones of a
/// `MemoryDatabase` are handles to the same data.
#[derive(Debug, Clone, Default)]
pub struct MemoryDatabase {
    catalog: Arc<RwLock<Catalog>>,
    control: Arc<Mutex<Control>>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn create_table(&self, table: TableRef, columns: Vec<ColumnDef>) -> Result<()> {
        table.validate()?;
        let definition = Table::new(columns)?;
        let mut catalog = self.catalog.write().await;
        *catalog = catalog.clone().with_table(table, definition)?;
        Ok(())
    }

    pub async fn insert(&self, table: &TableRef, row: Row) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        catalog.table_mut(table)?.insert(row)
    }

    pub async fn insert_rows(&self, table: &TableRef, rows: Vec<Row>) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        let target = catalog.table_mut(table)?;
        for row in rows {
            target.insert(row)?;
        }
        Ok(())
    }

    /// Adds a column outside of any runner transaction, as another writer would.
    pub async fn alter_add_column(&self, table: &TableRef, column: ColumnDef) -> Result<()> {
        let mut catalog = self.catalog.write().await;
        catalog.table_mut(table)?.add_column(column)
    }

    /// Copy of the committed catalog.
    pub async fn snapshot(&self) -> Catalog {
        self.catalog.read().await.clone()
    }

    /// Copy of one committed table, rows included.
    pub async fn table(&self, table: &TableRef) -> Result<Table> {
        Ok(self.catalog.read().await.get_table(table)?.clone())
    }

    /// Makes the next transaction step at `point` fail with `error`.
    pub fn inject_fault(&self, point: FaultPoint, error: SchemaError) {
        self.with_control(|control| {
            control.faults.insert(point, error);
        });
    }

    /// Makes the next transaction step at `point` stall for `delay`.
    pub fn delay_at(&self, point: FaultPoint, delay: Duration) {
        self.with_control(|control| {
            control.delays.insert(point, delay);
        });
    }

    /// Delay applied to every round trip.
    pub fn set_latency(&self, latency: Option<Duration>) {
        self.with_control(|control| control.latency = latency);
    }

    /// Catalog reads fail with a permission error while set.
    pub fn deny_catalog(&self, denied: bool) {
        self.with_control(|control| control.catalog_denied = denied);
    }

    /// Every round trip fails with a connectivity error while set.
    pub fn set_disconnected(&self, disconnected: bool) {
        self.with_control(|control| control.disconnected = disconnected);
    }

    /// Commits `column` on `table` right before the next transaction begins.
    pub fn race_column_on_begin(&self, table: TableRef, column: ColumnDef) {
        self.with_control(|control| control.racing_column = Some((table, column)));
    }

    /// Finished transactions, oldest first.
    pub fn history(&self) -> Vec<TransactionRecord> {
        self.with_control(|control| control.history.clone())
    }

    fn with_control<T>(&self, f: impl FnOnce(&mut Control) -> T) -> T {
        let mut control = self.control.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut control)
    }

    async fn round_trip(&self, catalog_read: bool) -> Result<()> {
        let latency = {
            let control = self.control.lock()?;
            if control.disconnected {
                return Err(SchemaError::Connectivity(
                    "in-memory database is disconnected".to_string(),
                ));
            }
            if catalog_read && control.catalog_denied {
                return Err(SchemaError::Permission(
                    "permission denied for catalog metadata".to_string(),
                ));
            }
            control.latency
        };

        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }
        Ok(())
    }
}

#[async_trait]
impl Database for MemoryDatabase {
    async fn describe_table(&self, table: &TableRef) -> Result<Vec<ColumnInfo>> {
        self.round_trip(true).await?;
        let catalog = self.catalog.read().await;
        Ok(catalog
            .get_table(table)?
            .columns()
            .iter()
            .map(ColumnDef::info)
            .collect())
    }

    async fn column_info(&self, table: &TableRef, column: &str) -> Result<Option<ColumnInfo>> {
        self.round_trip(true).await?;
        let catalog = self.catalog.read().await;
        Ok(catalog.get_table(table)?.get_column(column).map(ColumnDef::info))
    }

    async fn check_constraints(
        &self,
        table: &TableRef,
        column: &str,
    ) -> Result<Vec<ConstraintInfo>> {
        self.round_trip(true).await?;
        let catalog = self.catalog.read().await;
        Ok(catalog.get_table(table)?.checks_mentioning(column))
    }

    async fn value_counts(&self, table: &TableRef, column: &str) -> Result<Vec<ValueCount>> {
        self.round_trip(false).await?;
        let catalog = self.catalog.read().await;
        catalog.get_table(table)?.value_counts(column)
    }

    async fn row_count(&self, table: &TableRef) -> Result<u64> {
        self.round_trip(false).await?;
        let catalog = self.catalog.read().await;
        Ok(catalog.get_table(table)?.row_count() as u64)
    }

    async fn begin(&mut self) -> Result<Box<dyn SchemaTransaction + '_>> {
        self.round_trip(false).await?;
        if let Some(error) = self.with_control(|control| control.faults.remove(&FaultPoint::Begin)) {
            return Err(error);
        }

        if let Some((table, column)) = self.with_control(|control| control.racing_column.take()) {
            debug!("concurrent writer adds {}.{}", table, column.name);
            self.alter_add_column(&table, column).await?;
        }

        let committed = self.catalog.clone().write_owned().await;
        let working = committed.clone();
        let journal = TransactionJournal::begin();
        debug!("BEGIN {}", journal.id());

        Ok(Box::new(MemoryTransaction {
            committed,
            working,
            journal,
            db: self.clone(),
        }))
    }
}

/// Open in-memory transaction; dropping it discards the working copy.
struct MemoryTransaction {
    committed: OwnedRwLockWriteGuard<Catalog>,
    working: Catalog,
    journal: TransactionJournal,
    db: MemoryDatabase,
}

impl MemoryTransaction {
    async fn step(&mut self, point: FaultPoint) -> Result<()> {
        let (fault, delay) = {
            let mut control = self.db.control.lock()?;
            if control.disconnected {
                return Err(SchemaError::Connectivity(
                    "in-memory database is disconnected".to_string(),
                ));
            }
            let delay = control.delays.remove(&point).or(control.latency);
            (control.faults.remove(&point), delay)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        match fault {
            Some(error) => {
                debug!("{} injected failure at {:?}: {}", self.journal.id(), point, error);
                Err(error)
            }
            None => Ok(()),
        }
    }

    fn finish(&mut self, state: TransactionState) -> Result<()> {
        let record = self.journal.finish(state)?;
        debug!("{} {}", record.id, record.state);
        self.db.with_control(|control| control.history.push(record));
        Ok(())
    }
}

#[async_trait]
impl SchemaTransaction for MemoryTransaction {
    async fn add_column(
        &mut self,
        table: &TableRef,
        column: &str,
        data_type: &DataType,
    ) -> Result<()> {
        self.step(FaultPoint::AddColumn).await?;
        self.working
            .table_mut(table)?
            .add_column(ColumnDef::new(column, data_type.clone()))?;
        self.journal.record(Change::AddColumn {
            table: table.clone(),
            column: column.to_string(),
        })
    }

    async fn normalize_empty(
        &mut self,
        table: &TableRef,
        column: &str,
        value: &Value,
    ) -> Result<u64> {
        self.step(FaultPoint::Normalize).await?;
        let rows = self.working.table_mut(table)?.normalize_empty(column, value)?;
        self.journal.record(Change::NormalizeRows {
            table: table.clone(),
            column: column.to_string(),
            rows,
        })?;
        Ok(rows)
    }

    async fn set_column_default(
        &mut self,
        table: &TableRef,
        column: &str,
        value: &Value,
    ) -> Result<()> {
        self.step(FaultPoint::SetDefault).await?;
        self.working.table_mut(table)?.set_default(column, value)?;
        self.journal.record(Change::SetDefault {
            table: table.clone(),
            column: column.to_string(),
            value: value.clone(),
        })
    }

    async fn set_not_null(&mut self, table: &TableRef, column: &str) -> Result<()> {
        self.step(FaultPoint::SetNotNull).await?;
        self.working.table_mut(table)?.set_not_null(column)?;
        self.journal.record(Change::SetNotNull {
            table: table.clone(),
            column: column.to_string(),
        })
    }

    async fn add_check_constraint(
        &mut self,
        table: &TableRef,
        check: &CheckConstraint,
    ) -> Result<()> {
        self.step(FaultPoint::AddConstraint).await?;
        self.working.table_mut(table)?.add_check(check.clone())?;
        self.journal.record(Change::AddCheck {
            table: table.clone(),
            name: check.name.clone(),
        })
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        self.step(FaultPoint::Commit).await?;
        *self.committed = self.working.clone();
        self.finish(TransactionState::Committed)
    }

    async fn rollback(mut self: Box<Self>) -> Result<()> {
        self.step(FaultPoint::Rollback).await?;
        self.finish(TransactionState::Aborted)
    }
}

impl Drop for MemoryTransaction {
    fn drop(&mut self) {
        if self.journal.state().is_active() {
            let _ = self.finish(TransactionState::Aborted);
        }
    }
}
