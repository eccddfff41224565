use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::{
    ColumnSpec, MigrationError, MigrationOutcome, MigrationPlan, MigrationResult, RollbackStatus,
    RunState, Step, VerificationSnapshot,
};
use crate::connection::config::DEFAULT_STATEMENT_TIMEOUT;
use crate::connection::{Database, MigratorConfig, SchemaTransaction};
use crate::core::{
    ColumnPresence, DataType, Result, SchemaError, TableDescriptor, TableRef, Value, ValueCount,
    validate_identifier,
};
use crate::result::{LogSink, ReportSink, ReportTable};

/// Drives inspect, migrate and verify against an explicit connection.
///
/// The runner holds no connection of its own; every operation borrows the
/// caller's handle. Each database round trip is bounded by the statement
/// timeout, and an expired round trip is reported as a connectivity error.
///
/// ```no_run
/// use column_migrator::{ColumnSpec, MemoryDatabase, MigrationRunner, TableRef, Value};
/// use column_migrator::core::DataType;
///
/// # async fn demo(mut db: MemoryDatabase) -> Result<(), Box<dyn std::error::Error>> {
/// let runner = MigrationRunner::default();
/// let status = ColumnSpec::new("status", DataType::Text)
///     .default_value("거래중")
///     .allowed(["거래중", "거래완료"]);
///
/// let table = TableRef::new("public", "properties");
/// let outcome = runner.run(&mut db, &table, &status, &Value::from("거래중")).await?;
/// println!("{}", outcome.summary());
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MigrationRunner {
    statement_timeout: Duration,
    sink: Arc<dyn ReportSink>,
}

impl Default for MigrationRunner {
    fn default() -> Self {
        Self::new(DEFAULT_STATEMENT_TIMEOUT)
    }
}

impl std::fmt::Debug for MigrationRunner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MigrationRunner")
            .field("statement_timeout", &self.statement_timeout)
            .finish_non_exhaustive()
    }
}

impl MigrationRunner {
    pub fn new(statement_timeout: Duration) -> Self {
        Self {
            statement_timeout,
            sink: Arc::new(LogSink),
        }
    }

    pub fn from_config(config: &MigratorConfig) -> Self {
        Self::new(config.statement_timeout)
    }

    pub fn with_sink(mut self, sink: impl ReportSink + 'static) -> Self {
        self.sink = Arc::new(sink);
        self
    }

    pub fn statement_timeout(&self) -> Duration {
        self.statement_timeout
    }

    /// Looks the column up in the catalog. Read-only.
    pub async fn inspect<D>(
        &self,
        conn: &D,
        table: &TableRef,
        column: &str,
    ) -> MigrationResult<ColumnPresence>
    where
        D: Database + ?Sized,
    {
        validate_target(table, column)?;

        let presence: ColumnPresence = self
            .bounded("column lookup", conn.column_info(table, column))
            .await
            .map_err(|e| MigrationError::new(Step::Inspect, table, Some(column), e))?
            .into();

        debug!(%table, column, %presence, "inspected column");
        self.sink
            .line(&format!("inspect {}.{}: {}", table, column, presence));
        Ok(presence)
    }

    /// Lists every column of `table`. Read-only.
    pub async fn describe<D>(&self, conn: &D, table: &TableRef) -> MigrationResult<TableDescriptor>
    where
        D: Database + ?Sized,
    {
        table
            .validate()
            .map_err(|e| MigrationError::new(Step::Validate, table, None, e))?;

        let columns = self
            .bounded("table description", conn.describe_table(table))
            .await
            .map_err(|e| MigrationError::new(Step::Describe, table, None, e))?;

        let descriptor = TableDescriptor {
            table: table.clone(),
            columns,
        };
        self.sink.table(&ReportTable::from(&descriptor));
        Ok(descriptor)
    }

    /// Adds the column unless it already exists.
    ///
    /// Validation happens before any statement is sent. The schema change and
    /// the backfill run in one transaction; on failure the transaction is
    /// rolled back and the error says whether that succeeded.
    pub async fn migrate<D>(
        &self,
        conn: &mut D,
        table: &TableRef,
        spec: &ColumnSpec,
        default_for_nulls: &Value,
    ) -> MigrationResult<MigrationOutcome>
    where
        D: Database + ?Sized,
    {
        self.drive(conn, table, spec, default_for_nulls, false).await
    }

    /// Re-reads column metadata, matching CHECK constraints and the value
    /// distribution. Read-only.
    pub async fn verify<D>(
        &self,
        conn: &D,
        table: &TableRef,
        column: &str,
    ) -> MigrationResult<VerificationSnapshot>
    where
        D: Database + ?Sized,
    {
        validate_target(table, column)?;
        let fail = |e| MigrationError::new(Step::Verify, table, Some(column), e);

        let info = self
            .bounded("column lookup", conn.column_info(table, column))
            .await
            .map_err(fail)?;
        let total_rows = self
            .bounded("row count", conn.row_count(table))
            .await
            .map_err(fail)?;

        let (constraints, histogram) = match &info {
            Some(info) => {
                let constraints = self
                    .bounded("constraint lookup", conn.check_constraints(table, column))
                    .await
                    .map_err(fail)?;
                let histogram = self
                    .bounded("value distribution", conn.value_counts(table, column))
                    .await
                    .map_err(fail)?;
                (constraints, retype(histogram, &info.data_type))
            }
            None => (Vec::new(), Vec::new()),
        };

        let snapshot = VerificationSnapshot {
            table: table.clone(),
            column_name: column.to_string(),
            column: info,
            constraints,
            histogram,
            total_rows,
        };
        self.report_snapshot(&snapshot);
        Ok(snapshot)
    }

    /// Full run: inspect, migrate when absent, then verify.
    ///
    /// The outcome always carries a verification snapshot, also when the
    /// column was already present.
    pub async fn run<D>(
        &self,
        conn: &mut D,
        table: &TableRef,
        spec: &ColumnSpec,
        default_for_nulls: &Value,
    ) -> MigrationResult<MigrationOutcome>
    where
        D: Database + ?Sized,
    {
        self.drive(conn, table, spec, default_for_nulls, true).await
    }

    async fn drive<D>(
        &self,
        conn: &mut D,
        table: &TableRef,
        spec: &ColumnSpec,
        default_for_nulls: &Value,
        verify: bool,
    ) -> MigrationResult<MigrationOutcome>
    where
        D: Database + ?Sized,
    {
        let run_id = Uuid::new_v4();
        let span = info_span!("migration", %run_id, %table, column = %spec.name);

        async move {
            let mut state = RunState::Start;
            match self
                .drive_steps(conn, table, spec, default_for_nulls, verify, run_id, &mut state)
                .await
            {
                Ok(outcome) => Ok(outcome),
                Err(err) => Err(self.failed(&mut state, err)),
            }
        }
        .instrument(span)
        .await
    }

    #[allow(clippy::too_many_arguments)]
    async fn drive_steps<D>(
        &self,
        conn: &mut D,
        table: &TableRef,
        spec: &ColumnSpec,
        default_for_nulls: &Value,
        verify: bool,
        run_id: Uuid,
        state: &mut RunState,
    ) -> MigrationResult<MigrationOutcome>
    where
        D: Database + ?Sized,
    {
        let started_at = Utc::now();

        let plan = MigrationPlan::new(table.clone(), spec.clone(), default_for_nulls.clone())
            .map_err(|e| MigrationError::new(Step::Validate, table, Some(&spec.name), e))?;
        let column = plan.column.name.as_str();

        let presence = self.inspect(&*conn, table, column).await?;
        let rows_normalized = if presence.is_present() {
            self.advance(state, RunState::AlreadyPresent);
            None
        } else {
            self.advance(state, RunState::Absent);
            let rows = self.apply(conn, &plan).await?;
            self.advance(state, RunState::Applied);
            Some(rows)
        };

        let verification = if verify {
            let snapshot = self
                .verify(&*conn, table, column)
                .await
                .map_err(|e| e.with_pre_state(presence.clone()))?;
            if rows_normalized.is_some() {
                self.advance(state, RunState::Verified);
            }
            Some(snapshot)
        } else {
            None
        };

        let outcome = MigrationOutcome {
            run_id,
            table: table.clone(),
            column: column.to_string(),
            already_present: rows_normalized.is_none(),
            applied: rows_normalized.is_some(),
            rows_normalized: rows_normalized.unwrap_or(0),
            verification,
            started_at,
            finished_at: Utc::now(),
        };

        info!(
            state = %outcome.state(),
            rows_normalized = outcome.rows_normalized,
            "migration finished"
        );
        self.sink.line(&outcome.summary());
        Ok(outcome)
    }

    /// Runs the schema change in one transaction and settles it.
    async fn apply<D>(&self, conn: &mut D, plan: &MigrationPlan) -> MigrationResult<u64>
    where
        D: Database + ?Sized,
    {
        let table = &plan.table;
        let column = plan.column.name.as_str();
        let fail = |step: Step, source: SchemaError, rollback: RollbackStatus| {
            MigrationError::new(step, table, Some(column), source)
                .with_pre_state(ColumnPresence::Absent)
                .with_rollback(rollback)
        };

        let mut txn = self
            .bounded("BEGIN", conn.begin())
            .await
            .map_err(|e| fail(Step::Begin, e, RollbackStatus::NotNeeded))?;

        match self.apply_steps(&mut *txn, plan).await {
            Ok(rows) => match self.bounded("COMMIT", txn.commit()).await {
                Ok(()) => {
                    info!(rows_normalized = rows, "transaction committed");
                    Ok(rows)
                }
                // The server may have committed before the connection dropped.
                Err(source @ SchemaError::Connectivity(_)) => {
                    let unknown = SchemaError::Connectivity(
                        "commit outcome unknown, no rollback possible".to_string(),
                    );
                    Err(fail(
                        Step::Commit,
                        SchemaError::unrecoverable(source, unknown),
                        RollbackStatus::Failed,
                    ))
                }
                Err(source) => Err(fail(Step::Commit, source, RollbackStatus::RolledBack)),
            },
            Err((step, source)) => {
                warn!(%step, "rolling back: {}", source);
                match self.bounded("ROLLBACK", txn.rollback()).await {
                    Ok(()) => {
                        self.sink
                            .line(&format!("{} failed, transaction rolled back", step));
                        Err(fail(step, source, RollbackStatus::RolledBack))
                    }
                    Err(rollback) => Err(fail(
                        step,
                        SchemaError::unrecoverable(source, rollback),
                        RollbackStatus::Failed,
                    )),
                }
            }
        }
    }

    async fn apply_steps<T>(
        &self,
        txn: &mut T,
        plan: &MigrationPlan,
    ) -> std::result::Result<u64, (Step, SchemaError)>
    where
        T: SchemaTransaction + ?Sized,
    {
        let table = &plan.table;
        let column = plan.column.name.as_str();

        self.step(
            Step::AddColumn,
            txn.add_column(table, column, &plan.column.data_type),
        )
        .await?;

        let rows = self
            .step(
                Step::Normalize,
                txn.normalize_empty(table, column, &plan.default_for_nulls),
            )
            .await?;
        self.sink.line(&format!(
            "normalize {}.{}: {} row(s) set to '{}'",
            table, column, rows, plan.default_for_nulls
        ));

        if let Some(default) = &plan.column.default {
            self.step(Step::SetDefault, txn.set_column_default(table, column, default))
                .await?;
        }
        if !plan.column.nullable {
            self.step(Step::SetNotNull, txn.set_not_null(table, column))
                .await?;
        }
        if let Some(check) = &plan.check {
            self.step(Step::AddConstraint, txn.add_check_constraint(table, check))
                .await?;
        }
        Ok(rows)
    }

    async fn step<T>(
        &self,
        step: Step,
        operation: impl Future<Output = Result<T>>,
    ) -> std::result::Result<T, (Step, SchemaError)> {
        debug!(%step, "executing");
        self.bounded(step.as_str(), operation)
            .await
            .map_err(|e| (step, e))
    }

    async fn bounded<T>(&self, what: &str, operation: impl Future<Output = Result<T>>) -> Result<T> {
        match tokio::time::timeout(self.statement_timeout, operation).await {
            Ok(result) => result,
            Err(_) => Err(SchemaError::Connectivity(format!(
                "{} did not complete within {:?}",
                what, self.statement_timeout
            ))),
        }
    }

    fn advance(&self, state: &mut RunState, next: RunState) {
        debug_assert!(
            state.can_advance_to(next),
            "illegal transition {} -> {}",
            state,
            next
        );
        info!(from = %state, to = %next, "state transition");
        *state = next;
    }

    fn failed(&self, state: &mut RunState, err: MigrationError) -> MigrationError {
        let next = RunState::Failed(err.step);
        if state.can_advance_to(next) {
            info!(from = %state, to = %next, "state transition");
            *state = next;
        }
        error!(
            step = %err.step,
            kind = err.kind(),
            rollback = %err.rollback,
            "{}",
            err.source
        );
        self.sink.line(&format!("FAILED: {}", err));
        err
    }

    fn report_snapshot(&self, snapshot: &VerificationSnapshot) {
        match &snapshot.column {
            Some(column) => self.sink.line(&format!(
                "verify {}.{}: {}",
                snapshot.table,
                snapshot.column_name,
                ColumnPresence::Present(column.clone())
            )),
            None => self.sink.line(&format!(
                "verify {}.{}: column absent",
                snapshot.table, snapshot.column_name
            )),
        }
        for constraint in &snapshot.constraints {
            self.sink
                .line(&format!("constraint {}: {}", constraint.name, constraint.definition));
        }
        if snapshot.column.is_some() {
            self.sink.table(&snapshot.histogram_table());
        }
        for finding in snapshot.findings() {
            self.sink.line(&format!("note: {}", finding));
        }
    }
}

fn validate_target(table: &TableRef, column: &str) -> MigrationResult<()> {
    table
        .validate()
        .and_then(|_| validate_identifier("column", column))
        .map_err(|e| MigrationError::new(Step::Validate, table, Some(column), e))
}

/// Backends that read the distribution as text get typed values back.
fn retype(histogram: Vec<ValueCount>, data_type: &DataType) -> Vec<ValueCount> {
    histogram
        .into_iter()
        .map(|bucket| {
            let value = match &bucket.value {
                Value::Text(raw) => {
                    Value::parse_as(raw, data_type).unwrap_or_else(|_| bucket.value.clone())
                }
                other => other.clone(),
            };
            ValueCount {
                value,
                count: bucket.count,
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retype_parses_text_buckets() {
        let histogram = vec![
            ValueCount::new("3", 2),
            ValueCount::new(Value::Null, 1),
            ValueCount::new("not a number", 1),
        ];

        let typed = retype(histogram, &DataType::Integer);
        assert_eq!(typed[0].value, Value::Integer(3));
        assert_eq!(typed[1].value, Value::Null);
        assert_eq!(typed[2].value, Value::from("not a number"));
    }

    #[tokio::test]
    async fn test_bounded_maps_timeout_to_connectivity() {
        let runner = MigrationRunner::new(Duration::from_millis(10));
        let slow = async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        };

        let err = runner.bounded("row count", slow).await.unwrap_err();
        assert!(matches!(err, SchemaError::Connectivity(_)));
        assert!(err.to_string().contains("row count"));
    }
}
