use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::core::{ColumnInfo, ConstraintInfo, TableRef, Value, ValueCount};
use crate::result::ReportTable;
use super::RunState;

/// Result of a `migrate` or `run` call.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationOutcome {
    pub run_id: Uuid,
    pub table: TableRef,
    pub column: String,
    pub already_present: bool,
    pub applied: bool,
    pub rows_normalized: u64,
    pub verification: Option<VerificationSnapshot>,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl MigrationOutcome {
    /// Terminal state the run ended in.
    pub fn state(&self) -> RunState {
        if self.already_present {
            RunState::AlreadyPresent
        } else if self.verification.is_some() {
            RunState::Verified
        } else {
            RunState::Applied
        }
    }

    pub fn summary(&self) -> String {
        if self.already_present {
            format!(
                "{}.{}: already present, nothing changed",
                self.table, self.column
            )
        } else {
            format!(
                "{}.{}: column added, {} row(s) normalized",
                self.table, self.column, self.rows_normalized
            )
        }
    }
}

/// Freshly read end state of a column.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct VerificationSnapshot {
    pub table: TableRef,
    pub column_name: String,
    /// `None` when the column does not exist.
    pub column: Option<ColumnInfo>,
    pub constraints: Vec<ConstraintInfo>,
    pub histogram: Vec<ValueCount>,
    pub total_rows: u64,
}

/// Reportable condition found in a snapshot. None of these is an error.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "finding", rename_all = "snake_case")]
pub enum Finding {
    ColumnMissing,
    EmptyTable,
    NoMatchingConstraint,
    NullValues { rows: u64 },
    HistogramMismatch { histogram_total: u64, total_rows: u64 },
}

impl fmt::Display for Finding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Finding::ColumnMissing => write!(f, "column does not exist"),
            Finding::EmptyTable => write!(f, "table has no rows"),
            Finding::NoMatchingConstraint => write!(f, "no CHECK constraint references the column"),
            Finding::NullValues { rows } => write!(f, "{} row(s) hold NULL", rows),
            Finding::HistogramMismatch {
                histogram_total,
                total_rows,
            } => write!(
                f,
                "histogram counts {} row(s) but the table has {}",
                histogram_total, total_rows
            ),
        }
    }
}

impl VerificationSnapshot {
    pub fn column_exists(&self) -> bool {
        self.column.is_some()
    }

    pub fn histogram_total(&self) -> u64 {
        self.histogram.iter().map(|bucket| bucket.count).sum()
    }

    pub fn count_of(&self, value: &Value) -> u64 {
        self.histogram
            .iter()
            .filter(|bucket| &bucket.value == value)
            .map(|bucket| bucket.count)
            .sum()
    }

    pub fn findings(&self) -> Vec<Finding> {
        let mut findings = Vec::new();

        if self.column.is_none() {
            findings.push(Finding::ColumnMissing);
        }
        if self.total_rows == 0 {
            findings.push(Finding::EmptyTable);
        }
        if self.column.is_none() {
            return findings;
        }

        if self.constraints.is_empty() {
            findings.push(Finding::NoMatchingConstraint);
        }
        let nulls = self.count_of(&Value::Null);
        if nulls > 0 {
            findings.push(Finding::NullValues { rows: nulls });
        }
        let histogram_total = self.histogram_total();
        if histogram_total != self.total_rows {
            findings.push(Finding::HistogramMismatch {
                histogram_total,
                total_rows: self.total_rows,
            });
        }
        findings
    }

    pub fn histogram_table(&self) -> ReportTable {
        let mut table = ReportTable::new(
            format!(
                "Distribution of {}.{} ({} row(s))",
                self.table, self.column_name, self.total_rows
            ),
            vec!["value".to_string(), "rows".to_string()],
        );
        for bucket in &self.histogram {
            table.push_row(vec![bucket.value.to_string(), bucket.count.to_string()]);
        }
        table
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;

    fn snapshot(histogram: Vec<ValueCount>, total_rows: u64) -> VerificationSnapshot {
        VerificationSnapshot {
            table: TableRef::new("public", "properties"),
            column_name: "status".to_string(),
            column: Some(ColumnInfo::new("status", DataType::Text)),
            constraints: vec![ConstraintInfo {
                name: "properties_status_check".to_string(),
                definition: "CHECK ((status = ANY (ARRAY['거래중'::text, '거래완료'::text])))"
                    .to_string(),
            }],
            histogram,
            total_rows,
        }
    }

    #[test]
    fn test_clean_snapshot_has_no_findings() {
        let snap = snapshot(
            vec![ValueCount::new("거래중", 7), ValueCount::new("거래완료", 3)],
            10,
        );
        assert!(snap.findings().is_empty());
        assert_eq!(snap.histogram_total(), 10);
        assert_eq!(snap.count_of(&Value::from("거래완료")), 3);
    }

    #[test]
    fn test_missing_column_and_empty_table() {
        let mut snap = snapshot(vec![], 0);
        snap.column = None;
        snap.constraints.clear();
        assert_eq!(
            snap.findings(),
            vec![Finding::ColumnMissing, Finding::EmptyTable]
        );
    }

    #[test]
    fn test_nulls_missing_constraint_and_mismatch() {
        let mut snap = snapshot(vec![ValueCount::new(Value::Null, 2)], 3);
        snap.constraints.clear();
        assert_eq!(
            snap.findings(),
            vec![
                Finding::NoMatchingConstraint,
                Finding::NullValues { rows: 2 },
                Finding::HistogramMismatch {
                    histogram_total: 2,
                    total_rows: 3
                },
            ]
        );
    }

    #[test]
    fn test_histogram_table() {
        let snap = snapshot(vec![ValueCount::new("거래중", 10)], 10);
        let table = snap.histogram_table();
        assert_eq!(table.title, "Distribution of public.properties.status (10 row(s))");
        assert_eq!(table.rows, vec![vec!["거래중".to_string(), "10".to_string()]]);
    }
}
