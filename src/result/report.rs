use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;

use crate::core::TableDescriptor;

/// Tabular block of a report: a header and rows of rendered cells.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReportTable {
    pub title: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl ReportTable {
    pub fn new(title: impl Into<String>, columns: Vec<String>) -> Self {
        Self {
            title: title.into(),
            columns,
            rows: Vec::new(),
        }
    }

    pub fn push_row(&mut self, row: Vec<String>) {
        self.rows.push(row);
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Renders the table with aligned columns, one line per row.
    pub fn render(&self) -> Vec<String> {
        let mut lines = vec![self.title.clone()];

        if self.columns.is_empty() {
            lines.push("(no columns)".to_string());
            return lines;
        }

        // Calculate column widths
        let mut widths: Vec<usize> = self.columns.iter().map(|c| c.chars().count()).collect();
        for row in &self.rows {
            for (i, cell) in row.iter().enumerate().take(widths.len()) {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }

        lines.push(Self::render_row(&self.columns, &widths));
        lines.push(
            widths
                .iter()
                .map(|w| "-".repeat(*w))
                .collect::<Vec<_>>()
                .join("-+-"),
        );
        for row in &self.rows {
            lines.push(Self::render_row(row, &widths));
        }
        lines.push(format!("({} row(s))", self.rows.len()));
        lines
    }

    // `{:width$}` pads by chars, which keeps Hangul values aligned with the header.
    fn render_row(cells: &[String], widths: &[usize]) -> String {
        cells
            .iter()
            .enumerate()
            .map(|(i, cell)| format!("{:width$}", cell, width = widths.get(i).copied().unwrap_or(0)))
            .collect::<Vec<_>>()
            .join(" | ")
            .trim_end()
            .to_string()
    }
}

impl fmt::Display for ReportTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.render().join("\n"))
    }
}

impl From<&TableDescriptor> for ReportTable {
    fn from(descriptor: &TableDescriptor) -> Self {
        let mut table = ReportTable::new(
            format!("Table {}", descriptor.table),
            vec![
                "column".to_string(),
                "type".to_string(),
                "nullable".to_string(),
                "default".to_string(),
            ],
        );
        for column in &descriptor.columns {
            table.push_row(vec![
                column.name.clone(),
                column.data_type.to_string(),
                (if column.nullable { "YES" } else { "NO" }).to_string(),
                column.default.clone().unwrap_or_default(),
            ]);
        }
        table
    }
}

/// Destination of the operator-facing progress report.
pub trait ReportSink: Send + Sync {
    /// One line per step.
    fn line(&self, message: &str);

    /// One block per structured result.
    fn table(&self, table: &ReportTable) {
        for line in table.render() {
            self.line(&line);
        }
    }
}

/// Writes the report through the `log` facade at `info` level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl ReportSink for LogSink {
    fn line(&self, message: &str) {
        log::info!("{}", message);
    }
}

/// Prints the report to stdout.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConsoleSink;

impl ReportSink for ConsoleSink {
    fn line(&self, message: &str) {
        println!("{}", message);
    }

    fn table(&self, table: &ReportTable) {
        println!("{}", table);
    }
}

/// Drops the report. Used for `--json` output, where only the final document is printed.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullSink;

impl ReportSink for NullSink {
    fn line(&self, _message: &str) {}
}

/// Collects report lines in memory; clones share the buffer.
#[derive(Debug, Clone, Default)]
pub struct BufferSink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl BufferSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> Vec<String> {
        self.lines
            .lock()
            .map(|lines| lines.clone())
            .unwrap_or_default()
    }

    pub fn contains(&self, needle: &str) -> bool {
        self.lines().iter().any(|line| line.contains(needle))
    }
}

impl ReportSink for BufferSink {
    fn line(&self, message: &str) {
        if let Ok(mut lines) = self.lines.lock() {
            lines.push(message.to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{ColumnInfo, DataType, TableRef};

    #[test]
    fn test_render_aligns_columns() {
        let mut table = ReportTable::new("Histogram", vec!["value".into(), "rows".into()]);
        table.push_row(vec!["거래중".into(), "7".into()]);
        table.push_row(vec!["거래완료".into(), "3".into()]);

        let lines = table.render();
        assert_eq!(lines[0], "Histogram");
        assert_eq!(lines[1], "value | rows");
        assert_eq!(lines[2], "------+-----");
        assert_eq!(lines[3], "거래중   | 7");
        assert_eq!(lines[4], "거래완료  | 3");
        assert_eq!(lines[5], "(2 row(s))");
    }

    #[test]
    fn test_descriptor_table() {
        let descriptor = TableDescriptor {
            table: TableRef::new("public", "properties"),
            columns: vec![
                ColumnInfo::new("id", DataType::Integer).not_null(),
                ColumnInfo::new("status", DataType::Text).with_default("'거래중'::text"),
            ],
        };

        let table = ReportTable::from(&descriptor);
        assert_eq!(table.title, "Table public.properties");
        assert_eq!(table.row_count(), 2);
        assert_eq!(table.rows[0], vec!["id", "BIGINT", "NO", ""]);
        assert_eq!(table.rows[1][3], "'거래중'::text");
    }

    #[test]
    fn test_buffer_sink_shares_lines() {
        let sink = BufferSink::new();
        let handle = sink.clone();

        sink.line("inspect public.properties.status: column absent");
        let mut table = ReportTable::new("t", vec!["a".into()]);
        table.push_row(vec!["1".into()]);
        sink.table(&table);

        assert!(handle.contains("column absent"));
        assert_eq!(handle.lines().len(), 1 + table.render().len());
    }
}
