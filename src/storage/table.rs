use std::collections::HashMap;

use serde::Serialize;

use crate::core::{
    CheckConstraint, ColumnInfo, ConstraintInfo, DataType, Result, Row, SchemaError, Value,
    ValueCount,
};

/// Column definition of an in-memory table.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnDef {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
        }
    }

    pub fn not_null(mut self) -> Self {
        self.nullable = false;
        self
    }

    pub fn default_value(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(value.into());
        self
    }

    pub fn validate(&self, value: &Value) -> Result<()> {
        if value.is_null() {
            if !self.nullable {
                return Err(SchemaError::ConstraintViolation(format!(
                    "null value in column \"{}\" violates not-null constraint",
                    self.name
                )));
            }
            return Ok(());
        }

        if !self.data_type.is_compatible(value) {
            return Err(SchemaError::Execution(format!(
                "column \"{}\" is of type {} but value '{}' is {}",
                self.name,
                self.data_type,
                value,
                value.type_name()
            )));
        }

        Ok(())
    }

    /// Catalog view of the column; the default is rendered as a SQL literal.
    pub fn info(&self) -> ColumnInfo {
        ColumnInfo {
            name: self.name.clone(),
            data_type: self.data_type.clone(),
            nullable: self.nullable,
            default: self.default.as_ref().map(Value::to_sql_literal),
        }
    }
}

/// Rows plus schema of one in-memory table.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Table {
    columns: Vec<ColumnDef>,
    checks: Vec<CheckConstraint>,
    rows: Vec<Row>,
}

impl Table {
    pub fn new(columns: Vec<ColumnDef>) -> Result<Self> {
        let mut table = Self::default();
        for column in columns {
            if table.find_column_index(&column.name).is_some() {
                return Err(SchemaError::InvalidSpec(format!(
                    "column \"{}\" specified more than once",
                    column.name
                )));
            }
            table.columns.push(column);
        }
        Ok(table)
    }

    pub fn columns(&self) -> &[ColumnDef] {
        &self.columns
    }

    pub fn checks(&self) -> &[CheckConstraint] {
        &self.checks
    }

    pub fn rows(&self) -> &[Row] {
        &self.rows
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn find_column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|col| col.name == name)
    }

    pub fn get_column(&self, name: &str) -> Option<&ColumnDef> {
        self.find_column_index(name).map(|idx| &self.columns[idx])
    }

    fn column_index(&self, name: &str) -> Result<usize> {
        self.find_column_index(name)
            .ok_or_else(|| SchemaError::Execution(format!("column \"{}\" does not exist", name)))
    }

    /// Appends a row, enforcing column types, NOT NULL and CHECK constraints.
    pub fn insert(&mut self, row: Row) -> Result<()> {
        if row.len() != self.columns.len() {
            return Err(SchemaError::Execution(format!(
                "expected {} values, got {}",
                self.columns.len(),
                row.len()
            )));
        }

        for (column, value) in self.columns.iter().zip(&row) {
            column.validate(value)?;
        }

        for check in &self.checks {
            if let Some(idx) = self.find_column_index(&check.column)
                && !check.admits(&row[idx])
            {
                return Err(SchemaError::ConstraintViolation(format!(
                    "new row violates check constraint \"{}\"",
                    check.name
                )));
            }
        }

        self.rows.push(row);
        Ok(())
    }

    /// Adds a column; existing rows receive its default, or NULL.
    pub fn add_column(&mut self, column: ColumnDef) -> Result<()> {
        if self.find_column_index(&column.name).is_some() {
            return Err(SchemaError::SchemaConflict(format!(
                "column \"{}\" already exists",
                column.name
            )));
        }

        let fill = column.default.clone().unwrap_or(Value::Null);
        column.validate(&fill)?;
        for row in &mut self.rows {
            row.push(fill.clone());
        }
        self.columns.push(column);
        Ok(())
    }

    /// Rewrites NULL and empty-string values of `column` to `value`.
    pub fn normalize_empty(&mut self, column: &str, value: &Value) -> Result<u64> {
        let idx = self.column_index(column)?;
        self.columns[idx].validate(value)?;

        let mut rewritten = 0;
        for row in &mut self.rows {
            if row[idx].is_null_or_empty() {
                row[idx] = value.clone();
                rewritten += 1;
            }
        }
        Ok(rewritten)
    }

    pub fn set_default(&mut self, column: &str, value: &Value) -> Result<()> {
        let idx = self.column_index(column)?;
        self.columns[idx].validate(value)?;
        self.columns[idx].default = Some(value.clone());
        Ok(())
    }

    pub fn set_not_null(&mut self, column: &str) -> Result<()> {
        let idx = self.column_index(column)?;
        if self.rows.iter().any(|row| row[idx].is_null()) {
            return Err(SchemaError::ConstraintViolation(format!(
                "column \"{}\" contains null values",
                column
            )));
        }
        self.columns[idx].nullable = false;
        Ok(())
    }

    /// Installs a CHECK constraint after validating every existing row.
    pub fn add_check(&mut self, check: CheckConstraint) -> Result<()> {
        let idx = self.column_index(&check.column)?;

        if self.checks.iter().any(|existing| existing.name == check.name) {
            return Err(SchemaError::SchemaConflict(format!(
                "constraint \"{}\" already exists",
                check.name
            )));
        }

        for allowed in &check.allowed {
            self.columns[idx].validate(allowed)?;
        }

        if self.rows.iter().any(|row| !check.admits(&row[idx])) {
            return Err(SchemaError::ConstraintViolation(format!(
                "check constraint \"{}\" is violated by some row",
                check.name
            )));
        }

        self.checks.push(check);
        Ok(())
    }

    /// Row count per distinct value, largest bucket first.
    pub fn value_counts(&self, column: &str) -> Result<Vec<ValueCount>> {
        let idx = self.column_index(column)?;

        let mut counts: HashMap<&Value, u64> = HashMap::new();
        for row in &self.rows {
            *counts.entry(&row[idx]).or_insert(0) += 1;
        }

        let mut buckets: Vec<ValueCount> = counts
            .into_iter()
            .map(|(value, count)| ValueCount::new(value.clone(), count))
            .collect();
        buckets.sort_by(|a, b| {
            b.count
                .cmp(&a.count)
                .then_with(|| a.value.to_string().cmp(&b.value.to_string()))
        });
        Ok(buckets)
    }

    /// CHECK constraints whose definition text mentions `column`.
    pub fn checks_mentioning(&self, column: &str) -> Vec<ConstraintInfo> {
        self.checks
            .iter()
            .filter(|check| check.definition().contains(column))
            .map(|check| ConstraintInfo {
                name: check.name.clone(),
                definition: check.definition(),
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::TableRef;

    fn listings() -> Table {
        let mut table = Table::new(vec![
            ColumnDef::new("id", DataType::Integer).not_null(),
            ColumnDef::new("title", DataType::Text),
        ])
        .unwrap();
        table.insert(vec![Value::Integer(1), Value::from("Gangnam loft")]).unwrap();
        table.insert(vec![Value::Integer(2), Value::Null]).unwrap();
        table
    }

    fn status_check(allowed: &[&str]) -> CheckConstraint {
        CheckConstraint::for_column(
            &TableRef::new("public", "properties"),
            "status",
            allowed.iter().map(|v| Value::from(*v)).collect(),
        )
    }

    #[test]
    fn test_duplicate_column_names_rejected() {
        let result = Table::new(vec![
            ColumnDef::new("id", DataType::Integer),
            ColumnDef::new("id", DataType::Text),
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_insert_validates_types_and_not_null() {
        let mut table = listings();
        assert!(table.insert(vec![Value::Null, Value::from("x")]).is_err());
        assert!(table.insert(vec![Value::from("3"), Value::from("x")]).is_err());
        assert!(table.insert(vec![Value::Integer(3)]).is_err());
        assert_eq!(table.row_count(), 2);
    }

    #[test]
    fn test_add_column_fills_rows() {
        let mut table = listings();
        table.add_column(ColumnDef::new("status", DataType::Text)).unwrap();

        assert!(table.rows().iter().all(|row| row[2].is_null()));

        let err = table.add_column(ColumnDef::new("status", DataType::Text)).unwrap_err();
        assert!(matches!(err, SchemaError::SchemaConflict(_)));
    }

    #[test]
    fn test_normalize_only_touches_null_and_empty() {
        let mut table = listings();
        table.add_column(ColumnDef::new("status", DataType::Text)).unwrap();
        table.insert(vec![Value::Integer(3), Value::Null, Value::from("")]).unwrap();
        table
            .insert(vec![Value::Integer(4), Value::Null, Value::from("거래완료")])
            .unwrap();

        let rewritten = table.normalize_empty("status", &Value::from("거래중")).unwrap();
        assert_eq!(rewritten, 3);
        assert_eq!(table.rows()[3][2], Value::from("거래완료"));
    }

    #[test]
    fn test_add_check_validates_existing_rows() {
        let mut table = listings();
        table.add_column(ColumnDef::new("status", DataType::Text)).unwrap();
        table.normalize_empty("status", &Value::from("보류")).unwrap();

        let err = table.add_check(status_check(&["거래중", "거래완료"])).unwrap_err();
        assert!(matches!(err, SchemaError::ConstraintViolation(_)));
        assert!(table.checks().is_empty());

        table.add_check(status_check(&["보류"])).unwrap();
        assert_eq!(table.checks_mentioning("status").len(), 1);
        assert!(table.checks_mentioning("title").is_empty());
    }

    #[test]
    fn test_set_not_null_rejects_nulls() {
        let mut table = listings();
        let err = table.set_not_null("title").unwrap_err();
        assert!(matches!(err, SchemaError::ConstraintViolation(_)));
        assert!(table.get_column("title").unwrap().nullable);
    }

    #[test]
    fn test_value_counts_sorted_by_count() {
        let mut table = listings();
        table
            .add_column(ColumnDef::new("status", DataType::Text).default_value("거래중"))
            .unwrap();
        table
            .insert(vec![Value::Integer(3), Value::Null, Value::from("거래완료")])
            .unwrap();

        let counts = table.value_counts("status").unwrap();
        assert_eq!(
            counts,
            vec![ValueCount::new("거래중", 2), ValueCount::new("거래완료", 1)]
        );
        assert!(table.value_counts("missing").is_err());
    }
}
