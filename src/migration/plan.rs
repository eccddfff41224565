use serde::Serialize;

use crate::connection::sql;
use crate::core::{
    CheckConstraint, DataType, Result, SchemaError, TableRef, Value, validate_identifier,
    validate_type_name,
};

/// Definition of the column to add.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnSpec {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    pub default: Option<Value>,
    /// Enumerated value set enforced by a CHECK constraint; empty means none.
    pub allowed: Vec<Value>,
}

impl ColumnSpec {
    pub fn new(name: impl Into<String>, data_type: DataType) -> Self {
        Self {
            name: name.into(),
            data_type,
            nullable: true,
            default: None,
            allowed: Vec::new(),
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

    pub fn allowed<I, V>(mut self, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.allowed = values.into_iter().map(Into::into).collect();
        self
    }

    pub fn check_constraint(&self, table: &TableRef) -> Option<CheckConstraint> {
        if self.allowed.is_empty() {
            None
        } else {
            Some(CheckConstraint::for_column(table, &self.name, self.allowed.clone()))
        }
    }
}

/// A validated add-column migration.
///
/// Construction performs every check that can be made without the database,
/// so an invalid request never reaches DDL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MigrationPlan {
    pub table: TableRef,
    pub column: ColumnSpec,
    pub default_for_nulls: Value,
    pub check: Option<CheckConstraint>,
}

impl MigrationPlan {
    pub fn new(table: TableRef, column: ColumnSpec, default_for_nulls: Value) -> Result<Self> {
        table.validate()?;
        validate_identifier("column", &column.name)?;
        if let DataType::Other(name) = &column.data_type {
            validate_type_name(name)?;
        }

        if default_for_nulls.is_null_or_empty() {
            return Err(SchemaError::InvalidSpec(format!(
                "value for existing NULL/empty rows of \"{}\" must not be NULL or empty",
                column.name
            )));
        }
        if matches!(column.default, Some(Value::Null)) {
            return Err(SchemaError::InvalidSpec(format!(
                "default of \"{}\" is NULL; omit the default instead",
                column.name
            )));
        }

        let typed = column
            .default
            .iter()
            .chain(std::iter::once(&default_for_nulls))
            .chain(&column.allowed);
        for value in typed {
            if value.is_null() || !column.data_type.is_compatible(value) {
                return Err(SchemaError::InvalidSpec(format!(
                    "value '{}' does not fit column \"{}\" of type {}",
                    value, column.name, column.data_type
                )));
            }
        }

        let check = column.check_constraint(&table);
        if let Some(check) = &check {
            if let Some(default) = &column.default
                && !check.admits(default)
            {
                return Err(Self::outside_allowed("default", default, &column));
            }
            if !check.admits(&default_for_nulls) {
                return Err(Self::outside_allowed(
                    "value for existing rows",
                    &default_for_nulls,
                    &column,
                ));
            }
        }

        Ok(Self {
            table,
            column,
            default_for_nulls,
            check,
        })
    }

    fn outside_allowed(what: &str, value: &Value, column: &ColumnSpec) -> SchemaError {
        let allowed: Vec<String> = column.allowed.iter().map(ToString::to_string).collect();
        SchemaError::ConstraintViolation(format!(
            "{} '{}' is not in the allowed set [{}] of \"{}\"",
            what,
            value,
            allowed.join(", "),
            column.name
        ))
    }

    /// The statements the PostgreSQL backend runs for this plan, in order.
    pub fn statements(&self) -> Vec<String> {
        let table = &self.table;
        let column = &self.column.name;

        let mut statements = vec![
            "BEGIN".to_string(),
            sql::add_column(table, column, &self.column.data_type),
            sql::normalize_empty(table, column, &self.default_for_nulls),
        ];
        if let Some(default) = &self.column.default {
            statements.push(sql::set_default(table, column, default));
        }
        if !self.column.nullable {
            statements.push(sql::set_not_null(table, column));
        }
        if let Some(check) = &self.check {
            statements.push(sql::add_check(table, check));
        }
        statements.push("COMMIT".to_string());
        statements
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn properties() -> TableRef {
        TableRef::new("public", "properties")
    }

    fn status() -> ColumnSpec {
        ColumnSpec::new("status", DataType::Text)
            .default_value("거래중")
            .allowed(["거래중", "거래완료"])
    }

    #[test]
    fn test_valid_plan() {
        let plan = MigrationPlan::new(properties(), status(), Value::from("거래중")).unwrap();
        assert_eq!(
            plan.check.as_ref().map(|c| c.name.as_str()),
            Some("properties_status_check")
        );
    }

    #[test]
    fn test_default_for_nulls_outside_allowed_set() {
        let err = MigrationPlan::new(properties(), status(), Value::from("보류")).unwrap_err();
        assert!(matches!(err, SchemaError::ConstraintViolation(_)));
        assert!(err.to_string().contains("보류"));
    }

    #[test]
    fn test_default_outside_allowed_set() {
        let spec = status().default_value("보류");
        let err = MigrationPlan::new(properties(), spec, Value::from("거래중")).unwrap_err();
        assert!(matches!(err, SchemaError::ConstraintViolation(_)));
    }

    #[test]
    fn test_type_and_identifier_errors() {
        let bad_name = ColumnSpec::new("status; DROP TABLE x", DataType::Text);
        assert!(matches!(
            MigrationPlan::new(properties(), bad_name, Value::from("a")),
            Err(SchemaError::InvalidSpec(_))
        ));

        let int_column = ColumnSpec::new("floor", DataType::Integer);
        assert!(matches!(
            MigrationPlan::new(properties(), int_column.clone(), Value::from("3")),
            Err(SchemaError::InvalidSpec(_))
        ));
        assert!(MigrationPlan::new(properties(), int_column, Value::Integer(3)).is_ok());

        assert!(matches!(
            MigrationPlan::new(properties(), status(), Value::from("")),
            Err(SchemaError::InvalidSpec(_))
        ));
        assert!(matches!(
            MigrationPlan::new(properties(), status(), Value::Null),
            Err(SchemaError::InvalidSpec(_))
        ));
    }

    #[test]
    fn test_unmodelled_type_names() {
        let injected = ColumnSpec::new("status", DataType::parse("text; DROP TABLE properties"));
        let err = MigrationPlan::new(properties(), injected, Value::from("x")).unwrap_err();
        assert!(matches!(err, SchemaError::InvalidSpec(_)));
        assert!(err.to_string().contains("DROP TABLE"));

        let commented = ColumnSpec::new("status", DataType::parse("text -- trailing"));
        assert!(MigrationPlan::new(properties(), commented, Value::from("x")).is_err());

        let price = ColumnSpec::new("price", DataType::parse("numeric(12, 2)"));
        let plan = MigrationPlan::new(properties(), price, Value::Integer(0)).unwrap();
        assert!(plan.statements()[1].ends_with("ADD COLUMN \"price\" numeric(12, 2)"));
    }

    #[test]
    fn test_statements_order() {
        let plan =
            MigrationPlan::new(properties(), status().not_null(), Value::from("거래중")).unwrap();
        let statements = plan.statements();

        assert_eq!(statements.len(), 7);
        assert_eq!(statements[0], "BEGIN");
        assert!(statements[1].contains("ADD COLUMN \"status\" TEXT"));
        assert!(statements[2].starts_with("UPDATE"));
        assert!(statements[3].contains("SET DEFAULT '거래중'"));
        assert!(statements[4].ends_with("SET NOT NULL"));
        assert!(statements[5].contains("ADD CONSTRAINT \"properties_status_check\""));
        assert_eq!(statements[6], "COMMIT");
    }

    #[test]
    fn test_statements_without_optional_steps() {
        let spec = ColumnSpec::new("note", DataType::Text);
        let plan = MigrationPlan::new(properties(), spec, Value::from("-")).unwrap();
        assert_eq!(plan.statements().len(), 4);
        assert!(plan.check.is_none());
    }
}
