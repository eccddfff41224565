use std::fmt;

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

use super::{DataType, Result, SchemaError, Value};

pub type Row = Vec<Value>;

/// PostgreSQL truncates identifiers longer than this many bytes.
pub const MAX_IDENTIFIER_LEN: usize = 63;

const MAX_TYPE_NAME_LEN: usize = 128;

lazy_static! {
    static ref IDENTIFIER: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    // `numeric(10, 2)`, `timestamp(3) with time zone`, `pg_catalog.int4[]`
    static ref TYPE_NAME: Regex = Regex::new(
        r"^[A-Za-z_][A-Za-z0-9_]*(\.[A-Za-z_][A-Za-z0-9_]*)?( [A-Za-z_][A-Za-z0-9_]*)*( ?\([0-9]+( ?, ?[0-9]+)?\))?( [A-Za-z_][A-Za-z0-9_]*)*(\[[0-9]*\])*$"
    )
    .unwrap();
}

/// Checks that `name` can be used unquoted-equivalent as a table, column or
/// constraint name.
pub fn validate_identifier(kind: &str, name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(SchemaError::InvalidSpec(format!("{} name cannot be empty", kind)));
    }
    if name.len() > MAX_IDENTIFIER_LEN {
        return Err(SchemaError::InvalidSpec(format!(
            "{} name '{}' exceeds {} bytes",
            kind, name, MAX_IDENTIFIER_LEN
        )));
    }
    if !IDENTIFIER.is_match(name) {
        return Err(SchemaError::InvalidSpec(format!(
            "{} name '{}' must match [A-Za-z_][A-Za-z0-9_]*",
            kind, name
        )));
    }
    Ok(())
}

/// Checks a column type name that is passed through to DDL as written.
pub fn validate_type_name(name: &str) -> Result<()> {
    if name.len() > MAX_TYPE_NAME_LEN || !TYPE_NAME.is_match(name) {
        return Err(SchemaError::InvalidSpec(format!(
            "column type '{}' is not a valid type name",
            name
        )));
    }
    Ok(())
}

/// Schema-qualified table name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableRef {
    pub schema: String,
    pub name: String,
}

impl TableRef {
    pub fn new(schema: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            name: name.into(),
        }
    }

    /// Parses `schema.table` or `table`, filling in `default_schema` for the latter.
    pub fn parse(raw: &str, default_schema: &str) -> Result<Self> {
        let table = match raw.split_once('.') {
            Some((schema, name)) => Self::new(schema, name),
            None => Self::new(default_schema, raw),
        };
        table.validate()?;
        Ok(table)
    }

    pub fn validate(&self) -> Result<()> {
        validate_identifier("schema", &self.schema)?;
        validate_identifier("table", &self.name)
    }
}

impl fmt::Display for TableRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.schema, self.name)
    }
}

/// Column metadata as read back from the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ColumnInfo {
    pub name: String,
    pub data_type: DataType,
    pub nullable: bool,
    /// Default expression text exactly as the catalog reports it.
    pub default: Option<String>,
}

impl ColumnInfo {
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

    pub fn with_default(mut self, default: impl Into<String>) -> Self {
        self.default = Some(default.into());
        self
    }
}

/// Result of looking a column up in the catalog.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "presence", content = "column", rename_all = "snake_case")]
pub enum ColumnPresence {
    Absent,
    Present(ColumnInfo),
}

impl ColumnPresence {
    pub fn is_present(&self) -> bool {
        matches!(self, Self::Present(_))
    }

    pub fn column(&self) -> Option<&ColumnInfo> {
        match self {
            Self::Present(column) => Some(column),
            Self::Absent => None,
        }
    }
}

impl From<Option<ColumnInfo>> for ColumnPresence {
    fn from(column: Option<ColumnInfo>) -> Self {
        column.map_or(Self::Absent, Self::Present)
    }
}

impl fmt::Display for ColumnPresence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Absent => write!(f, "column absent"),
            Self::Present(column) => write!(
                f,
                "column present ({}, {}, default {})",
                column.data_type,
                if column.nullable { "nullable" } else { "not null" },
                column.default.as_deref().unwrap_or("none")
            ),
        }
    }
}

/// CHECK constraint whose definition references a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConstraintInfo {
    pub name: String,
    pub definition: String,
}

/// CHECK constraint restricting a column to an enumerated value set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CheckConstraint {
    pub name: String,
    pub column: String,
    pub allowed: Vec<Value>,
}

impl CheckConstraint {
    /// Constraint named `<table>_<column>_check`, cut to the identifier limit.
    pub fn for_column(table: &TableRef, column: &str, allowed: Vec<Value>) -> Self {
        let mut name = format!("{}_{}_check", table.name, column);
        if name.len() > MAX_IDENTIFIER_LEN {
            let mut end = MAX_IDENTIFIER_LEN;
            while !name.is_char_boundary(end) {
                end -= 1;
            }
            name.truncate(end);
        }
        Self {
            name,
            column: column.to_string(),
            allowed,
        }
    }

    /// NULL passes, as it does for a SQL `IN` check.
    pub fn admits(&self, value: &Value) -> bool {
        value.is_null() || self.allowed.contains(value)
    }

    /// Expression in the form `pg_get_constraintdef` reports it.
    pub fn definition(&self) -> String {
        let values: Vec<String> = self.allowed.iter().map(Value::to_sql_literal).collect();
        format!("CHECK ({} IN ({}))", self.column, values.join(", "))
    }
}

/// One bucket of the grouped value distribution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValueCount {
    pub value: Value,
    pub count: u64,
}

impl ValueCount {
    pub fn new(value: impl Into<Value>, count: u64) -> Self {
        Self {
            value: value.into(),
            count,
        }
    }
}

/// Read-only snapshot of a table's columns.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TableDescriptor {
    pub table: TableRef,
    pub columns: Vec<ColumnInfo>,
}

impl TableDescriptor {
    pub fn get_column(&self, name: &str) -> Option<&ColumnInfo> {
        self.columns.iter().find(|col| col.name == name)
    }
}
