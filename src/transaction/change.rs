// ============================================================================
// Transaction Change Journal
// ============================================================================
//
// Every mutation applied to a working copy is journaled so that a finished
// transaction can be reported (and asserted on in tests) after the fact.
//
// ============================================================================

use std::fmt;

use crate::core::{TableRef, Value};

/// A single schema or data mutation made inside a transaction
#[derive(Debug, Clone, PartialEq)]
pub enum Change {
    AddColumn { table: TableRef, column: String },

    NormalizeRows {
        table: TableRef,
        column: String,
        rows: u64,
    },

    SetDefault {
        table: TableRef,
        column: String,
        value: Value,
    },

    SetNotNull { table: TableRef, column: String },

    AddCheck { table: TableRef, name: String },
}

impl Change {
    /// Get the table affected by this change
    pub fn table(&self) -> &TableRef {
        match self {
            Change::AddColumn { table, .. }
            | Change::NormalizeRows { table, .. }
            | Change::SetDefault { table, .. }
            | Change::SetNotNull { table, .. }
            | Change::AddCheck { table, .. } => table,
        }
    }

    /// Check if this is a DDL (Data Definition Language) change
    pub fn is_ddl(&self) -> bool {
        !matches!(self, Change::NormalizeRows { .. })
    }
}

impl fmt::Display for Change {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Change::AddColumn { table, column } => write!(f, "add column {}.{}", table, column),
            Change::NormalizeRows { table, column, rows } => {
                write!(f, "normalize {} row(s) of {}.{}", rows, table, column)
            }
            Change::SetDefault { table, column, value } => {
                write!(f, "set default of {}.{} to {}", table, column, value)
            }
            Change::SetNotNull { table, column } => {
                write!(f, "set {}.{} not null", table, column)
            }
            Change::AddCheck { table, name } => write!(f, "add check {} on {}", name, table),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_change_classification() {
        let table = TableRef::new("public", "properties");
        let add = Change::AddColumn {
            table: table.clone(),
            column: "status".to_string(),
        };
        let normalize = Change::NormalizeRows {
            table: table.clone(),
            column: "status".to_string(),
            rows: 10,
        };

        assert!(add.is_ddl());
        assert!(!normalize.is_ddl());
        assert_eq!(normalize.table(), &table);
        assert_eq!(
            normalize.to_string(),
            "normalize 10 row(s) of public.properties.status"
        );
    }
}
