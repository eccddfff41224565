//! PostgreSQL statement rendering.
//!
//! Identifiers are always double-quoted and literals are rendered inline, so
//! each statement can be shown verbatim in a dry run and executed unchanged.

use crate::core::{CheckConstraint, DataType, TableRef, Value};

/// Resolves an ordinary or partitioned table to its oid.
pub const TABLE_LOOKUP: &str = "\
SELECT c.oid \
FROM pg_catalog.pg_class c \
JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace \
WHERE n.nspname = $1 AND c.relname = $2 AND c.relkind IN ('r', 'p')";

/// Columns of one relation, in ordinal order. `$2` filters by name when not NULL.
pub const COLUMN_LOOKUP: &str = "\
SELECT a.attname::text, pg_catalog.format_type(a.atttypid, a.atttypmod), a.attnotnull, \
       pg_catalog.pg_get_expr(d.adbin, d.adrelid) \
FROM pg_catalog.pg_attribute a \
LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum \
WHERE a.attrelid = $1 AND a.attnum > 0 AND NOT a.attisdropped \
  AND ($2::text IS NULL OR a.attname = $2::text) \
ORDER BY a.attnum";

/// CHECK constraints of one relation whose definition mentions `$2`.
pub const CONSTRAINT_LOOKUP: &str = "\
SELECT con.conname::text, pg_catalog.pg_get_constraintdef(con.oid) \
FROM pg_catalog.pg_constraint con \
WHERE con.conrelid = $1 AND con.contype = 'c' \
  AND position($2 in pg_catalog.pg_get_constraintdef(con.oid)) > 0 \
ORDER BY con.conname";

pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

pub fn qualified(table: &TableRef) -> String {
    format!("{}.{}", quote_ident(&table.schema), quote_ident(&table.name))
}

pub fn add_column(table: &TableRef, column: &str, data_type: &DataType) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        qualified(table),
        quote_ident(column),
        data_type.sql_name()
    )
}

/// Rewrites NULL and empty-string values; `::text` keeps the empty-string
/// test valid for non-text columns.
pub fn normalize_empty(table: &TableRef, column: &str, value: &Value) -> String {
    let col = quote_ident(column);
    format!(
        "UPDATE {} SET {col} = {} WHERE {col} IS NULL OR {col}::text = ''",
        qualified(table),
        value.to_sql_literal(),
    )
}

pub fn set_default(table: &TableRef, column: &str, value: &Value) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} SET DEFAULT {}",
        qualified(table),
        quote_ident(column),
        value.to_sql_literal()
    )
}

pub fn set_not_null(table: &TableRef, column: &str) -> String {
    format!(
        "ALTER TABLE {} ALTER COLUMN {} SET NOT NULL",
        qualified(table),
        quote_ident(column)
    )
}

pub fn add_check(table: &TableRef, check: &CheckConstraint) -> String {
    let values: Vec<String> = check.allowed.iter().map(Value::to_sql_literal).collect();
    format!(
        "ALTER TABLE {} ADD CONSTRAINT {} CHECK ({} IN ({}))",
        qualified(table),
        quote_ident(&check.name),
        quote_ident(&check.column),
        values.join(", ")
    )
}

pub fn value_counts(table: &TableRef, column: &str) -> String {
    format!(
        "SELECT {}::text, count(*) FROM {} GROUP BY 1 ORDER BY 2 DESC, 1",
        quote_ident(column),
        qualified(table)
    )
}

pub fn row_count(table: &TableRef) -> String {
    format!("SELECT count(*) FROM {}", qualified(table))
}
