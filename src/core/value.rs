use std::fmt;
use std::hash::{Hash, Hasher};

use serde::{Deserialize, Serialize};

use crate::core::{Result, SchemaError};

/// A single column value as seen by the migration runner.
///
/// Catalog defaults, allowed-value sets and histogram keys all use this type.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Text(String),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "NULL",
            Self::Integer(_) => "INTEGER",
            Self::Float(_) => "FLOAT",
            Self::Text(_) => "TEXT",
            Self::Boolean(_) => "BOOLEAN",
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// True for the values the normalization step rewrites: NULL and `''`.
    pub fn is_null_or_empty(&self) -> bool {
        match self {
            Self::Null => true,
            Self::Text(s) => s.is_empty(),
            _ => false,
        }
    }

    /// Parses operator input (CLI flag, env) into a value of `data_type`.
    ///
    /// Unknown catalog types keep the raw text and let the database coerce it.
    pub fn parse_as(raw: &str, data_type: &DataType) -> Result<Self> {
        let invalid = || {
            SchemaError::InvalidSpec(format!(
                "'{}' is not a valid {} value",
                raw, data_type
            ))
        };

        match data_type {
            DataType::Text | DataType::Other(_) => Ok(Self::Text(raw.to_string())),
            DataType::Integer => raw.trim().parse().map(Self::Integer).map_err(|_| invalid()),
            DataType::Float => raw.trim().parse().map(Self::Float).map_err(|_| invalid()),
            DataType::Boolean => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "t" | "yes" | "1" => Ok(Self::Boolean(true)),
                "false" | "f" | "no" | "0" => Ok(Self::Boolean(false)),
                _ => Err(invalid()),
            },
        }
    }

    /// Renders the value as a PostgreSQL literal.
    pub fn to_sql_literal(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Boolean(b) => (if *b { "TRUE" } else { "FALSE" }).to_string(),
            Self::Integer(i) => i.to_string(),
            Self::Float(f) if f.is_finite() => f.to_string(),
            Self::Float(f) => format!("'{}'::double precision", f),
            Self::Text(s) => format!("'{}'", s.replace('\'', "''")),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Null, Self::Null) => true,
            (Self::Integer(a), Self::Integer(b)) => a == b,
            (Self::Float(a), Self::Float(b)) => a.to_bits() == b.to_bits(),
            (Self::Text(a), Self::Text(b)) => a == b,
            (Self::Boolean(a), Self::Boolean(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        match self {
            Self::Null => 0u8.hash(state),
            Self::Integer(i) => {
                1u8.hash(state);
                i.hash(state);
            }
            Self::Float(f) => {
                2u8.hash(state);
                f.to_bits().hash(state);
            }
            Self::Text(s) => {
                3u8.hash(state);
                s.hash(state);
            }
            Self::Boolean(b) => {
                4u8.hash(state);
                b.hash(state);
            }
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => write!(f, "NULL"),
            Self::Integer(i) => write!(f, "{}", i),
            Self::Float(fl) => write!(f, "{}", fl),
            Self::Text(s) => write!(f, "{}", s),
            Self::Boolean(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Integer(i)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Self::Float(f)
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::Text(s)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::Text(s.to_string())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

/// Column data type, as requested by the operator or read back from the catalog.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataType {
    Integer,
    Float,
    Text,
    Boolean,
    /// Any catalog type this crate does not model (e.g. `timestamp with time zone`).
    Other(String),
}

impl DataType {
    /// Parses both operator spellings (`text`, `int`) and catalog output
    /// of `format_type` (`character varying(20)`, `double precision`).
    pub fn parse(raw: &str) -> Self {
        let normalized = raw.trim().to_ascii_lowercase();
        match normalized.as_str() {
            "text" | "string" => Self::Text,
            "int" | "int2" | "int4" | "int8" | "integer" | "bigint" | "smallint" => {
                Self::Integer
            }
            "float" | "float4" | "float8" | "real" | "double" | "double precision" => {
                Self::Float
            }
            "bool" | "boolean" => Self::Boolean,
            other if other.starts_with("character varying")
                || other.starts_with("varchar")
                || other.starts_with("character(")
                || other.starts_with("char(") =>
            {
                Self::Text
            }
            _ => Self::Other(raw.trim().to_string()),
        }
    }

    pub fn is_compatible(&self, value: &Value) -> bool {
        match (self, value) {
            (_, Value::Null) => true,
            (Self::Integer, Value::Integer(_)) => true,
            (Self::Float, Value::Float(_)) => true,
            (Self::Float, Value::Integer(_)) => true,
            (Self::Text, Value::Text(_)) => true,
            (Self::Boolean, Value::Boolean(_)) => true,
            // The database decides for types we do not model.
            (Self::Other(_), _) => true,
            _ => false,
        }
    }

    /// Type name used in `ALTER TABLE ... ADD COLUMN`.
    pub fn sql_name(&self) -> &str {
        match self {
            Self::Integer => "BIGINT",
            Self::Float => "DOUBLE PRECISION",
            Self::Text => "TEXT",
            Self::Boolean => "BOOLEAN",
            Self::Other(name) => name,
        }
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.sql_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_equality() {
        assert_eq!(Value::Integer(42), Value::Integer(42));
        assert_eq!(Value::from("거래중"), Value::Text("거래중".into()));
        assert_ne!(Value::Integer(1), Value::Float(1.0));
    }

    #[test]
    fn test_null_or_empty() {
        assert!(Value::Null.is_null_or_empty());
        assert!(Value::Text(String::new()).is_null_or_empty());
        assert!(!Value::Text(" ".into()).is_null_or_empty());
        assert!(!Value::Integer(0).is_null_or_empty());
    }

    #[test]
    fn test_sql_literal_escapes_quotes() {
        assert_eq!(Value::from("it's").to_sql_literal(), "'it''s'");
        assert_eq!(Value::Integer(7).to_sql_literal(), "7");
        assert_eq!(Value::Boolean(false).to_sql_literal(), "FALSE");
        assert_eq!(Value::Null.to_sql_literal(), "NULL");
    }

    #[test]
    fn test_parse_as() {
        assert_eq!(Value::parse_as("12", &DataType::Integer).unwrap(), Value::Integer(12));
        assert_eq!(Value::parse_as("yes", &DataType::Boolean).unwrap(), Value::Boolean(true));
        assert!(Value::parse_as("twelve", &DataType::Integer).is_err());
        assert_eq!(
            Value::parse_as("거래중", &DataType::Text).unwrap(),
            Value::Text("거래중".into())
        );
    }

    #[test]
    fn test_data_type_parse() {
        assert_eq!(DataType::parse("TEXT"), DataType::Text);
        assert_eq!(DataType::parse("character varying(20)"), DataType::Text);
        assert_eq!(DataType::parse("bigint"), DataType::Integer);
        assert_eq!(DataType::parse("double precision"), DataType::Float);
        assert_eq!(
            DataType::parse("timestamp with time zone"),
            DataType::Other("timestamp with time zone".into())
        );
    }

    #[test]
    fn test_type_compatibility() {
        assert!(DataType::Integer.is_compatible(&Value::Integer(42)));
        assert!(DataType::Integer.is_compatible(&Value::Null));
        assert!(!DataType::Integer.is_compatible(&Value::Text("hello".into())));
        assert!(DataType::Float.is_compatible(&Value::Integer(1)));
    }
}
