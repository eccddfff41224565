pub mod error;
pub mod types;
pub mod value;

pub use error::{Result, SchemaError};
pub use types::{
    CheckConstraint, ColumnInfo, ColumnPresence, ConstraintInfo, Row, TableDescriptor, TableRef, ValueCount,
    validate_identifier, validate_type_name, MAX_IDENTIFIER_LEN,
};
pub use value::{DataType, Value};
