pub mod catalog;
pub mod memory;
pub mod table;

pub use catalog::Catalog;
pub use memory::{FaultPoint, MemoryDatabase};
pub use table::{ColumnDef, Table};
