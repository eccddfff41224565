use std::collections::HashMap;
use std::sync::Arc;

use crate::core::{Result, SchemaError, TableRef};
use super::Table;

/// Tables of the in-memory database.
///
/// Cloning is O(1); the first mutation of a clone copies the map
/// (copy-on-write), which is what gives a transaction its private
/// working copy.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Catalog {
    tables: Arc<HashMap<TableRef, Table>>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a table - returns a NEW Catalog, the old one is untouched
    pub fn with_table(self, name: TableRef, table: Table) -> Result<Self> {
        if self.tables.contains_key(&name) {
            return Err(SchemaError::Execution(format!(
                "relation \"{}\" already exists",
                name
            )));
        }

        let mut new_tables = (*self.tables).clone();
        new_tables.insert(name, table);

        Ok(Self {
            tables: Arc::new(new_tables),
        })
    }

    pub fn get_table(&self, name: &TableRef) -> Result<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))
    }

    /// Mutable access; detaches this catalog from any clone sharing its map.
    pub fn table_mut(&mut self, name: &TableRef) -> Result<&mut Table> {
        Arc::make_mut(&mut self.tables)
            .get_mut(name)
            .ok_or_else(|| SchemaError::TableNotFound(name.to_string()))
    }

    pub fn table_exists(&self, name: &TableRef) -> bool {
        self.tables.contains_key(name)
    }

    pub fn list_tables(&self) -> Vec<&TableRef> {
        self.tables.keys().collect()
    }

    /// True when both catalogs share the same underlying map.
    pub fn shares_storage_with(&self, other: &Catalog) -> bool {
        Arc::ptr_eq(&self.tables, &other.tables)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::DataType;
    use crate::storage::ColumnDef;

    fn properties() -> TableRef {
        TableRef::new("public", "properties")
    }

    #[test]
    fn test_with_table_rejects_duplicates() {
        let table = Table::new(vec![ColumnDef::new("id", DataType::Integer)]).unwrap();
        let catalog = Catalog::new().with_table(properties(), table.clone()).unwrap();

        assert!(catalog.table_exists(&properties()));
        assert!(catalog.clone().with_table(properties(), table).is_err());
        assert!(matches!(
            catalog.get_table(&TableRef::new("public", "agents")),
            Err(SchemaError::TableNotFound(_))
        ));
    }

    #[test]
    fn test_clone_is_copy_on_write() {
        let table = Table::new(vec![ColumnDef::new("id", DataType::Integer)]).unwrap();
        let committed = Catalog::new().with_table(properties(), table).unwrap();

        let mut working = committed.clone();
        assert!(working.shares_storage_with(&committed));

        working
            .table_mut(&properties())
            .unwrap()
            .add_column(ColumnDef::new("status", DataType::Text))
            .unwrap();

        assert!(!working.shares_storage_with(&committed));
        assert_eq!(committed.get_table(&properties()).unwrap().columns().len(), 1);
        assert_eq!(working.get_table(&properties()).unwrap().columns().len(), 2);
    }
}
