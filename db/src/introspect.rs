//! Live schema introspection.

use rusqlite::types::Value;

use crate::connection::Database;
use crate::error::Result;

/// One column of a live table, as reported by `PRAGMA table_info`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnInfo {
    pub name: String,
    /// Declared type text; empty for untyped columns.
    pub declared_type: String,
    pub primary_key: bool,
}

impl Database {
    /// Names of all user tables, sorted.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`](crate::DatabaseError::Sqlite) on
    /// statement failure.
    pub fn list_tables(&mut self) -> Result<Vec<String>> {
        let result = self.query(
            "SELECT name FROM sqlite_master \
             WHERE type = 'table' AND name NOT LIKE 'sqlite_%' ORDER BY name",
            &[],
        )?;
        Ok(result
            .rows
            .into_iter()
            .filter_map(|row| match row.into_iter().next() {
                Some(Value::Text(name)) => Some(name),
                _ => None,
            })
            .collect())
    }

    /// Returns `true` if a table named `table` exists, ignoring ASCII case.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`](crate::DatabaseError::Sqlite) on
    /// statement failure.
    pub fn table_exists(&mut self, table: &str) -> Result<bool> {
        let found = self.query_scalar(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1 COLLATE NOCASE",
            &[Value::Text(table.to_string())],
        )?;
        Ok(found.is_some())
    }

    /// Columns of `table` in declaration order. Empty if the table is absent.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`](crate::DatabaseError::Sqlite) on
    /// statement failure.
    pub fn list_columns(&mut self, table: &str) -> Result<Vec<ColumnInfo>> {
        let result = self.query(
            "SELECT name, type, pk FROM pragma_table_info(?1) ORDER BY cid",
            &[Value::Text(table.to_string())],
        )?;
        let columns = result
            .rows
            .into_iter()
            .filter_map(|row| {
                let mut values = row.into_iter();
                let name = match values.next()? {
                    Value::Text(name) => name,
                    _ => return None,
                };
                let declared_type = match values.next()? {
                    Value::Text(declared) => declared,
                    _ => String::new(),
                };
                let primary_key = matches!(values.next()?, Value::Integer(pk) if pk > 0);
                Some(ColumnInfo {
                    name,
                    declared_type,
                    primary_key,
                })
            })
            .collect();
        Ok(columns)
    }

    /// Names of the primary key columns of `table`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`](crate::DatabaseError::Sqlite) on
    /// statement failure.
    pub fn list_primary_key_columns(&mut self, table: &str) -> Result<Vec<String>> {
        Ok(self
            .list_columns(table)?
            .into_iter()
            .filter(|column| column.primary_key)
            .map(|column| column.name)
            .collect())
    }
}
