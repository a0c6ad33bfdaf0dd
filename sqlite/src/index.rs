//! Index tables: string interning through `(ID, VALUE)` tables.
//!
//! A field marked with an index table stores a small integer in its own
//! column; the string lives once in the index table. Handlers are cached per
//! `(database path, table name)` and reloaded at most once per top-level
//! operation. New strings get `max id + 1` and are buffered until the
//! operation flushes them.

use std::collections::HashMap;
use std::path::PathBuf;

use rusqlite::types::Value;
use tablemap_db::{Database, quote_identifier};
use tracing::debug;

use crate::error::Result;
use crate::schema::{ID_COLUMN, VALUE_COLUMN};
use crate::validate::ensure_index_table;

/// In-memory view of one index table.
#[derive(Debug)]
pub(crate) struct IndexTable {
    name: String,
    by_id: HashMap<i64, String>,
    by_value: HashMap<String, i64>,
    max_id: i64,
    last_marker: Option<u64>,
    pending: Vec<(i64, String)>,
}

impl IndexTable {
    fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            by_id: HashMap::new(),
            by_value: HashMap::new(),
            max_id: 0,
            last_marker: None,
            pending: Vec::new(),
        }
    }

    fn insert(&mut self, id: i64, value: String) {
        self.max_id = self.max_id.max(id);
        self.by_value.insert(value.clone(), id);
        self.by_id.insert(id, value);
    }

    /// Returns the id of `value`, minting one if it is new. Empty strings
    /// are stored as NULL and get no id.
    pub(crate) fn resolve_id(&mut self, value: &str) -> Option<i64> {
        if value.is_empty() {
            return None;
        }
        if let Some(id) = self.by_value.get(value) {
            return Some(*id);
        }
        let id = self.max_id + 1;
        self.insert(id, value.to_string());
        self.pending.push((id, value.to_string()));
        Some(id)
    }

    pub(crate) fn resolve_value(&self, id: i64) -> Option<&str> {
        self.by_id.get(&id).map(String::as_str)
    }

    /// Reloads from the database unless already loaded for `marker`.
    pub(crate) fn reload_if_stale(&mut self, db: &mut Database, marker: u64) -> Result<()> {
        if self.last_marker == Some(marker) {
            return Ok(());
        }
        self.reload(db)?;
        self.last_marker = Some(marker);
        Ok(())
    }

    fn reload(&mut self, db: &mut Database) -> Result<()> {
        let sql = format!(
            "SELECT {}, {} FROM {}",
            quote_identifier(ID_COLUMN),
            quote_identifier(VALUE_COLUMN),
            quote_identifier(&self.name)
        );
        let result = db.query(&sql, &[])?;

        self.by_id.clear();
        self.by_value.clear();
        self.max_id = 0;
        for row in result.rows {
            let mut values = row.into_iter();
            if let (Some(Value::Integer(id)), Some(Value::Text(value))) =
                (values.next(), values.next())
            {
                self.insert(id, value);
            }
        }
        // Entries minted but not yet flushed stay visible.
        let pending = std::mem::take(&mut self.pending);
        for (id, value) in &pending {
            self.insert(*id, value.clone());
        }
        self.pending = pending;

        debug!(table = %self.name, entries = self.by_id.len(), "reloaded index table");
        Ok(())
    }

    pub(crate) fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Writes buffered entries with `INSERT OR REPLACE` and clears the buffer.
    pub(crate) fn flush(&mut self, db: &mut Database) -> Result<()> {
        if self.pending.is_empty() {
            return Ok(());
        }
        let sql = format!(
            "INSERT OR REPLACE INTO {} ({}, {}) VALUES (?1, ?2)",
            quote_identifier(&self.name),
            quote_identifier(ID_COLUMN),
            quote_identifier(VALUE_COLUMN)
        );
        let pending = &self.pending;
        db.atomically(|db| -> Result<()> {
            for (id, value) in pending {
                db.execute(&sql, &[Value::Integer(*id), Value::Text(value.clone())])?;
            }
            Ok(())
        })?;
        debug!(table = %self.name, entries = self.pending.len(), "flushed index entries");
        self.pending.clear();
        Ok(())
    }
}

/// Index table handlers keyed by `(database path, table name)`.
#[derive(Debug, Default)]
pub(crate) struct IndexCache {
    tables: HashMap<(PathBuf, String), IndexTable>,
}

impl IndexCache {
    /// Returns the handler for `name` in `db`, creating the backing table and
    /// loading it on first use. The first load counts as the reload for
    /// `marker`. `None` when the table is absent and cannot be created
    /// (read-only database).
    pub(crate) fn get_or_create(
        &mut self,
        db: &mut Database,
        name: &str,
        marker: u64,
    ) -> Result<Option<&mut IndexTable>> {
        let key = (db.path().to_path_buf(), name.to_string());
        if !self.tables.contains_key(&key) {
            if !ensure_index_table(db, name)? {
                return Ok(None);
            }
            let mut table = IndexTable::new(name);
            table.reload_if_stale(db, marker)?;
            self.tables.insert(key.clone(), table);
        }
        Ok(self.tables.get_mut(&key))
    }

    /// Handlers with unflushed entries, with the database path they belong to.
    pub(crate) fn pending_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut IndexTable)> {
        self.tables
            .iter_mut()
            .filter(|(_, table)| table.has_pending())
            .map(|((path, _), table)| (path, table))
    }

    pub(crate) fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tablemap_db::DatabaseConfig;

    fn setup_db() -> Database {
        Database::new(DatabaseConfig::in_memory()).unwrap()
    }

    #[test]
    fn test_mints_sequential_ids_and_dedups() {
        let mut db = setup_db();
        let mut cache = IndexCache::default();
        let table = cache.get_or_create(&mut db, "Cities", 0).unwrap().unwrap();

        assert_eq!(table.resolve_id("Oslo"), Some(1));
        assert_eq!(table.resolve_id("Lima"), Some(2));
        assert_eq!(table.resolve_id("Oslo"), Some(1));
        assert_eq!(table.resolve_id(""), None);
        assert_eq!(table.resolve_value(2), Some("Lima"));
        assert_eq!(table.resolve_value(9), None);
    }

    #[test]
    fn test_flush_persists_and_reload_sees_entries() {
        let mut db = setup_db();
        let mut cache = IndexCache::default();
        {
            let table = cache.get_or_create(&mut db, "Cities", 0).unwrap().unwrap();
            table.resolve_id("Oslo");
            table.flush(&mut db).unwrap();
            assert!(!table.has_pending());
        }
        db.execute(
            "INSERT INTO \"Cities\" (\"ID\", \"VALUE\") VALUES (7, 'Kyiv')",
            &[],
        )
        .unwrap();

        let table = cache.get_or_create(&mut db, "Cities", 0).unwrap().unwrap();
        table.reload_if_stale(&mut db, 1).unwrap();
        assert_eq!(table.resolve_value(7), Some("Kyiv"));
        assert_eq!(table.resolve_id("New"), Some(8));

        // Same marker: no reload, so rows inserted meanwhile stay invisible.
        db.execute(
            "INSERT INTO \"Cities\" (\"ID\", \"VALUE\") VALUES (20, 'Rome')",
            &[],
        )
        .unwrap();
        table.reload_if_stale(&mut db, 1).unwrap();
        assert_eq!(table.resolve_value(20), None);
        // Unflushed entries survive a reload.
        table.reload_if_stale(&mut db, 2).unwrap();
        assert_eq!(table.resolve_value(20), Some("Rome"));
        assert_eq!(table.resolve_value(8), Some("New"));
    }

    #[test]
    fn test_first_load_counts_for_its_marker() {
        let mut db = setup_db();
        let mut cache = IndexCache::default();
        cache.get_or_create(&mut db, "Cities", 5).unwrap().unwrap();
        db.execute(
            "INSERT INTO \"Cities\" (\"ID\", \"VALUE\") VALUES (1, 'Oslo')",
            &[],
        )
        .unwrap();

        let table = cache.get_or_create(&mut db, "Cities", 5).unwrap().unwrap();
        table.reload_if_stale(&mut db, 5).unwrap();
        assert_eq!(table.resolve_value(1), None);
        table.reload_if_stale(&mut db, 6).unwrap();
        assert_eq!(table.resolve_value(1), Some("Oslo"));
    }

    #[test]
    fn test_existing_entries_are_loaded_on_first_use() {
        let mut db = setup_db();
        db.execute_batch(
            "CREATE TABLE \"Tags\" (\"ID\" INTEGER PRIMARY KEY, \"VALUE\" TEXT UNIQUE); \
             INSERT INTO \"Tags\" VALUES (3, 'red');",
        )
        .unwrap();
        let mut cache = IndexCache::default();
        let table = cache.get_or_create(&mut db, "Tags", 0).unwrap().unwrap();
        assert_eq!(table.resolve_id("red"), Some(3));
        assert_eq!(table.resolve_id("blue"), Some(4));
    }
}
