//! Mapper state shared by every recursive call of one operation.

use std::collections::HashMap;
use std::path::PathBuf;

use tablemap_core::{DescriptorRegistry, FieldDescriptor};
use tablemap_db::Database;
use tracing::{debug, warn};

use crate::error::Result;
use crate::index::IndexCache;

/// Descriptor registry, index-table cache and secondary databases.
#[derive(Debug, Default)]
pub(crate) struct Session {
    pub(crate) registry: DescriptorRegistry,
    pub(crate) indexes: IndexCache,
    secondaries: HashMap<PathBuf, Database>,
    marker: u64,
}

impl Session {
    /// Stamps a new top-level operation; index tables reload once per stamp.
    pub(crate) fn next_marker(&mut self) -> u64 {
        self.marker += 1;
        self.marker
    }

    pub(crate) fn marker(&self) -> u64 {
        self.marker
    }

    /// Runs `body` against the secondary database `field` declares, or
    /// against `db` when it declares none. Relative paths resolve against
    /// the directory of `db`.
    pub(crate) fn with_secondary<R>(
        &mut self,
        db: &mut Database,
        field: &FieldDescriptor,
        body: impl FnOnce(&mut Self, &mut Database) -> Result<R>,
    ) -> Result<R> {
        let Some(declared) = field.secondary_database() else {
            return body(self, db);
        };
        let path = if declared.is_absolute() {
            declared.to_path_buf()
        } else {
            db.directory().join(declared)
        };

        let mut secondary = match self.secondaries.remove(&path) {
            Some(secondary) => secondary,
            None => Database::new(db.config().with_path(&path))?,
        };
        debug!(field = field.name(), path = %path.display(), "switched to secondary database");

        let previous = secondary.set_keep_open(true);
        let outcome = body(self, &mut secondary);
        secondary.set_keep_open(previous);
        self.secondaries.insert(path, secondary);
        outcome
    }

    /// Flushes every index table with pending entries into the database it
    /// belongs to. All tables are attempted; the first error is returned.
    pub(crate) fn flush_indexes(&mut self, primary: &mut Database) -> Result<()> {
        let mut first_error = None;
        for (path, table) in self.indexes.pending_mut() {
            let db = if path.as_path() == primary.path() {
                &mut *primary
            } else if let Some(secondary) = self.secondaries.get_mut(path) {
                secondary
            } else {
                warn!(path = %path.display(), "no open database for pending index entries");
                continue;
            };
            if let Err(err) = table.flush(db) {
                first_error.get_or_insert(err);
            }
        }
        first_error.map_or(Ok(()), Err)
    }

    /// Closes secondary connections that are not configured to stay open.
    pub(crate) fn release_secondaries(&mut self) {
        for secondary in self.secondaries.values_mut() {
            secondary.release();
        }
    }

    /// Drops cached descriptors and index entries so both are rebuilt from
    /// the database on next use.
    pub(crate) fn reset(&mut self) {
        self.registry = DescriptorRegistry::new();
        self.indexes.clear();
    }
}
