//! Schema validation against the live database.
//!
//! [`validate`] makes a descriptor's assumptions true of the database or
//! fails:
//!
//! - an absent table is created when auto-creation is on and the database
//!   is writable; on a read-only database the descriptor stays unvalidated
//!   and `validate` returns `Ok(false)`; otherwise the call fails
//! - a declared primary key must be the table's only primary key column
//! - every stored column must exist with a compatible declared type; extra
//!   live columns are ignored
//! - array, index and child tables are checked recursively, child tables in
//!   their secondary database when one is declared

use std::sync::Arc;

use tablemap_core::{FieldDescriptor, MappingError, StorageType, TableDescriptor};
use tablemap_db::{ColumnInfo, Database};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::schema::{
    ID_COLUMN, VALUE_COLUMN, array_table_sql, index_table_sql, is_compatible, record_table_sql,
};
use crate::session::Session;

/// Validates `table` (and everything it owns) against `db`.
///
/// Returns `Ok(false)` when the table is absent from a read-only database.
///
/// # Errors
///
/// Returns [`MappingError::InvalidOperation`] for an absent table that may
/// not be created, [`MappingError::MissingPrimaryKey`] when the live primary
/// key does not match, and [`MappingError::Format`] for missing or
/// incompatible columns.
pub(crate) fn validate(
    session: &mut Session,
    db: &mut Database,
    table: &Arc<TableDescriptor>,
) -> Result<bool> {
    if table.is_validated() {
        return Ok(true);
    }
    let name = table.table_name();
    if !ensure_table(db, name, || record_table_sql(table))? {
        return Ok(false);
    }

    let live = db.list_columns(name)?;
    if let Some(primary_key) = table.primary_key() {
        check_primary_key(name, primary_key, &live)?;
    }
    for field in table.stored_columns() {
        check_column(name, field.storage_name(), field.storage_type(), &live)?;
    }

    for array in table.array_tables() {
        if !ensure_array_table(db, array.storage_name(), array.storage_type())? {
            return Ok(false);
        }
    }
    let marker = session.marker();
    for index in table.index_keys() {
        if let Some(index_table) = index.index_table() {
            if session.indexes.get_or_create(db, index_table, marker)?.is_none() {
                return Ok(false);
            }
        }
    }
    for field in table.child_tables() {
        let Some(child) = field.child_descriptor() else {
            continue;
        };
        let child_ok =
            session.with_secondary(db, field, |session, db| validate(session, db, child))?;
        if !child_ok {
            // Reads of this child degrade to empty until the table appears.
            warn!(
                table = name,
                child = child.table_name(),
                "child table is absent from a read-only database"
            );
        }
    }

    table.mark_validated();
    debug!(table = name, record = %table.record_type(), "validated table");
    Ok(true)
}

/// Ensures `name` exists, creating it from `ddl` when allowed.
///
/// Returns `Ok(false)` if the table is absent and the database read-only.
pub(crate) fn ensure_table(
    db: &mut Database,
    name: &str,
    ddl: impl FnOnce() -> String,
) -> Result<bool> {
    if db.table_exists(name)? {
        return Ok(true);
    }
    if db.is_read_only() {
        debug!(table = name, "table absent from read-only database");
        return Ok(false);
    }
    if !db.config().auto_create_tables {
        return Err(MappingError::InvalidOperation(format!(
            "table '{name}' does not exist in {} and automatic table creation is disabled",
            db.path().display()
        ))
        .into());
    }
    let sql = ddl();
    db.execute_batch(&sql)?;
    info!(table = name, path = %db.path().display(), "created table");
    Ok(true)
}

pub(crate) fn ensure_array_table(
    db: &mut Database,
    name: &str,
    element: StorageType,
) -> Result<bool> {
    if !ensure_table(db, name, || array_table_sql(name, element))? {
        return Ok(false);
    }
    let live = db.list_columns(name)?;
    check_column(name, ID_COLUMN, StorageType::Integer, &live)?;
    check_column(name, VALUE_COLUMN, element, &live)?;
    Ok(true)
}

pub(crate) fn ensure_index_table(db: &mut Database, name: &str) -> Result<bool> {
    if !ensure_table(db, name, || index_table_sql(name))? {
        return Ok(false);
    }
    let live = db.list_columns(name)?;
    check_column(name, ID_COLUMN, StorageType::Integer, &live)?;
    check_column(name, VALUE_COLUMN, StorageType::Text, &live)?;
    Ok(true)
}

fn check_primary_key(table: &str, field: &FieldDescriptor, live: &[ColumnInfo]) -> Result<()> {
    let keys: Vec<&ColumnInfo> = live.iter().filter(|column| column.primary_key).collect();
    if keys.len() != 1 {
        return Err(MappingError::MissingPrimaryKey {
            table: table.to_string(),
            found: keys.len(),
        }
        .into());
    }
    if !keys[0].name.eq_ignore_ascii_case(field.storage_name()) {
        return Err(MappingError::Format(format!(
            "primary key of table '{table}' is '{}', but field '{}' declares '{}'",
            keys[0].name,
            field.name(),
            field.storage_name()
        ))
        .into());
    }
    Ok(())
}

fn check_column(
    table: &str,
    column: &str,
    expected: StorageType,
    live: &[ColumnInfo],
) -> Result<()> {
    let Some(found) = live
        .iter()
        .find(|info| info.name.eq_ignore_ascii_case(column))
    else {
        return Err(
            MappingError::Format(format!("table '{table}' has no column '{column}'")).into(),
        );
    };
    if !is_compatible(&found.declared_type, expected) {
        return Err(MappingError::Format(format!(
            "column '{table}.{column}' is declared {}, expected {expected}",
            found.declared_type
        ))
        .into());
    }
    Ok(())
}
