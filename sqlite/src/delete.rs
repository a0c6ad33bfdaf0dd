//! Deletes, cascading into array and child tables.
//!
//! Removing a row also removes its array rows and, recursively, the child
//! rows linked to it through their parent key.

use tablemap_core::{SqlValue, TableDescriptor};
use tablemap_db::{Database, Filter, quote_identifier};

use crate::convert::{from_value, to_value};
use crate::error::Result;
use crate::schema::ID_COLUMN;
use crate::session::Session;

/// Deletes the rows of `table` whose `column` equals `value`, along with
/// everything they own. Returns the number of rows removed from `table`.
pub(crate) fn delete_dependents(
    session: &mut Session,
    db: &mut Database,
    table: &TableDescriptor,
    column: &str,
    value: &SqlValue,
) -> Result<usize> {
    let filter = Filter::by_column(column, to_value(value.clone()));
    delete_matching(session, db, table, &filter)
}

/// Deletes the rows of `table` selected by `filter`, along with everything
/// they own.
pub(crate) fn delete_matching(
    session: &mut Session,
    db: &mut Database,
    table: &TableDescriptor,
    filter: &Filter,
) -> Result<usize> {
    let quoted = quote_identifier(table.table_name());
    if let Some(primary_key) = table.primary_key() {
        if table.has_dependents() {
            let sql = format!(
                "SELECT {} FROM {quoted} {}",
                quote_identifier(primary_key.storage_name()),
                filter.clause
            );
            let keys = db.query(sql.trim_end(), &filter.params)?;
            for row in keys.rows {
                if let Some(key) = row.into_iter().next() {
                    delete_owned(session, db, table, &from_value(key))?;
                }
            }
        }
    }
    let sql = format!("DELETE FROM {quoted} {}", filter.clause);
    Ok(db.execute(sql.trim_end(), &filter.params)?)
}

/// Deletes the array rows and child rows owned by the row keyed `key`.
pub(crate) fn delete_owned(
    session: &mut Session,
    db: &mut Database,
    table: &TableDescriptor,
    key: &SqlValue,
) -> Result<()> {
    for array in table.array_tables() {
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?1",
            quote_identifier(array.storage_name()),
            quote_identifier(ID_COLUMN)
        );
        db.execute(&sql, &[to_value(key.clone())])?;
    }
    for field in table.child_tables() {
        let Some(child) = field.child_descriptor() else {
            continue;
        };
        let Some(parent_key) = child.parent_key() else {
            continue;
        };
        session.with_secondary(db, field, |session, db| {
            if !db.table_exists(child.table_name())? {
                return Ok(0);
            }
            delete_dependents(session, db, child, parent_key.storage_name(), key)
        })?;
    }
    Ok(())
}

/// Deletes one row by primary key, with everything it owns.
pub(crate) fn delete_row(
    session: &mut Session,
    db: &mut Database,
    table: &TableDescriptor,
    primary_key_column: &str,
    key: &SqlValue,
) -> Result<usize> {
    delete_owned(session, db, table, key)?;
    let sql = format!(
        "DELETE FROM {} WHERE {} = ?1",
        quote_identifier(table.table_name()),
        quote_identifier(primary_key_column)
    );
    Ok(db.execute(&sql, &[to_value(key.clone())])?)
}
