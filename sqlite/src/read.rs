//! The recursive read path.

use std::any::Any;
use std::sync::Arc;

use rusqlite::types::Value;
use tablemap_core::{FieldDescriptor, FieldDiagnostic, SqlValue, TableDescriptor};
use tablemap_db::{Database, Filter, quote_identifier};

use crate::convert::{from_value, to_value};
use crate::error::{MapError, Result};
use crate::schema::{ID_COLUMN, VALUE_COLUMN};
use crate::session::Session;
use crate::validate::validate;

/// Reads the rows of `table` matching `filter`, with their index values,
/// arrays and children.
///
/// Returns `Ok(None)` when the table is absent from a read-only database.
/// Values that fail to convert leave their field at its default and are
/// recorded in `diagnostics`.
pub(crate) fn read_table(
    session: &mut Session,
    db: &mut Database,
    table: &Arc<TableDescriptor>,
    filter: &Filter,
    diagnostics: &mut Vec<FieldDiagnostic>,
) -> Result<Option<Vec<Box<dyn Any>>>> {
    if !validate(session, db, table)? {
        return Ok(None);
    }
    let marker = session.marker();
    for field in table.index_keys() {
        if let Some(name) = field.index_table() {
            if let Some(index) = session.indexes.get_or_create(db, name, marker)? {
                index.reload_if_stale(db, marker)?;
            }
        }
    }

    let sql = format!(
        "SELECT * FROM {} {}",
        quote_identifier(table.table_name()),
        filter.clause
    );
    let result = db.query(sql.trim_end(), &filter.params)?;
    let positions: Vec<(&FieldDescriptor, usize)> = table
        .stored_columns()
        .filter_map(|field| {
            result
                .column_index(field.storage_name())
                .map(|position| (field, position))
        })
        .collect();

    let mut records = Vec::with_capacity(result.len());
    for (row_index, row) in result.rows.into_iter().enumerate() {
        let mut record = table.instantiate();
        let mut note = |column: &str, error| {
            diagnostics.push(FieldDiagnostic {
                table: table.table_name().to_string(),
                column: column.to_string(),
                row: row_index,
                error,
            });
        };

        for &(field, position) in &positions {
            let value = from_value(row[position].clone());
            if value.is_null() {
                continue;
            }
            if let Some(index_table) = field.index_table() {
                let id = match value.as_integer("index id") {
                    Ok(id) => id,
                    Err(err) => {
                        note(field.storage_name(), err);
                        continue;
                    }
                };
                let text = session
                    .indexes
                    .get_or_create(db, index_table, marker)?
                    .and_then(|index| index.resolve_value(id).map(str::to_string));
                if let Some(text) = text {
                    if let Err(err) = field.write_value(record.as_mut(), SqlValue::Text(text)) {
                        note(field.storage_name(), err);
                    }
                }
                continue;
            }
            if let Err(err) = field.write_value(record.as_mut(), value) {
                note(field.storage_name(), err);
            }
        }

        if let Some(primary_key) = table.primary_key() {
            let key = primary_key
                .read_value(record.as_ref())
                .map_err(|err| MapError::conversion(table.table_name(), primary_key.storage_name(), err))?;
            for array in table.array_tables() {
                let elements = read_array(db, array, &key)?;
                if let Err(err) = array.write_elements(record.as_mut(), elements) {
                    note(array.storage_name(), err);
                }
            }
            for field in table.child_tables() {
                let children = read_children(session, db, field, &key, diagnostics)?;
                if let Some(children) = children {
                    if let Err(err) = field.assign_children(record.as_mut(), children) {
                        diagnostics.push(FieldDiagnostic {
                            table: table.table_name().to_string(),
                            column: field.storage_name().to_string(),
                            row: row_index,
                            error: err,
                        });
                    }
                }
            }
        }
        records.push(record);
    }
    Ok(Some(records))
}

fn read_array(db: &mut Database, array: &FieldDescriptor, key: &SqlValue) -> Result<Vec<SqlValue>> {
    let sql = format!(
        "SELECT {} FROM {} WHERE {} = ?1 ORDER BY rowid",
        quote_identifier(VALUE_COLUMN),
        quote_identifier(array.storage_name()),
        quote_identifier(ID_COLUMN)
    );
    let result = db.query(&sql, &[to_value(key.clone())])?;
    Ok(result
        .rows
        .into_iter()
        .filter_map(|row| row.into_iter().next())
        .filter(|value| *value != Value::Null)
        .map(from_value)
        .collect())
}

fn read_children(
    session: &mut Session,
    db: &mut Database,
    field: &FieldDescriptor,
    key: &SqlValue,
    diagnostics: &mut Vec<FieldDiagnostic>,
) -> Result<Option<Vec<Box<dyn Any>>>> {
    let Some(child) = field.child_descriptor() else {
        return Ok(None);
    };
    let Some(parent_key) = child.parent_key() else {
        return Ok(None);
    };
    let filter = Filter::by_column(parent_key.storage_name(), to_value(key.clone()));
    session.with_secondary(db, field, |session, db| {
        read_table(session, db, child, &filter, diagnostics)
    })
}
