//! The recursive write path.

use std::any::Any;
use std::sync::Arc;

use rusqlite::types::Value;
use tablemap_core::{FieldDescriptor, FieldRole, MappingError, SqlValue, TableDescriptor};
use tablemap_db::{Database, quote_identifier};
use tracing::debug;

use crate::convert::{from_value, to_value};
use crate::delete::delete_dependents;
use crate::error::{MapError, Result};
use crate::schema::{ID_COLUMN, VALUE_COLUMN};
use crate::session::Session;
use crate::validate::validate;

/// Writes `records` into `table`, assigning keys to auto-keyed rows and
/// replacing their arrays and children.
pub(crate) fn write_records(
    session: &mut Session,
    db: &mut Database,
    table: &Arc<TableDescriptor>,
    records: Vec<&mut dyn Any>,
) -> Result<()> {
    db.ensure_writable("write")?;
    if !validate(session, db, table)? {
        return Err(MappingError::InvalidOperation(format!(
            "table '{}' could not be validated",
            table.table_name()
        ))
        .into());
    }
    let marker = session.marker();
    for field in table.index_keys() {
        if let Some(name) = field.index_table() {
            if let Some(index) = session.indexes.get_or_create(db, name, marker)? {
                index.reload_if_stale(db, marker)?;
            }
        }
    }

    for record in records {
        let key = write_row(session, db, table, &mut *record)?;
        let Some(key) = key else {
            continue;
        };
        for array in table.array_tables() {
            write_array(db, table, array, &*record, &key)?;
        }
        for field in table.child_tables() {
            write_children(session, db, table, field, &mut *record, &key)?;
        }
    }
    Ok(())
}

fn is_unassigned(key: &SqlValue) -> bool {
    matches!(key, SqlValue::Null | SqlValue::Integer(0))
}

/// Inserts or replaces one row. Returns its primary key, if the table has one.
fn write_row(
    session: &mut Session,
    db: &mut Database,
    table: &TableDescriptor,
    record: &mut dyn Any,
) -> Result<Option<SqlValue>> {
    let name = table.table_name();
    let read = |field: &FieldDescriptor, record: &dyn Any| {
        field
            .read_value(record)
            .map_err(|err| MapError::conversion(name, field.storage_name(), err))
    };

    let marker = session.marker();
    let primary_key = table.primary_key();
    let current_key = primary_key.map(|pk| read(pk, &*record)).transpose()?;
    let auto_key = current_key.as_ref().is_some_and(is_unassigned);

    let mut columns: Vec<&FieldDescriptor> = Vec::new();
    let mut values: Vec<SqlValue> = Vec::new();
    for field in table.stored_columns() {
        if auto_key && field.role() == FieldRole::PrimaryKey {
            continue;
        }
        let mut value = read(field, &*record)?;
        if let Some(index_table) = field.index_table() {
            value = match value {
                SqlValue::Text(text) => session
                    .indexes
                    .get_or_create(db, index_table, marker)?
                    .and_then(|index| index.resolve_id(&text))
                    .map_or(SqlValue::Null, SqlValue::Integer),
                _ => SqlValue::Null,
            };
        }
        columns.push(field);
        values.push(value);
    }

    if !auto_key {
        insert(db, name, "OR REPLACE", &columns, &values)?;
        return Ok(current_key);
    }
    let Some(primary_key) = primary_key else {
        return Ok(None);
    };

    let inserted = insert(db, name, "OR IGNORE", &columns, &values)?;
    let key = if inserted == 0 {
        // A uniqueness constraint matched an existing row: take over its key.
        let existing = find_existing_key(db, table, primary_key, &columns, &values)?;
        columns.insert(0, primary_key);
        values.insert(0, existing.clone());
        insert(db, name, "OR REPLACE", &columns, &values)?;
        existing
    } else {
        let rowid = db.last_insert_rowid()?;
        let sql = format!(
            "SELECT {} FROM {} WHERE rowid = ?1",
            quote_identifier(primary_key.storage_name()),
            quote_identifier(name)
        );
        db.query_scalar(&sql, &[Value::Integer(rowid)])?
            .map(from_value)
            .unwrap_or(SqlValue::Integer(rowid))
    };

    primary_key
        .write_value(record, key.clone())
        .map_err(|err| MapError::conversion(name, primary_key.storage_name(), err))?;
    debug!(table = name, key = ?key, "assigned primary key");
    Ok(Some(key))
}

fn insert(
    db: &mut Database,
    table: &str,
    mode: &str,
    columns: &[&FieldDescriptor],
    values: &[SqlValue],
) -> Result<usize> {
    let verb = format!("INSERT {mode}");
    let sql = if columns.is_empty() {
        format!("{verb} INTO {} DEFAULT VALUES", quote_identifier(table))
    } else {
        let names: Vec<_> = columns
            .iter()
            .map(|field| quote_identifier(field.storage_name()))
            .collect();
        let placeholders: Vec<_> = (1..=columns.len()).map(|i| format!("?{i}")).collect();
        format!(
            "{verb} INTO {} ({}) VALUES ({})",
            quote_identifier(table),
            names.join(", "),
            placeholders.join(", ")
        )
    };
    let params: Vec<Value> = values.iter().cloned().map(to_value).collect();
    Ok(db.execute(&sql, &params)?)
}

fn find_existing_key(
    db: &mut Database,
    table: &TableDescriptor,
    primary_key: &FieldDescriptor,
    columns: &[&FieldDescriptor],
    values: &[SqlValue],
) -> Result<SqlValue> {
    let unique = table.unique_key().ok_or_else(|| {
        MappingError::InvalidOperation(format!(
            "insert into '{}' was ignored but the table declares no unique columns \
             to find the existing row by",
            table.table_name()
        ))
    })?;

    let mut conditions = Vec::new();
    let mut params = Vec::new();
    for field in unique {
        let position = columns
            .iter()
            .position(|column| column.storage_name() == field.storage_name());
        let value = position.map_or(SqlValue::Null, |i| values[i].clone());
        params.push(to_value(value));
        conditions.push(format!(
            "{} IS ?{}",
            quote_identifier(field.storage_name()),
            params.len()
        ));
    }
    let sql = format!(
        "SELECT {} FROM {} WHERE {}",
        quote_identifier(primary_key.storage_name()),
        quote_identifier(table.table_name()),
        conditions.join(" AND ")
    );
    db.query_scalar(&sql, &params)?
        .map(from_value)
        .ok_or_else(|| {
            MappingError::InvalidOperation(format!(
                "insert into '{}' was ignored but no existing row matches its unique columns",
                table.table_name()
            ))
            .into()
        })
}

/// Replaces the array rows owned by `key`.
fn write_array(
    db: &mut Database,
    table: &TableDescriptor,
    array: &FieldDescriptor,
    record: &dyn Any,
    key: &SqlValue,
) -> Result<()> {
    let elements = array
        .read_elements(record)
        .map_err(|err| MapError::conversion(table.table_name(), array.storage_name(), err))?;
    let array_table = quote_identifier(array.storage_name());
    let delete = format!(
        "DELETE FROM {array_table} WHERE {} = ?1",
        quote_identifier(ID_COLUMN)
    );
    let insert = format!(
        "INSERT INTO {array_table} ({}, {}) VALUES (?1, ?2)",
        quote_identifier(ID_COLUMN),
        quote_identifier(VALUE_COLUMN)
    );
    let owner = to_value(key.clone());
    db.atomically(|db| -> Result<()> {
        db.execute(&delete, &[owner.clone()])?;
        for element in elements {
            db.execute(&insert, &[owner.clone(), to_value(element)])?;
        }
        Ok(())
    })
}

/// Links children to `key`, removes the stale ones and writes the new set.
fn write_children(
    session: &mut Session,
    db: &mut Database,
    table: &TableDescriptor,
    field: &FieldDescriptor,
    record: &mut dyn Any,
    key: &SqlValue,
) -> Result<()> {
    let Some(child) = field.child_descriptor() else {
        return Ok(());
    };
    let Some(parent_key) = child.parent_key() else {
        return Ok(());
    };
    let children = field
        .children_mut(record)
        .map_err(|err| MapError::conversion(table.table_name(), field.storage_name(), err))?;
    let mut linked = Vec::with_capacity(children.len());
    for child_record in children {
        parent_key
            .write_value(&mut *child_record, key.clone())
            .map_err(|err| MapError::conversion(child.table_name(), parent_key.storage_name(), err))?;
        linked.push(child_record);
    }

    session.with_secondary(db, field, |session, db| {
        db.ensure_writable("write")?;
        if !validate(session, db, child)? {
            return Err(MappingError::InvalidOperation(format!(
                "child table '{}' could not be validated",
                child.table_name()
            ))
            .into());
        }
        delete_dependents(session, db, child, parent_key.storage_name(), key)?;
        write_records(session, db, child, linked)
    })
}
