//! SQL schema generation from table descriptors.
//!
//! Generates the `CREATE TABLE` statements the validator issues for absent
//! tables, and classifies live declared types by SQLite affinity.
//!
//! # Table shapes
//!
//! - record table: primary key first (`INTEGER PRIMARY KEY`), then plain
//!   columns (with `UNIQUE` where marked), the parent key, index-redirected
//!   columns, and a composite `UNIQUE(...)` clause if any
//! - array table: `("ID" INTEGER, "VALUE" <element type>)`, one row per
//!   element, `ID` holding the owner's primary key
//! - index table: `("ID" INTEGER PRIMARY KEY, "VALUE" TEXT UNIQUE)`

use tablemap_core::{FieldRole, StorageType, TableDescriptor};
use tablemap_db::quote_identifier;

/// Owner key column of array tables; surrogate id column of index tables.
pub(crate) const ID_COLUMN: &str = "ID";
/// Element column of array tables; string column of index tables.
pub(crate) const VALUE_COLUMN: &str = "VALUE";

/// Generates the `CREATE TABLE` statement for a record table.
pub fn record_table_sql(table: &TableDescriptor) -> String {
    let mut definitions = Vec::new();
    for field in table.stored_columns() {
        let mut column = format!(
            "{} {}",
            quote_identifier(field.storage_name()),
            field.storage_type().as_sql()
        );
        if field.role() == FieldRole::PrimaryKey {
            column.push_str(" PRIMARY KEY");
        } else if field.is_unique() {
            column.push_str(" UNIQUE");
        }
        definitions.push(column);
    }

    let composite = table.multi_unique_columns();
    if !composite.is_empty() {
        let names: Vec<_> = composite
            .iter()
            .map(|field| quote_identifier(field.storage_name()))
            .collect();
        definitions.push(format!("UNIQUE({})", names.join(", ")));
    }

    if definitions.is_empty() {
        // SQLite requires at least one column.
        definitions.push(format!("{} INTEGER PRIMARY KEY", quote_identifier(ID_COLUMN)));
    }

    format!(
        "CREATE TABLE {} ({})",
        quote_identifier(table.table_name()),
        definitions.join(", ")
    )
}

/// Generates the `CREATE TABLE` statement for an array table.
pub fn array_table_sql(table_name: &str, element: StorageType) -> String {
    format!(
        "CREATE TABLE {} ({} INTEGER, {} {})",
        quote_identifier(table_name),
        quote_identifier(ID_COLUMN),
        quote_identifier(VALUE_COLUMN),
        element.as_sql()
    )
}

/// Generates the `CREATE TABLE` statement for an index table.
pub fn index_table_sql(table_name: &str) -> String {
    format!(
        "CREATE TABLE {} ({} INTEGER PRIMARY KEY, {} TEXT UNIQUE)",
        quote_identifier(table_name),
        quote_identifier(ID_COLUMN),
        quote_identifier(VALUE_COLUMN)
    )
}

/// Column affinity derived from a declared type, by SQLite's rules.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Affinity {
    Integer,
    Text,
    Blob,
    Real,
    Numeric,
}

pub(crate) fn affinity(declared: &str) -> Affinity {
    let declared = declared.to_ascii_uppercase();
    if declared.contains("INT") {
        Affinity::Integer
    } else if ["CHAR", "CLOB", "TEXT"].iter().any(|t| declared.contains(t)) {
        Affinity::Text
    } else if declared.is_empty() || declared.contains("BLOB") {
        Affinity::Blob
    } else if ["REAL", "FLOA", "DOUB"].iter().any(|t| declared.contains(t)) {
        Affinity::Real
    } else {
        Affinity::Numeric
    }
}

/// Returns `true` when a live column declared as `declared` can hold values
/// stored as `expected` without SQLite converting them.
///
/// Untyped, `BLOB` and `NUMERIC`-affinity columns accept any storage type.
pub(crate) fn is_compatible(declared: &str, expected: StorageType) -> bool {
    match affinity(declared) {
        Affinity::Blob | Affinity::Numeric => true,
        Affinity::Integer => expected == StorageType::Integer,
        Affinity::Text => expected == StorageType::Text,
        Affinity::Real => expected == StorageType::Real,
    }
}
