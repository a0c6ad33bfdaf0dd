//! Declarative markers attached to record fields.
//!
//! Markers are plain data. Whether a combination makes sense is decided when
//! the field's [`FieldDescriptor`](crate::FieldDescriptor) is built.

use std::path::PathBuf;

use crate::record::RecordType;
use crate::value::StorageType;

/// Markers declared on one field.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FieldAttributes {
    /// The field is the table's primary key.
    pub primary_key: bool,
    /// The field holds the primary key of the given owning record type.
    pub parent_key: Option<RecordType>,
    /// Column (or table) name to use instead of the field name.
    pub rename: Option<String>,
    /// Storage type to use instead of the inferred one.
    pub storage: Option<StorageType>,
    /// Leave the field out of the mapping entirely.
    pub ignore: bool,
    /// Store the string through an index table. The inner value is an
    /// explicit index table name; `None` uses the field's storage name.
    pub index_table: Option<Option<String>>,
    /// Alternate database file for a child table.
    pub secondary_database: Option<PathBuf>,
    /// Single-column uniqueness.
    pub unique: bool,
    /// Participates in the table's composite uniqueness constraint.
    pub multi_unique: bool,
}

/// Markers declared on the record type itself.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableAttributes {
    /// Table name to use instead of the record's type name.
    pub table_name: Option<String>,
}
