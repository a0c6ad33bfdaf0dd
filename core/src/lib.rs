//! Record metadata and table descriptors for the tablemap mapper.
//!
//! This crate holds everything about a mapping that does not need a
//! database connection:
//!
//! - [`Record`] / [`RecordDef`]: how a Rust type declares its fields and
//!   markers ([`FieldAttributes`]).
//! - [`FieldDescriptor`]: per-field storage role, name, type and value
//!   conversion.
//! - [`TableDescriptor`]: per-type partition of fields by role, with the
//!   structural invariants enforced at construction.
//! - [`DescriptorRegistry`]: the derive-once, cache-forever store of
//!   descriptors keyed by `(type, table name)`.
//! - [`SqlValue`] / [`ColumnValue`] / [`SqlEnum`]: conversions between field
//!   values and their stored form.
//!
//! The `tablemap-sqlite` crate validates descriptors against a live database
//! and drives reads and writes with them.
//!
//! # Example
//!
//! ```
//! use tablemap_core::{DescriptorRegistry, FieldRole, Record, RecordDef};
//!
//! #[derive(Default)]
//! struct Tag {
//!     id: i64,
//!     label: String,
//! }
//!
//! impl Record for Tag {
//!     const NAME: &'static str = "Tag";
//!
//!     fn describe(def: &mut RecordDef<Self>) {
//!         def.field("ID", |t| t.id, |t, v| t.id = v).primary_key();
//!         def.field("Label", |t| t.label.clone(), |t, v| t.label = v).unique();
//!     }
//! }
//!
//! let mut registry = DescriptorRegistry::new();
//! let table = registry.describe::<Tag>(None).unwrap();
//! assert_eq!(table.table_name(), "Tag");
//! assert_eq!(table.primary_key().unwrap().role(), FieldRole::PrimaryKey);
//! assert_eq!(table.columns().len(), 1);
//! ```

mod attributes;
mod diagnostics;
mod error;
mod field;
mod record;
mod registry;
mod table;
mod value;

pub use attributes::{FieldAttributes, TableAttributes};
pub use diagnostics::FieldDiagnostic;
pub use error::{ConversionError, MappingError, Result};
pub use field::{FieldDescriptor, FieldRole};
pub use record::{FieldDef, Record, RecordDef, RecordType};
pub use registry::DescriptorRegistry;
pub use table::TableDescriptor;
pub use value::{
    ColumnValue, SqlEnum, SqlValue, StorageType, ValueKind, datetime_to_ticks, ticks_to_datetime,
};
