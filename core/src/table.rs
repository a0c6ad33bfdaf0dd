//! Table descriptors: how one record type maps onto one table.
//!
//! A [`TableDescriptor`] partitions a record's fields by role and enforces
//! the structural invariants the mapping engine relies on:
//!
//! - at most one primary key (more is [`MappingError::NotSupported`])
//! - at most one parent key
//! - child and array tables require a primary key to link against
//! - a keyed table has at most one uniqueness group (the composite group, or
//!   a single unique column), which identifies the existing row when an
//!   auto-keyed insert collides with a uniqueness constraint
//!
//! The only mutable state is the `validated` flag, flipped once by the
//! schema validator.

use std::any::Any;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

use tracing::debug;

use crate::error::{MappingError, Result};
use crate::field::{FieldDescriptor, FieldRole};
use crate::record::{Record, RecordDef, RecordType};
use crate::registry::DescriptorRegistry;

/// Resolved mapping facts for one record type stored in one table.
pub struct TableDescriptor {
    record_type: RecordType,
    table_name: String,
    primary_key: Option<FieldDescriptor>,
    columns: Vec<FieldDescriptor>,
    parent_key: Option<FieldDescriptor>,
    index_keys: Vec<FieldDescriptor>,
    array_tables: Vec<FieldDescriptor>,
    child_tables: Vec<FieldDescriptor>,
    validated: AtomicBool,
    instantiate: fn() -> Box<dyn Any>,
}

fn instantiate<T: Record>() -> Box<dyn Any> {
    Box::new(T::default())
}

impl TableDescriptor {
    pub(crate) fn build<T: Record>(
        def: RecordDef<T>,
        table_name: String,
        registry: &mut DescriptorRegistry,
    ) -> Result<Self> {
        let record_type = RecordType::of::<T>();
        if table_name.trim().is_empty() {
            return Err(MappingError::Format(format!(
                "table name of type {record_type} cannot be empty"
            )));
        }

        let mut primary_keys = Vec::new();
        let mut parent_keys = Vec::new();
        let mut columns = Vec::new();
        let mut index_keys = Vec::new();
        let mut array_tables = Vec::new();
        let mut child_tables = Vec::new();

        for field in def.fields {
            if field.attributes.ignore {
                continue;
            }
            let descriptor = FieldDescriptor::build(record_type, field, registry)?;
            match descriptor.role() {
                FieldRole::PrimaryKey => primary_keys.push(descriptor),
                FieldRole::ParentKey => parent_keys.push(descriptor),
                FieldRole::PlainColumn => columns.push(descriptor),
                FieldRole::IndexRedirected => index_keys.push(descriptor),
                FieldRole::ArrayTable => array_tables.push(descriptor),
                FieldRole::ChildTable => child_tables.push(descriptor),
            }
        }

        if primary_keys.len() > 1 {
            let names: Vec<_> = primary_keys.iter().map(FieldDescriptor::name).collect();
            return Err(MappingError::NotSupported(format!(
                "type {record_type} declares {} primary keys ({}); only one is supported",
                names.len(),
                names.join(", ")
            )));
        }
        if parent_keys.len() > 1 {
            let names: Vec<_> = parent_keys.iter().map(FieldDescriptor::name).collect();
            return Err(MappingError::Format(format!(
                "type {record_type} declares more than one parent key ({})",
                names.join(", ")
            )));
        }
        let primary_key = primary_keys.pop();
        let parent_key = parent_keys.pop();

        if primary_key.is_none() {
            if let Some(child) = child_tables.first() {
                return Err(MappingError::Format(format!(
                    "type {record_type} has child table field '{}' but no primary key",
                    child.name()
                )));
            }
            if let Some(array) = array_tables.first() {
                return Err(MappingError::Format(format!(
                    "type {record_type} has array table field '{}' but no primary key",
                    array.name()
                )));
            }
        }

        let descriptor = Self {
            record_type,
            table_name,
            primary_key,
            columns,
            parent_key,
            index_keys,
            array_tables,
            child_tables,
            validated: AtomicBool::new(false),
            instantiate: instantiate::<T>,
        };

        if descriptor.primary_key.is_some() && descriptor.unique_groups() > 1 {
            return Err(MappingError::Format(format!(
                "type {record_type} declares more than one uniqueness group; a keyed table \
                 may use either one unique column or one composite unique group"
            )));
        }

        debug!(
            table = %descriptor.table_name,
            record = %record_type,
            columns = descriptor.columns.len(),
            children = descriptor.child_tables.len(),
            "built table descriptor"
        );
        Ok(descriptor)
    }

    pub const fn record_type(&self) -> RecordType {
        self.record_type
    }

    pub fn table_name(&self) -> &str {
        &self.table_name
    }

    pub const fn primary_key(&self) -> Option<&FieldDescriptor> {
        self.primary_key.as_ref()
    }

    /// Plain columns, excluding key, index, array and child fields.
    pub fn columns(&self) -> &[FieldDescriptor] {
        &self.columns
    }

    pub const fn parent_key(&self) -> Option<&FieldDescriptor> {
        self.parent_key.as_ref()
    }

    pub fn index_keys(&self) -> &[FieldDescriptor] {
        &self.index_keys
    }

    pub fn array_tables(&self) -> &[FieldDescriptor] {
        &self.array_tables
    }

    pub fn child_tables(&self) -> &[FieldDescriptor] {
        &self.child_tables
    }

    /// Every field stored as a column of this table: primary key first, then
    /// plain columns, parent key and index-redirected columns.
    pub fn stored_columns(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.primary_key
            .iter()
            .chain(self.columns.iter())
            .chain(self.parent_key.iter())
            .chain(self.index_keys.iter())
    }

    /// Fields participating in the composite uniqueness constraint.
    pub fn multi_unique_columns(&self) -> Vec<&FieldDescriptor> {
        self.stored_columns()
            .filter(|field| field.is_multi_unique())
            .collect()
    }

    /// Columns identifying an existing row when an insert collides with a
    /// uniqueness constraint. `None` when the table declares no uniqueness.
    pub fn unique_key(&self) -> Option<Vec<&FieldDescriptor>> {
        let composite = self.multi_unique_columns();
        if !composite.is_empty() {
            return Some(composite);
        }
        self.stored_columns()
            .find(|field| field.is_unique() && field.role() != FieldRole::PrimaryKey)
            .map(|field| vec![field])
    }

    /// Returns `true` when rows of this table own array or child rows.
    pub fn has_dependents(&self) -> bool {
        !self.array_tables.is_empty() || !self.child_tables.is_empty()
    }

    /// Creates a default instance of the record type.
    pub fn instantiate(&self) -> Box<dyn Any> {
        (self.instantiate)()
    }

    pub fn is_validated(&self) -> bool {
        self.validated.load(Ordering::Acquire)
    }

    /// Records that the live database matched this descriptor. One-way.
    pub fn mark_validated(&self) {
        self.validated.store(true, Ordering::Release);
    }

    fn unique_groups(&self) -> usize {
        let composite = usize::from(self.stored_columns().any(FieldDescriptor::is_multi_unique));
        let singles = self
            .stored_columns()
            .filter(|field| field.is_unique() && field.role() != FieldRole::PrimaryKey)
            .count();
        composite + singles
    }
}

impl fmt::Debug for TableDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableDescriptor")
            .field("record_type", &self.record_type)
            .field("table_name", &self.table_name)
            .field("primary_key", &self.primary_key)
            .field("columns", &self.columns)
            .field("parent_key", &self.parent_key)
            .field("index_keys", &self.index_keys)
            .field("array_tables", &self.array_tables)
            .field("child_tables", &self.child_tables)
            .field("validated", &self.is_validated())
            .finish_non_exhaustive()
    }
}
