//! Field descriptors: the resolved storage facts for one record field.
//!
//! A [`FieldDescriptor`] is derived once from a declared field and its
//! markers. Its role is picked by marker precedence:
//!
//! 1. primary key
//! 2. parent key
//! 3. index table redirection
//! 4. nested record or list of records (child table)
//! 5. primitive array (array table)
//! 6. plain column
//!
//! Primary key, parent key and index-redirected fields are always stored as
//! `INTEGER`.

use std::any::Any;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::{ConversionError, MappingError, Result};
use crate::record::{ArrayAccess, ChildAccess, FieldDef, FieldShape, RecordType, ScalarAccess};
use crate::registry::DescriptorRegistry;
use crate::table::TableDescriptor;
use crate::value::{SqlValue, StorageType, ValueKind};

/// Storage role of a field. A field has exactly one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldRole {
    PlainColumn,
    PrimaryKey,
    ParentKey,
    IndexRedirected,
    ArrayTable,
    ChildTable,
}

impl FieldRole {
    /// Returns `true` for roles stored as a column of the owning table.
    pub const fn is_column(self) -> bool {
        matches!(
            self,
            Self::PlainColumn | Self::PrimaryKey | Self::ParentKey | Self::IndexRedirected
        )
    }
}

#[derive(Clone)]
enum FieldAccess {
    Scalar(Arc<dyn ScalarAccess>),
    Array(Arc<dyn ArrayAccess>),
    Child {
        many: bool,
        access: Arc<dyn ChildAccess>,
        descriptor: Arc<TableDescriptor>,
    },
}

/// Resolved mapping facts for one field.
#[derive(Clone)]
pub struct FieldDescriptor {
    name: String,
    storage_name: String,
    role: FieldRole,
    storage_type: StorageType,
    kind: Option<ValueKind>,
    type_name: &'static str,
    parent_type: Option<RecordType>,
    index_table: Option<String>,
    secondary_database: Option<PathBuf>,
    unique: bool,
    multi_unique: bool,
    access: FieldAccess,
}

impl FieldDescriptor {
    /// Resolves a declared field of `owner`.
    ///
    /// # Errors
    ///
    /// Returns [`MappingError::Format`] for invalid marker combinations: more
    /// than one of primary key / parent key / index table, a non-integral key
    /// field, a non-text index field, a secondary database on anything other
    /// than a child table, or a child type whose parent key does not point
    /// back at `owner`.
    pub(crate) fn build(
        owner: RecordType,
        def: FieldDef,
        registry: &mut DescriptorRegistry,
    ) -> Result<Self> {
        let FieldDef {
            name,
            attributes,
            shape,
        } = def;
        let invalid = |reason: String| {
            MappingError::Format(format!("field '{name}' of type {owner}: {reason}"))
        };

        let storage_name = attributes.rename.clone().unwrap_or_else(|| name.clone());
        if storage_name.trim().is_empty() {
            return Err(invalid("storage name cannot be empty".into()));
        }

        let key_markers = [
            attributes.primary_key,
            attributes.parent_key.is_some(),
            attributes.index_table.is_some(),
        ]
        .iter()
        .filter(|set| **set)
        .count();
        if key_markers > 1 {
            return Err(invalid(
                "primary key, parent key and index table markers are mutually exclusive".into(),
            ));
        }

        let role = if attributes.primary_key {
            FieldRole::PrimaryKey
        } else if attributes.parent_key.is_some() {
            FieldRole::ParentKey
        } else if attributes.index_table.is_some() {
            FieldRole::IndexRedirected
        } else {
            match &shape {
                FieldShape::Child { .. } => FieldRole::ChildTable,
                FieldShape::Array { .. } => FieldRole::ArrayTable,
                FieldShape::Scalar { .. } => FieldRole::PlainColumn,
            }
        };

        if attributes.secondary_database.is_some() && role != FieldRole::ChildTable {
            return Err(invalid("a secondary database is only valid on a child table".into()));
        }
        if (attributes.unique || attributes.multi_unique) && !role.is_column() {
            return Err(invalid("uniqueness markers require a column field".into()));
        }

        let (kind, type_name, access) = match shape {
            FieldShape::Scalar {
                kind,
                type_name,
                access,
            } => (Some(kind), type_name, FieldAccess::Scalar(access)),
            FieldShape::Array {
                kind,
                type_name,
                access,
            } => (Some(kind), type_name, FieldAccess::Array(access)),
            FieldShape::Child { many, access } => {
                if role != FieldRole::ChildTable {
                    return Err(invalid(format!(
                        "a nested {} cannot be a {role:?} field",
                        access.child_type()
                    )));
                }
                let descriptor = access.describe(registry, &storage_name)?;
                check_parent_link(owner, &name, &descriptor)?;
                (
                    None,
                    descriptor.record_type().name(),
                    FieldAccess::Child {
                        many,
                        access,
                        descriptor,
                    },
                )
            }
        };

        if role.is_column() && !matches!(access, FieldAccess::Scalar(_)) {
            return Err(invalid(format!("{role:?} field must hold a single value")));
        }

        let storage_type = match role {
            FieldRole::PrimaryKey | FieldRole::ParentKey => {
                if kind != Some(ValueKind::Integral) {
                    return Err(invalid(format!(
                        "{role:?} field must be integral, found {type_name}"
                    )));
                }
                integer_only(attributes.storage, role).map_err(invalid)?
            }
            FieldRole::IndexRedirected => {
                if kind != Some(ValueKind::Text) {
                    return Err(invalid(format!(
                        "index table field must be a string, found {type_name}"
                    )));
                }
                integer_only(attributes.storage, role).map_err(invalid)?
            }
            FieldRole::ChildTable => StorageType::Integer,
            FieldRole::PlainColumn | FieldRole::ArrayTable => {
                let kind = kind.ok_or_else(|| invalid("field has no value type".into()))?;
                match attributes.storage {
                    Some(storage) if kind == ValueKind::Enum && storage != StorageType::Text => {
                        return Err(invalid(format!(
                            "enum {type_name} is stored by name and cannot use {storage} storage"
                        )));
                    }
                    Some(StorageType::Real) if kind == ValueKind::Timestamp => {
                        return Err(invalid(format!(
                            "{type_name} is stored as TEXT or INTEGER ticks and cannot use REAL storage"
                        )));
                    }
                    Some(storage) => storage,
                    None => kind.default_storage(),
                }
            }
        };

        let index_table = attributes
            .index_table
            .map(|explicit| explicit.unwrap_or_else(|| storage_name.clone()));

        Ok(Self {
            name,
            storage_name,
            role,
            storage_type,
            kind,
            type_name,
            parent_type: attributes.parent_key,
            index_table,
            secondary_database: attributes.secondary_database,
            unique: attributes.unique,
            multi_unique: attributes.multi_unique,
            access,
        })
    }

    /// Source field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Column name, or table name for array and child fields.
    pub fn storage_name(&self) -> &str {
        &self.storage_name
    }

    pub const fn role(&self) -> FieldRole {
        self.role
    }

    /// Declared storage type; the element type for arrays.
    pub const fn storage_type(&self) -> StorageType {
        self.storage_type
    }

    pub const fn kind(&self) -> Option<ValueKind> {
        self.kind
    }

    /// Rust type name of the field (child record name for child tables).
    pub const fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Owning record type of a parent key field.
    pub const fn parent_type(&self) -> Option<RecordType> {
        self.parent_type
    }

    /// Backing index table of an index-redirected field.
    pub fn index_table(&self) -> Option<&str> {
        self.index_table.as_deref()
    }

    pub fn secondary_database(&self) -> Option<&Path> {
        self.secondary_database.as_deref()
    }

    pub const fn is_unique(&self) -> bool {
        self.unique
    }

    pub const fn is_multi_unique(&self) -> bool {
        self.multi_unique
    }

    /// Nested table descriptor of a child table field.
    pub fn child_descriptor(&self) -> Option<&Arc<TableDescriptor>> {
        match &self.access {
            FieldAccess::Child { descriptor, .. } => Some(descriptor),
            _ => None,
        }
    }

    /// Returns `true` when the child field holds a list rather than one record.
    pub const fn is_child_list(&self) -> bool {
        matches!(self.access, FieldAccess::Child { many: true, .. })
    }

    /// Reads the field's stored representation from `record`.
    ///
    /// Index-redirected fields yield their text; the engine swaps it for the
    /// surrogate id.
    pub fn read_value(&self, record: &dyn Any) -> std::result::Result<SqlValue, ConversionError> {
        let storage = match self.role {
            FieldRole::IndexRedirected => StorageType::Text,
            _ => self.storage_type,
        };
        match &self.access {
            FieldAccess::Scalar(access) => access.get(record, storage),
            _ => Err(self.shape_mismatch("a column field")),
        }
    }

    /// Converts `value` and assigns it to the field on `record`.
    pub fn write_value(
        &self,
        record: &mut dyn Any,
        value: SqlValue,
    ) -> std::result::Result<(), ConversionError> {
        match &self.access {
            FieldAccess::Scalar(access) => access.set(record, value),
            _ => Err(self.shape_mismatch("a column field")),
        }
    }

    /// Reads the stored representation of every array element.
    pub fn read_elements(
        &self,
        record: &dyn Any,
    ) -> std::result::Result<Vec<SqlValue>, ConversionError> {
        match &self.access {
            FieldAccess::Array(access) => access.get(record, self.storage_type),
            _ => Err(self.shape_mismatch("an array field")),
        }
    }

    /// Converts `values` and assigns them as the array field of `record`.
    pub fn write_elements(
        &self,
        record: &mut dyn Any,
        values: Vec<SqlValue>,
    ) -> std::result::Result<(), ConversionError> {
        match &self.access {
            FieldAccess::Array(access) => access.set(record, values),
            _ => Err(self.shape_mismatch("an array field")),
        }
    }

    /// Borrows every child record held by the field.
    pub fn children_mut<'a>(
        &self,
        record: &'a mut dyn Any,
    ) -> std::result::Result<Vec<&'a mut dyn Any>, ConversionError> {
        match &self.access {
            FieldAccess::Child { access, .. } => access.children_mut(record),
            _ => Err(self.shape_mismatch("a child table field")),
        }
    }

    /// Replaces the field's children with `rows`. A single-record field takes
    /// the first row, or `None` when `rows` is empty.
    pub fn assign_children(
        &self,
        record: &mut dyn Any,
        rows: Vec<Box<dyn Any>>,
    ) -> std::result::Result<(), ConversionError> {
        match &self.access {
            FieldAccess::Child { access, .. } => access.assign(record, rows),
            _ => Err(self.shape_mismatch("a child table field")),
        }
    }

    fn shape_mismatch(&self, expected: &'static str) -> ConversionError {
        ConversionError::TypeMismatch {
            expected,
            found: match self.access {
                FieldAccess::Scalar(_) => "a column field",
                FieldAccess::Array(_) => "an array field",
                FieldAccess::Child { .. } => "a child table field",
            },
        }
    }
}

impl fmt::Debug for FieldDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldDescriptor")
            .field("name", &self.name)
            .field("storage_name", &self.storage_name)
            .field("role", &self.role)
            .field("storage_type", &self.storage_type)
            .field("type_name", &self.type_name)
            .field("parent_type", &self.parent_type)
            .field("index_table", &self.index_table)
            .field("secondary_database", &self.secondary_database)
            .field("unique", &self.unique)
            .field("multi_unique", &self.multi_unique)
            .finish_non_exhaustive()
    }
}

fn integer_only(
    declared: Option<StorageType>,
    role: FieldRole,
) -> std::result::Result<StorageType, String> {
    match declared {
        None | Some(StorageType::Integer) => Ok(StorageType::Integer),
        Some(other) => Err(format!("{role:?} field is always INTEGER, not {other}")),
    }
}

fn check_parent_link(owner: RecordType, field: &str, child: &TableDescriptor) -> Result<()> {
    let parent_key = child.parent_key().ok_or_else(|| {
        MappingError::Format(format!(
            "child table '{}' ({}) of field '{field}' on type {owner} declares no parent key",
            child.table_name(),
            child.record_type()
        ))
    })?;
    match parent_key.parent_type() {
        Some(parent) if parent == owner => Ok(()),
        other => Err(MappingError::Format(format!(
            "parent key '{}' of child type {} points at {}, expected {owner}",
            parent_key.name(),
            child.record_type(),
            other.map_or("nothing", RecordType::name)
        ))),
    }
}
