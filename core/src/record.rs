//! The [`Record`] trait and the builder mapped types describe themselves with.
//!
//! A mapped type declares each field once, handing over plain function
//! pointers for reading and writing it. The builder wraps them in small
//! type-erased accessors so the mapping engine can move values in and out of
//! any record without knowing its concrete type.
//!
//! # Example
//!
//! ```
//! use tablemap_core::{Record, RecordDef};
//!
//! #[derive(Debug, Default)]
//! struct Department {
//!     id: i64,
//!     name: String,
//!     employees: Vec<Employee>,
//! }
//!
//! #[derive(Debug, Default)]
//! struct Employee {
//!     id: i64,
//!     name: String,
//!     department_id: i64,
//! }
//!
//! impl Record for Department {
//!     const NAME: &'static str = "Department";
//!
//!     fn describe(def: &mut RecordDef<Self>) {
//!         def.field("ID", |d| d.id, |d, v| d.id = v).primary_key();
//!         def.field("Name", |d| d.name.clone(), |d, v| d.name = v);
//!         def.children("Employees", |d| &mut d.employees);
//!     }
//! }
//!
//! impl Record for Employee {
//!     const NAME: &'static str = "Employee";
//!
//!     fn describe(def: &mut RecordDef<Self>) {
//!         def.field("ID", |e| e.id, |e, v| e.id = v).primary_key();
//!         def.field("Name", |e| e.name.clone(), |e, v| e.name = v);
//!         def.field("DepartmentID", |e| e.department_id, |e, v| e.department_id = v)
//!             .parent_key::<Department>();
//!     }
//! }
//! ```

use std::any::{Any, TypeId};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;
use std::path::PathBuf;
use std::sync::Arc;

use crate::attributes::{FieldAttributes, TableAttributes};
use crate::error::{ConversionError, Result};
use crate::registry::DescriptorRegistry;
use crate::table::TableDescriptor;
use crate::value::{
    ColumnValue, SqlEnum, SqlValue, StorageType, ValueKind, enum_from_sql, enum_to_sql,
};

/// A type that maps to a database table.
pub trait Record: Default + 'static {
    /// Type name, used as the table name unless overridden.
    const NAME: &'static str;

    /// Declares the record's fields and markers.
    fn describe(def: &mut RecordDef<Self>);
}

/// Identity of a record type.
#[derive(Clone, Copy)]
pub struct RecordType {
    id: TypeId,
    name: &'static str,
}

impl RecordType {
    pub fn of<T: Record>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: T::NAME,
        }
    }

    pub const fn name(self) -> &'static str {
        self.name
    }

    pub const fn id(self) -> TypeId {
        self.id
    }
}

impl PartialEq for RecordType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for RecordType {}

impl Hash for RecordType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Debug for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

impl fmt::Display for RecordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Collects a record type's field declarations.
pub struct RecordDef<T> {
    pub(crate) table: TableAttributes,
    pub(crate) fields: Vec<FieldDef>,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Record> RecordDef<T> {
    pub(crate) fn collect() -> Self {
        let mut def = Self {
            table: TableAttributes::default(),
            fields: Vec::new(),
            _marker: PhantomData,
        };
        T::describe(&mut def);
        def
    }

    /// Stores the record in `name` instead of a table named after the type.
    pub fn table_name(&mut self, name: impl Into<String>) -> &mut Self {
        self.table.table_name = Some(name.into());
        self
    }

    /// Declares a single-column field.
    pub fn field<V: ColumnValue>(
        &mut self,
        name: &str,
        get: fn(&T) -> V,
        set: fn(&mut T, V),
    ) -> &mut FieldDef {
        self.push(
            name,
            FieldShape::Scalar {
                kind: V::KIND,
                type_name: V::TYPE_NAME,
                access: Arc::new(ScalarSlot { get, set }),
            },
        )
    }

    /// Declares an enum field stored by variant name.
    pub fn enumeration<E: SqlEnum>(
        &mut self,
        name: &str,
        get: fn(&T) -> E,
        set: fn(&mut T, E),
    ) -> &mut FieldDef {
        self.push(
            name,
            FieldShape::Scalar {
                kind: ValueKind::Enum,
                type_name: E::TYPE_NAME,
                access: Arc::new(EnumSlot { get, set }),
            },
        )
    }

    /// Declares a primitive array stored one element per row in an array table.
    pub fn array<V: ColumnValue>(
        &mut self,
        name: &str,
        get: fn(&T) -> Vec<V>,
        set: fn(&mut T, Vec<V>),
    ) -> &mut FieldDef {
        self.push(
            name,
            FieldShape::Array {
                kind: V::KIND,
                type_name: V::TYPE_NAME,
                access: Arc::new(ArraySlot { get, set }),
            },
        )
    }

    /// Declares a list of child records stored in a child table.
    pub fn children<C: Record>(
        &mut self,
        name: &str,
        access: fn(&mut T) -> &mut Vec<C>,
    ) -> &mut FieldDef {
        self.push(
            name,
            FieldShape::Child {
                many: true,
                access: Arc::new(ListSlot { access }),
            },
        )
    }

    /// Declares a single optional child record stored in a child table.
    pub fn child<C: Record>(
        &mut self,
        name: &str,
        access: fn(&mut T) -> &mut Option<C>,
    ) -> &mut FieldDef {
        self.push(
            name,
            FieldShape::Child {
                many: false,
                access: Arc::new(OptionSlot { access }),
            },
        )
    }

    fn push(&mut self, name: &str, shape: FieldShape) -> &mut FieldDef {
        let index = self.fields.len();
        self.fields.push(FieldDef {
            name: name.to_string(),
            attributes: FieldAttributes::default(),
            shape,
        });
        &mut self.fields[index]
    }
}

/// One declared field and its markers.
pub struct FieldDef {
    pub(crate) name: String,
    pub(crate) attributes: FieldAttributes,
    pub(crate) shape: FieldShape,
}

impl FieldDef {
    pub fn primary_key(&mut self) -> &mut Self {
        self.attributes.primary_key = true;
        self
    }

    /// Marks the field as holding the primary key of its owning `P` record.
    pub fn parent_key<P: Record>(&mut self) -> &mut Self {
        self.attributes.parent_key = Some(RecordType::of::<P>());
        self
    }

    pub fn rename(&mut self, name: impl Into<String>) -> &mut Self {
        self.attributes.rename = Some(name.into());
        self
    }

    pub fn storage(&mut self, storage: StorageType) -> &mut Self {
        self.attributes.storage = Some(storage);
        self
    }

    pub fn ignore(&mut self) -> &mut Self {
        self.attributes.ignore = true;
        self
    }

    /// Interns the string through an index table named after the field.
    pub fn index_table(&mut self) -> &mut Self {
        self.attributes.index_table = Some(None);
        self
    }

    /// Interns the string through the index table `table`.
    pub fn index_table_named(&mut self, table: impl Into<String>) -> &mut Self {
        self.attributes.index_table = Some(Some(table.into()));
        self
    }

    /// Stores the child table in another database file. Relative paths are
    /// resolved against the directory of the owning record's database.
    pub fn secondary_database(&mut self, path: impl Into<PathBuf>) -> &mut Self {
        self.attributes.secondary_database = Some(path.into());
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.attributes.unique = true;
        self
    }

    pub fn multi_unique(&mut self) -> &mut Self {
        self.attributes.multi_unique = true;
        self
    }

    pub fn attributes(&self) -> &FieldAttributes {
        &self.attributes
    }
}

/// What a declared field holds, with its erased accessor.
#[derive(Clone)]
pub(crate) enum FieldShape {
    Scalar {
        kind: ValueKind,
        type_name: &'static str,
        access: Arc<dyn ScalarAccess>,
    },
    Array {
        kind: ValueKind,
        type_name: &'static str,
        access: Arc<dyn ArrayAccess>,
    },
    Child {
        many: bool,
        access: Arc<dyn ChildAccess>,
    },
}

pub(crate) trait ScalarAccess: Send + Sync {
    fn get(&self, record: &dyn Any, storage: StorageType) -> Result<SqlValue, ConversionError>;
    fn set(&self, record: &mut dyn Any, value: SqlValue) -> Result<(), ConversionError>;
}

pub(crate) trait ArrayAccess: Send + Sync {
    fn get(&self, record: &dyn Any, storage: StorageType)
    -> Result<Vec<SqlValue>, ConversionError>;
    fn set(&self, record: &mut dyn Any, values: Vec<SqlValue>) -> Result<(), ConversionError>;
}

pub(crate) trait ChildAccess: Send + Sync {
    fn child_type(&self) -> RecordType;

    fn describe(
        &self,
        registry: &mut DescriptorRegistry,
        table_name: &str,
    ) -> Result<Arc<TableDescriptor>>;

    fn children_mut<'a>(
        &self,
        record: &'a mut dyn Any,
    ) -> Result<Vec<&'a mut dyn Any>, ConversionError>;

    fn assign(&self, record: &mut dyn Any, rows: Vec<Box<dyn Any>>)
    -> Result<(), ConversionError>;
}

fn downcast<T: Record>(record: &dyn Any) -> Result<&T, ConversionError> {
    record
        .downcast_ref::<T>()
        .ok_or(ConversionError::RecordMismatch { expected: T::NAME })
}

fn downcast_mut<T: Record>(record: &mut dyn Any) -> Result<&mut T, ConversionError> {
    record
        .downcast_mut::<T>()
        .ok_or(ConversionError::RecordMismatch { expected: T::NAME })
}

fn unbox<C: Record>(rows: Vec<Box<dyn Any>>) -> Result<Vec<C>, ConversionError> {
    rows.into_iter()
        .map(|row| {
            row.downcast::<C>()
                .map(|child| *child)
                .map_err(|_| ConversionError::RecordMismatch { expected: C::NAME })
        })
        .collect()
}

struct ScalarSlot<T, V> {
    get: fn(&T) -> V,
    set: fn(&mut T, V),
}

impl<T: Record, V: ColumnValue> ScalarAccess for ScalarSlot<T, V> {
    fn get(&self, record: &dyn Any, storage: StorageType) -> Result<SqlValue, ConversionError> {
        Ok((self.get)(downcast::<T>(record)?).to_sql(storage))
    }

    fn set(&self, record: &mut dyn Any, value: SqlValue) -> Result<(), ConversionError> {
        let value = V::from_sql(value)?;
        (self.set)(downcast_mut::<T>(record)?, value);
        Ok(())
    }
}

struct EnumSlot<T, E> {
    get: fn(&T) -> E,
    set: fn(&mut T, E),
}

impl<T: Record, E: SqlEnum> ScalarAccess for EnumSlot<T, E> {
    fn get(&self, record: &dyn Any, _storage: StorageType) -> Result<SqlValue, ConversionError> {
        Ok(enum_to_sql(&(self.get)(downcast::<T>(record)?)))
    }

    fn set(&self, record: &mut dyn Any, value: SqlValue) -> Result<(), ConversionError> {
        let value = enum_from_sql::<E>(value)?;
        (self.set)(downcast_mut::<T>(record)?, value);
        Ok(())
    }
}

struct ArraySlot<T, V> {
    get: fn(&T) -> Vec<V>,
    set: fn(&mut T, Vec<V>),
}

impl<T: Record, V: ColumnValue> ArrayAccess for ArraySlot<T, V> {
    fn get(
        &self,
        record: &dyn Any,
        storage: StorageType,
    ) -> Result<Vec<SqlValue>, ConversionError> {
        Ok((self.get)(downcast::<T>(record)?)
            .iter()
            .map(|element| element.to_sql(storage))
            .collect())
    }

    fn set(&self, record: &mut dyn Any, values: Vec<SqlValue>) -> Result<(), ConversionError> {
        let elements = values
            .into_iter()
            .map(V::from_sql)
            .collect::<std::result::Result<Vec<_>, _>>()?;
        (self.set)(downcast_mut::<T>(record)?, elements);
        Ok(())
    }
}

struct ListSlot<T, C> {
    access: fn(&mut T) -> &mut Vec<C>,
}

impl<T: Record, C: Record> ChildAccess for ListSlot<T, C> {
    fn child_type(&self) -> RecordType {
        RecordType::of::<C>()
    }

    fn describe(
        &self,
        registry: &mut DescriptorRegistry,
        table_name: &str,
    ) -> Result<Arc<TableDescriptor>> {
        registry.describe::<C>(Some(table_name))
    }

    fn children_mut<'a>(
        &self,
        record: &'a mut dyn Any,
    ) -> Result<Vec<&'a mut dyn Any>, ConversionError> {
        let list = (self.access)(downcast_mut::<T>(record)?);
        Ok(list.iter_mut().map(|child| child as &mut dyn Any).collect())
    }

    fn assign(
        &self,
        record: &mut dyn Any,
        rows: Vec<Box<dyn Any>>,
    ) -> Result<(), ConversionError> {
        let children = unbox::<C>(rows)?;
        *(self.access)(downcast_mut::<T>(record)?) = children;
        Ok(())
    }
}

struct OptionSlot<T, C> {
    access: fn(&mut T) -> &mut Option<C>,
}

impl<T: Record, C: Record> ChildAccess for OptionSlot<T, C> {
    fn child_type(&self) -> RecordType {
        RecordType::of::<C>()
    }

    fn describe(
        &self,
        registry: &mut DescriptorRegistry,
        table_name: &str,
    ) -> Result<Arc<TableDescriptor>> {
        registry.describe::<C>(Some(table_name))
    }

    fn children_mut<'a>(
        &self,
        record: &'a mut dyn Any,
    ) -> Result<Vec<&'a mut dyn Any>, ConversionError> {
        let slot = (self.access)(downcast_mut::<T>(record)?);
        Ok(slot.iter_mut().map(|child| child as &mut dyn Any).collect())
    }

    fn assign(
        &self,
        record: &mut dyn Any,
        rows: Vec<Box<dyn Any>>,
    ) -> Result<(), ConversionError> {
        let first = unbox::<C>(rows)?.into_iter().next();
        *(self.access)(downcast_mut::<T>(record)?) = first;
        Ok(())
    }
}
