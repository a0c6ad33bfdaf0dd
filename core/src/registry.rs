//! Process-lifetime cache of table descriptors.
//!
//! Descriptors are keyed by `(record type, table name)`. Reading the same
//! record shape from a differently-named table yields a second descriptor;
//! asking again for a known pair returns the cached one, child descriptors
//! included.

use std::any::TypeId;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use crate::error::{MappingError, Result};
use crate::record::{Record, RecordDef};
use crate::table::TableDescriptor;

type DescriptorKey = (TypeId, String);

/// Owns every table descriptor built so far.
#[derive(Debug, Default)]
pub struct DescriptorRegistry {
    entries: HashMap<DescriptorKey, Arc<TableDescriptor>>,
    building: HashSet<DescriptorKey>,
}

impl DescriptorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the descriptor of `T` stored in `table_name`, building and
    /// caching it on first request.
    ///
    /// Without an override the table name is the record's `table_name`
    /// marker, or its type name.
    ///
    /// # Errors
    ///
    /// Returns the first [`MappingError`] found while resolving the record's
    /// fields, or [`MappingError::Format`] when a record nests itself through
    /// its own child tables.
    pub fn describe<T: Record>(&mut self, table_name: Option<&str>) -> Result<Arc<TableDescriptor>> {
        let def = RecordDef::<T>::collect();
        let table_name = table_name
            .map(str::to_string)
            .or_else(|| def.table.table_name.clone())
            .unwrap_or_else(|| T::NAME.to_string());
        let key = (TypeId::of::<T>(), table_name);

        if let Some(existing) = self.entries.get(&key) {
            return Ok(Arc::clone(existing));
        }
        if !self.building.insert(key.clone()) {
            return Err(MappingError::Format(format!(
                "type {} nests itself through child table '{}'",
                T::NAME,
                key.1
            )));
        }

        let built = TableDescriptor::build(def, key.1.clone(), self);
        self.building.remove(&key);
        let descriptor = Arc::new(built?);
        self.entries.insert(key, Arc::clone(&descriptor));
        Ok(descriptor)
    }

    /// Returns a cached descriptor without building one.
    pub fn get<T: Record>(&self, table_name: &str) -> Option<Arc<TableDescriptor>> {
        self.entries
            .get(&(TypeId::of::<T>(), table_name.to_string()))
            .cloned()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
