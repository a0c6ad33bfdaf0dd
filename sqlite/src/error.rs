//! Error type for mapping operations.
//!
//! Wraps the descriptor, database and SQLite errors so callers see the
//! inner message, which names the offending table, column or type.

use tablemap_core::{ConversionError, MappingError};
use tablemap_db::DatabaseError;
use thiserror::Error;

/// Errors that can occur while mapping records to and from tables.
#[derive(Debug, Error)]
pub enum MapError {
    /// Descriptor construction or schema validation failure.
    #[error(transparent)]
    Mapping(#[from] MappingError),

    /// Connection, configuration or filter failure.
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// SQLite statement failure.
    #[error(transparent)]
    Sqlite(#[from] rusqlite::Error),

    /// A field value could not be moved into its stored form.
    #[error("cannot convert {table}.{column}: {source}")]
    Conversion {
        table: String,
        column: String,
        #[source]
        source: ConversionError,
    },
}

impl MapError {
    pub(crate) fn conversion(table: &str, column: &str, source: ConversionError) -> Self {
        Self::Conversion {
            table: table.to_string(),
            column: column.to_string(),
            source,
        }
    }

    /// Returns `true` if the sanitizer rejected caller filter text.
    pub fn is_sql_injection(&self) -> bool {
        matches!(self, Self::Database(DatabaseError::SqlInjection(_)))
    }
}

/// Convenience alias for results with [`MapError`].
pub type Result<T> = std::result::Result<T, MapError>;
