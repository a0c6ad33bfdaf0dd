//! Error types for descriptor construction and value conversion.
//!
//! [`MappingError`] covers metadata and schema shape violations that only an
//! external correction (a code fix or a migration) can resolve.
//! [`ConversionError`] covers a single field value that could not be moved
//! between its Rust and SQL representations; the read path treats it as
//! non-fatal.

use thiserror::Error;

/// Errors raised while deriving or checking a record's table layout.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingError {
    /// Metadata or live schema shape violation (invalid marker combination,
    /// missing parent key, column missing from the database, type mismatch).
    #[error("format error: {0}")]
    Format(String),

    /// The live table has zero or several primary key columns where exactly
    /// one was expected.
    #[error("table '{table}' must have exactly one primary key column, found {found}")]
    MissingPrimaryKey { table: String, found: usize },

    /// A declared shape the mapper deliberately does not support.
    #[error("not supported: {0}")]
    NotSupported(String),

    /// A required table is absent and cannot be created.
    #[error("invalid operation: {0}")]
    InvalidOperation(String),

    /// A caller precondition was violated.
    #[error("invalid argument: {0}")]
    Argument(String),
}

/// A single field value could not be converted.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConversionError {
    /// The stored value has a shape the field cannot accept.
    #[error("expected {expected}, found {found}")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    /// Text could not be parsed into the field's type.
    #[error("cannot parse '{text}' as {target}")]
    Parse { text: String, target: &'static str },

    /// Numeric value does not fit the field's type.
    #[error("value {value} is out of range for {target}")]
    OutOfRange { value: String, target: &'static str },

    /// Stored text names no variant of the field's enum.
    #[error("unknown variant '{variant}' for enum {target}")]
    UnknownVariant {
        variant: String,
        target: &'static str,
    },

    /// The accessor was handed an instance of a different record type.
    #[error("accessor for {expected} received a different record type")]
    RecordMismatch { expected: &'static str },
}

/// Convenience alias for results with [`MappingError`].
pub type Result<T, E = MappingError> = std::result::Result<T, E>;
