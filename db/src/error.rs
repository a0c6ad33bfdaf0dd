//! Error types for connection, configuration and filter handling.

use thiserror::Error;

/// Errors raised by the database collaborator.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// SQLite statement or connection failure.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// File I/O failure (configuration files, database directories).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Caller-supplied filter text contains disallowed tokens or is
    /// malformed. The text never reaches the database.
    #[error("rejected filter: {0}")]
    SqlInjection(String),

    /// A caller precondition was violated (empty path, nested transaction).
    #[error("invalid argument: {0}")]
    Argument(String),

    /// A write was attempted on a database opened read-only.
    #[error("database '{0}' is opened read-only")]
    ReadOnly(String),
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
