//! Database access for the tablemap mapper.
//!
//! This crate wraps a single SQLite connection with the lifecycle the
//! mapping engine needs and sanitizes caller-supplied filter text:
//!
//! - [`Database`]: lazily opened connection, keep-open flag, one
//!   outstanding transaction, fully collected query results and live
//!   schema introspection ([`ColumnInfo`]).
//! - [`DatabaseConfig`]: YAML-loadable settings (read-only mode, table
//!   auto-creation, lock-wait budget).
//! - [`filter`]: turns `WHERE ...` text into a parameterized clause or
//!   rejects it with [`DatabaseError::SqlInjection`].
//!
//! # Quick start
//!
//! ```no_run
//! use tablemap_db::{Database, DatabaseConfig, filter::parameterize};
//!
//! let config = DatabaseConfig::load("tablemap.yml").unwrap();
//! let mut db = Database::new(config).unwrap();
//!
//! let filter = parameterize("WHERE Name = 'Ada'").unwrap();
//! let sql = format!("SELECT * FROM \"Employee\" {}", filter.clause);
//! let rows = db.query(&sql, &filter.params).unwrap();
//! println!("{} matching rows", rows.len());
//! db.release();
//! ```

mod config;
mod connection;
mod error;
pub mod filter;
mod introspect;

pub use config::{BusyConfig, DatabaseConfig, MEMORY_PATH};
pub use connection::{Database, QueryResult};
pub use error::{DatabaseError, Result};
pub use filter::{Filter, parameterize, quote_identifier};
pub use introspect::ColumnInfo;
pub use rusqlite::types::Value;
