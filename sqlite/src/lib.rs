//! Recursive object-relational mapping over SQLite.
//!
//! [`Mapper`] reads and writes types implementing
//! [`Record`](tablemap_core::Record). On first use of a type it builds the
//! type's table descriptor, checks it against the live schema (creating
//! absent tables when allowed) and caches it. Reads and writes then recurse
//! through the descriptor:
//!
//! - plain columns map to columns of the record table
//! - index-redirected strings are interned in `(ID, VALUE)` index tables
//! - primitive arrays live in `(ID, VALUE)` array tables keyed by the owner
//! - child records live in their own tables, linked by a parent key, and may
//!   be stored in a secondary database file
//!
//! # Modules
//!
//! - **`schema`**: `CREATE TABLE` synthesis and declared-type affinity
//! - **`validate`**: checks descriptors against the live database
//! - **`index`**: the index-table cache
//! - **`read`**, **`write`**, **`delete`**: the recursive traversals
//!
//! # Quick start
//!
//! ```no_run
//! use tablemap_core::{Record, RecordDef};
//! use tablemap_db::DatabaseConfig;
//! use tablemap_sqlite::Mapper;
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
//!
//! let mut mapper = Mapper::open(DatabaseConfig::new("company.db")).unwrap();
//! let mut departments = vec![Department {
//!     name: "Eng".into(),
//!     employees: vec![
//!         Employee { name: "Ada".into(), ..Default::default() },
//!         Employee { name: "Lin".into(), ..Default::default() },
//!     ],
//!     ..Default::default()
//! }];
//! mapper.write(&mut departments, None).unwrap();
//!
//! let read: Vec<Department> = mapper.read(None, None).unwrap().unwrap_or_default();
//! println!("{} employees", read[0].employees.len());
//! ```

mod convert;
mod delete;
mod error;
mod index;
mod mapper;
mod read;
mod schema;
mod session;
mod validate;
mod write;

pub use error::{MapError, Result};
pub use mapper::{Mapper, ReadOutcome};
pub use schema::{array_table_sql, index_table_sql, record_table_sql};
