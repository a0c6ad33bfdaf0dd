//! The public mapping facade.

use std::any::Any;
use std::sync::Arc;

use rusqlite::types::Value;
use tablemap_core::{
    ConversionError, FieldDiagnostic, MappingError, Record, TableDescriptor,
};
use tablemap_db::{Database, DatabaseConfig, parameterize, quote_identifier};
use tracing::{debug, info, warn};

use crate::delete::{delete_matching, delete_row};
use crate::error::{MapError, Result};
use crate::read::read_table;
use crate::schema::{ID_COLUMN, VALUE_COLUMN, record_table_sql};
use crate::session::Session;
use crate::validate::validate;
use crate::write::write_records;

/// Rows returned by [`Mapper::read_with_diagnostics`].
#[derive(Debug)]
pub struct ReadOutcome<T> {
    pub rows: Vec<T>,
    /// Stored values that could not be assigned; their fields kept defaults.
    pub diagnostics: Vec<FieldDiagnostic>,
}

/// Reads and writes [`Record`] types through one database.
///
/// Descriptors are built on first use of a `(type, table name)` pair,
/// validated once against the database, and cached for the mapper's
/// lifetime. The connection is kept open for the whole of each call and
/// released afterwards unless configured to stay open.
///
/// # Examples
///
/// ```
/// use tablemap_core::{Record, RecordDef};
/// use tablemap_db::DatabaseConfig;
/// use tablemap_sqlite::Mapper;
///
/// #[derive(Debug, Default)]
/// struct Note {
///     id: i64,
///     text: String,
/// }
///
/// impl Record for Note {
///     const NAME: &'static str = "Note";
///
///     fn describe(def: &mut RecordDef<Self>) {
///         def.field("ID", |n| n.id, |n, v| n.id = v).primary_key();
///         def.field("Text", |n| n.text.clone(), |n, v| n.text = v);
///     }
/// }
///
/// let mut mapper = Mapper::open(DatabaseConfig::in_memory()).unwrap();
/// let mut notes = vec![Note { id: 0, text: "hello".into() }];
/// mapper.write(&mut notes, None).unwrap();
/// assert_ne!(notes[0].id, 0);
///
/// let read: Vec<Note> = mapper.read(Some("Text = 'hello'"), None).unwrap().unwrap();
/// assert_eq!(read[0].id, notes[0].id);
/// ```
#[derive(Debug)]
pub struct Mapper {
    db: Database,
    session: Session,
}

impl Mapper {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            session: Session::default(),
        }
    }

    /// Creates a mapper over a database opened lazily from `config`.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Database`] if the configured path is empty.
    pub fn open(config: DatabaseConfig) -> Result<Self> {
        Ok(Self::new(Database::new(config)?))
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    pub fn database_mut(&mut self) -> &mut Database {
        &mut self.db
    }

    pub fn into_database(self) -> Database {
        self.db
    }

    /// Returns the cached descriptor of `T` in `table` (default: its own
    /// table name), building it on first request.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Mapping`] if `T` declares an invalid layout.
    pub fn descriptor<T: Record>(&mut self, table: Option<&str>) -> Result<Arc<TableDescriptor>> {
        Ok(self.session.registry.describe::<T>(table)?)
    }

    fn scoped<R>(
        &mut self,
        body: impl FnOnce(&mut Session, &mut Database) -> Result<R>,
    ) -> Result<R> {
        let previous = self.db.set_keep_open(true);
        let outcome = body(&mut self.session, &mut self.db);
        self.db.set_keep_open(previous);
        self.session.release_secondaries();
        self.db.release();
        outcome
    }

    /// Reads the rows of `T` matching `filter`.
    ///
    /// `filter` is `WHERE` clause text (the keyword is optional); literals
    /// are bound as parameters. Returns `Ok(None)` when the table is absent
    /// from a read-only database. Values that fail to convert are logged and
    /// leave their field at its default.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Database`] with
    /// [`SqlInjection`](tablemap_db::DatabaseError::SqlInjection) for a
    /// rejected filter, [`MapError::Mapping`] for layout or schema errors.
    pub fn read<T: Record>(
        &mut self,
        filter: Option<&str>,
        table: Option<&str>,
    ) -> Result<Option<Vec<T>>> {
        let Some(outcome) = self.read_with_diagnostics::<T>(filter, table)? else {
            return Ok(None);
        };
        for diagnostic in &outcome.diagnostics {
            warn!(
                table = %diagnostic.table,
                column = %diagnostic.column,
                row = diagnostic.row,
                error = %diagnostic.error,
                "value left at default"
            );
        }
        Ok(Some(outcome.rows))
    }

    /// Like [`read`](Self::read), returning conversion failures instead of
    /// logging them.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    pub fn read_with_diagnostics<T: Record>(
        &mut self,
        filter: Option<&str>,
        table: Option<&str>,
    ) -> Result<Option<ReadOutcome<T>>> {
        let filter = parameterize(filter.unwrap_or_default())?;
        let descriptor = self.descriptor::<T>(table)?;
        self.scoped(|session, db| {
            session.next_marker();
            let mut diagnostics = Vec::new();
            let Some(records) = read_table(session, db, &descriptor, &filter, &mut diagnostics)?
            else {
                warn!(
                    table = descriptor.table_name(),
                    "table is absent from the read-only database"
                );
                return Ok(None);
            };
            let rows = unbox::<T>(descriptor.table_name(), records)?;
            debug!(table = descriptor.table_name(), rows = rows.len(), "read rows");
            Ok(Some(ReadOutcome { rows, diagnostics }))
        })
    }

    /// Inserts or replaces `records`, recursively with their arrays and
    /// children.
    ///
    /// Records whose primary key is zero get a key assigned by the database;
    /// it is written back into the record. Children are linked to their
    /// parent's key and replace the children previously stored for it.
    /// Without an enclosing [`transaction`](Self::transaction), rows written
    /// before a failure stay written.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Database`] with
    /// [`ReadOnly`](tablemap_db::DatabaseError::ReadOnly) on a read-only
    /// database, [`MapError::Mapping`] for layout or schema errors, or
    /// [`MapError::Sqlite`] on statement failure.
    pub fn write<T: Record>(&mut self, records: &mut [T], table: Option<&str>) -> Result<()> {
        let descriptor = self.descriptor::<T>(table)?;
        let count = records.len();
        self.scoped(|session, db| {
            session.next_marker();
            let rows: Vec<&mut dyn Any> = records
                .iter_mut()
                .map(|record| record as &mut dyn Any)
                .collect();
            let written = write_records(session, db, &descriptor, rows);
            // Rows written before a failure may reference new index entries.
            let flushed = session.flush_indexes(db);
            written.and(flushed)
        })?;
        debug!(table = descriptor.table_name(), rows = count, "wrote rows");
        Ok(())
    }

    /// Deletes `records` by primary key, with their array and child rows.
    /// Returns the number of rows removed from the record table.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Mapping`] with
    /// [`Argument`](MappingError::Argument) if `T` declares no primary key.
    pub fn delete_by_key<T: Record>(&mut self, records: &[T], table: Option<&str>) -> Result<usize> {
        let descriptor = self.descriptor::<T>(table)?;
        let Some(primary_key) = descriptor.primary_key() else {
            return Err(MappingError::Argument(format!(
                "type {} declares no primary key to delete by",
                T::NAME
            ))
            .into());
        };
        self.scoped(|session, db| {
            db.ensure_writable("delete")?;
            validate(session, db, &descriptor)?;
            let mut deleted = 0;
            for record in records {
                let key = primary_key.read_value(record).map_err(|err| {
                    MapError::conversion(descriptor.table_name(), primary_key.storage_name(), err)
                })?;
                deleted += delete_row(session, db, &descriptor, primary_key.storage_name(), &key)?;
            }
            Ok(deleted)
        })
    }

    /// Deletes the rows of `T` matching `filter`, with their array and child
    /// rows. Returns the number of rows removed from the record table.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Database`] with
    /// [`SqlInjection`](tablemap_db::DatabaseError::SqlInjection) for a
    /// rejected filter.
    pub fn delete_where<T: Record>(&mut self, filter: &str, table: Option<&str>) -> Result<usize> {
        let filter = parameterize(filter)?;
        let descriptor = self.descriptor::<T>(table)?;
        self.scoped(|session, db| {
            db.ensure_writable("delete")?;
            validate(session, db, &descriptor)?;
            delete_matching(session, db, &descriptor, &filter)
        })
    }

    /// Creates the table of `T` if it is absent and returns its DDL.
    ///
    /// Array, index and child tables are created when the descriptor is
    /// first validated.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Database`] with
    /// [`ReadOnly`](tablemap_db::DatabaseError::ReadOnly) if the table is
    /// absent from a read-only database.
    pub fn create_table<T: Record>(&mut self, table: Option<&str>) -> Result<String> {
        let descriptor = self.descriptor::<T>(table)?;
        let ddl = record_table_sql(&descriptor);
        self.scoped(|_, db| {
            if !db.table_exists(descriptor.table_name())? {
                db.ensure_writable("create table")?;
                db.execute_batch(&ddl)?;
                info!(table = descriptor.table_name(), "created table");
            }
            Ok(())
        })?;
        Ok(ddl)
    }

    /// Returns the `(id, value)` entries of an index table, ordered by id.
    /// Empty if the table is absent from a read-only database.
    ///
    /// # Errors
    ///
    /// Returns [`MapError::Mapping`] if the table exists with a different
    /// shape.
    pub fn index_table_contents(&mut self, table: &str) -> Result<Vec<(i64, String)>> {
        self.scoped(|session, db| {
            let marker = session.marker();
            if session.indexes.get_or_create(db, table, marker)?.is_none() {
                return Ok(Vec::new());
            }
            let sql = format!(
                "SELECT {id}, {value} FROM {} ORDER BY {id}",
                quote_identifier(table),
                id = quote_identifier(ID_COLUMN),
                value = quote_identifier(VALUE_COLUMN)
            );
            let result = db.query(&sql, &[])?;
            Ok(result
                .rows
                .into_iter()
                .filter_map(|row| {
                    let mut values = row.into_iter();
                    match (values.next(), values.next()) {
                        (Some(Value::Integer(id)), Some(Value::Text(value))) => Some((id, value)),
                        _ => None,
                    }
                })
                .collect())
        })
    }

    /// Runs `body` in a transaction: committed when it returns `Ok`, rolled
    /// back when it returns `Err`.
    ///
    /// A rollback also drops cached descriptors and index entries, since the
    /// tables and entries they describe may have been rolled back with it.
    ///
    /// # Errors
    ///
    /// Returns the error of `body`, or [`MapError::Database`] if a
    /// transaction is already open or `COMMIT` fails.
    pub fn transaction<R>(&mut self, body: impl FnOnce(&mut Self) -> Result<R>) -> Result<R> {
        self.db.begin_transaction()?;
        let outcome = body(self);
        let finished = match &outcome {
            Ok(_) => self.db.commit(),
            Err(_) => self.db.rollback(),
        };
        if outcome.is_err() || finished.is_err() {
            self.session.reset();
            if self.db.in_transaction() {
                if let Err(err) = self.db.rollback() {
                    warn!(error = %err, "rollback after failed commit failed");
                }
            }
        }
        self.db.release();
        match (outcome, finished) {
            (Ok(value), Ok(())) => Ok(value),
            (Ok(_), Err(err)) => Err(err.into()),
            (Err(err), Err(rollback)) => {
                warn!(error = %rollback, "rollback failed");
                Err(err)
            }
            (Err(err), Ok(())) => Err(err),
        }
    }
}

fn unbox<T: Record>(table: &str, records: Vec<Box<dyn Any>>) -> Result<Vec<T>> {
    records
        .into_iter()
        .map(|record| {
            record.downcast::<T>().map(|record| *record).map_err(|_| {
                MapError::conversion(
                    table,
                    T::NAME,
                    ConversionError::RecordMismatch { expected: T::NAME },
                )
            })
        })
        .collect()
}
