//! The [`Database`] handle: one lazily opened SQLite connection.
//!
//! The connection is opened on the first statement and dropped again by
//! [`Database::release`] unless the keep-open flag is set, a transaction is
//! outstanding, or the database lives in memory.

use std::path::{Path, PathBuf};

use rusqlite::types::Value;
use rusqlite::{Connection, OpenFlags, params_from_iter};
use tracing::{debug, warn};

use crate::config::DatabaseConfig;
use crate::error::{DatabaseError, Result};

/// Rows returned by [`Database::query`], fully collected.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl QueryResult {
    /// Position of `name` among the result columns, ignoring ASCII case.
    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|column| column.eq_ignore_ascii_case(name))
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// A SQLite database file and its (possibly closed) connection.
///
/// # Examples
///
/// ```
/// use rusqlite::types::Value;
/// use tablemap_db::{Database, DatabaseConfig};
///
/// let mut db = Database::new(DatabaseConfig::in_memory()).unwrap();
/// db.execute_batch("CREATE TABLE t (x INTEGER)").unwrap();
/// db.execute("INSERT INTO t (x) VALUES (?1)", &[Value::Integer(7)]).unwrap();
/// let x = db.query_scalar("SELECT x FROM t", &[]).unwrap();
/// assert_eq!(x, Some(Value::Integer(7)));
/// ```
#[derive(Debug)]
pub struct Database {
    config: DatabaseConfig,
    conn: Option<Connection>,
    keep_open: bool,
    in_transaction: bool,
}

impl Database {
    /// Creates a handle for the configured database without opening it.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Argument`] if the configured path is empty.
    pub fn new(config: DatabaseConfig) -> Result<Self> {
        config.check()?;
        Ok(Self {
            keep_open: config.keep_open,
            config,
            conn: None,
            in_transaction: false,
        })
    }

    /// Shorthand for a default configuration at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Argument`] if `path` is empty.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        Self::new(DatabaseConfig::new(path))
    }

    pub fn config(&self) -> &DatabaseConfig {
        &self.config
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    /// Directory relative secondary database paths resolve against.
    pub fn directory(&self) -> PathBuf {
        if self.config.is_memory() {
            return PathBuf::from(".");
        }
        match self.config.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    pub fn is_read_only(&self) -> bool {
        self.config.read_only
    }

    /// Fails with [`DatabaseError::ReadOnly`] when the database was opened
    /// read-only. `operation` names the rejected call in the message.
    pub fn ensure_writable(&self, operation: &str) -> Result<()> {
        if self.config.read_only {
            return Err(DatabaseError::ReadOnly(format!(
                "{} ({operation})",
                self.config.path.display()
            )));
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.conn.is_some()
    }

    pub fn keep_open(&self) -> bool {
        self.keep_open
    }

    /// Sets the keep-open flag and returns its previous value.
    pub fn set_keep_open(&mut self, keep_open: bool) -> bool {
        std::mem::replace(&mut self.keep_open, keep_open)
    }

    pub fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    /// Returns the live connection, opening it if needed.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`] if SQLite cannot open the file, or
    /// [`DatabaseError::Io`] if its directory cannot be created.
    pub fn connection(&mut self) -> Result<&Connection> {
        let conn = match self.conn.take() {
            Some(conn) => conn,
            None => self.connect()?,
        };
        Ok(self.conn.insert(conn))
    }

    fn connect(&self) -> Result<Connection> {
        let conn = if self.config.is_memory() {
            Connection::open_in_memory()?
        } else if self.config.read_only {
            Connection::open_with_flags(
                &self.config.path,
                OpenFlags::SQLITE_OPEN_READ_ONLY
                    | OpenFlags::SQLITE_OPEN_URI
                    | OpenFlags::SQLITE_OPEN_NO_MUTEX,
            )?
        } else {
            if let Some(parent) = self.config.path.parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            Connection::open(&self.config.path)?
        };
        conn.busy_timeout(self.config.busy.timeout())?;
        debug!(
            path = %self.config.path.display(),
            read_only = self.config.read_only,
            "opened database connection"
        );
        Ok(conn)
    }

    /// Closes the connection now. A no-op when it is not open.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Argument`] while a transaction is outstanding.
    pub fn close(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(DatabaseError::Argument(
                "cannot close a connection with an open transaction".into(),
            ));
        }
        self.drop_connection();
        Ok(())
    }

    /// Closes the connection unless it must stay open: keep-open is set, a
    /// transaction is outstanding, or the database lives in memory.
    pub fn release(&mut self) {
        if self.keep_open || self.in_transaction || self.config.is_memory() {
            return;
        }
        self.drop_connection();
    }

    fn drop_connection(&mut self) {
        if let Some(conn) = self.conn.take() {
            if let Err((_, err)) = conn.close() {
                warn!(path = %self.config.path.display(), error = %err, "failed to close database");
            } else {
                debug!(path = %self.config.path.display(), "closed database connection");
            }
        }
    }

    /// Runs one statement and returns the number of affected rows.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`] on statement failure.
    pub fn execute(&mut self, sql: &str, params: &[Value]) -> Result<usize> {
        debug!(sql, params = params.len(), "execute");
        let affected = self.connection()?.execute(sql, params_from_iter(params.iter()))?;
        Ok(affected)
    }

    /// Runs several parameterless statements.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`] on statement failure.
    pub fn execute_batch(&mut self, sql: &str) -> Result<()> {
        debug!(sql, "execute batch");
        self.connection()?.execute_batch(sql)?;
        Ok(())
    }

    /// Runs a query and collects every row before returning.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`] on statement failure.
    pub fn query(&mut self, sql: &str, params: &[Value]) -> Result<QueryResult> {
        debug!(sql, params = params.len(), "query");
        let conn = self.connection()?;
        let mut stmt = conn.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let width = columns.len();

        let mut rows = Vec::new();
        let mut cursor = stmt.query(params_from_iter(params.iter()))?;
        while let Some(row) = cursor.next()? {
            let mut values = Vec::with_capacity(width);
            for index in 0..width {
                values.push(row.get::<_, Value>(index)?);
            }
            rows.push(values);
        }
        Ok(QueryResult { columns, rows })
    }

    /// Returns the first column of the first row, or `None` for no rows.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`] on statement failure.
    pub fn query_scalar(&mut self, sql: &str, params: &[Value]) -> Result<Option<Value>> {
        let result = self.query(sql, params)?;
        Ok(result
            .rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next()))
    }

    /// Rowid of the most recent successful insert on this connection.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Sqlite`] if the connection cannot be opened.
    pub fn last_insert_rowid(&mut self) -> Result<i64> {
        Ok(self.connection()?.last_insert_rowid())
    }

    /// Starts a transaction. Only one may be outstanding.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Argument`] if a transaction is already open.
    pub fn begin_transaction(&mut self) -> Result<()> {
        if self.in_transaction {
            return Err(DatabaseError::Argument(
                "a transaction is already in progress".into(),
            ));
        }
        self.execute_batch("BEGIN")?;
        self.in_transaction = true;
        Ok(())
    }

    /// Commits the outstanding transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Argument`] without an open transaction.
    pub fn commit(&mut self) -> Result<()> {
        self.finish("COMMIT")
    }

    /// Rolls back the outstanding transaction.
    ///
    /// # Errors
    ///
    /// Returns [`DatabaseError::Argument`] without an open transaction.
    pub fn rollback(&mut self) -> Result<()> {
        self.finish("ROLLBACK")
    }

    fn finish(&mut self, statement: &str) -> Result<()> {
        if !self.in_transaction {
            return Err(DatabaseError::Argument(format!(
                "{statement} without an open transaction"
            )));
        }
        let outcome = self.execute_batch(statement);
        // A failed COMMIT can leave the transaction open.
        self.in_transaction = self.conn.as_ref().is_some_and(|conn| !conn.is_autocommit());
        outcome
    }

    /// Runs `body` inside a transaction, committing on success and rolling
    /// back on error. Joins the outstanding transaction if there is one.
    ///
    /// # Errors
    ///
    /// Returns the error of `body`, or of `BEGIN`/`COMMIT`.
    pub fn atomically<R, E>(
        &mut self,
        body: impl FnOnce(&mut Self) -> std::result::Result<R, E>,
    ) -> std::result::Result<R, E>
    where
        E: From<DatabaseError>,
    {
        if self.in_transaction {
            return body(self);
        }
        self.begin_transaction()?;
        match body(self) {
            Ok(value) => {
                self.commit()?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback) = self.rollback() {
                    warn!(error = %rollback, "rollback failed");
                }
                Err(err)
            }
        }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        if self.in_transaction {
            warn!(path = %self.config.path.display(), "dropping database with an open transaction");
        }
    }
}
