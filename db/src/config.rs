//! Connection configuration.
//!
//! A [`DatabaseConfig`] can be built in code or loaded from YAML. Every
//! field except `path` has a default.
//!
//! # Example YAML
//!
//! ```yaml
//! path: data/app.db
//! read_only: false
//! auto_create_tables: true
//! keep_open: false
//! busy:
//!   retries: 10
//!   backoff_ms: 100
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// Path that opens a private in-memory database.
pub const MEMORY_PATH: &str = ":memory:";

/// Lock-wait budget applied when another connection holds a write lock.
///
/// # Examples
///
/// ```
/// # use tablemap_db::BusyConfig;
/// let busy = BusyConfig { retries: 4, backoff_ms: 250 };
/// assert_eq!(busy.timeout().as_millis(), 1000);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BusyConfig {
    /// Number of waits before a locked statement fails.
    #[serde(default = "default_retries")]
    pub retries: u32,
    /// Length of each wait, in milliseconds.
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

fn default_retries() -> u32 {
    10
}

fn default_backoff_ms() -> u64 {
    100
}

fn default_true() -> bool {
    true
}

impl Default for BusyConfig {
    fn default() -> Self {
        Self {
            retries: default_retries(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

impl BusyConfig {
    /// Total time SQLite may wait on a lock before reporting `SQLITE_BUSY`.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.backoff_ms.saturating_mul(u64::from(self.retries)))
    }
}

/// Settings for one database file.
///
/// # Examples
///
/// ```
/// use tablemap_db::DatabaseConfig;
///
/// let config = DatabaseConfig::new("data/app.db");
/// assert!(config.auto_create_tables);
/// assert!(!config.read_only);
///
/// let archive = config.with_path("archive.db");
/// assert_eq!(archive.path.to_str(), Some("archive.db"));
/// assert_eq!(archive.busy, config.busy);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    /// Open the file with `SQLITE_OPEN_READ_ONLY`.
    #[serde(default)]
    pub read_only: bool,
    /// Create tables that a mapped type needs but the database lacks.
    #[serde(default = "default_true")]
    pub auto_create_tables: bool,
    /// Keep the connection open between top-level calls.
    #[serde(default)]
    pub keep_open: bool,
    #[serde(default)]
    pub busy: BusyConfig,
}

impl DatabaseConfig {
    /// Returns the default configuration for `path`.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            auto_create_tables: true,
            keep_open: false,
            busy: BusyConfig::default(),
        }
    }

    /// Configuration for an in-memory database.
    pub fn in_memory() -> Self {
        Self::new(MEMORY_PATH)
    }

    /// Copies every setting except the path.
    pub fn with_path(&self, path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            ..self.clone()
        }
    }

    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](DatabaseError::Io) if the file cannot be read,
    /// [`Yaml`](DatabaseError::Yaml) if parsing fails, or
    /// [`Argument`](DatabaseError::Argument) if `path` is empty.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        config.check()?;
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`Io`](DatabaseError::Io) if the file cannot be written, or
    /// [`Yaml`](DatabaseError::Yaml) if serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Rejects a configuration without a database path.
    ///
    /// # Errors
    ///
    /// Returns [`Argument`](DatabaseError::Argument) when `path` is empty.
    pub fn check(&self) -> Result<()> {
        if self.path.as_os_str().is_empty() {
            return Err(DatabaseError::Argument(
                "database path cannot be empty".into(),
            ));
        }
        Ok(())
    }
}
