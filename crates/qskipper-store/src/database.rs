//! Database connection management.
//!
//! The [`Database`] struct owns a [`rusqlite::Connection`] and guarantees that
//! migrations are run before any other operation.

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use rusqlite::Connection;

use crate::error::{Result, StoreError};
use crate::migrations;

/// Wrapper around a [`rusqlite::Connection`].
pub struct Database {
    conn: Connection,
}

impl Database {
    /// Open (or create) the default application database.
    ///
    /// The database file is placed in the platform-appropriate data directory:
    /// - Linux:   `~/.local/share/qskipper/qskipper.db`
    /// - macOS:   `~/Library/Application Support/com.qskipper.qskipper/qskipper.db`
    /// - Windows: `{FOLDERID_RoamingAppData}\qskipper\qskipper\data\qskipper.db`
    pub fn new() -> Result<Self> {
        Self::open_in_dir(&default_data_dir()?)
    }

    /// Open (or create) `qskipper.db` inside `dir`, creating the directory.
    pub fn open_in_dir(dir: &Path) -> Result<Self> {
        std::fs::create_dir_all(dir)?;
        let db_path = dir.join("qskipper.db");

        tracing::info!(path = %db_path.display(), "opening database");

        Self::open_at(&db_path)
    }

    /// Open (or create) a database at an explicit path.
    pub fn open_at(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;

        conn.pragma_update(None, "journal_mode", "WAL")?;

        migrations::run_migrations(&conn)?;

        Ok(Self { conn })
    }

    /// A private, non-persistent database. Used by tests and previews.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self { conn })
    }

    /// Return a reference to the underlying `rusqlite::Connection`.
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    /// Return the filesystem path of the open database (if any).
    pub fn path(&self) -> Option<PathBuf> {
        self.conn.path().map(PathBuf::from)
    }
}

/// Platform data directory for the application.
pub fn default_data_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "qskipper", "qskipper")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .ok_or(StoreError::NoDataDir)
}

/// Platform cache directory for the application.
pub fn default_cache_dir() -> Result<PathBuf> {
    ProjectDirs::from("com", "qskipper", "qskipper")
        .map(|dirs| dirs.cache_dir().to_path_buf())
        .ok_or(StoreError::NoDataDir)
}
