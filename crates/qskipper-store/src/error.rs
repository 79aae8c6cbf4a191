use thiserror::Error;

/// Errors produced by the store layer.
#[derive(Error, Debug)]
pub enum StoreError {
    /// SQLite error.
    #[error("Database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to determine a platform data directory.
    #[error("Could not determine application data directory")]
    NoDataDir,

    /// Generic I/O error (database directory, image cache files).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted JSON blob could not be (de)serialized.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Migration failure.
    #[error("Migration error: {0}")]
    Migration(String),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, StoreError>;
