//! v001 -- Initial schema creation.
//!
//! Creates the `kv` table backing the persisted session keys.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Key-value pairs (session identity, restaurant snapshot, flags)
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS kv (
    key        TEXT PRIMARY KEY NOT NULL,
    value      TEXT NOT NULL,             -- plain text or a JSON blob
    updated_at INTEGER NOT NULL           -- unix seconds
);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
