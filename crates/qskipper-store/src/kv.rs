//! Persisted key-value pairs.
//!
//! [`KeyValueStore`] is the seam the session store persists through. The
//! SQLite-backed [`Database`] is the real implementation; [`MemoryStore`] is
//! a fake for tests and ephemeral sessions.

use std::collections::BTreeMap;

use rusqlite::{params, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::database::Database;
use crate::error::Result;

pub trait KeyValueStore: Send {
    fn get(&self, key: &str) -> Result<Option<String>>;
    fn set(&mut self, key: &str, value: &str) -> Result<()>;
    /// Returns whether the key existed.
    fn remove(&mut self, key: &str) -> Result<bool>;
    fn keys(&self) -> Result<Vec<String>>;
}

/// JSON blobs on top of the string values. Defined on the trait object so
/// boxed stores get them too.
impl<'s> dyn KeyValueStore + 's {
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self.get(key)? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    pub fn set_json<T: Serialize>(&mut self, key: &str, value: &T) -> Result<()> {
        let raw = serde_json::to_string(value)?;
        self.set(key, &raw)
    }
}

impl KeyValueStore for Database {
    fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn()
            .query_row("SELECT value FROM kv WHERE key = ?1", params![key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(value)
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let now = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .map(|d| d.as_secs() as i64)
            .unwrap_or_default();
        self.conn().execute(
            "INSERT INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at",
            params![key, value, now],
        )?;
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM kv WHERE key = ?1", params![key])?;
        Ok(affected > 0)
    }

    fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn().prepare("SELECT key FROM kv ORDER BY key")?;
        let rows = stmt.query_map([], |row| row.get(0))?;

        let mut keys = Vec::new();
        for row in rows {
            keys.push(row?);
        }
        Ok(keys)
    }
}

/// In-memory [`KeyValueStore`].
#[derive(Debug, Default, Clone)]
pub struct MemoryStore {
    entries: BTreeMap<String, String>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>> {
        Ok(self.entries.get(key).cloned())
    }

    fn set(&mut self, key: &str, value: &str) -> Result<()> {
        self.entries.insert(key.to_string(), value.to_string());
        Ok(())
    }

    fn remove(&mut self, key: &str) -> Result<bool> {
        Ok(self.entries.remove(key).is_some())
    }

    fn keys(&self) -> Result<Vec<String>> {
        Ok(self.entries.keys().cloned().collect())
    }
}
