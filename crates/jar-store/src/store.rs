use std::path::Path;

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::Result;
use crate::schema;

/// String key-value storage on top of a single SQLite file.
pub struct Store {
    conn: Connection,
}

impl Store {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn conn(&self) -> &Connection {
        &self.conn
    }

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let value = self
            .conn
            .query_row("SELECT value FROM kv WHERE key = ?1", [key], |row| row.get(0))
            .optional()?;
        Ok(value)
    }

    /// Replace the value under `key`, stamped with `updated_at` (Unix ms).
    /// Either the whole value lands or the previous one is left in place.
    pub fn set(&self, key: &str, value: &str, updated_at: u64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT OR REPLACE INTO kv (key, value, updated_at) VALUES (?1, ?2, ?3)",
            params![key, value, updated_at as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Milliseconds since the epoch when `key` was last written.
    pub fn updated_at(&self, key: &str) -> Result<Option<u64>> {
        let ts: Option<i64> = self
            .conn
            .query_row("SELECT updated_at FROM kv WHERE key = ?1", [key], |row| {
                row.get(0)
            })
            .optional()?;
        Ok(ts.map(|t| t.max(0) as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_get_set_stamps_write_time() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(store.get("k").unwrap(), None);
        assert_eq!(store.updated_at("k").unwrap(), None);

        store.set("k", "[]", 1_700_000_000_000).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("[]"));
        assert_eq!(store.updated_at("k").unwrap(), Some(1_700_000_000_000));

        store.set("k", "[1]", 1_700_000_000_500).unwrap();
        assert_eq!(store.get("k").unwrap().as_deref(), Some("[1]"));
        assert_eq!(store.updated_at("k").unwrap(), Some(1_700_000_000_500));
    }

    #[test]
    fn test_values_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar.db");

        Store::open(&path).unwrap().set("k", "persisted", 42).unwrap();
        let reopened = Store::open(&path).unwrap();
        assert_eq!(reopened.get("k").unwrap().as_deref(), Some("persisted"));
        assert_eq!(reopened.updated_at("k").unwrap(), Some(42));
    }

    #[test]
    fn test_garbage_file_is_reported_corrupt() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("jar.db");
        std::fs::write(&path, "not a database ".repeat(300)).unwrap();

        let err = Store::open(&path).err().unwrap();
        assert!(err.is_corrupt(), "unexpected error: {err}");
    }
}
