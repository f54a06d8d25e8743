// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use anyhow::{Context, Result};
use rusqlite::{Connection, OptionalExtension, params};
use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::fmt;
use std::path::Path;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;

use crate::storage::{KeyValueStorage, ListenerSet, StorageEvent, StorageListener, StorageWatch};
use crate::validate_storage_path;

/// Key-value storage in a SQLite file shared between processes.
///
/// Every process opens its own connection. Writes committed by other
/// connections are detected through `PRAGMA data_version` when
/// [`dispatch_external_changes`](KeyValueStorage::dispatch_external_changes)
/// runs, and diffed against the values this connection last saw.
pub struct SqliteStorage {
    conn: Connection,
    seen: RefCell<BTreeMap<String, String>>,
    data_version: Cell<i64>,
    listeners: ListenerSet,
}

impl fmt::Debug for SqliteStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteStorage")
            .field("keys", &self.seen.borrow().len())
            .field("data_version", &self.data_version.get())
            .finish()
    }
}

impl SqliteStorage {
    pub fn open(path: &Path) -> Result<Self> {
        let printable = path.to_string_lossy().to_string();
        validate_storage_path(&printable)?;
        let conn = Connection::open(path)
            .with_context(|| format!("open storage at {}", path.display()))?;
        Self::from_connection(conn)
    }

    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("open in-memory storage")?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self> {
        configure_connection(&conn)?;
        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS kv_store (
              key TEXT PRIMARY KEY,
              value TEXT NOT NULL,
              updated_at TEXT NOT NULL
            );
            ",
        )
        .context("create kv_store table")?;

        let storage = Self {
            conn,
            seen: RefCell::new(BTreeMap::new()),
            data_version: Cell::new(0),
            listeners: ListenerSet::default(),
        };
        *storage.seen.borrow_mut() = storage.load_all()?;
        storage.data_version.set(storage.read_data_version()?);
        Ok(storage)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key FROM kv_store ORDER BY key")
            .context("prepare key listing")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .context("list storage keys")?;
        rows.collect::<rusqlite::Result<Vec<_>>>()
            .context("read storage keys")
    }

    fn load_all(&self) -> Result<BTreeMap<String, String>> {
        let mut stmt = self
            .conn
            .prepare("SELECT key, value FROM kv_store")
            .context("prepare storage scan")?;
        let rows = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))
            .context("scan storage")?;
        rows.collect::<rusqlite::Result<BTreeMap<_, _>>>()
            .context("read storage rows")
    }

    fn read_data_version(&self) -> Result<i64> {
        self.conn
            .query_row("PRAGMA data_version", [], |row| row.get::<_, i64>(0))
            .context("read sqlite data_version")
    }
}

impl KeyValueStorage for SqliteStorage {
    fn get(&self, key: &str) -> Result<Option<String>> {
        self.conn
            .query_row(
                "SELECT value FROM kv_store WHERE key = ?",
                params![key],
                |row| row.get::<_, String>(0),
            )
            .optional()
            .with_context(|| format!("read storage key {key}"))
    }

    fn set(&self, key: &str, value: &str) -> Result<()> {
        if self.get(key)?.as_deref() == Some(value) {
            return Ok(());
        }
        let now = now_rfc3339()?;
        self.conn
            .execute(
                "
                INSERT INTO kv_store (key, value, updated_at)
                VALUES (?, ?, ?)
                ON CONFLICT(key) DO UPDATE SET
                  value = excluded.value,
                  updated_at = excluded.updated_at
                ",
                params![key, value, now],
            )
            .with_context(|| format!("upsert storage key {key}"))?;
        self.seen
            .borrow_mut()
            .insert(key.to_owned(), value.to_owned());
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        self.conn
            .execute("DELETE FROM kv_store WHERE key = ?", params![key])
            .with_context(|| format!("delete storage key {key}"))?;
        self.seen.borrow_mut().remove(key);
        Ok(())
    }

    fn watch(&self, listener: StorageListener) -> StorageWatch {
        self.listeners.add(listener)
    }

    fn dispatch_external_changes(&self) -> Result<usize> {
        let version = self.read_data_version()?;
        if version == self.data_version.get() {
            return Ok(0);
        }
        self.data_version.set(version);

        let current = self.load_all()?;
        let previous = self.seen.replace(current.clone());
        let mut events = Vec::new();
        for (key, value) in &current {
            let old_value = previous.get(key);
            if old_value != Some(value) {
                events.push(StorageEvent {
                    key: key.clone(),
                    old_value: old_value.cloned(),
                    new_value: Some(value.clone()),
                });
            }
        }
        for (key, value) in &previous {
            if !current.contains_key(key) {
                events.push(StorageEvent {
                    key: key.clone(),
                    old_value: Some(value.clone()),
                    new_value: None,
                });
            }
        }

        log::debug!("{} external storage change(s)", events.len());
        for event in &events {
            self.listeners.emit(event);
        }
        Ok(events.len())
    }
}

fn configure_connection(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA busy_timeout = 5000;
        ",
    )
    .context("configure sqlite pragmas")
}

fn now_rfc3339() -> Result<String> {
    OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .context("format current timestamp")
}

#[cfg(test)]
mod tests {
    use super::SqliteStorage;
    use crate::storage::{KeyValueStorage, StorageEvent};
    use anyhow::Result;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn values_round_trip_in_memory() -> Result<()> {
        let storage = SqliteStorage::open_memory()?;
        assert_eq!(storage.get("k")?, None);
        storage.set("k", "v1")?;
        storage.set("k", "v2")?;
        assert_eq!(storage.get("k")?.as_deref(), Some("v2"));
        storage.remove("k")?;
        assert_eq!(storage.get("k")?, None);
        assert!(storage.keys()?.is_empty());
        Ok(())
    }

    #[test]
    fn open_rejects_uri_paths() {
        let err = SqliteStorage::open(std::path::Path::new("file:state.db"))
            .expect_err("uri path should be rejected");
        assert!(err.to_string().contains("file:"));
    }

    #[test]
    fn other_connections_see_changes_on_dispatch() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let path = dir.path().join("storage.db");
        let writer = SqliteStorage::open(&path)?;
        let reader = SqliteStorage::open(&path)?;

        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = Rc::clone(&seen);
        let _watch = reader.watch(Box::new(move |event: &StorageEvent| {
            sink.borrow_mut().push(event.clone())
        }));

        assert_eq!(reader.dispatch_external_changes()?, 0);
        writer.set("k", "1")?;
        assert_eq!(reader.dispatch_external_changes()?, 1);
        assert_eq!(reader.dispatch_external_changes()?, 0);
        writer.remove("k")?;
        assert_eq!(reader.dispatch_external_changes()?, 1);

        let events = seen.borrow();
        assert_eq!(events[0].key, "k");
        assert_eq!(events[0].new_value.as_deref(), Some("1"));
        assert_eq!(events[1].old_value.as_deref(), Some("1"));
        assert_eq!(events[1].new_value, None);
        Ok(())
    }

    #[test]
    fn own_writes_are_not_reported() -> Result<()> {
        let dir = tempfile::tempdir()?;
        let storage = SqliteStorage::open(&dir.path().join("storage.db"))?;
        storage.set("k", "1")?;
        storage.remove("k")?;
        assert_eq!(storage.dispatch_external_changes()?, 0);
        Ok(())
    }
}
