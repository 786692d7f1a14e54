//! Embedded SQLite store implementation for the filter tables.
use rusqlite::{params, Connection, OptionalExtension};
use std::{path::PathBuf, time::Duration};
use tracing::{debug, warn};

use super::{KeyValueStore, Table, Transaction};
use crate::config::{JournalMode, StoreConfig, Synchronous};
use crate::error::StoreError;

/// One table per [`Table`]:
///   <name>(key BLOB PRIMARY KEY, value BLOB NOT NULL)
///
/// Every call opens its own connection, so the store is `Send + Sync`
/// without a connection pool. The path must name a file; `:memory:` would
/// give each call a fresh database.
#[derive(Debug, Clone)]
pub struct SqliteStore {
    path: PathBuf,
    synchronous: Synchronous,
    busy_timeout: Duration,
}

impl SqliteStore {
    /// Creates/initializes the SQLite file at `path` with default settings.
    pub fn new(path: impl Into<PathBuf>) -> Result<Self, StoreError> {
        Self::open(&StoreConfig {
            path: path.into(),
            ..StoreConfig::default()
        })
    }

    /// Creates/initializes the SQLite file described by `config`.
    pub fn open(config: &StoreConfig) -> Result<Self, StoreError> {
        let store = Self {
            path: config.path.clone(),
            synchronous: config.synchronous,
            busy_timeout: Duration::from_millis(config.busy_timeout_ms),
        };
        let conn = store.connect()?;
        // journal_mode is persistent in the file; synchronous is per connection.
        conn.execute_batch(&format!("PRAGMA journal_mode={};", journal_mode(config.journal_mode)))?;
        for table in Table::ALL {
            conn.execute_batch(&format!(
                "CREATE TABLE IF NOT EXISTS {} (
                    key   BLOB PRIMARY KEY,
                    value BLOB NOT NULL
                ) WITHOUT ROWID;",
                table.name()
            ))?;
        }
        debug!(target: "store", path = %store.path.display(), "sqlite store ready");
        Ok(store)
    }

    fn connect(&self) -> Result<Connection, StoreError> {
        let conn = Connection::open(&self.path)?;
        conn.busy_timeout(self.busy_timeout)?;
        conn.execute_batch(&format!("PRAGMA synchronous={};", synchronous(self.synchronous)))?;
        Ok(conn)
    }

    fn kv_get(conn: &Connection, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let sql = format!("SELECT value FROM {} WHERE key = ?1", table.name());
        Ok(conn
            .query_row(&sql, params![key], |row| row.get::<_, Vec<u8>>(0))
            .optional()?)
    }

    fn kv_set(conn: &Connection, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        conn.execute(
            &format!(
                "INSERT INTO {}(key,value) VALUES(?1,?2)
                 ON CONFLICT(key) DO UPDATE SET value=excluded.value",
                table.name()
            ),
            params![key, value],
        )?;
        Ok(())
    }
}

fn journal_mode(mode: JournalMode) -> &'static str {
    match mode {
        JournalMode::Wal => "WAL",
        JournalMode::Delete => "DELETE",
        JournalMode::Truncate => "TRUNCATE",
    }
}

fn synchronous(level: Synchronous) -> &'static str {
    match level {
        Synchronous::Off => "OFF",
        Synchronous::Normal => "NORMAL",
        Synchronous::Full => "FULL",
    }
}

impl KeyValueStore for SqliteStore {
    type Tx = SqliteTransaction;

    fn load(&self, table: Table, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        let conn = self.connect()?;
        Self::kv_get(&conn, table, key)
    }

    fn exists(&self, table: Table, key: &[u8]) -> Result<bool, StoreError> {
        let conn = self.connect()?;
        let sql = format!("SELECT 1 FROM {} WHERE key = ?1 LIMIT 1", table.name());
        Ok(conn.query_row(&sql, params![key], |_| Ok(())).optional()?.is_some())
    }

    fn store(&self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        let conn = self.connect()?;
        Self::kv_set(&conn, table, key, value)
    }

    fn transaction(&self) -> Result<Self::Tx, StoreError> {
        let conn = self.connect()?;
        conn.execute_batch("BEGIN IMMEDIATE")?;
        Ok(SqliteTransaction { conn, open: true })
    }
}

/// Write transaction holding its own connection.
///
/// Rolled back on drop unless [`Transaction::finalize`] was called.
pub struct SqliteTransaction {
    conn: Connection,
    open: bool,
}

impl Transaction for SqliteTransaction {
    fn store(&mut self, table: Table, key: &[u8], value: &[u8]) -> Result<(), StoreError> {
        SqliteStore::kv_set(&self.conn, table, key, value)
    }

    fn finalize(mut self, commit: bool) -> Result<(), StoreError> {
        self.open = false;
        self.conn
            .execute_batch(if commit { "COMMIT" } else { "ROLLBACK" })?;
        Ok(())
    }
}

impl Drop for SqliteTransaction {
    fn drop(&mut self) {
        if self.open {
            if let Err(error) = self.conn.execute_batch("ROLLBACK") {
                warn!(target: "store", %error, "rollback of abandoned transaction failed");
            }
        }
    }
}
