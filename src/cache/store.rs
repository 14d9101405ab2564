//! SQLite-backed store for cached command output
//!
//! Provides a `Store` that keeps one row per command invocation in a single
//! `cache` table, together with the time the row was last written.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::Utc;
use rusqlite::types::{Value, ValueRef};
use rusqlite::{params, Connection, OpenFlags, OptionalExtension};
use thiserror::Error;
use tracing::debug;

use super::CacheKey;

/// How long a statement waits on a database locked by another process
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Layout of the `cache` table as reported by `pragma_table_info`:
/// (name, declared type, not null, primary key position)
const CACHE_COLUMNS: [(&str, &str, bool, i64); 3] = [
    ("id", "TEXT", true, 1),
    ("value", "TEXT", false, 0),
    ("timestamp", "INTEGER", false, 0),
];

const CREATE_TABLE_SQL: &str =
    "CREATE TABLE cache (id TEXT NOT NULL PRIMARY KEY, value TEXT, timestamp INTEGER)";

/// Errors that can occur when using the cache store
#[derive(Debug, Error)]
pub enum StoreError {
    /// The database file is missing or cannot be opened
    #[error("cache database {} is unavailable: {reason}", path.display())]
    Unavailable { path: PathBuf, reason: String },

    /// No row matches the requested key
    #[error("no cached entry for this key")]
    NotFound,

    /// Any other database failure
    #[error("cache database error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// A statement completed but did not have the expected effect
    #[error("cache database inconsistency: {0}")]
    Logic(String),
}

/// A cached command output and the time it was stored
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheEntry {
    /// Captured standard output of the command
    pub value: Vec<u8>,
    /// Seconds since the Unix epoch at creation or last refresh
    pub timestamp: i64,
}

impl CacheEntry {
    /// Age of the entry in seconds at time `now` (negative if stored in the future)
    pub fn age(&self, now: i64) -> i64 {
        now.saturating_sub(self.timestamp)
    }
}

/// Handle on an open cache database
///
/// Each operation is its own transaction; nothing is buffered in memory.
/// The connection is closed when the store is dropped or passed to [`Store::close`].
#[derive(Debug)]
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Opens or creates the database at `path` and prepares an empty `cache` table.
    ///
    /// Running this on an already initialized database clears it. A table with
    /// an unexpected layout is dropped and recreated.
    ///
    /// Column types, `NOT NULL` and the primary key on `id` are part of the
    /// layout check: the upsert in [`Store::set_at`] relies on that key.
    pub fn initialize(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(path, e))?;
        }

        let mut conn = Connection::open(path).map_err(|e| unavailable(path, e))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        let tx = conn.transaction()?;
        let columns = {
            let mut stmt = tx.prepare(
                "SELECT name, upper(type), \"notnull\", pk FROM pragma_table_info('cache') ORDER BY cid",
            )?;
            let layout = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, bool>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                })?
                .collect::<Result<Vec<_>, _>>()?;
            layout
        };

        if columns.is_empty() {
            debug!("Creating cache table");
            tx.execute(CREATE_TABLE_SQL, [])?;
        } else if has_cache_layout(&columns) {
            debug!("Clearing existing cache table");
            tx.execute("DELETE FROM cache", [])?;
        } else {
            debug!(?columns, "Replacing incompatible cache table");
            tx.execute("DROP TABLE cache", [])?;
            tx.execute(CREATE_TABLE_SQL, [])?;
        }
        tx.commit()?;

        Ok(Self { conn })
    }

    /// Opens an existing database. A missing file is never created here.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if !path.is_file() {
            return Err(StoreError::Unavailable {
                path: path.to_path_buf(),
                reason: "file does not exist (use --init)".to_string(),
            });
        }

        let conn = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(|e| unavailable(path, e))?;
        conn.busy_timeout(BUSY_TIMEOUT)?;

        Ok(Self { conn })
    }

    /// Looks up the entry stored for `key`.
    ///
    /// Returns `StoreError::NotFound` when the key has never been cached or has expired.
    pub fn get(&self, key: &CacheKey) -> Result<CacheEntry, StoreError> {
        self.conn
            .query_row(
                "SELECT value, timestamp FROM cache WHERE id = ?1",
                params![key.as_str()],
                |row| {
                    let value = match row.get_ref(0)? {
                        ValueRef::Text(bytes) | ValueRef::Blob(bytes) => bytes.to_vec(),
                        ValueRef::Null => Vec::new(),
                        other => {
                            return Err(rusqlite::Error::InvalidColumnType(
                                0,
                                "value".to_string(),
                                other.data_type(),
                            ))
                        }
                    };
                    Ok(CacheEntry {
                        value,
                        timestamp: row.get(1)?,
                    })
                },
            )
            .optional()?
            .ok_or(StoreError::NotFound)
    }

    /// Stores `value` under `key`, stamped with the current time
    pub fn set(&self, key: &CacheKey, value: &[u8]) -> Result<(), StoreError> {
        self.set_at(key, value, Utc::now().timestamp())
    }

    /// Stores `value` under `key` with an explicit timestamp.
    ///
    /// Inserts a new row or replaces both value and timestamp of the existing
    /// one in a single statement.
    pub fn set_at(&self, key: &CacheKey, value: &[u8], timestamp: i64) -> Result<(), StoreError> {
        let payload = match String::from_utf8(value.to_vec()) {
            Ok(text) => Value::Text(text),
            Err(err) => Value::Blob(err.into_bytes()),
        };

        let affected = self.conn.execute(
            "INSERT INTO cache (id, value, timestamp) VALUES (?1, ?2, ?3)
             ON CONFLICT(id) DO UPDATE SET value = excluded.value, timestamp = excluded.timestamp",
            params![key.as_str(), payload, timestamp],
        )?;

        if affected != 1 {
            return Err(StoreError::Logic(format!(
                "upsert affected {affected} rows instead of 1"
            )));
        }
        Ok(())
    }

    /// Deletes every entry stored before `cutoff` (seconds since the epoch).
    ///
    /// Returns the number of entries removed.
    pub fn expire(&self, cutoff: i64) -> Result<usize, StoreError> {
        let removed = self
            .conn
            .execute("DELETE FROM cache WHERE timestamp < ?1", params![cutoff])?;
        Ok(removed)
    }

    /// Number of entries currently stored
    pub fn count(&self) -> Result<usize, StoreError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM cache", [], |row| row.get(0))?;
        usize::try_from(count).map_err(|_| StoreError::Logic(format!("negative row count {count}")))
    }

    /// Closes the database, reporting any error the engine raises while doing so
    pub fn close(self) -> Result<(), StoreError> {
        self.conn.close().map_err(|(_, err)| StoreError::Storage(err))
    }
}

/// Keyed access to cached entries, as needed by the get-or-run logic
pub trait CacheStore {
    fn get(&self, key: &CacheKey) -> Result<CacheEntry, StoreError>;
    fn set_at(&self, key: &CacheKey, value: &[u8], timestamp: i64) -> Result<(), StoreError>;
}

impl CacheStore for Store {
    fn get(&self, key: &CacheKey) -> Result<CacheEntry, StoreError> {
        Store::get(self, key)
    }

    fn set_at(&self, key: &CacheKey, value: &[u8], timestamp: i64) -> Result<(), StoreError> {
        Store::set_at(self, key, value, timestamp)
    }
}

fn has_cache_layout(columns: &[(String, String, bool, i64)]) -> bool {
    columns.len() == CACHE_COLUMNS.len()
        && columns
            .iter()
            .zip(CACHE_COLUMNS)
            .all(|((name, ty, not_null, pk), expected)| {
                (name.as_str(), ty.as_str(), *not_null, *pk) == expected
            })
}

fn unavailable(path: &Path, err: impl std::fmt::Display) -> StoreError {
    StoreError::Unavailable {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
