//! Connection provider for the single context database file.
//!
//! A [`Database`] is a cheap, cloneable handle carrying only the file path. Every
//! logical operation opens its own connection through it and drops that connection
//! when done; nothing holds a handle across unrelated operations.

pub mod migrations;
pub mod schema;

use chrono::{DateTime, Duration, SecondsFormat, Utc};
use rusqlite::{Connection, OpenFlags};
use std::path::{Path, PathBuf};

use crate::config::ContextMemoryConfig;
use crate::error::Result;

/// Location of the context database plus the logic to open it.
#[derive(Debug, Clone)]
pub struct Database {
    path: PathBuf,
}

impl Database {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn from_config(config: &ContextMemoryConfig) -> Self {
        Self::new(config.resolved_db_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Size of the main database file in bytes, 0 when absent.
    pub fn file_size(&self) -> u64 {
        std::fs::metadata(&self.path).map(|m| m.len()).unwrap_or(0)
    }

    /// Open a read-only handle. Returns `None` when the database file does not exist,
    /// which read paths treat as an empty store.
    pub fn open_read_only(&self) -> Result<Option<Connection>> {
        if !self.exists() {
            return Ok(None);
        }
        let conn = Connection::open_with_flags(
            &self.path,
            OpenFlags::SQLITE_OPEN_READ_ONLY
                | OpenFlags::SQLITE_OPEN_URI
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        apply_pragmas(&conn, true)?;
        Ok(Some(conn))
    }

    /// Open a read-write handle with the schema guaranteed current: a missing file is
    /// initialized, an existing one is migrated forward.
    pub fn open_read_write(&self) -> Result<Connection> {
        if !self.exists() {
            schema::create_schema(self)?;
        }
        let conn = self.open_raw()?;
        migrations::ensure_current(&conn)?;
        Ok(conn)
    }

    /// Open a read-write handle without touching the schema.
    pub(crate) fn open_raw(&self) -> Result<Connection> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(&self.path)?;
        apply_pragmas(&conn, false)?;
        Ok(conn)
    }

    /// Remove the database file together with its `-wal` and `-shm` companions.
    pub fn remove_files(&self) -> Result<()> {
        for path in [
            self.path.clone(),
            sidecar(&self.path, "-wal"),
            sidecar(&self.path, "-shm"),
        ] {
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

fn sidecar(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// Performance pragmas applied to every handle.
fn apply_pragmas(conn: &Connection, read_only: bool) -> Result<()> {
    if !read_only {
        conn.pragma_update(None, "journal_mode", "WAL")?;
    }
    conn.pragma_update(None, "synchronous", "NORMAL")?;
    conn.pragma_update(None, "cache_size", -64000)?;
    conn.pragma_update(None, "temp_store", "MEMORY")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_secs(5))?;
    Ok(())
}

/// Canonical stored form of a timestamp. Fixed width, so text order is time order.
pub fn timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

/// Current time in stored form.
pub fn now() -> String {
    timestamp(Utc::now())
}

/// Stored-form timestamp for `days` ago.
pub fn days_ago(days: u32) -> String {
    timestamp(Utc::now() - Duration::days(i64::from(days)))
}

/// Stored-form timestamp for `minutes` ago.
pub fn minutes_ago(minutes: u32) -> String {
    timestamp(Utc::now() - Duration::minutes(i64::from(minutes)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn read_only_open_on_missing_file_is_none() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(tmp.path().join("absent.db"));
        assert!(db.open_read_only().unwrap().is_none());
        assert!(!db.exists());
    }

    #[test]
    fn read_write_open_creates_file_and_parents() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(tmp.path().join("nested").join("context.db"));
        let conn = db.open_read_write().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
        assert!(db.exists());
    }

    #[test]
    fn pragmas_are_applied() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(tmp.path().join("context.db"));
        let conn = db.open_read_write().unwrap();

        let mode: String = conn
            .pragma_query_value(None, "journal_mode", |row| row.get(0))
            .unwrap();
        assert_eq!(mode.to_lowercase(), "wal");

        let timeout: i64 = conn
            .pragma_query_value(None, "busy_timeout", |row| row.get(0))
            .unwrap();
        assert_eq!(timeout, 5000);
    }

    #[test]
    fn read_only_handle_rejects_writes() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(tmp.path().join("context.db"));
        drop(db.open_read_write().unwrap());

        let conn = db.open_read_only().unwrap().unwrap();
        let result = conn.execute(
            "INSERT INTO sessions (session_id, created_at, updated_at) VALUES ('x', 'a', 'a')",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn remove_files_cleans_sidecars() {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(tmp.path().join("context.db"));
        let conn = db.open_read_write().unwrap();
        drop(conn);
        db.remove_files().unwrap();
        assert!(!db.exists());
        assert!(!tmp.path().join("context.db-wal").exists());
        assert!(!tmp.path().join("context.db-shm").exists());
        // Removing twice is fine.
        db.remove_files().unwrap();
    }

    #[test]
    fn timestamps_sort_chronologically() {
        let older = days_ago(3);
        let newer = now();
        assert!(older < newer);
        assert_eq!(older.len(), newer.len());
    }
}
