//! Forward-only schema migration framework.
//!
//! The schema version lives in the `schema_version` table (one row per applied
//! version). Databases written before that table existed are detected by shape:
//! a `code_snippets_fts` index means version 2, otherwise version 1.

use rusqlite::{Connection, OptionalExtension};

use super::schema;
use crate::error::{ContextError, Result};

/// The schema version that the current binary expects.
pub const CURRENT_SCHEMA_VERSION: u32 = 4;

pub(crate) fn object_exists(conn: &Connection, kind: &str, name: &str) -> rusqlite::Result<bool> {
    conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = ?1 AND name = ?2)",
        [kind, name],
        |row| row.get(0),
    )
}

/// Highest version recorded in `schema_version`, or `None` if nothing is recorded.
pub(crate) fn stored_version(conn: &Connection) -> rusqlite::Result<Option<u32>> {
    if !object_exists(conn, "table", "schema_version")? {
        return Ok(None);
    }
    conn.query_row("SELECT MAX(version) FROM schema_version", [], |row| {
        row.get::<_, Option<u32>>(0)
    })
    .optional()
    .map(Option::flatten)
}

/// Record that `version` has been applied.
pub(crate) fn stamp_version(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS schema_version (version INTEGER NOT NULL, applied_at TEXT NOT NULL);",
    )?;
    conn.execute(
        "INSERT INTO schema_version (version, applied_at) VALUES (?1, ?2)",
        rusqlite::params![version, super::now()],
    )?;
    Ok(())
}

/// Get the schema version of an existing database.
pub fn current_version(conn: &Connection) -> rusqlite::Result<u32> {
    if let Some(version) = stored_version(conn)? {
        return Ok(version);
    }
    if object_exists(conn, "table", "code_snippets_fts")? {
        Ok(2)
    } else {
        Ok(1)
    }
}

/// Bring the database up to [`CURRENT_SCHEMA_VERSION`], one transaction per step.
///
/// Returns the version the database was at before migrating. A database stamped with
/// a newer version than this binary understands is refused.
pub fn ensure_current(conn: &Connection) -> Result<u32> {
    if !object_exists(conn, "table", "sessions")? {
        // Empty file: lay down the whole schema instead of replaying history.
        schema::init_schema(conn)?;
        return Ok(CURRENT_SCHEMA_VERSION);
    }

    let start = current_version(conn)?;
    if start > CURRENT_SCHEMA_VERSION {
        return Err(ContextError::SchemaNewer {
            found: start,
            expected: CURRENT_SCHEMA_VERSION,
        });
    }
    tracing::debug!(schema_version = start, target = CURRENT_SCHEMA_VERSION, "checking migrations");

    let mut version = start;
    while version < CURRENT_SCHEMA_VERSION {
        let next = version + 1;
        tracing::info!(from = version, to = next, "running migration");
        apply(conn, next).map_err(|source| ContextError::Migration {
            version: next,
            source,
        })?;
        version = next;
    }

    Ok(start)
}

fn apply(conn: &Connection, version: u32) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    match version {
        2 => migrate_v1_to_v2(&tx)?,
        3 => migrate_v2_to_v3(&tx)?,
        4 => migrate_v3_to_v4(&tx)?,
        _ => return Err(rusqlite::Error::InvalidQuery),
    }
    stamp_version(&tx, version)?;
    tx.commit()
}

/// Migration v1 → v2: full-text index over code snippets, backfilled from existing rows.
fn migrate_v1_to_v2(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(schema::SNIPPET_FTS_SQL)?;
    conn.execute(
        "INSERT INTO code_snippets_fts(code_snippets_fts) VALUES ('rebuild')",
        [],
    )?;
    Ok(())
}

/// Migration v2 → v3: version table and recency/topic indexes. Unversioned files also
/// carry `YYYY-MM-DD HH:MM:SS` timestamps, which are rewritten into the stored form.
fn migrate_v2_to_v3(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(schema::VERSION_SQL)?;
    normalize_legacy_timestamps(conn)
}

/// Columns holding timestamps in tables that predate the version table.
const LEGACY_TIMESTAMP_COLUMNS: [(&str, &str); 5] = [
    ("sessions", "created_at"),
    ("sessions", "updated_at"),
    ("messages", "created_at"),
    ("summaries", "created_at"),
    ("code_snippets", "created_at"),
];

fn normalize_legacy_timestamps(conn: &Connection) -> rusqlite::Result<()> {
    for (table, column) in LEGACY_TIMESTAMP_COLUMNS {
        let rewritten = conn.execute(
            &format!(
                "UPDATE {table}
                 SET {column} = strftime('%Y-%m-%dT%H:%M:%S', {column}) || '.000000Z'
                 WHERE {column} NOT LIKE '%T%' AND julianday({column}) IS NOT NULL"
            ),
            [],
        )?;
        if rewritten > 0 {
            tracing::debug!(table, column, rewritten, "normalized legacy timestamps");
        }
    }
    Ok(())
}

/// Migration v3 → v4: checkpoint storage.
fn migrate_v3_to_v4(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(schema::CHECKPOINTS_SQL)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn legacy_v1() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(schema::BASE_SQL).unwrap();
        conn
    }

    #[test]
    fn fresh_schema_is_current() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        assert_eq!(current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn database_without_version_table_is_v1() {
        let conn = legacy_v1();
        assert_eq!(current_version(&conn).unwrap(), 1);
    }

    #[test]
    fn snippet_index_without_version_table_is_v2() {
        let conn = legacy_v1();
        conn.execute_batch(schema::SNIPPET_FTS_SQL).unwrap();
        assert_eq!(current_version(&conn).unwrap(), 2);
    }

    #[test]
    fn ensure_current_upgrades_v1() {
        let conn = legacy_v1();
        conn.execute(
            "INSERT INTO sessions (session_id, created_at, updated_at) VALUES ('old', 'x', 'x')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO code_snippets (session_id, code, created_at) VALUES (1, 'fn tokio_main() {}', 'x')",
            [],
        )
        .unwrap();

        let before = ensure_current(&conn).unwrap();
        assert_eq!(before, 1);
        assert_eq!(current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);

        // Rows written before the snippet index existed are searchable afterwards.
        let hits: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM code_snippets_fts WHERE code_snippets_fts MATCH 'tokio_main'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(hits, 1);

        assert!(object_exists(&conn, "table", "context_checkpoints").unwrap());
        assert!(object_exists(&conn, "index", "idx_topics_topic").unwrap());
    }

    #[test]
    fn legacy_timestamps_are_rewritten() {
        let conn = legacy_v1();
        conn.execute(
            "INSERT INTO sessions (session_id, created_at, updated_at)
             VALUES ('old', '2026-01-01 09:00:00', '2026-01-01 09:30:00')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO messages (session_id, role, content, sequence, created_at)
             VALUES (1, 'user', 'hi', 0, '2026-01-01 09:00:01')",
            [],
        )
        .unwrap();

        ensure_current(&conn).unwrap();

        let (created, updated): (String, String) = conn
            .query_row("SELECT created_at, updated_at FROM sessions", [], |row| {
                Ok((row.get(0)?, row.get(1)?))
            })
            .unwrap();
        assert_eq!(created, "2026-01-01T09:00:00.000000Z");
        assert_eq!(updated, "2026-01-01T09:30:00.000000Z");
        assert!(created.as_str() < "2026-01-01T09:00:00.500000Z");
        let message: String = conn
            .query_row("SELECT created_at FROM messages", [], |row| row.get(0))
            .unwrap();
        assert_eq!(message, "2026-01-01T09:00:01.000000Z");
    }

    #[test]
    fn v3_to_v4_adds_checkpoints() {
        let conn = legacy_v1();
        conn.execute_batch(schema::SNIPPET_FTS_SQL).unwrap();
        conn.execute_batch(schema::VERSION_SQL).unwrap();
        stamp_version(&conn, 3).unwrap();
        assert!(!object_exists(&conn, "table", "context_checkpoints").unwrap());

        assert_eq!(ensure_current(&conn).unwrap(), 3);
        assert!(object_exists(&conn, "table", "context_checkpoints").unwrap());
        assert_eq!(current_version(&conn).unwrap(), 4);
    }

    #[test]
    fn migrations_are_idempotent() {
        let conn = legacy_v1();
        ensure_current(&conn).unwrap();
        ensure_current(&conn).unwrap(); // second call should not error
        assert_eq!(current_version(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn newer_schema_is_refused() {
        let conn = Connection::open_in_memory().unwrap();
        schema::init_schema(&conn).unwrap();
        stamp_version(&conn, CURRENT_SCHEMA_VERSION + 1).unwrap();

        let err = ensure_current(&conn).unwrap_err();
        assert!(matches!(
            err,
            ContextError::SchemaNewer { found, expected }
                if found == CURRENT_SCHEMA_VERSION + 1 && expected == CURRENT_SCHEMA_VERSION
        ));
    }

    #[test]
    fn empty_file_gets_full_schema() {
        let conn = Connection::open_in_memory().unwrap();
        assert_eq!(ensure_current(&conn).unwrap(), CURRENT_SCHEMA_VERSION);
        assert!(object_exists(&conn, "table", "sessions").unwrap());
    }
}
