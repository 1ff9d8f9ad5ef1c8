//! SQL DDL for all context-memory tables.
//!
//! The schema is split into the pieces that each schema version introduced, so a fresh
//! database and a migrated one run exactly the same statements. Every statement uses
//! `IF NOT EXISTS` and can be replayed safely.
//!
//! Each searchable table has an external-content FTS5 index kept in sync by
//! `AFTER INSERT/UPDATE/DELETE` triggers. Callers never touch the `*_fts` tables.

use rusqlite::Connection;
use serde::Serialize;

use super::migrations::{self, CURRENT_SCHEMA_VERSION};
use super::Database;
use crate::error::{ContextError, Result};

/// v1: sessions and their owned children, with FTS indexes for the text tables.
pub(crate) const BASE_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS sessions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT UNIQUE NOT NULL,
    project_path TEXT,
    project_hash TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    metadata TEXT
);

CREATE TABLE IF NOT EXISTS messages (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    role TEXT NOT NULL CHECK(role IN ('user','assistant','system')),
    content TEXT NOT NULL,
    sequence INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS summaries (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER UNIQUE NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    brief TEXT NOT NULL,
    detailed TEXT,
    key_decisions TEXT,
    problems_solved TEXT,
    technologies TEXT,
    outcome TEXT CHECK(outcome IS NULL OR outcome IN ('success','partial','abandoned')),
    user_note TEXT,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS topics (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    topic TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS code_snippets (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id INTEGER NOT NULL REFERENCES sessions(id) ON DELETE CASCADE,
    language TEXT,
    code TEXT NOT NULL,
    description TEXT,
    file_path TEXT,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_project_hash ON sessions(project_hash);
CREATE INDEX IF NOT EXISTS idx_sessions_created_at ON sessions(created_at DESC);
CREATE INDEX IF NOT EXISTS idx_messages_session_id ON messages(session_id, sequence);
CREATE INDEX IF NOT EXISTS idx_topics_session_id ON topics(session_id);
CREATE INDEX IF NOT EXISTS idx_code_snippets_session_id ON code_snippets(session_id);
CREATE INDEX IF NOT EXISTS idx_code_snippets_language ON code_snippets(language);

CREATE VIRTUAL TABLE IF NOT EXISTS summaries_fts USING fts5(
    brief,
    detailed,
    key_decisions,
    problems_solved,
    technologies,
    user_note,
    content='summaries',
    content_rowid='id',
    tokenize='porter unicode61'
);

CREATE VIRTUAL TABLE IF NOT EXISTS messages_fts USING fts5(
    content,
    content='messages',
    content_rowid='id',
    tokenize='porter unicode61'
);

CREATE VIRTUAL TABLE IF NOT EXISTS topics_fts USING fts5(
    topic,
    content='topics',
    content_rowid='id',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS summaries_ai AFTER INSERT ON summaries BEGIN
    INSERT INTO summaries_fts(rowid, brief, detailed, key_decisions, problems_solved, technologies, user_note)
    VALUES (NEW.id, NEW.brief, NEW.detailed, NEW.key_decisions, NEW.problems_solved, NEW.technologies, NEW.user_note);
END;

CREATE TRIGGER IF NOT EXISTS summaries_ad AFTER DELETE ON summaries BEGIN
    INSERT INTO summaries_fts(summaries_fts, rowid, brief, detailed, key_decisions, problems_solved, technologies, user_note)
    VALUES ('delete', OLD.id, OLD.brief, OLD.detailed, OLD.key_decisions, OLD.problems_solved, OLD.technologies, OLD.user_note);
END;

CREATE TRIGGER IF NOT EXISTS summaries_au AFTER UPDATE ON summaries BEGIN
    INSERT INTO summaries_fts(summaries_fts, rowid, brief, detailed, key_decisions, problems_solved, technologies, user_note)
    VALUES ('delete', OLD.id, OLD.brief, OLD.detailed, OLD.key_decisions, OLD.problems_solved, OLD.technologies, OLD.user_note);
    INSERT INTO summaries_fts(rowid, brief, detailed, key_decisions, problems_solved, technologies, user_note)
    VALUES (NEW.id, NEW.brief, NEW.detailed, NEW.key_decisions, NEW.problems_solved, NEW.technologies, NEW.user_note);
END;

CREATE TRIGGER IF NOT EXISTS messages_ai AFTER INSERT ON messages BEGIN
    INSERT INTO messages_fts(rowid, content) VALUES (NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS messages_ad AFTER DELETE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
END;

CREATE TRIGGER IF NOT EXISTS messages_au AFTER UPDATE ON messages BEGIN
    INSERT INTO messages_fts(messages_fts, rowid, content) VALUES ('delete', OLD.id, OLD.content);
    INSERT INTO messages_fts(rowid, content) VALUES (NEW.id, NEW.content);
END;

CREATE TRIGGER IF NOT EXISTS topics_ai AFTER INSERT ON topics BEGIN
    INSERT INTO topics_fts(rowid, topic) VALUES (NEW.id, NEW.topic);
END;

CREATE TRIGGER IF NOT EXISTS topics_ad AFTER DELETE ON topics BEGIN
    INSERT INTO topics_fts(topics_fts, rowid, topic) VALUES ('delete', OLD.id, OLD.topic);
END;

CREATE TRIGGER IF NOT EXISTS topics_au AFTER UPDATE ON topics BEGIN
    INSERT INTO topics_fts(topics_fts, rowid, topic) VALUES ('delete', OLD.id, OLD.topic);
    INSERT INTO topics_fts(rowid, topic) VALUES (NEW.id, NEW.topic);
END;
"#;

/// v2: code snippets become searchable.
pub(crate) const SNIPPET_FTS_SQL: &str = r#"
CREATE VIRTUAL TABLE IF NOT EXISTS code_snippets_fts USING fts5(
    code,
    description,
    file_path,
    content='code_snippets',
    content_rowid='id',
    tokenize='porter unicode61'
);

CREATE TRIGGER IF NOT EXISTS code_snippets_ai AFTER INSERT ON code_snippets BEGIN
    INSERT INTO code_snippets_fts(rowid, code, description, file_path)
    VALUES (NEW.id, NEW.code, NEW.description, NEW.file_path);
END;

CREATE TRIGGER IF NOT EXISTS code_snippets_ad AFTER DELETE ON code_snippets BEGIN
    INSERT INTO code_snippets_fts(code_snippets_fts, rowid, code, description, file_path)
    VALUES ('delete', OLD.id, OLD.code, OLD.description, OLD.file_path);
END;

CREATE TRIGGER IF NOT EXISTS code_snippets_au AFTER UPDATE ON code_snippets BEGIN
    INSERT INTO code_snippets_fts(code_snippets_fts, rowid, code, description, file_path)
    VALUES ('delete', OLD.id, OLD.code, OLD.description, OLD.file_path);
    INSERT INTO code_snippets_fts(rowid, code, description, file_path)
    VALUES (NEW.id, NEW.code, NEW.description, NEW.file_path);
END;
"#;

/// v3: explicit version marker plus indexes for recency and topic lookups.
pub(crate) const VERSION_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS schema_version (
    version INTEGER NOT NULL,
    applied_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_sessions_updated_at ON sessions(updated_at DESC);
CREATE INDEX IF NOT EXISTS idx_topics_topic ON topics(topic);
"#;

/// v4: pre-compaction checkpoints, keyed by the external session id.
pub(crate) const CHECKPOINTS_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS context_checkpoints (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    session_id TEXT NOT NULL,
    project_path TEXT,
    project_hash TEXT,
    checkpoint_number INTEGER NOT NULL,
    trigger_type TEXT NOT NULL DEFAULT 'auto',
    messages TEXT NOT NULL,
    message_count INTEGER NOT NULL DEFAULT 0,
    created_at TEXT NOT NULL,
    UNIQUE(session_id, checkpoint_number)
);

CREATE INDEX IF NOT EXISTS idx_checkpoints_session ON context_checkpoints(session_id, created_at DESC);
CREATE INDEX IF NOT EXISTS idx_checkpoints_project ON context_checkpoints(project_hash);
"#;

/// Every FTS index, in the order they are rebuilt.
pub const FTS_TABLES: [&str; 4] = [
    "summaries_fts",
    "messages_fts",
    "topics_fts",
    "code_snippets_fts",
];

/// Tables and virtual tables a current database must contain.
pub const EXPECTED_TABLES: [&str; 11] = [
    "sessions",
    "messages",
    "summaries",
    "topics",
    "code_snippets",
    "schema_version",
    "context_checkpoints",
    "summaries_fts",
    "messages_fts",
    "topics_fts",
    "code_snippets_fts",
];

/// Secondary indexes a current database must contain.
pub const EXPECTED_INDEXES: [&str; 10] = [
    "idx_sessions_project_hash",
    "idx_sessions_created_at",
    "idx_sessions_updated_at",
    "idx_messages_session_id",
    "idx_topics_session_id",
    "idx_topics_topic",
    "idx_code_snippets_session_id",
    "idx_code_snippets_language",
    "idx_checkpoints_session",
    "idx_checkpoints_project",
];

/// Outcome of [`initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InitStatus {
    Created,
    Recreated,
    AlreadyExists,
}

/// Result of [`verify_schema`].
#[derive(Debug, Serialize)]
pub struct SchemaReport {
    pub valid: bool,
    pub schema_version: u32,
    pub expected_version: u32,
    pub existing: Vec<String>,
    pub missing: Vec<String>,
}

/// Apply the full current schema and stamp [`CURRENT_SCHEMA_VERSION`]. Idempotent.
pub fn init_schema(conn: &Connection) -> rusqlite::Result<()> {
    let tx = conn.unchecked_transaction()?;
    tx.execute_batch(BASE_SQL)?;
    tx.execute_batch(SNIPPET_FTS_SQL)?;
    tx.execute_batch(VERSION_SQL)?;
    tx.execute_batch(CHECKPOINTS_SQL)?;
    if migrations::stored_version(&tx)?.is_none() {
        migrations::stamp_version(&tx, CURRENT_SCHEMA_VERSION)?;
    }
    tx.commit()
}

/// Create the database file with the current schema.
pub(crate) fn create_schema(db: &Database) -> Result<()> {
    let conn = db.open_raw()?;
    init_schema(&conn)?;
    tracing::info!(path = %db.path().display(), version = CURRENT_SCHEMA_VERSION, "database initialized");
    Ok(())
}

/// Create the database if it is missing. With `force`, delete any existing file (and
/// its WAL companions) first and recreate from scratch.
pub fn initialize(db: &Database, force: bool) -> Result<InitStatus> {
    let existed = db.exists();
    if existed && !force {
        tracing::info!(path = %db.path().display(), "database already exists");
        return Ok(InitStatus::AlreadyExists);
    }
    if existed {
        db.remove_files()?;
        tracing::warn!(path = %db.path().display(), "removed existing database");
    }
    create_schema(db)?;
    Ok(if existed {
        InitStatus::Recreated
    } else {
        InitStatus::Created
    })
}

/// Compare the tables and indexes on disk with the expected set.
///
/// Fails with [`ContextError::DatabaseNotFound`] when there is no database file.
pub fn verify_schema(db: &Database) -> Result<SchemaReport> {
    let conn = db
        .open_read_only()?
        .ok_or_else(|| ContextError::DatabaseNotFound(db.path().to_path_buf()))?;

    let mut stmt = conn.prepare(
        "SELECT name FROM sqlite_master WHERE type IN ('table','index') AND name NOT LIKE 'sqlite_%' ORDER BY name",
    )?;
    let existing: Vec<String> = stmt
        .query_map([], |row| row.get(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let missing: Vec<String> = EXPECTED_TABLES
        .iter()
        .chain(EXPECTED_INDEXES.iter())
        .filter(|name| !existing.iter().any(|e| e == *name))
        .map(|name| name.to_string())
        .collect();

    let schema_version = migrations::current_version(&conn)?;
    if schema_version < CURRENT_SCHEMA_VERSION {
        tracing::warn!(
            found = schema_version,
            expected = CURRENT_SCHEMA_VERSION,
            "database schema is behind; the next write will migrate it"
        );
    }

    Ok(SchemaReport {
        valid: missing.is_empty() && schema_version == CURRENT_SCHEMA_VERSION,
        schema_version,
        expected_version: CURRENT_SCHEMA_VERSION,
        existing,
        missing,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_db() -> (TempDir, Database) {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(tmp.path().join("context.db"));
        (tmp, db)
    }

    #[test]
    fn schema_creates_all_tables() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();

        let tables: Vec<String> = conn
            .prepare("SELECT name FROM sqlite_master WHERE type='table' ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();

        for expected in EXPECTED_TABLES {
            assert!(tables.contains(&expected.to_string()), "{expected} missing");
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        init_schema(&conn).unwrap(); // second call should not error

        let stamps: i64 = conn
            .query_row("SELECT COUNT(*) FROM schema_version", [], |row| row.get(0))
            .unwrap();
        assert_eq!(stamps, 1);
    }

    #[test]
    fn initialize_creates_then_reports_existing() {
        let (_tmp, db) = temp_db();
        assert_eq!(initialize(&db, false).unwrap(), InitStatus::Created);
        assert_eq!(initialize(&db, false).unwrap(), InitStatus::AlreadyExists);
    }

    #[test]
    fn force_initialize_wipes_data() {
        let (_tmp, db) = temp_db();
        initialize(&db, false).unwrap();
        {
            let conn = db.open_read_write().unwrap();
            conn.execute(
                "INSERT INTO sessions (session_id, created_at, updated_at) VALUES ('s1', 'x', 'x')",
                [],
            )
            .unwrap();
        }

        assert_eq!(initialize(&db, true).unwrap(), InitStatus::Recreated);

        let conn = db.open_read_only().unwrap().unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 0);
    }

    #[test]
    fn verify_fresh_schema_is_valid() {
        let (_tmp, db) = temp_db();
        initialize(&db, false).unwrap();
        let report = verify_schema(&db).unwrap();
        assert!(report.valid, "missing: {:?}", report.missing);
        assert!(report.missing.is_empty());
        assert_eq!(report.schema_version, CURRENT_SCHEMA_VERSION);
    }

    #[test]
    fn verify_missing_database_fails() {
        let (_tmp, db) = temp_db();
        let err = verify_schema(&db).unwrap_err();
        assert!(matches!(err, ContextError::DatabaseNotFound(_)));
    }

    #[test]
    fn verify_reports_missing_objects() {
        let (_tmp, db) = temp_db();
        initialize(&db, false).unwrap();
        {
            let conn = db.open_raw().unwrap();
            conn.execute_batch("DROP TABLE context_checkpoints;").unwrap();
        }
        let report = verify_schema(&db).unwrap();
        assert!(!report.valid);
        assert!(report.missing.contains(&"context_checkpoints".to_string()));
        assert!(report.missing.contains(&"idx_checkpoints_session".to_string()));
    }

    #[test]
    fn triggers_keep_fts_in_sync() {
        let conn = Connection::open_in_memory().unwrap();
        init_schema(&conn).unwrap();
        conn.execute(
            "INSERT INTO sessions (session_id, created_at, updated_at) VALUES ('s1', 'x', 'x')",
            [],
        )
        .unwrap();
        conn.execute(
            "INSERT INTO topics (session_id, topic) VALUES (1, 'kubernetes')",
            [],
        )
        .unwrap();

        let hits = |conn: &Connection| -> i64 {
            conn.query_row(
                "SELECT COUNT(*) FROM topics_fts WHERE topics_fts MATCH 'kubernetes'",
                [],
                |row| row.get(0),
            )
            .unwrap()
        };
        assert_eq!(hits(&conn), 1);

        conn.execute("UPDATE topics SET topic = 'docker'", []).unwrap();
        assert_eq!(hits(&conn), 0);

        conn.execute("DELETE FROM topics", []).unwrap();
        let docker: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM topics_fts WHERE topics_fts MATCH 'docker'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(docker, 0);
    }
}
