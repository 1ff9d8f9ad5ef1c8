#![allow(dead_code)]

use context_memory::db::{self, Database};
use context_memory::memory::checkpoint::CheckpointEngine;
use context_memory::memory::retention::RetentionEngine;
use context_memory::memory::search::{SearchEngine, SearchOptions};
use context_memory::memory::store::RecordStore;
use context_memory::memory::types::{ChatMessage, Role, SaveResult, SessionInput, SummaryPatch};
use rusqlite::{params, Connection, OpenFlags};
use tempfile::TempDir;

/// An isolated store in its own temp directory. Keep `_tmp` alive for the test.
pub struct TestStore {
    pub _tmp: TempDir,
    pub db: Database,
    pub store: RecordStore,
    pub search: SearchEngine,
    pub retention: RetentionEngine,
    pub checkpoints: CheckpointEngine,
}

/// Fresh store with the database file not yet created.
pub fn test_store() -> TestStore {
    test_store_with(SearchOptions::default())
}

pub fn test_store_with(options: SearchOptions) -> TestStore {
    let tmp = TempDir::new().unwrap();
    let db = Database::new(tmp.path().join("context.db"));
    TestStore {
        store: RecordStore::new(db.clone()),
        search: SearchEngine::new(db.clone(), options),
        retention: RetentionEngine::new(db.clone()),
        checkpoints: CheckpointEngine::new(db.clone()),
        db,
        _tmp: tmp,
    }
}

impl TestStore {
    /// Raw read-write connection for inspection and backdating.
    pub fn conn(&self) -> Connection {
        self.db.open_read_write().unwrap()
    }

    /// Save a session with a brief and topics.
    pub fn save(&self, session_id: &str, project: Option<&str>, brief: &str, topics: &[&str]) -> SaveResult {
        self.store
            .save_full_session(&SessionInput {
                session_id: session_id.into(),
                project_path: project.map(str::to_string),
                summary: Some(SummaryPatch::brief(brief)),
                topics: topics.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            })
            .unwrap()
    }

    /// Move a session's creation and update times `days` into the past.
    pub fn backdate_session(&self, session_id: &str, days: u32) {
        let at = db::days_ago(days);
        self.conn()
            .execute(
                "UPDATE sessions SET created_at = ?1, updated_at = ?1 WHERE session_id = ?2",
                params![at, session_id],
            )
            .unwrap();
    }

    /// Move a session's `updated_at` `minutes` into the past.
    pub fn age_session_minutes(&self, session_id: &str, minutes: u32) {
        self.conn()
            .execute(
                "UPDATE sessions SET updated_at = ?1 WHERE session_id = ?2",
                params![db::minutes_ago(minutes), session_id],
            )
            .unwrap();
    }

    /// Read-only connection that never migrates, for inspecting legacy files.
    pub fn raw(&self) -> Connection {
        Connection::open_with_flags(self.db.path(), OpenFlags::SQLITE_OPEN_READ_ONLY).unwrap()
    }

    /// Every table, index and trigger in the file, by name.
    pub fn schema_objects(&self) -> Vec<String> {
        self.raw()
            .prepare("SELECT name FROM sqlite_master ORDER BY name")
            .unwrap()
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap()
    }

    /// Strip the file back to an unversioned legacy layout. Version 2 keeps the snippet
    /// index; version 1 drops it as well.
    pub fn downgrade_to_legacy(&self, version: u32) {
        let conn = Connection::open(self.db.path()).unwrap();
        conn.execute_batch(
            "DROP TABLE context_checkpoints;
             DROP TABLE schema_version;
             DROP INDEX idx_sessions_updated_at;
             DROP INDEX idx_topics_topic;",
        )
        .unwrap();
        if version == 1 {
            conn.execute_batch(
                "DROP TRIGGER code_snippets_ai;
                 DROP TRIGGER code_snippets_ad;
                 DROP TRIGGER code_snippets_au;
                 DROP TABLE code_snippets_fts;",
            )
            .unwrap();
        }
    }

    /// Overwrite a session's timestamps without going through the migrating handle.
    pub fn set_session_times(&self, session_id: &str, created_at: &str, updated_at: &str) {
        Connection::open(self.db.path())
            .unwrap()
            .execute(
                "UPDATE sessions SET created_at = ?1, updated_at = ?2 WHERE session_id = ?3",
                params![created_at, updated_at, session_id],
            )
            .unwrap();
    }

    pub fn count(&self, table: &str) -> i64 {
        self.conn()
            .query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))
            .unwrap()
    }

    /// Ids of the sessions a tier-1 search returns.
    pub fn found(&self, query: &str) -> Vec<String> {
        self.search
            .full_search(query, None, false, 50)
            .unwrap()
            .sessions
            .into_iter()
            .map(|s| s.session_id)
            .collect()
    }
}

/// `n` alternating user/assistant messages with numbered content.
pub fn messages(prefix: &str, n: usize) -> Vec<ChatMessage> {
    (0..n)
        .map(|i| {
            let role = if i % 2 == 0 { Role::User } else { Role::Assistant };
            ChatMessage::new(role, format!("{prefix} message {i}"))
        })
        .collect()
}
