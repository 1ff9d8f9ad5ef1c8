//! Write path: sessions, messages, summaries, topics and code snippets.
//!
//! [`RecordStore`] owns a [`Database`] handle and opens one read-write connection per
//! call, so the schema is created or migrated before anything is written. Each public
//! method runs inside a single transaction; [`RecordStore::save_full_session`] wraps the
//! whole composition in one.

use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::db::{self, Database};
use crate::error::{ContextError, Result};
use crate::memory::project::{hash_project_path, normalize_project_path};
use crate::memory::types::{ChatMessage, SaveResult, SessionInput, SnippetInput, SummaryPatch};

/// Sentinel brief written by automatic saves. Anything starting with it is low fidelity.
pub const AUTO_SAVE_BRIEF: &str = "Auto-saved session";

/// Build an auto-save brief: the bare sentinel, or `"Auto-saved session: <detail>"`.
pub fn auto_save_brief(detail: Option<&str>) -> String {
    match detail.map(str::trim).filter(|d| !d.is_empty()) {
        Some(detail) => format!("{AUTO_SAVE_BRIEF}: {detail}"),
        None => AUTO_SAVE_BRIEF.to_string(),
    }
}

/// Session persistence. Cheap to clone; holds only the database location.
#[derive(Debug, Clone)]
pub struct RecordStore {
    db: Database,
}

impl RecordStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn database(&self) -> &Database {
        &self.db
    }

    /// Upsert a session by external id and return its internal id.
    ///
    /// On conflict, only supplied fields overwrite stored ones; `updated_at` is refreshed.
    pub fn save_session(
        &self,
        session_id: &str,
        project_path: Option<&str>,
        metadata: Option<&serde_json::Map<String, serde_json::Value>>,
    ) -> Result<i64> {
        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction()?;
        let id = upsert_session(&tx, session_id, project_path, metadata)?;
        tx.commit()?;
        Ok(id)
    }

    /// Store messages for a session and return how many were written.
    ///
    /// With `replace`, prior messages are deleted and sequence restarts at 0; otherwise the
    /// sequence continues after the current maximum.
    pub fn save_messages(
        &self,
        session_db_id: i64,
        messages: &[ChatMessage],
        replace: bool,
    ) -> Result<usize> {
        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction()?;
        let n = insert_messages(&tx, session_db_id, messages, replace)?;
        tx.commit()?;
        Ok(n)
    }

    /// Create or patch the session's summary and return its id.
    pub fn save_summary(&self, session_db_id: i64, patch: &SummaryPatch) -> Result<i64> {
        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction()?;
        let id = upsert_summary(&tx, session_db_id, patch)?;
        tx.commit()?;
        Ok(id)
    }

    /// Store normalized topics and return how many were written.
    pub fn save_topics(&self, session_db_id: i64, topics: &[String], replace: bool) -> Result<usize> {
        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction()?;
        let n = insert_topics(&tx, session_db_id, topics, replace)?;
        tx.commit()?;
        Ok(n)
    }

    /// Insert one code snippet and return its id.
    pub fn save_code_snippet(&self, session_db_id: i64, snippet: &SnippetInput) -> Result<i64> {
        let conn = self.db.open_read_write()?;
        insert_snippet(&conn, session_db_id, snippet)
    }

    /// Save a complete session (row, messages, summary, topics, snippets) atomically.
    ///
    /// Messages replace any stored ones. A `user_note` is folded into the summary; with no
    /// summary at all, the note doubles as the brief.
    pub fn save_full_session(&self, input: &SessionInput) -> Result<SaveResult> {
        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction()?;

        let session_db_id = upsert_session(
            &tx,
            &input.session_id,
            input.project_path.as_deref(),
            input.metadata.as_ref(),
        )?;

        let messages_count = if input.messages.is_empty() {
            0
        } else {
            insert_messages(&tx, session_db_id, &input.messages, true)?
        };

        let summary = match (&input.summary, &input.user_note) {
            (Some(summary), note) => {
                let mut patch = summary.clone();
                if note.is_some() {
                    patch.user_note = note.clone();
                }
                Some(patch)
            }
            (None, Some(note)) => Some(SummaryPatch {
                brief: Some(note.clone()),
                user_note: Some(note.clone()),
                ..Default::default()
            }),
            (None, None) => None,
        };
        let summary_id = match summary {
            Some(patch) => Some(upsert_summary(&tx, session_db_id, &patch)?),
            None => None,
        };

        let topics_count = if input.topics.is_empty() {
            0
        } else {
            insert_topics(&tx, session_db_id, &input.topics, true)?
        };

        let snippet_ids = input
            .code_snippets
            .iter()
            .map(|snippet| insert_snippet(&tx, session_db_id, snippet))
            .collect::<Result<Vec<_>>>()?;

        tx.commit()?;
        info!(
            session = %input.session_id,
            messages = messages_count,
            topics = topics_count,
            snippets = snippet_ids.len(),
            "session saved"
        );

        Ok(SaveResult {
            session_id: input.session_id.clone(),
            session_db_id,
            messages_count,
            summary_id,
            topics_count,
            snippet_ids,
        })
    }

    /// True when a rich (non-auto-save) session for the same project was updated within
    /// the last `window_minutes`. An automatic save should then be skipped.
    pub fn should_skip_auto_save(&self, project_path: &str, window_minutes: u32) -> Result<bool> {
        if project_path.trim().is_empty() {
            return Ok(false);
        }
        let Some(conn) = self.db.open_read_only()? else {
            return Ok(false);
        };
        let hash = hash_project_path(project_path);
        let since = db::minutes_ago(window_minutes);
        let prefix = format!("{AUTO_SAVE_BRIEF}:%");

        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM sessions s
             JOIN summaries sm ON sm.session_id = s.id
             WHERE s.project_hash = ?1
               AND sm.brief != ?2
               AND sm.brief NOT LIKE ?3
               AND julianday(s.updated_at) >= julianday(?4)",
            params![hash, AUTO_SAVE_BRIEF, prefix, since],
            |row| row.get(0),
        )?;
        debug!(project_hash = %hash, window_minutes, rich_sessions = count, "auto-save dedup check");
        Ok(count > 0)
    }
}

// ── Statement-level helpers (run inside the caller's transaction) ──────────

fn upsert_session(
    conn: &Connection,
    session_id: &str,
    project_path: Option<&str>,
    metadata: Option<&serde_json::Map<String, serde_json::Value>>,
) -> Result<i64> {
    if session_id.trim().is_empty() {
        return Err(ContextError::validation("session_id must not be empty"));
    }
    let project_path = project_path.filter(|p| !p.trim().is_empty());
    let stored_path = project_path.map(normalize_project_path);
    let project_hash = project_path.map(hash_project_path);
    let metadata_json = match metadata {
        Some(map) if !map.is_empty() => Some(serde_json::to_string(map)?),
        _ => None,
    };
    let now = db::now();

    conn.execute(
        "INSERT INTO sessions (session_id, project_path, project_hash, created_at, updated_at, metadata)
         VALUES (?1, ?2, ?3, ?4, ?4, ?5)
         ON CONFLICT(session_id) DO UPDATE SET
             project_path = COALESCE(excluded.project_path, project_path),
             project_hash = COALESCE(excluded.project_hash, project_hash),
             metadata = COALESCE(excluded.metadata, metadata),
             updated_at = excluded.updated_at",
        params![session_id, stored_path, project_hash, now, metadata_json],
    )?;

    let id = conn.query_row(
        "SELECT id FROM sessions WHERE session_id = ?1",
        params![session_id],
        |row| row.get(0),
    )?;
    Ok(id)
}

fn insert_messages(
    conn: &Connection,
    session_db_id: i64,
    messages: &[ChatMessage],
    replace: bool,
) -> Result<usize> {
    let offset: i64 = if replace {
        conn.execute(
            "DELETE FROM messages WHERE session_id = ?1",
            params![session_db_id],
        )?;
        0
    } else {
        conn.query_row(
            "SELECT COALESCE(MAX(sequence), -1) + 1 FROM messages WHERE session_id = ?1",
            params![session_db_id],
            |row| row.get(0),
        )?
    };

    let now = db::now();
    let mut stmt = conn.prepare_cached(
        "INSERT INTO messages (session_id, role, content, sequence, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
    )?;
    for (i, msg) in messages.iter().enumerate() {
        stmt.execute(params![
            session_db_id,
            msg.role.as_str(),
            msg.content,
            offset + i as i64,
            now
        ])?;
    }

    // Count from rows, not from input.
    conn.execute(
        "UPDATE sessions
         SET message_count = (SELECT COUNT(*) FROM messages WHERE session_id = ?1)
         WHERE id = ?1",
        params![session_db_id],
    )?;
    Ok(messages.len())
}

/// JSON-encode a list field. An empty list counts as "not supplied".
fn encode_list(list: &Option<Vec<String>>) -> Result<Option<String>> {
    match list {
        Some(items) if !items.is_empty() => Ok(Some(serde_json::to_string(items)?)),
        _ => Ok(None),
    }
}

fn upsert_summary(conn: &Connection, session_db_id: i64, patch: &SummaryPatch) -> Result<i64> {
    let decisions = encode_list(&patch.key_decisions)?;
    let problems = encode_list(&patch.problems_solved)?;
    let technologies = encode_list(&patch.technologies)?;
    let outcome = patch.outcome.map(|o| o.as_str());

    let existing: Option<i64> = conn
        .query_row(
            "SELECT id FROM summaries WHERE session_id = ?1",
            params![session_db_id],
            |row| row.get(0),
        )
        .optional()?;

    if let Some(id) = existing {
        conn.execute(
            "UPDATE summaries SET
                 brief = COALESCE(?1, brief),
                 detailed = COALESCE(?2, detailed),
                 key_decisions = COALESCE(?3, key_decisions),
                 problems_solved = COALESCE(?4, problems_solved),
                 technologies = COALESCE(?5, technologies),
                 outcome = COALESCE(?6, outcome),
                 user_note = COALESCE(?7, user_note)
             WHERE id = ?8",
            params![
                patch.brief,
                patch.detailed,
                decisions,
                problems,
                technologies,
                outcome,
                patch.user_note,
                id
            ],
        )?;
        return Ok(id);
    }

    let Some(brief) = patch.brief.as_deref() else {
        return Err(ContextError::validation(
            "brief is required when creating a new summary",
        ));
    };
    conn.execute(
        "INSERT INTO summaries
             (session_id, brief, detailed, key_decisions, problems_solved, technologies, outcome, user_note, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        params![
            session_db_id,
            brief,
            patch.detailed,
            decisions,
            problems,
            technologies,
            outcome,
            patch.user_note,
            db::now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

fn insert_topics(
    conn: &Connection,
    session_db_id: i64,
    topics: &[String],
    replace: bool,
) -> Result<usize> {
    if replace {
        conn.execute(
            "DELETE FROM topics WHERE session_id = ?1",
            params![session_db_id],
        )?;
    }
    let mut stmt = conn.prepare_cached("INSERT INTO topics (session_id, topic) VALUES (?1, ?2)")?;
    let mut count = 0;
    for topic in topics {
        let topic = topic.trim().to_lowercase();
        if topic.is_empty() {
            continue;
        }
        stmt.execute(params![session_db_id, topic])?;
        count += 1;
    }
    Ok(count)
}

fn insert_snippet(conn: &Connection, session_db_id: i64, snippet: &SnippetInput) -> Result<i64> {
    conn.execute(
        "INSERT INTO code_snippets (session_id, language, code, description, file_path, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            session_db_id,
            snippet.language,
            snippet.code,
            snippet.description,
            snippet.file_path,
            db::now()
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{Outcome, Role};
    use tempfile::TempDir;

    fn test_store() -> (TempDir, RecordStore) {
        let tmp = TempDir::new().unwrap();
        let store = RecordStore::new(Database::new(tmp.path().join("context.db")));
        (tmp, store)
    }

    fn msgs(n: usize) -> Vec<ChatMessage> {
        (0..n)
            .map(|i| ChatMessage::new(Role::User, format!("message {i}")))
            .collect()
    }

    fn sequences(store: &RecordStore, id: i64) -> Vec<i64> {
        let conn = store.database().open_read_only().unwrap().unwrap();
        let mut stmt = conn
            .prepare("SELECT sequence FROM messages WHERE session_id = ?1 ORDER BY sequence")
            .unwrap();
        stmt.query_map([id], |row| row.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn save_session_initializes_database() {
        let (_tmp, store) = test_store();
        assert!(!store.database().exists());
        let id = store.save_session("s1", Some("/tmp/proj"), None).unwrap();
        assert!(id > 0);
        assert!(store.database().exists());
    }

    #[test]
    fn save_session_upsert_keeps_fields() {
        let (_tmp, store) = test_store();
        let mut meta = serde_json::Map::new();
        meta.insert("k".into(), serde_json::json!("v"));
        let first = store.save_session("s1", Some("/tmp/proj"), Some(&meta)).unwrap();
        let second = store.save_session("s1", None, None).unwrap();
        assert_eq!(first, second);

        let conn = store.database().open_read_only().unwrap().unwrap();
        let (path, metadata): (Option<String>, Option<String>) = conn
            .query_row(
                "SELECT project_path, metadata FROM sessions WHERE id = ?1",
                [first],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(path.as_deref(), Some("/tmp/proj"));
        assert_eq!(metadata.as_deref(), Some(r#"{"k":"v"}"#));
    }

    #[test]
    fn empty_session_id_is_rejected() {
        let (_tmp, store) = test_store();
        let err = store.save_session("  ", None, None).unwrap_err();
        assert!(matches!(err, ContextError::Validation(_)));
    }

    #[test]
    fn append_continues_sequence_and_recounts() {
        let (_tmp, store) = test_store();
        let id = store.save_session("s1", None, None).unwrap();
        store.save_messages(id, &msgs(2), false).unwrap();
        store.save_messages(id, &msgs(3), false).unwrap();
        assert_eq!(sequences(&store, id), vec![0, 1, 2, 3, 4]);

        let conn = store.database().open_read_only().unwrap().unwrap();
        let count: i64 = conn
            .query_row("SELECT message_count FROM sessions WHERE id = ?1", [id], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 5);
    }

    #[test]
    fn replace_restarts_sequence() {
        let (_tmp, store) = test_store();
        let id = store.save_session("s1", None, None).unwrap();
        store.save_messages(id, &msgs(4), true).unwrap();
        store.save_messages(id, &msgs(2), true).unwrap();
        assert_eq!(sequences(&store, id), vec![0, 1]);
    }

    #[test]
    fn summary_requires_brief_on_create() {
        let (_tmp, store) = test_store();
        let id = store.save_session("s1", None, None).unwrap();
        let patch = SummaryPatch {
            outcome: Some(Outcome::Success),
            ..Default::default()
        };
        let err = store.save_summary(id, &patch).unwrap_err();
        assert!(err.to_string().contains("brief is required"));
    }

    #[test]
    fn summary_patch_preserves_unsupplied_fields() {
        let (_tmp, store) = test_store();
        let id = store.save_session("s1", None, None).unwrap();
        let mut first = SummaryPatch::brief("A");
        first.technologies = Some(vec!["rust".into()]);
        let summary_id = store.save_summary(id, &first).unwrap();

        let second = SummaryPatch {
            outcome: Some(Outcome::Success),
            technologies: Some(vec![]),
            ..Default::default()
        };
        assert_eq!(store.save_summary(id, &second).unwrap(), summary_id);

        let conn = store.database().open_read_only().unwrap().unwrap();
        let (brief, outcome, tech): (String, String, String) = conn
            .query_row(
                "SELECT brief, outcome, technologies FROM summaries WHERE id = ?1",
                [summary_id],
                |r| Ok((r.get(0)?, r.get(1)?, r.get(2)?)),
            )
            .unwrap();
        assert_eq!(brief, "A");
        assert_eq!(outcome, "success");
        assert_eq!(tech, r#"["rust"]"#);
    }

    #[test]
    fn topics_are_normalized() {
        let (_tmp, store) = test_store();
        let id = store.save_session("s1", None, None).unwrap();
        let topics = vec!["  Rust ".to_string(), "".to_string(), "   ".to_string(), "SQLite".into()];
        assert_eq!(store.save_topics(id, &topics, true).unwrap(), 2);
        assert_eq!(store.save_topics(id, &["extra".to_string()], false).unwrap(), 1);

        let conn = store.database().open_read_only().unwrap().unwrap();
        let stored: Vec<String> = conn
            .prepare("SELECT topic FROM topics WHERE session_id = ?1 ORDER BY id")
            .unwrap()
            .query_map([id], |r| r.get(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        assert_eq!(stored, vec!["rust", "sqlite", "extra"]);
    }

    #[test]
    fn full_session_with_only_note_uses_note_as_brief() {
        let (_tmp, store) = test_store();
        let input = SessionInput {
            session_id: "s1".into(),
            user_note: Some("remember the cache flag".into()),
            ..Default::default()
        };
        let result = store.save_full_session(&input).unwrap();
        assert!(result.summary_id.is_some());

        let conn = store.database().open_read_only().unwrap().unwrap();
        let (brief, note): (String, String) = conn
            .query_row("SELECT brief, user_note FROM summaries", [], |r| {
                Ok((r.get(0)?, r.get(1)?))
            })
            .unwrap();
        assert_eq!(brief, "remember the cache flag");
        assert_eq!(note, brief);
    }

    #[test]
    fn failed_full_save_leaves_nothing_behind() {
        let (_tmp, store) = test_store();
        let input = SessionInput {
            session_id: "s1".into(),
            messages: msgs(3),
            summary: Some(SummaryPatch {
                detailed: Some("no brief".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        assert!(store.save_full_session(&input).is_err());

        let conn = store.database().open_read_only().unwrap().unwrap();
        let sessions: i64 = conn
            .query_row("SELECT COUNT(*) FROM sessions", [], |r| r.get(0))
            .unwrap();
        let messages: i64 = conn
            .query_row("SELECT COUNT(*) FROM messages", [], |r| r.get(0))
            .unwrap();
        assert_eq!((sessions, messages), (0, 0));
    }

    #[test]
    fn auto_save_brief_forms() {
        assert_eq!(auto_save_brief(None), "Auto-saved session");
        assert_eq!(auto_save_brief(Some("  ")), "Auto-saved session");
        assert_eq!(auto_save_brief(Some("fix login")), "Auto-saved session: fix login");
    }

    #[test]
    fn skip_check_without_database_is_false() {
        let (_tmp, store) = test_store();
        assert!(!store.should_skip_auto_save("/tmp/proj", 5).unwrap());
        assert!(!store.database().exists());
    }
}
