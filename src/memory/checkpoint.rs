//! Pre-compaction checkpoints: full, untruncated message snapshots.
//!
//! Checkpoints are keyed by the external session id rather than the internal row id, so
//! they survive a session row being deleted and recreated. Numbers start at 1 and
//! increase independently per session.

use rusqlite::{params, OptionalExtension};
use serde::Serialize;
use tracing::{info, warn};

use crate::db::{self, Database};
use crate::error::{ContextError, Result};
use crate::memory::project::{hash_project_path, normalize_project_path};
use crate::memory::types::{ChatMessage, CheckpointTrigger};

#[derive(Debug, Clone, Serialize)]
pub struct SavedCheckpoint {
    pub id: i64,
    pub session_id: String,
    pub checkpoint_number: i64,
    pub message_count: usize,
}

/// A checkpoint read back for recovery.
#[derive(Debug, Clone, Serialize)]
pub struct LoadedCheckpoint {
    pub id: i64,
    pub session_id: String,
    pub project_path: Option<String>,
    pub checkpoint_number: i64,
    pub trigger_type: String,
    pub created_at: String,
    /// Messages stored in the snapshot.
    pub total_messages: usize,
    /// Messages returned, after any `last_n` slicing.
    pub message_count: usize,
    pub messages: Vec<ChatMessage>,
}

#[derive(Debug, Clone)]
pub struct CheckpointEngine {
    db: Database,
}

impl CheckpointEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Store the whole message list as the session's next checkpoint.
    pub fn save_checkpoint(
        &self,
        session_id: &str,
        project_path: Option<&str>,
        trigger: CheckpointTrigger,
        messages: &[ChatMessage],
    ) -> Result<SavedCheckpoint> {
        if session_id.trim().is_empty() {
            return Err(ContextError::validation("session_id must not be empty"));
        }
        let project_path = project_path.filter(|p| !p.trim().is_empty());
        let blob = serde_json::to_string(messages)?;

        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction()?;
        let next: i64 = tx.query_row(
            "SELECT COALESCE(MAX(checkpoint_number), 0) + 1 FROM context_checkpoints WHERE session_id = ?1",
            params![session_id],
            |row| row.get(0),
        )?;
        tx.execute(
            "INSERT INTO context_checkpoints
                 (session_id, project_path, project_hash, checkpoint_number, trigger_type, messages, message_count, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                session_id,
                project_path.map(normalize_project_path),
                project_path.map(hash_project_path),
                next,
                trigger.as_str(),
                blob,
                messages.len() as i64,
                db::now()
            ],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;

        info!(session = session_id, checkpoint = next, messages = messages.len(), %trigger, "checkpoint saved");
        Ok(SavedCheckpoint {
            id,
            session_id: session_id.to_string(),
            checkpoint_number: next,
            message_count: messages.len(),
        })
    }

    /// Most recent checkpoint for the session, else for the project, else overall.
    ///
    /// `last_n` keeps only the trailing messages. Returns `None` when nothing matches or
    /// there is no database.
    pub fn load_latest_checkpoint(
        &self,
        session_id: Option<&str>,
        project_path: Option<&str>,
        last_n: Option<usize>,
    ) -> Result<Option<LoadedCheckpoint>> {
        let Some(conn) = self.db.open_read_only()? else {
            return Ok(None);
        };

        const COLUMNS: &str = "SELECT id, session_id, project_path, checkpoint_number, trigger_type, \
             messages, created_at FROM context_checkpoints";
        const ORDER: &str = "ORDER BY created_at DESC, checkpoint_number DESC, id DESC LIMIT 1";

        let session_id = session_id.filter(|s| !s.is_empty());
        let project_path = project_path.filter(|p| !p.trim().is_empty());
        let (sql, key) = match (session_id, project_path) {
            (Some(sid), _) => (format!("{COLUMNS} WHERE session_id = ?1 {ORDER}"), Some(sid.to_string())),
            (None, Some(path)) => (
                format!("{COLUMNS} WHERE project_hash = ?1 {ORDER}"),
                Some(hash_project_path(path)),
            ),
            (None, None) => (format!("{COLUMNS} {ORDER}"), None),
        };

        type CheckpointRow = (i64, String, Option<String>, i64, String, String, String);
        let map_row = |row: &rusqlite::Row<'_>| -> rusqlite::Result<CheckpointRow> {
            Ok((
                row.get::<_, i64>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, Option<String>>(2)?,
                row.get::<_, i64>(3)?,
                row.get::<_, String>(4)?,
                row.get::<_, String>(5)?,
                row.get::<_, String>(6)?,
            ))
        };
        let row = match &key {
            Some(key) => conn.query_row(&sql, params![key], map_row).optional()?,
            None => conn.query_row(&sql, [], map_row).optional()?,
        };
        let Some((id, session_id, project_path, checkpoint_number, trigger_type, blob, created_at)) = row
        else {
            return Ok(None);
        };

        let mut messages: Vec<ChatMessage> = match serde_json::from_str(&blob) {
            Ok(messages) => messages,
            Err(e) => {
                warn!(checkpoint = id, error = %e, "unreadable checkpoint blob");
                Vec::new()
            }
        };
        let total_messages = messages.len();
        if let Some(n) = last_n.filter(|n| *n > 0) {
            if n < messages.len() {
                messages.drain(..messages.len() - n);
            }
        }

        Ok(Some(LoadedCheckpoint {
            id,
            session_id,
            project_path,
            checkpoint_number,
            trigger_type,
            created_at,
            total_messages,
            message_count: messages.len(),
            messages,
        }))
    }
}
