//! Retention: bound storage growth by pruning sessions and checkpoint history.
//!
//! Child rows are always deleted explicitly before their session. `ON DELETE CASCADE`
//! does not fire the FTS sync triggers, so a cascaded delete would leave index entries
//! pointing at rows that no longer exist. Bulk prunes also rebuild every FTS index.

use rusqlite::{params, Connection, TransactionBehavior};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::info;

use super::{id_params, sql_placeholders};
use crate::db::{self, migrations, schema::FTS_TABLES, Database};
use crate::error::{ContextError, Result};

/// Tables owned by a session, keyed by `session_id` (the internal id).
const CHILD_TABLES: [&str; 4] = ["messages", "summaries", "topics", "code_snippets"];

/// Upper bound on ids bound into one `IN (...)` list.
const DELETE_CHUNK: usize = 500;

// ── Result types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Serialize)]
pub struct PrunedSession {
    pub id: i64,
    pub session_id: String,
    pub project_path: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct PruneResult {
    pub pruned: usize,
    pub dry_run: bool,
    pub sessions: Vec<PrunedSession>,
    /// Checkpoints removed along with the pruned sessions.
    pub checkpoints_removed: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct PrunedCheckpoint {
    pub id: i64,
    pub session_id: String,
    pub checkpoint_number: i64,
    pub created_at: String,
}

#[derive(Debug, Serialize)]
pub struct CheckpointPruneResult {
    pub pruned: usize,
    pub dry_run: bool,
    pub checkpoints: Vec<PrunedCheckpoint>,
}

#[derive(Debug, Serialize)]
pub struct DeleteResult {
    pub deleted: bool,
    pub session_id: Option<String>,
    pub checkpoints_removed: usize,
}

// ── Engine ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct RetentionEngine {
    db: Database,
}

impl RetentionEngine {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Remove sessions older than `max_age_days` OR outside the `max_sessions` newest.
    ///
    /// At least one criterion is required. With `dry_run`, nothing is modified and the
    /// candidates are returned.
    pub fn prune_sessions(
        &self,
        max_age_days: Option<u32>,
        max_sessions: Option<usize>,
        dry_run: bool,
    ) -> Result<PruneResult> {
        if max_age_days.is_none() && max_sessions.is_none() {
            return Err(ContextError::validation(
                "at least one of max_age_days or max_sessions is required",
            ));
        }
        let empty = PruneResult {
            pruned: 0,
            dry_run,
            sessions: Vec::new(),
            checkpoints_removed: 0,
        };
        if !self.db.exists() {
            return Ok(empty);
        }

        if dry_run {
            // Read-only: a legacy file is reported on as it stands, not migrated.
            let Some(conn) = self.db.open_read_only()? else {
                return Ok(empty);
            };
            if !migrations::object_exists(&conn, "table", "sessions")? {
                return Ok(empty);
            }
            let ids = prune_candidates(&conn, max_age_days, max_sessions)?;
            let sessions = describe_sessions(&conn, &ids)?;
            info!(candidates = ids.len(), "prune dry run");
            return Ok(PruneResult {
                pruned: ids.len(),
                dry_run,
                sessions,
                checkpoints_removed: 0,
            });
        }

        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let ids = prune_candidates(&tx, max_age_days, max_sessions)?;
        if ids.is_empty() {
            return Ok(empty);
        }
        let sessions = describe_sessions(&tx, &ids)?;
        delete_sessions(&tx, &ids)?;
        let external: Vec<&str> = sessions.iter().map(|s| s.session_id.as_str()).collect();
        let checkpoints_removed = delete_checkpoints_for(&tx, &external)?;
        rebuild_fts(&tx)?;
        tx.commit()?;

        info!(
            pruned = ids.len(),
            checkpoints_removed,
            max_age_days = ?max_age_days,
            max_sessions = ?max_sessions,
            "sessions pruned"
        );
        Ok(PruneResult {
            pruned: ids.len(),
            dry_run,
            sessions,
            checkpoints_removed,
        })
    }

    /// Keep only the `max_per_session` newest checkpoints of each session, and drop any
    /// older than `max_age_days`. Session tables are not touched.
    pub fn prune_checkpoints(
        &self,
        max_per_session: usize,
        max_age_days: Option<u32>,
        dry_run: bool,
    ) -> Result<CheckpointPruneResult> {
        let empty = CheckpointPruneResult {
            pruned: 0,
            dry_run,
            checkpoints: Vec::new(),
        };
        if !self.db.exists() {
            return Ok(empty);
        }
        let cutoff = max_age_days.map(db::days_ago);

        if dry_run {
            let Some(conn) = self.db.open_read_only()? else {
                return Ok(empty);
            };
            if !migrations::object_exists(&conn, "table", "context_checkpoints")? {
                return Ok(empty);
            }
            let checkpoints = checkpoint_candidates(&conn, max_per_session, cutoff.as_deref())?;
            info!(candidates = checkpoints.len(), "checkpoint prune dry run");
            return Ok(CheckpointPruneResult {
                pruned: checkpoints.len(),
                dry_run,
                checkpoints,
            });
        }

        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let checkpoints = checkpoint_candidates(&tx, max_per_session, cutoff.as_deref())?;
        if !checkpoints.is_empty() {
            let ids: Vec<i64> = checkpoints.iter().map(|c| c.id).collect();
            for chunk in ids.chunks(DELETE_CHUNK) {
                tx.execute(
                    &format!(
                        "DELETE FROM context_checkpoints WHERE id IN ({})",
                        sql_placeholders(chunk.len())
                    ),
                    id_params(chunk).as_slice(),
                )?;
            }
            tx.commit()?;
            info!(pruned = ids.len(), max_per_session, "checkpoints pruned");
        }

        Ok(CheckpointPruneResult {
            pruned: checkpoints.len(),
            dry_run,
            checkpoints,
        })
    }

    /// Delete one session with its children and checkpoints.
    pub fn delete_session(&self, session_db_id: i64) -> Result<DeleteResult> {
        let not_found = DeleteResult {
            deleted: false,
            session_id: None,
            checkpoints_removed: 0,
        };
        if !self.db.exists() {
            return Ok(not_found);
        }
        let mut conn = self.db.open_read_write()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let sessions = describe_sessions(&tx, &[session_db_id])?;
        let Some(session) = sessions.into_iter().next() else {
            return Ok(not_found);
        };

        for table in CHILD_TABLES {
            tx.execute(
                &format!("DELETE FROM {table} WHERE session_id = ?1"),
                params![session_db_id],
            )?;
        }
        let checkpoints_removed = delete_checkpoints_for(&tx, &[session.session_id.as_str()])?;
        tx.execute("DELETE FROM sessions WHERE id = ?1", params![session_db_id])?;
        tx.commit()?;

        info!(session = %session.session_id, checkpoints_removed, "session deleted");
        Ok(DeleteResult {
            deleted: true,
            session_id: Some(session.session_id),
            checkpoints_removed,
        })
    }
}

// ── Internal helpers ─────────────────────────────────────────────────────────

fn prune_candidates(
    conn: &Connection,
    max_age_days: Option<u32>,
    max_sessions: Option<usize>,
) -> Result<Vec<i64>> {
    let mut ids = BTreeSet::new();

    if let Some(days) = max_age_days {
        let cutoff = db::days_ago(days);
        let mut stmt =
            conn.prepare("SELECT id FROM sessions WHERE julianday(created_at) < julianday(?1)")?;
        for id in stmt.query_map(params![cutoff], |row| row.get::<_, i64>(0))? {
            ids.insert(id?);
        }
    }

    if let Some(keep) = max_sessions {
        let mut stmt = conn.prepare(
            "SELECT id FROM sessions ORDER BY julianday(created_at) DESC, id DESC LIMIT -1 OFFSET ?1",
        )?;
        for id in stmt.query_map(params![keep as i64], |row| row.get::<_, i64>(0))? {
            ids.insert(id?);
        }
    }

    Ok(ids.into_iter().collect())
}

fn checkpoint_candidates(
    conn: &Connection,
    max_per_session: usize,
    cutoff: Option<&str>,
) -> Result<Vec<PrunedCheckpoint>> {
    let checkpoints = conn
        .prepare(
            "SELECT id, session_id, checkpoint_number, created_at FROM (
                 SELECT id, session_id, checkpoint_number, created_at,
                        ROW_NUMBER() OVER (
                            PARTITION BY session_id
                            ORDER BY created_at DESC, checkpoint_number DESC
                        ) AS rn
                 FROM context_checkpoints
             )
             WHERE rn > ?1 OR (?2 IS NOT NULL AND created_at < ?2)
             ORDER BY session_id, checkpoint_number",
        )?
        .query_map(params![max_per_session as i64, cutoff], |row| {
            Ok(PrunedCheckpoint {
                id: row.get(0)?,
                session_id: row.get(1)?,
                checkpoint_number: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(checkpoints)
}

fn describe_sessions(conn: &Connection, ids: &[i64]) -> Result<Vec<PrunedSession>> {
    let mut out = Vec::with_capacity(ids.len());
    for chunk in ids.chunks(DELETE_CHUNK) {
        let sql = format!(
            "SELECT id, session_id, project_path, created_at FROM sessions WHERE id IN ({}) ORDER BY id",
            sql_placeholders(chunk.len())
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(id_params(chunk).as_slice(), |row| {
            Ok(PrunedSession {
                id: row.get(0)?,
                session_id: row.get(1)?,
                project_path: row.get(2)?,
                created_at: row.get(3)?,
            })
        })?;
        for row in rows {
            out.push(row?);
        }
    }
    Ok(out)
}

/// Children first, then the sessions themselves.
fn delete_sessions(conn: &Connection, ids: &[i64]) -> Result<()> {
    for chunk in ids.chunks(DELETE_CHUNK) {
        let placeholders = sql_placeholders(chunk.len());
        let params = id_params(chunk);
        for table in CHILD_TABLES {
            conn.execute(
                &format!("DELETE FROM {table} WHERE session_id IN ({placeholders})"),
                params.as_slice(),
            )?;
        }
        conn.execute(
            &format!("DELETE FROM sessions WHERE id IN ({placeholders})"),
            params.as_slice(),
        )?;
    }
    Ok(())
}

fn delete_checkpoints_for(conn: &Connection, session_ids: &[&str]) -> Result<usize> {
    let mut removed = 0;
    let mut stmt = conn.prepare_cached("DELETE FROM context_checkpoints WHERE session_id = ?1")?;
    for session_id in session_ids {
        removed += stmt.execute(params![session_id])?;
    }
    Ok(removed)
}

fn rebuild_fts(conn: &Connection) -> Result<()> {
    for table in FTS_TABLES {
        conn.execute(&format!("INSERT INTO {table}({table}) VALUES ('rebuild')"), [])?;
    }
    Ok(())
}
