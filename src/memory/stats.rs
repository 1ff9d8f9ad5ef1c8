//! Store statistics and aggregate views (projects, topics, outcomes, technologies).
//!
//! All functions read through a read-only connection and treat a missing database as
//! empty.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

use crate::db::{migrations, Database};
use crate::error::{ContextError, Result};

/// Tables a generic helper may name.
pub const VALID_TABLES: [&str; 7] = [
    "sessions",
    "messages",
    "summaries",
    "topics",
    "code_snippets",
    "schema_version",
    "context_checkpoints",
];

/// Tables reported by [`get_stats`].
pub const STATS_TABLES: [&str; 6] = [
    "sessions",
    "messages",
    "summaries",
    "topics",
    "code_snippets",
    "context_checkpoints",
];

/// Topic written by automatic saves; excluded from topic analytics.
const AUTO_SAVE_TOPIC: &str = "auto-save";

/// Response from [`get_stats`]: one row count per table plus file size.
#[derive(Debug, Serialize)]
pub struct StatsResponse {
    #[serde(flatten)]
    pub tables: BTreeMap<String, i64>,
    pub db_size_bytes: u64,
    pub schema_version: u32,
}

#[derive(Debug, Serialize)]
pub struct ProjectCount {
    pub project_path: String,
    pub session_count: i64,
}

#[derive(Debug, Serialize)]
pub struct TopicCount {
    pub topic: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct OutcomeCount {
    pub outcome: String,
    pub count: i64,
}

#[derive(Debug, Serialize)]
pub struct TechnologyCount {
    pub technology: String,
    pub count: i64,
}

/// Row counts and file size, or `None` when there is no database.
pub fn get_stats(db: &Database) -> Result<Option<StatsResponse>> {
    let Some(conn) = db.open_read_only()? else {
        return Ok(None);
    };
    let mut tables = BTreeMap::new();
    for table in STATS_TABLES {
        if table_exists(&conn, table)? {
            tables.insert(table.to_string(), count_rows(&conn, table)?);
        }
    }
    Ok(Some(StatsResponse {
        tables,
        db_size_bytes: db.file_size(),
        schema_version: migrations::current_version(&conn)?,
    }))
}

/// Row count of one allow-listed table. 0 when there is no database.
pub fn table_count(db: &Database, table: &str) -> Result<i64> {
    if !VALID_TABLES.contains(&table) {
        return Err(ContextError::UnknownTable(table.to_string()));
    }
    let Some(conn) = db.open_read_only()? else {
        return Ok(0);
    };
    if !table_exists(&conn, table)? {
        return Ok(0);
    }
    count_rows(&conn, table)
}

/// Distinct project paths with their session counts, busiest first.
pub fn list_projects(db: &Database) -> Result<Vec<ProjectCount>> {
    let Some(conn) = db.open_read_only()? else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(
        "SELECT project_path, COUNT(*) AS n FROM sessions
         WHERE project_path IS NOT NULL AND project_path != ''
         GROUP BY project_path
         ORDER BY n DESC, project_path",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(ProjectCount {
                project_path: row.get(0)?,
                session_count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Most frequent topics, ignoring the auto-save tag.
pub fn topic_counts(db: &Database, limit: usize) -> Result<Vec<TopicCount>> {
    let Some(conn) = db.open_read_only()? else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(
        "SELECT topic, COUNT(*) AS n FROM topics
         WHERE topic != ?1
         GROUP BY topic
         ORDER BY n DESC, topic
         LIMIT ?2",
    )?;
    let rows = stmt
        .query_map(params![AUTO_SAVE_TOPIC, limit as i64], |row| {
            Ok(TopicCount {
                topic: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Summary outcomes, with unset outcomes reported as `unknown`.
pub fn outcome_counts(db: &Database) -> Result<Vec<OutcomeCount>> {
    let Some(conn) = db.open_read_only()? else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare(
        "SELECT COALESCE(outcome, 'unknown') AS o, COUNT(*) AS n FROM summaries
         GROUP BY o
         ORDER BY n DESC, o",
    )?;
    let rows = stmt
        .query_map([], |row| {
            Ok(OutcomeCount {
                outcome: row.get(0)?,
                count: row.get(1)?,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(rows)
}

/// Technology usage across summaries, case-folded. Malformed lists are skipped.
pub fn technology_counts(db: &Database, limit: usize) -> Result<Vec<TechnologyCount>> {
    let Some(conn) = db.open_read_only()? else {
        return Ok(Vec::new());
    };
    let mut stmt = conn.prepare("SELECT technologies FROM summaries WHERE technologies IS NOT NULL")?;
    let mut counts: HashMap<String, i64> = HashMap::new();
    for raw in stmt.query_map([], |row| row.get::<_, String>(0))? {
        let Ok(list) = serde_json::from_str::<Vec<String>>(&raw?) else {
            continue;
        };
        for tech in list {
            let tech = tech.trim().to_lowercase();
            if !tech.is_empty() {
                *counts.entry(tech).or_insert(0) += 1;
            }
        }
    }

    let mut rows: Vec<TechnologyCount> = counts
        .into_iter()
        .map(|(technology, count)| TechnologyCount { technology, count })
        .collect();
    rows.sort_by(|a, b| b.count.cmp(&a.count).then_with(|| a.technology.cmp(&b.technology)));
    rows.truncate(limit);
    Ok(rows)
}

fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [table],
        |row| row.get(0),
    )?)
}

/// Only called with names from [`VALID_TABLES`].
fn count_rows(conn: &Connection, table: &str) -> Result<i64> {
    Ok(conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::store::RecordStore;
    use crate::memory::types::{Outcome, SessionInput, SummaryPatch};
    use tempfile::TempDir;

    fn setup() -> (TempDir, Database, RecordStore) {
        let tmp = TempDir::new().unwrap();
        let db = Database::new(tmp.path().join("context.db"));
        let store = RecordStore::new(db.clone());
        (tmp, db, store)
    }

    fn save(store: &RecordStore, id: &str, project: &str, outcome: Option<Outcome>, tech: &[&str], topics: &[&str]) {
        store
            .save_full_session(&SessionInput {
                session_id: id.into(),
                project_path: Some(project.into()),
                summary: Some(SummaryPatch {
                    brief: Some(format!("brief {id}")),
                    outcome,
                    technologies: Some(tech.iter().map(|t| t.to_string()).collect()),
                    ..Default::default()
                }),
                topics: topics.iter().map(|t| t.to_string()).collect(),
                ..Default::default()
            })
            .unwrap();
    }

    #[test]
    fn stats_without_database_is_none() {
        let (_tmp, db, _store) = setup();
        assert!(get_stats(&db).unwrap().is_none());
        assert_eq!(table_count(&db, "sessions").unwrap(), 0);
    }

    #[test]
    fn stats_counts_tables() {
        let (_tmp, db, store) = setup();
        save(&store, "a", "/p/one", None, &[], &["x", "y"]);

        let stats = get_stats(&db).unwrap().unwrap();
        assert_eq!(stats.tables["sessions"], 1);
        assert_eq!(stats.tables["topics"], 2);
        assert_eq!(stats.tables["context_checkpoints"], 0);
        assert!(!stats.tables.contains_key("schema_version"));
        assert!(stats.db_size_bytes > 0);

        let json = serde_json::to_value(&stats).unwrap();
        assert_eq!(json["summaries"], 1);
    }

    #[test]
    fn table_count_rejects_unknown_tables() {
        let (_tmp, db, _store) = setup();
        let err = table_count(&db, "sqlite_master; DROP TABLE sessions").unwrap_err();
        assert!(matches!(err, ContextError::UnknownTable(_)));
    }

    #[test]
    fn aggregates() {
        let (_tmp, db, store) = setup();
        save(&store, "a", "/p/one", Some(Outcome::Success), &["Rust", "sqlite"], &["auto-save", "db"]);
        save(&store, "b", "/p/one", None, &["rust"], &["db"]);
        save(&store, "c", "/p/two", Some(Outcome::Success), &[], &["api"]);

        let projects = list_projects(&db).unwrap();
        assert_eq!(projects[0].project_path, "/p/one");
        assert_eq!(projects[0].session_count, 2);

        let topics = topic_counts(&db, 10).unwrap();
        assert_eq!(topics[0].topic, "db");
        assert!(topics.iter().all(|t| t.topic != "auto-save"));

        let outcomes = outcome_counts(&db).unwrap();
        assert_eq!(outcomes[0].outcome, "success");
        assert_eq!(outcomes[0].count, 2);
        assert!(outcomes.iter().any(|o| o.outcome == "unknown"));

        let tech = technology_counts(&db, 1).unwrap();
        assert_eq!(tech.len(), 1);
        assert_eq!(tech[0].technology, "rust");
        assert_eq!(tech[0].count, 2);
    }
}
