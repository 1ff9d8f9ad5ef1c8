//! Read path: two-tier session search, message search and listings.
//!
//! Tier 1 runs one bm25-ranked lookup per FTS index (summaries, topics, snippets) and
//! merges them with the configured [`RankingStrategy`]. Tier 2 hydrates a list of
//! sessions with one batched query per table. Every read opens a read-only connection;
//! a missing database file reads as an empty store.

use rusqlite::{params, Connection};
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

use super::{id_params, sql_placeholders};
use crate::config::SearchConfig;
use crate::db::Database;
use crate::error::Result;
use crate::memory::project::hash_project_path;
use crate::memory::ranking::{merge_hits, MatchSource, RankedHit, RankingStrategy};
use crate::memory::types::{
    decode_list_field, MessageHit, SearchResponse, SessionResult, StoredMessage, StoredSnippet,
};

// ── Public types ──────────────────────────────────────────────────────────────

/// Ranking knobs for tier 1.
#[derive(Debug, Clone)]
pub struct SearchOptions {
    pub ranking: RankingStrategy,
    pub source_boost: f64,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            ranking: RankingStrategy::RawScore,
            source_boost: 0.25,
        }
    }
}

impl From<&SearchConfig> for SearchOptions {
    fn from(config: &SearchConfig) -> Self {
        Self {
            ranking: config.ranking,
            source_boost: config.source_boost,
        }
    }
}

/// Column used to order [`SearchEngine::list_sessions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionSort {
    #[default]
    CreatedAt,
    UpdatedAt,
    MessageCount,
}

impl SessionSort {
    fn column(&self) -> &'static str {
        match self {
            Self::CreatedAt => "created_at",
            Self::UpdatedAt => "updated_at",
            Self::MessageCount => "message_count",
        }
    }
}

impl std::str::FromStr for SessionSort {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "created_at" => Ok(Self::CreatedAt),
            "updated_at" => Ok(Self::UpdatedAt),
            "message_count" => Ok(Self::MessageCount),
            _ => Err(format!("unknown sort column: {s}")),
        }
    }
}

/// Paging and filtering for [`SearchEngine::list_sessions`].
#[derive(Debug, Clone)]
pub struct SessionFilter {
    /// 1-based.
    pub page: u32,
    pub per_page: u32,
    /// Substring of the stored project path.
    pub project: Option<String>,
    pub sort: SessionSort,
    pub descending: bool,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            page: 1,
            per_page: 20,
            project: None,
            sort: SessionSort::CreatedAt,
            descending: true,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SessionPage {
    pub sessions: Vec<SessionResult>,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
}

#[derive(Debug, Serialize)]
pub struct ExportPage {
    pub sessions: Vec<SessionResult>,
    pub count: usize,
    pub total: i64,
    pub page: u32,
    pub per_page: u32,
    pub has_more: bool,
}

/// Largest page [`SearchEngine::export_page`] will return.
pub const MAX_EXPORT_PAGE: u32 = 500;

// ── Engine ────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct SearchEngine {
    db: Database,
    options: SearchOptions,
}

impl SearchEngine {
    pub fn new(db: Database, options: SearchOptions) -> Self {
        Self { db, options }
    }

    /// Tier 1: ranked discovery over summaries, topics and snippets.
    pub fn tier1(
        &self,
        query: &str,
        project_path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<SessionResult>> {
        let Some(fts_query) = format_fts_query(query) else {
            return Ok(Vec::new());
        };
        let Some(conn) = self.db.open_read_only()? else {
            return Ok(Vec::new());
        };
        let project_hash = project_path
            .filter(|p| !p.trim().is_empty())
            .map(hash_project_path);

        let mut hits = Vec::new();
        for source in [MatchSource::Summary, MatchSource::Topic, MatchSource::Snippet] {
            hits.extend(lookup(&conn, source, &fts_query, project_hash.as_deref(), limit)?);
        }
        debug!(query = %fts_query, hits = hits.len(), strategy = %self.options.ranking, "tier 1 lookups done");

        let merged = merge_hits(hits, self.options.ranking, self.options.source_boost, limit);
        let ids: Vec<i64> = merged.iter().map(|(s, _)| s.id).collect();
        let mut topics = fetch_topics(&conn, &ids)?;

        Ok(merged
            .into_iter()
            .map(|(mut session, score)| {
                session.relevance = Some(score);
                session.topics = topics.remove(&session.id).unwrap_or_default();
                session
            })
            .collect())
    }

    /// Tier 2: full content for `ids`, returned in the requested order. Unknown ids are
    /// skipped.
    pub fn tier2(
        &self,
        ids: &[i64],
        include_messages: bool,
        include_snippets: bool,
    ) -> Result<Vec<SessionResult>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let Some(conn) = self.db.open_read_only()? else {
            return Ok(Vec::new());
        };
        hydrate(&conn, ids, include_messages, include_snippets)
    }

    /// Tier 1, then (when `detailed`) tier 2 overlaid onto the same results.
    pub fn full_search(
        &self,
        query: &str,
        project_path: Option<&str>,
        detailed: bool,
        limit: usize,
    ) -> Result<SearchResponse> {
        let mut sessions = self.tier1(query, project_path, limit)?;

        if detailed && !sessions.is_empty() {
            let ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
            let mut full: HashMap<i64, SessionResult> = self
                .tier2(&ids, true, true)?
                .into_iter()
                .map(|s| (s.id, s))
                .collect();
            for session in &mut sessions {
                if let Some(detail) = full.remove(&session.id) {
                    overlay(session, detail);
                }
            }
        }

        Ok(SearchResponse {
            query: query.to_string(),
            project_path: project_path.map(str::to_string),
            result_count: sessions.len(),
            sessions,
        })
    }

    /// Message-level hits, ranked by bm25 over message content.
    pub fn search_messages(
        &self,
        query: &str,
        project_path: Option<&str>,
        limit: usize,
    ) -> Result<Vec<MessageHit>> {
        let Some(fts_query) = format_fts_query(query) else {
            return Ok(Vec::new());
        };
        let Some(conn) = self.db.open_read_only()? else {
            return Ok(Vec::new());
        };
        let project_hash = project_path
            .filter(|p| !p.trim().is_empty())
            .map(hash_project_path);

        let mut stmt = conn.prepare(
            "SELECT m.id, s.id, s.session_id, s.project_path, m.role, m.content, m.sequence,
                    bm25(messages_fts) AS relevance
             FROM messages_fts
             JOIN messages m ON m.id = messages_fts.rowid
             JOIN sessions s ON s.id = m.session_id
             WHERE messages_fts MATCH ?1 AND (?2 IS NULL OR s.project_hash = ?2)
             ORDER BY relevance
             LIMIT ?3",
        )?;
        let hits = stmt
            .query_map(params![fts_query, project_hash, limit as i64], |row| {
                Ok(MessageHit {
                    id: row.get(0)?,
                    session_db_id: row.get(1)?,
                    session_id: row.get(2)?,
                    project_path: row.get(3)?,
                    role: row.get(4)?,
                    content: row.get(5)?,
                    sequence: row.get(6)?,
                    relevance: row.get(7)?,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(hits)
    }

    /// Paginated session listing with summary headers and topics.
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<SessionPage> {
        let page = filter.page.max(1);
        let per_page = filter.per_page.max(1);
        let Some(conn) = self.db.open_read_only()? else {
            return Ok(SessionPage {
                sessions: Vec::new(),
                total: 0,
                page,
                per_page,
            });
        };

        let pattern = filter
            .project
            .as_deref()
            .filter(|p| !p.is_empty())
            .map(|p| format!("%{}%", escape_like(p)));

        let total: i64 = conn.query_row(
            r"SELECT COUNT(*) FROM sessions WHERE ?1 IS NULL OR project_path LIKE ?1 ESCAPE '\'",
            params![pattern],
            |row| row.get(0),
        )?;

        let sql = format!(
            r"SELECT {HEADER_COLUMNS}
              FROM sessions s
              LEFT JOIN summaries sm ON sm.session_id = s.id
              WHERE ?1 IS NULL OR s.project_path LIKE ?1 ESCAPE '\'
              ORDER BY s.{col} {dir}, s.id {dir}
              LIMIT ?2 OFFSET ?3",
            col = filter.sort.column(),
            dir = if filter.descending { "DESC" } else { "ASC" },
        );
        let offset = i64::from(page - 1) * i64::from(per_page);
        let mut stmt = conn.prepare(&sql)?;
        let mut sessions = stmt
            .query_map(params![pattern, per_page, offset], header_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let ids: Vec<i64> = sessions.iter().map(|s| s.id).collect();
        let mut topics = fetch_topics(&conn, &ids)?;
        for session in &mut sessions {
            session.topics = topics.remove(&session.id).unwrap_or_default();
        }

        Ok(SessionPage {
            sessions,
            total,
            page,
            per_page,
        })
    }

    /// Everything stored for one session.
    pub fn get_session(&self, session_db_id: i64) -> Result<Option<SessionResult>> {
        Ok(self.tier2(&[session_db_id], true, true)?.pop())
    }

    /// Newest-first page of fully hydrated sessions, for backups.
    pub fn export_page(&self, page: u32, per_page: u32) -> Result<ExportPage> {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_EXPORT_PAGE);
        let Some(conn) = self.db.open_read_only()? else {
            return Ok(ExportPage {
                sessions: Vec::new(),
                count: 0,
                total: 0,
                page,
                per_page,
                has_more: false,
            });
        };

        let total: i64 = conn.query_row("SELECT COUNT(*) FROM sessions", [], |row| row.get(0))?;
        let offset = i64::from(page - 1) * i64::from(per_page);
        let ids: Vec<i64> = conn
            .prepare("SELECT id FROM sessions ORDER BY created_at DESC, id DESC LIMIT ?1 OFFSET ?2")?
            .query_map(params![per_page, offset], |row| row.get(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let sessions = hydrate(&conn, &ids, true, true)?;
        Ok(ExportPage {
            count: sessions.len(),
            has_more: offset + i64::from(per_page) < total,
            sessions,
            total,
            page,
            per_page,
        })
    }
}

// ── Query building ────────────────────────────────────────────────────────────

/// Turn free text into an FTS5 MATCH expression: every whitespace-separated term is
/// stripped to alphanumerics plus `-` and `_`, quoted, prefix-matched, and OR-ed.
///
/// Returns `None` when nothing searchable remains.
pub fn format_fts_query(query: &str) -> Option<String> {
    let terms: Vec<String> = query
        .split_whitespace()
        .map(|term| {
            term.chars()
                .filter(|c| c.is_alphanumeric() || *c == '-' || *c == '_')
                .collect::<String>()
        })
        .filter(|term| !term.is_empty())
        .map(|term| format!("\"{term}\"*"))
        .collect();

    if terms.is_empty() {
        None
    } else {
        Some(terms.join(" OR "))
    }
}

fn escape_like(value: &str) -> String {
    value
        .replace('\\', r"\\")
        .replace('%', r"\%")
        .replace('_', r"\_")
}

/// Session header columns read by [`header_from_row`], in order.
const HEADER_COLUMNS: &str = "s.id, s.session_id, s.project_path, s.created_at, s.updated_at, \
     s.message_count, sm.brief, sm.outcome, sm.technologies, sm.key_decisions";

/// [`HEADER_COLUMNS`] as named by a subquery that selects them.
const HEADER_NAMES: &str = "id, session_id, project_path, created_at, updated_at, \
     message_count, brief, outcome, technologies, key_decisions";

fn header_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<SessionResult> {
    let id: i64 = row.get(0)?;
    Ok(SessionResult {
        id,
        session_id: row.get(1)?,
        project_path: row.get(2)?,
        created_at: row.get(3)?,
        updated_at: row.get(4)?,
        message_count: row.get(5)?,
        brief: row.get(6)?,
        outcome: row.get(7)?,
        technologies: decode_list_field(row.get(8)?, "technologies", id),
        key_decisions: decode_list_field(row.get(9)?, "key_decisions", id),
        ..Default::default()
    })
}

fn lookup(
    conn: &Connection,
    source: MatchSource,
    fts_query: &str,
    project_hash: Option<&str>,
    limit: usize,
) -> Result<Vec<RankedHit<SessionResult>>> {
    let (fts, joins) = match source {
        MatchSource::Summary => (
            "summaries_fts",
            "JOIN summaries sm ON sm.id = summaries_fts.rowid
             JOIN sessions s ON s.id = sm.session_id",
        ),
        MatchSource::Topic => (
            "topics_fts",
            "JOIN topics t ON t.id = topics_fts.rowid
             JOIN sessions s ON s.id = t.session_id
             LEFT JOIN summaries sm ON sm.session_id = s.id",
        ),
        MatchSource::Snippet => (
            "code_snippets_fts",
            "JOIN code_snippets c ON c.id = code_snippets_fts.rowid
             JOIN sessions s ON s.id = c.session_id
             LEFT JOIN summaries sm ON sm.session_id = s.id",
        ),
    };

    if !table_exists(conn, fts)? {
        debug!(index = fts, "index missing on this schema version, skipping");
        return Ok(Vec::new());
    }

    // One row per session: a session can match through several of its own topic or
    // snippet rows, and only its best match counts against the limit.
    let sql = format!(
        "SELECT {HEADER_NAMES}, MIN(relevance) AS best
         FROM (
             SELECT {HEADER_COLUMNS}, bm25({fts}) AS relevance
             FROM {fts}
             {joins}
             WHERE {fts} MATCH ?1 AND (?2 IS NULL OR s.project_hash = ?2)
         )
         GROUP BY id
         ORDER BY best, id
         LIMIT ?3"
    );
    let mut stmt = conn.prepare(&sql)?;
    let hits = stmt
        .query_map(params![fts_query, project_hash, limit as i64], |row| {
            let session = header_from_row(row)?;
            Ok(RankedHit {
                key: session.id,
                source,
                score: row.get(10)?,
                item: session,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(hits)
}

fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    Ok(conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1)",
        [name],
        |row| row.get(0),
    )?)
}

/// Topics for many sessions in one query.
fn fetch_topics(conn: &Connection, ids: &[i64]) -> Result<HashMap<i64, Vec<String>>> {
    let mut map: HashMap<i64, Vec<String>> = HashMap::new();
    if ids.is_empty() {
        return Ok(map);
    }
    let sql = format!(
        "SELECT session_id, topic FROM topics WHERE session_id IN ({}) ORDER BY id",
        sql_placeholders(ids.len())
    );
    let mut stmt = conn.prepare(&sql)?;
    let rows = stmt.query_map(id_params(ids).as_slice(), |row| {
        Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
    })?;
    for row in rows {
        let (session_id, topic) = row?;
        map.entry(session_id).or_default().push(topic);
    }
    Ok(map)
}

fn hydrate(
    conn: &Connection,
    ids: &[i64],
    include_messages: bool,
    include_snippets: bool,
) -> Result<Vec<SessionResult>> {
    if ids.is_empty() {
        return Ok(Vec::new());
    }
    let placeholders = sql_placeholders(ids.len());
    let params = id_params(ids);

    let sql = format!(
        "SELECT s.id, s.session_id, s.project_path, s.created_at, s.updated_at, s.message_count,
                sm.brief, sm.detailed, sm.key_decisions, sm.problems_solved, sm.technologies,
                sm.outcome, sm.user_note
         FROM sessions s
         LEFT JOIN summaries sm ON sm.session_id = s.id
         WHERE s.id IN ({placeholders})"
    );
    let mut stmt = conn.prepare(&sql)?;
    let mut sessions: HashMap<i64, SessionResult> = stmt
        .query_map(params.as_slice(), |row| {
            let id: i64 = row.get(0)?;
            Ok(SessionResult {
                id,
                session_id: row.get(1)?,
                project_path: row.get(2)?,
                created_at: row.get(3)?,
                updated_at: row.get(4)?,
                message_count: row.get(5)?,
                brief: row.get(6)?,
                detailed: row.get(7)?,
                key_decisions: decode_list_field(row.get(8)?, "key_decisions", id),
                problems_solved: decode_list_field(row.get(9)?, "problems_solved", id),
                technologies: decode_list_field(row.get(10)?, "technologies", id),
                outcome: row.get(11)?,
                user_note: row.get(12)?,
                ..Default::default()
            })
        })?
        .map(|r| r.map(|s| (s.id, s)))
        .collect::<std::result::Result<_, _>>()?;

    let mut topics = fetch_topics(conn, ids)?;
    for session in sessions.values_mut() {
        session.topics = topics.remove(&session.id).unwrap_or_default();
    }

    if include_messages {
        let sql = format!(
            "SELECT session_id, role, content, sequence, created_at FROM messages
             WHERE session_id IN ({placeholders}) ORDER BY session_id, sequence"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                StoredMessage {
                    role: row.get(1)?,
                    content: row.get(2)?,
                    sequence: row.get(3)?,
                    created_at: row.get(4)?,
                },
            ))
        })?;
        for session in sessions.values_mut() {
            session.messages = Some(Vec::new());
        }
        for row in rows {
            let (session_id, message) = row?;
            if let Some(list) = sessions.get_mut(&session_id).and_then(|s| s.messages.as_mut()) {
                list.push(message);
            }
        }
    }

    if include_snippets {
        let sql = format!(
            "SELECT session_id, id, language, code, description, file_path, created_at
             FROM code_snippets WHERE session_id IN ({placeholders}) ORDER BY session_id, id"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params.as_slice(), |row| {
            Ok((
                row.get::<_, i64>(0)?,
                StoredSnippet {
                    id: row.get(1)?,
                    language: row.get(2)?,
                    code: row.get(3)?,
                    description: row.get(4)?,
                    file_path: row.get(5)?,
                    created_at: row.get(6)?,
                },
            ))
        })?;
        for session in sessions.values_mut() {
            session.code_snippets = Some(Vec::new());
        }
        for row in rows {
            let (session_id, snippet) = row?;
            if let Some(list) = sessions
                .get_mut(&session_id)
                .and_then(|s| s.code_snippets.as_mut())
            {
                list.push(snippet);
            }
        }
    }

    Ok(ids.iter().filter_map(|id| sessions.remove(id)).collect())
}

/// Copy tier-2 content onto a tier-1 result, keeping its relevance.
fn overlay(target: &mut SessionResult, detail: SessionResult) {
    let relevance = target.relevance;
    *target = SessionResult {
        relevance,
        ..detail
    };
}
