//! Core record type definitions.
//!
//! Defines the enums stored as text columns ([`Role`], [`Outcome`], [`CheckpointTrigger`]),
//! the save-side input shapes ([`ChatMessage`], [`SummaryPatch`], [`SnippetInput`],
//! [`SessionInput`]) and the read-side result shapes returned by the search engine.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    #[default]
    User,
    Assistant,
    System,
}

impl Role {
    /// SQL-compatible string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "assistant" => Ok(Self::Assistant),
            "system" => Ok(Self::System),
            _ => Err(format!("unknown role: {s}")),
        }
    }
}

/// How a session ended, as judged by whoever wrote the summary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Success,
    Partial,
    Abandoned,
}

impl Outcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Partial => "partial",
            Self::Abandoned => "abandoned",
        }
    }
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Outcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "success" => Ok(Self::Success),
            "partial" => Ok(Self::Partial),
            "abandoned" => Ok(Self::Abandoned),
            _ => Err(format!("unknown outcome: {s}")),
        }
    }
}

/// What caused a checkpoint to be written.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CheckpointTrigger {
    /// Host-initiated compaction.
    #[default]
    Auto,
    /// User asked for compaction explicitly.
    Manual,
}

impl CheckpointTrigger {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::Manual => "manual",
        }
    }
}

impl std::fmt::Display for CheckpointTrigger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for CheckpointTrigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "auto" => Ok(Self::Auto),
            "manual" => Ok(Self::Manual),
            _ => Err(format!("unknown checkpoint trigger: {s}")),
        }
    }
}

// ── Save-side inputs ────────────────────────────────────────────────────────

/// A role/content pair, as saved into `messages` or a checkpoint blob.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: String,
}

impl ChatMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Sparse summary update. `None` means "leave the stored value alone".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SummaryPatch {
    pub brief: Option<String>,
    pub detailed: Option<String>,
    pub key_decisions: Option<Vec<String>>,
    pub problems_solved: Option<Vec<String>>,
    pub technologies: Option<Vec<String>>,
    pub outcome: Option<Outcome>,
    pub user_note: Option<String>,
}

impl SummaryPatch {
    pub fn brief(brief: impl Into<String>) -> Self {
        Self {
            brief: Some(brief.into()),
            ..Default::default()
        }
    }
}

/// A code excerpt to attach to a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SnippetInput {
    pub code: String,
    #[serde(default)]
    pub language: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
}

/// The save input contract: everything a caller may hand over in one go.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionInput {
    pub session_id: String,
    pub project_path: Option<String>,
    pub messages: Vec<ChatMessage>,
    pub summary: Option<SummaryPatch>,
    pub topics: Vec<String>,
    pub code_snippets: Vec<SnippetInput>,
    pub user_note: Option<String>,
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

/// Ids and counts produced by a full session save.
#[derive(Debug, Clone, Serialize)]
pub struct SaveResult {
    pub session_id: String,
    pub session_db_id: i64,
    pub messages_count: usize,
    pub summary_id: Option<i64>,
    pub topics_count: usize,
    pub snippet_ids: Vec<i64>,
}

// ── Read-side results ───────────────────────────────────────────────────────

/// A message row as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredMessage {
    pub role: String,
    pub content: String,
    pub sequence: i64,
    pub created_at: String,
}

/// A code snippet row as stored.
#[derive(Debug, Clone, Serialize)]
pub struct StoredSnippet {
    pub id: i64,
    pub language: Option<String>,
    pub code: String,
    pub description: Option<String>,
    pub file_path: Option<String>,
    pub created_at: String,
}

/// One session in a search result. Tier 1 fills the summary header fields; tier 2
/// overlays the full text, messages and snippets.
///
/// List-valued summary fields hold the decoded JSON array, or the raw stored string
/// when it was not valid JSON.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SessionResult {
    pub id: i64,
    pub session_id: String,
    pub project_path: Option<String>,
    pub created_at: String,
    pub updated_at: Option<String>,
    pub message_count: i64,
    pub brief: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detailed: Option<String>,
    pub key_decisions: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub problems_solved: Option<serde_json::Value>,
    pub technologies: Option<serde_json::Value>,
    pub outcome: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_note: Option<String>,
    pub topics: Vec<String>,
    /// Engine relevance after ranking. Lower is better.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub relevance: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub messages: Option<Vec<StoredMessage>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_snippets: Option<Vec<StoredSnippet>>,
}

/// The search output contract.
#[derive(Debug, Clone, Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub project_path: Option<String>,
    pub result_count: usize,
    pub sessions: Vec<SessionResult>,
}

/// A message-level hit from [`crate::memory::search::SearchEngine::search_messages`].
#[derive(Debug, Clone, Serialize)]
pub struct MessageHit {
    pub id: i64,
    pub session_db_id: i64,
    pub session_id: String,
    pub project_path: Option<String>,
    pub role: String,
    pub content: String,
    pub sequence: i64,
    pub relevance: f64,
}

/// Decode a JSON list column, falling back to the raw text when it does not parse.
pub(crate) fn decode_list_field(
    raw: Option<String>,
    field: &str,
    session_db_id: i64,
) -> Option<serde_json::Value> {
    let raw = raw?;
    match serde_json::from_str::<serde_json::Value>(&raw) {
        Ok(value) => Some(value),
        Err(e) => {
            tracing::warn!(field, session = session_db_id, error = %e, "malformed JSON in summary field");
            Some(serde_json::Value::String(raw))
        }
    }
}
