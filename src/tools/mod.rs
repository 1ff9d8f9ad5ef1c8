pub mod context_init;
pub mod context_load_checkpoint;
pub mod context_save;
pub mod context_search;
pub mod context_stats;

use context_init::ContextInitParams;
use context_load_checkpoint::LoadCheckpointParams;
use context_save::ContextSaveParams;
use context_search::ContextSearchParams;
use context_stats::ContextStatsParams;
use rmcp::handler::server::tool::ToolRouter;
use rmcp::handler::server::wrapper::Parameters;
use rmcp::{tool, tool_handler, tool_router, ServerHandler};
use serde_json::json;
use std::sync::Arc;

use context_memory::config::ContextMemoryConfig;
use context_memory::db::schema::{self, InitStatus};
use context_memory::db::Database;
use context_memory::memory::checkpoint::CheckpointEngine;
use context_memory::memory::format::format_results_markdown;
use context_memory::memory::search::{SearchEngine, SearchOptions};
use context_memory::memory::stats;
use context_memory::memory::store::RecordStore;

/// Topics and technologies listed by `context_stats` with `breakdown`.
const BREAKDOWN_LIMIT: usize = 10;

/// The context-memory MCP tool handler. Holds the database handle, the engines built on
/// it and the config, and exposes all MCP tools via the `#[tool_router]` macro.
#[derive(Clone)]
pub struct ContextTools {
    tool_router: ToolRouter<Self>,
    db: Database,
    store: RecordStore,
    search: SearchEngine,
    checkpoints: CheckpointEngine,
    config: Arc<ContextMemoryConfig>,
}

/// Run blocking database work off the async runtime and flatten both failure layers into
/// the tool error string.
async fn blocking<T, F>(label: &'static str, f: F) -> Result<T, String>
where
    T: Send + 'static,
    F: FnOnce() -> context_memory::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| format!("{label} task failed: {e}"))?
        .map_err(|e| format!("{label} failed: {e}"))
}

fn to_json<T: serde::Serialize>(value: &T) -> Result<String, String> {
    serde_json::to_string(value).map_err(|e| format!("serialization failed: {e}"))
}

#[tool_router]
impl ContextTools {
    pub fn new(db: Database, config: Arc<ContextMemoryConfig>) -> Self {
        Self {
            tool_router: Self::tool_router(),
            store: RecordStore::new(db.clone()),
            search: SearchEngine::new(db.clone(), SearchOptions::from(&config.search)),
            checkpoints: CheckpointEngine::new(db.clone()),
            db,
            config,
        }
    }

    /// Search past sessions stored in context memory.
    #[tool(description = "Search past sessions stored in context memory. Ranks sessions by full-text matches on summaries, topics and code snippets (tier 1); with detailed=true also returns full messages and code (tier 2).")]
    async fn context_search(
        &self,
        Parameters(params): Parameters<ContextSearchParams>,
    ) -> Result<String, String> {
        let limit = params
            .limit
            .unwrap_or(self.config.search.default_limit)
            .max(1);
        let detailed = params.detailed.unwrap_or(false);
        let markdown = match params.format.as_deref() {
            None | Some("json") => false,
            Some("markdown") => true,
            Some(other) => return Err(format!("unknown format: {other}")),
        };

        tracing::info!(query = %params.query, detailed, limit, "context_search called");

        let search = self.search.clone();
        let query = params.query;
        let project = params.project_path;
        let response = blocking("search", move || {
            search.full_search(&query, project.as_deref(), detailed, limit)
        })
        .await?;

        tracing::info!(results = response.result_count, "search complete");

        if markdown {
            return Ok(format_results_markdown(&response, detailed, self.db.exists()));
        }
        to_json(&response)
    }

    /// Save a session with its messages, summary, topics and code snippets.
    #[tool(description = "Save a session to context memory: messages, summary (brief, detailed, key_decisions, problems_solved, technologies, outcome), topics and code snippets. Saving the same session_id again updates it.")]
    async fn context_save(
        &self,
        Parameters(params): Parameters<ContextSaveParams>,
    ) -> Result<String, String> {
        let input = params.into_input()?;

        tracing::info!(
            session = %input.session_id,
            messages = input.messages.len(),
            topics = input.topics.len(),
            "context_save called"
        );

        let store = self.store.clone();
        let result = blocking("save", move || store.save_full_session(&input)).await?;
        to_json(&result)
    }

    /// Row counts per table and the database file size.
    #[tool(description = "Get context memory statistics: row counts per table, database size and schema version. Returns {} when no database exists yet.")]
    async fn context_stats(
        &self,
        Parameters(params): Parameters<ContextStatsParams>,
    ) -> Result<String, String> {
        tracing::info!("context_stats called");
        let db = self.db.clone();
        let breakdown = params.breakdown.unwrap_or(false);

        let value = blocking("stats", move || {
            let Some(response) = stats::get_stats(&db)? else {
                return Ok(json!({}));
            };
            let mut value = serde_json::to_value(&response)?;
            if breakdown {
                value["projects"] = serde_json::to_value(stats::list_projects(&db)?)?;
                value["topics"] = serde_json::to_value(stats::topic_counts(&db, BREAKDOWN_LIMIT)?)?;
                value["outcomes"] = serde_json::to_value(stats::outcome_counts(&db)?)?;
                value["technologies"] =
                    serde_json::to_value(stats::technology_counts(&db, BREAKDOWN_LIMIT)?)?;
            }
            Ok(value)
        })
        .await?;

        Ok(value.to_string())
    }

    /// Create (or recreate) the database.
    #[tool(description = "Initialize the context memory database: tables, full-text indexes and triggers. Safe to call repeatedly; force=true drops and recreates it.")]
    async fn context_init(
        &self,
        Parameters(params): Parameters<ContextInitParams>,
    ) -> Result<String, String> {
        let force = params.force.unwrap_or(false);
        tracing::info!(force, "context_init called");

        let db = self.db.clone();
        let status = blocking("init", move || schema::initialize(&db, force)).await?;

        let (created, message) = match status {
            InitStatus::Created => (true, "Database initialized."),
            InitStatus::Recreated => (true, "Database recreated."),
            InitStatus::AlreadyExists => (false, "Database already exists."),
        };
        Ok(json!({ "created": created, "message": message }).to_string())
    }

    /// Restore the most recent pre-compaction checkpoint.
    #[tool(description = "Load the most recent pre-compaction checkpoint. Call this after context compaction to restore the full conversation saved before it. Falls back from session to project to the newest checkpoint overall.")]
    async fn context_load_checkpoint(
        &self,
        Parameters(params): Parameters<LoadCheckpointParams>,
    ) -> Result<String, String> {
        tracing::info!(session = ?params.session_id, "context_load_checkpoint called");

        if !self.db.exists() {
            return Ok(json!({ "error": "Database does not exist.", "messages": [] }).to_string());
        }

        let checkpoints = self.checkpoints.clone();
        let loaded = blocking("checkpoint load", move || {
            checkpoints.load_latest_checkpoint(
                params.session_id.as_deref(),
                params.project_path.as_deref(),
                params.last_n_messages,
            )
        })
        .await?;

        match loaded {
            Some(checkpoint) => to_json(&checkpoint),
            None => Ok(json!({ "error": "No checkpoints found.", "messages": [] }).to_string()),
        }
    }
}

#[tool_handler]
impl ServerHandler for ContextTools {
    fn get_info(&self) -> rmcp::model::ServerInfo {
        rmcp::model::ServerInfo {
            instructions: Some(
                "Persistent, searchable context storage across coding sessions. \
                 Save sessions with context_save, search past work with context_search, \
                 and restore a conversation after compaction with context_load_checkpoint."
                    .into(),
            ),
            capabilities: rmcp::model::ServerCapabilities::builder()
                .enable_tools()
                .build(),
            ..Default::default()
        }
    }
}
