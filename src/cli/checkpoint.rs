use anyhow::{anyhow, Context, Result};
use serde_json::json;

use context_memory::config::ContextMemoryConfig;
use context_memory::db::Database;
use context_memory::memory::checkpoint::CheckpointEngine;
use context_memory::memory::types::{ChatMessage, CheckpointTrigger};

/// Store the message array read from `source` as the next checkpoint of `session_id`.
pub fn save(
    config: &ContextMemoryConfig,
    session_id: &str,
    project_path: Option<&str>,
    trigger: &str,
    source: &str,
) -> Result<()> {
    let trigger: CheckpointTrigger = trigger.parse().map_err(|e: String| anyhow!(e))?;
    let raw = super::read_json_source(source)?;
    let messages: Vec<ChatMessage> =
        serde_json::from_str(&raw).context("checkpoint input must be a JSON array of {role, content}")?;

    let engine = CheckpointEngine::new(Database::from_config(config));
    let saved = engine.save_checkpoint(session_id, project_path, trigger, &messages)?;
    super::print_json(&saved)
}

/// Print the most recent checkpoint for the session, the project, or overall.
pub fn load(
    config: &ContextMemoryConfig,
    session_id: Option<&str>,
    project_path: Option<&str>,
    last_n: Option<usize>,
) -> Result<()> {
    let engine = CheckpointEngine::new(Database::from_config(config));
    match engine.load_latest_checkpoint(session_id, project_path, last_n)? {
        Some(checkpoint) => super::print_json(&checkpoint),
        None => super::print_json(&json!({ "error": "No checkpoints found.", "messages": [] })),
    }
}
