//! MCP `context_load_checkpoint` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `context_load_checkpoint` MCP tool.
///
/// Lookup falls back from session to project to the newest checkpoint overall.
#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct LoadCheckpointParams {
    #[schemars(
        description = "Load the checkpoint for this session. If omitted, the latest for the project (or overall) is used."
    )]
    pub session_id: Option<String>,

    #[schemars(description = "Filter by project directory")]
    pub project_path: Option<String>,

    #[schemars(description = "Only return the last N messages (for partial reload)")]
    pub last_n_messages: Option<usize>,
}
