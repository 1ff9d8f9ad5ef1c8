//! MCP `context_search` tool parameter definition.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Parameters for the `context_search` MCP tool.
#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ContextSearchParams {
    /// Free-text query. Terms are stemmed and prefix-matched.
    #[schemars(description = "Search terms (stemmed: 'running' matches 'run')")]
    pub query: String,

    /// Restrict results to one project directory.
    #[schemars(description = "Limit results to a specific project directory")]
    pub project_path: Option<String>,

    /// Include full messages and code snippets (tier 2).
    #[schemars(description = "Include full messages and code snippets (default: false)")]
    pub detailed: Option<bool>,

    /// Maximum number of sessions. Defaults to the configured limit.
    #[schemars(description = "Maximum number of results to return (default 10)")]
    pub limit: Option<usize>,

    /// `"json"` (default) or `"markdown"`.
    #[schemars(description = "Response format: 'json' (default) or 'markdown'")]
    pub format: Option<String>,
}
