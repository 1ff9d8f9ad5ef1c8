use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use context_memory::memory::types::{
    ChatMessage, Outcome, Role, SessionInput, SnippetInput, SummaryPatch,
};

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct MessageParam {
    #[schemars(description = "Speaker: 'user', 'assistant' or 'system'")]
    pub role: String,
    pub content: String,
}

#[derive(Debug, Default, Serialize, Deserialize, JsonSchema)]
pub struct SummaryParam {
    #[schemars(description = "One-line summary. Required when the session has no summary yet.")]
    pub brief: Option<String>,
    pub detailed: Option<String>,
    pub key_decisions: Option<Vec<String>>,
    pub problems_solved: Option<Vec<String>>,
    pub technologies: Option<Vec<String>>,
    #[schemars(description = "Session outcome: 'success', 'partial' or 'abandoned'")]
    pub outcome: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct SnippetParam {
    pub code: String,
    pub language: Option<String>,
    pub description: Option<String>,
    pub file_path: Option<String>,
}

#[derive(Debug, Serialize, Deserialize, JsonSchema)]
pub struct ContextSaveParams {
    #[schemars(description = "Unique session identifier")]
    pub session_id: String,

    #[schemars(description = "Path to the project directory")]
    pub project_path: Option<String>,

    #[schemars(description = "Conversation messages; replaces any stored for this session")]
    pub messages: Option<Vec<MessageParam>>,

    #[schemars(description = "Summary fields; omitted fields keep their stored values")]
    pub summary: Option<SummaryParam>,

    #[schemars(description = "Topic tags; replaces any stored for this session")]
    pub topics: Option<Vec<String>>,

    #[schemars(description = "Code snippets to attach")]
    pub code_snippets: Option<Vec<SnippetParam>>,

    #[schemars(description = "Optional user annotation")]
    pub user_note: Option<String>,

    #[schemars(description = "Additional metadata object stored on the session row")]
    pub metadata: Option<serde_json::Map<String, serde_json::Value>>,
}

impl ContextSaveParams {
    /// Validate enum-valued fields and build the store input.
    pub fn into_input(self) -> Result<SessionInput, String> {
        let messages = self
            .messages
            .unwrap_or_default()
            .into_iter()
            .map(|m| -> Result<ChatMessage, String> {
                Ok(ChatMessage::new(m.role.parse::<Role>()?, m.content))
            })
            .collect::<Result<Vec<_>, String>>()?;

        let summary = self
            .summary
            .map(|s| -> Result<SummaryPatch, String> {
                let outcome = s.outcome.as_deref().map(str::parse::<Outcome>).transpose()?;
                Ok(SummaryPatch {
                    brief: s.brief,
                    detailed: s.detailed,
                    key_decisions: s.key_decisions,
                    problems_solved: s.problems_solved,
                    technologies: s.technologies,
                    outcome,
                    user_note: None,
                })
            })
            .transpose()?;

        let code_snippets = self
            .code_snippets
            .unwrap_or_default()
            .into_iter()
            .map(|s| SnippetInput {
                code: s.code,
                language: s.language,
                description: s.description,
                file_path: s.file_path,
            })
            .collect();

        Ok(SessionInput {
            session_id: self.session_id,
            project_path: self.project_path,
            messages,
            summary,
            topics: self.topics.unwrap_or_default(),
            code_snippets,
            user_note: self.user_note,
            metadata: self.metadata,
        })
    }
}
