//! Markdown rendering of search responses for humans and agents.

use serde_json::Value;

use crate::memory::types::{SearchResponse, SessionResult};

const MAX_DECISIONS: usize = 5;
const MAX_MESSAGES: usize = 10;
const MAX_SNIPPETS: usize = 5;
const MESSAGE_PREVIEW_CHARS: usize = 300;
const SNIPPET_PREVIEW_CHARS: usize = 500;

/// Render a search response. `db_exists` distinguishes an empty store from a store with
/// no matches.
pub fn format_results_markdown(response: &SearchResponse, detailed: bool, db_exists: bool) -> String {
    let mut lines = vec![
        "# Context Memory Results".to_string(),
        format!("**Query**: \"{}\"", response.query),
        format!("**Results**: {} sessions", response.result_count),
        String::new(),
    ];

    if !db_exists {
        lines.push("No context database found yet. Save a session to create it.".to_string());
        return lines.join("\n");
    }
    if response.sessions.is_empty() {
        lines.push("No matching sessions found.".to_string());
        return lines.join("\n");
    }

    lines.push("---".to_string());
    for (i, session) in response.sessions.iter().enumerate() {
        render_session(&mut lines, i + 1, session, detailed);
        lines.push(String::new());
        lines.push("---".to_string());
    }
    lines.join("\n")
}

fn render_session(lines: &mut Vec<String>, rank: usize, session: &SessionResult, detailed: bool) {
    let date = session
        .created_at
        .split('T')
        .next()
        .unwrap_or(&session.created_at);
    let project = session
        .project_path
        .as_deref()
        .and_then(|p| p.replace('\\', "/").rsplit('/').next().map(str::to_string))
        .filter(|p| !p.is_empty())
        .unwrap_or_else(|| "Unknown project".to_string());

    lines.push(format!("## {rank}. {date} | {project} (Match #{rank})"));
    lines.push(format!(
        "**Summary**: {}",
        session.brief.as_deref().unwrap_or("No summary available")
    ));

    if !session.topics.is_empty() {
        lines.push(format!("**Topics**: {}", session.topics.join(", ")));
    }

    let technologies = list_items(session.technologies.as_ref());
    if !technologies.is_empty() {
        lines.push(format!("**Technologies**: {}", technologies.join(", ")));
    }

    let decisions = list_items(session.key_decisions.as_ref());
    if !decisions.is_empty() {
        lines.push("**Decisions**:".to_string());
        for decision in decisions.iter().take(MAX_DECISIONS) {
            lines.push(format!("- {decision}"));
        }
    }

    if detailed {
        render_details(lines, session);
    }
}

fn render_details(lines: &mut Vec<String>, session: &SessionResult) {
    let text = session.detailed.as_deref().filter(|t| !t.is_empty());
    let messages = session.messages.as_deref().unwrap_or_default();
    let snippets = session.code_snippets.as_deref().unwrap_or_default();
    if text.is_none() && messages.is_empty() && snippets.is_empty() {
        return;
    }

    lines.push(String::new());
    lines.push("<details><summary>Full Context</summary>".to_string());
    lines.push(String::new());

    if let Some(text) = text {
        lines.push("### Detailed Summary".to_string());
        lines.push(text.to_string());
        lines.push(String::new());
    }

    if !messages.is_empty() {
        lines.push("### Key Messages".to_string());
        for msg in messages.iter().take(MAX_MESSAGES) {
            lines.push(format!(
                "**{}**: {}",
                capitalize(&msg.role),
                truncate_text(&msg.content, MESSAGE_PREVIEW_CHARS)
            ));
            lines.push(String::new());
        }
    }

    if !snippets.is_empty() {
        lines.push("### Code Snippets".to_string());
        for snippet in snippets.iter().take(MAX_SNIPPETS) {
            lines.push(format!(
                "**{}**",
                snippet.description.as_deref().unwrap_or("Code snippet")
            ));
            lines.push(format!("```{}", snippet.language.as_deref().unwrap_or("")));
            lines.push(truncate_text(&snippet.code, SNIPPET_PREVIEW_CHARS));
            lines.push("```".to_string());
            lines.push(String::new());
        }
    }

    lines.push("</details>".to_string());
}

/// Items of a list field; a raw (unparsed) string counts as one item.
fn list_items(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| match item {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect(),
        Some(Value::String(raw)) if !raw.is_empty() => vec![raw.clone()],
        _ => Vec::new(),
    }
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

/// Truncate to at most `max_chars` characters, marking the cut with `...`.
pub fn truncate_text(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let keep = max_chars.saturating_sub(3);
    let end = text
        .char_indices()
        .nth(keep)
        .map(|(i, _)| i)
        .unwrap_or(text.len());
    format!("{}...", &text[..end])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::types::{StoredMessage, StoredSnippet};

    fn response(sessions: Vec<SessionResult>) -> SearchResponse {
        SearchResponse {
            query: "auth".into(),
            project_path: None,
            result_count: sessions.len(),
            sessions,
        }
    }

    fn session() -> SessionResult {
        SessionResult {
            id: 1,
            session_id: "s1".into(),
            project_path: Some(r"C:\work\webapp".into()),
            created_at: "2026-03-01T10:00:00.000000Z".into(),
            brief: Some("Fixed auth bug".into()),
            topics: vec!["authentication".into(), "bugfix".into()],
            technologies: Some(serde_json::json!(["rust", "sqlite"])),
            key_decisions: Some(serde_json::json!(["a", "b", "c", "d", "e", "f", "g"])),
            ..Default::default()
        }
    }

    #[test]
    fn empty_states_are_distinct() {
        let no_db = format_results_markdown(&response(vec![]), false, false);
        let no_hits = format_results_markdown(&response(vec![]), false, true);
        assert!(no_db.contains("No context database found"));
        assert!(no_hits.contains("No matching sessions found."));
        assert_ne!(no_db, no_hits);
    }

    #[test]
    fn header_and_caps() {
        let out = format_results_markdown(&response(vec![session()]), false, true);
        assert!(out.contains("## 1. 2026-03-01 | webapp (Match #1)"));
        assert!(out.contains("**Topics**: authentication, bugfix"));
        assert!(out.contains("**Technologies**: rust, sqlite"));
        assert!(out.contains("- e"));
        assert!(!out.contains("- f"));
        assert!(!out.contains("<details>"));
    }

    #[test]
    fn detailed_caps_messages_and_snippets() {
        let mut s = session();
        s.detailed = Some("Long story".into());
        s.messages = Some(
            (0..15)
                .map(|i| StoredMessage {
                    role: "assistant".into(),
                    content: format!("msg-{i} {}", "x".repeat(400)),
                    sequence: i,
                    created_at: String::new(),
                })
                .collect(),
        );
        s.code_snippets = Some(
            (0..7)
                .map(|i| StoredSnippet {
                    id: i,
                    language: Some("rust".into()),
                    code: format!("// snippet-{i}"),
                    description: None,
                    file_path: None,
                    created_at: String::new(),
                })
                .collect(),
        );

        let out = format_results_markdown(&response(vec![s]), true, true);
        assert!(out.contains("<details><summary>Full Context</summary>"));
        assert!(out.contains("**Assistant**: msg-9"));
        assert!(!out.contains("msg-10"));
        assert!(out.contains("snippet-4"));
        assert!(!out.contains("snippet-5"));
        assert!(out.contains("```rust"));
    }

    #[test]
    fn raw_list_field_renders_as_single_item() {
        let mut s = session();
        s.technologies = Some(Value::String("not-json".into()));
        let out = format_results_markdown(&response(vec![s]), false, true);
        assert!(out.contains("**Technologies**: not-json"));
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate_text("short", 10), "short");
        assert_eq!(truncate_text("abcdefghij", 8), "abcde...");
        let t = truncate_text("ééééééééé", 6);
        assert_eq!(t, "ééé...");
    }
}
