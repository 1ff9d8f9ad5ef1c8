//! CLI `save` command: store a session from flags or a JSON document.

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::json;

use context_memory::config::ContextMemoryConfig;
use context_memory::db::Database;
use context_memory::memory::store::RecordStore;
use context_memory::memory::types::{Outcome, SessionInput, SummaryPatch};

#[derive(Args, Debug)]
pub struct SaveArgs {
    /// Session id (required unless --json is used)
    #[arg(long)]
    pub session_id: Option<String>,
    #[arg(long)]
    pub project_path: Option<String>,
    /// Brief summary
    #[arg(long)]
    pub brief: Option<String>,
    /// Detailed summary
    #[arg(long)]
    pub detailed: Option<String>,
    /// Comma-separated topics
    #[arg(long)]
    pub topics: Option<String>,
    /// Comma-separated key decisions
    #[arg(long)]
    pub decisions: Option<String>,
    /// Comma-separated problems solved
    #[arg(long)]
    pub problems: Option<String>,
    /// Comma-separated technologies
    #[arg(long)]
    pub technologies: Option<String>,
    /// success, partial or abandoned
    #[arg(long)]
    pub outcome: Option<Outcome>,
    #[arg(long)]
    pub user_note: Option<String>,
    /// JSON file with the full session, or '-' for stdin
    #[arg(long, value_name = "FILE")]
    pub json: Option<String>,
    /// Automatic save: skip when a rich session for the project was saved recently
    #[arg(long)]
    pub auto: bool,
    /// Dedup window in minutes (defaults to the configured value)
    #[arg(long, value_name = "MINUTES")]
    pub dedup_window: Option<u32>,
}

pub fn save(config: &ContextMemoryConfig, args: SaveArgs) -> Result<()> {
    let store = RecordStore::new(Database::from_config(config));
    let window = args
        .dedup_window
        .unwrap_or(config.auto_save.dedup_window_minutes);

    let mut input = match &args.json {
        Some(source) => {
            let raw = super::read_json_source(source)?;
            let origin = if source == "-" { "stdin" } else { source.as_str() };
            let mut input: SessionInput = serde_json::from_str(&raw)
                .with_context(|| format!("invalid session JSON in {origin}"))?;
            if input.project_path.is_none() {
                input.project_path = args.project_path.clone();
            }
            input
        }
        None => input_from_flags(&args)?,
    };

    if args.auto {
        if let Some(path) = input.project_path.as_deref() {
            if store.should_skip_auto_save(path, window)? {
                tracing::info!(project = path, window, "auto-save skipped");
                return super::print_json(&json!({
                    "skipped": true,
                    "reason": "rich session exists within dedup window",
                }));
            }
        }
        input
            .metadata
            .get_or_insert_with(Default::default)
            .insert("auto_save".into(), json!(true));
    }

    let result = store.save_full_session(&input)?;
    super::print_json(&result)
}

fn input_from_flags(args: &SaveArgs) -> Result<SessionInput> {
    let Some(session_id) = args.session_id.clone() else {
        bail!("--session-id is required when --json is not provided");
    };

    let summary = args.brief.as_ref().map(|brief| SummaryPatch {
        brief: Some(brief.clone()),
        detailed: args.detailed.clone(),
        key_decisions: args.decisions.as_deref().map(split_list),
        problems_solved: args.problems.as_deref().map(split_list),
        technologies: args.technologies.as_deref().map(split_list),
        outcome: args.outcome,
        user_note: None,
    });

    Ok(SessionInput {
        session_id,
        project_path: args.project_path.clone(),
        summary,
        topics: args.topics.as_deref().map(split_list).unwrap_or_default(),
        user_note: args.user_note.clone(),
        ..Default::default()
    })
}

fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn split_list_trims_and_drops_empties() {
        assert_eq!(split_list("rust, sqlite,,fts5 "), vec!["rust", "sqlite", "fts5"]);
        assert!(split_list("").is_empty());
    }

    #[test]
    fn flags_without_session_id_are_rejected() {
        let args = SaveArgs {
            session_id: None,
            project_path: None,
            brief: Some("x".into()),
            detailed: None,
            topics: None,
            decisions: None,
            problems: None,
            technologies: None,
            outcome: None,
            user_note: None,
            json: None,
            auto: false,
            dedup_window: None,
        };
        assert!(input_from_flags(&args).is_err());
    }
}
