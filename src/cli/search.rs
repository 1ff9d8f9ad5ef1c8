use anyhow::Result;
use serde_json::json;

use context_memory::config::ContextMemoryConfig;
use context_memory::db::Database;
use context_memory::memory::format::{format_results_markdown, truncate_text};
use context_memory::memory::search::{SearchEngine, SearchOptions};

pub struct SearchArgs {
    pub query: String,
    pub project: Option<String>,
    pub detailed: bool,
    pub limit: Option<usize>,
    pub messages: bool,
    pub json: bool,
}

/// Run a search from the terminal.
pub fn search(config: &ContextMemoryConfig, args: &SearchArgs) -> Result<()> {
    let db = Database::from_config(config);
    let engine = SearchEngine::new(db.clone(), SearchOptions::from(&config.search));
    let limit = args.limit.unwrap_or(config.search.default_limit);

    if args.messages {
        let hits = engine.search_messages(&args.query, args.project.as_deref(), limit)?;
        if args.json {
            return super::print_json(&json!({
                "query": args.query,
                "result_count": hits.len(),
                "messages": hits,
            }));
        }
        if hits.is_empty() {
            println!("No matching messages found.");
            return Ok(());
        }
        println!("Found {} message(s)\n", hits.len());
        for (i, hit) in hits.iter().enumerate() {
            println!(
                "  {}. [{}] session {} #{} (score: {:.4})",
                i + 1,
                hit.role,
                hit.session_id,
                hit.sequence,
                hit.relevance,
            );
            println!("     {}", truncate_text(&hit.content, 160));
            println!();
        }
        return Ok(());
    }

    let response = engine.full_search(&args.query, args.project.as_deref(), args.detailed, limit)?;

    if args.json {
        return super::print_json(&response);
    }
    println!("{}", format_results_markdown(&response, args.detailed, db.exists()));
    Ok(())
}
