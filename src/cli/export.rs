use anyhow::Result;
use serde::Serialize;

use context_memory::config::ContextMemoryConfig;
use context_memory::db::Database;
use context_memory::memory::search::{SearchEngine, SearchOptions};
use context_memory::memory::types::SessionResult;

/// Export format: every session, fully hydrated, newest first.
#[derive(Debug, Serialize)]
struct ExportData {
    exported_at: String,
    total: i64,
    sessions: Vec<SessionResult>,
}

/// Export all sessions as JSON to stdout.
pub fn export(config: &ContextMemoryConfig, page_size: u32) -> Result<()> {
    let engine = SearchEngine::new(Database::from_config(config), SearchOptions::from(&config.search));

    let mut sessions = Vec::new();
    let mut page = 1;
    let total = loop {
        let batch = engine.export_page(page, page_size)?;
        sessions.extend(batch.sessions);
        if !batch.has_more {
            break batch.total;
        }
        page += 1;
    };

    let data = ExportData {
        exported_at: context_memory::db::now(),
        total,
        sessions,
    };
    super::print_json(&data)?;

    eprintln!("Exported {} sessions.", data.sessions.len());
    Ok(())
}
