use anyhow::Result;
use serde_json::json;

use context_memory::config::ContextMemoryConfig;
use context_memory::db::Database;
use context_memory::memory::stats;

/// Display store statistics in the terminal.
pub fn stats(config: &ContextMemoryConfig, as_json: bool) -> Result<()> {
    let db = Database::from_config(config);

    let Some(response) = stats::get_stats(&db)? else {
        if as_json {
            super::print_json(&json!({}))?;
        } else {
            println!("No context database found at {}", db.path().display());
        }
        return Ok(());
    };

    let projects = stats::list_projects(&db)?;
    let topics = stats::topic_counts(&db, 10)?;
    let outcomes = stats::outcome_counts(&db)?;
    let technologies = stats::technology_counts(&db, 10)?;

    if as_json {
        return super::print_json(&json!({
            "stats": response,
            "projects": projects,
            "topics": topics,
            "outcomes": outcomes,
            "technologies": technologies,
        }));
    }

    println!("Context Memory Statistics");
    println!("{}", "=".repeat(40));
    for (table, count) in &response.tables {
        println!("  {:<22} {}", table, count);
    }
    println!();
    println!("Database size:         {}", super::format_bytes(response.db_size_bytes));
    println!("Schema version:        {}", response.schema_version);

    if !projects.is_empty() {
        println!();
        println!("Projects:");
        for p in &projects {
            println!("  {:<6} {}", p.session_count, p.project_path);
        }
    }

    if !topics.is_empty() {
        println!();
        println!("Top topics:");
        for t in &topics {
            println!("  {:<6} {}", t.count, t.topic);
        }
    }

    if !outcomes.is_empty() {
        println!();
        println!("Outcomes:");
        for o in &outcomes {
            println!("  {:<12} {}", o.outcome, o.count);
        }
    }

    if !technologies.is_empty() {
        println!();
        println!("Technologies:");
        for t in &technologies {
            println!("  {:<6} {}", t.count, t.technology);
        }
    }

    Ok(())
}
