//! CLI retention commands: `prune` for sessions and `prune-checkpoints`.

use anyhow::{bail, Result};

use context_memory::config::ContextMemoryConfig;
use context_memory::db::Database;
use context_memory::memory::retention::RetentionEngine;

/// Remove sessions older than `max_age` days or beyond the `max_sessions` newest.
pub fn prune(
    config: &ContextMemoryConfig,
    max_age: Option<u32>,
    max_sessions: Option<usize>,
    dry_run: bool,
) -> Result<()> {
    if max_age.is_none() && max_sessions.is_none() {
        bail!("specify --max-age and/or --max-sessions");
    }

    let engine = RetentionEngine::new(Database::from_config(config));
    let result = engine.prune_sessions(max_age, max_sessions, dry_run)?;

    if result.sessions.is_empty() {
        println!("No sessions to prune.");
        return Ok(());
    }

    if dry_run {
        println!(
            "Would prune {} session(s) (dry run, nothing deleted):\n",
            result.sessions.len()
        );
    } else {
        println!(
            "Pruned {} session(s) and {} checkpoint(s):\n",
            result.pruned, result.checkpoints_removed
        );
    }
    println!("{:<8} {:<28} {:<30} {}", "ID", "Created", "Session", "Project");
    println!("{}", "-".repeat(90));
    for s in &result.sessions {
        println!(
            "{:<8} {:<28} {:<30} {}",
            s.id,
            s.created_at,
            s.session_id,
            s.project_path.as_deref().unwrap_or("-")
        );
    }

    Ok(())
}

/// Trim checkpoints to `keep` per session and drop those older than `max_age` days.
pub fn prune_checkpoints(
    config: &ContextMemoryConfig,
    keep: Option<usize>,
    max_age: Option<u32>,
    dry_run: bool,
) -> Result<()> {
    let keep = keep.unwrap_or(config.retention.checkpoints_per_session);
    let max_age = max_age.or(config.retention.checkpoint_max_age_days);

    let engine = RetentionEngine::new(Database::from_config(config));
    let result = engine.prune_checkpoints(keep, max_age, dry_run)?;

    if result.checkpoints.is_empty() {
        println!("No checkpoints to prune.");
        return Ok(());
    }

    if dry_run {
        println!(
            "Would remove {} checkpoint(s) (dry run, nothing deleted):",
            result.checkpoints.len()
        );
    } else {
        println!("Removed {} checkpoint(s):", result.pruned);
    }
    for c in &result.checkpoints {
        println!("  {} #{} ({})", c.session_id, c.checkpoint_number, c.created_at);
    }

    Ok(())
}
