//! MCP server initialization for the stdio transport.

use anyhow::Result;
use context_memory::config::ContextMemoryConfig;
use context_memory::db::{migrations, Database};
use rmcp::ServiceExt;
use std::sync::Arc;

use crate::tools::ContextTools;

/// Bring an existing database up to the current schema before serving. A missing file
/// is left alone; the first write or `context_init` creates it.
fn prepare_database(config: &ContextMemoryConfig) -> Result<Database> {
    let db = Database::from_config(config);
    if db.exists() {
        let conn = db.open_read_write()?;
        let version = migrations::current_version(&conn)?;
        tracing::info!(db = %db.path().display(), version, "database ready");
    } else {
        tracing::info!(db = %db.path().display(), "no database yet; it will be created on first save");
    }
    Ok(db)
}

/// Start the MCP server over stdio transport.
pub async fn serve_stdio(config: ContextMemoryConfig) -> Result<()> {
    tracing::info!("starting context-memory MCP server on stdio");

    let db = prepare_database(&config)?;
    let tools = ContextTools::new(db, Arc::new(config));
    let transport = rmcp::transport::stdio();

    let server = tools.serve(transport).await?;
    tracing::info!("MCP server running, waiting for client");

    server.waiting().await?;
    tracing::info!("MCP server shut down");

    Ok(())
}
