mod cli;
mod server;
mod tools;

use anyhow::Result;
use clap::{Parser, Subcommand};
use context_memory::config::ContextMemoryConfig;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "context-memory",
    version,
    about = "Persistent, searchable context storage across coding sessions"
)]
struct Cli {
    /// Path to a config file (defaults to ~/.claude/context-memory/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create the database, or check its schema
    Init {
        /// Delete and recreate the database
        #[arg(long)]
        force: bool,
        /// Only verify the schema; never create anything
        #[arg(long, conflicts_with = "force")]
        verify: bool,
    },
    /// Show row counts, file size and top projects/topics
    Stats {
        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Save a session from flags or a JSON document
    Save(cli::save::SaveArgs),
    /// Search saved sessions
    Search {
        /// Free-text query
        query: String,
        /// Restrict to one project directory
        #[arg(long)]
        project: Option<String>,
        /// Include full messages and code snippets
        #[arg(long)]
        detailed: bool,
        /// Maximum number of results
        #[arg(long)]
        limit: Option<usize>,
        /// Search individual messages instead of sessions
        #[arg(long)]
        messages: bool,
        /// Print JSON instead of markdown
        #[arg(long)]
        json: bool,
    },
    /// Remove old sessions by age and/or count
    Prune {
        /// Remove sessions older than this many days
        #[arg(long, value_name = "DAYS")]
        max_age: Option<u32>,
        /// Keep only this many newest sessions
        #[arg(long, value_name = "N")]
        max_sessions: Option<usize>,
        /// Show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Trim checkpoints per session and by age
    PruneCheckpoints {
        /// Checkpoints to keep per session (defaults to the configured value)
        #[arg(long, value_name = "N")]
        keep: Option<usize>,
        /// Remove checkpoints older than this many days
        #[arg(long, value_name = "DAYS")]
        max_age: Option<u32>,
        /// Show what would be removed without deleting
        #[arg(long)]
        dry_run: bool,
    },
    /// Save or load pre-compaction checkpoints
    Checkpoint {
        #[command(subcommand)]
        action: CheckpointAction,
    },
    /// Dump every session as JSON to stdout
    Export {
        /// Sessions fetched per page
        #[arg(long, default_value_t = 100)]
        page_size: u32,
    },
    /// Start the MCP server (stdio transport)
    Serve,
}

#[derive(Subcommand)]
enum CheckpointAction {
    /// Store a message list (JSON array of {role, content}) as a new checkpoint
    Save {
        #[arg(long)]
        session_id: String,
        #[arg(long)]
        project_path: Option<String>,
        /// auto or manual
        #[arg(long, default_value = "manual")]
        trigger: String,
        /// File holding the messages, or '-' for stdin
        #[arg(long, value_name = "FILE")]
        json: String,
    },
    /// Print the most recent checkpoint
    Load {
        #[arg(long)]
        session_id: Option<String>,
        #[arg(long)]
        project_path: Option<String>,
        /// Only return the last N messages
        #[arg(long, value_name = "N")]
        last: Option<usize>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => ContextMemoryConfig::load_from(path)?,
        None => ContextMemoryConfig::load()?,
    };

    // Log to stderr so stdout stays clean for JSON output and MCP JSON-RPC.
    let filter = EnvFilter::try_new(&config.server.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Init { force, verify } => cli::init::init(&config, force, verify)?,
        Command::Stats { json } => cli::stats::stats(&config, json)?,
        Command::Save(args) => cli::save::save(&config, args)?,
        Command::Search {
            query,
            project,
            detailed,
            limit,
            messages,
            json,
        } => {
            let opts = cli::search::SearchArgs {
                query,
                project,
                detailed,
                limit,
                messages,
                json,
            };
            cli::search::search(&config, &opts)?
        }
        Command::Prune {
            max_age,
            max_sessions,
            dry_run,
        } => cli::prune::prune(&config, max_age, max_sessions, dry_run)?,
        Command::PruneCheckpoints {
            keep,
            max_age,
            dry_run,
        } => cli::prune::prune_checkpoints(&config, keep, max_age, dry_run)?,
        Command::Checkpoint { action } => match action {
            CheckpointAction::Save {
                session_id,
                project_path,
                trigger,
                json,
            } => cli::checkpoint::save(&config, &session_id, project_path.as_deref(), &trigger, &json)?,
            CheckpointAction::Load {
                session_id,
                project_path,
                last,
            } => cli::checkpoint::load(&config, session_id.as_deref(), project_path.as_deref(), last)?,
        },
        Command::Export { page_size } => cli::export::export(&config, page_size)?,
        Command::Serve => server::serve_stdio(config).await?,
    }

    Ok(())
}
