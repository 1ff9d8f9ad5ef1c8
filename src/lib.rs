//! Local context memory for coding-assistant sessions: persistent, searchable session
//! records in a single SQLite file.
//!
//! Each session stores its raw messages, a structured summary, topic tags and code
//! snippets. Summaries, topics, snippets and messages are mirrored into FTS5 indexes
//! kept in sync by triggers, so free-text queries stay fast as the store grows.
//!
//! | Component | Purpose |
//! |-----------|---------|
//! | **Schema Manager** ([`db::schema`], [`db::migrations`]) | Create, verify and migrate the schema |
//! | **Connection Provider** ([`db::Database`]) | Read-only and read-write handles with consistent pragmas |
//! | **Record Store** ([`memory::store`]) | Idempotent session upserts and child-row writes |
//! | **Search Engine** ([`memory::search`]) | Two-tier ranked discovery, then full hydration |
//! | **Retention Engine** ([`memory::retention`]) | Age/count pruning with index repair |
//! | **Checkpoint Engine** ([`memory::checkpoint`]) | Full-transcript snapshots before compaction |
//!
//! # Modules
//!
//! - [`config`]: Configuration loading from TOML files and environment variables
//! - [`db`]: Connection handling, schema and migrations
//! - [`error`]: The library error type
//! - [`memory`]: Store, search, retention, checkpoints and stats

pub mod config;
pub mod db;
pub mod error;
pub mod memory;

pub use error::{ContextError, Result};
