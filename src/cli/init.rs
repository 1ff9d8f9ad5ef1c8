//! CLI `init` command: create, recreate or verify the database.

use anyhow::{bail, Result};

use context_memory::config::ContextMemoryConfig;
use context_memory::db::schema::{self, InitStatus};
use context_memory::db::Database;

pub fn init(config: &ContextMemoryConfig, force: bool, verify: bool) -> Result<()> {
    let db = Database::from_config(config);

    if verify {
        return verify_only(&db);
    }

    match schema::initialize(&db, force)? {
        InitStatus::Created => println!("Database initialized at {}", db.path().display()),
        InitStatus::Recreated => println!("Database recreated at {}", db.path().display()),
        InitStatus::AlreadyExists => {
            println!("Database already exists at {}", db.path().display());
            println!("Use --force to recreate it (all saved sessions will be lost).");
        }
    }
    Ok(())
}

fn verify_only(db: &Database) -> Result<()> {
    if !db.exists() {
        println!("Database: not found at {}", db.path().display());
        println!("Run `context-memory init` to create it.");
        return Ok(());
    }

    let report = schema::verify_schema(db)?;

    println!("Database:          {}", db.path().display());
    println!("File size:         {}", super::format_bytes(db.file_size()));
    println!(
        "Schema version:    {} (expected {})",
        report.schema_version, report.expected_version
    );
    println!("Objects present:   {}", report.existing.len());

    if report.valid {
        println!("Schema check:      PASSED");
        return Ok(());
    }

    println!("Schema check:      FAILED");
    for name in &report.missing {
        println!("  missing: {name}");
    }
    bail!("schema is missing {} object(s)", report.missing.len())
}
