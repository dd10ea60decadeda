//! Core command implementations and shared utilities
//!
//! This module contains:
//! - `open_db` - Shared utility to open the database
//! - `load_config` - Pipeline config (embedded defaults, override file, env)
//! - `ai_client_from_env` - Optional AI backend
//! - `cmd_init` - Initialize the database

use std::path::Path;

use anyhow::{Context, Result};
use tagwise_core::ai::{AIBackend, AIClient};
use tagwise_core::db::Database;
use tagwise_core::PipelineConfig;

/// Open database with encryption by default, or unencrypted if --no-encrypt
pub fn open_db(db_path: &Path, no_encrypt: bool) -> Result<Database> {
    let path_str = db_path
        .to_str()
        .with_context(|| format!("Database path is not valid UTF-8: {}", db_path.display()))?;
    if no_encrypt {
        Database::new_unencrypted(path_str).context("Failed to open database (unencrypted)")
    } else {
        Database::new(path_str).context("Failed to open database")
    }
}

pub fn load_config() -> Result<PipelineConfig> {
    PipelineConfig::load().context("Failed to load pipeline config")
}

/// AI backend selected by `AI_BACKEND`, if its host is configured
pub fn ai_client_from_env(config: &PipelineConfig) -> Option<AIClient> {
    let client = AIClient::from_env(config.request_timeout);
    match &client {
        Some(c) => tracing::debug!(
            "AI backend at {} (model {}, embeddings {})",
            c.host(),
            c.model(),
            c.embedding_model()
        ),
        None => tracing::debug!("No AI backend configured"),
    }
    client
}

pub fn cmd_init(db_path: &Path, no_encrypt: bool) -> Result<()> {
    println!("🔧 Initializing database...");

    let db = open_db(db_path, no_encrypt)?;
    println!("   Path: {}", db.path());

    if no_encrypt {
        println!("   ⚠️  Encryption: DISABLED (--no-encrypt)");
    } else {
        println!("   🔒 Encryption: ENABLED");
    }

    println!("✅ Database initialized successfully!");
    println!();
    println!("Next steps:");
    println!("  1. Start a session: tagwise session new <username>");
    println!("  2. Import a statement: tagwise import --session <id> --file statement.csv --ai");

    Ok(())
}
