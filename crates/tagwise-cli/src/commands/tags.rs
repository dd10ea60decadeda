//! Product tag command implementations

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tagwise_core::ai::AIClient;
use tagwise_core::db::{Database, ProductTagFilter};
use tagwise_core::import::parse_product_tags_csv;
use tagwise_core::{backfill_embeddings, PipelineConfig};

use super::truncate;

pub fn cmd_tags_list(
    db: &Database,
    session_id: &str,
    search: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    db.require_active_session(session_id)?;
    let filter = ProductTagFilter {
        search: search.map(str::to_string),
        limit,
        offset,
    };
    let tags = db.list_product_tags(session_id, &filter)?;

    if tags.is_empty() {
        println!("No product tags found.");
        return Ok(());
    }

    println!();
    println!("🏷️  Product Tags");
    println!("   ─────────────────────────────────────────────────────────────");
    for t in &tags {
        println!(
            "   {:<36} {:<14} {}",
            truncate(&t.product, 36),
            t.tag.as_deref().unwrap_or("-"),
            t.source.map(|s| s.as_str()).unwrap_or("")
        );
    }
    println!();
    println!("   Showing {} (offset {})", tags.len(), offset);

    Ok(())
}

pub fn cmd_tags_upload(
    db: &Database,
    session_id: &str,
    file: &Path,
    client: Option<&AIClient>,
    config: &PipelineConfig,
) -> Result<()> {
    db.require_active_session(session_id)?;

    let reader =
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let pairs = parse_product_tags_csv(reader).context("Failed to parse product tags")?;
    let written = db.upsert_uploaded_tags(session_id, &pairs)?;
    let synced = db.sync_transaction_tags(session_id)?;

    println!("✅ Uploaded {} product tags ({} transactions tagged)", written, synced);

    if let Some(client) = client {
        let stored = backfill_embeddings(db, client, session_id, config.batch_size)
            .context("Failed to store embeddings")?;
        println!("   Embedded {} products for similarity matching", stored);
    }

    Ok(())
}

pub fn cmd_retag_product(db: &Database, session_id: &str, product: &str, tag: &str) -> Result<()> {
    db.require_active_session(session_id)?;
    let result = db.retag_product(session_id, product, tag)?;
    println!(
        "✅ Tagged '{}' as {} ({} transactions updated)",
        result.product, tag, result.transactions_updated
    );
    Ok(())
}

pub fn cmd_retag_transaction(
    db: &Database,
    session_id: &str,
    transaction_id: i64,
    tag: &str,
    apply_to_all: bool,
) -> Result<()> {
    db.require_active_session(session_id)?;
    let result = db.retag_transaction(session_id, transaction_id, tag, apply_to_all)?;
    if apply_to_all {
        println!(
            "✅ Tagged '{}' as {} ({} transactions updated)",
            result.product, tag, result.transactions_updated
        );
    } else {
        println!("✅ Tagged transaction {} as {}", transaction_id, tag);
    }
    Ok(())
}
