//! Statement import and tag resolution commands

use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};
use tagwise_core::ai::AIClient;
use tagwise_core::classifier::AIFallbackClassifier;
use tagwise_core::db::Database;
use tagwise_core::import::parse_statement_csv;
use tagwise_core::pipeline::{ClassificationPipeline, ResolutionReport};
use tagwise_core::{PipelineConfig, PromptLibrary};

/// Build the classifier for the AI stage, if a client is available
fn build_classifier(
    client: Option<&AIClient>,
    config: &PipelineConfig,
) -> Result<Option<AIFallbackClassifier<AIClient>>> {
    match client {
        Some(client) => {
            let mut prompts = PromptLibrary::new();
            let classifier = AIFallbackClassifier::new(client.clone(), &mut prompts, config)
                .context("Failed to load categorization prompt")?;
            Ok(Some(classifier))
        }
        None => Ok(None),
    }
}

pub fn cmd_import(
    db: &Database,
    session_id: &str,
    file: &Path,
    enable_ai: bool,
    client: Option<&AIClient>,
    config: &PipelineConfig,
) -> Result<()> {
    println!("📥 Importing {}...", file.display());

    let reader =
        File::open(file).with_context(|| format!("Failed to open {}", file.display()))?;
    let rows = parse_statement_csv(reader).context("Failed to parse statement")?;
    println!("   Found {} debit transactions", rows.len());

    if enable_ai && client.is_none() {
        println!("   💡 Tip: Set OPENAI_COMPATIBLE_HOST or OLLAMA_HOST to enable AI categorization");
    }

    let classifier = build_classifier(client, config)?;
    let mut pipeline = ClassificationPipeline::new(db, config.clone());
    if let Some(client) = client {
        pipeline = pipeline.with_embedder(client);
    }
    if let Some(classifier) = &classifier {
        pipeline = pipeline.with_classifier(classifier);
    }

    let report = pipeline
        .process_upload(session_id, &rows, enable_ai)
        .context("Import failed")?;

    println!();
    println!("📊 Import Results");
    println!("   ─────────────────────────────");
    println!("   Transactions stored: {}", report.ingest.transactions_inserted);
    println!(
        "   Products: {} ({} new)",
        report.ingest.distinct_products, report.ingest.products_registered
    );
    print_resolution(&report.resolution);

    Ok(())
}

pub fn cmd_resolve(
    db: &Database,
    session_id: &str,
    enable_ai: bool,
    client: Option<&AIClient>,
    config: &PipelineConfig,
) -> Result<()> {
    println!("🏷️  Resolving tags for session {}...", session_id);

    let classifier = build_classifier(client, config)?;
    let mut pipeline = ClassificationPipeline::new(db, config.clone());
    if let Some(client) = client {
        pipeline = pipeline.with_embedder(client);
    }
    if let Some(classifier) = &classifier {
        pipeline = pipeline.with_classifier(classifier);
    }

    let report = pipeline
        .resolve(session_id, enable_ai)
        .context("Resolution failed")?;

    println!();
    print_resolution(&report);

    Ok(())
}

fn print_resolution(report: &ResolutionReport) {
    println!("   By embedding match: {}", report.embedding_matches);
    if report.ai_batches > 0 {
        println!(
            "   By AI: {} ({} batches, {} failed)",
            report.ai_tagged, report.ai_batches, report.ai_failed_batches
        );
    }
    println!("   Transactions tagged: {}", report.transactions_tagged);

    if report.unresolved_after > 0 {
        println!();
        println!(
            "⚠️  {} products still untagged. Run with --ai, upload tags, or use 'tagwise retag'.",
            report.unresolved_after
        );
    } else {
        println!();
        println!("✅ Every product is tagged");
    }
}
