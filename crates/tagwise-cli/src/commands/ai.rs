//! AI backend command implementations

use anyhow::Result;
use tagwise_core::ai::{AIBackend, AIClient};
use tagwise_core::classifier::{AIFallbackClassifier, BatchOutcome, TagClassifier};
use tagwise_core::models::UnresolvedProduct;
use tagwise_core::{PipelineConfig, PromptLibrary};

/// Check the configured AI backend and categorize a few products
pub fn cmd_ai_test(
    client: Option<AIClient>,
    product: Option<&str>,
    config: &PipelineConfig,
) -> Result<()> {
    println!("🔍 Testing AI backend...\n");

    let Some(client) = client else {
        println!("  ⚠️  No AI backend configured");
        println!("\nTo set one up:");
        println!("  export AI_BACKEND=openai_compatible OPENAI_COMPATIBLE_HOST=https://api.openai.com");
        println!("  export OPENAI_COMPATIBLE_API_KEY=sk-...");
        println!("or");
        println!("  export AI_BACKEND=ollama OLLAMA_HOST=http://localhost:11434");
        return Ok(());
    };

    println!("  Host:            {}", client.host());
    println!("  Model:           {}", client.model());
    println!("  Embedding model: {}\n", client.embedding_model());

    print!("Checking availability... ");
    if client.health_check() {
        println!("✅ Connected");
    } else {
        println!("❌ Failed");
        println!("\n⚠️  Could not reach {}", client.host());
        return Ok(());
    }

    let samples: Vec<UnresolvedProduct> = match product {
        Some(p) => vec![UnresolvedProduct {
            product: p.to_string(),
            avg_amount: 0.0,
        }],
        None => vec![
            ("Airtel", 499.0),
            ("Zomato", 420.0),
            ("Uber India", 212.0),
            ("Raj Kumar", 1500.0),
        ]
        .into_iter()
        .map(|(p, a)| UnresolvedProduct {
            product: p.to_string(),
            avg_amount: a,
        })
        .collect(),
    };

    println!("\n📋 Testing categorization...\n");
    let mut prompts = PromptLibrary::new();
    let classifier = AIFallbackClassifier::new(client.clone(), &mut prompts, config)?;
    match classifier.classify_batch(&samples) {
        BatchOutcome::Classified(suggestions) => {
            for s in suggestions {
                println!("  \"{}\" → {}", s.product, s.tag);
            }
        }
        BatchOutcome::Failed(reason) => println!("  ❌ Error: {}", reason),
    }

    println!("\n🧭 Testing embeddings...\n");
    let texts: Vec<String> = samples.iter().map(|p| p.product.clone()).collect();
    match client.embed(&texts) {
        Ok(vectors) => println!(
            "  ✅ {} vectors of dimension {}",
            vectors.len(),
            vectors.first().map(Vec::len).unwrap_or(0)
        ),
        Err(e) => println!("  ❌ Error: {}", e),
    }

    Ok(())
}
