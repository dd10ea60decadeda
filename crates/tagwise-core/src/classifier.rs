//! Batched AI categorization of unresolved products
//!
//! Products that neither the tag table nor the embedding matcher could resolve
//! are sent to a model in fixed-size batches. Each batch is one request built
//! from the `categorize_products` prompt; the reply is parsed into
//! `product-tag` pairs and written back to the tag table.

use std::collections::HashMap;

use tracing::{debug, info, warn};

use crate::ai::parsing::parse_tag_suggestions;
use crate::ai::AIBackend;
use crate::config::PipelineConfig;
use crate::embedding::Embedder;
use crate::error::Result;
use crate::models::{Category, TagSource, TagSuggestion, UnresolvedProduct};
use crate::prompts::{Prompt, PromptId, PromptLibrary};
use crate::store::TagStore;

/// Result of classifying one batch
#[derive(Debug, Clone, PartialEq)]
pub enum BatchOutcome {
    /// At least one usable pair came back
    Classified(Vec<TagSuggestion>),
    /// Transport error, bad status, or a reply with no usable pairs
    Failed(String),
}

/// Anything that can suggest tags for a batch of products
pub trait TagClassifier {
    fn classify_batch(&self, batch: &[UnresolvedProduct]) -> BatchOutcome;
}

/// Render products as `{name: amount, ...}` with two decimals
pub fn format_products(batch: &[UnresolvedProduct]) -> String {
    let pairs: Vec<String> = batch
        .iter()
        .map(|p| format!("{}: {:.2}", p.product, p.avg_amount))
        .collect();
    format!("{{{}}}", pairs.join(", "))
}

/// Classifier backed by a model completion endpoint
pub struct AIFallbackClassifier<B: AIBackend> {
    backend: B,
    prompt: Prompt,
    travel_min: f64,
    travel_max: f64,
}

impl<B: AIBackend> AIFallbackClassifier<B> {
    pub fn new(backend: B, prompts: &mut PromptLibrary, config: &PipelineConfig) -> Result<Self> {
        let prompt = prompts.get(PromptId::CategorizeProducts)?.clone();
        if prompt.is_override {
            info!(
                "Using prompt override {:?} (v{})",
                prompt.override_path, prompt.metadata.version
            );
        }
        Ok(Self {
            backend,
            prompt,
            travel_min: config.travel_min_amount,
            travel_max: config.travel_max_amount,
        })
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Full request text for a batch
    pub fn render_request(&self, batch: &[UnresolvedProduct]) -> String {
        let mut vars = HashMap::new();
        vars.insert("labels", Category::label_list());
        vars.insert("travel_min", self.travel_min.to_string());
        vars.insert("travel_max", self.travel_max.to_string());
        vars.insert("products", format_products(batch));

        let user = self.prompt.render_user(&vars);
        match self.prompt.system_section() {
            Some(system) => format!("{}\n\n{}", system.trim(), user.trim()),
            None => user.trim().to_string(),
        }
    }
}

impl<B: AIBackend> TagClassifier for AIFallbackClassifier<B> {
    fn classify_batch(&self, batch: &[UnresolvedProduct]) -> BatchOutcome {
        if batch.is_empty() {
            return BatchOutcome::Classified(Vec::new());
        }

        let request = self.render_request(batch);
        let reply = match self
            .backend
            .complete(&request, self.prompt.metadata.temperature)
        {
            Ok(reply) => reply,
            Err(e) => return BatchOutcome::Failed(e.to_string()),
        };
        debug!("Categorization reply from {}: {}", self.backend.model(), reply);

        let suggestions = parse_tag_suggestions(&reply);
        if suggestions.is_empty() {
            return BatchOutcome::Failed("reply contained no product-tag pairs".into());
        }
        BatchOutcome::Classified(suggestions)
    }
}

/// Totals from running every batch
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassificationSummary {
    pub batches: usize,
    pub failed_batches: usize,
    /// Tag rows written
    pub tagged: usize,
    /// Suggestions outside their batch, or naming a product that is unknown or already tagged
    pub ignored: usize,
}

/// Write suggestions to the tag table
///
/// With an embedder, products lacking an embedding get one in the same write;
/// an embedding failure only costs the embedding, never the tag.
pub fn persist_suggestions(
    store: &dyn TagStore,
    embedder: Option<&dyn Embedder>,
    session_id: &str,
    suggestions: &[TagSuggestion],
) -> Result<(usize, usize)> {
    let mut embeddings: HashMap<String, Vec<f32>> = HashMap::new();
    if let Some(embedder) = embedder {
        let mut missing = Vec::new();
        for s in suggestions {
            if store.stored_embedding(session_id, &s.product)?.is_none() {
                missing.push(s.product.clone());
            }
        }
        if !missing.is_empty() {
            match embedder.embed(&missing) {
                Ok(vectors) => embeddings.extend(missing.into_iter().zip(vectors)),
                Err(e) => warn!("Could not embed classified products: {}", e),
            }
        }
    }

    let mut tagged = 0;
    let mut ignored = 0;
    for s in suggestions {
        let embedding = embeddings.get(s.product.as_str()).map(Vec::as_slice);
        if store.store_tag(session_id, &s.product, &s.tag, TagSource::Ai, embedding)? {
            tagged += 1;
        } else {
            warn!("Ignoring tag for unknown or already tagged product {:?}", s.product);
            ignored += 1;
        }
    }
    Ok((tagged, ignored))
}

/// Classify products batch by batch, in order, persisting each batch's tags
///
/// Failed batches are logged and skipped; their products stay untagged.
pub fn classify_unresolved(
    store: &dyn TagStore,
    classifier: &dyn TagClassifier,
    embedder: Option<&dyn Embedder>,
    session_id: &str,
    products: &[UnresolvedProduct],
    batch_size: usize,
) -> Result<ClassificationSummary> {
    let mut summary = ClassificationSummary::default();

    for (index, batch) in products.chunks(batch_size.max(1)).enumerate() {
        summary.batches += 1;
        match classifier.classify_batch(batch) {
            BatchOutcome::Classified(suggestions) => {
                let (in_batch, stray): (Vec<_>, Vec<_>) = suggestions
                    .into_iter()
                    .partition(|s| batch.iter().any(|p| p.product == s.product));
                for s in &stray {
                    warn!("Ignoring tag for {:?}, not part of batch {}", s.product, index + 1);
                }

                let (tagged, ignored) =
                    persist_suggestions(store, embedder, session_id, &in_batch)?;
                info!(
                    "Batch {}: {} of {} products tagged",
                    index + 1,
                    tagged,
                    batch.len()
                );
                summary.tagged += tagged;
                summary.ignored += ignored + stray.len();
            }
            BatchOutcome::Failed(reason) => {
                warn!("Batch {} failed, skipping: {}", index + 1, reason);
                summary.failed_batches += 1;
            }
        }
    }

    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockBackend;

    fn product(name: &str, amount: f64) -> UnresolvedProduct {
        UnresolvedProduct {
            product: name.into(),
            avg_amount: amount,
        }
    }

    fn classifier(mock: MockBackend) -> AIFallbackClassifier<MockBackend> {
        let mut prompts = PromptLibrary::embedded_only();
        AIFallbackClassifier::new(mock, &mut prompts, &PipelineConfig::default()).unwrap()
    }

    #[test]
    fn test_format_products() {
        let batch = vec![product("Airtel", 499.0), product("Raj Kumar", 1234.5)];
        assert_eq!(format_products(&batch), "{Airtel: 499.00, Raj Kumar: 1234.50}");
        assert_eq!(format_products(&[]), "{}");
    }

    #[test]
    fn test_request_carries_labels_bounds_and_products() {
        let c = classifier(MockBackend::new());
        let request = c.render_request(&[product("Airtel", 499.0)]);

        assert!(request.contains(&Category::label_list()));
        assert!(request.contains("between 80 and 350"));
        assert!(request.contains("Products: {Airtel: 499.00}"));
        assert!(request.contains("ProductName-Tag"));
        assert!(!request.contains("{{"));
    }

    #[test]
    fn test_airtel_classified_as_bills() {
        let c = classifier(MockBackend::new());
        let outcome = c.classify_batch(&[product("Airtel", 499.0)]);
        assert_eq!(
            outcome,
            BatchOutcome::Classified(vec![TagSuggestion {
                product: "Airtel".into(),
                tag: "Bills".into(),
            }])
        );
    }

    #[test]
    fn test_transport_failure_is_failed_batch() {
        let mock = MockBackend::new();
        mock.push_failure("connection refused");
        let c = classifier(mock);
        match c.classify_batch(&[product("Airtel", 499.0)]) {
            BatchOutcome::Failed(reason) => assert!(reason.contains("connection refused")),
            other => panic!("expected failure, got {:?}", other),
        }
    }

    #[test]
    fn test_reply_without_pairs_is_failed_batch() {
        let mock = MockBackend::new();
        mock.push_reply("I am not sure what these are.");
        let c = classifier(mock);
        assert!(matches!(
            c.classify_batch(&[product("Airtel", 499.0)]),
            BatchOutcome::Failed(_)
        ));
    }

    #[test]
    fn test_empty_batch_makes_no_call() {
        let mock = MockBackend::new();
        let c = classifier(mock.clone());
        assert_eq!(c.classify_batch(&[]), BatchOutcome::Classified(Vec::new()));
        assert_eq!(mock.completion_calls(), 0);
    }

    /// Replays one reply for every batch
    struct ReplyClassifier(&'static str);

    impl TagClassifier for ReplyClassifier {
        fn classify_batch(&self, _batch: &[UnresolvedProduct]) -> BatchOutcome {
            BatchOutcome::Classified(parse_tag_suggestions(self.0))
        }
    }

    #[test]
    fn test_suggestions_outside_batch_are_ignored() {
        let db = crate::db::Database::in_memory().unwrap();
        let sid = db.create_session("alice", 1).unwrap().session_id;
        db.register_products(&sid, &["Airtel", "Zomato"]).unwrap();

        let reply = ReplyClassifier("Airtel-Bills\nZomato-Food");
        let products = vec![product("Airtel", 499.0), product("Zomato", 400.0)];
        let summary = classify_unresolved(&db, &reply, None, &sid, &products, 1).unwrap();

        assert_eq!(summary.batches, 2);
        assert_eq!(summary.tagged, 2);
        assert_eq!(summary.ignored, 2);
        assert_eq!(
            db.get_product_tag(&sid, "Zomato").unwrap().unwrap().tag.as_deref(),
            Some("Food")
        );
    }

    #[test]
    fn test_persist_skips_already_tagged_product() {
        let db = crate::db::Database::in_memory().unwrap();
        let sid = db.create_session("alice", 1).unwrap().session_id;
        db.register_products(&sid, &["Zomato"]).unwrap();
        db.retag_product(&sid, "Zomato", "Dineout").unwrap();

        let suggestions = parse_tag_suggestions("Zomato-Food");
        let (tagged, ignored) = persist_suggestions(&db, None, &sid, &suggestions).unwrap();
        assert_eq!((tagged, ignored), (0, 1));

        let row = db.get_product_tag(&sid, "Zomato").unwrap().unwrap();
        assert_eq!(row.tag.as_deref(), Some("Dineout"));
        assert_eq!(row.source, Some(TagSource::Manual));
    }
}
