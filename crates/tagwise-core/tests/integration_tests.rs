//! Integration tests for tagwise-core
//!
//! These tests exercise the full upload → resolve → retag → report workflow.

use std::sync::atomic::{AtomicUsize, Ordering};

use tagwise_core::{
    classifier::{AIFallbackClassifier, BatchOutcome, TagClassifier},
    db::{Database, ProductTagFilter},
    embedding::{find_closest, Embedder},
    import::{parse_product_tags_csv, parse_statement_csv},
    models::{PaymentMode, TagSource, TaggedEmbedding, UnresolvedProduct},
    pipeline::ClassificationPipeline,
    MockBackend, PipelineConfig, PromptLibrary, Result,
};

/// A statement with UPI and POS debits plus one credit row
fn statement_csv() -> &'static str {
    "\
Date,Narration,Value Dt,Withdrawal Amt.,Debit Amount,Credit Amount,Closing Balance
01/03/24,UPI-Airtel-airtel.payu@axis-Recharge,01/03/24,,499.00,0.00,49501
02/03/24,UPI-Zomato-zomato@hdfcbank-Order,02/03/24,,420.00,0.00,49081
05/03/24,UPI-Zomato-zomato@hdfcbank-Order,05/03/24,,380.00,0.00,48701
06/03/24,POS 409999XXXXXX1234 DMART AVENUE,06/03/24,,\"1,250.00\",0.00,47451
07/03/24,NEFT CR-ACME CORP-SALARY,07/03/24,,0.00,90000.00,137451
09/03/24,UPI-Uber India-uber@icici-Ride,09/03/24,,212.00,0.00,137239
"
}

fn config() -> PipelineConfig {
    PipelineConfig::default()
}

fn classifier(mock: MockBackend) -> AIFallbackClassifier<MockBackend> {
    let mut prompts = PromptLibrary::embedded_only();
    AIFallbackClassifier::new(mock, &mut prompts, &config()).expect("prompt should load")
}

/// Classifier that replays a fixed reply for every batch
struct ScriptedClassifier {
    reply: &'static str,
    calls: AtomicUsize,
}

impl TagClassifier for ScriptedClassifier {
    fn classify_batch(&self, _batch: &[UnresolvedProduct]) -> BatchOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let suggestions = tagwise_core::ai::parsing::parse_tag_suggestions(self.reply);
        if suggestions.is_empty() {
            BatchOutcome::Failed("no pairs".into())
        } else {
            BatchOutcome::Classified(suggestions)
        }
    }
}

/// Embedder that maps each known name to a fixed vector
struct TableEmbedder(Vec<(&'static str, Vec<f32>)>);

impl Embedder for TableEmbedder {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        Ok(texts
            .iter()
            .map(|t| {
                self.0
                    .iter()
                    .find(|(name, _)| name == t)
                    .map(|(_, v)| v.clone())
                    .unwrap_or_else(|| vec![0.0, 0.0, 1.0])
            })
            .collect())
    }
}

// =============================================================================
// Pipeline Integration Tests
// =============================================================================

#[test]
fn test_full_upload_workflow() {
    let db = Database::in_memory().expect("Failed to create in-memory database");
    let session = db.create_session("alice", 1).unwrap();
    let sid = session.session_id.as_str();

    let rows = parse_statement_csv(statement_csv().as_bytes()).expect("Failed to parse CSV");
    assert_eq!(rows.len(), 5);

    let mock = MockBackend::new();
    let classifier = classifier(mock.clone());
    let pipeline = ClassificationPipeline::new(&db, config())
        .with_embedder(&mock)
        .with_classifier(&classifier);

    let report = pipeline.process_upload(sid, &rows, true).unwrap();
    assert_eq!(report.ingest.transactions_inserted, 5);
    assert_eq!(report.ingest.distinct_products, 4);
    assert_eq!(report.resolution.unresolved_before, 4);
    assert_eq!(report.resolution.unresolved_after, 0);
    assert_eq!(report.resolution.transactions_tagged, 5);

    let airtel = db.get_product_tag(sid, "Airtel").unwrap().unwrap();
    assert_eq!(airtel.tag.as_deref(), Some("Bills"));
    assert_eq!(airtel.source, Some(TagSource::Ai));
    assert!(airtel.embedding.is_some(), "AI writes store the embedding too");

    let uber = db.list_transactions(sid, Some("Uber India"), 10, 0).unwrap();
    assert_eq!(uber[0].mode, PaymentMode::Upi);
    assert_eq!(uber[0].tag.as_deref(), Some("Travel"));

    let by_tag = db.spending_by_tag(sid).unwrap();
    assert_eq!(by_tag.transaction_count, 5);
    assert_eq!(by_tag.groups[0].name, "Groceries");
    assert_eq!(by_tag.groups[0].amount, 1250.0);
}

#[test]
fn test_airtel_classified_as_bills() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session("alice", 1).unwrap();
    let sid = session.session_id.as_str();
    db.register_products(sid, &["Airtel"]).unwrap();

    let classifier = classifier(MockBackend::new());
    let request = classifier.render_request(&[UnresolvedProduct {
        product: "Airtel".into(),
        avg_amount: 499.0,
    }]);
    assert!(request.contains("Airtel: 499.00"));
    assert!(request.contains("Rent, Bills, Groceries"));

    let pipeline = ClassificationPipeline::new(&db, config()).with_classifier(&classifier);
    pipeline.resolve(sid, true).unwrap();

    let row = db.get_product_tag(sid, "Airtel").unwrap().unwrap();
    assert_eq!(row.tag.as_deref(), Some("Bills"));
}

#[test]
fn test_partial_reply_persists_good_line() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session("alice", 1).unwrap();
    let sid = session.session_id.as_str();
    db.register_products(sid, &["Airtel", "Zomato"]).unwrap();

    let scripted = ScriptedClassifier {
        reply: "Sure! Here you go\nZomato-Food\n",
        calls: AtomicUsize::new(0),
    };
    let pipeline = ClassificationPipeline::new(&db, config()).with_classifier(&scripted);
    let report = pipeline.resolve(sid, true).unwrap();

    assert_eq!(report.ai_tagged, 1);
    assert_eq!(report.unresolved_after, 1);
    assert_eq!(
        db.get_product_tag(sid, "Zomato").unwrap().unwrap().tag.as_deref(),
        Some("Food")
    );
    assert!(db.get_product_tag(sid, "Airtel").unwrap().unwrap().tag.is_none());
}

#[test]
fn test_unknown_product_in_reply_is_ignored() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session("alice", 1).unwrap();
    let sid = session.session_id.as_str();
    db.register_products(sid, &["Airtel"]).unwrap();

    let scripted = ScriptedClassifier {
        reply: "Airtel-Bills\nNetflix-Fun",
        calls: AtomicUsize::new(0),
    };
    let pipeline = ClassificationPipeline::new(&db, config()).with_classifier(&scripted);
    let report = pipeline.resolve(sid, true).unwrap();

    assert_eq!(report.ai_tagged, 1);
    assert!(db.get_product_tag(sid, "Netflix").unwrap().is_none());
}

#[test]
fn test_ai_disabled_makes_no_calls() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session("alice", 1).unwrap();
    let sid = session.session_id.as_str();
    db.register_products(sid, &["Airtel"]).unwrap();

    let scripted = ScriptedClassifier {
        reply: "Airtel-Bills",
        calls: AtomicUsize::new(0),
    };
    let pipeline = ClassificationPipeline::new(&db, config()).with_classifier(&scripted);
    let report = pipeline.resolve(sid, false).unwrap();

    assert_eq!(scripted.calls.load(Ordering::SeqCst), 0);
    assert_eq!(report.unresolved_after, 1);
}

#[test]
fn test_retag_is_scoped_to_session() {
    let db = Database::in_memory().unwrap();
    let alice = db.create_session("alice", 1).unwrap();
    let bob = db.create_session("bob", 1).unwrap();
    let rows = parse_statement_csv(statement_csv().as_bytes()).unwrap();

    let mock = MockBackend::new();
    let classifier = classifier(mock);
    let pipeline = ClassificationPipeline::new(&db, config()).with_classifier(&classifier);
    pipeline.process_upload(&alice.session_id, &rows, true).unwrap();
    pipeline.process_upload(&bob.session_id, &rows, true).unwrap();

    let result = db
        .retag_product(&alice.session_id, "Zomato", "Dineout")
        .unwrap();
    assert!(result.product_row_updated);
    assert_eq!(result.transactions_updated, 2);

    let alice_row = db.get_product_tag(&alice.session_id, "Zomato").unwrap().unwrap();
    assert_eq!(alice_row.tag.as_deref(), Some("Dineout"));
    assert_eq!(alice_row.source, Some(TagSource::Manual));
    for tx in db
        .list_transactions(&alice.session_id, Some("Zomato"), 10, 0)
        .unwrap()
    {
        assert_eq!(tx.tag.as_deref(), Some("Dineout"));
    }

    let bob_row = db.get_product_tag(&bob.session_id, "Zomato").unwrap().unwrap();
    assert_eq!(bob_row.tag.as_deref(), Some("Food"));
    for tx in db
        .list_transactions(&bob.session_id, Some("Zomato"), 10, 0)
        .unwrap()
    {
        assert_eq!(tx.tag.as_deref(), Some("Food"));
    }

    // A later resolve does not undo the manual retag
    pipeline.resolve(&alice.session_id, true).unwrap();
    let alice_row = db.get_product_tag(&alice.session_id, "Zomato").unwrap().unwrap();
    assert_eq!(alice_row.tag.as_deref(), Some("Dineout"));
}

// =============================================================================
// Embedding Matching Tests
// =============================================================================

#[test]
fn test_threshold_boundary_through_pipeline() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session("alice", 1).unwrap();
    let sid = session.session_id.as_str();

    db.upsert_uploaded_tags(sid, &[("Zomato".to_string(), "Food".to_string())])
        .unwrap();
    db.register_products(sid, &["Zomato Ltd", "Swiggy"]).unwrap();

    let embedder = TableEmbedder(vec![
        ("Zomato", vec![1.0, 0.0]),
        ("Zomato Ltd", vec![1.0, 0.0]),
        ("Swiggy", vec![0.6, 0.8]),
    ]);
    tagwise_core::backfill_embeddings(&db, &embedder, sid, 10).unwrap();

    let swiggy_distance = tagwise_core::cosine_distance(&[1.0, 0.0], &[0.6, 0.8]);
    let config = PipelineConfig {
        similarity_threshold: swiggy_distance,
        ..config()
    };
    let pipeline = ClassificationPipeline::new(&db, config).with_embedder(&embedder);
    let report = pipeline.resolve(sid, false).unwrap();

    // Identical vector matches, a distance equal to the threshold does not
    assert_eq!(report.embedding_matches, 1);
    let matched = db.get_product_tag(sid, "Zomato Ltd").unwrap().unwrap();
    assert_eq!(matched.tag.as_deref(), Some("Food"));
    assert_eq!(matched.source, Some(TagSource::Embedding));
    assert!(db.get_product_tag(sid, "Swiggy").unwrap().unwrap().tag.is_none());
    assert!(db.get_embedding(sid, "Swiggy").unwrap().is_some());
}

#[test]
fn test_distance_equal_to_threshold_is_a_miss() {
    let candidates = vec![TaggedEmbedding {
        product: "Zomato".into(),
        tag: "Food".into(),
        embedding: vec![1.0, 0.0],
    }];
    let query = vec![0.92f32, 0.39];
    let distance = tagwise_core::cosine_distance(&query, &candidates[0].embedding);

    assert!(find_closest(&query, &candidates, distance).is_none());
    assert!(find_closest(&query, &candidates, distance + 1e-6).is_some());
    assert!(find_closest(&query, &candidates, 0.08).is_some());
}

#[test]
fn test_uploaded_tags_seed_embedding_matches() {
    let db = Database::in_memory().unwrap();
    let session = db.create_session("alice", 1).unwrap();
    let sid = session.session_id.as_str();

    let pairs = parse_product_tags_csv("Product,Tag\nZOMATO,Dineout\nAirtel,Bills\n".as_bytes())
        .unwrap();
    db.upsert_uploaded_tags(sid, &pairs).unwrap();

    let mock = MockBackend::new();
    let stored = tagwise_core::backfill_embeddings(&db, &mock, sid, 10).unwrap();
    assert_eq!(stored, 2);

    let rows = parse_statement_csv(statement_csv().as_bytes()).unwrap();
    let pipeline = ClassificationPipeline::new(&db, config()).with_embedder(&mock);
    let report = pipeline.process_upload(sid, &rows, false).unwrap();

    // Airtel hits the tag table; Zomato matches ZOMATO by embedding
    assert_eq!(report.ingest.products_already_known, 1);
    assert_eq!(report.resolution.embedding_matches, 1);
    let zomato = db.get_product_tag(sid, "Zomato").unwrap().unwrap();
    assert_eq!(zomato.tag.as_deref(), Some("Dineout"));

    let listed = db
        .list_product_tags(
            sid,
            &ProductTagFilter {
                search: Some("dine".into()),
                ..Default::default()
            },
        )
        .unwrap();
    let names: Vec<&str> = listed.iter().map(|t| t.product.as_str()).collect();
    assert_eq!(names, vec!["ZOMATO", "Zomato"]);
}
