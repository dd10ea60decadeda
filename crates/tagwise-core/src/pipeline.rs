//! Transaction classification pipeline
//!
//! `ingest` parses statement rows, stores them as transactions and registers
//! their products. `resolve` then walks the unresolved products through the
//! tiers in order:
//!
//! 1. tag table (products already tagged are never looked at again)
//! 2. embedding similarity against tagged products in the same session
//! 3. batched AI categorization (opt-in per call)
//!
//! and finally copies product tags onto the session's transactions.

use std::fmt;

use serde::Serialize;
use tracing::{info, warn};

use crate::classifier::{classify_unresolved, TagClassifier};
use crate::config::PipelineConfig;
use crate::db::{Database, RegistrationSummary};
use crate::embedding::{Embedder, EmbeddingMatcher};
use crate::error::{Error, Result};
use crate::models::{NewTransaction, StatementRow};
use crate::narration;

/// Stages a run passes through, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Parsed,
    Registered,
    CacheResolved,
    EmbeddingResolved,
    AiResolved,
    Persisted,
}

impl PipelineStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Parsed => "parsed",
            Self::Registered => "registered",
            Self::CacheResolved => "cache_resolved",
            Self::EmbeddingResolved => "embedding_resolved",
            Self::AiResolved => "ai_resolved",
            Self::Persisted => "persisted",
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of `ingest`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IngestReport {
    pub transactions_inserted: usize,
    /// Distinct products seen in this upload
    pub distinct_products: usize,
    pub products_registered: usize,
    pub products_already_known: usize,
}

/// Outcome of `resolve`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ResolutionReport {
    /// Products with no tag when the run started
    pub unresolved_before: usize,
    pub embedding_matches: usize,
    pub ai_tagged: usize,
    pub ai_batches: usize,
    pub ai_failed_batches: usize,
    /// Products still without a tag after the run
    pub unresolved_after: usize,
    pub transactions_tagged: usize,
    /// Last stage reached
    pub stage: Option<PipelineStage>,
}

/// Outcome of `process_upload`
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct UploadReport {
    pub ingest: IngestReport,
    pub resolution: ResolutionReport,
}

/// Runs statement rows through parsing, registration and tag resolution
pub struct ClassificationPipeline<'a> {
    db: &'a Database,
    classifier: Option<&'a dyn TagClassifier>,
    embedder: Option<&'a dyn Embedder>,
    config: PipelineConfig,
}

impl<'a> ClassificationPipeline<'a> {
    /// Pipeline with no external collaborators (tag table only)
    pub fn new(db: &'a Database, config: PipelineConfig) -> Self {
        Self {
            db,
            classifier: None,
            embedder: None,
            config,
        }
    }

    pub fn with_classifier(mut self, classifier: &'a dyn TagClassifier) -> Self {
        self.classifier = Some(classifier);
        self
    }

    pub fn with_embedder(mut self, embedder: &'a dyn Embedder) -> Self {
        self.embedder = Some(embedder);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Parse rows, store them as transactions and register their products
    pub fn ingest(&self, session_id: &str, rows: &[StatementRow]) -> Result<IngestReport> {
        self.db.require_active_session(session_id)?;

        let transactions: Vec<NewTransaction> = rows
            .iter()
            .map(|row| {
                let parsed = narration::parse(&row.narration);
                NewTransaction {
                    date: row.date,
                    narration: row.narration.clone(),
                    debit_amount: row.debit_amount,
                    product: parsed.product,
                    mode: parsed.mode,
                }
            })
            .collect();
        self.log_stage(session_id, PipelineStage::Parsed);

        let inserted = self.db.insert_transactions(session_id, &transactions)?;

        let mut products: Vec<&str> = transactions.iter().map(|t| t.product.as_str()).collect();
        products.sort_unstable();
        products.dedup();

        let RegistrationSummary {
            registered,
            already_present,
        } = self.db.register_products(session_id, &products)?;
        self.log_stage(session_id, PipelineStage::Registered);

        info!(
            "Ingested {} transactions, {} distinct products ({} new)",
            inserted,
            products.len(),
            registered
        );

        Ok(IngestReport {
            transactions_inserted: inserted,
            distinct_products: products.len(),
            products_registered: registered,
            products_already_known: already_present,
        })
    }

    /// Resolve tags for every untagged product in the session
    ///
    /// Calling it again once everything is tagged does nothing.
    pub fn resolve(&self, session_id: &str, enable_ai: bool) -> Result<ResolutionReport> {
        self.db.require_active_session(session_id)?;
        let mut report = ResolutionReport::default();

        let mut unresolved = self.db.unresolved_products(session_id)?;
        report.unresolved_before = unresolved.len();
        report.stage = Some(PipelineStage::CacheResolved);
        self.log_stage(session_id, PipelineStage::CacheResolved);

        if let Some(embedder) = self.embedder {
            if !unresolved.is_empty() {
                let matcher = EmbeddingMatcher::new(
                    embedder,
                    self.config.similarity_threshold,
                    self.config.batch_size,
                );
                let products: Vec<String> =
                    unresolved.iter().map(|p| p.product.clone()).collect();
                match matcher.resolve(self.db, session_id, &products) {
                    Ok(matches) => {
                        report.embedding_matches = matches.len();
                        unresolved = self.db.unresolved_products(session_id)?;
                    }
                    Err(e @ (Error::Ai(_) | Error::Http(_) | Error::Json(_))) => {
                        warn!("Embedding stage failed, continuing without it: {}", e)
                    }
                    Err(e) => return Err(e),
                }
            }
            report.stage = Some(PipelineStage::EmbeddingResolved);
            self.log_stage(session_id, PipelineStage::EmbeddingResolved);
        }

        if enable_ai {
            match self.classifier {
                Some(classifier) => {
                    if !unresolved.is_empty() {
                        let summary = classify_unresolved(
                            self.db,
                            classifier,
                            self.embedder,
                            session_id,
                            &unresolved,
                            self.config.batch_size,
                        )?;
                        report.ai_tagged = summary.tagged;
                        report.ai_batches = summary.batches;
                        report.ai_failed_batches = summary.failed_batches;
                    }
                    report.stage = Some(PipelineStage::AiResolved);
                    self.log_stage(session_id, PipelineStage::AiResolved);
                }
                None => warn!("AI stage requested but no classifier is configured"),
            }
        }

        report.transactions_tagged = self.db.sync_transaction_tags(session_id)?;
        report.unresolved_after = self.db.unresolved_products(session_id)?.len();
        report.stage = Some(PipelineStage::Persisted);
        self.log_stage(session_id, PipelineStage::Persisted);

        info!(
            "Resolved {} of {} products ({} by embedding, {} by AI)",
            report.unresolved_before.saturating_sub(report.unresolved_after),
            report.unresolved_before,
            report.embedding_matches,
            report.ai_tagged
        );
        Ok(report)
    }

    /// `ingest` followed by `resolve`
    pub fn process_upload(
        &self,
        session_id: &str,
        rows: &[StatementRow],
        enable_ai: bool,
    ) -> Result<UploadReport> {
        let ingest = self.ingest(session_id, rows)?;
        let resolution = self.resolve(session_id, enable_ai)?;
        Ok(UploadReport { ingest, resolution })
    }

    fn log_stage(&self, session_id: &str, stage: PipelineStage) {
        info!("Session {}: stage {} complete", session_id, stage);
    }
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::ai::MockBackend;
    use crate::classifier::{AIFallbackClassifier, BatchOutcome};
    use crate::models::{PaymentMode, TagSource, UnresolvedProduct};
    use crate::prompts::PromptLibrary;

    fn row(day: u32, narration: &str, amount: f64) -> StatementRow {
        StatementRow {
            date: NaiveDate::from_ymd_opt(2024, 3, day).unwrap(),
            narration: narration.into(),
            debit_amount: amount,
        }
    }

    fn sample_rows() -> Vec<StatementRow> {
        vec![
            row(1, "UPI-Airtel-airtel@okicici-Recharge", 499.0),
            row(2, "UPI-Zomato-zomato@hdfc-Order", 420.0),
            row(3, "UPI-Zomato-zomato@hdfc-Order", 380.0),
            row(4, "POS 409999 DMART STORE", 1500.0),
        ]
    }

    fn mock_classifier(mock: MockBackend) -> AIFallbackClassifier<MockBackend> {
        let mut prompts = PromptLibrary::embedded_only();
        AIFallbackClassifier::new(mock, &mut prompts, &PipelineConfig::default()).unwrap()
    }

    struct FailingClassifier;

    impl TagClassifier for FailingClassifier {
        fn classify_batch(&self, _batch: &[UnresolvedProduct]) -> BatchOutcome {
            BatchOutcome::Failed("offline".into())
        }
    }

    #[test]
    fn test_ingest_parses_and_registers() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let pipeline = ClassificationPipeline::new(&db, PipelineConfig::default());

        let report = pipeline.ingest(&session.session_id, &sample_rows()).unwrap();
        assert_eq!(report.transactions_inserted, 4);
        assert_eq!(report.distinct_products, 3);
        assert_eq!(report.products_registered, 3);

        let txs = db
            .list_transactions(&session.session_id, Some("DMART STORE"), 10, 0)
            .unwrap();
        assert_eq!(txs.len(), 1);
        assert_eq!(txs[0].mode, PaymentMode::Pos);

        let again = pipeline.ingest(&session.session_id, &sample_rows()).unwrap();
        assert_eq!(again.products_registered, 0);
        assert_eq!(again.products_already_known, 3);
    }

    #[test]
    fn test_ingest_requires_session() {
        let db = Database::in_memory().unwrap();
        let pipeline = ClassificationPipeline::new(&db, PipelineConfig::default());
        assert!(pipeline.ingest("missing", &sample_rows()).is_err());
    }

    #[test]
    fn test_resolve_without_ai_leaves_products_untagged() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let pipeline = ClassificationPipeline::new(&db, PipelineConfig::default());
        pipeline.ingest(&session.session_id, &sample_rows()).unwrap();

        let report = pipeline.resolve(&session.session_id, false).unwrap();
        assert_eq!(report.unresolved_before, 3);
        assert_eq!(report.unresolved_after, 3);
        assert_eq!(report.transactions_tagged, 0);
        assert_eq!(report.stage, Some(PipelineStage::Persisted));
    }

    #[test]
    fn test_ai_stage_tags_products_and_transactions() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let mock = MockBackend::new();
        let classifier = mock_classifier(mock.clone());
        let pipeline =
            ClassificationPipeline::new(&db, PipelineConfig::default()).with_classifier(&classifier);

        let report = pipeline
            .process_upload(&session.session_id, &sample_rows(), true)
            .unwrap();
        assert_eq!(report.resolution.ai_tagged, 3);
        assert_eq!(report.resolution.ai_batches, 1);
        assert_eq!(report.resolution.transactions_tagged, 4);

        let zomato = db.get_product_tag(&session.session_id, "Zomato").unwrap().unwrap();
        assert_eq!(zomato.tag.as_deref(), Some("Food"));
        assert_eq!(zomato.source, Some(TagSource::Ai));

        // Second run has nothing to do
        let again = pipeline.resolve(&session.session_id, true).unwrap();
        assert_eq!(again.unresolved_before, 0);
        assert_eq!(again.ai_batches, 0);
        assert_eq!(mock.completion_calls(), 1);
    }

    #[test]
    fn test_batches_follow_configured_size() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let mock = MockBackend::new();
        let classifier = mock_classifier(mock.clone());
        let config = PipelineConfig {
            batch_size: 2,
            ..PipelineConfig::default()
        };
        let pipeline = ClassificationPipeline::new(&db, config).with_classifier(&classifier);

        let report = pipeline
            .process_upload(&session.session_id, &sample_rows(), true)
            .unwrap();
        assert_eq!(report.resolution.ai_batches, 2);
        assert_eq!(mock.completion_calls(), 2);
    }

    #[test]
    fn test_failed_batches_are_skipped() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let pipeline =
            ClassificationPipeline::new(&db, PipelineConfig::default()).with_classifier(&FailingClassifier);

        let report = pipeline
            .process_upload(&session.session_id, &sample_rows(), true)
            .unwrap();
        assert_eq!(report.resolution.ai_failed_batches, 1);
        assert_eq!(report.resolution.unresolved_after, 3);
    }

    #[test]
    fn test_embedding_stage_reuses_uploaded_tags() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let sid = session.session_id.as_str();
        let mock = MockBackend::new();
        let classifier = mock_classifier(mock.clone());
        let pipeline = ClassificationPipeline::new(&db, PipelineConfig::default())
            .with_embedder(&mock)
            .with_classifier(&classifier);

        db.upsert_uploaded_tags(sid, &[("Zomato".to_string(), "Dineout".to_string())])
            .unwrap();
        crate::embedding::backfill_embeddings(&db, &mock, sid, 10).unwrap();

        pipeline
            .ingest(sid, &[row(5, "UPI-ZOMATO-zomato@hdfc-Order", 250.0)])
            .unwrap();
        let report = pipeline.resolve(sid, false).unwrap();

        // "ZOMATO" embeds identically to "Zomato" under the trigram mock
        assert_eq!(report.embedding_matches, 1);
        let tag = db.get_product_tag(sid, "ZOMATO").unwrap().unwrap();
        assert_eq!(tag.tag.as_deref(), Some("Dineout"));
        assert_eq!(tag.source, Some(TagSource::Embedding));
        assert_eq!(mock.completion_calls(), 0);
    }

    #[test]
    fn test_embedding_failure_falls_through_to_ai() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let broken = MockBackend::without_embeddings();
        let classifier = mock_classifier(MockBackend::new());
        let pipeline = ClassificationPipeline::new(&db, PipelineConfig::default())
            .with_embedder(&broken)
            .with_classifier(&classifier);

        let report = pipeline
            .process_upload(&session.session_id, &sample_rows(), true)
            .unwrap();
        assert_eq!(report.resolution.embedding_matches, 0);
        assert_eq!(report.resolution.ai_tagged, 3);
        assert_eq!(report.resolution.unresolved_after, 0);
    }

    #[test]
    fn test_pipeline_over_http_backend() {
        use std::time::Duration;

        use crate::ai::OpenAICompatibleBackend;
        use crate::test_utils::MockOpenAIServer;

        let server = MockOpenAIServer::start();
        let backend = OpenAICompatibleBackend::new(
            &server.url(),
            "mock",
            "mock-trigram",
            Duration::from_secs(5),
        );

        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let sid = session.session_id.as_str();

        let mut prompts = PromptLibrary::embedded_only();
        let classifier =
            AIFallbackClassifier::new(backend.clone(), &mut prompts, &PipelineConfig::default())
                .unwrap();
        let pipeline = ClassificationPipeline::new(&db, PipelineConfig::default())
            .with_embedder(&backend)
            .with_classifier(&classifier);

        let report = pipeline.process_upload(sid, &sample_rows(), true).unwrap();
        assert_eq!(report.resolution.unresolved_after, 0);
        assert_eq!(server.backend().completion_calls(), 1);
        assert!(server.backend().embedding_calls() >= 1);

        let dmart = db.get_product_tag(sid, "DMART STORE").unwrap().unwrap();
        assert_eq!(dmart.tag.as_deref(), Some("Groceries"));
        assert!(dmart.embedding.is_some());
    }

    #[test]
    fn test_failed_http_batch_keeps_products_unresolved() {
        use std::time::Duration;

        use crate::ai::OpenAICompatibleBackend;
        use crate::test_utils::MockOpenAIServer;

        let server = MockOpenAIServer::start();
        server.backend().push_failure("model overloaded");
        let backend = OpenAICompatibleBackend::new(
            &server.url(),
            "mock",
            "mock-trigram",
            Duration::from_secs(5),
        );

        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let sid = session.session_id.as_str();

        let mut prompts = PromptLibrary::embedded_only();
        let classifier =
            AIFallbackClassifier::new(backend, &mut prompts, &PipelineConfig::default()).unwrap();
        let pipeline =
            ClassificationPipeline::new(&db, PipelineConfig::default()).with_classifier(&classifier);

        let report = pipeline.process_upload(sid, &sample_rows(), true).unwrap();
        assert_eq!(report.resolution.ai_failed_batches, 1);
        assert_eq!(report.resolution.unresolved_after, 3);

        // The next run gets a real reply
        let report = pipeline.resolve(sid, true).unwrap();
        assert_eq!(report.unresolved_after, 0);
    }

    #[test]
    fn test_stage_order() {
        assert!(PipelineStage::Parsed < PipelineStage::Registered);
        assert!(PipelineStage::EmbeddingResolved < PipelineStage::AiResolved);
        assert_eq!(PipelineStage::Persisted.to_string(), "persisted");
    }

    #[test]
    fn test_report_serializes_stage_as_snake_case() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let pipeline = ClassificationPipeline::new(&db, PipelineConfig::default());

        let report = pipeline
            .process_upload(&session.session_id, &sample_rows(), false)
            .unwrap();
        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["resolution"]["stage"], "persisted");
        assert_eq!(json["ingest"]["distinct_products"], 3);

        let stage = serde_json::to_string(&PipelineStage::EmbeddingResolved).unwrap();
        assert_eq!(stage, format!("\"{}\"", PipelineStage::EmbeddingResolved.as_str()));
    }

    /// Replays one reply for every batch
    struct ReplyClassifier(&'static str);

    impl TagClassifier for ReplyClassifier {
        fn classify_batch(&self, _batch: &[UnresolvedProduct]) -> BatchOutcome {
            BatchOutcome::Classified(crate::ai::parsing::parse_tag_suggestions(self.0))
        }
    }

    #[test]
    fn test_ai_reply_cannot_overwrite_manual_tag() {
        let db = Database::in_memory().unwrap();
        let session = db.create_session("alice", 1).unwrap();
        let sid = session.session_id.as_str();
        let classifier = ReplyClassifier("Airtel-Bills\nZomato-Food");
        let pipeline =
            ClassificationPipeline::new(&db, PipelineConfig::default()).with_classifier(&classifier);

        pipeline
            .ingest(
                sid,
                &[
                    row(1, "UPI-Airtel-airtel@okicici-Recharge", 499.0),
                    row(2, "UPI-Zomato-zomato@hdfc-Order", 420.0),
                ],
            )
            .unwrap();
        db.retag_product(sid, "Zomato", "Dineout").unwrap();

        let report = pipeline.resolve(sid, true).unwrap();
        assert_eq!(report.ai_tagged, 1);

        let zomato = db.get_product_tag(sid, "Zomato").unwrap().unwrap();
        assert_eq!(zomato.tag.as_deref(), Some("Dineout"));
        assert_eq!(zomato.source, Some(TagSource::Manual));
        let txs = db.list_transactions(sid, Some("Zomato"), 10, 0).unwrap();
        assert_eq!(txs[0].tag.as_deref(), Some("Dineout"));

        let airtel = db.get_product_tag(sid, "Airtel").unwrap().unwrap();
        assert_eq!(airtel.tag.as_deref(), Some("Bills"));
    }
}
