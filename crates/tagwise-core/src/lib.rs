//! Tagwise Core Library
//!
//! Shared functionality for the Tagwise transaction categorizer:
//! - Database access and migrations (sessions, transactions, product tags)
//! - Statement and product-tag CSV import
//! - Narration parsing into product and payment mode
//! - Embedding similarity matching against already-tagged products
//! - Batched AI categorization over pluggable backends
//! - Prompt library for customizable model prompts
//! - The classification pipeline tying these together

pub mod ai;
pub mod classifier;
pub mod config;
pub mod db;
pub mod embedding;
pub mod error;
pub mod import;
pub mod models;
pub mod narration;
pub mod pipeline;
pub mod prompts;
pub mod store;

/// Test utilities including a mock OpenAI-compatible server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{AIBackend, AIClient, MockBackend, OllamaBackend, OpenAICompatibleBackend};
pub use classifier::{AIFallbackClassifier, BatchOutcome, ClassificationSummary, TagClassifier};
pub use config::PipelineConfig;
pub use db::{Database, ProductTagFilter, RegistrationSummary, RetagResult};
pub use embedding::{backfill_embeddings, cosine_distance, Embedder, EmbeddingMatch, EmbeddingMatcher};
pub use error::{Error, Result};
pub use import::{parse_product_tags_csv, parse_statement_csv};
pub use pipeline::{ClassificationPipeline, IngestReport, PipelineStage, ResolutionReport, UploadReport};
pub use prompts::{Prompt, PromptId, PromptLibrary};
pub use store::TagStore;
