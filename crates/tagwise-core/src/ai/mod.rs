//! Pluggable AI backend abstraction
//!
//! This module provides a backend-agnostic interface for the two model
//! operations the pipeline needs: a text completion (batched categorization)
//! and text embeddings (similarity matching).
//!
//! # Architecture
//!
//! - `AIBackend` trait: defines the interface for all AI operations
//! - `AIClient` enum: concrete wrapper providing Clone + compile-time dispatch
//! - Backend implementations: `OpenAICompatibleBackend`, `OllamaBackend`, `MockBackend`
//!
//! Calls are blocking; the pipeline runs batches strictly one after another.
//!
//! # Configuration
//!
//! Environment variables:
//! - `AI_BACKEND`: Backend to use (openai_compatible, ollama, mock). Default: openai_compatible
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required for openai_compatible backend)
//! - `OPENAI_COMPATIBLE_MODEL`: Chat model (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_EMBEDDING_MODEL`: Embedding model (default: text-embedding-ada-002)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)
//! - `OLLAMA_HOST`: Ollama server URL (required for ollama backend)
//! - `OLLAMA_MODEL`: Generation model (default: llama3.2)
//! - `OLLAMA_EMBEDDING_MODEL`: Embedding model (default: nomic-embed-text)

mod mock;
mod ollama;
mod openai_compatible;
pub mod parsing;

pub use mock::MockBackend;
pub use ollama::OllamaBackend;
pub use openai_compatible::OpenAICompatibleBackend;

use std::time::Duration;

use crate::error::Result;

/// Trait defining the interface for all AI backends
pub trait AIBackend: Send + Sync {
    /// Send a single-turn prompt and return the raw text reply
    fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String>;

    /// Embed each text, returning one vector per input in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;

    /// Check if the backend is reachable
    fn health_check(&self) -> bool;

    /// Completion model name (for logging)
    fn model(&self) -> &str;

    /// Embedding model name (for logging)
    fn embedding_model(&self) -> &str;

    /// Host URL (for logging)
    fn host(&self) -> &str;
}

/// Concrete AI client enum
#[derive(Clone)]
pub enum AIClient {
    /// OpenAI-compatible chat/embeddings API
    OpenAICompatible(OpenAICompatibleBackend),
    /// Ollama HTTP API
    Ollama(OllamaBackend),
    /// Mock backend for testing
    Mock(MockBackend),
}

impl AIClient {
    /// Create an AI client from environment variables
    ///
    /// Checks `AI_BACKEND` to determine which backend to use. Returns None if
    /// the selected backend's host variable is not set.
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let backend =
            std::env::var("AI_BACKEND").unwrap_or_else(|_| "openai_compatible".to_string());

        match backend.to_lowercase().as_str() {
            "openai_compatible" | "openai" => {
                OpenAICompatibleBackend::from_env(timeout).map(AIClient::OpenAICompatible)
            }
            "ollama" => OllamaBackend::from_env(timeout).map(AIClient::Ollama),
            "mock" => Some(AIClient::Mock(MockBackend::new())),
            _ => {
                tracing::warn!(backend = %backend, "Unknown AI_BACKEND, falling back to openai_compatible");
                OpenAICompatibleBackend::from_env(timeout).map(AIClient::OpenAICompatible)
            }
        }
    }

    /// Create a mock backend for testing
    pub fn mock() -> Self {
        AIClient::Mock(MockBackend::new())
    }
}

impl AIBackend for AIClient {
    fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
        match self {
            AIClient::OpenAICompatible(b) => b.complete(prompt, temperature),
            AIClient::Ollama(b) => b.complete(prompt, temperature),
            AIClient::Mock(b) => b.complete(prompt, temperature),
        }
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        match self {
            AIClient::OpenAICompatible(b) => b.embed(texts),
            AIClient::Ollama(b) => b.embed(texts),
            AIClient::Mock(b) => b.embed(texts),
        }
    }

    fn health_check(&self) -> bool {
        match self {
            AIClient::OpenAICompatible(b) => b.health_check(),
            AIClient::Ollama(b) => b.health_check(),
            AIClient::Mock(b) => b.health_check(),
        }
    }

    fn model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.model(),
            AIClient::Ollama(b) => b.model(),
            AIClient::Mock(b) => b.model(),
        }
    }

    fn embedding_model(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.embedding_model(),
            AIClient::Ollama(b) => b.embedding_model(),
            AIClient::Mock(b) => b.embedding_model(),
        }
    }

    fn host(&self) -> &str {
        match self {
            AIClient::OpenAICompatible(b) => b.host(),
            AIClient::Ollama(b) => b.host(),
            AIClient::Mock(b) => b.host(),
        }
    }
}
