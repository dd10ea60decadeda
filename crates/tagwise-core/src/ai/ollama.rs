//! Ollama backend implementation
//!
//! Uses `/api/generate` for completions and `/api/embed` for batched embeddings.

use std::time::Duration;

use reqwest::blocking::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::AIBackend;

pub const DEFAULT_MODEL: &str = "llama3.2";
pub const DEFAULT_EMBEDDING_MODEL: &str = "nomic-embed-text";

#[derive(Clone)]
pub struct OllamaBackend {
    http_client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
}

impl OllamaBackend {
    /// Create a new Ollama backend
    pub fn new(base_url: &str, model: &str, embedding_model: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embedding_model: embedding_model.to_string(),
        }
    }

    /// Create from environment variables
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let host = std::env::var("OLLAMA_HOST").ok()?;
        let model = std::env::var("OLLAMA_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let embedding_model = std::env::var("OLLAMA_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());
        Some(Self::new(&host, &model, &embedding_model, timeout))
    }
}

/// Request to Ollama API
#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    prompt: String,
    stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    options: Option<OllamaOptions>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
}

/// Response from Ollama API
#[derive(Debug, Deserialize)]
struct OllamaResponse {
    response: String,
}

#[derive(Debug, Serialize)]
struct OllamaEmbedRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct OllamaEmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

impl AIBackend for OllamaBackend {
    fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
        let request = OllamaRequest {
            model: self.model.clone(),
            prompt: prompt.to_string(),
            stream: false,
            options: temperature.map(|temperature| OllamaOptions { temperature }),
        };

        let response = self
            .http_client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request)
            .send()?
            .error_for_status()?;

        let ollama_response: OllamaResponse = response.json()?;
        debug!("Ollama response: {}", ollama_response.response);
        Ok(ollama_response.response)
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = OllamaEmbedRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let response: OllamaEmbedResponse = self
            .http_client
            .post(format!("{}/api/embed", self.base_url))
            .json(&request)
            .send()?
            .error_for_status()?
            .json()?;

        if response.embeddings.len() != texts.len() {
            return Err(Error::Ai(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.embeddings.len()
            )));
        }
        Ok(response.embeddings)
    }

    fn health_check(&self) -> bool {
        match self
            .http_client
            .get(format!("{}/api/tags", self.base_url))
            .send()
        {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }

    fn model(&self) -> &str {
        &self.model
    }

    fn embedding_model(&self) -> &str {
        &self.embedding_model
    }

    fn host(&self) -> &str {
        &self.base_url
    }
}
