//! OpenAI-compatible backend implementation
//!
//! Works with the hosted OpenAI API and any server that implements the chat
//! completions and embeddings endpoints (vLLM, LocalAI, llama-server, ...).
//!
//! # Configuration
//!
//! Environment variables:
//! - `OPENAI_COMPATIBLE_HOST`: Server URL (required)
//! - `OPENAI_COMPATIBLE_MODEL`: Chat model (default: gpt-3.5-turbo)
//! - `OPENAI_COMPATIBLE_EMBEDDING_MODEL`: Embedding model (default: text-embedding-ada-002)
//! - `OPENAI_COMPATIBLE_API_KEY`: API key if required (optional)

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};

use super::AIBackend;

pub const DEFAULT_MODEL: &str = "gpt-3.5-turbo";
pub const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-ada-002";

/// OpenAI-compatible backend
///
/// ```rust,ignore
/// export OPENAI_COMPATIBLE_HOST="https://api.openai.com"
/// export OPENAI_COMPATIBLE_API_KEY="sk-..."
/// ```
#[derive(Clone)]
pub struct OpenAICompatibleBackend {
    http_client: Client,
    base_url: String,
    model: String,
    embedding_model: String,
    api_key: Option<String>,
}

impl OpenAICompatibleBackend {
    /// Create a new OpenAI-compatible backend
    pub fn new(base_url: &str, model: &str, embedding_model: &str, timeout: Duration) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(timeout)
                .build()
                .unwrap_or_default(),
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            embedding_model: embedding_model.to_string(),
            api_key: None,
        }
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    /// Create from environment variables
    ///
    /// Required: `OPENAI_COMPATIBLE_HOST`
    pub fn from_env(timeout: Duration) -> Option<Self> {
        let host = std::env::var("OPENAI_COMPATIBLE_HOST").ok()?;
        let model = std::env::var("OPENAI_COMPATIBLE_MODEL")
            .unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        let embedding_model = std::env::var("OPENAI_COMPATIBLE_EMBEDDING_MODEL")
            .unwrap_or_else(|_| DEFAULT_EMBEDDING_MODEL.to_string());

        let mut backend = Self::new(&host, &model, &embedding_model, timeout);
        backend.api_key = std::env::var("OPENAI_COMPATIBLE_API_KEY").ok();
        Some(backend)
    }

    fn authorized(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.api_key {
            Some(ref api_key) => builder.header("Authorization", format!("Bearer {}", api_key)),
            None => builder,
        }
    }

    fn post_json<Req: Serialize, Resp: for<'de> Deserialize<'de>>(
        &self,
        path: &str,
        body: &Req,
    ) -> Result<Resp> {
        let request = self
            .http_client
            .post(format!("{}{}", self.base_url, path))
            .json(body);
        let response = self.authorized(request).send()?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().unwrap_or_default();
            return Err(Error::Ai(format!("OpenAI API error {}: {}", status, body)));
        }

        Ok(response.json()?)
    }
}

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
struct ChatCompletionRequest {
    model: String,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
}

/// OpenAI embeddings request
#[derive(Debug, Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Vec<f32>,
}

impl AIBackend for OpenAICompatibleBackend {
    fn complete(&self, prompt: &str, temperature: Option<f32>) -> Result<String> {
        let request = ChatCompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            temperature,
            stream: false,
        };

        let response: ChatCompletionResponse = self.post_json("/v1/chat/completions", &request)?;
        let content = response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| Error::Ai("No response from OpenAI API".into()))?;

        debug!("OpenAI-compatible completion: {}", content);
        Ok(content)
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let request = EmbeddingRequest {
            model: &self.embedding_model,
            input: texts,
        };
        let mut response: EmbeddingResponse = self.post_json("/v1/embeddings", &request)?;

        if response.data.len() != texts.len() {
            return Err(Error::Ai(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                response.data.len()
            )));
        }

        response.data.sort_by_key(|d| d.index);
        Ok(response.data.into_iter().map(|d| d.embedding).collect())
    }

    fn health_check(&self) -> bool {
        let request = self.http_client.get(format!("{}/v1/models", self.base_url));
        match self.authorized(request).send() {
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
