//! Test utilities for tagwise-core
//!
//! This module provides a mock OpenAI-compatible server so the real blocking
//! HTTP backend can be exercised end to end. Replies come from a shared
//! `MockBackend`, so tests can script them and count calls.

use std::net::SocketAddr;
use std::sync::mpsc;
use std::thread;

use axum::{
    extract::{Json, State},
    http::StatusCode,
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;

use crate::ai::{AIBackend, MockBackend};

/// Mock OpenAI-compatible server for testing
///
/// Runs on its own thread with its own tokio runtime, so blocking clients
/// can call it from plain `#[test]` functions.
pub struct MockOpenAIServer {
    addr: SocketAddr,
    backend: MockBackend,
    shutdown_tx: Option<oneshot::Sender<()>>,
}

impl MockOpenAIServer {
    /// Start the mock server on an available port
    pub fn start() -> Self {
        Self::start_with(MockBackend::new())
    }

    /// Start a server that answers from the given mock
    pub fn start_with(backend: MockBackend) -> Self {
        let (addr_tx, addr_rx) = mpsc::channel();
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
        let state = backend.clone();

        thread::spawn(move || {
            let runtime = tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap();

            runtime.block_on(async move {
                let app = Router::new()
                    .route("/v1/models", get(handle_models))
                    .route("/v1/chat/completions", post(handle_chat))
                    .route("/v1/embeddings", post(handle_embeddings))
                    .with_state(state);

                let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
                addr_tx.send(listener.local_addr().unwrap()).unwrap();

                axum::serve(listener, app)
                    .with_graceful_shutdown(async {
                        shutdown_rx.await.ok();
                    })
                    .await
                    .unwrap();
            });
        });

        let addr = addr_rx.recv().unwrap();
        Self {
            addr,
            backend,
            shutdown_tx: Some(shutdown_tx),
        }
    }

    /// Get the base URL for this mock server
    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// The mock answering requests (script replies, count calls)
    pub fn backend(&self) -> &MockBackend {
        &self.backend
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockOpenAIServer {
    fn drop(&mut self) {
        self.stop();
    }
}

#[derive(Debug, Serialize)]
struct ModelsResponse {
    data: Vec<ModelInfo>,
}

#[derive(Debug, Serialize)]
struct ModelInfo {
    id: String,
}

async fn handle_models(State(backend): State<MockBackend>) -> Json<ModelsResponse> {
    Json(ModelsResponse {
        data: vec![ModelInfo {
            id: backend.model().to_string(),
        }],
    })
}

#[derive(Debug, Deserialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
}

#[derive(Debug, Deserialize, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatResponse {
    model: String,
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Serialize)]
struct ChatChoice {
    index: usize,
    message: ChatMessage,
}

/// Chat completions endpoint; answers the last user message
async fn handle_chat(
    State(backend): State<MockBackend>,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>, (StatusCode, String)> {
    let prompt = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_str())
        .unwrap_or_default();

    let reply = backend
        .complete(prompt, None)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    Ok(Json(ChatResponse {
        model: request.model,
        choices: vec![ChatChoice {
            index: 0,
            message: ChatMessage {
                role: "assistant".to_string(),
                content: reply,
            },
        }],
    }))
}

#[derive(Debug, Deserialize)]
struct EmbeddingRequest {
    input: Vec<String>,
}

#[derive(Debug, Serialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Serialize)]
struct EmbeddingData {
    index: usize,
    embedding: Vec<f32>,
}

/// Embeddings endpoint; returns data in reverse order to exercise index sorting
async fn handle_embeddings(
    State(backend): State<MockBackend>,
    Json(request): Json<EmbeddingRequest>,
) -> Result<Json<EmbeddingResponse>, (StatusCode, String)> {
    let vectors = backend
        .embed(&request.input)
        .map_err(|e| (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()))?;

    let mut data: Vec<EmbeddingData> = vectors
        .into_iter()
        .enumerate()
        .map(|(index, embedding)| EmbeddingData { index, embedding })
        .collect();
    data.reverse();

    Ok(Json(EmbeddingResponse { data }))
}
