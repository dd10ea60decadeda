//! Mock backend for testing
//!
//! Categorizes products by keyword and embeds text with a deterministic
//! character-trigram hash. Replies can also be scripted for specific tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::{Error, Result};

use super::AIBackend;

/// Dimensions of mock embeddings
pub const MOCK_EMBEDDING_DIM: usize = 64;

/// Mock AI backend for testing
#[derive(Clone, Default)]
pub struct MockBackend {
    /// Whether health_check should return true
    pub healthy: bool,
    /// Scripted completion replies, consumed front to back; `Err` simulates a failed call
    scripted: Arc<Mutex<VecDeque<std::result::Result<String, String>>>>,
    completions: Arc<AtomicUsize>,
    embeddings: Arc<AtomicUsize>,
    fail_embeddings: bool,
}

impl MockBackend {
    /// Create a new mock backend (healthy by default)
    pub fn new() -> Self {
        Self {
            healthy: true,
            ..Default::default()
        }
    }

    /// Create an unhealthy mock backend
    pub fn unhealthy() -> Self {
        Self::default()
    }

    /// Mock whose embedding calls always fail
    pub fn without_embeddings() -> Self {
        Self {
            healthy: true,
            fail_embeddings: true,
            ..Default::default()
        }
    }

    /// Queue a raw completion reply
    pub fn push_reply(&self, reply: impl Into<String>) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(Ok(reply.into()));
        }
    }

    /// Queue a failed completion call
    pub fn push_failure(&self, reason: impl Into<String>) {
        if let Ok(mut queue) = self.scripted.lock() {
            queue.push_back(Err(reason.into()));
        }
    }

    /// Number of completion calls made so far
    pub fn completion_calls(&self) -> usize {
        self.completions.load(Ordering::SeqCst)
    }

    /// Number of embedding calls made so far
    pub fn embedding_calls(&self) -> usize {
        self.embeddings.load(Ordering::SeqCst)
    }
}

/// Keyword → tag table used when no reply is scripted
const KEYWORDS: &[(&str, &str)] = &[
    ("airtel", "Bills"),
    ("jio", "Bills"),
    ("electricity", "Bills"),
    ("broadband", "Bills"),
    ("zomato", "Food"),
    ("swiggy", "Food"),
    ("uber", "Travel"),
    ("ola", "Travel"),
    ("irctc", "Travel"),
    ("amazon", "Shopping"),
    ("flipkart", "Shopping"),
    ("myntra", "Shopping"),
    ("bigbasket", "Groceries"),
    ("dmart", "Groceries"),
    ("grocer", "Groceries"),
    ("salon", "Salon"),
    ("rent", "Rent"),
    ("landlord", "Rent"),
    ("zerodha", "Investments"),
    ("groww", "Investments"),
    ("bookmyshow", "Fun"),
    ("pvr", "Fun"),
    ("netflix", "Fun"),
    ("cafe", "Dineout"),
    ("restaurant", "Dineout"),
];

fn keyword_tag(product: &str) -> &'static str {
    let lower = product.to_lowercase();
    KEYWORDS
        .iter()
        .find(|(kw, _)| lower.contains(kw))
        .map(|(_, tag)| *tag)
        .unwrap_or("TBD")
}

/// Pull the product names out of a `Products: {a: 1.00, b: 2.00}` line
fn products_in_prompt(prompt: &str) -> Vec<String> {
    let Some(line) = prompt
        .lines()
        .find_map(|l| l.trim().strip_prefix("Products:"))
    else {
        return Vec::new();
    };

    let inner = line
        .trim()
        .trim_start_matches('{')
        .trim_end_matches('}');

    inner
        .split(", ")
        .filter_map(|pair| pair.rsplit_once(": ").map(|(p, _)| p.trim().to_string()))
        .filter(|p| !p.is_empty())
        .collect()
}

/// Deterministic bag-of-trigrams embedding, L2-normalised
fn trigram_embedding(text: &str) -> Vec<f32> {
    let mut v = vec![0f32; MOCK_EMBEDDING_DIM];
    let padded: Vec<char> = format!("  {} ", text.trim().to_lowercase()).chars().collect();

    for window in padded.windows(3) {
        // FNV-1a over the trigram
        let mut hash: u32 = 0x811c_9dc5;
        for c in window {
            for b in c.to_string().bytes() {
                hash ^= u32::from(b);
                hash = hash.wrapping_mul(0x0100_0193);
            }
        }
        v[(hash as usize) % MOCK_EMBEDDING_DIM] += 1.0;
    }

    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        v.iter_mut().for_each(|x| *x /= norm);
    }
    v
}

impl AIBackend for MockBackend {
    fn complete(&self, prompt: &str, _temperature: Option<f32>) -> Result<String> {
        self.completions.fetch_add(1, Ordering::SeqCst);

        let scripted = self
            .scripted
            .lock()
            .map_err(|_| Error::Ai("mock reply queue poisoned".into()))?
            .pop_front();
        match scripted {
            Some(Ok(reply)) => return Ok(reply),
            Some(Err(reason)) => return Err(Error::Ai(reason)),
            None => {}
        }

        Ok(products_in_prompt(prompt)
            .iter()
            .map(|p| format!("{}-{}", p, keyword_tag(p)))
            .collect::<Vec<_>>()
            .join("\n"))
    }

    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        self.embeddings.fetch_add(1, Ordering::SeqCst);
        if self.fail_embeddings {
            return Err(Error::Ai("mock embeddings disabled".into()));
        }
        Ok(texts.iter().map(|t| trigram_embedding(t)).collect())
    }

    fn health_check(&self) -> bool {
        self.healthy
    }

    fn model(&self) -> &str {
        "mock"
    }

    fn embedding_model(&self) -> &str {
        "mock-trigram"
    }

    fn host(&self) -> &str {
        "mock://localhost"
    }
}
