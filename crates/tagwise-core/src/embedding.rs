//! Embedding similarity matching
//!
//! An untagged product inherits the tag of the closest already-tagged product
//! in the same session, provided the cosine distance between their embeddings
//! is strictly below the configured threshold.

use tracing::{debug, info, warn};

use crate::ai::AIBackend;
use crate::error::Result;
use crate::models::{TagSource, TaggedEmbedding};
use crate::store::TagStore;

/// Anything that can turn text into vectors
pub trait Embedder {
    /// One vector per input, in input order
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>>;
}

impl<B: AIBackend + ?Sized> Embedder for B {
    fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>> {
        AIBackend::embed(self, texts)
    }
}

/// Closest tagged product for a query
#[derive(Debug, Clone, PartialEq)]
pub struct EmbeddingMatch {
    pub matched_product: String,
    pub tag: String,
    pub distance: f64,
}

/// Cosine distance `1 - cos(a, b)`, computed in f64
///
/// Mismatched dimensions, empty vectors or zero vectors give 1.0.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    if a.len() != b.len() || a.is_empty() {
        return 1.0;
    }

    let mut dot = 0f64;
    let mut norm_a = 0f64;
    let mut norm_b = 0f64;
    for (x, y) in a.iter().zip(b.iter()) {
        let (x, y) = (f64::from(*x), f64::from(*y));
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a == 0.0 || norm_b == 0.0 {
        return 1.0;
    }

    1.0 - dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Nearest candidate strictly closer than `threshold`
///
/// Ties keep the earliest candidate.
pub fn find_closest(
    query: &[f32],
    candidates: &[TaggedEmbedding],
    threshold: f64,
) -> Option<EmbeddingMatch> {
    let mut best: Option<(&TaggedEmbedding, f64)> = None;

    for candidate in candidates {
        let distance = cosine_distance(query, &candidate.embedding);
        if best.map_or(true, |(_, d)| distance < d) {
            best = Some((candidate, distance));
        }
    }

    best.filter(|(_, d)| *d < threshold)
        .map(|(c, distance)| EmbeddingMatch {
            matched_product: c.product.clone(),
            tag: c.tag.clone(),
            distance,
        })
}

/// Embed texts in chunks of `batch_size`, returning vectors aligned with `texts`
pub fn embed_in_batches(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut out = Vec::with_capacity(texts.len());
    for chunk in texts.chunks(batch_size.max(1)) {
        out.extend(embedder.embed(chunk)?);
    }
    Ok(out)
}

/// Resolves untagged products against tagged ones by embedding similarity
pub struct EmbeddingMatcher<'a> {
    embedder: &'a dyn Embedder,
    threshold: f64,
    batch_size: usize,
}

impl<'a> EmbeddingMatcher<'a> {
    pub fn new(embedder: &'a dyn Embedder, threshold: f64, batch_size: usize) -> Self {
        Self {
            embedder,
            threshold,
            batch_size,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Stored embedding for the product, computing and storing one if missing
    pub fn embedding_for(
        &self,
        store: &dyn TagStore,
        session_id: &str,
        product: &str,
    ) -> Result<Vec<f32>> {
        if let Some(stored) = store.stored_embedding(session_id, product)? {
            return Ok(stored);
        }
        let embedding = self
            .embedder
            .embed(&[product.to_string()])?
            .into_iter()
            .next()
            .unwrap_or_default();
        store.store_embedding(session_id, product, &embedding)?;
        Ok(embedding)
    }

    /// Closest tagged product in the session, if within the threshold
    pub fn find_closest(
        &self,
        store: &dyn TagStore,
        session_id: &str,
        product: &str,
    ) -> Result<Option<EmbeddingMatch>> {
        let query = self.embedding_for(store, session_id, product)?;
        let candidates = store.tagged_embeddings(session_id)?;
        Ok(find_closest(&query, &candidates, self.threshold))
    }

    /// Try to tag every listed product from its nearest tagged neighbour
    ///
    /// Embeddings for products without one are computed in batches and stored
    /// whether or not a match is found. Products tagged here are not used as
    /// candidates for the rest of the run. Returns the matches made.
    pub fn resolve(
        &self,
        store: &dyn TagStore,
        session_id: &str,
        products: &[String],
    ) -> Result<Vec<(String, EmbeddingMatch)>> {
        if products.is_empty() {
            return Ok(Vec::new());
        }

        let candidates = store.tagged_embeddings(session_id)?;
        if candidates.is_empty() {
            debug!("No tagged embeddings in session {}; computing embeddings only", session_id);
        }

        let mut queries: Vec<Option<Vec<f32>>> = Vec::with_capacity(products.len());
        let mut missing = Vec::new();
        for product in products {
            let stored = store.stored_embedding(session_id, product)?;
            if stored.is_none() {
                missing.push(product.clone());
            }
            queries.push(stored);
        }

        if !missing.is_empty() {
            let computed = embed_in_batches(self.embedder, &missing, self.batch_size)?;
            let mut computed = missing.iter().zip(computed);
            for slot in queries.iter_mut().filter(|q| q.is_none()) {
                if let Some((product, embedding)) = computed.next() {
                    store.store_embedding(session_id, product, &embedding)?;
                    *slot = Some(embedding);
                }
            }
        }

        let mut matches = Vec::new();
        for (product, query) in products.iter().zip(queries) {
            let Some(query) = query else { continue };
            if let Some(m) = find_closest(&query, &candidates, self.threshold) {
                debug!(
                    "{} matched {} ({}) at distance {:.4}",
                    product, m.matched_product, m.tag, m.distance
                );
                if store.store_tag(session_id, product, &m.tag, TagSource::Embedding, None)? {
                    matches.push((product.clone(), m));
                }
            }
        }

        info!(
            "Embedding stage matched {} of {} products",
            matches.len(),
            products.len()
        );
        Ok(matches)
    }
}

/// Compute and store embeddings for tagged products that lack one
///
/// Run after a product-tag upload so the uploaded tags become match candidates.
/// A failed batch is logged and skipped. Returns the number stored.
pub fn backfill_embeddings(
    store: &dyn TagStore,
    embedder: &dyn Embedder,
    session_id: &str,
    batch_size: usize,
) -> Result<usize> {
    let products = store.products_missing_embeddings(session_id)?;
    let mut stored = 0;

    for chunk in products.chunks(batch_size.max(1)) {
        match embedder.embed(chunk) {
            Ok(vectors) => {
                for (product, embedding) in chunk.iter().zip(vectors) {
                    if store.store_embedding(session_id, product, &embedding)? {
                        stored += 1;
                    }
                }
            }
            Err(e) => warn!("Embedding backfill batch failed, skipping: {}", e),
        }
    }

    info!("Backfilled {} embeddings for session {}", stored, session_id);
    Ok(stored)
}
