//! Tag table access used by the resolution stages
//!
//! The embedding matcher and the AI classifier only need a handful of
//! tag-table operations. `Database` implements them; tests can substitute
//! an in-memory table.

use crate::db::Database;
use crate::error::Result;
use crate::models::{TagSource, TaggedEmbedding, UnresolvedProduct};

pub trait TagStore {
    /// Untagged products with their average debit amount, ordered by product
    fn unresolved_products(&self, session_id: &str) -> Result<Vec<UnresolvedProduct>>;

    /// Tagged products with a stored embedding, ordered by product
    fn tagged_embeddings(&self, session_id: &str) -> Result<Vec<TaggedEmbedding>>;

    fn stored_embedding(&self, session_id: &str, product: &str) -> Result<Option<Vec<f32>>>;

    fn store_embedding(&self, session_id: &str, product: &str, embedding: &[f32]) -> Result<bool>;

    /// Persist a tag (and optionally an embedding); false if the product is unknown
    fn store_tag(
        &self,
        session_id: &str,
        product: &str,
        tag: &str,
        source: TagSource,
        embedding: Option<&[f32]>,
    ) -> Result<bool>;

    /// Tagged products with no stored embedding, ordered by product
    fn products_missing_embeddings(&self, session_id: &str) -> Result<Vec<String>>;
}

impl TagStore for Database {
    fn unresolved_products(&self, session_id: &str) -> Result<Vec<UnresolvedProduct>> {
        Database::unresolved_products(self, session_id)
    }

    fn tagged_embeddings(&self, session_id: &str) -> Result<Vec<TaggedEmbedding>> {
        Database::tagged_embeddings(self, session_id)
    }

    fn stored_embedding(&self, session_id: &str, product: &str) -> Result<Option<Vec<f32>>> {
        self.get_embedding(session_id, product)
    }

    fn store_embedding(&self, session_id: &str, product: &str, embedding: &[f32]) -> Result<bool> {
        self.set_embedding(session_id, product, embedding)
    }

    fn store_tag(
        &self,
        session_id: &str,
        product: &str,
        tag: &str,
        source: TagSource,
        embedding: Option<&[f32]>,
    ) -> Result<bool> {
        self.set_product_tag(session_id, product, tag, source, embedding)
    }

    fn products_missing_embeddings(&self, session_id: &str) -> Result<Vec<String>> {
        Database::products_missing_embeddings(self, session_id)
    }
}
