//! Product tag table operations
//!
//! Every distinct product in a session gets exactly one row here. The row starts
//! untagged and is filled in by the resolution stages, an upload, or a manual retag.

use rusqlite::{params, OptionalExtension};
use tracing::{debug, info, warn};

use super::Database;
use crate::error::{Error, Result};
use crate::models::{ProductTag, TagSource, TaggedEmbedding, UnresolvedProduct};

/// Outcome of registering a set of products
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrationSummary {
    /// Rows newly created with a NULL tag
    pub registered: usize,
    /// Products that already had a row (includes duplicates within the input)
    pub already_present: usize,
}

/// Outcome of a retag
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RetagResult {
    pub product: String,
    /// Whether the product's tag row changed
    pub product_row_updated: bool,
    pub transactions_updated: usize,
}

/// Filter for listing the tag table
#[derive(Debug, Clone)]
pub struct ProductTagFilter {
    /// Case-insensitive substring match on the tag
    pub search: Option<String>,
    pub limit: i64,
    pub offset: i64,
}

impl Default for ProductTagFilter {
    fn default() -> Self {
        Self {
            search: None,
            limit: 30,
            offset: 0,
        }
    }
}

fn encode_embedding(embedding: &[f32]) -> Result<String> {
    Ok(serde_json::to_string(embedding)?)
}

fn decode_embedding(json: &str) -> Result<Vec<f32>> {
    Ok(serde_json::from_str(json)?)
}

impl Database {
    /// Register products for a session with a NULL tag, skipping ones already present
    pub fn register_products<S: AsRef<str>>(
        &self,
        session_id: &str,
        products: &[S],
    ) -> Result<RegistrationSummary> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut summary = RegistrationSummary::default();

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO product_tags (session_id, product, tag)
                VALUES (?, ?, NULL)
                ON CONFLICT(session_id, product) DO NOTHING
                "#,
            )?;
            for product in products {
                if stmt.execute(params![session_id, product.as_ref()])? == 1 {
                    summary.registered += 1;
                } else {
                    summary.already_present += 1;
                }
            }
        }

        tx.commit()?;
        info!(
            "Registered {} new products ({} already present) for session {}",
            summary.registered, summary.already_present, session_id
        );
        Ok(summary)
    }

    /// Products without a tag, with their average debit amount, ordered by product
    pub fn unresolved_products(&self, session_id: &str) -> Result<Vec<UnresolvedProduct>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT pt.product, COALESCE(AVG(t.debit_amount), 0.0)
            FROM product_tags pt
            LEFT JOIN transactions t
                ON t.session_id = pt.session_id AND t.product = pt.product
            WHERE pt.session_id = ? AND pt.tag IS NULL
            GROUP BY pt.product
            ORDER BY pt.product
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok(UnresolvedProduct {
                product: row.get(0)?,
                avg_amount: row.get(1)?,
            })
        })?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Tagged products that have a stored embedding, ordered by product
    pub fn tagged_embeddings(&self, session_id: &str) -> Result<Vec<TaggedEmbedding>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT product, tag, embedding
            FROM product_tags
            WHERE session_id = ? AND tag IS NOT NULL AND embedding IS NOT NULL
            ORDER BY product
            "#,
        )?;

        let rows = stmt.query_map(params![session_id], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;

        let mut out = Vec::new();
        for row in rows {
            let (product, tag, json) = row?;
            match decode_embedding(&json) {
                Ok(embedding) => out.push(TaggedEmbedding {
                    product,
                    tag,
                    embedding,
                }),
                Err(e) => warn!("Skipping unreadable embedding for {}: {}", product, e),
            }
        }
        Ok(out)
    }

    /// Get the tag row for one product
    pub fn get_product_tag(&self, session_id: &str, product: &str) -> Result<Option<ProductTag>> {
        let conn = self.conn()?;
        let row = conn
            .query_row(
                r#"
                SELECT id, session_id, product, tag, embedding, source
                FROM product_tags
                WHERE session_id = ? AND product = ?
                "#,
                params![session_id, product],
                Self::row_to_product_tag,
            )
            .optional()?;
        Ok(row)
    }

    /// Stored embedding for a product, if any
    pub fn get_embedding(&self, session_id: &str, product: &str) -> Result<Option<Vec<f32>>> {
        let conn = self.conn()?;
        let json: Option<Option<String>> = conn
            .query_row(
                "SELECT embedding FROM product_tags WHERE session_id = ? AND product = ?",
                params![session_id, product],
                |row| row.get(0),
            )
            .optional()?;

        json.flatten().map(|j| decode_embedding(&j)).transpose()
    }

    /// Set a product's tag (and optionally its embedding)
    ///
    /// Returns false when the session has no row for the product, or when an
    /// `Embedding`/`Ai` tag meets a row that is already tagged. A `None`
    /// embedding leaves any stored embedding untouched.
    pub fn set_product_tag(
        &self,
        session_id: &str,
        product: &str,
        tag: &str,
        source: TagSource,
        embedding: Option<&[f32]>,
    ) -> Result<bool> {
        let conn = self.conn()?;
        let embedding_json = embedding.map(encode_embedding).transpose()?;

        let mut sql = String::from(
            r#"
            UPDATE product_tags
            SET tag = ?, source = ?, embedding = COALESCE(?, embedding),
                updated_at = CURRENT_TIMESTAMP
            WHERE session_id = ? AND product = ?
            "#,
        );
        if matches!(source, TagSource::Embedding | TagSource::Ai) {
            sql.push_str(" AND tag IS NULL");
        }

        let updated = conn.execute(
            &sql,
            params![tag, source.as_str(), embedding_json, session_id, product],
        )?;
        debug!("Set tag {} on {} ({} row)", tag, product, updated);
        Ok(updated == 1)
    }

    /// Store an embedding for a product without touching its tag
    pub fn set_embedding(&self, session_id: &str, product: &str, embedding: &[f32]) -> Result<bool> {
        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE product_tags SET embedding = ? WHERE session_id = ? AND product = ?",
            params![encode_embedding(embedding)?, session_id, product],
        )?;
        Ok(updated == 1)
    }

    /// Tagged products that have no embedding yet, ordered by product
    pub fn products_missing_embeddings(&self, session_id: &str) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            r#"
            SELECT product FROM product_tags
            WHERE session_id = ? AND tag IS NOT NULL AND embedding IS NULL
            ORDER BY product
            "#,
        )?;
        let rows = stmt.query_map(params![session_id], |row| row.get(0))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Seed the tag table from uploaded product → tag pairs
    ///
    /// Existing rows are overwritten with the uploaded tag. When that changes a
    /// product's tag, every transaction of the product follows, as in a retag.
    pub fn upsert_uploaded_tags(&self, session_id: &str, pairs: &[(String, String)]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;
        let mut written = 0;
        let mut retagged = 0;

        {
            let mut current = tx.prepare(
                "SELECT tag FROM product_tags WHERE session_id = ? AND product = ?",
            )?;
            let mut upsert = tx.prepare(
                r#"
                INSERT INTO product_tags (session_id, product, tag, source)
                VALUES (?, ?, ?, 'upload')
                ON CONFLICT(session_id, product) DO UPDATE SET
                    tag = excluded.tag,
                    source = excluded.source,
                    updated_at = CURRENT_TIMESTAMP
                "#,
            )?;
            let mut propagate = tx.prepare(
                "UPDATE transactions SET tag = ? WHERE session_id = ? AND product = ?",
            )?;

            for (product, tag) in pairs {
                let previous: Option<String> = current
                    .query_row(params![session_id, product], |row| row.get(0))
                    .optional()?
                    .flatten();

                written += upsert.execute(params![session_id, product, tag])?;

                if previous.as_deref().is_some_and(|p| p != tag) {
                    retagged += propagate.execute(params![tag, session_id, product])?;
                }
            }
        }

        tx.commit()?;
        info!(
            "Stored {} uploaded product tags for session {} ({} transactions retagged)",
            written, session_id, retagged
        );
        Ok(written)
    }

    /// Retag a product: its tag row and every one of the session's transactions for it
    pub fn retag_product(&self, session_id: &str, product: &str, tag: &str) -> Result<RetagResult> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        let row_updated = tx.execute(
            r#"
            UPDATE product_tags
            SET tag = ?, source = 'manual', updated_at = CURRENT_TIMESTAMP
            WHERE session_id = ? AND product = ?
            "#,
            params![tag, session_id, product],
        )?;
        let transactions_updated = tx.execute(
            "UPDATE transactions SET tag = ? WHERE session_id = ? AND product = ?",
            params![tag, session_id, product],
        )?;

        if row_updated == 0 && transactions_updated == 0 {
            return Err(Error::NotFound(format!(
                "product {:?} in session {}",
                product, session_id
            )));
        }

        tx.commit()?;
        info!(
            "Retagged {} as {} ({} transactions)",
            product, tag, transactions_updated
        );
        Ok(RetagResult {
            product: product.to_string(),
            product_row_updated: row_updated == 1,
            transactions_updated,
        })
    }

    /// Retag one transaction, or with `apply_to_all` every transaction of its product
    pub fn retag_transaction(
        &self,
        session_id: &str,
        transaction_id: i64,
        tag: &str,
        apply_to_all: bool,
    ) -> Result<RetagResult> {
        let tx = self
            .get_transaction(session_id, transaction_id)?
            .ok_or_else(|| {
                Error::NotFound(format!(
                    "transaction {} in session {}",
                    transaction_id, session_id
                ))
            })?;

        if apply_to_all {
            return self.retag_product(session_id, &tx.product, tag);
        }

        let conn = self.conn()?;
        let updated = conn.execute(
            "UPDATE transactions SET tag = ? WHERE session_id = ? AND id = ?",
            params![tag, session_id, transaction_id],
        )?;
        Ok(RetagResult {
            product: tx.product,
            product_row_updated: false,
            transactions_updated: updated,
        })
    }

    /// Page through a session's tag table, ordered by product
    pub fn list_product_tags(
        &self,
        session_id: &str,
        filter: &ProductTagFilter,
    ) -> Result<Vec<ProductTag>> {
        let conn = self.conn()?;

        let search = filter
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let mut sql = String::from(
            "SELECT id, session_id, product, tag, embedding, source FROM product_tags WHERE session_id = ?",
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(session_id.to_string())];

        if let Some(q) = search {
            sql.push_str(" AND tag LIKE ? COLLATE NOCASE");
            params.push(Box::new(format!("%{}%", q)));
        }
        sql.push_str(" ORDER BY product LIMIT ? OFFSET ?");
        params.push(Box::new(filter.limit));
        params.push(Box::new(filter.offset));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_product_tag)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    fn row_to_product_tag(row: &rusqlite::Row) -> rusqlite::Result<ProductTag> {
        let embedding: Option<String> = row.get(4)?;
        let source: Option<String> = row.get(5)?;
        Ok(ProductTag {
            id: row.get(0)?,
            session_id: row.get(1)?,
            product: row.get(2)?,
            tag: row.get(3)?,
            embedding: embedding.and_then(|j| decode_embedding(&j).ok()),
            source: source.and_then(|s| s.parse().ok()),
        })
    }
}
