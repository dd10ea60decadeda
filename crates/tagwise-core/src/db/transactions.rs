//! Transaction operations

use rusqlite::{params, OptionalExtension};
use tracing::debug;

use super::{parse_date, Database};
use crate::error::Result;
use crate::models::{NewTransaction, PaymentMode, Transaction};

impl Database {
    /// Insert a batch of transactions for a session
    ///
    /// All rows are written in one SQL transaction: either every row lands or none do.
    pub fn insert_transactions(&self, session_id: &str, txs: &[NewTransaction]) -> Result<usize> {
        let mut conn = self.conn()?;
        let tx = conn.transaction()?;

        {
            let mut stmt = tx.prepare(
                r#"
                INSERT INTO transactions (session_id, date, narration, debit_amount, product, mode)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )?;
            for t in txs {
                stmt.execute(params![
                    session_id,
                    t.date.to_string(),
                    t.narration,
                    t.debit_amount,
                    t.product,
                    t.mode.as_str(),
                ])?;
            }
        }

        tx.commit()?;
        debug!("Inserted {} transactions into session {}", txs.len(), session_id);
        Ok(txs.len())
    }

    /// List a session's transactions, optionally for one product, oldest first
    pub fn list_transactions(
        &self,
        session_id: &str,
        product: Option<&str>,
        limit: i64,
        offset: i64,
    ) -> Result<Vec<Transaction>> {
        let conn = self.conn()?;

        let mut sql = String::from(
            r#"
            SELECT id, session_id, date, narration, debit_amount, product, mode, tag
            FROM transactions
            WHERE session_id = ?
            "#,
        );
        let mut params: Vec<Box<dyn rusqlite::ToSql>> = vec![Box::new(session_id.to_string())];

        if let Some(p) = product {
            sql.push_str(" AND product = ?");
            params.push(Box::new(p.to_string()));
        }
        sql.push_str(" ORDER BY date, id LIMIT ? OFFSET ?");
        params.push(Box::new(limit));
        params.push(Box::new(offset));

        let mut stmt = conn.prepare(&sql)?;
        let param_refs: Vec<&dyn rusqlite::ToSql> = params.iter().map(|p| p.as_ref()).collect();
        let rows = stmt.query_map(param_refs.as_slice(), Self::row_to_transaction)?;

        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(Into::into)
    }

    /// Get one transaction, scoped to its session
    pub fn get_transaction(&self, session_id: &str, id: i64) -> Result<Option<Transaction>> {
        let conn = self.conn()?;
        let tx = conn
            .query_row(
                r#"
                SELECT id, session_id, date, narration, debit_amount, product, mode, tag
                FROM transactions
                WHERE session_id = ? AND id = ?
                "#,
                params![session_id, id],
                Self::row_to_transaction,
            )
            .optional()?;
        Ok(tx)
    }

    pub fn count_transactions(&self, session_id: &str) -> Result<i64> {
        let conn = self.conn()?;
        let count = conn.query_row(
            "SELECT COUNT(*) FROM transactions WHERE session_id = ?",
            params![session_id],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    /// Copy resolved product tags onto the session's untagged transactions
    ///
    /// Transactions that already carry a tag keep it, so single-transaction
    /// retags survive later resolution runs.
    pub fn sync_transaction_tags(&self, session_id: &str) -> Result<usize> {
        let conn = self.conn()?;
        let updated = conn.execute(
            r#"
            UPDATE transactions
            SET tag = (
                SELECT pt.tag FROM product_tags pt
                WHERE pt.session_id = transactions.session_id
                  AND pt.product = transactions.product
            )
            WHERE session_id = ?
              AND tag IS NULL
              AND EXISTS (
                SELECT 1 FROM product_tags pt
                WHERE pt.session_id = transactions.session_id
                  AND pt.product = transactions.product
                  AND pt.tag IS NOT NULL
              )
            "#,
            params![session_id],
        )?;
        Ok(updated)
    }

    fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
        let date: String = row.get(2)?;
        let mode: String = row.get(6)?;
        Ok(Transaction {
            id: row.get(0)?,
            session_id: row.get(1)?,
            date: parse_date(&date)?,
            narration: row.get(3)?,
            debit_amount: row.get(4)?,
            product: row.get(5)?,
            mode: mode.parse().unwrap_or(PaymentMode::Other),
            tag: row.get(7)?,
        })
    }
}
