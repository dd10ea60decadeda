//! Spending reports

use rusqlite::params;

use super::{Database, DbConn};
use crate::error::Result;
use crate::models::{SpendingGroup, SpendingSummary};

/// Group name for transactions with no tag
pub const UNTAGGED: &str = "Untagged";

impl Database {
    /// Total debits per tag for a session, untagged transactions grouped as `Untagged`
    pub fn spending_by_tag(&self, session_id: &str) -> Result<SpendingSummary> {
        let conn = self.conn()?;
        Self::grouped_spending(&conn, session_id, "COALESCE(tag, ?2)")
    }

    /// Total debits per payment mode for a session
    pub fn spending_by_mode(&self, session_id: &str) -> Result<SpendingSummary> {
        let conn = self.conn()?;
        Self::grouped_spending(&conn, session_id, "COALESCE(mode, ?2)")
    }

    /// `group_expr` is trusted SQL selecting the group name; `?2` binds to `Untagged`
    fn grouped_spending(conn: &DbConn, session_id: &str, group_expr: &str) -> Result<SpendingSummary> {
        let sql = format!(
            r#"
            SELECT {expr} AS name, SUM(debit_amount) AS amount, COUNT(*)
            FROM transactions
            WHERE session_id = ?1
            GROUP BY name
            ORDER BY amount DESC, name
            "#,
            expr = group_expr
        );

        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params![session_id, UNTAGGED], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, f64>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?;
        let rows = rows.collect::<std::result::Result<Vec<_>, _>>()?;

        let total: f64 = rows.iter().map(|(_, amount, _)| amount).sum();
        let transaction_count = rows.iter().map(|(_, _, count)| count).sum();

        let groups = rows
            .into_iter()
            .map(|(name, amount, transaction_count)| SpendingGroup {
                name,
                amount,
                percentage: if total > 0.0 {
                    (amount / total) * 100.0
                } else {
                    0.0
                },
                transaction_count,
            })
            .collect();

        Ok(SpendingSummary {
            total,
            transaction_count,
            groups,
        })
    }
}
