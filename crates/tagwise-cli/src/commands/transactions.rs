//! Transaction command implementations

use anyhow::Result;
use tagwise_core::db::Database;

use super::truncate;

pub fn cmd_transactions_list(
    db: &Database,
    session_id: &str,
    product: Option<&str>,
    limit: i64,
    offset: i64,
) -> Result<()> {
    db.require_active_session(session_id)?;
    let transactions = db.list_transactions(session_id, product, limit, offset)?;

    if transactions.is_empty() {
        println!("No transactions found.");
        return Ok(());
    }

    println!();
    println!(
        "   {:>5}  {:<10}  {:<28}  {:<17}  {:>10}  {}",
        "ID", "Date", "Product", "Mode", "Amount", "Tag"
    );
    println!("   ─────────────────────────────────────────────────────────────────────────────────────");

    for tx in &transactions {
        println!(
            "   {:>5}  {:<10}  {:<28}  {:<17}  {:>10.2}  {}",
            tx.id,
            tx.date,
            truncate(&tx.product, 28),
            tx.mode.as_str(),
            tx.debit_amount,
            tx.tag.as_deref().unwrap_or("-")
        );
    }

    let total = db.count_transactions(session_id)?;
    println!();
    println!("   Showing {} of {} transactions", transactions.len(), total);

    Ok(())
}
