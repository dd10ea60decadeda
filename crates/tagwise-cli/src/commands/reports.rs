//! Report command implementations

use anyhow::Result;
use tagwise_core::db::Database;
use tagwise_core::models::SpendingSummary;

pub fn cmd_report_tags(db: &Database, session_id: &str) -> Result<()> {
    db.require_active_session(session_id)?;
    let summary = db.spending_by_tag(session_id)?;
    print_summary("💰 Spending by Tag", &summary);
    Ok(())
}

pub fn cmd_report_modes(db: &Database, session_id: &str) -> Result<()> {
    db.require_active_session(session_id)?;
    let summary = db.spending_by_mode(session_id)?;
    print_summary("💳 Spending by Payment Mode", &summary);
    Ok(())
}

fn print_summary(title: &str, summary: &SpendingSummary) {
    println!();
    println!("{}", title);
    println!("   ─────────────────────────────────────────────");

    if summary.groups.is_empty() {
        println!("   No transactions yet.");
        return;
    }

    for group in &summary.groups {
        let bar = "█".repeat((group.percentage / 5.0).round() as usize);
        println!(
            "   {:<18} {:>12.2}  {:>5.1}%  {:>4} txns  {}",
            group.name, group.amount, group.percentage, group.transaction_count, bar
        );
    }

    println!("   ─────────────────────────────────────────────");
    println!(
        "   {:<18} {:>12.2}          {:>4} txns",
        "Total", summary.total, summary.transaction_count
    );
}
