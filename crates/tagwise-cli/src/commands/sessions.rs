//! Session command implementations

use anyhow::{Context, Result};
use tagwise_core::db::Database;

pub fn cmd_session_new(db: &Database, username: &str, ttl_hours: i64) -> Result<()> {
    let session = db
        .create_session(username, ttl_hours)
        .context("Failed to create session")?;

    println!("✅ Session created for {}", session.username);
    println!("   Id:      {}", session.session_id);
    println!(
        "   Expires: {}",
        session.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    );

    Ok(())
}

pub fn cmd_session_show(db: &Database, session_id: &str) -> Result<()> {
    let session = db
        .get_session(session_id)?
        .ok_or_else(|| anyhow::anyhow!("Session not found: {}", session_id))?;
    let transactions = db.count_transactions(session_id)?;
    let unresolved = db.unresolved_products(session_id)?.len();
    let expired = session.is_expired_at(chrono::Utc::now());

    println!();
    println!("🗂️  Session {}", session.session_id);
    println!("   ─────────────────────────────");
    println!("   User:         {}", session.username);
    println!(
        "   Created:      {}",
        session.created_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    println!(
        "   Expires:      {}{}",
        session.expires_at.format("%Y-%m-%d %H:%M:%S UTC"),
        if expired { " (expired)" } else { "" }
    );
    println!("   Transactions: {}", transactions);
    println!("   Untagged products: {}", unresolved);

    Ok(())
}

pub fn cmd_session_extend(db: &Database, session_id: &str, ttl_hours: i64) -> Result<()> {
    let session = db
        .extend_session(session_id, ttl_hours)
        .context("Failed to extend session")?;
    println!(
        "✅ Session {} now expires {}",
        session.session_id,
        session.expires_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    Ok(())
}
