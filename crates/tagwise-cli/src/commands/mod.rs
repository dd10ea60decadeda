//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `core` - Init and shared utilities (open_db, config, AI client)
//! - `sessions` - Session commands (new, show, extend)
//! - `import` - Statement import and tag resolution
//! - `tags` - Product tag listing, upload and retagging
//! - `transactions` - Transaction listing
//! - `reports` - Spending reports
//! - `ai` - AI backend check

pub mod ai;
pub mod core;
pub mod import;
pub mod reports;
pub mod sessions;
pub mod tags;
pub mod transactions;

// Re-export command functions for main.rs
pub use ai::*;
pub use core::*;
pub use import::*;
pub use reports::*;
pub use sessions::*;
pub use tags::*;
pub use transactions::*;

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
