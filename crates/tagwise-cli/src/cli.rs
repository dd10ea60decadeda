//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tagwise - Categorize bank statement spending
#[derive(Parser)]
#[command(name = "tagwise")]
#[command(about = "Bank statement transaction categorizer", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Database path
    #[arg(long, default_value = "tagwise.db", global = true)]
    pub db: PathBuf,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Disable database encryption (not recommended for production)
    ///
    /// By default, the database is encrypted using SQLCipher.
    /// Set TAGWISE_DB_KEY environment variable with your passphrase.
    /// Use --no-encrypt only for development or testing.
    #[arg(long, global = true)]
    pub no_encrypt: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize the database
    Init,

    /// Manage upload sessions
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Import a bank statement CSV into a session
    Import {
        /// Session id (from `tagwise session new`)
        #[arg(short, long)]
        session: String,

        /// Statement CSV with Date, Narration and Debit Amount columns
        #[arg(short, long)]
        file: PathBuf,

        /// Also run AI categorization for products nothing else could tag
        #[arg(long)]
        ai: bool,
    },

    /// Resolve tags for a session's untagged products
    Resolve {
        #[arg(short, long)]
        session: String,

        /// Run AI categorization for products nothing else could tag
        #[arg(long)]
        ai: bool,
    },

    /// View and upload product tags
    Tags {
        #[command(subcommand)]
        action: TagsAction,
    },

    /// Change the tag of a product or a single transaction
    Retag {
        #[arg(short, long)]
        session: String,

        /// New tag
        #[arg(short, long)]
        tag: String,

        /// Product to retag (all of its transactions follow)
        #[arg(short, long, conflicts_with = "transaction", required_unless_present = "transaction")]
        product: Option<String>,

        /// Transaction id to retag
        #[arg(long)]
        transaction: Option<i64>,

        /// With --transaction, retag every transaction of that product too
        #[arg(long, requires = "transaction")]
        apply_to_all: bool,
    },

    /// List a session's transactions
    Transactions {
        #[arg(short, long)]
        session: String,

        /// Only this product
        #[arg(short, long)]
        product: Option<String>,

        #[arg(short, long, default_value = "20")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Spending reports
    Report {
        #[command(subcommand)]
        kind: ReportKind,
    },

    /// AI backend commands
    Ai {
        #[command(subcommand)]
        action: AiAction,
    },
}

#[derive(Subcommand)]
pub enum SessionAction {
    /// Start a new session
    New {
        /// Owner of the session
        username: String,

        /// Lifetime in hours (defaults to the pipeline config)
        #[arg(long)]
        ttl_hours: Option<i64>,
    },

    /// Show a session
    Show {
        session: String,
    },

    /// Push a session's expiry out again
    Extend {
        session: String,

        #[arg(long)]
        ttl_hours: Option<i64>,
    },
}

#[derive(Subcommand)]
pub enum TagsAction {
    /// List the product tag table
    List {
        #[arg(short, long)]
        session: String,

        /// Case-insensitive tag filter
        #[arg(long)]
        search: Option<String>,

        #[arg(short, long, default_value = "30")]
        limit: i64,

        #[arg(long, default_value = "0")]
        offset: i64,
    },

    /// Seed the tag table from a Product,Tag CSV
    Upload {
        #[arg(short, long)]
        session: String,

        #[arg(short, long)]
        file: PathBuf,

        /// Skip computing embeddings for the uploaded products
        #[arg(long)]
        no_embed: bool,
    },
}

#[derive(Subcommand)]
pub enum ReportKind {
    /// Spending by tag
    Tags {
        #[arg(short, long)]
        session: String,
    },

    /// Spending by payment mode
    Modes {
        #[arg(short, long)]
        session: String,
    },
}

#[derive(Subcommand)]
pub enum AiAction {
    /// Check the configured backend and categorize sample products
    Test {
        /// Product to categorize instead of the samples
        #[arg(short, long)]
        product: Option<String>,
    },
}
