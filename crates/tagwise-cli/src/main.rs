//! Tagwise CLI - Bank statement transaction categorizer
//!
//! Usage:
//!   tagwise init                                  Initialize database
//!   tagwise session new alice                     Start a session
//!   tagwise import --session ID --file CSV --ai   Import and categorize a statement
//!   tagwise report tags --session ID              Spending by tag

mod cli;
mod commands;


use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    match cli.command {
        Commands::Init => commands::cmd_init(&cli.db, cli.no_encrypt),
        Commands::Session { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config()?;
            match action {
                SessionAction::New {
                    username,
                    ttl_hours,
                } => commands::cmd_session_new(
                    &db,
                    &username,
                    ttl_hours.unwrap_or(config.session_ttl_hours),
                ),
                SessionAction::Show { session } => commands::cmd_session_show(&db, &session),
                SessionAction::Extend { session, ttl_hours } => commands::cmd_session_extend(
                    &db,
                    &session,
                    ttl_hours.unwrap_or(config.session_ttl_hours),
                ),
            }
        }
        Commands::Import { session, file, ai } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config()?;
            let client = commands::ai_client_from_env(&config);
            commands::cmd_import(&db, &session, &file, ai, client.as_ref(), &config)
        }
        Commands::Resolve { session, ai } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            let config = commands::load_config()?;
            let client = commands::ai_client_from_env(&config);
            commands::cmd_resolve(&db, &session, ai, client.as_ref(), &config)
        }
        Commands::Tags { action } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match action {
                TagsAction::List {
                    session,
                    search,
                    limit,
                    offset,
                } => commands::cmd_tags_list(&db, &session, search.as_deref(), limit, offset),
                TagsAction::Upload {
                    session,
                    file,
                    no_embed,
                } => {
                    let config = commands::load_config()?;
                    let client = if no_embed {
                        None
                    } else {
                        commands::ai_client_from_env(&config)
                    };
                    commands::cmd_tags_upload(&db, &session, &file, client.as_ref(), &config)
                }
            }
        }
        Commands::Retag {
            session,
            tag,
            product,
            transaction,
            apply_to_all,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match (product, transaction) {
                (Some(product), _) => commands::cmd_retag_product(&db, &session, &product, &tag),
                (None, Some(id)) => {
                    commands::cmd_retag_transaction(&db, &session, id, &tag, apply_to_all)
                }
                (None, None) => anyhow::bail!("Pass --product or --transaction"),
            }
        }
        Commands::Transactions {
            session,
            product,
            limit,
            offset,
        } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            commands::cmd_transactions_list(&db, &session, product.as_deref(), limit, offset)
        }
        Commands::Report { kind } => {
            let db = commands::open_db(&cli.db, cli.no_encrypt)?;
            match kind {
                ReportKind::Tags { session } => commands::cmd_report_tags(&db, &session),
                ReportKind::Modes { session } => commands::cmd_report_modes(&db, &session),
            }
        }
        Commands::Ai { action } => match action {
            AiAction::Test { product } => {
                let config = commands::load_config()?;
                commands::cmd_ai_test(commands::ai_client_from_env(&config), product.as_deref(), &config)
            }
        },
    }
}
