//! Tally CLI - finance assistant over multiple LLM providers
//!
//! Usage:
//!   tally ask "spent last month?" --ledger tx.csv   Answer a question
//!   tally parse "FUNCTION_CALL: ..."                Normalize a model reply offline
//!   tally categorize "Uber" -c Food,Transport       Categorize an expense
//!   tally providers                                 Show provider/credential health

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

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
        Commands::Ask {
            message,
            ledger,
            user,
            locale,
            insights,
            json,
        } => {
            commands::cmd_ask(
                cli.config.as_deref(),
                &message,
                ledger.as_deref(),
                user,
                &locale,
                insights,
                json,
            )
            .await
        }
        Commands::Parse {
            reply,
            message,
            user,
            today,
        } => commands::cmd_parse(&reply, &message, user, today.as_deref()),
        Commands::Categorize {
            description,
            categories,
            amount,
            fallback,
        } => {
            commands::cmd_categorize(
                cli.config.as_deref(),
                &description,
                &categories,
                amount,
                fallback.as_deref(),
            )
            .await
        }
        Commands::Providers { json } => commands::cmd_providers(cli.config.as_deref(), json),
        Commands::Prompts { action } => match action {
            None | Some(PromptsAction::List) => commands::cmd_prompts_list(),
            Some(PromptsAction::Show { prompt_id }) => commands::cmd_prompts_show(&prompt_id),
            Some(PromptsAction::Path) => commands::cmd_prompts_path(),
        },
    }
}
