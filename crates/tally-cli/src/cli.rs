//! CLI argument definitions using clap
//!
//! The command implementations live in the `commands` module.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Tally - ask your finances in plain language
#[derive(Parser)]
#[command(name = "tally")]
#[command(about = "Finance assistant with multi-provider LLM routing", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Provider/routing config (defaults to the override file, then the built-in config)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Answer a question about a ledger
    Ask {
        /// The question, e.g. "покажи траты за прошлый месяц"
        message: String,

        /// Ledger CSV (user_id,date,amount[,kind,category,description,currency])
        #[arg(short, long)]
        ledger: Option<PathBuf>,

        /// User whose transactions are queried
        #[arg(short, long, default_value = "1")]
        user: i64,

        /// Reply language: en or ru
        #[arg(long, default_value = "en")]
        locale: String,

        /// Append a narrative insight to aggregate answers
        #[arg(long)]
        insights: bool,

        /// Print the executed call and raw result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Show what a model reply would run, without calling any provider
    Parse {
        /// Model reply, e.g. "FUNCTION_CALL: get_expenses_list(period=last_month)"
        reply: String,

        /// The user's original message (used for intent correction)
        #[arg(short, long, default_value = "")]
        message: String,

        /// Caller id injected as user_id
        #[arg(short, long, default_value = "1")]
        user: i64,

        /// Resolve periods against this date (YYYY-MM-DD) instead of today
        #[arg(long)]
        today: Option<String>,
    },

    /// Categorize an expense description
    Categorize {
        /// Expense description
        description: String,

        /// Comma-separated list of allowed categories
        #[arg(short, long)]
        categories: String,

        /// Expense amount
        #[arg(short, long)]
        amount: Option<f64>,

        /// Category to use when nothing matches
        #[arg(long)]
        fallback: Option<String>,
    },

    /// Show providers, routes and credential health
    Providers {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Manage prompt templates
    Prompts {
        #[command(subcommand)]
        action: Option<PromptsAction>,
    },
}

#[derive(Subcommand)]
pub enum PromptsAction {
    /// List all prompts and their override status
    List,

    /// Show the content of a prompt
    Show {
        /// Prompt ID (e.g., intent_detection)
        prompt_id: String,
    },

    /// Show the prompt override directory
    Path,
}
