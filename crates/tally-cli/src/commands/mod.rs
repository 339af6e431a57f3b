//! CLI command implementations
//!
//! Commands are organized by domain:
//! - `ask` - Question answering and offline reply parsing
//! - `categorize` - Expense categorization
//! - `providers` - Provider, route and credential diagnostics
//! - `prompts` - Prompt library management commands

pub mod ask;
pub mod categorize;
pub mod prompts;
pub mod providers;

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use tally_core::{
    Config, LogNotifier, Notifier, ProviderRouter, RotationRegistry, WebhookNotifier,
};
use tracing::debug;

// Re-export command functions for main.rs
pub use ask::*;
pub use categorize::*;
pub use prompts::*;
pub use providers::*;

/// Load config from an explicit path, or the override file, or the built-in default
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            if !path.exists() {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            Config::from_path(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?
        }
        None => Config::load().context("Failed to load config")?,
    };
    config.validate()?;
    Ok(config)
}

/// Router with credentials from the environment
pub struct Runtime {
    pub config: Arc<Config>,
    pub registry: Arc<RotationRegistry>,
    pub router: Arc<ProviderRouter>,
}

pub fn build_runtime(config: Config) -> Runtime {
    let registry = Arc::new(RotationRegistry::new(
        config.credential_pools(),
        config.cooldown,
    ));
    let notifier: Arc<dyn Notifier> = match config.webhook_url.as_deref() {
        Some(url) => Arc::new(WebhookNotifier::new(url)),
        None => Arc::new(LogNotifier),
    };
    for provider in registry.providers() {
        debug!(provider, "Credentials loaded");
    }

    let config = Arc::new(config);
    let router = Arc::new(ProviderRouter::new(
        config.clone(),
        registry.clone(),
        Arc::new(tally_core::HttpTransport::new()),
        notifier,
    ));
    Runtime {
        config,
        registry,
        router,
    }
}

/// Truncate a string to a maximum number of characters, adding "..." if truncated
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
