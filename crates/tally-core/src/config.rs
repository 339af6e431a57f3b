//! Provider and routing configuration
//!
//! Describes which language-model providers exist, how to reach them, which
//! provider serves each operation type, and the ordered fallbacks behind it.
//!
//! ## Configuration Resolution
//!
//! Config is loaded with a two-layer resolution:
//! 1. Check for an override file (`$TALLY_CONFIG`, then
//!    ~/.local/share/tally/config/providers.toml)
//! 2. Fall back to embedded defaults (compiled into binary)
//!
//! API keys never live in the embedded file: each provider names an environment
//! variable holding a comma-separated key list (`keys_env`). Inline `keys` in an
//! override file are accepted for local setups.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use secrecy::SecretString;
use serde::Deserialize;

use crate::error::{Error, Result};

/// Embedded default config (compiled into binary)
const DEFAULT_CONFIG: &str = include_str!("../../../config/providers.toml");

/// Environment variable pointing at an override config file
pub const CONFIG_ENV: &str = "TALLY_CONFIG";

/// Operation types a provider can be routed for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum OperationType {
    /// Function detection and conversational replies
    Chat,
    /// Assigning a category to a free-text expense
    Categorization,
    /// Narrative analytics over aggregated results
    Insights,
}

impl OperationType {
    /// Get the config key for this operation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Chat => "chat",
            Self::Categorization => "categorization",
            Self::Insights => "insights",
        }
    }

    /// Get all operation types
    pub fn all() -> &'static [OperationType] {
        &[Self::Chat, Self::Categorization, Self::Insights]
    }

    pub(crate) fn from_key(key: &str) -> Option<Self> {
        match key {
            "chat" => Some(Self::Chat),
            "categorization" => Some(Self::Categorization),
            "insights" | "analytics" => Some(Self::Insights),
            _ => None,
        }
    }

    /// Built-in timeout used when the config does not set one
    fn default_timeout(&self) -> Duration {
        match self {
            Self::Chat => Duration::from_secs(30),
            Self::Categorization => Duration::from_secs(15),
            Self::Insights => Duration::from_secs(60),
        }
    }
}

impl std::fmt::Display for OperationType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Wire protocol spoken by a provider
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    /// `/chat/completions` (OpenAI, Groq, DeepSeek, OpenRouter, ...)
    OpenAICompatible,
    /// Anthropic Messages API
    Anthropic,
    /// Google Gemini `generateContent`
    Gemini,
}

impl ProviderKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::OpenAICompatible => "openai_compatible",
            Self::Anthropic => "anthropic",
            Self::Gemini => "gemini",
        }
    }

    fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "openai_compatible" | "openai" => Ok(Self::OpenAICompatible),
            "anthropic" | "claude" => Ok(Self::Anthropic),
            "gemini" | "google" => Ok(Self::Gemini),
            other => Err(Error::Config(format!("Unknown provider kind: {}", other))),
        }
    }
}

/// Static description of one provider
#[derive(Debug, Clone)]
pub struct ProviderSpec {
    /// Provider name (config key)
    pub name: String,
    /// Wire protocol
    pub kind: ProviderKind,
    /// Base endpoint, without trailing slash
    pub base_url: String,
    /// Model used when no per-operation model is set
    pub default_model: String,
    /// Per-operation model overrides
    pub models: HashMap<OperationType, String>,
    /// Whether calls go through the configured proxy
    pub uses_proxy: bool,
    /// Environment variable holding the comma-separated key list
    pub keys_env: Option<String>,
    /// Content-filter threshold (Gemini safety settings)
    pub safety: Option<String>,
    inline_keys: Vec<String>,
}

impl ProviderSpec {
    /// Create a provider spec with no keys or overrides
    pub fn new(name: &str, kind: ProviderKind, base_url: &str, default_model: &str) -> Self {
        Self {
            name: name.to_string(),
            kind,
            base_url: base_url.trim_end_matches('/').to_string(),
            default_model: default_model.to_string(),
            models: HashMap::new(),
            uses_proxy: false,
            keys_env: None,
            safety: None,
            inline_keys: Vec::new(),
        }
    }

    /// Route this provider through the proxy
    pub fn with_proxy(mut self, uses_proxy: bool) -> Self {
        self.uses_proxy = uses_proxy;
        self
    }

    /// Add inline keys (tests and local setups)
    pub fn with_keys(mut self, keys: &[&str]) -> Self {
        self.inline_keys = keys.iter().map(|k| k.to_string()).collect();
        self
    }

    /// Set a model for one operation
    pub fn with_model(mut self, operation: OperationType, model: &str) -> Self {
        self.models.insert(operation, model.to_string());
        self
    }

    /// Model to request for an operation
    pub fn model_for(&self, operation: OperationType) -> &str {
        self.models
            .get(&operation)
            .map(String::as_str)
            .unwrap_or(&self.default_model)
    }
}

/// Primary provider and ordered fallbacks for one operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RouteConfig {
    pub primary: String,
    pub fallbacks: Vec<String>,
}

/// Full configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Providers by name
    pub providers: BTreeMap<String, ProviderSpec>,
    /// Routes by operation
    pub routing: HashMap<OperationType, RouteConfig>,
    /// Per-operation call timeouts (same for every provider)
    pub timeouts: HashMap<OperationType, Duration>,
    /// How long a failed credential sits out of rotation
    pub cooldown: Duration,
    /// Proxy endpoint for providers with `uses_proxy`
    pub proxy_url: Option<String>,
    /// Conversation turns sent with each intent prompt
    pub context_turns: usize,
    /// Maximum item rows in list-shaped answers
    pub list_row_cap: usize,
    /// Currency assumed when a result carries none
    pub default_currency: String,
    /// Webhook for operational alerts
    pub webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            providers: BTreeMap::new(),
            routing: HashMap::new(),
            timeouts: HashMap::new(),
            cooldown: Duration::from_secs(300),
            proxy_url: None,
            context_turns: 6,
            list_row_cap: 50,
            default_currency: "RUB".to_string(),
            webhook_url: None,
        }
    }
}

impl Config {
    /// Load configuration (override first, then embedded default)
    pub fn load() -> Result<Self> {
        let override_path = std::env::var(CONFIG_ENV)
            .ok()
            .map(PathBuf::from)
            .or_else(default_config_path);
        load_config(override_path.as_deref())
    }

    /// Load from an explicit path (falls back to embedded default if missing)
    pub fn from_path(path: &Path) -> Result<Self> {
        load_config(Some(path))
    }

    /// Embedded default configuration
    pub fn embedded() -> Result<Self> {
        parse_config(DEFAULT_CONFIG)
    }

    /// Parse configuration from TOML text
    pub fn from_toml(content: &str) -> Result<Self> {
        parse_config(content)
    }

    /// Add or replace a provider
    pub fn with_provider(mut self, spec: ProviderSpec) -> Self {
        self.providers.insert(spec.name.clone(), spec);
        self
    }

    /// Set the route for an operation
    pub fn with_route(mut self, operation: OperationType, primary: &str, fallbacks: &[&str]) -> Self {
        self.routing.insert(
            operation,
            RouteConfig {
                primary: primary.to_string(),
                fallbacks: fallbacks.iter().map(|s| s.to_string()).collect(),
            },
        );
        self
    }

    /// Timeout for an operation
    pub fn timeout_for(&self, operation: OperationType) -> Duration {
        self.timeouts
            .get(&operation)
            .copied()
            .unwrap_or_else(|| operation.default_timeout())
    }

    /// Route for an operation
    ///
    /// Without an explicit route the first configured provider is primary and
    /// every other provider is a fallback, in name order.
    pub fn route_for(&self, operation: OperationType) -> Option<RouteConfig> {
        if let Some(route) = self.routing.get(&operation) {
            return Some(route.clone());
        }
        let mut names = self.providers.keys().cloned();
        let primary = names.next()?;
        Some(RouteConfig {
            primary,
            fallbacks: names.collect(),
        })
    }

    /// Build credential pools from inline keys and environment variables
    pub fn credential_pools(&self) -> HashMap<String, Vec<SecretString>> {
        self.credential_pools_with(|var| std::env::var(var).ok())
    }

    /// Build credential pools with a custom environment lookup
    pub fn credential_pools_with<F>(&self, lookup: F) -> HashMap<String, Vec<SecretString>>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut pools = HashMap::new();
        for (name, spec) in &self.providers {
            let mut keys: Vec<String> = spec.inline_keys.clone();
            if let Some(value) = spec.keys_env.as_deref().and_then(&lookup) {
                keys.extend(split_keys(&value));
            }
            keys.dedup();
            let pool = keys.into_iter().map(SecretString::from).collect();
            pools.insert(name.clone(), pool);
        }
        pools
    }

    /// Check that every route references a known provider
    pub fn validate(&self) -> Result<()> {
        for (operation, route) in &self.routing {
            if !self.providers.contains_key(&route.primary) {
                return Err(Error::Config(format!(
                    "Route {} uses unknown primary provider {}",
                    operation, route.primary
                )));
            }
            for fallback in &route.fallbacks {
                if !self.providers.contains_key(fallback) {
                    tracing::warn!(
                        operation = %operation,
                        provider = %fallback,
                        "Fallback provider is not configured and will be skipped"
                    );
                }
            }
        }
        Ok(())
    }
}

/// Split a comma/newline separated key list
fn split_keys(value: &str) -> Vec<String> {
    value
        .split([',', '\n', ';'])
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_string)
        .collect()
}

/// Default config override path
pub fn default_config_path() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("config").join("providers.toml"))
}

/// Load configuration (override first, then default)
fn load_config(override_path: Option<&Path>) -> Result<Config> {
    let content = match override_path {
        Some(path) if path.exists() => fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("Failed to read config {}: {}", path.display(), e)))?,
        _ => DEFAULT_CONFIG.to_string(),
    };

    parse_config(&content)
}

/// Raw config structure for TOML parsing
#[derive(Debug, Deserialize)]
struct RawConfig {
    defaults: Option<RawDefaults>,
    timeouts: Option<RawTimeouts>,
    proxy: Option<RawProxy>,
    notify: Option<RawNotify>,
    providers: Option<BTreeMap<String, RawProvider>>,
    routing: Option<HashMap<String, RawRoute>>,
}

#[derive(Debug, Deserialize)]
struct RawDefaults {
    cooldown_secs: Option<u64>,
    context_turns: Option<usize>,
    list_row_cap: Option<usize>,
    default_currency: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawTimeouts {
    chat_secs: Option<u64>,
    categorization_secs: Option<u64>,
    insights_secs: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct RawProxy {
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawNotify {
    webhook_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawProvider {
    kind: String,
    base_url: String,
    default_model: String,
    models: Option<HashMap<String, String>>,
    uses_proxy: Option<bool>,
    keys_env: Option<String>,
    keys: Option<Vec<String>>,
    safety: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawRoute {
    primary: String,
    fallbacks: Option<Vec<String>>,
}

/// Parse config from TOML content
fn parse_config(content: &str) -> Result<Config> {
    let raw: RawConfig = toml::from_str(content)
        .map_err(|e| Error::Config(format!("Invalid config TOML: {}", e)))?;

    let mut config = Config::default();

    if let Some(defaults) = raw.defaults {
        if let Some(secs) = defaults.cooldown_secs {
            config.cooldown = Duration::from_secs(secs);
        }
        if let Some(turns) = defaults.context_turns {
            config.context_turns = turns.clamp(2, 10);
        }
        if let Some(cap) = defaults.list_row_cap {
            config.list_row_cap = cap.max(1);
        }
        if let Some(currency) = defaults.default_currency {
            config.default_currency = currency.to_uppercase();
        }
    }

    if let Some(timeouts) = raw.timeouts {
        let pairs = [
            (OperationType::Chat, timeouts.chat_secs),
            (OperationType::Categorization, timeouts.categorization_secs),
            (OperationType::Insights, timeouts.insights_secs),
        ];
        for (operation, secs) in pairs {
            if let Some(secs) = secs {
                config.timeouts.insert(operation, Duration::from_secs(secs));
            }
        }
    }

    config.proxy_url = raw
        .proxy
        .and_then(|p| p.url)
        .filter(|url| !url.trim().is_empty());
    config.webhook_url = raw
        .notify
        .and_then(|n| n.webhook_url)
        .filter(|url| !url.trim().is_empty());

    for (name, provider) in raw.providers.unwrap_or_default() {
        let mut spec = ProviderSpec::new(
            &name,
            ProviderKind::parse(&provider.kind)?,
            &provider.base_url,
            &provider.default_model,
        );
        spec.uses_proxy = provider.uses_proxy.unwrap_or(false);
        spec.keys_env = provider.keys_env;
        spec.safety = provider.safety;
        spec.inline_keys = provider.keys.unwrap_or_default();

        for (operation_key, model) in provider.models.unwrap_or_default() {
            match OperationType::from_key(&operation_key) {
                Some(operation) => {
                    spec.models.insert(operation, model);
                }
                None => {
                    tracing::warn!(provider = %name, key = %operation_key, "Skipping unknown operation in models table");
                }
            }
        }

        config.providers.insert(name, spec);
    }

    for (operation_key, route) in raw.routing.unwrap_or_default() {
        let Some(operation) = OperationType::from_key(&operation_key) else {
            continue; // Skip unknown operation types
        };
        config.routing.insert(
            operation,
            RouteConfig {
                primary: route.primary,
                fallbacks: route.fallbacks.unwrap_or_default(),
            },
        );
    }

    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::ExposeSecret;
    use std::io::Write;

    #[test]
    fn test_parse_default_config() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert_eq!(config.cooldown, Duration::from_secs(300));
        assert_eq!(config.context_turns, 6);
        assert_eq!(config.list_row_cap, 50);
        assert!(config.providers.contains_key("gemini"));
        assert_eq!(
            config.route_for(OperationType::Chat).unwrap().primary,
            "gemini"
        );
    }

    #[test]
    fn test_operation_type_as_str() {
        assert_eq!(OperationType::Chat.as_str(), "chat");
        assert_eq!(OperationType::Categorization.as_str(), "categorization");
        assert_eq!(OperationType::all().len(), 3);
    }

    #[test]
    fn test_timeouts_scale_by_operation() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        assert!(
            config.timeout_for(OperationType::Insights)
                > config.timeout_for(OperationType::Categorization)
        );
        assert_eq!(
            Config::default().timeout_for(OperationType::Chat),
            Duration::from_secs(30)
        );
    }

    #[test]
    fn test_model_per_operation() {
        let config = parse_config(DEFAULT_CONFIG).unwrap();
        let openai = &config.providers["openai"];
        assert_eq!(openai.model_for(OperationType::Insights), "gpt-4o");
        assert_eq!(openai.model_for(OperationType::Chat), "gpt-4o-mini");
    }

    #[test]
    fn test_unknown_primary_rejected() {
        let toml = r#"
[providers.a]
kind = "openai_compatible"
base_url = "http://localhost"
default_model = "m"

[routing.chat]
primary = "missing"
"#;
        assert!(parse_config(toml).is_err());
    }

    #[test]
    fn test_unknown_kind_rejected() {
        let toml = r#"
[providers.a]
kind = "carrier_pigeon"
base_url = "http://localhost"
default_model = "m"
"#;
        assert!(matches!(parse_config(toml), Err(Error::Config(_))));
    }

    #[test]
    fn test_credential_pools_from_env_and_inline() {
        let toml = r#"
[providers.a]
kind = "openai_compatible"
base_url = "http://localhost/"
default_model = "m"
keys_env = "A_KEYS"
keys = ["inline-1"]

[providers.b]
kind = "anthropic"
base_url = "http://localhost"
default_model = "m"
"#;
        let config = parse_config(toml).unwrap();
        let pools = config.credential_pools_with(|var| {
            (var == "A_KEYS").then(|| "env-1, env-2,,".to_string())
        });

        let a: Vec<&str> = pools["a"].iter().map(|k| k.expose_secret()).collect();
        assert_eq!(a, vec!["inline-1", "env-1", "env-2"]);
        assert!(pools["b"].is_empty());
        assert_eq!(config.providers["a"].base_url, "http://localhost");
    }

    #[test]
    fn test_route_defaults_to_provider_order() {
        let config = Config::default()
            .with_provider(ProviderSpec::new("b", ProviderKind::Gemini, "http://b", "m"))
            .with_provider(ProviderSpec::new("a", ProviderKind::Anthropic, "http://a", "m"));
        let route = config.route_for(OperationType::Insights).unwrap();
        assert_eq!(route.primary, "a");
        assert_eq!(route.fallbacks, vec!["b".to_string()]);
    }

    #[test]
    fn test_load_override_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
[defaults]
cooldown_secs = 60
context_turns = 40

[proxy]
url = "http://proxy:3128"

[providers.only]
kind = "gemini"
base_url = "http://localhost"
default_model = "m"
uses_proxy = true
"#
        )
        .unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.cooldown, Duration::from_secs(60));
        assert_eq!(config.context_turns, 10); // clamped
        assert_eq!(config.proxy_url.as_deref(), Some("http://proxy:3128"));
        assert!(config.providers["only"].uses_proxy);
    }

    #[test]
    fn test_missing_override_uses_embedded() {
        let config = Config::from_path(Path::new("/nonexistent/tally.toml")).unwrap();
        assert!(config.providers.contains_key("openai"));
    }
}
