//! Provider transport abstraction
//!
//! Every provider speaks one of three chat-completion protocols. The router
//! only sees [`ChatTransport`]: hand it a provider, a model, a credential and a
//! provider-agnostic [`ChatRequest`], get back the reply text.
//!
//! # Architecture
//!
//! - `ChatTransport` trait: one completion call, no retries or rotation
//! - `HttpTransport`: production implementation over `reqwest`, one client per
//!   connection mode (direct, or one per proxy URL)
//! - Wire codecs: `openai_compatible`, `anthropic`, `gemini`
//! - `MockTransport`: scripted replies for unit tests

mod anthropic;
mod gemini;
#[cfg(any(test, feature = "test-utils"))]
mod mock;
mod openai_compatible;
pub mod parsing;
pub mod types;

#[cfg(any(test, feature = "test-utils"))]
pub use mock::{MockCall, MockOutcome, MockTransport};
pub use types::*;

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use secrecy::{ExposeSecret, SecretString};
use tracing::debug;

use crate::config::{ProviderKind, ProviderSpec};
use crate::error::{Error, Result};

/// Everything needed for one completion attempt
#[derive(Clone, Copy)]
pub struct ProviderCall<'a> {
    pub spec: &'a ProviderSpec,
    pub model: &'a str,
    pub credential: &'a SecretString,
    pub request: &'a ChatRequest,
    /// Proxy endpoint, `None` for a direct connection
    pub proxy: Option<&'a str>,
}

impl<'a> ProviderCall<'a> {
    /// Content-filter threshold for this call
    pub fn safety(&self) -> Option<&'a str> {
        self.request
            .safety
            .as_deref()
            .or(self.spec.safety.as_deref())
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.spec.base_url, path)
    }
}

/// A single chat completion against one provider
#[async_trait]
pub trait ChatTransport: Send + Sync {
    /// Issue the call and return the reply text
    ///
    /// Connectivity problems surface as [`Error::Transport`]; non-success
    /// statuses as [`Error::ProviderStatus`]; empty or filtered replies as
    /// [`Error::Blocked`].
    async fn complete(&self, call: ProviderCall<'_>) -> Result<String>;
}

/// Production transport over HTTP
pub struct HttpTransport {
    direct: Client,
    proxied: Mutex<HashMap<String, Client>>,
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            direct: Client::new(),
            proxied: Mutex::new(HashMap::new()),
        }
    }

    /// Client for a connection mode, building proxy clients on first use
    fn client_for(&self, proxy: Option<&str>) -> Result<Client> {
        let Some(url) = proxy else {
            return Ok(self.direct.clone());
        };

        let mut cache = self
            .proxied
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(client) = cache.get(url) {
            return Ok(client.clone());
        }

        let proxy = reqwest::Proxy::all(url)
            .map_err(|e| Error::Config(format!("Invalid proxy URL: {}", e)))?;
        let client = Client::builder().proxy(proxy).build()?;
        cache.insert(url.to_string(), client.clone());
        Ok(client)
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ChatTransport for HttpTransport {
    async fn complete(&self, call: ProviderCall<'_>) -> Result<String> {
        let provider = call.spec.name.as_str();
        let proxied = call.proxy.is_some();
        let client = self.client_for(call.proxy)?;
        let key = call.credential.expose_secret();

        let builder = match call.spec.kind {
            ProviderKind::OpenAICompatible => client
                .post(call.url("/chat/completions"))
                .bearer_auth(key)
                .json(&openai_compatible::build_request(&call)),
            ProviderKind::Anthropic => client
                .post(call.url("/messages"))
                .header("x-api-key", key)
                .header("anthropic-version", anthropic::API_VERSION)
                .json(&anthropic::build_request(&call)),
            ProviderKind::Gemini => client
                .post(call.url(&format!("/models/{}:generateContent", call.model)))
                .header("x-goog-api-key", key)
                .json(&gemini::build_request(&call)),
        };

        debug!(provider, model = call.model, proxied, "Sending completion request");

        let response = builder
            .send()
            .await
            .map_err(|e| classify_send_error(provider, proxied, e))?;

        let status = response.status();
        if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
            return Err(Error::Transport {
                provider: provider.to_string(),
                proxied,
                message: "proxy authentication required (407)".into(),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::ProviderStatus {
                provider: provider.to_string(),
                status: status.as_u16(),
                body: truncate(&body, 300),
            });
        }

        let body = response.text().await.map_err(|e| classify_send_error(provider, proxied, e))?;
        match call.spec.kind {
            ProviderKind::OpenAICompatible => openai_compatible::parse_response(provider, &body),
            ProviderKind::Anthropic => anthropic::parse_response(provider, &body),
            ProviderKind::Gemini => gemini::parse_response(provider, &body),
        }
    }
}

/// Map a send failure to the error taxonomy
///
/// Anything that fails before a status line arrives over a proxy is treated as
/// a connectivity failure (tunnel, CONNECT, SOCKS handshake).
fn classify_send_error(provider: &str, proxied: bool, error: reqwest::Error) -> Error {
    if proxied || error.is_connect() || error.is_timeout() {
        Error::Transport {
            provider: provider.to_string(),
            proxied,
            message: error.to_string(),
        }
    } else {
        Error::Http(error)
    }
}

/// Blocked-reply error
fn blocked(provider: &str, reason: impl Into<String>) -> Error {
    Error::Blocked {
        provider: provider.to_string(),
        reason: reason.into(),
    }
}

fn truncate(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max_chars).collect();
    out.push('…');
    out
}
