//! Mock transport for testing
//!
//! Replies are scripted per provider: queued one-shot outcomes are consumed
//! first, then the provider's standing outcome applies. Every call is recorded
//! so tests can assert which provider, model, credential and connection mode
//! served a request.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;

use crate::credentials::fingerprint;
use crate::error::{Error, Result};

use super::types::ChatMessage;
use super::{ChatTransport, ProviderCall};

/// What a scripted call does
#[derive(Debug, Clone)]
pub enum MockOutcome {
    /// Return this text
    Reply(String),
    /// Fail with this HTTP status
    Status(u16),
    /// Fail with a connectivity error
    Transport,
    /// Fail with an empty/filtered reply
    Blocked(String),
    /// Never answer (exercises timeouts)
    Hang,
}

/// A recorded call
#[derive(Debug, Clone)]
pub struct MockCall {
    pub provider: String,
    pub model: String,
    pub proxied: bool,
    /// Fingerprint of the credential used
    pub fingerprint: String,
    pub system: Option<String>,
    pub messages: Vec<ChatMessage>,
}

/// Scripted transport
#[derive(Default)]
pub struct MockTransport {
    queued: Mutex<HashMap<String, VecDeque<MockOutcome>>>,
    standing: Mutex<HashMap<String, MockOutcome>>,
    broken_proxy: AtomicBool,
    calls: Mutex<Vec<MockCall>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl MockTransport {
    /// Every provider replies "mock reply" until scripted otherwise
    pub fn new() -> Self {
        Self::default()
    }

    /// Standing outcome for a provider
    pub fn always(&self, provider: &str, outcome: MockOutcome) -> &Self {
        lock(&self.standing).insert(provider.to_string(), outcome);
        self
    }

    /// Standing text reply for a provider
    pub fn reply_with(&self, provider: &str, text: &str) -> &Self {
        self.always(provider, MockOutcome::Reply(text.to_string()))
    }

    /// Queue a one-shot outcome for a provider
    pub fn then(&self, provider: &str, outcome: MockOutcome) -> &Self {
        lock(&self.queued)
            .entry(provider.to_string())
            .or_default()
            .push_back(outcome);
        self
    }

    /// Make every proxied call fail with a connectivity error
    pub fn break_proxy(&self) -> &Self {
        self.broken_proxy.store(true, Ordering::SeqCst);
        self
    }

    /// All recorded calls, oldest first
    pub fn calls(&self) -> Vec<MockCall> {
        lock(&self.calls).clone()
    }

    /// Number of calls made to a provider
    pub fn call_count(&self, provider: &str) -> usize {
        lock(&self.calls)
            .iter()
            .filter(|c| c.provider == provider)
            .count()
    }

    fn next_outcome(&self, provider: &str) -> MockOutcome {
        if let Some(outcome) = lock(&self.queued)
            .get_mut(provider)
            .and_then(VecDeque::pop_front)
        {
            return outcome;
        }
        lock(&self.standing)
            .get(provider)
            .cloned()
            .unwrap_or_else(|| MockOutcome::Reply("mock reply".into()))
    }
}

#[async_trait]
impl ChatTransport for MockTransport {
    async fn complete(&self, call: ProviderCall<'_>) -> Result<String> {
        let provider = call.spec.name.clone();
        let proxied = call.proxy.is_some();

        lock(&self.calls).push(MockCall {
            provider: provider.clone(),
            model: call.model.to_string(),
            proxied,
            fingerprint: fingerprint(call.credential),
            system: call.request.system.clone(),
            messages: call.request.messages.clone(),
        });

        if proxied && self.broken_proxy.load(Ordering::SeqCst) {
            return Err(Error::Transport {
                provider,
                proxied,
                message: "proxy tunnel failed".into(),
            });
        }

        match self.next_outcome(&provider) {
            MockOutcome::Reply(text) => Ok(text),
            MockOutcome::Status(status) => Err(Error::ProviderStatus {
                provider,
                status,
                body: "scripted failure".into(),
            }),
            MockOutcome::Transport => Err(Error::Transport {
                provider,
                proxied,
                message: "connection refused".into(),
            }),
            MockOutcome::Blocked(reason) => Err(Error::Blocked { provider, reason }),
            MockOutcome::Hang => {
                tokio::time::sleep(Duration::from_secs(3600)).await;
                Err(Error::Transport {
                    provider,
                    proxied,
                    message: "hung call finished".into(),
                })
            }
        }
    }
}
