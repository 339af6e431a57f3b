//! Provider router
//!
//! Runs one logical request for an operation type against the primary
//! provider, then down the operation's fallback chain until something
//! answers. Each provider attempt:
//!
//! 1. leases a credential from the [`CredentialRegistry`]
//! 2. calls through the proxy when the provider uses one, bounded by the
//!    operation's timeout
//! 3. on a connectivity failure over the proxy, alerts and retries once over a
//!    direct connection with a freshly leased credential
//!
//! Every attempt reports its outcome against the exact credential it used.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::ai::{ChatReply, ChatRequest, ChatTransport, ProviderCall};
use crate::config::{Config, OperationType, ProviderSpec};
use crate::credentials::{CredentialRegistry, Lease};
use crate::error::{Error, Result};
use crate::notify::Notifier;

/// Routes provider-agnostic requests across providers and credentials
pub struct ProviderRouter {
    config: Arc<Config>,
    registry: Arc<dyn CredentialRegistry>,
    transport: Arc<dyn ChatTransport>,
    notifier: Arc<dyn Notifier>,
}

impl ProviderRouter {
    pub fn new(
        config: Arc<Config>,
        registry: Arc<dyn CredentialRegistry>,
        transport: Arc<dyn ChatTransport>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            config,
            registry,
            transport,
            notifier,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Run a request for an operation using its configured primary provider
    pub async fn route(&self, operation: OperationType, request: &ChatRequest) -> Result<ChatReply> {
        let route = self.config.route_for(operation).ok_or_else(|| {
            Error::Config(format!("No providers configured for {}", operation))
        })?;
        self.execute(operation, &route.primary, request).await
    }

    /// Run a request starting at `primary`, then the fallback chain
    pub async fn execute(
        &self,
        operation: OperationType,
        primary: &str,
        request: &ChatRequest,
    ) -> Result<ChatReply> {
        let mut last_error = match self.attempt_provider(operation, primary, request).await {
            Ok(reply) => return Ok(reply),
            Err(e) => {
                warn!(operation = %operation, provider = primary, error = %e, "Primary provider failed");
                e
            }
        };

        for provider in self.fallback_chain(operation, primary) {
            debug!(operation = %operation, provider = %provider, "Trying fallback provider");
            match self.attempt_provider(operation, &provider, request).await {
                Ok(reply) => {
                    info!(operation = %operation, provider = %provider, "Served by fallback provider");
                    return Ok(reply);
                }
                Err(e) => {
                    warn!(operation = %operation, provider = %provider, error = %e, "Fallback provider failed");
                    last_error = e;
                }
            }
        }

        self.notifier.alert(format!(
            "All providers failed for {} (last error: {})",
            operation, last_error
        ));
        Err(Error::ProvidersExhausted {
            operation: operation.as_str().to_string(),
        })
    }

    /// Ordered fallbacks for an operation, computed against current pools
    ///
    /// Starts with the configured primary (when the caller chose a different
    /// one), then the configured fallbacks. Skips the caller's primary, unknown
    /// providers, duplicates and providers with no credentials.
    pub fn fallback_chain(&self, operation: OperationType, primary: &str) -> Vec<String> {
        let Some(route) = self.config.route_for(operation) else {
            return Vec::new();
        };

        let mut chain: Vec<String> = Vec::new();
        for name in std::iter::once(&route.primary).chain(route.fallbacks.iter()) {
            if name == primary
                || chain.contains(name)
                || !self.config.providers.contains_key(name)
                || self.registry.pool_size(name) == 0
            {
                continue;
            }
            chain.push(name.clone());
        }
        chain
    }

    /// One provider: proxied (if configured) then, on connectivity failure, direct
    async fn attempt_provider(
        &self,
        operation: OperationType,
        provider: &str,
        request: &ChatRequest,
    ) -> Result<ChatReply> {
        let spec = self
            .config
            .providers
            .get(provider)
            .ok_or_else(|| Error::Config(format!("Unknown provider: {}", provider)))?;

        let lease = self
            .registry
            .next_credential(provider)
            .ok_or_else(|| Error::NoCredentials(provider.to_string()))?;

        let proxy = if spec.uses_proxy {
            self.config.proxy_url.as_deref()
        } else {
            None
        };

        let error = match self.call(operation, spec, &lease, request, proxy).await {
            Ok(reply) => return Ok(reply),
            Err(e) => e,
        };

        if proxy.is_none() || !error.is_connectivity() {
            return Err(error);
        }

        self.notifier.alert(format!(
            "Proxy connection to {} failed ({}); retrying direct",
            provider, error
        ));

        let direct_lease = self
            .registry
            .next_credential(provider)
            .ok_or_else(|| Error::NoCredentials(provider.to_string()))?;
        info!(provider, index = direct_lease.index, "Retrying over direct connection");

        self.call(operation, spec, &direct_lease, request, None).await
    }

    /// A single bounded call, reported against its credential
    async fn call(
        &self,
        operation: OperationType,
        spec: &ProviderSpec,
        lease: &Lease,
        request: &ChatRequest,
        proxy: Option<&str>,
    ) -> Result<ChatReply> {
        let model = spec.model_for(operation);
        let timeout = request
            .timeout
            .unwrap_or_else(|| self.config.timeout_for(operation));

        debug!(
            operation = %operation,
            provider = %spec.name,
            model,
            index = lease.index,
            proxied = proxy.is_some(),
            "Provider attempt"
        );

        let call = ProviderCall {
            spec,
            model,
            credential: &lease.credential,
            request,
            proxy,
        };

        let result = match tokio::time::timeout(timeout, self.transport.complete(call)).await {
            Ok(result) => result,
            Err(_) => Err(Error::Timeout {
                provider: spec.name.clone(),
                secs: timeout_secs(timeout),
            }),
        };

        let result = result.and_then(|text| {
            if text.trim().is_empty() {
                Err(Error::Blocked {
                    provider: spec.name.clone(),
                    reason: "empty reply".into(),
                })
            } else {
                Ok(text)
            }
        });

        match result {
            Ok(text) => {
                self.registry.report_success(&spec.name, lease.index);
                Ok(ChatReply {
                    text,
                    provider: spec.name.clone(),
                    model: model.to_string(),
                    proxied: proxy.is_some(),
                })
            }
            Err(e) => {
                if e.is_credential_failure() {
                    self.registry
                        .report_failure(&spec.name, lease.index, &e.to_string());
                } else {
                    self.registry.report_success(&spec.name, lease.index);
                }
                Err(e)
            }
        }
    }
}

fn timeout_secs(timeout: Duration) -> u64 {
    timeout.as_secs().max(1)
}
