//! Error types for Tally

use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("HTTP request error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("CSV parsing error: {0}")]
    Csv(#[from] csv::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("Config error: {0}")]
    Config(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// No usable credential in the provider's pool
    #[error("No credentials available for provider {0}")]
    NoCredentials(String),

    /// Connectivity failure (connect, proxy tunnel, proxy auth)
    #[error("Transport error from {provider} (proxied: {proxied}): {message}")]
    Transport {
        provider: String,
        proxied: bool,
        message: String,
    },

    /// Per-call timeout elapsed
    #[error("Provider {provider} timed out after {secs}s")]
    Timeout { provider: String, secs: u64 },

    /// Provider answered with a non-success status
    #[error("Provider {provider} returned {status}: {body}")]
    ProviderStatus {
        provider: String,
        status: u16,
        body: String,
    },

    /// Provider returned no text (content filter or empty candidate list)
    #[error("Provider {provider} returned an empty or blocked reply: {reason}")]
    Blocked { provider: String, reason: String },

    /// Primary provider and the whole fallback chain failed
    #[error("All providers failed for operation {operation}")]
    ProvidersExhausted { operation: String },

    #[error("Unknown function: {0}")]
    UnknownFunction(String),
}

impl Error {
    /// Whether this failure should trigger a direct-connection retry when the
    /// request went through a proxy.
    pub fn is_connectivity(&self) -> bool {
        match self {
            Error::Transport { .. } | Error::Timeout { .. } => true,
            Error::Http(e) => e.is_connect() || e.is_timeout(),
            _ => false,
        }
    }

    /// Whether the credential used for the attempt should be put into cooldown.
    ///
    /// Blocked replies and malformed bodies are not the key's fault.
    pub fn is_credential_failure(&self) -> bool {
        !matches!(
            self,
            Error::Blocked { .. } | Error::Json(_) | Error::InvalidData(_)
        )
    }

    /// Whether the user should see the "service unavailable" sentence.
    pub fn is_service_unavailable(&self) -> bool {
        matches!(
            self,
            Error::ProvidersExhausted { .. } | Error::NoCredentials(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_connectivity_classification() {
        let transport = Error::Transport {
            provider: "openai".into(),
            proxied: true,
            message: "tunnel failed".into(),
        };
        assert!(transport.is_connectivity());

        let timeout = Error::Timeout {
            provider: "openai".into(),
            secs: 30,
        };
        assert!(timeout.is_connectivity());

        let status = Error::ProviderStatus {
            provider: "openai".into(),
            status: 500,
            body: "boom".into(),
        };
        assert!(!status.is_connectivity());
        assert!(status.is_credential_failure());
    }

    #[test]
    fn test_blocked_is_not_credential_failure() {
        let blocked = Error::Blocked {
            provider: "gemini".into(),
            reason: "SAFETY".into(),
        };
        assert!(!blocked.is_credential_failure());
        assert!(!blocked.is_service_unavailable());
    }

    #[test]
    fn test_service_unavailable() {
        assert!(Error::ProvidersExhausted {
            operation: "chat".into()
        }
        .is_service_unavailable());
        assert!(Error::NoCredentials("groq".into()).is_service_unavailable());
        assert!(!Error::UnknownFunction("x".into()).is_service_unavailable());
    }
}
