//! Provider-agnostic request and reply types

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
        }
    }

    /// Create an assistant message
    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
        }
    }
}

/// A chat completion request, independent of any provider's wire format
#[derive(Debug, Clone)]
pub struct ChatRequest {
    /// System instruction
    pub system: Option<String>,
    /// Conversation, oldest first; the last message is the one to answer
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    /// Maximum output tokens
    pub max_tokens: u32,
    /// Overrides the per-operation timeout
    pub timeout: Option<Duration>,
    /// Content-filter threshold; falls back to the provider's configured one
    pub safety: Option<String>,
}

impl ChatRequest {
    /// Single user message with defaults suited to function detection
    pub fn new(user: impl Into<String>) -> Self {
        Self {
            system: None,
            messages: vec![ChatMessage::user(user)],
            temperature: 0.1,
            max_tokens: 1024,
            timeout: None,
            safety: None,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    /// Replace the conversation (context turns followed by the new message)
    pub fn with_messages(mut self, messages: Vec<ChatMessage>) -> Self {
        self.messages = messages;
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// A successful completion
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatReply {
    /// Reply text
    pub text: String,
    /// Provider that produced it
    pub provider: String,
    /// Model that produced it
    pub model: String,
    /// Whether the winning attempt went through the proxy
    pub proxied: bool,
}

/// Category chosen for an expense by a provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySuggestion {
    pub category: String,
    /// Missing confidence counts as certain
    #[serde(default = "full_confidence")]
    pub confidence: f64,
}

fn full_confidence() -> f64 {
    1.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = ChatRequest::new("hello")
            .with_system("be brief")
            .with_temperature(0.7)
            .with_max_tokens(64);
        assert_eq!(request.system.as_deref(), Some("be brief"));
        assert_eq!(request.messages, vec![ChatMessage::user("hello")]);
        assert_eq!(request.max_tokens, 64);
        assert!(request.timeout.is_none());
    }

    #[test]
    fn test_role_serialization() {
        let json = serde_json::to_value(ChatMessage::assistant("hi")).unwrap();
        assert_eq!(json["role"], "assistant");
        assert_eq!(Role::User.as_str(), "user");
    }
}
