//! Anthropic Messages API codec

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{blocked, ProviderCall};

/// Value of the `anthropic-version` header
pub(super) const API_VERSION: &str = "2023-06-01";

/// Anthropic Messages API request
#[derive(Debug, Serialize)]
pub(super) struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<&'a str>,
    temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str, // "user", "assistant"
    content: &'a str,
}

/// Anthropic Messages API response
#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    stop_reason: Option<String>, // "end_turn", "max_tokens", "refusal"
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
enum ContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

pub(super) fn build_request<'a>(call: &ProviderCall<'a>) -> MessagesRequest<'a> {
    MessagesRequest {
        model: call.model,
        max_tokens: call.request.max_tokens,
        messages: call
            .request
            .messages
            .iter()
            .map(|m| Message {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect(),
        system: call.request.system.as_deref(),
        temperature: call.request.temperature,
    }
}

pub(super) fn parse_response(provider: &str, body: &str) -> Result<String> {
    let response: MessagesResponse = serde_json::from_str(body)?;

    if response.stop_reason.as_deref() == Some("refusal") {
        return Err(blocked(provider, "refusal"));
    }

    let text: Vec<String> = response
        .content
        .into_iter()
        .filter_map(|block| match block {
            ContentBlock::Text { text } => Some(text),
            ContentBlock::Other => None,
        })
        .collect();
    let text = text.join("\n");

    if text.trim().is_empty() {
        return Err(blocked(
            provider,
            response.stop_reason.unwrap_or_else(|| "empty".into()),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::ChatRequest;
    use crate::config::{ProviderKind, ProviderSpec};
    use crate::error::Error;
    use secrecy::SecretString;

    #[test]
    fn test_request_serialization() {
        let spec = ProviderSpec::new("anthropic", ProviderKind::Anthropic, "http://x", "claude");
        let key = SecretString::from("k".to_string());
        let request = ChatRequest::new("Hi").with_max_tokens(256);
        let call = ProviderCall {
            spec: &spec,
            model: "claude",
            credential: &key,
            request: &request,
            proxy: None,
        };

        let json = serde_json::to_value(build_request(&call)).unwrap();
        assert_eq!(json["max_tokens"], 256);
        assert_eq!(json["messages"][0]["role"], "user");
        assert!(json.get("system").is_none());
    }

    #[test]
    fn test_text_blocks_joined() {
        let body = r#"{
            "id": "msg_1",
            "type": "message",
            "role": "assistant",
            "content": [
                {"type": "text", "text": "First"},
                {"type": "tool_use", "id": "t", "name": "x", "input": {}},
                {"type": "text", "text": "Second"}
            ],
            "stop_reason": "end_turn"
        }"#;
        assert_eq!(parse_response("anthropic", body).unwrap(), "First\nSecond");
    }

    #[test]
    fn test_refusal_is_blocked() {
        let body = r#"{"content": [], "stop_reason": "refusal"}"#;
        assert!(matches!(
            parse_response("anthropic", body),
            Err(Error::Blocked { .. })
        ));
    }
}
