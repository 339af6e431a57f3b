//! OpenAI-compatible `/chat/completions` codec
//!
//! Used for OpenAI itself and for Groq, DeepSeek, OpenRouter and any other
//! provider exposing the same API.

use serde::{Deserialize, Serialize};

use crate::error::Result;

use super::{blocked, ProviderCall};

/// OpenAI chat completion request
#[derive(Debug, Serialize)]
pub(super) struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

/// OpenAI chat completion response
#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ResponseMessage,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

pub(super) fn build_request<'a>(call: &ProviderCall<'a>) -> ChatCompletionRequest<'a> {
    let mut messages = Vec::with_capacity(call.request.messages.len() + 1);
    if let Some(system) = call.request.system.as_deref() {
        messages.push(WireMessage {
            role: "system",
            content: system,
        });
    }
    messages.extend(call.request.messages.iter().map(|m| WireMessage {
        role: m.role.as_str(),
        content: &m.content,
    }));

    ChatCompletionRequest {
        model: call.model,
        messages,
        temperature: call.request.temperature,
        max_tokens: call.request.max_tokens,
        stream: false,
    }
}

pub(super) fn parse_response(provider: &str, body: &str) -> Result<String> {
    let response: ChatCompletionResponse = serde_json::from_str(body)?;
    let Some(choice) = response.choices.into_iter().next() else {
        return Err(blocked(provider, "no choices"));
    };

    if choice.finish_reason.as_deref() == Some("content_filter") {
        return Err(blocked(provider, "content_filter"));
    }

    match choice.message.content {
        Some(text) if !text.trim().is_empty() => Ok(text),
        _ => Err(blocked(
            provider,
            choice.finish_reason.unwrap_or_else(|| "empty".into()),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{ChatMessage, ChatRequest};
    use crate::config::{ProviderKind, ProviderSpec};
    use crate::error::Error;
    use secrecy::SecretString;

    #[test]
    fn test_request_serialization() {
        let spec = ProviderSpec::new("openai", ProviderKind::OpenAICompatible, "http://x", "gpt");
        let key = SecretString::from("k".to_string());
        let request = ChatRequest::new("Hello")
            .with_system("sys")
            .with_messages(vec![ChatMessage::user("earlier"), ChatMessage::assistant("ok"), ChatMessage::user("Hello")]);
        let call = ProviderCall {
            spec: &spec,
            model: "gpt-4o-mini",
            credential: &key,
            request: &request,
            proxy: None,
        };

        let json = serde_json::to_value(build_request(&call)).unwrap();
        assert_eq!(json["model"], "gpt-4o-mini");
        assert_eq!(json["messages"][0]["role"], "system");
        assert_eq!(json["messages"][0]["content"], "sys");
        assert_eq!(json["messages"][2]["role"], "assistant");
        assert_eq!(json["messages"][3]["content"], "Hello");
        assert_eq!(json["stream"], false);
        let temp = json["temperature"].as_f64().unwrap();
        assert!((temp - 0.1).abs() < 0.001);
    }

    #[test]
    fn test_response_deserialization() {
        let body = r#"{
            "id": "chatcmpl-123",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "FUNCTION_CALL: get_daily_totals(days=7)"},
                "finish_reason": "stop"
            }]
        }"#;
        assert_eq!(
            parse_response("openai", body).unwrap(),
            "FUNCTION_CALL: get_daily_totals(days=7)"
        );
    }

    #[test]
    fn test_content_filter_is_blocked() {
        let body = r#"{"choices": [{"message": {"content": null}, "finish_reason": "content_filter"}]}"#;
        assert!(matches!(
            parse_response("openai", body),
            Err(Error::Blocked { .. })
        ));
    }

    #[test]
    fn test_empty_choices_is_blocked() {
        assert!(matches!(
            parse_response("groq", r#"{"choices": []}"#),
            Err(Error::Blocked { .. })
        ));
        assert!(matches!(parse_response("groq", "not json"), Err(Error::Json(_))));
    }
}
