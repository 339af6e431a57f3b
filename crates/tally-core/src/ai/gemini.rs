//! Gemini `generateContent` codec
//!
//! Gemini names the assistant role `model`, carries the system prompt in
//! `systemInstruction`, and may refuse to answer because of its safety
//! filters. A refusal comes back either as `promptFeedback.blockReason` or as
//! a candidate with `finishReason: SAFETY` and no text.

use serde::{Deserialize, Serialize};

use crate::ai::types::Role;
use crate::error::Result;

use super::{blocked, ProviderCall};

/// Harm categories the safety threshold applies to
const HARM_CATEGORIES: &[&str] = &[
    "HARM_CATEGORY_HARASSMENT",
    "HARM_CATEGORY_HATE_SPEECH",
    "HARM_CATEGORY_SEXUALLY_EXPLICIT",
    "HARM_CATEGORY_DANGEROUS_CONTENT",
];

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct GenerateContentRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    safety_settings: Vec<SafetySetting<'a>>,
}

#[derive(Debug, Serialize)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Debug, Serialize)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    temperature: f32,
    max_output_tokens: u32,
}

#[derive(Debug, Serialize)]
struct SafetySetting<'a> {
    category: &'a str,
    threshold: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<ResponseContent>,
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ResponseContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    block_reason: Option<String>,
}

pub(super) fn build_request<'a>(call: &ProviderCall<'a>) -> GenerateContentRequest<'a> {
    let system_instruction = call.request.system.as_deref().map(|text| Content {
        role: None,
        parts: vec![Part { text }],
    });

    let contents = call
        .request
        .messages
        .iter()
        .map(|m| Content {
            role: Some(match m.role {
                Role::User => "user",
                Role::Assistant => "model",
            }),
            parts: vec![Part { text: &m.content }],
        })
        .collect();

    let safety_settings = call
        .safety()
        .map(|threshold| {
            HARM_CATEGORIES
                .iter()
                .copied()
                .map(|category| SafetySetting {
                    category,
                    threshold,
                })
                .collect()
        })
        .unwrap_or_default();

    GenerateContentRequest {
        system_instruction,
        contents,
        generation_config: GenerationConfig {
            temperature: call.request.temperature,
            max_output_tokens: call.request.max_tokens,
        },
        safety_settings,
    }
}

pub(super) fn parse_response(provider: &str, body: &str) -> Result<String> {
    let response: GenerateContentResponse = serde_json::from_str(body)?;

    if let Some(reason) = response.prompt_feedback.and_then(|f| f.block_reason) {
        return Err(blocked(provider, reason));
    }

    let Some(candidate) = response.candidates.into_iter().next() else {
        return Err(blocked(provider, "no candidates"));
    };

    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();

    if text.trim().is_empty() {
        return Err(blocked(
            provider,
            candidate.finish_reason.unwrap_or_else(|| "empty".into()),
        ));
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::types::{ChatMessage, ChatRequest};
    use crate::config::{ProviderKind, ProviderSpec};
    use crate::error::Error;
    use secrecy::SecretString;

    fn spec() -> ProviderSpec {
        let mut spec = ProviderSpec::new("gemini", ProviderKind::Gemini, "http://x", "gemini-2.0-flash");
        spec.safety = Some("BLOCK_ONLY_HIGH".into());
        spec
    }

    #[test]
    fn test_request_serialization() {
        let spec = spec();
        let key = SecretString::from("k".to_string());
        let request = ChatRequest::new("q")
            .with_system("sys")
            .with_messages(vec![ChatMessage::user("a"), ChatMessage::assistant("b"), ChatMessage::user("q")]);
        let call = ProviderCall {
            spec: &spec,
            model: "gemini-2.0-flash",
            credential: &key,
            request: &request,
            proxy: None,
        };

        let json = serde_json::to_value(build_request(&call)).unwrap();
        assert_eq!(json["systemInstruction"]["parts"][0]["text"], "sys");
        assert!(json["systemInstruction"].get("role").is_none());
        assert_eq!(json["contents"][1]["role"], "model");
        assert_eq!(json["contents"][2]["parts"][0]["text"], "q");
        assert_eq!(json["generationConfig"]["maxOutputTokens"], 1024);
        assert_eq!(json["safetySettings"].as_array().unwrap().len(), 4);
        assert_eq!(json["safetySettings"][0]["threshold"], "BLOCK_ONLY_HIGH");
    }

    #[test]
    fn test_parts_concatenated() {
        let body = r#"{
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "FUNCTION_CALL: "}, {"text": "get_weekly_totals()"}]},
                "finishReason": "STOP"
            }]
        }"#;
        assert_eq!(
            parse_response("gemini", body).unwrap(),
            "FUNCTION_CALL: get_weekly_totals()"
        );
    }

    #[test]
    fn test_safety_block() {
        let body = r#"{"candidates": [{"finishReason": "SAFETY"}]}"#;
        match parse_response("gemini", body) {
            Err(Error::Blocked { reason, .. }) => assert_eq!(reason, "SAFETY"),
            other => panic!("expected Blocked, got {:?}", other),
        }

        let body = r#"{"promptFeedback": {"blockReason": "OTHER"}}"#;
        assert!(matches!(
            parse_response("gemini", body),
            Err(Error::Blocked { .. })
        ));
    }
}
