//! JSON parsing helpers for provider replies
//!
//! Models often wrap JSON in prose or markdown fences. These helpers pull out
//! the outermost object and deserialize it.

use serde::de::DeserializeOwned;

use crate::error::{Error, Result};

use super::types::CategorySuggestion;

/// Minimum confidence for a category suggestion to be accepted
pub const CATEGORY_CONFIDENCE_THRESHOLD: f64 = 0.4;

/// Extract and deserialize the outermost JSON object in a reply
pub fn extract_json<T: DeserializeOwned>(response: &str) -> Result<T> {
    let response = response.trim();
    let start = response.find('{');
    let end = response.rfind('}');

    match (start, end) {
        (Some(s), Some(e)) if s < e => {
            let json_str = &response[s..=e];
            serde_json::from_str(json_str).map_err(|e| {
                Error::InvalidData(format!(
                    "Invalid JSON from provider: {} | Raw: {}",
                    e,
                    preview(json_str)
                ))
            })
        }
        _ => Err(Error::InvalidData(format!(
            "No JSON found in provider reply | Raw: {}",
            preview(response)
        ))),
    }
}

/// Parse a category suggestion, rejecting low-confidence answers
pub fn parse_category_suggestion(response: &str) -> Result<Option<CategorySuggestion>> {
    let suggestion: CategorySuggestion = extract_json(response)?;
    if suggestion.category.trim().is_empty() || suggestion.confidence < CATEGORY_CONFIDENCE_THRESHOLD {
        return Ok(None);
    }
    Ok(Some(suggestion))
}

/// First 200 chars for error messages
fn preview(text: &str) -> String {
    if text.chars().count() > 200 {
        format!("{}...", text.chars().take(200).collect::<String>())
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_json_with_fences() {
        let reply = "Sure!\n```json\n{\"category\": \"Groceries\", \"confidence\": 0.9}\n```";
        let suggestion: CategorySuggestion = extract_json(reply).unwrap();
        assert_eq!(suggestion.category, "Groceries");
    }

    #[test]
    fn test_extract_json_missing() {
        let result: Result<CategorySuggestion> = extract_json("I cannot help with that");
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_low_confidence_rejected() {
        let reply = r#"{"category": "Transport", "confidence": 0.2}"#;
        assert!(parse_category_suggestion(reply).unwrap().is_none());

        let reply = r#"{"category": "Transport", "confidence": 0.8}"#;
        assert_eq!(
            parse_category_suggestion(reply).unwrap().unwrap().category,
            "Transport"
        );
    }

    #[test]
    fn test_preview_is_char_safe() {
        let long = "ж".repeat(300);
        assert_eq!(preview(&long).chars().count(), 203);
    }
}
