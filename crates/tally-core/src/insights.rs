//! Narrative insights for aggregate answers
//!
//! Sends a function result through the `insights` route and returns a few
//! sentences about it in the user's language.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::ai::ChatRequest;
use crate::config::OperationType;
use crate::dispatch::FunctionResult;
use crate::error::Result;
use crate::format::Locale;
use crate::functions::{FunctionName, ResultShape};
use crate::prompts::Prompt;
use crate::router::ProviderRouter;

/// Largest serialized result sent to the model, in characters
const MAX_DATA_CHARS: usize = 4000;

pub struct InsightWriter {
    router: Arc<ProviderRouter>,
    prompt: Prompt,
}

impl InsightWriter {
    pub fn new(router: Arc<ProviderRouter>, prompt: Prompt) -> Self {
        Self { router, prompt }
    }

    /// Whether a result of this function is worth narrating
    pub fn applies_to(function: FunctionName) -> bool {
        matches!(
            function.result_shape(),
            ResultShape::Aggregate | ResultShape::Comparison | ResultShape::Summary
        )
    }

    pub async fn write(
        &self,
        question: &str,
        function: FunctionName,
        result: &FunctionResult,
        locale: Locale,
    ) -> Result<String> {
        let mut data = serde_json::to_string_pretty(result.payload())?;
        if data.chars().count() > MAX_DATA_CHARS {
            data = data.chars().take(MAX_DATA_CHARS).collect();
        }

        let mut vars: HashMap<&str, &str> = HashMap::new();
        vars.insert("language", locale.language());
        vars.insert("question", question);
        vars.insert("function", function.as_str());
        vars.insert("data", &data);

        let request = ChatRequest::new(self.prompt.render_user(&vars))
            .with_system(self.prompt.render_system(&vars))
            .with_temperature(0.4)
            .with_max_tokens(400);

        let reply = self.router.route(OperationType::Insights, &request).await?;
        info!(provider = %reply.provider, model = %reply.model, function = %function, "Insight written");
        Ok(reply.text.trim().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompts::PromptId;
    use crate::test_utils::mock_router;
    use serde_json::json;

    #[test]
    fn test_applies_to() {
        assert!(InsightWriter::applies_to(FunctionName::GetExpensesByCategory));
        assert!(InsightWriter::applies_to(FunctionName::ComparePeriods));
        assert!(!InsightWriter::applies_to(FunctionName::GetExpensesList));
    }

    #[tokio::test]
    async fn test_write_sends_data_and_language() {
        let mock = mock_router(&["openai"]);
        mock.transport.reply_with("openai", "  Food dominates.  ");
        let writer = InsightWriter::new(
            mock.router.clone(),
            Prompt::embedded(PromptId::WriteInsights).unwrap(),
        );

        let result = FunctionResult::from_value(json!({ "total": 100, "buckets": [] }));
        let text = writer
            .write("на что трачу?", FunctionName::GetExpensesByCategory, &result, Locale::Ru)
            .await
            .unwrap();
        assert_eq!(text, "Food dominates.");

        let call = &mock.transport.calls()[0];
        assert!(call.system.as_deref().unwrap().contains("Russian"));
        assert!(call.messages[0].content.contains("get_expenses_by_category"));
        assert!(call.messages[0].content.contains("\"total\": 100"));
    }
}
