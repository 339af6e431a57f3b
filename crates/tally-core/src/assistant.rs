//! User-query pipeline
//!
//! intent detection → normalization → dispatch → formatting, with an optional
//! insight paragraph for aggregate answers. Every failure ends as a short
//! localized sentence; nothing propagates to the messaging layer.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::ai::ChatMessage;
use crate::clock::Clock;
use crate::dispatch::{Dispatcher, FunctionResult};
use crate::error::Result;
use crate::format::{Formatter, Locale, Text};
use crate::functions::catalog;
use crate::insights::InsightWriter;
use crate::intent::{Intent, IntentParser};
use crate::normalize::{NormalizedCall, Normalizer};
use crate::prompts::{PromptId, PromptLibrary};
use crate::router::ProviderRouter;

/// Outcome of one user turn
#[derive(Debug, Clone)]
pub struct Answer {
    /// Text for the user
    pub text: String,
    /// The executed call, when the model asked for one
    pub call: Option<NormalizedCall>,
    pub result: Option<FunctionResult>,
}

impl Answer {
    fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            call: None,
            result: None,
        }
    }
}

pub struct Assistant {
    intents: IntentParser,
    normalizer: Normalizer,
    dispatcher: Dispatcher,
    formatter: Formatter,
    insights: Option<InsightWriter>,
    catalog: String,
}

impl Assistant {
    pub fn new(
        router: Arc<ProviderRouter>,
        prompts: &mut PromptLibrary,
        dispatcher: Dispatcher,
        clock: Arc<dyn Clock>,
    ) -> Result<Self> {
        let prompt = prompts.get(PromptId::IntentDetection)?.clone();
        let formatter = Formatter::from_config(router.config());
        Ok(Self {
            intents: IntentParser::new(router, prompt, clock.clone()),
            normalizer: Normalizer::new(clock),
            dispatcher,
            formatter,
            insights: None,
            catalog: catalog(),
        })
    }

    /// Append a narrative paragraph to aggregate answers
    pub fn with_insights(mut self, writer: InsightWriter) -> Self {
        self.insights = Some(writer);
        self
    }

    /// Answer one user message
    pub async fn handle_user_query(
        &self,
        user_id: i64,
        text: &str,
        context: &[ChatMessage],
        locale: Locale,
    ) -> String {
        self.answer(user_id, text, context, locale).await.text
    }

    /// Answer one user message, keeping the intermediate call and result
    pub async fn answer(
        &self,
        user_id: i64,
        text: &str,
        context: &[ChatMessage],
        locale: Locale,
    ) -> Answer {
        let intent = match self
            .intents
            .detect_function_call(text, context, &self.catalog)
            .await
        {
            Ok(intent) => intent,
            Err(e) => {
                warn!(error = %e, "Intent detection failed");
                return Answer::text(locale.text(Text::ServiceUnavailable));
            }
        };

        let call = match intent {
            Intent::Text(reply) => return Answer::text(reply),
            Intent::Call(call) => call,
        };

        let normalized = match self
            .normalizer
            .normalize(&call.name, &call.raw_args, user_id, text)
        {
            Ok(normalized) => normalized,
            Err(e) => {
                warn!(function = %call.name, error = %e, "Call rejected");
                let result = FunctionResult::not_found(&call.name);
                return Answer {
                    text: self.formatter.render(&call.name, &result, locale),
                    call: None,
                    result: Some(result),
                };
            }
        };

        info!(function = %normalized.function, "Running function");
        let mut result = self.dispatcher.run(&normalized).await;
        if result.success() {
            for key in ["start_date", "end_date"] {
                if let Some(value) = normalized.args.get(key) {
                    result.set_default(key, value.clone());
                }
            }
        }

        let mut text_out = self.formatter.render(normalized.name(), &result, locale);

        if let Some(writer) = &self.insights {
            if result.success() && InsightWriter::applies_to(normalized.function) {
                match writer
                    .write(text, normalized.function, &result, locale)
                    .await
                {
                    Ok(insight) if !insight.is_empty() => {
                        text_out = format!("{}\n\n💡 {}", text_out, insight);
                    }
                    Ok(_) => {}
                    Err(e) => debug!(error = %e, "Insight skipped"),
                }
            }
        }

        Answer {
            text: text_out,
            call: Some(normalized),
            result: Some(result),
        }
    }
}
