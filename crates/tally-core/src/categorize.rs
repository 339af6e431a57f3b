//! Expense categorization
//!
//! Assigns a free-text expense description to one of the user's own
//! categories through the `categorization` route. When every provider fails,
//! or the model answers with something that is not one of the categories, a
//! keyword table picks the category instead.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::ai::parsing::parse_category_suggestion;
use crate::ai::ChatRequest;
use crate::config::OperationType;
use crate::error::{Error, Result};
use crate::prompts::Prompt;
use crate::router::ProviderRouter;

/// Where a category came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "source", rename_all = "snake_case")]
pub enum CategorySource {
    Model { provider: String },
    Keywords,
    Fallback,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Categorization {
    pub category: String,
    pub confidence: f64,
    #[serde(flatten)]
    pub source: CategorySource,
}

/// Keyword rule: category names containing a hint receive descriptions
/// containing a keyword
struct KeywordRule {
    hints: &'static [&'static str],
    keywords: &'static [&'static str],
}

const KEYWORD_RULES: &[KeywordRule] = &[
    KeywordRule {
        hints: &["cafe", "restaurant", "dining", "кафе", "ресторан"],
        keywords: &[
            "coffee", "cafe", "restaurant", "pizza", "burger", "кофе", "кафе", "ресторан",
            "пицц", "бургер", "шаурм",
        ],
    },
    KeywordRule {
        hints: &["food", "grocer", "еда", "продукт"],
        keywords: &[
            "grocery", "supermarket", "market", "продукт", "магазин", "пятероч", "перекрест",
            "магнит", "ашан", "лента",
        ],
    },
    KeywordRule {
        hints: &["transport", "taxi", "car", "транспорт", "такси", "авто"],
        keywords: &[
            "uber", "taxi", "metro", "bus", "fuel", "gas station", "такси", "метро", "автобус",
            "бензин", "азс", "парковк",
        ],
    },
    KeywordRule {
        hints: &["health", "pharmacy", "medic", "здоров", "аптек", "медиц"],
        keywords: &["pharmacy", "doctor", "clinic", "dentist", "аптек", "врач", "клиник", "стоматолог"],
    },
    KeywordRule {
        hints: &["entertainment", "fun", "развлеч", "досуг"],
        keywords: &["cinema", "movie", "netflix", "spotify", "concert", "кино", "концерт", "театр"],
    },
    KeywordRule {
        hints: &["utilit", "bills", "коммун", "жкх", "связь"],
        keywords: &[
            "electricity", "water", "internet", "mobile", "rent", "электр", "вода", "интернет",
            "связь", "квартплат", "жкх",
        ],
    },
    KeywordRule {
        hints: &["cloth", "apparel", "одежд"],
        keywords: &["zara", "shoes", "jacket", "shirt", "обув", "одежд", "куртк"],
    },
];

/// Names used for the catch-all category
const FALLBACK_NAMES: &[&str] = &["other", "misc", "другое", "прочее", "разное"];

/// Keyword-only categorization
pub fn categorize_by_keywords(description: &str, categories: &[String]) -> Option<String> {
    let text = description.to_lowercase();

    // A category named outright wins
    if let Some(named) = categories
        .iter()
        .find(|c| !c.trim().is_empty() && text.contains(&c.to_lowercase()))
    {
        return Some(named.clone());
    }

    KEYWORD_RULES
        .iter()
        .filter(|rule| rule.keywords.iter().any(|k| text.contains(k)))
        .find_map(|rule| {
            categories.iter().find(|c| {
                let name = c.to_lowercase();
                rule.hints.iter().any(|h| name.contains(h))
            })
        })
        .cloned()
}

/// Categorizes expenses via the provider router
pub struct Categorizer {
    router: Arc<ProviderRouter>,
    prompt: Prompt,
    fallback_category: Option<String>,
}

impl Categorizer {
    pub fn new(router: Arc<ProviderRouter>, prompt: Prompt) -> Self {
        Self {
            router,
            prompt,
            fallback_category: None,
        }
    }

    /// Category used when nothing matches; must be one of the user's
    pub fn with_fallback_category(mut self, category: &str) -> Self {
        self.fallback_category = Some(category.to_string());
        self
    }

    fn fallback_for(&self, categories: &[String]) -> String {
        let configured = self
            .fallback_category
            .as_ref()
            .and_then(|f| find_category(categories, f));
        configured
            .or_else(|| {
                categories
                    .iter()
                    .find(|c| FALLBACK_NAMES.contains(&c.to_lowercase().as_str()))
                    .cloned()
            })
            .or_else(|| categories.last().cloned())
            .unwrap_or_default()
    }

    /// Pick one of `categories` for an expense
    pub async fn categorize(
        &self,
        description: &str,
        amount: Option<f64>,
        categories: &[String],
    ) -> Result<Categorization> {
        if categories.is_empty() {
            return Err(Error::InvalidData("No categories to choose from".into()));
        }
        let fallback = self.fallback_for(categories);

        let joined = categories.join(", ");
        let amount = amount.map(|a| format!("{:.2}", a)).unwrap_or_default();
        let mut vars: HashMap<&str, &str> = HashMap::new();
        vars.insert("fallback", &fallback);
        vars.insert("categories", &joined);
        vars.insert("description", description);
        vars.insert("amount", &amount);

        let request = ChatRequest::new(self.prompt.render_user(&vars))
            .with_system(self.prompt.render_system(&vars))
            .with_temperature(0.0)
            .with_max_tokens(128);

        match self.router.route(OperationType::Categorization, &request).await {
            Ok(reply) => match parse_category_suggestion(&reply.text) {
                Ok(Some(suggestion)) => {
                    if let Some(category) = find_category(categories, &suggestion.category) {
                        info!(provider = %reply.provider, category = %category, "Expense categorized");
                        return Ok(Categorization {
                            category,
                            confidence: suggestion.confidence,
                            source: CategorySource::Model {
                                provider: reply.provider,
                            },
                        });
                    }
                    debug!(suggested = %suggestion.category, "Suggestion is not a known category");
                }
                Ok(None) => debug!("Low-confidence category suggestion"),
                Err(e) => debug!(error = %e, "Unparseable category reply"),
            },
            Err(e) => warn!(error = %e, "Categorization providers failed, using keywords"),
        }

        Ok(match categorize_by_keywords(description, categories) {
            Some(category) => Categorization {
                category,
                confidence: 0.5,
                source: CategorySource::Keywords,
            },
            None => Categorization {
                category: fallback,
                confidence: 0.0,
                source: CategorySource::Fallback,
            },
        })
    }
}

/// Case-insensitive lookup returning the user's spelling
fn find_category(categories: &[String], name: &str) -> Option<String> {
    let name = name.trim().to_lowercase();
    categories
        .iter()
        .find(|c| c.trim().to_lowercase() == name)
        .cloned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::MockOutcome;
    use crate::prompts::PromptId;
    use crate::test_utils::mock_router;

    fn categories(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn categorizer(providers: &[&str]) -> (Categorizer, crate::test_utils::MockRouter) {
        let mock = mock_router(providers);
        let prompt = Prompt::embedded(PromptId::CategorizeExpense).unwrap();
        (Categorizer::new(mock.router.clone(), prompt), mock)
    }

    #[test]
    fn test_keywords() {
        let cats = categories(&["Еда", "Транспорт", "Кафе", "Другое"]);
        assert_eq!(categorize_by_keywords("Такси до дома", &cats), Some("Транспорт".into()));
        assert_eq!(categorize_by_keywords("кофе с собой", &cats), Some("Кафе".into()));
        assert_eq!(categorize_by_keywords("Пятерочка", &cats), Some("Еда".into()));
        assert_eq!(categorize_by_keywords("подарок", &cats), None);
        assert_eq!(categorize_by_keywords("еда на вынос", &cats), Some("Еда".into()));
    }

    #[tokio::test]
    async fn test_model_suggestion_used() {
        let (categorizer, mock) = categorizer(&["openai"]);
        mock.transport
            .reply_with("openai", r#"{"category": "transport", "confidence": 0.9}"#);

        let result = categorizer
            .categorize("Uber to airport", Some(25.0), &categories(&["Food", "Transport"]))
            .await
            .unwrap();
        assert_eq!(result.category, "Transport");
        assert_eq!(
            result.source,
            CategorySource::Model {
                provider: "openai".into()
            }
        );

        let call = &mock.transport.calls()[0];
        assert!(call.messages[0].content.contains("Allowed categories: Food, Transport"));
        assert!(call.messages[0].content.contains("Amount: 25.00"));
    }

    #[tokio::test]
    async fn test_unknown_suggestion_falls_back_to_keywords() {
        let (categorizer, mock) = categorizer(&["openai"]);
        mock.transport
            .reply_with("openai", r#"{"category": "Travel", "confidence": 0.9}"#);

        let result = categorizer
            .categorize("taxi", None, &categories(&["Food", "Transport"]))
            .await
            .unwrap();
        assert_eq!(result.category, "Transport");
        assert_eq!(result.source, CategorySource::Keywords);
    }

    #[tokio::test]
    async fn test_all_providers_down_uses_fallback() {
        let (categorizer, mock) = categorizer(&["openai", "groq"]);
        mock.transport.always("openai", MockOutcome::Status(500));
        mock.transport.always("groq", MockOutcome::Status(429));

        let result = categorizer
            .categorize("birthday gift", None, &categories(&["Food", "Other", "Transport"]))
            .await
            .unwrap();
        assert_eq!(result.category, "Other");
        assert_eq!(result.source, CategorySource::Fallback);
        assert_eq!(mock.transport.call_count("groq"), 1);
    }

    #[tokio::test]
    async fn test_no_categories_is_error() {
        let (categorizer, _mock) = categorizer(&["openai"]);
        assert!(categorizer.categorize("x", None, &[]).await.is_err());
    }
}
