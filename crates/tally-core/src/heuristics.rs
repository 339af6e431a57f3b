//! Keyword rule tables for intent recovery and correction
//!
//! Models sometimes answer with a garbled function name, or pick the
//! "largest" function when the user asked for the smallest. These tables read
//! the user's own words (English or Russian, matched as lowercase substrings)
//! to recover or correct the intent.

use crate::functions::{Entity, FunctionName};

/// A function picked when every group has at least one marker in the text
struct RemapRule {
    function: FunctionName,
    all_of: &'static [&'static [&'static str]],
}

const MAXIMUM: &[&str] = &[
    "largest",
    "biggest",
    "max",
    "highest",
    "most expensive",
    "крупн",
    "наибольш",
    "максимальн",
    "самый большой",
    "самая большая",
    "самую большую",
    "самый дорог",
    "самая дорог",
    "самую дорог",
];

const MINIMUM: &[&str] = &[
    "smallest",
    "minimum",
    "minimal",
    "cheapest",
    "lowest",
    "least expensive",
    "минимальн",
    "наименьш",
    "самый маленький",
    "самая маленькая",
    "самую маленькую",
    "самый дешев",
    "самая дешев",
    "самую дешев",
    "самое дешев",
];

const INCOME: &[&str] = &[
    "income",
    "earn",
    "salary",
    "доход",
    "поступлен",
    "зарплат",
    "заработ",
];

const EXPENSE: &[&str] = &[
    "expense",
    "spend",
    "spent",
    "purchase",
    "bought",
    "трат",
    "расход",
    "покупк",
    "купил",
    "потрат",
];

const MIXED: &[&str] = &["transaction", "операци", "транзакци"];

/// Ordered from most to least specific; the first matching rule wins
const REMAP_RULES: &[RemapRule] = &[
    RemapRule {
        function: FunctionName::ComparePeriods,
        all_of: &[&["compare", "versus", " vs ", "сравн", "по сравнению"]],
    },
    RemapRule {
        function: FunctionName::GetMaxSingleIncome,
        all_of: &[MAXIMUM, INCOME],
    },
    RemapRule {
        function: FunctionName::GetMaxSingleExpense,
        all_of: &[MAXIMUM],
    },
    RemapRule {
        function: FunctionName::GetExpensesByCategory,
        all_of: &[&["category", "categories", "категор"]],
    },
    RemapRule {
        function: FunctionName::GetIncomeExpenseSummary,
        all_of: &[&["balance", "summary", "баланс", "итог", "сводк"]],
    },
    RemapRule {
        function: FunctionName::GetIncomeExpenseSummary,
        all_of: &[INCOME, EXPENSE],
    },
    RemapRule {
        function: FunctionName::GetDailyTotals,
        all_of: &[&["daily", "per day", "by day", "по дням", "ежедневн", "каждый день"]],
    },
    RemapRule {
        function: FunctionName::GetWeeklyTotals,
        all_of: &[&["weekly", "per week", "by week", "по неделям", "еженедельн"]],
    },
    RemapRule {
        function: FunctionName::SearchTransactions,
        all_of: &[&["find", "search", "найди", "найти", "поиск", "искать", "ищи"]],
    },
    RemapRule {
        function: FunctionName::GetIncomesList,
        all_of: &[INCOME],
    },
    RemapRule {
        function: FunctionName::GetExpensesList,
        all_of: &[EXPENSE],
    },
];

fn mentions(text: &str, markers: &[&str]) -> bool {
    markers.iter().any(|m| text.contains(m))
}

/// Pick a function from the user's wording when the model's name is unusable
pub fn remap_function(user_text: &str) -> Option<FunctionName> {
    let text = format!(" {} ", user_text.to_lowercase());
    REMAP_RULES
        .iter()
        .find(|rule| rule.all_of.iter().all(|group| mentions(&text, group)))
        .map(|rule| rule.function)
}

/// Whether the user asked for the smallest rather than the largest value
pub fn wants_minimum(user_text: &str) -> bool {
    let text = user_text.to_lowercase();
    mentions(&text, MINIMUM) && !mentions(&text, MAXIMUM)
}

/// Expense, income or both, from the user's wording
pub fn infer_entity(user_text: &str) -> Option<Entity> {
    let text = user_text.to_lowercase();
    let income = mentions(&text, INCOME);
    let expense = mentions(&text, EXPENSE);
    match (income, expense) {
        (true, true) => Some(Entity::Mixed),
        (true, false) => Some(Entity::Income),
        (false, true) => Some(Entity::Expense),
        (false, false) if mentions(&text, MIXED) => Some(Entity::Mixed),
        (false, false) => None,
    }
}

/// Maximum-value functions that flip to an ascending analytics query
pub fn is_maximum_function(function: FunctionName) -> bool {
    matches!(
        function,
        FunctionName::GetMaxSingleExpense | FunctionName::GetMaxSingleIncome
    )
}
