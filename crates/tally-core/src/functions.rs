//! Analytical function catalog
//!
//! The closed set of functions the model may call. Each function has a
//! canonical argument shape, an allow-list of keys the model may pass, and a
//! result shape the formatter renders.

use std::fmt;

/// Canonical argument shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgShape {
    /// Closed date interval: `start_date`, `end_date`
    Range,
    /// Trailing day count ending today: `days`
    Days,
    /// Two intervals: `start_date`/`end_date` and `prev_start_date`/`prev_end_date`
    Comparison,
    /// Free-form analytics query decoded from the raw `query` JSON
    Analytics,
}

/// How a successful result is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResultShape {
    /// Transactions grouped by date
    List,
    /// Buckets with totals and shares
    Aggregate,
    /// One transaction
    Single,
    /// Current vs previous period
    Comparison,
    /// Income, expense, balance
    Summary,
    /// One row renders as a record, several as a list
    Analytics,
}

/// Functions the model may call
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FunctionName {
    GetExpensesList,
    GetIncomesList,
    SearchTransactions,
    GetIncomeExpenseSummary,
    GetExpensesByCategory,
    GetDailyTotals,
    GetWeeklyTotals,
    GetMaxSingleExpense,
    GetMaxSingleIncome,
    ComparePeriods,
    AnalyticsQuery,
}

/// Keys every function accepts as period hints
const PERIOD_HINTS: &[&str] = &["period", "date", "start_date", "end_date", "days"];

impl FunctionName {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::GetExpensesList => "get_expenses_list",
            Self::GetIncomesList => "get_incomes_list",
            Self::SearchTransactions => "search_transactions",
            Self::GetIncomeExpenseSummary => "get_income_expense_summary",
            Self::GetExpensesByCategory => "get_expenses_by_category",
            Self::GetDailyTotals => "get_daily_totals",
            Self::GetWeeklyTotals => "get_weekly_totals",
            Self::GetMaxSingleExpense => "get_max_single_expense",
            Self::GetMaxSingleIncome => "get_max_single_income",
            Self::ComparePeriods => "compare_periods",
            Self::AnalyticsQuery => "analytics_query",
        }
    }

    pub fn all() -> &'static [FunctionName] {
        &[
            Self::GetExpensesList,
            Self::GetIncomesList,
            Self::SearchTransactions,
            Self::GetIncomeExpenseSummary,
            Self::GetExpensesByCategory,
            Self::GetDailyTotals,
            Self::GetWeeklyTotals,
            Self::GetMaxSingleExpense,
            Self::GetMaxSingleIncome,
            Self::ComparePeriods,
            Self::AnalyticsQuery,
        ]
    }

    /// Exact-name lookup
    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|f| f.as_str() == name)
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::GetExpensesList => "list of expenses in a period, optionally one category",
            Self::GetIncomesList => "list of incomes in a period",
            Self::SearchTransactions => "find transactions whose description matches text",
            Self::GetIncomeExpenseSummary => "total income, total expense and balance for a period",
            Self::GetExpensesByCategory => "expense totals per category with shares",
            Self::GetDailyTotals => "expense total for each of the last N days",
            Self::GetWeeklyTotals => "expense total for each week of the last N days",
            Self::GetMaxSingleExpense => "the largest single expense in the last N days",
            Self::GetMaxSingleIncome => "the largest single income in the last N days",
            Self::ComparePeriods => "compare expenses of a period with a previous period",
            Self::AnalyticsQuery => {
                "generic query; query is JSON with entity (expense|income|mixed), sort_by (amount|date), sort_dir (asc|desc), limit, start_date, end_date, category"
            }
        }
    }

    pub fn arg_shape(&self) -> ArgShape {
        match self {
            Self::GetDailyTotals
            | Self::GetWeeklyTotals
            | Self::GetMaxSingleExpense
            | Self::GetMaxSingleIncome => ArgShape::Days,
            Self::ComparePeriods => ArgShape::Comparison,
            Self::AnalyticsQuery => ArgShape::Analytics,
            _ => ArgShape::Range,
        }
    }

    pub fn result_shape(&self) -> ResultShape {
        match self {
            Self::GetExpensesList | Self::GetIncomesList | Self::SearchTransactions => {
                ResultShape::List
            }
            Self::GetExpensesByCategory | Self::GetDailyTotals | Self::GetWeeklyTotals => {
                ResultShape::Aggregate
            }
            Self::GetMaxSingleExpense | Self::GetMaxSingleIncome => ResultShape::Single,
            Self::ComparePeriods => ResultShape::Comparison,
            Self::GetIncomeExpenseSummary => ResultShape::Summary,
            Self::AnalyticsQuery => ResultShape::Analytics,
        }
    }

    /// Keys specific to this function, beyond period hints
    fn own_keys(&self) -> &'static [&'static str] {
        match self {
            Self::GetExpensesList | Self::GetIncomesList => &["category", "limit"],
            Self::SearchTransactions => &["text", "query", "category", "min_amount", "max_amount"],
            Self::GetExpensesByCategory => &["limit"],
            Self::ComparePeriods => &[
                "prev_period",
                "prev_start_date",
                "prev_end_date",
                "entity",
            ],
            Self::AnalyticsQuery => &[
                "query",
                "entity",
                "sort_by",
                "sort_dir",
                "limit",
                "category",
            ],
            _ => &[],
        }
    }

    /// Whether the model may pass `key` to this function
    pub fn allows(&self, key: &str) -> bool {
        PERIOD_HINTS.contains(&key) || self.own_keys().contains(&key)
    }

    /// Argument list as shown to the model
    pub fn signature(&self) -> &'static str {
        match self.arg_shape() {
            ArgShape::Range => match self {
                Self::GetExpensesList | Self::GetIncomesList => {
                    "start_date, end_date | period, category?, limit?"
                }
                Self::SearchTransactions => "text, start_date?, end_date? | period?, category?",
                _ => "start_date, end_date | period",
            },
            ArgShape::Days => "days | period",
            ArgShape::Comparison => {
                "start_date, end_date, prev_start_date, prev_end_date | period, prev_period"
            }
            ArgShape::Analytics => "query",
        }
    }
}

impl fmt::Display for FunctionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which transactions an analytics query ranges over
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Entity {
    Expense,
    Income,
    Mixed,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
            Self::Mixed => "mixed",
        }
    }

    /// Lenient parse (`expenses`, `incomes`, `all`, ...)
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "expense" | "expenses" | "spending" => Some(Self::Expense),
            "income" | "incomes" => Some(Self::Income),
            "mixed" | "all" | "any" | "both" | "transactions" => Some(Self::Mixed),
            _ => None,
        }
    }
}

/// One catalog line per function: name, arguments, description
pub fn catalog() -> String {
    FunctionName::all()
        .iter()
        .map(|f| format!("- {}({}): {}", f.as_str(), f.signature(), f.description()))
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_name_round_trip() {
        for f in FunctionName::all() {
            assert_eq!(FunctionName::from_name(f.as_str()), Some(*f));
        }
        assert_eq!(FunctionName::from_name("drop_tables"), None);
        assert_eq!(FunctionName::from_name("GET_EXPENSES_LIST"), None);
    }

    #[test]
    fn test_allow_lists() {
        assert!(FunctionName::GetExpensesList.allows("start_date"));
        assert!(FunctionName::GetExpensesList.allows("category"));
        assert!(!FunctionName::GetExpensesList.allows("user_id"));
        assert!(!FunctionName::GetDailyTotals.allows("category"));
        assert!(FunctionName::AnalyticsQuery.allows("query"));
        assert!(!FunctionName::ComparePeriods.allows("sql"));
    }

    #[test]
    fn test_shapes() {
        assert_eq!(FunctionName::GetDailyTotals.arg_shape(), ArgShape::Days);
        assert_eq!(FunctionName::GetExpensesList.arg_shape(), ArgShape::Range);
        assert_eq!(FunctionName::GetMaxSingleExpense.result_shape(), ResultShape::Single);
        assert_eq!(FunctionName::ComparePeriods.result_shape(), ResultShape::Comparison);
    }

    #[test]
    fn test_entity_parse() {
        assert_eq!(Entity::parse("Expenses"), Some(Entity::Expense));
        assert_eq!(Entity::parse("all"), Some(Entity::Mixed));
        assert_eq!(Entity::parse("budget"), None);
    }

    #[test]
    fn test_catalog_lists_every_function() {
        let catalog = catalog();
        assert_eq!(catalog.lines().count(), FunctionName::all().len());
        assert!(catalog.contains("- get_expenses_list(start_date, end_date | period"));
        assert!(!catalog.contains("user_id"));
    }
}
