//! User-facing strings for supported locales

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Locale {
    #[default]
    En,
    Ru,
}

impl Locale {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::En => "en",
            Self::Ru => "ru",
        }
    }

    /// `ru`, `ru-RU`, `ru_RU.UTF-8` → Ru; anything else → En
    pub fn parse(s: &str) -> Self {
        if s.trim().to_lowercase().starts_with("ru") {
            Self::Ru
        } else {
            Self::En
        }
    }

    /// Currency assumed when neither the item nor the result names one
    pub fn default_currency(&self) -> &'static str {
        match self {
            Self::En => "USD",
            Self::Ru => "RUB",
        }
    }

    /// Language name for prompts
    pub fn language(&self) -> &'static str {
        match self {
            Self::En => "English",
            Self::Ru => "Russian",
        }
    }

    /// Percentage with one decimal in the locale's notation
    pub fn percent(&self, value: f64) -> String {
        let text = format!("{:.1}%", value);
        match self {
            Self::En => text,
            Self::Ru => text.replace('.', ","),
        }
    }

    pub fn text(&self, key: Text) -> &'static str {
        use Text::*;
        match (self, key) {
            (Self::En, Expenses) => "Expenses",
            (Self::Ru, Expenses) => "Расходы",
            (Self::En, Incomes) => "Incomes",
            (Self::Ru, Incomes) => "Доходы",
            (Self::En, SearchResults) => "Search results",
            (Self::Ru, SearchResults) => "Результаты поиска",
            (Self::En, Transactions) => "Transactions",
            (Self::Ru, Transactions) => "Операции",
            (Self::En, ByCategory) => "Expenses by category",
            (Self::Ru, ByCategory) => "Расходы по категориям",
            (Self::En, ByDay) => "Expenses by day",
            (Self::Ru, ByDay) => "Расходы по дням",
            (Self::En, ByWeek) => "Expenses by week",
            (Self::Ru, ByWeek) => "Расходы по неделям",
            (Self::En, LargestExpense) => "Largest expense",
            (Self::Ru, LargestExpense) => "Самый крупный расход",
            (Self::En, LargestIncome) => "Largest income",
            (Self::Ru, LargestIncome) => "Самый крупный доход",
            (Self::En, Found) => "Found",
            (Self::Ru, Found) => "Найдено",
            (Self::En, Total) => "Total",
            (Self::Ru, Total) => "Итого",
            (Self::En, Income) => "Income",
            (Self::Ru, Income) => "Доходы",
            (Self::En, Expense) => "Expense",
            (Self::Ru, Expense) => "Расходы",
            (Self::En, Balance) => "Balance",
            (Self::Ru, Balance) => "Баланс",
            (Self::En, Date) => "Date",
            (Self::Ru, Date) => "Дата",
            (Self::En, Amount) => "Amount",
            (Self::Ru, Amount) => "Сумма",
            (Self::En, Description) => "Description",
            (Self::Ru, Description) => "Описание",
            (Self::En, Category) => "Category",
            (Self::Ru, Category) => "Категория",
            (Self::En, More) => "more",
            (Self::Ru, More) => "ещё",
            (Self::En, NoData) => "No transactions found",
            (Self::Ru, NoData) => "Операций не найдено",
            (Self::En, Increase) => "increase",
            (Self::Ru, Increase) => "рост",
            (Self::En, Decrease) => "decrease",
            (Self::Ru, Decrease) => "снижение",
            (Self::En, Unchanged) => "unchanged",
            (Self::Ru, Unchanged) => "без изменений",
            (Self::En, Versus) => "vs",
            (Self::Ru, Versus) => "против",
            (Self::En, Failed) => "Could not complete the request",
            (Self::Ru, Failed) => "Не удалось выполнить запрос",
            (Self::En, ServiceUnavailable) => {
                "The assistant is temporarily unavailable. Please try again in a few minutes."
            }
            (Self::Ru, ServiceUnavailable) => {
                "Ассистент временно недоступен. Попробуйте ещё раз через несколько минут."
            }
        }
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Keys of localized strings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Text {
    Expenses,
    Incomes,
    SearchResults,
    Transactions,
    ByCategory,
    ByDay,
    ByWeek,
    LargestExpense,
    LargestIncome,
    Found,
    Total,
    Income,
    Expense,
    Balance,
    Date,
    Amount,
    Description,
    Category,
    More,
    NoData,
    Increase,
    Decrease,
    Unchanged,
    Versus,
    Failed,
    ServiceUnavailable,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse() {
        assert_eq!(Locale::parse("ru"), Locale::Ru);
        assert_eq!(Locale::parse("ru_RU.UTF-8"), Locale::Ru);
        assert_eq!(Locale::parse("en-GB"), Locale::En);
        assert_eq!(Locale::parse("de"), Locale::En);
    }

    #[test]
    fn test_percent() {
        assert_eq!(Locale::En.percent(12.345), "12.3%");
        assert_eq!(Locale::Ru.percent(12.345), "12,3%");
    }
}
