//! Response formatting
//!
//! Turns a [`FunctionResult`] into localized chat text. The layout depends on
//! the function's [`ResultShape`]:
//!
//! - list: `items` grouped by date, per-day subtotal per currency, capped
//! - aggregate: `buckets` (`label`, `amount`, optional `share`) with a total
//! - single: `item` as a fixed field list
//! - comparison: `current` and `previous` (`start_date`, `end_date`, `total`)
//! - summary: `income`, `expense`, optional `balance`
//! - analytics: one row renders as a record, several as a list
//!
//! Money always goes through [`format_money`]. The currency comes from the
//! item, then the result's `currency`, then the configured default, then the
//! locale's default.

mod currency;
mod list;
mod locale;

pub use currency::{format_money, format_signed_money};
pub use locale::{Locale, Text};

use chrono::NaiveDate;
use serde_json::{Map, Value};

use crate::config::Config;
use crate::dispatch::FunctionResult;
use crate::functions::{FunctionName, ResultShape};
use list::{parse_items, render_list, Item};

/// Item rows shown before "+N more"
pub const DEFAULT_LIST_ROW_CAP: usize = 50;

pub(crate) fn format_date(day: NaiveDate) -> String {
    day.format("%d.%m.%Y").to_string()
}

fn format_date_str(text: &str) -> String {
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map(format_date)
        .unwrap_or_else(|_| text.to_string())
}

/// `01.08.2025 – 31.08.2025`, or one date for a single day
pub(crate) fn range_label(payload: &Map<String, Value>) -> Option<String> {
    let start = payload.get("start_date")?.as_str()?;
    let end = payload.get("end_date")?.as_str()?;
    if start == end {
        Some(format_date_str(start))
    } else {
        Some(format!(
            "{} – {}",
            format_date_str(start),
            format_date_str(end)
        ))
    }
}

fn number(value: Option<&Value>) -> f64 {
    match value {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.trim().parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Renders function results
#[derive(Debug, Clone)]
pub struct Formatter {
    list_row_cap: usize,
    default_currency: Option<String>,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    pub fn new() -> Self {
        Self {
            list_row_cap: DEFAULT_LIST_ROW_CAP,
            default_currency: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self {
            list_row_cap: config.list_row_cap.max(1),
            default_currency: Some(config.default_currency.clone()),
        }
    }

    pub fn with_list_row_cap(mut self, cap: usize) -> Self {
        self.list_row_cap = cap.max(1);
        self
    }

    pub fn with_default_currency(mut self, currency: &str) -> Self {
        self.default_currency = Some(currency.to_uppercase());
        self
    }

    fn currency<'a>(&'a self, payload: &'a Map<String, Value>, locale: Locale) -> &'a str {
        payload
            .get("currency")
            .and_then(Value::as_str)
            .or(self.default_currency.as_deref())
            .unwrap_or(locale.default_currency())
    }

    /// Render a result for the named function
    ///
    /// Failures render as one line regardless of the function.
    pub fn render(&self, function: &str, result: &FunctionResult, locale: Locale) -> String {
        if !result.success() {
            return self.render_failure(result.message().unwrap_or(""), locale);
        }

        let payload = result.payload();
        let Some(function) = FunctionName::from_name(function) else {
            return render_raw(payload);
        };

        match function.result_shape() {
            ResultShape::List => self.render_list(function, payload, parse_items(payload.get("items")), locale),
            ResultShape::Aggregate => self.render_aggregate(function, payload, locale),
            ResultShape::Single => {
                let item = payload
                    .get("item")
                    .and_then(|v| serde_json::from_value::<Item>(v.clone()).ok())
                    .or_else(|| parse_items(payload.get("items")).into_iter().next());
                self.render_single(function, payload, item, locale)
            }
            ResultShape::Comparison => self.render_comparison(payload, locale),
            ResultShape::Summary => self.render_summary(payload, locale),
            ResultShape::Analytics => {
                let mut items = parse_items(payload.get("items"));
                if items.len() == 1 {
                    self.render_single(function, payload, items.pop(), locale)
                } else {
                    self.render_list(function, payload, items, locale)
                }
            }
        }
    }

    /// One localized error line
    pub fn render_failure(&self, message: &str, locale: Locale) -> String {
        let message: String = message
            .lines()
            .next()
            .unwrap_or("")
            .chars()
            .filter(|c| !c.is_control())
            .collect();
        if message.trim().is_empty() {
            format!("⚠️ {}", locale.text(Text::Failed))
        } else {
            format!("⚠️ {}: {}", locale.text(Text::Failed), message.trim())
        }
    }

    fn render_list(
        &self,
        function: FunctionName,
        payload: &Map<String, Value>,
        items: Vec<Item>,
        locale: Locale,
    ) -> String {
        let title = match function {
            FunctionName::GetExpensesList => Text::Expenses,
            FunctionName::GetIncomesList => Text::Incomes,
            FunctionName::SearchTransactions => Text::SearchResults,
            _ => Text::Transactions,
        };
        render_list(
            locale.text(title),
            payload,
            items,
            self.currency(payload, locale),
            self.list_row_cap,
            locale,
        )
    }

    fn render_aggregate(
        &self,
        function: FunctionName,
        payload: &Map<String, Value>,
        locale: Locale,
    ) -> String {
        let currency = self.currency(payload, locale);
        let title = match function {
            FunctionName::GetDailyTotals => Text::ByDay,
            FunctionName::GetWeeklyTotals => Text::ByWeek,
            _ => Text::ByCategory,
        };

        let buckets: Vec<(String, f64, Option<f64>)> = payload
            .get("buckets")
            .and_then(Value::as_array)
            .map(|buckets| {
                buckets
                    .iter()
                    .map(|b| {
                        let label = b.get("label").and_then(Value::as_str).unwrap_or("—");
                        let share = b.get("share").and_then(Value::as_f64);
                        (format_date_str(label), number(b.get("amount")), share)
                    })
                    .collect()
            })
            .unwrap_or_default();

        let total = match payload.get("total") {
            Some(value) => number(Some(value)),
            None => buckets.iter().map(|(_, amount, _)| amount).sum(),
        };

        let mut lines = Vec::new();
        match range_label(payload) {
            Some(range) => lines.push(format!("📊 {} {}", locale.text(title), range)),
            None => lines.push(format!("📊 {}", locale.text(title))),
        }
        if buckets.is_empty() {
            lines.push(locale.text(Text::NoData).to_string());
            return lines.join("\n");
        }

        lines.push(format!(
            "{}: {}",
            locale.text(Text::Total),
            format_money(total, currency)
        ));
        for (label, amount, share) in &buckets {
            let share = share.unwrap_or(if total.abs() > f64::EPSILON {
                amount / total * 100.0
            } else {
                0.0
            });
            lines.push(format!(
                "  • {}: {} ({})",
                label,
                format_money(*amount, currency),
                locale.percent(share)
            ));
        }
        lines.join("\n")
    }

    fn render_single(
        &self,
        function: FunctionName,
        payload: &Map<String, Value>,
        item: Option<Item>,
        locale: Locale,
    ) -> String {
        let title = match function {
            FunctionName::GetMaxSingleExpense => Text::LargestExpense,
            FunctionName::GetMaxSingleIncome => Text::LargestIncome,
            _ => Text::Found,
        };
        let Some(item) = item else {
            return format!("🔎 {}", locale.text(Text::NoData));
        };
        let currency = item.currency(self.currency(payload, locale)).to_string();

        let mut lines = vec![format!("🔎 {}", locale.text(title))];
        if !item.date.is_empty() {
            lines.push(format!(
                "{}: {}",
                locale.text(Text::Date),
                format_date_str(item.date.get(..10).unwrap_or(&item.date))
            ));
        }
        lines.push(format!(
            "{}: {}",
            locale.text(Text::Amount),
            format_money(item.amount, &currency)
        ));
        if let Some(description) = item.description.as_deref().filter(|d| !d.is_empty()) {
            lines.push(format!("{}: {}", locale.text(Text::Description), description));
        }
        if let Some(category) = item.category.as_deref().filter(|c| !c.is_empty()) {
            lines.push(format!("{}: {}", locale.text(Text::Category), category));
        }
        lines.join("\n")
    }

    fn render_comparison(&self, payload: &Map<String, Value>, locale: Locale) -> String {
        let currency = self.currency(payload, locale);
        let period = |key: &str| -> (String, f64) {
            let part = payload.get(key).and_then(Value::as_object);
            let label = part.and_then(range_label).unwrap_or_default();
            (label, number(part.and_then(|p| p.get("total"))))
        };
        let (current_label, current) = period("current");
        let (previous_label, previous) = period("previous");
        let title = match payload.get("entity").and_then(Value::as_str) {
            Some("income") => Text::Incomes,
            _ => Text::Expenses,
        };

        let delta = current - previous;
        let (arrow, direction) = if delta.abs() < 0.005 {
            ("⏸", Text::Unchanged)
        } else if delta > 0.0 {
            ("📈", Text::Increase)
        } else {
            ("📉", Text::Decrease)
        };

        let labelled = |head: String, label: &str, amount: f64| {
            if label.is_empty() {
                format!("{}: {}", head, format_money(amount, currency))
            } else {
                format!("{} {}: {}", head, label, format_money(amount, currency))
            }
        };
        let mut lines = vec![
            labelled(
                format!("{} {}", arrow, locale.text(title)),
                &current_label,
                current,
            ),
            labelled(
                locale.text(Text::Versus).to_string(),
                &previous_label,
                previous,
            ),
        ];
        let change = if previous.abs() > f64::EPSILON {
            let pct = delta / previous.abs() * 100.0;
            let sign = if pct > 0.0 { "+" } else { "" };
            format!(
                "{}: {}{} ({})",
                locale.text(direction),
                sign,
                locale.percent(pct),
                format_signed_money(delta, currency)
            )
        } else {
            format!(
                "{}: {}",
                locale.text(direction),
                format_signed_money(delta, currency)
            )
        };
        lines.push(change);
        lines.join("\n")
    }

    fn render_summary(&self, payload: &Map<String, Value>, locale: Locale) -> String {
        let currency = self.currency(payload, locale);
        let income = number(payload.get("income"));
        let expense = number(payload.get("expense"));
        let balance = match payload.get("balance") {
            Some(value) => number(Some(value)),
            None => income - expense,
        };

        let mut lines = Vec::new();
        if let Some(range) = range_label(payload) {
            lines.push(format!("💼 {}", range));
        }
        lines.push(format!(
            "{}: {}",
            locale.text(Text::Income),
            format_money(income, currency)
        ));
        lines.push(format!(
            "{}: {}",
            locale.text(Text::Expense),
            format_money(expense, currency)
        ));
        lines.push(format!(
            "{}: {}",
            locale.text(Text::Balance),
            format_signed_money(balance, currency)
        ));
        lines.join("\n")
    }
}

/// Unknown function: compact JSON without the status flag
fn render_raw(payload: &Map<String, Value>) -> String {
    let mut payload = payload.clone();
    payload.remove("success");
    Value::Object(payload).to_string()
}
