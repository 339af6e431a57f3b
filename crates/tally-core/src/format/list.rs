//! Date-grouped transaction lists

use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::{Map, Value};

use super::currency::{format_money, format_signed_money};
use super::locale::{Locale, Text};
use super::{format_date, range_label};

/// One transaction as returned by the data layer
#[derive(Debug, Clone, Deserialize)]
pub(super) struct Item {
    #[serde(default)]
    pub date: String,
    pub amount: f64,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    /// `expense` or `income`; mixed lists mark incomes with `+`
    #[serde(default)]
    pub kind: Option<String>,
}

impl Item {
    pub fn currency<'a>(&'a self, fallback: &'a str) -> &'a str {
        self.currency.as_deref().unwrap_or(fallback)
    }

    pub fn is_income(&self) -> bool {
        self.kind.as_deref() == Some("income")
    }

    pub fn label(&self) -> &str {
        self.description
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .or(self.category.as_deref())
            .unwrap_or("—")
    }

    fn day(&self) -> Option<NaiveDate> {
        NaiveDate::parse_from_str(self.date.get(..10).unwrap_or(&self.date), "%Y-%m-%d").ok()
    }
}

pub(super) fn parse_items(value: Option<&Value>) -> Vec<Item> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|v| serde_json::from_value(v.clone()).ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Render items grouped by day in chronological order
///
/// At most `cap` item rows are shown; the rest is summarized as "+N more".
/// `total_count` in the payload counts rows the data layer did not send.
pub(super) fn render_list(
    title: &str,
    payload: &Map<String, Value>,
    items: Vec<Item>,
    currency: &str,
    cap: usize,
    locale: Locale,
) -> String {
    let mut lines = Vec::new();
    match range_label(payload) {
        Some(range) => lines.push(format!("🧾 {} {}", title, range)),
        None => lines.push(format!("🧾 {}", title)),
    }

    if items.is_empty() {
        lines.push(locale.text(Text::NoData).to_string());
        return lines.join("\n");
    }

    let total = payload
        .get("total_count")
        .and_then(Value::as_u64)
        .map(|n| n as usize)
        .unwrap_or(0)
        .max(items.len());

    // Undated rows sort last
    let mut days: BTreeMap<(bool, Option<NaiveDate>), Vec<Item>> = BTreeMap::new();
    for item in items {
        let day = item.day();
        days.entry((day.is_none(), day)).or_default().push(item);
    }

    let mut shown = 0;
    for ((_, day), day_items) in &days {
        if shown >= cap {
            break;
        }
        let header = match day {
            Some(day) => format_date(*day),
            None => "?".to_string(),
        };
        lines.push(format!("📅 {}", header));

        for item in day_items.iter().take(cap - shown) {
            let money = if item.is_income() {
                format_signed_money(item.amount, item.currency(currency))
            } else {
                format_money(item.amount, item.currency(currency))
            };
            lines.push(format!("  • {} — {}", money, item.label()));
            shown += 1;
        }

        let mut subtotals: BTreeMap<&str, f64> = BTreeMap::new();
        for item in day_items {
            *subtotals.entry(item.currency(currency)).or_default() += item.amount;
        }
        let subtotal = subtotals
            .iter()
            .map(|(code, sum)| format_money(*sum, code))
            .collect::<Vec<_>>()
            .join(" + ");
        lines.push(format!("  {}: {}", locale.text(Text::Total), subtotal));
    }

    if total > shown {
        lines.push(format!("+{} {}", total - shown, locale.text(Text::More)));
    }
    lines.join("\n")
}
