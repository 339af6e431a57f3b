//! Parameter normalization
//!
//! Rewrites whatever the model passed into the canonical argument set of the
//! target function:
//!
//! 1. keys that are not plain identifiers or not on the function's allow-list
//!    are dropped
//! 2. `user_id` always comes from the trusted caller, never from the model
//! 3. dates, symbolic periods and day counts are canonicalized for the
//!    function's shape (explicit range, trailing days, two ranges, analytics)
//! 4. "smallest"-style questions answered with a maximum function become an
//!    ascending `analytics_query` with limit 1
//! 5. a lone date covers a single day

use std::sync::Arc;

use chrono::{Datelike, Duration, NaiveDate};
use serde_json::{Map, Value};
use tracing::debug;

use crate::clock::Clock;
use crate::error::{Error, Result};
use crate::functions::{ArgShape, Entity, FunctionName};
use crate::heuristics;
use crate::intent::parse_arguments;
use crate::periods::{parse_date, period_from_text, resolve_period, DateRange};

/// Day-count bounds for count-based functions
const MIN_DAYS: i64 = 1;
const MAX_DAYS: i64 = 3650;
const DEFAULT_DAYS: i64 = 30;

/// Analytics defaults and bounds
const DEFAULT_ANALYTICS_LIMIT: i64 = 20;
const MAX_ANALYTICS_LIMIT: i64 = 100;

/// Keys read from the decoded analytics `query` object
const ANALYTICS_QUERY_KEYS: &[&str] = &[
    "entity",
    "sort_by",
    "sort_dir",
    "limit",
    "category",
    "start_date",
    "end_date",
    "date",
    "period",
    "days",
];

/// A validated call ready for dispatch
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedCall {
    pub function: FunctionName,
    pub args: Map<String, Value>,
}

impl NormalizedCall {
    pub fn name(&self) -> &'static str {
        self.function.as_str()
    }

    /// `start_date`..`end_date`, when both are present
    pub fn range(&self) -> Option<DateRange> {
        let start = self.args.get("start_date")?.as_str()?;
        let end = self.args.get("end_date")?.as_str()?;
        Some(DateRange::new(
            NaiveDate::parse_from_str(start, "%Y-%m-%d").ok()?,
            NaiveDate::parse_from_str(end, "%Y-%m-%d").ok()?,
        ))
    }
}

/// Canonicalizes model-provided arguments
pub struct Normalizer {
    clock: Arc<dyn Clock>,
}

impl Normalizer {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Normalize a parsed call
    ///
    /// `caller_id` comes from the authenticated session; `user_text` is the
    /// user's original message, read for intent correction and as a last
    /// source of period information.
    pub fn normalize(
        &self,
        name: &str,
        raw_args: &str,
        caller_id: i64,
        user_text: &str,
    ) -> Result<NormalizedCall> {
        let function =
            FunctionName::from_name(name).ok_or_else(|| Error::UnknownFunction(name.to_string()))?;
        Ok(self.normalize_args(function, parse_arguments(raw_args), caller_id, user_text))
    }

    /// Normalize already-split arguments
    pub fn normalize_args(
        &self,
        function: FunctionName,
        raw: Map<String, Value>,
        caller_id: i64,
        user_text: &str,
    ) -> NormalizedCall {
        let today = self.clock.today();
        let mut args = filter_allowed(function, raw);

        let mut function = function;
        let mut correction: Option<Map<String, Value>> = None;
        if heuristics::is_maximum_function(function) && heuristics::wants_minimum(user_text) {
            let entity = heuristics::infer_entity(user_text).unwrap_or(match function {
                FunctionName::GetMaxSingleIncome => Entity::Income,
                _ => Entity::Expense,
            });
            debug!(from = %function, entity = entity.as_str(), "Correcting maximum to minimum query");

            let mut fixed = Map::new();
            fixed.insert("entity".into(), Value::from(entity.as_str()));
            fixed.insert("sort_by".into(), Value::from("amount"));
            fixed.insert("sort_dir".into(), Value::from("asc"));
            fixed.insert("limit".into(), Value::from(1));
            correction = Some(fixed);
            function = FunctionName::AnalyticsQuery;
        }

        let mut canonical = match function.arg_shape() {
            ArgShape::Range => self.canonical_range(function, &mut args, today, user_text),
            ArgShape::Days => canonical_days(&args, today, user_text),
            ArgShape::Comparison => canonical_comparison(&args, today, user_text),
            ArgShape::Analytics => canonical_analytics(&args, correction, today, user_text),
        };

        canonical.insert("user_id".into(), Value::from(caller_id));
        NormalizedCall {
            function,
            args: canonical,
        }
    }

    fn canonical_range(
        &self,
        function: FunctionName,
        args: &mut Map<String, Value>,
        today: NaiveDate,
        user_text: &str,
    ) -> Map<String, Value> {
        let range = resolve_range(args, today, user_text).unwrap_or_else(|| month_to_date(today));

        let mut out = Map::new();
        out.insert("start_date".into(), Value::from(range.start_str()));
        out.insert("end_date".into(), Value::from(range.end_str()));

        if function == FunctionName::SearchTransactions && !args.contains_key("text") {
            if let Some(query) = args.remove("query").and_then(|v| value_string(&v)) {
                out.insert("text".into(), Value::from(query));
            }
        }

        for key in ["category", "text"] {
            if let Some(value) = args.get(key).and_then(value_string) {
                let value = value.trim();
                if !value.is_empty() {
                    out.insert(key.into(), Value::from(value));
                }
            }
        }
        if let Some(limit) = args.get("limit").and_then(value_i64) {
            out.insert("limit".into(), Value::from(limit.clamp(1, 500)));
        }
        for key in ["min_amount", "max_amount"] {
            if let Some(amount) = args.get(key).and_then(value_f64) {
                out.insert(key.into(), Value::from(amount));
            }
        }
        out
    }
}

/// Keep allow-listed identifier keys
fn filter_allowed(function: FunctionName, raw: Map<String, Value>) -> Map<String, Value> {
    raw.into_iter()
        .filter(|(key, _)| {
            let keep = is_identifier(key) && function.allows(key);
            if !keep {
                debug!(function = %function, key = %key, "Dropping argument");
            }
            keep
        })
        .collect()
}

fn is_identifier(key: &str) -> bool {
    !key.is_empty() && key.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

fn value_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn value_i64(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f.round() as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn value_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().replace(',', ".").parse().ok(),
        _ => None,
    }
}

fn value_date(value: &Value, today: NaiveDate) -> Option<NaiveDate> {
    value.as_str().and_then(|s| parse_date(s, today))
}

fn month_to_date(today: NaiveDate) -> DateRange {
    let start = today.with_day(1).unwrap_or(today);
    DateRange::new(start, today)
}

/// Date range from explicit dates, a period, a day count, or the user's text
fn resolve_range(args: &Map<String, Value>, today: NaiveDate, user_text: &str) -> Option<DateRange> {
    let start = args.get("start_date").and_then(|v| value_date(v, today));
    let end = args.get("end_date").and_then(|v| value_date(v, today));
    match (start, end) {
        (Some(start), Some(end)) => return Some(DateRange::new(start, end)),
        (Some(day), None) | (None, Some(day)) => return Some(DateRange::single(day)),
        (None, None) => {}
    }

    if let Some(day) = args.get("date").and_then(|v| value_date(v, today)) {
        return Some(DateRange::single(day));
    }

    if let Some(period) = args.get("period") {
        if let Some(days) = value_i64(period) {
            return Some(DateRange::trailing(today, days.clamp(MIN_DAYS, MAX_DAYS)));
        }
        if let Some(range) = period.as_str().and_then(|p| resolve_period(p, today)) {
            return Some(range);
        }
        debug!(period = %period, "Unrecognized period");
    }

    if let Some(days) = args.get("days").and_then(value_i64) {
        return Some(DateRange::trailing(today, days.clamp(MIN_DAYS, MAX_DAYS)));
    }

    period_from_text(user_text, today)
}

fn canonical_days(args: &Map<String, Value>, today: NaiveDate, user_text: &str) -> Map<String, Value> {
    // An explicit count wins over any range the model also sent
    let days = match args.get("days").and_then(value_i64) {
        Some(days) => days,
        None => resolve_range(args, today, user_text)
            .map(|r| r.days())
            .unwrap_or(DEFAULT_DAYS),
    };

    let mut out = Map::new();
    out.insert("days".into(), Value::from(days.clamp(MIN_DAYS, MAX_DAYS)));
    out
}

/// Same calendar span one month back for month-aligned ranges, else the
/// equally long range just before
fn previous_comparable(current: DateRange) -> DateRange {
    if current.start.day() != 1 {
        return current.preceding();
    }
    let prev_end_of_month = current.start - Duration::days(1);
    let prev_start = prev_end_of_month.with_day(1).unwrap_or(prev_end_of_month);
    let span = current.days().min(prev_end_of_month.day() as i64);
    let candidate_end = prev_start + Duration::days(span - 1);
    DateRange::new(prev_start, candidate_end.min(prev_end_of_month))
}

fn canonical_comparison(
    args: &Map<String, Value>,
    today: NaiveDate,
    user_text: &str,
) -> Map<String, Value> {
    let current = resolve_range(args, today, user_text).unwrap_or_else(|| month_to_date(today));

    let prev_start = args.get("prev_start_date").and_then(|v| value_date(v, today));
    let prev_end = args.get("prev_end_date").and_then(|v| value_date(v, today));
    let previous = match (prev_start, prev_end) {
        (Some(start), Some(end)) => DateRange::new(start, end),
        (Some(day), None) | (None, Some(day)) => DateRange::single(day),
        (None, None) => args
            .get("prev_period")
            .and_then(Value::as_str)
            .and_then(|p| resolve_period(p, today))
            .unwrap_or_else(|| previous_comparable(current)),
    };

    let entity = args
        .get("entity")
        .and_then(Value::as_str)
        .and_then(Entity::parse)
        .unwrap_or(Entity::Expense);

    let mut out = Map::new();
    out.insert("start_date".into(), Value::from(current.start_str()));
    out.insert("end_date".into(), Value::from(current.end_str()));
    out.insert("prev_start_date".into(), Value::from(previous.start_str()));
    out.insert("prev_end_date".into(), Value::from(previous.end_str()));
    out.insert("entity".into(), Value::from(entity.as_str()));
    out
}

fn canonical_analytics(
    args: &Map<String, Value>,
    correction: Option<Map<String, Value>>,
    today: NaiveDate,
    user_text: &str,
) -> Map<String, Value> {
    let mut merged = Map::new();

    if let Some(query) = args.get("query").and_then(Value::as_str) {
        match serde_json::from_str::<Value>(query) {
            Ok(Value::Object(object)) => {
                for (key, value) in object {
                    if ANALYTICS_QUERY_KEYS.contains(&key.as_str()) {
                        merged.insert(key, value);
                    } else {
                        debug!(key = %key, "Dropping analytics query key");
                    }
                }
            }
            Ok(_) | Err(_) => debug!("Analytics query is not a JSON object"),
        }
    }
    for (key, value) in args {
        if key != "query" {
            merged.insert(key.clone(), value.clone());
        }
    }
    if let Some(correction) = correction {
        merged.extend(correction);
    }

    let range = resolve_range(&merged, today, user_text).unwrap_or_else(|| month_to_date(today));

    let entity = merged
        .get("entity")
        .and_then(Value::as_str)
        .and_then(Entity::parse)
        .or_else(|| heuristics::infer_entity(user_text))
        .unwrap_or(Entity::Expense);
    let sort_by = match merged.get("sort_by").and_then(Value::as_str) {
        Some("amount") | Some("sum") => "amount",
        _ => "date",
    };
    let sort_dir = match merged.get("sort_dir").and_then(Value::as_str) {
        Some("asc") | Some("ascending") => "asc",
        _ => "desc",
    };
    let limit = merged
        .get("limit")
        .and_then(value_i64)
        .unwrap_or(DEFAULT_ANALYTICS_LIMIT)
        .clamp(1, MAX_ANALYTICS_LIMIT);

    let mut out = Map::new();
    out.insert("entity".into(), Value::from(entity.as_str()));
    out.insert("sort_by".into(), Value::from(sort_by));
    out.insert("sort_dir".into(), Value::from(sort_dir));
    out.insert("limit".into(), Value::from(limit));
    out.insert("start_date".into(), Value::from(range.start_str()));
    out.insert("end_date".into(), Value::from(range.end_str()));
    if let Some(category) = merged.get("category").and_then(value_string) {
        out.insert("category".into(), Value::from(category));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use serde_json::json;

    fn normalizer() -> Normalizer {
        Normalizer::new(Arc::new(ManualClock::new(
            NaiveDate::from_ymd_opt(2025, 9, 10).unwrap(),
        )))
    }

    fn normalize(name: &str, raw_args: &str, user_text: &str) -> NormalizedCall {
        normalizer().normalize(name, raw_args, 42, user_text).unwrap()
    }

    #[test]
    fn test_lone_start_date_mirrored() {
        let call = normalize("get_expenses_list", "start_date=2025-08-17", "");
        assert_eq!(call.args["start_date"], json!("2025-08-17"));
        assert_eq!(call.args["end_date"], json!("2025-08-17"));

        let call = normalize("get_incomes_list", "date=17.08.2025", "");
        assert_eq!(call.args["start_date"], json!("2025-08-17"));
        assert_eq!(call.args["end_date"], json!("2025-08-17"));
    }

    #[test]
    fn test_user_id_from_trusted_context() {
        let call = normalize("get_expenses_list", "user_id=7, period=this_month", "");
        assert_eq!(call.args["user_id"], json!(42));
    }

    #[test]
    fn test_disallowed_keys_dropped() {
        let call = normalize(
            "get_expenses_list",
            r#"category=Food, sql="DROP TABLE", "bad key"=1, limit=5"#,
            "",
        );
        assert_eq!(call.args["category"], json!("Food"));
        assert_eq!(call.args["limit"], json!(5));
        assert!(!call.args.contains_key("sql"));
        assert!(!call.args.contains_key("bad key"));
        assert!(!call.args.contains_key("period"));
    }

    #[test]
    fn test_period_to_days() {
        assert_eq!(normalize("get_daily_totals", "period=last_week", "").args["days"], json!(7));
        assert_eq!(normalize("get_daily_totals", "period=last_month", "").args["days"], json!(31));
        assert_eq!(
            normalize("get_weekly_totals", "start_date=2025-08-01, end_date=2025-08-14", "")
                .args["days"],
            json!(14)
        );
        assert_eq!(normalize("get_daily_totals", "days=99999", "").args["days"], json!(3650));
        assert_eq!(normalize("get_daily_totals", "", "").args["days"], json!(30));
    }

    #[test]
    fn test_period_to_range() {
        let call = normalize("get_expenses_list", "period=last_month", "");
        assert_eq!(call.args["start_date"], json!("2025-08-01"));
        assert_eq!(call.args["end_date"], json!("2025-08-31"));
        assert!(!call.args.contains_key("period"));

        let call = normalize("get_expenses_by_category", "period=прошлая неделя", "");
        assert_eq!(call.args["start_date"], json!("2025-09-01"));
        assert_eq!(call.args["end_date"], json!("2025-09-07"));
    }

    #[test]
    fn test_reversed_range_swapped() {
        let call = normalize("get_expenses_list", "start_date=2025-08-31, end_date=2025-08-01", "");
        assert_eq!(call.args["start_date"], json!("2025-08-01"));
        assert_eq!(call.args["end_date"], json!("2025-08-31"));
    }

    #[test]
    fn test_period_from_user_text_and_default() {
        let call = normalize("get_expenses_list", "", "покажи траты за прошлый месяц");
        assert_eq!(call.range(), Some(DateRange::new(
            NaiveDate::from_ymd_opt(2025, 8, 1).unwrap(),
            NaiveDate::from_ymd_opt(2025, 8, 31).unwrap()
        )));

        let call = normalize("get_income_expense_summary", "", "how am I doing");
        assert_eq!(call.args["start_date"], json!("2025-09-01"));
        assert_eq!(call.args["end_date"], json!("2025-09-10"));
    }

    #[test]
    fn test_min_language_corrects_max_function() {
        let call = normalize("get_max_single_expense", "days=30", "какая самая маленькая трата за месяц?");
        assert_eq!(call.function, FunctionName::AnalyticsQuery);
        assert_eq!(call.args["sort_by"], json!("amount"));
        assert_eq!(call.args["sort_dir"], json!("asc"));
        assert_eq!(call.args["limit"], json!(1));
        assert_eq!(call.args["entity"], json!("expense"));
        assert_eq!(call.args["start_date"], json!("2025-08-12"));

        let call = normalize("get_max_single_income", "", "lowest income this year");
        assert_eq!(call.function, FunctionName::AnalyticsQuery);
        assert_eq!(call.args["entity"], json!("income"));
        assert_eq!(call.args["start_date"], json!("2025-01-01"));
    }

    #[test]
    fn test_max_function_kept_for_max_language() {
        let call = normalize("get_max_single_expense", "days=7", "biggest expense this week");
        assert_eq!(call.function, FunctionName::GetMaxSingleExpense);
        assert_eq!(call.args["days"], json!(7));
    }

    #[test]
    fn test_analytics_query_decoded() {
        let call = normalize(
            "analytics_query",
            r#"query={"entity": "income", "sort_by": "amount", "sort_dir": "desc", "limit": 500, "period": "last_month", "drop": "x"}"#,
            "",
        );
        assert_eq!(call.args["entity"], json!("income"));
        assert_eq!(call.args["limit"], json!(100));
        assert_eq!(call.args["start_date"], json!("2025-08-01"));
        assert!(!call.args.contains_key("query"));
        assert!(!call.args.contains_key("drop"));
    }

    #[test]
    fn test_comparison_defaults() {
        let call = normalize("compare_periods", "period=this_month", "");
        assert_eq!(call.args["start_date"], json!("2025-09-01"));
        assert_eq!(call.args["end_date"], json!("2025-09-10"));
        assert_eq!(call.args["prev_start_date"], json!("2025-08-01"));
        assert_eq!(call.args["prev_end_date"], json!("2025-08-10"));
        assert_eq!(call.args["entity"], json!("expense"));

        let call = normalize("compare_periods", "period=last_month, prev_period=july 2025", "");
        assert_eq!(call.args["prev_start_date"], json!("2025-07-01"));
        assert_eq!(call.args["prev_end_date"], json!("2025-07-31"));
    }

    #[test]
    fn test_search_query_becomes_text() {
        let call = normalize("search_transactions", "query=такси", "");
        assert_eq!(call.args["text"], json!("такси"));
        assert!(!call.args.contains_key("query"));
    }

    #[test]
    fn test_search_query_before_dates() {
        let call = normalize(
            "search_transactions",
            r#"query="кофе", start_date=2025-08-01, end_date=2025-08-31"#,
            "",
        );
        assert_eq!(call.args["text"], json!("кофе"));
        assert_eq!(call.args["start_date"], json!("2025-08-01"));
        assert_eq!(call.args["end_date"], json!("2025-08-31"));
    }

    #[test]
    fn test_unknown_function() {
        let result = normalizer().normalize("drop_everything", "", 1, "");
        assert!(matches!(result, Err(Error::UnknownFunction(_))));
    }
}
