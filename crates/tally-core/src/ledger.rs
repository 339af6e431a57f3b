//! In-memory reference data layer
//!
//! Serves every analytical function from a list of transactions, loaded from
//! CSV. Used by the CLI and by tests; production deployments plug their own
//! [`DataLayer`] in instead.
//!
//! CSV columns (header row required, order free):
//! `user_id,date,amount,kind,category,description,currency`
//! where `kind` is `expense` or `income` and `currency` may be empty.

use std::collections::BTreeMap;
use std::io::Read;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{Datelike, Duration, NaiveDate};
use csv::{ReaderBuilder, StringRecord};
use serde::Serialize;
use serde_json::{json, Map, Value};
use tracing::debug;

use crate::clock::{Clock, SystemClock};
use crate::dispatch::DataLayer;
use crate::error::{Error, Result};
use crate::functions::{Entity, FunctionName};
use crate::periods::DateRange;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionKind {
    Expense,
    Income,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Expense => "expense",
            Self::Income => "income",
        }
    }

    fn matches(&self, entity: Entity) -> bool {
        match entity {
            Entity::Mixed => true,
            Entity::Expense => *self == Self::Expense,
            Entity::Income => *self == Self::Income,
        }
    }
}

/// One ledger row; amounts are positive for both kinds
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Transaction {
    #[serde(skip)]
    pub user_id: i64,
    pub date: NaiveDate,
    pub amount: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    pub kind: TransactionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    pub description: String,
}

impl Transaction {
    pub fn expense(user_id: i64, date: NaiveDate, amount: f64, description: &str) -> Self {
        Self {
            user_id,
            date,
            amount,
            currency: None,
            kind: TransactionKind::Expense,
            category: None,
            description: description.to_string(),
        }
    }

    pub fn income(user_id: i64, date: NaiveDate, amount: f64, description: &str) -> Self {
        Self {
            kind: TransactionKind::Income,
            ..Self::expense(user_id, date, amount, description)
        }
    }

    pub fn with_category(mut self, category: &str) -> Self {
        self.category = Some(category.to_string());
        self
    }

    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = Some(currency.to_uppercase());
        self
    }
}

/// Parse an amount like `1234.50`, `1 234,50` or `-300`
fn parse_amount(s: &str) -> Result<f64> {
    let cleaned: String = s
        .chars()
        .filter(|c| !c.is_whitespace() && *c != '\u{a0}')
        .collect::<String>()
        .replace(',', ".");
    cleaned
        .parse::<f64>()
        .map(f64::abs)
        .map_err(|_| Error::InvalidData(format!("Invalid amount: {}", s)))
}

fn column(headers: &StringRecord, name: &str) -> Option<usize> {
    headers
        .iter()
        .position(|h| h.trim().eq_ignore_ascii_case(name))
}

/// Transactions backed by memory
pub struct MemoryLedger {
    transactions: Vec<Transaction>,
    currency: String,
    clock: Arc<dyn Clock>,
}

impl MemoryLedger {
    pub fn new(transactions: Vec<Transaction>) -> Self {
        Self {
            transactions,
            currency: "RUB".to_string(),
            clock: Arc::new(SystemClock),
        }
    }

    /// Currency of rows that do not name one
    pub fn with_currency(mut self, currency: &str) -> Self {
        self.currency = currency.to_uppercase();
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn from_csv_path(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Self::from_reader(file)
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(reader);

        let headers = rdr.headers()?.clone();
        let required = |name: &str| {
            column(&headers, name)
                .ok_or_else(|| Error::InvalidData(format!("Missing column: {}", name)))
        };
        let user_col = required("user_id")?;
        let date_col = required("date")?;
        let amount_col = required("amount")?;
        let kind_col = column(&headers, "kind");
        let category_col = column(&headers, "category");
        let description_col = column(&headers, "description");
        let currency_col = column(&headers, "currency");

        let optional = |record: &StringRecord, col: Option<usize>| {
            col.and_then(|i| record.get(i))
                .map(str::to_string)
                .filter(|s| !s.is_empty())
        };

        let mut transactions = Vec::new();
        for result in rdr.records() {
            let record = result?;

            let user_id = record
                .get(user_col)
                .and_then(|s| s.parse::<i64>().ok())
                .ok_or_else(|| Error::InvalidData("Invalid user_id".into()))?;
            let date_str = record
                .get(date_col)
                .ok_or_else(|| Error::InvalidData("Missing date".into()))?;
            let date = NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
                .map_err(|_| Error::InvalidData(format!("Invalid date: {}", date_str)))?;
            let amount = parse_amount(record.get(amount_col).unwrap_or(""))?;

            // Without a kind column, negative amounts are expenses
            let kind = match optional(&record, kind_col).as_deref() {
                Some("income") => TransactionKind::Income,
                Some(_) => TransactionKind::Expense,
                None if record.get(amount_col).is_some_and(|a| !a.starts_with('-')) => {
                    TransactionKind::Income
                }
                None => TransactionKind::Expense,
            };

            transactions.push(Transaction {
                user_id,
                date,
                amount,
                currency: optional(&record, currency_col).map(|c| c.to_uppercase()),
                kind,
                category: optional(&record, category_col),
                description: optional(&record, description_col).unwrap_or_default(),
            });
        }

        debug!("Loaded {} ledger transactions", transactions.len());
        Ok(Self::new(transactions))
    }

    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Rows for one user inside a range
    fn rows(&self, user_id: i64, range: DateRange) -> impl Iterator<Item = &Transaction> {
        self.transactions
            .iter()
            .filter(move |t| t.user_id == user_id && t.date >= range.start && t.date <= range.end)
    }

    /// Execute one function synchronously
    pub fn execute(&self, function: FunctionName, args: &Map<String, Value>) -> Result<Value> {
        let user_id = arg_i64(args, "user_id")
            .ok_or_else(|| Error::InvalidData("Missing user_id".into()))?;
        let today = self.clock.today();

        match function {
            FunctionName::GetExpensesList | FunctionName::GetIncomesList => {
                let kind = if function == FunctionName::GetExpensesList {
                    TransactionKind::Expense
                } else {
                    TransactionKind::Income
                };
                let range = arg_range(args)?;
                let category = arg_str(args, "category");
                let mut rows: Vec<&Transaction> = self
                    .rows(user_id, range)
                    .filter(|t| t.kind == kind)
                    .filter(|t| category.map_or(true, |c| same_category(t, c)))
                    .collect();
                rows.sort_by_key(|t| t.date);
                Ok(self.list_payload(rows, range, arg_i64(args, "limit")))
            }
            FunctionName::SearchTransactions => {
                let range = arg_range(args)?;
                let text = arg_str(args, "text").unwrap_or("").to_lowercase();
                let category = arg_str(args, "category");
                let min = arg_f64(args, "min_amount");
                let max = arg_f64(args, "max_amount");
                let mut rows: Vec<&Transaction> = self
                    .rows(user_id, range)
                    .filter(|t| {
                        text.is_empty()
                            || t.description.to_lowercase().contains(&text)
                            || t.category
                                .as_deref()
                                .is_some_and(|c| c.to_lowercase().contains(&text))
                    })
                    .filter(|t| category.map_or(true, |c| same_category(t, c)))
                    .filter(|t| min.map_or(true, |m| t.amount >= m))
                    .filter(|t| max.map_or(true, |m| t.amount <= m))
                    .collect();
                rows.sort_by_key(|t| t.date);
                Ok(self.list_payload(rows, range, None))
            }
            FunctionName::GetIncomeExpenseSummary => {
                let range = arg_range(args)?;
                let (mut income, mut expense) = (0.0, 0.0);
                for t in self.rows(user_id, range) {
                    match t.kind {
                        TransactionKind::Income => income += t.amount,
                        TransactionKind::Expense => expense += t.amount,
                    }
                }
                Ok(json!({
                    "success": true,
                    "income": round2(income),
                    "expense": round2(expense),
                    "balance": round2(income - expense),
                    "currency": self.currency,
                    "start_date": range.start_str(),
                    "end_date": range.end_str(),
                }))
            }
            FunctionName::GetExpensesByCategory => {
                let range = arg_range(args)?;
                let mut totals: BTreeMap<String, f64> = BTreeMap::new();
                for t in self.expenses(user_id, range) {
                    let label = t.category.clone().unwrap_or_else(|| "Uncategorized".into());
                    *totals.entry(label).or_default() += t.amount;
                }
                let mut buckets: Vec<(String, f64)> = totals.into_iter().collect();
                buckets.sort_by(|a, b| b.1.total_cmp(&a.1));
                if let Some(limit) = arg_i64(args, "limit") {
                    buckets.truncate(limit.max(1) as usize);
                }
                Ok(self.aggregate_payload(buckets, range))
            }
            FunctionName::GetDailyTotals => {
                let range = DateRange::trailing(today, arg_days(args));
                let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
                for t in self.expenses(user_id, range) {
                    *totals.entry(t.date).or_default() += t.amount;
                }
                let buckets = totals
                    .into_iter()
                    .map(|(day, sum)| (day.format("%Y-%m-%d").to_string(), sum))
                    .collect();
                Ok(self.aggregate_payload(buckets, range))
            }
            FunctionName::GetWeeklyTotals => {
                let range = DateRange::trailing(today, arg_days(args));
                let mut totals: BTreeMap<NaiveDate, f64> = BTreeMap::new();
                for t in self.expenses(user_id, range) {
                    let monday =
                        t.date - Duration::days(t.date.weekday().num_days_from_monday() as i64);
                    *totals.entry(monday.max(range.start)).or_default() += t.amount;
                }
                let buckets = totals
                    .into_iter()
                    .map(|(day, sum)| (day.format("%Y-%m-%d").to_string(), sum))
                    .collect();
                Ok(self.aggregate_payload(buckets, range))
            }
            FunctionName::GetMaxSingleExpense | FunctionName::GetMaxSingleIncome => {
                let kind = if function == FunctionName::GetMaxSingleExpense {
                    TransactionKind::Expense
                } else {
                    TransactionKind::Income
                };
                let range = DateRange::trailing(today, arg_days(args));
                let top = self
                    .rows(user_id, range)
                    .filter(|t| t.kind == kind)
                    .max_by(|a, b| a.amount.total_cmp(&b.amount));
                Ok(json!({
                    "success": true,
                    "item": top.map(|t| self.item(t)),
                    "currency": self.currency,
                    "start_date": range.start_str(),
                    "end_date": range.end_str(),
                }))
            }
            FunctionName::ComparePeriods => {
                let current = arg_range(args)?;
                let previous = DateRange::new(
                    arg_date(args, "prev_start_date")?,
                    arg_date(args, "prev_end_date")?,
                );
                let entity = arg_str(args, "entity")
                    .and_then(Entity::parse)
                    .unwrap_or(Entity::Expense);
                let total = |range: DateRange| {
                    round2(
                        self.rows(user_id, range)
                            .filter(|t| t.kind.matches(entity))
                            .map(|t| t.amount)
                            .sum(),
                    )
                };
                Ok(json!({
                    "success": true,
                    "entity": entity.as_str(),
                    "currency": self.currency,
                    "current": {
                        "start_date": current.start_str(),
                        "end_date": current.end_str(),
                        "total": total(current),
                    },
                    "previous": {
                        "start_date": previous.start_str(),
                        "end_date": previous.end_str(),
                        "total": total(previous),
                    },
                }))
            }
            FunctionName::AnalyticsQuery => {
                let range = arg_range(args)?;
                let entity = arg_str(args, "entity")
                    .and_then(Entity::parse)
                    .unwrap_or(Entity::Expense);
                let category = arg_str(args, "category");
                let mut rows: Vec<&Transaction> = self
                    .rows(user_id, range)
                    .filter(|t| t.kind.matches(entity))
                    .filter(|t| category.map_or(true, |c| same_category(t, c)))
                    .collect();
                match arg_str(args, "sort_by") {
                    Some("amount") => rows.sort_by(|a, b| a.amount.total_cmp(&b.amount)),
                    _ => rows.sort_by_key(|t| t.date),
                }
                if arg_str(args, "sort_dir") != Some("asc") {
                    rows.reverse();
                }
                let limit = arg_i64(args, "limit").unwrap_or(20);
                Ok(self.list_payload(rows, range, Some(limit)))
            }
        }
    }

    fn expenses(&self, user_id: i64, range: DateRange) -> impl Iterator<Item = &Transaction> {
        self.rows(user_id, range)
            .filter(|t| t.kind == TransactionKind::Expense)
    }

    fn item(&self, t: &Transaction) -> Value {
        serde_json::to_value(t).unwrap_or(Value::Null)
    }

    fn list_payload(&self, rows: Vec<&Transaction>, range: DateRange, limit: Option<i64>) -> Value {
        let total_count = rows.len();
        let take = limit.map_or(total_count, |l| l.max(1) as usize);
        let items: Vec<Value> = rows.iter().take(take).map(|t| self.item(t)).collect();
        json!({
            "success": true,
            "items": items,
            "total_count": total_count,
            "currency": self.currency,
            "start_date": range.start_str(),
            "end_date": range.end_str(),
        })
    }

    fn aggregate_payload(&self, buckets: Vec<(String, f64)>, range: DateRange) -> Value {
        let total: f64 = buckets.iter().map(|(_, sum)| sum).sum();
        let buckets: Vec<Value> = buckets
            .into_iter()
            .map(|(label, sum)| json!({ "label": label, "amount": round2(sum) }))
            .collect();
        json!({
            "success": true,
            "buckets": buckets,
            "total": round2(total),
            "currency": self.currency,
            "start_date": range.start_str(),
            "end_date": range.end_str(),
        })
    }
}

#[async_trait]
impl DataLayer for MemoryLedger {
    async fn call(&self, function: FunctionName, args: &Map<String, Value>) -> Result<Value> {
        self.execute(function, args)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

fn same_category(t: &Transaction, category: &str) -> bool {
    t.category
        .as_deref()
        .is_some_and(|c| c.to_lowercase() == category.to_lowercase())
}

fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn arg_i64(args: &Map<String, Value>, key: &str) -> Option<i64> {
    match args.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn arg_f64(args: &Map<String, Value>, key: &str) -> Option<f64> {
    args.get(key).and_then(Value::as_f64)
}

fn arg_days(args: &Map<String, Value>) -> i64 {
    arg_i64(args, "days").unwrap_or(30).clamp(1, 3650)
}

fn arg_date(args: &Map<String, Value>, key: &str) -> Result<NaiveDate> {
    let text = arg_str(args, key).ok_or_else(|| Error::InvalidData(format!("Missing {}", key)))?;
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .map_err(|_| Error::InvalidData(format!("Invalid {}: {}", key, text)))
}

fn arg_range(args: &Map<String, Value>) -> Result<DateRange> {
    Ok(DateRange::new(
        arg_date(args, "start_date")?,
        arg_date(args, "end_date")?,
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).unwrap()
    }

    fn ledger() -> MemoryLedger {
        MemoryLedger::new(vec![
            Transaction::expense(1, d(2025, 8, 3), 1200.0, "Groceries").with_category("Food"),
            Transaction::expense(1, d(2025, 8, 5), 300.0, "Coffee").with_category("Food"),
            Transaction::expense(1, d(2025, 8, 20), 5000.0, "TV").with_category("Electronics"),
            Transaction::income(1, d(2025, 8, 10), 90000.0, "Salary"),
            Transaction::expense(1, d(2025, 9, 2), 45.0, "Gum"),
            Transaction::expense(2, d(2025, 8, 4), 777.0, "Someone else"),
        ])
        .with_clock(Arc::new(ManualClock::new(d(2025, 9, 10))))
    }

    fn args(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_expenses_list_scoped_to_user_and_range() {
        let result = ledger()
            .execute(
                FunctionName::GetExpensesList,
                &args(json!({ "user_id": 1, "start_date": "2025-08-01", "end_date": "2025-08-31" })),
            )
            .unwrap();
        let items = result["items"].as_array().unwrap();
        assert_eq!(items.len(), 3);
        assert_eq!(items[0]["description"], "Groceries");
        assert_eq!(items[0]["date"], "2025-08-03");
        assert!(items.iter().all(|i| i["description"] != "Someone else"));
    }

    #[test]
    fn test_by_category_sorted_desc() {
        let result = ledger()
            .execute(
                FunctionName::GetExpensesByCategory,
                &args(json!({ "user_id": 1, "start_date": "2025-08-01", "end_date": "2025-08-31" })),
            )
            .unwrap();
        assert_eq!(result["buckets"][0]["label"], "Electronics");
        assert_eq!(result["buckets"][1]["amount"], 1500.0);
        assert_eq!(result["total"], 6500.0);
    }

    #[test]
    fn test_max_single_expense_window() {
        let result = ledger()
            .execute(
                FunctionName::GetMaxSingleExpense,
                &args(json!({ "user_id": 1, "days": 30 })),
            )
            .unwrap();
        assert_eq!(result["item"]["description"], "TV");

        let result = ledger()
            .execute(
                FunctionName::GetMaxSingleIncome,
                &args(json!({ "user_id": 1, "days": 7 })),
            )
            .unwrap();
        assert!(result["item"].is_null());
    }

    #[test]
    fn test_analytics_ascending_limit_one() {
        let result = ledger()
            .execute(
                FunctionName::AnalyticsQuery,
                &args(json!({
                    "user_id": 1, "entity": "expense", "sort_by": "amount", "sort_dir": "asc",
                    "limit": 1, "start_date": "2025-08-01", "end_date": "2025-09-10"
                })),
            )
            .unwrap();
        assert_eq!(result["items"].as_array().unwrap().len(), 1);
        assert_eq!(result["items"][0]["description"], "Gum");
        assert_eq!(result["total_count"], 4);
    }

    #[test]
    fn test_compare_periods() {
        let result = ledger()
            .execute(
                FunctionName::ComparePeriods,
                &args(json!({
                    "user_id": 1,
                    "start_date": "2025-09-01", "end_date": "2025-09-10",
                    "prev_start_date": "2025-08-01", "prev_end_date": "2025-08-10",
                })),
            )
            .unwrap();
        assert_eq!(result["current"]["total"], 45.0);
        assert_eq!(result["previous"]["total"], 1500.0);
    }

    #[test]
    fn test_missing_dates_is_error() {
        let result = ledger().execute(FunctionName::GetIncomesList, &args(json!({ "user_id": 1 })));
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }

    #[test]
    fn test_from_csv() {
        let csv = "\
user_id,date,amount,kind,category,description,currency
1,2025-08-03,\"1 200,50\",expense,Food,Groceries,
1,2025-08-10,90000,income,,Salary,RUB
1,2025-08-11,15,expense,,Lunch,usd
";
        let ledger = MemoryLedger::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(ledger.len(), 3);
        assert_eq!(ledger.transactions[0].amount, 1200.5);
        assert_eq!(ledger.transactions[0].category.as_deref(), Some("Food"));
        assert_eq!(ledger.transactions[1].kind, TransactionKind::Income);
        assert_eq!(ledger.transactions[1].category, None);
        assert_eq!(ledger.transactions[2].currency.as_deref(), Some("USD"));
    }

    #[test]
    fn test_from_csv_missing_column() {
        let result = MemoryLedger::from_reader("user_id,amount\n1,5\n".as_bytes());
        assert!(matches!(result, Err(Error::InvalidData(_))));
    }
}
