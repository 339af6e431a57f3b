//! Intent detection
//!
//! One `chat` call asks the model to either invoke a catalog function with a
//! sentinel-prefixed line (`FUNCTION_CALL: name(key=value, ...)`) or answer in
//! prose. The reply is parsed leniently: garbled names are recovered from the
//! user's wording, and the analytics `query` argument is kept as raw JSON.

use std::collections::HashMap;
use std::sync::{Arc, OnceLock};

use regex::Regex;
use serde_json::{Map, Value};
use tracing::{debug, info};

use crate::ai::{ChatMessage, ChatRequest, Role};
use crate::clock::Clock;
use crate::config::OperationType;
use crate::error::Result;
use crate::heuristics;
use crate::prompts::Prompt;
use crate::router::ProviderRouter;

/// Marker that introduces a function invocation in the model's reply
pub const SENTINEL: &str = "FUNCTION_CALL:";

/// A parsed, not yet validated invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FunctionCall {
    pub name: String,
    pub raw_args: String,
}

/// Outcome of intent detection
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Intent {
    Call(FunctionCall),
    /// Conversational reply to show as-is
    Text(String),
}

fn call_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^\s*([^\s(]+)\s*\(").expect("valid regex"))
}

fn name_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9_]+$").expect("valid regex"))
}

fn query_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(?:^|[\s,])query\s*[=:]\s*(.*)$").expect("valid regex"))
}

fn positional_date_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(\d{4}-\d{2}-\d{2}|\d{1,2}\.\d{1,2}(\.\d{4})?)$").expect("valid regex")
    })
}

/// Parse a model reply into an intent
///
/// `user_text` is the user's original message, used to recover the function
/// when the name in the reply is not a plain identifier.
pub fn parse_reply(reply: &str, user_text: &str) -> Intent {
    let reply = reply.trim();

    // ASCII uppercasing keeps byte offsets
    let Some(pos) = reply.to_ascii_uppercase().find(SENTINEL) else {
        return Intent::Text(reply.to_string());
    };
    let invocation = reply[pos + SENTINEL.len()..]
        .trim()
        .trim_matches('`')
        .trim();

    let (name, raw_args) = match call_regex().captures(invocation) {
        Some(caps) => {
            let open = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (
                caps[1].trim().to_string(),
                enclosed_args(&invocation[open..]).trim().to_string(),
            )
        }
        None => {
            let name = invocation
                .split_whitespace()
                .next()
                .unwrap_or_default()
                .to_string();
            (name, String::new())
        }
    };

    if name_regex().is_match(&name) {
        return Intent::Call(FunctionCall { name, raw_args });
    }

    match heuristics::remap_function(user_text) {
        Some(function) => {
            debug!(raw_name = %name, function = %function, "Remapped malformed function name");
            Intent::Call(FunctionCall {
                name: function.as_str().to_string(),
                raw_args,
            })
        }
        None => Intent::Text(reply.to_string()),
    }
}

/// Split a raw argument string into typed key/value pairs
///
/// A `query` whose value opens a JSON object is captured greedily to the end
/// of the string and kept raw. Any other `query` is an ordinary piece. Pieces are split on top-level commas,
/// accept `key=value` or `key: value`, and are typed as integer, float, bool,
/// null or string. Positional dates become `start_date` then `end_date`.
pub fn parse_arguments(raw_args: &str) -> Map<String, Value> {
    let mut args = Map::new();
    let mut rest = raw_args.trim();

    if let Some(caps) = query_regex().captures(rest) {
        let value = caps[1].trim();
        if value.trim_start_matches(['"', '\'']).starts_with('{') {
            let whole = caps.get(0).map(|m| m.start()).unwrap_or(0);
            args.insert("query".to_string(), Value::String(unquote(value).to_string()));
            rest = rest[..whole].trim_end().trim_end_matches(',');
        }
    }

    let mut positional_dates = ["start_date", "end_date"].into_iter();
    for piece in split_top_level(rest) {
        let piece = piece.trim();
        if piece.is_empty() {
            continue;
        }

        match split_key_value(piece) {
            Some((key, value)) => {
                let key = unquote(key.trim()).to_string();
                args.insert(key, parse_value(value.trim()));
            }
            None => {
                let value = unquote(piece);
                if positional_date_regex().is_match(value) {
                    if let Some(key) = positional_dates.next() {
                        args.insert(key.to_string(), Value::String(value.to_string()));
                        continue;
                    }
                }
                debug!(piece = %piece, "Skipping positional argument");
            }
        }
    }

    args
}

/// Text up to the `)` that closes the call
///
/// Without a closing paren the arguments run to the end of the line.
fn enclosed_args(after_open: &str) -> &str {
    let mut depth = 0i32;
    let mut quote: Option<char> = None;

    for (i, c) in after_open.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '(' | '[' | '{') => depth += 1,
            (None, ')') if depth == 0 => return &after_open[..i],
            (None, ')' | ']' | '}') => depth -= 1,
            _ => {}
        }
    }
    after_open.lines().next().unwrap_or_default()
}

/// Split on commas outside quotes and brackets
fn split_top_level(input: &str) -> Vec<&str> {
    let mut pieces = Vec::new();
    let mut depth = 0i32;
    let mut quote: Option<char> = None;
    let mut start = 0;

    for (i, c) in input.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '[' | '{' | '(') => depth += 1,
            (None, ']' | '}' | ')') => depth -= 1,
            (None, ',') if depth <= 0 => {
                pieces.push(&input[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    pieces.push(&input[start..]);
    pieces
}

/// Split at the first `=` or `:` outside quotes
fn split_key_value(piece: &str) -> Option<(&str, &str)> {
    let mut quote: Option<char> = None;
    for (i, c) in piece.char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '=' | ':') => return Some((&piece[..i], &piece[i + 1..])),
            _ => {}
        }
    }
    None
}

fn unquote(value: &str) -> &str {
    let bytes = value.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if (first == b'"' || first == b'\'') && first == last {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Type a bare value; quoted values stay strings
fn parse_value(value: &str) -> Value {
    let unquoted = unquote(value);
    if unquoted.len() != value.len() {
        return Value::String(unquoted.to_string());
    }

    if let Ok(n) = value.parse::<i64>() {
        return Value::Number(n.into());
    }
    if let Ok(f) = value.parse::<f64>() {
        if let Some(n) = serde_json::Number::from_f64(f) {
            return Value::Number(n);
        }
    }
    match value.to_ascii_lowercase().as_str() {
        "true" => return Value::Bool(true),
        "false" => return Value::Bool(false),
        "null" | "none" => return Value::Null,
        _ => {}
    }
    if value.starts_with('[') || value.starts_with('{') {
        if let Ok(parsed) = serde_json::from_str(value) {
            return parsed;
        }
    }
    Value::String(value.to_string())
}

/// Issues the intent-detection call
pub struct IntentParser {
    router: Arc<ProviderRouter>,
    prompt: Prompt,
    clock: Arc<dyn Clock>,
    context_turns: usize,
    currency: String,
}

impl IntentParser {
    pub fn new(
        router: Arc<ProviderRouter>,
        prompt: Prompt,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let context_turns = router.config().context_turns;
        let currency = router.config().default_currency.clone();
        Self {
            router,
            prompt,
            clock,
            context_turns,
            currency,
        }
    }

    /// Ask the model for a function call or a prose reply
    pub async fn detect_function_call(
        &self,
        user_text: &str,
        context: &[ChatMessage],
        catalog: &str,
    ) -> Result<Intent> {
        let request = self.build_request(user_text, context, catalog);
        let reply = self.router.route(OperationType::Chat, &request).await?;

        let intent = parse_reply(&reply.text, user_text);
        match &intent {
            Intent::Call(call) => {
                info!(provider = %reply.provider, function = %call.name, "Function call detected")
            }
            Intent::Text(_) => info!(provider = %reply.provider, "Conversational reply"),
        }
        Ok(intent)
    }

    fn build_request(&self, user_text: &str, context: &[ChatMessage], catalog: &str) -> ChatRequest {
        let today = self.clock.today().format("%Y-%m-%d").to_string();
        let context = render_context(context, self.context_turns);

        let mut vars: HashMap<&str, &str> = HashMap::new();
        vars.insert("today", &today);
        vars.insert("currency", &self.currency);
        vars.insert("catalog", catalog);
        vars.insert("context", &context);
        vars.insert("message", user_text);

        ChatRequest::new(self.prompt.render_user(&vars))
            .with_system(self.prompt.render_system(&vars))
            .with_temperature(0.1)
            .with_max_tokens(512)
    }
}

/// Last `turns` messages, one per line
fn render_context(context: &[ChatMessage], turns: usize) -> String {
    let skip = context.len().saturating_sub(turns);
    context[skip..]
        .iter()
        .map(|m| {
            let speaker = match m.role {
                Role::User => "User",
                Role::Assistant => "Assistant",
            };
            format!("{}: {}", speaker, m.content.replace('\n', " "))
        })
        .collect::<Vec<_>>()
        .join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(name: &str, raw_args: &str) -> Intent {
        Intent::Call(FunctionCall {
            name: name.to_string(),
            raw_args: raw_args.to_string(),
        })
    }

    #[test]
    fn test_parse_plain_call() {
        assert_eq!(
            parse_reply(
                "FUNCTION_CALL: get_expenses_list(period=last_month)",
                "траты"
            ),
            call("get_expenses_list", "period=last_month")
        );
    }

    #[test]
    fn test_parse_call_after_prose() {
        let reply = "Sure, let me check.\nFUNCTION_CALL: get_daily_totals(days=7)\n";
        assert_eq!(parse_reply(reply, ""), call("get_daily_totals", "days=7"));
    }

    #[test]
    fn test_parse_call_in_backticks() {
        let reply = "`FUNCTION_CALL: get_weekly_totals()`";
        assert_eq!(parse_reply(reply, ""), call("get_weekly_totals", ""));
    }

    #[test]
    fn test_parse_name_without_parens() {
        assert_eq!(
            parse_reply("FUNCTION_CALL: get_income_expense_summary", ""),
            call("get_income_expense_summary", "")
        );
    }

    #[test]
    fn test_call_stops_at_closing_paren() {
        let reply = "FUNCTION_CALL: get_expenses_list(period=last_month) (this shows August)";
        assert_eq!(
            parse_reply(reply, ""),
            call("get_expenses_list", "period=last_month")
        );

        let reply = r#"FUNCTION_CALL: search_transactions(text="кофе (latte)", days=7) then summarize()"#;
        assert_eq!(
            parse_reply(reply, ""),
            call("search_transactions", r#"text="кофе (latte)", days=7"#)
        );
    }

    #[test]
    fn test_unclosed_call_runs_to_end_of_line() {
        let reply = "FUNCTION_CALL: get_daily_totals(days=7\nI will fetch that now.";
        assert_eq!(parse_reply(reply, ""), call("get_daily_totals", "days=7"));
    }

    #[test]
    fn test_prose_without_sentinel() {
        assert_eq!(
            parse_reply("  Привет! Чем помочь?  ", "привет"),
            Intent::Text("Привет! Чем помочь?".to_string())
        );
    }

    #[test]
    fn test_malformed_name_remapped() {
        let reply = "FUNCTION_CALL: get-expenses.list(period=last_month)";
        assert_eq!(
            parse_reply(reply, "покажи траты за прошлый месяц"),
            call("get_expenses_list", "period=last_month")
        );
    }

    #[test]
    fn test_malformed_name_without_rule_is_text() {
        let reply = "FUNCTION_CALL: ???(x=1)";
        assert_eq!(parse_reply(reply, "hello"), Intent::Text(reply.to_string()));
    }

    #[test]
    fn test_parse_arguments_typed() {
        let args = parse_arguments(
            r#"start_date="2025-08-01", end_date: 2025-08-31, limit=5, ratio=0.5, exact=true, category='Еда, напитки'"#,
        );
        assert_eq!(args["start_date"], json!("2025-08-01"));
        assert_eq!(args["end_date"], json!("2025-08-31"));
        assert_eq!(args["limit"], json!(5));
        assert_eq!(args["ratio"], json!(0.5));
        assert_eq!(args["exact"], json!(true));
        assert_eq!(args["category"], json!("Еда, напитки"));
    }

    #[test]
    fn test_query_captured_raw() {
        let raw = r#"query={"entity": "expense", "sort_by": "amount", "limit": 3, "filters": {"category": "Food"}}"#;
        let args = parse_arguments(raw);
        assert_eq!(args.len(), 1);
        let query: Value = serde_json::from_str(args["query"].as_str().unwrap()).unwrap();
        assert_eq!(query["filters"]["category"], "Food");
    }

    #[test]
    fn test_query_after_other_args() {
        let raw = r#"period=this_month, query='{"sort_dir": "asc", "limit": 1}'"#;
        let args = parse_arguments(raw);
        assert_eq!(args["period"], json!("this_month"));
        assert_eq!(args["query"], json!(r#"{"sort_dir": "asc", "limit": 1}"#));
    }

    #[test]
    fn test_plain_query_does_not_swallow_later_args() {
        let args = parse_arguments(r#"query="кофе", start_date=2025-08-01, end_date=2025-08-31"#);
        assert_eq!(args["query"], json!("кофе"));
        assert_eq!(args["start_date"], json!("2025-08-01"));
        assert_eq!(args["end_date"], json!("2025-08-31"));
        assert_eq!(args.len(), 3);
    }

    #[test]
    fn test_positional_dates() {
        let args = parse_arguments(r#""2025-08-17""#);
        assert_eq!(args["start_date"], json!("2025-08-17"));
        assert!(!args.contains_key("end_date"));

        let args = parse_arguments("01.08.2025, 15.08.2025, whatever");
        assert_eq!(args["start_date"], json!("01.08.2025"));
        assert_eq!(args["end_date"], json!("15.08.2025"));
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_nested_brackets_not_split() {
        let args = parse_arguments("ids=[1, 2, 3], name=x");
        assert_eq!(args["ids"], json!([1, 2, 3]));
        assert_eq!(args["name"], json!("x"));
    }

    #[test]
    fn test_render_context_keeps_last_turns() {
        let context = vec![
            ChatMessage::user("one"),
            ChatMessage::assistant("two"),
            ChatMessage::user("three"),
        ];
        assert_eq!(render_context(&context, 2), "Assistant: two\nUser: three");
        assert_eq!(render_context(&[], 6), "");
    }
}
