//! Question answering commands

use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use serde_json::{json, Value};
use tally_core::intent::parse_reply;
use tally_core::{
    Assistant, Clock, Dispatcher, InsightWriter, Intent, Locale, ManualClock, MemoryLedger,
    Normalizer, PromptId, PromptLibrary, SystemClock,
};
use tracing::warn;

use super::{build_runtime, load_config};

/// Answer one question against a CSV ledger
#[allow(clippy::too_many_arguments)]
pub async fn cmd_ask(
    config_path: Option<&Path>,
    message: &str,
    ledger_path: Option<&Path>,
    user: i64,
    locale: &str,
    insights: bool,
    json_output: bool,
) -> Result<()> {
    let config = load_config(config_path)?;
    let runtime = build_runtime(config);
    let locale = Locale::parse(locale);

    let ledger = match ledger_path {
        Some(path) => MemoryLedger::from_csv_path(path)
            .with_context(|| format!("Failed to load ledger {}", path.display()))?,
        None => {
            warn!("No --ledger given; queries run against an empty ledger");
            MemoryLedger::new(Vec::new())
        }
    }
    .with_currency(&runtime.config.default_currency);

    let mut prompts = PromptLibrary::new();
    let mut assistant = Assistant::new(
        runtime.router.clone(),
        &mut prompts,
        Dispatcher::from_data_layer(Arc::new(ledger)),
        Arc::new(SystemClock),
    )?;
    if insights {
        let prompt = prompts.get(PromptId::WriteInsights)?.clone();
        assistant = assistant.with_insights(InsightWriter::new(runtime.router.clone(), prompt));
    }

    let answer = assistant.answer(user, message, &[], locale).await;

    if json_output {
        let output = json!({
            "text": answer.text,
            "function": answer.call.as_ref().map(|c| c.name()),
            "args": answer.call.as_ref().map(|c| Value::Object(c.args.clone())),
            "result": answer.result.as_ref().map(|r| Value::Object(r.payload().clone())),
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", answer.text);
    }

    Ok(())
}

/// Normalize a model reply without calling any provider
pub fn parse_call(reply: &str, message: &str, user: i64, clock: Arc<dyn Clock>) -> Result<Value> {
    match parse_reply(reply, message) {
        Intent::Text(text) => Ok(json!({ "text": text })),
        Intent::Call(call) => {
            let normalized = Normalizer::new(clock).normalize(&call.name, &call.raw_args, user, message)?;
            Ok(json!({
                "function": normalized.name(),
                "args": normalized.args,
            }))
        }
    }
}

pub fn cmd_parse(reply: &str, message: &str, user: i64, today: Option<&str>) -> Result<()> {
    let clock: Arc<dyn Clock> = match today {
        Some(date) => {
            let date = NaiveDate::parse_from_str(date, "%Y-%m-%d")
                .context("Invalid --today date format (use YYYY-MM-DD)")?;
            Arc::new(ManualClock::new(date))
        }
        None => Arc::new(SystemClock),
    };

    let output = parse_call(reply, message, user, clock)?;
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}
