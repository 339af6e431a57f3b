//! CLI command tests

use std::io::Write;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Parser;
use tally_core::{Config, ManualClock, RotationRegistry};

use crate::cli::{Cli, Commands, PromptsAction};
use crate::commands::{self, truncate};

fn clock() -> Arc<ManualClock> {
    Arc::new(ManualClock::new(NaiveDate::from_ymd_opt(2025, 9, 10).unwrap()))
}

const TEST_CONFIG: &str = r#"
[defaults]
cooldown_secs = 120

[providers.openai]
kind = "openai_compatible"
base_url = "http://127.0.0.1:9/v1"
default_model = "gpt-4o-mini"
keys = ["sk-test-secret-one", "sk-test-secret-two"]

[providers.gemini]
kind = "gemini"
base_url = "http://127.0.0.1:9/v1beta"
default_model = "gemini-2.0-flash"
uses_proxy = true

[routing.chat]
primary = "openai"
fallbacks = ["gemini"]
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

// ========== Argument Parsing Tests ==========

#[test]
fn test_parse_ask_args() {
    let cli = Cli::try_parse_from([
        "tally",
        "--config",
        "my.toml",
        "ask",
        "траты за март",
        "--ledger",
        "tx.csv",
        "--user",
        "42",
        "--locale",
        "ru",
        "--insights",
    ])
    .unwrap();

    assert_eq!(cli.config.unwrap().to_str(), Some("my.toml"));
    match cli.command {
        Commands::Ask {
            message,
            ledger,
            user,
            locale,
            insights,
            json,
        } => {
            assert_eq!(message, "траты за март");
            assert_eq!(ledger.unwrap().to_str(), Some("tx.csv"));
            assert_eq!(user, 42);
            assert_eq!(locale, "ru");
            assert!(insights);
            assert!(!json);
        }
        _ => panic!("expected ask"),
    }
}

#[test]
fn test_parse_defaults() {
    let cli = Cli::try_parse_from(["tally", "ask", "hi"]).unwrap();
    assert!(cli.config.is_none());
    assert!(!cli.verbose);
    match cli.command {
        Commands::Ask { user, locale, .. } => {
            assert_eq!(user, 1);
            assert_eq!(locale, "en");
        }
        _ => panic!("expected ask"),
    }
}

#[test]
fn test_parse_global_verbose_after_subcommand() {
    let cli = Cli::try_parse_from(["tally", "providers", "-v", "--json"]).unwrap();
    assert!(cli.verbose);
    assert!(matches!(cli.command, Commands::Providers { json: true }));
}

#[test]
fn test_parse_prompts_subcommands() {
    let cli = Cli::try_parse_from(["tally", "prompts"]).unwrap();
    assert!(matches!(cli.command, Commands::Prompts { action: None }));

    let cli = Cli::try_parse_from(["tally", "prompts", "show", "intent_detection"]).unwrap();
    match cli.command {
        Commands::Prompts {
            action: Some(PromptsAction::Show { prompt_id }),
        } => assert_eq!(prompt_id, "intent_detection"),
        _ => panic!("expected prompts show"),
    }
}

#[test]
fn test_parse_categorize_requires_categories() {
    assert!(Cli::try_parse_from(["tally", "categorize", "Uber"]).is_err());
    let cli =
        Cli::try_parse_from(["tally", "categorize", "Uber", "-c", "Food,Transport", "-a", "12.5"])
            .unwrap();
    match cli.command {
        Commands::Categorize { amount, .. } => assert_eq!(amount, Some(12.5)),
        _ => panic!("expected categorize"),
    }
}

// ========== Parse Command Tests ==========

#[test]
fn test_parse_call_resolves_period() {
    let output = commands::parse_call(
        "FUNCTION_CALL: get_expenses_list(period=last_month)",
        "покажи траты за прошлый месяц",
        5,
        clock(),
    )
    .unwrap();

    assert_eq!(output["function"], "get_expenses_list");
    assert_eq!(output["args"]["start_date"], "2025-08-01");
    assert_eq!(output["args"]["end_date"], "2025-08-31");
    assert_eq!(output["args"]["user_id"], 5);
}

#[test]
fn test_parse_call_prose() {
    let output = commands::parse_call("Hello! How can I help?", "hi", 1, clock()).unwrap();
    assert_eq!(output["text"], "Hello! How can I help?");
    assert!(output.get("function").is_none());
}

#[test]
fn test_parse_call_unknown_function() {
    let result = commands::parse_call("FUNCTION_CALL: drop_tables()", "", 1, clock());
    assert!(result.is_err());
}

#[test]
fn test_cmd_parse_invalid_today() {
    let result = commands::cmd_parse("hi", "", 1, Some("10.09.2025"));
    assert!(result.is_err());
}

// ========== Config & Providers Tests ==========

#[test]
fn test_load_config_from_file() {
    let file = write_config(TEST_CONFIG);
    let config = commands::load_config(Some(file.path())).unwrap();
    assert_eq!(config.providers.len(), 2);
    assert_eq!(config.cooldown.as_secs(), 120);
}

#[test]
fn test_load_config_missing_file() {
    let result = commands::load_config(Some(std::path::Path::new("/nonexistent/tally.toml")));
    assert!(result.is_err());
}

#[test]
fn test_load_config_rejects_unknown_route() {
    let file = write_config(
        r#"
[providers.openai]
kind = "openai_compatible"
base_url = "http://localhost/v1"
default_model = "m"

[routing.chat]
primary = "nobody"
"#,
    );
    assert!(commands::load_config(Some(file.path())).is_err());
}

#[test]
fn test_providers_report_hides_keys() {
    let config = Config::from_toml(TEST_CONFIG).unwrap();
    let registry = RotationRegistry::new(config.credential_pools_with(|_| None), config.cooldown);

    let report = commands::providers_report(&config, &registry);
    let text = report.to_string();
    assert!(!text.contains("sk-test-secret-one"));

    let providers = report["providers"].as_array().unwrap();
    let openai = providers.iter().find(|p| p["name"] == "openai").unwrap();
    let credentials = openai["credentials"].as_array().unwrap();
    assert_eq!(credentials.len(), 2);
    assert_eq!(credentials[0]["fingerprint"].as_str().unwrap().len(), 8);
    assert_eq!(credentials[0]["working"], true);

    let gemini = providers.iter().find(|p| p["name"] == "gemini").unwrap();
    assert!(gemini["credentials"].as_array().unwrap().is_empty());
    assert_eq!(gemini["uses_proxy"], true);

    let chat = report["routes"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["operation"] == "chat")
        .unwrap();
    assert_eq!(chat["primary"], "openai");
    assert_eq!(chat["fallbacks"][0], "gemini");
}

// ========== Categorize & Prompts Tests ==========

#[test]
fn test_split_categories() {
    assert_eq!(
        commands::split_categories(" Food, Transport ,,Кафе "),
        vec!["Food", "Transport", "Кафе"]
    );
    assert!(commands::split_categories(" , ").is_empty());
}

#[test]
fn test_cmd_prompts_list() {
    assert!(commands::cmd_prompts_list().is_ok());
}

#[test]
fn test_cmd_prompts_show_unknown_id() {
    assert!(commands::cmd_prompts_show("no_such_prompt").is_ok());
}

#[test]
fn test_cmd_prompts_show() {
    assert!(commands::cmd_prompts_show("categorize_expense").is_ok());
}

// ========== Utility Tests ==========

#[test]
fn test_truncate() {
    assert_eq!(truncate("short", 10), "short");
    assert_eq!(truncate("gemini-2.0-flash-experimental", 12), "gemini-2....");
    assert_eq!(truncate("траты за месяц", 8), "траты...");
}
