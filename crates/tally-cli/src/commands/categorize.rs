//! Expense categorization command

use std::path::Path;

use anyhow::Result;
use tally_core::{CategorySource, Categorizer, PromptId, PromptLibrary};

use super::{build_runtime, load_config};

/// Split a comma-separated category list, dropping blanks
pub fn split_categories(categories: &str) -> Vec<String> {
    categories
        .split(',')
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect()
}

pub async fn cmd_categorize(
    config_path: Option<&Path>,
    description: &str,
    categories: &str,
    amount: Option<f64>,
    fallback: Option<&str>,
) -> Result<()> {
    let categories = split_categories(categories);
    if categories.is_empty() {
        anyhow::bail!("--categories must name at least one category");
    }

    let runtime = build_runtime(load_config(config_path)?);
    let prompt = PromptLibrary::new()
        .get(PromptId::CategorizeExpense)?
        .clone();

    let mut categorizer = Categorizer::new(runtime.router.clone(), prompt);
    if let Some(fallback) = fallback {
        categorizer = categorizer.with_fallback_category(fallback);
    }

    let result = categorizer
        .categorize(description, amount, &categories)
        .await?;

    let source = match &result.source {
        CategorySource::Model { provider } => format!("model ({})", provider),
        CategorySource::Keywords => "keywords".to_string(),
        CategorySource::Fallback => "fallback".to_string(),
    };
    println!("\"{}\" → {}", description, result.category);
    println!("  Confidence: {:.0}%", result.confidence * 100.0);
    println!("  Source:     {}", source);

    Ok(())
}
