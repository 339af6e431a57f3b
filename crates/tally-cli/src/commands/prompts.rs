//! Prompt library commands

use anyhow::Result;
use tally_core::prompts::default_prompts_dir;
use tally_core::{PromptId, PromptLibrary, PromptSource};

fn describe(source: &PromptSource) -> String {
    match source {
        PromptSource::Embedded => "built-in".to_string(),
        PromptSource::Override(path) => format!("override ({})", path.display()),
    }
}

/// List prompts with version and origin
pub fn cmd_prompts_list() -> Result<()> {
    let mut library = PromptLibrary::new();

    println!("{:<22} {:>7}  {:<15} {}", "PROMPT", "VERSION", "ROUTE", "SOURCE");
    println!("{}", "-".repeat(60));

    for info in library.list() {
        let version = info
            .version
            .map(|v| format!("v{}", v))
            .unwrap_or_else(|| "-".to_string());
        println!(
            "{:<22} {:>7}  {:<15} {}",
            info.id.as_str(),
            version,
            info.id.operation().as_str(),
            describe(&info.source)
        );
        if let Some(error) = info.error {
            println!("    ⚠️  {}", error);
        }
    }

    if let Some(dir) = library.override_dir() {
        println!();
        println!("Overrides are read from {}", dir.display());
    }

    Ok(())
}

/// Print both sections of a prompt
pub fn cmd_prompts_show(prompt_id: &str) -> Result<()> {
    let Some(id) = PromptId::from_name(prompt_id) else {
        let known: Vec<&str> = PromptId::all().iter().map(|id| id.as_str()).collect();
        eprintln!("Unknown prompt '{}'. Known prompts: {}", prompt_id, known.join(", "));
        return Ok(());
    };

    let mut library = PromptLibrary::new();
    let prompt = library.get(id)?;

    println!(
        "{} v{} · route {} · {}",
        prompt.id,
        prompt.version,
        prompt.operation,
        describe(&prompt.source)
    );
    println!();
    println!("# System");
    println!("{}", prompt.system);
    println!();
    println!("# User");
    println!("{}", prompt.user);

    Ok(())
}

/// Print the override directory
pub fn cmd_prompts_path() -> Result<()> {
    let Some(path) = default_prompts_dir() else {
        anyhow::bail!("No local data directory on this system");
    };
    println!("{}", path.display());
    if !path.exists() {
        eprintln!("(does not exist yet; create it and copy a prompt file there to customize it)");
    }
    Ok(())
}
