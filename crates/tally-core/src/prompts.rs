//! Prompt templates for provider calls
//!
//! Every prompt ships compiled into the binary and can be replaced by a file of
//! the same name in the override directory
//! (`<data_local_dir>/tally/prompts/overrides/<id>.md`).
//!
//! A prompt file is YAML frontmatter followed by a `# System` and a `# User`
//! section:
//!
//! ```text
//! ---
//! id: categorize_expense
//! version: 2
//! operation: categorization
//! ---
//! # System
//! ...
//! # User
//! {{#if amount}}Amount: {{amount}}{{/if}}
//! ```
//!
//! Templates substitute `{{var}}` and keep `{{#if var}}...{{/if}}` blocks only
//! when `var` is set and non-empty. Blocks may nest.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::Deserialize;
use tracing::debug;

use crate::config::OperationType;
use crate::error::{Error, Result};

const INTENT_DETECTION: &str = include_str!("../../../prompts/intent_detection.md");
const CATEGORIZE_EXPENSE: &str = include_str!("../../../prompts/categorize_expense.md");
const WRITE_INSIGHTS: &str = include_str!("../../../prompts/write_insights.md");

/// Known prompt IDs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptId {
    /// Function catalog + sentinel instruction for the first chat call
    IntentDetection,
    /// Single-expense categorization
    CategorizeExpense,
    /// Narrative over aggregated results
    WriteInsights,
}

impl PromptId {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::IntentDetection => "intent_detection",
            Self::CategorizeExpense => "categorize_expense",
            Self::WriteInsights => "write_insights",
        }
    }

    pub fn all() -> &'static [PromptId] {
        &[
            Self::IntentDetection,
            Self::CategorizeExpense,
            Self::WriteInsights,
        ]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::all().iter().copied().find(|id| id.as_str() == name)
    }

    /// Route the prompt is sent through
    pub fn operation(&self) -> OperationType {
        match self {
            Self::IntentDetection => OperationType::Chat,
            Self::CategorizeExpense => OperationType::Categorization,
            Self::WriteInsights => OperationType::Insights,
        }
    }

    fn embedded_text(&self) -> &'static str {
        match self {
            Self::IntentDetection => INTENT_DETECTION,
            Self::CategorizeExpense => CATEGORIZE_EXPENSE,
            Self::WriteInsights => WRITE_INSIGHTS,
        }
    }
}

impl fmt::Display for PromptId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a loaded prompt came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSource {
    Embedded,
    Override(PathBuf),
}

#[derive(Debug, Deserialize)]
struct Frontmatter {
    id: String,
    version: u32,
    operation: String,
}

/// A parsed prompt, split into its two sections
#[derive(Debug, Clone)]
pub struct Prompt {
    pub id: PromptId,
    pub version: u32,
    pub operation: OperationType,
    /// `# System` section template
    pub system: String,
    /// `# User` section template
    pub user: String,
    pub source: PromptSource,
}

impl Prompt {
    /// The compiled-in version, ignoring overrides
    pub fn embedded(id: PromptId) -> Result<Self> {
        Self::parse(id, id.embedded_text(), PromptSource::Embedded)
    }

    fn from_file(id: PromptId, path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            Error::InvalidData(format!("Failed to read prompt {}: {}", path.display(), e))
        })?;
        Self::parse(id, &text, PromptSource::Override(path.to_path_buf()))
    }

    fn parse(id: PromptId, text: &str, source: PromptSource) -> Result<Self> {
        let invalid = |msg: String| Error::InvalidData(format!("Prompt {}: {}", id, msg));

        let rest = text
            .trim_start()
            .strip_prefix("---")
            .ok_or_else(|| invalid("missing YAML frontmatter".into()))?;
        let (head, body) = rest
            .split_once("\n---")
            .ok_or_else(|| invalid("frontmatter is not closed".into()))?;

        let meta: Frontmatter = serde_yaml::from_str(head)
            .map_err(|e| invalid(format!("bad frontmatter: {}", e)))?;
        if meta.id != id.as_str() {
            return Err(invalid(format!("frontmatter names {}", meta.id)));
        }
        let operation = OperationType::from_key(meta.operation.trim())
            .ok_or_else(|| invalid(format!("unknown operation {}", meta.operation)))?;
        if operation != id.operation() {
            return Err(invalid(format!(
                "operation must be {}, not {}",
                id.operation(),
                operation
            )));
        }

        let system = section(body, "# System").ok_or_else(|| invalid("no # System section".into()))?;
        let user = section(body, "# User").ok_or_else(|| invalid("no # User section".into()))?;

        Ok(Self {
            id,
            version: meta.version,
            operation,
            system: system.to_string(),
            user: user.to_string(),
            source,
        })
    }

    pub fn is_override(&self) -> bool {
        matches!(self.source, PromptSource::Override(_))
    }

    pub fn render_system(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.system, vars)
    }

    pub fn render_user(&self, vars: &HashMap<&str, &str>) -> String {
        render_template(&self.user, vars)
    }
}

/// Loads prompts, preferring override files, and caches them
pub struct PromptLibrary {
    override_dir: Option<PathBuf>,
    cache: HashMap<PromptId, Prompt>,
}

impl PromptLibrary {
    /// Library using the platform override directory
    pub fn new() -> Self {
        Self::build(default_prompts_dir())
    }

    pub fn with_override_dir(path: PathBuf) -> Self {
        Self::build(Some(path))
    }

    /// Library that never looks at the filesystem
    pub fn embedded_only() -> Self {
        Self::build(None)
    }

    fn build(override_dir: Option<PathBuf>) -> Self {
        Self {
            override_dir,
            cache: HashMap::new(),
        }
    }

    pub fn get(&mut self, id: PromptId) -> Result<&Prompt> {
        if !self.cache.contains_key(&id) {
            let prompt = match self.override_file(id) {
                Some(path) => {
                    debug!(prompt = %id, path = %path.display(), "Using prompt override");
                    Prompt::from_file(id, &path)?
                }
                None => Prompt::embedded(id)?,
            };
            self.cache.insert(id, prompt);
        }
        self.cache
            .get(&id)
            .ok_or_else(|| Error::NotFound(format!("prompt {}", id)))
    }

    /// Every prompt with its version and origin
    ///
    /// A broken override is listed with its error rather than hiding the rest.
    pub fn list(&mut self) -> Vec<PromptInfo> {
        PromptId::all()
            .iter()
            .map(|&id| {
                let source = self
                    .override_file(id)
                    .map(PromptSource::Override)
                    .unwrap_or(PromptSource::Embedded);
                match self.get(id) {
                    Ok(prompt) => PromptInfo {
                        id,
                        version: Some(prompt.version),
                        source,
                        error: None,
                    },
                    Err(e) => PromptInfo {
                        id,
                        version: None,
                        source,
                        error: Some(e.to_string()),
                    },
                }
            })
            .collect()
    }

    pub fn has_override(&self, id: PromptId) -> bool {
        self.override_file(id).is_some()
    }

    /// Existing override file for a prompt
    fn override_file(&self, id: PromptId) -> Option<PathBuf> {
        let path = self.override_dir.as_ref()?.join(format!("{}.md", id));
        path.is_file().then_some(path)
    }

    pub fn override_dir(&self) -> Option<&Path> {
        self.override_dir.as_deref()
    }

    /// Forget loaded prompts so edited overrides are picked up
    pub fn clear_cache(&mut self) {
        self.cache.clear();
    }
}

impl Default for PromptLibrary {
    fn default() -> Self {
        Self::new()
    }
}

/// Listing entry for one prompt
#[derive(Debug, Clone)]
pub struct PromptInfo {
    pub id: PromptId,
    pub version: Option<u32>,
    pub source: PromptSource,
    /// Why the prompt failed to load
    pub error: Option<String>,
}

/// Default prompts override directory
pub fn default_prompts_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tally").join("prompts").join("overrides"))
}

/// Text between `header` (on its own line) and the next top-level header
fn section<'a>(body: &'a str, header: &str) -> Option<&'a str> {
    let mut offset = 0;
    let start = body.split_inclusive('\n').find_map(|line| {
        offset += line.len();
        (line.trim_end() == header).then_some(offset)
    })?;
    let rest = &body[start..];
    let end = rest.find("\n# ").unwrap_or(rest.len());
    Some(rest[..end].trim())
}

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\{\{\s*(?:#if\s+([A-Za-z0-9_]+)|(/if)|([A-Za-z0-9_]+))\s*\}\}")
            .expect("valid regex")
    })
}

/// Single pass over the template's tags
///
/// Unknown `{{var}}` placeholders are left in place; an unmatched `{{/if}}`
/// is ignored.
fn render_template(template: &str, vars: &HashMap<&str, &str>) -> String {
    let set = |name: &str| vars.get(name).is_some_and(|v| !v.is_empty());

    let mut out = String::with_capacity(template.len());
    // One entry per open block: whether its contents are emitted
    let mut blocks: Vec<bool> = Vec::new();
    let mut last = 0;

    for caps in tag_regex().captures_iter(template) {
        let Some(tag) = caps.get(0) else { continue };
        let emitting = blocks.last().copied().unwrap_or(true);
        if emitting {
            out.push_str(&template[last..tag.start()]);
        }
        last = tag.end();

        if let Some(var) = caps.get(1) {
            blocks.push(emitting && set(var.as_str()));
        } else if caps.get(2).is_some() {
            blocks.pop();
        } else if let Some(var) = caps.get(3) {
            if emitting {
                match vars.get(var.as_str()) {
                    Some(value) => out.push_str(value),
                    None => out.push_str(tag.as_str()),
                }
            }
        }
    }

    if blocks.last().copied().unwrap_or(true) {
        out.push_str(&template[last..]);
    }
    out
}
