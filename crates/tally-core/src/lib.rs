//! Tally Core Library
//!
//! AI function-call orchestration for the Tally finance bot:
//! - Credential rotation with failure cooldown, per provider
//! - Provider router with fallback chains and proxy→direct retry
//! - Intent detection from free-text model replies
//! - Parameter normalization (periods, allow-lists, intent correction)
//! - Function dispatch against a pluggable data layer
//! - Localized, currency-aware response formatting
//! - Expense categorization and narrative insights
//! - Prompt library for customizable prompts

pub mod ai;
pub mod assistant;
pub mod categorize;
pub mod clock;
pub mod config;
pub mod credentials;
pub mod dispatch;
pub mod error;
pub mod format;
pub mod functions;
pub mod heuristics;
pub mod insights;
pub mod intent;
pub mod ledger;
pub mod normalize;
pub mod notify;
pub mod periods;
pub mod prompts;
pub mod router;

/// Test utilities including the mock provider server
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use ai::{ChatMessage, ChatReply, ChatRequest, ChatTransport, HttpTransport, Role};
pub use assistant::{Answer, Assistant};
pub use categorize::{Categorization, CategorySource, Categorizer};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{Config, OperationType, ProviderKind, ProviderSpec, RouteConfig};
pub use credentials::{CredentialRegistry, CredentialSnapshot, Lease, RotationRegistry};
pub use dispatch::{DataLayer, Dispatcher, FunctionResult, Handler};
pub use error::{Error, Result};
pub use format::{format_money, Formatter, Locale};
pub use functions::{Entity, FunctionName};
pub use insights::InsightWriter;
pub use intent::{FunctionCall, Intent, IntentParser};
pub use ledger::{MemoryLedger, Transaction, TransactionKind};
pub use normalize::{NormalizedCall, Normalizer};
pub use notify::{LogNotifier, MemoryNotifier, Notifier, WebhookNotifier};
pub use periods::DateRange;
pub use prompts::{Prompt, PromptId, PromptInfo, PromptLibrary, PromptSource};
pub use router::ProviderRouter;
