//! Execution dispatcher
//!
//! Runs a normalized call against its handler and always produces a
//! [`FunctionResult`]. Handler errors, panics and missing handlers become
//! `success: false` results with a sanitized one-line message; nothing
//! propagates to the caller.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::Result;
use crate::functions::FunctionName;
use crate::normalize::NormalizedCall;

/// Longest failure message kept, in characters
const MAX_MESSAGE_CHARS: usize = 200;

/// The data layer boundary: one call per analytical function
#[async_trait]
pub trait DataLayer: Send + Sync {
    async fn call(&self, function: FunctionName, args: &Map<String, Value>) -> Result<Value>;
}

/// An async handler
#[async_trait]
pub trait AsyncHandler: Send + Sync {
    async fn call(&self, args: Map<String, Value>) -> Result<Value>;
}

type BlockingFn = dyn Fn(&Map<String, Value>) -> Result<Value> + Send + Sync;

/// How a function is executed
#[derive(Clone)]
pub enum Handler {
    /// Awaited on the runtime
    Async(Arc<dyn AsyncHandler>),
    /// Run on the blocking thread pool
    Blocking(Arc<BlockingFn>),
}

impl Handler {
    pub fn blocking<F>(f: F) -> Self
    where
        F: Fn(&Map<String, Value>) -> Result<Value> + Send + Sync + 'static,
    {
        Self::Blocking(Arc::new(f))
    }
}

/// Routes a [`DataLayer`] function through the async handler interface
struct DataLayerHandler {
    layer: Arc<dyn DataLayer>,
    function: FunctionName,
}

#[async_trait]
impl AsyncHandler for DataLayerHandler {
    async fn call(&self, args: Map<String, Value>) -> Result<Value> {
        self.layer.call(self.function, &args).await
    }
}

/// Structured function outcome
///
/// An opaque JSON object from the data layer. Only `success` and `message`
/// have fixed meaning here; the formatter reads the rest.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct FunctionResult {
    payload: Map<String, Value>,
}

impl FunctionResult {
    /// Wrap a data-layer value; non-objects land under `data`
    pub fn from_value(value: Value) -> Self {
        match value {
            Value::Object(payload) => Self { payload },
            other => {
                let mut payload = Map::new();
                payload.insert("success".into(), Value::Bool(true));
                payload.insert("data".into(), other);
                Self { payload }
            }
        }
    }

    /// Failure with a sanitized message
    pub fn failure(message: impl AsRef<str>) -> Self {
        let mut payload = Map::new();
        payload.insert("success".into(), Value::Bool(false));
        payload.insert(
            "message".into(),
            Value::from(sanitize_message(message.as_ref())),
        );
        Self { payload }
    }

    /// Failure without a message; the reply shows only the localized error line
    pub fn internal_error() -> Self {
        let mut payload = Map::new();
        payload.insert("success".into(), Value::Bool(false));
        Self { payload }
    }

    pub fn not_found(name: &str) -> Self {
        Self::failure(format!("Function not found: {}", name))
    }

    /// A missing `success` flag counts as success
    pub fn success(&self) -> bool {
        self.payload
            .get("success")
            .and_then(Value::as_bool)
            .unwrap_or(true)
    }

    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }

    /// Set a key unless the data layer already provided it
    pub fn set_default(&mut self, key: &str, value: Value) {
        self.payload.entry(key.to_string()).or_insert(value);
    }

    pub fn payload(&self) -> &Map<String, Value> {
        &self.payload
    }

    pub fn into_value(self) -> Value {
        Value::Object(self.payload)
    }
}

/// First line, control characters removed, truncated
pub fn sanitize_message(text: &str) -> String {
    let line = text
        .lines()
        .map(str::trim)
        .find(|l| !l.is_empty())
        .unwrap_or("");
    let clean: String = line.chars().filter(|c| !c.is_control()).collect();
    if clean.chars().count() > MAX_MESSAGE_CHARS {
        let cut: String = clean.chars().take(MAX_MESSAGE_CHARS).collect();
        format!("{}…", cut.trim_end())
    } else if clean.is_empty() {
        "unknown error".to_string()
    } else {
        clean
    }
}

/// Name → handler table
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<FunctionName, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every function served by one data layer
    pub fn from_data_layer(layer: Arc<dyn DataLayer>) -> Self {
        let mut dispatcher = Self::new();
        for &function in FunctionName::all() {
            dispatcher.register(
                function,
                Handler::Async(Arc::new(DataLayerHandler {
                    layer: layer.clone(),
                    function,
                })),
            );
        }
        dispatcher
    }

    pub fn register(&mut self, function: FunctionName, handler: Handler) {
        self.handlers.insert(function, handler);
    }

    pub fn has_handler(&self, function: FunctionName) -> bool {
        self.handlers.contains_key(&function)
    }

    /// Execute a call; never fails
    pub async fn run(&self, call: &NormalizedCall) -> FunctionResult {
        let Some(handler) = self.handlers.get(&call.function).cloned() else {
            warn!(function = %call.function, "No handler registered");
            return FunctionResult::not_found(call.name());
        };

        let args = call.args.clone();
        let joined = match handler {
            Handler::Async(handler) => {
                tokio::spawn(async move { handler.call(args).await }).await
            }
            Handler::Blocking(f) => tokio::task::spawn_blocking(move || f(&args)).await,
        };

        match joined {
            Ok(Ok(value)) => {
                debug!(function = %call.function, "Function completed");
                FunctionResult::from_value(value)
            }
            Ok(Err(e)) => {
                warn!(function = %call.function, error = %e, "Function failed");
                FunctionResult::internal_error()
            }
            Err(join_error) => {
                warn!(function = %call.function, error = %join_error, "Function panicked");
                FunctionResult::internal_error()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use serde_json::json;

    fn call(function: FunctionName) -> NormalizedCall {
        let mut args = Map::new();
        args.insert("user_id".into(), json!(1));
        NormalizedCall { function, args }
    }

    struct EchoLayer;

    #[async_trait]
    impl DataLayer for EchoLayer {
        async fn call(&self, function: FunctionName, args: &Map<String, Value>) -> Result<Value> {
            Ok(json!({ "success": true, "function": function.as_str(), "user_id": args["user_id"] }))
        }
    }

    #[tokio::test]
    async fn test_data_layer_dispatch() {
        let dispatcher = Dispatcher::from_data_layer(Arc::new(EchoLayer));
        let result = dispatcher.run(&call(FunctionName::GetDailyTotals)).await;
        assert!(result.success());
        assert_eq!(result.get("function"), Some(&json!("get_daily_totals")));
        assert_eq!(result.get("user_id"), Some(&json!(1)));
    }

    #[tokio::test]
    async fn test_missing_handler_is_not_found() {
        let dispatcher = Dispatcher::new();
        let result = dispatcher.run(&call(FunctionName::ComparePeriods)).await;
        assert!(!result.success());
        assert!(result.message().unwrap().contains("compare_periods"));
    }

    #[tokio::test]
    async fn test_handler_error_not_exposed() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(
            FunctionName::GetExpensesList,
            Handler::blocking(|_| {
                Err(Error::InvalidData(
                    "relation \"tx\" does not exist\n\tat line 4\u{7}".into(),
                ))
            }),
        );
        let result = dispatcher.run(&call(FunctionName::GetExpensesList)).await;
        assert!(!result.success());
        assert!(result.message().is_none());
        assert!(!serde_json::to_string(result.payload()).unwrap().contains("relation"));
    }

    #[tokio::test]
    async fn test_data_layer_failure_message_kept() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(
            FunctionName::GetExpensesList,
            Handler::blocking(|_| Ok(json!({ "success": false, "message": "No such category" }))),
        );
        let result = dispatcher.run(&call(FunctionName::GetExpensesList)).await;
        assert!(!result.success());
        assert_eq!(result.message(), Some("No such category"));
    }

    #[tokio::test]
    async fn test_panic_becomes_failure() {
        let mut dispatcher = Dispatcher::new();
        dispatcher.register(
            FunctionName::GetWeeklyTotals,
            Handler::blocking(|_| panic!("boom")),
        );
        let result = dispatcher.run(&call(FunctionName::GetWeeklyTotals)).await;
        assert!(!result.success());
        assert!(result.message().is_none());
    }

    #[test]
    fn test_success_defaults_true() {
        assert!(FunctionResult::from_value(json!({ "items": [] })).success());
        assert!(FunctionResult::from_value(json!([1, 2])).success());
        assert!(!FunctionResult::from_value(json!({ "success": false })).success());
    }

    #[test]
    fn test_sanitize_message() {
        assert_eq!(sanitize_message("\n  first\nsecond"), "first");
        assert_eq!(sanitize_message(""), "unknown error");
        let long = "x".repeat(500);
        let clean = sanitize_message(&long);
        assert_eq!(clean.chars().count(), MAX_MESSAGE_CHARS + 1);
        assert!(clean.ends_with('…'));
    }
}
