//! Test utilities for tally-core
//!
//! - [`MockProviderServer`]: an HTTP server speaking the OpenAI-compatible,
//!   Anthropic and Gemini chat endpoints, with scripted replies, failure
//!   injection and request recording
//! - [`mock_router`]: a [`ProviderRouter`] over [`MockTransport`] for tests
//!   that do not need real HTTP

use std::collections::{HashMap, VecDeque};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Json, Router,
};
use chrono::NaiveDate;
use secrecy::SecretString;
use serde_json::{json, Value};
use tokio::sync::oneshot;

use crate::ai::MockTransport;
use crate::clock::ManualClock;
use crate::config::{Config, OperationType, ProviderKind, ProviderSpec};
use crate::credentials::RotationRegistry;
use crate::notify::MemoryNotifier;
use crate::router::ProviderRouter;

/// A scripted server reply
#[derive(Debug, Clone)]
pub enum MockReply {
    /// Successful completion with this text
    Text(String),
    /// Non-success HTTP status
    Status(u16),
    /// Well-formed but empty/filtered completion
    Blocked,
}

/// Which protocol a request arrived on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    OpenAI,
    Anthropic,
    Gemini,
}

/// A request the server received
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub endpoint: Endpoint,
    pub model: String,
    /// Credential as sent in the auth header
    pub api_key: String,
    pub body: Value,
}

struct ServerState {
    queued: VecDeque<MockReply>,
    standing: MockReply,
    requests: Vec<RecordedRequest>,
}

type Shared = Arc<Mutex<ServerState>>;

fn lock(state: &Shared) -> MutexGuard<'_, ServerState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Mock chat-completion server for integration tests
pub struct MockProviderServer {
    addr: SocketAddr,
    shutdown_tx: Option<oneshot::Sender<()>>,
    state: Shared,
}

impl MockProviderServer {
    /// Start the mock server on an available port
    ///
    /// Every endpoint replies "mock reply" until scripted otherwise.
    pub async fn start() -> Self {
        let state: Shared = Arc::new(Mutex::new(ServerState {
            queued: VecDeque::new(),
            standing: MockReply::Text("mock reply".into()),
            requests: Vec::new(),
        }));

        let app = Router::new()
            .route("/v1/chat/completions", post(handle_openai))
            .route("/v1/messages", post(handle_anthropic))
            .route("/v1beta/models/:action", post(handle_gemini))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    shutdown_rx.await.ok();
                })
                .await
                .unwrap();
        });

        Self {
            addr,
            shutdown_tx: Some(shutdown_tx),
            state,
        }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// Base URL for `openai_compatible` providers
    pub fn openai_base(&self) -> String {
        format!("{}/v1", self.url())
    }

    /// Base URL for `anthropic` providers
    pub fn anthropic_base(&self) -> String {
        format!("{}/v1", self.url())
    }

    /// Base URL for `gemini` providers
    pub fn gemini_base(&self) -> String {
        format!("{}/v1beta", self.url())
    }

    /// Standing reply text
    pub fn reply_with(&self, text: &str) -> &Self {
        lock(&self.state).standing = MockReply::Text(text.to_string());
        self
    }

    /// Every request fails with this status until scripted otherwise
    pub fn fail_with(&self, status: u16) -> &Self {
        lock(&self.state).standing = MockReply::Status(status);
        self
    }

    /// Queue a one-shot reply, consumed before the standing one
    pub fn enqueue(&self, reply: MockReply) -> &Self {
        lock(&self.state).queued.push_back(reply);
        self
    }

    pub fn request_count(&self) -> usize {
        lock(&self.state).requests.len()
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        lock(&self.state).requests.clone()
    }

    /// Stop the mock server
    pub fn stop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

impl Drop for MockProviderServer {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Record the request and pick the reply
fn take_reply(state: &Shared, request: RecordedRequest) -> MockReply {
    let mut state = lock(state);
    state.requests.push(request);
    match state.queued.pop_front() {
        Some(reply) => reply,
        None => state.standing.clone(),
    }
}

fn header(headers: &HeaderMap, name: &str) -> String {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string()
}

fn status_response(status: u16) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(json!({ "error": { "message": "scripted failure" } }))).into_response()
}

/// OpenAI-compatible chat completions endpoint
async fn handle_openai(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let request = RecordedRequest {
        endpoint: Endpoint::OpenAI,
        model: body["model"].as_str().unwrap_or_default().to_string(),
        api_key: header(&headers, "authorization")
            .trim_start_matches("Bearer ")
            .to_string(),
        body,
    };

    match take_reply(&state, request) {
        MockReply::Text(text) => Json(json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": text },
                "finish_reason": "stop"
            }]
        }))
        .into_response(),
        MockReply::Status(status) => status_response(status),
        MockReply::Blocked => Json(json!({
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": null },
                "finish_reason": "content_filter"
            }]
        }))
        .into_response(),
    }
}

/// Anthropic messages endpoint
async fn handle_anthropic(
    State(state): State<Shared>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let request = RecordedRequest {
        endpoint: Endpoint::Anthropic,
        model: body["model"].as_str().unwrap_or_default().to_string(),
        api_key: header(&headers, "x-api-key"),
        body,
    };

    match take_reply(&state, request) {
        MockReply::Text(text) => Json(json!({
            "id": "msg_mock",
            "type": "message",
            "role": "assistant",
            "content": [{ "type": "text", "text": text }],
            "stop_reason": "end_turn"
        }))
        .into_response(),
        MockReply::Status(status) => status_response(status),
        MockReply::Blocked => Json(json!({
            "content": [],
            "stop_reason": "refusal"
        }))
        .into_response(),
    }
}

/// Gemini `models/{model}:generateContent` endpoint
async fn handle_gemini(
    State(state): State<Shared>,
    Path(action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    let Some(model) = action.strip_suffix(":generateContent") else {
        return status_response(404);
    };
    let request = RecordedRequest {
        endpoint: Endpoint::Gemini,
        model: model.to_string(),
        api_key: header(&headers, "x-goog-api-key"),
        body,
    };

    match take_reply(&state, request) {
        MockReply::Text(text) => Json(json!({
            "candidates": [{
                "content": { "role": "model", "parts": [{ "text": text }] },
                "finishReason": "STOP"
            }]
        }))
        .into_response(),
        MockReply::Status(status) => status_response(status),
        MockReply::Blocked => Json(json!({
            "promptFeedback": { "blockReason": "SAFETY" }
        }))
        .into_response(),
    }
}

/// A router over a [`MockTransport`], with handles for assertions
pub struct MockRouter {
    pub router: Arc<ProviderRouter>,
    pub transport: Arc<MockTransport>,
    pub notifier: Arc<MemoryNotifier>,
    pub clock: Arc<ManualClock>,
}

/// Build a router over `providers`, in fallback order
///
/// Each provider is OpenAI-compatible with one key named `<provider>-key`,
/// and every operation routes to the first provider with the rest as
/// fallbacks. The clock reads 2025-09-10.
pub fn mock_router(providers: &[&str]) -> MockRouter {
    let mut config = Config::default();
    let mut pools = HashMap::new();
    for name in providers {
        config = config.with_provider(ProviderSpec::new(
            name,
            ProviderKind::OpenAICompatible,
            &format!("http://{}", name),
            &format!("{}-model", name),
        ));
        pools.insert(
            name.to_string(),
            vec![SecretString::from(format!("{}-key", name))],
        );
    }
    if let Some((primary, fallbacks)) = providers.split_first() {
        for &operation in OperationType::all() {
            config = config.with_route(operation, primary, fallbacks);
        }
    }

    let clock = Arc::new(ManualClock::new(
        NaiveDate::from_ymd_opt(2025, 9, 10).unwrap(),
    ));
    let registry = Arc::new(RotationRegistry::with_clock(
        pools,
        Duration::from_secs(300),
        clock.clone(),
    ));
    let transport = Arc::new(MockTransport::new());
    let notifier = Arc::new(MemoryNotifier::new());
    let router = Arc::new(ProviderRouter::new(
        Arc::new(config),
        registry,
        transport.clone(),
        notifier.clone(),
    ));

    MockRouter {
        router,
        transport,
        notifier,
        clock,
    }
}
