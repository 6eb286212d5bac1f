//! Mock LLM backend server for integration tests
//!
//! Implements minimal OpenAI-compatible and Google Generative Language
//! endpoints that return canned responses and record every request.

use std::net::SocketAddr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::{Json, Router, routing};
use serde::Deserialize;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const DEFAULT_CONTENT: &str = "Hello from mock LLM";

/// Mock LLM backend that returns predictable responses
pub struct MockLlm {
    addr: SocketAddr,
    shutdown: CancellationToken,
    state: Arc<MockLlmState>,
}

/// Request as seen by the mock
#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub path: String,
    pub authorization: Option<String>,
    pub body: Value,
}

struct MockLlmState {
    request_count: AtomicU32,
    /// Number of requests to fail before succeeding (0 = never fail)
    fail_count: AtomicU32,
    /// Custom response content (if set)
    response_content: Option<String>,
    requests: Mutex<Vec<RecordedRequest>>,
}

impl MockLlm {
    /// Start the mock server, returning immediately
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_inner(0, None).await
    }

    /// Start a mock server that fails the first `n` requests with 500
    pub async fn start_failing(n: u32) -> anyhow::Result<Self> {
        Self::start_inner(n, None).await
    }

    /// Start a mock server with a custom response content
    pub async fn start_with_response(content: &str) -> anyhow::Result<Self> {
        Self::start_inner(0, Some(content.to_owned())).await
    }

    async fn start_inner(fail_count: u32, response_content: Option<String>) -> anyhow::Result<Self> {
        let state = Arc::new(MockLlmState {
            request_count: AtomicU32::new(0),
            fail_count: AtomicU32::new(fail_count),
            response_content,
            requests: Mutex::new(Vec::new()),
        });

        let app = Router::new()
            .route("/v1/chat/completions", routing::post(handle_chat_completions))
            .route("/v1beta/models/{model_action}", routing::post(handle_generate_content))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await?;
        let addr = listener.local_addr()?;
        let shutdown = CancellationToken::new();
        let shutdown_clone = shutdown.clone();

        tokio::spawn(async move {
            axum::serve(listener, app)
                .with_graceful_shutdown(async move {
                    shutdown_clone.cancelled().await;
                })
                .await
                .ok();
        });

        Ok(Self { addr, shutdown, state })
    }

    /// Base URL for configuring the mock as an OpenAI-style provider
    pub fn openai_base_url(&self) -> String {
        format!("http://{}/v1", self.addr)
    }

    /// Base URL for configuring the mock as a Google provider
    pub fn google_base_url(&self) -> String {
        format!("http://{}/v1beta/", self.addr)
    }

    /// Number of requests received, failed ones included
    pub fn request_count(&self) -> u32 {
        self.state.request_count.load(Ordering::Relaxed)
    }

    /// Most recent request
    pub fn last_request(&self) -> RecordedRequest {
        self.state
            .requests
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("at least one request")
    }
}

impl Drop for MockLlm {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionRequest {
    #[serde(default)]
    stream: Option<bool>,
    #[serde(default)]
    stream_options: Option<Value>,
    #[serde(default)]
    tools: Option<Vec<Value>>,
}

impl MockLlmState {
    fn content(&self) -> &str {
        self.response_content.as_deref().unwrap_or(DEFAULT_CONTENT)
    }

    /// Record the request and return an error response if it should fail
    fn accept(&self, path: String, headers: &HeaderMap, body: &Value) -> Option<Response> {
        self.request_count.fetch_add(1, Ordering::Relaxed);
        self.requests.lock().unwrap().push(RecordedRequest {
            path,
            authorization: headers
                .get(header::AUTHORIZATION)
                .and_then(|value| value.to_str().ok())
                .map(str::to_owned),
            body: body.clone(),
        });

        let remaining = self.fail_count.load(Ordering::Relaxed);
        if remaining > 0 {
            self.fail_count.fetch_sub(1, Ordering::Relaxed);
            return Some(
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({
                        "error": {
                            "message": "mock server intentional failure",
                            "type": "server_error"
                        }
                    })),
                )
                    .into_response(),
            );
        }

        None
    }
}

fn sse(payloads: &[Value], done: bool) -> Response {
    let mut body = String::new();
    for payload in payloads {
        body.push_str(&format!("data: {payload}\n\n"));
    }
    if done {
        body.push_str("data: [DONE]\n\n");
    }

    (StatusCode::OK, [(header::CONTENT_TYPE, "text/event-stream")], body).into_response()
}

// -- OpenAI-style handler --

const TOOL_ARGUMENTS: &str = r#"{"location":"San Francisco"}"#;

async fn handle_chat_completions(
    State(state): State<Arc<MockLlmState>>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.accept("/v1/chat/completions".to_owned(), &headers, &body) {
        return failure;
    }

    let Ok(req) = serde_json::from_value::<ChatCompletionRequest>(body) else {
        return StatusCode::BAD_REQUEST.into_response();
    };
    let has_tools = req.tools.is_some_and(|tools| !tools.is_empty());

    if req.stream.unwrap_or(false) {
        return openai_stream(state.content(), has_tools, req.stream_options.is_some());
    }

    let message = if has_tools {
        json!({
            "role": "assistant",
            "content": null,
            "tool_calls": [{
                "id": "call_test_123",
                "type": "function",
                "function": {"name": "get_weather", "arguments": TOOL_ARGUMENTS}
            }]
        })
    } else {
        json!({"role": "assistant", "content": state.content()})
    };

    Json(json!({
        "id": "chatcmpl-test-123",
        "object": "chat.completion",
        "created": 1_700_000_000,
        "choices": [{
            "index": 0,
            "message": message,
            "finish_reason": if has_tools { "tool_calls" } else { "stop" }
        }],
        "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
    }))
    .into_response()
}

fn openai_stream(content: &str, has_tools: bool, include_usage: bool) -> Response {
    let chunk = |delta: Value, finish_reason: Option<&str>| {
        json!({
            "id": "chatcmpl-test-stream",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": delta, "finish_reason": finish_reason}]
        })
    };

    let mut payloads = vec![chunk(json!({"role": "assistant", "content": ""}), None)];

    if has_tools {
        payloads.push(chunk(
            json!({"tool_calls": [{
                "index": 0, "id": "call_test_stream", "type": "function",
                "function": {"name": "get_weather", "arguments": ""}
            }]}),
            None,
        ));
        let (head, tail) = TOOL_ARGUMENTS.split_at(TOOL_ARGUMENTS.len() / 2);
        for piece in [head, tail] {
            payloads.push(chunk(
                json!({"tool_calls": [{"index": 0, "function": {"arguments": piece}}]}),
                None,
            ));
        }
        payloads.push(chunk(json!({}), Some("tool_calls")));
    } else {
        // one chunk per word
        let words: Vec<&str> = content.split_inclusive(' ').collect();
        for word in words {
            payloads.push(chunk(json!({"content": word}), None));
        }
        payloads.push(chunk(json!({}), Some("stop")));
    }

    if include_usage {
        payloads.push(json!({
            "id": "chatcmpl-test-stream",
            "object": "chat.completion.chunk",
            "choices": [],
            "usage": {"prompt_tokens": 10, "completion_tokens": 5, "total_tokens": 15}
        }));
    }

    sse(&payloads, true)
}

// -- Google handler --

async fn handle_generate_content(
    State(state): State<Arc<MockLlmState>>,
    Path(model_action): Path<String>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> Response {
    if let Some(failure) = state.accept(format!("/v1beta/models/{model_action}"), &headers, &body) {
        return failure;
    }

    let Some((_model, action)) = model_action.split_once(':') else {
        return StatusCode::NOT_FOUND.into_response();
    };
    let usage = json!({"promptTokenCount": 10, "candidatesTokenCount": 5});

    match action {
        "generateContent" => Json(json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": state.content()}]},
                "finishReason": "STOP",
                "index": 0
            }],
            "usageMetadata": usage
        }))
        .into_response(),
        "streamGenerateContent" => {
            let words: Vec<&str> = state.content().split_inclusive(' ').collect();
            let last = words.len().saturating_sub(1);
            let payloads: Vec<Value> = words
                .into_iter()
                .enumerate()
                .map(|(position, word)| {
                    let mut payload = json!({
                        "candidates": [{"content": {"role": "model", "parts": [{"text": word}]}, "index": 0}]
                    });
                    if position == last {
                        payload["candidates"][0]["finishReason"] = json!("STOP");
                        payload["usageMetadata"] = usage.clone();
                    }
                    payload
                })
                .collect();
            sse(&payloads, false)
        }
        _ => StatusCode::NOT_FOUND.into_response(),
    }
}
