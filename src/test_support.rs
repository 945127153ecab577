//! Mock chat-completion service for async tests.
//!
//! Binds an axum router to `127.0.0.1:0`, records every request, and answers
//! relevance and generation requests with separately scripted replies.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::IntoResponse;
use axum::routing::post;
use axum::Router;
use tokio::sync::oneshot;

use crate::pipeline::rag::prompt::RELEVANCE_SYSTEM_PROMPT;

pub const COMPLETIONS_PATH: &str = "/v1/chat/completions";

#[derive(Debug, Clone)]
pub struct MockReply {
    pub status: u16,
    pub body: String,
    pub delay: Duration,
}

impl MockReply {
    pub fn raw(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
            delay: Duration::ZERO,
        }
    }

    /// 200 with one assistant choice.
    pub fn ok_content(content: &str) -> Self {
        let body = serde_json::json!({
            "id": "chatcmpl-mock",
            "object": "chat.completion",
            "choices": [{
                "index": 0,
                "message": { "role": "assistant", "content": content },
                "finish_reason": "stop"
            }]
        });
        Self::raw(200, body.to_string())
    }

    /// Non-200 with the service's error envelope.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({ "error": { "message": message, "type": "invalid_request_error" } });
        Self::raw(status, body.to_string())
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub authorization: Option<String>,
    pub body: serde_json::Value,
}

impl RecordedRequest {
    pub fn is_relevance(&self) -> bool {
        self.body["messages"][0]["content"].as_str() == Some(RELEVANCE_SYSTEM_PROMPT)
    }

    pub fn messages(&self) -> Vec<serde_json::Value> {
        self.body["messages"].as_array().cloned().unwrap_or_default()
    }

    pub fn last_content(&self) -> String {
        self.messages()
            .last()
            .and_then(|m| m["content"].as_str())
            .unwrap_or_default()
            .to_string()
    }
}

struct MockState {
    requests: Mutex<Vec<RecordedRequest>>,
    relevance: Mutex<MockReply>,
    generation: Mutex<MockReply>,
}

pub struct MockCompletionServer {
    url: String,
    state: Arc<MockState>,
    shutdown: Option<oneshot::Sender<()>>,
}

impl MockCompletionServer {
    /// Relevance answers "true", generation answers "Mock answer" until
    /// scripted otherwise.
    pub async fn start() -> Self {
        let state = Arc::new(MockState {
            requests: Mutex::new(Vec::new()),
            relevance: Mutex::new(MockReply::ok_content("true")),
            generation: Mutex::new(MockReply::ok_content("Mock answer")),
        });
        let app = Router::new()
            .route(COMPLETIONS_PATH, post(complete))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind mock server");
        let addr = listener.local_addr().expect("mock server address");
        let (tx, rx) = oneshot::channel::<()>();

        tokio::spawn(async move {
            let shutdown = async {
                let _ = rx.await;
            };
            if let Err(e) = axum::serve(listener, app).with_graceful_shutdown(shutdown).await {
                tracing::error!("Mock completion server error: {e}");
            }
        });

        Self {
            url: format!("http://{addr}{COMPLETIONS_PATH}"),
            state,
            shutdown: Some(tx),
        }
    }

    pub fn url(&self) -> String {
        self.url.clone()
    }

    pub fn set_relevance(&self, reply: MockReply) {
        *self.state.relevance.lock().unwrap() = reply;
    }

    pub fn set_generation(&self, reply: MockReply) {
        *self.state.generation.lock().unwrap() = reply;
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.requests.lock().unwrap().clone()
    }

    pub fn relevance_requests(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| r.is_relevance()).collect()
    }

    pub fn generation_requests(&self) -> Vec<RecordedRequest> {
        self.requests().into_iter().filter(|r| !r.is_relevance()).collect()
    }
}

impl Drop for MockCompletionServer {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
    }
}

async fn complete(
    State(state): State<Arc<MockState>>,
    headers: HeaderMap,
    body: String,
) -> impl IntoResponse {
    let recorded = RecordedRequest {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string),
        body: serde_json::from_str(&body).unwrap_or(serde_json::Value::Null),
    };
    let reply = if recorded.is_relevance() {
        state.relevance.lock().unwrap().clone()
    } else {
        state.generation.lock().unwrap().clone()
    };
    state.requests.lock().unwrap().push(recorded);

    if !reply.delay.is_zero() {
        tokio::time::sleep(reply.delay).await;
    }
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, [(header::CONTENT_TYPE, "application/json")], reply.body)
}
