//! Single-flight HTTP channel.
//!
//! Each pipeline purpose (generation, relevance) owns one
//! channel, and each channel carries at most one request at a time. The
//! transfer runs on a spawned runtime task; the caller awaits a
//! `PendingResponse` and is never blocked.
//!
//! **Design**:
//! - `attach()` binds the channel to a runtime handle and builds its client
//! - `send()` fails synchronously on configuration problems or a busy channel
//! - the in-flight flag is released by `InFlightGuard`, owned by the spawned
//!   task, so an abandoned `PendingResponse` still frees the channel once the
//!   transfer drains

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::sync::oneshot;

use crate::config::Credential;

// ═══════════════════════════════════════════════════════════
// Types
// ═══════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HttpMethod {
    Get,
    Post,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelRequest {
    pub url: String,
    pub method: HttpMethod,
    /// Extra headers. `Authorization` is added by the channel.
    pub headers: Vec<(String, String)>,
    pub body: String,
}

impl ChannelRequest {
    /// JSON POST with the content type set.
    pub fn post_json(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Post,
            headers: vec![("Content-Type".to_string(), "application/json".to_string())],
            body: body.into(),
        }
    }
}

/// Status and body of a completed transfer, whatever the status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpReply {
    pub status: u16,
    pub body: String,
}

impl HttpReply {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    #[error("Channel '{channel}' is not attached to a runtime")]
    NotAttached { channel: String },

    #[error("Channel '{channel}' has no API credential configured")]
    MissingCredential { channel: String },

    #[error("Channel '{channel}' already has a request in flight")]
    Busy { channel: String },

    #[error("Failed to build HTTP client: {0}")]
    ClientInit(String),

    #[error("Request failed: {0}")]
    Transport(String),
}

// ═══════════════════════════════════════════════════════════
// HttpChannel
// ═══════════════════════════════════════════════════════════

pub struct HttpChannel {
    name: String,
    credential: Option<Credential>,
    timeout: Duration,
    runtime: Option<Handle>,
    client: Option<reqwest::Client>,
    in_flight: Arc<AtomicBool>,
}

impl HttpChannel {
    /// Unattached channel. `send` fails with `NotAttached` until `attach`.
    pub fn new(name: impl Into<String>, credential: Option<Credential>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            credential,
            timeout,
            runtime: None,
            client: None,
            in_flight: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Bind to a runtime and build the HTTP client.
    pub fn attach(&mut self, runtime: Handle) -> Result<(), ChannelError> {
        let client = reqwest::Client::builder()
            .timeout(self.timeout)
            .build()
            .map_err(|e| ChannelError::ClientInit(e.to_string()))?;
        self.client = Some(client);
        self.runtime = Some(runtime);
        tracing::debug!(channel = %self.name, timeout_secs = self.timeout.as_secs(), "Channel attached");
        Ok(())
    }

    /// Attach to the runtime driving the caller, if any.
    pub fn attach_current(&mut self) -> Result<(), ChannelError> {
        let handle = Handle::try_current().map_err(|_| ChannelError::NotAttached {
            channel: self.name.clone(),
        })?;
        self.attach(handle)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_attached(&self) -> bool {
        self.runtime.is_some() && self.client.is_some()
    }

    /// Attached and holding a credential.
    pub fn is_ready(&self) -> bool {
        self.is_attached() && self.credential.is_some()
    }

    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Start a transfer. Configuration errors and `Busy` are returned before
    /// any network attempt.
    pub fn send(&self, request: ChannelRequest) -> Result<PendingResponse, ChannelError> {
        let (Some(runtime), Some(client)) = (&self.runtime, &self.client) else {
            return Err(ChannelError::NotAttached {
                channel: self.name.clone(),
            });
        };
        let credential = self
            .credential
            .as_ref()
            .ok_or_else(|| ChannelError::MissingCredential {
                channel: self.name.clone(),
            })?;
        let guard = InFlightGuard::acquire(&self.in_flight).ok_or_else(|| ChannelError::Busy {
            channel: self.name.clone(),
        })?;

        let mut builder = match request.method {
            HttpMethod::Get => client.get(&request.url),
            HttpMethod::Post => client.post(&request.url),
        };
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let builder = builder.bearer_auth(credential.expose()).body(request.body);

        let (tx, rx) = oneshot::channel();
        let channel = self.name.clone();
        tracing::debug!(channel = %channel, url = %request.url, "Request dispatched");

        runtime.spawn(async move {
            let result = execute(builder).await;
            match &result {
                Ok(reply) => tracing::debug!(channel = %channel, status = reply.status, "Request completed"),
                Err(e) => tracing::warn!(channel = %channel, error = %e, "Request failed"),
            }
            // Free the channel before the caller observes the reply.
            drop(guard);
            let _ = tx.send(result);
        });

        Ok(PendingResponse { rx })
    }
}

async fn execute(builder: reqwest::RequestBuilder) -> Result<HttpReply, ChannelError> {
    let response = builder
        .send()
        .await
        .map_err(|e| ChannelError::Transport(e.to_string()))?;
    let status = response.status().as_u16();
    let body = response
        .text()
        .await
        .map_err(|e| ChannelError::Transport(e.to_string()))?;
    Ok(HttpReply { status, body })
}

// ═══════════════════════════════════════════════════════════
// InFlightGuard: RAII single-flight token
// ═══════════════════════════════════════════════════════════

/// Dropping the guard clears the channel's in-flight flag.
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl InFlightGuard {
    fn acquire(flag: &Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()?;
        Some(Self { flag: Arc::clone(flag) })
    }
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ═══════════════════════════════════════════════════════════
// PendingResponse
// ═══════════════════════════════════════════════════════════

/// Resolves exactly once with the transfer result.
#[derive(Debug)]
pub struct PendingResponse {
    rx: oneshot::Receiver<Result<HttpReply, ChannelError>>,
}

impl Future for PendingResponse {
    type Output = Result<HttpReply, ChannelError>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(_)) => Poll::Ready(Err(ChannelError::Transport(
                "transfer task ended without a reply".to_string(),
            ))),
            Poll::Pending => Poll::Pending,
        }
    }
}
