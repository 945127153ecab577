//! Chat-completion wire format.
//!
//! Request and response bodies of the completion endpoint, plus the
//! interpretation of a generation reply.

use serde::{Deserialize, Serialize};

use super::types::{GenerationSettings, Role};
use super::RagError;
use crate::channel::HttpReply;

/// Request body for the chat-completion endpoint
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<WireMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl ChatCompletionRequest {
    pub fn new(settings: &GenerationSettings, messages: Vec<WireMessage>) -> Self {
        Self {
            model: settings.model.clone(),
            messages,
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        }
    }

    pub fn to_json(&self) -> Result<String, RagError> {
        Ok(serde_json::to_string(self)?)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub role: Role,
    pub content: String,
}

impl WireMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Response body on success
#[derive(Debug, Deserialize)]
pub struct ChatCompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: Option<ChoiceMessage>,
}

#[derive(Debug, Deserialize)]
pub struct ChoiceMessage {
    #[serde(default)]
    pub content: Option<String>,
}

impl ChatCompletionResponse {
    pub fn parse(body: &str) -> Result<Self, RagError> {
        serde_json::from_str(body).map_err(|e| RagError::Protocol(e.to_string()))
    }

    /// Content of the first choice. `None` when there are no choices; a
    /// choice without content reads as empty text.
    pub fn first_content(&self) -> Option<&str> {
        self.choices.first().map(|choice| {
            choice
                .message
                .as_ref()
                .and_then(|m| m.content.as_deref())
                .unwrap_or("")
        })
    }
}

/// Error body the service may send with a non-200 status
#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: String,
}

/// The service's `error.message`, when the body carries one.
pub fn api_error_message(body: &str) -> Option<String> {
    serde_json::from_str::<ApiErrorBody>(body)
        .ok()
        .map(|b| b.error.message)
        .filter(|m| !m.trim().is_empty())
}

/// Interpret a generation reply: `Ok(Some(text))` for an answer, `Ok(None)`
/// for a well-formed reply with zero choices.
pub fn interpret_generation(reply: &HttpReply) -> Result<Option<String>, RagError> {
    if !reply.is_success() {
        let message = api_error_message(&reply.body)
            .unwrap_or_else(|| format!("HTTP {}", reply.status));
        return Err(RagError::Api {
            status: reply.status,
            message,
        });
    }

    let parsed = ChatCompletionResponse::parse(&reply.body)?;
    Ok(parsed.first_content().map(str::to_string))
}
