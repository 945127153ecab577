use super::completion::{ChatCompletionRequest, ChatCompletionResponse, WireMessage};
use super::prompt::RELEVANCE_SYSTEM_PROMPT;
use super::types::{GenerationSettings, Role};
use crate::channel::{ChannelRequest, HttpChannel, HttpReply};

const RELEVANCE_TEMPERATURE: f32 = 0.0;
const RELEVANCE_MAX_TOKENS: u32 = 10;

/// Decides whether a message deserves documentation retrieval.
///
/// Fails open: anything short of a clear classifier verdict counts as
/// relevant.
pub struct RelevanceGate {
    channel: HttpChannel,
    model: String,
    url: String,
}

impl RelevanceGate {
    pub fn new(channel: HttpChannel, model: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            channel,
            model: model.into(),
            url: url.into(),
        }
    }

    pub fn channel(&self) -> &HttpChannel {
        &self.channel
    }

    pub fn relevance_request(&self, message: &str) -> ChatCompletionRequest {
        let settings = GenerationSettings {
            model: self.model.clone(),
            temperature: RELEVANCE_TEMPERATURE,
            max_tokens: RELEVANCE_MAX_TOKENS,
        };
        ChatCompletionRequest::new(
            &settings,
            vec![
                WireMessage::new(Role::System, RELEVANCE_SYSTEM_PROMPT),
                WireMessage::new(Role::User, message),
            ],
        )
    }

    pub async fn classify(&self, message: &str) -> bool {
        let body = match self.relevance_request(message).to_json() {
            Ok(body) => body,
            Err(e) => {
                tracing::warn!(error = %e, "Relevance request not serializable, assuming relevant");
                return true;
            }
        };

        let pending = match self.channel.send(ChannelRequest::post_json(&self.url, body)) {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(channel = %self.channel.name(), error = %e, "Relevance check unavailable, assuming relevant");
                return true;
            }
        };

        match pending.await {
            Ok(reply) => interpret_relevance(&reply),
            Err(e) => {
                tracing::warn!(channel = %self.channel.name(), error = %e, "Relevance check failed, assuming relevant");
                true
            }
        }
    }
}

/// `false` only for a 200 reply whose first choice does not mention `true`.
pub fn interpret_relevance(reply: &HttpReply) -> bool {
    if !reply.is_success() {
        tracing::warn!(status = reply.status, "Relevance check returned non-success, assuming relevant");
        return true;
    }
    let parsed = match ChatCompletionResponse::parse(&reply.body) {
        Ok(parsed) => parsed,
        Err(e) => {
            tracing::warn!(error = %e, "Relevance reply malformed, assuming relevant");
            return true;
        }
    };
    let Some(content) = parsed.first_content() else {
        tracing::warn!("Relevance reply had no choices, assuming relevant");
        return true;
    };

    let relevant = content.to_lowercase().contains("true");
    tracing::debug!(relevant, verdict = %content.trim(), "Relevance classified");
    relevant
}
