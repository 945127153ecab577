use std::fmt;

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

/// Speaker of a transcript turn (wire values are lowercase).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One stored exchange in the conversation transcript.
#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub content: String,
    /// Local time the turn was appended. Diagnostics only, never sent.
    pub at: DateTime<Local>,
}

impl Turn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            at: Local::now(),
        }
    }
}

/// Sampling settings attached to every generation request.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for GenerationSettings {
    fn default() -> Self {
        Self {
            model: crate::config::DEFAULT_MODEL.to_string(),
            temperature: crate::config::DEFAULT_TEMPERATURE,
            max_tokens: crate::config::DEFAULT_MAX_TOKENS,
        }
    }
}

impl From<&crate::config::SessionConfig> for GenerationSettings {
    fn from(config: &crate::config::SessionConfig) -> Self {
        Self {
            model: config.model.clone(),
            temperature: config.temperature,
            max_tokens: config.max_tokens,
        }
    }
}

/// A passage returned by the retrieval driver, in driver order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedPassage {
    pub content: String,
    #[serde(default)]
    pub metadata: serde_json::Map<String, serde_json::Value>,
    pub relevance: f64,
}

impl RetrievedPassage {
    pub fn new(content: impl Into<String>, relevance: f64) -> Self {
        Self {
            content: content.into(),
            metadata: serde_json::Map::new(),
            relevance,
        }
    }
}

/// Where a pipeline run currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Classifying,
    Retrieving,
    Augmenting,
    Generating,
    Delivered,
}

impl RunState {
    /// Whether a run occupies the controller.
    pub fn is_active(&self) -> bool {
        !matches!(self, Self::Idle)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Classifying => write!(f, "classifying"),
            Self::Retrieving => write!(f, "retrieving"),
            Self::Augmenting => write!(f, "augmenting"),
            Self::Generating => write!(f, "generating"),
            Self::Delivered => write!(f, "delivered"),
        }
    }
}

/// How one submission settled.
#[derive(Debug, Clone, PartialEq)]
pub enum RunOutcome {
    /// Assistant answer delivered and recorded.
    Delivered(String),
    /// The service answered with zero choices. Nothing recorded.
    EmptyResponse,
    /// Generation failed; the surfaced message.
    Failed(String),
    /// Generation prerequisites missing; the surfaced message.
    Unconfigured(String),
    /// Another run is active on this controller.
    Rejected,
    /// Blank submission.
    Ignored,
}

/// Which dependencies came up during initialisation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Readiness {
    pub generation: bool,
    pub retrieval: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&Role::System).unwrap(), "\"system\"");
        assert_eq!(serde_json::to_string(&Role::Assistant).unwrap(), "\"assistant\"");
    }

    #[test]
    fn passage_metadata_defaults_to_empty() {
        let passage: RetrievedPassage =
            serde_json::from_str(r#"{"content":"Nodes","relevance":0.5}"#).unwrap();
        assert!(passage.metadata.is_empty());
        assert_eq!(passage.content, "Nodes");
    }

    #[test]
    fn only_idle_is_inactive() {
        assert!(!RunState::Idle.is_active());
        assert!(RunState::Classifying.is_active());
        assert!(RunState::Delivered.is_active());
    }

    #[test]
    fn run_state_display() {
        assert_eq!(RunState::Retrieving.to_string(), "retrieving");
    }
}
