pub mod types;
pub mod completion;
pub mod classify;
pub mod retrieval;
pub mod context;
pub mod prompt;
pub mod conversation;
pub mod orchestrator;

use thiserror::Error;

use crate::channel::ChannelError;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("AI backend not initialized: {0}")]
    Configuration(String),

    #[error("{0}")]
    Channel(#[from] ChannelError),

    #[error("Completion service error: {message}")]
    Api { status: u16, message: String },

    #[error("Malformed completion response: {0}")]
    Protocol(String),

    #[error("Failed to serialize request: {0}")]
    Serialization(#[from] serde_json::Error),
}
