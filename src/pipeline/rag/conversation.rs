use uuid::Uuid;

use super::completion::{ChatCompletionRequest, WireMessage};
use super::prompt::ASSISTANT_SYSTEM_PROMPT;
use super::types::{GenerationSettings, Role, Turn};
use super::RagError;

/// In-memory transcript of one chat session.
///
/// The system instruction is not stored; it is prepended to every request.
#[derive(Debug, Clone)]
pub struct ConversationSession {
    id: Uuid,
    settings: GenerationSettings,
    turns: Vec<Turn>,
}

impl Default for ConversationSession {
    fn default() -> Self {
        Self::new(GenerationSettings::default())
    }
}

impl ConversationSession {
    pub fn new(settings: GenerationSettings) -> Self {
        Self {
            id: Uuid::new_v4(),
            settings,
            turns: Vec::new(),
        }
    }

    /// Identifies the transcript in logs. Renewed by `clear`.
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn settings(&self) -> &GenerationSettings {
        &self.settings
    }

    pub fn append_user_turn(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(Role::User, text));
    }

    pub fn append_assistant_turn(&mut self, text: impl Into<String>) {
        self.turns.push(Turn::new(Role::Assistant, text));
    }

    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn clear(&mut self) {
        self.turns.clear();
        self.id = Uuid::new_v4();
    }

    /// System turn, then every stored turn in append order. The wire carries
    /// only `system` and `user` roles, so assistant turns go out as `user`.
    pub fn generation_request(&self) -> ChatCompletionRequest {
        let mut messages = Vec::with_capacity(self.turns.len() + 1);
        messages.push(WireMessage::new(Role::System, ASSISTANT_SYSTEM_PROMPT));
        messages.extend(
            self.turns
                .iter()
                .map(|t| WireMessage::new(wire_role(t.role), t.content.clone())),
        );
        ChatCompletionRequest::new(&self.settings, messages)
    }

    pub fn build_generation_payload(&self) -> Result<String, RagError> {
        self.generation_request().to_json()
    }
}

fn wire_role(role: Role) -> Role {
    match role {
        Role::System => Role::System,
        Role::User | Role::Assistant => Role::User,
    }
}
