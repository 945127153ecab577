pub const ASSISTANT_SYSTEM_PROMPT: &str = "You are a helpful AI assistant integrated into the Godot game engine editor. You help users with game development, coding, and engine-related questions.";

pub const RELEVANCE_SYSTEM_PROMPT: &str = r#"You are a classifier that determines if a message is relevant to the Godot game engine and game development. Respond with 'true' for relevant messages and 'false' for irrelevant ones. A message is relevant if it's about:
1. Godot engine features, APIs, or functionality
2. Game development concepts or techniques
3. Game design or implementation using Godot
4. Technical questions about game development
5. Game asset creation or management in Godot
6. Game programming concepts
7. Game optimization or performance
8. Game testing and debugging
9. Game deployment and publishing
10. Game development workflows
Respond only with 'true' or 'false'."#;

/// Transient status shown while a run is in flight.
pub const THINKING_STATUS: &str = "Thinking...";

pub const WELCOME_MESSAGE: &str = "Welcome to the Godot AI Assistant! How can I help you today?";

pub const RETRIEVAL_UNAVAILABLE_WARNING: &str =
    "Warning: Failed to initialize documentation retriever. Documentation context will not be available.";

pub const CONVERSATION_CLEARED_NOTICE: &str = "Started a new conversation.";

/// Build the user turn sent for generation.
///
/// With no documentation context the query is sent verbatim.
pub fn augment_prompt(query: &str, context: &str) -> String {
    if context.is_empty() {
        return query.to_string();
    }

    let mut prompt = String::with_capacity(query.len() * 2 + context.len() + 96);
    prompt.push_str(&format!("User Query: {query}\n\n"));
    prompt.push_str("Relevant Godot Documentation:\n");
    prompt.push_str(context);
    prompt.push_str(&format!(
        "\n\nPlease use the above documentation context to help answer this question: {query}"
    ));
    prompt
}
