//! Chat context - the ordered role-tagged message log handed to the LLM

use serde::{Deserialize, Serialize};

/// Role tag for a conversational message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

impl ChatRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            ChatRole::System => "system",
            ChatRole::User => "user",
            ChatRole::Assistant => "assistant",
        }
    }
}

/// One entry in the conversation log
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// Ordered conversation log. Owned by the per-job assistant and discarded
/// when the job ends.
#[derive(Debug, Clone, Default)]
pub struct ChatContext {
    messages: Vec<ChatMessage>,
}

impl ChatContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a context seeded with a single system-role message (the persona).
    pub fn with_system(text: impl Into<String>) -> Self {
        let mut ctx = Self::new();
        ctx.append(ChatRole::System, text);
        ctx
    }

    /// Append a message; order is preserved.
    pub fn append(&mut self, role: ChatRole, text: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: text.into(),
        });
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn with_system_seeds_exactly_one_system_message() {
        let ctx = ChatContext::with_system("You are a voice assistant.");
        assert_eq!(ctx.len(), 1);
        assert_eq!(ctx.messages()[0].role, ChatRole::System);
        assert_eq!(ctx.messages()[0].content, "You are a voice assistant.");
    }

    #[test]
    fn append_preserves_order() {
        let mut ctx = ChatContext::with_system("persona");
        ctx.append(ChatRole::User, "hello");
        ctx.append(ChatRole::Assistant, "hi there");

        let roles: Vec<_> = ctx.messages().iter().map(|m| m.role).collect();
        assert_eq!(
            roles,
            vec![ChatRole::System, ChatRole::User, ChatRole::Assistant]
        );
    }

    #[test]
    fn role_serializes_lowercase() {
        let msg = ChatMessage {
            role: ChatRole::Assistant,
            content: "ok".to_string(),
        };
        let json = serde_json::to_string(&msg).unwrap();
        assert!(json.contains("\"role\":\"assistant\""));
    }
}
