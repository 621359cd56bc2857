//! **Language model** - turn the chat context into the assistant's reply.
//!
//! `OpenAiLlm` speaks the OpenAI-compatible chat-completions API, so any
//! provider exposing that surface works by pointing `LLM_API_URL` at it.

use crate::chat::{ChatContext, ChatMessage};
use crate::error::{VoiceError, VoiceResult};
use serde::Deserialize;
use std::time::Duration;

const DEFAULT_LLM_API_BASE: &str = "https://api.openai.com/v1";
const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// Backend that produces the next assistant reply for a conversation.
pub trait LlmBackend: Send + Sync {
    fn complete(&self, chat: &ChatContext) -> VoiceResult<String>;
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: String,
}

/// Placeholder LLM: returns a fixed reply. Use for pipeline tests.
#[derive(Debug, Default)]
pub struct PlaceholderLlm {
    pub reply: Option<String>,
}

impl PlaceholderLlm {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reply(s: impl Into<String>) -> Self {
        Self {
            reply: Some(s.into()),
        }
    }
}

impl LlmBackend for PlaceholderLlm {
    fn complete(&self, chat: &ChatContext) -> VoiceResult<String> {
        if let Some(ref r) = self.reply {
            return Ok(r.clone());
        }
        Ok(format!("[LLM placeholder: {} messages in context]", chat.len()))
    }
}

/// Production LLM backend: OpenAI-compatible chat completions.
/// Uses `LLM_API_URL` (default https://api.openai.com/v1), `OPENAI_API_KEY`
/// (or `LLM_API_KEY`), and `LLM_MODEL` (default gpt-4o-mini).
#[derive(Debug, Clone)]
pub struct OpenAiLlm {
    /// Base URL without trailing slash.
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    client: reqwest::blocking::Client,
}

impl OpenAiLlm {
    /// Build from environment: LLM_API_URL, OPENAI_API_KEY / LLM_API_KEY, LLM_MODEL.
    pub fn from_env() -> VoiceResult<Self> {
        let base_url =
            std::env::var("LLM_API_URL").unwrap_or_else(|_| DEFAULT_LLM_API_BASE.to_string());
        let api_key = std::env::var("OPENAI_API_KEY")
            .or_else(|_| std::env::var("LLM_API_KEY"))
            .map_err(|_| {
                VoiceError::Config("LLM requires OPENAI_API_KEY or LLM_API_KEY".to_string())
            })?;
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.to_string());
        Self::new(base_url, api_key, model)
    }

    /// Create with explicit config.
    pub fn new(
        base_url: impl Into<String>,
        api_key: impl Into<String>,
        model: impl Into<String>,
    ) -> VoiceResult<Self> {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(|e| VoiceError::Llm(e.to_string()))?;
        Ok(Self {
            base_url: base_url.into(),
            api_key: api_key.into(),
            model: model.into(),
            client,
        })
    }

    /// Select a named model variant (e.g. `gpt-4o-mini`).
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }
}

impl LlmBackend for OpenAiLlm {
    fn complete(&self, chat: &ChatContext) -> VoiceResult<String> {
        let url = format!("{}/chat/completions", self.base_url.trim_end_matches('/'));
        let body = ChatRequest {
            model: &self.model,
            messages: chat.messages(),
            temperature: Some(0.7),
            max_tokens: Some(512),
        };

        let res = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .map_err(|e| VoiceError::Llm(e.to_string()))?;
        if !res.status().is_success() {
            let status = res.status();
            let body = res.text().unwrap_or_default();
            return Err(VoiceError::Llm(format!("LLM API error {}: {}", status, body)));
        }

        let parsed: ChatResponse = res.json().map_err(|e| VoiceError::Llm(e.to_string()))?;
        let reply = parsed
            .choices
            .first()
            .map(|c| c.message.content.trim().to_string())
            .unwrap_or_default();
        Ok(reply)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chat::ChatRole;

    #[test]
    fn placeholder_reports_context_size() {
        let mut chat = ChatContext::with_system("persona");
        chat.append(ChatRole::User, "hi");

        let llm = PlaceholderLlm::new();
        let reply = llm.complete(&chat).unwrap();
        assert!(reply.contains("2 messages"));
    }

    #[test]
    fn placeholder_with_reply() {
        let llm = PlaceholderLlm::with_reply("sure thing");
        assert_eq!(llm.complete(&ChatContext::new()).unwrap(), "sure thing");
    }

    #[test]
    fn request_serializes_roles_lowercase() {
        let mut chat = ChatContext::with_system("persona");
        chat.append(ChatRole::User, "hi");
        let body = ChatRequest {
            model: "gpt-4o-mini",
            messages: chat.messages(),
            temperature: None,
            max_tokens: None,
        };
        let json = serde_json::to_string(&body).unwrap();
        assert!(json.contains("\"role\":\"system\""));
        assert!(json.contains("\"role\":\"user\""));
        assert!(!json.contains("temperature"));
    }
}
