//! LLM backend abstraction
//!
//! Provides a uniform interface over chat-completion providers:
//! - OpenAI-compatible endpoints (OpenAI, Groq, Ollama, vLLM, ...)
//! - A deterministic mock used when no API key is configured
//!
//! `LlmGateway` tries backends in order and normalizes replies.

mod gateway;
mod mock;
mod openai;

pub use gateway::LlmGateway;
pub use mock::MockBackend;
pub use openai::OpenAiBackend;

use crate::errors::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// System prompt prepended to every conversation
pub const SYSTEM_PROMPT: &str = "You are a highly accurate and careful research assistant. \
Write complete sentences with correct spelling and organize responses into short paragraphs \
separated by a blank line. Format bullet lists with a leading \"- \" and a blank line before \
and after the list. Always read any system message labeled \"Relevant documents:\" and use \
that context; if you cannot answer from it or from tool results, say that you do not have \
that information. Only produce multiple-choice questions when explicitly asked.";

/// Role of a message sent to a backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    System,
    User,
    Assistant,
}

/// One conversation turn sent to a backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: ChatRole::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: ChatRole::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: ChatRole::Assistant, content: content.into() }
    }
}

impl From<&crate::models::Message> for ChatMessage {
    fn from(message: &crate::models::Message) -> Self {
        let role = match message.role {
            crate::models::Role::User => ChatRole::User,
            crate::models::Role::Assistant => ChatRole::Assistant,
        };
        Self { role, content: message.content.clone() }
    }
}

/// Tool description exposed to the model
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ToolDescriptor {
    pub name: &'static str,
    pub description: &'static str,
    /// Natural-language description of the expected input
    pub input_shape: &'static str,
}

/// A completion request
#[derive(Debug, Clone, Default)]
pub struct CompletionRequest {
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<ToolDescriptor>,
}

impl CompletionRequest {
    pub fn new(messages: Vec<ChatMessage>) -> Self {
        Self { messages, tools: Vec::new() }
    }

    pub fn with_tools(mut self, tools: Vec<ToolDescriptor>) -> Self {
        self.tools = tools;
        self
    }
}

/// Normalized backend reply
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LlmReply {
    Text(String),
    ToolCall { name: String, input: String },
}

impl LlmReply {
    /// Flatten to prose; a tool call is rendered as a short description
    pub fn into_text(self) -> String {
        match self {
            LlmReply::Text(text) => text,
            LlmReply::ToolCall { name, input } => format!("[tool call] {}: {}", name, input),
        }
    }
}

/// A chat-completion provider
#[async_trait]
pub trait LlmBackend: Send + Sync {
    /// Backend label used in logs and metrics
    fn name(&self) -> &str;

    /// Run one completion
    async fn complete(&self, request: &CompletionRequest) -> Result<LlmReply>;
}

/// Drop the oldest conversation turns until the total content fits `max_chars`.
///
/// The leading system messages (prompt and document context) are kept, as is
/// everything from the last user message on. Only the turns in between are
/// removed, oldest first, so the result can still exceed the budget.
pub fn trim_history(mut messages: Vec<ChatMessage>, max_chars: usize) -> Vec<ChatMessage> {
    let head = messages.iter().take_while(|m| m.role == ChatRole::System).count();
    let tail_start = messages
        .iter()
        .rposition(|m| m.role == ChatRole::User)
        .unwrap_or(messages.len().saturating_sub(1))
        .max(head);

    let mut total: usize = messages.iter().map(|m| m.content.chars().count()).sum();
    let mut removable = tail_start - head;

    while total > max_chars && removable > 0 {
        let removed = messages.remove(head);
        total -= removed.content.chars().count();
        removable -= 1;
    }

    messages
}
