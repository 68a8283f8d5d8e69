//! Deterministic backend for development without an API key

use super::{ChatRole, CompletionRequest, LlmBackend, LlmReply};
use crate::errors::Result;
use async_trait::async_trait;

const MOCK_NOTICE: &str = "[Mock response - LLM API key not configured]";

/// Answers every request locally.
///
/// Tool-selection requests always finish without a tool, so reasoning cycles
/// go straight to synthesis.
#[derive(Debug, Default, Clone)]
pub struct MockBackend;

impl MockBackend {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl LlmBackend for MockBackend {
    fn name(&self) -> &str {
        "mock"
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<LlmReply> {
        if !request.tools.is_empty() {
            return Ok(LlmReply::Text(r#"{"action": "finish"}"#.to_string()));
        }

        let question = request
            .messages
            .iter()
            .rev()
            .find(|m| m.role == ChatRole::User)
            .map(|m| m.content.trim())
            .unwrap_or_default();

        let topic: String = question.chars().take(120).collect();
        Ok(LlmReply::Text(format!(
            "Based on the available information, here is a response about: {}\n\n{}",
            topic, MOCK_NOTICE
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{ChatMessage, ToolDescriptor};

    #[tokio::test]
    async fn test_mock_echoes_latest_user_turn() {
        let request = CompletionRequest::new(vec![
            ChatMessage::system("sys"),
            ChatMessage::user("What is entropy?"),
        ]);
        let reply = MockBackend::new().complete(&request).await.unwrap().into_text();
        assert!(reply.contains("What is entropy?"));
        assert!(reply.contains(MOCK_NOTICE));
    }

    #[tokio::test]
    async fn test_mock_finishes_tool_selection() {
        let request = CompletionRequest::new(vec![ChatMessage::user("q")]).with_tools(vec![ToolDescriptor {
            name: "web_search",
            description: "d",
            input_shape: "i",
        }]);
        let reply = MockBackend::new().complete(&request).await.unwrap();
        assert_eq!(reply, LlmReply::Text(r#"{"action": "finish"}"#.to_string()));
    }
}
