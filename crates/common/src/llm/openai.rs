//! OpenAI-compatible chat-completions client

use super::{ChatMessage, CompletionRequest, LlmBackend, LlmReply, ToolDescriptor};
use crate::config::LlmBackendConfig;
use crate::errors::{AppError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Client for any endpoint speaking the OpenAI chat-completions protocol
pub struct OpenAiBackend {
    name: String,
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    temperature: f32,
    max_tokens: u32,
    top_p: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<ToolSpec>,
}

#[derive(Serialize)]
struct ToolSpec {
    #[serde(rename = "type")]
    kind: &'static str,
    function: FunctionSpec,
}

#[derive(Serialize)]
struct FunctionSpec {
    name: &'static str,
    description: &'static str,
    parameters: serde_json::Value,
}

impl From<&ToolDescriptor> for ToolSpec {
    fn from(tool: &ToolDescriptor) -> Self {
        Self {
            kind: "function",
            function: FunctionSpec {
                name: tool.name,
                description: tool.description,
                parameters: serde_json::json!({
                    "type": "object",
                    "properties": {
                        "input": { "type": "string", "description": tool.input_shape }
                    },
                    "required": ["input"]
                }),
            },
        }
    }
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<ToolCallPayload>,
}

#[derive(Deserialize)]
struct ToolCallPayload {
    function: FunctionCall,
}

#[derive(Deserialize)]
struct FunctionCall {
    name: String,
    #[serde(default)]
    arguments: String,
}

impl OpenAiBackend {
    /// Create a client for one configured backend
    pub fn new(
        name: impl Into<String>,
        config: &LlmBackendConfig,
        timeout: Duration,
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            name: name.into(),
            client,
            endpoint: config.endpoint.clone(),
            api_key: config.api_key.clone().unwrap_or_default(),
            model: config.model.clone(),
            temperature,
            max_tokens,
        })
    }

    fn upstream(&self, message: impl Into<String>) -> AppError {
        AppError::Upstream {
            backend: self.name.clone(),
            message: message.into(),
        }
    }
}

#[async_trait]
impl LlmBackend for OpenAiBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<LlmReply> {
        let body = ChatRequest {
            model: &self.model,
            messages: &request.messages,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            top_p: 0.9,
            tools: request.tools.iter().map(ToolSpec::from).collect(),
        };

        let response = self
            .client
            .post(&self.endpoint)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| self.upstream(format!("Request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(self.upstream(format!("API error {}: {}", status, text)));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| self.upstream(format!("Failed to parse response: {}", e)))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| self.upstream("Response contained no choices"))?;

        debug!(
            backend = %self.name,
            finish_reason = choice.finish_reason.as_deref().unwrap_or("unknown"),
            "Completion received"
        );

        normalize(choice.message).ok_or_else(|| self.upstream("Response contained no content"))
    }
}

/// Turn a response message into a uniform reply. Tool calls win over text.
fn normalize(message: ResponseMessage) -> Option<LlmReply> {
    if let Some(call) = message.tool_calls.into_iter().next() {
        let input = serde_json::from_str::<serde_json::Value>(&call.function.arguments)
            .ok()
            .and_then(|args| args.get("input").and_then(|v| v.as_str()).map(String::from))
            .unwrap_or(call.function.arguments);
        return Some(LlmReply::ToolCall {
            name: call.function.name,
            input,
        });
    }

    message
        .content
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .map(LlmReply::Text)
}
