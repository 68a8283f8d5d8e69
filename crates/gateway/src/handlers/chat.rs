//! Chat handlers

use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use validator::Validate;

use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::{AppError, Result},
    models::Message,
    reasoning::{ReasoningMode, ReasoningStep},
};

#[derive(Debug, Deserialize, Validate)]
pub struct ChatRequest {
    #[validate(length(min = 1, max = 20000))]
    pub message: String,

    /// Overrides the configured default when present
    #[serde(default)]
    pub use_reasoning: Option<bool>,

    /// Answer within this context instead of the current one
    #[serde(default)]
    pub context_id: Option<String>,
}

#[derive(Serialize)]
pub struct ChatResponse {
    pub reply: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    pub reasoning_steps: Vec<ReasoningStep>,
    pub used_reasoning: bool,
    pub mode: ReasoningMode,
    pub self_corrected: bool,
    pub context_id: String,
    pub session_id: String,
    pub processing_time_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct HistoryParams {
    pub context_id: Option<String>,
}

#[derive(Serialize)]
pub struct HistoryResponse {
    pub session_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_context: Option<String>,
    pub messages: Vec<Message>,
}

/// Answer one user message
pub async fn chat(
    State(state): State<AppState>,
    session: SessionId,
    Json(request): Json<ChatRequest>,
) -> Result<Json<ChatResponse>> {
    request.validate().map_err(|e| AppError::Validation {
        message: e.to_string(),
        field: Some("message".to_string()),
    })?;

    let message = request.message.trim();
    if message.is_empty() {
        return Err(AppError::Validation {
            message: "Message must not be blank".to_string(),
            field: Some("message".to_string()),
        });
    }

    let start = Instant::now();
    let outcome = state
        .orchestrator
        .handle_message(
            session.as_str(),
            request.context_id.as_deref(),
            message,
            request.use_reasoning,
        )
        .await?;

    let processing_time_ms = start.elapsed().as_millis() as u64;
    tracing::info!(
        session_id = %session.as_str(),
        context_id = %outcome.context_id,
        mode = outcome.mode.as_str(),
        processing_time_ms,
        "Chat message answered"
    );

    Ok(Json(ChatResponse {
        reply: outcome.message.content,
        payload: outcome.message.payload,
        reasoning_steps: outcome.steps,
        used_reasoning: outcome.used_reasoning,
        mode: outcome.mode,
        self_corrected: outcome.self_corrected,
        context_id: outcome.context_id,
        session_id: session.0,
        processing_time_ms,
    }))
}

/// Conversation history, optionally limited to one context
pub async fn history(
    State(state): State<AppState>,
    session: SessionId,
    Query(params): Query<HistoryParams>,
) -> Result<Json<HistoryResponse>> {
    let stored = state.store.get(session.as_str()).await?;

    let (current_context, messages) = match stored {
        Some(stored) => {
            let messages = match params.context_id.as_deref() {
                Some(context_id) => {
                    stored.context(context_id)?;
                    stored.messages_in(context_id).cloned().collect()
                }
                None => stored.history,
            };
            (stored.current_context, messages)
        }
        None => (None, Vec::new()),
    };

    Ok(Json(HistoryResponse {
        session_id: session.0,
        current_context,
        messages,
    }))
}
