//! Direct tool handlers

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::session_and_context;
use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::{AppError, Result},
    models::{Message, Session},
    tools::{explain_prompt, ToolContext, ToolKind, ToolOutput},
};

#[derive(Debug, Deserialize, Validate)]
pub struct NoteRequest {
    #[validate(length(min = 1, max = 5000))]
    pub note: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ExplainRequest {
    #[validate(length(min = 1, max = 2000))]
    pub query: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ToolRequest {
    #[serde(default)]
    pub input: String,
}

#[derive(Serialize)]
pub struct NoteResponse {
    pub message: String,
    pub context_id: String,
}

#[derive(Serialize)]
pub struct ExplainResponse {
    pub response: String,
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: None,
    }
}

/// Save a note to the history and the current context
pub async fn note(
    State(state): State<AppState>,
    session_id: SessionId,
    Json(request): Json<NoteRequest>,
) -> Result<Json<NoteResponse>> {
    request.validate().map_err(validation_error)?;
    let note = request.note.trim().to_string();

    let (mut session, context_id) = session_and_context(&state, &session_id).await?;
    session.push_message(Message::user(format!("[NOTE] {}", note), Some(context_id.clone())));
    let context = session.context_mut(&context_id)?;
    context.notes.push(note);
    context.touch();
    state.store.put(session).await?;

    Ok(Json(NoteResponse {
        message: "Note saved.".to_string(),
        context_id,
    }))
}

/// Explain a concept; the request and reply are kept in the history
pub async fn explain(
    State(state): State<AppState>,
    session_id: SessionId,
    Json(request): Json<ExplainRequest>,
) -> Result<Json<ExplainResponse>> {
    request.validate().map_err(validation_error)?;
    let query = request.query.trim();

    let (session, context_id) = session_and_context(&state, &session_id).await?;
    let output = {
        let context = session.context(&context_id)?;
        let ctx = ToolContext {
            chunks: &context.chunks,
            topic: &context.topic,
        };
        state.tools().dispatch(ToolKind::Explainer.name(), query, ctx).await?
    };

    let request = Message::user(explain_prompt(query), Some(context_id.clone()));
    let reply = Message::assistant(output.text.clone(), Some(context_id));
    state
        .store
        .update(
            session_id.as_str(),
            Box::new(move |session: &mut Session| {
                session.push_message(request);
                session.push_message(reply);
                Ok(())
            }),
        )
        .await?;

    Ok(Json(ExplainResponse { response: output.text }))
}

/// Run any enabled tool against the current context
pub async fn invoke(
    State(state): State<AppState>,
    session_id: SessionId,
    Path(name): Path<String>,
    Json(request): Json<ToolRequest>,
) -> Result<Json<ToolOutput>> {
    let (session, context_id) = session_and_context(&state, &session_id).await?;
    let output = {
        let context = session.context(&context_id)?;
        let ctx = ToolContext {
            chunks: &context.chunks,
            topic: &context.topic,
        };
        state.tools().dispatch(&name, &request.input, ctx).await?
    };

    if let Some(note) = output.note.clone() {
        state
            .store
            .update(
                session_id.as_str(),
                Box::new(move |session: &mut Session| {
                    let context = session.context_mut(&context_id)?;
                    context.notes.push(note);
                    context.touch();
                    Ok(())
                }),
            )
            .await?;
    }

    tracing::info!(session_id = %session_id.as_str(), tool = %output.kind, "Tool invoked directly");
    Ok(Json(output))
}
