//! Research context handlers

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::session_and_context;
use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::{AppError, Result},
    models::{ContextSummary, ResearchContext},
};

#[derive(Debug, Deserialize, Validate)]
pub struct CreateContextRequest {
    #[validate(length(min = 1, max = 200))]
    pub topic: String,

    #[serde(default)]
    #[validate(length(max = 2000))]
    pub description: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateContextRequest {
    #[validate(length(min = 1, max = 200))]
    pub topic: Option<String>,

    #[validate(length(max = 2000))]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct SwitchContextRequest {
    pub context_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListParams {
    #[serde(default)]
    pub include_archived: bool,
}

/// Context as returned to clients (chunks omitted)
#[derive(Serialize)]
pub struct ContextView {
    pub id: String,
    pub topic: String,
    pub description: String,
    pub sources: Vec<String>,
    pub chunk_count: usize,
    pub notes: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub archived: bool,
    pub is_current: bool,
}

impl ContextView {
    fn new(context: &ResearchContext, current: Option<&str>) -> Self {
        Self {
            id: context.id.clone(),
            topic: context.topic.clone(),
            description: context.description.clone(),
            sources: context.sources().into_iter().map(String::from).collect(),
            chunk_count: context.chunks.len(),
            notes: context.notes.clone(),
            created_at: context.created_at,
            last_active: context.last_active,
            archived: context.archived,
            is_current: current == Some(context.id.as_str()),
        }
    }
}

#[derive(Serialize)]
pub struct ContextListResponse {
    pub contexts: Vec<ContextView>,
    pub current_context: String,
}

#[derive(Serialize)]
pub struct CurrentContextResponse {
    pub current_context: String,
}

fn validation_error(e: validator::ValidationErrors) -> AppError {
    AppError::Validation {
        message: e.to_string(),
        field: None,
    }
}

/// All contexts of the session, oldest first
pub async fn list(
    State(state): State<AppState>,
    session_id: SessionId,
    Query(params): Query<ListParams>,
) -> Result<Json<ContextListResponse>> {
    let (session, current) = session_and_context(&state, &session_id).await?;

    let contexts = session
        .list_contexts(params.include_archived)
        .into_iter()
        .map(|c| ContextView::new(c, Some(&current)))
        .collect();

    Ok(Json(ContextListResponse {
        contexts,
        current_context: current,
    }))
}

/// The context requests currently operate on
pub async fn current(
    State(state): State<AppState>,
    session_id: SessionId,
) -> Result<Json<ContextView>> {
    let (session, current) = session_and_context(&state, &session_id).await?;
    Ok(Json(ContextView::new(session.context(&current)?, Some(&current))))
}

/// Create a context; it does not become current until switched to
pub async fn create(
    State(state): State<AppState>,
    session_id: SessionId,
    Json(request): Json<CreateContextRequest>,
) -> Result<(StatusCode, Json<ContextView>)> {
    request.validate().map_err(validation_error)?;

    let (mut session, current) = session_and_context(&state, &session_id).await?;
    let id = session.create_context(request.topic.trim(), request.description.trim());
    let view = ContextView::new(session.context(&id)?, Some(&current));
    state.store.put(session).await?;

    tracing::info!(session_id = %session_id.as_str(), context_id = %id, "Context created");
    Ok((StatusCode::CREATED, Json(view)))
}

pub async fn switch(
    State(state): State<AppState>,
    session_id: SessionId,
    Json(request): Json<SwitchContextRequest>,
) -> Result<Json<CurrentContextResponse>> {
    let (mut session, _) = session_and_context(&state, &session_id).await?;
    session.switch_context(&request.context_id)?;
    state.store.put(session).await?;

    tracing::info!(session_id = %session_id.as_str(), context_id = %request.context_id, "Context switched");
    Ok(Json(CurrentContextResponse {
        current_context: request.context_id,
    }))
}

pub async fn update(
    State(state): State<AppState>,
    session_id: SessionId,
    Path(id): Path<String>,
    Json(request): Json<UpdateContextRequest>,
) -> Result<Json<ContextView>> {
    request.validate().map_err(validation_error)?;

    let (mut session, current) = session_and_context(&state, &session_id).await?;
    let updated = session.update_context(
        &id,
        request.topic.map(|t| t.trim().to_string()),
        request.description.map(|d| d.trim().to_string()),
    )?;
    let view = ContextView::new(updated, Some(&current));
    state.store.put(session).await?;

    Ok(Json(view))
}

pub async fn remove(
    State(state): State<AppState>,
    session_id: SessionId,
    Path(id): Path<String>,
) -> Result<StatusCode> {
    let (mut session, _) = session_and_context(&state, &session_id).await?;
    session.delete_context(&id)?;
    state.store.put(session).await?;

    tracing::info!(session_id = %session_id.as_str(), context_id = %id, "Context deleted");
    Ok(StatusCode::NO_CONTENT)
}

/// Conversation, document and activity statistics for one context
pub async fn summary(
    State(state): State<AppState>,
    session_id: SessionId,
    Path(id): Path<String>,
) -> Result<Json<ContextSummary>> {
    let (session, _) = session_and_context(&state, &session_id).await?;
    Ok(Json(session.context_summary(&id)?))
}

pub async fn archive(
    State(state): State<AppState>,
    session_id: SessionId,
    Path(id): Path<String>,
) -> Result<Json<CurrentContextResponse>> {
    let (mut session, _) = session_and_context(&state, &session_id).await?;
    session.archive_context(&id)?;
    let current_context = session.active_context_id(None)?;
    state.store.put(session).await?;

    tracing::info!(session_id = %session_id.as_str(), context_id = %id, "Context archived");
    Ok(Json(CurrentContextResponse { current_context }))
}
