//! Background insight handlers

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Serialize;

use super::session_and_context;
use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::{AppError, Result},
    insights::InsightTask,
};

#[derive(Serialize)]
pub struct CreateInsightResponse {
    pub task_id: String,
    pub status: &'static str,
    pub poll_url: String,
}

/// Start generating insights over the current context's documents
pub async fn create(
    State(state): State<AppState>,
    session_id: SessionId,
) -> Result<(StatusCode, Json<CreateInsightResponse>)> {
    let (session, context_id) = session_and_context(&state, &session_id).await?;
    let text = session.context(&context_id)?.joined_text();
    if text.trim().is_empty() {
        return Err(AppError::Validation {
            message: "No documents in the current context to analyze".to_string(),
            field: None,
        });
    }

    let task_id = state
        .insights
        .spawn(session_id.as_str(), state.gateway().clone(), text);

    tracing::info!(
        session_id = %session_id.as_str(),
        context_id = %context_id,
        task_id = %task_id,
        "Insight task queued"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateInsightResponse {
            poll_url: format!("/insights/{}", task_id),
            task_id,
            status: "pending",
        }),
    ))
}

/// Poll an insight task
pub async fn status(
    State(state): State<AppState>,
    session_id: SessionId,
    Path(task_id): Path<String>,
) -> Result<Json<InsightTask>> {
    Ok(Json(state.insights.get(&task_id, session_id.as_str())?))
}
