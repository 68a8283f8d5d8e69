//! Conversation export handler

use axum::{
    extract::{Query, State},
    http::header,
    response::IntoResponse,
};
use chrono::Utc;
use serde::Deserialize;

use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::Result,
    export::{export_conversation, ExportFormat},
};

#[derive(Debug, Default, Deserialize)]
pub struct ExportParams {
    #[serde(default)]
    pub format: Option<String>,
}

/// Download the session's conversation as an attachment
pub async fn export(
    State(state): State<AppState>,
    session_id: SessionId,
    Query(params): Query<ExportParams>,
) -> Result<impl IntoResponse> {
    let format: ExportFormat = match params.format.as_deref() {
        Some(format) => format.parse()?,
        None => ExportFormat::default(),
    };

    let session = state.store.require(session_id.as_str()).await?;
    let file = export_conversation(session_id.as_str(), &session.history, format, Utc::now())?;

    tracing::info!(
        session_id = %session_id.as_str(),
        messages = session.history.len(),
        filename = %file.filename,
        "Conversation exported"
    );

    Ok((
        [
            (header::CONTENT_TYPE, file.content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", file.filename),
            ),
        ],
        file.body,
    ))
}
