//! Document upload handlers

use axum::{
    extract::{Multipart, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};

use super::session_and_context;
use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::{AppError, Result},
    ingest::ingest_document,
    metrics,
    models::DocumentMeta,
    tools::{summarize, SummaryFormat, SummaryTechnique},
};

const SUMMARY_FALLBACK: &str = "Summary generation failed, but document was processed successfully.";

#[derive(Debug, Deserialize)]
pub struct UploadParams {
    #[serde(default)]
    pub format: Option<String>,
}

#[derive(Serialize)]
pub struct UploadResponse {
    pub filename: String,
    pub context_id: String,
    pub chunks: usize,
    pub file_size: usize,
    pub content_hash: String,
    pub summary: String,
    pub summary_format: SummaryFormat,
    pub key_concepts: Vec<String>,
    pub session_id: String,
}

#[derive(Serialize)]
pub struct UploadHistoryResponse {
    pub context_id: String,
    pub files: Vec<DocumentMeta>,
}

#[derive(Serialize)]
pub struct RemoveResponse {
    pub filename: String,
    pub chunks_removed: usize,
}

fn multipart_error(e: axum::extract::multipart::MultipartError) -> AppError {
    AppError::Validation {
        message: e.body_text(),
        field: Some("file".to_string()),
    }
}

/// First multipart field named `file`, as (filename, bytes)
async fn read_file_field(multipart: &mut Multipart) -> Result<(String, Vec<u8>)> {
    while let Some(field) = multipart.next_field().await.map_err(multipart_error)? {
        if field.name() != Some("file") {
            continue;
        }

        let filename = field
            .file_name()
            .map(str::to_string)
            .filter(|name| !name.trim().is_empty())
            .ok_or_else(|| AppError::MissingField {
                field: "filename".to_string(),
            })?;
        let bytes = field.bytes().await.map_err(multipart_error)?;
        return Ok((filename, bytes.to_vec()));
    }

    Err(AppError::MissingField {
        field: "file".to_string(),
    })
}

/// Upload a document into the current context and summarize it
pub async fn upload(
    State(state): State<AppState>,
    session_id: SessionId,
    Query(params): Query<UploadParams>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<UploadResponse>)> {
    let format: SummaryFormat = match params.format.as_deref() {
        Some(format) => format.parse()?,
        None => SummaryFormat::default(),
    };

    let (filename, bytes) = read_file_field(&mut multipart).await?;
    let document = ingest_document(&filename, &bytes, &state.config.ingest)?;

    let (mut session, context_id) = session_and_context(&state, &session_id).await?;
    let chunks = session
        .context_mut(&context_id)?
        .add_document(document.meta.clone(), document.chunks)?;
    session.touch();
    state.store.put(session).await?;
    metrics::record_upload(document.kind.extension(), chunks);

    tracing::info!(
        session_id = %session_id.as_str(),
        context_id = %context_id,
        filename = %filename,
        chunks,
        "Document stored"
    );

    let (summary, key_concepts) = match summarize(
        state.gateway(),
        &document.text,
        state.config.tools.summary_input_cap,
        format,
        SummaryTechnique::ChainOfThought,
    )
    .await
    {
        Ok(summary) => (summary.summary, summary.key_concepts),
        Err(e) => {
            tracing::warn!(error = %e, filename = %filename, "Upload summary failed");
            (SUMMARY_FALLBACK.to_string(), Vec::new())
        }
    };

    Ok((
        StatusCode::CREATED,
        Json(UploadResponse {
            filename,
            context_id,
            chunks,
            file_size: document.meta.file_size,
            content_hash: document.meta.content_hash,
            summary,
            summary_format: format,
            key_concepts,
            session_id: session_id.0,
        }),
    ))
}

/// Documents of the current context
pub async fn history(
    State(state): State<AppState>,
    session_id: SessionId,
) -> Result<Json<UploadHistoryResponse>> {
    let (session, context_id) = session_and_context(&state, &session_id).await?;
    let files = session.context(&context_id)?.documents.clone();

    Ok(Json(UploadHistoryResponse { context_id, files }))
}

/// Remove a document and its chunks from the current context
pub async fn remove(
    State(state): State<AppState>,
    session_id: SessionId,
    Path(filename): Path<String>,
) -> Result<Json<RemoveResponse>> {
    let (mut session, context_id) = session_and_context(&state, &session_id).await?;
    let chunks_removed = session.context_mut(&context_id)?.remove_document(&filename)?;
    session.touch();
    state.store.put(session).await?;

    tracing::info!(
        session_id = %session_id.as_str(),
        filename = %filename,
        chunks_removed,
        "Document removed"
    );

    Ok(Json(RemoveResponse {
        filename,
        chunks_removed,
    }))
}
