//! Document ingestion: validation, extraction and chunking of uploads

pub mod chunker;
pub mod extract;

pub use chunker::{chunk_text, ChunkingConfig};
pub use extract::{content_hash, extract_text, DocumentKind};

use crate::config::IngestConfig;
use crate::errors::{AppError, Result};
use crate::models::DocumentMeta;
use chrono::Utc;
use tracing::{info, instrument};

/// An upload turned into metadata and chunk texts, ready to attach to a context
#[derive(Debug, Clone)]
pub struct IngestedDocument {
    pub kind: DocumentKind,
    pub meta: DocumentMeta,
    pub text: String,
    pub chunks: Vec<String>,
}

/// Validate, extract and chunk one uploaded file
#[instrument(skip(bytes, config), fields(size = bytes.len()))]
pub fn ingest_document(filename: &str, bytes: &[u8], config: &IngestConfig) -> Result<IngestedDocument> {
    if filename.trim().is_empty() {
        return Err(AppError::MissingField {
            field: "filename".to_string(),
        });
    }

    if bytes.len() > config.max_upload_bytes {
        return Err(AppError::PayloadTooLarge {
            size: bytes.len(),
            limit: config.max_upload_bytes,
        });
    }

    let kind = DocumentKind::from_filename(filename, &config.accepted_extensions)?;
    let text = extract_text(kind, bytes)?;
    let chunks = chunk_text(&text, &ChunkingConfig::from(config));

    info!(filename, chunk_count = chunks.len(), "Document ingested");

    Ok(IngestedDocument {
        kind,
        meta: DocumentMeta {
            filename: filename.to_string(),
            content_hash: content_hash(bytes),
            file_size: bytes.len(),
            chunk_count: chunks.len(),
            uploaded_at: Utc::now(),
        },
        text,
        chunks,
    })
}
