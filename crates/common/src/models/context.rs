//! Research context: a topic that groups uploaded documents and their chunks

use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identifier of the context every session starts with
pub const DEFAULT_CONTEXT_ID: &str = "default";

/// Topic label of the default context
pub const DEFAULT_CONTEXT_TOPIC: &str = "Getting Started";

/// Bounded text fragment derived from an uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    /// Chunk content
    pub text: String,

    /// Source document file name
    pub source: String,

    /// Position of this chunk within its source document
    pub index: usize,
}

/// Metadata kept for each uploaded document
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentMeta {
    pub filename: String,

    /// SHA-256 of the raw upload, hex encoded
    pub content_hash: String,

    pub file_size: usize,

    pub chunk_count: usize,

    pub uploaded_at: DateTime<Utc>,
}

/// A user-defined research topic
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchContext {
    pub id: String,

    pub topic: String,

    #[serde(default)]
    pub description: String,

    /// Uploaded documents in upload order
    #[serde(default)]
    pub documents: Vec<DocumentMeta>,

    /// Chunks of every document, grouped by document in upload order
    #[serde(default)]
    pub chunks: Vec<Chunk>,

    /// Notes captured by the note-taker tool during reasoning
    #[serde(default)]
    pub notes: Vec<String>,

    pub created_at: DateTime<Utc>,

    pub last_active: DateTime<Utc>,

    #[serde(default)]
    pub archived: bool,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archived_at: Option<DateTime<Utc>>,
}

impl ResearchContext {
    /// Create an empty context
    pub fn new(id: impl Into<String>, topic: impl Into<String>, description: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            topic: topic.into(),
            description: description.into(),
            documents: Vec::new(),
            chunks: Vec::new(),
            notes: Vec::new(),
            created_at: now,
            last_active: now,
            archived: false,
            archived_at: None,
        }
    }

    /// The context every new session starts with
    pub fn default_context() -> Self {
        Self::new(
            DEFAULT_CONTEXT_ID,
            DEFAULT_CONTEXT_TOPIC,
            "Initial research context for new sessions",
        )
    }

    /// Source document names in upload order
    pub fn sources(&self) -> Vec<&str> {
        self.documents.iter().map(|d| d.filename.as_str()).collect()
    }

    /// Mark the context as used now
    pub fn touch(&mut self) {
        self.last_active = Utc::now();
    }

    /// Attach a document and its chunks.
    ///
    /// Fails with `DuplicateDocument` when identical content is already present.
    /// Re-uploading a file name with different content replaces the old version.
    pub fn add_document(&mut self, meta: DocumentMeta, chunk_texts: Vec<String>) -> Result<usize> {
        if let Some(existing) = self
            .documents
            .iter()
            .find(|d| d.content_hash == meta.content_hash)
        {
            return Err(AppError::DuplicateDocument {
                filename: meta.filename.clone(),
                existing: existing.filename.clone(),
            });
        }

        if self.documents.iter().any(|d| d.filename == meta.filename) {
            self.remove_document(&meta.filename)?;
        }

        let chunks: Vec<Chunk> = chunk_texts
            .into_iter()
            .filter(|t| !t.trim().is_empty())
            .enumerate()
            .map(|(index, text)| Chunk {
                text,
                source: meta.filename.clone(),
                index,
            })
            .collect();

        let created = chunks.len();
        self.chunks.extend(chunks);
        self.documents.push(DocumentMeta {
            chunk_count: created,
            ..meta
        });
        self.touch();

        Ok(created)
    }

    /// Remove a document and its chunks; returns the number of chunks dropped
    pub fn remove_document(&mut self, filename: &str) -> Result<usize> {
        let position = self
            .documents
            .iter()
            .position(|d| d.filename == filename)
            .ok_or_else(|| AppError::DocumentNotFound {
                filename: filename.to_string(),
            })?;

        self.documents.remove(position);
        let before = self.chunks.len();
        self.chunks.retain(|c| c.source != filename);
        self.touch();

        Ok(before - self.chunks.len())
    }

    /// Total characters across all chunks
    pub fn total_content_length(&self) -> usize {
        self.chunks.iter().map(|c| c.text.chars().count()).sum()
    }

    /// Concatenated chunk text, chunks separated by newlines
    pub fn joined_text(&self) -> String {
        self.chunks
            .iter()
            .map(|c| c.text.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn meta(name: &str, hash: &str) -> DocumentMeta {
        DocumentMeta {
            filename: name.to_string(),
            content_hash: hash.to_string(),
            file_size: 42,
            chunk_count: 0,
            uploaded_at: Utc::now(),
        }
    }

    #[test]
    fn test_add_document_tags_chunks() {
        let mut ctx = ResearchContext::default_context();
        let created = ctx
            .add_document(meta("notes.txt", "aa"), vec!["First.".into(), "  ".into(), "Second.".into()])
            .unwrap();

        assert_eq!(created, 2);
        assert_eq!(ctx.documents[0].chunk_count, 2);
        assert!(ctx.chunks.iter().all(|c| c.source == "notes.txt"));
        assert_eq!(ctx.chunks[1].index, 1);
        assert_eq!(ctx.sources(), vec!["notes.txt"]);
    }

    #[test]
    fn test_duplicate_content_rejected() {
        let mut ctx = ResearchContext::default_context();
        ctx.add_document(meta("a.txt", "same"), vec!["x".into()]).unwrap();

        let err = ctx.add_document(meta("b.txt", "same"), vec!["x".into()]).unwrap_err();
        assert!(matches!(err, AppError::DuplicateDocument { ref existing, .. } if existing == "a.txt"));
        assert_eq!(ctx.documents.len(), 1);
    }

    #[test]
    fn test_reupload_replaces_document() {
        let mut ctx = ResearchContext::default_context();
        ctx.add_document(meta("a.txt", "v1"), vec!["old one".into(), "old two".into()]).unwrap();
        ctx.add_document(meta("a.txt", "v2"), vec!["new".into()]).unwrap();

        assert_eq!(ctx.documents.len(), 1);
        assert_eq!(ctx.chunks.len(), 1);
        assert_eq!(ctx.chunks[0].text, "new");
    }

    #[test]
    fn test_remove_document() {
        let mut ctx = ResearchContext::default_context();
        ctx.add_document(meta("a.txt", "1"), vec!["a".into()]).unwrap();
        ctx.add_document(meta("b.txt", "2"), vec!["b1".into(), "b2".into()]).unwrap();

        assert_eq!(ctx.remove_document("b.txt").unwrap(), 2);
        assert_eq!(ctx.joined_text(), "a");
        assert!(matches!(
            ctx.remove_document("b.txt"),
            Err(AppError::DocumentNotFound { .. })
        ));
    }
}
