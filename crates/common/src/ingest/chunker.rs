//! Text chunking
//!
//! Splits extracted document text into bounded segments. Boundaries prefer
//! paragraphs, then sentences, then words.

use text_splitter::{ChunkConfig, TextSplitter};
use tracing::debug;

/// Configuration for text chunking
#[derive(Debug, Clone)]
pub struct ChunkingConfig {
    /// Maximum chunk size in characters
    pub max_chars: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self { max_chars: 500 }
    }
}

impl From<&crate::config::IngestConfig> for ChunkingConfig {
    fn from(config: &crate::config::IngestConfig) -> Self {
        Self {
            max_chars: config.max_chunk_chars.max(1),
        }
    }
}

/// Split text into chunks of at most `max_chars` characters. Empty chunks are dropped.
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Vec<String> {
    let normalized = normalize_whitespace(text);
    if normalized.is_empty() {
        return Vec::new();
    }

    let splitter = TextSplitter::new(ChunkConfig::new(config.max_chars));
    let chunks: Vec<String> = splitter
        .chunks(&normalized)
        .map(str::trim)
        .filter(|c| !c.is_empty())
        .map(String::from)
        .collect();

    debug!(
        input_len = normalized.len(),
        chunk_count = chunks.len(),
        max_chars = config.max_chars,
        "Text chunked"
    );

    chunks
}

/// Collapse runs of spaces and tabs while keeping paragraph breaks
fn normalize_whitespace(text: &str) -> String {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(|para| para.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|para| !para.is_empty())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunks_respect_max_chars() {
        let text = "This is a test sentence. ".repeat(100);
        let config = ChunkingConfig { max_chars: 120 };

        let chunks = chunk_text(&text, &config);
        assert!(chunks.len() > 1);
        for chunk in &chunks {
            assert!(chunk.chars().count() <= 120);
            assert!(!chunk.is_empty());
        }
    }

    #[test]
    fn test_short_text_single_chunk() {
        let chunks = chunk_text("The sky is blue.", &ChunkingConfig::default());
        assert_eq!(chunks, vec!["The sky is blue."]);
    }

    #[test]
    fn test_empty_text() {
        assert!(chunk_text("", &ChunkingConfig::default()).is_empty());
        assert!(chunk_text(" \n\n \t", &ChunkingConfig::default()).is_empty());
    }

    #[test]
    fn test_normalize_keeps_paragraphs() {
        assert_eq!(normalize_whitespace("a   b\r\n\r\n c\td"), "a b\n\nc d");
    }
}
