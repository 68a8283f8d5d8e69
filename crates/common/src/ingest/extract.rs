//! Document text extraction
//!
//! Plain text is decoded as lossy UTF-8; PDFs go through lopdf page by page.

use crate::errors::{AppError, Result};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Supported upload formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Text,
    Pdf,
}

impl DocumentKind {
    /// Resolve a file name against the accepted extension list
    pub fn from_filename(filename: &str, accepted: &[String]) -> Result<Self> {
        let extension = filename
            .rsplit_once('.')
            .map(|(_, ext)| ext.to_ascii_lowercase())
            .unwrap_or_default();

        let supported = || accepted.join(", ");
        if !accepted.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
            return Err(AppError::UnsupportedFileType {
                extension,
                supported: supported(),
            });
        }

        match extension.as_str() {
            "txt" => Ok(DocumentKind::Text),
            "pdf" => Ok(DocumentKind::Pdf),
            _ => Err(AppError::UnsupportedFileType {
                extension,
                supported: supported(),
            }),
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            DocumentKind::Text => "txt",
            DocumentKind::Pdf => "pdf",
        }
    }
}

/// SHA-256 of the raw bytes, hex encoded
pub fn content_hash(bytes: &[u8]) -> String {
    hex::encode(Sha256::digest(bytes))
}

/// Extract text from an uploaded document
pub fn extract_text(kind: DocumentKind, bytes: &[u8]) -> Result<String> {
    let text = match kind {
        DocumentKind::Text => String::from_utf8_lossy(bytes).into_owned(),
        DocumentKind::Pdf => extract_pdf(bytes)?,
    };

    if text.trim().is_empty() {
        return Err(AppError::Extraction {
            message: "No text content could be extracted".to_string(),
        });
    }

    Ok(text)
}

fn extract_pdf(bytes: &[u8]) -> Result<String> {
    let doc = lopdf::Document::load_mem(bytes).map_err(|e| AppError::Extraction {
        message: format!("Failed to load PDF: {}", e),
    })?;

    let pages = doc.get_pages();
    debug!(page_count = pages.len(), "Extracting text from PDF");

    let mut text = String::new();
    for page_num in pages.keys() {
        match doc.extract_text(&[*page_num]) {
            Ok(page_text) => {
                text.push_str(&page_text);
                text.push('\n');
            }
            Err(e) => {
                warn!(page = page_num, error = %e, "Failed to extract text from page, skipping");
            }
        }
    }

    Ok(clean_text(&text))
}

/// Strip byte-order marks and normalize typographic quotes
fn clean_text(text: &str) -> String {
    text.replace('\u{FEFF}', "")
        .replace(['\u{201C}', '\u{201D}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn accepted() -> Vec<String> {
        vec!["pdf".to_string(), "txt".to_string()]
    }

    #[test]
    fn test_kind_from_filename() {
        assert_eq!(DocumentKind::from_filename("notes.TXT", &accepted()).unwrap(), DocumentKind::Text);
        assert_eq!(DocumentKind::from_filename("paper.pdf", &accepted()).unwrap(), DocumentKind::Pdf);
        assert!(matches!(
            DocumentKind::from_filename("slides.pptx", &accepted()),
            Err(AppError::UnsupportedFileType { .. })
        ));
        assert!(DocumentKind::from_filename("README", &accepted()).is_err());
    }

    #[test]
    fn test_text_extraction() {
        let text = extract_text(DocumentKind::Text, "The sky is blue.".as_bytes()).unwrap();
        assert_eq!(text, "The sky is blue.");

        assert!(matches!(
            extract_text(DocumentKind::Text, b"   \n"),
            Err(AppError::Extraction { .. })
        ));
    }

    #[test]
    fn test_invalid_pdf_rejected() {
        assert!(matches!(
            extract_text(DocumentKind::Pdf, b"not a pdf"),
            Err(AppError::Extraction { .. })
        ));
    }

    #[test]
    fn test_content_hash_is_stable() {
        assert_eq!(content_hash(b"abc"), content_hash(b"abc"));
        assert_ne!(content_hash(b"abc"), content_hash(b"abd"));
        assert_eq!(content_hash(b"").len(), 64);
    }

    #[test]
    fn test_clean_text() {
        assert_eq!(clean_text("\u{FEFF}\u{201C}hi\u{201D} it\u{2019}s"), "\"hi\" it's");
    }
}
