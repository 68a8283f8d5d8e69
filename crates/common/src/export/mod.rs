//! Conversation export

use crate::errors::{AppError, Result};
use crate::models::{Message, Role};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExportFormat {
    #[default]
    Txt,
    Md,
    Json,
}

impl ExportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "txt",
            ExportFormat::Md => "md",
            ExportFormat::Json => "json",
        }
    }

    pub fn content_type(&self) -> &'static str {
        match self {
            ExportFormat::Txt => "text/plain; charset=utf-8",
            ExportFormat::Md => "text/markdown; charset=utf-8",
            ExportFormat::Json => "application/json",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "txt" | "text" => Ok(ExportFormat::Txt),
            "md" | "markdown" => Ok(ExportFormat::Md),
            "json" => Ok(ExportFormat::Json),
            other => Err(AppError::Validation {
                message: format!("Unsupported export format '{}'. Use txt, md or json", other),
                field: Some("format".to_string()),
            }),
        }
    }
}

/// A rendered export ready to be sent as an attachment
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub filename: String,
    pub content_type: &'static str,
    pub body: String,
}

#[derive(Serialize)]
struct JsonExport<'a> {
    session_id: &'a str,
    exported_at: DateTime<Utc>,
    message_count: usize,
    messages: &'a [Message],
}

fn role_label(role: Role) -> &'static str {
    match role {
        Role::User => "User",
        Role::Assistant => "Assistant",
    }
}

fn render_txt(messages: &[Message]) -> String {
    let mut out = String::new();
    for msg in messages {
        let _ = write!(out, "{}:\n{}\n\n", role_label(msg.role), msg.content);
    }
    out
}

fn render_md(messages: &[Message], exported_at: DateTime<Utc>) -> String {
    let mut out = format!(
        "# Conversation Export\n\n_Exported {}_\n\n",
        exported_at.format("%Y-%m-%d %H:%M:%S UTC")
    );
    for msg in messages {
        let _ = write!(
            out,
            "### {} ({})\n\n{}\n\n",
            role_label(msg.role),
            msg.timestamp.format("%H:%M:%S"),
            msg.content
        );
    }
    out
}

/// Render a session's history in the requested format
pub fn export_conversation(
    session_id: &str,
    messages: &[Message],
    format: ExportFormat,
    exported_at: DateTime<Utc>,
) -> Result<ExportFile> {
    let body = match format {
        ExportFormat::Txt => render_txt(messages),
        ExportFormat::Md => render_md(messages, exported_at),
        ExportFormat::Json => serde_json::to_string_pretty(&JsonExport {
            session_id,
            exported_at,
            message_count: messages.len(),
            messages,
        })?,
    };

    Ok(ExportFile {
        filename: format!(
            "conversation_{}.{}",
            exported_at.format("%Y%m%d_%H%M%S"),
            format.extension()
        ),
        content_type: format.content_type(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tokio_test::{assert_err, assert_ok};

    fn history() -> Vec<Message> {
        vec![
            Message::user("What is BM25?", None),
            Message::assistant("A ranking function.", Some("default".into())),
        ]
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 3, 9, 14, 5, 7).unwrap()
    }

    #[test]
    fn test_txt_blocks() {
        let file = assert_ok!(export_conversation("s1", &history(), ExportFormat::Txt, at()));
        assert_eq!(file.body, "User:\nWhat is BM25?\n\nAssistant:\nA ranking function.\n\n");
        assert_eq!(file.filename, "conversation_20240309_140507.txt");
        assert!(file.content_type.starts_with("text/plain"));
    }

    #[test]
    fn test_markdown_headings() {
        let file = assert_ok!(export_conversation("s1", &history(), ExportFormat::Md, at()));
        assert!(file.body.starts_with("# Conversation Export"));
        assert!(file.body.contains("### User ("));
        assert!(file.body.contains("### Assistant ("));
        assert!(file.filename.ends_with(".md"));
    }

    #[test]
    fn test_json_roundtrips_messages() {
        let file = assert_ok!(export_conversation("s1", &history(), ExportFormat::Json, at()));
        let value: serde_json::Value = serde_json::from_str(&file.body).unwrap();
        assert_eq!(value["session_id"], "s1");
        assert_eq!(value["message_count"], 2);
        assert_eq!(value["messages"][1]["role"], "assistant");
        assert_eq!(value["messages"][1]["context_id"], "default");
    }

    #[test]
    fn test_empty_history_exports_empty_txt() {
        let file = assert_ok!(export_conversation("s1", &[], ExportFormat::Txt, at()));
        assert!(file.body.is_empty());
    }

    #[test]
    fn test_format_parsing() {
        assert_eq!(assert_ok!("Markdown".parse::<ExportFormat>()), ExportFormat::Md);
        assert_eq!(assert_ok!("json".parse::<ExportFormat>()), ExportFormat::Json);
        assert_err!("pdf".parse::<ExportFormat>());
    }
}
