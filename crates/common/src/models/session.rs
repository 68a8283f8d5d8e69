//! Session: chat history plus the research contexts a client works in

use super::context::{ResearchContext, DEFAULT_CONTEXT_ID};
use crate::errors::{AppError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

/// One chat message. Immutable once appended to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,

    pub content: String,

    /// Structured data attached to the message (chart data, insights)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,

    pub timestamp: DateTime<Utc>,

    /// Context that was active when the message was written
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_id: Option<String>,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>, context_id: Option<String>) -> Self {
        Self {
            role,
            content: content.into(),
            payload: None,
            timestamp: Utc::now(),
            context_id,
        }
    }

    pub fn user(content: impl Into<String>, context_id: Option<String>) -> Self {
        Self::new(Role::User, content, context_id)
    }

    pub fn assistant(content: impl Into<String>, context_id: Option<String>) -> Self {
        Self::new(Role::Assistant, content, context_id)
    }

    pub fn with_payload(mut self, payload: Option<serde_json::Value>) -> Self {
        self.payload = payload;
        self
    }
}

/// Conversation statistics for one context
#[derive(Debug, Clone, Serialize)]
pub struct ConversationSummary {
    pub total_messages: usize,
    pub user_messages: usize,
    pub assistant_messages: usize,
    pub avg_message_length: usize,
    pub recent_messages: Vec<MessagePreview>,
}

#[derive(Debug, Clone, Serialize)]
pub struct MessagePreview {
    pub role: Role,
    pub preview: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DocumentSummary {
    pub total_documents: usize,
    pub document_sources: Vec<String>,
    pub total_chunks: usize,
    pub total_content_length: usize,
    pub avg_chunk_size: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct ActivityMetrics {
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub is_active: bool,
    pub research_intensity: usize,
}

/// Detailed view of one context
#[derive(Debug, Clone, Serialize)]
pub struct ContextSummary {
    pub context_id: String,
    pub topic: String,
    pub description: String,
    pub conversation_summary: ConversationSummary,
    pub document_summary: DocumentSummary,
    pub activity_metrics: ActivityMetrics,
}

const PREVIEW_CHARS: usize = 100;
const RECENT_MESSAGES: usize = 5;

/// A client session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,

    #[serde(default)]
    pub history: Vec<Message>,

    #[serde(default)]
    pub contexts: BTreeMap<String, ResearchContext>,

    #[serde(default)]
    pub current_context: Option<String>,

    pub created_at: DateTime<Utc>,

    pub last_active_at: DateTime<Utc>,
}

impl Session {
    /// Create a session holding only the default context, which is current
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        let mut contexts = BTreeMap::new();
        contexts.insert(DEFAULT_CONTEXT_ID.to_string(), ResearchContext::default_context());

        Self {
            id: id.into(),
            history: Vec::new(),
            contexts,
            current_context: Some(DEFAULT_CONTEXT_ID.to_string()),
            created_at: now,
            last_active_at: now,
        }
    }

    /// Generate a fresh opaque session token
    pub fn new_id() -> String {
        Uuid::new_v4().to_string()
    }

    pub fn touch(&mut self) {
        self.last_active_at = Utc::now();
    }

    pub fn push_message(&mut self, message: Message) {
        self.history.push(message);
        self.touch();
    }

    pub fn context(&self, id: &str) -> Result<&ResearchContext> {
        self.contexts
            .get(id)
            .ok_or_else(|| AppError::ContextNotFound { id: id.to_string() })
    }

    pub fn context_mut(&mut self, id: &str) -> Result<&mut ResearchContext> {
        self.contexts
            .get_mut(id)
            .ok_or_else(|| AppError::ContextNotFound { id: id.to_string() })
    }

    /// The current context, if the pointer is set
    pub fn current(&self) -> Option<&ResearchContext> {
        self.current_context
            .as_deref()
            .and_then(|id| self.contexts.get(id))
    }

    /// Resolve the context a request operates on.
    ///
    /// An explicit id must exist. Without one the current context is used; when the
    /// pointer is unset the default context is (re)created and made current.
    pub fn active_context_id(&mut self, requested: Option<&str>) -> Result<String> {
        if let Some(id) = requested {
            self.context(id)?;
            return Ok(id.to_string());
        }

        if let Some(id) = self.current_context.clone() {
            if self.contexts.contains_key(&id) {
                return Ok(id);
            }
        }

        self.contexts
            .entry(DEFAULT_CONTEXT_ID.to_string())
            .or_insert_with(ResearchContext::default_context);
        self.current_context = Some(DEFAULT_CONTEXT_ID.to_string());
        Ok(DEFAULT_CONTEXT_ID.to_string())
    }

    /// Create a new context and return its id
    pub fn create_context(&mut self, topic: &str, description: &str) -> String {
        let mut id = short_id();
        while self.contexts.contains_key(&id) {
            id = short_id();
        }
        self.contexts
            .insert(id.clone(), ResearchContext::new(id.clone(), topic, description));
        self.touch();
        id
    }

    /// Make an existing context current
    pub fn switch_context(&mut self, id: &str) -> Result<()> {
        let context = self.context_mut(id)?;
        if context.archived {
            return Err(AppError::Forbidden {
                message: format!("Context {} is archived", id),
            });
        }
        context.touch();
        self.current_context = Some(id.to_string());
        self.touch();
        Ok(())
    }

    /// Update topic and/or description
    pub fn update_context(
        &mut self,
        id: &str,
        topic: Option<String>,
        description: Option<String>,
    ) -> Result<&ResearchContext> {
        let context = self.context_mut(id)?;
        if let Some(topic) = topic {
            context.topic = topic;
        }
        if let Some(description) = description {
            context.description = description;
        }
        context.touch();
        Ok(context)
    }

    /// Delete a context and all of its chunks.
    /// The default context and the current context cannot be deleted.
    pub fn delete_context(&mut self, id: &str) -> Result<()> {
        if id == DEFAULT_CONTEXT_ID {
            return Err(AppError::Forbidden {
                message: "Cannot delete default context".to_string(),
            });
        }
        if self.current_context.as_deref() == Some(id) {
            return Err(AppError::Forbidden {
                message: "Cannot delete currently active context".to_string(),
            });
        }
        self.contexts
            .remove(id)
            .ok_or_else(|| AppError::ContextNotFound { id: id.to_string() })?;
        self.touch();
        Ok(())
    }

    /// Hide a context from listings while keeping its data
    pub fn archive_context(&mut self, id: &str) -> Result<()> {
        if id == DEFAULT_CONTEXT_ID {
            return Err(AppError::Forbidden {
                message: "Cannot archive default context".to_string(),
            });
        }
        let context = self.context_mut(id)?;
        context.archived = true;
        context.archived_at = Some(Utc::now());

        if self.current_context.as_deref() == Some(id) {
            self.current_context = Some(DEFAULT_CONTEXT_ID.to_string());
        }
        self.touch();
        Ok(())
    }

    /// Contexts ordered by creation time
    pub fn list_contexts(&self, include_archived: bool) -> Vec<&ResearchContext> {
        let mut contexts: Vec<&ResearchContext> = self
            .contexts
            .values()
            .filter(|c| include_archived || !c.archived)
            .collect();
        contexts.sort_by_key(|c| c.created_at);
        contexts
    }

    /// Messages written while the given context was active
    pub fn messages_in<'a>(&'a self, context_id: &'a str) -> impl Iterator<Item = &'a Message> + 'a {
        self.history
            .iter()
            .filter(move |m| m.context_id.as_deref() == Some(context_id))
    }

    /// Build the detailed summary of one context
    pub fn context_summary(&self, id: &str) -> Result<ContextSummary> {
        let context = self.context(id)?;
        let messages: Vec<&Message> = self.messages_in(id).collect();

        let user_messages = messages.iter().filter(|m| m.role == Role::User).count();
        let assistant_messages = messages.len() - user_messages;
        let avg_message_length = if messages.is_empty() {
            0
        } else {
            messages.iter().map(|m| m.content.chars().count()).sum::<usize>() / messages.len()
        };

        let recent_messages = messages
            .iter()
            .rev()
            .take(RECENT_MESSAGES)
            .rev()
            .map(|m| MessagePreview {
                role: m.role,
                preview: preview(&m.content),
                timestamp: m.timestamp,
            })
            .collect();

        let total_content_length = context.total_content_length();
        let total_chunks = context.chunks.len();

        Ok(ContextSummary {
            context_id: context.id.clone(),
            topic: context.topic.clone(),
            description: context.description.clone(),
            conversation_summary: ConversationSummary {
                total_messages: messages.len(),
                user_messages,
                assistant_messages,
                avg_message_length,
                recent_messages,
            },
            document_summary: DocumentSummary {
                total_documents: context.documents.len(),
                document_sources: context.sources().into_iter().map(String::from).collect(),
                total_chunks,
                total_content_length,
                avg_chunk_size: if total_chunks == 0 { 0 } else { total_content_length / total_chunks },
            },
            activity_metrics: ActivityMetrics {
                created_at: context.created_at,
                last_active: context.last_active,
                is_active: self.current_context.as_deref() == Some(id),
                research_intensity: messages.len() + total_chunks,
            },
        })
    }
}

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..8].to_string()
}

fn preview(content: &str) -> String {
    if content.chars().count() > PREVIEW_CHARS {
        let head: String = content.chars().take(PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        content.to_string()
    }
}
