//! Domain models: sessions, research contexts, messages, and chunks

mod context;
mod session;

pub use context::{Chunk, DocumentMeta, ResearchContext, DEFAULT_CONTEXT_ID, DEFAULT_CONTEXT_TOPIC};
pub use session::{
    ActivityMetrics, ContextSummary, ConversationSummary, DocumentSummary, Message, MessagePreview,
    Role, Session,
};
