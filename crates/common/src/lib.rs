//! SynthesisTalk Common Library
//!
//! Shared code for the SynthesisTalk research assistant including:
//! - Session, context and message models with a snapshotting store
//! - Document extraction and chunking
//! - LLM gateway with backend fallback
//! - Research tools and the reasoning orchestrator
//! - Error types, configuration, and metrics

pub mod config;
pub mod errors;
pub mod export;
pub mod ingest;
pub mod insights;
pub mod llm;
pub mod metrics;
pub mod models;
pub mod reasoning;
pub mod store;
pub mod tools;

// Re-export commonly used types
pub use errors::{AppError, Result};
pub use config::AppConfig;
pub use reasoning::Orchestrator;
pub use store::{MemoryStore, SessionStore};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
