//! Research tools and their registry
//!
//! Every tool takes text in and returns text plus optional structured data.
//! Names are parsed into `ToolKind` once; dispatch is an exhaustive match.

pub mod document_search;
pub mod summarizer;
pub(crate) mod text;
pub mod visualizer;
pub mod web_search;

pub use document_search::{format_passages, relevant_chunks, ScoredChunk};
pub use summarizer::{summarize, Summary, SummaryFormat, SummaryTechnique};
pub use visualizer::{ChartKind, ChartPoint};
pub use web_search::{SearchHit, SearchOutcome, WebSearch, WebSearchService};

use crate::config::ToolsConfig;
use crate::errors::{AppError, Result};
use crate::llm::{ChatMessage, LlmGateway, ToolDescriptor, SYSTEM_PROMPT};
use crate::metrics::record_tool;
use crate::models::Chunk;
use serde::Serialize;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{debug, instrument, warn};

/// Minimum input length the summarizer condenses directly; shorter input
/// falls back to the active context's documents
const SUMMARY_DIRECT_INPUT_CHARS: usize = 200;

/// Available tools
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    DocumentSearch,
    WebSearch,
    Summarizer,
    NoteTaker,
    Explainer,
    Visualizer,
}

impl ToolKind {
    pub const ALL: [ToolKind; 6] = [
        ToolKind::DocumentSearch,
        ToolKind::WebSearch,
        ToolKind::Summarizer,
        ToolKind::NoteTaker,
        ToolKind::Explainer,
        ToolKind::Visualizer,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::DocumentSearch => "document_search",
            ToolKind::WebSearch => "web_search",
            ToolKind::Summarizer => "summarizer",
            ToolKind::NoteTaker => "note_taker",
            ToolKind::Explainer => "explainer",
            ToolKind::Visualizer => "visualizer",
        }
    }

    pub fn descriptor(&self) -> ToolDescriptor {
        let (description, input_shape) = match self {
            ToolKind::DocumentSearch => (
                "Find passages in the user's uploaded documents relevant to a question.",
                "keywords or a question about the documents",
            ),
            ToolKind::WebSearch => (
                "Search the web for current or general facts not in the documents.",
                "a short web search query",
            ),
            ToolKind::Summarizer => (
                "Summarize text, or the uploaded documents when no text is given.",
                "the text to summarize, or a short instruction to summarize the documents",
            ),
            ToolKind::NoteTaker => (
                "Save a note to the current research context.",
                "the note text",
            ),
            ToolKind::Explainer => (
                "Explain a concept in simple terms.",
                "the concept or term to explain",
            ),
            ToolKind::Visualizer => (
                "Build chart data of keyword frequencies or chunks per document.",
                "what to chart: 'keywords' or 'sources'",
            ),
        };

        ToolDescriptor {
            name: self.name(),
            description,
            input_shape,
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ToolKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        let normalized = s.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "document_search" | "documents" | "doc_search" => Ok(ToolKind::DocumentSearch),
            "web_search" | "search" | "websearch" => Ok(ToolKind::WebSearch),
            "summarizer" | "summarize" | "summary" => Ok(ToolKind::Summarizer),
            "note_taker" | "note" | "notes" => Ok(ToolKind::NoteTaker),
            "explainer" | "explain" => Ok(ToolKind::Explainer),
            "visualizer" | "visualize" | "chart" => Ok(ToolKind::Visualizer),
            _ => Err(AppError::UnknownTool { name: s.to_string() }),
        }
    }
}

/// Read-only view of the active context a tool works against
#[derive(Debug, Clone, Copy)]
pub struct ToolContext<'a> {
    pub chunks: &'a [Chunk],
    pub topic: &'a str,
}

/// What a tool produced
#[derive(Debug, Clone, Serialize)]
pub struct ToolOutput {
    pub kind: ToolKind,
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payload: Option<serde_json::Value>,
    /// Note the caller should store on the active context
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

impl ToolOutput {
    fn text(kind: ToolKind, text: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            payload: None,
            note: None,
        }
    }

    fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = Some(payload);
        self
    }
}

/// Record of one tool call within a reasoning cycle
#[derive(Debug, Clone, Serialize)]
pub struct ToolInvocation {
    pub tool: String,
    pub input: String,
    pub output: String,
    pub success: bool,
}

/// Prompt sent by the explainer
pub fn explain_prompt(query: &str) -> String {
    format!("Please explain the following concept in simple terms:\n\n{}", query)
}

/// Registry of enabled tools
#[derive(Clone)]
pub struct ToolRegistry {
    enabled: Vec<ToolKind>,
    gateway: LlmGateway,
    search: Arc<WebSearchService>,
    config: ToolsConfig,
}

impl ToolRegistry {
    /// Build the registry; an empty `enabled` list enables every tool
    pub fn new(config: &ToolsConfig, gateway: LlmGateway, search: Arc<WebSearchService>) -> Result<Self> {
        let enabled = if config.enabled.is_empty() {
            ToolKind::ALL.to_vec()
        } else {
            config
                .enabled
                .iter()
                .map(|name| {
                    name.parse::<ToolKind>().map_err(|_| AppError::Configuration {
                        message: format!("Unknown tool '{}' in tools.enabled", name),
                    })
                })
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            enabled,
            gateway,
            search,
            config: config.clone(),
        })
    }

    pub fn enabled(&self) -> &[ToolKind] {
        &self.enabled
    }

    pub fn search_service(&self) -> &Arc<WebSearchService> {
        &self.search
    }

    /// Descriptors of enabled tools, for the model
    pub fn descriptors(&self) -> Vec<ToolDescriptor> {
        self.enabled.iter().map(ToolKind::descriptor).collect()
    }

    /// Parse a name and check that the tool is enabled
    pub fn resolve(&self, name: &str) -> Result<ToolKind> {
        let kind: ToolKind = name.parse()?;
        if !self.enabled.contains(&kind) {
            return Err(AppError::UnknownTool { name: name.to_string() });
        }
        Ok(kind)
    }

    /// Resolve `name` and run it
    pub async fn dispatch(&self, name: &str, input: &str, ctx: ToolContext<'_>) -> Result<ToolOutput> {
        let kind = self.resolve(name).inspect_err(|_| {
            record_tool(name, false);
            warn!(tool = name, "Unknown tool requested");
        })?;
        self.invoke(kind, input, ctx).await
    }

    /// Run one tool. Failures come back as `ToolFailure`.
    #[instrument(skip(self, input, ctx), fields(tool = %kind, input_len = input.len()))]
    pub async fn invoke(&self, kind: ToolKind, input: &str, ctx: ToolContext<'_>) -> Result<ToolOutput> {
        let result = match kind {
            ToolKind::DocumentSearch => self.document_search(input, ctx),
            ToolKind::WebSearch => self.web_search(input).await,
            ToolKind::Summarizer => self.summarizer(input, ctx).await,
            ToolKind::NoteTaker => note_taker(input),
            ToolKind::Explainer => self.explainer(input).await,
            ToolKind::Visualizer => self.visualizer(input, ctx),
        };

        record_tool(kind.name(), result.is_ok());
        match result {
            Ok(output) => {
                debug!(output_len = output.text.len(), "Tool completed");
                Ok(output)
            }
            Err(e) => {
                warn!(error = %e, "Tool failed");
                Err(e.into_tool_failure(kind.name()))
            }
        }
    }

    fn document_search(&self, input: &str, ctx: ToolContext<'_>) -> Result<ToolOutput> {
        if ctx.chunks.is_empty() {
            return Err(failure(ToolKind::DocumentSearch, "No documents in the active context"));
        }

        let passages = relevant_chunks(input, ctx.chunks, self.config.document_top_k);
        let payload = serde_json::json!({
            "passages": passages
                .iter()
                .map(|p| serde_json::json!({
                    "source": p.chunk.source,
                    "index": p.chunk.index,
                    "score": p.score,
                }))
                .collect::<Vec<_>>()
        });

        Ok(ToolOutput::text(ToolKind::DocumentSearch, format_passages(&passages)).with_payload(payload))
    }

    async fn web_search(&self, input: &str) -> Result<ToolOutput> {
        let outcome = self.search.search(input, true).await?;
        let text = web_search::format_hits(&outcome.hits);
        Ok(ToolOutput::text(ToolKind::WebSearch, text).with_payload(serde_json::to_value(&outcome)?))
    }

    async fn summarizer(&self, input: &str, ctx: ToolContext<'_>) -> Result<ToolOutput> {
        let joined;
        let source = if input.trim().chars().count() >= SUMMARY_DIRECT_INPUT_CHARS || ctx.chunks.is_empty() {
            input
        } else {
            joined = ctx
                .chunks
                .iter()
                .map(|c| c.text.as_str())
                .collect::<Vec<_>>()
                .join("\n");
            joined.as_str()
        };

        let summary = summarize(
            &self.gateway,
            source,
            self.config.summary_input_cap,
            SummaryFormat::Paragraph,
            SummaryTechnique::ChainOfThought,
        )
        .await?;

        let payload = serde_json::json!({
            "key_concepts": summary.key_concepts,
            "confidence": summary.confidence,
        });
        Ok(ToolOutput::text(ToolKind::Summarizer, summary.summary).with_payload(payload))
    }

    async fn explainer(&self, input: &str) -> Result<ToolOutput> {
        if input.trim().is_empty() {
            return Err(failure(ToolKind::Explainer, "Nothing to explain"));
        }

        let explanation = self
            .gateway
            .complete_text(vec![ChatMessage::system(SYSTEM_PROMPT), ChatMessage::user(explain_prompt(input.trim()))])
            .await?;

        Ok(ToolOutput::text(ToolKind::Explainer, explanation))
    }

    fn visualizer(&self, input: &str, ctx: ToolContext<'_>) -> Result<ToolOutput> {
        if ctx.chunks.is_empty() {
            return Err(failure(ToolKind::Visualizer, "No documents to visualize"));
        }

        let lower = input.to_lowercase();
        let kind = if lower.contains("source") || lower.contains("document") {
            ChartKind::Sources
        } else {
            ChartKind::Keywords
        };

        let points = visualizer::chart(kind, ctx.chunks, self.config.visualizer_top_n);
        Ok(ToolOutput::text(ToolKind::Visualizer, visualizer::describe(&points))
            .with_payload(visualizer::chart_payload(kind, &points)))
    }
}

fn note_taker(input: &str) -> Result<ToolOutput> {
    let note = input.trim();
    if note.is_empty() {
        return Err(failure(ToolKind::NoteTaker, "Empty note"));
    }

    Ok(ToolOutput {
        note: Some(note.to_string()),
        ..ToolOutput::text(ToolKind::NoteTaker, format!("Note saved: {}", note))
    })
}

fn failure(kind: ToolKind, message: &str) -> AppError {
    AppError::ToolFailure {
        tool: kind.name().to_string(),
        message: message.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{CompletionRequest, LlmBackend, LlmReply};
    use async_trait::async_trait;
    use std::time::Duration;
    use web_search::tests::{hit, StubSearch};

    struct Echo;

    #[async_trait]
    impl LlmBackend for Echo {
        fn name(&self) -> &str {
            "echo"
        }

        async fn complete(&self, request: &CompletionRequest) -> Result<LlmReply> {
            let last = request.messages.last().map(|m| m.content.clone()).unwrap_or_default();
            Ok(LlmReply::Text(format!("echo: {}", last)))
        }
    }

    fn registry(config: ToolsConfig, search: StubSearch) -> ToolRegistry {
        let gateway = LlmGateway::new(vec![Arc::new(Echo)], Duration::from_secs(1), 20_000);
        let search = Arc::new(WebSearchService::new(Arc::new(search), Duration::from_secs(60)));
        ToolRegistry::new(&config, gateway, search).unwrap()
    }

    fn chunks() -> Vec<Chunk> {
        vec![
            Chunk { text: "The sky is blue.".into(), source: "sky.txt".into(), index: 0 },
            Chunk { text: "Grass is green and grass grows.".into(), source: "grass.txt".into(), index: 0 },
        ]
    }

    fn ctx(chunks: &[Chunk]) -> ToolContext<'_> {
        ToolContext { chunks, topic: "Colors" }
    }

    #[test]
    fn test_parse_names_and_aliases() {
        assert_eq!("web_search".parse::<ToolKind>().unwrap(), ToolKind::WebSearch);
        assert_eq!("Note-Taker".parse::<ToolKind>().unwrap(), ToolKind::NoteTaker);
        assert!(matches!("teleport".parse::<ToolKind>(), Err(AppError::UnknownTool { .. })));
        for kind in ToolKind::ALL {
            assert_eq!(kind.name().parse::<ToolKind>().unwrap(), kind);
        }
    }

    #[test]
    fn test_enabled_subset() {
        let config = ToolsConfig {
            enabled: vec!["summarizer".into(), "explainer".into()],
            ..ToolsConfig::default()
        };
        let registry = registry(config, StubSearch::with_hits(vec![]));

        assert_eq!(registry.descriptors().len(), 2);
        assert!(matches!(registry.resolve("web_search"), Err(AppError::UnknownTool { .. })));
    }

    #[test]
    fn test_unknown_enabled_name_is_config_error() {
        let config = ToolsConfig {
            enabled: vec!["teleport".into()],
            ..ToolsConfig::default()
        };
        let gateway = LlmGateway::new(vec![Arc::new(Echo)], Duration::from_secs(1), 20_000);
        let search = Arc::new(WebSearchService::new(Arc::new(StubSearch::with_hits(vec![])), Duration::ZERO));
        assert!(matches!(
            ToolRegistry::new(&config, gateway, search),
            Err(AppError::Configuration { .. })
        ));
    }

    #[tokio::test]
    async fn test_dispatch_unknown_tool() {
        let registry = registry(ToolsConfig::default(), StubSearch::with_hits(vec![]));
        let chunks = chunks();
        let err = registry.dispatch("teleport", "x", ctx(&chunks)).await.unwrap_err();
        assert!(matches!(err, AppError::UnknownTool { .. }));
        assert!(err.is_recoverable_tool_error());
    }

    #[tokio::test]
    async fn test_document_search_tool() {
        let registry = registry(ToolsConfig::default(), StubSearch::with_hits(vec![]));
        let chunks = chunks();
        let output = registry.dispatch("document_search", "grass", ctx(&chunks)).await.unwrap();
        assert!(output.text.starts_with("[1] (grass.txt)"));
        assert_eq!(output.payload.unwrap()["passages"][0]["source"], "grass.txt");

        let err = registry.dispatch("document_search", "grass", ctx(&[])).await.unwrap_err();
        assert!(matches!(err, AppError::ToolFailure { .. }));
    }

    #[tokio::test]
    async fn test_web_search_failure_becomes_tool_failure() {
        let registry = registry(ToolsConfig::default(), StubSearch::failing());
        let err = registry.dispatch("web_search", "rust", ctx(&[])).await.unwrap_err();
        assert!(matches!(err, AppError::ToolFailure { ref tool, .. } if tool == "web_search"));
    }

    #[tokio::test]
    async fn test_web_search_tool() {
        let registry = registry(ToolsConfig::default(), StubSearch::with_hits(vec![hit("ferris")]));
        let output = registry.dispatch("search", "rust mascot", ctx(&[])).await.unwrap();
        assert!(output.text.contains("ferris snippet"));
    }

    #[tokio::test]
    async fn test_summarizer_reads_context_for_short_input() {
        let registry = registry(ToolsConfig::default(), StubSearch::with_hits(vec![]));
        let chunks = vec![Chunk { text: "The sky is blue.".into(), source: "sky.txt".into(), index: 0 }];

        let output = registry.dispatch("summarizer", "Summarize this", ctx(&chunks)).await.unwrap();
        assert!(!output.text.is_empty());
        assert!(output.text.chars().count() <= "The sky is blue.".len());
    }

    #[tokio::test]
    async fn test_note_taker() {
        let registry = registry(ToolsConfig::default(), StubSearch::with_hits(vec![]));
        let output = registry.dispatch("note_taker", "  check citations ", ctx(&[])).await.unwrap();
        assert_eq!(output.note.as_deref(), Some("check citations"));
        assert!(registry.dispatch("note_taker", " ", ctx(&[])).await.is_err());
    }

    #[tokio::test]
    async fn test_explainer_uses_simplify_prompt() {
        let registry = registry(ToolsConfig::default(), StubSearch::with_hits(vec![]));
        let output = registry.dispatch("explainer", "entropy", ctx(&[])).await.unwrap();
        assert!(output.text.contains("in simple terms"));
        assert!(output.text.ends_with("entropy"));
    }

    #[tokio::test]
    async fn test_visualizer_payload() {
        let registry = registry(ToolsConfig::default(), StubSearch::with_hits(vec![]));
        let chunks = chunks();
        let output = registry.dispatch("visualizer", "keywords", ctx(&chunks)).await.unwrap();
        let payload = output.payload.unwrap();
        assert_eq!(payload["chart"], "keywords");
        assert_eq!(payload["data"][0]["name"], "grass");

        let output = registry.dispatch("visualizer", "per source", ctx(&chunks)).await.unwrap();
        assert_eq!(output.payload.unwrap()["chart"], "sources");
    }
}
