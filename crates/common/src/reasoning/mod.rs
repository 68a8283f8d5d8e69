//! Reasoning pipeline
//!
//! Turns one user message into one assistant message. Depending on the mode it
//! answers directly, or runs a bounded decide/invoke loop over the tool
//! registry before synthesizing, then optionally self-corrects.
//!
//! ```text
//! Idle -> Deciding -> (InvokingTool -> Deciding)* -> Synthesizing -> [SelfCorrecting] -> Idle
//! ```

mod orchestrator;
mod prompts;

pub use orchestrator::Orchestrator;
pub use prompts::{UNAVAILABLE_MESSAGE, CRITIQUE_PROMPT};

use crate::errors::AppError;
use crate::models::Message;
use crate::tools::ToolInvocation;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;
use std::str::FromStr;

static SEARCH_PREFIX_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*(?:search|find)\s*[:\-]\s*(.+)").expect("search prefix regex is valid")
});

/// How a message is answered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReasoningMode {
    /// Single LLM call with document context
    Direct,
    /// One tool round, then synthesis
    ChainOfThought,
    /// Tool rounds up to the iteration cap, then synthesis
    React,
}

impl ReasoningMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasoningMode::Direct => "direct",
            ReasoningMode::ChainOfThought => "chain_of_thought",
            ReasoningMode::React => "react",
        }
    }

    /// Tool rounds allowed for this mode
    pub fn round_cap(&self, max_iterations: usize) -> usize {
        match self {
            ReasoningMode::Direct => 0,
            ReasoningMode::ChainOfThought => 1.min(max_iterations),
            ReasoningMode::React => max_iterations,
        }
    }
}

impl FromStr for ReasoningMode {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "direct" | "none" => Ok(ReasoningMode::Direct),
            "chain_of_thought" | "cot" => Ok(ReasoningMode::ChainOfThought),
            "react" => Ok(ReasoningMode::React),
            other => Err(AppError::Configuration {
                message: format!("Unknown reasoning mode '{}'", other),
            }),
        }
    }
}

/// Pipeline phase a step belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    Deciding,
    InvokingTool,
    Synthesizing,
    SelfCorrecting,
}

/// One entry of the reasoning trace returned to the client
#[derive(Debug, Clone, Serialize)]
pub struct ReasoningStep {
    pub phase: Phase,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub invocation: Option<ToolInvocation>,
}

impl ReasoningStep {
    fn new(phase: Phase, description: impl Into<String>) -> Self {
        Self {
            phase,
            description: description.into(),
            invocation: None,
        }
    }
}

/// Result of handling one chat message
#[derive(Debug, Clone, Serialize)]
pub struct ChatOutcome {
    /// The assistant message appended to the session
    pub message: Message,
    pub steps: Vec<ReasoningStep>,
    pub used_reasoning: bool,
    pub mode: ReasoningMode,
    /// Whether self-correction replaced the synthesized answer
    pub self_corrected: bool,
    pub context_id: String,
}

/// What the model asked for at a decision point
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Decision {
    Tool { name: String, input: String },
    Finish,
}

#[derive(Deserialize)]
struct RawDecision {
    #[serde(default)]
    action: String,
    #[serde(default)]
    tool: Option<String>,
    #[serde(default)]
    input: Option<String>,
}

/// Read a decision out of free text. Anything unreadable means "finish".
pub(crate) fn parse_decision(text: &str) -> Decision {
    let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) else {
        return Decision::Finish;
    };
    if end < start {
        return Decision::Finish;
    }

    match serde_json::from_str::<RawDecision>(&text[start..=end]) {
        Ok(raw) if raw.action.eq_ignore_ascii_case("tool") => match raw.tool {
            Some(name) if !name.trim().is_empty() => Decision::Tool {
                name: name.trim().to_string(),
                input: raw.input.unwrap_or_default(),
            },
            _ => Decision::Finish,
        },
        _ => Decision::Finish,
    }
}

/// `search: ...` / `find: ...` prefix, returning the query
pub(crate) fn explicit_search_query(text: &str) -> Option<String> {
    SEARCH_PREFIX_RE
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|q| !q.is_empty())
}
