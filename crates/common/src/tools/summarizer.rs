//! LLM-backed summarization
//!
//! The summary is never longer than the text it condenses: a reply that is
//! empty or longer than the source is replaced by an extractive lead.

use super::text::{top_keywords, truncate_chars};
use crate::errors::{AppError, Result};
use crate::llm::{ChatMessage, LlmGateway};
use serde::Serialize;
use std::str::FromStr;
use tracing::debug;

/// Output shape requested from the summarizer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SummaryFormat {
    #[default]
    Paragraph,
    Bullets,
}

impl SummaryFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            SummaryFormat::Paragraph => "paragraph",
            SummaryFormat::Bullets => "bullets",
        }
    }
}

impl FromStr for SummaryFormat {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "paragraph" => Ok(SummaryFormat::Paragraph),
            "bullets" => Ok(SummaryFormat::Bullets),
            other => Err(AppError::Validation {
                message: format!("Unsupported summary format '{}'", other),
                field: Some("format".to_string()),
            }),
        }
    }
}

/// Prompting style used to elicit the summary
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SummaryTechnique {
    ChainOfThought,
    React,
}

#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    pub summary: String,
    pub format: SummaryFormat,
    pub technique: SummaryTechnique,
    pub key_concepts: Vec<String>,
    pub confidence: f32,
    /// Set when the model reply was unusable and an extractive lead was returned
    pub extractive: bool,
}

/// The ten most frequent content words
pub fn key_concepts(text: &str) -> Vec<String> {
    top_keywords(text, 10).into_iter().map(|(w, _)| w).collect()
}

fn build_prompt(text: &str, format: SummaryFormat, technique: SummaryTechnique, concepts: &[String]) -> String {
    let format = format.as_str();
    let concepts = concepts.join(", ");

    match technique {
        SummaryTechnique::ChainOfThought => format!(
            "Summarize this document step by step.\n\n\
             Step 1 - Identify the main topic and purpose.\n\
             Step 2 - Identify the key points and supporting details.\n\
             Step 3 - Organize these points logically.\n\
             Step 4 - Write the final summary in {format} format.\n\n\
             Document to summarize:\n{text}\n\n\
             Key concepts identified: {concepts}\n\n\
             Show your reasoning briefly, then write \"Final summary:\" followed by the summary. \
             The summary must be shorter than the document."
        ),
        SummaryTechnique::React => format!(
            "Use the ReAct pattern (Thought, Action, Observation) to summarize this document.\n\
             Available actions: ANALYZE, EXTRACT, ORGANIZE, SYNTHESIZE.\n\n\
             Document to summarize:\n{text}\n\n\
             Key concepts identified: {concepts}\n\n\
             Finish with \"Final summary:\" followed by a {format} summary that is shorter \
             than the document."
        ),
    }
}

/// Pull the summary out of a reasoning-style reply
pub fn extract_final_summary(response: &str, format: SummaryFormat) -> String {
    const INDICATORS: &[&str] = &[
        "final summary:",
        "summary:",
        "in conclusion:",
        "to summarize:",
        "observation 4:",
        "step 4",
    ];

    let lower = response.to_lowercase();
    for indicator in INDICATORS {
        // Lowercasing can shift byte offsets for some scripts; skip on mismatch
        let Some(pos) = lower.find(indicator) else { continue };
        let Some(tail) = response.get(pos + indicator.len()..) else { continue };
        let tail = tail.trim();

        if format == SummaryFormat::Bullets {
            let bullets: Vec<&str> = tail
                .lines()
                .map(str::trim)
                .filter(|l| l.starts_with(['-', '*', '\u{2022}']) || l.starts_with(|c: char| c.is_ascii_digit()))
                .collect();
            if !bullets.is_empty() {
                return bullets.join("\n");
            }
        } else if let Some((first, _)) = tail.split_once("\n\n") {
            return first.trim().to_string();
        }
        return tail.to_string();
    }

    response
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .last()
        .unwrap_or_default()
        .to_string()
}

/// Heuristic confidence in a reasoning-style reply
pub fn confidence(response: &str) -> f32 {
    let lower = response.to_lowercase();
    let len = response.chars().count();
    let mut score: f32 = 0.5;

    if ["step", "first", "second", "finally", "conclusion"].iter().any(|w| lower.contains(w)) {
        score += 0.2;
    }
    if len > 200 {
        score += 0.1;
    }
    if lower.matches("thought").count() > 1 || lower.matches("step").count() > 2 {
        score += 0.1;
    }
    if len < 100 {
        score -= 0.2;
    }

    score.clamp(0.0, 1.0)
}

/// Leading sentences of `text` that fit in `budget` characters; never empty for non-empty text
pub fn extractive_lead(text: &str, budget: usize) -> String {
    let text = text.trim();
    let budget = budget.max(1);
    let mut lead = String::new();

    for sentence in text.split_inclusive(['.', '!', '?']) {
        let sentence = sentence.trim();
        if sentence.is_empty() {
            continue;
        }
        let extra = sentence.chars().count() + usize::from(!lead.is_empty());
        if lead.chars().count() + extra > budget {
            break;
        }
        if !lead.is_empty() {
            lead.push(' ');
        }
        lead.push_str(sentence);
    }

    if lead.is_empty() {
        truncate_chars(text, budget).trim_end().to_string()
    } else {
        lead
    }
}

/// Summarize `text`, reading at most `input_cap` characters of it
pub async fn summarize(
    gateway: &LlmGateway,
    text: &str,
    input_cap: usize,
    format: SummaryFormat,
    technique: SummaryTechnique,
) -> Result<Summary> {
    let source = truncate_chars(text.trim(), input_cap).trim();
    if source.is_empty() {
        return Err(AppError::ToolFailure {
            tool: "summarizer".to_string(),
            message: "No content to summarize".to_string(),
        });
    }

    let concepts = key_concepts(source);
    let prompt = build_prompt(source, format, technique, &concepts);
    let response = gateway.complete_text(vec![ChatMessage::user(prompt)]).await?;

    let source_len = source.chars().count();
    let candidate = extract_final_summary(&response, format);
    let usable = !candidate.is_empty() && candidate.chars().count() <= source_len;

    debug!(source_len, summary_len = candidate.chars().count(), usable, "Summary extracted");

    let summary = if usable {
        candidate
    } else {
        extractive_lead(source, (source_len / 3).max(200).min(source_len))
    };

    Ok(Summary {
        summary,
        format,
        technique,
        key_concepts: concepts,
        confidence: if usable { confidence(&response) } else { 0.3 },
        extractive: !usable,
    })
}
