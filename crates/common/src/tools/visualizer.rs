//! Chart data built from a context's chunks

use super::text::top_keywords;
use crate::models::Chunk;
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// One labeled count
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChartPoint {
    pub name: String,
    pub value: usize,
}

/// Which aggregation to chart
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartKind {
    /// Chunks contributed by each source document
    #[default]
    Sources,
    /// Most frequent keywords across all chunks
    Keywords,
}

impl FromStr for ChartKind {
    type Err = crate::errors::AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "sources" => Ok(ChartKind::Sources),
            "keywords" => Ok(ChartKind::Keywords),
            other => Err(crate::errors::AppError::Validation {
                message: format!("Unknown chart kind '{}'", other),
                field: Some("kind".to_string()),
            }),
        }
    }
}

/// Keyword frequencies over every chunk, most frequent first
pub fn keyword_chart(chunks: &[Chunk], top_n: usize) -> Vec<ChartPoint> {
    let text = chunks
        .iter()
        .map(|c| c.text.as_str())
        .collect::<Vec<_>>()
        .join(" ");

    top_keywords(&text, top_n)
        .into_iter()
        .map(|(name, value)| ChartPoint { name, value })
        .collect()
}

/// Chunk counts per source, in first-seen order
pub fn sources_chart(chunks: &[Chunk]) -> Vec<ChartPoint> {
    let mut points: Vec<ChartPoint> = Vec::new();
    for chunk in chunks {
        match points.iter_mut().find(|p| p.name == chunk.source) {
            Some(point) => point.value += 1,
            None => points.push(ChartPoint {
                name: chunk.source.clone(),
                value: 1,
            }),
        }
    }
    points
}

/// Build the chart for `kind`
pub fn chart(kind: ChartKind, chunks: &[Chunk], top_n: usize) -> Vec<ChartPoint> {
    match kind {
        ChartKind::Sources => sources_chart(chunks),
        ChartKind::Keywords => keyword_chart(chunks, top_n),
    }
}

/// Payload attached to messages carrying chart data
pub fn chart_payload(kind: ChartKind, points: &[ChartPoint]) -> serde_json::Value {
    serde_json::json!({ "chart": kind, "data": points })
}

/// One line per point, for prompts
pub fn describe(points: &[ChartPoint]) -> String {
    points
        .iter()
        .map(|p| format!("{}: {}", p.name, p.value))
        .collect::<Vec<_>>()
        .join("\n")
}
