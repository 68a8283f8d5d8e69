//! BM25 keyword search over a context's chunks

use super::text::tokenize;
use crate::models::Chunk;
use serde::Serialize;
use std::collections::{HashMap, HashSet};

const K1: f64 = 1.5;
const B: f64 = 0.75;

/// A chunk with its relevance score
#[derive(Debug, Clone, Serialize)]
pub struct ScoredChunk<'a> {
    pub chunk: &'a Chunk,
    /// BM25 score squashed into 0..1
    pub score: f32,
}

/// Rank chunks against `query` and keep the best `top_k`.
///
/// When no chunk matches a query term, the first `top_k` chunks are returned
/// so callers always get some document context if any exists.
pub fn relevant_chunks<'a>(query: &str, chunks: &'a [Chunk], top_k: usize) -> Vec<ScoredChunk<'a>> {
    if chunks.is_empty() || top_k == 0 {
        return Vec::new();
    }

    let query_terms: HashSet<String> = tokenize(query).into_iter().collect();
    let documents: Vec<Vec<String>> = chunks.iter().map(|c| tokenize(&c.text)).collect();

    let n = documents.len() as f64;
    let avg_len = documents.iter().map(Vec::len).sum::<usize>() as f64 / n;

    let mut document_frequency: HashMap<&str, usize> = HashMap::new();
    for doc in &documents {
        let unique: HashSet<&str> = doc.iter().map(String::as_str).collect();
        for term in unique {
            if query_terms.contains(term) {
                *document_frequency.entry(term).or_default() += 1;
            }
        }
    }

    let mut scored: Vec<(usize, f64)> = documents
        .iter()
        .enumerate()
        .map(|(i, doc)| (i, bm25(doc, &query_terms, &document_frequency, n, avg_len)))
        .collect();

    if scored.iter().all(|(_, s)| *s <= 0.0) {
        return chunks
            .iter()
            .take(top_k)
            .map(|chunk| ScoredChunk { chunk, score: 0.0 })
            .collect();
    }

    scored.sort_by(|a, b| b.1.total_cmp(&a.1).then(a.0.cmp(&b.0)));
    scored
        .into_iter()
        .take(top_k)
        .map(|(i, score)| ScoredChunk {
            chunk: &chunks[i],
            score: (score / (score + 1.0)) as f32,
        })
        .collect()
}

fn bm25(
    doc: &[String],
    query_terms: &HashSet<String>,
    document_frequency: &HashMap<&str, usize>,
    n: f64,
    avg_len: f64,
) -> f64 {
    let len = doc.len() as f64;
    let norm = if avg_len > 0.0 { len / avg_len } else { 0.0 };

    query_terms
        .iter()
        .filter_map(|term| {
            let df = *document_frequency.get(term.as_str())? as f64;
            let tf = doc.iter().filter(|t| *t == term).count() as f64;
            if tf == 0.0 {
                return None;
            }
            let idf = ((n - df + 0.5) / (df + 0.5) + 1.0).ln();
            Some(idf * (tf * (K1 + 1.0)) / (tf + K1 * (1.0 - B + B * norm)))
        })
        .sum()
}

/// Render passages as a numbered, source-tagged block
pub fn format_passages(passages: &[ScoredChunk<'_>]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, p)| format!("[{}] ({}) {}", i + 1, p.chunk.source, p.chunk.text))
        .collect::<Vec<_>>()
        .join("\n\n")
}
