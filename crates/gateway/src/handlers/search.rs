//! Web search handlers

use axum::{
    extract::{Query, State},
    Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::session_and_context;
use crate::{middleware::session::SessionId, AppState};
use synthesis_common::{
    errors::{AppError, Result},
    llm::ChatMessage,
    models::{Message, Role},
    tools::{
        web_search::{fact_check_prompt, format_hits, verification_prompt},
        SearchHit,
    },
};

const SEARCH_MARKER: &str = "[SEARCH] Query:";
const FACT_CHECK_MARKER: &str = "[FACT-CHECK] Claim:";
const HISTORY_RESULT_CHARS: usize = 800;
const HISTORY_ANALYSIS_CHARS: usize = 500;
const SEARCH_HISTORY_LIMIT: usize = 10;

#[derive(Debug, Deserialize)]
pub struct SearchParams {
    pub query: String,
    #[serde(default)]
    pub verify: bool,
    #[serde(default = "default_use_cache")]
    pub use_cache: bool,
}

fn default_use_cache() -> bool {
    true
}

#[derive(Debug, Deserialize)]
pub struct VerifyParams {
    pub claim: String,
}

#[derive(Serialize)]
pub struct SearchResponse {
    pub query: String,
    pub results: String,
    pub hits: Vec<SearchHit>,
    pub sources: Vec<String>,
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<String>,
    pub cached: bool,
}

#[derive(Serialize)]
pub struct VerifyResponse {
    pub claim: String,
    pub analysis: String,
    pub search_results: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SearchHistoryEntry {
    pub query: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Serialize)]
pub struct SearchHistoryResponse {
    pub searches: Vec<SearchHistoryEntry>,
}

#[derive(Serialize)]
pub struct ClearCacheResponse {
    pub message: String,
    pub cleared: u64,
}

fn clip(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

/// Search the web, optionally asking the model to assess the results
pub async fn search(
    State(state): State<AppState>,
    session_id: SessionId,
    Query(params): Query<SearchParams>,
) -> Result<Json<SearchResponse>> {
    let outcome = state
        .tools()
        .search_service()
        .search(&params.query, params.use_cache)
        .await?;
    let results = format_hits(&outcome.hits);

    let (verified, verification) = if params.verify {
        let prompt = verification_prompt(&outcome.query, &results);
        match state.gateway().complete_text(vec![ChatMessage::user(prompt)]).await {
            Ok(summary) => (true, Some(summary)),
            Err(e) => {
                tracing::warn!(error = %e, query = %outcome.query, "Fact verification failed");
                (false, Some("Fact verification was requested but failed.".to_string()))
            }
        }
    } else {
        (false, None)
    };

    let (mut session, context_id) = session_and_context(&state, &session_id).await?;
    session.push_message(Message::assistant(
        format!(
            "{} {}\nResults: {}",
            SEARCH_MARKER,
            outcome.query,
            clip(&results, HISTORY_RESULT_CHARS)
        ),
        Some(context_id),
    ));
    state.store.put(session).await?;

    Ok(Json(SearchResponse {
        sources: outcome.hits.iter().map(|h| h.url.clone()).filter(|u| !u.is_empty()).collect(),
        query: outcome.query,
        results,
        hits: outcome.hits,
        verified,
        verification,
        cached: outcome.cached,
    }))
}

/// Fact-check a claim against fresh search results
pub async fn verify(
    State(state): State<AppState>,
    session_id: SessionId,
    Query(params): Query<VerifyParams>,
) -> Result<Json<VerifyResponse>> {
    let claim = params.claim.trim();
    if claim.is_empty() {
        return Err(AppError::Validation {
            message: "Claim must not be empty".to_string(),
            field: Some("claim".to_string()),
        });
    }

    let outcome = state
        .tools()
        .search_service()
        .search(&format!("fact check {}", claim), true)
        .await?;
    let search_results = format_hits(&outcome.hits);

    let analysis = state
        .gateway()
        .complete_text(vec![ChatMessage::user(fact_check_prompt(claim, &search_results))])
        .await?;

    let (mut session, context_id) = session_and_context(&state, &session_id).await?;
    session.push_message(Message::assistant(
        format!(
            "{} {}\nAnalysis: {}...",
            FACT_CHECK_MARKER,
            claim,
            clip(&analysis, HISTORY_ANALYSIS_CHARS)
        ),
        Some(context_id),
    ));
    state.store.put(session).await?;

    Ok(Json(VerifyResponse {
        claim: claim.to_string(),
        analysis,
        search_results,
        timestamp: Utc::now(),
    }))
}

/// The most recent searched queries, oldest first
pub async fn history(
    State(state): State<AppState>,
    session_id: SessionId,
) -> Result<Json<SearchHistoryResponse>> {
    let Some(session) = state.store.get(session_id.as_str()).await? else {
        return Ok(Json(SearchHistoryResponse { searches: Vec::new() }));
    };

    let mut searches: Vec<SearchHistoryEntry> = session
        .history
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .filter_map(|m| {
            let first_line = m.content.lines().next()?;
            let query = first_line.strip_prefix(SEARCH_MARKER)?.trim();
            Some(SearchHistoryEntry {
                query: query.to_string(),
                timestamp: m.timestamp,
            })
        })
        .collect();

    let skip = searches.len().saturating_sub(SEARCH_HISTORY_LIMIT);
    searches.drain(..skip);

    Ok(Json(SearchHistoryResponse { searches }))
}

pub async fn clear_cache(State(state): State<AppState>) -> Json<ClearCacheResponse> {
    let cleared = state.tools().search_service().clear_cache();
    tracing::info!(cleared, "Search cache cleared");

    Json(ClearCacheResponse {
        message: "Search cache cleared".to_string(),
        cleared,
    })
}
