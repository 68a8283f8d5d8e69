//! Web search
//!
//! Provides:
//! - The `WebSearch` client interface
//! - A DuckDuckGo Instant Answer client with retry
//! - `WebSearchService`, a TTL cache in front of any client

use super::text::truncate_chars;
use crate::config::SearchConfig;
use crate::errors::{AppError, Result};
use crate::metrics::record_search_cache;
use async_trait::async_trait;
use backoff::{future::retry, ExponentialBackoffBuilder};
use moka::sync::Cache;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const DEFAULT_CACHE_CAPACITY: u64 = 1000;

/// One search result
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchHit {
    pub title: String,
    pub url: String,
    pub snippet: String,
}

/// A query string in, a list of hits out
#[async_trait]
pub trait WebSearch: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// DuckDuckGo Instant Answer API client
pub struct DuckDuckGoClient {
    client: reqwest::Client,
    endpoint: String,
    max_results: usize,
    max_elapsed: Duration,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct InstantAnswer {
    heading: String,
    abstract_text: String,
    #[serde(rename = "AbstractURL")]
    abstract_url: String,
    abstract_source: String,
    related_topics: Vec<RelatedTopic>,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "PascalCase", default)]
struct RelatedTopic {
    text: Option<String>,
    #[serde(rename = "FirstURL")]
    first_url: Option<String>,
    /// Present on disambiguation groups
    topics: Vec<RelatedTopic>,
}

impl DuckDuckGoClient {
    pub fn new(config: &SearchConfig) -> Result<Self> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("synthesis-talk/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Internal {
                message: format!("Failed to create HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
            max_results: config.max_results,
            max_elapsed: timeout * 2,
        })
    }

    async fn fetch(&self, query: &str) -> std::result::Result<InstantAnswer, backoff::Error<AppError>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("format", "json"),
                ("no_redirect", "1"),
                ("no_html", "1"),
                ("skip_disambig", "1"),
            ])
            .send()
            .await
            .map_err(|e| {
                backoff::Error::transient(AppError::Search {
                    message: format!("Request failed: {}", e),
                })
            })?;

        let status = response.status();
        if !status.is_success() {
            let err = AppError::Search {
                message: format!("Search API returned {}", status),
            };
            return Err(if status.is_server_error() {
                backoff::Error::transient(err)
            } else {
                backoff::Error::permanent(err)
            });
        }

        // The API labels its JSON as javascript, so decode the text body
        let body = response.text().await.map_err(|e| {
            backoff::Error::transient(AppError::Search {
                message: format!("Failed to read response: {}", e),
            })
        })?;

        serde_json::from_str(&body).map_err(|e| {
            backoff::Error::permanent(AppError::Search {
                message: format!("Failed to parse response: {}", e),
            })
        })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGoClient {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        let policy = ExponentialBackoffBuilder::new()
            .with_initial_interval(Duration::from_millis(250))
            .with_max_elapsed_time(Some(self.max_elapsed))
            .build();

        let answer = retry(policy, || async {
            self.fetch(query).await.inspect_err(|e| {
                warn!(query, error = %e, "Web search attempt failed");
            })
        })
        .await?;

        Ok(answer_to_hits(answer, self.max_results))
    }
}

fn answer_to_hits(answer: InstantAnswer, max_results: usize) -> Vec<SearchHit> {
    let mut hits = Vec::new();

    if !answer.abstract_text.trim().is_empty() {
        let title = if answer.heading.is_empty() {
            answer.abstract_source.clone()
        } else {
            answer.heading.clone()
        };
        hits.push(SearchHit {
            title,
            url: answer.abstract_url,
            snippet: answer.abstract_text,
        });
    }

    let mut stack: Vec<RelatedTopic> = answer.related_topics.into_iter().rev().collect();
    while let Some(topic) = stack.pop() {
        if hits.len() >= max_results {
            break;
        }
        if !topic.topics.is_empty() {
            stack.extend(topic.topics.into_iter().rev());
            continue;
        }
        if let Some(text) = topic.text.filter(|t| !t.trim().is_empty()) {
            let title = text
                .split_once(" - ")
                .map(|(head, _)| head.to_string())
                .unwrap_or_else(|| truncate_chars(&text, 80).to_string());
            hits.push(SearchHit {
                title,
                url: topic.first_url.unwrap_or_default(),
                snippet: text,
            });
        }
    }

    hits.truncate(max_results);
    hits
}

/// Render hits as a readable block for prompts and history
pub fn format_hits(hits: &[SearchHit]) -> String {
    if hits.is_empty() {
        return "No results found.".to_string();
    }
    hits.iter()
        .enumerate()
        .map(|(i, h)| format!("{}. {}\n{}\nURL: {}", i + 1, h.title, h.snippet, h.url))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Prompt asking the model to assess search results
pub fn verification_prompt(query: &str, results: &str) -> String {
    format!(
        "Please analyze the following search results for accuracy and reliability.\n\n\
         Query: {}\nResults: {}\n\n\
         Evaluate whether the facts are accurate, whether the sources are reliable, whether \
         anything is potentially misleading, and what additional context would help. \
         Provide a brief verification summary.",
        query,
        truncate_chars(results, 1500)
    )
}

/// Prompt asking the model to fact-check a claim
pub fn fact_check_prompt(claim: &str, results: &str) -> String {
    format!(
        "Please fact-check the following claim using the search results provided.\n\n\
         Claim: \"{}\"\n\nSearch Results:\n{}\n\n\
         Cover accuracy, supporting or contradicting evidence, source reliability and \
         important context. Conclude with one of: True, False, Partially True, or \
         Insufficient Evidence.",
        claim,
        truncate_chars(results, 2000)
    )
}

/// Result of a service-level search
#[derive(Debug, Clone, Serialize)]
pub struct SearchOutcome {
    pub query: String,
    pub hits: Vec<SearchHit>,
    pub cached: bool,
}

/// Cached web search shared across requests
pub struct WebSearchService {
    client: Arc<dyn WebSearch>,
    /// Absent when the TTL is zero
    cache: Option<Cache<String, Vec<SearchHit>>>,
}

impl WebSearchService {
    pub fn new(client: Arc<dyn WebSearch>, ttl: Duration) -> Self {
        Self::with_capacity(client, ttl, DEFAULT_CACHE_CAPACITY)
    }

    pub fn with_capacity(client: Arc<dyn WebSearch>, ttl: Duration, max_entries: u64) -> Self {
        let cache = (!ttl.is_zero()).then(|| {
            Cache::builder()
                .max_capacity(max_entries)
                .time_to_live(ttl)
                .build()
        });

        Self { client, cache }
    }

    pub fn from_config(config: &SearchConfig) -> Result<Self> {
        Ok(Self::with_capacity(
            Arc::new(DuckDuckGoClient::new(config)?),
            Duration::from_secs(config.cache_ttl_secs),
            config.cache_max_entries,
        ))
    }

    fn cache_key(query: &str) -> String {
        query.trim().to_lowercase()
    }

    /// Search, serving fresh cache entries when allowed
    pub async fn search(&self, query: &str, use_cache: bool) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(AppError::Validation {
                message: "Search query must not be empty".to_string(),
                field: Some("query".to_string()),
            });
        }

        let key = Self::cache_key(query);
        let cache = self.cache.as_ref().filter(|_| use_cache);

        if let Some(cache) = cache {
            if let Some(hits) = cache.get(&key) {
                record_search_cache(true);
                debug!(query, "Search cache hit");
                return Ok(SearchOutcome {
                    query: query.to_string(),
                    hits,
                    cached: true,
                });
            }
            record_search_cache(false);
        }

        let hits = self.client.search(query).await?;
        info!(query, hits = hits.len(), "Web search completed");

        if let Some(cache) = cache {
            cache.insert(key, hits.clone());
        }

        Ok(SearchOutcome {
            query: query.to_string(),
            hits,
            cached: false,
        })
    }

    /// Number of live cache entries
    pub fn cached_entries(&self) -> u64 {
        self.cache.as_ref().map_or(0, |cache| {
            cache.run_pending_tasks();
            cache.entry_count()
        })
    }

    /// Drop every cached entry; returns how many were removed
    pub fn clear_cache(&self) -> u64 {
        let removed = self.cached_entries();
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
        }
        removed
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Returns fixed hits and counts calls
    pub(crate) struct StubSearch {
        pub calls: AtomicUsize,
        pub hits: Vec<SearchHit>,
        pub fail: bool,
    }

    impl StubSearch {
        pub(crate) fn with_hits(hits: Vec<SearchHit>) -> Self {
            Self { calls: AtomicUsize::new(0), hits, fail: false }
        }

        pub(crate) fn failing() -> Self {
            Self { calls: AtomicUsize::new(0), hits: Vec::new(), fail: true }
        }
    }

    #[async_trait]
    impl WebSearch for StubSearch {
        async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(AppError::Search { message: "offline".into() });
            }
            Ok(self.hits.clone())
        }
    }

    pub(crate) fn hit(title: &str) -> SearchHit {
        SearchHit {
            title: title.into(),
            url: format!("https://example.org/{}", title),
            snippet: format!("{} snippet", title),
        }
    }

    #[tokio::test]
    async fn test_cache_is_keyed_by_normalized_query() {
        let stub = Arc::new(StubSearch::with_hits(vec![hit("rust")]));
        let service = WebSearchService::new(stub.clone(), Duration::from_secs(60));

        let first = service.search("Rust Lang", true).await.unwrap();
        let second = service.search("  rust lang ", true).await.unwrap();

        assert!(!first.cached);
        assert!(second.cached);
        assert_eq!(stub.calls.load(Ordering::SeqCst), 1);

        assert_eq!(service.clear_cache(), 1);
        service.search("rust lang", true).await.unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bypass_cache() {
        let stub = Arc::new(StubSearch::with_hits(vec![hit("a")]));
        let service = WebSearchService::new(stub.clone(), Duration::from_secs(60));
        service.search("q", false).await.unwrap();
        service.search("q", false).await.unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_entries_are_evicted() {
        let stub = Arc::new(StubSearch::with_hits(vec![hit("tide")]));
        let service = WebSearchService::new(stub.clone(), Duration::from_millis(20));

        for i in 0..200 {
            service.search(&format!("query {}", i), true).await.unwrap();
        }
        tokio::time::sleep(Duration::from_millis(80)).await;

        let again = service.search("query 0", true).await.unwrap();
        assert!(!again.cached);
        assert!(service.cached_entries() <= 1);
    }

    #[tokio::test]
    async fn test_cache_capacity_is_bounded() {
        let stub = Arc::new(StubSearch::with_hits(vec![hit("tide")]));
        let service = WebSearchService::with_capacity(stub, Duration::from_secs(60), 5);

        for i in 0..50 {
            service.search(&format!("query {}", i), true).await.unwrap();
        }

        assert!(service.cached_entries() <= 5);
    }

    #[tokio::test]
    async fn test_zero_ttl_disables_cache() {
        let stub = Arc::new(StubSearch::with_hits(vec![hit("a")]));
        let service = WebSearchService::new(stub.clone(), Duration::ZERO);
        service.search("q", true).await.unwrap();
        service.search("q", true).await.unwrap();
        assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
        assert_eq!(service.clear_cache(), 0);
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let service = WebSearchService::new(Arc::new(StubSearch::with_hits(vec![])), Duration::ZERO);
        assert!(matches!(service.search("   ", true).await, Err(AppError::Validation { .. })));
    }

    #[test]
    fn test_answer_to_hits() {
        let answer: InstantAnswer = serde_json::from_str(
            r#"{
                "Heading": "Rust (programming language)",
                "AbstractText": "Rust is a systems language.",
                "AbstractSource": "Wikipedia",
                "AbstractURL": "https://en.wikipedia.org/wiki/Rust",
                "RelatedTopics": [
                    {"Text": "Cargo - Rust package manager", "FirstURL": "https://ddg.gg/Cargo"},
                    {"Name": "See also", "Topics": [
                        {"Text": "Ferris - mascot", "FirstURL": "https://ddg.gg/Ferris"}
                    ]},
                    {"Text": "Clippy - lints", "FirstURL": "https://ddg.gg/Clippy"}
                ]
            }"#,
        )
        .unwrap();

        let hits = answer_to_hits(answer, 3);
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].title, "Rust (programming language)");
        assert_eq!(hits[1].title, "Cargo");
        assert_eq!(hits[2].title, "Ferris");
    }

    #[test]
    fn test_format_hits() {
        assert_eq!(format_hits(&[]), "No results found.");
        assert!(format_hits(&[hit("x")]).starts_with("1. x\nx snippet"));
    }
}
