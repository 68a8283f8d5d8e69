//! Metrics and observability utilities
//!
//! Provides Prometheus metrics with standardized naming conventions
//! for the HTTP layer, the LLM gateway, and the reasoning loop.

use metrics::{counter, describe_counter, describe_histogram, histogram, Unit};
use std::time::Instant;

/// Metrics prefix for all SynthesisTalk metrics
pub const METRICS_PREFIX: &str = "synthesis";

/// Histogram buckets for request latency (in seconds).
/// Chat requests wait on LLM round trips, so the tail is long.
pub const LATENCY_BUCKETS: &[f64] = &[
    0.005,  // 5ms
    0.025,  // 25ms
    0.100,  // 100ms
    0.250,  // 250ms
    0.500,  // 500ms
    1.000,  // 1s
    2.500,  // 2.5s
    5.000,  // 5s
    10.00,  // 10s
    30.00,  // 30s
    60.00,  // 60s
];

/// Register all metric descriptions
pub fn register_metrics() {
    // Request metrics
    describe_counter!(
        format!("{}_requests_total", METRICS_PREFIX),
        Unit::Count,
        "Total number of HTTP requests"
    );

    describe_histogram!(
        format!("{}_request_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "HTTP request latency in seconds"
    );

    // LLM gateway metrics
    describe_counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        Unit::Count,
        "LLM backend calls by backend and outcome"
    );

    describe_histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        Unit::Seconds,
        "LLM backend call latency in seconds"
    );

    describe_counter!(
        format!("{}_llm_fallbacks_total", METRICS_PREFIX),
        Unit::Count,
        "Requests that fell through to a secondary backend"
    );

    // Reasoning metrics
    describe_counter!(
        format!("{}_tool_invocations_total", METRICS_PREFIX),
        Unit::Count,
        "Tool invocations by tool and outcome"
    );

    describe_histogram!(
        format!("{}_reasoning_iterations", METRICS_PREFIX),
        Unit::Count,
        "Decide/invoke rounds per reasoning cycle"
    );

    describe_counter!(
        format!("{}_self_corrections_total", METRICS_PREFIX),
        Unit::Count,
        "Self-correction passes by outcome"
    );

    // Ingestion metrics
    describe_counter!(
        format!("{}_documents_uploaded_total", METRICS_PREFIX),
        Unit::Count,
        "Total documents uploaded"
    );

    describe_counter!(
        format!("{}_chunks_created_total", METRICS_PREFIX),
        Unit::Count,
        "Total chunks created"
    );

    // Search cache metrics
    describe_counter!(
        format!("{}_search_cache_hits_total", METRICS_PREFIX),
        Unit::Count,
        "Total web search cache hits"
    );

    describe_counter!(
        format!("{}_search_cache_misses_total", METRICS_PREFIX),
        Unit::Count,
        "Total web search cache misses"
    );

    tracing::info!("Metrics registered");
}

/// Helper to record request metrics
pub struct RequestMetrics {
    start: Instant,
    endpoint: String,
    method: String,
}

impl RequestMetrics {
    /// Start tracking a request
    pub fn start(method: &str, endpoint: &str) -> Self {
        Self {
            start: Instant::now(),
            endpoint: endpoint.to_string(),
            method: method.to_string(),
        }
    }

    /// Record request completion
    pub fn finish(self, status: u16) {
        let duration = self.start.elapsed().as_secs_f64();

        counter!(
            format!("{}_requests_total", METRICS_PREFIX),
            "method" => self.method.clone(),
            "endpoint" => self.endpoint.clone(),
            "status" => status.to_string()
        )
        .increment(1);

        histogram!(
            format!("{}_request_duration_seconds", METRICS_PREFIX),
            "method" => self.method,
            "endpoint" => self.endpoint
        )
        .record(duration);
    }
}

/// Record one LLM backend call
pub fn record_llm_call(backend: &str, duration_secs: f64, outcome: &str) {
    counter!(
        format!("{}_llm_requests_total", METRICS_PREFIX),
        "backend" => backend.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);

    histogram!(
        format!("{}_llm_duration_seconds", METRICS_PREFIX),
        "backend" => backend.to_string()
    )
    .record(duration_secs);
}

/// Record that a request moved past its primary backend
pub fn record_llm_fallback(from: &str) {
    counter!(
        format!("{}_llm_fallbacks_total", METRICS_PREFIX),
        "from" => from.to_string()
    )
    .increment(1);
}

/// Record a tool invocation
pub fn record_tool(tool: &str, success: bool) {
    let outcome = if success { "success" } else { "error" };

    counter!(
        format!("{}_tool_invocations_total", METRICS_PREFIX),
        "tool" => tool.to_string(),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record the number of rounds one reasoning cycle took
pub fn record_reasoning(iterations: usize, mode: &str) {
    histogram!(
        format!("{}_reasoning_iterations", METRICS_PREFIX),
        "mode" => mode.to_string()
    )
    .record(iterations as f64);
}

/// Record a self-correction pass
pub fn record_self_correction(applied: bool) {
    let outcome = if applied { "applied" } else { "kept_original" };

    counter!(
        format!("{}_self_corrections_total", METRICS_PREFIX),
        "outcome" => outcome.to_string()
    )
    .increment(1);
}

/// Record an upload
pub fn record_upload(extension: &str, chunks_created: usize) {
    counter!(
        format!("{}_documents_uploaded_total", METRICS_PREFIX),
        "extension" => extension.to_string()
    )
    .increment(1);

    counter!(format!("{}_chunks_created_total", METRICS_PREFIX))
        .increment(chunks_created as u64);
}

/// Helper to record cache metrics
pub fn record_search_cache(hit: bool) {
    if hit {
        counter!(format!("{}_search_cache_hits_total", METRICS_PREFIX)).increment(1);
    } else {
        counter!(format!("{}_search_cache_misses_total", METRICS_PREFIX)).increment(1);
    }
}
