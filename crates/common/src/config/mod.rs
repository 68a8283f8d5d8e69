//! Configuration management for SynthesisTalk services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config.toml, config.yaml)
//! - Default values

use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// LLM backends and request shaping
    #[serde(default)]
    pub llm: LlmConfig,

    /// Reasoning loop configuration
    #[serde(default)]
    pub reasoning: ReasoningConfig,

    /// Tool registry configuration
    #[serde(default)]
    pub tools: ToolsConfig,

    /// Web search configuration
    #[serde(default)]
    pub search: SearchConfig,

    /// Upload and chunking configuration
    #[serde(default)]
    pub ingest: IngestConfig,

    /// Session snapshot persistence
    #[serde(default)]
    pub storage: StorageConfig,

    /// Background insight tasks
    #[serde(default)]
    pub insights: InsightsConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,

    /// Rate limiting configuration
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    /// Host to bind to
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,

    /// Request timeout in seconds
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Shutdown timeout in seconds
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,

    /// Maximum request body size in bytes
    #[serde(default = "default_max_body_bytes")]
    pub max_body_bytes: usize,
}

/// One LLM backend entry
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmBackendConfig {
    /// Provider: openai (any OpenAI-compatible endpoint) or mock
    #[serde(default = "default_llm_provider")]
    pub provider: String,

    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key (empty selects the mock provider)
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Primary backend, always tried first
    #[serde(default)]
    pub primary: LlmBackendConfig,

    /// Secondary backend used when the primary fails
    #[serde(default)]
    pub secondary: Option<LlmBackendConfig>,

    /// Per-backend request timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,

    /// Conversation character budget before oldest turns are dropped
    #[serde(default = "default_history_chars")]
    pub history_char_budget: usize,

    /// Sampling temperature
    #[serde(default = "default_temperature")]
    pub temperature: f32,

    /// Maximum output tokens per completion
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReasoningConfig {
    /// Mode used when reasoning is requested: chain_of_thought or react
    #[serde(default = "default_reasoning_mode")]
    pub mode: String,

    /// Maximum decide/invoke rounds in ReAct mode
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Answers longer than this (in characters) get a self-correction pass
    #[serde(default = "default_self_correction_threshold")]
    pub self_correction_threshold: usize,

    /// Enable the self-correction pass
    #[serde(default = "default_enabled")]
    pub self_correction_enabled: bool,

    /// Reasoning default when a chat request omits `use_reasoning`
    #[serde(default = "default_enabled")]
    pub default_use_reasoning: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ToolsConfig {
    /// Enabled tool names (empty enables all)
    #[serde(default)]
    pub enabled: Vec<String>,

    /// Maximum characters fed to the summarizer
    #[serde(default = "default_summary_input_cap")]
    pub summary_input_cap: usize,

    /// Passages returned by document search
    #[serde(default = "default_top_k")]
    pub document_top_k: usize,

    /// Keywords returned by the visualizer
    #[serde(default = "default_top_n")]
    pub visualizer_top_n: usize,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SearchConfig {
    /// Instant answer API endpoint
    #[serde(default = "default_search_endpoint")]
    pub endpoint: String,

    /// Request timeout in seconds
    #[serde(default = "default_search_timeout")]
    pub timeout_secs: u64,

    /// Cache TTL in seconds (0 disables caching)
    #[serde(default = "default_search_cache_ttl")]
    pub cache_ttl_secs: u64,

    /// Maximum hits kept per query
    #[serde(default = "default_search_max_results")]
    pub max_results: usize,

    /// Maximum number of cached queries
    #[serde(default = "default_cache_capacity")]
    pub cache_max_entries: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct InsightsConfig {
    /// How long a task stays pollable, in seconds
    #[serde(default = "default_insight_retention")]
    pub retention_secs: u64,

    /// Maximum number of tracked tasks
    #[serde(default = "default_cache_capacity")]
    pub max_tasks: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct IngestConfig {
    /// Maximum characters per chunk
    #[serde(default = "default_max_chunk_chars")]
    pub max_chunk_chars: usize,

    /// Maximum upload size in bytes
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: usize,

    /// Accepted file extensions
    #[serde(default = "default_extensions")]
    pub accepted_extensions: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StorageConfig {
    /// Persist sessions to a JSON snapshot file
    #[serde(default = "default_enabled")]
    pub persistence_enabled: bool,

    /// Snapshot file path
    #[serde(default = "default_data_file")]
    pub data_file: String,

    /// Snapshot interval in seconds
    #[serde(default = "default_snapshot_interval")]
    pub snapshot_interval_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Metrics port (0 to disable)
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RateLimitConfig {
    /// Requests per second (global)
    #[serde(default = "default_rate_limit")]
    pub requests_per_second: u32,

    /// Burst capacity
    #[serde(default = "default_burst")]
    pub burst: u32,

    /// Enable rate limiting
    #[serde(default = "default_enabled")]
    pub enabled: bool,
}

// Default value functions
fn default_host() -> String { "0.0.0.0".to_string() }
fn default_port() -> u16 { 8000 }
fn default_request_timeout() -> u64 { 120 }
fn default_shutdown_timeout() -> u64 { 30 }
fn default_max_body_bytes() -> usize { 12 * 1024 * 1024 }
fn default_llm_provider() -> String { "openai".to_string() }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 30 }
fn default_history_chars() -> usize { 20_000 }
fn default_temperature() -> f32 { 0.2 }
fn default_max_tokens() -> u32 { 1024 }
fn default_reasoning_mode() -> String { "react".to_string() }
fn default_max_iterations() -> usize { 3 }
fn default_self_correction_threshold() -> usize { 400 }
fn default_summary_input_cap() -> usize { 5000 }
fn default_top_k() -> usize { 3 }
fn default_top_n() -> usize { 10 }
fn default_search_endpoint() -> String { "https://api.duckduckgo.com/".to_string() }
fn default_search_timeout() -> u64 { 10 }
fn default_search_cache_ttl() -> u64 { 600 }
fn default_search_max_results() -> usize { 6 }
fn default_cache_capacity() -> u64 { 1000 }
fn default_insight_retention() -> u64 { 3600 }
fn default_max_chunk_chars() -> usize { 500 }
fn default_max_upload_bytes() -> usize { 10 * 1024 * 1024 }
fn default_extensions() -> Vec<String> { vec!["pdf".to_string(), "txt".to_string()] }
fn default_data_file() -> String { "session_data.json".to_string() }
fn default_snapshot_interval() -> u64 { 30 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { true }
fn default_metrics_port() -> u16 { 9090 }
fn default_service_name() -> String { "synthesis-talk".to_string() }
fn default_rate_limit() -> u32 { 50 }
fn default_burst() -> u32 { 100 }
fn default_enabled() -> bool { true }

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self, ConfigError> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Start with defaults
            .set_default("server.host", default_host())?
            .set_default("server.port", default_port() as i64)?

            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__LLM__PRIMARY__API_KEY=sk-...
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        config.try_deserialize()
    }

    /// Load from a specific TOML file
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let config = Config::builder()
            .add_source(File::with_name(path))
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )
            .build()?;

        config.try_deserialize()
    }

    /// Get request timeout as Duration
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.server.request_timeout_secs)
    }

    /// Get shutdown timeout as Duration
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.server.shutdown_timeout_secs)
    }

    /// Get the insight task retention as Duration
    pub fn insight_retention(&self) -> Duration {
        Duration::from_secs(self.insights.retention_secs)
    }

    /// Get the per-backend LLM timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }

    /// Backends in fallback order
    pub fn llm_backends(&self) -> Vec<&LlmBackendConfig> {
        std::iter::once(&self.llm.primary)
            .chain(self.llm.secondary.iter())
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            request_timeout_secs: default_request_timeout(),
            shutdown_timeout_secs: default_shutdown_timeout(),
            max_body_bytes: default_max_body_bytes(),
        }
    }
}

impl Default for LlmBackendConfig {
    fn default() -> Self {
        Self {
            provider: default_llm_provider(),
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
        }
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            primary: LlmBackendConfig::default(),
            secondary: None,
            timeout_secs: default_llm_timeout(),
            history_char_budget: default_history_chars(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
        }
    }
}

impl Default for ReasoningConfig {
    fn default() -> Self {
        Self {
            mode: default_reasoning_mode(),
            max_iterations: default_max_iterations(),
            self_correction_threshold: default_self_correction_threshold(),
            self_correction_enabled: default_enabled(),
            default_use_reasoning: default_enabled(),
        }
    }
}

impl Default for ToolsConfig {
    fn default() -> Self {
        Self {
            enabled: Vec::new(),
            summary_input_cap: default_summary_input_cap(),
            document_top_k: default_top_k(),
            visualizer_top_n: default_top_n(),
        }
    }
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            endpoint: default_search_endpoint(),
            timeout_secs: default_search_timeout(),
            cache_ttl_secs: default_search_cache_ttl(),
            max_results: default_search_max_results(),
            cache_max_entries: default_cache_capacity(),
        }
    }
}

impl Default for InsightsConfig {
    fn default() -> Self {
        Self {
            retention_secs: default_insight_retention(),
            max_tasks: default_cache_capacity(),
        }
    }
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_chunk_chars: default_max_chunk_chars(),
            max_upload_bytes: default_max_upload_bytes(),
            accepted_extensions: default_extensions(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            persistence_enabled: default_enabled(),
            data_file: default_data_file(),
            snapshot_interval_secs: default_snapshot_interval(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            metrics_port: default_metrics_port(),
            service_name: default_service_name(),
        }
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: default_rate_limit(),
            burst: default_burst(),
            enabled: default_enabled(),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            llm: LlmConfig::default(),
            reasoning: ReasoningConfig::default(),
            tools: ToolsConfig::default(),
            search: SearchConfig::default(),
            ingest: IngestConfig::default(),
            storage: StorageConfig::default(),
            insights: InsightsConfig::default(),
            observability: ObservabilityConfig::default(),
            rate_limit: RateLimitConfig::default(),
        }
    }
}
