//! Ordered fallback across LLM backends

use super::{trim_history, ChatMessage, CompletionRequest, LlmBackend, LlmReply, MockBackend, OpenAiBackend};
use crate::config::AppConfig;
use crate::errors::{AppError, Result};
use crate::metrics::{record_llm_call, record_llm_fallback};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{info, instrument, warn};

/// Sends requests to the first backend that answers
#[derive(Clone)]
pub struct LlmGateway {
    backends: Vec<Arc<dyn LlmBackend>>,
    timeout: Duration,
    history_char_budget: usize,
}

impl LlmGateway {
    pub fn new(backends: Vec<Arc<dyn LlmBackend>>, timeout: Duration, history_char_budget: usize) -> Self {
        Self {
            backends,
            timeout,
            history_char_budget,
        }
    }

    /// Build the backend chain from configuration.
    ///
    /// A backend without an API key, or with the `mock` provider, runs locally.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let labels = ["primary", "secondary"];
        let mut backends: Vec<Arc<dyn LlmBackend>> = Vec::new();

        for (label, backend) in labels.iter().zip(config.llm_backends()) {
            let has_key = backend.api_key.as_deref().is_some_and(|k| !k.trim().is_empty());

            match backend.provider.as_str() {
                "openai" if has_key => {
                    info!(backend = label, model = %backend.model, endpoint = %backend.endpoint, "LLM backend configured");
                    backends.push(Arc::new(OpenAiBackend::new(
                        *label,
                        backend,
                        config.llm_timeout(),
                        config.llm.temperature,
                        config.llm.max_tokens,
                    )?));
                }
                "openai" | "mock" => {
                    warn!(backend = label, "No API key configured, using mock LLM backend");
                    backends.push(Arc::new(MockBackend::new()));
                }
                other => {
                    return Err(AppError::Configuration {
                        message: format!("Unknown LLM provider '{}' for {} backend", other, label),
                    });
                }
            }
        }

        Ok(Self::new(backends, config.llm_timeout(), config.llm.history_char_budget))
    }

    /// Backend names in fallback order
    pub fn backend_names(&self) -> Vec<&str> {
        self.backends.iter().map(|b| b.name()).collect()
    }

    pub fn is_configured(&self) -> bool {
        !self.backends.is_empty()
    }

    /// Run a completion, falling back through the backend list.
    ///
    /// Fails with `ServiceUnavailable` only when every backend fails.
    #[instrument(skip(self, request), fields(messages = request.messages.len(), tools = request.tools.len()))]
    pub async fn complete(&self, request: CompletionRequest) -> Result<LlmReply> {
        let request = CompletionRequest {
            messages: trim_history(request.messages, self.history_char_budget),
            tools: request.tools,
        };

        let mut last_error: Option<AppError> = None;

        for (position, backend) in self.backends.iter().enumerate() {
            if position > 0 {
                record_llm_fallback(self.backends[position - 1].name());
            }

            let start = Instant::now();
            let outcome = tokio::time::timeout(self.timeout, backend.complete(&request)).await;
            let elapsed = start.elapsed().as_secs_f64();

            match outcome {
                Ok(Ok(reply)) => {
                    record_llm_call(backend.name(), elapsed, "success");
                    return Ok(reply);
                }
                Ok(Err(e)) => {
                    record_llm_call(backend.name(), elapsed, "error");
                    warn!(backend = backend.name(), error = %e, "LLM backend failed");
                    last_error = Some(e);
                }
                Err(_) => {
                    record_llm_call(backend.name(), elapsed, "timeout");
                    warn!(backend = backend.name(), timeout_ms = self.timeout.as_millis() as u64, "LLM backend timed out");
                    last_error = Some(AppError::Timeout {
                        backend: backend.name().to_string(),
                        timeout_ms: self.timeout.as_millis() as u64,
                    });
                }
            }
        }

        let detail = last_error
            .map(|e| e.to_string())
            .unwrap_or_else(|| "no backends configured".to_string());

        Err(AppError::ServiceUnavailable {
            message: format!("All LLM backends failed: {}", detail),
        })
    }

    /// Completion flattened to prose
    pub async fn complete_text(&self, messages: Vec<ChatMessage>) -> Result<String> {
        Ok(self.complete(CompletionRequest::new(messages)).await?.into_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LlmBackendConfig;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Failing {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl LlmBackend for Failing {
        fn name(&self) -> &str {
            "failing"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<LlmReply> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(AppError::Upstream {
                backend: "failing".into(),
                message: "503".into(),
            })
        }
    }

    struct Slow;

    #[async_trait]
    impl LlmBackend for Slow {
        fn name(&self) -> &str {
            "slow"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<LlmReply> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(LlmReply::Text("too late".into()))
        }
    }

    struct Fixed(&'static str);

    #[async_trait]
    impl LlmBackend for Fixed {
        fn name(&self) -> &str {
            "fixed"
        }

        async fn complete(&self, _request: &CompletionRequest) -> Result<LlmReply> {
            Ok(LlmReply::Text(self.0.into()))
        }
    }

    fn gateway(backends: Vec<Arc<dyn LlmBackend>>) -> LlmGateway {
        LlmGateway::new(backends, Duration::from_millis(50), 20_000)
    }

    #[tokio::test]
    async fn test_primary_success_skips_secondary() {
        let secondary = Arc::new(Failing { calls: AtomicUsize::new(0) });
        let gw = gateway(vec![Arc::new(Fixed("primary answer")), secondary.clone()]);

        let text = gw.complete_text(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(text, "primary answer");
        assert_eq!(secondary.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_falls_back_on_error() {
        let primary = Arc::new(Failing { calls: AtomicUsize::new(0) });
        let gw = gateway(vec![primary.clone(), Arc::new(Fixed("fallback"))]);

        let text = gw.complete_text(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(text, "fallback");
        assert_eq!(primary.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_falls_back_on_timeout() {
        let gw = gateway(vec![Arc::new(Slow), Arc::new(Fixed("fast"))]);
        let text = gw.complete_text(vec![ChatMessage::user("hi")]).await.unwrap();
        assert_eq!(text, "fast");
    }

    #[tokio::test]
    async fn test_all_failing_is_service_unavailable() {
        let gw = gateway(vec![
            Arc::new(Failing { calls: AtomicUsize::new(0) }),
            Arc::new(Slow),
        ]);
        let err = gw.complete_text(vec![ChatMessage::user("hi")]).await.unwrap_err();
        assert!(matches!(err, AppError::ServiceUnavailable { ref message } if message.contains("timed out") || message.contains("slow")));
    }

    #[tokio::test]
    async fn test_no_backends_is_service_unavailable() {
        let gw = gateway(Vec::new());
        assert!(!gw.is_configured());
        assert!(matches!(
            gw.complete_text(vec![ChatMessage::user("hi")]).await,
            Err(AppError::ServiceUnavailable { .. })
        ));
    }

    #[test]
    fn test_from_config_uses_mock_without_key() {
        let gw = LlmGateway::from_config(&AppConfig::default()).unwrap();
        assert_eq!(gw.backend_names(), vec!["mock"]);
    }

    #[test]
    fn test_from_config_rejects_unknown_provider() {
        let mut config = AppConfig::default();
        config.llm.secondary = Some(LlmBackendConfig {
            provider: "carrier-pigeon".into(),
            ..LlmBackendConfig::default()
        });
        assert!(matches!(
            LlmGateway::from_config(&config),
            Err(AppError::Configuration { .. })
        ));
    }
}
