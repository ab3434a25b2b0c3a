//! Provider Adapter: any [`LlmProvider`] plus the retry policy.

use super::{
    Backend, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError,
    ToolCompletion,
};
use crate::config::RuntimeConfig;
use crate::resilience::RetryPolicy;
use std::sync::Arc;
use std::time::Duration;
use verdict_core::ToolDefinition;

/// Uniform completion entry point used by the orchestrator.
///
/// Cheap to clone; the provider behind it is shared and must tolerate
/// concurrent requests.
#[derive(Clone)]
pub struct ProviderAdapter {
    provider: Arc<dyn LlmProvider>,
    retry: RetryPolicy,
    timeout: Duration,
}

impl std::fmt::Debug for ProviderAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("provider", &self.provider.model_version())
            .field("retry", &self.retry)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ProviderAdapter {
    pub fn new(provider: Arc<dyn LlmProvider>, retry: RetryPolicy) -> Self {
        Self {
            provider,
            retry,
            timeout: Duration::from_secs(60),
        }
    }

    /// Build the configured backend and wrap it.
    pub fn from_config(config: &RuntimeConfig) -> Result<Self, ProviderError> {
        let backend = Backend::from_config(&config.backend)?;
        Ok(Self::new(Arc::new(backend), RetryPolicy::from_config(&config.retry))
            .with_timeout(config.backend.timeout))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn provider(&self) -> &Arc<dyn LlmProvider> {
        &self.provider
    }

    pub fn model_version(&self) -> String {
        self.provider.model_version()
    }

    fn completion_config(&self, temperature: f32, max_tokens: u32) -> CompletionConfig {
        CompletionConfig {
            max_tokens,
            temperature,
            timeout: self.timeout,
        }
    }

    /// Plain completion; rate limits are retried per the policy.
    pub async fn complete(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<CompletionResponse, ProviderError> {
        ensure_messages(messages)?;
        let config = self.completion_config(temperature, max_tokens);
        self.retry
            .run("complete", || self.provider.complete(messages, &config))
            .await
    }

    /// Tool-augmented completion. Tool-call arguments are passed through unchecked.
    pub async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<ToolCompletion, ProviderError> {
        ensure_messages(messages)?;
        let config = self.completion_config(temperature, max_tokens);
        self.retry
            .run("complete_with_tools", || {
                self.provider.complete_with_tools(messages, tools, &config)
            })
            .await
    }
}

fn ensure_messages(messages: &[ChatMessage]) -> Result<(), ProviderError> {
    if messages.is_empty() {
        return Err(ProviderError::InvalidRequest(
            "at least one message is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU32, Ordering};

    /// Replays canned results, counting calls.
    struct Replay {
        results: Mutex<VecDeque<Result<ToolCompletion, ProviderError>>>,
        calls: AtomicU32,
    }

    impl Replay {
        fn new(results: Vec<Result<ToolCompletion, ProviderError>>) -> Arc<Self> {
            Arc::new(Self {
                results: Mutex::new(results.into()),
                calls: AtomicU32::new(0),
            })
        }

        fn next(&self) -> Result<ToolCompletion, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.results
                .lock()
                .pop_front()
                .unwrap_or_else(|| Err(ProviderError::InvalidRequest("exhausted".into())))
        }
    }

    #[async_trait]
    impl LlmProvider for Replay {
        async fn complete(
            &self,
            _messages: &[ChatMessage],
            _config: &CompletionConfig,
        ) -> Result<CompletionResponse, ProviderError> {
            self.next().map(|c| CompletionResponse {
                content: c.content,
                usage: c.usage,
                model: "replay".into(),
                stop_reason: None,
            })
        }

        async fn complete_with_tools(
            &self,
            _messages: &[ChatMessage],
            _tools: &[ToolDefinition],
            _config: &CompletionConfig,
        ) -> Result<ToolCompletion, ProviderError> {
            self.next()
        }

        fn name(&self) -> &str {
            "replay"
        }

        fn model_version(&self) -> String {
            "replay/test".into()
        }
    }

    fn text(content: &str) -> Result<ToolCompletion, ProviderError> {
        Ok(ToolCompletion {
            content: content.into(),
            ..ToolCompletion::default()
        })
    }

    #[tokio::test]
    async fn test_empty_messages_rejected() {
        let replay = Replay::new(vec![text("{}")]);
        let adapter = ProviderAdapter::new(replay.clone(), RetryPolicy::default());
        let err = adapter.complete(&[], 0.1, 100).await.unwrap_err();
        assert!(matches!(err, ProviderError::InvalidRequest(_)));
        assert_eq!(replay.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limit_then_success() {
        let replay = Replay::new(vec![
            Err(ProviderError::RateLimited { retry_after: None }),
            text("{\"reasoning\": \"ok\"}"),
        ]);
        let adapter = ProviderAdapter::new(replay.clone(), RetryPolicy::default());
        let response = adapter
            .complete_with_tools(&[ChatMessage::user("hi")], &[], 0.1, 100)
            .await
            .unwrap();
        assert_eq!(response.content, "{\"reasoning\": \"ok\"}");
        assert_eq!(replay.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_auth_error_not_retried() {
        let replay = Replay::new(vec![Err(ProviderError::AuthError), text("{}")]);
        let adapter = ProviderAdapter::new(replay.clone(), RetryPolicy::default());
        let err = adapter.complete(&[ChatMessage::user("hi")], 0.1, 100).await.unwrap_err();
        assert!(matches!(err, ProviderError::AuthError));
        assert_eq!(replay.calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_debug_shows_model() {
        let adapter = ProviderAdapter::new(Replay::new(vec![]), RetryPolicy::none());
        assert!(format!("{:?}", adapter).contains("replay/test"));
    }
}
