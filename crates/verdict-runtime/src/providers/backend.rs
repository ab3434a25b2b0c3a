//! The closed set of shipped backends, selected once from configuration.

use super::{
    AnthropicProvider, ChatMessage, CompletionConfig, CompletionResponse, LlmProvider,
    OllamaProvider, OpenAiProvider, ProviderError, ToolCompletion,
};
use crate::config::{BackendConfig, BackendKind};
use async_trait::async_trait;
use tracing::info;
use verdict_core::ToolDefinition;

#[derive(Debug)]
pub enum Backend {
    /// OpenAI or Azure OpenAI
    OpenAi(OpenAiProvider),
    Anthropic(AnthropicProvider),
    Ollama(OllamaProvider),
}

impl Backend {
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        let backend = match config.kind {
            BackendKind::OpenAi => Backend::OpenAi(OpenAiProvider::from_config(config)?),
            BackendKind::Azure => Backend::OpenAi(OpenAiProvider::azure_from_config(config)?),
            BackendKind::Anthropic => Backend::Anthropic(AnthropicProvider::from_config(config)?),
            BackendKind::Ollama => Backend::Ollama(OllamaProvider::from_config(config)?),
        };
        info!(model = %backend.model_version(), "backend selected");
        Ok(backend)
    }

    fn inner(&self) -> &dyn LlmProvider {
        match self {
            Backend::OpenAi(p) => p,
            Backend::Anthropic(p) => p,
            Backend::Ollama(p) => p,
        }
    }
}

#[async_trait]
impl LlmProvider for Backend {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        self.inner().complete(messages, config).await
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        config: &CompletionConfig,
    ) -> Result<ToolCompletion, ProviderError> {
        self.inner().complete_with_tools(messages, tools, config).await
    }

    fn name(&self) -> &str {
        self.inner().name()
    }

    fn model_version(&self) -> String {
        self.inner().model_version()
    }

    async fn health_check(&self) -> bool {
        self.inner().health_check().await
    }
}
