//! Local models served by Ollama (`/api/chat`, non-streaming).
//!
//! No credentials. Tool arguments travel as JSON objects rather than
//! strings, and Ollama assigns no call ids, so the provider mints them.

use super::http::{arguments_object, build_client, check_status, read_json, send_error};
use super::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, TokenUsage,
    ToolCall, ToolCompletion,
};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use verdict_core::ToolDefinition;

const DEFAULT_BASE_URL: &str = "http://localhost:11434";

#[derive(Debug)]
pub struct OllamaProvider {
    base_url: String,
    model: String,
    client: reqwest::Client,
    next_call_id: AtomicU64,
}

impl OllamaProvider {
    pub fn new(model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            client: build_client(Duration::from_secs(120))?,
            next_call_id: AtomicU64::new(0),
        })
    }

    pub fn from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        Ok(Self {
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.model().to_string(),
            client: build_client(config.timeout)?,
            next_call_id: AtomicU64::new(0),
        })
    }

    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        config: &CompletionConfig,
        json_format: bool,
    ) -> OllamaRequest {
        OllamaRequest {
            model: self.model.clone(),
            messages: messages.iter().map(OllamaMessage::from).collect(),
            stream: false,
            options: OllamaOptions {
                temperature: config.temperature,
                num_predict: config.max_tokens,
            },
            format: json_format.then_some("json"),
            tools: tools.iter().map(ToolDefinition::to_function_json).collect(),
        }
    }

    async fn send(&self, request: &OllamaRequest, config: &CompletionConfig) -> Result<OllamaResponse, ProviderError> {
        let response = self
            .client
            .post(format!("{}/api/chat", self.base_url))
            .timeout(config.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(e, config.timeout))?;

        read_json(check_status(response).await?).await
    }

    fn into_tool_completion(&self, response: OllamaResponse) -> ToolCompletion {
        let usage = TokenUsage {
            prompt_tokens: response.prompt_eval_count,
            completion_tokens: response.eval_count,
        };
        let tool_calls = response
            .message
            .tool_calls
            .into_iter()
            .map(|call| ToolCall {
                id: format!("call_{}", self.next_call_id.fetch_add(1, Ordering::Relaxed)),
                name: call.function.name,
                arguments: call.function.arguments.to_string(),
            })
            .collect();

        ToolCompletion {
            content: response.message.content,
            tool_calls,
            usage,
            stop_reason: response.done_reason,
        }
    }
}

#[derive(Debug, Serialize)]
struct OllamaRequest {
    model: String,
    messages: Vec<OllamaMessage>,
    stream: bool,
    options: OllamaOptions,
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Debug, Serialize)]
struct OllamaOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Debug, Serialize)]
struct OllamaMessage {
    role: &'static str,
    content: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tool_calls: Vec<OllamaToolCall>,
}

impl From<&ChatMessage> for OllamaMessage {
    fn from(message: &ChatMessage) -> Self {
        Self {
            role: message.role.as_str(),
            content: message.content.clone(),
            tool_calls: message
                .tool_calls
                .iter()
                .map(|call| OllamaToolCall {
                    function: OllamaFunction {
                        name: call.name.clone(),
                        arguments: arguments_object(&call.arguments),
                    },
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaToolCall {
    function: OllamaFunction,
}

#[derive(Debug, Serialize, Deserialize)]
struct OllamaFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[derive(Debug, Deserialize)]
struct OllamaResponse {
    #[serde(default)]
    model: Option<String>,
    message: OllamaResponseMessage,
    #[serde(default)]
    done_reason: Option<String>,
    #[serde(default)]
    prompt_eval_count: u32,
    #[serde(default)]
    eval_count: u32,
}

#[derive(Debug, Deserialize)]
struct OllamaResponseMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<OllamaToolCall>,
}

#[async_trait]
impl LlmProvider for OllamaProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = self.request_body(messages, &[], config, true);
        let response = self.send(&request, config).await?;
        let model = response.model.clone().unwrap_or_else(|| self.model.clone());
        let completion = self.into_tool_completion(response);
        debug!(model = %model, tokens = completion.usage.total(), "completion received");

        Ok(CompletionResponse {
            content: completion.content,
            usage: completion.usage,
            model,
            stop_reason: completion.stop_reason,
        })
    }

    async fn complete_with_tools(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        config: &CompletionConfig,
    ) -> Result<ToolCompletion, ProviderError> {
        let request = self.request_body(messages, tools, config, false);
        let response = self.send(&request, config).await?;
        Ok(self.into_tool_completion(response))
    }

    fn name(&self) -> &str {
        "ollama"
    }

    fn model_version(&self) -> String {
        format!("ollama/{}", self.model)
    }

    /// Reachability of the local server.
    async fn health_check(&self) -> bool {
        match self
            .client
            .get(format!("{}/api/tags", self.base_url))
            .timeout(Duration::from_secs(5))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                warn!(base_url = %self.base_url, error = %e, "Ollama not reachable");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity() {
        let provider = OllamaProvider::new("llama3.1").unwrap();
        assert_eq!(provider.name(), "ollama");
        assert_eq!(provider.model_version(), "ollama/llama3.1");
    }

    #[test]
    fn test_plain_request_asks_for_json() {
        let provider = OllamaProvider::new("llama3.1").unwrap();
        let body = serde_json::to_value(provider.request_body(
            &[ChatMessage::user("hi")],
            &[],
            &CompletionConfig::default(),
            true,
        ))
        .unwrap();
        assert_eq!(body["format"], "json");
        assert_eq!(body["stream"], false);
        assert_eq!(body["options"]["num_predict"], 1500);
    }

    #[test]
    fn test_assistant_tool_arguments_are_objects() {
        let call = ToolCall {
            id: "call_0".into(),
            name: "calculate".into(),
            arguments: r#"{"expression":"1+2"}"#.into(),
        };
        let message = OllamaMessage::from(&ChatMessage::assistant_tool_calls("", vec![call]));
        let value = serde_json::to_value(message).unwrap();
        assert_eq!(value["tool_calls"][0]["function"]["arguments"]["expression"], "1+2");
    }

    #[test]
    fn test_call_ids_are_unique_across_responses() {
        let provider = OllamaProvider::new("llama3.1").unwrap();
        let response = || -> OllamaResponse {
            serde_json::from_value(json!({
                "model": "llama3.1",
                "message": {
                    "content": "",
                    "tool_calls": [{"function": {"name": "calculate", "arguments": {"expression": "1+1"}}}]
                },
                "prompt_eval_count": 30,
                "eval_count": 5
            }))
            .unwrap()
        };

        let first = provider.into_tool_completion(response());
        let second = provider.into_tool_completion(response());
        assert_ne!(first.tool_calls[0].id, second.tool_calls[0].id);
        assert_eq!(arguments_object(&first.tool_calls[0].arguments)["expression"], "1+1");
        assert_eq!(first.usage.total(), 35);
    }
}
