//! Anthropic Claude provider.
//!
//! Claude has no JSON response mode, so plain completions append a
//! JSON-only instruction to the system prompt. Tool calls travel as
//! `tool_use` / `tool_result` content blocks.
//!
//! ## Security
//!
//! This provider uses the centralized [`ApiCredential`] system for secure
//! credential handling. See the [`secrets`](super::secrets) module for details.

use super::http::{arguments_object, build_client, check_status, read_json, send_error};
use super::secrets::{ApiCredential, CredentialSource};
use super::{
    ChatMessage, CompletionConfig, CompletionResponse, LlmProvider, ProviderError, Role,
    TokenUsage, ToolCall, ToolCompletion,
};
use crate::config::BackendConfig;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::time::Duration;
use tracing::debug;
use verdict_core::ToolDefinition;

/// Environment variable name for Anthropic API key.
pub const ANTHROPIC_API_KEY_ENV: &str = "ANTHROPIC_API_KEY";

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com/v1";
const API_VERSION: &str = "2023-06-01";
const JSON_ONLY_INSTRUCTION: &str = "IMPORTANT: Respond ONLY with valid JSON, no other text.";

/// Anthropic Claude provider.
///
/// # Security
///
/// The API key is stored using [`ApiCredential`]: it cannot be printed via
/// `Debug` or `Display` and must be exposed explicitly with `.expose()`.
pub struct AnthropicProvider {
    credential: ApiCredential,
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl std::fmt::Debug for AnthropicProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AnthropicProvider")
            .field("credential", &self.credential)
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .finish()
    }
}

impl AnthropicProvider {
    /// Create a provider with an explicit key and model.
    pub fn new(api_key: impl Into<String>, model: impl Into<String>) -> Result<Self, ProviderError> {
        Ok(Self {
            credential: ApiCredential::new(api_key, CredentialSource::Programmatic, "Anthropic API key"),
            base_url: DEFAULT_BASE_URL.to_string(),
            model: model.into(),
            client: build_client(Duration::from_secs(60))?,
        })
    }

    /// Key from config, falling back to `ANTHROPIC_API_KEY`.
    pub fn from_config(config: &BackendConfig) -> Result<Self, ProviderError> {
        let credential = ApiCredential::resolve(
            config.api_key.as_deref(),
            ANTHROPIC_API_KEY_ENV,
            "Anthropic API key",
        )?;

        Ok(Self {
            credential,
            base_url: config
                .base_url
                .as_deref()
                .unwrap_or(DEFAULT_BASE_URL)
                .trim_end_matches('/')
                .to_string(),
            model: config.model().to_string(),
            client: build_client(config.timeout)?,
        })
    }

    /// Set custom base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into().trim_end_matches('/').to_string();
        self
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        tools: &[ToolDefinition],
        config: &CompletionConfig,
        json_only: bool,
    ) -> AnthropicRequest {
        let mut system = messages
            .iter()
            .filter(|m| m.role == Role::System)
            .map(|m| m.content.as_str())
            .collect::<Vec<_>>()
            .join("\n\n");
        if json_only {
            if !system.is_empty() {
                system.push_str("\n\n");
            }
            system.push_str(JSON_ONLY_INSTRUCTION);
        }

        AnthropicRequest {
            model: self.model.clone(),
            max_tokens: config.max_tokens,
            system: (!system.is_empty()).then_some(system),
            messages: convert_messages(messages),
            temperature: config.temperature,
            tools: tools
                .iter()
                .map(|t| AnthropicTool {
                    name: t.name.clone(),
                    description: t.description.clone(),
                    input_schema: t.parameters.clone(),
                })
                .collect(),
        }
    }

    async fn send(&self, request: &AnthropicRequest, config: &CompletionConfig) -> Result<AnthropicResponse, ProviderError> {
        // SECURITY: Only expose the credential here, at the point of use
        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", self.credential.expose())
            .header("anthropic-version", API_VERSION)
            .timeout(config.timeout)
            .json(request)
            .send()
            .await
            .map_err(|e| send_error(e, config.timeout))?;

        read_json(check_status(response).await?).await
    }
}

/// Map chat messages onto Anthropic's alternating user/assistant turns.
///
/// System messages are lifted out by the caller. Consecutive tool results
/// are merged into a single user turn.
fn convert_messages(messages: &[ChatMessage]) -> Vec<AnthropicMessage> {
    let mut out: Vec<AnthropicMessage> = Vec::new();

    for msg in messages {
        match msg.role {
            Role::System => {}
            Role::User => out.push(AnthropicMessage {
                role: "user",
                content: vec![ContentBlock::Text { text: msg.content.clone() }],
            }),
            Role::Assistant => {
                let mut content = Vec::new();
                if !msg.content.is_empty() {
                    content.push(ContentBlock::Text { text: msg.content.clone() });
                }
                content.extend(msg.tool_calls.iter().map(|call| ContentBlock::ToolUse {
                    id: call.id.clone(),
                    name: call.name.clone(),
                    input: arguments_object(&call.arguments),
                }));
                out.push(AnthropicMessage { role: "assistant", content });
            }
            Role::Tool => {
                let block = ContentBlock::ToolResult {
                    tool_use_id: msg.tool_call_id.clone().unwrap_or_default(),
                    content: msg.content.clone(),
                };
                match out.last_mut() {
                    Some(last) if last.role == "user" && last.content.iter().all(ContentBlock::is_tool_result) => {
                        last.content.push(block)
                    }
                    _ => out.push(AnthropicMessage { role: "user", content: vec![block] }),
                }
            }
        }
    }

    out
}

#[derive(Debug, Serialize)]
struct AnthropicRequest {
    model: String,
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    system: Option<String>,
    messages: Vec<AnthropicMessage>,
    temperature: f32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<AnthropicTool>,
}

#[derive(Debug, Serialize)]
struct AnthropicMessage {
    role: &'static str,
    content: Vec<ContentBlock>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ContentBlock {
    Text { text: String },
    ToolUse { id: String, name: String, input: JsonValue },
    ToolResult { tool_use_id: String, content: String },
}

impl ContentBlock {
    fn is_tool_result(&self) -> bool {
        matches!(self, ContentBlock::ToolResult { .. })
    }
}

#[derive(Debug, Serialize)]
struct AnthropicTool {
    name: String,
    description: String,
    input_schema: JsonValue,
}

/// Anthropic API response format.
#[derive(Debug, Deserialize)]
struct AnthropicResponse {
    content: Vec<ResponseBlock>,
    model: String,
    stop_reason: Option<String>,
    usage: AnthropicUsage,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ResponseBlock {
    Text {
        text: String,
    },
    ToolUse {
        id: String,
        name: String,
        #[serde(default)]
        input: JsonValue,
    },
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct AnthropicUsage {
    input_tokens: u32,
    output_tokens: u32,
}

impl AnthropicResponse {
    fn into_tool_completion(self) -> ToolCompletion {
        let mut text = Vec::new();
        let mut tool_calls = Vec::new();

        for block in self.content {
            match block {
                ResponseBlock::Text { text: t } => text.push(t),
                ResponseBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                    id,
                    name,
                    arguments: input.to_string(),
                }),
                ResponseBlock::Other => {}
            }
        }

        ToolCompletion {
            content: text.join("\n"),
            tool_calls,
            usage: TokenUsage {
                prompt_tokens: self.usage.input_tokens,
                completion_tokens: self.usage.output_tokens,
            },
            stop_reason: self.stop_reason,
        }
    }
}

#[async_trait]
impl LlmProvider for AnthropicProvider {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        config: &CompletionConfig,
    ) -> Result<CompletionResponse, ProviderError> {
        let request = self.request_body(messages, &[], config, true);
        let body = self.send(&request, config).await?;
        let model = body.model.clone();
        let completion = body.into_tool_completion();
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
        let completion = self.send(&request, config).await?.into_tool_completion();
        debug!(
            tool_calls = completion.tool_calls.len(),
            tokens = completion.usage.total(),
            "tool completion received"
        );
        Ok(completion)
    }

    fn name(&self) -> &str {
        "anthropic"
    }

    fn model_version(&self) -> String {
        format!("anthropic/{}", self.model)
    }

    async fn health_check(&self) -> bool {
        // Simple check - verify API key is set (without logging the value)
        !self.credential.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BackendKind;
    use serde_json::json;

    fn provider() -> AnthropicProvider {
        AnthropicProvider::new("test-key", "claude-sonnet-4-5-20250514").unwrap()
    }

    #[test]
    fn test_provider_identity() {
        let provider = provider();
        assert_eq!(provider.name(), "anthropic");
        assert_eq!(provider.model_version(), "anthropic/claude-sonnet-4-5-20250514");
    }

    #[test]
    fn test_system_prompt_gets_json_instruction() {
        let messages = [ChatMessage::system("You are an analyst."), ChatMessage::user("hi")];
        let body = serde_json::to_value(provider().request_body(&messages, &[], &CompletionConfig::default(), true)).unwrap();

        let system = body["system"].as_str().unwrap();
        assert!(system.starts_with("You are an analyst."));
        assert!(system.ends_with(JSON_ONLY_INSTRUCTION));
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert!(body.get("tools").is_none());
    }

    #[test]
    fn test_tool_turns_convert_to_blocks() {
        let first = ToolCall {
            id: "toolu_1".into(),
            name: "check_sanctions_list".into(),
            arguments: r#"{"entity_name":"Ahmed Ivanov"}"#.into(),
        };
        let second = ToolCall {
            id: "toolu_2".into(),
            name: "check_pep_status".into(),
            arguments: "not json".into(),
        };
        let messages = [
            ChatMessage::user("screen this"),
            ChatMessage::assistant_tool_calls("", vec![first.clone(), second.clone()]),
            ChatMessage::tool_result(&first, "{}"),
            ChatMessage::tool_result(&second, "{}"),
        ];

        let converted = serde_json::to_value(convert_messages(&messages)).unwrap();
        assert_eq!(converted.as_array().unwrap().len(), 3);
        assert_eq!(converted[1]["content"][0]["type"], "tool_use");
        assert_eq!(converted[1]["content"][0]["input"]["entity_name"], "Ahmed Ivanov");
        assert_eq!(converted[1]["content"][1]["input"], json!({}));
        assert_eq!(converted[2]["role"], "user");
        assert_eq!(converted[2]["content"].as_array().unwrap().len(), 2);
        assert_eq!(converted[2]["content"][1]["tool_use_id"], "toolu_2");
    }

    #[test]
    fn test_tools_use_input_schema() {
        let tools = verdict_core::ToolRegistry::with_defaults().definitions();
        let body = serde_json::to_value(provider().request_body(
            &[ChatMessage::user("hi")],
            &tools,
            &CompletionConfig::default(),
            false,
        ))
        .unwrap();
        assert!(body["tools"][0]["input_schema"].is_object());
        assert!(body.get("system").is_none());
    }

    #[test]
    fn test_parse_mixed_response() {
        let raw = json!({
            "model": "claude-sonnet-4-5-20250514",
            "stop_reason": "tool_use",
            "content": [
                {"type": "text", "text": "Checking."},
                {"type": "tool_use", "id": "toolu_9", "name": "calculate", "input": {"expression": "2*3"}},
                {"type": "thinking", "thinking": "..."}
            ],
            "usage": {"input_tokens": 40, "output_tokens": 12}
        });
        let response: AnthropicResponse = serde_json::from_value(raw).unwrap();
        let completion = response.into_tool_completion();
        assert_eq!(completion.content, "Checking.");
        assert_eq!(completion.tool_calls.len(), 1);
        assert_eq!(arguments_object(&completion.tool_calls[0].arguments)["expression"], "2*3");
        assert_eq!(completion.usage.total(), 52);
    }

    // ==================== SECURITY TESTS ====================

    #[test]
    fn test_api_key_not_in_debug_output() {
        let secret_key = "sk-ant-REDACTED";
        let provider = AnthropicProvider::new(secret_key, "claude").unwrap();
        let debug_output = format!("{:?}", provider);
        assert!(!debug_output.contains(secret_key), "API key was exposed in Debug output!");
        assert!(debug_output.contains("[REDACTED]"));
    }

    #[tokio::test]
    async fn test_health_check_requires_key() {
        assert!(provider().health_check().await);
        assert!(!AnthropicProvider::new("", "claude").unwrap().health_check().await);
    }

    #[test]
    fn test_from_config_with_api_key() {
        let config = BackendConfig {
            kind: BackendKind::Anthropic,
            api_key: Some("config-api-key".to_string()),
            base_url: Some("https://custom.api.com/v1/".to_string()),
            ..BackendConfig::default()
        };
        let provider = AnthropicProvider::from_config(&config).unwrap();
        assert_eq!(provider.base_url, "https://custom.api.com/v1");
        assert_eq!(provider.credential.source(), CredentialSource::Config);
        assert_eq!(provider.model, "claude-sonnet-4-5-20250514");
    }
}
